//! JSON and YAML codecs implementing the `Codec` trait's
//! `marshal`/`unmarshal` pair.

use opkit::contracts::Codec;
use opkit::error::PipelineError;
use serde_json::Value;

pub struct JsonCodec;

impl Codec for JsonCodec {
    fn media_types(&self) -> &[&'static str] {
        &["application/json"]
    }

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(value).map_err(|e| PipelineError::Decode(e.to_string()))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, PipelineError> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| PipelineError::Decode(e.to_string()))
    }
}

pub struct YamlCodec;

impl Codec for YamlCodec {
    fn media_types(&self) -> &[&'static str] {
        &["application/yaml", "application/x-yaml"]
    }

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, PipelineError> {
        serde_yaml::to_string(value)
            .map(|s| s.into_bytes())
            .map_err(|e| PipelineError::Decode(e.to_string()))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, PipelineError> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_yaml::from_slice(bytes).map_err(|e| PipelineError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let value = json!({"name": "book", "count": 3});
        let bytes = codec.marshal(&value).unwrap();
        assert_eq!(codec.unmarshal(&bytes).unwrap(), value);
    }

    #[test]
    fn json_codec_empty_body_decodes_to_null() {
        let codec = JsonCodec;
        assert_eq!(codec.unmarshal(&[]).unwrap(), Value::Null);
    }

    #[test]
    fn json_codec_rejects_malformed_bytes() {
        let codec = JsonCodec;
        assert!(codec.unmarshal(b"{not json").is_err());
    }

    #[test]
    fn yaml_codec_round_trips() {
        let codec = YamlCodec;
        let value = json!({"name": "book", "tags": ["a", "b"]});
        let bytes = codec.marshal(&value).unwrap();
        assert_eq!(codec.unmarshal(&bytes).unwrap(), value);
    }
}
