//! `RequestContext` over an already-buffered axum request: reads params,
//! headers, and body out of `http::Request` parts and extensions.

use std::collections::HashMap;

use opkit::Operation;
use opkit::contracts::RequestContext;

pub struct AxumRequestContext {
    pub(crate) method: http::Method,
    pub(crate) host: String,
    pub(crate) path: String,
    pub(crate) path_params: HashMap<String, String>,
    pub(crate) query_params: HashMap<String, Vec<String>>,
    pub(crate) headers: http::HeaderMap,
    pub(crate) body: Vec<u8>,
    pub(crate) operation: Operation,
    pub(crate) cancelled: std::sync::atomic::AtomicBool,
}

impl AxumRequestContext {
    pub fn new(
        method: http::Method,
        host: String,
        path: String,
        path_params: HashMap<String, String>,
        raw_query: Option<&str>,
        headers: http::HeaderMap,
        body: Vec<u8>,
        operation: Operation,
    ) -> Self {
        let query_params = parse_query(raw_query);
        Self {
            method,
            host,
            path,
            path_params,
            query_params,
            headers,
            body,
            operation,
            cancelled: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

fn parse_query(raw: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    let Some(raw) = raw else { return map };
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        map.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    map
}

impl RequestContext for AxumRequestContext {
    fn method(&self) -> &http::Method {
        &self.method
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    fn query_params(&self, name: &str) -> Vec<&str> {
        self.query_params
            .get(name)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect()
    }

    fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn operation(&self) -> &Operation {
        &self.operation
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(raw_query: Option<&str>) -> AxumRequestContext {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::ACCEPT, "application/json".parse().unwrap());
        AxumRequestContext::new(
            http::Method::GET,
            "example.com".to_string(),
            "/things/{id}".to_string(),
            HashMap::from([("id".to_string(), "42".to_string())]),
            raw_query,
            headers,
            Vec::new(),
            Operation::default(),
        )
    }

    #[test]
    fn path_param_reads_bound_segment() {
        let c = ctx(None);
        assert_eq!(c.path_param("id"), Some("42"));
        assert_eq!(c.path_param("missing"), None);
    }

    #[test]
    fn query_params_splits_repeated_keys_in_order() {
        let c = ctx(Some("tag=a&tag=b&limit=10"));
        assert_eq!(c.query_params("tag"), vec!["a", "b"]);
        assert_eq!(c.query_params("limit"), vec!["10"]);
        assert!(c.query_params("absent").is_empty());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let c = ctx(None);
        assert_eq!(c.header("Accept"), Some("application/json"));
        assert_eq!(c.content_type(), None);
    }
}
