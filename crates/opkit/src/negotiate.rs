//! Content negotiation (spec §4.5): picks a response media type from an
//! `Accept` header against the server's ordered, advertised codec set.
//! No teacher analogue; grounded directly in spec §4.5's algorithm.

/// Returns the chosen media type from `server_types` (in the server's
/// preference order), or `None` if nothing in `accept` is acceptable.
///
/// `accept` is parsed tolerating malformed entries (each bad token is
/// skipped rather than aborting the whole header), per spec §4.5. An
/// absent/empty header is treated as `*/*`.
pub fn negotiate<'a>(accept: Option<&str>, server_types: &'a [&'a str]) -> Option<&'a str> {
    if server_types.is_empty() {
        return None;
    }
    let accept = accept.unwrap_or("*/*");
    if accept.trim().is_empty() {
        return server_types.first().copied();
    }

    let mut best: Option<(f32, usize)> = None;
    let mut chosen: Option<&str> = None;

    for entry in accept.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((media_type, qvalue)) = parse_entry(entry) else {
            continue;
        };
        if qvalue <= 0.0 {
            continue;
        }
        for (index, server_type) in server_types.iter().enumerate() {
            if media_type_matches(media_type, server_type) {
                let candidate = (qvalue, index);
                let is_better = match best {
                    None => true,
                    Some((best_q, best_idx)) => {
                        candidate.0 > best_q || (candidate.0 == best_q && candidate.1 < best_idx)
                    }
                };
                if is_better {
                    best = Some(candidate);
                    chosen = Some(server_type);
                }
            }
        }
    }

    chosen
}

/// Splits `type/subtype[; q=<f>][; other-params]` into the bare media
/// type and its qvalue (defaulting to 1.0; an invalid qvalue coerces to
/// 0, which is later filtered out as unacceptable).
fn parse_entry(entry: &str) -> Option<(&str, f32)> {
    let mut parts = entry.split(';');
    let media_type = parts.next()?.trim();
    if media_type.is_empty() || !media_type.contains('/') {
        return None;
    }

    let mut qvalue = 1.0f32;
    for param in parts {
        let param = param.trim();
        if let Some(value) = param.strip_prefix("q=") {
            qvalue = value.trim().parse().unwrap_or(0.0);
        }
    }
    Some((media_type, qvalue))
}

fn media_type_matches(accept_type: &str, server_type: &str) -> bool {
    if accept_type == "*/*" {
        return true;
    }
    let Some((accept_major, accept_minor)) = accept_type.split_once('/') else {
        return false;
    };
    let Some((server_major, server_minor)) = server_type.split_once('/') else {
        return false;
    };
    if accept_major != server_major {
        return false;
    }
    accept_minor == "*" || accept_minor == server_minor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_selects_first_advertised() {
        let server = ["application/json", "application/cbor"];
        assert_eq!(negotiate(Some("*/*"), &server), Some("application/json"));
    }

    #[test]
    fn absent_header_behaves_like_wildcard() {
        let server = ["application/json"];
        assert_eq!(negotiate(None, &server), Some("application/json"));
    }

    #[test]
    fn qvalue_and_server_preference_tie_break() {
        // spec §8 scenario 4
        let server = ["application/json", "application/cbor"];
        let accept = "application/ion;q=0.6,application/json;q=0.5,application/cbor;q=0.9,*/*";
        assert_eq!(negotiate(Some(accept), &server), Some("application/cbor"));
    }

    #[test]
    fn unacceptable_type_returns_none() {
        let server = ["application/cbor"];
        assert_eq!(negotiate(Some("application/json"), &server), None);
    }

    #[test]
    fn zero_qvalue_entry_is_excluded() {
        let server = ["application/json", "application/cbor"];
        assert_eq!(
            negotiate(Some("application/json;q=0, application/cbor"), &server),
            Some("application/cbor")
        );
    }

    #[test]
    fn malformed_entry_is_skipped_not_fatal() {
        let server = ["application/json"];
        assert_eq!(
            negotiate(Some("garbage, application/json"), &server),
            Some("application/json")
        );
    }

    #[test]
    fn wildcard_subtype_matches_any_subtype_of_major_type() {
        let server = ["application/json"];
        assert_eq!(negotiate(Some("application/*"), &server), Some("application/json"));
    }

    #[test]
    fn monotonicity_increasing_qvalue_cannot_lose_preference() {
        let server = ["application/json", "application/cbor"];
        let low = negotiate(Some("application/cbor;q=0.1,application/json;q=0.9"), &server);
        let high = negotiate(Some("application/cbor;q=0.95,application/json;q=0.9"), &server);
        assert_eq!(low, Some("application/json"));
        assert_eq!(high, Some("application/cbor"));
    }
}
