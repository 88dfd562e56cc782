//! Payload encoding for outbound broker messages
//!
//! JSON string payloads are transmitted verbatim as their UTF-8 bytes, with
//! no added quotes and no escaping. Every other JSON shape is serialized to
//! compact JSON. serde_json leaves `<`, `>` and non-ASCII characters alone,
//! so HTML fragments and accented text cross the wire byte-for-byte.

use serde_json::Value;

use crate::error::GatewayError;

/// Encode a request payload into the bytes handed to the broker.
///
/// A JSON string becomes its raw UTF-8 content; any other value becomes
/// compact JSON with no whitespace.
pub fn encode_payload(message: &Value) -> Result<Vec<u8>, GatewayError> {
    match message {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        other => serde_json::to_vec(other).map_err(|e| GatewayError::PayloadEncoding {
            detail: e.to_string(),
        }),
    }
}

/// Rebuild the echoed message from the bytes that were actually transmitted.
///
/// The HTTP response reports what went over the wire, not what the client
/// sent, so a mangled payload would be visible to the caller. String payloads
/// come back as strings; structured payloads are re-parsed from the wire
/// bytes, falling back to the original value if parsing fails.
pub fn echo_payload(original: &Value, wire: &[u8]) -> Value {
    if original.is_string() {
        Value::String(String::from_utf8_lossy(wire).into_owned())
    } else {
        serde_json::from_slice(wire).unwrap_or_else(|_| original.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_string_payload_is_verbatim_utf8() {
        let message = json!("hello world");
        let wire = encode_payload(&message).unwrap();
        assert_eq!(wire, b"hello world");
    }

    #[test]
    fn test_string_payload_keeps_html_unescaped() {
        let message = json!("<b>bold</b> & <i>italic</i>");
        let wire = encode_payload(&message).unwrap();
        assert_eq!(wire, "<b>bold</b> & <i>italic</i>".as_bytes());
    }

    #[test]
    fn test_string_payload_keeps_non_ascii_bytes() {
        let message = json!("café ☕ naïve");
        let wire = encode_payload(&message).unwrap();
        assert_eq!(wire, "café ☕ naïve".as_bytes());
        // No \u escapes anywhere in the output
        assert!(!wire.windows(2).any(|w| w == b"\\u"));
    }

    #[test]
    fn test_structured_payload_is_compact_json() {
        let message = json!({"count": 3, "tags": ["a", "b"]});
        let wire = encode_payload(&message).unwrap();
        assert_eq!(wire, br#"{"count":3,"tags":["a","b"]}"#);
    }

    #[test]
    fn test_structured_payload_keeps_angle_brackets() {
        let message = json!({"html": "<b>bold</b>"});
        let wire = encode_payload(&message).unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("<b>bold</b>"));
        assert!(!text.contains("\\u003c"));
    }

    #[test]
    fn test_structured_payload_keeps_unicode() {
        let message = json!({"name": "café"});
        let wire = encode_payload(&message).unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("café"));
        assert!(!text.contains("\\u"));
    }

    #[test]
    fn test_echo_string_payload_from_wire_bytes() {
        let original = json!("hello <b>there</b>");
        let wire = encode_payload(&original).unwrap();
        assert_eq!(echo_payload(&original, &wire), original);
    }

    #[test]
    fn test_echo_structured_payload_from_wire_bytes() {
        let original = json!({"a": 1, "b": [true, null]});
        let wire = encode_payload(&original).unwrap();
        assert_eq!(echo_payload(&original, &wire), original);
    }

    #[test]
    fn test_echo_falls_back_to_original_on_bad_wire_bytes() {
        let original = json!({"a": 1});
        assert_eq!(echo_payload(&original, b"not json"), original);
    }

    #[test]
    fn test_null_and_bool_payloads_serialize() {
        assert_eq!(encode_payload(&json!(null)).unwrap(), b"null");
        assert_eq!(encode_payload(&json!(true)).unwrap(), b"true");
        assert_eq!(encode_payload(&json!(42)).unwrap(), b"42");
    }

    // Integer-only numbers keep the round trip exact; floats can reformat.
    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            ".*".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 32, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::from),
                prop::collection::hash_map(".*", inner, 0..8)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn echo_matches_original_for_any_payload(message in arb_json()) {
            let wire = encode_payload(&message).unwrap();
            let echoed = echo_payload(&message, &wire);
            prop_assert_eq!(echoed, message);
        }

        #[test]
        fn string_payloads_never_gain_quotes(text in ".*") {
            let message = Value::String(text.clone());
            let wire = encode_payload(&message).unwrap();
            prop_assert_eq!(wire, text.into_bytes());
        }
    }
}
