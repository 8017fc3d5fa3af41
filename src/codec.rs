//! JSON encoding shared by every request and response.
//!
//! Absent optional fields are omitted on the wire (each type opts in with
//! `skip_serializing_if`), and unknown response fields are ignored so newer
//! API additions do not break decoding.

use crate::error::{ApiError, GeminiError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, GeminiError> {
    serde_json::to_string(value).map_err(GeminiError::from)
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, GeminiError> {
    serde_json::to_value(value).map_err(GeminiError::from)
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, GeminiError> {
    from_slice(json.as_bytes())
}

/// Decodes `bytes`, treating a top-level `null` as a failure.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GeminiError> {
    match serde_json::from_slice::<Option<T>>(bytes) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(GeminiError::DeserializationFailed(
            "Expected a JSON value, got null".to_string(),
        )),
        Err(e) => Err(GeminiError::DeserializationFailed(e.to_string())),
    }
}

/// Decodes one API response object.
///
/// A body carrying the API's `{"error": {..}}` envelope fails with
/// `RequestFailed` even when it came with a success status, as happens for
/// errors raised midway through a streamed answer. The envelope's code is
/// used as the status, 500 when it has none.
pub fn from_response<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GeminiError> {
    if let Some(error) = ApiError::from_body(bytes) {
        return Err(error.into_request_failed(500));
    }
    from_slice(bytes)
}

pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, GeminiError> {
    if value.is_null() {
        return Err(GeminiError::DeserializationFailed(
            "Expected a JSON value, got null".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| GeminiError::DeserializationFailed(e.to_string()))
}

pub(crate) mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use serde_json::json;

    #[test]
    fn absent_options_are_omitted() {
        let request = GenerateContentRequest::new(vec![Content::user("hi")]);
        let json = to_json(&request).unwrap();
        assert_eq!(json, r#"{"contents":[{"parts":[{"text":"hi"}],"role":"user"}]}"#);
        assert!(!json.contains("tools"));
        assert!(!json.contains("null"));
    }

    #[test]
    fn declared_tools_serialize_under_function_declarations() {
        let request = GenerateContentRequest::new(vec![Content::user("hi")]).with_tools(vec![
            Tool::new(vec![FunctionDeclaration {
                name: "add".to_string(),
                description: "Adds two numbers".to_string(),
                parameters: None,
            }]),
        ]);
        let value = to_value(&request).unwrap();
        assert_eq!(value["tools"][0]["functionDeclarations"][0]["name"], "add");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let response: GenerateContentResponse = from_json(
            r#"{"candidates":[{"content":{"parts":[{"text":"ok"}],"role":"model"},"brandNew":1}],"somethingElse":{}}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "ok");
    }

    #[test]
    fn null_and_malformed_input_fail() {
        assert!(matches!(
            from_json::<GenerateContentResponse>("null"),
            Err(GeminiError::DeserializationFailed(_))
        ));
        assert!(matches!(
            from_json::<GenerateContentResponse>("{\"candidates\": ["),
            Err(GeminiError::DeserializationFailed(_))
        ));
        assert!(matches!(
            from_value::<Content>(Value::Null),
            Err(GeminiError::DeserializationFailed(_))
        ));
    }

    #[test]
    fn inline_data_with_bad_base64_fails() {
        let result = from_json::<Content>(
            r#"{"role":"model","parts":[{"inlineData":{"mimeType":"audio/pcm","data":"@@not-base64@@"}}]}"#,
        );
        match result {
            Err(GeminiError::DeserializationFailed(message)) => {
                assert!(message.contains("inlineData"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn error_envelope_is_a_request_failure() {
        let body = br#"{"error":{"code":500,"message":"boom","status":"INTERNAL"}}"#;
        match from_response::<GenerateContentResponse>(body) {
            Err(GeminiError::RequestFailed { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom (INTERNAL)");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let response: GenerateContentResponse =
            from_response(br#"{"candidates":[{"content":{"parts":[{"text":"ok"}]}}]}"#).unwrap();
        assert_eq!(response.text(), "ok");
    }

    #[test]
    fn content_survives_a_round_trip() {
        let original = Content::new(
            Role::Function,
            vec![Part::FunctionResponse {
                function_response: FunctionResponse::new("lookup", json!({ "hits": [1, 2] })),
            }],
        );
        let decoded: Content = from_json(&to_json(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let result = from_json::<Blob>(r#"{"mimeType":"image/png","data":"@@@"}"#);
        assert!(result.is_err());
    }
}
