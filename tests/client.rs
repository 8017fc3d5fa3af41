use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use gemini_rest_api::client::{Transport, TransportRequest, TransportResponse};
use gemini_rest_api::function::FunctionTarget;
use gemini_rest_api::stream::ByteStream;
use gemini_rest_api::types::*;
use gemini_rest_api::{
    CancellationToken, GeminiError, GenerativeModel, GenerativeModelBuilder, function_target,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";

fn model_for(server: &MockServer) -> GenerativeModel {
    GenerativeModelBuilder::new()
        .api_key(API_KEY)
        .model("gemini-pro")
        .base_url(format!("{}/v1beta", server.uri()))
        .build()
        .unwrap()
}

fn text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5 }
    })
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|req| !req.body.is_empty())
        .map(|req| serde_json::from_slice(&req.body).unwrap())
        .collect()
}

mod rest {
    use super::*;

    #[tokio::test]
    async fn generate_content_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .and(query_param("key", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let model = model_for(&server);
        let response = model
            .generate_content(
                GenerateContentRequest::new(vec![Content::user("Hello")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.text(), "Hi there");
        assert_eq!(response.usage_metadata.unwrap().total_token_count, Some(5));

        let bodies = request_bodies(&server).await;
        assert_eq!(
            bodies[0],
            json!({ "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }] })
        );
    }

    #[tokio::test]
    async fn model_defaults_are_sent_with_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
            .mount(&server)
            .await;

        let model = GenerativeModelBuilder::new()
            .api_key(API_KEY)
            .model("gemini-pro")
            .base_url(format!("{}/v1beta/", server.uri()))
            .system_instruction(Content::instruction("Answer in French."))
            .generation_config(GenerationConfig {
                temperature: Some(0.5),
                ..Default::default()
            })
            .build()
            .unwrap();
        model
            .generate_content(
                GenerateContentRequest::new(vec![Content::user("Hello")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let body = &request_bodies(&server).await[0];
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Answer in French.");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn error_status_becomes_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&server)
            .await;

        let result = model_for(&server)
            .generate_content(
                GenerateContentRequest::new(vec![Content::user("Hello")]),
                &CancellationToken::new(),
            )
            .await;
        match result {
            Err(GeminiError::RequestFailed { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.starts_with("API key not valid."));
                assert!(message.contains("INVALID_ARGUMENT"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_deserialization_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"candidates\": [", "application/json"))
            .mount(&server)
            .await;

        let result = model_for(&server)
            .generate_content(
                GenerateContentRequest::new(vec![Content::user("Hello")]),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(GeminiError::DeserializationFailed(_))));
    }

    #[tokio::test]
    async fn stream_generate_content_yields_fragments_in_order() {
        let server = MockServer::start().await;
        let body = json!([text_response("Hel"), text_response("lo, "), text_response("world")]);
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
            .and(query_param("key", API_KEY))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"),
            )
            .mount(&server)
            .await;

        let stream = model_for(&server)
            .stream_generate_content(
                GenerateContentRequest::new(vec![Content::user("Greet me")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let texts: Vec<String> = stream.map(|item| item.unwrap().text()).collect().await;
        assert_eq!(texts, vec!["Hel", "lo, ", "world"]);
    }

    #[tokio::test]
    async fn list_models_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(query_param("key", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{
                    "name": "models/gemini-pro",
                    "displayName": "Gemini Pro",
                    "inputTokenLimit": 30720,
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                }],
                "nextPageToken": "page-2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{ "name": "models/imagen-3.0-generate-002", "supportedGenerationMethods": ["predict"] }]
            })))
            .mount(&server)
            .await;

        let models = model_for(&server)
            .list_models(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].display_name.as_deref(), Some("Gemini Pro"));
        assert!(models[0].supports("generateContent"));
        assert!(models[1].supports("predict"));
    }

    #[tokio::test]
    async fn generate_image_decodes_predictions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/imagen-3.0-generate-002:predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{ "mimeType": "image/png", "bytesBase64Encoded": "iVBORw==" }]
            })))
            .mount(&server)
            .await;

        let imagen = model_for(&server).with_model("imagen-3.0-generate-002");
        let response = imagen
            .generate_image(
                GenerateImageRequest::new("A lighthouse at dusk").sample_count(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.predictions[0].mime_type, "image/png");
        assert_eq!(response.predictions[0].bytes().unwrap(), vec![0x89, 0x50, 0x4e, 0x47]);

        let body = &request_bodies(&server).await[0];
        assert_eq!(body["instances"][0]["prompt"], "A lighthouse at dusk");
        assert_eq!(body["parameters"]["sampleCount"], 1);
    }
}

mod chat {
    use super::*;

    struct Weather;

    #[function_target]
    impl Weather {
        /// Current temperature for a city, in Celsius.
        #[callable]
        fn current_temperature(&self, city: String) -> f64 {
            if city == "Oslo" { 4.0 } else { 21.0 }
        }
    }

    #[tokio::test]
    async fn send_records_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Bonjour")))
            .mount(&server)
            .await;

        let mut chat = model_for(&server).start_chat();
        chat.send(Content::user("Hello"), &CancellationToken::new())
            .await
            .unwrap();
        chat.send(Content::user("Again"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(chat.history().len(), 4);
        assert_eq!(chat.history()[1].role, Some(Role::Model));
        let bodies = request_bodies(&server).await;
        assert_eq!(bodies[1]["contents"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn blocked_turn_is_not_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            )
            .mount(&server)
            .await;

        let mut chat = model_for(&server).start_chat();
        let response = chat
            .send(Content::user("something unsafe"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.block_reason(), Some("SAFETY"));
        assert!(chat.history().is_empty());
    }

    #[tokio::test]
    async fn streamed_error_envelope_fails_the_turn() {
        let server = MockServer::start().await;
        let body = json!([
            text_response("Partial answer"),
            { "error": { "code": 500, "message": "Internal error encountered.", "status": "INTERNAL" } }
        ]);
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"),
            )
            .mount(&server)
            .await;

        let mut chat = model_for(&server).start_chat();
        let mut fragments = 0;
        let result = chat
            .send_stream(Content::user("Hi"), &CancellationToken::new(), |_| {
                fragments += 1
            })
            .await;
        match result {
            Err(GeminiError::RequestFailed { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal error encountered. (INTERNAL)");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(fragments, 1);
        assert!(chat.history().is_empty());
    }

    #[tokio::test]
    async fn send_stream_merges_fragments() {
        let server = MockServer::start().await;
        let body = json!([text_response("Hel"), text_response("lo")]);
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"),
            )
            .mount(&server)
            .await;

        let mut chat = model_for(&server).start_chat();
        let mut fragments = 0;
        let reply = chat
            .send_stream(Content::user("Hi"), &CancellationToken::new(), |_| {
                fragments += 1
            })
            .await
            .unwrap();
        assert_eq!(fragments, 2);
        assert_eq!(reply.text().as_deref(), Some("Hello"));
        assert_eq!(chat.history().len(), 2);
        assert_eq!(chat.history()[1].parts.len(), 1);
    }

    #[tokio::test]
    async fn function_call_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{ "functionCall": { "name": "current_temperature", "args": { "city": "Oslo" } } }]
                    }
                }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .and(body_string_contains("functionResponse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("It is 4 degrees in Oslo.")))
            .mount(&server)
            .await;

        let registry = Weather::function_registry().unwrap();
        let model = GenerativeModelBuilder::new()
            .api_key(API_KEY)
            .model("gemini-pro")
            .base_url(format!("{}/v1beta", server.uri()))
            .tools(vec![registry.tool().unwrap()])
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let mut chat = model.start_chat();

        chat.send(Content::user("How cold is Oslo?"), &cancel)
            .await
            .unwrap();
        let call = chat.last_function_call().cloned().unwrap();
        assert_eq!(call.name, "current_temperature");

        let response = registry.respond(&Weather, &call);
        assert_eq!(response.response.content, json!(4.0));
        let answer = chat
            .send_function_responses(vec![response], &cancel)
            .await
            .unwrap();
        assert_eq!(answer.text(), "It is 4 degrees in Oslo.");
        assert!(chat.last_function_call().is_none());

        let bodies = request_bodies(&server).await;
        assert_eq!(
            bodies[0]["tools"][0]["functionDeclarations"][0]["name"],
            "current_temperature"
        );
        let last_turn = bodies[1]["contents"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last_turn["role"], "function");
        assert_eq!(
            last_turn["parts"][0]["functionResponse"]["response"]["name"],
            "current_temperature"
        );
    }
}

mod cancellation {
    use super::*;

    /// Never answers until the gate opens.
    struct GatedTransport {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, GeminiError> {
            self.gate.notified().await;
            Ok(TransportResponse::full(200, text_response("too late").to_string()))
        }
    }

    /// Succeeds, but only after the caller has already canceled.
    struct LateSuccessTransport {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Transport for LateSuccessTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, GeminiError> {
            self.cancel.cancel();
            Ok(TransportResponse::full(200, text_response("ignored").to_string()))
        }
    }

    /// Sends one streamed object, then stalls.
    struct StallingStreamTransport;

    #[async_trait]
    impl Transport for StallingStreamTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, GeminiError> {
            let first = format!("[{}", text_response("partial"));
            let chunks = vec![Ok::<_, GeminiError>(Bytes::from(first))];
            let body: ByteStream =
                Box::pin(futures_util::stream::iter(chunks).chain(futures_util::stream::pending()));
            Ok(TransportResponse::new(200, body))
        }
    }

    fn model_with(transport: impl Transport) -> GenerativeModel {
        GenerativeModelBuilder::new()
            .api_key(API_KEY)
            .transport(transport)
            .build()
            .unwrap()
    }

    fn request() -> GenerateContentRequest {
        GenerateContentRequest::new(vec![Content::user("Hello")])
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_request() {
        let gate = Arc::new(Notify::new());
        let model = model_with(GatedTransport { gate: gate.clone() });
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let result = model.generate_content(request(), &cancel).await;
        assert!(matches!(result, Err(GeminiError::Canceled)));
        assert!(result.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn cancellation_wins_over_late_success() {
        let cancel = CancellationToken::new();
        let model = model_with(LateSuccessTransport {
            cancel: cancel.clone(),
        });
        let result = model.generate_content(request(), &cancel).await;
        assert!(matches!(result, Err(GeminiError::Canceled)));
    }

    #[tokio::test]
    async fn already_canceled_token_sends_nothing() {
        let gate = Arc::new(Notify::new());
        gate.notify_one();
        let model = model_with(GatedTransport { gate });
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            model.list_models(&cancel).await,
            Err(GeminiError::Canceled)
        ));
    }

    #[tokio::test]
    async fn cancel_stops_stream_emission() {
        let model = model_with(StallingStreamTransport);
        let cancel = CancellationToken::new();
        let mut stream = model
            .stream_generate_content(request(), &cancel)
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text(), "partial");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert!(matches!(stream.next().await, Some(Err(GeminiError::Canceled))));
        assert!(stream.next().await.is_none());
    }
}
