use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use super::{CreateSessionRequest, PlatformError, Session, SessionPlatform};

pub const DEFAULT_API_BASE: &str = "https://api.devin.ai/v1";

/// Agent platform reached over its REST API.
pub struct HttpSessionPlatform {
    api_base: String,
    api_key: String,
    client: Client,
}

impl HttpSessionPlatform {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.api_base)
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/session/{}", self.api_base, session_id)
    }

    async fn read_session(res: Response) -> Result<Session, PlatformError> {
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(PlatformError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Session::from_json(&body).map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionPlatform for HttpSessionPlatform {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, PlatformError> {
        debug!(title = ?request.title, "Creating agent session");
        let res = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        Self::read_session(res).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, PlatformError> {
        let res = self
            .client
            .get(self.session_url(session_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        Self::read_session(res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent_platform::ErrorClass;
    use crate::core::canned_http::serve_once;

    #[test]
    fn urls_ignore_trailing_slash_on_base() {
        let platform = HttpSessionPlatform::new("https://agents.example.dev/v1/", "key");
        assert_eq!(platform.sessions_url(), "https://agents.example.dev/v1/sessions");
        assert_eq!(
            platform.session_url("devin-42"),
            "https://agents.example.dev/v1/session/devin-42"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 on loopback is the discard service; nothing listens there in test sandboxes.
        let platform = HttpSessionPlatform::new("http://127.0.0.1:9", "key");
        let err = platform.get_session("abc").await.unwrap_err();
        assert!(matches!(err, PlatformError::Network(_)), "got {:?}", err);
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn get_session_sends_bearer_and_decodes_lenient_body() {
        let body = r#"{"session_id":"abc","status_enum":"running","pull_request":{}}"#;
        let (base, server) = serve_once(200, body).await;
        let platform = HttpSessionPlatform::new(format!("{}/v1", base), "key-123");

        let session = platform.get_session("abc").await.unwrap();
        assert_eq!(session.status_enum.as_deref(), Some("running"));
        assert!(session.pull_request.is_none());

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /v1/session/abc "), "got {}", request);
        assert!(request.contains("authorization: bearer key-123"));
    }

    #[tokio::test]
    async fn service_unavailable_is_transient_http_error() {
        let (base, server) = serve_once(503, "busy").await;
        let platform = HttpSessionPlatform::new(base, "key");

        let err = platform.get_session("abc").await.unwrap_err();
        match &err {
            PlatformError::Http { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
        assert_eq!(err.class(), ErrorClass::Transient);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn not_found_is_permanent() {
        let (base, server) = serve_once(404, r#"{"detail":"Session not found"}"#).await;
        let platform = HttpSessionPlatform::new(base, "key");

        let err = platform.get_session("missing").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.class(), ErrorClass::Permanent);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn garbage_success_body_is_a_decode_error() {
        let (base, server) = serve_once(200, "<html>upstream hiccup</html>").await;
        let platform = HttpSessionPlatform::new(base, "key");

        let err = platform.get_session("abc").await.unwrap_err();
        assert!(matches!(err, PlatformError::Decode(_)), "got {:?}", err);
        assert_eq!(err.class(), ErrorClass::Transient);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn create_session_posts_request_body() {
        let (base, server) = serve_once(200, r#"{"session_id":"new-1","url":"https://app.example.dev/new-1"}"#).await;
        let platform = HttpSessionPlatform::new(base, "key");
        let request = CreateSessionRequest {
            prompt: "Scope issue #4".into(),
            title: Some("Scope #4: Crash".into()),
            ..Default::default()
        };

        let session = platform.create_session(&request).await.unwrap();
        assert_eq!(session.session_id, "new-1");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /sessions "), "got {}", raw);
        assert!(raw.ends_with(r#"{"prompt":"Scope issue #4","title":"Scope #4: Crash"}"#));
    }
}
