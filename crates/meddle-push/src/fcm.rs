//! FCM HTTP v1 client: one authenticated `messages:send` call per device.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::auth::{AccessTokenSource, ServiceAccountKey};
use crate::dispatcher::PushProvider;
use crate::error::DispatchError;
use crate::message::{MulticastMessage, SendRequest};

/// Configuration for the push provider endpoint.
#[derive(Debug, Clone)]
pub struct FcmConfig {
    /// API base URL; the project path is appended.
    pub endpoint: String,
    /// Firebase project. Falls back to the service account's project.
    pub project_id: Option<String>,
    /// Service account key file used to mint bearer tokens.
    pub credentials: Option<PathBuf>,
    /// Transport timeout for one request.
    pub timeout: Duration,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://fcm.googleapis.com".to_string(),
            project_id: None,
            credentials: None,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct FcmClient {
    http: Client,
    send_url: Option<String>,
    tokens: Option<AccessTokenSource>,
}

impl FcmClient {
    /// Loads the configured key file, if any.
    pub fn new(config: FcmConfig) -> Result<Self, DispatchError> {
        let key = config
            .credentials
            .as_deref()
            .map(ServiceAccountKey::from_file)
            .transpose()?;
        Self::with_key(config, key)
    }

    pub fn with_key(
        config: FcmConfig,
        key: Option<ServiceAccountKey>,
    ) -> Result<Self, DispatchError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        let project_id = config
            .project_id
            .or_else(|| key.as_ref().and_then(|k| k.project_id.clone()));
        let send_url = project_id.map(|project| {
            format!(
                "{}/v1/projects/{}/messages:send",
                config.endpoint.trim_end_matches('/'),
                project
            )
        });

        let tokens = key
            .map(|key| AccessTokenSource::new(http.clone(), key))
            .transpose()?;
        if let (Some(url), Some(tokens)) = (&send_url, &tokens) {
            info!(url = %url, account = tokens.client_email(), "FCM client ready");
        }

        Ok(Self {
            http,
            send_url,
            tokens,
        })
    }

    /// Both a project and credentials are known.
    pub fn is_configured(&self) -> bool {
        self.send_url.is_some() && self.tokens.is_some()
    }

    async fn send_one(
        &self,
        url: &str,
        bearer: &str,
        request: &SendRequest<'_>,
    ) -> Result<(), DispatchError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PushProvider for FcmClient {
    /// Every token is attempted; the first failure is reported with a count.
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<(), DispatchError> {
        let (Some(url), Some(tokens)) = (&self.send_url, &self.tokens) else {
            return Err(DispatchError::Config(
                "FCM project id or service account credentials missing".into(),
            ));
        };
        let bearer = tokens.token().await?;

        let total = message.tokens.len();
        let mut failed = 0;
        let mut first = None;
        for token in &message.tokens {
            if let Err(e) = self.send_one(url, &bearer, &message.for_token(token)).await {
                debug!("Delivery to one device failed: {}", e);
                failed += 1;
                first.get_or_insert(e);
            }
        }

        match first {
            None => Ok(()),
            Some(first) => Err(DispatchError::Undelivered {
                failed,
                total,
                first: Box::new(first),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, Uri, header};
    use axum::response::{IntoResponse, Response};
    use meddle_types::NotificationPayload;
    use serde_json::{Value, json};

    const KEY_JSON: &str = include_str!("../testdata/service-account.json");

    #[derive(Debug, Clone)]
    struct Seen {
        path: String,
        authorization: Option<String>,
        body: String,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    /// Stands in for both the token endpoint and `messages:send`. A message
    /// addressed to `stale` is answered 404.
    async fn fake_google(
        State(log): State<Log>,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        log.lock().unwrap().push(Seen {
            path: uri.path().to_string(),
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: body.clone(),
        });

        if uri.path() == "/token" {
            let grant = json!({
                "access_token": "ya29.test",
                "expires_in": 3599,
                "token_type": "Bearer",
            });
            return axum::Json(grant).into_response();
        }
        if body.contains("\"stale\"") {
            return (StatusCode::NOT_FOUND, "UNREGISTERED").into_response();
        }
        axum::Json(json!({ "name": "projects/meddle-test/messages/1" })).into_response()
    }

    async fn serve() -> (String, Log) {
        let log = Log::default();
        let app = Router::new().fallback(fake_google).with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), log)
    }

    fn client(base: &str) -> FcmClient {
        let mut key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        key.token_uri = format!("{}/token", base);
        let config = FcmConfig {
            endpoint: base.to_string(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        FcmClient::with_key(config, Some(key)).unwrap()
    }

    fn message(tokens: &[&str]) -> MulticastMessage {
        let payload = NotificationPayload {
            title: "Levothyroxine".into(),
            body: "'Levothyroxine' is due".into(),
            data: HashMap::new(),
            click_action: "/user/medication/id?=4".into(),
        };
        MulticastMessage::build(tokens.iter().map(|t| t.to_string()).collect(), &payload, None)
    }

    #[tokio::test]
    async fn sends_one_authorized_v1_request_per_token() {
        let (base, log) = serve().await;
        let client = client(&base);
        assert!(client.is_configured());

        client.send_multicast(&message(&["dev-a", "dev-b"])).await.unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].path, "/token");
        let grant_type = "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";
        assert!(seen[0].body.contains(grant_type));
        assert!(seen[0].body.contains("assertion="));

        for (sent, token) in seen[1..].iter().zip(["dev-a", "dev-b"]) {
            assert_eq!(sent.path, "/v1/projects/meddle-test/messages:send");
            assert_eq!(sent.authorization.as_deref(), Some("Bearer ya29.test"));
            let body: Value = serde_json::from_str(&sent.body).unwrap();
            assert_eq!(body["message"]["token"], token);
            assert_eq!(body["message"]["notification"]["title"], "Levothyroxine");
            assert!(body.get("registration_ids").is_none());
        }
    }

    #[tokio::test]
    async fn bearer_token_is_fetched_once() {
        let (base, log) = serve().await;
        let client = client(&base);

        client.send_multicast(&message(&["dev-a"])).await.unwrap();
        client.send_multicast(&message(&["dev-a"])).await.unwrap();

        let token_calls = log.lock().unwrap().iter().filter(|s| s.path == "/token").count();
        assert_eq!(token_calls, 1);
    }

    #[tokio::test]
    async fn every_token_is_tried_and_failures_counted() {
        let (base, log) = serve().await;
        let client = client(&base);

        let err = client
            .send_multicast(&message(&["stale", "dev-b", "stale"]))
            .await
            .unwrap_err();

        match err {
            DispatchError::Undelivered {
                failed,
                total,
                first,
            } => {
                assert_eq!((failed, total), (2, 3));
                assert!(matches!(*first, DispatchError::Rejected { status: 404, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        let sends = log.lock().unwrap().iter().filter(|s| s.path != "/token").count();
        assert_eq!(sends, 3);
    }

    #[tokio::test]
    async fn missing_project_or_key_fails_without_a_request() {
        let no_key = FcmClient::with_key(
            FcmConfig {
                project_id: Some("meddle-test".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert!(!no_key.is_configured());
        assert!(matches!(
            no_key.send_multicast(&message(&["dev-a"])).await,
            Err(DispatchError::Config(_))
        ));

        let mut key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        key.project_id = None;
        let no_project = FcmClient::with_key(FcmConfig::default(), Some(key)).unwrap();
        assert!(!no_project.is_configured());
    }
}
