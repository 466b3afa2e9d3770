use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ProjectConfig, WEBHOOK_PLATFORM, WebhookConfig};
use crate::content::{Content, PublishOutcome};
use crate::error::{PressError, Result};
use crate::registry::PublisherPlugin;

/// Publishes by POSTing the content as JSON to a configured endpoint.
pub struct WebhookPlugin {
    config: WebhookConfig,
    client: Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    project_id: &'a str,
    #[serde(flatten)]
    content: &'a Content,
}

/// Accepted shapes of a 2xx reply. Every field is optional; an empty body
/// counts as success.
#[derive(Debug, Default, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl WebhookPlugin {
    pub fn new(config: WebhookConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .user_agent(concat!("presswright/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        let request = self
            .config
            .headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name, value));
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}

#[async_trait]
impl PublisherPlugin for WebhookPlugin {
    fn platform(&self) -> &str {
        WEBHOOK_PLATFORM
    }

    async fn authenticate(&self) -> Result<()> {
        let Some(verify_url) = &self.config.verify_url else {
            debug!(url = %self.config.url, "webhook has no verify_url, skipping credential check");
            return Ok(());
        };

        let response = self.with_auth(self.client.get(verify_url)).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = error_body(response).await;
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(PressError::Authentication {
                platform: WEBHOOK_PLATFORM.to_string(),
                message: format!("{status}: {message}"),
            });
        }
        Err(PressError::Status {
            service: "webhook verify".to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn publish(&self, content: &Content, project: &ProjectConfig) -> Result<PublishOutcome> {
        let payload = WebhookPayload {
            project_id: &project.id,
            content,
        };
        let response = self
            .with_auth(self.client.post(&self.config.url))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PressError::Status {
                service: "webhook".to_string(),
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let body = response.text().await?;
        let reply: WebhookReply = if body.trim().is_empty() {
            WebhookReply::default()
        } else {
            serde_json::from_str(&body).unwrap_or_default()
        };

        if reply.success == Some(false) {
            let error = reply
                .error
                .or(reply.message)
                .unwrap_or_else(|| "endpoint reported failure".to_string());
            return Ok(PublishOutcome::rejected(error));
        }

        let url = reply.url.unwrap_or_else(|| self.config.url.clone());
        info!(project_id = %project.id, url = %url, "webhook accepted content");
        let outcome = PublishOutcome::published(url);
        Ok(match reply.message {
            Some(message) => outcome.with_message(message),
            None => outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::content::Metadata;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn webhook(server: &MockServer, token: Option<&str>, verify: bool) -> WebhookConfig {
        WebhookConfig {
            url: format!("{}/hook", server.uri()),
            token: token.map(str::to_string),
            verify_url: verify.then(|| format!("{}/verify", server.uri())),
            headers: [("X-Site".to_string(), "garden".to_string())].into(),
        }
    }

    fn content() -> Content {
        Content {
            title: "Composting at home".into(),
            body: "## Why\nBecause.".into(),
            media: vec![],
            metadata: Metadata {
                tags: vec!["compost".into()],
                ..Metadata::default()
            },
        }
    }

    fn project(config: &WebhookConfig) -> ProjectConfig {
        ProjectConfig::new("garden", PlatformConfig::Webhook(config.clone()))
    }

    #[tokio::test]
    async fn publish_posts_content_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer s3cret"))
            .and(header("x-site", "garden"))
            .and(body_partial_json(serde_json::json!({
                "project_id": "garden",
                "title": "Composting at home",
                "metadata": {"tags": ["compost"]}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "url": "https://garden.example/composting",
                "message": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = webhook(&server, Some("s3cret"), false);
        let plugin = WebhookPlugin::new(config.clone(), Duration::from_secs(5)).unwrap();
        let outcome = plugin.publish(&content(), &project(&config)).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.url.as_deref(), Some("https://garden.example/composting"));
        assert_eq!(outcome.message.as_deref(), Some("created"));
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_endpoint_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let config = webhook(&server, None, false);
        let plugin = WebhookPlugin::new(config.clone(), Duration::from_secs(5)).unwrap();
        let outcome = plugin.publish(&content(), &project(&config)).await.unwrap();
        assert_eq!(outcome.url, Some(config.url));
    }

    #[tokio::test]
    async fn reported_failure_is_a_rejected_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "duplicate slug"
            })))
            .mount(&server)
            .await;

        let config = webhook(&server, None, false);
        let plugin = WebhookPlugin::new(config.clone(), Duration::from_secs(5)).unwrap();
        let outcome = plugin.publish(&content(), &project(&config)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("duplicate slug"));
    }

    #[tokio::test]
    async fn unauthorized_publish_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let config = webhook(&server, Some("old"), false);
        let plugin = WebhookPlugin::new(config.clone(), Duration::from_secs(5)).unwrap();
        let err = plugin.publish(&content(), &project(&config)).await.unwrap_err();
        assert!(matches!(err, PressError::Status { status: 401, .. }));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = webhook(&server, None, false);
        let plugin = WebhookPlugin::new(config.clone(), Duration::from_secs(5)).unwrap();
        let err = plugin.publish(&content(), &project(&config)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn authenticate_checks_verify_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/verify"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let ok = WebhookPlugin::new(webhook(&server, Some("good"), true), Duration::from_secs(5))
            .unwrap();
        ok.authenticate().await.unwrap();

        let bad = WebhookPlugin::new(webhook(&server, Some("bad"), true), Duration::from_secs(5))
            .unwrap();
        let err = bad.authenticate().await.unwrap_err();
        assert!(matches!(err, PressError::Authentication { .. }));
    }

    #[tokio::test]
    async fn authenticate_without_verify_url_succeeds() {
        let server = MockServer::start().await;
        let plugin =
            WebhookPlugin::new(webhook(&server, None, false), Duration::from_secs(5)).unwrap();
        plugin.authenticate().await.unwrap();
    }
}
