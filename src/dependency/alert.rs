//! Outbound webhook alert delivery. Shared by the dependency monitor
//! (§4.G, missing-provider alerts) and the change propagator (§4.F,
//! "registered"/"online"/"offline" human-readable alerts).

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};

#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result<()>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    body: &'a str,
}

pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: String) -> Self {
        Self { client: reqwest::Client::new(), url }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn send(&self, title: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { title, body })
            .send()
            .await
            .map_err(|e| Error::OutboundRpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::OutboundRpc(format!("webhook returned {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn delivers_title_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let alerter = WebhookAlerter::new(format!("{}/hook", server.uri()));
        alerter.send("svc-服务缺失", "no online provider").await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let alerter = WebhookAlerter::new(format!("{}/hook", server.uri()));
        let result = alerter.send("title", "body").await;
        assert!(result.is_err());
    }
}
