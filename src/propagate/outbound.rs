//! Outbound Hello/Notify calls to dependent instances.
//!
//! This is an external RPC transport collaborator the core never owns
//! directly; `OutboundRpc` is the interface the core consumes, with an
//! HTTP implementation as the default adapter.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::ServiceInstance;

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(1);

#[async_trait]
pub trait OutboundRpc: Send + Sync {
    /// No-argument liveness probe. `Ok(())` iff the target replied `"ok"`
    /// (case-insensitive) within the 1s deadline.
    async fn hello(&self, addr: &str) -> Result<()>;
    /// Delivers the changed record. `Ok(())` iff the target accepted it
    /// within the 1s deadline.
    async fn notify(&self, addr: &str, instance: &ServiceInstance) -> Result<()>;
}

pub struct HttpOutboundRpc {
    client: reqwest::Client,
}

impl HttpOutboundRpc {
    pub fn new() -> Self {
        let client = reqwest::Client::builder().timeout(OUTBOUND_TIMEOUT).build().expect("failed to build http client");
        Self { client }
    }
}

impl Default for HttpOutboundRpc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboundRpc for HttpOutboundRpc {
    async fn hello(&self, addr: &str) -> Result<()> {
        let url = format!("http://{addr}/hello");
        let response = self.client.get(&url).send().await.map_err(|e| Error::OutboundRpc(e.to_string()))?;
        let body = response.text().await.map_err(|e| Error::OutboundRpc(e.to_string()))?;
        if body.trim().eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(Error::OutboundRpc(format!("unexpected hello reply from {addr}: {body}")))
        }
    }

    async fn notify(&self, addr: &str, instance: &ServiceInstance) -> Result<()> {
        let url = format!("http://{addr}/notify");
        let response = self.client.post(&url).json(instance).send().await.map_err(|e| Error::OutboundRpc(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::OutboundRpc(format!("notify to {addr} returned {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectMode, Status};
    use std::collections::BTreeSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn instance(addr: &str) -> ServiceInstance {
        ServiceInstance {
            addr: addr.into(),
            host_name: "host".into(),
            status: Status::Online,
            service_type: 5,
            semver: "1.0.0".into(),
            service_weight: 1,
            connect_mode: ConnectMode::DirectRpc,
            group_tab: "g1".into(),
            service_name: "svc".into(),
            nickname: "nick".into(),
            rely_list: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn hello_accepts_case_insensitive_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/hello")).respond_with(ResponseTemplate::new(200).set_body_string("OK")).mount(&server).await;

        let rpc = HttpOutboundRpc::new();
        let addr = server.address().to_string();
        rpc.hello(&addr).await.unwrap();
    }

    #[tokio::test]
    async fn hello_rejects_other_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/hello")).respond_with(ResponseTemplate::new(200).set_body_string("nope")).mount(&server).await;

        let rpc = HttpOutboundRpc::new();
        let addr = server.address().to_string();
        assert!(rpc.hello(&addr).await.is_err());
    }

    #[tokio::test]
    async fn notify_delivers_serialized_instance() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/notify")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let rpc = HttpOutboundRpc::new();
        let addr = server.address().to_string();
        rpc.notify(&addr, &instance("a")).await.unwrap();
    }
}
