// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! WebSocket upgrade admission under each origin policy.
//!
//! Rejected upgrades must fail at the HTTP layer with `403 Forbidden`
//! and never reach the hub.

use std::sync::Arc;

use signal_relay::hub::{Hub, HubConfig};
use signal_relay::origin::OriginPolicy;
use signal_relay::relay::{ServerOptions, start_server_with_hub};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, http::HeaderValue};

async fn start_relay(policy: OriginPolicy) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let hub = Arc::new(Hub::with_config(HubConfig {
        origin_policy: policy,
        ..HubConfig::default()
    }));
    start_server_with_hub("127.0.0.1:0", hub, ServerOptions::default())
        .await
        .expect("failed to start test relay")
}

/// Attempts an upgrade, optionally sending an `Origin` header, and returns
/// the HTTP status: 101 on success, the rejection status otherwise.
async fn upgrade_status(addr: std::net::SocketAddr, origin: Option<&'static str>) -> u16 {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static(origin));
    }

    match tokio_tungstenite::connect_async(request).await {
        Ok((_ws, response)) => response.status().as_u16(),
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected upgrade error: {e}"),
    }
}

#[tokio::test]
async fn loopback_policy_accepts_local_tools_without_origin() {
    let (addr, _handle) = start_relay(OriginPolicy::Loopback).await;
    assert_eq!(upgrade_status(addr, None).await, 101);
}

#[tokio::test]
async fn loopback_policy_accepts_local_pages() {
    let (addr, _handle) = start_relay(OriginPolicy::Loopback).await;
    assert_eq!(upgrade_status(addr, Some("http://localhost:3000")).await, 101);
    assert_eq!(upgrade_status(addr, Some("http://127.0.0.1:8080")).await, 101);
}

#[tokio::test]
async fn loopback_policy_rejects_foreign_origin() {
    let (addr, _handle) = start_relay(OriginPolicy::Loopback).await;
    assert_eq!(upgrade_status(addr, Some("https://evil.example")).await, 403);
}

#[tokio::test]
async fn allow_list_matches_exactly() {
    let policy = OriginPolicy::from_setting("https://app.example.com, https://staging.example.com");
    let (addr, _handle) = start_relay(policy).await;

    assert_eq!(upgrade_status(addr, Some("https://app.example.com")).await, 101);
    assert_eq!(upgrade_status(addr, Some("https://staging.example.com")).await, 101);
    assert_eq!(upgrade_status(addr, Some("https://app.example.com:8443")).await, 403);
    assert_eq!(upgrade_status(addr, Some("http://localhost:3000")).await, 403);
}

#[tokio::test]
async fn allow_all_accepts_any_origin() {
    let (addr, _handle) = start_relay(OriginPolicy::from_setting("*")).await;
    assert_eq!(upgrade_status(addr, Some("https://anywhere.example")).await, 101);
    assert_eq!(upgrade_status(addr, None).await, 101);
}
