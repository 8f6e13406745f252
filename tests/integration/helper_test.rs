//! Integration tests for the native helper protocol
//!
//! The helper side runs as a task on the other end of an in-memory pipe and
//! speaks the length-prefixed JSON framing.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::duplex;

use device_trust::enrollment::{HelperStatus, StaticAppSettings};
use device_trust::helper::framing::{read_message, write_message, MAX_MESSAGE_SIZE};
use device_trust::helper::{HelperTransport, NativeHelperClient};
use device_trust::store::InMemoryCertificateStore;
use device_trust::{CertificateSelectionPolicy, DeviceEnrollmentResolver, DeviceTrustError};

use super::endpoint_verification_cert;

/// A helper that answers over a framed pipe.
struct PipeHelper {
    version: &'static str,
    should_enroll: bool,
    fail_with: Option<&'static str>,
}

impl PipeHelper {
    fn new(version: &'static str, should_enroll: bool) -> Self {
        Self {
            version,
            should_enroll,
            fail_with: None,
        }
    }

    fn answer(&self, request: &Value) -> Value {
        let result = match request["type"].as_str() {
            Some("ping") => json!({ "version": self.version }),
            Some("shouldEnrollDevice") => json!({ "shouldEnroll": self.should_enroll }),
            Some("deviceInfo") => json!({ "attributes": { "serialNumber": "C02XYZ" } }),
            _ => Value::Null,
        };
        json!({
            "commandId": request["commandId"],
            "protocolVersion": 1,
            "error": self.fail_with,
            "result": result,
        })
    }
}

#[async_trait]
impl HelperTransport for PipeHelper {
    async fn round_trip(&self, request: &[u8]) -> io::Result<Vec<u8>> {
        let (mut client, mut server) = duplex(MAX_MESSAGE_SIZE + 4);

        write_message(&mut client, request).await?;
        let received = read_message(&mut server).await?;
        let request: Value = serde_json::from_slice(&received)?;

        let response = serde_json::to_vec(&self.answer(&request))?;
        write_message(&mut server, &response).await?;
        read_message(&mut client).await
    }
}

#[tokio::test]
async fn test_ping_and_should_enroll() {
    let client = NativeHelperClient::new(PipeHelper::new("2.4.1", true));

    assert_eq!(client.ping().await.unwrap(), "2.4.1");
    assert!(client.should_enroll_device("alice@example.com").await.unwrap());

    let info = client.device_info(&["serialNumber"]).await.unwrap();
    assert_eq!(info.get("serialNumber").map(String::as_str), Some("C02XYZ"));
}

#[tokio::test]
async fn test_helper_error_is_protocol_error() {
    let helper = PipeHelper {
        fail_with: Some("user unknown"),
        ..PipeHelper::new("2.4.1", false)
    };
    let client = NativeHelperClient::new(helper);

    match client.should_enroll_device("mallory").await {
        Err(DeviceTrustError::HelperProtocol { command_id, message }) => {
            assert_eq!(command_id, 1);
            assert!(message.contains("user unknown"));
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_old_helper_is_unavailable() {
    let client = NativeHelperClient::new(PipeHelper::new("1.9", true))
        .with_min_version("2.0.0")
        .unwrap();

    let err = client.availability().await.unwrap_err();
    assert!(err.is_helper_unavailable());
}

#[tokio::test]
async fn test_four_component_versions_compare() {
    let client = NativeHelperClient::new(PipeHelper::new("2.1.0.17", true))
        .with_min_version("2.1")
        .unwrap();

    assert_eq!(client.availability().await.unwrap(), "2.1.0.17");
}

#[tokio::test]
async fn test_refresh_with_helper_advice() {
    let store = InMemoryCertificateStore::new().with_user_certificate(endpoint_verification_cert());
    let resolver = DeviceEnrollmentResolver::new(
        Arc::new(StaticAppSettings {
            device_certificate_authentication: true,
            device_certificate_selector: None,
        }),
        CertificateSelectionPolicy::empty(),
        Arc::new(store),
    );

    let client = NativeHelperClient::new(PipeHelper::new("3.0", false));
    let report = resolver
        .refresh_with_client(Some(&client), "alice@example.com")
        .await
        .unwrap();

    assert_eq!(
        report.helper,
        HelperStatus::Installed {
            version: "3.0".to_string(),
            should_enroll: false,
        }
    );
    assert!(report.enrollment.certificate().is_some());
}

#[tokio::test]
async fn test_refresh_with_old_helper() {
    let resolver = DeviceEnrollmentResolver::new(
        Arc::new(StaticAppSettings {
            device_certificate_authentication: true,
            device_certificate_selector: None,
        }),
        CertificateSelectionPolicy::empty(),
        Arc::new(InMemoryCertificateStore::new()),
    );

    let client = NativeHelperClient::new(PipeHelper::new("0.9", true))
        .with_min_version("1.0")
        .unwrap();
    let report = resolver
        .refresh_with_client(Some(&client), "alice@example.com")
        .await
        .unwrap();

    assert_eq!(report.helper, HelperStatus::NotInstalled);
}
