//! Integration tests for configuration-driven resolution

use std::sync::Arc;

use tempfile::TempDir;

use device_trust::config::SettingSource;
use device_trust::endpoint::well_known;
use device_trust::enrollment::{EnrollmentSource, HelperStatus};
use device_trust::store::InMemoryCertificateStore;
use device_trust::{
    CanonicalServiceEndpoint, ConfigLoader, DeviceEnrollmentState, EndpointType,
    TransportDirectionsBuilder,
};

use super::{write_pem, TestCa};

const CONFIG: &str = r#"
[access]
device_certificate_authentication = false

[[access.psc_overrides]]
canonical_host = "compute.googleapis.com"
psc_host = "compute.p.googleapis.com"

[machine_policy]
device_certificate_authentication = true

[policy.machine]
1 = '{"pattern":"https://[*.]googleapis.com","filter":{"ISSUER":{"CN":"Corp Device CA"}}}'

[helper]
executable = "/nonexistent/device-trust-native-helper"
min_version = "1.0"
"#;

fn load(dir: &TempDir) -> device_trust::DeviceTrustConfig {
    let path = dir.path().join("device-trust.toml");
    std::fs::write(&path, CONFIG).unwrap();
    ConfigLoader::new().with_path(&path).load().unwrap()
}

#[tokio::test]
async fn test_config_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = load(&dir);

    let settings = config.access_settings();
    assert!(settings.device_certificate_authentication.value);
    assert_eq!(
        settings.device_certificate_authentication.source,
        SettingSource::MachinePolicy
    );

    let cert = TestCa::new("Corp Device CA").client_cert("device-9");
    let store = InMemoryCertificateStore::new().with_machine_certificate(cert.clone());

    let resolver = config.enrollment_resolver(Arc::new(store));
    let report = resolver.refresh_with_helper("alice@example.com").await.unwrap();
    assert_eq!(report.enrollment.state(), DeviceEnrollmentState::Enrolled);
    assert_eq!(report.enrollment.source(), Some(EnrollmentSource::EnterprisePolicy));
    assert_eq!(report.helper, HelperStatus::NotInstalled);

    let compute = CanonicalServiceEndpoint::parse(well_known::COMPUTE).unwrap();
    let oauth2 = CanonicalServiceEndpoint::parse(well_known::OAUTH2).unwrap();
    let endpoints = config.endpoint_resolver(&well_known::all()).unwrap();

    let resolved = endpoints.resolve_endpoint(&compute, report.enrollment.state());
    assert_eq!(resolved.endpoint_type(), EndpointType::PrivateServiceConnect);
    assert_eq!(resolved.host(), "compute.p.googleapis.com");

    let resolved = endpoints.resolve_endpoint(&oauth2, report.enrollment.state());
    assert_eq!(resolved.endpoint_type(), EndpointType::MutualTls);
    assert_eq!(resolved.host(), "oauth2.mtls.googleapis.com");

    // A per-service override does not change the route.
    let directions = TransportDirectionsBuilder::build(
        &settings.route(),
        &report.enrollment,
        resolved,
    );
    assert!(!directions.bypass_proxy);
    assert_eq!(directions.client_certificate, Some(cert));
}

#[test]
fn test_policy_disabled_overrides_user_setting() {
    let config = ConfigLoader::new()
        .load_from_str(
            r#"
[access]
device_certificate_authentication = true

[user_policy]
device_certificate_authentication = false
"#,
        )
        .unwrap();

    let resolver = config.enrollment_resolver(Arc::new(InMemoryCertificateStore::new()));
    assert_eq!(
        resolver.refresh().unwrap().state(),
        DeviceEnrollmentState::Disabled
    );
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        "[[access.psc_overrides]]\ncanonical_host = \"compute.googleapis.com\"\npsc_host = \"bad host\"\n",
    )
    .unwrap();

    let err = ConfigLoader::new().with_path(&path).load().unwrap_err();
    assert!(err.to_string().contains("psc_host"));

    let config = ConfigLoader::new()
        .with_path(&path)
        .with_validate(false)
        .load()
        .unwrap();
    assert!(config.endpoint_resolver(&[]).is_err());
}

#[test]
fn test_corrupt_policy_entries_do_not_block_enrollment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("device-trust.toml");
    std::fs::write(
        &path,
        r#"
[access]
device_certificate_authentication = true
device_certificate_selector = "{asd'"

[policy.machine]
junk = '{"pattern":"*"}'
2 = "{asd'"
3 = '{"pattern":"https://[*.]googleapis.com","filter":{"ISSUER":{"CN":"Corp Device CA"}}}'
"#,
    )
    .unwrap();

    let config = ConfigLoader::new().with_path(&path).load().unwrap();
    assert_eq!(config.warnings().len(), 3);

    let cert = TestCa::new("Corp Device CA").client_cert("device-11");
    let store = InMemoryCertificateStore::new().with_machine_certificate(cert.clone());
    let result = config.enrollment_resolver(Arc::new(store)).refresh().unwrap();

    assert_eq!(result.state(), DeviceEnrollmentState::Enrolled);
    assert_eq!(result.source(), Some(EnrollmentSource::EnterprisePolicy));
    assert_eq!(result.certificate(), Some(&cert));
}

#[test]
fn test_pem_certificate_file_loads() {
    let dir = TempDir::new().unwrap();
    let cert = TestCa::new("Corp Device CA").client_cert("device-10");
    let path = write_pem(dir.path(), "device.pem", &cert);

    let pem = std::fs::read_to_string(path).unwrap();
    let loaded = device_trust::Certificate::from_pem(&pem).unwrap();
    assert_eq!(loaded, cert);
    assert_eq!(loaded.thumbprint(), cert.thumbprint());
}
