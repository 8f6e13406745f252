//! Integration tests for device enrollment

use std::sync::Arc;

use rcgen::{DnType, ExtendedKeyUsagePurpose};

use device_trust::enrollment::{
    refresh, EnrollmentInputs, EnrollmentSource, HelperStatus, StaticAppSettings,
};
use device_trust::helper::FixedHelperLocator;
use device_trust::policy::{InMemoryPolicySource, PolicyScope, PolicySource};
use device_trust::store::InMemoryCertificateStore;
use device_trust::{
    CertificateSelectionPolicy, DeviceEnrollmentResolver, DeviceEnrollmentState,
};

use super::{endpoint_verification_cert, TestCa};

fn enabled(selector: Option<&str>) -> Arc<StaticAppSettings> {
    Arc::new(StaticAppSettings {
        device_certificate_authentication: true,
        device_certificate_selector: selector.map(str::to_string),
    })
}

fn policy(machine: &[(&str, &str)], user: &[(&str, &str)]) -> CertificateSelectionPolicy {
    let machine = machine
        .iter()
        .fold(InMemoryPolicySource::new(PolicyScope::Machine), |s, (n, v)| {
            s.with_value(*n, *v)
        });
    let user = user
        .iter()
        .fold(InMemoryPolicySource::new(PolicyScope::User), |s, (n, v)| {
            s.with_value(*n, *v)
        });
    CertificateSelectionPolicy::from_sources([
        &machine as &dyn PolicySource,
        &user as &dyn PolicySource,
    ])
}

#[test]
fn test_endpoint_verification_certificate_enrolls() {
    let cert = endpoint_verification_cert();
    let store = InMemoryCertificateStore::new().with_user_certificate(cert.clone());

    let resolver =
        DeviceEnrollmentResolver::new(enabled(None), CertificateSelectionPolicy::empty(), Arc::new(store));
    let result = resolver.refresh().unwrap();

    assert_eq!(result.state(), DeviceEnrollmentState::Enrolled);
    assert_eq!(result.certificate(), Some(&cert));
    assert_eq!(result.source(), Some(EnrollmentSource::DefaultSelector));
}

#[test]
fn test_default_selector_ignores_machine_store() {
    let store = InMemoryCertificateStore::new().with_machine_certificate(endpoint_verification_cert());

    let resolver =
        DeviceEnrollmentResolver::new(enabled(None), CertificateSelectionPolicy::empty(), Arc::new(store));
    assert_eq!(
        resolver.refresh().unwrap().state(),
        DeviceEnrollmentState::NotEnrolled
    );
}

#[test]
fn test_enterprise_policy_selects_machine_certificate() {
    let ca = TestCa::new("Corp Device CA");
    let machine_cert = ca.client_cert("device-7.corp.example");
    let store = InMemoryCertificateStore::new()
        .with_machine_certificate(machine_cert.clone())
        .with_user_certificate(ca.client_cert("alice"));

    let policy = policy(
        &[(
            "1",
            r#"{"pattern":"https://[*.]googleapis.com","filter":{"ISSUER":{"CN":"Corp Device CA"}}}"#,
        )],
        &[],
    );

    let resolver = DeviceEnrollmentResolver::new(enabled(None), policy, Arc::new(store));
    let result = resolver.refresh().unwrap();
    assert_eq!(result.state(), DeviceEnrollmentState::Enrolled);
    assert_eq!(result.certificate(), Some(&machine_cert));
    assert_eq!(result.source(), Some(EnrollmentSource::EnterprisePolicy));
}

#[test]
fn test_custom_selector_uses_subject_filter() {
    let ca = TestCa::new("Corp Device CA");
    let wanted = ca.issue(
        &[
            (DnType::CommonName, "laptop-3"),
            (DnType::OrganizationName, "Acme"),
        ],
        vec![ExtendedKeyUsagePurpose::ClientAuth],
    );
    let store = InMemoryCertificateStore::new()
        .with_machine_certificate(ca.client_cert("laptop-3"))
        .with_user_certificate(wanted.clone());

    let selector = r#"{'pattern': '*', 'filter': {'SUBJECT': {'CN': 'laptop-3', 'O': 'Acme'}}}"#;
    let resolver = DeviceEnrollmentResolver::new(
        enabled(Some(selector)),
        CertificateSelectionPolicy::empty(),
        Arc::new(store),
    );

    let result = resolver.refresh().unwrap();
    assert_eq!(result.certificate(), Some(&wanted));
    assert_eq!(result.source(), Some(EnrollmentSource::CustomSelector));
}

#[test]
fn test_server_auth_certificates_are_not_candidates() {
    let ca = TestCa::new(super::ENDPOINT_VERIFICATION);
    let server_cert = ca.issue(
        &[(DnType::CommonName, super::ENDPOINT_VERIFICATION)],
        vec![ExtendedKeyUsagePurpose::ServerAuth],
    );
    let store = InMemoryCertificateStore::new().with_user_certificate(server_cert);

    let resolver =
        DeviceEnrollmentResolver::new(enabled(None), CertificateSelectionPolicy::empty(), Arc::new(store));
    assert_eq!(
        resolver.refresh().unwrap().state(),
        DeviceEnrollmentState::NotEnrolled
    );
}

#[test]
fn test_refresh_is_idempotent() {
    let ca = TestCa::new("Corp Device CA");
    let store = InMemoryCertificateStore::new()
        .with_machine_certificate(ca.client_cert("device-1"))
        .with_user_certificate(endpoint_verification_cert());
    let settings = StaticAppSettings {
        device_certificate_authentication: true,
        device_certificate_selector: None,
    };
    let policy = policy(&[], &[("1", r#"{"pattern":"*"}"#)]);

    let inputs = EnrollmentInputs {
        settings: &settings,
        policy: &policy,
        store: &store,
    };
    let first = refresh(&inputs).unwrap();
    let second = refresh(&inputs).unwrap();

    assert_eq!(first.state(), second.state());
    assert_eq!(first.certificate(), second.certificate());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_helper_reports_not_installed() {
    let store = InMemoryCertificateStore::new().with_user_certificate(endpoint_verification_cert());
    let resolver =
        DeviceEnrollmentResolver::new(enabled(None), CertificateSelectionPolicy::empty(), Arc::new(store))
            .with_helper(
                Arc::new(FixedHelperLocator::new("/nonexistent/device-trust-native-helper")),
                None,
                None,
            );

    let report = resolver.refresh_with_helper("alice@example.com").await.unwrap();
    assert_eq!(report.enrollment.state(), DeviceEnrollmentState::Enrolled);
    assert_eq!(report.helper, HelperStatus::NotInstalled);
}

#[tokio::test]
async fn test_disabled_skips_helper() {
    let settings = Arc::new(StaticAppSettings::default());
    let resolver = DeviceEnrollmentResolver::new(
        settings,
        CertificateSelectionPolicy::empty(),
        Arc::new(InMemoryCertificateStore::new()),
    )
    .with_helper(Arc::new(FixedHelperLocator::not_installed()), None, None);

    let report = resolver.refresh_with_helper("alice@example.com").await.unwrap();
    assert_eq!(report.enrollment.state(), DeviceEnrollmentState::Disabled);
    assert_eq!(report.helper, HelperStatus::Skipped);
}
