//! Integration tests for endpoint resolution and transport directions

use device_trust::endpoint::well_known;
use device_trust::enrollment::EnrollmentSource;
use device_trust::{
    CanonicalServiceEndpoint, DeviceEnrollmentState, EndpointType, EnrollmentResult,
    ServiceEndpointResolver, ServiceRoute, TransportDirectionsBuilder,
};

use super::TestCa;

fn compute() -> CanonicalServiceEndpoint {
    CanonicalServiceEndpoint::parse(well_known::COMPUTE).expect("valid endpoint")
}

#[test]
fn test_enrolled_compute_uses_mtls() {
    let resolved =
        ServiceEndpointResolver::new().resolve_endpoint(&compute(), DeviceEnrollmentState::Enrolled);

    assert_eq!(resolved.host(), "compute.mtls.googleapis.com");
    assert_eq!(resolved.endpoint_type(), EndpointType::MutualTls);
}

#[test]
fn test_psc_override_wins_over_mtls() {
    let mut resolver = ServiceEndpointResolver::new();
    resolver
        .add_private_service_endpoint("compute.googleapis.com", "compute.p.googleapis.com")
        .unwrap();

    let resolved = resolver.resolve_endpoint(&compute(), DeviceEnrollmentState::Enrolled);
    assert_eq!(resolved.host(), "compute.p.googleapis.com");
    assert_eq!(resolved.endpoint_type(), EndpointType::PrivateServiceConnect);
}

#[test]
fn test_host_case_is_normalized() {
    let canonical = CanonicalServiceEndpoint::parse("https://OSLogin.GoogleAPIs.com/v1/").unwrap();
    let resolver = ServiceEndpointResolver::new();

    let tls = resolver.resolve_endpoint(&canonical, DeviceEnrollmentState::NotEnrolled);
    assert_eq!(tls.host(), "oslogin.googleapis.com");

    let mtls = resolver.resolve_endpoint(&canonical, DeviceEnrollmentState::Enrolled);
    assert_eq!(mtls.host(), "oslogin.mtls.googleapis.com");
    assert_eq!(mtls.uri().path(), "/v1/");
}

#[test]
fn test_psc_route_applies_to_all_well_known_endpoints() {
    let endpoints = well_known::all();
    let mut resolver = ServiceEndpointResolver::new();
    resolver
        .apply_route(&ServiceRoute::psc("psc.corp.internal"), &endpoints)
        .unwrap();

    assert_eq!(resolver.overrides().len(), endpoints.len());
    for endpoint in &endpoints {
        let resolved = resolver.resolve_endpoint(endpoint, DeviceEnrollmentState::Disabled);
        assert_eq!(resolved.endpoint_type(), EndpointType::PrivateServiceConnect);
        assert_eq!(resolved.host(), "psc.corp.internal");
        assert_eq!(resolved.uri().path(), endpoint.tls_uri().path());
    }
}

#[test]
fn test_transport_directions_for_psc_and_enrolled() {
    let certificate = TestCa::new("Corp CA").client_cert("device-42");
    let enrollment = EnrollmentResult::enrolled(certificate.clone(), EnrollmentSource::EnterprisePolicy);
    let route = ServiceRoute::psc("compute.p.googleapis.com");

    let mut resolver = ServiceEndpointResolver::new();
    resolver.apply_route(&route, &[compute()]).unwrap();
    let resolved = resolver.resolve_endpoint(&compute(), enrollment.state());

    let directions = TransportDirectionsBuilder::build(&route, &enrollment, resolved);
    assert!(directions.bypass_proxy);
    assert!(directions.attach_client_certificate);
    assert_eq!(directions.client_certificate.as_ref(), Some(&certificate));
    assert_eq!(
        directions.endpoint.endpoint_type(),
        EndpointType::PrivateServiceConnect
    );
}

#[test]
fn test_transport_directions_for_public_not_enrolled() {
    let enrollment = EnrollmentResult::not_enrolled();
    let resolved =
        ServiceEndpointResolver::new().resolve_endpoint(&compute(), enrollment.state());

    let directions = TransportDirectionsBuilder::build(&ServiceRoute::PUBLIC, &enrollment, resolved);
    assert!(!directions.bypass_proxy);
    assert!(!directions.attach_client_certificate);
    assert!(directions.client_certificate.is_none());
    assert_eq!(directions.endpoint.endpoint_type(), EndpointType::Tls);
    assert_eq!(directions.endpoint.host(), "compute.googleapis.com");
}
