// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Endpoint resolution.
//!
//! Resolution is a total function of the canonical endpoint, the enrollment
//! state and the registered Private Service Connect overrides:
//!
//! 1. An override for the canonical host always wins.
//! 2. An enrolled device uses the mTLS address.
//! 3. Everything else uses the TLS address.

use std::collections::HashMap;

use url::{Host, Url};

use super::{CanonicalServiceEndpoint, EndpointType, ResolvedEndpoint, ServiceRoute};
use crate::enrollment::DeviceEnrollmentState;
use crate::error::Result;

/// Canonical host to PSC host mapping. Keys are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PscOverrideRegistry {
    overrides: HashMap<String, String>,
}

impl PscOverrideRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `psc_host` for `canonical_host`, replacing any previous entry.
    pub fn insert(&mut self, canonical_host: &str, psc_host: &str) -> Result<()> {
        let psc_host = Host::parse(psc_host.trim())?.to_string();
        self.overrides
            .insert(canonical_host.trim().to_ascii_lowercase(), psc_host);
        Ok(())
    }

    /// The PSC host registered for `canonical_host`.
    pub fn get(&self, canonical_host: &str) -> Option<&str> {
        self.overrides
            .get(&canonical_host.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of overrides.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Whether there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Maps canonical endpoints to the endpoint to connect to.
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpointResolver {
    overrides: PscOverrideRegistry,
}

impl ServiceEndpointResolver {
    /// Create a resolver without overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with the given overrides.
    pub fn with_overrides(overrides: PscOverrideRegistry) -> Self {
        Self { overrides }
    }

    /// Send traffic for `canonical_host` to `psc_host`.
    ///
    /// Registering the same canonical host again replaces the earlier entry.
    pub fn add_private_service_endpoint(&mut self, canonical_host: &str, psc_host: &str) -> Result<()> {
        self.overrides.insert(canonical_host, psc_host)?;
        tracing::debug!("Routing {} through {}", canonical_host, psc_host);
        Ok(())
    }

    /// Apply a route to a set of endpoints.
    ///
    /// A PSC route registers its endpoint host for every endpoint. The
    /// public route changes nothing.
    pub fn apply_route(
        &mut self,
        route: &ServiceRoute,
        endpoints: &[CanonicalServiceEndpoint],
    ) -> Result<()> {
        let Some(psc_host) = route
            .endpoint_host()
            .filter(|_| route.use_private_service_connect())
        else {
            return Ok(());
        };

        for endpoint in endpoints {
            self.add_private_service_endpoint(&endpoint.host(), psc_host)?;
        }
        Ok(())
    }

    /// The registered overrides.
    pub fn overrides(&self) -> &PscOverrideRegistry {
        &self.overrides
    }

    /// Decide where to send requests for `canonical`.
    pub fn resolve_endpoint(
        &self,
        canonical: &CanonicalServiceEndpoint,
        enrollment: DeviceEnrollmentState,
    ) -> ResolvedEndpoint {
        let host = canonical.host();

        if let Some(psc_host) = self.overrides.get(&host) {
            let mut uri = canonical.tls_uri().clone();
            match uri.set_host(Some(psc_host)) {
                Ok(()) => {
                    return ResolvedEndpoint::new(uri, EndpointType::PrivateServiceConnect);
                }
                Err(e) => {
                    tracing::warn!("Cannot route {} through {}: {}", host, psc_host, e);
                }
            }
        }

        if enrollment == DeviceEnrollmentState::Enrolled {
            ResolvedEndpoint::new(canonical.mtls_uri().clone(), EndpointType::MutualTls)
        } else {
            ResolvedEndpoint::new(lower_case_host(canonical.tls_uri()), EndpointType::Tls)
        }
    }
}

fn lower_case_host(uri: &Url) -> Url {
    let Some(host) = uri.host_str().map(str::to_ascii_lowercase) else {
        return uri.clone();
    };

    let mut lowered = uri.clone();
    match lowered.set_host(Some(&host)) {
        Ok(()) => lowered,
        Err(e) => {
            tracing::debug!("Keeping host of {} as is: {}", uri, e);
            uri.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn compute() -> CanonicalServiceEndpoint {
        CanonicalServiceEndpoint::parse("https://compute.googleapis.com/compute/v1/").unwrap()
    }

    #[test]
    fn test_tls_when_not_enrolled() {
        let resolver = ServiceEndpointResolver::new();
        for state in [DeviceEnrollmentState::Disabled, DeviceEnrollmentState::NotEnrolled] {
            let resolved = resolver.resolve_endpoint(&compute(), state);
            assert_eq!(resolved.endpoint_type(), EndpointType::Tls);
            assert_eq!(resolved.host(), "compute.googleapis.com");
        }
    }

    #[test]
    fn test_tls_host_is_lower_cased() {
        let canonical = CanonicalServiceEndpoint::parse("grpc://Pubsub.Example.COM/v1/").unwrap();
        let resolved =
            ServiceEndpointResolver::new().resolve_endpoint(&canonical, DeviceEnrollmentState::NotEnrolled);
        assert_eq!(resolved.endpoint_type(), EndpointType::Tls);
        assert_eq!(resolved.uri().as_str(), "grpc://pubsub.example.com/v1/");
    }

    #[test]
    fn test_mtls_when_enrolled() {
        let resolved =
            ServiceEndpointResolver::new().resolve_endpoint(&compute(), DeviceEnrollmentState::Enrolled);
        assert_eq!(resolved.endpoint_type(), EndpointType::MutualTls);
        assert_eq!(
            resolved.uri().as_str(),
            "https://compute.mtls.googleapis.com/compute/v1/"
        );
    }

    #[test]
    fn test_psc_wins() {
        let mut resolver = ServiceEndpointResolver::new();
        resolver
            .add_private_service_endpoint("COMPUTE.googleapis.com", "compute.p.googleapis.com")
            .unwrap();

        let resolved = resolver.resolve_endpoint(&compute(), DeviceEnrollmentState::Enrolled);
        assert_eq!(resolved.endpoint_type(), EndpointType::PrivateServiceConnect);
        assert_eq!(
            resolved.uri().as_str(),
            "https://compute.p.googleapis.com/compute/v1/"
        );
    }

    #[test]
    fn test_override_last_write_wins() {
        let mut resolver = ServiceEndpointResolver::new();
        resolver
            .add_private_service_endpoint("compute.googleapis.com", "first.example")
            .unwrap();
        resolver
            .add_private_service_endpoint("Compute.GoogleApis.com", "second.example")
            .unwrap();

        assert_eq!(resolver.overrides().len(), 1);
        assert_eq!(
            resolver.overrides().get("compute.googleapis.com"),
            Some("second.example")
        );
    }

    #[test]
    fn test_invalid_psc_host() {
        let mut resolver = ServiceEndpointResolver::new();
        assert!(resolver
            .add_private_service_endpoint("compute.googleapis.com", "bad host")
            .is_err());
        assert!(resolver.overrides().is_empty());
    }

    #[test]
    fn test_apply_route() {
        let endpoints = vec![
            compute(),
            CanonicalServiceEndpoint::parse("https://oauth2.googleapis.com/").unwrap(),
        ];

        let mut resolver = ServiceEndpointResolver::new();
        resolver.apply_route(&ServiceRoute::PUBLIC, &endpoints).unwrap();
        assert!(resolver.overrides().is_empty());

        resolver
            .apply_route(&ServiceRoute::psc("10.0.0.5"), &endpoints)
            .unwrap();
        for endpoint in &endpoints {
            let resolved = resolver.resolve_endpoint(endpoint, DeviceEnrollmentState::NotEnrolled);
            assert_eq!(resolved.endpoint_type(), EndpointType::PrivateServiceConnect);
            assert_eq!(resolved.host(), "10.0.0.5");
        }
    }

    fn arb_state() -> impl Strategy<Value = DeviceEnrollmentState> {
        prop_oneof![
            Just(DeviceEnrollmentState::Disabled),
            Just(DeviceEnrollmentState::NotEnrolled),
            Just(DeviceEnrollmentState::Enrolled),
        ]
    }

    fn mixed_case(label: &str, mask: &[bool]) -> String {
        label
            .chars()
            .zip(mask.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_without_override_type_follows_enrollment(
            label in "[a-z][a-z0-9]{0,15}",
            mask in proptest::collection::vec(any::<bool>(), 1..8),
            state in arb_state(),
        ) {
            let host = format!("{}.googleapis.com", mixed_case(&label, &mask));
            let canonical = CanonicalServiceEndpoint::parse(&format!("https://{}/", host)).unwrap();
            let resolved = ServiceEndpointResolver::new().resolve_endpoint(&canonical, state);

            if state == DeviceEnrollmentState::Enrolled {
                prop_assert_eq!(resolved.endpoint_type(), EndpointType::MutualTls);
                prop_assert_eq!(resolved.host(), format!("{}.mtls.googleapis.com", label));
            } else {
                prop_assert_eq!(resolved.endpoint_type(), EndpointType::Tls);
                prop_assert_eq!(resolved.host(), format!("{}.googleapis.com", label));
            }
        }

        #[test]
        fn prop_override_always_wins(
            label in "[a-z][a-z0-9]{0,15}",
            psc in "[a-z][a-z0-9]{0,10}\\.internal",
            state in arb_state(),
        ) {
            let host = format!("{}.googleapis.com", label);
            let canonical = CanonicalServiceEndpoint::parse(&format!("https://{}/", host)).unwrap();

            let mut resolver = ServiceEndpointResolver::new();
            resolver.add_private_service_endpoint(&host.to_ascii_uppercase(), &psc).unwrap();

            let resolved = resolver.resolve_endpoint(&canonical, state);
            prop_assert_eq!(resolved.endpoint_type(), EndpointType::PrivateServiceConnect);
            prop_assert_eq!(resolved.host(), psc.as_str());
        }
    }
}
