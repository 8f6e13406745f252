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

//! Directives for building the HTTP transport of an API client.

use crate::certificate::Certificate;
use crate::endpoint::{ResolvedEndpoint, ServiceRoute};
use crate::enrollment::{DeviceEnrollmentState, EnrollmentResult};

/// How to configure the transport for one API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDirections {
    /// Connect directly, ignoring any configured HTTP proxy.
    pub bypass_proxy: bool,
    /// Offer the device certificate during the TLS handshake.
    pub attach_client_certificate: bool,
    /// The certificate to offer. Present iff `attach_client_certificate`.
    pub client_certificate: Option<Certificate>,
    /// Where to connect.
    pub endpoint: ResolvedEndpoint,
}

/// Builds [`TransportDirections`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportDirectionsBuilder;

impl TransportDirectionsBuilder {
    /// PSC traffic already runs on a private path and never uses the proxy.
    pub fn bypass_proxy(route: &ServiceRoute) -> bool {
        route.use_private_service_connect()
    }

    /// Only an enrolled device presents a client certificate.
    pub fn attach_client_certificate(state: DeviceEnrollmentState) -> bool {
        state == DeviceEnrollmentState::Enrolled
    }

    /// Combine route, enrollment and resolved endpoint.
    pub fn build(
        route: &ServiceRoute,
        enrollment: &EnrollmentResult,
        endpoint: ResolvedEndpoint,
    ) -> TransportDirections {
        let attach_client_certificate = Self::attach_client_certificate(enrollment.state());
        let client_certificate = enrollment
            .certificate()
            .filter(|_| attach_client_certificate)
            .cloned();

        TransportDirections {
            bypass_proxy: Self::bypass_proxy(route),
            attach_client_certificate,
            client_certificate,
            endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointType;
    use crate::enrollment::EnrollmentSource;
    use rcgen::{CertificateParams, KeyPair};
    use url::Url;

    fn endpoint() -> ResolvedEndpoint {
        ResolvedEndpoint::new(
            Url::parse("https://compute.googleapis.com/").unwrap(),
            EndpointType::Tls,
        )
    }

    fn certificate() -> Certificate {
        let key_pair = KeyPair::generate().unwrap();
        let cert = CertificateParams::default().self_signed(&key_pair).unwrap();
        Certificate::from_der(cert.der()).unwrap()
    }

    #[test]
    fn test_bypass_proxy_follows_route() {
        assert!(!TransportDirectionsBuilder::bypass_proxy(&ServiceRoute::PUBLIC));
        assert!(TransportDirectionsBuilder::bypass_proxy(&ServiceRoute::psc("psc.internal")));
    }

    #[test]
    fn test_enrolled_attaches_certificate() {
        let cert = certificate();
        let enrollment = EnrollmentResult::enrolled(cert.clone(), EnrollmentSource::DefaultSelector);

        let directions =
            TransportDirectionsBuilder::build(&ServiceRoute::psc("psc.internal"), &enrollment, endpoint());
        assert!(directions.bypass_proxy);
        assert!(directions.attach_client_certificate);
        assert_eq!(directions.client_certificate, Some(cert));
    }

    #[test]
    fn test_not_enrolled_attaches_nothing() {
        for enrollment in [EnrollmentResult::disabled(), EnrollmentResult::not_enrolled()] {
            let directions =
                TransportDirectionsBuilder::build(&ServiceRoute::PUBLIC, &enrollment, endpoint());
            assert!(!directions.bypass_proxy);
            assert!(!directions.attach_client_certificate);
            assert!(directions.client_certificate.is_none());
            assert_eq!(directions.endpoint, endpoint());
        }
    }

    #[test]
    fn test_attach_follows_enrollment_state() {
        for enrollment in [
            EnrollmentResult::disabled(),
            EnrollmentResult::not_enrolled(),
            EnrollmentResult::enrolled(certificate(), EnrollmentSource::EnterprisePolicy),
        ] {
            let directions =
                TransportDirectionsBuilder::build(&ServiceRoute::PUBLIC, &enrollment, endpoint());
            assert_eq!(
                directions.attach_client_certificate,
                enrollment.state() == DeviceEnrollmentState::Enrolled
            );
            assert_eq!(
                directions.client_certificate.as_ref(),
                enrollment.certificate()
            );
        }
    }
}
