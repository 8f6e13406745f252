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

//! # device-trust
//!
//! Endpoint and client-certificate resolution for device-trust API access.
//!
//! An API client running on a managed device can reach Google APIs three
//! ways: over plain TLS, over mutual TLS with a device certificate, or
//! through a Private Service Connect (PSC) endpoint. This crate decides
//! which one to use and which certificate to present.
//!
//! ## Features
//!
//! - **URL patterns** in the enterprise policy format (`https://[*.]example.org`)
//! - **Certificate selectors** matching issuer, subject and thumbprint
//! - **Enterprise certificate selection policy** from machine and user scope
//! - **Device enrollment state** from settings, policy and certificate stores
//! - **Native helper** IPC for enrollment advice
//! - **Endpoint resolution** with PSC overrides and mTLS endpoints
//! - **Transport directions** for proxy bypass and client certificates
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use device_trust::endpoint::well_known;
//! use device_trust::store::InMemoryCertificateStore;
//! use device_trust::{
//!     CanonicalServiceEndpoint, DeviceTrustConfig, ServiceEndpointResolver,
//!     TransportDirectionsBuilder,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceTrustConfig::from_toml(
//!     r#"
//! [access]
//! device_certificate_authentication = true
//! "#,
//! )?;
//!
//! let resolver = config.enrollment_resolver(Arc::new(InMemoryCertificateStore::new()));
//! let enrollment = resolver.refresh()?;
//!
//! let compute = CanonicalServiceEndpoint::parse(well_known::COMPUTE)?;
//! let endpoints = ServiceEndpointResolver::new();
//! let resolved = endpoints.resolve_endpoint(&compute, enrollment.state());
//!
//! let route = config.access_settings().route();
//! let directions = TransportDirectionsBuilder::build(&route, &enrollment, resolved);
//! println!("Connect to {}", directions.endpoint);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//!
//! - `cli` (default): the `device-trust` command-line tool
//! - `windows`: Windows certificate stores, registry policy and helper
//!   registration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod certificate;
pub mod config;
pub mod endpoint;
pub mod enrollment;
pub mod error;
pub mod helper;
pub mod logging;
pub mod pattern;
pub mod policy;
pub mod probe;
pub mod store;
pub mod transport;

#[cfg(all(windows, feature = "windows"))]
pub mod windows;

// Re-export main types at crate root for convenience
pub use certificate::{Certificate, CertificateSelector, DistinguishedName, DistinguishedNameFilter};
pub use config::{ConfigLoader, DeviceTrustConfig};
pub use endpoint::{
    CanonicalServiceEndpoint, EndpointType, ResolvedEndpoint, ServiceEndpointResolver,
    ServiceRoute,
};
pub use enrollment::{
    AppSettings, DeviceEnrollmentResolver, DeviceEnrollmentState, EnrollmentResult,
};
pub use error::{DeviceTrustError, Result};
pub use pattern::UrlMatchPattern;
pub use policy::{CertificateSelectionPolicy, PolicySource};
pub use store::CertificateStore;
pub use transport::{TransportDirections, TransportDirectionsBuilder};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
