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

//! Service endpoints and routes.
//!
//! A [`CanonicalServiceEndpoint`] is the public address of an API in two
//! forms, one for TLS and one for mutual TLS. A [`ServiceRoute`] says whether
//! traffic should go through a Private Service Connect endpoint instead. The
//! [`ServiceEndpointResolver`] combines both with the enrollment state into a
//! [`ResolvedEndpoint`].

pub mod resolver;

pub use resolver::{PscOverrideRegistry, ServiceEndpointResolver};

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::Result;

const GOOGLEAPIS_SUFFIX: &str = ".googleapis.com";
const MTLS_INFIX: &str = ".mtls";

/// Kind of endpoint a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EndpointType {
    /// Public endpoint, server authentication only.
    Tls,
    /// Public endpoint, client certificate required.
    MutualTls,
    /// Private Service Connect endpoint.
    PrivateServiceConnect,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "TLS"),
            Self::MutualTls => write!(f, "mTLS"),
            Self::PrivateServiceConnect => write!(f, "PSC"),
        }
    }
}

/// Desired routing for API traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ServiceRoute {
    use_private_service_connect: bool,
    endpoint_host: Option<String>,
}

impl ServiceRoute {
    /// Route over the public endpoints.
    pub const PUBLIC: ServiceRoute = ServiceRoute {
        use_private_service_connect: false,
        endpoint_host: None,
    };

    /// Route over a Private Service Connect endpoint.
    pub fn psc(endpoint_host: impl Into<String>) -> Self {
        Self {
            use_private_service_connect: true,
            endpoint_host: Some(endpoint_host.into()),
        }
    }

    /// Route derived from an optional PSC endpoint setting.
    pub fn from_endpoint(endpoint_host: Option<&str>) -> Self {
        match endpoint_host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => Self::psc(host),
            None => Self::PUBLIC,
        }
    }

    /// Whether traffic goes through Private Service Connect.
    pub fn use_private_service_connect(&self) -> bool {
        self.use_private_service_connect
    }

    /// The PSC endpoint host, if any.
    pub fn endpoint_host(&self) -> Option<&str> {
        self.endpoint_host.as_deref()
    }
}

impl fmt::Display for ServiceRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint_host {
            Some(host) if self.use_private_service_connect => write!(f, "psc:{}", host),
            _ => write!(f, "public"),
        }
    }
}

/// Public address of an API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalServiceEndpoint {
    tls_uri: Url,
    mtls_uri: Url,
}

impl CanonicalServiceEndpoint {
    /// Create an endpoint, deriving the mTLS address.
    ///
    /// For `*.googleapis.com` hosts the mTLS host has `mtls.` inserted before
    /// `googleapis.com`. Any other host keeps its TLS address.
    pub fn new(tls_uri: Url) -> Self {
        let mtls_uri = derive_mtls_uri(&tls_uri);
        Self { tls_uri, mtls_uri }
    }

    /// Parse the TLS address and derive the mTLS address.
    pub fn parse(tls_uri: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(tls_uri)?))
    }

    /// Use an explicit mTLS address.
    pub fn with_mtls_uri(mut self, mtls_uri: Url) -> Self {
        self.mtls_uri = mtls_uri;
        self
    }

    /// Address for TLS.
    pub fn tls_uri(&self) -> &Url {
        &self.tls_uri
    }

    /// Address for mutual TLS.
    pub fn mtls_uri(&self) -> &Url {
        &self.mtls_uri
    }

    /// Lower-case host of the TLS address.
    pub fn host(&self) -> String {
        self.tls_uri
            .host_str()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

fn derive_mtls_uri(tls_uri: &Url) -> Url {
    let Some(host) = tls_uri.host_str().map(str::to_ascii_lowercase) else {
        return tls_uri.clone();
    };

    let Some(service) = host.strip_suffix(GOOGLEAPIS_SUFFIX) else {
        return tls_uri.clone();
    };
    if service.is_empty() || service.ends_with(MTLS_INFIX) {
        return tls_uri.clone();
    }

    let mut mtls_uri = tls_uri.clone();
    let mtls_host = format!("{}{}{}", service, MTLS_INFIX, GOOGLEAPIS_SUFFIX);
    match mtls_uri.set_host(Some(&mtls_host)) {
        Ok(()) => mtls_uri,
        Err(_) => tls_uri.clone(),
    }
}

/// Outcome of endpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedEndpoint {
    uri: Url,
    endpoint_type: EndpointType,
}

impl ResolvedEndpoint {
    /// Create a resolved endpoint.
    pub fn new(uri: Url, endpoint_type: EndpointType) -> Self {
        Self { uri, endpoint_type }
    }

    /// Address to connect to.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Kind of endpoint.
    pub fn endpoint_type(&self) -> EndpointType {
        self.endpoint_type
    }

    /// Host of the address.
    pub fn host(&self) -> &str {
        self.uri.host_str().unwrap_or_default()
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uri, self.endpoint_type)
    }
}

/// Canonical endpoints of the Google APIs used for device trust.
pub mod well_known {
    use super::CanonicalServiceEndpoint;

    /// Compute Engine API.
    pub const COMPUTE: &str = "https://compute.googleapis.com/compute/v1/";
    /// OS Login API.
    pub const OS_LOGIN: &str = "https://oslogin.googleapis.com/";
    /// OAuth token endpoint.
    pub const OAUTH2: &str = "https://oauth2.googleapis.com/";
    /// OpenID Connect endpoint.
    pub const OPENID_CONNECT: &str = "https://openidconnect.googleapis.com/";
    /// Resource Manager API.
    pub const RESOURCE_MANAGER: &str = "https://cloudresourcemanager.googleapis.com/";
    /// Cloud Logging API.
    pub const LOGGING: &str = "https://logging.googleapis.com/";
    /// Identity-Aware Proxy API.
    pub const IAP: &str = "https://iap.googleapis.com/";

    const ALL: [&str; 7] = [
        COMPUTE,
        OS_LOGIN,
        OAUTH2,
        OPENID_CONNECT,
        RESOURCE_MANAGER,
        LOGGING,
        IAP,
    ];

    /// All of the above as endpoints.
    pub fn all() -> Vec<CanonicalServiceEndpoint> {
        ALL.iter()
            .filter_map(|uri| CanonicalServiceEndpoint::parse(uri).ok())
            .collect()
    }
}
