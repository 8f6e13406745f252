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

//! Reachability probe for resolved endpoints.
//!
//! Opens a single TCP connection to the endpoint's host and port and closes
//! it again. No TLS handshake is attempted.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::endpoint::ResolvedEndpoint;

/// Default time to wait for the connection.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The connection was accepted.
    Reachable,
    /// The connection failed.
    Unreachable(String),
    /// No answer within the timeout.
    TimedOut,
}

impl ProbeOutcome {
    /// Whether the endpoint accepted the connection.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reachable => write!(f, "reachable"),
            Self::Unreachable(reason) => write!(f, "unreachable: {}", reason),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Try to connect to `endpoint` within `timeout`.
pub async fn probe_endpoint(endpoint: &ResolvedEndpoint, timeout: Duration) -> ProbeOutcome {
    let uri = endpoint.uri();
    let Some(host) = uri.host_str() else {
        return ProbeOutcome::Unreachable(format!("{} has no host", uri));
    };
    let Some(port) = uri.port_or_known_default() else {
        return ProbeOutcome::Unreachable(format!("{} has no port", uri));
    };

    // IPv6 literals keep their brackets in host_str().
    let address = format!("{}:{}", host, port);
    tracing::debug!("Probing {} ({})", address, endpoint.endpoint_type());

    match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(_stream)) => ProbeOutcome::Reachable,
        Ok(Err(e)) => ProbeOutcome::Unreachable(e.to_string()),
        Err(_) => ProbeOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointType;
    use tokio::net::TcpListener;
    use url::Url;

    fn endpoint(uri: &str) -> ResolvedEndpoint {
        ResolvedEndpoint::new(Url::parse(uri).unwrap(), EndpointType::Tls)
    }

    #[tokio::test]
    async fn test_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = probe_endpoint(
            &endpoint(&format!("https://127.0.0.1:{}/", port)),
            DEFAULT_PROBE_TIMEOUT,
        )
        .await;
        assert!(outcome.is_reachable());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let outcome = probe_endpoint(
            &endpoint(&format!("https://127.0.0.1:{}/", port)),
            DEFAULT_PROBE_TIMEOUT,
        )
        .await;
        assert!(matches!(outcome, ProbeOutcome::Unreachable(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ProbeOutcome::TimedOut.to_string(), "timed out");
        assert_eq!(
            ProbeOutcome::Unreachable("refused".into()).to_string(),
            "unreachable: refused"
        );
    }
}
