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

//! URL match patterns as used by the `AutoSelectCertificateForUrls`
//! browser policy.
//!
//! A pattern has the shape `[scheme://]host[:port][/path]`:
//!
//! - `*` on its own matches every `http` and `https` URL.
//! - A missing scheme, or the scheme `*`, means "http or https".
//! - A host starting with `[*.]` matches the domain and all of its subdomains.
//! - A host that is an IPv4 or (bracketed) IPv6 literal only matches itself.
//! - A missing port means the default port of the scheme, `*` means any port.
//! - The path is accepted but never used to reject a URL.
//!
//! `file:` URLs never match, not even a pattern that names the `file`
//! scheme explicitly, so that a client certificate is never selected for
//! local content.
//!
//! # Example
//!
//! ```
//! use device_trust::pattern::UrlMatchPattern;
//!
//! let pattern = UrlMatchPattern::parse("https://[*.]example.com").unwrap();
//! assert!(pattern.is_match("https://sub.sub.EXAMPLE.com"));
//! assert!(!pattern.is_match("https://eeeexample.com"));
//! ```

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use url::{Host, Url};

use crate::error::{DeviceTrustError, Result};

const WILDCARD: &str = "*";
const SUBDOMAIN_WILDCARD: &str = "[*.]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum SchemePattern {
    /// `*` or no scheme at all.
    HttpOrHttps,
    /// `file`, which is never matched.
    File,
    Exact(String),
}

impl SchemePattern {
    fn default_port(&self) -> Option<u16> {
        match self {
            Self::Exact(scheme) => default_port(scheme),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Any,
    /// `[*.]domain`: the domain itself and any subdomain.
    Domain(String),
    Exact(String),
    Ip(IpAddr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortPattern {
    Any,
    /// No port given, use the scheme's default.
    Default,
    Exact(u16),
}

/// A parsed URL match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatchPattern {
    source: String,
    scheme: SchemePattern,
    host: HostPattern,
    port: PortPattern,
}

impl UrlMatchPattern {
    /// The pattern that matches all `http` and `https` URLs.
    pub fn any() -> Self {
        Self {
            source: WILDCARD.to_string(),
            scheme: SchemePattern::HttpOrHttps,
            host: HostPattern::Any,
            port: PortPattern::Any,
        }
    }

    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceTrustError::PatternFormat`] if the scheme is empty,
    /// the host is missing, or the port is neither a number nor `*`.
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern == WILDCARD {
            return Ok(Self::any());
        }

        let (scheme, rest) = match pattern.split_once("://") {
            Some(("", _)) => {
                return Err(DeviceTrustError::pattern_format(pattern, "empty scheme"));
            }
            Some((scheme, rest)) => (Self::parse_scheme(pattern, scheme)?, rest),
            None => (SchemePattern::HttpOrHttps, pattern),
        };

        let (host, port) = Self::parse_authority(pattern, rest)?;

        Ok(Self {
            source: pattern.to_string(),
            scheme,
            host,
            port,
        })
    }

    fn parse_scheme(pattern: &str, scheme: &str) -> Result<SchemePattern> {
        if scheme == WILDCARD {
            return Ok(SchemePattern::HttpOrHttps);
        }

        let valid = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(DeviceTrustError::pattern_format(
                pattern,
                format!("invalid scheme '{}'", scheme),
            ));
        }

        let scheme = scheme.to_ascii_lowercase();
        if scheme == "file" {
            Ok(SchemePattern::File)
        } else {
            Ok(SchemePattern::Exact(scheme))
        }
    }

    /// Parse `host[:port][/path]`. The path is discarded.
    fn parse_authority(pattern: &str, rest: &str) -> Result<(HostPattern, PortPattern)> {
        let (host, port) = if let Some(domain) = rest.strip_prefix(SUBDOMAIN_WILDCARD) {
            let authority = domain.split('/').next().unwrap_or_default();
            let (domain, port) = split_port(authority);
            if domain.is_empty() {
                return Err(DeviceTrustError::pattern_format(
                    pattern,
                    "missing domain after [*.]",
                ));
            }
            (HostPattern::Domain(normalize_domain(domain)), port)
        } else if rest.starts_with('[') {
            let end = rest.find(']').ok_or_else(|| {
                DeviceTrustError::pattern_format(pattern, "unterminated IPv6 literal")
            })?;
            let address = &rest[1..end];
            let ip = address.parse::<IpAddr>().map_err(|_| {
                DeviceTrustError::pattern_format(
                    pattern,
                    format!("invalid IPv6 literal '{}'", address),
                )
            })?;

            let after = &rest[end + 1..];
            let authority_tail = after.split('/').next().unwrap_or_default();
            let port = match authority_tail.strip_prefix(':') {
                Some(port) => Some(port),
                None if authority_tail.is_empty() => None,
                None => {
                    return Err(DeviceTrustError::pattern_format(
                        pattern,
                        "unexpected characters after IPv6 literal",
                    ));
                }
            };
            (HostPattern::Ip(ip), port)
        } else {
            let authority = rest.split('/').next().unwrap_or_default();
            let (host, port) = split_port(authority);
            let host = match host {
                "" => {
                    return Err(DeviceTrustError::pattern_format(pattern, "missing host"));
                }
                WILDCARD => HostPattern::Any,
                host => match host.parse::<IpAddr>() {
                    Ok(ip) => HostPattern::Ip(ip),
                    Err(_) => HostPattern::Exact(normalize_domain(host)),
                },
            };
            (host, port)
        };

        let port = match port {
            None => PortPattern::Default,
            Some(WILDCARD) => PortPattern::Any,
            Some(port) => port.parse::<u16>().map(PortPattern::Exact).map_err(|_| {
                DeviceTrustError::pattern_format(pattern, format!("invalid port '{}'", port))
            })?,
        };

        Ok((host, port))
    }

    /// The pattern text this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether a URL matches this pattern.
    ///
    /// Unparsable URLs never match.
    pub fn is_match(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => self.is_match_url(&url),
            Err(_) => false,
        }
    }

    /// Check whether an already-parsed URL matches this pattern.
    pub fn is_match_url(&self, url: &Url) -> bool {
        let scheme = url.scheme();
        let scheme_matches = match &self.scheme {
            SchemePattern::File => false,
            SchemePattern::HttpOrHttps => scheme == "http" || scheme == "https",
            SchemePattern::Exact(expected) => scheme != "file" && scheme == expected,
        };
        if !scheme_matches {
            return false;
        }

        let host_matches = match (&self.host, url.host()) {
            (_, None) => false,
            (HostPattern::Any, Some(_)) => true,
            (HostPattern::Domain(domain), Some(Host::Domain(host))) => {
                let host = host.to_ascii_lowercase();
                host == *domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            (HostPattern::Exact(expected), Some(Host::Domain(host))) => {
                host.eq_ignore_ascii_case(expected)
            }
            (HostPattern::Ip(expected), Some(Host::Ipv4(ip))) => *expected == IpAddr::V4(ip),
            (HostPattern::Ip(expected), Some(Host::Ipv6(ip))) => *expected == IpAddr::V6(ip),
            _ => false,
        };
        if !host_matches {
            return false;
        }

        let actual_port = url.port_or_known_default();
        match self.port {
            PortPattern::Any => true,
            PortPattern::Exact(port) => actual_port == Some(port),
            PortPattern::Default => {
                let expected = self
                    .scheme
                    .default_port()
                    .or_else(|| default_port(scheme));
                expected.is_some() && actual_port == expected
            }
        }
    }
}

impl Default for UrlMatchPattern {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for UrlMatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for UrlMatchPattern {
    type Err = DeviceTrustError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Lower-case a domain and convert it to its ASCII (punycode) form, the way
/// `Url` stores hosts.
fn normalize_domain(domain: &str) -> String {
    match Host::parse(domain) {
        Ok(Host::Domain(ascii)) => ascii,
        _ => domain.to_ascii_lowercase(),
    }
}

/// Split `host:port` at the first colon. Hostnames never contain one.
fn split_port(authority: &str) -> (&str, Option<&str>) {
    match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}
