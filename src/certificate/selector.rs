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

//! Certificate selectors.
//!
//! A selector pairs a [`UrlMatchPattern`] with optional issuer, subject and
//! thumbprint filters. Selectors are written as JSON documents:
//!
//! ```json
//! {
//!   "pattern": "https://[*.]example.org",
//!   "filter": {
//!     "ISSUER": { "CN": "Example CA" },
//!     "SUBJECT": { "CN": "example.org", "O": "Acme" },
//!     "THUMBPRINT": "0123..."
//!   }
//! }
//! ```
//!
//! Administrators routinely write these with single quotes, so documents are
//! read with a lenient JSON5 parser.

use serde::{Deserialize, Serialize};
use url::Url;

use super::dn::{DistinguishedName, DistinguishedNameFilter};
use super::Certificate;
use crate::pattern::UrlMatchPattern;

/// Issuer, subject and thumbprint constraints of a selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFilter {
    /// Constraint on the issuer name.
    #[serde(rename = "ISSUER", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<DistinguishedNameFilter>,

    /// Constraint on the subject name.
    #[serde(rename = "SUBJECT", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<DistinguishedNameFilter>,

    /// Expected SHA-1 thumbprint in hex, compared case-insensitively.
    #[serde(rename = "THUMBPRINT", default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectorDocument {
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    filter: Option<CertificateFilter>,
}

/// Decides whether a certificate may be used for a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSelector {
    pattern: UrlMatchPattern,
    filter: CertificateFilter,
}

impl CertificateSelector {
    /// Create a selector from its parts.
    pub fn new(pattern: UrlMatchPattern, filter: CertificateFilter) -> Self {
        Self { pattern, filter }
    }

    /// Parse a selector document.
    ///
    /// Returns `None` for malformed JSON and for a malformed pattern. A
    /// missing pattern means `*`.
    pub fn try_parse(json: &str) -> Option<Self> {
        let document: SelectorDocument = match json5::from_str(json) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!("Ignoring malformed certificate selector: {}", e);
                return None;
            }
        };

        let pattern = match document.pattern.as_deref() {
            None => UrlMatchPattern::any(),
            Some(pattern) => match UrlMatchPattern::parse(pattern) {
                Ok(pattern) => pattern,
                Err(e) => {
                    tracing::debug!("Ignoring certificate selector: {}", e);
                    return None;
                }
            },
        };

        Some(Self::new(pattern, document.filter.unwrap_or_default()))
    }

    /// The URL pattern.
    pub fn pattern(&self) -> &UrlMatchPattern {
        &self.pattern
    }

    /// The issuer, subject and thumbprint filter.
    pub fn filter(&self) -> &CertificateFilter {
        &self.filter
    }

    /// Check a URL and certificate attributes against this selector.
    ///
    /// Every present condition must hold.
    pub fn is_match(
        &self,
        uri: &Url,
        issuer: &DistinguishedName,
        subject: &DistinguishedName,
        thumbprint: &str,
    ) -> bool {
        if !self.pattern.is_match_url(uri) {
            return false;
        }

        if let Some(filter) = &self.filter.issuer {
            if !filter.is_match(issuer) {
                return false;
            }
        }

        if let Some(filter) = &self.filter.subject {
            if !filter.is_match(subject) {
                return false;
            }
        }

        match &self.filter.thumbprint {
            Some(expected) => expected.eq_ignore_ascii_case(thumbprint),
            None => true,
        }
    }

    /// Check a URL and certificate against this selector.
    pub fn is_match_certificate(&self, uri: &Url, certificate: &Certificate) -> bool {
        self.is_match(
            uri,
            certificate.issuer(),
            certificate.subject(),
            certificate.thumbprint(),
        )
    }
}
