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

//! X.509 certificate view used for device certificate selection.
//!
//! [`Certificate`] wraps a parsed certificate together with its original DER
//! encoding, and exposes exactly the attributes selection needs: issuer and
//! subject names, the SHA-1 thumbprint, the expiry, and whether the
//! certificate may be used for TLS client authentication.

pub mod dn;
pub mod selector;

pub use dn::{DistinguishedName, DistinguishedNameFilter};
pub use selector::{CertificateFilter, CertificateSelector};

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::prelude::*;
use const_oid::db::rfc5280::{ID_CE_EXT_KEY_USAGE, ID_KP_CLIENT_AUTH};
use der::Decode;
use sha1::{Digest, Sha1};
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::time::Time;

use crate::error::{DeviceTrustError, Result};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// A parsed X.509 certificate.
#[derive(Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    der: Vec<u8>,
    subject: DistinguishedName,
    issuer: DistinguishedName,
    thumbprint: String,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| DeviceTrustError::certificate_parsing(e.to_string()))?;

        let subject = DistinguishedName::from_x509(&inner.tbs_certificate.subject);
        let issuer = DistinguishedName::from_x509(&inner.tbs_certificate.issuer);
        let thumbprint = format_thumbprint(&Sha1::digest(der));

        Ok(Self {
            inner,
            der: der.to_vec(),
            subject,
            issuer,
            thumbprint,
        })
    }

    /// Parse the first certificate of a PEM bundle.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let start = pem
            .find(PEM_BEGIN)
            .ok_or_else(|| DeviceTrustError::certificate_parsing("No PEM certificate block"))?;
        let body = &pem[start + PEM_BEGIN.len()..];
        let end = body
            .find(PEM_END)
            .ok_or_else(|| DeviceTrustError::certificate_parsing("Unterminated PEM block"))?;

        let cleaned: Vec<u8> = body[..end]
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let der = BASE64_STANDARD
            .decode(&cleaned)
            .map_err(|e| DeviceTrustError::certificate_parsing(format!("Invalid PEM: {}", e)))?;

        Self::from_der(&der)
    }

    /// The subject name.
    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    /// The issuer name.
    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    /// SHA-1 hash of the DER encoding as upper-case hex without separators.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// The original DER encoding.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// End of the validity period.
    pub fn not_after(&self) -> SystemTime {
        UNIX_EPOCH + unix_duration(&self.inner.tbs_certificate.validity.not_after)
    }

    /// Start of the validity period.
    pub fn not_before(&self) -> SystemTime {
        UNIX_EPOCH + unix_duration(&self.inner.tbs_certificate.validity.not_before)
    }

    /// Whether `now` falls inside the validity period.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        self.not_before() <= now && now <= self.not_after()
    }

    /// Whether the extended key usage permits TLS client authentication.
    ///
    /// A certificate without an extended key usage extension is not
    /// considered capable.
    pub fn is_client_authentication_capable(&self) -> bool {
        let Some(extensions) = &self.inner.tbs_certificate.extensions else {
            return false;
        };

        extensions
            .iter()
            .filter(|ext| ext.extn_id == ID_CE_EXT_KEY_USAGE)
            .filter_map(|ext| ExtendedKeyUsage::from_der(ext.extn_value.as_bytes()).ok())
            .any(|eku| eku.0.contains(&ID_KP_CLIENT_AUTH))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject.to_string())
            .field("issuer", &self.issuer.to_string())
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

fn unix_duration(time: &Time) -> Duration {
    match time {
        Time::UtcTime(utc) => utc.to_unix_duration(),
        Time::GeneralTime(generalized) => generalized.to_unix_duration(),
    }
}

/// Format a hash as upper-case hex.
pub fn format_thumbprint(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
