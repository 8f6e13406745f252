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

//! Device enrollment resolution.
//!
//! A device counts as enrolled if it holds a client certificate that the
//! configured selectors accept for the Google APIs. The decision is made from
//! scratch on every refresh, in this order:
//!
//! 1. Device certificate authentication disabled: [`DeviceEnrollmentState::Disabled`].
//! 2. A custom selector is configured and matches a client authentication
//!    certificate of the machine or user store. Without a custom selector,
//!    the built-in endpoint verification selector is tried against the user
//!    store.
//! 3. The enterprise [`CertificateSelectionPolicy`] authorizes a certificate.
//! 4. Otherwise [`DeviceEnrollmentState::NotEnrolled`].
//!
//! Refreshing returns a new [`EnrollmentResult`]; callers replace their
//! previous result with the latest completed one.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::certificate::{Certificate, CertificateSelector};
use crate::error::{DeviceTrustError, Result};
use crate::helper::{HelperLocator, HelperTransport, NativeHelperClient, ProcessTransport};
use crate::policy::CertificateSelectionPolicy;
use crate::store::{client_authentication_candidates, CertificateStore, StoreLocation};

/// URL that certificates are selected for.
pub const CERTIFICATE_SELECTOR_PROBE_URL: &str = "https://www.googleapis.com/";

/// Selector for the certificate provisioned by endpoint verification.
pub const DEFAULT_DEVICE_CERTIFICATE_SELECTOR: &str = r#"{"pattern":"https://[*.]googleapis.com/","filter":{"ISSUER":{"CN":"Google Endpoint Verification"},"SUBJECT":{"CN":"Google Endpoint Verification"}}}"#;

/// Enrollment state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceEnrollmentState {
    /// Device certificate authentication is turned off.
    Disabled,
    /// Turned on, but no usable certificate was found.
    NotEnrolled,
    /// A usable certificate was found.
    Enrolled,
}

impl fmt::Display for DeviceEnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::NotEnrolled => write!(f, "not enrolled"),
            Self::Enrolled => write!(f, "enrolled"),
        }
    }
}

/// Application settings that control enrollment.
pub trait AppSettings: Send + Sync {
    /// Whether device certificate authentication is turned on.
    fn is_device_certificate_authentication_enabled(&self) -> bool;

    /// Custom certificate selector, as JSON.
    fn device_certificate_selector(&self) -> Option<String>;
}

/// Settings given as plain values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticAppSettings {
    /// See [`AppSettings::is_device_certificate_authentication_enabled`].
    pub device_certificate_authentication: bool,
    /// See [`AppSettings::device_certificate_selector`].
    pub device_certificate_selector: Option<String>,
}

impl AppSettings for StaticAppSettings {
    fn is_device_certificate_authentication_enabled(&self) -> bool {
        self.device_certificate_authentication
    }

    fn device_certificate_selector(&self) -> Option<String> {
        self.device_certificate_selector.clone()
    }
}

/// Which rule selected the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnrollmentSource {
    /// The selector from the application settings.
    CustomSelector,
    /// The built-in endpoint verification selector.
    DefaultSelector,
    /// The enterprise certificate selection policy.
    EnterprisePolicy,
}

/// Outcome of a refresh.
///
/// A certificate is present iff the state is `Enrolled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentResult {
    state: DeviceEnrollmentState,
    certificate: Option<Certificate>,
    source: Option<EnrollmentSource>,
}

impl EnrollmentResult {
    /// Device certificate authentication is off.
    pub fn disabled() -> Self {
        Self {
            state: DeviceEnrollmentState::Disabled,
            certificate: None,
            source: None,
        }
    }

    /// No usable certificate.
    pub fn not_enrolled() -> Self {
        Self {
            state: DeviceEnrollmentState::NotEnrolled,
            certificate: None,
            source: None,
        }
    }

    /// Enrolled with `certificate`.
    pub fn enrolled(certificate: Certificate, source: EnrollmentSource) -> Self {
        Self {
            state: DeviceEnrollmentState::Enrolled,
            certificate: Some(certificate),
            source: Some(source),
        }
    }

    /// The enrollment state.
    pub fn state(&self) -> DeviceEnrollmentState {
        self.state
    }

    /// The selected certificate.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// The rule that selected the certificate.
    pub fn source(&self) -> Option<EnrollmentSource> {
        self.source
    }
}

/// What the native helper says about the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HelperStatus {
    /// The helper was not asked because enrollment is disabled.
    Skipped,
    /// The helper is missing or older than the minimum version.
    NotInstalled,
    /// The helper answered.
    Installed {
        /// Helper version.
        version: String,
        /// Whether the helper advises enrolling the device.
        should_enroll: bool,
    },
}

/// Enrollment together with the helper's advice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentReport {
    /// Enrollment derived from certificates.
    pub enrollment: EnrollmentResult,
    /// Helper advice.
    pub helper: HelperStatus,
}

/// Everything a refresh reads.
pub struct EnrollmentInputs<'a> {
    /// Application settings.
    pub settings: &'a dyn AppSettings,
    /// Enterprise policy.
    pub policy: &'a CertificateSelectionPolicy,
    /// Certificate store.
    pub store: &'a dyn CertificateStore,
}

/// Compute the enrollment state.
///
/// The store is not read when device certificate authentication is
/// disabled. Store errors are returned to the caller.
pub fn refresh(inputs: &EnrollmentInputs<'_>) -> Result<EnrollmentResult> {
    if !inputs.settings.is_device_certificate_authentication_enabled() {
        tracing::debug!("Device certificate authentication is disabled");
        return Ok(EnrollmentResult::disabled());
    }

    let probe_url = Url::parse(CERTIFICATE_SELECTOR_PROBE_URL)?;
    let candidates = client_authentication_candidates(inputs.store)?;

    let selected = match inputs.settings.device_certificate_selector() {
        Some(json) => match CertificateSelector::try_parse(&json) {
            Some(selector) => candidates
                .iter()
                .find(|c| selector.is_match_certificate(&probe_url, &c.certificate))
                .map(|c| (c.certificate.clone(), EnrollmentSource::CustomSelector)),
            None => {
                tracing::warn!("Ignoring malformed device certificate selector");
                None
            }
        },
        None => CertificateSelector::try_parse(DEFAULT_DEVICE_CERTIFICATE_SELECTOR).and_then(
            |selector| {
                candidates
                    .iter()
                    .filter(|c| c.location == StoreLocation::User)
                    .find(|c| selector.is_match_certificate(&probe_url, &c.certificate))
                    .map(|c| (c.certificate.clone(), EnrollmentSource::DefaultSelector))
            },
        ),
    };

    let selected = selected.or_else(|| {
        candidates
            .iter()
            .find(|c| inputs.policy.is_applicable(&probe_url, &c.certificate))
            .map(|c| (c.certificate.clone(), EnrollmentSource::EnterprisePolicy))
    });

    let result = match selected {
        Some((certificate, source)) => {
            tracing::info!(
                "Device is enrolled, using certificate {} ({:?})",
                certificate.thumbprint(),
                source
            );
            EnrollmentResult::enrolled(certificate, source)
        }
        None => {
            tracing::info!("Device is not enrolled, no matching client certificate");
            EnrollmentResult::not_enrolled()
        }
    };

    Ok(result)
}

/// Owns the enrollment collaborators and runs refreshes.
pub struct DeviceEnrollmentResolver {
    settings: Arc<dyn AppSettings>,
    policy: CertificateSelectionPolicy,
    store: Arc<dyn CertificateStore>,
    locator: Option<Arc<dyn HelperLocator>>,
    helper_origin: Option<String>,
    helper_min_version: Option<String>,
}

impl DeviceEnrollmentResolver {
    /// Create a resolver without native helper.
    pub fn new(
        settings: Arc<dyn AppSettings>,
        policy: CertificateSelectionPolicy,
        store: Arc<dyn CertificateStore>,
    ) -> Self {
        Self {
            settings,
            policy,
            store,
            locator: None,
            helper_origin: None,
            helper_min_version: None,
        }
    }

    /// Use a native helper found by `locator`.
    pub fn with_helper(
        mut self,
        locator: Arc<dyn HelperLocator>,
        origin: Option<String>,
        min_version: Option<String>,
    ) -> Self {
        self.locator = Some(locator);
        self.helper_origin = origin;
        self.helper_min_version = min_version;
        self
    }

    /// The enterprise policy in use.
    pub fn policy(&self) -> &CertificateSelectionPolicy {
        &self.policy
    }

    /// Recompute the enrollment state.
    pub fn refresh(&self) -> Result<EnrollmentResult> {
        refresh(&EnrollmentInputs {
            settings: self.settings.as_ref(),
            policy: &self.policy,
            store: self.store.as_ref(),
        })
    }

    /// Recompute the enrollment state and ask the native helper, if
    /// installed, whether the device should be enrolled for `user_id`.
    pub async fn refresh_with_helper(&self, user_id: &str) -> Result<EnrollmentReport> {
        let path = self.locator.as_ref().and_then(|locator| locator.locate());

        let client = match path {
            Some(path) => {
                let mut transport = ProcessTransport::new(path);
                if let Some(origin) = &self.helper_origin {
                    transport = transport.with_origin(origin.clone());
                }
                let client = NativeHelperClient::new(transport);
                Some(match &self.helper_min_version {
                    Some(version) => client.with_min_version(version)?,
                    None => client,
                })
            }
            None => None,
        };

        self.refresh_with_client(client.as_ref(), user_id).await
    }

    /// Like [`refresh_with_helper`](Self::refresh_with_helper), with an
    /// explicit helper client.
    pub async fn refresh_with_client<T: HelperTransport>(
        &self,
        client: Option<&NativeHelperClient<T>>,
        user_id: &str,
    ) -> Result<EnrollmentReport> {
        let enrollment = self.refresh()?;

        let helper = match client {
            _ if enrollment.state() == DeviceEnrollmentState::Disabled => HelperStatus::Skipped,
            None => HelperStatus::NotInstalled,
            Some(client) => query_helper(client, user_id).await?,
        };

        Ok(EnrollmentReport { enrollment, helper })
    }
}

async fn query_helper<T: HelperTransport>(
    client: &NativeHelperClient<T>,
    user_id: &str,
) -> Result<HelperStatus> {
    let answer = async {
        let version = client.availability().await?;
        let should_enroll = client.should_enroll_device(user_id).await?;
        Ok::<_, DeviceTrustError>(HelperStatus::Installed {
            version,
            should_enroll,
        })
    };

    match answer.await {
        Err(e) if e.is_helper_unavailable() => {
            tracing::debug!("{}", e);
            Ok(HelperStatus::NotInstalled)
        }
        other => other,
    }
}
