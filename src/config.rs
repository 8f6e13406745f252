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

//! Configuration file support.
//!
//! A configuration file carries the user's access settings, the
//! administrative overrides of those settings, the enterprise certificate
//! selection policy, native helper registration and logging:
//!
//! ```toml
//! [access]
//! device_certificate_authentication = true
//! private_service_connect_endpoint = "psc.example.internal"
//!
//! [[access.psc_overrides]]
//! canonical_host = "oauth2.googleapis.com"
//! psc_host = "oauth2-psc.example.internal"
//!
//! [machine_policy]
//! device_certificate_authentication = true
//!
//! [policy.machine]
//! 1 = '{"pattern":"https://[*.]example.org","filter":{"ISSUER":{"CN":"Example CA"}}}'
//!
//! [helper]
//! min_version = "2.1"
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Each access setting is taken from the machine policy if set there, else
//! from the user policy, else from `[access]`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Host;

use crate::certificate::CertificateSelector;
use crate::endpoint::{CanonicalServiceEndpoint, ServiceEndpointResolver, ServiceRoute};
use crate::enrollment::{AppSettings, DeviceEnrollmentResolver};
use crate::error::{DeviceTrustError, Result};
use crate::helper::locator::{DEFAULT_EXTENSION_ID, DEFAULT_HOST_NAME};
use crate::helper::{
    extension_origin, parse_helper_version, FixedHelperLocator, HelperLocator,
    ManifestHelperLocator,
};
use crate::logging::LoggingConfig;
use crate::policy::{CertificateSelectionPolicy, InMemoryPolicySource, PolicyScope, PolicySource};
use crate::store::CertificateStore;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "DEVICE_TRUST_CONFIG";

/// Configuration file name looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "device-trust.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceTrustConfig {
    /// Settings chosen by the user.
    #[serde(default)]
    pub access: AccessConfig,

    /// Enterprise certificate selection policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Machine-wide administrative overrides of `[access]`.
    #[serde(default)]
    pub machine_policy: AccessPolicy,

    /// Per-user administrative overrides of `[access]`.
    #[serde(default)]
    pub user_policy: AccessPolicy,

    /// Native helper registration.
    #[serde(default)]
    pub helper: HelperConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `[access]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Authenticate API requests with a device certificate.
    #[serde(default)]
    pub device_certificate_authentication: bool,

    /// Custom certificate selector, as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_certificate_selector: Option<String>,

    /// Send all API traffic to this Private Service Connect host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_service_connect_endpoint: Option<String>,

    /// Per-service PSC hosts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub psc_overrides: Vec<PscOverride>,
}

/// A single `[[access.psc_overrides]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PscOverride {
    /// Host of the canonical endpoint, e.g. `compute.googleapis.com`.
    pub canonical_host: String,
    /// Host to connect to instead.
    pub psc_host: String,
}

/// Administrative values that take precedence over `[access]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessPolicy {
    /// Overrides `access.device_certificate_authentication`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_certificate_authentication: Option<bool>,

    /// Overrides `access.device_certificate_selector`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_certificate_selector: Option<String>,

    /// Overrides `access.private_service_connect_endpoint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_service_connect_endpoint: Option<String>,
}

/// Numbered certificate selectors per scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// `[policy.machine]`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub machine: BTreeMap<String, String>,

    /// `[policy.user]`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user: BTreeMap<String, String>,
}

impl PolicyConfig {
    /// The entries of one scope as a policy source.
    pub fn source(&self, scope: PolicyScope) -> InMemoryPolicySource {
        let values = match scope {
            PolicyScope::Machine => &self.machine,
            PolicyScope::User => &self.user,
        };
        values
            .iter()
            .fold(InMemoryPolicySource::new(scope), |source, (name, value)| {
                source.with_value(name.clone(), value.clone())
            })
    }

    /// Build the selection policy, machine entries first.
    pub fn selection_policy(&self) -> CertificateSelectionPolicy {
        let machine = self.source(PolicyScope::Machine);
        let user = self.source(PolicyScope::User);
        CertificateSelectionPolicy::from_sources([
            &machine as &dyn PolicySource,
            &user as &dyn PolicySource,
        ])
    }
}

/// The `[helper]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelperConfig {
    /// Ask the native helper for enrollment advice.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Native messaging host name.
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Extension the helper is registered for.
    #[serde(default = "default_extension_id")]
    pub extension_id: String,

    /// Read this manifest instead of the platform locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,

    /// Run this executable, skipping manifest discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Oldest helper version to talk to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_host_name() -> String {
    DEFAULT_HOST_NAME.to_string()
}

fn default_extension_id() -> String {
    DEFAULT_EXTENSION_ID.to_string()
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host_name: default_host_name(),
            extension_id: default_extension_id(),
            manifest_path: None,
            executable: None,
            min_version: None,
        }
    }
}

impl HelperConfig {
    /// Origin passed to the helper on its command line.
    pub fn origin(&self) -> String {
        extension_origin(&self.extension_id)
    }

    /// Locator for the configured helper.
    pub fn locator(&self) -> Arc<dyn HelperLocator> {
        if let Some(executable) = &self.executable {
            return Arc::new(FixedHelperLocator::new(executable.clone()));
        }

        let locator = ManifestHelperLocator::new(self.host_name.clone(), self.extension_id.clone());
        match &self.manifest_path {
            Some(path) => Arc::new(locator.with_manifest_path(path.clone())),
            None => Arc::new(locator),
        }
    }
}

/// Where an effective setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    /// `[machine_policy]`
    MachinePolicy,
    /// `[user_policy]`
    UserPolicy,
    /// `[access]`
    UserSetting,
    /// Not configured anywhere.
    Default,
}

impl SettingSource {
    /// Whether an administrator set the value.
    pub fn is_policy(&self) -> bool {
        matches!(self, Self::MachinePolicy | Self::UserPolicy)
    }
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MachinePolicy => write!(f, "machine policy"),
            Self::UserPolicy => write!(f, "user policy"),
            Self::UserSetting => write!(f, "user setting"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// An effective value and its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Setting<T> {
    /// The value.
    pub value: T,
    /// Where it came from.
    pub source: SettingSource,
}

impl<T> Setting<T> {
    /// Whether an administrator set the value.
    pub fn is_policy(&self) -> bool {
        self.source.is_policy()
    }
}

/// Access settings after applying administrative overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSettings {
    /// Effective `device_certificate_authentication`.
    pub device_certificate_authentication: Setting<bool>,
    /// Effective `device_certificate_selector`.
    pub device_certificate_selector: Setting<Option<String>>,
    /// Effective `private_service_connect_endpoint`.
    pub private_service_connect_endpoint: Setting<Option<String>>,
}

impl AccessSettings {
    /// Apply machine policy, then user policy, then the user's own value.
    pub fn resolve(access: &AccessConfig, machine: &AccessPolicy, user: &AccessPolicy) -> Self {
        let device_certificate_authentication = pick(
            machine.device_certificate_authentication,
            user.device_certificate_authentication,
        )
        .unwrap_or(Setting {
            value: access.device_certificate_authentication,
            source: SettingSource::UserSetting,
        });

        Self {
            device_certificate_authentication,
            device_certificate_selector: pick_optional(
                machine.device_certificate_selector.as_deref(),
                user.device_certificate_selector.as_deref(),
                access.device_certificate_selector.as_deref(),
            ),
            private_service_connect_endpoint: pick_optional(
                machine.private_service_connect_endpoint.as_deref(),
                user.private_service_connect_endpoint.as_deref(),
                access.private_service_connect_endpoint.as_deref(),
            ),
        }
    }

    /// The service route implied by the PSC endpoint setting.
    pub fn route(&self) -> ServiceRoute {
        ServiceRoute::from_endpoint(self.private_service_connect_endpoint.value.as_deref())
    }
}

fn pick<T>(machine: Option<T>, user: Option<T>) -> Option<Setting<T>> {
    machine
        .map(|value| Setting {
            value,
            source: SettingSource::MachinePolicy,
        })
        .or_else(|| {
            user.map(|value| Setting {
                value,
                source: SettingSource::UserPolicy,
            })
        })
}

fn pick_optional(
    machine: Option<&str>,
    user: Option<&str>,
    access: Option<&str>,
) -> Setting<Option<String>> {
    let non_empty = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(String::from);

    if let Some(setting) = pick(non_empty(machine), non_empty(user)) {
        return Setting {
            value: Some(setting.value),
            source: setting.source,
        };
    }

    match non_empty(access) {
        Some(value) => Setting {
            value: Some(value),
            source: SettingSource::UserSetting,
        },
        None => Setting {
            value: None,
            source: SettingSource::Default,
        },
    }
}

impl AppSettings for AccessSettings {
    fn is_device_certificate_authentication_enabled(&self) -> bool {
        self.device_certificate_authentication.value
    }

    fn device_certificate_selector(&self) -> Option<String> {
        self.device_certificate_selector.value.clone()
    }
}

impl DeviceTrustConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| DeviceTrustError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DeviceTrustError::config(format!("TOML serialize: {e}")))
    }

    /// Effective access settings.
    pub fn access_settings(&self) -> AccessSettings {
        AccessSettings::resolve(&self.access, &self.machine_policy, &self.user_policy)
    }

    /// The enterprise certificate selection policy.
    pub fn selection_policy(&self) -> CertificateSelectionPolicy {
        self.policy.selection_policy()
    }

    /// Resolver with the configured route applied to `endpoints`, followed
    /// by the per-service overrides.
    pub fn endpoint_resolver(
        &self,
        endpoints: &[CanonicalServiceEndpoint],
    ) -> Result<ServiceEndpointResolver> {
        let mut resolver = ServiceEndpointResolver::new();
        resolver.apply_route(&self.access_settings().route(), endpoints)?;
        for entry in &self.access.psc_overrides {
            resolver.add_private_service_endpoint(&entry.canonical_host, &entry.psc_host)?;
        }
        Ok(resolver)
    }

    /// Enrollment resolver over `store` using `policy`.
    pub fn enrollment_resolver_with_policy(
        &self,
        store: Arc<dyn CertificateStore>,
        policy: CertificateSelectionPolicy,
    ) -> DeviceEnrollmentResolver {
        let resolver = DeviceEnrollmentResolver::new(Arc::new(self.access_settings()), policy, store);
        if !self.helper.enabled {
            return resolver;
        }
        resolver.with_helper(
            self.helper.locator(),
            Some(self.helper.origin()),
            self.helper.min_version.clone(),
        )
    }

    /// Enrollment resolver over `store` using the configured policy.
    pub fn enrollment_resolver(&self, store: Arc<dyn CertificateStore>) -> DeviceEnrollmentResolver {
        self.enrollment_resolver_with_policy(store, self.selection_policy())
    }

    /// Entries that will be ignored at run time: selectors that do not parse
    /// and policy entries whose names are not numbers.
    ///
    /// These never make a configuration invalid.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let selectors = [
            ("access", &self.access.device_certificate_selector),
            ("machine_policy", &self.machine_policy.device_certificate_selector),
            ("user_policy", &self.user_policy.device_certificate_selector),
        ];
        for (section, selector) in selectors {
            if let Some(selector) = selector {
                if CertificateSelector::try_parse(selector).is_none() {
                    warnings.push(format!(
                        "{section}.device_certificate_selector is not a valid certificate selector"
                    ));
                }
            }
        }

        for (scope, entries) in [("machine", &self.policy.machine), ("user", &self.policy.user)] {
            for (name, value) in entries {
                if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                    warnings.push(format!("policy.{scope}.{name}: entry names must be numbers"));
                } else if CertificateSelector::try_parse(value).is_none() {
                    warnings.push(format!(
                        "policy.{scope}.{name} is not a valid certificate selector"
                    ));
                }
            }
        }

        warnings
    }

    /// Check the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let endpoints = [
            ("access", &self.access.private_service_connect_endpoint),
            ("machine_policy", &self.machine_policy.private_service_connect_endpoint),
            ("user_policy", &self.user_policy.private_service_connect_endpoint),
        ];
        for (section, endpoint) in endpoints {
            if let Some(host) = endpoint.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
                if Host::parse(host).is_err() {
                    errors.push(format!(
                        "{section}.private_service_connect_endpoint '{host}' is not a valid host"
                    ));
                }
            }
        }

        for entry in &self.access.psc_overrides {
            if entry.canonical_host.trim().is_empty() {
                errors.push("access.psc_overrides.canonical_host is required".to_string());
            }
            if Host::parse(entry.psc_host.trim()).is_err() {
                errors.push(format!(
                    "access.psc_overrides.psc_host '{}' is not a valid host",
                    entry.psc_host
                ));
            }
        }

        if self.helper.host_name.is_empty() {
            errors.push("helper.host_name is required".to_string());
        }
        if self.helper.extension_id.is_empty() {
            errors.push("helper.extension_id is required".to_string());
        }
        if let Some(version) = &self.helper.min_version {
            if parse_helper_version(version).is_none() {
                errors.push(format!("helper.min_version '{version}' is not a version"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DeviceTrustError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

impl AppSettings for DeviceTrustConfig {
    fn is_device_certificate_authentication_enabled(&self) -> bool {
        self.access_settings().device_certificate_authentication.value
    }

    fn device_certificate_selector(&self) -> Option<String> {
        self.access_settings().device_certificate_selector.value
    }
}

/// Configuration file loader with discovery and precedence rules.
///
/// # Search Order
///
/// Configuration files are searched in the following order (first found wins):
///
/// 1. Explicit path (if set via `with_path()`)
/// 2. Environment variable `DEVICE_TRUST_CONFIG`
/// 3. Windows: `%PROGRAMDATA%\DeviceTrust\config.toml`
/// 4. Windows: `%LOCALAPPDATA%\DeviceTrust\config.toml`
/// 5. Unix: `/etc/device-trust/config.toml`
/// 6. Unix: `~/.config/device-trust/config.toml`
/// 7. `~/.device-trust/config.toml`
/// 8. Current directory: `./device-trust.toml`
///
/// # Example
///
/// ```no_run
/// use device_trust::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_path("/etc/device-trust/config.toml")
///     .load()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    validate: bool,
    env_var_name: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader with default settings.
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            validate: true,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Only read this file.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable validation after loading.
    ///
    /// Default: `true`
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set the environment variable name for path override.
    ///
    /// Default: `DEVICE_TRUST_CONFIG`
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Load the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found, it cannot be read, the TOML is
    /// invalid or validation fails.
    pub fn load(&self) -> Result<DeviceTrustConfig> {
        let path = self.find_config_file()?;
        self.load_path(&path)
    }

    /// Like [`load`](Self::load), but falls back to the defaults when no
    /// file exists in the standard locations.
    ///
    /// An explicit path or environment override that does not exist is
    /// still an error.
    pub fn load_or_default(&self) -> Result<DeviceTrustConfig> {
        if self.explicit_path.is_some() || std::env::var_os(&self.env_var_name).is_some() {
            return self.load();
        }

        match self.get_search_paths().into_iter().find(|p| p.exists()) {
            Some(path) => self.load_path(&path),
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(DeviceTrustConfig::default())
            }
        }
    }

    /// Load configuration from a TOML string.
    pub fn load_from_str(&self, toml_content: &str) -> Result<DeviceTrustConfig> {
        let config = DeviceTrustConfig::from_toml(toml_content)?;
        if self.validate {
            config.validate()?;
        }
        for warning in config.warnings() {
            tracing::warn!("Configuration: {}", warning);
        }
        Ok(config)
    }

    fn load_path(&self, path: &Path) -> Result<DeviceTrustConfig> {
        let toml_content = std::fs::read_to_string(path).map_err(|e| {
            DeviceTrustError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        tracing::debug!("Loading configuration from {}", path.display());
        self.load_from_str(&toml_content)
    }

    /// Find the configuration file path.
    pub fn find_config_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.explicit_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(DeviceTrustError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        if let Ok(env_path) = std::env::var(&self.env_var_name) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(path);
            }
            return Err(DeviceTrustError::config(format!(
                "Configuration file from {} not found: {}",
                self.env_var_name, env_path
            )));
        }

        let search_paths = self.get_search_paths();
        if let Some(path) = search_paths.iter().find(|p| p.exists()) {
            return Ok(path.clone());
        }

        Err(DeviceTrustError::config(format!(
            "No configuration file found. Searched:\n  - {}",
            search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n  - ")
        )))
    }

    /// Get the list of paths to search for configuration files.
    pub fn get_search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(windows)]
        {
            if let Some(program_data) = std::env::var_os("PROGRAMDATA") {
                paths.push(PathBuf::from(program_data).join("DeviceTrust").join("config.toml"));
            }
            if let Some(local_app_data) = dirs::data_local_dir() {
                paths.push(local_app_data.join("DeviceTrust").join("config.toml"));
            }
        }

        #[cfg(unix)]
        {
            paths.push(PathBuf::from("/etc/device-trust/config.toml"));
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("device-trust").join("config.toml"));
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".device-trust").join("config.toml"));
        }

        paths.push(PathBuf::from(CONFIG_FILE_NAME));
        paths
    }

    /// Check if a configuration file exists in any standard location.
    pub fn config_exists(&self) -> bool {
        self.find_config_file().is_ok()
    }
}
