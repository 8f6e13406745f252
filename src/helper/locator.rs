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

//! Discovery of the native helper executable.
//!
//! The helper registers itself as a browser native messaging host. The
//! registration is a JSON manifest:
//!
//! ```json
//! {
//!   "name": "com.google.secure_connect.native_helper",
//!   "path": "/opt/secure-connect/native-helper",
//!   "type": "stdio",
//!   "allowed_origins": ["chrome-extension://.../"]
//! }
//! ```
//!
//! On Windows the manifest location is found in the registry, elsewhere the
//! manifest sits in well-known directories under the host name.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DeviceTrustError, Result};

/// Native messaging host name of the endpoint verification helper.
pub const DEFAULT_HOST_NAME: &str = "com.google.secure_connect.native_helper";

/// Extension ID the helper is registered for.
pub const DEFAULT_EXTENSION_ID: &str = "callobklhcbilhphinckomhgkigmfocg";

/// Origin of the browser extension `extension_id`.
pub fn extension_origin(extension_id: &str) -> String {
    format!("chrome-extension://{}/", extension_id)
}

/// Finds the helper executable.
pub trait HelperLocator: Send + Sync {
    /// Path of the helper executable, or `None` if it is not installed.
    fn locate(&self) -> Option<PathBuf>;
}

/// A locator that always returns the same path.
#[derive(Debug, Clone)]
pub struct FixedHelperLocator {
    path: Option<PathBuf>,
}

impl FixedHelperLocator {
    /// Locate the helper at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A locator for a machine without helper.
    pub fn not_installed() -> Self {
        Self { path: None }
    }
}

impl HelperLocator for FixedHelperLocator {
    fn locate(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Native messaging host manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct NativeMessagingManifest {
    /// Host name.
    pub name: String,
    /// Path of the executable, absolute or relative to the manifest.
    pub path: PathBuf,
    /// Transport type, always `stdio`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Extension origins allowed to talk to the host.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl NativeMessagingManifest {
    /// Read and check a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&contents)?;

        if manifest.kind != "stdio" {
            return Err(DeviceTrustError::helper_unavailable(format!(
                "Unsupported native messaging host type '{}' in {}",
                manifest.kind,
                path.display()
            )));
        }

        Ok(manifest)
    }

    /// The executable path, resolved against the manifest's directory.
    pub fn executable(&self, manifest_path: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            manifest_path
                .parent()
                .map(|dir| dir.join(&self.path))
                .unwrap_or_else(|| self.path.clone())
        }
    }
}

/// Locates the helper through its native messaging manifest.
#[derive(Debug, Clone)]
pub struct ManifestHelperLocator {
    host_name: String,
    extension_id: String,
    manifest_paths: Vec<PathBuf>,
}

impl ManifestHelperLocator {
    /// Look for the manifest of `host_name` in the platform locations.
    pub fn new(host_name: impl Into<String>, extension_id: impl Into<String>) -> Self {
        let host_name = host_name.into();
        let manifest_paths = platform_manifest_paths(&host_name);
        Self {
            host_name,
            extension_id: extension_id.into(),
            manifest_paths,
        }
    }

    /// Only consider the given manifest file.
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_paths = vec![path.into()];
        self
    }

    /// Manifest files that are tried, in order.
    pub fn manifest_paths(&self) -> &[PathBuf] {
        &self.manifest_paths
    }

    /// The origin the helper expects to be called from.
    pub fn origin(&self) -> String {
        extension_origin(&self.extension_id)
    }

    fn try_manifest(&self, path: &Path) -> Option<PathBuf> {
        if !path.exists() {
            return None;
        }

        let manifest = match NativeMessagingManifest::load(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("Ignoring native messaging manifest {}: {}", path.display(), e);
                return None;
            }
        };

        if manifest.name != self.host_name {
            tracing::debug!(
                "Manifest {} is for host '{}', not '{}'",
                path.display(),
                manifest.name,
                self.host_name
            );
            return None;
        }

        let origin = self.origin();
        if !manifest.allowed_origins.is_empty() && !manifest.allowed_origins.contains(&origin) {
            tracing::debug!("Manifest {} does not allow {}", path.display(), origin);
            return None;
        }

        Some(manifest.executable(path))
    }
}

impl Default for ManifestHelperLocator {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_NAME, DEFAULT_EXTENSION_ID)
    }
}

impl HelperLocator for ManifestHelperLocator {
    fn locate(&self) -> Option<PathBuf> {
        let found = self
            .manifest_paths
            .iter()
            .find_map(|path| self.try_manifest(path));

        match &found {
            Some(path) => tracing::debug!("Native helper found at {}", path.display()),
            None => tracing::debug!("Native helper '{}' is not installed", self.host_name),
        }
        found
    }
}

#[cfg(all(windows, feature = "windows"))]
fn platform_manifest_paths(host_name: &str) -> Vec<PathBuf> {
    crate::windows::registry::native_messaging_manifests(host_name)
}

#[cfg(all(windows, not(feature = "windows")))]
fn platform_manifest_paths(_host_name: &str) -> Vec<PathBuf> {
    Vec::new()
}

#[cfg(target_os = "macos")]
fn platform_manifest_paths(host_name: &str) -> Vec<PathBuf> {
    let file = format!("{}.json", host_name);
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(
            home.join("Library/Application Support/Google/Chrome/NativeMessagingHosts")
                .join(&file),
        );
    }
    paths.push(PathBuf::from("/Library/Google/Chrome/NativeMessagingHosts").join(&file));
    paths
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_manifest_paths(host_name: &str) -> Vec<PathBuf> {
    let file = format!("{}.json", host_name);
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(
            home.join(".config/google-chrome/NativeMessagingHosts")
                .join(&file),
        );
    }
    paths.push(PathBuf::from("/etc/opt/chrome/native-messaging-hosts").join(&file));
    paths
}
