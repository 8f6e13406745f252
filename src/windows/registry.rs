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

//! Registry-backed policy sources and helper registration.
//!
//! Certificate selectors are read from
//! `Software\Policies\Google\Chrome\AutoSelectCertificateForUrls` under
//! `HKEY_LOCAL_MACHINE` (machine scope) and `HKEY_CURRENT_USER` (user
//! scope). The native helper registers its manifest as the default value of
//! `Software\Google\Chrome\NativeMessagingHosts\<host>`.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use windows::Win32::System::Registry::{
    RegCloseKey, RegEnumValueW, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_CURRENT_USER,
    HKEY_LOCAL_MACHINE, KEY_READ, REG_EXPAND_SZ, REG_SZ, REG_VALUE_TYPE,
};

use crate::policy::{PolicyScope, PolicySource};

/// Policy key holding the numbered certificate selectors.
pub const CERTIFICATE_POLICY_KEY: &str =
    "Software\\Policies\\Google\\Chrome\\AutoSelectCertificateForUrls";

/// Parent key of native messaging host registrations.
pub const NATIVE_MESSAGING_HOSTS_KEY: &str = "Software\\Google\\Chrome\\NativeMessagingHosts";

// Longest registry value name, in UTF-16 units, including the terminator.
const MAX_VALUE_NAME: usize = 16_384;

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// An open registry key, closed on drop.
struct RegistryKey(HKEY);

impl RegistryKey {
    fn open(root: HKEY, path: &str) -> Option<Self> {
        let wide_path = wide(path);
        let mut key = HKEY::default();
        let status = unsafe { RegOpenKeyExW(root, PCWSTR(wide_path.as_ptr()), 0, KEY_READ, &mut key) };
        if status != ERROR_SUCCESS {
            tracing::trace!("Registry key {} not readable: {:?}", path, status);
            return None;
        }
        Some(Self(key))
    }

    /// String value `name`, the default value for an empty name.
    fn string(&self, name: &str) -> Option<String> {
        let wide_name = wide(name);
        let mut kind = REG_VALUE_TYPE::default();
        let mut size = 0u32;

        let status = unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide_name.as_ptr()),
                None,
                Some(&mut kind),
                None,
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS || (kind != REG_SZ && kind != REG_EXPAND_SZ) {
            return None;
        }

        let mut data = vec![0u16; (size as usize).div_ceil(2) + 1];
        let mut size = (data.len() * 2) as u32;
        let status = unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide_name.as_ptr()),
                None,
                None,
                Some(data.as_mut_ptr() as *mut u8),
                Some(&mut size),
            )
        };
        (status == ERROR_SUCCESS).then(|| from_wide(&data))
    }

    /// All string values of the key.
    fn string_values(&self) -> Vec<(String, String)> {
        let mut values = Vec::new();
        let mut name = vec![0u16; MAX_VALUE_NAME];

        for index in 0.. {
            let mut name_len = name.len() as u32;
            let mut kind = 0u32;
            let status = unsafe {
                RegEnumValueW(
                    self.0,
                    index,
                    PWSTR(name.as_mut_ptr()),
                    &mut name_len,
                    None,
                    Some(&mut kind),
                    None,
                    None,
                )
            };

            if status == ERROR_NO_MORE_ITEMS {
                break;
            }
            if status != ERROR_SUCCESS {
                tracing::debug!("Stopped enumerating registry values: {:?}", status);
                break;
            }
            if kind != REG_SZ.0 && kind != REG_EXPAND_SZ.0 {
                continue;
            }

            let value_name = String::from_utf16_lossy(&name[..name_len as usize]);
            if let Some(value) = self.string(&value_name) {
                values.push((value_name, value));
            }
        }

        values
    }
}

impl Drop for RegistryKey {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

fn scope_root(scope: PolicyScope) -> HKEY {
    match scope {
        PolicyScope::Machine => HKEY_LOCAL_MACHINE,
        PolicyScope::User => HKEY_CURRENT_USER,
    }
}

/// Certificate selection policy read from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicySource {
    scope: PolicyScope,
}

impl RegistryPolicySource {
    /// Source for the machine scope (`HKEY_LOCAL_MACHINE`).
    pub fn machine() -> Self {
        Self {
            scope: PolicyScope::Machine,
        }
    }

    /// Source for the user scope (`HKEY_CURRENT_USER`).
    pub fn user() -> Self {
        Self {
            scope: PolicyScope::User,
        }
    }
}

impl PolicySource for RegistryPolicySource {
    fn scope(&self) -> PolicyScope {
        self.scope
    }

    fn values(&self) -> Vec<(String, String)> {
        match RegistryKey::open(scope_root(self.scope), CERTIFICATE_POLICY_KEY) {
            Some(key) => key.string_values(),
            None => Vec::new(),
        }
    }
}

/// Manifest files registered for `host_name`, per-user registration first.
pub fn native_messaging_manifests(host_name: &str) -> Vec<PathBuf> {
    let path = format!("{}\\{}", NATIVE_MESSAGING_HOSTS_KEY, host_name);

    [HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE]
        .into_iter()
        .filter_map(|root| RegistryKey::open(root, &path))
        .filter_map(|key| key.string(""))
        .filter(|manifest| !manifest.is_empty())
        .map(PathBuf::from)
        .collect()
}
