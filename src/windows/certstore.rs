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

//! Windows Certificate Store access.
//!
//! Device certificates live in the personal (`My`) stores of the
//! `LocalMachine` and `CurrentUser` locations. Stores are opened read-only
//! and every certificate in them is returned as a [`Certificate`].
//!
//! # Example
//!
//! ```no_run,ignore
//! use device_trust::store::client_authentication_candidates;
//! use device_trust::windows::certstore::SystemCertificateStore;
//!
//! let candidates = client_authentication_candidates(&SystemCertificateStore::new())?;
//! for candidate in candidates {
//!     println!("{}: {}", candidate.location, candidate.certificate.subject());
//! }
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::os::windows::ffi::OsStrExt;

use windows::Win32::Foundation::GetLastError;
use windows::Win32::Security::Cryptography::{
    CertCloseStore, CertEnumCertificatesInStore, CertOpenStore, CERT_CONTEXT,
    CERT_OPEN_STORE_FLAGS, CERT_QUERY_ENCODING_TYPE, CERT_STORE_PROV_SYSTEM_W,
    CERT_STORE_READONLY_FLAG, CERT_SYSTEM_STORE_CURRENT_USER, CERT_SYSTEM_STORE_LOCAL_MACHINE,
    HCERTSTORE, HCRYPTPROV_LEGACY,
};

use crate::certificate::Certificate;
use crate::error::{DeviceTrustError, Result};
use crate::store::{CertificateStore, StoreLocation};

/// Name of the personal certificate store.
pub const PERSONAL_STORE: &str = "My";

fn store_flags(location: StoreLocation) -> u32 {
    match location {
        StoreLocation::Machine => CERT_SYSTEM_STORE_LOCAL_MACHINE,
        StoreLocation::User => CERT_SYSTEM_STORE_CURRENT_USER,
    }
}

fn location_name(location: StoreLocation) -> &'static str {
    match location {
        StoreLocation::Machine => "LocalMachine",
        StoreLocation::User => "CurrentUser",
    }
}

/// An open system certificate store.
///
/// The store handle is released when this value is dropped.
pub struct CertStore {
    location: StoreLocation,
    name: String,
    handle: HCERTSTORE,
}

impl fmt::Debug for CertStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertStore({}\\{})", location_name(self.location), self.name)
    }
}

impl CertStore {
    /// Open the system store `name` at `location` read-only.
    pub fn open(location: StoreLocation, name: &str) -> Result<Self> {
        let wide_name: Vec<u16> = OsStr::new(name)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe {
            CertOpenStore(
                CERT_STORE_PROV_SYSTEM_W,
                CERT_QUERY_ENCODING_TYPE(0),
                HCRYPTPROV_LEGACY::default(),
                CERT_OPEN_STORE_FLAGS(store_flags(location) | CERT_STORE_READONLY_FLAG.0),
                Some(wide_name.as_ptr() as *const _),
            )
        };

        match handle {
            Ok(handle) if !handle.is_invalid() => Ok(Self {
                location,
                name: name.to_string(),
                handle,
            }),
            _ => {
                let code = unsafe { GetLastError() };
                Err(DeviceTrustError::certificate_store(format!(
                    "Failed to open certificate store {}\\{}: Windows error 0x{:08X}",
                    location_name(location),
                    name,
                    code.0
                )))
            }
        }
    }

    /// Every certificate in the store that parses as X.509.
    pub fn list_certificates(&self) -> Vec<Certificate> {
        let mut certificates = Vec::new();
        let mut context: *const CERT_CONTEXT = std::ptr::null();

        loop {
            context = unsafe { CertEnumCertificatesInStore(self.handle, Some(context)) };
            if context.is_null() {
                break;
            }

            // The context stays valid until the next enumeration call.
            let der = unsafe {
                let ctx = &*context;
                std::slice::from_raw_parts(ctx.pbCertEncoded, ctx.cbCertEncoded as usize).to_vec()
            };

            match Certificate::from_der(&der) {
                Ok(certificate) => certificates.push(certificate),
                Err(e) => tracing::debug!("Skipping unparsable certificate in {:?}: {}", self, e),
            }
        }

        certificates
    }
}

impl Drop for CertStore {
    fn drop(&mut self) {
        unsafe {
            let _ = CertCloseStore(self.handle, 0);
        }
    }
}

/// The personal stores of the local machine and the current user.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCertificateStore;

impl SystemCertificateStore {
    /// Create the store provider.
    pub fn new() -> Self {
        Self
    }

    fn list(&self, location: StoreLocation) -> Result<Vec<Certificate>> {
        let store = CertStore::open(location, PERSONAL_STORE)?;
        let certificates = store.list_certificates();
        tracing::debug!("{} certificates in {:?}", certificates.len(), store);
        Ok(certificates)
    }
}

impl CertificateStore for SystemCertificateStore {
    fn list_machine_certificates(&self) -> Result<Vec<Certificate>> {
        self.list(StoreLocation::Machine)
    }

    fn list_user_certificates(&self) -> Result<Vec<Certificate>> {
        self.list(StoreLocation::User)
    }
}
