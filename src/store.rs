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

//! Certificate store capability.
//!
//! The resolver only needs to list the personal certificates of the machine
//! and of the current user. The Windows implementation lives in
//! [`crate::windows::certstore`]; [`InMemoryCertificateStore`] serves tests
//! and platforms without a system store.

use crate::certificate::Certificate;
use crate::error::Result;

/// Where a candidate certificate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreLocation {
    /// The machine's personal store.
    Machine,
    /// The current user's personal store.
    User,
}

/// Read-only access to the machine and user certificate stores.
pub trait CertificateStore: Send + Sync {
    /// Certificates in the machine's personal store.
    fn list_machine_certificates(&self) -> Result<Vec<Certificate>>;

    /// Certificates in the current user's personal store.
    fn list_user_certificates(&self) -> Result<Vec<Certificate>>;
}

impl<T: CertificateStore + ?Sized> CertificateStore for &T {
    fn list_machine_certificates(&self) -> Result<Vec<Certificate>> {
        (**self).list_machine_certificates()
    }

    fn list_user_certificates(&self) -> Result<Vec<Certificate>> {
        (**self).list_user_certificates()
    }
}

/// A certificate together with the store it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The certificate.
    pub certificate: Certificate,
    /// Its store.
    pub location: StoreLocation,
}

/// List the client-authentication certificates of both stores.
///
/// Machine certificates come first, each store keeps its enumeration order.
pub fn client_authentication_candidates(store: &dyn CertificateStore) -> Result<Vec<Candidate>> {
    let machine = store
        .list_machine_certificates()?
        .into_iter()
        .map(|certificate| Candidate {
            certificate,
            location: StoreLocation::Machine,
        });
    let user = store
        .list_user_certificates()?
        .into_iter()
        .map(|certificate| Candidate {
            certificate,
            location: StoreLocation::User,
        });

    let candidates: Vec<Candidate> = machine
        .chain(user)
        .filter(|c| c.certificate.is_client_authentication_capable())
        .collect();

    tracing::debug!(
        "Found {} client authentication certificates",
        candidates.len()
    );
    Ok(candidates)
}

/// A certificate store held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCertificateStore {
    machine: Vec<Certificate>,
    user: Vec<Certificate>,
}

impl InMemoryCertificateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a certificate to the machine store.
    pub fn with_machine_certificate(mut self, certificate: Certificate) -> Self {
        self.machine.push(certificate);
        self
    }

    /// Add a certificate to the user store.
    pub fn with_user_certificate(mut self, certificate: Certificate) -> Self {
        self.user.push(certificate);
        self
    }
}

impl CertificateStore for InMemoryCertificateStore {
    fn list_machine_certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.machine.clone())
    }

    fn list_user_certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.user.clone())
    }
}
