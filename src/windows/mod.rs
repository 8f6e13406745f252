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

//! Windows platform integration.
//!
//! - **Certificate stores**: [`SystemCertificateStore`] reads the personal
//!   stores of `LocalMachine` and `CurrentUser`.
//! - **Policy**: [`RegistryPolicySource`] reads the certificate selection
//!   policy of either scope from the registry.
//! - **Native helper**: [`registry::native_messaging_manifests`] finds the
//!   helper's manifest registration.
//!
//! # Feature Gate
//!
//! This module is only available when:
//! - The `windows` feature is enabled
//! - Compiling for a Windows target (`cfg(windows)`)

pub mod certstore;
pub mod registry;

pub use certstore::{CertStore, SystemCertificateStore};
pub use registry::RegistryPolicySource;

use crate::policy::{CertificateSelectionPolicy, PolicySource};

/// The selection policy configured in the registry, machine scope first.
pub fn registry_selection_policy() -> CertificateSelectionPolicy {
    let machine = RegistryPolicySource::machine();
    let user = RegistryPolicySource::user();
    CertificateSelectionPolicy::from_sources([
        &machine as &dyn PolicySource,
        &user as &dyn PolicySource,
    ])
}
