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

//! Enterprise certificate selection policy.
//!
//! The policy is the union of the certificate selectors that administrators
//! configured at machine scope and at user scope. Each scope is read from a
//! [`PolicySource`], which exposes the named values of a policy key. Only
//! values with purely numeric names are selectors, and they are read in
//! ascending numeric order.
//!
//! Malformed entries never surface as errors. They are logged and skipped so
//! that one broken entry cannot block authentication.

use std::fmt;

use url::Url;

use crate::certificate::{Certificate, CertificateSelector};

/// Scope a policy value was configured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyScope {
    /// Applies to every user of the machine.
    Machine,
    /// Applies to the current user only.
    User,
}

impl fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine => write!(f, "machine"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A read-only source of policy values for one scope.
pub trait PolicySource: Send + Sync {
    /// The scope of this source.
    fn scope(&self) -> PolicyScope;

    /// All named values of the policy key, in any order.
    fn values(&self) -> Vec<(String, String)>;

    /// Values whose name is a non-negative integer, in ascending order.
    fn numeric_entries(&self) -> Vec<(u64, String)> {
        numeric_entries(self.values())
    }
}

/// Keep the entries whose name is purely numeric and sort them by number.
pub fn numeric_entries(values: impl IntoIterator<Item = (String, String)>) -> Vec<(u64, String)> {
    let mut entries: Vec<(u64, String)> = values
        .into_iter()
        .filter_map(|(name, value)| {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                tracing::debug!("Ignoring non-numeric policy entry '{}'", name);
                return None;
            }
            name.parse::<u64>().ok().map(|index| (index, value))
        })
        .collect();

    entries.sort_by_key(|(index, _)| *index);
    entries
}

/// A policy source backed by a list of values.
#[derive(Debug, Clone)]
pub struct InMemoryPolicySource {
    scope: PolicyScope,
    values: Vec<(String, String)>,
}

impl InMemoryPolicySource {
    /// Create an empty source for a scope.
    pub fn new(scope: PolicyScope) -> Self {
        Self {
            scope,
            values: Vec::new(),
        }
    }

    /// Add a named value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }
}

impl PolicySource for InMemoryPolicySource {
    fn scope(&self) -> PolicyScope {
        self.scope
    }

    fn values(&self) -> Vec<(String, String)> {
        self.values.clone()
    }
}

/// A selector together with where it was configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    /// Scope of the source the selector came from.
    pub scope: PolicyScope,
    /// Numeric name of the entry.
    pub index: u64,
    /// The parsed selector.
    pub selector: CertificateSelector,
}

/// The union of all machine and user certificate selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateSelectionPolicy {
    entries: Vec<PolicyEntry>,
}

impl CertificateSelectionPolicy {
    /// A policy without selectors. It authorizes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the policy from sources, in the order given.
    ///
    /// Pass the machine source before the user source.
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a dyn PolicySource>) -> Self {
        let mut entries = Vec::new();

        for source in sources {
            let scope = source.scope();
            for (index, value) in source.numeric_entries() {
                match CertificateSelector::try_parse(&value) {
                    Some(selector) => entries.push(PolicyEntry {
                        scope,
                        index,
                        selector,
                    }),
                    None => {
                        tracing::warn!(
                            "Ignoring malformed {} certificate selector policy entry {}",
                            scope,
                            index
                        );
                    }
                }
            }
        }

        tracing::debug!("Loaded {} certificate selector policy entries", entries.len());
        Self { entries }
    }

    /// Whether any selector authorizes the certificate for the URL.
    pub fn is_applicable(&self, uri: &Url, certificate: &Certificate) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.selector.is_match_certificate(uri, certificate))
    }

    /// All entries, machine scope first.
    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    /// Number of selectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the policy has no selectors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
