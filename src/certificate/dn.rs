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

//! Distinguished name decomposition and filtering.
//!
//! Names are decomposed into `KEY=value` components using the short keys of
//! the browser policy format (`CN`, `O`, `OU`, `L`, `C`, `S`, ...). Note that
//! state/province is `S`, not the RFC 4514 `ST`.

use std::collections::BTreeMap;
use std::fmt;

use const_oid::db::rfc4519;
use const_oid::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use x509_cert::name::Name;

const OID_EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");
const OID_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
const OID_TITLE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.12");
const OID_GIVEN_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.42");
const OID_SURNAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.4");

/// A decomposed distinguished name.
///
/// Components keep the order in which they appear in the name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DistinguishedName {
    components: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Build a name from `(key, value)` pairs. Keys are upper-cased.
    pub fn from_components<K, V>(components: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            components: components
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_uppercase(), v.into()))
                .collect(),
        }
    }

    /// Parse a string such as `C=US,S=CA,O=Acme,CN=Issuer`.
    ///
    /// Values may be double-quoted, and `\,` escapes a comma. Parts without
    /// an `=` are ignored.
    pub fn parse(dn: &str) -> Self {
        Self::from_components(split_components(dn).into_iter().filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        }))
    }

    /// Decompose an X.509 name.
    ///
    /// Attributes whose value is not a string type are skipped. Attributes
    /// without a short key are rendered with their dotted OID.
    pub fn from_x509(name: &Name) -> Self {
        let mut components = Vec::new();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let Ok(value) = std::str::from_utf8(atv.value.value()) else {
                    continue;
                };
                components.push((attribute_key(&atv.oid), value.to_string()));
            }
        }
        Self { components }
    }

    /// All components in order.
    pub fn components(&self) -> &[(String, String)] {
        &self.components
    }

    /// The first value for the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the name contains exactly this `KEY=value` component.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.components
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(key) && v == value)
    }

    /// Whether the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if value.contains(',') {
                write!(f, "{}=\"{}\"", key, value)?;
            } else {
                write!(f, "{}={}", key, value)?;
            }
        }
        Ok(())
    }
}

fn attribute_key(oid: &ObjectIdentifier) -> String {
    let key = match *oid {
        rfc4519::CN => "CN",
        rfc4519::O => "O",
        rfc4519::OU => "OU",
        rfc4519::L => "L",
        rfc4519::C => "C",
        rfc4519::ST => "S",
        rfc4519::STREET => "STREET",
        rfc4519::DC => "DC",
        OID_EMAIL_ADDRESS => "E",
        OID_SERIAL_NUMBER => "SERIALNUMBER",
        OID_TITLE => "T",
        OID_GIVEN_NAME => "G",
        OID_SURNAME => "SN",
        _ => return oid.to_string(),
    };
    key.to_string()
}

fn split_components(dn: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = dn.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' | ';' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Expected values for the fields of a distinguished name.
///
/// A name matches if every specified field appears verbatim among its
/// components. Unspecified fields impose no constraint, so an empty filter
/// matches any name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedNameFilter {
    /// Common name.
    #[serde(rename = "CN", default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Organization.
    #[serde(rename = "O", default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Organizational unit.
    #[serde(rename = "OU", default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,

    /// Locality.
    #[serde(rename = "L", default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,

    /// Country.
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// State or province.
    #[serde(rename = "S", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Any other field, keyed by its short name (`E`, `DC`, ...).
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

impl DistinguishedNameFilter {
    /// The specified fields as `(key, value)` pairs.
    pub fn fields(&self) -> Vec<(&str, &str)> {
        let known = [
            ("CN", &self.common_name),
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
            ("L", &self.locality),
            ("C", &self.country),
            ("S", &self.state),
        ];

        known
            .into_iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
            .chain(self.other.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .collect()
    }

    /// Check a name against this filter.
    pub fn is_match(&self, dn: &DistinguishedName) -> bool {
        self.fields()
            .into_iter()
            .all(|(key, value)| dn.contains(key, value))
    }
}
