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

//! Native helper request and response messages.
//!
//! Every request shares one envelope:
//!
//! ```json
//! { "commandId": 7, "protocolVersion": 1, "type": "shouldEnrollDevice", "userId": "..." }
//! ```
//!
//! and every response echoes the command ID and carries either an `error`
//! string or a `result` object.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DeviceTrustError, Result};

/// Protocol version sent with every request.
pub const PROTOCOL_VERSION: u32 = 1;

/// A command understood by the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Ask for the helper's version.
    Ping,
    /// Ask whether the device should be enrolled for a user.
    ShouldEnrollDevice {
        /// Account the question is about.
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Ask for device attributes.
    DeviceInfo {
        /// Names of the attributes to return.
        attributes: Vec<String>,
    },
}

impl Command {
    /// The `type` tag of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ShouldEnrollDevice { .. } => "shouldEnrollDevice",
            Self::DeviceInfo { .. } => "deviceInfo",
        }
    }
}

/// A request as written to the helper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Caller-assigned correlation ID.
    pub command_id: u32,
    /// Always [`PROTOCOL_VERSION`].
    pub protocol_version: u32,
    /// The command and its arguments.
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    /// Wrap a command in an envelope.
    pub fn new(command_id: u32, command: Command) -> Self {
        Self {
            command_id,
            protocol_version: PROTOCOL_VERSION,
            command,
        }
    }
}

/// A response as read from the helper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// ID of the request this answers.
    pub command_id: u32,
    /// Protocol version of the helper.
    #[serde(default)]
    pub protocol_version: u32,
    /// Error reported by the helper, if any.
    #[serde(default)]
    pub error: Option<String>,
    /// Command-specific result.
    #[serde(default)]
    pub result: serde_json::Value,
}

impl Response {
    /// Decode the result, or turn a non-empty `error` into
    /// [`DeviceTrustError::HelperProtocol`].
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if let Some(message) = self.error.filter(|e| !e.is_empty()) {
            return Err(DeviceTrustError::helper_protocol(self.command_id, message));
        }
        Ok(serde_json::from_value(self.result)?)
    }
}

/// Result of [`Command::Ping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResult {
    /// Helper component version, e.g. `2.1.3`.
    pub version: String,
}

/// Result of [`Command::ShouldEnrollDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShouldEnrollResult {
    /// Whether the device should be enrolled.
    pub should_enroll: bool,
}

/// Result of [`Command::DeviceInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoResult {
    /// Requested attributes the helper knows about.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}
