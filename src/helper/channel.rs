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

//! Request/response channel to the native helper.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command as ProcessCommand;

use super::framing::{read_message, write_message};
use super::messages::{
    Command, DeviceInfoResult, PingResult, Request, Response, ShouldEnrollResult,
};
use crate::error::{DeviceTrustError, Result};

/// Carries one serialized request to the helper and returns its response.
#[async_trait]
pub trait HelperTransport: Send + Sync {
    /// Exchange one request payload for one response payload.
    async fn round_trip(&self, request: &[u8]) -> io::Result<Vec<u8>>;
}

/// Spawns the helper executable once per request.
///
/// The helper handles exactly one message on stdin and answers on stdout.
/// The child is killed if the future is dropped before it exits.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessTransport {
    /// Run `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Pass the calling origin, as browsers do for native messaging hosts.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.args.push(origin.into());
        self
    }

    /// The executable.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl HelperTransport for ProcessTransport {
    async fn round_trip(&self, request: &[u8]) -> io::Result<Vec<u8>> {
        let mut child = ProcessCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "helper stdin unavailable"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "helper stdout unavailable"))?;

        write_message(&mut stdin, request).await?;
        drop(stdin);

        let response = read_message(&mut stdout).await?;

        let status = child.wait().await?;
        if !status.success() {
            tracing::debug!("Native helper exited with {}", status);
        }

        Ok(response)
    }
}

/// Typed client for the native helper protocol.
///
/// Command IDs are assigned from a counter owned by the client.
pub struct NativeHelperClient<T> {
    transport: T,
    next_command_id: AtomicU32,
    min_version: Option<semver::Version>,
}

impl<T: HelperTransport> NativeHelperClient<T> {
    /// Create a client without minimum version.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_command_id: AtomicU32::new(1),
            min_version: None,
        }
    }

    /// Treat helpers older than `version` as not installed.
    ///
    /// Returns an error if `version` is not a dotted version number.
    pub fn with_min_version(mut self, version: &str) -> Result<Self> {
        let parsed = parse_helper_version(version).ok_or_else(|| {
            DeviceTrustError::config(format!("Invalid helper version '{}'", version))
        })?;
        self.min_version = Some(parsed);
        Ok(self)
    }

    async fn send<R: DeserializeOwned>(&self, command: Command) -> Result<R> {
        let command_id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        let name = command.name();
        let request = serde_json::to_vec(&Request::new(command_id, command))?;

        tracing::debug!("Sending {} to native helper (command {})", name, command_id);

        let payload = self
            .transport
            .round_trip(&request)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    DeviceTrustError::helper_unavailable(e.to_string())
                }
                _ => DeviceTrustError::HelperIo(e),
            })?;

        let response: Response = serde_json::from_slice(&payload)?;
        debug_assert_eq!(
            response.command_id, command_id,
            "native helper answered a different command"
        );

        response.into_result()
    }

    /// Ask for the helper version.
    pub async fn ping(&self) -> Result<String> {
        let result: PingResult = self.send(Command::Ping).await?;
        Ok(result.version)
    }

    /// Ask whether the device should be enrolled for `user_id`.
    pub async fn should_enroll_device(&self, user_id: &str) -> Result<bool> {
        let result: ShouldEnrollResult = self
            .send(Command::ShouldEnrollDevice {
                user_id: user_id.to_string(),
            })
            .await?;
        Ok(result.should_enroll)
    }

    /// Ask for device attributes.
    pub async fn device_info(&self, attributes: &[&str]) -> Result<BTreeMap<String, String>> {
        let result: DeviceInfoResult = self
            .send(Command::DeviceInfo {
                attributes: attributes.iter().map(|a| a.to_string()).collect(),
            })
            .await?;
        Ok(result.attributes)
    }

    /// Ping the helper and check its version.
    ///
    /// Returns the version, or [`DeviceTrustError::HelperUnavailable`] if the
    /// helper cannot be started or is older than the minimum version.
    pub async fn availability(&self) -> Result<String> {
        let version = self.ping().await?;

        if let Some(min_version) = &self.min_version {
            match parse_helper_version(&version) {
                Some(actual) if actual >= *min_version => {}
                _ => {
                    return Err(DeviceTrustError::helper_unavailable(format!(
                        "Native helper version {} is older than {}",
                        version, min_version
                    )));
                }
            }
        }

        Ok(version)
    }
}

/// Parse a dotted version with one to four numeric components.
///
/// Missing components are zero. A fourth component is kept as numeric build
/// metadata, which orders numerically after the first three.
pub fn parse_helper_version(version: &str) -> Option<semver::Version> {
    let parts: Vec<u64> = version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<_>>()?;

    if parts.is_empty() || parts.len() > 4 {
        return None;
    }

    let component = |i: usize| parts.get(i).copied().unwrap_or(0);
    let mut parsed = semver::Version::new(component(0), component(1), component(2));
    if let Some(revision) = parts.get(3) {
        parsed.build = semver::BuildMetadata::new(&revision.to_string()).ok()?;
    }
    Some(parsed)
}
