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

//! Native enrollment helper.
//!
//! The endpoint verification helper is a browser native messaging host that
//! answers questions about the device. It is started once per request, reads
//! one length-prefixed JSON message from stdin, writes one to stdout and
//! exits.
//!
//! # Example
//!
//! ```no_run
//! use device_trust::helper::{
//!     HelperLocator, ManifestHelperLocator, NativeHelperClient, ProcessTransport,
//! };
//!
//! # async fn example() -> device_trust::Result<()> {
//! let locator = ManifestHelperLocator::default();
//! if let Some(path) = locator.locate() {
//!     let client = NativeHelperClient::new(
//!         ProcessTransport::new(path).with_origin(locator.origin()),
//!     );
//!     println!("helper version {}", client.ping().await?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod framing;
pub mod locator;
pub mod messages;

pub use channel::{parse_helper_version, HelperTransport, NativeHelperClient, ProcessTransport};
pub use locator::{extension_origin, FixedHelperLocator, HelperLocator, ManifestHelperLocator};
pub use messages::Command;
