// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Instance identity and placement for block-storage CSI drivers.
//!
//! A CSI node plugin needs to know which instance it runs on, the machine
//! class of that instance, and where the instance is placed. These values
//! decide which volumes can be attached to the node and how the node is
//! described to the container orchestrator.
//!
//! The driver code uses the [MetadataService][service::MetadataService]
//! trait. [InstanceMetadata][service::InstanceMetadata] implements it by
//! querying a [MetadataProvider][provider::MetadataProvider] once, at
//! startup, retrying transient failures with backoff. If the identity cannot
//! be resolved the driver should exit.
//!
//! ```no_run
//! # use csi_instance_metadata::provider::ProviderChain;
//! # use csi_instance_metadata::service::{InstanceMetadata, MetadataService};
//! # async fn sample() -> anyhow::Result<()> {
//! let metadata = InstanceMetadata::builder(ProviderChain::default_chain())
//!     .build()
//!     .await?;
//! println!(
//!     "node {} ({}) in {}/{}",
//!     metadata.get_instance_id(),
//!     metadata.get_instance_type(),
//!     metadata.get_region(),
//!     metadata.get_availability_zone()
//! );
//! # Ok(()) }
//! ```

pub mod backoff;
pub mod errors;
pub mod identity;
pub mod provider;
pub mod retry;
pub mod service;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use errors::{MetadataUnavailable, ResolutionFailed};
pub use identity::InstanceIdentity;
pub use service::{InstanceMetadata, MetadataService};

/// A `Result` alias where the `Err` case is [MetadataUnavailable].
pub type Result<T> = std::result::Result<T, errors::MetadataUnavailable>;
