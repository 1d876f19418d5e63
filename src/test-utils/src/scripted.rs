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

//! A metadata provider that replays a fixed sequence of answers.

use csi_instance_metadata::provider::MetadataProvider;
use csi_instance_metadata::{InstanceIdentity, MetadataUnavailable, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// A [MetadataProvider] that returns scripted answers in order.
///
/// Once the script runs out the last answer repeats. Every call is counted,
/// wrap the provider in an `Arc` to inspect the count after handing it to
/// the service.
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Vec<Result<InstanceIdentity>>,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedProvider {
    /// Creates a provider that replays `script`.
    pub fn new(script: Vec<Result<InstanceIdentity>>) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Fails `failures` times with `error`, then returns `identity`.
    pub fn failing_then(
        failures: usize,
        error: MetadataUnavailable,
        identity: InstanceIdentity,
    ) -> Self {
        let mut script = vec![Err(error); failures];
        script.push(Ok(identity));
        Self::new(script)
    }

    /// Fails every call with `error`.
    pub fn always_failing(error: MetadataUnavailable) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Sleeps for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The number of calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for ScriptedProvider {
    async fn fetch_identity(&self) -> Result<InstanceIdentity> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let answer = self
            .script
            .get(index)
            .or_else(|| self.script.last())
            .cloned();
        answer.unwrap_or_else(|| Err(MetadataUnavailable::malformed("the script is empty")))
    }
}
