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

//! The instance metadata service.
//!
//! Driver code depends on the [MetadataService] trait. The production
//! implementation, [InstanceMetadata], resolves the identity once, with
//! retries, and serves the cached values for the lifetime of the process.
//!
//! Example usage:
//!
//! ```no_run
//! # use csi_instance_metadata::provider::ProviderChain;
//! # use csi_instance_metadata::service::{InstanceMetadata, MetadataService};
//! # async fn sample() -> anyhow::Result<()> {
//! let metadata = InstanceMetadata::builder(ProviderChain::default_chain())
//!     .build()
//!     .await?;
//! println!("running in {}", metadata.get_availability_zone());
//! # Ok(()) }
//! ```

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::errors::{MetadataUnavailable, ResolutionFailed};
use crate::identity::InstanceIdentity;
use crate::provider::MetadataProvider;
use crate::retry::{LimitedAttemptCount, RetryPolicy, retry_loop};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::watch;

/// The identity and placement of the running instance.
///
/// The accessors never fail and never block. Implementations return the
/// values from a single, completed resolution.
pub trait MetadataService: std::fmt::Debug + Send + Sync {
    /// The instance id.
    fn get_instance_id(&self) -> String;

    /// The machine class of the instance.
    fn get_instance_type(&self) -> String;

    /// The availability zone where the instance runs.
    fn get_availability_zone(&self) -> String;

    /// The region containing the availability zone.
    fn get_region(&self) -> String;
}

/// The lifecycle of a [Resolver].
///
/// Both `Resolved` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionState {
    /// No resolution has started.
    Unresolved,
    /// A resolution is in flight.
    Resolving,
    /// The identity is available.
    Resolved,
    /// The retry policy gave up, or the resolution task stopped early.
    Failed,
}

type Outcome = std::result::Result<Arc<InstanceIdentity>, ResolutionFailed>;

/// Resolves the instance identity at most once.
///
/// The first call to [resolve][Resolver::resolve] starts the resolution in a
/// background task. Concurrent and later callers wait for, and receive, the
/// same outcome. The provider is never queried again, even if the resolution
/// failed.
///
/// Clones share the same resolution.
#[derive(Clone, Debug)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

#[derive(Debug)]
struct ResolverInner {
    provider: Arc<dyn MetadataProvider>,
    retry_policy: Arc<dyn RetryPolicy>,
    backoff_policy: Arc<dyn BackoffPolicy>,
    started: AtomicBool,
    attempts: AtomicU32,
    outcome_tx: watch::Sender<Option<Outcome>>,
}

// Publishes a failure unless the outcome was already published.
struct PublishGuard {
    inner: Arc<ResolverInner>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        let attempts = self.inner.attempts.load(Ordering::Acquire);
        self.inner.outcome_tx.send_if_modified(|outcome| {
            if outcome.is_some() {
                return false;
            }
            let error = ResolutionFailed::interrupted(
                attempts,
                MetadataUnavailable::interrupted("the resolution task panicked or was cancelled"),
            );
            tracing::error!(attempts, "{error}");
            *outcome = Some(Err(error));
            true
        });
    }
}

impl Resolver {
    /// Returns the identity, resolving it if needed.
    ///
    /// The resolution runs in a task of its own, dropping the returned
    /// future does not cancel it. If that task panics, or its runtime shuts
    /// down first, the resolution fails and
    /// [is_interrupted][ResolutionFailed::is_interrupted] returns `true`.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub async fn resolve(&self) -> Outcome {
        let mut outcome_rx = self.inner.outcome_tx.subscribe();
        if !self.inner.started.swap(true, Ordering::AcqRel) {
            // The guard moves into the task, and publishes a failure if the
            // task is dropped or unwinds before it publishes the outcome.
            let guard = PublishGuard {
                inner: self.inner.clone(),
            };
            tokio::spawn(async move {
                let outcome = guard.inner.run().await;
                guard.inner.outcome_tx.send_replace(Some(outcome));
            });
        }
        loop {
            let current = outcome_rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            outcome_rx
                .changed()
                .await
                .expect("the resolver owns the sender");
        }
    }

    /// The current state of the resolution.
    pub fn state(&self) -> ResolutionState {
        match self.inner.outcome_tx.borrow().as_ref() {
            Some(Ok(_)) => ResolutionState::Resolved,
            Some(Err(_)) => ResolutionState::Failed,
            None if self.inner.started.load(Ordering::Acquire) => ResolutionState::Resolving,
            None => ResolutionState::Unresolved,
        }
    }
}

impl ResolverInner {
    async fn run(&self) -> Outcome {
        let provider = self.provider.clone();
        let attempts = &self.attempts;
        let outcome = retry_loop(
            move || {
                attempts.fetch_add(1, Ordering::AcqRel);
                let provider = provider.clone();
                async move { provider.fetch_identity().await }
            },
            self.retry_policy.clone(),
            self.backoff_policy.clone(),
        )
        .await;
        match &outcome {
            Ok(identity) => tracing::info!(
                instance_id = identity.instance_id(),
                instance_type = identity.instance_type(),
                availability_zone = identity.availability_zone(),
                region = identity.region(),
                "resolved instance identity"
            ),
            Err(e) => tracing::error!(attempts = e.attempts(), "{e}"),
        }
        outcome.map(Arc::new)
    }
}

/// Configures the resolution of an [InstanceMetadata].
#[derive(Debug)]
pub struct Builder {
    provider: Arc<dyn MetadataProvider>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    backoff_policy: Option<Arc<dyn BackoffPolicy>>,
}

impl Builder {
    /// Creates a builder that queries `provider`.
    pub fn new<P>(provider: P) -> Self
    where
        P: MetadataProvider + 'static,
    {
        Self {
            provider: Arc::new(provider),
            retry_policy: None,
            backoff_policy: None,
        }
    }

    /// Sets the retry policy.
    ///
    /// Defaults to [LimitedAttemptCount::default], five attempts retrying
    /// any error.
    pub fn with_retry_policy<P>(mut self, policy: P) -> Self
    where
        P: RetryPolicy + 'static,
    {
        self.retry_policy = Some(Arc::new(policy));
        self
    }

    /// Sets the backoff policy.
    ///
    /// Defaults to [ExponentialBackoff::default], starting at 200ms and
    /// doubling up to 5s.
    pub fn with_backoff_policy<P>(mut self, policy: P) -> Self
    where
        P: BackoffPolicy + 'static,
    {
        self.backoff_policy = Some(Arc::new(policy));
        self
    }

    /// Returns a [Resolver] that resolves on first use.
    pub fn resolver(self) -> Resolver {
        let (outcome_tx, _) = watch::channel(None);
        let inner = ResolverInner {
            provider: self.provider,
            retry_policy: self
                .retry_policy
                .unwrap_or_else(|| Arc::new(LimitedAttemptCount::default())),
            backoff_policy: self
                .backoff_policy
                .unwrap_or_else(|| Arc::new(ExponentialBackoff::default())),
            started: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            outcome_tx,
        };
        Resolver {
            inner: Arc::new(inner),
        }
    }

    /// Resolves the identity and returns the service.
    ///
    /// # Errors
    ///
    /// Returns [ResolutionFailed] if the retry policy gives up. The driver
    /// cannot place volumes without the identity, callers should treat this
    /// error as fatal.
    pub async fn build(self) -> std::result::Result<InstanceMetadata, ResolutionFailed> {
        InstanceMetadata::from_resolver(&self.resolver()).await
    }
}

/// A [MetadataService] backed by a resolved [InstanceIdentity].
///
/// The value only exists after a successful resolution, the accessors read
/// an immutable snapshot without locking.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceMetadata {
    identity: Arc<InstanceIdentity>,
}

impl InstanceMetadata {
    /// Returns a builder that queries `provider`.
    pub fn builder<P>(provider: P) -> Builder
    where
        P: MetadataProvider + 'static,
    {
        Builder::new(provider)
    }

    /// Waits for `resolver` and returns the service.
    pub async fn from_resolver(
        resolver: &Resolver,
    ) -> std::result::Result<InstanceMetadata, ResolutionFailed> {
        let identity = resolver.resolve().await?;
        Ok(Self { identity })
    }

    /// The resolved identity.
    pub fn identity(&self) -> Arc<InstanceIdentity> {
        self.identity.clone()
    }
}

impl From<InstanceIdentity> for InstanceMetadata {
    fn from(identity: InstanceIdentity) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }
}

impl MetadataService for InstanceMetadata {
    fn get_instance_id(&self) -> String {
        self.identity.instance_id().to_string()
    }

    fn get_instance_type(&self) -> String {
        self.identity.instance_type().to_string()
    }

    fn get_availability_zone(&self) -> String {
        self.identity.availability_zone().to_string()
    }

    fn get_region(&self) -> String {
        self.identity.region().to_string()
    }
}
