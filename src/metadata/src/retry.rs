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

//! Defines traits for retry policies and some common implementations.
//!
//! Metadata providers never retry. The resolution loop queries the provider,
//! and on failure asks the retry policy whether to try again. Retry policies
//! must be bounded: the loop runs once, at startup, and the process does not
//! serve requests until it finishes.
//!
//! # Example
//! ```
//! # use csi_instance_metadata::retry::*;
//! // Retry transient errors, give up after 3 attempts.
//! let policy = TransientErrorsOnly.with_attempt_limit(3);
//! ```

use crate::backoff::BackoffPolicy;
use crate::errors::{MetadataUnavailable, ResolutionFailed};
use std::sync::Arc;
use std::time::Duration;

/// The default number of attempts, including the first one.
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 5;

/// The result of a retry policy decision.
#[derive(Debug)]
pub enum RetryResult {
    /// The error is non-retryable, stop the loop.
    Permanent(MetadataUnavailable),

    /// The error is retryable, but the policy is stopping the loop.
    ///
    /// Policies may stop the loop on retryable errors, for example, because
    /// the policy only allows a limited number of attempts.
    Exhausted(MetadataUnavailable),

    /// The error was retryable, continue the loop.
    Continue(MetadataUnavailable),
}

impl RetryResult {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// Determines how errors are handled in the resolution loop.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Query the retry policy after an error.
    ///
    /// # Parameters
    /// * `attempt_count` - the number of attempts so far, including the
    ///   attempt that produced `error`.
    /// * `error` - the error returned by the provider.
    fn on_error(&self, attempt_count: u32, error: MetadataUnavailable) -> RetryResult;
}

/// Extension trait for [RetryPolicy].
pub trait RetryPolicyExt: RetryPolicy + Sized {
    /// Decorate a [RetryPolicy] to limit the number of attempts.
    ///
    /// # Parameters
    /// * `maximum_attempts` - the maximum number of attempts, including the
    ///   first one.
    fn with_attempt_limit(self, maximum_attempts: u32) -> LimitedAttemptCount<Self> {
        LimitedAttemptCount::custom(self, maximum_attempts)
    }
}

impl<T: RetryPolicy> RetryPolicyExt for T {}

/// A retry policy that continues on any error.
///
/// This policy must be decorated to limit the number of attempts.
#[derive(Clone, Debug)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn on_error(&self, _attempt_count: u32, error: MetadataUnavailable) -> RetryResult {
        RetryResult::Continue(error)
    }
}

/// A retry policy that continues only on transient errors.
///
/// A malformed payload or a non-retryable status code stops the loop
/// immediately. This policy must be decorated to limit the number of attempts.
#[derive(Clone, Debug)]
pub struct TransientErrorsOnly;

impl RetryPolicy for TransientErrorsOnly {
    fn on_error(&self, _attempt_count: u32, error: MetadataUnavailable) -> RetryResult {
        if error.is_transient() {
            RetryResult::Continue(error)
        } else {
            RetryResult::Permanent(error)
        }
    }
}

/// A retry policy decorator that limits the number of attempts.
///
/// Once the maximum number of attempts is reached this policy always returns
/// [Exhausted][RetryResult::Exhausted]. Before the maximum is reached, the
/// policy returns the result of `P::on_error()`.
#[derive(Clone, Debug)]
pub struct LimitedAttemptCount<P = AlwaysRetry>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_attempts: u32,
}

impl LimitedAttemptCount {
    /// Creates a policy that retries any error, up to `maximum_attempts`.
    pub fn new(maximum_attempts: u32) -> Self {
        Self::custom(AlwaysRetry, maximum_attempts)
    }
}

impl Default for LimitedAttemptCount {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_LIMIT)
    }
}

impl<P: RetryPolicy> LimitedAttemptCount<P> {
    /// Decorates `inner` to stop after `maximum_attempts`.
    pub fn custom(inner: P, maximum_attempts: u32) -> Self {
        Self {
            inner,
            maximum_attempts,
        }
    }

    /// The maximum number of attempts, including the first one.
    pub fn maximum_attempts(&self) -> u32 {
        self.maximum_attempts
    }
}

impl<P: RetryPolicy> RetryPolicy for LimitedAttemptCount<P> {
    fn on_error(&self, attempt_count: u32, error: MetadataUnavailable) -> RetryResult {
        match self.inner.on_error(attempt_count, error) {
            RetryResult::Continue(e) if attempt_count >= self.maximum_attempts => {
                RetryResult::Exhausted(e)
            }
            r => r,
        }
    }
}

/// Runs the retry loop for a given function.
///
/// This function calls `inner` until it succeeds or the retry policy stops
/// the loop. In between calls it sleeps for the delay prescribed by the
/// backoff policy.
pub(crate) async fn retry_loop<F, Fut, T>(
    mut inner: F,
    retry_policy: Arc<dyn RetryPolicy>,
    backoff_policy: Arc<dyn BackoffPolicy>,
) -> Result<T, ResolutionFailed>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, MetadataUnavailable>> + Send,
{
    let mut attempt_count = 0_u32;
    loop {
        attempt_count += 1;
        let error = match inner().await {
            Ok(r) => return Ok(r),
            Err(e) => e,
        };
        match retry_policy.on_error(attempt_count, error) {
            RetryResult::Permanent(e) => {
                return Err(ResolutionFailed::permanent(attempt_count, e));
            }
            RetryResult::Exhausted(e) => {
                return Err(ResolutionFailed::exhausted(attempt_count, e));
            }
            RetryResult::Continue(e) => {
                let delay = backoff_policy.on_failure(attempt_count);
                on_retry(attempt_count, &e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn on_retry(attempt_count: u32, error: &MetadataUnavailable, delay: Duration) {
    tracing::warn!(
        attempt = attempt_count,
        delay_ms = delay.as_millis() as u64,
        transient = error.is_transient(),
        "instance metadata query failed, retrying: {error}"
    );
}
