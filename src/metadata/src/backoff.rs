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

//! Defines the trait for backoff policies and common implementations.
//!
//! The metadata endpoint may not be reachable in the first instants after the
//! instance boots. The resolution loop should not immediately retry a failed
//! query, it waits for the delay prescribed by a backoff policy.
//!
//! # Example
//! ```
//! # use csi_instance_metadata::backoff::*;
//! use std::time::Duration;
//!
//! let policy = ExponentialBackoffBuilder::new()
//!     .with_initial_delay(Duration::from_millis(100))
//!     .with_maximum_delay(Duration::from_secs(5))
//!     .with_scaling(4.0)
//!     .build()?;
//! assert_eq!(policy.on_failure(1), Duration::from_millis(100));
//! assert_eq!(policy.on_failure(2), Duration::from_millis(400));
//! # Ok::<(), Error>(())
//! ```

use std::time::Duration;

/// Defines the trait implemented by all backoff strategies.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// Returns the backoff delay on a failure.
    ///
    /// # Parameters
    /// * `attempt_count` - the number of attempts so far. This method is
    ///   always called after the first attempt.
    fn on_failure(&self, attempt_count: u32) -> Duration;
}

/// The error type for backoff policy creation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("the scaling value ({0}) should be >= 1.0")]
    InvalidScalingFactor(f64),
    #[error("the initial delay ({0:?}) should be greater than zero")]
    InvalidInitialDelay(Duration),
    #[error(
        "the maximum delay ({maximum:?}) should be greater than or equal to the initial delay ({initial:?})"
    )]
    EmptyRange {
        maximum: Duration,
        initial: Duration,
    },
}

/// Builds a truncated exponential backoff policy.
#[derive(Clone, Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
}

impl ExponentialBackoffBuilder {
    /// Creates a builder with the default parameters.
    pub fn new() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            maximum_delay: DEFAULT_MAXIMUM_DELAY,
            scaling: DEFAULT_SCALING,
        }
    }

    /// Change the initial delay.
    pub fn with_initial_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.initial_delay = v.into();
        self
    }

    /// Change the maximum delay.
    pub fn with_maximum_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.maximum_delay = v.into();
        self
    }

    /// Change the scaling factor in this backoff policy.
    pub fn with_scaling<V: Into<f64>>(mut self, v: V) -> Self {
        self.scaling = v.into();
        self
    }

    /// Creates a new exponential backoff policy.
    pub fn build(self) -> Result<ExponentialBackoff, Error> {
        if self.scaling < 1.0 {
            return Err(Error::InvalidScalingFactor(self.scaling));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidInitialDelay(self.initial_delay));
        }
        if self.maximum_delay < self.initial_delay {
            return Err(Error::EmptyRange {
                maximum: self.maximum_delay,
                initial: self.initial_delay,
            });
        }
        Ok(ExponentialBackoff {
            initial_delay: self.initial_delay,
            maximum_delay: self.maximum_delay,
            scaling: self.scaling,
        })
    }
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAXIMUM_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_SCALING: f64 = 2.0;

/// Implements truncated exponential backoff.
///
/// The first retry waits for the initial delay, each subsequent retry waits
/// `scaling` times longer, up to the maximum delay.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            maximum_delay: DEFAULT_MAXIMUM_DELAY,
            scaling: DEFAULT_SCALING,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn on_failure(&self, attempt_count: u32) -> Duration {
        let exp = std::cmp::min(i32::MAX as u32, attempt_count) as i32;
        let exp = exp.saturating_sub(1);
        let scaling = self.scaling.powi(exp);
        if scaling >= self.maximum_delay.div_duration_f64(self.initial_delay) {
            self.maximum_delay
        } else {
            // .mul_f64() cannot panic: scaling >= 1.0 and we just checked that
            //     self.initial_delay * scaling < maximum_delay.
            self.initial_delay.mul_f64(scaling)
        }
    }
}

/// Implements linear backoff.
///
/// The n-th retry waits for `initial + increment * (n - 1)`, up to the
/// maximum delay.
#[derive(Clone, Debug)]
pub struct LinearBackoff {
    initial_delay: Duration,
    increment: Duration,
    maximum_delay: Duration,
}

impl LinearBackoff {
    /// Creates a new linear backoff policy.
    pub fn new(
        initial_delay: Duration,
        increment: Duration,
        maximum_delay: Duration,
    ) -> Result<Self, Error> {
        if initial_delay.is_zero() {
            return Err(Error::InvalidInitialDelay(initial_delay));
        }
        if maximum_delay < initial_delay {
            return Err(Error::EmptyRange {
                maximum: maximum_delay,
                initial: initial_delay,
            });
        }
        Ok(Self {
            initial_delay,
            increment,
            maximum_delay,
        })
    }
}

impl BackoffPolicy for LinearBackoff {
    fn on_failure(&self, attempt_count: u32) -> Duration {
        let steps = attempt_count.saturating_sub(1);
        self.increment
            .checked_mul(steps)
            .and_then(|d| d.checked_add(self.initial_delay))
            .map_or(self.maximum_delay, |d| std::cmp::min(d, self.maximum_delay))
    }
}
