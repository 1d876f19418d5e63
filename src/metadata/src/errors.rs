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

//! Errors reported while resolving the instance identity.
//!
//! There are two error types. [MetadataUnavailable] is returned by a
//! [MetadataProvider] when a single query fails. These errors are absorbed by
//! the retry loop and never reach callers of the accessors.
//! [ResolutionFailed] is the terminal error: the retry policy gave up and the
//! service could not be constructed.
//!
//! [MetadataProvider]: crate::provider::MetadataProvider

use http::StatusCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Represents a failure to query a metadata source.
///
/// The error records the cause of the failure (transport, status, malformed
/// payload, or timeout) and whether the failure is transient, that is, whether
/// a later attempt against the same source may succeed.
///
/// Applications rarely need to create instances of this error type. The
/// exception is tests that use a provider double to simulate failures.
///
/// # Example
/// ```
/// # use csi_instance_metadata::errors::MetadataUnavailable;
/// let err = MetadataUnavailable::transport("simulated connection refused");
/// assert!(err.is_transport());
/// assert!(err.is_transient());
/// assert!(format!("{err}").contains("simulated connection refused"));
/// ```
#[derive(Clone, Debug)]
pub struct MetadataUnavailable {
    cause: Cause,
    is_transient: bool,
    source: Arc<dyn Error + Send + Sync>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cause {
    Transport,
    Status(u16),
    Malformed,
    Timeout,
    Interrupted,
}

impl MetadataUnavailable {
    /// The metadata source could not be reached.
    ///
    /// Transport errors are transient: the endpoint may not be reachable in
    /// the first instants after the instance boots.
    pub fn transport<T: Into<BoxError>>(source: T) -> Self {
        Self::new(Cause::Transport, true, source)
    }

    /// The metadata source did not answer before the request deadline.
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::new(Cause::Timeout, true, source)
    }

    /// The metadata source answered with a non-success status code.
    ///
    /// Whether the error is transient depends on the status code, see
    /// [is_transient_status].
    pub fn status<T: Into<BoxError>>(code: u16, source: T) -> Self {
        let transient = StatusCode::from_u16(code).is_ok_and(is_transient_status);
        Self::new(Cause::Status(code), transient, source)
    }

    /// The metadata source answered, but the payload is unusable.
    ///
    /// Examples include an undecodable body, a missing or empty field, or a
    /// region that does not match the availability zone. Malformed payloads
    /// are not transient.
    pub fn malformed<T: Into<BoxError>>(source: T) -> Self {
        Self::new(Cause::Malformed, false, source)
    }

    /// The query never completed, its task panicked or was cancelled.
    pub(crate) fn interrupted<T: Into<BoxError>>(source: T) -> Self {
        Self::new(Cause::Interrupted, false, source)
    }

    /// Replaces the source, keeping the cause and the transient flag.
    pub(crate) fn with_source<T: Into<BoxError>>(&self, source: T) -> Self {
        Self::new(self.cause, self.is_transient, source)
    }

    fn new<T: Into<BoxError>>(cause: Cause, is_transient: bool, source: T) -> Self {
        Self {
            cause,
            is_transient,
            source: Arc::from(source.into()),
        }
    }

    /// Returns `true` if the metadata source could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self.cause, Cause::Transport)
    }

    /// Returns `true` if the metadata source returned a non-success status.
    pub fn is_status(&self) -> bool {
        matches!(self.cause, Cause::Status(_))
    }

    /// Returns `true` if the payload was missing fields or could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(self.cause, Cause::Malformed)
    }

    /// Returns `true` if the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, Cause::Timeout)
    }

    /// Returns `true` if the query was abandoned before it completed.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.cause, Cause::Interrupted)
    }

    /// Returns `true` if a future attempt may succeed.
    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    /// The status code returned by the metadata source, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self.cause {
            Cause::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl Error for MetadataUnavailable {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl Display for Cause {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Cause::Transport => write!(f, "no route to metadata endpoint"),
            Cause::Status(code) => write!(f, "metadata endpoint returned status {code}"),
            Cause::Malformed => write!(f, "malformed metadata response"),
            Cause::Timeout => write!(f, "metadata request timed out"),
            Cause::Interrupted => write!(f, "metadata query did not complete"),
        }
    }
}

impl Display for MetadataUnavailable {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let msg = if self.is_transient {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        write!(f, "{}, {}, source: {}", self.cause, msg, self.source)
    }
}

/// The instance identity could not be resolved.
///
/// This error is terminal. The driver cannot place volumes without the
/// instance identity, so the owning process should refuse to start. The last
/// provider error is available via [Error::source] and is included in the
/// display output.
#[derive(thiserror::Error, Clone, Debug)]
#[error("cannot resolve instance identity after {attempts} attempt(s), {reason}: {last}")]
pub struct ResolutionFailed {
    attempts: u32,
    reason: Reason,
    #[source]
    last: MetadataUnavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reason {
    Exhausted,
    Permanent,
    Interrupted,
}

impl Display for Reason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Reason::Exhausted => write!(f, "retry policy exhausted"),
            Reason::Permanent => write!(f, "permanent error"),
            Reason::Interrupted => write!(f, "resolution interrupted"),
        }
    }
}

impl ResolutionFailed {
    pub(crate) fn exhausted(attempts: u32, last: MetadataUnavailable) -> Self {
        Self {
            attempts,
            reason: Reason::Exhausted,
            last,
        }
    }

    pub(crate) fn permanent(attempts: u32, last: MetadataUnavailable) -> Self {
        Self {
            attempts,
            reason: Reason::Permanent,
            last,
        }
    }

    pub(crate) fn interrupted(attempts: u32, last: MetadataUnavailable) -> Self {
        Self {
            attempts,
            reason: Reason::Interrupted,
            last,
        }
    }

    /// The number of times the provider was queried.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` if the retry policy ran out of attempts.
    pub fn is_exhausted(&self) -> bool {
        self.reason == Reason::Exhausted
    }

    /// Returns `true` if the retry policy stopped on a non-retryable error.
    pub fn is_permanent(&self) -> bool {
        self.reason == Reason::Permanent
    }

    /// Returns `true` if the resolution task panicked or its runtime shut
    /// down before the retry policy reached a decision.
    pub fn is_interrupted(&self) -> bool {
        self.reason == Reason::Interrupted
    }

    /// The error returned by the last provider query.
    pub fn last_error(&self) -> &MetadataUnavailable {
        &self.last
    }
}

/// Returns `true` for status codes where a later request may succeed.
pub(crate) fn is_transient_status(c: StatusCode) -> bool {
    matches!(
        c,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
    )
}

/// Maps a `reqwest` error to the matching cause.
pub(crate) fn from_http_error(err: reqwest::Error, msg: &str) -> MetadataUnavailable {
    let message = format!("{msg}: {err}");
    if err.is_timeout() {
        MetadataUnavailable::timeout(message)
    } else if err.is_decode() {
        MetadataUnavailable::malformed(message)
    } else {
        MetadataUnavailable::transport(message)
    }
}

/// Consumes a non-success response and maps it to a status error.
pub(crate) async fn from_http_response(
    response: reqwest::Response,
    msg: &str,
) -> MetadataUnavailable {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<cannot read body: {e}>"));
    MetadataUnavailable::status(status.as_u16(), format!("{msg}, body=<{body}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StatusCode::INTERNAL_SERVER_ERROR)]
    #[test_case(StatusCode::SERVICE_UNAVAILABLE)]
    #[test_case(StatusCode::REQUEST_TIMEOUT)]
    #[test_case(StatusCode::TOO_MANY_REQUESTS)]
    fn transient(c: StatusCode) {
        assert!(is_transient_status(c));
        let e = MetadataUnavailable::status(c.as_u16(), "test-only");
        assert!(e.is_transient(), "{e:?}");
        assert_eq!(e.status_code(), Some(c.as_u16()));
    }

    #[test_case(StatusCode::NOT_FOUND)]
    #[test_case(StatusCode::UNAUTHORIZED)]
    #[test_case(StatusCode::BAD_REQUEST)]
    #[test_case(StatusCode::BAD_GATEWAY)]
    #[test_case(StatusCode::FORBIDDEN)]
    fn permanent(c: StatusCode) {
        assert!(!is_transient_status(c));
        let e = MetadataUnavailable::status(c.as_u16(), "test-only");
        assert!(!e.is_transient(), "{e:?}");
        assert!(e.is_status(), "{e:?}");
    }

    #[test]
    fn constructors() {
        let e = MetadataUnavailable::transport("test message");
        assert!(e.is_transport(), "{e:?}");
        assert!(e.is_transient(), "{e:?}");
        assert!(e.source().is_some(), "{e:?}");
        assert_eq!(e.status_code(), None);

        let e = MetadataUnavailable::timeout("test message");
        assert!(e.is_timeout(), "{e:?}");
        assert!(e.is_transient(), "{e:?}");

        let e = MetadataUnavailable::malformed("test message");
        assert!(e.is_malformed(), "{e:?}");
        assert!(!e.is_transient(), "{e:?}");
        assert!(!e.is_transport(), "{e:?}");
    }

    #[test]
    fn interrupted() {
        let e = MetadataUnavailable::interrupted("task panicked");
        assert!(e.is_interrupted(), "{e:?}");
        assert!(!e.is_transient(), "{e:?}");
        assert!(e.to_string().contains("did not complete"), "{e}");

        let failed = ResolutionFailed::interrupted(2, e);
        assert!(failed.is_interrupted(), "{failed:?}");
        assert!(!failed.is_exhausted(), "{failed:?}");
        assert!(!failed.is_permanent(), "{failed:?}");
        assert_eq!(failed.attempts(), 2);
        assert!(failed.to_string().contains("task panicked"), "{failed}");
    }

    #[test_case(MetadataUnavailable::status(503, "first"))]
    #[test_case(MetadataUnavailable::status(404, "first"))]
    #[test_case(MetadataUnavailable::malformed("first"))]
    #[test_case(MetadataUnavailable::timeout("first"))]
    fn with_source(e: MetadataUnavailable) {
        let got = e.with_source("second");
        assert_eq!(got.is_transient(), e.is_transient(), "{got:?}");
        assert_eq!(got.status_code(), e.status_code(), "{got:?}");
        assert_eq!(got.is_malformed(), e.is_malformed(), "{got:?}");
        assert_eq!(got.is_timeout(), e.is_timeout(), "{got:?}");
        assert!(got.to_string().contains("second"), "{got}");
        assert!(!got.to_string().contains("first"), "{got}");
    }

    #[test]
    fn fmt() {
        let e = MetadataUnavailable::transport("test-only-err-123");
        let got = format!("{e}");
        assert!(got.contains("test-only-err-123"), "{got}");
        assert!(got.contains("no route to metadata endpoint"), "{got}");
        assert!(got.contains(TRANSIENT_MSG), "{got}");

        let e = MetadataUnavailable::malformed("test-only-err-123");
        let got = format!("{e}");
        assert!(got.contains("malformed metadata response"), "{got}");
        assert!(got.contains(PERMANENT_MSG), "{got}");
    }

    #[test]
    fn resolution_failed() {
        let last = MetadataUnavailable::transport("connection refused");
        let e = ResolutionFailed::exhausted(5, last);
        assert!(e.is_exhausted(), "{e:?}");
        assert!(!e.is_permanent(), "{e:?}");
        assert_eq!(e.attempts(), 5);
        assert!(e.last_error().is_transport(), "{e:?}");
        let got = format!("{e}");
        assert!(got.contains("after 5 attempt(s)"), "{got}");
        assert!(got.contains("no route to metadata endpoint"), "{got}");
        assert!(got.contains("connection refused"), "{got}");

        let source = e.source().and_then(|s| s.downcast_ref::<MetadataUnavailable>());
        assert!(source.is_some(), "{e:?}");

        let e = ResolutionFailed::permanent(1, MetadataUnavailable::malformed("bad json"));
        assert!(e.is_permanent(), "{e:?}");
        assert!(format!("{e}").contains("malformed metadata response"), "{e}");
    }
}
