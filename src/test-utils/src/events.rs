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

//! Captures tracing events so tests can assert on what the code logs.
//!
//! # Example
//!
//! ```
//! use csi_instance_metadata_test_utils::events::EventCapture;
//!
//! let (capture, _guard) = EventCapture::install();
//! tracing::warn!(attempt = 2, "retrying");
//!
//! let event = capture.find("retrying").expect("event was logged");
//! assert_eq!(event.level, tracing::Level::WARN);
//! assert_eq!(event.fields.get("attempt").map(String::as_str), Some("2"));
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber, field};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// A tracing event recorded by [EventCapture].
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// The event level.
    pub level: Level,
    /// The formatted message.
    pub message: String,
    /// All other fields, formatted as strings.
    pub fields: BTreeMap<String, String>,
}

struct EventVisitor<'a>(&'a mut CapturedEvent);

impl EventVisitor<'_> {
    fn record(&mut self, field: &field::Field, value: String) {
        if field.name() == "message" {
            self.0.message = value;
        } else {
            self.0.fields.insert(field.name().to_string(), value);
        }
    }
}

impl field::Visit for EventVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.record(field, value.to_string());
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.record(field, value.to_string());
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.record(field, value.to_string());
    }
}

/// A tracing layer that records every event.
///
/// The layer is installed as the default subscriber for the current thread.
/// Use a current-thread runtime in async tests, so spawned tasks log to the
/// same subscriber.
#[derive(Clone, Debug, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Installs a new capture for the current thread.
    ///
    /// Events are recorded until the returned guard is dropped.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// All the events recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().expect("event log is poisoned").clone()
    }

    /// The first event whose message contains `needle`.
    pub fn find(&self, needle: &str) -> Option<CapturedEvent> {
        self.events().into_iter().find(|e| e.message.contains(needle))
    }

    /// The number of events at `level`.
    pub fn count(&self, level: Level) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }
}

impl<S: Subscriber> Layer<S> for EventCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = CapturedEvent {
            level: *event.metadata().level(),
            message: String::new(),
            fields: BTreeMap::new(),
        };
        event.record(&mut EventVisitor(&mut captured));
        self.events
            .lock()
            .expect("event log is poisoned")
            .push(captured);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_fields() {
        let (capture, _guard) = EventCapture::install();
        tracing::info!(zone = "us-east-1a", ready = true, "node placed");
        tracing::error!("giving up");

        let event = capture.find("node placed").expect("event was logged");
        assert_eq!(event.level, Level::INFO);
        assert_eq!(event.fields.get("zone").map(String::as_str), Some("us-east-1a"));
        assert_eq!(event.fields.get("ready").map(String::as_str), Some("true"));
        assert_eq!(capture.count(Level::ERROR), 1);
        assert_eq!(capture.events().len(), 2);
    }

    #[test]
    fn scoped_to_guard() {
        let capture = {
            let (capture, _guard) = EventCapture::install();
            tracing::warn!("inside");
            capture
        };
        tracing::warn!("outside");
        assert!(capture.find("inside").is_some());
        assert!(capture.find("outside").is_none());
    }
}
