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
//! Resolves the instance identity against a fake metadata endpoint.

use csi_instance_metadata::backoff::LinearBackoff;
use csi_instance_metadata::provider::imds::ImdsProvider;
use csi_instance_metadata::retry::{LimitedAttemptCount, RetryPolicyExt, TransientErrorsOnly};
use csi_instance_metadata::service::{InstanceMetadata, MetadataService};
use csi_instance_metadata_test_utils::events::EventCapture;
use httptest::{Expectation, Server, matchers::*, responders::*};
use scoped_env::ScopedEnv;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

type TestResult = anyhow::Result<()>;

const TOKEN_PATH: &str = "/latest/api/token";
const DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

fn document() -> serde_json::Value {
    json!({
        "accountId": "123456789012",
        "availabilityZone": "us-east-1a",
        "instanceId": "i-0123",
        "instanceType": "m5.large",
        "region": "us-east-1",
    })
}

fn fast_backoff() -> LinearBackoff {
    LinearBackoff::new(
        Duration::from_millis(10),
        Duration::from_millis(10),
        Duration::from_millis(50),
    )
    .expect("hard-coded values are valid")
}

// The environment variable takes precedence over `with_endpoint()`.
const ENDPOINT_ENV_VAR: &str = "AWS_EC2_METADATA_SERVICE_ENDPOINT";

fn provider(server: &Server) -> ImdsProvider {
    ImdsProvider::builder()
        .with_endpoint(format!("http://{}", server.addr()))
        .build()
}

#[tokio::test]
#[serial]
async fn resolve_with_session_token() -> TestResult {
    let _env = ScopedEnv::remove(ENDPOINT_ENV_VAR);
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("PUT", TOKEN_PATH),
            request::headers(contains(("x-aws-ec2-metadata-token-ttl-seconds", "21600"))),
        ])
        .times(1)
        .respond_with(status_code(200).body("session-token")),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", DOCUMENT_PATH),
            request::headers(contains(("x-aws-ec2-metadata-token", "session-token"))),
        ])
        .times(1)
        .respond_with(json_encoded(document())),
    );

    let metadata = InstanceMetadata::builder(provider(&server)).build().await?;
    assert_eq!(metadata.get_instance_id(), "i-0123");
    assert_eq!(metadata.get_instance_type(), "m5.large");
    assert_eq!(metadata.get_availability_zone(), "us-east-1a");
    assert_eq!(metadata.get_region(), "us-east-1");
    Ok(())
}

#[tokio::test]
#[serial]
async fn retries_server_errors() -> TestResult {
    let _env = ScopedEnv::remove(ENDPOINT_ENV_VAR);
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("PUT", TOKEN_PATH))
            .times(3)
            .respond_with(status_code(404)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", DOCUMENT_PATH))
            .times(3)
            .respond_with(httptest::cycle![
                status_code(503).body("try again"),
                status_code(500).body("try again"),
                json_encoded(document()),
            ]),
    );

    let metadata = InstanceMetadata::builder(provider(&server))
        .with_backoff_policy(fast_backoff())
        .build()
        .await?;
    assert_eq!(metadata.get_region(), "us-east-1");
    Ok(())
}

#[tokio::test]
#[serial]
async fn exhausted_is_fatal() {
    let _env = ScopedEnv::remove(ENDPOINT_ENV_VAR);
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("PUT", TOKEN_PATH))
            .times(3)
            .respond_with(status_code(503)),
    );

    let err = InstanceMetadata::builder(provider(&server))
        .with_retry_policy(LimitedAttemptCount::new(3))
        .with_backoff_policy(fast_backoff())
        .build()
        .await
        .unwrap_err();
    assert!(err.is_exhausted(), "{err:?}");
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.last_error().status_code(), Some(503));
    assert!(err.to_string().contains("after 3 attempt"), "{err}");
}

#[tokio::test]
#[serial]
async fn permanent_errors_are_not_retried() {
    let _env = ScopedEnv::remove(ENDPOINT_ENV_VAR);
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("PUT", TOKEN_PATH))
            .times(1)
            .respond_with(status_code(200).body("session-token")),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", DOCUMENT_PATH))
            .times(1)
            .respond_with(status_code(200).body("not json")),
    );

    let err = InstanceMetadata::builder(provider(&server))
        .with_retry_policy(TransientErrorsOnly.with_attempt_limit(5))
        .with_backoff_policy(fast_backoff())
        .build()
        .await
        .unwrap_err();
    assert!(err.is_permanent(), "{err:?}");
    assert_eq!(err.attempts(), 1);
    assert!(err.last_error().is_malformed(), "{err:?}");
}

#[tokio::test]
#[serial]
async fn logs_retries_and_outcome() -> TestResult {
    let _env = ScopedEnv::remove(ENDPOINT_ENV_VAR);
    let (capture, _guard) = EventCapture::install();
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("PUT", TOKEN_PATH))
            .times(2)
            .respond_with(status_code(405)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", DOCUMENT_PATH))
            .times(2)
            .respond_with(httptest::cycle![
                status_code(503),
                json_encoded(document()),
            ]),
    );

    InstanceMetadata::builder(provider(&server))
        .with_backoff_policy(fast_backoff())
        .build()
        .await?;

    let retry = capture
        .find("retrying")
        .expect("the retry is logged");
    assert_eq!(retry.level, tracing::Level::WARN);
    assert_eq!(retry.fields.get("attempt").map(String::as_str), Some("1"));
    assert_eq!(retry.fields.get("transient").map(String::as_str), Some("true"));

    let resolved = capture
        .find("resolved instance identity")
        .expect("the outcome is logged");
    assert_eq!(resolved.level, tracing::Level::INFO);
    assert_eq!(
        resolved.fields.get("availability_zone").map(String::as_str),
        Some("us-east-1a")
    );
    assert_eq!(capture.count(tracing::Level::ERROR), 0);
    Ok(())
}
