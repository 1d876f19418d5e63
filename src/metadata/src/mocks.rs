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

//! Test doubles for the service and provider traits.
//!
//! Driver code that depends on [MetadataService] can be tested without a
//! metadata endpoint. Downstream crates enable the `mocks` feature to use
//! these types.

use crate::Result;
use crate::identity::InstanceIdentity;
use crate::provider::MetadataProvider;
use crate::service::MetadataService;

mockall::mock! {
    #[derive(Debug)]
    pub MetadataService { }

    impl MetadataService for MetadataService {
        fn get_instance_id(&self) -> String;
        fn get_instance_type(&self) -> String;
        fn get_availability_zone(&self) -> String;
        fn get_region(&self) -> String;
    }
}

mockall::mock! {
    #[derive(Debug)]
    pub MetadataProvider { }

    #[async_trait::async_trait]
    impl MetadataProvider for MetadataProvider {
        async fn fetch_identity(&self) -> Result<InstanceIdentity>;
    }
}
