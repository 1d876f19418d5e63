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

//! The identity and placement of the running instance.

use crate::Result;
use crate::errors::MetadataUnavailable;

/// The identity and placement of the instance running the driver.
///
/// All four fields are validated together when the value is created. There is
/// no way to create a partial identity, and the fields cannot change once the
/// value exists.
///
/// # Example
/// ```
/// # use csi_instance_metadata::identity::InstanceIdentity;
/// let identity = InstanceIdentity::new("i-0123", "m5.large", "us-east-1a", "us-east-1")?;
/// assert_eq!(identity.region(), "us-east-1");
/// # Ok::<(), csi_instance_metadata::errors::MetadataUnavailable>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceIdentity {
    instance_id: String,
    instance_type: String,
    availability_zone: String,
    region: String,
}

impl InstanceIdentity {
    /// Creates a new identity, validating all the fields.
    ///
    /// # Errors
    ///
    /// Returns a [malformed][MetadataUnavailable::is_malformed] error if any
    /// field is empty, or if the availability zone does not belong to the
    /// region.
    pub fn new<A, B, C, D>(
        instance_id: A,
        instance_type: B,
        availability_zone: C,
        region: D,
    ) -> Result<Self>
    where
        A: Into<String>,
        B: Into<String>,
        C: Into<String>,
        D: Into<String>,
    {
        let identity = Self {
            instance_id: non_empty("instance id", instance_id.into())?,
            instance_type: non_empty("instance type", instance_type.into())?,
            availability_zone: non_empty("availability zone", availability_zone.into())?,
            region: non_empty("region", region.into())?,
        };
        if !zone_in_region(&identity.availability_zone, &identity.region) {
            return Err(MetadataUnavailable::malformed(format!(
                "availability zone {} is not in region {}",
                identity.availability_zone, identity.region
            )));
        }
        Ok(identity)
    }

    /// Creates a new identity, deriving the region from the availability zone.
    ///
    /// # Errors
    ///
    /// Returns a [malformed][MetadataUnavailable::is_malformed] error if any
    /// field is empty, or if no region can be derived from the zone.
    pub fn with_derived_region<A, B, C>(
        instance_id: A,
        instance_type: B,
        availability_zone: C,
    ) -> Result<Self>
    where
        A: Into<String>,
        B: Into<String>,
        C: Into<String>,
    {
        let availability_zone = non_empty("availability zone", availability_zone.into())?;
        let region = region_from_zone(&availability_zone).ok_or_else(|| {
            MetadataUnavailable::malformed(format!(
                "cannot derive a region from availability zone {availability_zone}"
            ))
        })?;
        Self::new(instance_id, instance_type, availability_zone, region)
    }

    /// The instance id, unique per running instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The machine class of the instance.
    pub fn instance_type(&self) -> &str {
        &self.instance_type
    }

    /// The availability zone where the instance runs.
    pub fn availability_zone(&self) -> &str {
        &self.availability_zone
    }

    /// The region containing the availability zone.
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(MetadataUnavailable::malformed(format!(
            "missing or empty {field}"
        )));
    }
    Ok(value)
}

// The zone is the region name plus a locality suffix, e.g. `us-east-1a` or
// `us-west-2-lax-1a`. The suffix cannot extend the region number.
fn zone_in_region(zone: &str, region: &str) -> bool {
    zone.strip_prefix(region)
        .and_then(|suffix| suffix.chars().next())
        .is_some_and(|c| !c.is_ascii_digit())
}

/// Derives the region from an availability zone name.
///
/// The region is the zone name without its trailing locality suffix, for
/// example `us-east-1a` is in `us-east-1`. Returns `None` if the zone has no
/// such suffix.
///
/// # Example
/// ```
/// # use csi_instance_metadata::identity::region_from_zone;
/// assert_eq!(region_from_zone("us-east-1a").as_deref(), Some("us-east-1"));
/// assert_eq!(region_from_zone("us-east-1"), None);
/// ```
pub fn region_from_zone(zone: &str) -> Option<String> {
    let region = zone.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if region.len() == zone.len() || region.is_empty() || region.ends_with('-') {
        return None;
    }
    Some(region.to_string())
}
