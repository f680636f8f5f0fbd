//! Job messages carried on the pipeline queues.
//!
//! Every job is a JSON object produced by the upstream API service. Field
//! names follow that service and are part of the queue contract.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::Network;

/// Default hold time used when a file job carries an unparsable value.
pub const DEFAULT_HOLD_TIME_MONTHS: i64 = 1;

/// Billing details shared by all jobs.
///
/// Jobs that were not pre-charged report a cost of zero and are never
/// refunded.
pub trait Billing {
    fn username(&self) -> &str;

    fn credit_cost(&self) -> f64 {
        0.0
    }
}

/// Pin an existing content hash on a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinJob {
    pub cid: String,
    pub network_name: Network,
    pub username: String,
    pub hold_time_in_months: i64,
    #[serde(default)]
    pub credit_cost: f64,
}

/// Add a staged upload to a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileJob {
    pub bucket_name: String,
    pub object_name: String,
    pub network_name: Network,
    pub username: String,
    /// Numeric string, see [`FileJob::hold_time_months`].
    pub hold_time_in_months: String,
}

impl FileJob {
    /// Parsed hold time, falling back to one month.
    pub fn hold_time_months(&self) -> i64 {
        self.hold_time_in_months
            .trim()
            .parse()
            .unwrap_or(DEFAULT_HOLD_TIME_MONTHS)
    }
}

/// Replicate a content hash through the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPinJob {
    pub cid: String,
    pub network_name: Network,
    pub username: String,
    pub hold_time_in_months: i64,
    #[serde(default)]
    pub credit_cost: f64,
}

/// The replication hand-off after a local pin. The pin was billed already,
/// so the follow-on job carries no charge of its own.
impl From<&PinJob> for ClusterPinJob {
    fn from(job: &PinJob) -> Self {
        ClusterPinJob {
            cid: job.cid.clone(),
            network_name: job.network_name.clone(),
            username: job.username.clone(),
            hold_time_in_months: job.hold_time_in_months,
            credit_cost: 0.0,
        }
    }
}

/// Publish a naming record pointing at `cid`, signed with the key `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpnsPublishJob {
    pub key: String,
    pub cid: String,
    pub network_name: Network,
    pub username: String,
    #[serde(with = "nanos")]
    pub lifetime: Duration,
    #[serde(with = "nanos")]
    pub ttl: Duration,
    #[serde(default)]
    pub credit_cost: f64,
}

/// Generate and register a named signing key for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCreationJob {
    #[serde(rename = "type")]
    pub key_type: String,
    /// Bits, only meaningful for RSA.
    #[serde(default)]
    pub size: u32,
    pub name: String,
    pub username: String,
    pub network_name: Network,
}

/// Send one email per recipient. `usernames` and `emails` are index aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSend {
    pub subject: String,
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

/// Remove a pin from a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRemovalJob {
    pub content_hash: String,
    pub network_name: Network,
    pub username: String,
}

impl Billing for PinJob {
    fn username(&self) -> &str {
        &self.username
    }

    fn credit_cost(&self) -> f64 {
        self.credit_cost
    }
}

impl Billing for FileJob {
    fn username(&self) -> &str {
        &self.username
    }
}

impl Billing for ClusterPinJob {
    fn username(&self) -> &str {
        &self.username
    }

    fn credit_cost(&self) -> f64 {
        self.credit_cost
    }
}

impl Billing for IpnsPublishJob {
    fn username(&self) -> &str {
        &self.username
    }

    fn credit_cost(&self) -> f64 {
        self.credit_cost
    }
}

impl Billing for KeyCreationJob {
    fn username(&self) -> &str {
        &self.username
    }
}

impl Billing for EmailSend {
    fn username(&self) -> &str {
        self.usernames.first().map(String::as_str).unwrap_or_default()
    }
}

impl Billing for PinRemovalJob {
    fn username(&self) -> &str {
        &self.username
    }
}

/// Durations encoded as integer nanoseconds.
pub mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        if nanos < 0 {
            return Err(serde::de::Error::custom("negative duration"));
        }
        Ok(Duration::from_nanos(nanos as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_job_decodes() {
        let job: PinJob = serde_json::from_str(
            r#"{"cid":"Qm123","network_name":"public","username":"alice","hold_time_in_months":3,"credit_cost":10}"#,
        )
        .unwrap();
        assert_eq!(job.network_name, Network::Public);
        assert_eq!(job.hold_time_in_months, 3);
        assert_eq!(job.credit_cost(), 10.0);
    }

    #[test]
    fn test_file_job_hold_time_fallback() {
        let mut job = FileJob {
            bucket_name: "b".into(),
            object_name: "o".into(),
            network_name: Network::Public,
            username: "alice".into(),
            hold_time_in_months: "12".into(),
        };
        assert_eq!(job.hold_time_months(), 12);

        job.hold_time_in_months = "twelve".into();
        assert_eq!(job.hold_time_months(), DEFAULT_HOLD_TIME_MONTHS);
    }

    #[test]
    fn test_ipns_durations_are_nanoseconds() {
        let job: IpnsPublishJob = serde_json::from_str(
            r#"{"key":"k","cid":"Qm1","network_name":"public","username":"bob",
                "lifetime":86400000000000,"ttl":60000000000,"credit_cost":2}"#,
        )
        .unwrap();
        assert_eq!(job.lifetime, Duration::from_secs(86_400));
        assert_eq!(job.ttl, Duration::from_secs(60));

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["ttl"], 60_000_000_000u64);
    }

    #[test]
    fn test_key_job_type_field() {
        let job: KeyCreationJob = serde_json::from_str(
            r#"{"type":"ed25519","name":"main","username":"carol","network_name":"public"}"#,
        )
        .unwrap();
        assert_eq!(job.key_type, "ed25519");
        assert_eq!(job.size, 0);
    }

    #[test]
    fn test_unbilled_jobs_cost_nothing() {
        let job = PinRemovalJob {
            content_hash: "Qm1".into(),
            network_name: Network::Public,
            username: "dave".into(),
        };
        assert_eq!(job.credit_cost(), 0.0);
    }
}
