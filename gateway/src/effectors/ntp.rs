//! Network time effector. Queries the primary then the backup NTP server and
//! falls back to the system clock when both fail — the tool itself never
//! errors; degraded answers carry a `warning` and `source="system"`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rsntp::AsyncSntpClient;
use serde_json::{json, Value};

use crate::config::NtpConfig;

pub struct NtpEffector {
    primary: String,
    backup: String,
    timeout: Duration,
    timezone: Tz,
}

impl NtpEffector {
    pub fn new(config: &NtpConfig) -> Self {
        let timezone = config.local_timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(
                timezone = %config.local_timezone,
                "unrecognized LOCAL_TIMEZONE, falling back to America/Los_Angeles"
            );
            chrono_tz::America::Los_Angeles
        });
        // Both server attempts plus the system fallback must fit inside the
        // tool's overall deadline, so each query gets half the budget.
        let per_server = Duration::from_secs((config.timeout_secs / 2).max(1));
        Self {
            primary: config.server.clone(),
            backup: config.backup_server.clone(),
            timeout: per_server,
            timezone,
        }
    }

    /// Fetch the current time. Primary, then backup, then system clock.
    pub async fn network_time(&self) -> Value {
        match self.query(&self.primary).await {
            Ok(time) => return self.payload(time, &format!("ntp:{}", self.primary), true, None),
            Err(err) => {
                tracing::warn!(server = %self.primary, error = %err, "primary NTP query failed");
            }
        }

        match self.query(&self.backup).await {
            Ok(time) => return self.payload(time, &format!("ntp:{}", self.backup), true, None),
            Err(err) => {
                tracing::warn!(server = %self.backup, error = %err, "backup NTP query failed");
            }
        }

        self.payload(
            Utc::now(),
            "system",
            false,
            Some("NTP servers unreachable, using the system clock"),
        )
    }

    async fn query(&self, server: &str) -> Result<DateTime<Utc>, String> {
        let mut client = AsyncSntpClient::new();
        client.set_timeout(self.timeout);
        let result = client
            .synchronize(server)
            .await
            .map_err(|err| err.to_string())?;
        result
            .datetime()
            .into_chrono_datetime()
            .map_err(|err| err.to_string())
    }

    fn payload(&self, utc: DateTime<Utc>, source: &str, ntp: bool, warning: Option<&str>) -> Value {
        let local = utc.with_timezone(&self.timezone);
        let mut payload = json!({
            "timestamp_utc": utc.to_rfc3339(),
            "timestamp_local": local.to_rfc3339(),
            "readable_time_utc": utc.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "readable_time_local": local.format("%Y-%m-%d %I:%M:%S %p %Z").to_string(),
            "timezone": self.timezone.name(),
            "source": source,
        });
        if ntp {
            // Offset of the NTP answer against the local clock.
            let offset_ms = (utc - Utc::now()).num_milliseconds();
            payload["offset_ms"] = json!(offset_ms);
        }
        if let Some(warning) = warning {
            payload["warning"] = json!(warning);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effector() -> NtpEffector {
        NtpEffector::new(&NtpConfig {
            server: "pool.ntp.org".to_string(),
            backup_server: "time.google.com".to_string(),
            timeout_secs: 5,
            local_timezone: "America/Los_Angeles".to_string(),
        })
    }

    #[test]
    fn system_payload_carries_warning_and_no_offset() {
        let effector = effector();
        let payload = effector.payload(Utc::now(), "system", false, Some("clock fallback"));
        assert_eq!(payload["source"], "system");
        assert_eq!(payload["warning"], "clock fallback");
        assert_eq!(payload["timezone"], "America/Los_Angeles");
        assert!(payload.get("offset_ms").is_none());
    }

    #[test]
    fn ntp_payload_names_the_server() {
        let effector = effector();
        let payload = effector.payload(Utc::now(), "ntp:pool.ntp.org", true, None);
        assert_eq!(payload["source"], "ntp:pool.ntp.org");
        assert!(payload.get("offset_ms").is_some());
        assert!(payload.get("warning").is_none());
        assert!(payload["readable_time_utc"]
            .as_str()
            .unwrap()
            .ends_with("UTC"));
    }

    #[test]
    fn bad_timezone_falls_back() {
        let effector = NtpEffector::new(&NtpConfig {
            server: "pool.ntp.org".to_string(),
            backup_server: "time.google.com".to_string(),
            timeout_secs: 5,
            local_timezone: "Not/AZone".to_string(),
        });
        assert_eq!(effector.timezone, chrono_tz::America::Los_Angeles);
    }
}
