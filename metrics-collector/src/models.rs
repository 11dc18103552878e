use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Payload reçu d'un publisher sur POST /api/v1/metrics.
/// `metric_time` n'en fait pas partie : il est assigné à l'écriture.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricIn {
    #[serde(rename = "server_ip")]
    pub host_ip: String,
    #[serde(rename = "server_name")]
    pub host_name: String,
    #[serde(rename = "cpu_utilization")]
    pub cpu_pct: f32,
    #[serde(rename = "memory_utilization")]
    pub mem_pct: f32,
    #[serde(rename = "disk_utilization")]
    pub disk_pct: f32,
}

/// Une observation d'un hôte à un instant donné, immuable une fois écrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "server_ip")]
    pub host_ip: String,
    #[serde(rename = "server_name")]
    pub host_name: String,
    #[serde(rename = "metric_time", with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    #[serde(rename = "cpu_utilization")]
    pub cpu_pct: f32,
    #[serde(rename = "memory_utilization")]
    pub mem_pct: f32,
    #[serde(rename = "disk_utilization")]
    pub disk_pct: f32,
}

impl MetricIn {
    /// Identité obligatoire et non vide. Les pourcentages ne sont pas bornés :
    /// une valeur hors [0, 100] est stockée telle quelle.
    pub fn validate(&self) -> Result<(), String> {
        if self.host_ip.trim().is_empty() {
            return Err("server_ip must not be empty".into());
        }
        if self.host_name.trim().is_empty() {
            return Err("server_name must not be empty".into());
        }
        Ok(())
    }

    pub fn into_record(self, observed_at: OffsetDateTime) -> MetricRecord {
        MetricRecord {
            host_ip: self.host_ip,
            host_name: self.host_name,
            observed_at,
            cpu_pct: self.cpu_pct,
            mem_pct: self.mem_pct,
            disk_pct: self.disk_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = r#"{"server_ip":"10.0.0.1","server_name":"web","cpu_utilization":1.0,"memory_utilization":2.0}"#;
        assert!(serde_json::from_str::<MetricIn>(raw).is_err());
    }

    #[test]
    fn test_blank_identity_fails_validation() {
        let raw = r#"{"server_ip":" ","server_name":"web","cpu_utilization":1,"memory_utilization":2,"disk_utilization":3}"#;
        let input: MetricIn = serde_json::from_str(raw).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_out_of_range_values_are_accepted() {
        let raw = r#"{"server_ip":"10.0.0.1","server_name":"web","cpu_utilization":-1,"memory_utilization":250.5,"disk_utilization":0}"#;
        let input: MetricIn = serde_json::from_str(raw).unwrap();
        assert!(input.validate().is_ok());
        let record = input.into_record(OffsetDateTime::UNIX_EPOCH);
        assert_eq!(record.mem_pct, 250.5);
        assert_eq!(record.cpu_pct, -1.0);
    }

    #[test]
    fn test_record_uses_wire_field_names() {
        let record = MetricRecord {
            host_ip: "10.0.0.1".into(),
            host_name: "web".into(),
            observed_at: OffsetDateTime::UNIX_EPOCH,
            cpu_pct: 10.0,
            mem_pct: 20.0,
            disk_pct: 30.0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["server_ip"], "10.0.0.1");
        assert_eq!(json["metric_time"], "1970-01-01T00:00:00Z");
        assert_eq!(json["disk_utilization"], 30.0);
    }
}
