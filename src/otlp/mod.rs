//! OTLP HTTP/JSON envelope types.
//!
//! Only the subset of the OpenTelemetry JSON schema that the client
//! actually emits is modelled: logs as `resourceLogs → scopeLogs →
//! logRecords` and metrics as `resourceMetrics → scopeMetrics → metrics`
//! with `sum` or `gauge` datapoints. Everything else is ignored by serde.
//!
//! Per the OTLP JSON mapping, 64-bit timestamps and integer datapoint
//! values may arrive either as JSON numbers or as decimal strings; the
//! deserializers here accept both.

pub mod value;

use serde::{Deserialize, Deserializer};

pub use value::{AnyValue, AttrBag, AttrValue, KeyValue};

/// `POST /v1/logs` payload.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsEnvelope {
    #[serde(default)]
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    #[serde(default)]
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default, deserialize_with = "de_u64_flexible")]
    pub time_unix_nano: u64,
    #[serde(default)]
    pub body: Option<AnyValue>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

impl LogRecord {
    /// The event class named by the record body, when it is a string.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b.string_value.as_deref())
    }
}

/// `POST /v1/metrics` payload.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEnvelope {
    #[serde(default)]
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMetrics {
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sum: Option<NumberPoints>,
    #[serde(default)]
    pub gauge: Option<NumberPoints>,
}

impl Metric {
    /// Datapoints regardless of whether the metric is a sum or a gauge.
    pub fn data_points(&self) -> &[NumberDataPoint] {
        self.sum
            .as_ref()
            .or(self.gauge.as_ref())
            .map_or(&[], |p| p.data_points.as_slice())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberPoints {
    #[serde(default)]
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
    #[serde(default, deserialize_with = "de_u64_flexible")]
    pub time_unix_nano: u64,
    #[serde(default)]
    pub as_double: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64_flexible")]
    pub as_int: Option<i64>,
}

impl NumberDataPoint {
    /// The point value, defaulting to 0 when neither field is present.
    pub fn value(&self) -> f64 {
        self.as_double
            .or(self.as_int.map(|i| i as f64))
            .unwrap_or(0.0)
    }
}

/// Accept a u64 encoded as a JSON number or a decimal string.
fn de_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Ok(n),
        Some(Raw::Str(s)) => Ok(s.trim().parse().unwrap_or(0)),
        None => Ok(0),
    }
}

fn de_opt_i64_flexible<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_logs_envelope() {
        let envelope: LogsEnvelope = serde_json::from_str(
            r#"{
                "resourceLogs": [{
                    "resource": {"attributes": [{"key":"service.name","value":{"stringValue":"claude-code"}}]},
                    "scopeLogs": [{
                        "logRecords": [{
                            "timeUnixNano": "1705314645123000000",
                            "body": {"stringValue": "claude_code.user_prompt"},
                            "attributes": [{"key":"prompt_length","value":{"intValue":"12"}}]
                        }]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let record = &envelope.resource_logs[0].scope_logs[0].log_records[0];
        assert_eq!(record.time_unix_nano, 1_705_314_645_123_000_000);
        assert_eq!(record.body_str(), Some("claude_code.user_prompt"));
        let bag = AttrBag::decode(&record.attributes);
        assert_eq!(bag.i64_or_zero("prompt_length"), 12);
    }

    #[test]
    fn parses_sum_and_gauge_metrics() {
        let envelope: MetricsEnvelope = serde_json::from_str(
            r#"{
                "resourceMetrics": [{
                    "scopeMetrics": [{
                        "metrics": [
                            {
                                "name": "claude_code.cost.usage",
                                "sum": {"dataPoints": [{"timeUnixNano": 1, "asDouble": 0.25}]}
                            },
                            {
                                "name": "claude_code.active_time.total",
                                "gauge": {"dataPoints": [{"timeUnixNano": "2", "asInt": "90"}]}
                            }
                        ]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let metrics = &envelope.resource_metrics[0].scope_metrics[0].metrics;
        assert_eq!(metrics[0].data_points()[0].value(), 0.25);
        assert_eq!(metrics[1].data_points()[0].value(), 90.0);
        assert_eq!(metrics[1].data_points()[0].time_unix_nano, 2);
    }

    #[test]
    fn missing_value_defaults_to_zero() {
        let dp: NumberDataPoint = serde_json::from_str(r#"{"timeUnixNano": 5}"#).unwrap();
        assert_eq!(dp.value(), 0.0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let envelope: LogsEnvelope = serde_json::from_str(
            r#"{"resourceLogs":[{"schemaUrl":"x","scopeLogs":[{"scope":{"name":"s"},"logRecords":[{"severityNumber":9}]}]}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.resource_logs[0].scope_logs[0].log_records.len(), 1);
    }
}
