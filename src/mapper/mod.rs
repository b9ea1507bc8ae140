//! Classification of OTLP records into domain events and metric samples.
//!
//! Mappers are pure: they read a record's attribute bag and produce a
//! typed value (or nothing, for unrecognized records). All session
//! mutation and backend emission happens in the session layer.

pub mod event;
pub mod metric;

use chrono::{DateTime, Utc};

pub use event::{ApiRequest, ClientEvent, EventKind};
pub use metric::{LineChange, MetricSample, PrCounterName, SampleKind, TokenKind};

use crate::otlp::AttrBag;

/// Resolve the effective timestamp of a record in Unix nanoseconds.
///
/// The client stamps an `event.timestamp` attribute (ISO-8601) which
/// overrides the OTLP `timeUnixNano` when present and parseable. Records
/// with no usable timestamp get the current wall clock.
pub fn resolve_timestamp_ns(bag: &AttrBag, otlp_ns: u64) -> u64 {
    if let Some(iso) = bag.get_str("event.timestamp")
        && let Ok(parsed) = DateTime::parse_from_rfc3339(iso)
    {
        return parsed
            .timestamp_nanos_opt()
            .map(|n| n.max(0) as u64)
            .unwrap_or(otlp_ns);
    }
    if otlp_ns > 0 {
        return otlp_ns;
    }
    Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

/// Convert Unix nanoseconds to a UTC datetime. Zero maps to the epoch.
pub fn nanos_to_datetime(ns: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(
        (ns / 1_000_000_000) as i64,
        (ns % 1_000_000_000) as u32,
    )
    .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otlp::KeyValue;

    fn bag(json: &str) -> AttrBag {
        let attrs: Vec<KeyValue> = serde_json::from_str(json).unwrap();
        AttrBag::decode(&attrs)
    }

    #[test]
    fn event_timestamp_attribute_overrides_otlp_time() {
        let bag = bag(r#"[{"key":"event.timestamp","value":{"stringValue":"2024-01-15T10:30:45.123Z"}}]"#);
        let ns = resolve_timestamp_ns(&bag, 42);
        assert_eq!(ns, 1_705_314_645_123_000_000);
    }

    #[test]
    fn falls_back_to_otlp_time() {
        let ns = resolve_timestamp_ns(&AttrBag::default(), 42);
        assert_eq!(ns, 42);
    }

    #[test]
    fn unparseable_iso_falls_back() {
        let bag = bag(r#"[{"key":"event.timestamp","value":{"stringValue":"yesterday"}}]"#);
        assert_eq!(resolve_timestamp_ns(&bag, 42), 42);
    }

    #[test]
    fn zero_timestamp_uses_wall_clock() {
        let before = Utc::now().timestamp_nanos_opt().unwrap() as u64;
        let ns = resolve_timestamp_ns(&AttrBag::default(), 0);
        assert!(ns >= before);
    }

    #[test]
    fn nanos_round_trip() {
        let dt = nanos_to_datetime(1_705_314_645_123_000_000);
        assert_eq!(dt.to_rfc3339(), "2024-01-15T10:30:45.123+00:00");
    }
}
