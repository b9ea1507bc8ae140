//! Typed decoding of OTLP JSON attribute values.
//!
//! OTLP encodes attribute values as a tagged union (`stringValue`,
//! `intValue`, `doubleValue`, `boolValue`, `arrayValue`, `kvlistValue`).
//! The JSON encoding additionally serializes 64-bit integers as strings,
//! so numeric accessors coerce the string form where a number is expected.

use std::collections::HashMap;

use serde::Deserialize;

/// A decoded OTLP attribute value.
///
/// Unknown or empty tags decode to [`AttrValue::Null`] rather than
/// producing an error; the ingest path treats attribute bags as untrusted.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Array(Vec<AttrValue>),
    Map(HashMap<String, AttrValue>),
    Null,
}

impl AttrValue {
    /// Borrow the string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view. Numeric strings are parsed; doubles are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            AttrValue::Double(d) => Some(*d as i64),
            AttrValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view. Accepts int, double, and numeric-string forms.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Double(d) => Some(*d),
            AttrValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// OTLP `AnyValue` in its JSON encoding.
///
/// Exactly one tag field is expected to be set; when several are present
/// the first in declaration order wins, and when none are present the
/// value decodes to null.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: Option<String>,
    pub int_value: Option<JsonInt>,
    pub double_value: Option<f64>,
    pub bool_value: Option<bool>,
    pub array_value: Option<ArrayValue>,
    pub kvlist_value: Option<KvlistValue>,
}

/// An OTLP integer, which the JSON encoding emits as either a bare number
/// or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonInt {
    Num(i64),
    Str(String),
}

impl JsonInt {
    fn value(&self) -> Option<i64> {
        match self {
            JsonInt::Num(n) => Some(*n),
            JsonInt::Str(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvlistValue {
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

/// One `{key, value}` attribute record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub value: Option<AnyValue>,
}

impl AnyValue {
    /// Decode into a native [`AttrValue`]. Never fails.
    pub fn decode(&self) -> AttrValue {
        if let Some(s) = &self.string_value {
            return AttrValue::String(s.clone());
        }
        if let Some(i) = &self.int_value {
            return match i.value() {
                Some(n) => AttrValue::Int(n),
                None => AttrValue::Null,
            };
        }
        if let Some(d) = self.double_value {
            return AttrValue::Double(d);
        }
        if let Some(b) = self.bool_value {
            return AttrValue::Bool(b);
        }
        if let Some(arr) = &self.array_value {
            return AttrValue::Array(arr.values.iter().map(AnyValue::decode).collect());
        }
        if let Some(kvs) = &self.kvlist_value {
            let map = kvs
                .values
                .iter()
                .map(|kv| {
                    let v = kv.value.as_ref().map_or(AttrValue::Null, AnyValue::decode);
                    (kv.key.clone(), v)
                })
                .collect();
            return AttrValue::Map(map);
        }
        AttrValue::Null
    }
}

/// A decoded attribute bag with typed, defaulting accessors.
///
/// Duplicate keys are last-write-wins, matching how OTLP processors
/// treat repeated attributes.
#[derive(Debug, Clone, Default)]
pub struct AttrBag {
    values: HashMap<String, AttrValue>,
}

impl AttrBag {
    pub fn decode(attributes: &[KeyValue]) -> Self {
        let mut values = HashMap::with_capacity(attributes.len());
        for kv in attributes {
            let v = kv.value.as_ref().map_or(AttrValue::Null, AnyValue::decode);
            values.insert(kv.key.clone(), v);
        }
        Self { values }
    }

    /// Merge `other` underneath this bag: existing keys win.
    ///
    /// Used to fold resource-level attributes under record-level ones.
    pub fn merge_under(&mut self, other: &AttrBag) {
        for (k, v) in &other.values {
            self.values.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(AttrValue::as_str)
    }

    /// String attribute with the `"unknown"` default for required fields.
    pub fn str_or_unknown(&self, key: &str) -> String {
        self.get_str(key).unwrap_or("unknown").to_string()
    }

    pub fn i64_or_zero(&self, key: &str) -> i64 {
        self.values.get(key).and_then(AttrValue::as_i64).unwrap_or(0)
    }

    pub fn f64_opt(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(AttrValue::as_f64)
    }

    pub fn bool_or_false(&self, key: &str) -> bool {
        self.values
            .get(key)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any(json: &str) -> AnyValue {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn decodes_scalar_tags() {
        assert_eq!(
            any(r#"{"stringValue":"hi"}"#).decode(),
            AttrValue::String("hi".into())
        );
        assert_eq!(any(r#"{"intValue":42}"#).decode(), AttrValue::Int(42));
        assert_eq!(any(r#"{"intValue":"42"}"#).decode(), AttrValue::Int(42));
        assert_eq!(
            any(r#"{"doubleValue":1.5}"#).decode(),
            AttrValue::Double(1.5)
        );
        assert_eq!(any(r#"{"boolValue":true}"#).decode(), AttrValue::Bool(true));
    }

    #[test]
    fn empty_and_unparseable_tags_decode_to_null() {
        assert_eq!(any("{}").decode(), AttrValue::Null);
        assert_eq!(any(r#"{"intValue":"not-a-number"}"#).decode(), AttrValue::Null);
    }

    #[test]
    fn decodes_nested_arrays_and_kvlists() {
        let v = any(
            r#"{"arrayValue":{"values":[{"intValue":"1"},{"kvlistValue":{"values":[{"key":"a","value":{"boolValue":false}}]}}]}}"#,
        )
        .decode();
        let AttrValue::Array(items) = v else {
            panic!("expected array, got {v:?}");
        };
        assert_eq!(items[0], AttrValue::Int(1));
        let AttrValue::Map(m) = &items[1] else {
            panic!("expected map");
        };
        assert_eq!(m["a"], AttrValue::Bool(false));
    }

    #[test]
    fn bag_duplicate_keys_last_write_wins() {
        let attrs: Vec<KeyValue> = serde_json::from_str(
            r#"[
                {"key":"model","value":{"stringValue":"first"}},
                {"key":"model","value":{"stringValue":"second"}}
            ]"#,
        )
        .unwrap();
        let bag = AttrBag::decode(&attrs);
        assert_eq!(bag.get_str("model"), Some("second"));
    }

    #[test]
    fn bag_accessors_coerce_and_default() {
        let attrs: Vec<KeyValue> = serde_json::from_str(
            r#"[
                {"key":"input_tokens","value":{"intValue":"10"}},
                {"key":"cost","value":{"stringValue":"0.25"}},
                {"key":"success","value":{"boolValue":true}}
            ]"#,
        )
        .unwrap();
        let bag = AttrBag::decode(&attrs);
        assert_eq!(bag.i64_or_zero("input_tokens"), 10);
        assert_eq!(bag.i64_or_zero("missing"), 0);
        assert_eq!(bag.f64_opt("cost"), Some(0.25));
        assert!(bag.bool_or_false("success"));
        assert!(!bag.bool_or_false("missing"));
        assert_eq!(bag.str_or_unknown("model"), "unknown");
    }

    #[test]
    fn merge_under_keeps_record_attributes() {
        let record: Vec<KeyValue> = serde_json::from_str(
            r#"[{"key":"session.id","value":{"stringValue":"record"}}]"#,
        )
        .unwrap();
        let resource: Vec<KeyValue> = serde_json::from_str(
            r#"[
                {"key":"session.id","value":{"stringValue":"resource"}},
                {"key":"user.email","value":{"stringValue":"a@b.c"}}
            ]"#,
        )
        .unwrap();
        let mut bag = AttrBag::decode(&record);
        bag.merge_under(&AttrBag::decode(&resource));
        assert_eq!(bag.get_str("session.id"), Some("record"));
        assert_eq!(bag.get_str("user.email"), Some("a@b.c"));
    }
}
