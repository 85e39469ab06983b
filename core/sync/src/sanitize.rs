//! Attribute sanitizers.
//!
//! Every function here is pure and total: any JSON input normalizes to a
//! value of the declared type, falling back to the type's zero value.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

use campussync_common::text::sanitize_text;

use crate::config::ListOrder;
use crate::schema::FieldType;

/// Whether a payload value counts as "set".
///
/// `null`, `false`, `0`, `""`, `"0"`, and empty arrays or objects are unset.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Whether a string is a plain decimal number.
pub fn is_numeric(raw: &str) -> bool {
    let trimmed = raw.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Parse the leading integer of a string, ignoring whatever follows.
pub(crate) fn leading_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |n| sign * n)
}

fn float_to_u64(value: f64) -> u64 {
    if value.is_finite() {
        // Saturating cast.
        value.abs().trunc() as u64
    } else {
        0
    }
}

/// Absolute integer value of any input, `0` when none can be read.
pub fn absint(value: &Value) -> u64 {
    match value {
        Value::Bool(true) => 1,
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.unsigned_abs(),
            (None, Some(u)) => u,
            _ => n.as_f64().map_or(0, float_to_u64),
        },
        Value::String(s) if is_numeric(s) => s.trim().parse::<f64>().map_or(0, float_to_u64),
        Value::String(s) => leading_int(s).unsigned_abs(),
        _ => 0,
    }
}

pub(crate) fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    }
}

/// Plain text: tags stripped, whitespace collapsed, trimmed.
pub fn plain_text(value: &Value) -> String {
    sanitize_text(&scalar_string(value))
}

/// Rich text reduced to the allowed post markup.
pub fn rich_text(value: &Value) -> String {
    filter_html(&scalar_string(value))
}

/// Post markup accepted on top of the sanitizer's defaults.
const EXTRA_TAGS: [&str; 9] = [
    "address", "audio", "big", "font", "main", "section", "source", "track", "video",
];
/// Elements dropped together with everything inside them.
const DROPPED_WITH_CONTENT: [&str; 5] = ["script", "style", "iframe", "noscript", "template"];

fn html_policy() -> ammonia::Builder<'static> {
    let mut policy = ammonia::Builder::default();
    policy
        .add_tags(EXTRA_TAGS)
        .add_generic_attributes(["class", "id", "dir", "align"])
        .add_tag_attributes("a", ["target", "rel", "name"])
        .add_tag_attributes("audio", ["src", "controls", "loop", "preload"])
        .add_tag_attributes("video", ["src", "controls", "loop", "poster", "width", "height"])
        .add_tag_attributes("source", ["src", "type"])
        .add_tag_attributes("track", ["src", "kind", "label", "srclang"])
        .add_tag_attributes("font", ["color", "face", "size"])
        .clean_content_tags(DROPPED_WITH_CONTENT.into_iter().collect::<HashSet<_>>())
        .link_rel(None);
    policy
}

/// Reduce HTML to the allowed post markup.
///
/// The input is parsed as an HTML fragment and rebuilt from an allow-list of
/// tags, attributes and URL schemes, so malformed or nested markup cannot
/// reassemble into a live element.
pub fn filter_html(input: &str) -> String {
    html_policy().clean(input).to_string()
}

/// Remove duplicates according to `order`.
pub fn dedup<T: Ord + Clone>(items: Vec<T>, order: ListOrder) -> Vec<T> {
    match order {
        ListOrder::Preserve => {
            let mut seen = std::collections::BTreeSet::new();
            items
                .into_iter()
                .filter(|item| seen.insert(item.clone()))
                .collect()
        }
        ListOrder::Unordered => {
            let mut items = items;
            items.sort();
            items.dedup();
            items
        }
    }
}

/// One university department of a college.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRecord {
    /// Department name.
    pub name: String,
    /// Ownership category (e.g. "Government", "Private").
    #[serde(alias = "category")]
    pub ownership: String,
    /// Number of courses offered.
    #[serde(alias = "count")]
    pub courses: u64,
}

impl DepartmentRecord {
    /// Sanitize one record. Non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let pick = |primary: &str, alias: &str| {
            map.get(primary)
                .or_else(|| map.get(alias))
                .cloned()
                .unwrap_or(Value::Null)
        };

        Some(Self {
            name: map.get("name").map(plain_text).unwrap_or_default(),
            ownership: plain_text(&pick("ownership", "category")),
            courses: absint(&pick("courses", "count")),
        })
    }

    fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "ownership": self.ownership,
            "courses": self.courses,
        })
    }
}

/// Sanitize `value` as an attribute of type `field_type`.
pub fn sanitize_value(field_type: FieldType, value: &Value, order: ListOrder) -> Value {
    match field_type {
        FieldType::Integer => json!(absint(value)),
        FieldType::Text => json!(plain_text(value)),
        FieldType::RichText => json!(rich_text(value)),
        FieldType::IntegerList => {
            let items = as_list(value).iter().map(absint).collect();
            json!(dedup(items, order))
        }
        FieldType::TextList => {
            let items = as_list(value).iter().map(plain_text).collect();
            json!(dedup(items, order))
        }
        FieldType::RecordList => Value::Array(
            as_list(value)
                .iter()
                .filter_map(DepartmentRecord::from_value)
                .map(|record| record.to_value())
                .collect(),
        ),
    }
}

fn as_list(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}
