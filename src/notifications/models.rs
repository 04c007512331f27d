//! Notification data models

use std::cmp::Reverse;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Field holding the primary ordering timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Fallback ordering timestamp, used when `createdAt` is absent.
pub const DATE_FIELD: &str = "date";
/// Read flag.
pub const READ_FIELD: &str = "read";

/// A notification as seen by the client.
///
/// Only `id` is structural. Everything else (message, type, references,
/// timestamps, read flag) lives in `fields` so that a pushed update can be
/// merged field by field without losing data the client doesn't model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NotificationRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_read(&self) -> bool {
        self.fields
            .get(READ_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn mark_read(&mut self) {
        self.fields.insert(READ_FIELD.to_string(), Value::Bool(true));
    }

    /// Shallow merge: every field present in `update` overwrites ours,
    /// fields absent from `update` are kept.
    pub fn merge_from(&mut self, update: NotificationRecord) {
        for (key, value) in update.fields {
            self.fields.insert(key, value);
        }
    }

    /// `createdAt` when it parses, otherwise `date`.
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        [CREATED_AT_FIELD, DATE_FIELD]
            .into_iter()
            .filter_map(|field| self.fields.get(field))
            .filter(|value| is_set(value))
            .find_map(parse_timestamp)
    }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Ids are opaque strings, but some backends send them as numbers.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "notification id must be a non-empty string or a number, got {}",
            other
        ))),
    }
}

/// Parse a timestamp value as found in notification payloads.
///
/// Accepts RFC 3339 date-times, naive date-times and plain dates (read as
/// UTC), and numbers (epoch milliseconds).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Sort newest first by effective timestamp, in one pass over the slice.
///
/// Records without a usable timestamp go last. The sort is stable.
pub fn sort_by_recency(records: &mut [NotificationRecord]) {
    records.sort_by_cached_key(|record| Reverse(record.effective_timestamp()));
}

/// Pagination parameters for a REST fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page index.
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self { page: 1, limit }
    }

    pub fn is_first(&self) -> bool {
        self.page <= 1
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// One page of notifications as returned by the REST endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationRecord>,
    /// Page index the server actually returned.
    pub page: u32,
    /// Total number of pages known to the server.
    pub pages: u32,
}

impl NotificationPage {
    pub fn has_more(&self) -> bool {
        self.page < self.pages
    }
}

/// Raw REST body: `{success, notifications, page, pages}` or
/// `{success: false, error}`.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchPageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of the mark-read endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
