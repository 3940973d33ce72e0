//! The ingested unit: one mail message.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single ingested message.
///
/// `id` is the deduplication key. It is assigned by the source and never changes; two
/// records with the same `id` are the same logical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// Raw transport fields kept for audit (thread id, label ids, raw `Date` header...).
    #[serde(default)]
    pub source_metadata: BTreeMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            received_at: None,
            sender: String::new(),
            subject: String::new(),
            body: String::new(),
            source_metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }

    #[must_use]
    pub fn sender<S: Into<String>>(mut self, sender: S) -> Self {
        self.sender = sender.into();
        self
    }

    #[must_use]
    pub fn subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.source_metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn json_round_trip_keeps_every_field() {
        let record = Record::new("18c2f0a9d1")
            .received_at(Utc.with_ymd_and_hms(2024, 11, 12, 8, 30, 0).unwrap())
            .sender("Daily Upside <squad@thedailyupside.com>")
            .subject("Markets wrap")
            .body("Stocks rose.")
            .metadata("threadId", json!("18c2f0a9d1"))
            .metadata("labelIds", json!(["INBOX", "CATEGORY_UPDATES"]));

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: Record = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn missing_optional_fields_default() {
        let decoded: Record = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(decoded, Record::new("abc"));
    }
}
