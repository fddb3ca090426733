//! Shared data structures for the application state
//!
//! These structs represent the data model that flows between
//! the remote sources, the album storage and the UI layer.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One contact as served by the remote endpoint
///
/// Every field has a default so a partial or malformed record still
/// produces a value. Field names on the wire differ from ours, see the
/// `rename` attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Numeric id, also used as the file name when the photo is saved
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: i64,

    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: String,

    #[serde(rename = "location", default, deserialize_with = "lenient_string")]
    pub address: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,

    #[serde(rename = "cell", default, deserialize_with = "lenient_string")]
    pub phone: String,

    /// Fully-qualified photo URL; empty means "no photo"
    #[serde(rename = "picture", default, deserialize_with = "lenient_string")]
    pub picture_url: String,
}

impl ContactRecord {
    /// Build a record from one element of the contact array.
    ///
    /// Anything that is not a JSON object yields the default record.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// "First Last", skipping whichever part is empty
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Name handed to the album when this contact's photo is saved
    pub fn file_stem(&self) -> String {
        self.id.to_string()
    }

    pub fn has_picture(&self) -> bool {
        !self.picture_url.is_empty()
    }
}

/// Strings accept text, numbers and booleans; anything else is empty
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Ids accept integers, integral floats and numeric strings; anything else is 0
fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Opaque handle to one entry of the album
///
/// Wraps the media index row id. Only the gallery store creates these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageLocation(i64);

impl StorageLocation {
    pub(crate) fn from_row_id(id: i64) -> Self {
        Self(id)
    }

    pub(crate) fn row_id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gallery://images/{}", self.0)
    }
}

/// An image already committed to the album
///
/// Display name, path and date come from the media index at query time;
/// nothing here is cached between listings.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedImage {
    pub location: StorageLocation,
    /// File name inside the album (e.g., "42.jpg")
    pub display_name: String,
    /// Absolute path of the JPEG on disk
    pub path: PathBuf,
    /// Creation time in milliseconds since the Unix epoch
    pub date_added: i64,
}

impl SavedImage {
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.date_added).single()
    }
}

/// Load state of the contact list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing fetched yet
    #[default]
    Empty,
    /// A fetch is in flight
    Loading,
    /// Last fetch returned at least one contact
    Loaded,
    /// Last fetch failed or returned nothing
    ErrorEmpty,
}

impl LoadState {
    /// True once a fetch has finished, successfully or not
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::ErrorEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_record_maps_wire_names() {
        let record = ContactRecord::from_value(json!({
            "id": 7,
            "first_name": "Ada",
            "last_name": "Lovelace",
            "location": "London",
            "email": "ada@example.com",
            "cell": "555-0100",
            "picture": "http://x/7.jpg"
        }));

        assert_eq!(record.id, 7);
        assert_eq!(record.first_name, "Ada");
        assert_eq!(record.last_name, "Lovelace");
        assert_eq!(record.address, "London");
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.phone, "555-0100");
        assert_eq!(record.picture_url, "http://x/7.jpg");
        assert_eq!(record.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let record = ContactRecord::from_value(json!({
            "id": 1,
            "picture": "http://x/1.jpg",
            "first_name": "A"
        }));

        assert_eq!(
            record,
            ContactRecord {
                id: 1,
                first_name: "A".to_string(),
                picture_url: "http://x/1.jpg".to_string(),
                ..ContactRecord::default()
            }
        );

        let empty = ContactRecord::from_value(json!({}));
        assert_eq!(empty, ContactRecord::default());
    }

    #[test]
    fn test_malformed_fields_fall_back_to_defaults() {
        let record = ContactRecord::from_value(json!({
            "id": "12",
            "first_name": null,
            "last_name": ["not", "a", "name"],
            "cell": 5550100,
            "email": true,
            "picture": {"large": "http://x/12.jpg"}
        }));

        assert_eq!(record.id, 12);
        assert_eq!(record.first_name, "");
        assert_eq!(record.last_name, "");
        assert_eq!(record.phone, "5550100");
        assert_eq!(record.email, "true");
        assert_eq!(record.picture_url, "");
        assert!(!record.has_picture());

        let bad_id = ContactRecord::from_value(json!({ "id": "abc", "first_name": "B" }));
        assert_eq!(bad_id.id, 0);
        assert_eq!(bad_id.first_name, "B");

        let float_id = ContactRecord::from_value(json!({ "id": 3.0 }));
        assert_eq!(float_id.id, 3);

        let fractional_id = ContactRecord::from_value(json!({ "id": 3.5 }));
        assert_eq!(fractional_id.id, 0);
    }

    #[test]
    fn test_non_object_element_is_default_record() {
        assert_eq!(ContactRecord::from_value(json!(null)), ContactRecord::default());
        assert_eq!(ContactRecord::from_value(json!(42)), ContactRecord::default());
        assert_eq!(ContactRecord::from_value(json!(["a"])), ContactRecord::default());
    }

    #[test]
    fn test_display_name_skips_empty_parts() {
        let record = ContactRecord {
            last_name: "Solo".to_string(),
            ..ContactRecord::default()
        };
        assert_eq!(record.display_name(), "Solo");
        assert_eq!(record.file_stem(), "0");
    }

    #[test]
    fn test_storage_location_is_uri_like() {
        let location = StorageLocation::from_row_id(5);
        assert_eq!(location.to_string(), "gallery://images/5");
        assert_eq!(location.row_id(), 5);
    }

    #[test]
    fn test_load_state_settled() {
        assert!(!LoadState::Empty.is_settled());
        assert!(!LoadState::Loading.is_settled());
        assert!(LoadState::Loaded.is_settled());
        assert!(LoadState::ErrorEmpty.is_settled());
        assert_eq!(LoadState::default(), LoadState::Empty);
    }
}
