//! Data models for POSIT
//!
//! Defines the attribute map carried by every find, the attachment record,
//! and the snapshot handed to sync clients.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local row identifier of a find
pub type RecordId = i64;

/// Identifier of an attachment row
pub type AttachmentId = i64;

/// Revision counter column
pub const COLUMN_REVISION: &str = "revision";
/// Server-assigned identifier column
pub const COLUMN_SID: &str = "sid";
/// Synced flag column
pub const COLUMN_SYNCED: &str = "synced";
/// Input alias accepted for [`COLUMN_SID`]
pub const SERVER_ID_ALIAS: &str = "serverId";

/// Attribute names stored as columns on the `finds` table
pub const RESERVED_COLUMNS: [&str; 3] = [COLUMN_REVISION, COLUMN_SID, COLUMN_SYNCED];

/// Map an attribute name to the name it is persisted under
pub fn normalize_name(name: &str) -> &str {
    if name == SERVER_ID_ALIAS {
        COLUMN_SID
    } else {
        name
    }
}

/// Check if an attribute name is one of the reserved sync columns
pub fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&normalize_name(name))
}

/// A single attribute value
///
/// Booleans are stored as integers 0/1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Text(String),
}

impl AttributeValue {
    /// Parse user input, preferring an integer when the text is one
    pub fn parse(input: &str) -> Self {
        match input.trim().parse::<i64>() {
            Ok(n) => AttributeValue::Integer(n),
            Err(_) => AttributeValue::Text(input.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Integer(_) => None,
        }
    }

    /// Interpret the value as a flag (`1` is true)
    pub fn as_flag(&self) -> bool {
        self.as_int() == Some(1)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Integer(n as i64)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Integer(b as i64)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

/// Name → value map of a find's attributes
///
/// Maps are passed by value; builders consume `self` and return the
/// extended map instead of mutating shared state.
///
/// Deserialized maps go through [`Attributes::with`], so a `serverId` key
/// from server JSON lands on `sid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, AttributeValue>",
    into = "BTreeMap<String, AttributeValue>"
)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the map with `name` set to `value`
    ///
    /// `serverId` is stored as `sid`.
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<AttributeValue>) -> Self {
        self.0
            .insert(normalize_name(name.as_ref()).to_string(), value.into());
        self
    }

    /// Return the map with `name` set only if it is not already present
    pub fn with_default(self, name: &str, value: impl Into<AttributeValue>) -> Self {
        if self.contains(name) {
            self
        } else {
            self.with(name, value)
        }
    }

    /// Return a new map with `other`'s entries laid over this one
    pub fn merged(&self, other: &Attributes) -> Attributes {
        let mut map = self.0.clone();
        map.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Attributes(map)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(normalize_name(name))
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(AttributeValue::as_int)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(normalize_name(name))
    }

    /// Check if every entry of `other` is present here with the same value
    pub fn contains_all(&self, other: &Attributes) -> bool {
        other.iter().all(|(k, v)| self.get(k) == Some(v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Revision counter, if loaded
    pub fn revision(&self) -> Option<i64> {
        self.get_int(COLUMN_REVISION)
    }

    /// Server-assigned id, if loaded (0 means not yet accepted)
    pub fn server_id(&self) -> Option<i64> {
        self.get_int(COLUMN_SID)
    }

    /// Synced flag, if loaded
    pub fn synced(&self) -> Option<bool> {
        self.get(COLUMN_SYNCED).map(AttributeValue::as_flag)
    }

    /// Render every value as a string, for handing to an HTTP sync client
    pub fn to_string_map(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl<K: AsRef<str>, V: Into<AttributeValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Attributes::new(), |attrs, (k, v)| attrs.with(k, v))
    }
}

impl From<BTreeMap<String, AttributeValue>> for Attributes {
    fn from(map: BTreeMap<String, AttributeValue>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Attributes> for BTreeMap<String, AttributeValue> {
    fn from(attrs: Attributes) -> Self {
        attrs.0
    }
}

impl IntoIterator for Attributes {
    type Item = (String, AttributeValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Opaque handle to attachment content (URI or path)
///
/// The store never reads the bytes behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(String);

impl PayloadRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PayloadRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PayloadRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An attachment owned by a find
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique identifier within the store
    pub id: AttachmentId,
    /// The owning find
    pub find_id: RecordId,
    /// Zero-based, dense position among the owner's attachments
    pub position: usize,
    /// Handle to the content
    pub payload: PayloadRef,
    /// When this attachment was added
    pub created_at: DateTime<Utc>,
}

/// Everything known locally about one find
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: RecordId,
    pub attributes: Attributes,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitySnapshot {
    pub fn revision(&self) -> i64 {
        self.attributes.revision().unwrap_or(1)
    }

    pub fn server_id(&self) -> i64 {
        self.attributes.server_id().unwrap_or(0)
    }

    pub fn is_synced(&self) -> bool {
        self.attributes.synced().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_alias_is_normalized() {
        let attrs = Attributes::new().with("serverId", 7);
        assert!(attrs.contains("sid"));
        assert!(attrs.contains("serverId"));
        assert_eq!(attrs.server_id(), Some(7));
        assert!(is_reserved("serverId"));
        assert!(!is_reserved("name"));
    }

    #[test]
    fn test_with_default_keeps_existing() {
        let attrs = Attributes::new()
            .with("revision", 4)
            .with_default("revision", 1)
            .with_default("sid", 0);
        assert_eq!(attrs.revision(), Some(4));
        assert_eq!(attrs.server_id(), Some(0));
    }

    #[test]
    fn test_merged_leaves_inputs_untouched() {
        let base = Attributes::new().with("name", "Frog").with("count", 1);
        let patch = Attributes::new().with("name", "Toad");

        let merged = base.merged(&patch);

        assert_eq!(merged.get_text("name"), Some("Toad"));
        assert_eq!(merged.get_int("count"), Some(1));
        assert_eq!(base.get_text("name"), Some("Frog"));
    }

    #[test]
    fn test_parse_prefers_integer() {
        assert_eq!(AttributeValue::parse("42"), AttributeValue::Integer(42));
        assert_eq!(
            AttributeValue::parse("Bullfrog"),
            AttributeValue::Text("Bullfrog".to_string())
        );
    }

    #[test]
    fn test_bool_stored_as_flag() {
        let attrs = Attributes::new().with("synced", true);
        assert_eq!(attrs.get_int("synced"), Some(1));
        assert_eq!(attrs.synced(), Some(true));
    }

    #[test]
    fn test_to_string_map() {
        let attrs = Attributes::new().with("name", "Frog").with("revision", 3);
        let map = attrs.to_string_map();
        assert_eq!(map.get("name").map(String::as_str), Some("Frog"));
        assert_eq!(map.get("revision").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_json_shape() {
        let attrs = Attributes::new().with("name", "Frog").with("sid", 0);
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Frog", "sid": 0}));

        let parsed: Attributes = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, attrs);
    }

    #[test]
    fn test_json_server_id_alias_lands_on_sid() {
        let parsed: Attributes =
            serde_json::from_str(r#"{"name":"Frog","serverId":5}"#).unwrap();

        assert_eq!(parsed.server_id(), Some(5));
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            serde_json::to_value(&parsed).unwrap(),
            serde_json::json!({"name": "Frog", "sid": 5})
        );
    }
}
