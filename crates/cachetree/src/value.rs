// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entity type names, field values and snapshots.

use std::{borrow::Borrow, collections::BTreeMap, fmt, sync::Arc};

/// The lookup alias that always resolves to an entity's primary-key field.
pub const PK_ALIAS: &str = "pk";

/// The name of an entity type.
///
/// Cheap to clone; clones share one allocation.
///
/// # Examples
///
/// ```
/// use cachetree::EntityType;
///
/// let parent = EntityType::from("Parent");
/// assert_eq!(parent.as_str(), "Parent");
/// assert_eq!(parent.to_string(), "Parent");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(Arc<str>);

impl EntityType {
    /// Returns the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&Self> for EntityType {
    fn from(entity_type: &Self) -> Self {
        entity_type.clone()
    }
}

impl Borrow<str> for EntityType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The value of one field of an entity.
///
/// Relation-valued lookups are expressed through the related instance's primary key; see
/// the `From<&Instance>` conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldValue {
    /// No value. Unsaved instances have a null primary key.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A string.
    Text(String),
}

impl FieldValue {
    /// Returns `true` for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An immutable copy of an entity's own field values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot(Arc<BTreeMap<String, FieldValue>>);

impl Snapshot {
    /// Returns the value of `field`, if the snapshot holds it.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Returns every captured field.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.0
    }

    /// Returns `true` if this snapshot holds exactly `fields`.
    #[must_use]
    pub fn matches(&self, fields: &BTreeMap<String, FieldValue>) -> bool {
        *self.0 == *fields
    }
}

impl From<BTreeMap<String, FieldValue>> for Snapshot {
    fn from(fields: BTreeMap<String, FieldValue>) -> Self {
        Self(Arc::new(fields))
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect::<BTreeMap<_, _>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_display() {
        assert_eq!(FieldValue::Null.to_string(), "null");
        assert_eq!(FieldValue::from(true).to_string(), "true");
        assert_eq!(FieldValue::from(-4).to_string(), "-4");
        assert_eq!(FieldValue::from("Joe").to_string(), "Joe");
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
    }

    #[test]
    fn entity_type_borrows_as_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(EntityType::from("Author"), 1);
        assert_eq!(map.get("Author"), Some(&1));
        assert_eq!(format!("{:?}", EntityType::from("Author")), "\"Author\"");
    }

    #[test]
    fn snapshot_compares_against_live_fields() {
        let snapshot: Snapshot = [("id", 1)].into_iter().collect();
        let mut live = snapshot.fields().clone();
        assert!(snapshot.matches(&live));

        live.insert("id".to_owned(), FieldValue::from(2));
        assert!(!snapshot.matches(&live));
        assert_eq!(snapshot.get("id"), Some(&FieldValue::Int(1)));
    }
}
