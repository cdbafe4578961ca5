// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lookups and the cache keys derived from them.

use std::{collections::BTreeMap, fmt};

use xxhash_rust::xxh3::xxh3_128;

use crate::value::{EntityType, FieldValue};

/// The field values a cached entity is looked up by.
///
/// Fields are kept sorted by name, so the order they were given in never affects the key.
///
/// # Examples
///
/// ```
/// use cachetree::Lookup;
///
/// let lookup = Lookup::new().with("last_name", "Blog").with("first_name", "Joe");
/// assert_eq!(lookup.to_string(), "first_name=Joe, last_name=Blog");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lookup(BTreeMap<String, FieldValue>);

impl Lookup {
    /// Creates an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field = value` to the lookup.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Adds `field = value` to the lookup, replacing any previous value of `field`.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Returns the value looked up for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Iterates over `(field, value)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(field, value)| (field.as_str(), value))
    }

    /// Iterates over the looked-up field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Lookup
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

/// Derives cache keys.
///
/// A key is `cachetree.<readable>_<digest>`. The readable part renders
/// `type.field:value;field:value` with whitespace removed and is capped at
/// [`KeyCodec::READABLE_LEN`] characters; the digest is a 128-bit hash of the full
/// rendering, so truncation never makes two lookups share a key.
///
/// # Examples
///
/// ```
/// use cachetree::{EntityType, KeyCodec, Lookup};
///
/// let key = KeyCodec::derive(&EntityType::from("Parent"), &Lookup::new().with("id", 1));
/// assert!(key.starts_with("cachetree.Parent.id:1_"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct KeyCodec;

impl KeyCodec {
    /// Namespace prefix of every key.
    pub const PREFIX: &'static str = "cachetree";

    /// Maximum number of characters of the readable part.
    pub const READABLE_LEN: usize = 125;

    /// Derives the key of `lookup` on `entity_type`.
    #[must_use]
    pub fn derive(entity_type: &EntityType, lookup: &Lookup) -> String {
        let mut raw = format!("{entity_type}.");
        for (i, (field, value)) in lookup.iter().enumerate() {
            if i > 0 {
                raw.push(';');
            }
            raw.push_str(field);
            raw.push(':');
            raw.push_str(&value.to_string());
        }

        let readable: String = raw.chars().filter(|c| !c.is_whitespace()).take(Self::READABLE_LEN).collect();
        let digest = xxh3_128(raw.as_bytes());

        format!("{}.{readable}_{digest:032x}", Self::PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> EntityType {
        EntityType::from("Author")
    }

    #[test]
    fn field_order_does_not_matter() {
        let a = Lookup::new().with("first_name", "Joe").with("last_name", "Blog");
        let b: Lookup = [("last_name", "Blog"), ("first_name", "Joe")].into_iter().collect();
        assert_eq!(KeyCodec::derive(&author(), &a), KeyCodec::derive(&author(), &b));
    }

    #[test]
    fn readable_part_is_stripped_and_sorted() {
        let key = KeyCodec::derive(&author(), &Lookup::new().with("name", "Joe  Blog").with("age", 30));
        let (readable, digest) = key.rsplit_once('_').expect("key has a digest");
        assert_eq!(readable, "cachetree.Author.age:30;name:JoeBlog");
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn whitespace_only_differences_keep_distinct_keys() {
        let spaced = KeyCodec::derive(&author(), &Lookup::new().with("name", "Joe Blog"));
        let joined = KeyCodec::derive(&author(), &Lookup::new().with("name", "JoeBlog"));
        assert_ne!(spaced, joined);
    }

    #[test]
    fn long_lookups_are_capped_but_unique() {
        let long = "x".repeat(400);
        let a = KeyCodec::derive(&author(), &Lookup::new().with("bio", format!("{long}a")));
        let b = KeyCodec::derive(&author(), &Lookup::new().with("bio", format!("{long}b")));
        assert_ne!(a, b);
        assert_eq!(a.len(), KeyCodec::PREFIX.len() + 1 + KeyCodec::READABLE_LEN + 1 + 32);
    }

    #[test]
    fn type_name_and_null_are_part_of_the_key() {
        let lookup = Lookup::new().with("id", 1);
        assert_ne!(
            KeyCodec::derive(&author(), &lookup),
            KeyCodec::derive(&EntityType::from("Book"), &lookup)
        );
        assert_ne!(
            KeyCodec::derive(&author(), &Lookup::new().with("id", FieldValue::Null)),
            KeyCodec::derive(&author(), &Lookup::new().with("id", 0))
        );
    }

    #[test]
    fn lookup_display_and_accessors() {
        let lookup = Lookup::new().with("b", 2).with("a", "x");
        assert_eq!(lookup.to_string(), "a=x, b=2");
        assert_eq!(lookup.field_names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(lookup.get("b"), Some(&FieldValue::Int(2)));
        assert_eq!(lookup.len(), 2);
        assert!(Lookup::new().is_empty());
    }
}
