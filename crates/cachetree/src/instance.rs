// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entity instances and the values the cache stores for them.

use std::{collections::BTreeMap, sync::Arc};

use crate::value::{EntityType, FieldValue, PK_ALIAS, Snapshot};

static NULL: FieldValue = FieldValue::Null;

/// One entity: its own fields, the baseline they are diffed against, and the related
/// sub-trees attached to it by population.
///
/// Constructing an instance captures its baseline, the state it was first observed in.
/// Setting fields changes only the current state; the baseline moves forward when an
/// invalidation round that referenced the instance completes.
///
/// # Examples
///
/// ```
/// use cachetree::{FieldValue, Instance};
///
/// let mut child = Instance::new("Child", "id", [("id", FieldValue::from(5)), ("parent_id", 1.into())]);
/// assert!(!child.has_changed());
///
/// child.set("parent_id", 2);
/// assert!(child.has_changed());
/// assert_eq!(child.original().unwrap().get("parent_id"), Some(&FieldValue::Int(1)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    entity_type: EntityType,
    primary_key: Arc<str>,
    fields: BTreeMap<String, FieldValue>,
    baseline: Option<Snapshot>,
    prefetched: BTreeMap<String, Related>,
}

impl Instance {
    /// Creates an instance observed in the given state.
    pub fn new<K, V>(entity_type: impl Into<EntityType>, primary_key: impl Into<Arc<str>>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let fields: BTreeMap<String, FieldValue> = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            entity_type: entity_type.into(),
            primary_key: primary_key.into(),
            baseline: Some(Snapshot::from(fields.clone())),
            fields,
            prefetched: BTreeMap::new(),
        }
    }

    /// Creates an instance that has not been saved yet: its primary key is null, in the
    /// current state and in the baseline.
    pub fn unsaved<K, V>(entity_type: impl Into<EntityType>, primary_key: impl Into<Arc<str>>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let primary_key = primary_key.into();
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .chain(std::iter::once((primary_key.to_string(), FieldValue::Null)));
        Self::new(entity_type, primary_key, fields)
    }

    /// Replaces the baseline with a prior snapshot supplied by the caller.
    #[must_use]
    pub fn with_baseline(mut self, baseline: Snapshot) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Drops the baseline; the instance is then diffed against nothing.
    #[must_use]
    pub fn without_baseline(mut self) -> Self {
        self.baseline = None;
        self
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the name of the primary-key field.
    #[must_use]
    pub fn primary_key_field(&self) -> &str {
        &self.primary_key
    }

    /// Returns the primary key, [`FieldValue::Null`] if unsaved.
    #[must_use]
    pub fn pk(&self) -> &FieldValue {
        self.fields.get(&*self.primary_key).unwrap_or(&NULL)
    }

    /// Returns the current value of `field`. `"pk"` reads the primary-key field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(self.resolve(field))
    }

    /// Sets the current value of `field`. `"pk"` writes the primary-key field.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        let field = self.resolve(field).to_owned();
        self.fields.insert(field, value.into());
    }

    /// Returns the current field values.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Captures the current field values.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(self.fields.clone())
    }

    /// Returns the baseline the current state is diffed against.
    #[must_use]
    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    /// Returns `true` if the current state differs from the baseline.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.baseline.as_ref().is_some_and(|baseline| !baseline.matches(&self.fields))
    }

    /// Materializes the baseline as an instance of its own.
    ///
    /// Returns `None` unless the state has changed and the baseline has a primary key;
    /// the baseline of a newly created instance identifies nothing.
    #[must_use]
    pub fn original(&self) -> Option<Self> {
        if !self.has_changed() {
            return None;
        }

        let baseline = self.baseline.as_ref()?;
        if baseline.get(&self.primary_key).is_none_or(FieldValue::is_null) {
            return None;
        }

        Some(Self {
            entity_type: self.entity_type.clone(),
            primary_key: Arc::clone(&self.primary_key),
            fields: baseline.fields().clone(),
            baseline: None,
            prefetched: BTreeMap::new(),
        })
    }

    /// Makes the current state the new baseline.
    pub fn reset_baseline(&mut self) {
        self.baseline = Some(self.snapshot());
    }

    /// Returns the related sub-tree attached under `attribute`.
    #[must_use]
    pub fn prefetched(&self, attribute: &str) -> Option<&Related> {
        self.prefetched.get(attribute)
    }

    /// Detaches and returns the related sub-tree attached under `attribute`.
    pub fn uncache(&mut self, attribute: &str) -> Option<Related> {
        self.prefetched.remove(attribute)
    }

    pub(crate) fn attach(&mut self, attribute: impl Into<String>, related: Related) {
        self.prefetched.insert(attribute.into(), related);
    }

    pub(crate) fn is_attribute_taken(&self, attribute: &str) -> bool {
        self.fields.contains_key(attribute) || self.prefetched.contains_key(attribute)
    }

    fn resolve<'f>(&'f self, field: &'f str) -> &'f str {
        if field == PK_ALIAS { &self.primary_key } else { field }
    }
}

impl From<&Instance> for FieldValue {
    fn from(instance: &Instance) -> Self {
        instance.pk().clone()
    }
}

/// The result of reading a relation.
#[derive(Clone, Debug, PartialEq)]
pub enum Related {
    /// No related instance: the relation is empty or the related entity is gone.
    Absent,
    /// A single-valued relation.
    One(Instance),
    /// A collection, in the data source's order.
    Many(Vec<Instance>),
}

impl Related {
    /// Returns the related instances.
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        match self {
            Self::Absent => &[],
            Self::One(instance) => std::slice::from_ref(instance),
            Self::Many(instances) => instances,
        }
    }

    /// Consumes the result and returns the related instances.
    #[must_use]
    pub fn into_instances(self) -> Vec<Instance> {
        match self {
            Self::Absent => Vec::new(),
            Self::One(instance) => vec![instance],
            Self::Many(instances) => instances,
        }
    }
}

/// The value stored in the cache for one lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum CachedValue {
    /// The fully populated entity.
    Found(Instance),
    /// Nothing matched the lookup.
    NotFound,
    /// More than one entity matched the lookup.
    Multiple,
}
