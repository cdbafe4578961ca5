// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-memory entity graph for tests.
//!
//! [`MemoryGraph`] implements [`EntityAccessor`] over rows kept in memory. Relations are
//! declared on its builder as foreign keys, one-to-one links and many-to-many links (with a
//! managed or an explicit linking type); the matching reverse relations are declared with
//! them. It counts fetches and relation reads so tests can assert source round trips.

#![allow(clippy::panic, reason = "misdeclared test graphs panic")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
};

use parking_lot::RwLock;

use crate::{
    accessor::{AccessError, EntityAccessor, EntityDescriptor, FetchOutcome, Linking, RelationDescriptor},
    instance::{Instance, Related},
    invalidate::LinkChange,
    key::Lookup,
    value::{EntityType, FieldValue, PK_ALIAS},
};

type Row = BTreeMap<String, FieldValue>;
type LinkTable = (EntityType, String);

#[derive(Clone, Debug)]
enum Rule {
    /// Reads the row of `target` whose key is the instance's `fk_field`.
    Forward { fk_field: String, target: EntityType },
    /// Reads the rows of `source` whose `fk_field` is the instance's key.
    Reverse { source: EntityType, fk_field: String, single: bool },
    /// Reads the rows of `target` linked to the instance in `table`.
    ManyToMany { table: LinkTable, left: bool, target: EntityType },
    /// Reads the rows of `target` named by the `through` rows pointing at the instance.
    Through {
        through: EntityType,
        own_fk: String,
        other_fk: String,
        target: EntityType,
    },
}

#[derive(Debug)]
struct ThroughDeclaration {
    left: EntityType,
    relation: String,
    right: EntityType,
    reverse: String,
    through: EntityType,
}

/// Declares the types and relations of a [`MemoryGraph`].
#[derive(Debug, Default)]
pub struct MemoryGraphBuilder {
    descriptors: HashMap<EntityType, EntityDescriptor>,
    rules: HashMap<(EntityType, String), Rule>,
    foreign_keys: Vec<(EntityType, String, EntityType)>,
    throughs: Vec<ThroughDeclaration>,
}

impl MemoryGraphBuilder {
    /// Declares `entity_type` with primary key `primary_key` and further direct `fields`.
    #[must_use]
    pub fn entity<I>(mut self, entity_type: &str, primary_key: &str, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let descriptor = EntityDescriptor::new(entity_type, primary_key).fields(fields);
        self.descriptors.insert(EntityType::from(entity_type), descriptor);
        self
    }

    /// Declares the foreign key `child.fk_field` to `parent`, readable as `child.relation`
    /// and, in reverse, as the collection `parent.reverse`.
    ///
    /// # Panics
    ///
    /// Panics if either type has not been declared.
    #[must_use]
    pub fn foreign_key(mut self, child: &str, fk_field: &str, relation: &str, parent: &str, reverse: &str) -> Self {
        self.relate(child, relation, RelationDescriptor::single(parent, reverse), Rule::Forward {
            fk_field: fk_field.to_owned(),
            target: parent.into(),
        });
        self.relate(parent, reverse, RelationDescriptor::read_only_collection(child, relation), Rule::Reverse {
            source: child.into(),
            fk_field: fk_field.to_owned(),
            single: false,
        });
        self.foreign_keys.push((child.into(), fk_field.to_owned(), parent.into()));
        self
    }

    /// Declares the unique foreign key `child.fk_field` to `parent`, readable as
    /// `child.relation` and, in reverse, as the single relation `parent.reverse`.
    ///
    /// # Panics
    ///
    /// Panics if either type has not been declared.
    #[must_use]
    pub fn one_to_one(mut self, child: &str, fk_field: &str, relation: &str, parent: &str, reverse: &str) -> Self {
        self.relate(child, relation, RelationDescriptor::single(parent, reverse), Rule::Forward {
            fk_field: fk_field.to_owned(),
            target: parent.into(),
        });
        self.relate(parent, reverse, RelationDescriptor::single(child, relation), Rule::Reverse {
            source: child.into(),
            fk_field: fk_field.to_owned(),
            single: true,
        });
        self
    }

    /// Declares a many-to-many relation with a managed linking type, readable as the
    /// collections `left.relation` and `right.reverse`.
    ///
    /// # Panics
    ///
    /// Panics if either type has not been declared.
    #[must_use]
    pub fn many_to_many(mut self, left: &str, relation: &str, right: &str, reverse: &str) -> Self {
        let linking = Linking::auto(format!("{left}_{relation}"));
        let table: LinkTable = (left.into(), relation.to_owned());

        self.relate(
            left,
            relation,
            RelationDescriptor::mutable_collection(right, reverse).with_linking(linking.clone()),
            Rule::ManyToMany {
                table: table.clone(),
                left: true,
                target: right.into(),
            },
        );
        self.relate(
            right,
            reverse,
            RelationDescriptor::mutable_collection(left, relation).with_linking(linking),
            Rule::ManyToMany {
                table,
                left: false,
                target: left.into(),
            },
        );
        self
    }

    /// Declares a many-to-many relation mediated by the explicit linking type `through`,
    /// which must hold a foreign key to each side.
    ///
    /// # Panics
    ///
    /// [`MemoryGraphBuilder::build`] panics if `through` has no foreign key to either side.
    #[must_use]
    pub fn many_to_many_through(mut self, left: &str, relation: &str, right: &str, reverse: &str, through: &str) -> Self {
        self.throughs.push(ThroughDeclaration {
            left: left.into(),
            relation: relation.to_owned(),
            right: right.into(),
            reverse: reverse.to_owned(),
            through: through.into(),
        });
        self
    }

    /// Finishes the graph.
    ///
    /// # Panics
    ///
    /// Panics if a linking type lacks a foreign key to a side it links.
    #[must_use]
    pub fn build(mut self) -> MemoryGraph {
        for declaration in std::mem::take(&mut self.throughs) {
            let left_fk = self.foreign_key_between(&declaration.through, &declaration.left);
            let right_fk = self.foreign_key_between(&declaration.through, &declaration.right);
            let left_accessor = self.reverse_name(&declaration.left, &declaration.through);
            let right_accessor = self.reverse_name(&declaration.right, &declaration.through);

            self.relate(
                declaration.left.as_str(),
                &declaration.relation,
                RelationDescriptor::read_only_collection(&declaration.right, declaration.reverse.as_str())
                    .with_linking(Linking::explicit(&declaration.through, left_accessor)),
                Rule::Through {
                    through: declaration.through.clone(),
                    own_fk: left_fk.clone(),
                    other_fk: right_fk.clone(),
                    target: declaration.right.clone(),
                },
            );
            self.relate(
                declaration.right.as_str(),
                &declaration.reverse,
                RelationDescriptor::read_only_collection(&declaration.left, declaration.relation.as_str())
                    .with_linking(Linking::explicit(&declaration.through, right_accessor)),
                Rule::Through {
                    through: declaration.through,
                    own_fk: right_fk,
                    other_fk: left_fk,
                    target: declaration.left,
                },
            );
        }

        MemoryGraph {
            inner: Arc::new(GraphInner {
                descriptors: self.descriptors,
                rules: self.rules,
                rows: RwLock::default(),
                links: RwLock::default(),
                next_id: AtomicI64::new(1),
                fetches: AtomicUsize::new(0),
                relation_reads: AtomicUsize::new(0),
            }),
        }
    }

    fn relate(&mut self, entity_type: &str, relation: &str, descriptor: RelationDescriptor, rule: Rule) {
        let entity = self
            .descriptors
            .remove(entity_type)
            .unwrap_or_else(|| panic!("entity `{entity_type}` must be declared before its relations"));
        self.descriptors
            .insert(entity.entity_type().clone(), entity.relation(relation, descriptor));
        self.rules.insert((entity_type.into(), relation.to_owned()), rule);
    }

    fn foreign_key_between(&self, child: &EntityType, parent: &EntityType) -> String {
        self.foreign_keys
            .iter()
            .find(|(from, _, to)| from == child && to == parent)
            .map(|(_, fk_field, _)| fk_field.clone())
            .unwrap_or_else(|| panic!("linking type `{child}` has no foreign key to `{parent}`"))
    }

    fn reverse_name(&self, parent: &EntityType, child: &EntityType) -> String {
        self.descriptors
            .get(parent)
            .and_then(|descriptor| {
                descriptor
                    .relations()
                    .find(|(_, relation)| relation.target() == child && relation.kind().is_collection())
                    .map(|(name, _)| name.to_owned())
            })
            .unwrap_or_else(|| panic!("`{parent}` has no collection of `{child}`"))
    }
}

#[derive(Debug)]
struct GraphInner {
    descriptors: HashMap<EntityType, EntityDescriptor>,
    rules: HashMap<(EntityType, String), Rule>,
    rows: RwLock<HashMap<EntityType, BTreeMap<FieldValue, Row>>>,
    links: RwLock<HashMap<LinkTable, BTreeSet<(FieldValue, FieldValue)>>>,
    next_id: AtomicI64,
    fetches: AtomicUsize,
    relation_reads: AtomicUsize,
}

/// An in-memory [`EntityAccessor`].
///
/// Clones share the same rows.
///
/// # Examples
///
/// ```
/// use cachetree::testing::MemoryGraph;
/// use cachetree::{FieldValue, Instance};
///
/// let graph = MemoryGraph::builder()
///     .entity("Parent", "id", ["name"])
///     .entity("Child", "id", ["parent_id"])
///     .foreign_key("Child", "parent_id", "parent", "Parent", "children")
///     .build();
///
/// let mut parent = Instance::unsaved("Parent", "id", [("name", "p")]);
/// graph.save(&mut parent);
/// assert_eq!(parent.pk(), &FieldValue::Int(1));
/// assert!(graph.get("Parent", 1).is_some());
/// ```
#[derive(Clone, Debug)]
pub struct MemoryGraph {
    inner: Arc<GraphInner>,
}

impl MemoryGraph {
    /// Starts declaring a graph.
    #[must_use]
    pub fn builder() -> MemoryGraphBuilder {
        MemoryGraphBuilder::default()
    }

    /// Writes `instance`, assigning the next integer key if its key is null, and makes the
    /// written state its baseline.
    ///
    /// # Panics
    ///
    /// Panics if the instance's type has not been declared.
    pub fn save(&self, instance: &mut Instance) {
        let descriptor = self.descriptor(instance.entity_type());
        if instance.pk().is_null() {
            instance.set(PK_ALIAS, self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        } else if let FieldValue::Int(id) = instance.pk() {
            self.inner.next_id.fetch_max(id + 1, Ordering::Relaxed);
        }

        let row: Row = instance
            .fields()
            .iter()
            .filter(|(field, _)| descriptor.has_field(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        self.inner
            .rows
            .write()
            .entry(instance.entity_type().clone())
            .or_default()
            .insert(instance.pk().clone(), row);
        instance.reset_baseline();
    }

    /// Removes the row of `instance`. Rows pointing at it keep their foreign keys.
    pub fn delete(&self, instance: &Instance) {
        if let Some(rows) = self.inner.rows.write().get_mut(instance.entity_type()) {
            rows.remove(instance.pk());
        }
    }

    /// Returns the stored row of `entity_type` with key `pk`, without counting a fetch.
    #[must_use]
    pub fn get(&self, entity_type: &str, pk: impl Into<FieldValue>) -> Option<Instance> {
        let entity_type = EntityType::from(entity_type);
        let row = self.inner.rows.read().get(&entity_type)?.get(&pk.into())?.clone();
        Some(self.instance(&entity_type, row))
    }

    /// Links `owner` to the entities with `ids` through the many-to-many `relation` and
    /// reports the links that did not exist yet.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a many-to-many relation with a managed linking type.
    pub fn link<I>(&self, owner: &Instance, relation: &str, ids: I) -> LinkChange
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        let (table, left) = self.link_table(owner, relation);
        let mut links = self.inner.links.write();
        let pairs = links.entry(table).or_default();
        let added: Vec<FieldValue> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| pairs.insert(pair(owner.pk(), id, left)))
            .collect();
        LinkChange::added(relation, added)
    }

    /// Unlinks `owner` from the entities with `ids` and reports the links that existed.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a many-to-many relation with a managed linking type.
    pub fn unlink<I>(&self, owner: &Instance, relation: &str, ids: I) -> LinkChange
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        let (table, left) = self.link_table(owner, relation);
        let mut links = self.inner.links.write();
        let pairs = links.entry(table).or_default();
        let removed: Vec<FieldValue> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| pairs.remove(&pair(owner.pk(), id, left)))
            .collect();
        LinkChange::removed(relation, removed)
    }

    /// Removes every link of `owner` through `relation` and returns how many there were.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a many-to-many relation with a managed linking type.
    pub fn clear_links(&self, owner: &Instance, relation: &str) -> usize {
        let (table, left) = self.link_table(owner, relation);
        let mut links = self.inner.links.write();
        let pairs = links.entry(table).or_default();
        let before = pairs.len();
        pairs.retain(|(l, r)| if left { l != owner.pk() } else { r != owner.pk() });
        before - pairs.len()
    }

    /// Returns the number of fetches served; a batched fetch counts once.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    /// Returns the number of relations read.
    #[must_use]
    pub fn relation_reads(&self) -> usize {
        self.inner.relation_reads.load(Ordering::Relaxed)
    }

    /// Resets both counters.
    pub fn reset_counters(&self) {
        self.inner.fetches.store(0, Ordering::Relaxed);
        self.inner.relation_reads.store(0, Ordering::Relaxed);
    }

    fn descriptor(&self, entity_type: &EntityType) -> &EntityDescriptor {
        self.inner
            .descriptors
            .get(entity_type)
            .unwrap_or_else(|| panic!("entity `{entity_type}` is not declared"))
    }

    fn instance(&self, entity_type: &EntityType, row: Row) -> Instance {
        Instance::new(entity_type, self.descriptor(entity_type).primary_key(), row)
    }

    fn link_table(&self, owner: &Instance, relation: &str) -> (LinkTable, bool) {
        match self.inner.rules.get(&(owner.entity_type().clone(), relation.to_owned())) {
            Some(Rule::ManyToMany { table, left, .. }) => (table.clone(), *left),
            _ => panic!("`{}.{relation}` is not a managed many-to-many relation", owner.entity_type()),
        }
    }

    fn matching(&self, entity_type: &EntityType, lookup: &Lookup) -> FetchOutcome {
        let Some(descriptor) = self.inner.descriptors.get(entity_type) else {
            return FetchOutcome::NotFound;
        };
        let rows = self.inner.rows.read();
        let mut found = rows.get(entity_type).into_iter().flat_map(BTreeMap::values).filter(|row| {
            lookup.iter().all(|(field, value)| {
                let field = if field == PK_ALIAS { descriptor.primary_key() } else { field };
                row.get(field).unwrap_or(&FieldValue::Null) == value
            })
        });

        match (found.next(), found.next()) {
            (None, _) => FetchOutcome::NotFound,
            (Some(row), None) => FetchOutcome::Found(self.instance(entity_type, row.clone())),
            (Some(_), Some(_)) => FetchOutcome::Multiple,
        }
    }

    fn rows_where(&self, entity_type: &EntityType, field: &str, value: &FieldValue) -> Vec<Instance> {
        if value.is_null() {
            return Vec::new();
        }
        let rows: Vec<Row> = self
            .inner
            .rows
            .read()
            .get(entity_type)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|row| row.get(field) == Some(value))
            .cloned()
            .collect();
        rows.into_iter().map(|row| self.instance(entity_type, row)).collect()
    }

    fn rows_by_keys(&self, entity_type: &EntityType, keys: impl IntoIterator<Item = FieldValue>) -> Vec<Instance> {
        let rows: Vec<Row> = {
            let all = self.inner.rows.read();
            let Some(table) = all.get(entity_type) else {
                return Vec::new();
            };
            keys.into_iter().filter_map(|key| table.get(&key).cloned()).collect()
        };
        rows.into_iter().map(|row| self.instance(entity_type, row)).collect()
    }

    fn read(&self, instance: &Instance, relation: &str) -> Result<Related, AccessError> {
        let rule = self
            .inner
            .rules
            .get(&(instance.entity_type().clone(), relation.to_owned()))
            .ok_or_else(|| AccessError::from_message(format!("`{}` has no relation `{relation}`", instance.entity_type())))?;

        Ok(match rule {
            Rule::Forward { fk_field, target } => {
                let fk = instance.get(fk_field).cloned().unwrap_or_default();
                self.rows_by_keys(target, [fk]).pop().map_or(Related::Absent, Related::One)
            }
            Rule::Reverse { source, fk_field, single } => {
                let mut rows = self.rows_where(source, fk_field, instance.pk());
                if *single {
                    rows.pop().map_or(Related::Absent, Related::One)
                } else {
                    Related::Many(rows)
                }
            }
            Rule::ManyToMany { table, left, target } => {
                let keys: BTreeSet<FieldValue> = self
                    .inner
                    .links
                    .read()
                    .get(table)
                    .into_iter()
                    .flatten()
                    .filter_map(|(l, r)| {
                        if *left {
                            (l == instance.pk()).then(|| r.clone())
                        } else {
                            (r == instance.pk()).then(|| l.clone())
                        }
                    })
                    .collect();
                Related::Many(self.rows_by_keys(target, keys))
            }
            Rule::Through {
                through,
                own_fk,
                other_fk,
                target,
            } => {
                let keys: BTreeSet<FieldValue> = self
                    .rows_where(through, own_fk, instance.pk())
                    .iter()
                    .filter_map(|row| row.get(other_fk).cloned())
                    .collect();
                Related::Many(self.rows_by_keys(target, keys))
            }
        })
    }
}

fn pair(owner: &FieldValue, other: &FieldValue, left: bool) -> (FieldValue, FieldValue) {
    if left {
        (owner.clone(), other.clone())
    } else {
        (other.clone(), owner.clone())
    }
}

impl EntityAccessor for MemoryGraph {
    fn describe(&self, entity_type: &EntityType) -> Option<&EntityDescriptor> {
        self.inner.descriptors.get(entity_type)
    }

    async fn fetch_one(&self, entity_type: &EntityType, lookup: &Lookup) -> Result<FetchOutcome, AccessError> {
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.matching(entity_type, lookup))
    }

    async fn fetch_many(&self, entity_type: &EntityType, lookups: &[Lookup]) -> Result<Vec<FetchOutcome>, AccessError> {
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(lookups.iter().map(|lookup| self.matching(entity_type, lookup)).collect())
    }

    async fn read_relation(&self, instance: &Instance, relation: &str) -> Result<Related, AccessError> {
        self.inner.relation_reads.fetch_add(1, Ordering::Relaxed);
        self.read(instance, relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::RelationKind;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn graph() -> MemoryGraph {
        MemoryGraph::builder()
            .entity("Author", "id", ["name"])
            .entity("Group", "id", ["title"])
            .entity("Tag", "id", ["label"])
            .entity("Membership", "id", ["author_id", "group_id"])
            .entity("Profile", "id", ["author_id"])
            .foreign_key("Membership", "author_id", "author", "Author", "memberships")
            .foreign_key("Membership", "group_id", "group", "Group", "memberships")
            .one_to_one("Profile", "author_id", "author", "Author", "profile")
            .many_to_many("Author", "tags", "Tag", "authors")
            .many_to_many_through("Author", "groups", "Group", "members", "Membership")
            .build()
    }

    fn save(graph: &MemoryGraph, entity_type: &str, fields: &[(&str, i64)]) -> Instance {
        let mut instance = Instance::new(entity_type, "id", fields.iter().map(|(k, v)| (*k, *v)));
        graph.save(&mut instance);
        instance
    }

    #[test]
    fn through_relation_names_owner_accessor() {
        let graph = graph();
        let groups = graph.describe(&"Author".into()).unwrap().relation_named("groups").unwrap();
        let linking = groups.linking().unwrap();

        assert!(!linking.is_auto_created());
        assert_eq!(linking.linking_type().as_str(), "Membership");
        assert_eq!(linking.owner_accessor(), "memberships");
        assert_eq!(groups.kind(), RelationKind::ReadOnlyCollection);
        assert_eq!(groups.target().as_str(), "Group");
    }

    #[test]
    fn fetch_reports_multiple_matches() {
        block_on(async {
            let graph = graph();
            for id in [1, 2] {
                let mut author = Instance::new("Author", "id", [("id", FieldValue::from(id)), ("name", "Joe".into())]);
                graph.save(&mut author);
            }

            let outcome = graph.fetch_one(&"Author".into(), &Lookup::new().with("name", "Joe")).await.unwrap();
            assert_eq!(outcome, FetchOutcome::Multiple);
            let outcome = graph.fetch_one(&"Author".into(), &Lookup::new().with("pk", 2)).await.unwrap();
            assert!(matches!(outcome, FetchOutcome::Found(author) if author.pk() == &FieldValue::Int(2)));
            assert_eq!(graph.fetch_count(), 2);
        });
    }

    #[test]
    fn links_report_actual_changes() {
        block_on(async {
            let graph = graph();
            let author = save(&graph, "Author", &[("id", 1)]);
            save(&graph, "Tag", &[("id", 7)]);
            save(&graph, "Tag", &[("id", 8)]);

            assert_eq!(graph.link(&author, "tags", [7, 8]).changed_ids().len(), 2);
            assert!(graph.link(&author, "tags", [7]).changed_ids().is_empty());

            let tag = graph.get("Tag", 7).unwrap();
            let authors = graph.read_relation(&tag, "authors").await.unwrap();
            assert_eq!(authors.instances().len(), 1);

            assert_eq!(graph.unlink(&author, "tags", [8, 9]).changed_ids(), [FieldValue::Int(8)]);
            assert_eq!(graph.clear_links(&author, "tags"), 1);
            assert!(graph.read_relation(&author, "tags").await.unwrap().instances().is_empty());
        });
    }

    #[test]
    fn reads_follow_instance_fields() {
        block_on(async {
            let graph = graph();
            let author = save(&graph, "Author", &[("id", 1)]);
            save(&graph, "Author", &[("id", 2)]);
            save(&graph, "Group", &[("id", 3)]);
            save(&graph, "Membership", &[("id", 10), ("author_id", 1), ("group_id", 3)]);
            let mut profile = save(&graph, "Profile", &[("id", 20), ("author_id", 1)]);

            let groups = graph.read_relation(&author, "groups").await.unwrap();
            assert_eq!(groups.instances()[0].pk(), &FieldValue::Int(3));
            assert!(matches!(graph.read_relation(&author, "profile").await.unwrap(), Related::One(_)));

            profile.set("author_id", 2);
            let moved = graph.read_relation(&profile, "author").await.unwrap();
            assert!(matches!(moved, Related::One(author) if author.pk() == &FieldValue::Int(2)));

            graph.delete(&graph.get("Author", 2).unwrap());
            assert_eq!(graph.read_relation(&profile, "author").await.unwrap(), Related::Absent);
            assert!(graph.read_relation(&author, "missing").await.is_err());
            assert_eq!(graph.relation_reads(), 5);
        });
    }
}
