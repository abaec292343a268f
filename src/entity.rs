//! Entity instances - identity, field cache and attribute resolution
//!
//! An [`Entity`] is one row of its type's table. Its fields are loaded
//! lazily on first column access, or arrive already hydrated from a bulk
//! query (`all`, child fetch, sibling fetch). Named attributes resolve
//! against the type's descriptor in column -> parent -> child -> sibling order.

use std::collections::BTreeMap;

use crate::query::{self, Statement};
use crate::schema::{AttributeRef, EntityDescriptor, EntityType, FieldKey};
use crate::storage::{Record, Session};
use crate::value::Value;
use crate::{Error, Result, RowId};

/// Result of reading a named attribute
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Scalar column value
    Value(Value),
    /// Unloaded handle to the referenced row, `None` when the key is NULL
    Parent(Option<Entity>),
    /// Hydrated children or siblings
    Entities(Vec<Entity>),
}

impl Attribute {
    pub fn into_entities(self) -> Option<Vec<Entity>> {
        match self {
            Attribute::Entities(e) => Some(e),
            _ => None,
        }
    }
}

/// Right-hand side of an attribute write
#[derive(Debug, Clone)]
pub enum Assign<'a> {
    Value(Value),
    Entity(&'a Entity),
}

impl From<Value> for Assign<'_> {
    fn from(v: Value) -> Self {
        Assign::Value(v)
    }
}

impl From<&str> for Assign<'_> {
    fn from(v: &str) -> Self {
        Assign::Value(v.into())
    }
}

impl From<String> for Assign<'_> {
    fn from(v: String) -> Self {
        Assign::Value(v.into())
    }
}

impl From<i64> for Assign<'_> {
    fn from(v: i64) -> Self {
        Assign::Value(v.into())
    }
}

impl From<i32> for Assign<'_> {
    fn from(v: i32) -> Self {
        Assign::Value(v.into())
    }
}

impl From<f64> for Assign<'_> {
    fn from(v: f64) -> Self {
        Assign::Value(v.into())
    }
}

impl From<bool> for Assign<'_> {
    fn from(v: bool) -> Self {
        Assign::Value(v.into())
    }
}

impl<'a> From<&'a Entity> for Assign<'a> {
    fn from(e: &'a Entity) -> Self {
        Assign::Entity(e)
    }
}

/// One row of an entity table.
///
/// The id is `None` until a successful insert assigns it; after that it
/// never changes for the lifetime of the instance.
#[derive(Debug, Clone)]
pub struct Entity {
    kind: EntityType,
    id: Option<RowId>,
    fields: BTreeMap<FieldKey, Value>,
    loaded: bool,
    modified: bool,
}

impl Entity {
    /// A new entity with no row behind it yet
    pub fn new(kind: EntityType) -> Self {
        Self {
            kind,
            id: None,
            fields: BTreeMap::new(),
            loaded: false,
            modified: false,
        }
    }

    /// Handle to an existing row; fields load on first column access
    pub fn with_id(kind: EntityType, id: RowId) -> Self {
        Self {
            id: Some(id),
            ..Self::new(kind)
        }
    }

    /// Build a fully loaded instance straight from a fetched row
    pub(crate) fn hydrate(
        kind: EntityType,
        descriptor: &EntityDescriptor,
        record: &Record,
    ) -> Result<Self> {
        let id = record
            .get(&descriptor.id_column)
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::InvalidRow {
                entity: descriptor.name.clone(),
                reason: format!("missing integer key '{}'", descriptor.id_column),
            })?;

        Ok(Self {
            kind,
            id: Some(id),
            fields: fields_from(descriptor, record),
            loaded: true,
            modified: false,
        })
    }

    pub(crate) fn hydrate_all(
        kind: EntityType,
        descriptor: &EntityDescriptor,
        records: &[Record],
    ) -> Result<Vec<Self>> {
        let entities = records
            .iter()
            .map(|record| Self::hydrate(kind, descriptor, record))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Hydrated {} {} rows", entities.len(), descriptor.name);
        Ok(entities)
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind
    }

    pub fn id(&self) -> Option<RowId> {
        self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the instance holds writes not yet saved
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn descriptor<'s>(&self, session: &'s Session) -> Result<&'s EntityDescriptor> {
        session.schema().descriptor(self.kind)
    }

    pub(crate) fn require_id(&self, descriptor: &EntityDescriptor) -> Result<RowId> {
        self.id.ok_or_else(|| Error::NotPersisted {
            entity: descriptor.name.clone(),
        })
    }

    pub(crate) fn field(&self, key: FieldKey) -> Option<&Value> {
        self.fields.get(&key)
    }

    pub(crate) fn write_field(&mut self, key: FieldKey, value: Value) {
        self.fields.insert(key, value);
        self.modified = true;
    }

    /// Fetch the row once; later calls are free
    pub fn load(&mut self, session: &Session) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        self.ensure_loaded(session, descriptor)
    }

    pub(crate) fn ensure_loaded(
        &mut self,
        session: &Session,
        descriptor: &EntityDescriptor,
    ) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let id = self.require_id(descriptor)?;
        // a load replaces the field cache and would drop pending writes
        if self.modified {
            return Err(Error::LockedForModification {
                entity: descriptor.name.clone(),
            });
        }

        tracing::debug!("Lazy loading {} {}", descriptor.name, id);
        let records =
            session.execute(&Statement::new(query::select_by_id(&descriptor.table)).bind(id))?;
        let record = records.first().ok_or_else(|| Error::NotFound {
            entity: descriptor.name.clone(),
            id,
        })?;

        self.fields = fields_from(descriptor, record);
        self.loaded = true;
        Ok(())
    }

    // ========== Attribute Resolution ==========

    /// Read any declared attribute by name
    pub fn get(&mut self, session: &Session, name: &str) -> Result<Attribute> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Column(i)) => self
                .column_at(session, descriptor, i)
                .map(|v| Attribute::Value(v.clone())),
            Some(AttributeRef::Parent(i)) => {
                self.parent_at(session, descriptor, i).map(Attribute::Parent)
            }
            Some(AttributeRef::Child(i)) => {
                self.children_at(session, descriptor, i).map(Attribute::Entities)
            }
            Some(AttributeRef::Sibling(i)) => {
                self.siblings_at(session, descriptor, i).map(Attribute::Entities)
            }
            None => Err(descriptor.unrecognized(name)),
        }
    }

    /// Write any declared attribute by name.
    ///
    /// Columns and parents update the field cache; siblings insert the
    /// junction row immediately.
    pub fn set<'a>(
        &mut self,
        session: &Session,
        name: &str,
        value: impl Into<Assign<'a>>,
    ) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        let value = value.into();
        match (descriptor.resolve(name), value) {
            (Some(AttributeRef::Column(i)), Assign::Value(v)) => {
                self.write_field(FieldKey::Column(i), v);
                Ok(())
            }
            (Some(AttributeRef::Column(_)), Assign::Entity(_)) => {
                Err(invalid(descriptor, name, "columns hold scalar values"))
            }
            (Some(AttributeRef::Parent(i)), assign) => self.assign_parent(descriptor, i, assign),
            (Some(AttributeRef::Child(_)), _) => Err(invalid(
                descriptor,
                name,
                "child relations are read-only; assign the parent on the child",
            )),
            (Some(AttributeRef::Sibling(i)), Assign::Entity(other)) => {
                self.link_at(session, descriptor, i, other)
            }
            (Some(AttributeRef::Sibling(_)), Assign::Value(_)) => {
                Err(invalid(descriptor, name, "sibling relations link entities"))
            }
            (None, _) => Err(descriptor.unrecognized(name)),
        }
    }

    /// Read a scalar column, loading the row first if needed
    pub fn column(&mut self, session: &Session, name: &str) -> Result<&Value> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Column(i)) => self.column_at(session, descriptor, i),
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    fn column_at(
        &mut self,
        session: &Session,
        descriptor: &EntityDescriptor,
        index: usize,
    ) -> Result<&Value> {
        self.ensure_loaded(session, descriptor)?;
        self.fields
            .get(&FieldKey::Column(index))
            .ok_or_else(|| Error::InvalidRow {
                entity: descriptor.name.clone(),
                reason: format!("column '{}' was not returned", descriptor.columns[index].storage),
            })
    }

    pub fn set_column(
        &mut self,
        session: &Session,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Column(i)) => {
                self.write_field(FieldKey::Column(i), value.into());
                Ok(())
            }
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    /// Read-only creation timestamp, for types declared with timestamps
    pub fn created(&mut self, session: &Session) -> Result<Option<&Value>> {
        self.timestamp(session, "created", FieldKey::Created)
    }

    /// Read-only last-update timestamp, for types declared with timestamps
    pub fn updated(&mut self, session: &Session) -> Result<Option<&Value>> {
        self.timestamp(session, "updated", FieldKey::Updated)
    }

    fn timestamp(&mut self, session: &Session, name: &str, key: FieldKey) -> Result<Option<&Value>> {
        let descriptor = self.descriptor(session)?;
        if !descriptor.timestamps {
            return Err(descriptor.unrecognized(name));
        }
        self.ensure_loaded(session, descriptor)?;
        Ok(self.fields.get(&key))
    }

    // ========== Persistence ==========

    /// Insert when new, otherwise overwrite every held field
    pub fn save(&mut self, session: &Session) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        let (columns, values): (Vec<String>, Vec<Value>) = self
            .fields
            .iter()
            .filter(|(key, _)| key.is_writable())
            .map(|(key, value)| (descriptor.storage_name(*key), value.clone()))
            .unzip();
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();

        match self.id {
            None => {
                let records = session.execute(
                    &Statement::new(query::insert(&descriptor.table, &columns)).bind_all(values),
                )?;
                let id = records
                    .first()
                    .and_then(|record| record.get(&descriptor.id_column))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| Error::InvalidRow {
                        entity: descriptor.name.clone(),
                        reason: "insert returned no key".to_string(),
                    })?;
                tracing::debug!("Inserted {} {}", descriptor.name, id);
                self.id = Some(id);
            }
            Some(id) if columns.is_empty() => {
                tracing::debug!("Nothing to update on {} {}", descriptor.name, id);
            }
            Some(id) => {
                session.execute(
                    &Statement::new(query::update_by_id(&descriptor.table, &columns))
                        .bind_all(values)
                        .bind(id),
                )?;
            }
        }

        self.modified = false;
        Ok(())
    }

    /// Remove the row; the in-memory fields stay as they were
    pub fn delete(&self, session: &Session) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        let id = self.require_id(descriptor)?;
        session.execute(&Statement::new(query::delete_by_id(&descriptor.table)).bind(id))?;
        Ok(())
    }

    /// Every row of a type, hydrated without per-instance loads
    pub fn all(session: &Session, kind: EntityType) -> Result<Vec<Entity>> {
        let descriptor = session.schema().descriptor(kind)?;
        let records = session.execute(&Statement::new(query::list_all(&descriptor.table)))?;
        Self::hydrate_all(kind, descriptor, &records)
    }

    /// Held fields by storage name, primary key first; issues no statement
    pub fn snapshot(&self, session: &Session) -> Result<Vec<(String, Value)>> {
        let descriptor = self.descriptor(session)?;
        let mut out = Vec::with_capacity(self.fields.len() + 1);
        out.push((descriptor.id_column.clone(), Value::from(self.id)));
        out.extend(
            self.fields
                .iter()
                .map(|(key, value)| (descriptor.storage_name(*key), value.clone())),
        );
        Ok(out)
    }
}

fn fields_from(descriptor: &EntityDescriptor, record: &Record) -> BTreeMap<FieldKey, Value> {
    record
        .iter()
        .filter_map(|(name, value)| descriptor.field_for(name).map(|key| (key, value.clone())))
        .collect()
}

pub(crate) fn invalid(descriptor: &EntityDescriptor, name: &str, reason: &str) -> Error {
    Error::InvalidAssignment {
        entity: descriptor.name.clone(),
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
