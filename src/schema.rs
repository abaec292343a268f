//! Schema registry - per-entity-type storage metadata
//!
//! Entity types are declared once with [`EntityDef`] and frozen into a
//! [`Schema`]. Building the schema resolves every relation target to an
//! [`EntityType`] handle, so nothing is looked up by name after startup.
//!
//! Storage names follow fixed conventions:
//! - table: lowercased type name
//! - primary key: `<table>_id`
//! - column: `<table>_<column>`
//! - parent foreign key: `<relation>_id`, target type = capitalized relation
//! - junction: sorted `[table, sibling_table]` joined with `__`

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// Table name for an entity type name
pub fn table_name(type_name: &str) -> String {
    type_name.to_lowercase()
}

/// Primary key column of a table
pub fn id_column(table: &str) -> String {
    format!("{}_id", table)
}

/// Storage key of a scalar column
pub fn column_key(table: &str, column: &str) -> String {
    format!("{}_{}", table, column)
}

/// Storage key of a parent foreign key
pub fn parent_key(relation: &str) -> String {
    format!("{}_id", relation)
}

/// Entity type referenced by a parent relation (`section` -> `Section`)
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("identifier pattern compiles"));

fn check_identifier(what: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::Schema(format!("{} '{}' is not a valid identifier", what, name)))
    }
}

/// Association table for a sibling relation.
///
/// Name and column order depend only on the two table names, so either side
/// of the relation derives the same junction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Junction {
    pub table: String,
    pub columns: [String; 2],
}

impl Junction {
    pub fn between(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            table: format!("{}__{}", first, second),
            columns: [id_column(first), id_column(second)],
        }
    }

    /// Junction column holding the given table's key
    pub fn column_for(&self, table: &str) -> &str {
        let key = id_column(table);
        if self.columns[0] == key {
            &self.columns[0]
        } else {
            &self.columns[1]
        }
    }
}

/// Declaration of one entity type, consumed by [`Schema::builder`].
#[derive(Debug, Clone, Default)]
pub struct EntityDef {
    name: String,
    columns: Vec<String>,
    parents: Vec<String>,
    children: Vec<(String, String)>,
    siblings: Vec<(String, String)>,
    timestamps: bool,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(names.into_iter().map(Into::into));
        self
    }

    /// Many-to-one reference stored as `<relation>_id` on this table
    pub fn parent(mut self, relation: impl Into<String>) -> Self {
        self.parents.push(relation.into());
        self
    }

    /// One-to-many back-reference; the child table carries `<table>_id`
    pub fn child(mut self, relation: impl Into<String>, entity: impl Into<String>) -> Self {
        self.children.push((relation.into(), entity.into()));
        self
    }

    /// Many-to-many relation through a junction table
    pub fn sibling(mut self, relation: impl Into<String>, entity: impl Into<String>) -> Self {
        self.siblings.push((relation.into(), entity.into()));
        self
    }

    /// Expose read-only `<table>_created` / `<table>_updated` columns
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }
}

/// Handle to a registered entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(usize);

/// Structured field identity within one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Column(usize),
    Parent(usize),
    Created,
    Updated,
}

impl FieldKey {
    /// Whether insert/update statements write this field
    pub fn is_writable(&self) -> bool {
        matches!(self, FieldKey::Column(_) | FieldKey::Parent(_))
    }
}

/// Resolved attribute, in column -> parent -> child -> sibling precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRef {
    Column(usize),
    Parent(usize),
    Child(usize),
    Sibling(usize),
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub storage: String,
}

#[derive(Debug, Clone)]
pub struct ParentDef {
    pub name: String,
    pub storage: String,
    pub target: EntityType,
}

#[derive(Debug, Clone)]
pub struct ChildDef {
    pub name: String,
    pub target: EntityType,
    /// Column on the child table referencing this table
    pub foreign_key: String,
}

#[derive(Debug, Clone)]
pub struct SiblingDef {
    pub name: String,
    pub target: EntityType,
    pub junction: Junction,
}

/// Frozen storage metadata for one entity type
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub name: String,
    pub table: String,
    pub id_column: String,
    pub columns: Vec<ColumnDef>,
    pub parents: Vec<ParentDef>,
    pub children: Vec<ChildDef>,
    pub siblings: Vec<SiblingDef>,
    pub timestamps: bool,
}

impl EntityDescriptor {
    pub fn resolve(&self, name: &str) -> Option<AttributeRef> {
        if let Some(i) = self.columns.iter().position(|c| c.name == name) {
            return Some(AttributeRef::Column(i));
        }
        if let Some(i) = self.parents.iter().position(|p| p.name == name) {
            return Some(AttributeRef::Parent(i));
        }
        if let Some(i) = self.children.iter().position(|c| c.name == name) {
            return Some(AttributeRef::Child(i));
        }
        self.siblings
            .iter()
            .position(|s| s.name == name)
            .map(AttributeRef::Sibling)
    }

    /// Storage column name of a field
    pub fn storage_name(&self, key: FieldKey) -> String {
        match key {
            FieldKey::Column(i) => self.columns[i].storage.clone(),
            FieldKey::Parent(i) => self.parents[i].storage.clone(),
            FieldKey::Created => column_key(&self.table, "created"),
            FieldKey::Updated => column_key(&self.table, "updated"),
        }
    }

    /// Map a fetched column name back to a field; `None` for foreign columns
    pub fn field_for(&self, storage: &str) -> Option<FieldKey> {
        if let Some(i) = self.columns.iter().position(|c| c.storage == storage) {
            return Some(FieldKey::Column(i));
        }
        if let Some(i) = self.parents.iter().position(|p| p.storage == storage) {
            return Some(FieldKey::Parent(i));
        }
        if self.timestamps {
            if storage == column_key(&self.table, "created") {
                return Some(FieldKey::Created);
            }
            if storage == column_key(&self.table, "updated") {
                return Some(FieldKey::Updated);
            }
        }
        None
    }

    pub(crate) fn unrecognized(&self, name: &str) -> Error {
        Error::UnrecognizedAttribute {
            entity: self.name.clone(),
            name: name.to_string(),
        }
    }
}

/// Registry of every entity type known to a session
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: Vec<EntityDescriptor>,
    by_name: HashMap<String, EntityType>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn entity_type(&self, name: &str) -> Result<EntityType> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    pub fn descriptor(&self, entity: EntityType) -> Result<&EntityDescriptor> {
        self.entities
            .get(entity.0)
            .ok_or_else(|| Error::UnknownEntity(format!("#{}", entity.0)))
    }

    /// All descriptors in declaration order
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: Vec<EntityDef>,
}

impl SchemaBuilder {
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Validate every declaration and resolve relation targets
    pub fn build(self) -> Result<Schema> {
        let mut by_name = HashMap::new();
        let mut tables = HashSet::new();

        for (index, def) in self.defs.iter().enumerate() {
            check_identifier("entity", &def.name)?;
            if by_name.insert(def.name.clone(), EntityType(index)).is_some() {
                return Err(Error::Schema(format!("entity '{}' declared twice", def.name)));
            }
            if !tables.insert(table_name(&def.name)) {
                return Err(Error::Schema(format!(
                    "entity '{}' maps to table '{}' which is already taken",
                    def.name,
                    table_name(&def.name)
                )));
            }
        }

        let lookup = |owner: &str, target: &str| -> Result<EntityType> {
            by_name.get(target).copied().ok_or_else(|| {
                Error::Schema(format!("{} references unknown entity '{}'", owner, target))
            })
        };

        let mut entities = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let table = table_name(&def.name);
            let id_column = id_column(&table);

            let mut columns = Vec::new();
            for name in &def.columns {
                check_identifier("column", name)?;
                columns.push(ColumnDef {
                    name: name.clone(),
                    storage: column_key(&table, name),
                });
            }

            let mut parents = Vec::new();
            for name in &def.parents {
                check_identifier("parent relation", name)?;
                parents.push(ParentDef {
                    name: name.clone(),
                    storage: parent_key(name),
                    target: lookup(&def.name, &capitalize(name))?,
                });
            }

            let mut children = Vec::new();
            for (name, target) in &def.children {
                check_identifier("child relation", name)?;
                children.push(ChildDef {
                    name: name.clone(),
                    target: lookup(&def.name, target)?,
                    foreign_key: id_column.clone(),
                });
            }

            let mut siblings = Vec::new();
            for (name, target) in &def.siblings {
                check_identifier("sibling relation", name)?;
                let target_table = table_name(target);
                if target_table == table {
                    return Err(Error::Schema(format!(
                        "{}.{} relates the table to itself; a junction needs two distinct tables",
                        def.name, name
                    )));
                }
                siblings.push(SiblingDef {
                    name: name.clone(),
                    target: lookup(&def.name, target)?,
                    junction: Junction::between(&table, &target_table),
                });
            }

            let descriptor = EntityDescriptor {
                name: def.name.clone(),
                table,
                id_column,
                columns,
                parents,
                children,
                siblings,
                timestamps: def.timestamps,
            };
            check_storage_collisions(&descriptor)?;
            check_attribute_names(&descriptor)?;
            entities.push(descriptor);
        }

        tracing::debug!("Schema built with {} entity types", entities.len());
        Ok(Schema { entities, by_name })
    }
}

fn check_storage_collisions(descriptor: &EntityDescriptor) -> Result<()> {
    let mut seen = HashSet::new();
    seen.insert(descriptor.id_column.clone());
    if descriptor.timestamps {
        seen.insert(column_key(&descriptor.table, "created"));
        seen.insert(column_key(&descriptor.table, "updated"));
    }
    let stored = descriptor
        .columns
        .iter()
        .map(|c| &c.storage)
        .chain(descriptor.parents.iter().map(|p| &p.storage));
    for storage in stored {
        if !seen.insert(storage.clone()) {
            return Err(Error::Schema(format!(
                "{} stores two fields under '{}'",
                descriptor.name, storage
            )));
        }
    }
    Ok(())
}

fn check_attribute_names(descriptor: &EntityDescriptor) -> Result<()> {
    let mut seen = HashSet::new();
    let names = descriptor
        .columns
        .iter()
        .map(|c| &c.name)
        .chain(descriptor.parents.iter().map(|p| &p.name))
        .chain(descriptor.children.iter().map(|c| &c.name))
        .chain(descriptor.siblings.iter().map(|s| &s.name));
    for name in names {
        if !seen.insert(name) {
            return Err(Error::Schema(format!(
                "{} declares attribute '{}' more than once",
                descriptor.name, name
            )));
        }
    }
    Ok(())
}
