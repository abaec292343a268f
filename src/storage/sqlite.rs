//! SQLite session - the shared connection every entity operation runs on

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, ErrorCode, params_from_iter};

use crate::config::RowmapConfig;
use crate::entity::Entity;
use crate::query::Statement;
use crate::schema::{EntityType, Schema};
use crate::value::Value;
use crate::{DatabaseErrorKind, Error, Result, RowId};

/// One fetched row, keeping the column names the statement reported
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Connection plus the schema registry it serves.
///
/// Entities never hold a connection; every operation takes the session
/// explicitly. A session is single-threaded and all entities sharing it
/// share its transaction boundary.
pub struct Session {
    conn: Connection,
    schema: Arc<Schema>,
    executed: Cell<u64>,
}

impl Session {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path, schema: impl Into<Arc<Schema>>) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::database)?;
        tracing::debug!("Opened database {}", path.display());
        Ok(Self::with_connection(conn, schema))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(schema: impl Into<Arc<Schema>>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::database)?;
        Ok(Self::with_connection(conn, schema))
    }

    /// Wrap an already configured connection
    pub fn with_connection(conn: Connection, schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            conn,
            schema: schema.into(),
            executed: Cell::new(0),
        }
    }

    /// Build the registry and open the database a config file names
    pub fn from_config(config: &RowmapConfig) -> Result<Self> {
        let database = config
            .database
            .as_deref()
            .ok_or_else(|| Error::Configuration("no database configured".to_string()))?;
        let schema = config.schema()?;
        Self::open(Path::new(database), schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn entity_type(&self, name: &str) -> Result<EntityType> {
        self.schema.entity_type(name)
    }

    /// A new, not yet persisted entity
    pub fn create(&self, entity: &str) -> Result<Entity> {
        Ok(Entity::new(self.entity_type(entity)?))
    }

    /// An unloaded handle to an existing row; issues no statement
    pub fn find(&self, entity: &str, id: RowId) -> Result<Entity> {
        Ok(Entity::with_id(self.entity_type(entity)?, id))
    }

    /// Fetch a row eagerly, raising `NotFound` when it does not exist
    pub fn load(&self, entity: &str, id: RowId) -> Result<Entity> {
        let mut instance = self.find(entity, id)?;
        instance.load(self)?;
        Ok(instance)
    }

    /// Every row of an entity type, fully hydrated
    pub fn all(&self, entity: &str) -> Result<Vec<Entity>> {
        Entity::all(self, self.entity_type(entity)?)
    }

    /// Run raw SQL outside the entity layer (DDL, fixtures)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(Error::database)
    }

    /// Run one statement in its own transaction and collect the result set
    pub fn execute(&self, statement: &Statement) -> Result<Vec<Record>> {
        self.executed.set(self.executed.get() + 1);
        tracing::debug!(
            "Executing {} ({} params)",
            statement.sql,
            statement.params.len()
        );

        match self.run(statement) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!("Statement failed, rolled back: {}", e);
                Err(Error::database(e))
            }
        }
    }

    /// Dropping the transaction on any early return rolls it back
    fn run(&self, statement: &Statement) -> rusqlite::Result<Vec<Record>> {
        let tx = self.conn.unchecked_transaction()?;
        let records = {
            let mut prepared = tx.prepare(&statement.sql)?;
            let names: Vec<String> = prepared
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = prepared.query(params_from_iter(statement.params.iter()))?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut fields = Vec::with_capacity(names.len());
                for (index, name) in names.iter().enumerate() {
                    fields.push((name.clone(), row.get::<_, Value>(index)?));
                }
                records.push(Record { fields });
            }
            records
        };
        tx.commit()?;
        Ok(records)
    }

    /// Number of statements executed through this session
    pub fn statements_executed(&self) -> u64 {
        self.executed.get()
    }

    /// Close the connection, surfacing any error the driver reports
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::database(e))
    }
}

/// Classify a driver error by SQLite result code
pub(crate) fn classify(error: &rusqlite::Error) -> DatabaseErrorKind {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => DatabaseErrorKind::Constraint,
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::SystemIoFailure
            | ErrorCode::FileLockingProtocolFailed => DatabaseErrorKind::Connectivity,
            _ => DatabaseErrorKind::Query,
        },
        _ => DatabaseErrorKind::Query,
    }
}
