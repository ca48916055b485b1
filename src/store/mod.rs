use std::error::Error;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::error::ApiError;
use crate::core::model::{Operation, Situation};

/// Columns of `dl_models` that may be edited through the API
pub const EDITABLE_FIELDS: [&str; 6] = [
    "name",
    "library",
    "code_data",
    "code_model",
    "code_train",
    "code_test",
];

/// A model definition row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlModel {
    pub id: i64,
    pub name: String,
    pub situation: String,
    pub library: String,
    pub code_data: String,
    pub code_model: String,
    pub code_train: String,
    pub code_test: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A dataset feature descriptor row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub id: i64,
    pub name: String,
    pub label: String,
    pub unit: Option<String>,
    pub description: String,
}

/// Store-level error type
#[derive(Debug)]
pub enum StoreError {
    Db(rusqlite::Error),
    Lock(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Db(e) => write!(f, "Database error: {}", e),
            StoreError::Lock(msg) => write!(f, "Database lock error: {}", msg),
        }
    }
}

impl Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Db(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Db(rusqlite::Error::QueryReturnedNoRows) => {
                ApiError::NotFound("no matching record".to_string())
            }
            other => ApiError::Internal(format!("{}", other)),
        }
    }
}

/// Relational store for model definitions, progress logs, features and users.
///
/// A single SQLite connection shared behind a mutex; the conditional UPDATE in
/// `claim_situation` is the atomic guard on the per-model train/test slot.
#[derive(Clone, Debug)]
pub struct ModelStore {
    conn: Arc<Mutex<Connection>>,
}

impl ModelStore {
    /// Open (or create) the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(format!("{}", e)))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS dl_models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                situation TEXT NOT NULL DEFAULT 'Free',
                library TEXT NOT NULL DEFAULT '',
                code_data TEXT NOT NULL DEFAULT '',
                code_model TEXT NOT NULL DEFAULT '',
                code_train TEXT NOT NULL DEFAULT '',
                code_test TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS model_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                process TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS features (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                label TEXT NOT NULL,
                unit TEXT,
                description TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn row_to_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<DlModel> {
        Ok(DlModel {
            id: row.get(0)?,
            name: row.get(1)?,
            situation: row.get(2)?,
            library: row.get(3)?,
            code_data: row.get(4)?,
            code_model: row.get(5)?,
            code_train: row.get(6)?,
            code_test: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    const MODEL_COLUMNS: &'static str = "id, name, situation, library, code_data, \
         code_model, code_train, code_test, created_at, updated_at";

    /// All model definitions, ordered by id
    pub fn list_models(&self) -> Result<Vec<DlModel>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM dl_models ORDER BY id",
            Self::MODEL_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_model)?;
        let mut models = Vec::new();
        for row in rows {
            models.push(row?);
        }
        Ok(models)
    }

    /// All model names, ordered by id
    pub fn model_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM dl_models ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    pub fn get_model_by_pk(&self, pk: i64) -> Result<Option<DlModel>, StoreError> {
        let conn = self.lock()?;
        let model = conn
            .query_row(
                &format!(
                    "SELECT {} FROM dl_models WHERE id = ?1",
                    Self::MODEL_COLUMNS
                ),
                params![pk],
                Self::row_to_model,
            )
            .optional()?;
        Ok(model)
    }

    pub fn get_model_by_name(&self, name: &str) -> Result<Option<DlModel>, StoreError> {
        let conn = self.lock()?;
        let model = conn
            .query_row(
                &format!(
                    "SELECT {} FROM dl_models WHERE name = ?1",
                    Self::MODEL_COLUMNS
                ),
                params![name],
                Self::row_to_model,
            )
            .optional()?;
        Ok(model)
    }

    pub fn name_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dl_models WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert a model definition plus its status row, returning the new id
    pub fn create_model(
        &self,
        name: &str,
        library: &str,
        code_data: &str,
        code_model: &str,
        code_train: &str,
        code_test: &str,
    ) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dl_models (name, situation, library, code_data, code_model, \
             code_train, code_test, created_at, updated_at) \
             VALUES (?1, 'Free', ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![name, library, code_data, code_model, code_train, code_test, now],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT OR IGNORE INTO model_status (name, process) VALUES (?1, '')",
            params![name],
        )?;
        Ok(id)
    }

    /// Update one editable column of a model definition
    pub fn update_model_field(&self, pk: i64, field: &str, value: &str) -> Result<(), StoreError> {
        // Guard against arbitrary column names reaching the SQL text
        if !EDITABLE_FIELDS.contains(&field) {
            return Err(StoreError::Db(rusqlite::Error::InvalidParameterName(
                field.to_string(),
            )));
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "UPDATE dl_models SET {} = ?1, updated_at = ?2 WHERE id = ?3",
                field
            ),
            params![value, now, pk],
        )?;
        Ok(())
    }

    /// Delete a model and its status row
    pub fn delete_model(&self, pk: i64, name: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM dl_models WHERE id = ?1", params![pk])?;
        conn.execute("DELETE FROM model_status WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Atomically claim the train/test slot of a model.
    ///
    /// Succeeds only when the current situation is `Free`; the conditional
    /// UPDATE makes the check and the set a single statement, so concurrent
    /// claims cannot both win.
    pub fn claim_situation(&self, name: &str, op: Operation) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE dl_models SET situation = ?1 WHERE name = ?2 AND situation = 'Free'",
            params![op.situation().as_str(), name],
        )?;
        Ok(changed == 1)
    }

    /// Release the slot back to `Free`; called on every exit path
    pub fn release_situation(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE dl_models SET situation = 'Free' WHERE name = ?1",
            params![name],
        )?;
        Ok(())
    }

    pub fn get_situation(&self, name: &str) -> Result<Option<Situation>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT situation FROM dl_models WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|s| Situation::parse(&s)))
    }

    /// Progress log text for a model, if the status row exists
    pub fn get_process(&self, name: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let process = conn
            .query_row(
                "SELECT process FROM model_status WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(process)
    }

    /// Overwrite the progress log
    pub fn set_process(&self, name: &str, text: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE model_status SET process = ?1 WHERE name = ?2",
            params![text, name],
        )?;
        Ok(())
    }

    /// Append one line to the progress log
    pub fn append_process(&self, name: &str, line: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE model_status SET process = process || ?1 || char(10) WHERE name = ?2",
            params![line, name],
        )?;
        Ok(())
    }

    /// Rename a status row when its model is renamed
    pub fn rename_status(&self, old_name: &str, new_name: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE model_status SET name = ?1 WHERE name = ?2",
            params![new_name, old_name],
        )?;
        Ok(())
    }

    pub fn list_features(&self) -> Result<Vec<FeatureRow>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, label, unit, description FROM features ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(FeatureRow {
                id: row.get(0)?,
                name: row.get(1)?,
                label: row.get(2)?,
                unit: row.get(3)?,
                description: row.get(4)?,
            })
        })?;
        let mut features = Vec::new();
        for row in rows {
            features.push(row?);
        }
        Ok(features)
    }

    pub fn insert_feature(
        &self,
        name: &str,
        label: &str,
        unit: Option<&str>,
        description: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO features (name, label, unit, description) \
             VALUES (?1, ?2, ?3, ?4)",
            params![name, label, unit, description],
        )?;
        Ok(())
    }

    /// Stored password for a username, if the user exists
    pub fn get_password(&self, username: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let password = conn
            .query_row(
                "SELECT password FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(password)
    }

    pub fn upsert_user(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, ?2) \
             ON CONFLICT(username) DO UPDATE SET password = ?2",
            params![username, password],
        )?;
        info!("Seeded user '{}'", username);
        Ok(())
    }
}
