use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Builder, Connection, Database, Row, Value};
use std::{str::FromStr, sync::Arc};
use uuid::Uuid;

use super::{StateRepository, StorageError, UserRepository};
use crate::service::{
    state::{ChangeType, SpaceState, UserState, UserStatus},
    user::{AutoInsideMode, Role, User, UserPatch},
};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        roles TEXT NOT NULL DEFAULT 'default',
        mac TEXT,
        language TEXT,
        emoji TEXT,
        autoinside TEXT NOT NULL DEFAULT 'disabled'
    )",
    "CREATE TABLE IF NOT EXISTS user_states (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        date INTEGER NOT NULL,
        until INTEGER,
        change_type TEXT NOT NULL,
        note TEXT,
        user_json TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_user_states_date ON user_states (date)",
    "CREATE INDEX IF NOT EXISTS idx_user_states_user ON user_states (user_id)",
    "CREATE TABLE IF NOT EXISTS space_states (
        id TEXT PRIMARY KEY,
        open INTEGER NOT NULL,
        date INTEGER NOT NULL,
        changer_id INTEGER NOT NULL
    )",
];

const USER_COLUMNS: &str = "id, username, first_name, roles, mac, language, emoji, autoinside";
const USER_STATE_COLUMNS: &str = "id, user_id, status, date, until, change_type, note, user_json";

#[derive(Clone)]
pub struct TursoClient {
    inner: Arc<Database>,
}

impl TursoClient {
    pub async fn new(url: &str, token: &str) -> Result<Self, StorageError> {
        info!("Initializing TursoClient...");
        let db = Builder::new_remote(url.to_string(), token.to_string()).build().await?;

        info!("TursoClient initialized");
        Ok(Self { inner: Arc::new(db) })
    }

    pub async fn get_connection(&self) -> Result<Connection, StorageError> {
        let conn = self.inner.connect()?;
        Ok(conn)
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.get_connection().await?;
        for migration in MIGRATIONS {
            conn.execute(migration, ()).await?;
        }
        info!("Turso schema is up to date");
        Ok(())
    }

    async fn query_users(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<User>, StorageError> {
        let conn = self.get_connection().await?;
        let mut rows = conn.query(sql, params).await?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    async fn query_user_states(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<UserState>, StorageError> {
        let conn = self.get_connection().await?;
        let mut rows = conn.query(sql, params).await?;

        let mut states = Vec::new();
        while let Some(row) = rows.next().await? {
            states.push(row_to_user_state(&row)?);
        }
        Ok(states)
    }

    async fn write_user(&self, user: &User) -> Result<u64, StorageError> {
        let conn = self.get_connection().await?;
        let changed = conn
            .execute(
                "UPDATE users SET username = ?2, first_name = ?3, roles = ?4, mac = ?5, language = ?6, emoji = ?7, autoinside = ?8 WHERE id = ?1",
                params![
                    user.id as i64,
                    text_or_null(user.username.as_deref()),
                    text_or_null(user.first_name.as_deref()),
                    Role::join(&user.roles),
                    user.mac.join(","),
                    text_or_null(user.language.as_deref()),
                    text_or_null(user.emoji.as_deref()),
                    user.autoinside.as_str()
                ],
            )
            .await?;
        Ok(changed)
    }
}

fn text_or_null(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

fn nullable_text(row: &Row, idx: i32) -> Result<Option<String>, StorageError> {
    match row.get_value(idx)? {
        Value::Text(text) => Ok(Some(text)),
        Value::Null => Ok(None),
        other => Err(StorageError::InvalidRow(format!("expected text at {}, got {:?}", idx, other))),
    }
}

fn nullable_integer(row: &Row, idx: i32) -> Result<Option<i64>, StorageError> {
    match row.get_value(idx)? {
        Value::Integer(value) => Ok(Some(value)),
        Value::Null => Ok(None),
        other => Err(StorageError::InvalidRow(format!("expected integer at {}, got {:?}", idx, other))),
    }
}

fn millis_to_date(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StorageError::InvalidRow(format!("bad timestamp {}", millis)))
}

fn row_to_user(row: &Row) -> Result<User, StorageError> {
    let roles = row.get::<String>(3)?;
    let mac = nullable_text(row, 4)?.unwrap_or_default();
    let autoinside = row.get::<String>(7)?;

    Ok(User {
        id: row.get::<i64>(0)? as u64,
        username: nullable_text(row, 1)?,
        first_name: nullable_text(row, 2)?,
        roles: Role::parse_list(&roles),
        mac: mac
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
        language: nullable_text(row, 5)?,
        emoji: nullable_text(row, 6)?,
        autoinside: AutoInsideMode::from_str(&autoinside).unwrap_or_default(),
    })
}

fn row_to_user_state(row: &Row) -> Result<UserState, StorageError> {
    let status = row.get::<String>(2)?;
    let change_type = row.get::<String>(5)?;
    let user_json = row.get::<String>(7)?;

    Ok(UserState {
        id: Some(row.get::<String>(0)?),
        user_id: row.get::<i64>(1)? as u64,
        status: UserStatus::from_str(&status).map_err(StorageError::InvalidRow)?,
        date: millis_to_date(row.get::<i64>(3)?)?,
        until: nullable_integer(row, 4)?.map(millis_to_date).transpose()?,
        change_type: ChangeType::from_str(&change_type).map_err(StorageError::InvalidRow)?,
        note: nullable_text(row, 6)?,
        user: serde_json::from_str(&user_json)?,
    })
}

#[async_trait]
impl UserRepository for TursoClient {
    async fn get_user_by_id(&self, id: u64) -> Result<Option<User>, StorageError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1 LIMIT 1", USER_COLUMNS);
        Ok(self.query_users(&sql, params![id as i64]).await?.into_iter().next())
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>, StorageError> {
        let sql = format!(
            "SELECT {} FROM users WHERE lower(username) = lower(?1) LIMIT 1",
            USER_COLUMNS
        );
        let handle = handle.trim_start_matches('@').to_string();
        Ok(self.query_users(&sql, params![handle]).await?.into_iter().next())
    }

    async fn add_user(&self, user: &User) -> Result<bool, StorageError> {
        let conn = self.get_connection().await?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO users (id, username, first_name, roles, mac, language, emoji, autoinside) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id as i64,
                    text_or_null(user.username.as_deref()),
                    text_or_null(user.first_name.as_deref()),
                    Role::join(&user.roles),
                    user.mac.join(","),
                    text_or_null(user.language.as_deref()),
                    text_or_null(user.emoji.as_deref()),
                    user.autoinside.as_str()
                ],
            )
            .await?;
        Ok(inserted > 0)
    }

    async fn update_user(&self, id: u64, patch: UserPatch) -> Result<bool, StorageError> {
        let Some(mut user) = self.get_user_by_id(id).await? else {
            return Ok(false);
        };
        patch.apply(&mut user);
        Ok(self.write_user(&user).await? > 0)
    }

    async fn get_users_by_role(&self, role: Role) -> Result<Vec<User>, StorageError> {
        Ok(self
            .get_users()
            .await?
            .into_iter()
            .filter(|user| user.has_role(role))
            .collect())
    }

    async fn get_users(&self) -> Result<Vec<User>, StorageError> {
        let sql = format!("SELECT {} FROM users", USER_COLUMNS);
        self.query_users(&sql, ()).await
    }
}

#[async_trait]
impl StateRepository for TursoClient {
    async fn push_user_state(&self, mut state: UserState) -> Result<UserState, StorageError> {
        let id = Uuid::new_v4().to_string();
        let user_json = serde_json::to_string(&state.user)?;
        let until = match state.until {
            Some(until) => Value::Integer(until.timestamp_millis()),
            None => Value::Null,
        };

        let conn = self.get_connection().await?;
        conn.execute(
            "INSERT INTO user_states (id, user_id, status, date, until, change_type, note, user_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.clone(),
                state.user_id as i64,
                state.status.as_str(),
                state.date.timestamp_millis(),
                until,
                state.change_type.as_str(),
                text_or_null(state.note.as_deref()),
                user_json
            ],
        )
        .await?;

        state.id = Some(id);
        Ok(state)
    }

    async fn get_user_states_since(&self, since: DateTime<Utc>) -> Result<Vec<UserState>, StorageError> {
        let sql = format!(
            "SELECT {} FROM user_states WHERE date >= ?1 ORDER BY date ASC",
            USER_STATE_COLUMNS
        );
        self.query_user_states(&sql, params![since.timestamp_millis()]).await
    }

    async fn get_user_states_for(&self, user_id: u64) -> Result<Vec<UserState>, StorageError> {
        let sql = format!(
            "SELECT {} FROM user_states WHERE user_id = ?1 ORDER BY date ASC",
            USER_STATE_COLUMNS
        );
        self.query_user_states(&sql, params![user_id as i64]).await
    }

    async fn get_latest_space_state(&self) -> Result<Option<SpaceState>, StorageError> {
        let conn = self.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, open, date, changer_id FROM space_states ORDER BY date DESC LIMIT 1",
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(SpaceState {
                id: Some(row.get::<String>(0)?),
                open: row.get::<i64>(1)? != 0,
                date: millis_to_date(row.get::<i64>(2)?)?,
                changer_id: row.get::<i64>(3)? as u64,
            })),
            None => Ok(None),
        }
    }

    async fn push_space_state(&self, mut state: SpaceState) -> Result<SpaceState, StorageError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.get_connection().await?;
        conn.execute(
            "INSERT INTO space_states (id, open, date, changer_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.clone(),
                state.open as i64,
                state.date.timestamp_millis(),
                state.changer_id as i64
            ],
        )
        .await?;

        state.id = Some(id);
        Ok(state)
    }
}
