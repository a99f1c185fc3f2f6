// ==========================================
// CSV 导入核心 - SQLite 状态存储
// ==========================================
// 表: importer_state(key PK, state_json, saved_at)
// 说明: rusqlite 为同步接口，读写放到阻塞线程池
// ==========================================

use crate::db::{default_db_path, open_sqlite_connection};
use crate::repository::persistence::PersistedState;
use crate::repository::state_store::{StateStore, StoreError, StoreResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS importer_state (
    key        TEXT PRIMARY KEY,
    state_json TEXT NOT NULL,
    saved_at   TEXT NOT NULL
)
"#;

// ==========================================
// SqliteStateStore
// ==========================================
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// 打开（必要时创建）数据库文件
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = open_sqlite_connection(db_path)?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 打开系统数据目录下的默认数据库
    pub fn open_default() -> StoreResult<Self> {
        let path = default_db_path()
            .ok_or_else(|| StoreError::Unavailable("无法获取系统数据目录".to_string()))?;
        Self::open(path)
    }

    /// 从已有连接创建（负责建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> StoreResult<Self> {
        {
            let guard = conn.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
            guard.execute_batch(CREATE_TABLE_SQL)?;
        }
        Ok(Self { conn })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&*guard)
        })
        .await
        .map_err(|e| StoreError::Lock(e.to_string()))?
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> StoreResult<Option<PersistedState>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT state_json FROM importer_state WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, state: &PersistedState) -> StoreResult<()> {
        let key = key.to_string();
        let json = serde_json::to_string(state)?;
        let saved_at = state.saved_at;
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO importer_state (key, state_json, saved_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    state_json = excluded.state_json,
                    saved_at = excluded.saved_at
                "#,
                params![key, json, saved_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM importer_state WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::SheetDefinition;
    use crate::domain::types::ImporterMode;
    use crate::engine::reducer::build_initial_state;

    #[tokio::test]
    async fn test_set_get_overwrite_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::open(dir.path().join("nested").join("state.db")).unwrap();

        assert!(store.get("k").await.unwrap().is_none());

        let state = build_initial_state(Arc::new(vec![SheetDefinition::new("people", "People")]));
        let mut snapshot = PersistedState::from_state(&state);
        store.set("k", &snapshot).await.unwrap();

        snapshot.mode = ImporterMode::Preview;
        store.set("k", &snapshot).await.unwrap();

        let loaded = store.get("k").await.unwrap().unwrap();
        assert_eq!(loaded.mode, ImporterMode::Preview);

        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_row_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = SqliteStateStore::open(&path).unwrap();

        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO importer_state (key, state_json, saved_at) VALUES ('k', '{oops', '')",
                [],
            )
            .unwrap();
        }

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
