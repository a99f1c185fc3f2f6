// ==========================================
// CSV 导入核心 - 状态存储接口
// ==========================================
// 红线: 存储层不含业务逻辑，只按 key 读写快照
// ==========================================

use crate::repository::persistence::PersistedState;
use async_trait::async_trait;
use thiserror::Error;

/// 存储层错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("快照序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("数据库操作失败: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("存储锁获取失败: {0}")]
    Lock(String),

    #[error("存储目录不可用: {0}")]
    Io(#[from] std::io::Error),

    #[error("存储不可用: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 异步键值存储
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<PersistedState>>;

    async fn set(&self, key: &str, state: &PersistedState) -> StoreResult<()>;

    async fn remove(&self, key: &str) -> StoreResult<()>;
}
