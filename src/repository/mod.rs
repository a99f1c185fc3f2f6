// ==========================================
// CSV 导入核心 - 状态仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 导入状态快照的读写，屏蔽存储细节
// 约束: 所有查询使用参数化
// ==========================================

pub mod memory_state_store;
pub mod persistence;
pub mod sqlite_state_store;
pub mod state_store;

pub use memory_state_store::MemoryStateStore;
pub use persistence::{
    build_state, load_state, persistence_key, PersistedState, PersistenceWriter,
    DEFAULT_PERSISTENCE_KEY,
};
pub use sqlite_state_store::SqliteStateStore;
pub use state_store::{StateStore, StoreError, StoreResult};
