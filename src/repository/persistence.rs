// ==========================================
// CSV 导入核心 - 状态持久化桥接
// ==========================================
// 职责:
// - ImporterState ⇄ PersistedState 快照（表定义含函数，不入库，恢复时重新绑定）
// - 启动时读取快照构建状态；读取失败静默回退为初始状态
// - 状态变化后经单一后台写任务按序落库（写失败只记日志，不影响内存状态）
// ==========================================

use crate::config::PersistenceConfig;
use crate::domain::sheet::SheetDefinition;
use crate::domain::state::{
    ColumnMapping, ImportStatistics, ImporterState, ImporterValidationError, ParsedFile,
    RawFileInfo, SheetState,
};
use crate::domain::types::ImporterMode;
use crate::engine::reducer::build_initial_state;
use crate::engine::transformer::apply_transformations;
use crate::engine::validator::apply_validations;
use crate::repository::state_store::StateStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// 默认存储 key
pub const DEFAULT_PERSISTENCE_KEY: &str = "csv-importer-state";

/// 快照格式版本
pub const SNAPSHOT_VERSION: u32 = 1;

/// 存储 key: 默认 key，配置了 custom_key 时追加后缀
pub fn persistence_key(config: &PersistenceConfig) -> String {
    match config.custom_key.as_deref().filter(|k| !k.is_empty()) {
        Some(custom) => format!("{}-{}", DEFAULT_PERSISTENCE_KEY, custom),
        None => DEFAULT_PERSISTENCE_KEY.to_string(),
    }
}

// ==========================================
// PersistedState - 可序列化快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub mode: ImporterMode,
    pub current_sheet_id: String,
    #[serde(default)]
    pub parsed_file: Option<ParsedFile>,
    #[serde(default)]
    pub raw_file: Option<RawFileInfo>,
    #[serde(default)]
    pub column_mappings: Option<Vec<ColumnMapping>>,
    pub sheet_data: Vec<SheetState>,
    #[serde(default)]
    pub validation_errors: Vec<ImporterValidationError>,
    #[serde(default)]
    pub import_progress: u8,
    #[serde(default)]
    pub import_statistics: Option<ImportStatistics>,
}

impl PersistedState {
    pub fn from_state(state: &ImporterState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            mode: state.mode,
            current_sheet_id: state.current_sheet_id.clone(),
            parsed_file: state.parsed_file.clone(),
            raw_file: state.raw_file.clone(),
            column_mappings: state.column_mappings.clone(),
            sheet_data: state.sheet_data.clone(),
            validation_errors: state.validation_errors.clone(),
            import_progress: state.import_progress,
            import_statistics: state.import_statistics.clone(),
        }
    }

    /// 快照是否能绑定到当前表定义
    ///
    /// 版本一致、快照中的表 id 全部存在且不重复；
    /// 当前定义新增的表在 into_state 时补空表
    pub fn is_compatible_with(&self, sheet_definitions: &[SheetDefinition]) -> bool {
        let known = |id: &str| sheet_definitions.iter().any(|s| s.id == id);
        let mut seen = HashSet::new();

        self.version == SNAPSHOT_VERSION
            && (self.current_sheet_id.is_empty() || known(&self.current_sheet_id))
            && self
                .sheet_data
                .iter()
                .all(|s| known(&s.sheet_id) && seen.insert(s.sheet_id.as_str()))
    }

    /// 绑定当前表定义，还原为 ImporterState
    ///
    /// 表数据按当前定义顺序重排（每个定义一份，缺失补空），
    /// 计算列与校验错误按当前定义重新计算，不信任快照中的结果
    pub fn into_state(self, sheet_definitions: Arc<Vec<SheetDefinition>>) -> ImporterState {
        let mut saved = self.sheet_data;
        let bound: Vec<SheetState> = sheet_definitions
            .iter()
            .map(|definition| {
                match saved.iter().position(|s| s.sheet_id == definition.id) {
                    Some(idx) => saved.swap_remove(idx),
                    None => SheetState::empty(definition.id.clone()),
                }
            })
            .collect();

        let sheet_data = apply_transformations(&sheet_definitions, &bound);
        let validation_errors = apply_validations(&sheet_definitions, &sheet_data, None);

        let current_sheet_id = if sheet_definitions.iter().any(|s| s.id == self.current_sheet_id) {
            self.current_sheet_id
        } else {
            sheet_definitions
                .first()
                .map(|s| s.id.clone())
                .unwrap_or_default()
        };

        ImporterState {
            sheet_definitions,
            mode: self.mode,
            current_sheet_id,
            parsed_file: self.parsed_file,
            raw_file: self.raw_file,
            column_mappings: self.column_mappings,
            sheet_data,
            validation_errors,
            import_progress: self.import_progress.min(100),
            import_statistics: self.import_statistics,
        }
    }
}

// ==========================================
// 读取
// ==========================================

/// 读取快照并还原；任何失败（读错误、格式不兼容）都返回 None
pub async fn load_state(
    store: &dyn StateStore,
    key: &str,
    sheet_definitions: Arc<Vec<SheetDefinition>>,
) -> Option<ImporterState> {
    match store.get(key).await {
        Ok(Some(snapshot)) if snapshot.is_compatible_with(&sheet_definitions) => {
            info!(key, mode = %snapshot.mode, saved_at = %snapshot.saved_at, "恢复已保存的导入状态");
            Some(snapshot.into_state(sheet_definitions))
        }
        Ok(Some(_)) => {
            warn!(key, "已保存的导入状态与当前表定义不匹配，忽略");
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "读取已保存的导入状态失败，使用初始状态");
            None
        }
    }
}

/// 构建启动状态
///
/// - 未开启持久化: 初始状态
/// - 有可用快照: 还原
/// - 否则: 初始状态，并写入一次初始快照
pub async fn build_state(
    sheet_definitions: Arc<Vec<SheetDefinition>>,
    config: &PersistenceConfig,
    store: Option<&dyn StateStore>,
) -> ImporterState {
    let store = match store {
        Some(store) if config.enabled => store,
        _ => return build_initial_state(sheet_definitions),
    };

    let key = persistence_key(config);
    if let Some(state) = load_state(store, &key, Arc::clone(&sheet_definitions)).await {
        return state;
    }

    let initial = build_initial_state(sheet_definitions);
    if let Err(e) = store.set(&key, &PersistedState::from_state(&initial)).await {
        warn!(key = %key, error = %e, "写入初始导入状态失败");
    }
    initial
}

// ==========================================
// 写入 - 单一后台写任务
// ==========================================
enum WriterCommand {
    Save(Box<PersistedState>),
    Flush(oneshot::Sender<()>),
}

/// 持久化写入句柄（可克隆；所有克隆共享同一个写任务，写入严格按发送顺序）
#[derive(Clone)]
pub struct PersistenceWriter {
    key: String,
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl PersistenceWriter {
    /// 启动写任务（需在 tokio 运行时内调用）
    pub fn spawn(store: Arc<dyn StateStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterCommand>();

        let task_key = key.clone();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriterCommand::Save(snapshot) => {
                        if let Err(e) = store.set(&task_key, &snapshot).await {
                            warn!(key = %task_key, error = %e, "保存导入状态失败");
                        }
                    }
                    WriterCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!(key = %task_key, "持久化写任务退出");
        });

        Self { key, tx }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 非阻塞提交一次保存
    pub fn save(&self, state: &ImporterState) {
        let snapshot = PersistedState::from_state(state);
        if self.tx.send(WriterCommand::Save(Box::new(snapshot))).is_err() {
            warn!(key = %self.key, "持久化写任务已退出，丢弃保存请求");
        }
    }

    /// 等待此前提交的保存全部完成
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
