// ==========================================
// CSV 导入核心 - 导入定义（宿主配置）
// ==========================================
// 默认值:
// - max_file_size_in_bytes = 20 MiB
// - persistence_config = { enabled: false }
// - csv_download_mode = value
// - allow_manual_data_entry = false
// - available_actions = 全部
// - prevent_upload_on_validation_errors = Never
// - amount_of_empty_rows_for_manual_entry = 100
// ==========================================

use crate::config::hooks::{
    CompletionHandler, DataColumnsMappedHook, StateChangeListener, SuggestedMapper,
};
use crate::domain::sheet::SheetDefinition;
use crate::domain::state::{ImporterState, ImporterValidationError};
use crate::domain::types::{AvailableAction, CsvDownloadMode};
use crate::engine::reducer::NUMBER_OF_EMPTY_ROWS_FOR_MANUAL_DATA_INPUT;
use crate::engine::requirement_group::{apply_schema_enhancements, attach_requirement_groups};
use crate::importer::file_loader::{ExcelFileLoader, FileLoader};
use crate::importer::file_parser::{CsvFileParser, FileParser};
use crate::repository::state_store::StateStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 默认文件大小上限: 20 MiB
pub const DEFAULT_MAX_FILE_SIZE_IN_BYTES: u64 = 20 * 1024 * 1024;

// ==========================================
// PersistenceConfig
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    pub enabled: bool,
    #[serde(default)]
    pub custom_key: Option<String>,
}

// ==========================================
// PreventUploadPolicy - 校验错误是否阻止提交
// ==========================================
pub type PreventUploadFn = Arc<dyn Fn(&[ImporterValidationError]) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub enum PreventUploadPolicy {
    #[default]
    Never,
    Always,
    Custom(PreventUploadFn),
}

impl PreventUploadPolicy {
    /// 没有错误时永不阻止
    pub fn blocks(&self, errors: &[ImporterValidationError]) -> bool {
        if errors.is_empty() {
            return false;
        }
        match self {
            PreventUploadPolicy::Never => false,
            PreventUploadPolicy::Always => true,
            PreventUploadPolicy::Custom(f) => f(errors),
        }
    }
}

impl fmt::Debug for PreventUploadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreventUploadPolicy::Never => write!(f, "Never"),
            PreventUploadPolicy::Always => write!(f, "Always"),
            PreventUploadPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

// ==========================================
// SubmitPacing - 提交完成前的等待（让进度条动画收尾）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPacing {
    /// 处理器返回 → PROGRESS(100)
    pub before_full_progress: Duration,
    /// PROGRESS(100) → COMPLETED
    pub before_completed: Duration,
}

impl SubmitPacing {
    pub const IMMEDIATE: SubmitPacing = SubmitPacing {
        before_full_progress: Duration::ZERO,
        before_completed: Duration::ZERO,
    };
}

impl Default for SubmitPacing {
    fn default() -> Self {
        Self {
            before_full_progress: Duration::from_millis(400),
            before_completed: Duration::from_millis(200),
        }
    }
}

// ==========================================
// ImporterDefinition
// ==========================================
#[derive(Clone)]
pub struct ImporterDefinition {
    pub sheets: Arc<Vec<SheetDefinition>>,
    pub on_complete: Arc<dyn CompletionHandler>,
    pub max_file_size_in_bytes: u64,
    pub persistence_config: PersistenceConfig,
    /// 开启持久化但未提供存储时，使用系统数据目录下的 SQLite
    pub state_store: Option<Arc<dyn StateStore>>,
    pub csv_download_mode: CsvDownloadMode,
    pub allow_manual_data_entry: bool,
    pub available_actions: Vec<AvailableAction>,
    pub prevent_upload_on_validation_errors: PreventUploadPolicy,
    pub amount_of_empty_rows_for_manual_entry: usize,
    pub on_data_columns_mapped: Option<Arc<dyn DataColumnsMappedHook>>,
    pub custom_suggested_mapper: Option<Arc<dyn SuggestedMapper>>,
    pub custom_file_loaders: Vec<Arc<dyn FileLoader>>,
    pub parser: Arc<dyn FileParser>,
    pub initial_state: Option<ImporterState>,
    pub on_state_changed: Option<Arc<dyn StateChangeListener>>,
    pub submit_pacing: SubmitPacing,
}

impl ImporterDefinition {
    pub fn new(sheets: Vec<SheetDefinition>, on_complete: impl CompletionHandler + 'static) -> Self {
        Self {
            sheets: Arc::new(sheets),
            on_complete: Arc::new(on_complete),
            max_file_size_in_bytes: DEFAULT_MAX_FILE_SIZE_IN_BYTES,
            persistence_config: PersistenceConfig::default(),
            state_store: None,
            csv_download_mode: CsvDownloadMode::default(),
            allow_manual_data_entry: false,
            available_actions: AvailableAction::ALL.to_vec(),
            prevent_upload_on_validation_errors: PreventUploadPolicy::default(),
            amount_of_empty_rows_for_manual_entry: NUMBER_OF_EMPTY_ROWS_FOR_MANUAL_DATA_INPUT,
            on_data_columns_mapped: None,
            custom_suggested_mapper: None,
            custom_file_loaders: vec![Arc::new(ExcelFileLoader)],
            parser: Arc::new(CsvFileParser),
            initial_state: None,
            on_state_changed: None,
            submit_pacing: SubmitPacing::default(),
        }
    }

    pub fn is_action_available(&self, action: AvailableAction) -> bool {
        self.available_actions.contains(&action)
    }

    /// 按 JSON Schema 形态的原始结构补齐 required 校验与 anyOf 分组（启动时调用一次）
    pub fn with_raw_schema(mut self, raw_schema: &serde_json::Value) -> Self {
        let (definitions, groups) = apply_schema_enhancements(&self.sheets, raw_schema);
        self.sheets = Arc::new(attach_requirement_groups(&definitions, &groups));
        self
    }

    pub fn with_persistence(mut self, config: PersistenceConfig, store: Option<Arc<dyn StateStore>>) -> Self {
        self.persistence_config = config;
        self.state_store = store;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_in_bytes = bytes;
        self
    }

    pub fn with_manual_data_entry(mut self, allow: bool) -> Self {
        self.allow_manual_data_entry = allow;
        self
    }

    pub fn with_available_actions(mut self, actions: Vec<AvailableAction>) -> Self {
        self.available_actions = actions;
        self
    }

    pub fn with_csv_download_mode(mut self, mode: CsvDownloadMode) -> Self {
        self.csv_download_mode = mode;
        self
    }

    pub fn with_prevent_upload_policy(mut self, policy: PreventUploadPolicy) -> Self {
        self.prevent_upload_on_validation_errors = policy;
        self
    }

    pub fn with_data_columns_mapped_hook(mut self, hook: impl DataColumnsMappedHook + 'static) -> Self {
        self.on_data_columns_mapped = Some(Arc::new(hook));
        self
    }

    pub fn with_suggested_mapper(mut self, mapper: impl SuggestedMapper + 'static) -> Self {
        self.custom_suggested_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn with_file_loader(mut self, loader: impl FileLoader + 'static) -> Self {
        self.custom_file_loaders.push(Arc::new(loader));
        self
    }

    pub fn with_parser(mut self, parser: impl FileParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn with_initial_state(mut self, state: ImporterState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_state_listener(mut self, listener: impl StateChangeListener + 'static) -> Self {
        self.on_state_changed = Some(Arc::new(listener));
        self
    }

    pub fn with_submit_pacing(mut self, pacing: SubmitPacing) -> Self {
        self.submit_pacing = pacing;
        self
    }

    /// 覆盖可序列化的选项（未设置的字段保持不变）
    pub fn with_options(mut self, options: &ImporterOptions) -> Self {
        if let Some(v) = options.max_file_size_in_bytes {
            self.max_file_size_in_bytes = v;
        }
        if let Some(v) = &options.persistence_config {
            self.persistence_config = v.clone();
        }
        if let Some(v) = options.csv_download_mode {
            self.csv_download_mode = v;
        }
        if let Some(v) = options.allow_manual_data_entry {
            self.allow_manual_data_entry = v;
        }
        if let Some(v) = &options.available_actions {
            self.available_actions = v.clone();
        }
        if let Some(v) = options.amount_of_empty_rows_for_manual_entry {
            self.amount_of_empty_rows_for_manual_entry = v;
        }
        if let Some(prevent) = options.prevent_upload_on_validation_errors {
            self.prevent_upload_on_validation_errors = if prevent {
                PreventUploadPolicy::Always
            } else {
                PreventUploadPolicy::Never
            };
        }
        self
    }
}

impl fmt::Debug for ImporterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImporterDefinition")
            .field("sheets", &self.sheets.iter().map(|s| &s.id).collect::<Vec<_>>())
            .field("max_file_size_in_bytes", &self.max_file_size_in_bytes)
            .field("persistence_config", &self.persistence_config)
            .field("csv_download_mode", &self.csv_download_mode)
            .field("allow_manual_data_entry", &self.allow_manual_data_entry)
            .field("available_actions", &self.available_actions)
            .field(
                "prevent_upload_on_validation_errors",
                &self.prevent_upload_on_validation_errors,
            )
            .finish_non_exhaustive()
    }
}

// ==========================================
// ImporterOptions - 可从 JSON 读取的选项子集
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImporterOptions {
    pub max_file_size_in_bytes: Option<u64>,
    pub persistence_config: Option<PersistenceConfig>,
    pub csv_download_mode: Option<CsvDownloadMode>,
    pub allow_manual_data_entry: Option<bool>,
    pub available_actions: Option<Vec<AvailableAction>>,
    pub amount_of_empty_rows_for_manual_entry: Option<usize>,
    pub prevent_upload_on_validation_errors: Option<bool>,
}

impl ImporterOptions {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::hooks::CompletionFn;
    use crate::domain::sheet::ColumnDefinition;
    use serde_json::json;

    fn definition() -> ImporterDefinition {
        ImporterDefinition::new(
            vec![SheetDefinition::new("people", "People")
                .with_column(ColumnDefinition::text("email", "Email"))
                .with_column(ColumnDefinition::text("phone", "Phone"))],
            CompletionFn::new(|_state, _progress| async { Ok(None) }),
        )
    }

    fn error() -> ImporterValidationError {
        ImporterValidationError {
            sheet_id: "people".to_string(),
            column_id: "email".to_string(),
            row_index: 0,
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        let def = definition();
        assert_eq!(def.max_file_size_in_bytes, 20 * 1024 * 1024);
        assert!(!def.persistence_config.enabled);
        assert_eq!(def.csv_download_mode, CsvDownloadMode::Value);
        assert!(!def.allow_manual_data_entry);
        assert_eq!(def.available_actions.len(), AvailableAction::ALL.len());
        assert_eq!(def.amount_of_empty_rows_for_manual_entry, 100);
        assert!(!def.prevent_upload_on_validation_errors.blocks(&[error()]));
    }

    #[test]
    fn test_options_from_json() {
        let options = ImporterOptions::from_json_str(
            r#"{
                "maxFileSizeInBytes": 1024,
                "persistenceConfig": { "enabled": true, "customKey": "orders" },
                "csvDownloadMode": "label",
                "availableActions": ["addRow", "downloadCsv"],
                "preventUploadOnValidationErrors": true
            }"#,
        )
        .unwrap();

        let def = definition().with_options(&options);
        assert_eq!(def.max_file_size_in_bytes, 1024);
        assert_eq!(def.persistence_config.custom_key.as_deref(), Some("orders"));
        assert_eq!(def.csv_download_mode, CsvDownloadMode::Label);
        assert!(def.is_action_available(AvailableAction::DownloadCsv));
        assert!(!def.is_action_available(AvailableAction::ResetState));
        assert!(def.prevent_upload_on_validation_errors.blocks(&[error()]));
        // 未设置的字段保持默认
        assert!(!def.allow_manual_data_entry);
    }

    #[test]
    fn test_prevent_upload_policy() {
        let custom = PreventUploadPolicy::Custom(Arc::new(|errors: &[ImporterValidationError]| errors.len() > 1));
        assert!(!custom.blocks(&[error()]));
        assert!(custom.blocks(&[error(), error()]));
        assert!(!PreventUploadPolicy::Always.blocks(&[]));
    }

    #[test]
    fn test_with_raw_schema_attaches_groups() {
        let def = definition().with_raw_schema(&json!({
            "required": ["email"],
            "anyOf": [{ "required": ["email"] }, { "required": ["phone"] }]
        }));

        let sheet = &def.sheets[0];
        assert!(sheet.column("email").unwrap().has_validator("required"));
        assert_eq!(sheet.requirement_groups.len(), 1);
        assert_eq!(sheet.requirement_groups[0].required_sets.len(), 2);
    }
}
