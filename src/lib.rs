// ==========================================
// CSV 导入核心 - 核心库
// ==========================================
// 系统定位: 电子表格导入的状态机 + 映射/转换/校验管道
// 宿主负责界面与最终入库，本库负责导入流程与数据一致性
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 表结构、状态与动作
pub mod domain;

// 引擎层 - 纯函数规则
pub mod engine;

// 导入层 - 文件、映射、会话编排
pub mod importer;

// 仓储层 - 状态持久化
pub mod repository;

// 配置层 - 导入定义
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// 性能统计
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    AvailableAction, CellValue, ColumnDefinition, ColumnMapping, ColumnType, CsvDownloadMode,
    EnumValue, ImportStatistic, ImportStatistics, ImporterAction, ImporterMode, ImporterState,
    ImporterValidationError, RequirementGroup, SheetDefinition, SheetRow, SheetState,
    TransformerRule, UploadedFile, ValidatorRule,
};

pub use engine::{apply_transformations, apply_validations, build_initial_state, reduce, StateBuilder};

pub use importer::{ImportError, ImportResult, ImporterSession, ProgressReporter, StateDispatcher};

pub use config::{
    CompletionFn, CompletionHandler, ImporterDefinition, ImporterOptions, PersistenceConfig,
    PreventUploadPolicy, SubmitPacing,
};

pub use repository::{MemoryStateStore, SqliteStateStore, StateStore};

/// 版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
