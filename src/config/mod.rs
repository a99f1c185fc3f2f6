// ==========================================
// CSV 导入核心 - 配置层
// ==========================================
// 职责: 宿主提供的导入定义、默认值与回调接口
// ==========================================

pub mod hooks;
pub mod importer_definition;

pub use hooks::{
    CompletionFn, CompletionHandler, DataColumnsMappedHook, StateChangeListener, SuggestedMapper,
};
pub use importer_definition::{
    ImporterDefinition, ImporterOptions, PersistenceConfig, PreventUploadFn,
    PreventUploadPolicy, SubmitPacing, DEFAULT_MAX_FILE_SIZE_IN_BYTES,
};
