// ==========================================
// CSV 导入核心 - 领域层
// ==========================================
// 职责: 表结构、行数据、导入状态与动作的类型定义
// 红线: 领域层不含业务流程
// ==========================================

pub mod sheet;
pub mod state;
pub mod types;

// 重导出核心类型
pub use sheet::{
    CalculatedArguments, ColumnDefinition, ColumnType, ComputeFn, EnumArguments, EnumValue,
    NumberArguments, PredicateFn, ReferenceArguments, RequirementGroup, SharedFn,
    SheetDefinition, TransformFn, TransformerRule, ValidatorDefinition, ValidatorRule,
};
pub use state::{
    is_empty_row, CellChangedPayload, ColumnMapping, ImportStatistic, ImportStatistics,
    ImporterAction, ImporterState, ImporterValidationError, MappingTarget, ParsedFile,
    RawFileInfo, RemoveRowsPayload, SheetRow, SheetState, UploadedFile,
};
pub use types::{AvailableAction, CellValue, CsvDownloadMode, ImporterMode};
