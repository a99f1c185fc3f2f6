// ==========================================
// CSV 导入核心 - 导入状态与动作
// ==========================================
// 职责: ImporterState 根聚合 + ImporterAction 动作集
// 红线: 状态只整体替换，不原地修改
// ==========================================

use crate::domain::sheet::SheetDefinition;
use crate::domain::types::{CellValue, ImporterMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// 行数据: 列 id → 值（缺失键等同空值）
pub type SheetRow = BTreeMap<String, CellValue>;

/// 行是否完全为空
pub fn is_empty_row(row: &SheetRow) -> bool {
    row.values().all(CellValue::is_empty)
}

// ==========================================
// SheetState - 单表数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetState {
    pub sheet_id: String,
    pub rows: Vec<SheetRow>,
}

impl SheetState {
    pub fn new(sheet_id: impl Into<String>, rows: Vec<SheetRow>) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            rows,
        }
    }

    pub fn empty(sheet_id: impl Into<String>) -> Self {
        Self::new(sheet_id, Vec::new())
    }

    /// 去除完全空白的行（提交前使用）
    pub fn without_empty_rows(&self) -> Self {
        Self {
            sheet_id: self.sheet_id.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| !is_empty_row(row))
                .cloned()
                .collect(),
        }
    }
}

// ==========================================
// ColumnMapping - 列映射
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTarget {
    pub sheet_id: String,
    pub sheet_column_id: String,
}

/// 上传表头 → 目标列（None 表示未映射）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub csv_column_name: String,
    pub target: Option<MappingTarget>,
}

impl ColumnMapping {
    pub fn mapped(
        csv_column_name: impl Into<String>,
        sheet_id: impl Into<String>,
        sheet_column_id: impl Into<String>,
    ) -> Self {
        Self {
            csv_column_name: csv_column_name.into(),
            target: Some(MappingTarget {
                sheet_id: sheet_id.into(),
                sheet_column_id: sheet_column_id.into(),
            }),
        }
    }

    pub fn unmapped(csv_column_name: impl Into<String>) -> Self {
        Self {
            csv_column_name: csv_column_name.into(),
            target: None,
        }
    }
}

// ==========================================
// 上传产物
// ==========================================

/// 宿主交给导入器的原始文件
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// 小写扩展名（无扩展名返回空串）
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
    }

    pub fn info(&self) -> RawFileInfo {
        RawFileInfo {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_in_bytes: self.size_in_bytes(),
        }
    }
}

/// 状态中保留的原始文件元信息（不保存文件内容）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileInfo {
    pub name: String,
    pub mime_type: Option<String>,
    pub size_in_bytes: u64,
}

/// 解析器输出: 表头 + 行（表头 → 原始字符串）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedFile {
    pub headers: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

// ==========================================
// 校验错误 / 导入统计
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImporterValidationError {
    pub sheet_id: String,
    pub column_id: String,
    pub row_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStatistic {
    pub label: String,
    pub value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportStatistics {
    pub statistics: Vec<ImportStatistic>,
}

// ==========================================
// ImporterState - 根聚合
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ImporterState {
    /// 只读表结构（整个会话共享同一份）
    pub sheet_definitions: Arc<Vec<SheetDefinition>>,
    pub mode: ImporterMode,
    pub current_sheet_id: String,
    pub parsed_file: Option<ParsedFile>,
    pub raw_file: Option<RawFileInfo>,
    pub column_mappings: Option<Vec<ColumnMapping>>,
    pub sheet_data: Vec<SheetState>,
    pub validation_errors: Vec<ImporterValidationError>,
    /// 0..=100
    pub import_progress: u8,
    pub import_statistics: Option<ImportStatistics>,
}

impl ImporterState {
    pub fn sheet(&self, sheet_id: &str) -> Option<&SheetState> {
        self.sheet_data.iter().find(|s| s.sheet_id == sheet_id)
    }

    pub fn sheet_definition(&self, sheet_id: &str) -> Option<&SheetDefinition> {
        self.sheet_definitions.iter().find(|s| s.id == sheet_id)
    }

    pub fn current_sheet(&self) -> Option<&SheetState> {
        self.sheet(&self.current_sheet_id)
    }

    pub fn errors_for_sheet<'a>(
        &'a self,
        sheet_id: &'a str,
    ) -> impl Iterator<Item = &'a ImporterValidationError> + 'a {
        self.validation_errors
            .iter()
            .filter(move |e| e.sheet_id == sheet_id)
    }

    /// 各表行数（sheet_id → rows.len()）
    pub fn sheet_row_counts(&self) -> BTreeMap<String, usize> {
        self.sheet_data
            .iter()
            .map(|s| (s.sheet_id.clone(), s.rows.len()))
            .collect()
    }
}

// ==========================================
// ImporterAction - 状态机动作
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct CellChangedPayload {
    pub sheet_id: String,
    pub row_index: usize,
    pub value: SheetRow,
}

/// 按行号删除（行号为派发时的位置）
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveRowsPayload {
    pub sheet_id: String,
    pub row_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImporterAction {
    Upload,
    FileParsed {
        parsed: ParsedFile,
        raw_file: RawFileInfo,
    },
    ColumnMappingChanged {
        mappings: Vec<ColumnMapping>,
    },
    DataMapped {
        mapped_data: Vec<SheetState>,
    },
    EnterDataManually {
        amount_of_empty_rows_to_add: usize,
    },
    CellChanged(CellChangedPayload),
    RemoveRows(RemoveRowsPayload),
    AddEmptyRow,
    SheetChanged {
        sheet_id: String,
    },
    Submit,
    Progress {
        progress: u8,
    },
    Completed {
        import_statistics: Option<ImportStatistics>,
    },
    Failed,
    Preview,
    Mapping,
    Reset,
    SetState(Box<ImporterState>),
}

impl ImporterAction {
    pub fn name(&self) -> &'static str {
        match self {
            ImporterAction::Upload => "UPLOAD",
            ImporterAction::FileParsed { .. } => "FILE_PARSED",
            ImporterAction::ColumnMappingChanged { .. } => "COLUMN_MAPPING_CHANGED",
            ImporterAction::DataMapped { .. } => "DATA_MAPPED",
            ImporterAction::EnterDataManually { .. } => "ENTER_DATA_MANUALLY",
            ImporterAction::CellChanged(_) => "CELL_CHANGED",
            ImporterAction::RemoveRows(_) => "REMOVE_ROWS",
            ImporterAction::AddEmptyRow => "ADD_EMPTY_ROW",
            ImporterAction::SheetChanged { .. } => "SHEET_CHANGED",
            ImporterAction::Submit => "SUBMIT",
            ImporterAction::Progress { .. } => "PROGRESS",
            ImporterAction::Completed { .. } => "COMPLETED",
            ImporterAction::Failed => "FAILED",
            ImporterAction::Preview => "PREVIEW",
            ImporterAction::Mapping => "MAPPING",
            ImporterAction::Reset => "RESET",
            ImporterAction::SetState(_) => "SET_STATE",
        }
    }

    /// 是否会让正在进行的异步导入结果失效
    pub fn invalidates_pending_work(&self) -> bool {
        matches!(
            self,
            ImporterAction::Upload | ImporterAction::Reset | ImporterAction::SetState(_)
        )
    }
}
