// ==========================================
// CSV 导入核心 - 领域基础类型
// ==========================================
// 职责: 单元格值、状态机模式、导出模式、可用操作
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// CellValue - 单元格值
// ==========================================
/// 行内单元格的值: 文本 / 数值 / 空
///
/// 枚举列的取值也落在 `Text` 或 `Number` 上。
/// 序列化为 JSON 时 `Empty` 对应 `null`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// 空值判定: `Empty` 或空字符串
    ///
    /// 与 anyOf 分组、required 校验使用同一口径
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(n) => n.is_nan(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// 展示/导出用的文本形式（空值为空串）
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            // 整数值不带小数点输出（12.0 → "12"）
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

// ==========================================
// ImporterMode - 状态机模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImporterMode {
    Upload,
    Mapping,
    Preview,
    Submit,
    Completed,
    Failed,
}

impl ImporterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImporterMode::Upload => "upload",
            ImporterMode::Mapping => "mapping",
            ImporterMode::Preview => "preview",
            ImporterMode::Submit => "submit",
            ImporterMode::Completed => "completed",
            ImporterMode::Failed => "failed",
        }
    }
}

impl fmt::Display for ImporterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// CsvDownloadMode - 导出模式
// ==========================================
/// - Value: 导出原始值
/// - Label: 枚举列导出标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CsvDownloadMode {
    #[default]
    Value,
    Label,
}

// ==========================================
// AvailableAction - 宿主允许的操作
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AvailableAction {
    AddRow,
    RemoveRows,
    DownloadCsv,
    Search,
    ResetState,
    BackToPreviousStep,
}

impl AvailableAction {
    pub const ALL: [AvailableAction; 6] = [
        AvailableAction::AddRow,
        AvailableAction::RemoveRows,
        AvailableAction::DownloadCsv,
        AvailableAction::Search,
        AvailableAction::ResetState,
        AvailableAction::BackToPreviousStep,
    ];
}
