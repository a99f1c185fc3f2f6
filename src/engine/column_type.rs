// ==========================================
// CSV 导入核心 - 列类型引擎
// ==========================================
// 职责: 按列类型做值强制转换 / 计算列求值 / 枚举标签投影
// 红线: 纯函数，不持有状态；空白字符串转数值得到 Empty，绝不产生 NaN
// ==========================================

use crate::domain::sheet::{ColumnDefinition, ColumnType, EnumArguments, SheetDefinition};
use crate::domain::state::SheetRow;
use crate::domain::types::CellValue;
use std::collections::HashMap;

/// 类型层面的违规（在声明的校验规则之前检查）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeViolation {
    NotANumber,
    NotInEnum,
}

impl TypeViolation {
    /// 对应的翻译 key
    pub fn message_key(&self) -> &'static str {
        match self {
            TypeViolation::NotANumber => "validation.not_a_number",
            TypeViolation::NotInEnum => "validation.invalid_enum",
        }
    }
}

// ==========================================
// 强制转换
// ==========================================

/// 按列类型转换原始值
///
/// 计算列原样返回，由 [`compute`] 负责求值
pub fn coerce(column: &ColumnDefinition, raw: &CellValue) -> CellValue {
    match &column.column_type {
        ColumnType::Text | ColumnType::Reference(_) => coerce_text(raw),
        ColumnType::Number(args) => coerce_number(raw, args.precision),
        ColumnType::Enum(args) => coerce_enum(args, raw),
        ColumnType::Calculated(_) => raw.clone(),
    }
}

fn coerce_text(raw: &CellValue) -> CellValue {
    match raw {
        CellValue::Number(n) if n.is_nan() => CellValue::Empty,
        CellValue::Number(_) => CellValue::Text(raw.to_string()),
        other => other.clone(),
    }
}

fn coerce_number(raw: &CellValue, precision: Option<u32>) -> CellValue {
    let number = match raw {
        CellValue::Empty => return CellValue::Empty,
        CellValue::Number(n) => *n,
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return CellValue::Empty;
            }
            match trimmed.parse::<f64>() {
                Ok(n) => n,
                // 无法解析时保留原文本，交给类型校验报错
                Err(_) => return CellValue::Text(s.clone()),
            }
        }
    };

    if !number.is_finite() {
        return CellValue::Empty;
    }

    match precision {
        Some(p) => {
            let factor = 10f64.powi(p as i32);
            CellValue::Number((number * factor).round() / factor)
        }
        None => CellValue::Number(number),
    }
}

fn coerce_enum(args: &EnumArguments, raw: &CellValue) -> CellValue {
    let text = match raw {
        CellValue::Empty => return CellValue::Empty,
        CellValue::Number(_) => {
            return if args.values.iter().any(|v| &v.value == raw) {
                raw.clone()
            } else {
                coerce_enum(args, &CellValue::Text(raw.to_string()))
            };
        }
        CellValue::Text(s) => s.trim(),
    };

    if text.is_empty() {
        return CellValue::Empty;
    }

    // 1. 按值匹配
    if let Some(found) = args
        .values
        .iter()
        .find(|v| v.value.to_display_string() == text)
    {
        return found.value.clone();
    }

    // 2. 按标签匹配（忽略大小写）
    if let Some(found) = args
        .values
        .iter()
        .find(|v| v.label.trim().eq_ignore_ascii_case(text))
    {
        return found.value.clone();
    }

    raw.clone()
}

// ==========================================
// 计算列
// ==========================================

/// 计算列求值（非计算列返回 None）
pub fn compute(column: &ColumnDefinition, row: &SheetRow) -> Option<CellValue> {
    match &column.column_type {
        ColumnType::Calculated(args) => Some(args.compute.call(row)),
        _ => None,
    }
}

/// 按表定义重算一行的全部计算列（按列声明顺序）
pub fn recalculate_row(sheet: &SheetDefinition, row: &SheetRow) -> SheetRow {
    let mut next = row.clone();
    for column in sheet.calculated_columns() {
        if let Some(value) = compute(column, &next) {
            next.insert(column.id.clone(), value);
        }
    }
    next
}

// ==========================================
// 类型检查
// ==========================================

/// 已转换的值是否符合列类型（空值总是合法）
pub fn check_type(column: &ColumnDefinition, value: &CellValue) -> Option<TypeViolation> {
    if value.is_empty() {
        return None;
    }

    match &column.column_type {
        ColumnType::Number(_) => match value {
            CellValue::Number(_) => None,
            _ => Some(TypeViolation::NotANumber),
        },
        ColumnType::Enum(args) => {
            if args.values.iter().any(|v| &v.value == value) {
                None
            } else {
                Some(TypeViolation::NotInEnum)
            }
        }
        _ => None,
    }
}

// ==========================================
// 枚举标签投影
// ==========================================

/// 枚举值 → 标签（非枚举列或未知值返回 None）
pub fn enum_label(column: &ColumnDefinition, value: &CellValue) -> Option<String> {
    match &column.column_type {
        ColumnType::Enum(args) => args
            .values
            .iter()
            .find(|v| &v.value == value)
            .map(|v| v.label.clone()),
        _ => None,
    }
}

/// sheet_id → column_id → 值文本 → 标签
pub type EnumLabelDict = HashMap<String, HashMap<String, HashMap<String, String>>>;

pub fn get_enum_label_dict(sheets: &[SheetDefinition]) -> EnumLabelDict {
    sheets
        .iter()
        .map(|sheet| {
            let columns = sheet
                .columns
                .iter()
                .filter_map(|column| match &column.column_type {
                    ColumnType::Enum(args) => Some((
                        column.id.clone(),
                        args.values
                            .iter()
                            .map(|v| (v.value.to_display_string(), v.label.clone()))
                            .collect(),
                    )),
                    _ => None,
                })
                .collect();
            (sheet.id.clone(), columns)
        })
        .collect()
}
