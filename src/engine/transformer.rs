// ==========================================
// CSV 导入核心 - 转换引擎
// ==========================================
// 职责: 类型强制转换 → 列转换规则 → 计算列重算
// 红线: 幂等（对已转换数据再执行一次结果不变）
// 调用时机: 每次行内容变化后、校验之前
// ==========================================

use crate::domain::sheet::{SheetDefinition, TransformerRule};
use crate::domain::state::{SheetRow, SheetState};
use crate::domain::types::CellValue;
use crate::engine::column_type;
use crate::perf::PerfGuard;

/// 对全部表的全部行执行转换
///
/// 没有对应定义的表原样返回
pub fn apply_transformations(
    sheet_definitions: &[SheetDefinition],
    sheet_data: &[SheetState],
) -> Vec<SheetState> {
    let mut perf = PerfGuard::new("apply_transformations");

    let result: Vec<SheetState> = sheet_data
        .iter()
        .map(|sheet| {
            match sheet_definitions.iter().find(|d| d.id == sheet.sheet_id) {
                Some(definition) => SheetState {
                    sheet_id: sheet.sheet_id.clone(),
                    rows: sheet
                        .rows
                        .iter()
                        .map(|row| transform_row(definition, row))
                        .collect(),
                },
                None => {
                    tracing::warn!(sheet_id = %sheet.sheet_id, "未找到表定义，跳过转换");
                    sheet.clone()
                }
            }
        })
        .collect();

    perf.add_rows(result.iter().map(|s| s.rows.len()).sum());
    result
}

/// 单行转换: 非计算列先强制转换再套用转换规则，最后重算计算列
///
/// 未声明的键原样保留
pub fn transform_row(definition: &SheetDefinition, row: &SheetRow) -> SheetRow {
    let mut next = SheetRow::new();

    for (key, value) in row {
        let transformed = match definition.column(key) {
            Some(column) if !column.column_type.is_calculated() => {
                let coerced = column_type::coerce(column, value);
                column
                    .transformers
                    .iter()
                    .fold(coerced, |acc, rule| apply_rule(rule, &acc))
            }
            _ => value.clone(),
        };
        next.insert(key.clone(), transformed);
    }

    column_type::recalculate_row(definition, &next)
}

/// 套用单条转换规则
pub fn apply_rule(rule: &TransformerRule, value: &CellValue) -> CellValue {
    match rule {
        TransformerRule::Trim => map_text(value, |s| s.trim().to_string()),
        TransformerRule::Uppercase => map_text(value, str::to_uppercase),
        TransformerRule::Lowercase => map_text(value, str::to_lowercase),
        TransformerRule::PhoneNumber => map_text(value, normalize_phone_number),
        TransformerRule::PostalCode => normalize_postal_code(value),
        TransformerRule::StringToBoolean => string_to_boolean(value),
        TransformerRule::Custom { transform, .. } => transform.call(value),
    }
}

fn map_text(value: &CellValue, f: impl Fn(&str) -> String) -> CellValue {
    match value {
        CellValue::Text(s) => CellValue::Text(f(s)),
        other => other.clone(),
    }
}

/// 电话号码: 仅保留数字（保留开头的 '+'）；没有数字时原样返回
fn normalize_phone_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return raw.to_string();
    }
    if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else {
        digits
    }
}

/// 邮编: 纯数字且不足 5 位时左侧补零
fn normalize_postal_code(value: &CellValue) -> CellValue {
    let text = match value {
        CellValue::Number(n) if n.fract() == 0.0 && *n >= 0.0 => value.to_string(),
        CellValue::Text(s) => s.trim().to_string(),
        other => return other.clone(),
    };

    if !text.is_empty() && text.len() < 5 && text.chars().all(|c| c.is_ascii_digit()) {
        CellValue::Text(format!("{:0>5}", text))
    } else if matches!(value, CellValue::Number(_)) {
        CellValue::Text(text)
    } else {
        value.clone()
    }
}

fn string_to_boolean(value: &CellValue) -> CellValue {
    let normalized = match value {
        CellValue::Text(s) => s.trim().to_lowercase(),
        CellValue::Number(n) => n.to_string(),
        CellValue::Empty => return CellValue::Empty,
    };

    match normalized.as_str() {
        "true" | "yes" | "y" | "1" | "si" | "sí" => CellValue::text("true"),
        "false" | "no" | "n" | "0" => CellValue::text("false"),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::ColumnDefinition;

    fn people_sheet() -> SheetDefinition {
        SheetDefinition::new("people", "People")
            .with_column(
                ColumnDefinition::text("name", "Name").with_transformer(TransformerRule::Trim),
            )
            .with_column(ColumnDefinition::number("age", "Age"))
            .with_column(
                ColumnDefinition::text("phone", "Phone")
                    .with_transformer(TransformerRule::PhoneNumber),
            )
            .with_column(ColumnDefinition::calculated("upper", "Upper", |row| {
                row.get("name")
                    .and_then(CellValue::as_str)
                    .map(|s| CellValue::text(s.to_uppercase()))
                    .unwrap_or(CellValue::Empty)
            }))
    }

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::text(*v)))
            .collect()
    }

    #[test]
    fn test_transform_row_pipeline() {
        let sheet = people_sheet();
        let out = transform_row(
            &sheet,
            &row(&[("name", "  ana "), ("age", " 31 "), ("phone", "+1 (555) 010-99")]),
        );

        assert_eq!(out["name"], CellValue::text("ana"));
        assert_eq!(out["age"], CellValue::Number(31.0));
        assert_eq!(out["phone"], CellValue::text("+155501099"));
        assert_eq!(out["upper"], CellValue::text("ANA"));
    }

    #[test]
    fn test_calculated_column_overrides_stale_value() {
        let sheet = people_sheet();
        let out = transform_row(&sheet, &row(&[("name", "bo"), ("upper", "STALE")]));
        assert_eq!(out["upper"], CellValue::text("BO"));
    }

    #[test]
    fn test_apply_transformations_is_idempotent() {
        let defs = vec![people_sheet()];
        let data = vec![SheetState::new(
            "people",
            vec![
                row(&[("name", " x "), ("age", ""), ("phone", "555 12")]),
                row(&[("name", "y"), ("age", "abc"), ("extra", "kept")]),
                SheetRow::new(),
            ],
        )];

        let once = apply_transformations(&defs, &data);
        let twice = apply_transformations(&defs, &once);
        assert_eq!(once, twice);
        assert_eq!(once[0].rows[0]["age"], CellValue::Empty);
        assert_eq!(once[0].rows[1]["extra"], CellValue::text("kept"));
    }

    #[test]
    fn test_unknown_sheet_is_untouched() {
        let defs = vec![people_sheet()];
        let data = vec![SheetState::new("other", vec![row(&[("name", " x ")])])];
        assert_eq!(apply_transformations(&defs, &data), data);
    }

    #[test]
    fn test_postal_code_and_boolean_rules() {
        assert_eq!(
            apply_rule(&TransformerRule::PostalCode, &CellValue::text("501")),
            CellValue::text("00501")
        );
        assert_eq!(
            apply_rule(&TransformerRule::PostalCode, &CellValue::Number(2134.0)),
            CellValue::text("02134")
        );
        assert_eq!(
            apply_rule(&TransformerRule::PostalCode, &CellValue::text("SW1A 1AA")),
            CellValue::text("SW1A 1AA")
        );
        assert_eq!(
            apply_rule(&TransformerRule::StringToBoolean, &CellValue::text("Yes")),
            CellValue::text("true")
        );
        assert_eq!(
            apply_rule(&TransformerRule::StringToBoolean, &CellValue::Number(0.0)),
            CellValue::text("false")
        );
        assert_eq!(
            apply_rule(&TransformerRule::StringToBoolean, &CellValue::text("maybe")),
            CellValue::text("maybe")
        );
    }

    #[test]
    fn test_custom_rule() {
        let rule = TransformerRule::custom("double", |v| match v {
            CellValue::Number(n) => CellValue::Number(n * 2.0),
            other => other.clone(),
        });
        assert_eq!(apply_rule(&rule, &CellValue::Number(2.0)), CellValue::Number(4.0));
    }
}
