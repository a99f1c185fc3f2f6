// ==========================================
// CSV 导入核心 - anyOf 必填分组
// ==========================================
// 职责:
// - 从 JSON Schema 形态的原始结构提取 anyOf 分组（只在启动时做一次）
// - 按原始结构的 required 列表补齐 required 校验
// - 按行校验 anyOf 分组
// ==========================================

use crate::domain::sheet::{RequirementGroup, SheetDefinition, ValidatorRule};
use crate::domain::state::{ImporterValidationError, SheetRow};
use crate::domain::types::CellValue;
use crate::i18n::t_with_args;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::debug;

/// sheet_id → 分组列表
pub type RequirementGroupsBySheet = HashMap<String, Vec<RequirementGroup>>;

/// 提取 anyOf 分组
///
/// 所有带 required 数组的 anyOf 子结构归入同一个分组 `anyOfGroup_0`
pub fn extract_any_of_groups(raw_schema: &Value) -> Vec<RequirementGroup> {
    let Some(any_of) = raw_schema.get("anyOf").and_then(Value::as_array) else {
        return Vec::new();
    };

    let required_sets: Vec<Vec<String>> = any_of
        .iter()
        .filter_map(|sub| sub.get("required").and_then(Value::as_array))
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|set| !set.is_empty())
        .collect();

    if required_sets.is_empty() {
        return Vec::new();
    }

    vec![RequirementGroup {
        group_id: "anyOfGroup_0".to_string(),
        required_sets,
    }]
}

/// 按原始结构的 required 列表补齐 required 校验
///
/// 已有 required 校验的列不重复追加（按列判断，与调用次数无关）
pub fn ensure_required_validators(sheet: &SheetDefinition, raw_schema: &Value) -> SheetDefinition {
    let mut next = sheet.clone();

    let Some(required) = raw_schema.get("required").and_then(Value::as_array) else {
        return next;
    };

    for field_id in required.iter().filter_map(Value::as_str) {
        if let Some(column) = next.columns.iter_mut().find(|c| c.id == field_id) {
            if !column.has_validator(ValidatorRule::Required.as_str()) {
                column.validators.push(ValidatorRule::Required.into());
            }
        }
    }

    next
}

/// 一次性应用原始结构增强
///
/// - 只有一张表时补齐 required 校验（原始结构根对应唯一的表）
/// - anyOf 分组对每张表都生效
pub fn apply_schema_enhancements(
    sheet_definitions: &[SheetDefinition],
    raw_schema: &Value,
) -> (Vec<SheetDefinition>, RequirementGroupsBySheet) {
    let groups = extract_any_of_groups(raw_schema);

    let definitions = if sheet_definitions.len() == 1 {
        vec![ensure_required_validators(&sheet_definitions[0], raw_schema)]
    } else {
        sheet_definitions.to_vec()
    };

    let by_sheet = definitions
        .iter()
        .map(|sheet| {
            let restricted = groups
                .iter()
                .filter_map(|g| restrict_group_to_sheet(sheet, g))
                .map(Cow::into_owned)
                .collect();
            (sheet.id.clone(), restricted)
        })
        .collect();

    (definitions, by_sheet)
}

/// 把分组收窄到表已声明的列
///
/// 含未声明列的 required set 对这张表永远无法满足，该 set 整体丢弃；
/// 没有剩余 set 的分组返回 None
pub fn restrict_group_to_sheet<'a>(
    sheet: &SheetDefinition,
    group: &'a RequirementGroup,
) -> Option<Cow<'a, RequirementGroup>> {
    let declared = |set: &Vec<String>| set.iter().all(|field| sheet.column(field).is_some());

    if group.required_sets.iter().all(declared) {
        return (!group.required_sets.is_empty()).then_some(Cow::Borrowed(group));
    }

    let required_sets: Vec<Vec<String>> = group
        .required_sets
        .iter()
        .filter(|set| declared(*set))
        .cloned()
        .collect();

    debug!(
        sheet_id = %sheet.id,
        group_id = %group.group_id,
        kept = required_sets.len(),
        dropped = group.required_sets.len() - required_sets.len(),
        "anyOf 分组包含未声明的列"
    );

    if required_sets.is_empty() {
        return None;
    }
    Some(Cow::Owned(RequirementGroup {
        group_id: group.group_id.clone(),
        required_sets,
    }))
}

/// 把分组直接挂到表定义上（reducer 从定义中读取分组）
///
/// 只挂载收窄到本表已声明列之后的分组
pub fn attach_requirement_groups(
    sheet_definitions: &[SheetDefinition],
    groups_by_sheet: &RequirementGroupsBySheet,
) -> Vec<SheetDefinition> {
    sheet_definitions
        .iter()
        .map(|sheet| {
            let mut next = sheet.clone();
            if let Some(groups) = groups_by_sheet.get(&sheet.id) {
                for group in groups.iter().filter_map(|g| restrict_group_to_sheet(sheet, g)) {
                    if !next.requirement_groups.contains(&group) {
                        next.requirement_groups.push(group.into_owned());
                    }
                }
            }
            next
        })
        .collect()
}

fn is_present(row: &SheetRow, field: &str) -> bool {
    row.get(field).map(|v| !CellValue::is_empty(v)).unwrap_or(false)
}

/// 一行是否满足分组: 至少一个 required set 的字段全部非空
pub fn satisfies_group(row: &SheetRow, group: &RequirementGroup) -> bool {
    group
        .required_sets
        .iter()
        .any(|set| set.iter().all(|field| is_present(row, field)))
}

/// 分组描述: `[a, b] OR [c]`
pub fn describe_sets(group: &RequirementGroup) -> String {
    group
        .required_sets
        .iter()
        .map(|set| format!("[{}]", set.join(", ")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// 校验一行的全部分组（追加到 errors）
///
/// 错误归属到收窄后第一个 set 的第一列，该列一定是本表已声明的列
pub fn validate_row_groups(
    sheet: &SheetDefinition,
    row_index: usize,
    row: &SheetRow,
    groups: &[RequirementGroup],
    errors: &mut Vec<ImporterValidationError>,
) {
    for group in groups.iter().filter_map(|g| restrict_group_to_sheet(sheet, g)) {
        let Some(first_column) = group.required_sets.first().and_then(|set| set.first()) else {
            continue;
        };

        if satisfies_group(row, &group) {
            continue;
        }

        errors.push(ImporterValidationError {
            sheet_id: sheet.id.clone(),
            column_id: first_column.clone(),
            row_index,
            message: t_with_args("validation.any_of", &[("sets", &describe_sets(&group))]),
        });
    }
}

/// 校验整张表的分组
pub fn validate_any_of_groups(
    sheet: &SheetDefinition,
    rows: &[SheetRow],
    groups: &[RequirementGroup],
) -> Vec<ImporterValidationError> {
    let mut errors = Vec::new();
    for (row_index, row) in rows.iter().enumerate() {
        validate_row_groups(sheet, row_index, row, groups, &mut errors);
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::ColumnDefinition;
    use serde_json::json;

    fn group(sets: &[&[&str]]) -> RequirementGroup {
        RequirementGroup {
            group_id: "g".to_string(),
            required_sets: sets
                .iter()
                .map(|set| set.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::text(*v)))
            .collect()
    }

    fn abc_sheet() -> SheetDefinition {
        SheetDefinition::new("s", "S")
            .with_column(ColumnDefinition::text("a", "A"))
            .with_column(ColumnDefinition::text("b", "B"))
            .with_column(ColumnDefinition::text("c", "C"))
    }

    #[test]
    fn test_any_of_second_set_satisfies() {
        let g = group(&[&["a", "b"], &["c"]]);
        let errors = validate_any_of_groups(&abc_sheet(), &[row(&[("c", "x"), ("a", "")])], &[g]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_any_of_none_satisfied_yields_one_error() {
        let g = group(&[&["a", "b"], &["c"]]);
        let errors = validate_any_of_groups(&abc_sheet(), &[row(&[("a", "x")]), row(&[])], &[g]);

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].column_id, "a");
        assert_eq!(errors[0].row_index, 0);
        assert_eq!(errors[1].row_index, 1);
        assert!(errors[0].message.contains("[a, b] OR [c]"));
    }

    #[test]
    fn test_undeclared_field_never_named_in_error() {
        let sheet = SheetDefinition::new("s", "S").with_column(ColumnDefinition::text("email", "Email"));
        let g = group(&[&["phone"], &["email"]]);

        let errors = validate_any_of_groups(&sheet, &[row(&[])], &[g.clone()]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].column_id, "email");
        assert!(errors[0].message.contains("[email]"));
        assert!(!errors[0].message.contains("phone"));

        // 行里带上未声明的 phone 也不能满足分组
        let errors = validate_any_of_groups(&sheet, &[row(&[("phone", "123")])], &[g]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_group_of_only_undeclared_fields_is_dropped() {
        let sheet = SheetDefinition::new("s", "S").with_column(ColumnDefinition::text("email", "Email"));
        let g = group(&[&["phone"], &["fax", "email"]]);

        assert!(restrict_group_to_sheet(&sheet, &g).is_none());
        assert!(validate_any_of_groups(&sheet, &[row(&[])], &[g]).is_empty());
    }

    #[test]
    fn test_restrict_borrows_fully_declared_group() {
        let g = group(&[&["a"], &["b", "c"]]);
        assert!(matches!(restrict_group_to_sheet(&abc_sheet(), &g), Some(Cow::Borrowed(_))));
    }

    #[test]
    fn test_extract_any_of_groups() {
        let schema = json!({
            "anyOf": [
                { "required": ["email"] },
                { "required": ["phone", "country"] },
                { "description": "ignored" }
            ]
        });

        let groups = extract_any_of_groups(&schema);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_id, "anyOfGroup_0");
        assert_eq!(
            groups[0].required_sets,
            vec![
                vec!["email".to_string()],
                vec!["phone".to_string(), "country".to_string()]
            ]
        );
        assert!(extract_any_of_groups(&json!({})).is_empty());
    }

    #[test]
    fn test_ensure_required_validators_is_idempotent() {
        let sheet = SheetDefinition::new("s", "S")
            .with_column(ColumnDefinition::text("name", "Name"))
            .with_column(ColumnDefinition::text("email", "Email"));
        let schema = json!({ "required": ["name", "missing"] });

        let once = ensure_required_validators(&sheet, &schema);
        let twice = ensure_required_validators(&once, &schema);

        assert_eq!(once, twice);
        assert_eq!(once.column("name").unwrap().validators.len(), 1);
        assert!(once.column("email").unwrap().validators.is_empty());
    }

    #[test]
    fn test_apply_schema_enhancements_single_sheet() {
        let defs = vec![SheetDefinition::new("s", "S")
            .with_column(ColumnDefinition::text("email", "Email"))];
        let schema = json!({ "required": ["email"], "anyOf": [{ "required": ["email"] }] });

        let (defs, groups) = apply_schema_enhancements(&defs, &schema);
        assert!(defs[0].column("email").unwrap().has_validator("required"));
        assert_eq!(groups["s"].len(), 1);

        let attached = attach_requirement_groups(&defs, &groups);
        let again = attach_requirement_groups(&attached, &groups);
        assert_eq!(again[0].requirement_groups.len(), 1);
    }

    #[test]
    fn test_attached_groups_only_name_declared_columns() {
        let defs = vec![SheetDefinition::new("s", "S")
            .with_column(ColumnDefinition::text("email", "Email"))];
        let schema = json!({ "anyOf": [{ "required": ["phone"] }, { "required": ["email"] }] });

        let (defs, groups) = apply_schema_enhancements(&defs, &schema);
        assert_eq!(groups["s"][0].required_sets, vec![vec!["email".to_string()]]);

        let attached = attach_requirement_groups(&defs, &groups);
        for group in &attached[0].requirement_groups {
            for field in group.required_sets.iter().flatten() {
                assert!(attached[0].column(field).is_some(), "undeclared column {}", field);
            }
        }
    }
}
