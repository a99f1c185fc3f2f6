// ==========================================
// CSV 导入核心 - 校验引擎
// ==========================================
// 职责: 列校验规则 + 类型检查 + 跨表引用 + anyOf 分组 → 扁平错误列表
// 红线: 每次从头全量计算，不做增量修补
// 顺序: 表定义顺序 → 行顺序 → 列/规则声明顺序 → 分组顺序
// ==========================================

use crate::domain::sheet::{
    ColumnDefinition, ColumnType, SheetDefinition, ValidatorDefinition, ValidatorRule,
};
use crate::domain::state::{ImporterValidationError, SheetRow, SheetState};
use crate::domain::types::CellValue;
use crate::engine::column_type;
use crate::engine::requirement_group::{validate_row_groups, RequirementGroupsBySheet};
use crate::i18n::{t, t_with_args};
use crate::perf::PerfGuard;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("phone regex"))
}

fn postal_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").expect("postal code regex"))
}

// ==========================================
// 表级预计算（unique / regex / 引用）
// ==========================================
struct SheetContext<'a> {
    definition: &'a SheetDefinition,
    /// column_id → 重复出现的值
    duplicates: HashMap<&'a str, HashSet<String>>,
    /// (列下标, 规则下标) → 编译后的正则（非法表达式为 None）
    patterns: HashMap<(usize, usize), Option<Regex>>,
    /// column_id → 被引用列的取值集合
    references: HashMap<&'a str, HashSet<String>>,
}

impl<'a> SheetContext<'a> {
    fn build(
        definition: &'a SheetDefinition,
        rows: &[SheetRow],
        all_data: &[SheetState],
    ) -> Self {
        let mut duplicates = HashMap::new();
        let mut patterns = HashMap::new();
        let mut references = HashMap::new();

        for (col_idx, column) in definition.columns.iter().enumerate() {
            for (rule_idx, validator) in column.validators.iter().enumerate() {
                match &validator.rule {
                    ValidatorRule::Unique => {
                        duplicates.insert(column.id.as_str(), find_duplicates(rows, &column.id));
                    }
                    ValidatorRule::RegexMatches { pattern } => {
                        let compiled = match Regex::new(pattern) {
                            Ok(re) => Some(re),
                            Err(e) => {
                                tracing::warn!(
                                    column_id = %column.id,
                                    pattern = %pattern,
                                    error = %e,
                                    "正则表达式非法，跳过该规则"
                                );
                                None
                            }
                        };
                        patterns.insert((col_idx, rule_idx), compiled);
                    }
                    _ => {}
                }
            }

            if let ColumnType::Reference(args) = &column.column_type {
                let values = all_data
                    .iter()
                    .find(|s| s.sheet_id == args.sheet_id)
                    .map(|s| {
                        s.rows
                            .iter()
                            .filter_map(|r| r.get(&args.sheet_column_id))
                            .filter(|v| !v.is_empty())
                            .map(CellValue::to_display_string)
                            .collect()
                    })
                    .unwrap_or_default();
                references.insert(column.id.as_str(), values);
            }
        }

        Self {
            definition,
            duplicates,
            patterns,
            references,
        }
    }
}

fn find_duplicates(rows: &[SheetRow], column_id: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut duplicates = HashSet::new();
    for value in rows.iter().filter_map(|r| r.get(column_id)) {
        if value.is_empty() {
            continue;
        }
        let key = value.to_display_string();
        if !seen.insert(key.clone()) {
            duplicates.insert(key);
        }
    }
    duplicates
}

// ==========================================
// 入口
// ==========================================

/// 全量校验
///
/// `any_of_groups` 中的分组与表定义自带的分组合并生效
pub fn apply_validations(
    sheet_definitions: &[SheetDefinition],
    sheet_data: &[SheetState],
    any_of_groups: Option<&RequirementGroupsBySheet>,
) -> Vec<ImporterValidationError> {
    let mut perf = PerfGuard::new("apply_validations");
    let mut errors = Vec::new();

    for definition in sheet_definitions {
        let Some(sheet) = sheet_data.iter().find(|s| s.sheet_id == definition.id) else {
            continue;
        };

        let context = SheetContext::build(definition, &sheet.rows, sheet_data);
        let extra_groups = any_of_groups
            .and_then(|m| m.get(&definition.id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for (row_index, row) in sheet.rows.iter().enumerate() {
            validate_row(&context, row_index, row, &mut errors);
            validate_row_groups(
                definition,
                row_index,
                row,
                &definition.requirement_groups,
                &mut errors,
            );
            validate_row_groups(definition, row_index, row, extra_groups, &mut errors);
        }

        perf.add_rows(sheet.rows.len());
    }

    errors
}

fn validate_row(
    context: &SheetContext<'_>,
    row_index: usize,
    row: &SheetRow,
    errors: &mut Vec<ImporterValidationError>,
) {
    let sheet_id = &context.definition.id;

    for (col_idx, column) in context.definition.columns.iter().enumerate() {
        let value = row.get(&column.id).cloned().unwrap_or_default();

        let mut push = |message: String| {
            errors.push(ImporterValidationError {
                sheet_id: sheet_id.clone(),
                column_id: column.id.clone(),
                row_index,
                message,
            });
        };

        // 类型检查先于声明的规则
        if let Some(violation) = column_type::check_type(column, &value) {
            push(t(violation.message_key()));
        }

        if let Some(allowed) = context.references.get(column.id.as_str()) {
            if !value.is_empty() && !allowed.contains(&value.to_display_string()) {
                push(t("validation.invalid_reference"));
            }
        }

        for (rule_idx, validator) in column.validators.iter().enumerate() {
            if !passes(context, column, col_idx, rule_idx, &validator.rule, &value, row) {
                push(message_for(validator));
            }
        }
    }
}

fn passes(
    context: &SheetContext<'_>,
    column: &ColumnDefinition,
    col_idx: usize,
    rule_idx: usize,
    rule: &ValidatorRule,
    value: &CellValue,
    row: &SheetRow,
) -> bool {
    let text = value.to_display_string();

    match rule {
        ValidatorRule::Required => !value.is_empty(),
        // 其余规则对空值不生效
        _ if value.is_empty() => true,
        ValidatorRule::Unique => context
            .duplicates
            .get(column.id.as_str())
            .map(|dups| !dups.contains(&text))
            .unwrap_or(true),
        ValidatorRule::RegexMatches { .. } => match context.patterns.get(&(col_idx, rule_idx)) {
            Some(Some(re)) => re.is_match(&text),
            _ => true,
        },
        ValidatorRule::Includes { values } => {
            values.iter().any(|v| v.to_display_string() == text)
        }
        ValidatorRule::MultiIncludes { values, delimiter } => text
            .split(delimiter.as_str())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .all(|part| values.iter().any(|v| v == part)),
        ValidatorRule::IsInteger => match value {
            CellValue::Number(n) => n.fract() == 0.0,
            _ => text.trim().parse::<i64>().is_ok(),
        },
        ValidatorRule::Email => email_regex().is_match(text.trim()),
        ValidatorRule::PhoneNumber => {
            let compact: String = text
                .chars()
                .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
                .collect();
            phone_regex().is_match(&compact)
        }
        ValidatorRule::PostalCode => postal_code_regex().is_match(text.trim()),
        ValidatorRule::Custom { predicate, .. } => predicate.call(value, row),
    }
}

fn message_for(validator: &ValidatorDefinition) -> String {
    if let Some(custom) = &validator.error {
        return custom.clone();
    }

    match &validator.rule {
        ValidatorRule::Custom { name, .. } => t_with_args("validation.custom", &[("name", name)]),
        rule => t(&format!("validation.{}", rule.as_str())),
    }
}
