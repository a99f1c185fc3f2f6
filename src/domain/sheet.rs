// ==========================================
// CSV 导入核心 - 表结构定义
// ==========================================
// 职责: SheetDefinition / ColumnDefinition / 列类型 / 校验规则 / 转换规则
// 说明: 会话期间只读，由宿主在启动时提供
// ==========================================

use crate::domain::state::SheetRow;
use crate::domain::types::CellValue;
use std::fmt;
use std::sync::Arc;

// ==========================================
// SharedFn - 可共享的宿主函数
// ==========================================
/// 宿主提供的纯函数（计算列、自定义校验、自定义转换）
///
/// 比较时按指针判等: 同一个函数实例才视为相等
pub struct SharedFn<F: ?Sized>(Arc<F>);

pub type ComputeFn = SharedFn<dyn Fn(&SheetRow) -> CellValue + Send + Sync>;
pub type PredicateFn = SharedFn<dyn Fn(&CellValue, &SheetRow) -> bool + Send + Sync>;
pub type TransformFn = SharedFn<dyn Fn(&CellValue) -> CellValue + Send + Sync>;

impl SharedFn<dyn Fn(&SheetRow) -> CellValue + Send + Sync> {
    pub fn new(f: impl Fn(&SheetRow) -> CellValue + Send + Sync + 'static) -> Self {
        SharedFn(Arc::new(f))
    }

    pub fn call(&self, row: &SheetRow) -> CellValue {
        (self.0)(row)
    }
}

impl SharedFn<dyn Fn(&CellValue, &SheetRow) -> bool + Send + Sync> {
    pub fn new(f: impl Fn(&CellValue, &SheetRow) -> bool + Send + Sync + 'static) -> Self {
        SharedFn(Arc::new(f))
    }

    pub fn call(&self, value: &CellValue, row: &SheetRow) -> bool {
        (self.0)(value, row)
    }
}

impl SharedFn<dyn Fn(&CellValue) -> CellValue + Send + Sync> {
    pub fn new(f: impl Fn(&CellValue) -> CellValue + Send + Sync + 'static) -> Self {
        SharedFn(Arc::new(f))
    }

    pub fn call(&self, value: &CellValue) -> CellValue {
        (self.0)(value)
    }
}

impl<F: ?Sized> Clone for SharedFn<F> {
    fn clone(&self) -> Self {
        SharedFn(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> PartialEq for SharedFn<F> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<F: ?Sized> fmt::Debug for SharedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedFn(..)")
    }
}

// ==========================================
// 列类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumberArguments {
    /// 保留小数位数（None 表示不取整）
    pub precision: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub label: String,
    pub value: CellValue,
}

impl EnumValue {
    pub fn new(label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumArguments {
    pub values: Vec<EnumValue>,
}

/// 引用列: 取值必须存在于另一张表的某一列中
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceArguments {
    pub sheet_id: String,
    pub sheet_column_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedArguments {
    pub compute: ComputeFn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Text,
    Number(NumberArguments),
    Enum(EnumArguments),
    Reference(ReferenceArguments),
    Calculated(CalculatedArguments),
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number(_) => "number",
            ColumnType::Enum(_) => "enum",
            ColumnType::Reference(_) => "reference",
            ColumnType::Calculated(_) => "calculated",
        }
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, ColumnType::Calculated(_))
    }
}

// ==========================================
// 校验规则
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatorRule {
    Required,
    /// 同一张表内该列取值不可重复（空值不参与）
    Unique,
    RegexMatches { pattern: String },
    Includes { values: Vec<CellValue> },
    /// 分隔符拆分后每一项都必须在 values 中
    MultiIncludes { values: Vec<String>, delimiter: String },
    IsInteger,
    Email,
    PhoneNumber,
    PostalCode,
    Custom { name: String, predicate: PredicateFn },
}

impl ValidatorRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorRule::Required => "required",
            ValidatorRule::Unique => "unique",
            ValidatorRule::RegexMatches { .. } => "regex_matches",
            ValidatorRule::Includes { .. } => "includes",
            ValidatorRule::MultiIncludes { .. } => "multi_includes",
            ValidatorRule::IsInteger => "is_integer",
            ValidatorRule::Email => "email",
            ValidatorRule::PhoneNumber => "phone_number",
            ValidatorRule::PostalCode => "postal_code",
            ValidatorRule::Custom { .. } => "custom",
        }
    }

    /// 构造正则校验，提前检查表达式合法性
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern)?;
        Ok(ValidatorRule::RegexMatches {
            pattern: pattern.to_string(),
        })
    }

    pub fn custom(
        name: impl Into<String>,
        predicate: impl Fn(&CellValue, &SheetRow) -> bool + Send + Sync + 'static,
    ) -> Self {
        ValidatorRule::Custom {
            name: name.into(),
            predicate: PredicateFn::new(predicate),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorDefinition {
    pub rule: ValidatorRule,
    /// 自定义错误消息（覆盖翻译默认值）
    pub error: Option<String>,
}

impl From<ValidatorRule> for ValidatorDefinition {
    fn from(rule: ValidatorRule) -> Self {
        Self { rule, error: None }
    }
}

// ==========================================
// 转换规则
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum TransformerRule {
    Trim,
    Uppercase,
    Lowercase,
    PhoneNumber,
    PostalCode,
    StringToBoolean,
    Custom { name: String, transform: TransformFn },
}

impl TransformerRule {
    pub fn custom(
        name: impl Into<String>,
        transform: impl Fn(&CellValue) -> CellValue + Send + Sync + 'static,
    ) -> Self {
        TransformerRule::Custom {
            name: name.into(),
            transform: TransformFn::new(transform),
        }
    }
}

// ==========================================
// ColumnDefinition
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub id: String,
    pub label: String,
    pub column_type: ColumnType,
    pub validators: Vec<ValidatorDefinition>,
    pub transformers: Vec<TransformerRule>,
}

impl ColumnDefinition {
    pub fn new(id: impl Into<String>, label: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            column_type,
            validators: Vec::new(),
            transformers: Vec::new(),
        }
    }

    pub fn text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, ColumnType::Text)
    }

    pub fn number(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, ColumnType::Number(NumberArguments::default()))
    }

    pub fn enumeration(
        id: impl Into<String>,
        label: impl Into<String>,
        values: Vec<EnumValue>,
    ) -> Self {
        Self::new(id, label, ColumnType::Enum(EnumArguments { values }))
    }

    pub fn reference(
        id: impl Into<String>,
        label: impl Into<String>,
        sheet_id: impl Into<String>,
        sheet_column_id: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            label,
            ColumnType::Reference(ReferenceArguments {
                sheet_id: sheet_id.into(),
                sheet_column_id: sheet_column_id.into(),
            }),
        )
    }

    pub fn calculated(
        id: impl Into<String>,
        label: impl Into<String>,
        compute: impl Fn(&SheetRow) -> CellValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            id,
            label,
            ColumnType::Calculated(CalculatedArguments {
                compute: ComputeFn::new(compute),
            }),
        )
    }

    pub fn with_validator(mut self, validator: impl Into<ValidatorDefinition>) -> Self {
        self.validators.push(validator.into());
        self
    }

    pub fn with_validator_message(mut self, rule: ValidatorRule, error: impl Into<String>) -> Self {
        self.validators.push(ValidatorDefinition {
            rule,
            error: Some(error.into()),
        });
        self
    }

    pub fn with_transformer(mut self, transformer: TransformerRule) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn has_validator(&self, name: &str) -> bool {
        self.validators.iter().any(|v| v.rule.as_str() == name)
    }
}

// ==========================================
// RequirementGroup - anyOf 分组
// ==========================================
/// 跨列必填分组: 每行至少有一个 required set 全部非空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementGroup {
    pub group_id: String,
    pub required_sets: Vec<Vec<String>>,
}

// ==========================================
// SheetDefinition
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SheetDefinition {
    pub id: String,
    pub label: String,
    pub columns: Vec<ColumnDefinition>,
    pub requirement_groups: Vec<RequirementGroup>,
}

impl SheetDefinition {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            columns: Vec::new(),
            requirement_groups: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_requirement_group(mut self, group: RequirementGroup) -> Self {
        self.requirement_groups.push(group);
        self
    }

    pub fn column(&self, column_id: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn calculated_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.column_type.is_calculated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_fn_equality_is_by_instance() {
        let a = ComputeFn::new(|_| CellValue::Empty);
        let b = a.clone();
        let c = ComputeFn::new(|_| CellValue::Empty);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_regex_rule_rejects_invalid_pattern() {
        assert!(ValidatorRule::regex("^[a-z]+$").is_ok());
        assert!(ValidatorRule::regex("(unclosed").is_err());
    }

    #[test]
    fn test_column_builder() {
        let column = ColumnDefinition::text("name", "Name")
            .with_validator(ValidatorRule::Required)
            .with_transformer(TransformerRule::Trim);

        assert!(column.has_validator("required"));
        assert!(!column.has_validator("unique"));
        assert_eq!(column.transformers, vec![TransformerRule::Trim]);
    }
}
