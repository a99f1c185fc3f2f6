// ==========================================
// CSV 导入核心 - 引擎层
// ==========================================
// 职责: 列类型 / 转换 / 校验 / 状态机 / 状态构建
// 红线: 除 state_builder 外全部为纯函数，不做 I/O
// ==========================================

pub mod column_type;
pub mod reducer;
pub mod requirement_group;
pub mod state_builder;
pub mod transformer;
pub mod validator;

// 重导出核心引擎
pub use column_type::{
    check_type, coerce, compute, enum_label, get_enum_label_dict, recalculate_row,
    EnumLabelDict, TypeViolation,
};
pub use reducer::{build_initial_state, reduce, NUMBER_OF_EMPTY_ROWS_FOR_MANUAL_DATA_INPUT};
pub use requirement_group::{
    apply_schema_enhancements, attach_requirement_groups, ensure_required_validators,
    extract_any_of_groups, restrict_group_to_sheet, validate_any_of_groups,
    RequirementGroupsBySheet,
};
pub use state_builder::StateBuilder;
pub use transformer::{apply_transformations, transform_row};
pub use validator::apply_validations;
