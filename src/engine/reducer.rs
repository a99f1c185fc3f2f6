// ==========================================
// CSV 导入核心 - 导入状态机
// ==========================================
// 状态: upload → mapping → preview → submit → {completed | failed}
// 回退: preview → mapping, submit/failed/completed → preview, 任意 → upload (RESET)
// ==========================================
// 红线:
// - reduce 为纯函数: (state, action) → 新 state，不修改入参
// - 任何改变行内容的动作都必须重跑 转换 + 校验
// ==========================================

use crate::domain::sheet::SheetDefinition;
use crate::domain::state::{
    CellChangedPayload, ImporterAction, ImporterState, RemoveRowsPayload, SheetRow, SheetState,
};
use crate::domain::types::ImporterMode;
use crate::engine::column_type::recalculate_row;
use crate::engine::transformer::apply_transformations;
use crate::engine::validator::apply_validations;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// 手工录入时默认生成的空行数
pub const NUMBER_OF_EMPTY_ROWS_FOR_MANUAL_DATA_INPUT: usize = 100;

/// 构建初始状态（upload 模式，每张表一个空的 SheetState）
pub fn build_initial_state(sheet_definitions: Arc<Vec<SheetDefinition>>) -> ImporterState {
    let current_sheet_id = sheet_definitions
        .first()
        .map(|s| s.id.clone())
        .unwrap_or_default();
    let sheet_data = sheet_definitions
        .iter()
        .map(|s| SheetState::empty(s.id.clone()))
        .collect();

    ImporterState {
        sheet_definitions,
        mode: ImporterMode::Upload,
        current_sheet_id,
        parsed_file: None,
        raw_file: None,
        column_mappings: None,
        sheet_data,
        validation_errors: Vec::new(),
        import_progress: 0,
        import_statistics: None,
    }
}

/// 状态机主函数
pub fn reduce(state: &ImporterState, action: ImporterAction) -> ImporterState {
    debug!(action = action.name(), mode = %state.mode, "reduce");

    match action {
        ImporterAction::Upload => with_mode(state, ImporterMode::Upload),

        ImporterAction::FileParsed { parsed, raw_file } => ImporterState {
            parsed_file: Some(parsed),
            raw_file: Some(raw_file),
            mode: ImporterMode::Mapping,
            ..state.clone()
        },

        ImporterAction::ColumnMappingChanged { mappings } => ImporterState {
            column_mappings: Some(mappings),
            ..state.clone()
        },

        ImporterAction::DataMapped { mapped_data } => {
            let mut next = with_rows(state, mapped_data);
            next.mode = ImporterMode::Preview;
            next
        }

        ImporterAction::EnterDataManually {
            amount_of_empty_rows_to_add,
        } => {
            let empty_data = state
                .sheet_definitions
                .iter()
                .map(|sheet| {
                    SheetState::new(
                        sheet.id.clone(),
                        vec![SheetRow::new(); amount_of_empty_rows_to_add],
                    )
                })
                .collect();
            let mut next = with_rows(state, empty_data);
            next.mode = ImporterMode::Preview;
            next
        }

        ImporterAction::CellChanged(payload) => cell_changed(state, payload),

        ImporterAction::RemoveRows(payload) => remove_rows(state, payload),

        ImporterAction::AddEmptyRow => {
            if state.sheet(&state.current_sheet_id).is_none() {
                warn!(sheet_id = %state.current_sheet_id, "ADD_EMPTY_ROW: 当前表不存在");
                return state.clone();
            }
            let data = state
                .sheet_data
                .iter()
                .map(|sheet| {
                    if sheet.sheet_id != state.current_sheet_id {
                        return sheet.clone();
                    }
                    let mut rows = sheet.rows.clone();
                    rows.push(SheetRow::new());
                    SheetState::new(sheet.sheet_id.clone(), rows)
                })
                .collect();
            with_rows(state, data)
        }

        ImporterAction::SheetChanged { sheet_id } => {
            if state.sheet_definition(&sheet_id).is_none() {
                warn!(sheet_id = %sheet_id, "SHEET_CHANGED: 目标表不存在");
                return state.clone();
            }
            ImporterState {
                current_sheet_id: sheet_id,
                ..state.clone()
            }
        }

        ImporterAction::Submit => with_mode(state, ImporterMode::Submit),

        ImporterAction::Progress { progress } => ImporterState {
            import_progress: progress.min(100),
            ..state.clone()
        },

        ImporterAction::Completed { import_statistics } => ImporterState {
            mode: ImporterMode::Completed,
            import_statistics,
            ..state.clone()
        },

        ImporterAction::Failed => with_mode(state, ImporterMode::Failed),
        ImporterAction::Preview => with_mode(state, ImporterMode::Preview),
        ImporterAction::Mapping => with_mode(state, ImporterMode::Mapping),

        ImporterAction::Reset => build_initial_state(Arc::clone(&state.sheet_definitions)),

        ImporterAction::SetState(next) => *next,
    }
}

fn with_mode(state: &ImporterState, mode: ImporterMode) -> ImporterState {
    ImporterState {
        mode,
        ..state.clone()
    }
}

/// 替换行数据并重跑 转换 + 校验
fn with_rows(state: &ImporterState, sheet_data: Vec<SheetState>) -> ImporterState {
    let sheet_data = apply_transformations(&state.sheet_definitions, &sheet_data);
    let validation_errors = apply_validations(&state.sheet_definitions, &sheet_data, None);

    ImporterState {
        sheet_data,
        validation_errors,
        ..state.clone()
    }
}

fn cell_changed(state: &ImporterState, payload: CellChangedPayload) -> ImporterState {
    let Some(definition) = state.sheet_definition(&payload.sheet_id) else {
        warn!(sheet_id = %payload.sheet_id, "CELL_CHANGED: 表定义不存在");
        return state.clone();
    };
    let Some(sheet) = state.sheet(&payload.sheet_id) else {
        warn!(sheet_id = %payload.sheet_id, "CELL_CHANGED: 表数据不存在");
        return state.clone();
    };
    // 行号等于行数时视为追加
    if payload.row_index > sheet.rows.len() {
        warn!(
            sheet_id = %payload.sheet_id,
            row_index = payload.row_index,
            row_count = sheet.rows.len(),
            "CELL_CHANGED: 行号越界"
        );
        return state.clone();
    }

    let row = recalculate_row(definition, &payload.value);

    let data = state
        .sheet_data
        .iter()
        .map(|s| {
            if s.sheet_id != payload.sheet_id {
                return s.clone();
            }
            let mut rows = s.rows.clone();
            if payload.row_index == rows.len() {
                rows.push(row.clone());
            } else {
                rows[payload.row_index] = row.clone();
            }
            SheetState::new(s.sheet_id.clone(), rows)
        })
        .collect();

    with_rows(state, data)
}

fn remove_rows(state: &ImporterState, payload: RemoveRowsPayload) -> ImporterState {
    if state.sheet(&payload.sheet_id).is_none() {
        warn!(sheet_id = %payload.sheet_id, "REMOVE_ROWS: 表数据不存在");
        return state.clone();
    }

    let removed: HashSet<usize> = payload.row_indices.into_iter().collect();
    let data = state
        .sheet_data
        .iter()
        .map(|s| {
            if s.sheet_id != payload.sheet_id {
                return s.clone();
            }
            let rows = s
                .rows
                .iter()
                .enumerate()
                .filter(|(idx, _)| !removed.contains(idx))
                .map(|(_, row)| row.clone())
                .collect();
            SheetState::new(s.sheet_id.clone(), rows)
        })
        .collect();

    with_rows(state, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::{ColumnDefinition, ValidatorRule};
    use crate::domain::state::{ColumnMapping, ImportStatistics, ParsedFile, RawFileInfo};
    use crate::domain::types::CellValue;

    fn people_definitions() -> Arc<Vec<SheetDefinition>> {
        Arc::new(vec![SheetDefinition::new("people", "People")
            .with_column(ColumnDefinition::text("name", "Name").with_validator(ValidatorRule::Required))
            .with_column(ColumnDefinition::calculated("upper", "Upper", |row| {
                row.get("name")
                    .and_then(CellValue::as_str)
                    .map(|s| CellValue::text(s.to_uppercase()))
                    .unwrap_or(CellValue::Empty)
            }))])
    }

    fn name_row(name: &str) -> SheetRow {
        let mut row = SheetRow::new();
        row.insert("name".to_string(), CellValue::text(name));
        row
    }

    fn preview_state(rows: usize) -> ImporterState {
        reduce(
            &build_initial_state(people_definitions()),
            ImporterAction::EnterDataManually {
                amount_of_empty_rows_to_add: rows,
            },
        )
    }

    #[test]
    fn test_initial_state() {
        let state = build_initial_state(people_definitions());
        assert_eq!(state.mode, ImporterMode::Upload);
        assert_eq!(state.current_sheet_id, "people");
        assert_eq!(state.sheet_data, vec![SheetState::empty("people")]);
        assert_eq!(state.import_progress, 0);
    }

    #[test]
    fn test_cell_changed_recomputes_calculated_column() {
        let state = preview_state(1);
        let next = reduce(
            &state,
            ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: "people".to_string(),
                row_index: 0,
                value: name_row("ana"),
            }),
        );

        assert_eq!(next.sheet_data[0].rows[0]["upper"], CellValue::text("ANA"));
        assert!(next.validation_errors.is_empty());
        // 入参不被修改
        assert_eq!(state.validation_errors.len(), 1);
    }

    #[test]
    fn test_cell_changed_to_blank_reports_required() {
        let next = reduce(
            &preview_state(1),
            ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: "people".to_string(),
                row_index: 0,
                value: name_row(""),
            }),
        );

        assert_eq!(next.validation_errors.len(), 1);
        assert_eq!(next.validation_errors[0].column_id, "name");
        assert_eq!(next.validation_errors[0].row_index, 0);
    }

    #[test]
    fn test_cell_changed_unknown_sheet_or_row_is_noop() {
        let state = preview_state(1);
        let unknown_sheet = reduce(
            &state,
            ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: "nope".to_string(),
                row_index: 0,
                value: name_row("x"),
            }),
        );
        let out_of_range = reduce(
            &state,
            ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: "people".to_string(),
                row_index: 5,
                value: name_row("x"),
            }),
        );
        assert_eq!(unknown_sheet, state);
        assert_eq!(out_of_range, state);
    }

    #[test]
    fn test_remove_rows_revalidates() {
        let mut state = preview_state(3);
        state = reduce(
            &state,
            ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: "people".to_string(),
                row_index: 1,
                value: name_row("bo"),
            }),
        );
        assert_eq!(state.validation_errors.len(), 2);

        let next = reduce(
            &state,
            ImporterAction::RemoveRows(RemoveRowsPayload {
                sheet_id: "people".to_string(),
                row_indices: vec![0, 2],
            }),
        );
        assert_eq!(next.sheet_data[0].rows.len(), 1);
        assert_eq!(next.sheet_data[0].rows[0]["name"], CellValue::text("bo"));
        assert!(next.validation_errors.is_empty());
    }

    #[test]
    fn test_add_empty_row_revalidates() {
        let state = reduce(
            &preview_state(1),
            ImporterAction::CellChanged(CellChangedPayload {
                sheet_id: "people".to_string(),
                row_index: 0,
                value: name_row("ana"),
            }),
        );
        let next = reduce(&state, ImporterAction::AddEmptyRow);

        assert_eq!(next.sheet_data[0].rows.len(), 2);
        assert_eq!(next.validation_errors.len(), 1);
        assert_eq!(next.validation_errors[0].row_index, 1);
    }

    #[test]
    fn test_file_parsed_and_mappings() {
        let state = build_initial_state(people_definitions());
        let parsed = ParsedFile {
            headers: vec!["Name".to_string()],
            rows: Vec::new(),
        };
        let next = reduce(
            &state,
            ImporterAction::FileParsed {
                parsed: parsed.clone(),
                raw_file: RawFileInfo {
                    name: "a.csv".to_string(),
                    mime_type: None,
                    size_in_bytes: 5,
                },
            },
        );
        assert_eq!(next.mode, ImporterMode::Mapping);
        assert_eq!(next.parsed_file, Some(parsed));

        let mappings = vec![ColumnMapping::mapped("Name", "people", "name")];
        let next = reduce(
            &next,
            ImporterAction::ColumnMappingChanged {
                mappings: mappings.clone(),
            },
        );
        assert_eq!(next.column_mappings, Some(mappings));
        assert_eq!(next.mode, ImporterMode::Mapping);
    }

    #[test]
    fn test_mode_transitions() {
        let preview = preview_state(2);
        assert_eq!(reduce(&preview, ImporterAction::Submit).mode, ImporterMode::Submit);
        assert_eq!(reduce(&preview, ImporterAction::Mapping).mode, ImporterMode::Mapping);
        assert_eq!(reduce(&preview, ImporterAction::Upload).mode, ImporterMode::Upload);

        let completed = reduce(
            &reduce(&preview, ImporterAction::Submit),
            ImporterAction::Completed {
                import_statistics: Some(ImportStatistics::default()),
            },
        );
        assert_eq!(completed.mode, ImporterMode::Completed);
        assert_eq!(reduce(&completed, ImporterAction::Preview).mode, ImporterMode::Preview);

        let reset = reduce(&completed, ImporterAction::Reset);
        assert_eq!(reset.mode, ImporterMode::Upload);
        assert!(reset.sheet_data.iter().all(|s| s.rows.is_empty()));
        assert_eq!(reset.import_statistics, None);

        let failed = reduce(&preview, ImporterAction::Failed);
        assert_eq!(failed.mode, ImporterMode::Failed);
        assert_eq!(failed.sheet_data, preview.sheet_data);
    }

    #[test]
    fn test_progress_is_clamped() {
        let state = build_initial_state(people_definitions());
        assert_eq!(reduce(&state, ImporterAction::Progress { progress: 150 }).import_progress, 100);
    }

    #[test]
    fn test_sheet_changed_requires_known_sheet() {
        let state = build_initial_state(people_definitions());
        let next = reduce(
            &state,
            ImporterAction::SheetChanged {
                sheet_id: "missing".to_string(),
            },
        );
        assert_eq!(next.current_sheet_id, "people");
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let state = preview_state(2);
        let action = ImporterAction::CellChanged(CellChangedPayload {
            sheet_id: "people".to_string(),
            row_index: 1,
            value: name_row("x"),
        });
        assert_eq!(reduce(&state, action.clone()), reduce(&state, action));
    }

    #[test]
    fn test_set_state_replaces_wholesale() {
        let other = preview_state(4);
        let next = reduce(
            &build_initial_state(people_definitions()),
            ImporterAction::SetState(Box::new(other.clone())),
        );
        assert_eq!(next, other);
    }
}
