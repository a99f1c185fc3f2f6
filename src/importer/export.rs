// ==========================================
// CSV 导入核心 - CSV 导出
// ==========================================
// 表头为列标签，按列声明顺序输出
// Value 模式写原始值；Label 模式下枚举列写标签
// ==========================================

use crate::domain::sheet::SheetDefinition;
use crate::domain::state::SheetState;
use crate::domain::types::{CellValue, CsvDownloadMode};
use crate::engine::column_type::enum_label;
use crate::importer::error::{ImportError, ImportResult};

pub fn export_sheet_csv(
    definition: &SheetDefinition,
    sheet: &SheetState,
    mode: CsvDownloadMode,
) -> ImportResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(definition.columns.iter().map(|c| c.label.as_str()))?;

    for row in &sheet.rows {
        let record = definition.columns.iter().map(|column| {
            let value = row.get(&column.id).unwrap_or(&CellValue::Empty);
            match mode {
                CsvDownloadMode::Label => enum_label(column, value)
                    .unwrap_or_else(|| value.to_display_string()),
                CsvDownloadMode::Value => value.to_display_string(),
            }
        });
        writer.write_record(record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ImportError::Other(anyhow::anyhow!("CSV 写出失败: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ImportError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::{ColumnDefinition, EnumValue};
    use crate::domain::state::SheetRow;

    fn sheet_definition() -> SheetDefinition {
        SheetDefinition::new("people", "People")
            .with_column(ColumnDefinition::text("name", "Name"))
            .with_column(ColumnDefinition::enumeration(
                "status",
                "Status",
                vec![EnumValue::new("Active", "A"), EnumValue::new("Inactive", "I")],
            ))
            .with_column(ColumnDefinition::number("age", "Age"))
    }

    fn data() -> SheetState {
        let mut row = SheetRow::new();
        row.insert("name".to_string(), CellValue::text("Ana, Jr."));
        row.insert("status".to_string(), CellValue::text("I"));
        row.insert("age".to_string(), CellValue::Number(31.0));
        SheetState::new("people", vec![row, SheetRow::new()])
    }

    #[test]
    fn test_export_values() {
        let csv = export_sheet_csv(&sheet_definition(), &data(), CsvDownloadMode::Value).unwrap();
        assert_eq!(csv, "Name,Status,Age\n\"Ana, Jr.\",I,31\n,,\n");
    }

    #[test]
    fn test_export_labels() {
        let csv = export_sheet_csv(&sheet_definition(), &data(), CsvDownloadMode::Label).unwrap();
        assert_eq!(csv, "Name,Status,Age\n\"Ana, Jr.\",Inactive,31\n,,\n");
    }
}
