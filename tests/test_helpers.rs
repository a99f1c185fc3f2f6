// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的表定义、导入定义、上传文件与临时存储
// ==========================================
#![allow(dead_code)]

use csv_import_core::config::{CompletionFn, ImporterDefinition, SubmitPacing};
use csv_import_core::domain::{
    CellValue, ColumnDefinition, ImportStatistic, ImportStatistics, SheetDefinition, SheetRow,
    UploadedFile, ValidatorRule,
};
use csv_import_core::repository::SqliteStateStore;
use std::sync::Arc;
use tempfile::TempDir;

/// 单表: name(必填) + upper(计算列 = name 大写)
pub fn people_sheet() -> SheetDefinition {
    SheetDefinition::new("people", "People")
        .with_column(ColumnDefinition::text("name", "Name").with_validator(ValidatorRule::Required))
        .with_column(ColumnDefinition::calculated("upper", "Upper", |row| {
            row.get("name")
                .and_then(CellValue::as_str)
                .map(|s| CellValue::text(s.to_uppercase()))
                .unwrap_or(CellValue::Empty)
        }))
}

/// 单表: name + email
pub fn contacts_sheet() -> SheetDefinition {
    SheetDefinition::new("contacts", "Contacts")
        .with_column(ColumnDefinition::text("name", "Name").with_validator(ValidatorRule::Required))
        .with_column(ColumnDefinition::text("email", "Email").with_validator(ValidatorRule::Email))
}

/// 成功的完成处理器（返回导入行数统计），无提交等待
pub fn definition(sheets: Vec<SheetDefinition>) -> ImporterDefinition {
    ImporterDefinition::new(
        sheets,
        CompletionFn::new(|state, _progress| async move {
            let rows: usize = state.sheet_data.iter().map(|s| s.rows.len()).sum();
            Ok(Some(ImportStatistics {
                statistics: vec![ImportStatistic {
                    label: "Imported rows".to_string(),
                    value: CellValue::Number(rows as f64),
                }],
            }))
        }),
    )
    .with_submit_pacing(SubmitPacing::IMMEDIATE)
}

/// 总是失败的完成处理器
pub fn failing_definition(sheets: Vec<SheetDefinition>) -> ImporterDefinition {
    ImporterDefinition::new(
        sheets,
        CompletionFn::new(|_state, _progress| async move {
            Err(anyhow::anyhow!("backend unavailable"))
        }),
    )
    .with_submit_pacing(SubmitPacing::IMMEDIATE)
}

pub fn contacts_csv() -> UploadedFile {
    UploadedFile::new(
        "contacts.csv",
        "Name,Email\nana,ana@example.com\nbo,not-an-email\n"
            .as_bytes()
            .to_vec(),
    )
    .with_mime_type("text/csv")
}

pub fn row(pairs: &[(&str, &str)]) -> SheetRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), CellValue::text(*v)))
        .collect()
}

/// 临时 SQLite 存储（TempDir 需要保持存活）
pub fn temp_sqlite_store() -> (TempDir, String, Arc<SqliteStateStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir
        .path()
        .join("importer_state.db")
        .to_str()
        .expect("utf-8 path")
        .to_string();
    let store = Arc::new(SqliteStateStore::open(&path).expect("open sqlite store"));
    (dir, path, store)
}
