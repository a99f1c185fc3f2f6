// ==========================================
// CSV 导入核心 - 文件加载器
// ==========================================
// 职责: 把非 CSV 上传（Excel 等）转换为 CSV 后交给解析器
// 内置: ExcelFileLoader (.xlsx/.xls/.xlsm/.ods，取第一个工作表)
// ==========================================

use crate::domain::state::UploadedFile;
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Reader};
use std::io::Cursor;
use std::sync::Arc;

/// 解析器原生支持的 MIME 类型
pub const SUPPORTED_FILE_MIME_TYPES: &[&str] =
    &["text/csv", "text/tab-separated-values", "text/plain"];

/// 解析器原生支持的扩展名
pub const SUPPORTED_FILE_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// 自定义文件加载器
#[async_trait]
pub trait FileLoader: Send + Sync {
    /// 加载器名称（日志用）
    fn name(&self) -> &str;

    /// 是否能处理该文件
    fn can_load(&self, file: &UploadedFile) -> bool;

    /// 转换为 CSV 文件
    async fn convert(&self, file: UploadedFile) -> ImportResult<UploadedFile>;
}

/// 解析器能否直接处理
pub fn is_natively_supported(file: &UploadedFile) -> bool {
    let extension = file.extension();
    if SUPPORTED_FILE_EXTENSIONS.contains(&extension.as_str()) {
        return true;
    }
    match file.mime_type.as_deref() {
        Some(mime) => SUPPORTED_FILE_MIME_TYPES.contains(&mime),
        // 既无扩展名也无 MIME 时按 CSV 尝试
        None => extension.is_empty(),
    }
}

/// 按加载器列表准备文件: 第一个能处理的加载器负责转换；否则要求原生支持
pub async fn prepare_file(
    file: UploadedFile,
    loaders: &[Arc<dyn FileLoader>],
) -> ImportResult<UploadedFile> {
    if let Some(loader) = loaders.iter().find(|l| l.can_load(&file)) {
        tracing::debug!(loader = loader.name(), file = %file.name, "使用自定义加载器转换文件");
        return loader.convert(file).await;
    }

    if is_natively_supported(&file) {
        Ok(file)
    } else {
        Err(ImportError::UnsupportedFormat(file.name))
    }
}

// ==========================================
// Excel Loader 实现
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelFileLoader;

impl ExcelFileLoader {
    const EXTENSIONS: &'static [&'static str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];
    const MIME_TYPES: &'static [&'static str] = &[
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.ms-excel",
        "application/vnd.oasis.opendocument.spreadsheet",
    ];

    /// 第一个工作表 → CSV 字节
    pub fn workbook_to_csv(bytes: Vec<u8>) -> ImportResult<Vec<u8>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("工作簿中没有工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in range.rows() {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))
    }
}

#[async_trait]
impl FileLoader for ExcelFileLoader {
    fn name(&self) -> &str {
        "excel"
    }

    fn can_load(&self, file: &UploadedFile) -> bool {
        Self::EXTENSIONS.contains(&file.extension().as_str())
            || file
                .mime_type
                .as_deref()
                .map(|m| Self::MIME_TYPES.contains(&m))
                .unwrap_or(false)
    }

    async fn convert(&self, file: UploadedFile) -> ImportResult<UploadedFile> {
        let name = file.name.clone();
        // calamine 为同步解析，放到阻塞线程池
        let csv_bytes = tokio::task::spawn_blocking(move || Self::workbook_to_csv(file.bytes))
            .await
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))??;

        let stem = std::path::Path::new(&name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");

        Ok(UploadedFile::new(format!("{}.csv", stem), csv_bytes).with_mime_type("text/csv"))
    }
}
