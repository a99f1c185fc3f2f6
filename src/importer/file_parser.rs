// ==========================================
// CSV 导入核心 - 文件解析器
// ==========================================
// 支持: CSV (.csv) / TSV (.tsv, text/tab-separated-values)
// 其他格式由 FileLoader 先转换为 CSV
// ==========================================

use crate::domain::state::{ParsedFile, UploadedFile};
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use csv::ReaderBuilder;
use std::collections::HashMap;

/// 解析器协作方: 原始文件 → 表头 + 行
#[async_trait]
pub trait FileParser: Send + Sync {
    async fn parse(&self, file: &UploadedFile) -> ImportResult<ParsedFile>;
}

// ==========================================
// CSV Parser 实现
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvFileParser;

impl CsvFileParser {
    /// 识别分隔符: 扩展名/MIME 优先，其次看首行
    pub fn detect_delimiter(file: &UploadedFile) -> u8 {
        if file.extension() == "tsv"
            || file.mime_type.as_deref() == Some("text/tab-separated-values")
        {
            return b'\t';
        }

        let first_line = file
            .bytes
            .split(|b| *b == b'\n')
            .next()
            .unwrap_or_default();
        if first_line.contains(&b'\t') && !first_line.contains(&b',') {
            b'\t'
        } else {
            b','
        }
    }

    /// 同步解析（供测试与非异步调用方使用）
    pub fn parse_bytes(&self, bytes: &[u8], delimiter: u8) -> ImportResult<ParsedFile> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(delimiter)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::ParseError("文件缺少表头".to_string()));
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row_map = HashMap::new();

            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    if !header.is_empty() {
                        row_map.insert(header.clone(), value.to_string());
                    }
                }
            }

            // 跳过完全空白的行
            if row_map.values().all(|v| v.trim().is_empty()) {
                continue;
            }

            rows.push(row_map);
        }

        Ok(ParsedFile { headers, rows })
    }
}

#[async_trait]
impl FileParser for CsvFileParser {
    async fn parse(&self, file: &UploadedFile) -> ImportResult<ParsedFile> {
        let delimiter = Self::detect_delimiter(file);
        let parsed = self.parse_bytes(&file.bytes, delimiter)?;

        tracing::debug!(
            file = %file.name,
            headers = parsed.headers.len(),
            rows = parsed.rows.len(),
            "文件解析完成"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_csv() {
        let file = UploadedFile::new(
            "people.csv",
            "Name, Email\nana,ana@example.com\n\n,\nbo\n".as_bytes().to_vec(),
        );
        let parsed = CsvFileParser.parse(&file).await.unwrap();

        assert_eq!(parsed.headers, vec!["Name", "Email"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0]["Email"], "ana@example.com");
        // 缺失字段不写入
        assert_eq!(parsed.rows[1].get("Email"), None);
    }

    #[tokio::test]
    async fn test_parse_tsv_by_extension_and_bom() {
        let file = UploadedFile::new("data.tsv", b"\xEF\xBB\xBFa\tb\n1\t2\n".to_vec());
        let parsed = CsvFileParser.parse(&file).await.unwrap();

        assert_eq!(parsed.headers, vec!["a", "b"]);
        assert_eq!(parsed.rows[0]["b"], "2");
    }

    #[test]
    fn test_detect_delimiter_from_content() {
        let file = UploadedFile::new("upload", b"a\tb\n1\t2".to_vec());
        assert_eq!(CsvFileParser::detect_delimiter(&file), b'\t');

        let file = UploadedFile::new("upload.csv", b"a,b\n1,2".to_vec());
        assert_eq!(CsvFileParser::detect_delimiter(&file), b',');
    }

    #[tokio::test]
    async fn test_empty_file_is_parse_error() {
        let file = UploadedFile::new("empty.csv", Vec::new());
        let err = CsvFileParser.parse(&file).await.unwrap_err();
        assert!(matches!(err, ImportError::ParseError(_)));
    }
}
