// ==========================================
// CSV 导入核心 - 导入层
// ==========================================
// 职责: 文件加载与解析、映射解析、状态派发、会话编排、导出
// 支持: CSV, TSV, Excel（经加载器转换）
// ==========================================

pub mod dispatcher;
pub mod error;
pub mod export;
pub mod file_loader;
pub mod file_parser;
pub mod mapping_resolver;
pub mod session;

// 重导出核心类型
pub use dispatcher::{GenerationTicket, ProgressReporter, StateDispatcher};
pub use error::{ImportError, ImportResult};
pub use export::export_sheet_csv;
pub use file_loader::{prepare_file, ExcelFileLoader, FileLoader};
pub use file_parser::{CsvFileParser, FileParser};
pub use mapping_resolver::{get_mapped_data, normalize_header, suggest_mappings};
pub use session::ImporterSession;
