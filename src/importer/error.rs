// ==========================================
// CSV 导入核心 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 校验错误不是异常（作为数据挂在状态上），不在此列
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件过大: {size} 字节（上限 {limit} 字节）")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("文件格式不支持: {0}（支持 .csv/.tsv，或由自定义加载器转换）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件解析失败: {0}")]
    ParseError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    // ===== 流程相关错误 =====
    #[error("尚未上传文件，无法确认映射")]
    MissingParsedFile,

    #[error("异步结果已过期（已有更新的上传或重置），结果被丢弃")]
    StaleResult,

    #[error("存在校验错误，禁止提交")]
    SubmissionBlocked,

    #[error("操作未开放: {0}")]
    ActionNotAvailable(String),

    #[error("未开启手工录入")]
    ManualEntryDisabled,

    // ===== 宿主钩子错误 =====
    #[error("映射后处理钩子失败: {0}")]
    MappingHook(String),

    #[error("自定义映射建议失败: {0}")]
    CustomMapper(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::ParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
