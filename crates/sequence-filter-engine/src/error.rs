//! 过滤引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("必须提供规则序列或分组之一")]
    ProgramMissing,

    #[error("规则序列和分组不能同时提供")]
    ProgramConflict,

    #[error("规则程序校验失败: {0}")]
    InvalidProgram(String),

    #[error("程序未找到: {0}")]
    ProgramNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;
