//! 文件操作错误定义

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DXF error: {0}")]
    Dxf(String),

    #[error("Board parse error: {0}")]
    Board(#[from] crate::sexp::ParseError),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Net not found: {0}")]
    NetNotFound(String),

    #[error("Failed to replace file: {0}")]
    Persist(#[from] tempfile::PersistError),
}
