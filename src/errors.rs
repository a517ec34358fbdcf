// errors.rs
use thiserror::Error;

/// Errors originating from the collaborators around the workflow
/// (config, output files, history database, spreadsheets).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Spreadsheet error: {0}")]
    XlsxError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::DbError(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        AppError::XlsxError(e.to_string())
    }
}
