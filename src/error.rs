use thiserror::Error;

#[derive(Error, Debug)]
pub enum BooktallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Unsupported file type: {0}. Please upload .csv or .xlsx.")]
    UnsupportedFileType(String),

    #[error("Missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid date format for '{raw}'. Expected YYYY-MM-DD.")]
    InvalidDateFormat { raw: String },

    #[error("Invalid amount '{raw}'. Expected a number such as 1,234.50.")]
    InvalidAmount { raw: String },

    #[error("Category name is empty")]
    EmptyCategory,

    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<BooktallyError>,
    },

    #[error("Import failed: {0}")]
    ImportFailed(#[source] Box<BooktallyError>),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl BooktallyError {
    /// Attach a 1-based data row number to an error raised while normalizing a row.
    pub fn at_row(self, row: usize) -> Self {
        BooktallyError::Row {
            row,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BooktallyError>;
