//! The [`VarMergeError`] `enum` definition and error messages.
//!
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use thiserror::Error;

use crate::annotation::JobState;

/// The [`VarMergeError`] defines the standard set of errors that should
/// be passed to the user.
#[derive(Debug, Error)]
pub enum VarMergeError {
    // IO related errors
    #[error("File reading error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("The file at {} does not exist.", .0.display())]
    NotFound(PathBuf),

    // File parsing related errors
    #[error("Unsupported file format: {0}. Only .csv, .tsv, .txt, .xlsx, .xls, and .ods files are allowed.")]
    UnsupportedFileFormat(String),
    #[error("Integer parsing error: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("Float parsing error: {0}")]
    ParseFloatError(#[from] ParseFloatError),
    #[error("Parsing error: {0}")]
    ParseError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(#[from] calamine::Error),

    // Table preparation errors
    #[error("Table '{0}' is missing")]
    MissingTable(String),
    #[error("Column '{0}' is missing from the table")]
    MissingColumn(String),
    #[error("Failed to convert data types for table '{table}': column '{column}' is not declared")]
    DtypeError { table: String, column: String },

    // Annotation errors
    #[error("Annotation service error: {0}")]
    AnnotationServiceError(String),
    #[error("Annotation tool error: {0}")]
    AnnotationToolError(String),
    #[error("Invalid annotation job transition: {from:?} -> {to:?}")]
    InvalidJobTransition { from: JobState, to: JobState },
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    // Command line tool related errors
    #[error("Command line argument error: {0}")]
    ArgumentError(#[from] clap::error::Error),
}
