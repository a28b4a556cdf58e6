mod case;
mod runner;
mod source;

pub use case::{Outcome, TestCase, TESTCASE_SCHEMA_V1};
pub use runner::{assert_case, assert_cases_in_dir, run_case, RunReport};
pub use source::discover_cases;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse testcase {path}: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid testcase schema version \"{found}\", expected \"{expected}\".")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("No .case.json files under {path}.")]
    CasesEmpty { path: PathBuf },
    #[error("Bridge error: {0}")]
    Bridge(#[from] ib_core::BridgeError),
    #[error("Script result is not valid JSON: {0}")]
    ResultJson(serde_json::Error),
    #[error("Failed to serialize outcome for diff: {0}")]
    OutcomeSerialize(serde_json::Error),
    #[error("Outcome mismatch in {path}. expected={expected} actual={actual}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}
