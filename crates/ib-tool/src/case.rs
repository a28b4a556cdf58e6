use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ToolError;

pub const TESTCASE_SCHEMA_V1: &str = "isobridge-case.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Scripts run in the same context before `source`; their results are
    /// discarded.
    #[serde(default)]
    pub prelude: Vec<String>,
    pub source: String,
    /// Treat the result as a promise and report its settled value.
    #[serde(default)]
    pub await_promise: bool,
    pub expected: Outcome,
}

impl TestCase {
    pub fn load(path: &Path) -> Result<Self, ToolError> {
        let raw = fs::read_to_string(path).map_err(|source| ToolError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &raw)
    }

    /// Parses `raw`; `path` only labels errors.
    pub fn from_json(path: &Path, raw: &str) -> Result<Self, ToolError> {
        let case: Self = serde_json::from_str(raw).map_err(|source| ToolError::ParseCase {
            path: path.to_path_buf(),
            source,
        })?;
        if case.schema_version != TESTCASE_SCHEMA_V1 {
            return Err(ToolError::InvalidSchemaVersion {
                expected: TESTCASE_SCHEMA_V1.to_string(),
                found: case.schema_version,
            });
        }
        Ok(case)
    }
}

fn default_origin() -> String {
    "case.js".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    Value {
        json: serde_json::Value,
    },
    Undefined,
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    Rejected {
        reason: String,
    },
    Pending,
}

impl Outcome {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Value { .. } => "value",
            Self::Undefined => "undefined",
            Self::Error { .. } => "error",
            Self::Rejected { .. } => "rejected",
            Self::Pending => "pending",
        }
    }

    /// Whether `actual` meets this expectation. An expected error without a
    /// location accepts any location.
    pub fn accepts(&self, actual: &Outcome) -> bool {
        match (self, actual) {
            (
                Self::Error {
                    message: expected_message,
                    location: None,
                },
                Self::Error { message, .. },
            ) => expected_message == message,
            _ => self == actual,
        }
    }
}
