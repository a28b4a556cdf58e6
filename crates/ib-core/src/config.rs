use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

static FLAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--?[A-Za-z0-9_-]+(=\S+)?$").expect("engine flag pattern should compile")
});

pub const DEFAULT_STACK_TRACE_FRAME_LIMIT: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapLimits {
    pub initial_bytes: usize,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default = "default_capture_stack_traces")]
    pub capture_stack_traces: bool,
    #[serde(default = "default_stack_trace_frame_limit")]
    pub stack_trace_frame_limit: i32,
    #[serde(default)]
    pub heap_limits: Option<HeapLimits>,
}

fn default_capture_stack_traces() -> bool {
    true
}

fn default_stack_trace_frame_limit() -> i32 {
    DEFAULT_STACK_TRACE_FRAME_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            capture_stack_traces: default_capture_stack_traces(),
            stack_trace_frame_limit: default_stack_trace_frame_limit(),
            heap_limits: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, BridgeError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|error| BridgeError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        for flag in &self.flags {
            validate_flag(flag)?;
        }
        if self.stack_trace_frame_limit < 0 {
            return Err(BridgeError::Config(format!(
                "stackTraceFrameLimit must not be negative, got {}.",
                self.stack_trace_frame_limit
            )));
        }
        if let Some(limits) = self.heap_limits {
            if limits.initial_bytes > limits.max_bytes {
                return Err(BridgeError::Config(format!(
                    "heapLimits.initialBytes {} exceeds maxBytes {}.",
                    limits.initial_bytes, limits.max_bytes
                )));
            }
        }
        Ok(())
    }

    /// Space-separated flag string in the form the engine's flag parser expects.
    pub fn flag_string(&self) -> String {
        self.flags.join(" ")
    }
}

pub fn validate_flag(flag: &str) -> Result<(), BridgeError> {
    if FLAG_PATTERN.is_match(flag) {
        Ok(())
    } else {
        Err(BridgeError::InvalidFlag(flag.to_string()))
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn from_json_str_applies_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("empty config should parse");
        assert_eq!(config, EngineConfig::default());
        assert!(config.capture_stack_traces);
        assert_eq!(config.stack_trace_frame_limit, DEFAULT_STACK_TRACE_FRAME_LIMIT);
    }

    #[test]
    fn from_json_str_reads_camel_case_fields() {
        let config = EngineConfig::from_json_str(
            r#"{
  "flags": ["--expose-gc", "--stack-size=2048"],
  "captureStackTraces": false,
  "stackTraceFrameLimit": 4,
  "heapLimits": {"initialBytes": 1048576, "maxBytes": 67108864}
}"#,
        )
        .expect("config should parse");
        assert_eq!(config.flag_string(), "--expose-gc --stack-size=2048");
        assert!(!config.capture_stack_traces);
        assert_eq!(config.stack_trace_frame_limit, 4);
        assert_eq!(
            config.heap_limits,
            Some(HeapLimits {
                initial_bytes: 1_048_576,
                max_bytes: 67_108_864
            })
        );
    }

    #[test]
    fn from_json_str_rejects_malformed_flag() {
        let error = EngineConfig::from_json_str(r#"{"flags": ["expose gc"]}"#)
            .expect_err("flag without dashes should fail");
        assert_eq!(error, BridgeError::InvalidFlag("expose gc".to_string()));
    }

    #[test]
    fn validate_rejects_inverted_heap_limits() {
        let config = EngineConfig {
            heap_limits: Some(HeapLimits {
                initial_bytes: 10,
                max_bytes: 1,
            }),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn from_json_str_reports_syntax_errors_as_config() {
        let error = EngineConfig::from_json_str("{flags").expect_err("bad json should fail");
        assert!(matches!(error, BridgeError::Config(_)));
    }
}
