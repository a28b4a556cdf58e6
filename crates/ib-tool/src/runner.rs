use std::path::Path;

use ib_api::Runtime;
use ib_core::{BridgeError, ContextId, EngineConfig, PromiseState};
use ib_runtime::{EngineScope, Handle};

use crate::source::discover_cases;
use crate::{Outcome, TestCase, ToolError};

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub prelude_scripts: usize,
}

enum Captured {
    Outcome(Outcome),
    Json(String),
}

pub fn run_case(case: &TestCase) -> Result<RunReport, ToolError> {
    let runtime = Runtime::new(&EngineConfig::default())?;
    let context = runtime.create_context(None)?;

    for (index, prelude) in case.prelude.iter().enumerate() {
        let origin = format!("prelude-{}.js", index);
        runtime.run_script(context, prelude, &origin)?.release();
    }

    let captured = runtime.with_scope(|scope| capture(scope, context, case))?;
    let outcome = match captured {
        Captured::Outcome(outcome) => outcome,
        Captured::Json(text) => Outcome::Value {
            json: serde_json::from_str(&text).map_err(ToolError::ResultJson)?,
        },
    };

    Ok(RunReport {
        outcome,
        prelude_scripts: case.prelude.len(),
    })
}

fn capture(scope: &mut EngineScope<'_>, context: ContextId, case: &TestCase) -> Result<Captured, BridgeError> {
    let value = match scope.run_script(context, &case.source, &case.origin) {
        Ok(value) => value,
        Err(BridgeError::Script(error)) => {
            return Ok(Captured::Outcome(Outcome::Error {
                message: error.message,
                location: error.location,
            }))
        }
        Err(error) => return Err(error),
    };

    let value = if case.await_promise {
        scope.perform_microtask_checkpoint();
        match scope.promise_state(value)? {
            PromiseState::Pending => return Ok(Captured::Outcome(Outcome::Pending)),
            PromiseState::Fulfilled => scope.promise_result(value)?,
            PromiseState::Rejected => {
                let reason = scope.promise_result(value)?;
                return Ok(Captured::Outcome(Outcome::Rejected {
                    reason: scope.to_string(reason)?,
                }));
            }
        }
    } else {
        value
    };

    describe(scope, context, value)
}

fn describe(scope: &mut EngineScope<'_>, context: ContextId, value: Handle) -> Result<Captured, BridgeError> {
    if scope.is_undefined(value)? {
        return Ok(Captured::Outcome(Outcome::Undefined));
    }
    scope.stringify_json(Some(context), value).map(Captured::Json)
}

pub fn assert_case(case_path: &Path) -> Result<RunReport, ToolError> {
    let case = TestCase::load(case_path)?;
    let report = run_case(&case)?;

    if !case.expected.accepts(&report.outcome) {
        let expected = serde_json::to_string(&case.expected).map_err(ToolError::OutcomeSerialize)?;
        let actual = serde_json::to_string(&report.outcome).map_err(ToolError::OutcomeSerialize)?;
        return Err(ToolError::Mismatch {
            path: case_path.to_path_buf(),
            expected,
            actual,
        });
    }

    Ok(report)
}

/// Asserts every case under `dir`, stopping at the first failure. Returns
/// how many cases passed.
pub fn assert_cases_in_dir(dir: &Path) -> Result<usize, ToolError> {
    let cases = discover_cases(dir)?;
    for case_path in &cases {
        assert_case(case_path)?;
    }
    Ok(cases.len())
}
