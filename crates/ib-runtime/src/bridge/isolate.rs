use ib_core::{
    config::DEFAULT_STACK_TRACE_FRAME_LIMIT, BridgeError, EngineConfig, HeapLimits,
    HeapStatistics, IsolateId,
};
use tracing::{debug, warn};

use super::scope::EngineScope;
use super::state::{BridgeState, SharedState};
use super::{next_context_id, next_isolate_id};
use crate::platform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateOptions {
    pub heap_limits: Option<HeapLimits>,
    pub capture_stack_traces: bool,
    pub stack_trace_frame_limit: i32,
}

impl Default for IsolateOptions {
    fn default() -> Self {
        Self {
            heap_limits: None,
            capture_stack_traces: true,
            stack_trace_frame_limit: DEFAULT_STACK_TRACE_FRAME_LIMIT,
        }
    }
}

impl From<&EngineConfig> for IsolateOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            heap_limits: config.heap_limits,
            capture_stack_traces: config.capture_stack_traces,
            stack_trace_frame_limit: config.stack_trace_frame_limit,
        }
    }
}

/// Requests termination of whatever script is running in an isolate. Usable
/// from any thread.
#[derive(Clone)]
pub struct TerminationHandle {
    isolate: IsolateId,
    handle: v8::IsolateHandle,
}

impl TerminationHandle {
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Returns `false` when the isolate has already been disposed.
    pub fn terminate(&self) -> bool {
        warn!(isolate = %self.isolate, "termination requested");
        self.handle.terminate_execution()
    }
}

/// One engine instance with its own heap.
///
/// The isolate is bound to the thread that created it. Isolates created on
/// the same thread must be dropped in reverse creation order.
pub struct Isolate {
    id: IsolateId,
    state: SharedState,
    isolate: v8::OwnedIsolate,
}

impl Isolate {
    pub fn new(options: IsolateOptions) -> Result<Self, BridgeError> {
        platform::ensure_initialized()?;

        let mut params = v8::CreateParams::default();
        if let Some(limits) = options.heap_limits {
            params = params.heap_limits(limits.initial_bytes, limits.max_bytes);
        }
        let mut isolate = v8::Isolate::new(params);
        isolate.set_capture_stack_trace_for_uncaught_exceptions(
            options.capture_stack_traces,
            options.stack_trace_frame_limit,
        );
        isolate.set_microtasks_policy(v8::MicrotasksPolicy::Explicit);

        let id = next_isolate_id();
        let implicit = next_context_id();
        let state = BridgeState::new(id, implicit).shared();
        isolate.set_slot(state.clone());

        let mut created = Self { id, state, isolate };
        created.enter().install_context(implicit, None)?;
        debug!(isolate = %id, implicit_context = %implicit, "isolate created");
        Ok(created)
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        Self::new(IsolateOptions::from(config))
    }

    pub fn id(&self) -> IsolateId {
        self.id
    }

    pub fn enter(&mut self) -> EngineScope<'_> {
        EngineScope::new(v8::HandleScope::new(&mut self.isolate), self.state.clone())
    }

    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            isolate: self.id,
            handle: self.isolate.thread_safe_handle(),
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.isolate.is_execution_terminating()
    }

    pub fn perform_microtask_checkpoint(&mut self) {
        self.isolate.perform_microtask_checkpoint();
    }

    pub fn heap_statistics(&mut self) -> HeapStatistics {
        self.enter().heap_statistics()
    }

    pub fn version(&self) -> &'static str {
        platform::version()
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        let released = self.state.borrow_mut().dispose();
        debug!(isolate = %self.id, released, "isolate disposed");
    }
}

#[cfg(test)]
mod isolate_tests {
    use std::thread;
    use std::time::Duration;

    use crate::bridge::runtime_test_support::*;
    use ib_core::{BridgeError, EngineConfig};

    use super::{Isolate, IsolateOptions};

    #[test]
    fn isolates_get_distinct_ids() {
        let first = new_isolate();
        let second = new_isolate();
        assert_ne!(first.id(), second.id());
        assert!(!first.version().is_empty());
    }

    #[test]
    fn options_follow_config() {
        let config = EngineConfig::from_json_str(r#"{"captureStackTraces": false, "stackTraceFrameLimit": 3}"#)
            .expect("config should parse");
        let options = IsolateOptions::from(&config);
        assert!(!options.capture_stack_traces);
        assert_eq!(options.stack_trace_frame_limit, 3);
        assert!(options.heap_limits.is_none());
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        init_engine();
        let config = EngineConfig {
            stack_trace_frame_limit: -1,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Isolate::from_config(&config),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn handle_from_other_isolate_is_rejected() {
        let mut first = new_isolate();
        let foreign = first.enter().new_integer(1).expect("integer should build");
        let mut second = new_isolate();
        let mut scope = second.enter();
        assert!(matches!(
            scope.to_i32(foreign),
            Err(BridgeError::WrongIsolate { .. })
        ));
        assert!(!scope.release(foreign));
    }

    #[test]
    fn termination_interrupts_infinite_loop() {
        let mut isolate = new_isolate();
        let handle = isolate.termination_handle();
        let mut scope = isolate.enter();
        let context = scope.create_context(None).expect("context should build");
        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            handle.terminate()
        });
        let error = scope
            .run_script(context, "for (;;) {}", "loop.js")
            .expect_err("loop should be terminated");
        assert!(killer.join().expect("terminator thread should finish"));
        let script_error = error.script_error().expect("failure should be a script error");
        assert!(script_error.is_terminated());

        let after = scope
            .run_script(context, "'alive'", "after.js")
            .expect("isolate should stay usable");
        assert_eq!(scope.to_string(after).expect("string should build"), "alive");
    }

    #[test]
    fn microtasks_wait_for_explicit_checkpoint() {
        let mut isolate = new_isolate();
        let context = isolate
            .enter()
            .create_context(None)
            .expect("context should build");
        isolate
            .enter()
            .run_script(context, "var done = false; Promise.resolve().then(() => { done = true; });", "micro.js")
            .expect("script should run");
        let before = isolate
            .enter()
            .run_script(context, "done", "check.js")
            .expect("script should run");
        assert!(!isolate.enter().to_bool(before).expect("conversion should pass"));
        isolate.perform_microtask_checkpoint();
        let after = isolate
            .enter()
            .run_script(context, "done", "check.js")
            .expect("script should run");
        assert!(isolate.enter().to_bool(after).expect("conversion should pass"));
    }
}
