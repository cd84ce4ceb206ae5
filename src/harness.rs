use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SignalError;

/// Final verdict of one test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    Timeout,
    NotRun,
}

impl TestStatus {
    pub fn is_pass(self) -> bool {
        matches!(self, TestStatus::Pass)
    }
}

/// Where a test currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestPhase {
    Initial,
    Started,
    HasResult,
    Complete,
}

/// Pass/fail report exchanged in `done` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneReport {
    pub status: TestStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl DoneReport {
    pub fn new(status: TestStatus, message: Option<String>) -> Self {
        Self { status, message }
    }

    pub fn pass() -> Self {
        Self::new(TestStatus::Pass, None)
    }

    pub fn to_value(&self) -> Result<Value, SignalError> {
        serde_json::to_value(self).map_err(|err| SignalError::Setup(err.to_string()))
    }

    pub fn from_value(value: &Value) -> Result<Self, SignalError> {
        serde_json::from_value(value.clone())
            .map_err(|err| SignalError::Protocol(format!("malformed done report: {err}")))
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

struct ContextState {
    phase: TestPhase,
    status: Option<TestStatus>,
    message: Option<String>,
    cleanups: Vec<Cleanup>,
}

/// Per-test lifecycle state: phase, recorded result, and cleanup callbacks.
///
/// A test that has not produced a result yet reads as an optimistic pass;
/// reconciliation with the peer may downgrade it afterwards. Cleanups run at
/// teardown regardless of the outcome.
pub struct TestContext {
    state: Mutex<ContextState>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContextState {
                phase: TestPhase::Initial,
                status: None,
                message: None,
                cleanups: Vec::new(),
            }),
        }
    }

    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.phase == TestPhase::Initial {
            state.phase = TestPhase::Started;
        }
    }

    pub fn phase(&self) -> TestPhase {
        self.state.lock().phase
    }

    /// Record the test's own result. The first recorded result wins.
    pub fn record(&self, status: TestStatus, message: Option<String>) {
        let mut state = self.state.lock();
        if state.status.is_some() {
            return;
        }
        state.status = Some(status);
        state.message = message;
        if state.phase < TestPhase::HasResult {
            state.phase = TestPhase::HasResult;
        }
    }

    /// Override a local pass with a failure reported by the peer.
    pub fn downgrade(&self, message: String) {
        let mut state = self.state.lock();
        if state.status.is_none() || state.status == Some(TestStatus::Pass) {
            state.status = Some(TestStatus::Fail);
            state.message = Some(message);
            if state.phase < TestPhase::HasResult {
                state.phase = TestPhase::HasResult;
            }
        }
    }

    /// Current verdict; an in-flight test reads as a pass.
    pub fn current_report(&self) -> DoneReport {
        let state = self.state.lock();
        DoneReport::new(
            state.status.unwrap_or(TestStatus::Pass),
            state.message.clone(),
        )
    }

    pub fn add_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.state.lock().cleanups.push(Box::new(cleanup));
    }

    /// Run every registered cleanup, newest first, and mark the test complete.
    pub fn run_cleanups(&self) {
        let cleanups = {
            let mut state = self.state.lock();
            state.phase = TestPhase::Complete;
            std::mem::take(&mut state.cleanups)
        };
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
