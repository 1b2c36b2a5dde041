//! Scripted transport fake for session tests (testing only).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ExecResult, Transport};
use crate::error::Result;

/// A transport that records every script it is asked to execute and replays
/// queued results, satisfying the [`Transport`] contract without any shell
/// or network.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    calls: Arc<Mutex<Vec<String>>>,
    responses: Mutex<VecDeque<ExecResult>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned result for the next exec call. Calls beyond the queue
    /// succeed with empty output.
    pub fn push_response(&self, result: ExecResult) {
        self.responses.lock().unwrap().push_back(result);
    }

    /// Shared handle to the scripts executed so far.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    /// Convenience: a successful result with the given stdout.
    pub fn ok_with_stdout(stdout: &str) -> ExecResult {
        ExecResult {
            stdout: stdout.to_string(),
            ..ExecResult::default()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exec(&mut self, script: &str, _timeout_secs: u64) -> Result<ExecResult> {
        self.calls.lock().unwrap().push(script.to_string());
        let queued = self.responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_default())
    }
}
