//! §4.F Executor Facade: the only suspension point in the engine (§5).
//! One operation, `run`, that blocks until the PUT exits, times out, or is
//! signalled, and hands back a borrowed view of the coverage bitmap whose
//! lifetime is at most the next call.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    None,
    Timeout,
    Crash,
    Error,
}

pub struct ExecResult<'a> {
    pub exit_reason: ExitReason,
    pub signal: Option<i32>,
    /// Borrowed coverage bitmap; the facade is free to reuse this storage
    /// on the very next `run` call, so callers must finish with it before
    /// then (§5 "Shared-resource policy").
    pub trace: &'a [u8],
    pub std_out: &'a [u8],
    pub exec_us: u64,
}

/// One PUT, reachable via whatever channel (file, stdin, persistent
/// fork-server) the implementation chooses. The differential driver
/// (§4.I) owns `N >= 2` of these, each with its own bitmap slot.
pub trait Executor {
    fn run(&mut self, input: &[u8], timeout_ms: u64) -> ExecResult<'_>;
}

/// Test double used throughout the unit suite and referenced by
/// SPEC_FULL.md's "test tooling" section: replays a scripted sequence of
/// outcomes keyed by a caller-supplied oracle, so stage logic can be
/// exercised without spawning a real child process.
#[cfg(test)]
pub struct FakeExecutor {
    pub trace_buf: Vec<u8>,
    pub std_out_buf: Vec<u8>,
    /// Called once per `run`; fills `trace_buf`/`std_out_buf` and returns
    /// the outcome for this input.
    pub oracle: Box<dyn FnMut(&[u8], &mut Vec<u8>, &mut Vec<u8>) -> (ExitReason, Option<i32>, u64)>,
}

#[cfg(test)]
impl Executor for FakeExecutor {
    fn run(&mut self, input: &[u8], _timeout_ms: u64) -> ExecResult<'_> {
        self.trace_buf.clear();
        self.std_out_buf.clear();
        let (exit_reason, signal, exec_us) =
            (self.oracle)(input, &mut self.trace_buf, &mut self.std_out_buf);
        ExecResult {
            exit_reason,
            signal,
            trace: &self.trace_buf,
            std_out: &self.std_out_buf,
            exec_us,
        }
    }
}
