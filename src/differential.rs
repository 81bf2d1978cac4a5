//! §4.I Differential Driver: fan out one input to N executors, compare
//! novelty tuples, and emit difference solutions.
//!
//! Grounded on `examples/original_source/include/fuzzuf/algorithms/nezha/create.hpp`
//! (`CreateRunSingleTarget`) for the per-target run/compare shape.

use rustc_hash::FxHashSet;

use crate::bitmap::{self, NewBitsVerdict};
use crate::checksum::hash32;
use crate::config::Config;
use crate::executor::{ExitReason, Executor};

/// Outcome of running one input across all targets.
pub struct TargetRun {
    pub added_to_corpus: bool,
    pub exit_reason: ExitReason,
    pub exit_status_tag: u32,
    pub output_hash: u32,
}

pub struct DifferentialDriver {
    cfg: Config,
    targets: usize,
    virgin_maps: Vec<Vec<u8>>,
    known_traces: FxHashSet<Vec<bool>>,
    known_outputs: FxHashSet<Vec<u32>>,
    known_status: FxHashSet<Vec<u32>>,
}

impl DifferentialDriver {
    pub fn new(cfg: Config, targets: usize) -> Self {
        assert!(targets >= 2, "differential driver needs at least 2 executors");
        let virgin_maps = (0..targets).map(|_| vec![0xFFu8; cfg.map_size]).collect();
        DifferentialDriver {
            cfg,
            targets,
            virgin_maps,
            known_traces: FxHashSet::default(),
            known_outputs: FxHashSet::default(),
            known_status: FxHashSet::default(),
        }
    }

    /// Runs `input` through every executor, feeding coverage into each
    /// target's own virgin map (edge indices are conceptually shifted by
    /// `k * MAP_SIZE`, modeled here as per-target maps rather than one
    /// flat array, which is equivalent and avoids needless allocation).
    pub fn run_all(&mut self, executors: &mut [Box<dyn Executor>], input: &[u8]) -> Vec<TargetRun> {
        assert_eq!(executors.len(), self.targets);
        let timeout_ms = self.cfg.tmout_limit as u64;
        let mut runs = Vec::with_capacity(self.targets);

        for (k, executor) in executors.iter_mut().enumerate() {
            let result = executor.run(input, timeout_ms);
            let exit_reason = result.exit_reason;
            let exit_status_tag = match exit_reason {
                ExitReason::None => 0,
                ExitReason::Timeout => 1,
                ExitReason::Crash => 2,
                ExitReason::Error => 3,
            } + (result.signal.unwrap_or(0) as u32) * 10;
            let output_hash = hash32(result.std_out);

            let mut classified = result.trace.to_vec();
            bitmap::classify(&mut classified);
            let verdict = bitmap::has_new_bits(&classified, &mut self.virgin_maps[k]);
            let added_to_corpus = verdict != NewBitsVerdict::None;

            runs.push(TargetRun {
                added_to_corpus,
                exit_reason,
                exit_status_tag,
                output_hash,
            });
        }
        runs
    }

    /// §4.I steps 2-3: form the novelty tuple, check novelty against the
    /// known sets, and decide whether this is a genuine difference
    /// solution. Returns the solution file name when it is.
    pub fn evaluate(&mut self, runs: &[TargetRun]) -> Option<String> {
        let coverage_tuple: Vec<bool> = runs.iter().map(|r| r.added_to_corpus).collect();
        let tuple_is_new = if self.cfg.differential_use_output_hash {
            let outputs: Vec<u32> = runs.iter().map(|r| r.output_hash).collect();
            self.known_outputs.insert(outputs)
        } else {
            let statuses: Vec<u32> = runs.iter().map(|r| r.exit_status_tag).collect();
            self.known_status.insert(statuses)
        };
        let traces_new = self.known_traces.insert(coverage_tuple);

        if !(tuple_is_new || traces_new) {
            return None;
        }

        let all_equal = if self.cfg.differential_use_output_hash {
            runs.windows(2).all(|w| w[0].output_hash == w[1].output_hash)
        } else {
            runs.windows(2).all(|w| w[0].exit_status_tag == w[1].exit_status_tag)
        };
        let disagreement = runs
            .windows(2)
            .any(|w| (w[0].exit_reason == ExitReason::None) != (w[1].exit_reason == ExitReason::None));

        if all_equal && !disagreement {
            return None;
        }

        let name = if self.cfg.differential_use_output_hash {
            let parts: Vec<String> = runs.iter().map(|r| format!("{:08x}", r.output_hash)).collect();
            format!("diff_{}", parts.join("_"))
        } else {
            let parts: Vec<String> = runs.iter().map(|r| r.exit_status_tag.to_string()).collect();
            format!("diff_{}", parts.join("_"))
        };
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FakeExecutor;

    fn exec_with_trace(bytes: Vec<u8>, exit: ExitReason) -> FakeExecutor {
        FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(move |_input, trace, out| {
                trace.extend_from_slice(&bytes);
                out.extend_from_slice(b"same-output");
                (exit, None, 1)
            }),
        }
    }

    #[test]
    fn agreeing_targets_emit_no_solution() {
        let mut driver = DifferentialDriver::new(Config::default(), 2);
        let mut execs: Vec<Box<dyn Executor>> = vec![
            Box::new(exec_with_trace(vec![1, 0], ExitReason::None)),
            Box::new(exec_with_trace(vec![1, 0], ExitReason::None)),
        ];
        let runs = driver.run_all(&mut execs, b"in");
        assert!(driver.evaluate(&runs).is_none());
    }

    #[test]
    fn disagreeing_exit_reasons_emit_a_solution() {
        let mut driver = DifferentialDriver::new(Config::default(), 2);
        let mut execs: Vec<Box<dyn Executor>> = vec![
            Box::new(exec_with_trace(vec![1, 0], ExitReason::None)),
            Box::new(exec_with_trace(vec![1, 0], ExitReason::Crash)),
        ];
        let runs = driver.run_all(&mut execs, b"in");
        let sol = driver.evaluate(&runs);
        assert!(sol.is_some());
        assert!(sol.unwrap().starts_with("diff_"));
    }
}
