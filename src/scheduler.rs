//! §4.E Scheduler: calibration, trimming, performance score, favored
//! culling, and the AFL-mode skip policy.

use rustc_hash::FxHashSet;

use crate::bitmap::{self, NewBitsVerdict, TopRated, TraceMini};
use crate::checksum::hash32;
use crate::config::{CalMode, Config};
use crate::corpus::{Corpus, TestcaseId};
use crate::executor::{ExecResult, Executor};
use crate::rng::FuzzRng;

/// Result of running calibration on a freshly admitted testcase.
pub struct CalibrationOutcome {
    pub exec_us: u64,
    pub bitmap_size: u32,
    pub exec_cksum: u32,
    pub var_behavior: bool,
    pub trace: Vec<u8>,
}

/// §4.E "Calibration": run the PUT `cal_cycles` times on the same input.
/// Rejects if any run errors outright; succeeds if at least one stable
/// trace is obtained within `cal_chances` retries on the unstable path.
pub fn calibrate(
    executor: &mut dyn Executor,
    input: &[u8],
    cfg: &Config,
    mode: CalMode,
) -> Option<CalibrationOutcome> {
    let cycles = cfg.cal_cycles(mode);
    let mut min_us = u64::MAX;
    let mut first_cksum: Option<u32> = None;
    let mut var_behavior = false;
    let mut chances_left = cfg.cal_chances;
    let mut last_trace = Vec::new();

    let mut run = 0;
    while run < cycles {
        let timeout_ms = (cfg.tmout_limit as u64 * cfg.cal_tmout_perc as u64 / 100)
            + cfg.cal_tmout_add_ms as u64;
        let result = executor.run(input, timeout_ms);
        let ExecResult {
            exit_reason,
            exec_us,
            trace,
            ..
        } = result;
        if exit_reason != crate::executor::ExitReason::None {
            return None;
        }

        let mut classified = trace.to_vec();
        bitmap::classify(&mut classified);
        let cksum = hash32(&classified);
        min_us = min_us.min(exec_us);
        last_trace = classified;

        match first_cksum {
            None => first_cksum = Some(cksum),
            Some(expected) if expected != cksum => {
                var_behavior = true;
                if chances_left == 0 {
                    break;
                }
                chances_left -= 1;
            }
            _ => {}
        }
        run += 1;
    }

    let exec_cksum = first_cksum?;
    let bitmap_size = last_trace.iter().filter(|&&b| b != 0).count() as u32;
    Some(CalibrationOutcome {
        exec_us: min_us,
        bitmap_size,
        exec_cksum,
        var_behavior,
        trace: last_trace,
    })
}

/// §4.E "Trimming": power-of-two chunk trimming between `len/16` and
/// `len/1024` (floored at `trim_min_bytes`). Accepts a cut iff the
/// classified trace checksum matches the calibration checksum.
pub fn trim(
    executor: &mut dyn Executor,
    input: &[u8],
    baseline_cksum: u32,
    cfg: &Config,
) -> Vec<u8> {
    let mut buf = input.to_vec();
    if buf.len() <= cfg.trim_min_bytes {
        return buf;
    }

    let mut remove_len = (buf.len() / 16).max(cfg.trim_min_bytes);
    while remove_len >= cfg.trim_min_bytes && buf.len() > cfg.trim_min_bytes {
        let mut pos = 0;
        while pos + remove_len <= buf.len() {
            let mut candidate = buf.clone();
            candidate.drain(pos..pos + remove_len);

            let timeout_ms =
                cfg.tmout_limit as u64 * cfg.cal_tmout_perc as u64 / 100 + cfg.cal_tmout_add_ms as u64;
            let result = executor.run(&candidate, timeout_ms);
            if result.exit_reason == crate::executor::ExitReason::None {
                let mut classified = result.trace.to_vec();
                bitmap::classify(&mut classified);
                if hash32(&classified) == baseline_cksum {
                    buf = candidate;
                    continue;
                }
            }
            pos += remove_len;
        }
        remove_len /= 2;
    }
    buf
}

/// §4.E "Performance score". Base 100, clamped to `[1, HAVOC_MAX_MULT*100]`.
pub fn perf_score(
    exec_us: u64,
    avg_exec_us: f64,
    bitmap_size: u32,
    avg_bitmap_size: f64,
    depth: u32,
    cfg: &Config,
) -> u32 {
    let mut score = 100.0f64;

    let exec_ratio = exec_us as f64 / avg_exec_us.max(1.0);
    score *= if exec_ratio * 0.1 > 10.0 {
        0.1
    } else if exec_ratio > 10.0 {
        0.25
    } else if exec_ratio > 4.0 {
        0.5
    } else if exec_ratio > 2.0 {
        0.75
    } else if exec_ratio < 0.25 {
        3.0
    } else if exec_ratio < 0.5 {
        2.0
    } else if exec_ratio < 0.75 {
        1.5
    } else {
        1.0
    };

    let bitmap_ratio = bitmap_size as f64 / avg_bitmap_size.max(1.0);
    score *= if bitmap_ratio > 3.0 {
        3.0
    } else if bitmap_ratio > 2.0 {
        2.0
    } else if bitmap_ratio > 1.5 {
        1.5
    } else if bitmap_ratio < 0.3 {
        0.25
    } else if bitmap_ratio < 0.5 {
        0.5
    } else if bitmap_ratio < 0.75 {
        0.75
    } else {
        1.0
    };

    let depth_factor = match depth {
        0..=3 => 1.0,
        4..=7 => 2.0,
        8..=13 => 3.0,
        _ => 4.0,
    };
    score *= depth_factor;

    let max_score = (cfg.havoc_max_mult * 100) as f64;
    score.clamp(1.0, max_score) as u32
}

/// §4.E "Favored culling". Returns the ids chosen as favored and the union
/// coverage set they reach together.
pub fn cull_favored(corpus: &Corpus, top_rated: &TopRated, map_size: usize) -> Vec<TestcaseId> {
    let mut chosen = Vec::new();
    let mut covered: Vec<u64> = Vec::new();
    let mut already_favored = FxHashSet::default();

    for e in 0..map_size {
        if covered.get(e / 64).map(|&w| w & (1u64 << (e % 64)) != 0).unwrap_or(false) {
            continue;
        }
        let Some(id) = top_rated.get(e) else { continue };
        if already_favored.contains(&id) {
            continue;
        }
        if let Some(tc) = corpus.get(id) {
            already_favored.insert(id);
            chosen.push(id);
            tc.trace_mini.union_into(&mut covered);
        }
    }
    chosen
}

/// Applies the culling result: marks favored testcases, everyone else as
/// `fs_redundant` (disk layout hint only).
pub fn apply_culling(corpus: &mut Corpus, favored: &[TestcaseId]) {
    let favored_set: FxHashSet<_> = favored.iter().copied().collect();
    let ids: Vec<TestcaseId> = corpus.ids_in_order().collect();
    for id in ids {
        if let Some(tc) = corpus.get_mut(id) {
            tc.flags.favored = favored_set.contains(&id);
            tc.flags.fs_redundant = !tc.flags.favored;
        }
    }
}

/// §4.E "Skip policy" (AFL mode), evaluated for the current queue entry.
pub fn should_skip(
    was_fuzzed: bool,
    favored: bool,
    pending_favored: u32,
    queued: usize,
    queue_cycle: u32,
    cfg: &Config,
    rng: &mut dyn FuzzRng,
) -> bool {
    if pending_favored > 0 && (was_fuzzed || !favored) {
        return rng.chance_pct(cfg.skip_to_new_prob);
    }
    if !favored && queued > 10 && queue_cycle > 1 && !was_fuzzed {
        return rng.chance_pct(cfg.skip_nfav_new_prob);
    }
    if !favored && queued > 10 {
        return rng.chance_pct(cfg.skip_nfav_old_prob);
    }
    false
}

/// §4.A "Update-bitmap-score" wired to a freshly classified trace: unions
/// the edges this testcase covers into its `trace_mini` and refreshes
/// `top_rated`.
pub fn refresh_top_rated(
    top_rated: &mut TopRated,
    testcase_id: TestcaseId,
    trace_mini: &TraceMini,
    fav_factor: u64,
) -> bool {
    top_rated.update(testcase_id, trace_mini.iter_set(), fav_factor)
}

/// Convenience: verdict-gated admission check used by both fuzz loops to
/// decide whether a run is worth handing to the corpus at all.
pub fn is_admission_worthy(verdict: NewBitsVerdict) -> bool {
    verdict != NewBitsVerdict::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecResult, ExitReason};

    struct FixedExecutor {
        trace: Vec<u8>,
    }

    impl Executor for FixedExecutor {
        fn run(&mut self, _input: &[u8], _timeout_ms: u64) -> ExecResult<'_> {
            ExecResult {
                exit_reason: ExitReason::None,
                signal: None,
                trace: &self.trace,
                std_out: &[],
                exec_us: 100,
            }
        }
    }

    #[test]
    fn calibration_reports_stable_checksum() {
        let mut exec = FixedExecutor {
            trace: vec![0, 1, 0, 2],
        };
        let cfg = Config::default();
        let outcome = calibrate(&mut exec, b"seed", &cfg, CalMode::Normal).unwrap();
        assert!(!outcome.var_behavior);
        assert_eq!(outcome.bitmap_size, 2);
    }

    #[test]
    fn perf_score_clamped_to_range() {
        let cfg = Config::default();
        let s = perf_score(100, 100.0, 10, 10.0, 0, &cfg);
        assert!((1..=cfg.havoc_max_mult * 100).contains(&s));
    }

    #[test]
    fn skip_policy_never_skips_favored_unfuzzed_without_pending() {
        let mut rng = crate::rng::StdFuzzRng::new(1);
        let cfg = Config::default();
        assert!(!should_skip(false, true, 0, 0, 1, &cfg, &mut rng));
    }

    struct AlternatingExecutor {
        toggle: bool,
    }

    impl Executor for AlternatingExecutor {
        fn run(&mut self, _input: &[u8], _timeout_ms: u64) -> ExecResult<'_> {
            self.toggle = !self.toggle;
            ExecResult {
                exit_reason: ExitReason::None,
                signal: None,
                trace: if self.toggle { &[1, 0] } else { &[0, 1] },
                std_out: &[],
                exec_us: 50,
            }
        }
    }

    #[test]
    fn calibration_admits_variable_behaviour_inputs() {
        // S4: a PUT that alternates its trace on every run still gets
        // admitted, flagged `var_behavior`, after exhausting its retries.
        let mut exec = AlternatingExecutor { toggle: false };
        let cfg = Config::default();
        let outcome = calibrate(&mut exec, b"seed", &cfg, CalMode::Normal).unwrap();
        assert!(outcome.var_behavior);
    }

    struct MarkerExecutor {
        marker: Vec<u8>,
        trace: Vec<u8>,
    }

    impl Executor for MarkerExecutor {
        fn run(&mut self, input: &[u8], _timeout_ms: u64) -> ExecResult<'_> {
            let has_marker = input.windows(self.marker.len()).any(|w| w == self.marker.as_slice());
            self.trace = if has_marker { vec![1, 0, 1] } else { vec![0, 1, 0] };
            ExecResult {
                exit_reason: ExitReason::None,
                signal: None,
                trace: &self.trace,
                std_out: &[],
                exec_us: 10,
            }
        }
    }

    impl MarkerExecutor {
        fn new(marker: Vec<u8>) -> Self {
            MarkerExecutor { marker, trace: Vec::new() }
        }
    }

    #[test]
    fn trim_preserves_classified_trace() {
        // P5: trimming never changes the classified trace the PUT produces.
        let marker = b"KEEP".to_vec();
        let mut exec = MarkerExecutor::new(marker.clone());
        let mut input = marker.clone();
        input.extend(std::iter::repeat(b'.').take(60));

        let cfg = Config::default();
        let mut classified = vec![1u8, 0, 1];
        bitmap::classify(&mut classified);
        let baseline = hash32(&classified);

        let trimmed = trim(&mut exec, &input, baseline, &cfg);
        assert!(trimmed.len() <= input.len());

        let result = exec.run(&trimmed, 1000);
        let mut after = result.trace.to_vec();
        bitmap::classify(&mut after);
        assert_eq!(hash32(&after), baseline);
    }

    #[test]
    fn cull_favored_covers_every_live_edge() {
        // P3: the union of trace_mini over favored testcases must be a
        // superset of the union over all live testcases.
        let mut corpus = Corpus::new(std::env::temp_dir());
        let a = corpus.insert(b"a".to_vec(), 0, false, true).unwrap();
        let b = corpus.insert(b"b".to_vec(), 0, false, true).unwrap();

        let trace_a = {
            let mut t = vec![0u8; 16];
            t[1] = 1;
            t[3] = 1;
            t
        };
        let trace_b = {
            let mut t = vec![0u8; 16];
            t[5] = 1;
            t
        };
        corpus.get_mut(a).unwrap().trace_mini = TraceMini::from_trace(&trace_a);
        corpus.get_mut(b).unwrap().trace_mini = TraceMini::from_trace(&trace_b);

        let mut top_rated = TopRated::new(16);
        top_rated.update(a, corpus.get(a).unwrap().trace_mini.iter_set(), 10);
        top_rated.update(b, corpus.get(b).unwrap().trace_mini.iter_set(), 10);

        let favored = cull_favored(&corpus, &top_rated, 16);

        let mut favored_words = Vec::new();
        for id in &favored {
            corpus.get(*id).unwrap().trace_mini.union_into(&mut favored_words);
        }
        let is_favored_edge = |edge: usize| {
            favored_words
                .get(edge / 64)
                .map(|w| w & (1u64 << (edge % 64)) != 0)
                .unwrap_or(false)
        };

        for edge in corpus.get(a).unwrap().trace_mini.iter_set() {
            assert!(is_favored_edge(edge));
        }
        for edge in corpus.get(b).unwrap().trace_mini.iter_set() {
            assert!(is_favored_edge(edge));
        }
    }
}
