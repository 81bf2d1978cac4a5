//! §4.G Fuzz Loop (AFL-style): the ordered per-seed stage pipeline,
//! save-if-interesting, and the eff-map optimization.

use rustc_hash::FxHashSet;

use crate::bitmap::{self, NewBitsVerdict, TopRated};
use crate::checksum::hash32;
use crate::config::{CalMode, Config};
use crate::corpus::{Corpus, TestcaseId};
use crate::dictionary::{AutoDict, UserDict};
use crate::executor::{ExitReason, Executor};
use crate::mutator::{self, could_be_arith, could_be_bitflip, could_be_interest};
use crate::rng::FuzzRng;
use crate::scheduler;

#[derive(Debug, Default, Clone)]
pub struct AflStats {
    pub total_execs: u64,
    pub queue_size: usize,
    pub crashes_unique: usize,
    pub hangs_unique: usize,
    pub queue_cycle: u32,
}

pub struct AflLoop {
    pub cfg: Config,
    pub corpus: Corpus,
    pub virgin_bits: Vec<u8>,
    pub top_rated: TopRated,
    pub user_dict: UserDict,
    pub auto_dict: AutoDict,
    pub stats: AflStats,

    crash_hashes: FxHashSet<u32>,
    hang_hashes: FxHashSet<u32>,
    avg_exec_us: f64,
    avg_bitmap_size: f64,
    pending_favored: u32,
}

/// Per-execution verdict handed back to the caller by `save_if_interesting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    NotInteresting,
    NewQueueEntry(TestcaseId),
    UniqueCrash,
    UniqueHang,
    DuplicateCrashOrHang,
}

impl AflLoop {
    pub fn new(cfg: Config) -> Self {
        let map_size = cfg.map_size;
        let output_dir = cfg.output_dir.clone();
        AflLoop {
            corpus: Corpus::new(output_dir),
            virgin_bits: vec![0xFFu8; map_size],
            top_rated: TopRated::new(map_size),
            user_dict: UserDict::default(),
            auto_dict: AutoDict::new(cfg.max_auto_extras),
            stats: AflStats::default(),
            crash_hashes: FxHashSet::default(),
            hang_hashes: FxHashSet::default(),
            avg_exec_us: 1.0,
            avg_bitmap_size: 1.0,
            cfg,
        }
    }

    /// Admits the initial seed corpus without calibration gating retried
    /// (callers are expected to have already validated these files run
    /// cleanly); real admission happens through `save_if_interesting`.
    pub fn seed(&mut self, bytes: Vec<u8>) -> crate::error::Result<TestcaseId> {
        self.corpus.insert(bytes, 0, true, false)
    }

    /// §4.G "Save-if-interesting", invoked after every single execution.
    pub fn save_if_interesting(
        &mut self,
        input: &[u8],
        raw_trace: &[u8],
        exit_reason: ExitReason,
        exec_us: u64,
        parent_depth: u32,
    ) -> SaveOutcome {
        self.stats.total_execs += 1;

        let mut classified = raw_trace.to_vec();
        bitmap::classify(&mut classified);

        match exit_reason {
            ExitReason::None => {
                let verdict = bitmap::has_new_bits(&classified, &mut self.virgin_bits);
                if verdict == NewBitsVerdict::None {
                    return SaveOutcome::NotInteresting;
                }
                let id = match self.corpus.insert(input.to_vec(), parent_depth + 1, true, false) {
                    Ok(id) => id,
                    Err(e) => {
                        // Admission found new coverage, but persisting the
                        // testcase to `queue/` failed (full disk, permissions).
                        // §7: a corpus write failure is surfaced, not fatal.
                        crate::pretty_printing::log(
                            self.cfg.verbose,
                            crate::pretty_printing::LogType::Failure,
                            &format!("failed to persist new queue entry: {e}"),
                        );
                        return SaveOutcome::NotInteresting;
                    }
                };
                let trace_mini = bitmap::TraceMini::from_trace(&classified);
                let bitmap_size = classified.iter().filter(|&&b| b != 0).count() as u32;
                if let Some(tc) = self.corpus.get_mut(id) {
                    tc.exec_us = exec_us;
                    tc.bitmap_size = bitmap_size;
                    tc.exec_cksum = hash32(&classified);
                    tc.trace_mini = trace_mini.clone();
                }
                let fav_factor = input.len() as u64 * exec_us.max(1);
                if scheduler::refresh_top_rated(&mut self.top_rated, id, &trace_mini, fav_factor) {
                    self.pending_favored += 1;
                }
                self.stats.queue_size = self.corpus.len();
                self.update_running_averages(exec_us, bitmap_size);
                SaveOutcome::NewQueueEntry(id)
            }
            ExitReason::Crash => {
                let mut simplified = Vec::new();
                bitmap::simplify(&classified, &mut simplified);
                let h = hash32(&simplified);
                if self.crash_hashes.len() >= self.cfg.keep_unique_crash {
                    return SaveOutcome::DuplicateCrashOrHang;
                }
                if self.crash_hashes.insert(h) {
                    self.stats.crashes_unique = self.crash_hashes.len();
                    SaveOutcome::UniqueCrash
                } else {
                    SaveOutcome::DuplicateCrashOrHang
                }
            }
            ExitReason::Timeout => {
                let mut simplified = Vec::new();
                bitmap::simplify(&classified, &mut simplified);
                let h = hash32(&simplified);
                if self.hang_hashes.len() >= self.cfg.keep_unique_hang {
                    return SaveOutcome::DuplicateCrashOrHang;
                }
                if self.hang_hashes.insert(h) {
                    self.stats.hangs_unique = self.hang_hashes.len();
                    SaveOutcome::UniqueHang
                } else {
                    SaveOutcome::DuplicateCrashOrHang
                }
            }
            ExitReason::Error => SaveOutcome::NotInteresting,
        }
    }

    fn update_running_averages(&mut self, exec_us: u64, bitmap_size: u32) {
        let n = self.corpus.len().max(1) as f64;
        self.avg_exec_us += (exec_us as f64 - self.avg_exec_us) / n;
        self.avg_bitmap_size += (bitmap_size as f64 - self.avg_bitmap_size) / n;
    }

    /// §4.E skip-policy gate for the currently selected entry.
    pub fn consider_skip(&self, id: TestcaseId, rng: &mut dyn FuzzRng) -> bool {
        let Some(tc) = self.corpus.get(id) else {
            return true;
        };
        scheduler::should_skip(
            tc.flags.was_fuzzed,
            tc.flags.favored,
            self.pending_favored,
            self.corpus.len(),
            self.stats.queue_cycle,
            &self.cfg,
            rng,
        )
    }

    /// Runs calibration (stage 1) against an executor, storing the result
    /// on the testcase.
    pub fn calibrate_if_needed(&mut self, executor: &mut dyn Executor, id: TestcaseId) -> bool {
        let Some(bytes) = self.corpus.get(id).map(|_| self.corpus.load_bytes(id)) else {
            return false;
        };
        let Ok(bytes) = bytes else { return false };
        let needs = self.corpus.get(id).map(|t| t.flags.cal_failed > 0).unwrap_or(false)
            || self.corpus.get(id).map(|t| t.exec_cksum == 0).unwrap_or(true);
        if !needs {
            return true;
        }

        match scheduler::calibrate(executor, &bytes, &self.cfg, CalMode::Normal) {
            Some(outcome) => {
                if let Some(tc) = self.corpus.get_mut(id) {
                    tc.exec_us = outcome.exec_us;
                    tc.bitmap_size = outcome.bitmap_size;
                    tc.exec_cksum = outcome.exec_cksum;
                    tc.flags.var_behavior = outcome.var_behavior;
                    tc.flags.cal_failed = 0;
                    tc.trace_mini = bitmap::TraceMini::from_trace(&outcome.trace);
                }
                true
            }
            None => {
                if let Some(tc) = self.corpus.get_mut(id) {
                    tc.flags.cal_failed += 1;
                }
                false
            }
        }
    }

    /// Stage 3: trim if not yet trimmed.
    pub fn trim_if_needed(&mut self, executor: &mut dyn Executor, id: TestcaseId) {
        let (already, cksum) = match self.corpus.get(id) {
            Some(tc) => (tc.flags.trim_done, tc.exec_cksum),
            None => return,
        };
        if already {
            return;
        }
        let Ok(bytes) = self.corpus.load_bytes(id) else { return };
        let trimmed = scheduler::trim(executor, &bytes, cksum, &self.cfg);
        let shrank = trimmed.len() < bytes.len();
        if shrank {
            let _ = self.corpus.replace(id, trimmed);
        }
        if let Some(tc) = self.corpus.get_mut(id) {
            tc.flags.trim_done = true;
        }
        if shrank {
            if let Some(tc) = self.corpus.get(id) {
                let fav_factor = tc.fav_factor();
                let trace_mini = tc.trace_mini.clone();
                scheduler::refresh_top_rated(&mut self.top_rated, id, &trace_mini, fav_factor);
            }
        }
    }

    /// Stage 4: perf score for this testcase.
    pub fn perf_score(&self, id: TestcaseId) -> u32 {
        match self.corpus.get(id) {
            Some(tc) => scheduler::perf_score(
                tc.exec_us,
                self.avg_exec_us,
                tc.bitmap_size,
                self.avg_bitmap_size,
                tc.depth,
                &self.cfg,
            ),
            None => 1,
        }
    }

    /// Stage 5: deterministic bitflip/arith/interest/dict stages. Also
    /// drives the auto-dictionary builder (bitflip 1/1) and eff-map
    /// builder (bitflip 8/8). Mutates `buf` across calls; restores it via
    /// the caller-held backup after each probe, per §5's "swap-with-backup"
    /// policy.
    #[allow(clippy::too_many_arguments)]
    pub fn deterministic_stages(
        &mut self,
        executor: &mut dyn Executor,
        id: TestcaseId,
        buf: &mut Vec<u8>,
        eff_map: &mut Vec<bool>,
        rng: &mut dyn FuzzRng,
        mut on_execute: impl FnMut(&mut Self, &[u8], &[u8], ExitReason, u64, u32),
    ) {
        if self.cfg.skip_deterministic {
            return;
        }
        let depth = self.corpus.get(id).map(|t| t.depth).unwrap_or(0);
        let len = buf.len();
        if len == 0 {
            return;
        }

        eff_map.resize(len.div_ceil(1 << self.cfg.eff_map_scale2), false);

        // bitflip 1/1 — also the auto-dictionary builder. Ported from
        // fuzzuf's `ConstructAutoDict`: a collector run is tracked at
        // byte boundaries (once every 8 bits) against two checksums —
        // `running_cksum`, the boundary the current run started from,
        // and `baseline_cksum`, the untouched input's own checksum. A
        // byte is appended to the run whenever its boundary checksum
        // differs from the baseline; the run is flushed into the
        // auto-dict whenever the boundary checksum changes again.
        let orig_buf = buf.clone();
        let baseline_cksum = self.corpus.get(id).map(|t| t.exec_cksum).unwrap_or(0);
        let mut running_cksum = baseline_cksum;
        let mut a_collect: Vec<u8> = Vec::new();
        let mut a_len: usize = 0;
        for bit in 0..(len * 8) {
            mutator::flip_bit(buf, bit, 1);
            let (exit_reason, trace, exec_us) = self.probe(executor, buf);
            let mut classified = trace;
            bitmap::classify(&mut classified);
            let cksum = hash32(&classified);

            if cksum != baseline_cksum {
                eff_map[(bit / 8) >> self.cfg.eff_map_scale2] = true;
            }

            on_execute(self, buf, &classified, exit_reason, exec_us, depth);
            mutator::flip_bit(buf, bit, 1); // restore

            if (bit & 7) == 7 {
                let byte_pos = bit / 8;
                let at_last_byte = bit == len * 8 - 1;

                if at_last_byte && cksum == running_cksum {
                    if a_len < self.cfg.max_auto_extra {
                        a_collect.push(orig_buf[byte_pos]);
                    }
                    a_len += 1;
                    if (self.cfg.min_auto_extra..=self.cfg.max_auto_extra).contains(&a_len) {
                        self.auto_dict
                            .offer(a_collect.clone(), self.cfg.min_auto_extra, self.cfg.max_auto_extra, rng);
                    }
                } else if cksum != running_cksum {
                    if (self.cfg.min_auto_extra..=self.cfg.max_auto_extra).contains(&a_len) {
                        self.auto_dict
                            .offer(a_collect.clone(), self.cfg.min_auto_extra, self.cfg.max_auto_extra, rng);
                    }
                    a_collect.clear();
                    a_len = 0;
                    running_cksum = cksum;
                }

                if cksum != baseline_cksum {
                    if a_len < self.cfg.max_auto_extra {
                        a_collect.push(orig_buf[byte_pos]);
                    }
                    a_len += 1;
                }
            }
        }
        if let Some(tc) = self.corpus.get_mut(id) {
            tc.flags.passed_det = true;
        }

        // bitflip 2/1, 4/1.
        for n in [2u32, 4] {
            if (len * 8) < n as usize {
                continue;
            }
            for bit in 0..(len * 8 - (n as usize - 1)) {
                mutator::flip_bit(buf, bit, n);
                let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                mutator::flip_bit(buf, bit, n);
            }
        }

        // bitflip 8/8 — also the eff-map builder (bits already gathered
        // above at byte granularity for the 1/1 pass; this pass just
        // forces full-byte probes for fidelity with the AFL reference).
        for pos in 0..len {
            if self.eff_covered(eff_map, pos) {
                continue;
            }
            mutator::flip_byte(buf, pos, 1);
            let (exit_reason, trace, exec_us) = self.probe(executor, buf);
            on_execute(self, buf, &trace, exit_reason, exec_us, depth);
            mutator::flip_byte(buf, pos, 1);
        }

        let eff_ratio = eff_map.iter().filter(|&&b| b).count() as f64 / eff_map.len().max(1) as f64;
        if eff_ratio * 100.0 > self.cfg.eff_max_perc as f64 {
            eff_map.iter_mut().for_each(|b| *b = true);
        }

        // bitflip 16/8, 32/8.
        for width in [2usize, 4] {
            if len < width {
                continue;
            }
            for pos in 0..=(len - width) {
                if self.eff_covered(eff_map, pos) {
                    continue;
                }
                mutator::flip_byte(buf, pos, width);
                let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                mutator::flip_byte(buf, pos, width);
            }
        }

        // arith 8/16/32.
        for width in [1usize, 2, 4] {
            if len < width {
                continue;
            }
            for pos in 0..=(len - width) {
                if width > 1 && self.eff_covered(eff_map, pos) {
                    continue;
                }
                for delta in 1..=self.cfg.arith_max as i32 {
                    for sign in [1, -1] {
                        let old = read_width(buf, pos, width);
                        mutator::arith_n(buf, pos, width, sign * delta, false);
                        let new = read_width(buf, pos, width);
                        if !could_be_bitflip(old ^ new) {
                            let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                            on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                        }
                        mutator::arith_n(buf, pos, width, -sign * delta, false);
                    }
                }
            }
        }

        // interest 8/16/32.
        for width in [1usize, 2, 4] {
            if len < width {
                continue;
            }
            let table_len = match width {
                1 => mutator::INTERESTING_8.len(),
                2 => mutator::INTERESTING_16.len(),
                _ => mutator::INTERESTING_32.len(),
            };
            for pos in 0..=(len - width) {
                if width > 1 && self.eff_covered(eff_map, pos) {
                    continue;
                }
                let old = read_width(buf, pos, width);
                for idx in 0..table_len {
                    mutator::interest_n(buf, pos, width, idx, false);
                    let new = read_width(buf, pos, width);
                    if !could_be_bitflip(old ^ new) && !could_be_arith(old, new, width as u32) {
                        let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                        on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                    }
                }
                write_width(buf, pos, width, old);
            }
        }
        let _ = could_be_interest;

        // user-dict overwrite/insert, auto-dict overwrite.
        let user_entries: Vec<_> = self.user_dict.entries().to_vec();
        for entry in &user_entries {
            if entry.bytes.len() > len {
                continue;
            }
            for pos in 0..=(len - entry.bytes.len()) {
                let backup: Vec<u8> = buf[pos..pos + entry.bytes.len()].to_vec();
                mutator::overwrite_token(buf, pos, &entry.bytes);
                let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                buf[pos..pos + entry.bytes.len()].copy_from_slice(&backup);
            }
            if len + entry.bytes.len() < self.cfg.max_file {
                for pos in 0..=len {
                    mutator::insert_token(buf, pos, &entry.bytes);
                    let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                    on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                    buf.splice(pos..pos + entry.bytes.len(), std::iter::empty());
                }
            }
        }

        let auto_entries: Vec<_> = self
            .auto_dict
            .for_fuzzing(self.cfg.use_auto_extras)
            .into_iter()
            .cloned()
            .collect();
        for entry in &auto_entries {
            if entry.bytes.len() > len {
                continue;
            }
            for pos in 0..=(len - entry.bytes.len()) {
                let backup: Vec<u8> = buf[pos..pos + entry.bytes.len()].to_vec();
                mutator::overwrite_token(buf, pos, &entry.bytes);
                let (exit_reason, trace, exec_us) = self.probe(executor, buf);
                on_execute(self, buf, &trace, exit_reason, exec_us, depth);
                buf[pos..pos + entry.bytes.len()].copy_from_slice(&backup);
            }
        }
    }

    fn eff_covered(&self, eff_map: &[bool], byte_pos: usize) -> bool {
        let window = byte_pos >> self.cfg.eff_map_scale2;
        !eff_map.get(window).copied().unwrap_or(true)
    }

    /// Runs the PUT once and returns the classified trace and raw exit
    /// data; does not itself call `save_if_interesting` (callers decide).
    fn probe(&self, executor: &mut dyn Executor, input: &[u8]) -> (ExitReason, Vec<u8>, u64) {
        let timeout_ms = self.cfg.tmout_limit as u64;
        let result = executor.run(input, timeout_ms);
        (result.exit_reason, result.trace.to_vec(), result.exec_us)
    }

    /// Stage 6: havoc, with `stage_max` doubling on mid-stage discovery.
    pub fn havoc_stage(
        &mut self,
        executor: &mut dyn Executor,
        buf: &mut Vec<u8>,
        base_perf_score: u32,
        in_deterministic_phase: bool,
        rng: &mut dyn FuzzRng,
        mut on_execute: impl FnMut(&mut Self, &[u8], &[u8], ExitReason, u64, u32),
    ) {
        let mut stage_max = if in_deterministic_phase {
            self.cfg.havoc_cycles_init
        } else {
            self.cfg.havoc_cycles * base_perf_score / 100
        }
        .max(1);

        let mut i = 0;
        while i < stage_max {
            let user_entries: Vec<_> = self.user_dict.entries().to_vec();
            let auto_entries: Vec<_> = self
                .auto_dict
                .for_fuzzing(self.cfg.use_auto_extras)
                .into_iter()
                .cloned()
                .collect();
            mutator::run_havoc(
                buf,
                &user_entries,
                &auto_entries,
                &self.cfg,
                self.stats.queue_cycle,
                rng,
            );
            let before = self.corpus.len();
            let (exit_reason, trace, exec_us) = self.probe(executor, buf);
            on_execute(self, buf, &trace, exit_reason, exec_us, 0);
            if self.corpus.len() > before {
                let cap = self.cfg.havoc_max_mult * 100;
                stage_max = (stage_max * 2).min(cap.max(stage_max));
            }
            i += 1;
        }
    }

    /// Stage 7: splice, up to `SPLICE_CYCLES` tries.
    pub fn splice_stage(
        &mut self,
        executor: &mut dyn Executor,
        id: TestcaseId,
        buf: &mut Vec<u8>,
        rng: &mut dyn FuzzRng,
        mut on_execute: impl FnMut(&mut Self, &[u8], &[u8], ExitReason, u64, u32),
    ) {
        if !self.cfg.use_splicing || self.corpus.len() <= 1 {
            return;
        }
        let depth = self.corpus.get(id).map(|t| t.depth).unwrap_or(0);
        for _ in 0..self.cfg.splice_cycles {
            let other_id = self.corpus.ids_in_order().nth(rng.below_usize(self.corpus.len()));
            let Some(other_id) = other_id else { continue };
            if other_id == id {
                continue;
            }
            let Ok(other_bytes) = self.corpus.load_bytes(other_id) else {
                continue;
            };
            if let Some(spliced) = mutator::splice(buf, &other_bytes, rng) {
                let mut working = spliced;
                self.havoc_stage(executor, &mut working, 100, false, rng, &mut on_execute);
            }
        }
        let _ = depth;
    }
}

fn read_width(buf: &[u8], pos: usize, width: usize) -> u32 {
    use byteorder::{ByteOrder, LittleEndian};
    match width {
        1 => buf[pos] as u32,
        2 => LittleEndian::read_u16(&buf[pos..pos + 2]) as u32,
        4 => LittleEndian::read_u32(&buf[pos..pos + 4]),
        _ => unreachable!(),
    }
}

fn write_width(buf: &mut [u8], pos: usize, width: usize, value: u32) {
    use byteorder::{ByteOrder, LittleEndian};
    match width {
        1 => buf[pos] = value as u8,
        2 => LittleEndian::write_u16(&mut buf[pos..pos + 2], value as u16),
        4 => LittleEndian::write_u32(&mut buf[pos..pos + 4], value),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FakeExecutor;

    fn toy_executor() -> FakeExecutor {
        FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(|input, trace, _out| {
                trace.push(input.first().copied().unwrap_or(0));
                trace.push(input.get(1).copied().unwrap_or(0));
                (ExitReason::None, None, 10)
            }),
        }
    }

    #[test]
    fn save_if_interesting_admits_new_coverage_once() {
        let mut loop_ = AflLoop::new(Config::default());
        let outcome1 = loop_.save_if_interesting(b"ab", &[1, 0], ExitReason::None, 10, 0);
        assert!(matches!(outcome1, SaveOutcome::NewQueueEntry(_)));
        let outcome2 = loop_.save_if_interesting(b"ab", &[1, 0], ExitReason::None, 10, 0);
        assert_eq!(outcome2, SaveOutcome::NotInteresting);
    }

    #[test]
    fn unique_crash_tracked_once() {
        let mut loop_ = AflLoop::new(Config::default());
        let o1 = loop_.save_if_interesting(b"ab", &[1, 0], ExitReason::Crash, 10, 0);
        assert_eq!(o1, SaveOutcome::UniqueCrash);
        let o2 = loop_.save_if_interesting(b"ab", &[1, 0], ExitReason::Crash, 10, 0);
        assert_eq!(o2, SaveOutcome::DuplicateCrashOrHang);
    }

    #[test]
    fn corpus_write_failure_is_not_interesting_not_fatal() {
        // §7: a corpus persistence failure on a newly admitted, genuinely
        // new-coverage input must not panic the loop.
        let blocker = std::env::temp_dir().join("fuzzcore-test-blocker-file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let mut cfg = Config::default();
        cfg.output_dir = blocker.join("out"); // `blocker` is a file, not a dir
        let mut loop_ = AflLoop::new(cfg);

        let outcome = loop_.save_if_interesting(b"ab", &[1, 0], ExitReason::None, 10, 0);
        assert_eq!(outcome, SaveOutcome::NotInteresting);

        std::fs::remove_file(&blocker).ok();
    }

    #[test]
    fn unique_crash_cap_is_enforced() {
        // P10: once keep_unique_crash distinct crash hashes have been
        // recorded, further distinct crashes are reported as duplicates
        // rather than growing the set without bound.
        let mut cfg = Config::default();
        cfg.keep_unique_crash = 2;
        let mut loop_ = AflLoop::new(cfg);

        let o1 = loop_.save_if_interesting(b"a", &[1, 0], ExitReason::Crash, 10, 0);
        let o2 = loop_.save_if_interesting(b"b", &[0, 1], ExitReason::Crash, 10, 0);
        let o3 = loop_.save_if_interesting(b"c", &[1, 1], ExitReason::Crash, 10, 0);
        let o4 = loop_.save_if_interesting(b"d", &[0, 0, 1], ExitReason::Crash, 10, 0);

        assert_eq!(o1, SaveOutcome::UniqueCrash);
        assert_eq!(o2, SaveOutcome::UniqueCrash);
        assert_eq!(o3, SaveOutcome::DuplicateCrashOrHang);
        assert_eq!(o4, SaveOutcome::DuplicateCrashOrHang);
        assert!(loop_.stats.crashes_unique <= 2);
    }

    #[test]
    fn bitflip_1_1_discovers_a_single_auto_dict_token() {
        // S2-style scenario: the PUT's trace only depends on whether
        // bytes [2..5) still match the seed's original content. Bit
        // flips anywhere else are behaviorally silent. After one
        // bitflip-1/1 pass, the auto-dictionary should contain exactly
        // one token: the original bytes at that region, "XYZ".
        let mut loop_ = AflLoop::new(Config::default());
        let seed = b"AAXYZBBB".to_vec();
        let region: [u8; 3] = [seed[2], seed[3], seed[4]];
        let id = loop_.seed(seed.clone()).unwrap();

        let mut exec = FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(move |input, trace, _out| {
                let matches_region = input.len() >= 5 && input[2..5] == region;
                trace.push(if matches_region { 0 } else { 1 });
                (ExitReason::None, None, 5)
            }),
        };

        // Calibrate so exec_cksum reflects the unmutated baseline trace.
        let baseline = scheduler::calibrate(&mut exec, &seed, &loop_.cfg, crate::config::CalMode::Normal).unwrap();
        loop_.corpus.get_mut(id).unwrap().exec_cksum = baseline.exec_cksum;

        let mut buf = loop_.corpus.load_bytes(id).unwrap();
        let mut eff_map = Vec::new();
        let mut rng = crate::rng::StdFuzzRng::new(5);
        loop_.deterministic_stages(&mut exec, id, &mut buf, &mut eff_map, &mut rng, |s, b, t, r, us, d| {
            let _ = s.save_if_interesting(b, t, r, us, d);
        });

        let entries = loop_.auto_dict.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].bytes, b"XYZ");
    }

    #[test]
    fn deterministic_stages_run_without_panicking() {
        let mut loop_ = AflLoop::new(Config::default());
        let id = loop_.seed(b"AAAA".to_vec()).unwrap();
        let mut exec = toy_executor();
        let mut buf = loop_.corpus.load_bytes(id).unwrap();
        let mut eff_map = Vec::new();
        let mut rng = crate::rng::StdFuzzRng::new(3);
        loop_.deterministic_stages(&mut exec, id, &mut buf, &mut eff_map, &mut rng, |s, b, t, r, us, d| {
            let _ = s.save_if_interesting(b, t, r, us, d);
        });
    }
}
