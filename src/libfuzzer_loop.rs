//! §4.H libFuzzer Loop: entropic energy scheduling, feature-set admission,
//! rare-feature maintenance, and corpus-length control.
//!
//! Grounded on `examples/original_source/algorithms/libfuzzer_common/input_info.cpp`
//! (`updateEnergy`) and `include/fuzzuf/algorithms/libfuzzer/select_seed.hpp`
//! (`GenerateVanillaSchedule`/`GenerateEntropicSchedule`/`UpdateDistribution`)
//! for the exact formulas the distilled spec left implicit.

use rustc_hash::FxHashMap;

use crate::bitmap;
use crate::config::Config;
use crate::corpus::{Corpus, TestcaseId};
use crate::executor::{ExitReason, Executor};
use crate::mutator;
use crate::rng::FuzzRng;

#[derive(Debug, Default)]
pub struct RareFeatures {
    ids: Vec<u64>,
    global_freqs: FxHashMap<u64, u32>,
    pub freq_of_most_abundant_rare_feature: u32,
}

impl RareFeatures {
    /// Bump the global count for `feature_id`; push it onto the rare set
    /// when it is newly below `threshold`.
    pub fn observe(&mut self, feature_id: u64, threshold: u32) {
        let count = self.global_freqs.entry(feature_id).or_insert(0);
        *count += 1;
        if *count <= threshold && !self.ids.contains(&feature_id) {
            self.ids.push(feature_id);
        }
        self.freq_of_most_abundant_rare_feature =
            self.freq_of_most_abundant_rare_feature.max(*count);
    }

    pub fn global_count(&self, feature_id: u64) -> u32 {
        self.global_freqs.get(&feature_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// When `|rare_features| > n` and the most-abundant member exceeds
    /// `cap`, evict the two most abundant entries and downgrade the gauge.
    pub fn maintain(&mut self, n: usize, cap: u32) {
        if self.ids.len() > n && self.freq_of_most_abundant_rare_feature > cap {
            self.ids.sort_by_key(|id| std::cmp::Reverse(self.global_count(*id)));
            for _ in 0..2.min(self.ids.len()) {
                self.ids.remove(0);
            }
            self.freq_of_most_abundant_rare_feature = self
                .ids
                .iter()
                .map(|id| self.global_count(*id))
                .max()
                .unwrap_or(0);
        }
    }

    pub fn global_number_of_features(&self) -> usize {
        self.global_freqs.len()
    }
}

/// §4.H "Energy formula", exact translation of fuzzuf's `updateEnergy`.
pub fn compute_energy(
    feature_freqs: &[(u64, u32)],
    global_number_of_features: usize,
    executed_mutations_count: u64,
    scale_per_exec_time: bool,
    time_of_unit_us: f64,
    avg_unit_time_us: f64,
) -> f64 {
    let m = executed_mutations_count as f64;
    let local = feature_freqs.len();

    let mut energy = 0.0f64;
    let mut sum_incidence = 0.0f64;
    for &(_, c) in feature_freqs {
        let cp1 = c as f64 + 1.0;
        energy -= cp1 * cp1.ln();
        sum_incidence += cp1;
    }
    sum_incidence += (global_number_of_features.saturating_sub(local)) as f64;
    sum_incidence += m + 1.0;

    energy -= (m + 1.0) * (m + 1.0).ln();
    energy = energy / sum_incidence.max(1e-9) + sum_incidence.max(1e-9).ln();

    if scale_per_exec_time && avg_unit_time_us > 0.0 {
        let ratio = time_of_unit_us / avg_unit_time_us;
        let factor = if ratio <= 0.25 {
            300.0
        } else if ratio <= 0.5 {
            200.0
        } else if ratio <= 0.75 {
            150.0
        } else if ratio <= 1.0 {
            100.0
        } else if ratio <= 1.25 {
            75.0
        } else if ratio <= 2.0 {
            50.0
        } else if ratio <= 4.0 {
            25.0
        } else {
            10.0
        };
        energy *= factor;
    }
    energy
}

/// Piecewise-constant distribution over testcase ids. `weights[i]`
/// corresponds to the testcase at `ids[i]`.
pub struct Distribution {
    ids: Vec<TestcaseId>,
    cumulative: Vec<f64>,
}

impl Distribution {
    /// §4.H step 1: entropic energies, zeroed per the two masking rules;
    /// falls back to the vanilla schedule if every weight comes out zero.
    pub fn build(corpus: &Corpus, cfg: &Config, executed_mutations_total: u64) -> Self {
        let ids: Vec<TestcaseId> = corpus.ids_in_order().collect();
        let corpus_size = ids.len().max(1) as f64;
        let mut weights: Vec<f64> = ids
            .iter()
            .map(|&id| {
                let tc = corpus.get(id).unwrap();
                if tc.features_count == 0 {
                    return 0.0;
                }
                let over_budget = tc.executed_mutations_count as f64 / cfg.max_mutation_factor as f64
                    > executed_mutations_total as f64 / corpus_size;
                if over_budget {
                    0.0
                } else {
                    tc.energy.max(0.0)
                }
            })
            .collect();

        if weights.iter().all(|&w| w == 0.0) {
            weights = ids
                .iter()
                .enumerate()
                .map(|(i, &id)| {
                    let tc = corpus.get(id).unwrap();
                    let has_features = tc.features_count > 0;
                    let focus_mult = if tc.flags.has_focus_function { 1000.0 } else { 1.0 };
                    if has_features {
                        (i as f64 + 1.0) * focus_mult
                    } else {
                        0.0
                    }
                })
                .collect();
        }

        if weights.iter().all(|&w| w == 0.0) {
            weights = vec![1.0; ids.len()];
        }

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut acc = 0.0;
        for w in weights {
            acc += w;
            cumulative.push(acc);
        }
        Distribution { ids, cumulative }
    }

    pub fn sample(&self, rng: &mut dyn FuzzRng) -> Option<TestcaseId> {
        if self.ids.is_empty() {
            return None;
        }
        let total = *self.cumulative.last().unwrap();
        if total <= 0.0 {
            return Some(self.ids[rng.below_usize(self.ids.len())]);
        }
        let target = rng.prob() * total;
        let idx = self.cumulative.partition_point(|&c| c < target);
        Some(self.ids[idx.min(self.ids.len() - 1)])
    }
}

pub struct LibFuzzerLoop {
    pub cfg: Config,
    pub corpus: Corpus,
    pub virgin_bits: Vec<u8>,
    pub rare_features: RareFeatures,
    pub max_length: usize,
    pub executed_mutations_total: u64,
    pub last_corpus_update_run: u64,
    pub run_count: u64,
}

impl LibFuzzerLoop {
    pub fn new(cfg: Config) -> Self {
        let map_size = cfg.map_size;
        let output_dir = cfg.output_dir.clone();
        LibFuzzerLoop {
            max_length: cfg.eff_min_len.max(4096),
            corpus: Corpus::new(output_dir),
            virgin_bits: vec![0xFFu8; map_size],
            rare_features: RareFeatures::default(),
            executed_mutations_total: 0,
            last_corpus_update_run: 0,
            run_count: 0,
            cfg,
        }
    }

    pub fn seed(&mut self, bytes: Vec<u8>) -> crate::error::Result<TestcaseId> {
        self.corpus.insert(bytes, 0, false, false)
    }

    /// Steps 1-2: build the distribution and pick+clone a seed.
    pub fn pick_seed(&self, rng: &mut dyn FuzzRng, uniform: bool) -> Option<Vec<u8>> {
        let id = if uniform {
            let ids: Vec<_> = self.corpus.ids_in_order().collect();
            if ids.is_empty() {
                return None;
            }
            ids[rng.below_usize(ids.len())]
        } else {
            let dist = Distribution::build(&self.corpus, &self.cfg, self.executed_mutations_total);
            dist.sample(rng)?
        };
        self.corpus.load_bytes(id).ok()
    }

    /// Step 3: mutation depth loop, including crossover against a second
    /// seed drawn by the same distribution rule.
    pub fn mutate_with_depth(
        &self,
        buf: &mut Vec<u8>,
        rng: &mut dyn FuzzRng,
        user_dict: &[crate::dictionary::DictEntry],
        auto_dict: &[crate::dictionary::DictEntry],
    ) {
        let depth = 1 + rng.below(self.cfg.mutation_depth);
        for _ in 0..depth {
            if !self.corpus.is_empty() && rng.chance_pct(10) {
                if let Some(other) = self.pick_seed(rng, false) {
                    if let Some(spliced) = mutator::splice(buf, &other, rng) {
                        *buf = spliced;
                        continue;
                    }
                }
            }
            mutator::run_havoc(buf, user_dict, auto_dict, &self.cfg, 1, rng);
            if buf.len() > self.max_length {
                buf.truncate(self.max_length);
            }
        }
    }

    /// Steps 4-6: execute, compute the feature set, admit or replace, and
    /// maintain the rare-feature set.
    pub fn execute_and_admit(
        &mut self,
        executor: &mut dyn Executor,
        candidate: Vec<u8>,
    ) -> Option<TestcaseId> {
        self.run_count += 1;
        let timeout_ms = self.cfg.tmout_limit as u64;
        let result = executor.run(&candidate, timeout_ms);
        if result.exit_reason != ExitReason::None {
            return None;
        }
        let exec_us = result.exec_us;
        let mut classified = result.trace.to_vec();
        bitmap::classify(&mut classified);

        let mut feature_ids = Vec::new();
        bitmap::enumerate_features(&classified, 0, |fid| feature_ids.push(fid));
        if feature_ids.is_empty() {
            return None;
        }

        let threshold = self.cfg.feature_frequency_threshold;
        for &fid in &feature_ids {
            self.rare_features.observe(fid, threshold);
        }
        self.rare_features
            .maintain(self.cfg.number_of_rarest_features, threshold);

        // Replace-if-shrink: an existing testcase whose unique_feature_set
        // exactly matches this candidate's, strictly shorter.
        if self.cfg.shrink {
            let matching = self.corpus.ids_in_order().find(|&id| {
                self.corpus
                    .get(id)
                    .map(|tc| {
                        tc.unique_feature_set.len() == feature_ids.len()
                            && tc.unique_feature_set.iter().all(|f| feature_ids.contains(f))
                    })
                    .unwrap_or(false)
            });
            if let Some(id) = matching {
                let existing_len = self.corpus.get(id).unwrap().input_size;
                if candidate.len() < existing_len {
                    let _ = self.corpus.replace(id, candidate.clone());
                    self.last_corpus_update_run = self.run_count;
                    self.maybe_grow_max_length();
                    return Some(id);
                }
                return None;
            }
        }

        let energy = if self.rare_features.is_empty() {
            1.0
        } else {
            (self.rare_features.len() as f64).ln().max(0.0)
        };

        let id = self.corpus.insert(candidate, 0, false, false).ok()?;
        if let Some(tc) = self.corpus.get_mut(id) {
            tc.exec_us = exec_us;
            tc.features_count = feature_ids.len();
            tc.unique_feature_set = feature_ids.clone();
            tc.energy = energy;
            tc.needs_energy_update = false;
            for &fid in &feature_ids {
                tc.feature_freqs.bump(fid);
            }
        }
        self.last_corpus_update_run = self.run_count;
        self.maybe_grow_max_length();
        Some(id)
    }

    /// Step 7: length control.
    fn maybe_grow_max_length(&mut self) {
        let ml = self.max_length.max(2) as f64;
        let threshold = self.cfg.len_control * ml.ln();
        if (self.run_count - self.last_corpus_update_run) as f64 > threshold {
            let grown = self.max_length + ml.ln().ceil() as usize;
            self.max_length = grown.min(self.cfg.max_length_cap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FakeExecutor;

    #[test]
    fn energy_is_finite_for_typical_inputs() {
        let e = compute_energy(&[(1, 3), (2, 0)], 100, 10, false, 0.0, 0.0);
        assert!(e.is_finite());
    }

    #[test]
    fn energy_is_monotonic_in_feature_frequency() {
        // P8: decreasing one non-zero feature_freqs entry by 1 can only
        // increase or hold the computed energy.
        let before = compute_energy(&[(1, 5), (2, 3)], 50, 20, false, 0.0, 0.0);
        let after = compute_energy(&[(1, 4), (2, 3)], 50, 20, false, 0.0, 0.0);
        assert!(after >= before);
    }

    #[test]
    fn rare_features_evicts_when_over_cap() {
        let mut rf = RareFeatures::default();
        for i in 0..5 {
            rf.observe(i, 10);
        }
        rf.freq_of_most_abundant_rare_feature = 11;
        rf.maintain(2, 10);
        assert!(rf.len() <= 3);
    }

    #[test]
    fn execute_and_admit_requires_nonempty_feature_set() {
        let mut loop_ = LibFuzzerLoop::new(Config::default());
        let mut exec = FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(|_input, trace, _out| {
                trace.extend_from_slice(&[0, 0, 0]);
                (ExitReason::None, None, 5)
            }),
        };
        let admitted = loop_.execute_and_admit(&mut exec, b"xyz".to_vec());
        assert!(admitted.is_none());
    }

    #[test]
    fn execute_and_admit_accepts_new_coverage() {
        let mut loop_ = LibFuzzerLoop::new(Config::default());
        let mut exec = FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(|_input, trace, _out| {
                trace.extend_from_slice(&[1, 0, 2]);
                (ExitReason::None, None, 5)
            }),
        };
        let admitted = loop_.execute_and_admit(&mut exec, b"xyz".to_vec());
        assert!(admitted.is_some());
    }

    #[test]
    fn shrink_replaces_bytes_but_keeps_id() {
        // S6: two inputs with an identical feature set, lengths 10 and 7.
        // After admitting the length-7 one under `shrink`, the length-10
        // id is preserved but its bytes and sha1 become the shorter one's.
        let mut cfg = Config::default();
        cfg.shrink = true;
        let mut loop_ = LibFuzzerLoop::new(cfg);

        let same_trace = |_input: &[u8], trace: &mut Vec<u8>, _out: &mut Vec<u8>| {
            trace.extend_from_slice(&[1, 0, 2]);
            (ExitReason::None, None, 5)
        };

        let mut exec_long = FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(same_trace),
        };
        let long_input = vec![b'A'; 10];
        let id = loop_
            .execute_and_admit(&mut exec_long, long_input.clone())
            .expect("length-10 input admits as a fresh entry");

        let mut exec_short = FakeExecutor {
            trace_buf: Vec::new(),
            std_out_buf: Vec::new(),
            oracle: Box::new(same_trace),
        };
        let short_input = vec![b'B'; 7];
        let shrunk_id = loop_
            .execute_and_admit(&mut exec_short, short_input.clone())
            .expect("shrink replaces the existing entry");

        assert_eq!(shrunk_id, id);
        let tc = loop_.corpus.get(id).unwrap();
        assert_eq!(tc.input_size, 7);
        assert_eq!(
            loop_.corpus.find_by_sha1(&crate::corpus::sha1_of(&short_input)),
            Some(id)
        );
        assert_eq!(
            loop_.corpus.find_by_sha1(&crate::corpus::sha1_of(&long_input)),
            None
        );
    }
}
