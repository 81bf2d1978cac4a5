//! Tunable constants, carried over from the teacher's `config.rs` but
//! generalized from free-standing `pub const`s into a struct, since the
//! engine is a library embedded by a caller rather than a single process
//! with one global configuration.
//!
//! Defaults reproduce spec.md §6 ("Constants (defaults)") exactly.

use std::path::PathBuf;

/// Which outer loop drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzMode {
    /// §4.G AFL-style deterministic -> havoc -> splice pipeline.
    Afl,
    /// §4.H entropic/random-stacked libFuzzer-style loop.
    LibFuzzer,
    /// §4.I fan out to N executors, novelty over the output tuple.
    Differential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalMode {
    Normal,
    Long,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: FuzzMode,
    pub output_dir: PathBuf,

    /// Size of the edge-hit bitmap. Default 1<<16.
    pub map_size: usize,
    /// Maximum accepted input size. Default 1 MiB.
    pub max_file: usize,

    /// Maximum stacking power for havoc (`2^n` tweaks per batch). Default 7.
    pub havoc_stack_pow2: u32,
    pub havoc_blk_small: usize,
    pub havoc_blk_medium: usize,
    pub havoc_blk_large: usize,
    pub havoc_blk_xl: usize,
    /// Baseline havoc cycle count once past the deterministic stages.
    pub havoc_cycles: u32,
    /// Havoc cycle count while still in the deterministic phase.
    pub havoc_cycles_init: u32,
    pub havoc_max_mult: u32,

    /// Maximum |delta| for arithmetic mutation stages. Default 35.
    pub arith_max: u32,

    pub splice_cycles: u32,
    pub splice_havoc: u32,

    pub cal_cycles: u32,
    pub cal_cycles_long: u32,
    pub cal_chances: u32,
    pub cal_tmout_perc: u32,
    pub cal_tmout_add_ms: u32,

    pub tmout_limit: u32,

    pub keep_unique_hang: usize,
    pub keep_unique_crash: usize,

    pub use_auto_extras: usize,
    pub max_auto_extras: usize,
    pub max_det_extras: usize,
    pub min_auto_extra: usize,
    pub max_auto_extra: usize,

    pub eff_map_scale2: u32,
    pub eff_min_len: usize,
    pub eff_max_perc: u32,

    pub trim_min_bytes: usize,
    pub trim_start_steps: u32,
    pub trim_end_steps: u32,

    pub skip_to_new_prob: u32,
    pub skip_nfav_old_prob: u32,
    pub skip_nfav_new_prob: u32,

    /// libFuzzer: rarest-feature set target size. Default 100.
    pub number_of_rarest_features: usize,
    /// libFuzzer: global feature-count threshold for rare-feature membership.
    pub feature_frequency_threshold: u32,
    /// libFuzzer: maximum mutation depth per outer cycle. Default 5.
    pub mutation_depth: u32,
    /// libFuzzer: per-seed mutation budget ceiling divisor.
    pub max_mutation_factor: u32,
    /// libFuzzer: scale energy by execution-time variance.
    pub scale_per_exec_time: bool,
    /// libFuzzer: replace-if-shrink mode.
    pub shrink: bool,
    /// libFuzzer: how fast max_length is allowed to grow.
    pub len_control: f64,
    pub max_length_cap: usize,

    /// Differential: compare by output hash tuple vs. exit-status tuple.
    pub differential_use_output_hash: bool,

    /// Skip the deterministic stage pipeline entirely (AFL `-d`-style).
    pub skip_deterministic: bool,
    pub use_splicing: bool,
    pub run_over_10m: bool,

    /// Parallel master/slave partitioning (AFL `-M`/`-S`); 1/1 = solo.
    pub master_max: u32,
    pub master_id: u32,

    pub status_update_interval: u64,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: FuzzMode::Afl,
            output_dir: PathBuf::from("out"),

            map_size: 1 << 16,
            max_file: 1024 * 1024,

            havoc_stack_pow2: 7,
            havoc_blk_small: 32,
            havoc_blk_medium: 128,
            havoc_blk_large: 1500,
            havoc_blk_xl: 32768,
            havoc_cycles: 256,
            havoc_cycles_init: 1024,
            havoc_max_mult: 16,

            arith_max: 35,

            splice_cycles: 15,
            splice_havoc: 32,

            cal_cycles: 8,
            cal_cycles_long: 40,
            cal_chances: 3,
            cal_tmout_perc: 125,
            cal_tmout_add_ms: 50,

            tmout_limit: 250,

            keep_unique_hang: 500,
            keep_unique_crash: 5000,

            use_auto_extras: 50,
            max_auto_extras: 500,
            max_det_extras: 200,
            min_auto_extra: 3,
            max_auto_extra: 32,

            eff_map_scale2: 3,
            eff_min_len: 128,
            eff_max_perc: 90,

            trim_min_bytes: 4,
            trim_start_steps: 16,
            trim_end_steps: 1024,

            skip_to_new_prob: 99,
            skip_nfav_old_prob: 95,
            skip_nfav_new_prob: 75,

            number_of_rarest_features: 100,
            feature_frequency_threshold: 0xFF,
            mutation_depth: 5,
            max_mutation_factor: 20,
            scale_per_exec_time: false,
            shrink: false,
            len_control: 100.0,
            max_length_cap: 1 << 20,

            differential_use_output_hash: true,

            skip_deterministic: false,
            use_splicing: true,
            run_over_10m: false,

            master_max: 1,
            master_id: 1,

            status_update_interval: 1000,
            verbose: false,
        }
    }
}

impl Config {
    pub fn cal_cycles(&self, mode: CalMode) -> u32 {
        match mode {
            CalMode::Normal => self.cal_cycles,
            CalMode::Long => self.cal_cycles_long,
        }
    }
}
