//! Thin CLI entry point. CLI/config parsing, process spawning, and
//! fork-server wiring are all named in spec.md §1 as external
//! collaborators to the core engine; this binary is the reference
//! wiring, not part of the engine crate itself.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use clap::Parser;
use console::Term;

use fuzzcore::config::{Config, FuzzMode};
use fuzzcore::executor::{ExecResult, ExitReason, Executor};
use fuzzcore::pretty_printing::{log, print_stats, LogType};
use fuzzcore::rng::StdFuzzRng;
use fuzzcore::{afl_loop::AflLoop, run_afl_cycle, Statistics};

#[derive(Parser, Debug)]
#[command(name = "fuzzcore", about = "Coverage-guided greybox fuzzer")]
struct Cli {
    /// Program under test and its arguments, `@@` is replaced with the input path.
    #[arg(required = true)]
    target: Vec<String>,

    /// Directory of initial seed files.
    #[arg(short = 'i', long)]
    input_dir: PathBuf,

    /// Output directory for queue/crashes/hangs.
    #[arg(short = 'o', long, default_value = "out")]
    output_dir: PathBuf,

    /// Per-run timeout in milliseconds.
    #[arg(short = 't', long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Path to a coverage-trace file the PUT is expected to write each
    /// run (the shared-memory/fork-server ABI is out of scope per
    /// spec.md §1; this is the simplest file-based stand-in).
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Print one status line per update instead of the live dashboard.
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Spawns `target` once per run, feeding the mutated input via a scratch
/// file (`cur_input`) and reading the PUT's coverage trace back from
/// `trace_file` if one was configured. This is the reference adapter for
/// [`Executor`]; real deployments will swap in a persistent fork server.
struct ProcessExecutor {
    target: Vec<String>,
    cur_input: PathBuf,
    trace_file: Option<PathBuf>,
    map_size: usize,
    trace_buf: Vec<u8>,
    std_out_buf: Vec<u8>,
}

impl Executor for ProcessExecutor {
    fn run(&mut self, input: &[u8], timeout_ms: u64) -> ExecResult<'_> {
        let _ = fs::write(&self.cur_input, input);

        let args: Vec<String> = self
            .target
            .iter()
            .skip(1)
            .map(|a| {
                if a == "@@" {
                    self.cur_input.to_string_lossy().to_string()
                } else {
                    a.clone()
                }
            })
            .collect();

        let start = Instant::now();
        let output = Command::new(&self.target[0]).args(&args).output();
        let exec_us = start.elapsed().as_micros() as u64;

        self.trace_buf.clear();
        self.trace_buf.resize(self.map_size, 0);
        if let Some(trace_path) = &self.trace_file {
            if let Ok(bytes) = fs::read(trace_path) {
                let n = bytes.len().min(self.map_size);
                self.trace_buf[..n].copy_from_slice(&bytes[..n]);
            }
        }

        let (exit_reason, signal, std_out) = match output {
            Ok(out) => {
                self.std_out_buf = out.stdout;
                let timed_out = exec_us > timeout_ms * 1000;
                if timed_out {
                    (ExitReason::Timeout, None, &self.std_out_buf)
                } else if !out.status.success() {
                    (ExitReason::Crash, out.status.code(), &self.std_out_buf)
                } else {
                    (ExitReason::None, None, &self.std_out_buf)
                }
            }
            Err(_) => {
                self.std_out_buf.clear();
                (ExitReason::Error, None, &self.std_out_buf)
            }
        };

        ExecResult {
            exit_reason,
            signal,
            trace: &self.trace_buf,
            std_out,
            exec_us,
        }
    }
}

fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::default();
    cfg.mode = FuzzMode::Afl;
    cfg.output_dir = cli.output_dir.clone();
    cfg.tmout_limit = cli.timeout_ms as u32;
    cfg.verbose = cli.verbose;

    fs::create_dir_all(cfg.output_dir.join("queue"))?;
    fs::create_dir_all(cfg.output_dir.join("crashes"))?;
    fs::create_dir_all(cfg.output_dir.join("hangs"))?;

    let mut fuzzer = AflLoop::new(cfg.clone());
    for entry in fs::read_dir(&cli.input_dir)? {
        let path = entry?.path();
        if path.is_file() {
            let bytes = fs::read(&path)?;
            fuzzer.seed(bytes).ok();
        }
    }
    if fuzzer.corpus.is_empty() {
        log(true, LogType::Failure, "no seed files found in input directory");
        std::process::exit(1);
    }

    let mut executor = ProcessExecutor {
        target: cli.target,
        cur_input: cfg.output_dir.join("cur_input"),
        trace_file: cli.trace_file,
        map_size: cfg.map_size,
        trace_buf: Vec::new(),
        std_out_buf: Vec::new(),
    };

    let mut rng = StdFuzzRng::from_entropy();
    let term = Term::buffered_stdout();
    term.clear_screen().ok();

    let start = Instant::now();
    let mut last_print = Instant::now();

    loop {
        run_afl_cycle(&mut fuzzer, &mut executor, &mut rng, &|| false);

        if last_print.elapsed() >= Duration::from_millis(500) {
            let stats = Statistics {
                total_execs: fuzzer.stats.total_execs,
                crashes_unique: fuzzer.stats.crashes_unique,
                hangs_unique: fuzzer.stats.hangs_unique,
                edges_found: fuzzer.virgin_bits.iter().filter(|&&b| b != 0xFF).count(),
                corpus_size: fuzzer.corpus.len(),
                run_time_secs: start.elapsed().as_secs_f64(),
            };
            print_stats(&term, &stats, &cfg);
            stats.write_json(&cfg.output_dir.join("stats.json")).ok();
            last_print = Instant::now();
        }
    }
}
