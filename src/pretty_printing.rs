//! Live stats screen, kept in the teacher's style (ANSI color wrappers +
//! a `console::Term` cursor-addressed dashboard) but generalized from the
//! teacher's build-time `DEBUG_PRINT` const to the runtime `Config.verbose`
//! flag, since this engine is a library embedded by a caller rather than a
//! single fixed binary.

use core::fmt;

use console::Term;
use num_format::{Locale, ToFormattedString};

use crate::config::Config;
use crate::format::describe_integer;
use crate::Statistics;

/// Different log-types that can be used to print out messages in different colors.
pub enum LogType {
    Neutral = 0,
    Success = 1,
    Failure = 2,
}

/// Color a string green.
pub struct Green(pub &'static str);
impl fmt::Display for Green {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[32m{}\x1B[0m", self.0)
    }
}

/// Color a string blue.
pub struct Blue(pub &'static str);
impl fmt::Display for Blue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[34m{}\x1B[0m", self.0)
    }
}

/// Color a string red.
pub struct Red(pub &'static str);
impl fmt::Display for Red {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\x1B[31m{}\x1B[0m", self.0)
    }
}

/// Small wrapper to print out colored log messages, gated by `verbose`.
pub fn log(verbose: bool, color: LogType, msg: &str) {
    if !verbose {
        return;
    }
    match color {
        LogType::Neutral => println!("{} {}", Blue("[-]"), msg),
        LogType::Success => println!("{} {}", Green("[+]"), msg),
        LogType::Failure => println!("{} {}", Red("[!]"), msg),
    }
}

/// Print out statistics in a nicely formatted static screen.
fn pretty_stats(term: &Term, stats: &Statistics, cfg: &Config) {
    term.move_cursor_to(0, 2).ok();
    term.write_line(&format!("{}", Green("\t\t[ fuzzcore ]\n"))).ok();

    term.write_line(&format!(
        "\t{}\n\t   Run time [sec]: {:8.2}\n\t   Total fuzz cases: {:12}",
        Blue("Progression"),
        stats.run_time_secs,
        describe_integer(stats.total_execs),
    ))
    .ok();

    term.move_cursor_to(54, 4).ok();
    term.write_line(&format!("{}", Blue("Overall Results"))).ok();
    term.move_cursor_to(54, 5).ok();
    term.write_line(&format!("   Unique Crashes: {}", stats.crashes_unique)).ok();
    term.move_cursor_to(54, 6).ok();
    term.write_line(&format!("   Unique Hangs: \t{}", stats.hangs_unique)).ok();

    term.move_cursor_down(2).ok();
    let execs_per_sec = if stats.run_time_secs > 0.0 {
        (stats.total_execs as f64 / stats.run_time_secs) as u64
    } else {
        0
    };
    term.write_line(&format!(
        "\t{}\n\t   Executions per second: {:12}",
        Blue("Performance measurements"),
        execs_per_sec.to_formatted_string(&Locale::en),
    ))
    .ok();

    term.move_cursor_to(54, 10).ok();
    term.write_line(&format!("{}", Blue("Coverage"))).ok();
    term.move_cursor_to(54, 11).ok();
    term.write_line(&format!("   Edges hit: {}", stats.edges_found)).ok();

    term.move_cursor_down(2).ok();
    term.write_line(&format!(
        "\t{}\n\t   Mode: {:?}\n\t   Timeout (ms): {}",
        Blue("Config"),
        cfg.mode,
        cfg.tmout_limit,
    ))
    .ok();

    term.move_cursor_to(54, 14).ok();
    term.write_line(&format!("{}", Blue("Corpus"))).ok();
    term.move_cursor_to(54, 15).ok();
    term.write_line(&format!("   Size: {}", stats.corpus_size)).ok();

    term.flush().ok();
}

/// Simple line-oriented view of statistics, used when `verbose` is set
/// (the teacher's `DEBUG_PRINT` toggled the same fallback for environments
/// without a real terminal).
fn basic_stats(stats: &Statistics) {
    println!(
        "[{:8.2}] fuzz cases: {:12} : edges: {:6} : crashes: {:8} : hangs: {:8}",
        stats.run_time_secs,
        describe_integer(stats.total_execs),
        stats.edges_found,
        stats.crashes_unique,
        stats.hangs_unique,
    );
}

/// Wrapper for actual stat-printing functions.
pub fn print_stats(term: &Term, stats: &Statistics, cfg: &Config) {
    if cfg.verbose {
        basic_stats(stats);
    } else {
        pretty_stats(term, stats, cfg);
    }
}
