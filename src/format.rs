//! Compact human-readable number formatting for the stats screen, grounded
//! on fuzzuf's `afl::util::DescribeInteger` / `DescribeMemorySize`
//! (`algorithms/afl_common/afl_util.cpp`).

/// Format a count as AFL does: `0-9999` verbatim, then `12.3k`, `4.56M`, ...
pub fn describe_integer(val: u64) -> String {
    let v = val as f64;
    if val < 10_000 {
        return val.to_string();
    }
    if v < 1000.0 * 99.95 {
        return format!("{:.1}k", v / 1000.0);
    }
    if v < 1000.0 * 1000.0 {
        return format!("{}k", val / 1000);
    }
    if v < 1_000_000.0 * 9.995 {
        return format!("{:.2}M", v / 1_000_000.0);
    }
    if v < 1_000_000.0 * 99.95 {
        return format!("{:.1}M", v / 1_000_000.0);
    }
    if v < 1_000_000.0 * 1000.0 {
        return format!("{}M", val / 1_000_000);
    }
    if v < 1e9 * 9.995 {
        return format!("{:.2}G", v / 1e9);
    }
    if v < 1e9 * 99.95 {
        return format!("{:.1}G", v / 1e9);
    }
    if v < 1e9 * 1000.0 {
        return format!("{}G", val / 1_000_000_000);
    }
    "infty".to_string()
}

/// Format a byte count with binary (1024-based) units.
pub fn describe_memory_size(val: u64) -> String {
    let v = val as f64;
    if val < 10_000 {
        return format!("{val} B");
    }
    if v < 1024.0 * 99.95 {
        return format!("{:.1} kB", v / 1024.0);
    }
    if v < 1024.0 * 1000.0 {
        return format!("{} kB", val / 1024);
    }
    if v < 1024.0 * 1024.0 * 9.995 {
        return format!("{:.2} MB", v / (1024.0 * 1024.0));
    }
    if v < 1024.0 * 1024.0 * 99.95 {
        return format!("{:.1} MB", v / (1024.0 * 1024.0));
    }
    if v < 1024.0 * 1024.0 * 1000.0 {
        return format!("{} MB", val / (1024 * 1024));
    }
    format!("{:.2} GB", v / (1024.0 * 1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_counts_are_verbatim() {
        assert_eq!(describe_integer(42), "42");
        assert_eq!(describe_integer(9999), "9999");
    }

    #[test]
    fn thousands_get_k_suffix() {
        assert_eq!(describe_integer(12_300), "12.3k");
    }

    #[test]
    fn millions_get_m_suffix() {
        assert_eq!(describe_integer(4_560_000), "4.56M");
    }
}
