//! §4.C Dictionary: user dict (immutable after load) and auto dict
//! (learned during bitflip-1/1), sharing one entry shape, plus the
//! dict-file parser from §6 "External interfaces".

use crate::error::{FuzzError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEntry {
    pub bytes: Vec<u8>,
    pub hit_count: u64,
    pub use_count: u64,
    pub position_hint: Option<usize>,
}

impl DictEntry {
    pub fn new(bytes: Vec<u8>) -> Self {
        DictEntry {
            bytes,
            hit_count: 0,
            use_count: 0,
            position_hint: None,
        }
    }
}

/// Held sorted by byte length ascending (§3) so deterministic dict stages
/// can early-exit once an entry no longer fits.
#[derive(Debug, Clone, Default)]
pub struct UserDict {
    entries: Vec<DictEntry>,
}

impl UserDict {
    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_sorted(&mut self, entry: DictEntry) {
        let pos = self
            .entries
            .partition_point(|e| e.bytes.len() <= entry.bytes.len());
        self.entries.insert(pos, entry);
    }

    /// Parse a dict file per §6: `name[@level]="bytes"` or bare `"bytes"`,
    /// blank lines and `#`-comments ignored. Entries whose `@level` is
    /// above `max_level` are skipped. In `strict` mode, only printable
    /// bytes are accepted and overly long entries are rejected.
    pub fn parse(text: &str, max_level: u32, strict: bool, max_len: usize) -> Result<UserDict> {
        let mut dict = UserDict::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name_part, rhs) = match line.split_once('=') {
                Some((n, r)) => (Some(n.trim()), r.trim()),
                None => (None, line),
            };

            let level = match name_part {
                Some(n) if n.contains('@') => {
                    let (_, lvl) = n.split_once('@').unwrap();
                    lvl.parse::<u32>().map_err(|_| FuzzError::DictParse {
                        line: lineno + 1,
                        reason: format!("invalid level `{lvl}`"),
                    })?
                }
                _ => 0,
            };
            if level > max_level {
                continue;
            }

            let quoted = rhs.strip_prefix('"').and_then(|s| s.strip_suffix('"')).ok_or(
                FuzzError::DictParse {
                    line: lineno + 1,
                    reason: "expected a quoted string".to_string(),
                },
            )?;

            let bytes = unescape(quoted, lineno + 1)?;
            if bytes.is_empty() {
                continue;
            }
            if strict {
                if bytes.iter().any(|&b| !(0x20..=0x7e).contains(&b)) {
                    return Err(FuzzError::DictParse {
                        line: lineno + 1,
                        reason: "non-printable byte in strict mode".to_string(),
                    });
                }
                if bytes.len() > max_len {
                    return Err(FuzzError::DictParse {
                        line: lineno + 1,
                        reason: format!("entry exceeds max length {max_len}"),
                    });
                }
            }
            dict.insert_sorted(DictEntry::new(bytes));
        }
        Ok(dict)
    }
}

fn unescape(s: &str, lineno: usize) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'\\' => {
                    out.push(b'\\');
                    i += 2;
                }
                b'"' => {
                    out.push(b'"');
                    i += 2;
                }
                b'x' if i + 3 < bytes.len() => {
                    let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).map_err(|_| {
                        FuzzError::DictParse {
                            line: lineno,
                            reason: "invalid \\xNN escape".to_string(),
                        }
                    })?;
                    let v = u8::from_str_radix(hex, 16).map_err(|_| FuzzError::DictParse {
                        line: lineno,
                        reason: format!("invalid hex escape `{hex}`"),
                    })?;
                    out.push(v);
                    i += 4;
                }
                _ => {
                    return Err(FuzzError::DictParse {
                        line: lineno,
                        reason: "unrecognized escape sequence".to_string(),
                    });
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// Interesting-integer patterns to skip when learning auto-dict entries,
/// per §4.C ("skip entries matching any built-in interesting-integer
/// pattern").
fn is_interesting_integer(bytes: &[u8]) -> bool {
    use crate::mutator::{INTERESTING_8, INTERESTING_16, INTERESTING_32};
    match bytes.len() {
        1 => INTERESTING_8.contains(&(bytes[0] as i8)),
        2 => {
            let le = i16::from_le_bytes([bytes[0], bytes[1]]);
            let be = i16::from_be_bytes([bytes[0], bytes[1]]);
            INTERESTING_16.contains(&le) || INTERESTING_16.contains(&be)
        }
        4 => {
            let le = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let be = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            INTERESTING_32.contains(&le) || INTERESTING_32.contains(&be)
        }
        _ => false,
    }
}

fn case_insensitive_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// Learned during bitflip-1/1, capped at `MAX_AUTO_EXTRAS` (I7), evicting
/// randomly over the bottom half (by `hit_count`) when full.
#[derive(Debug, Clone, Default)]
pub struct AutoDict {
    entries: Vec<DictEntry>,
    max_entries: usize,
}

impl AutoDict {
    pub fn new(max_entries: usize) -> Self {
        AutoDict {
            entries: Vec::new(),
            max_entries,
        }
    }

    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by `hit_count` desc; the first `use_auto_extras` are
    /// further sorted by length ascending for fuzzing use, per §3.
    pub fn for_fuzzing(&self, use_auto_extras: usize) -> Vec<&DictEntry> {
        let mut by_hits: Vec<&DictEntry> = self.entries.iter().collect();
        by_hits.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        let mut head: Vec<&DictEntry> = by_hits.into_iter().take(use_auto_extras).collect();
        head.sort_by_key(|e| e.bytes.len());
        head
    }

    /// Insert candidate bytes collected during bitflip-1/1, subject to the
    /// length filter, dedup, and interesting-integer skip from §4.C.
    pub fn offer(
        &mut self,
        bytes: Vec<u8>,
        min_len: usize,
        max_len: usize,
        rng: &mut dyn crate::rng::FuzzRng,
    ) {
        if bytes.len() < min_len || bytes.len() > max_len {
            return;
        }
        if is_interesting_integer(&bytes) {
            return;
        }
        if self
            .entries
            .iter()
            .any(|e| case_insensitive_eq(&e.bytes, &bytes))
        {
            return;
        }

        if self.entries.len() >= self.max_entries {
            self.evict_one(rng);
        }
        self.entries.push(DictEntry::new(bytes));
    }

    pub fn record_hit(&mut self, idx: usize) {
        if let Some(e) = self.entries.get_mut(idx) {
            e.hit_count += 1;
        }
    }

    fn evict_one(&mut self, rng: &mut dyn crate::rng::FuzzRng) {
        if self.entries.is_empty() {
            return;
        }
        let mut idxs: Vec<usize> = (0..self.entries.len()).collect();
        idxs.sort_by_key(|&i| self.entries[i].hit_count);
        let bottom_half = idxs.len().div_ceil(2).max(1);
        let victim_pos = rng.below_usize(bottom_half);
        let victim = idxs[victim_pos];
        self.entries.remove(victim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::StdFuzzRng;

    #[test]
    fn parses_named_and_bare_entries() {
        let text = "# comment\nfoo=\"\\x41\\x42\"\n\"bar\"\n";
        let d = UserDict::parse(text, 0, false, 128).unwrap();
        assert_eq!(d.entries().len(), 2);
        assert!(d.entries().iter().any(|e| e.bytes == b"AB"));
        assert!(d.entries().iter().any(|e| e.bytes == b"bar"));
    }

    #[test]
    fn entries_sorted_by_length_ascending() {
        let text = "\"aaaaa\"\n\"a\"\n\"aaa\"\n";
        let d = UserDict::parse(text, 0, false, 128).unwrap();
        let lens: Vec<_> = d.entries().iter().map(|e| e.bytes.len()).collect();
        assert_eq!(lens, vec![1, 3, 5]);
    }

    #[test]
    fn level_above_threshold_is_skipped() {
        let text = "a@5=\"x\"\n";
        let d = UserDict::parse(text, 0, false, 128).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn strict_mode_rejects_nonprintable() {
        let text = "\"\\x01\"\n";
        let err = UserDict::parse(text, 0, true, 128);
        assert!(err.is_err());
    }

    #[test]
    fn auto_dict_rejects_out_of_range_length() {
        let mut rng = StdFuzzRng::new(1);
        let mut ad = AutoDict::new(10);
        ad.offer(vec![1, 2], 3, 32, &mut rng);
        assert!(ad.is_empty());
    }

    #[test]
    fn auto_dict_dedups_case_insensitively() {
        let mut rng = StdFuzzRng::new(1);
        let mut ad = AutoDict::new(10);
        ad.offer(b"ABCDEF".to_vec(), 3, 32, &mut rng);
        ad.offer(b"abcdef".to_vec(), 3, 32, &mut rng);
        assert_eq!(ad.entries().len(), 1);
    }

    #[test]
    fn auto_dict_evicts_when_full() {
        let mut rng = StdFuzzRng::new(1);
        let mut ad = AutoDict::new(2);
        ad.offer(b"aaa".to_vec(), 3, 32, &mut rng);
        ad.offer(b"bbb".to_vec(), 3, 32, &mut rng);
        ad.offer(b"ccc".to_vec(), 3, 32, &mut rng);
        assert_eq!(ad.entries().len(), 2);
    }
}
