//! §4.A Bitmap & Feature Module.
//!
//! Owns the count-class lookup tables, the classify/simplify bitmap
//! transforms, the virgin-bits fold (`has_new_bits`), libFuzzer-style
//! feature enumeration, and the top-rated/favored bookkeeping that feeds
//! queue culling (§4.E).
//!
//! Hot-path routines (`classify`, `has_new_bits`) must not allocate; they
//! operate directly on caller-owned slices.

use std::sync::OnceLock;

/// A hit count, coarsened into one of the AFL buckets
/// `{0,1,2,4,8,16,32,64,128}`.
type Bucket = u8;

/// The two lookup tables computed once at process lifetime: a byte-wise
/// bucket classifier and its little-endian byte-pair composition, so a
/// 16-bit word can be classified with a single table probe.
pub struct CountClasses {
    pub lookup8: [Bucket; 256],
    pub lookup16: [u16; 65536],
    /// Collapses any non-zero byte to 128 and zero to 1; used only for
    /// crash/timeout uniqueness (`simplify`).
    pub simplify8: [u8; 256],
}

fn bucket_of_raw(count: u32) -> Bucket {
    match count {
        0 => 0,
        1 => 1,
        2 => 2,
        3..=4 => 4,
        5..=8 => 8,
        9..=16 => 16,
        17..=32 => 32,
        33..=64 => 64,
        _ => 128,
    }
}

fn build_count_classes() -> CountClasses {
    let mut lookup8 = [0u8; 256];
    for (i, slot) in lookup8.iter_mut().enumerate() {
        *slot = bucket_of_raw(i as u32);
    }

    let mut lookup16 = [0u16; 65536];
    for hi in 0..256usize {
        for lo in 0..256usize {
            let idx = (hi << 8) | lo;
            // Little-endian byte pair: low byte first.
            let classified_lo = lookup8[lo] as u16;
            let classified_hi = lookup8[hi] as u16;
            lookup16[idx] = classified_lo | (classified_hi << 8);
        }
    }

    let mut simplify8 = [1u8; 256];
    simplify8[0] = 1;
    for (i, slot) in simplify8.iter_mut().enumerate().skip(1) {
        *slot = 128;
        let _ = i;
    }

    CountClasses {
        lookup8,
        lookup16,
        simplify8,
    }
}

static COUNT_CLASSES: OnceLock<CountClasses> = OnceLock::new();

/// Process-lifetime count-class tables (spec.md §9: "stay process-lifetime
/// constants").
pub fn count_classes() -> &'static CountClasses {
    COUNT_CLASSES.get_or_init(build_count_classes)
}

/// Replace every raw hit count in `trace` with its bucket id, operating in
/// 16-bit words. Idempotent (P1): `classify(classify(t)) == classify(t)`,
/// since the bucket ids are themselves fixed points of the lookup table.
pub fn classify(trace: &mut [u8]) {
    let tables = count_classes();
    let mut i = 0;
    let len = trace.len();
    while i + 1 < len {
        let word = u16::from_le_bytes([trace[i], trace[i + 1]]);
        if word != 0 {
            let classified = tables.lookup16[word as usize];
            let bytes = classified.to_le_bytes();
            trace[i] = bytes[0];
            trace[i + 1] = bytes[1];
        }
        i += 2;
    }
    if i < len && trace[i] != 0 {
        trace[i] = tables.lookup8[trace[i] as usize];
    }
}

/// Replace every non-zero byte with 128 and every zero byte with 1. Used
/// only to key crash/timeout uniqueness.
pub fn simplify(trace: &[u8], out: &mut Vec<u8>) {
    let tables = count_classes();
    out.clear();
    out.reserve(trace.len());
    out.extend(trace.iter().map(|&b| tables.simplify8[b as usize]));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewBitsVerdict {
    /// Nothing new: every edge/bucket already observed.
    None,
    /// A previously hit edge reached a new bucket.
    Hit,
    /// A virgin edge was reached.
    NewEdge,
}

/// Fold `trace` (already classified) against `virgin` in place. Returns the
/// strongest verdict observed across the whole map and clears the
/// corresponding virgin bits. Must not allocate (hot path, P2).
pub fn has_new_bits(trace: &[u8], virgin: &mut [u8]) -> NewBitsVerdict {
    debug_assert_eq!(trace.len(), virgin.len());
    let mut verdict = NewBitsVerdict::None;

    const WORD: usize = std::mem::size_of::<usize>();
    let len = trace.len();
    let mut i = 0;

    while i + WORD <= len {
        let t_word = usize::from_ne_bytes(trace[i..i + WORD].try_into().unwrap());
        if t_word != 0 {
            let v_word = usize::from_ne_bytes(virgin[i..i + WORD].try_into().unwrap());
            if t_word & v_word != 0 {
                for k in 0..WORD {
                    let t = trace[i + k];
                    if t == 0 {
                        continue;
                    }
                    let v = virgin[i + k];
                    if t & v != 0 {
                        if v == 0xFF {
                            verdict = NewBitsVerdict::NewEdge;
                        } else if verdict == NewBitsVerdict::None {
                            verdict = NewBitsVerdict::Hit;
                        }
                        virgin[i + k] = v & !t;
                    }
                }
            }
        }
        i += WORD;
    }
    while i < len {
        let t = trace[i];
        if t != 0 {
            let v = virgin[i];
            if t & v != 0 {
                if v == 0xFF {
                    verdict = NewBitsVerdict::NewEdge;
                } else if verdict == NewBitsVerdict::None {
                    verdict = NewBitsVerdict::Hit;
                }
                virgin[i] = v & !t;
            }
        }
        i += 1;
    }
    verdict
}

/// `edge * 8 + bucket_of(count)`, §4.A "Feature enumeration".
pub fn bucket_of(count: u8) -> u32 {
    match count {
        0 => unreachable!("feature ids are only defined for non-zero counts"),
        1 => 0,
        2 => 1,
        3 => 2,
        4..=7 => 3,
        8..=15 => 4,
        16..=31 => 5,
        32..=127 => 6,
        _ => 7,
    }
}

/// Feature id capacity is wrapped modulo the configured capacity on
/// overflow, per spec.md §7 ("Feature-space overflow... wrap... never
/// fails").
pub fn feature_id(edge_index: usize, count: u8, capacity: u64) -> u64 {
    let raw = edge_index as u64 * 8 + bucket_of(count) as u64;
    if capacity == 0 {
        raw
    } else {
        raw % capacity
    }
}

/// Invoke `callback(feature_id)` for every non-zero byte of `trace`.
pub fn enumerate_features(trace: &[u8], capacity: u64, mut callback: impl FnMut(u64)) {
    for (edge, &count) in trace.iter().enumerate() {
        if count != 0 {
            callback(feature_id(edge, count, capacity));
        }
    }
}

/// Compacted bit-per-edge view of a testcase's classified trace, used to
/// propagate favoritism during culling (§4.E) without re-walking the full
/// byte map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceMini {
    bits: Vec<u64>,
}

impl TraceMini {
    pub fn from_trace(trace: &[u8]) -> Self {
        let words = trace.len().div_ceil(64);
        let mut bits = vec![0u64; words];
        for (edge, &count) in trace.iter().enumerate() {
            if count != 0 {
                bits[edge / 64] |= 1u64 << (edge % 64);
            }
        }
        TraceMini { bits }
    }

    pub fn is_set(&self, edge: usize) -> bool {
        self.bits
            .get(edge / 64)
            .map(|w| w & (1u64 << (edge % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64).filter_map(move |b| {
                if w & (1u64 << b) != 0 {
                    Some(wi * 64 + b)
                } else {
                    None
                }
            })
        })
    }

    /// Union this trace_mini into `cover`, returning whether `cover` grew.
    pub fn union_into(&self, cover: &mut Vec<u64>) -> bool {
        if cover.len() < self.bits.len() {
            cover.resize(self.bits.len(), 0);
        }
        let mut grew = false;
        for (c, &s) in cover.iter_mut().zip(self.bits.iter()) {
            let merged = *c | s;
            if merged != *c {
                grew = true;
            }
            *c = merged;
        }
        grew
    }
}

/// `top_rated[e]` is either empty or a handle to the testcase currently
/// "best" (smallest `len * exec_us`) among those covering edge `e`.
#[derive(Debug, Clone)]
pub struct TopRated {
    slots: Vec<Option<(u64, u64)>>, // (testcase_id, fav_factor)
}

impl TopRated {
    pub fn new(map_size: usize) -> Self {
        TopRated {
            slots: vec![None; map_size],
        }
    }

    pub fn get(&self, edge: usize) -> Option<u64> {
        self.slots.get(edge).and_then(|s| s.map(|(id, _)| id))
    }

    /// §4.A "Update-bitmap-score": for each edge this testcase covers,
    /// replace the slot if empty or if `fav_factor` is strictly smaller.
    /// Returns true if any slot changed.
    pub fn update(
        &mut self,
        testcase_id: u64,
        covered_edges: impl Iterator<Item = usize>,
        fav_factor: u64,
    ) -> bool {
        let mut changed = false;
        for e in covered_edges {
            if e >= self.slots.len() {
                continue;
            }
            let replace = match self.slots[e] {
                None => true,
                Some((_, cur)) => fav_factor < cur,
            };
            if replace {
                self.slots[e] = Some((testcase_id, fav_factor));
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_idempotent() {
        let mut t1 = vec![0u8, 1, 2, 3, 7, 255, 9, 0];
        let t0 = t1.clone();
        classify(&mut t1);
        let mut t2 = t1.clone();
        classify(&mut t2);
        assert_eq!(t1, t2, "classify(classify(t)) must equal classify(t)");
        assert_ne!(t1, t0);
    }

    #[test]
    fn classify_buckets_known_values() {
        let mut t = vec![0u8, 1, 2, 3, 4, 5, 8, 16, 32, 64, 128, 255];
        classify(&mut t);
        assert_eq!(t, vec![0, 1, 2, 4, 4, 8, 8, 16, 32, 64, 128, 128]);
    }

    #[test]
    fn has_new_bits_monotonic() {
        let mut virgin = vec![0xFFu8; 16];
        let mut trace = vec![0u8; 16];
        trace[3] = 1;
        trace[10] = 2;
        let v1 = has_new_bits(&trace, &mut virgin);
        assert_eq!(v1, NewBitsVerdict::NewEdge);
        let v2 = has_new_bits(&trace, &mut virgin);
        assert_eq!(v2, NewBitsVerdict::None, "second call must see no new bits");

        let mut trace2 = trace.clone();
        trace2[5] = 9;
        let v3 = has_new_bits(&trace2, &mut virgin);
        assert!(matches!(v3, NewBitsVerdict::NewEdge | NewBitsVerdict::Hit));
    }

    #[test]
    fn has_new_bits_distinguishes_hit_from_new_edge() {
        let mut virgin = vec![0xFFu8; 4];
        let mut trace = vec![0u8; 4];
        trace[0] = 1;
        assert_eq!(has_new_bits(&trace, &mut virgin), NewBitsVerdict::NewEdge);
        // Same edge, different (coarsened) bucket: classify first.
        trace[0] = 4;
        assert_eq!(has_new_bits(&trace, &mut virgin), NewBitsVerdict::Hit);
    }

    #[test]
    fn feature_id_matches_formula() {
        assert_eq!(feature_id(5, 1, 0), 5 * 8);
        assert_eq!(feature_id(5, 3, 0), 5 * 8 + 2);
        assert_eq!(feature_id(5, 128, 0), 5 * 8 + 7);
    }

    #[test]
    fn feature_id_wraps_on_overflow() {
        let cap = 10u64;
        let id = feature_id(1000, 200, cap);
        assert!(id < cap);
    }

    #[test]
    fn trace_mini_round_trips_set_bits() {
        let mut trace = vec![0u8; 200];
        trace[3] = 1;
        trace[130] = 2;
        let tm = TraceMini::from_trace(&trace);
        assert!(tm.is_set(3));
        assert!(tm.is_set(130));
        assert!(!tm.is_set(4));
        let set: Vec<usize> = tm.iter_set().collect();
        assert_eq!(set, vec![3, 130]);
    }

    #[test]
    fn top_rated_keeps_smallest_factor() {
        let mut tr = TopRated::new(64);
        assert!(tr.update(1, vec![2, 3].into_iter(), 100));
        assert_eq!(tr.get(2), Some(1));
        // Larger factor should not replace.
        assert!(!tr.update(2, vec![2].into_iter(), 200));
        assert_eq!(tr.get(2), Some(1));
        // Smaller factor replaces.
        assert!(tr.update(3, vec![2].into_iter(), 50));
        assert_eq!(tr.get(2), Some(3));
    }
}
