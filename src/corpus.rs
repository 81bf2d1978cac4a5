//! §4.B Corpus Store and the `Testcase` entity from §3 Data Model.
//!
//! Grounded on the teacher's `Corpus`/`Input` pair in `lib.rs`: a dense
//! `Vec` of slots indexed by id, plus side indices for dedup. The teacher
//! only needed insertion order; this generalizes to the `by_id`/`by_sha1`
//! access patterns §4.B requires while keeping the "blank the slot, keep
//! the id" deletion model.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use sha1::{Digest, Sha1};

use crate::bitmap::TraceMini;
use crate::error::{FuzzError, Result};

pub type TestcaseId = u64;

/// Where a testcase's bytes currently live.
#[derive(Debug, Clone)]
pub enum InputBytes {
    Memory(Vec<u8>),
    /// Bytes are on disk under `output_dir`; loaded lazily by callers that
    /// need them (calibration, trimming) and dropped again afterward.
    File(PathBuf),
}

impl InputBytes {
    pub fn len_hint(&self, on_disk_len: Option<usize>) -> usize {
        match self {
            InputBytes::Memory(b) => b.len(),
            InputBytes::File(_) => on_disk_len.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestcaseFlags {
    pub was_fuzzed: bool,
    pub favored: bool,
    pub trim_done: bool,
    pub passed_det: bool,
    pub cal_failed: u32,
    pub fs_redundant: bool,
    pub never_reduce: bool,
    pub may_delete_file: bool,
    pub has_focus_function: bool,
    pub var_behavior: bool,
}

/// Sorted-by-feature-id incidence vector with saturating counts, per §3.
#[derive(Debug, Clone, Default)]
pub struct FeatureFreqs(Vec<(u64, u32)>);

impl FeatureFreqs {
    pub fn bump(&mut self, feature_id: u64) {
        match self.0.binary_search_by_key(&feature_id, |&(id, _)| id) {
            Ok(i) => self.0[i].1 = self.0[i].1.saturating_add(1),
            Err(i) => self.0.insert(i, (feature_id, 1)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Testcase {
    pub id: TestcaseId,
    pub bytes: InputBytes,
    pub sha1: [u8; 20],
    pub input_size: usize,
    pub name: Option<String>,

    pub exec_us: u64,
    pub bitmap_size: u32,
    pub depth: u32,
    pub exec_cksum: u32,
    pub handicap: u32,
    pub flags: TestcaseFlags,
    pub trace_mini: TraceMini,

    // libFuzzer-family metadata.
    pub energy: f64,
    pub needs_energy_update: bool,
    pub sum_incidence: f64,
    pub features_count: usize,
    pub unique_feature_set: Vec<u64>,
    pub feature_freqs: FeatureFreqs,
    pub executed_mutations_count: u64,
    pub weight: f64,
}

impl Testcase {
    fn new(id: TestcaseId, bytes: InputBytes, input_size: usize, sha1: [u8; 20], depth: u32) -> Self {
        Testcase {
            id,
            bytes,
            sha1,
            input_size,
            name: None,
            exec_us: 0,
            bitmap_size: 0,
            depth,
            exec_cksum: 0,
            handicap: 0,
            flags: TestcaseFlags::default(),
            trace_mini: TraceMini::default(),
            energy: 0.0,
            needs_energy_update: true,
            sum_incidence: 0.0,
            features_count: 0,
            unique_feature_set: Vec::new(),
            feature_freqs: FeatureFreqs::default(),
            executed_mutations_count: 0,
            weight: 1.0,
        }
    }

    pub fn fav_factor(&self) -> u64 {
        self.input_size as u64 * self.exec_us.max(1)
    }
}

pub fn sha1_of(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn sha1_hex(sha1: &[u8; 20]) -> String {
    sha1.iter().map(|b| format!("{b:02x}")).collect()
}

/// §4.B Corpus Store: a slot array with insertion, by-id, and by-sha1
/// access, per the invariant I6 that all three agree on the live set.
pub struct Corpus {
    output_dir: PathBuf,
    slots: Vec<Option<Testcase>>,
    /// Insertion order of currently-live ids; §5 "Ordering" requires this
    /// to always match `for_each_in_order`.
    sequential: Vec<TestcaseId>,
    by_sha1: FxHashMap<[u8; 20], TestcaseId>,
    by_name: FxHashMap<String, TestcaseId>,
    next_id: TestcaseId,
}

impl Corpus {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Corpus {
            output_dir: output_dir.into(),
            slots: Vec::new(),
            sequential: Vec::new(),
            by_sha1: FxHashMap::default(),
            by_name: FxHashMap::default(),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.sequential.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequential.is_empty()
    }

    /// Insert a fresh testcase. Fails with `PutError`-adjacent variant if
    /// the caller asked for a fresh admit and the sha1 already exists.
    pub fn insert(
        &mut self,
        bytes: Vec<u8>,
        depth: u32,
        persistent: bool,
        require_fresh: bool,
    ) -> Result<TestcaseId> {
        let sha1 = sha1_of(&bytes);
        if require_fresh {
            if let Some(&existing) = self.by_sha1.get(&sha1) {
                return Err(FuzzError::Config(format!(
                    "sha1 collision with existing testcase {existing}"
                )));
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let input_size = bytes.len();

        let stored = if persistent {
            let name = sha1_hex(&sha1);
            let path = self.output_dir.join("queue").join(&name);
            self.write_bytes(&path, &bytes)?;
            InputBytes::File(path)
        } else {
            InputBytes::Memory(bytes)
        };

        let mut tc = Testcase::new(id, stored, input_size, sha1, depth);
        tc.name = Some(sha1_hex(&sha1));

        if id as usize == self.slots.len() {
            self.slots.push(Some(tc));
        } else {
            self.slots[id as usize] = Some(tc);
        }
        self.sequential.push(id);
        self.by_sha1.insert(sha1, id);
        if let Some(name) = self.slots[id as usize].as_ref().and_then(|t| t.name.clone()) {
            self.by_name.insert(name, id);
        }
        Ok(id)
    }

    pub fn replace(&mut self, id: TestcaseId, bytes: Vec<u8>) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id as usize)
            .and_then(|s| s.as_mut())
            .ok_or(FuzzError::UnknownId(id))?;

        let old_sha1 = slot.sha1;
        let new_sha1 = sha1_of(&bytes);
        slot.input_size = bytes.len();
        slot.sha1 = new_sha1;
        match &slot.bytes {
            InputBytes::Memory(_) => slot.bytes = InputBytes::Memory(bytes),
            InputBytes::File(path) => {
                let path = path.clone();
                self.write_bytes(&path, &bytes)?;
                slot.bytes = InputBytes::File(path);
            }
        }

        if old_sha1 != new_sha1 {
            self.by_sha1.remove(&old_sha1);
            self.by_sha1.insert(new_sha1, id);

            let old_name = slot.name.clone();
            let new_name = sha1_hex(&new_sha1);
            slot.name = Some(new_name.clone());
            if let Some(old_name) = old_name {
                self.by_name.remove(&old_name);
            }
            self.by_name.insert(new_name, id);
        }
        Ok(())
    }

    pub fn erase(&mut self, id: TestcaseId) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            if let Some(tc) = slot.take() {
                self.by_sha1.remove(&tc.sha1);
                if let Some(name) = &tc.name {
                    self.by_name.remove(name);
                }
                self.sequential.retain(|&x| x != id);
            }
        }
    }

    pub fn get(&self, id: TestcaseId) -> Option<&Testcase> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: TestcaseId) -> Option<&mut Testcase> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    pub fn find_by_sha1(&self, sha1: &[u8; 20]) -> Option<TestcaseId> {
        self.by_sha1.get(sha1).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<TestcaseId> {
        self.by_name.get(name).copied()
    }

    pub fn for_each_in_order(&self, mut f: impl FnMut(&Testcase)) {
        for &id in &self.sequential {
            if let Some(tc) = self.get(id) {
                f(tc);
            }
        }
    }

    pub fn ids_in_order(&self) -> impl Iterator<Item = TestcaseId> + '_ {
        self.sequential.iter().copied()
    }

    pub fn load_bytes(&self, id: TestcaseId) -> Result<Vec<u8>> {
        let tc = self.get(id).ok_or(FuzzError::UnknownId(id))?;
        match &tc.bytes {
            InputBytes::Memory(b) => Ok(b.clone()),
            InputBytes::File(path) => fs::read(path).map_err(|e| FuzzError::CorpusIo {
                path: path.clone(),
                source: e.to_string(),
            }),
        }
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FuzzError::CorpusIo {
                path: parent.to_path_buf(),
                source: e.to_string(),
            })?;
        }
        fs::write(path, bytes).map_err(|e| FuzzError::CorpusIo {
            path: path.to_path_buf(),
            source: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_dense_ids_and_preserves_order() {
        let mut c = Corpus::new(std::env::temp_dir().join("fuzzcore-test-corpus"));
        let a = c.insert(b"aaa".to_vec(), 0, false, true).unwrap();
        let b = c.insert(b"bbb".to_vec(), 0, false, true).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        let order: Vec<_> = c.ids_in_order().collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn fresh_admit_rejects_sha1_collision() {
        let mut c = Corpus::new(std::env::temp_dir().join("fuzzcore-test-corpus2"));
        c.insert(b"same".to_vec(), 0, false, true).unwrap();
        let err = c.insert(b"same".to_vec(), 0, false, true);
        assert!(err.is_err());
    }

    #[test]
    fn erase_blanks_slot_but_keeps_id_space() {
        let mut c = Corpus::new(std::env::temp_dir().join("fuzzcore-test-corpus3"));
        let a = c.insert(b"a".to_vec(), 0, false, true).unwrap();
        let b = c.insert(b"b".to_vec(), 0, false, true).unwrap();
        c.erase(a);
        assert!(c.get(a).is_none());
        assert!(c.get(b).is_some());
        assert_eq!(c.ids_in_order().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn replace_preserves_id() {
        let mut c = Corpus::new(std::env::temp_dir().join("fuzzcore-test-corpus4"));
        let a = c.insert(b"orig".to_vec(), 0, false, true).unwrap();
        c.replace(a, b"changed".to_vec()).unwrap();
        assert_eq!(c.get(a).unwrap().input_size, 7);
        assert_eq!(c.find_by_sha1(&sha1_of(b"changed")), Some(a));
        assert_eq!(c.find_by_sha1(&sha1_of(b"orig")), None);
        assert_eq!(c.find_by_name(&sha1_hex(&sha1_of(b"changed"))), Some(a));
        assert_eq!(c.find_by_name(&sha1_hex(&sha1_of(b"orig"))), None);
    }

    #[test]
    fn indices_agree_after_insert_replace_erase() {
        // P7: sequential/by_id/by_name always agree on the live set.
        let mut c = Corpus::new(std::env::temp_dir().join("fuzzcore-test-corpus5"));
        let a = c.insert(b"one".to_vec(), 0, false, true).unwrap();
        let b = c.insert(b"two".to_vec(), 0, false, true).unwrap();
        let d = c.insert(b"three".to_vec(), 0, false, true).unwrap();

        c.replace(b, b"two-changed".to_vec()).unwrap();
        c.erase(a);

        let mut by_sequential: Vec<TestcaseId> = c.ids_in_order().collect();
        by_sequential.sort();

        let mut by_id: Vec<TestcaseId> = (0..10)
            .filter_map(|id| c.get(id).map(|_| id))
            .collect();
        by_id.sort();

        let mut by_name: Vec<TestcaseId> = by_sequential
            .iter()
            .filter_map(|&id| c.get(id).and_then(|tc| tc.name.clone()))
            .filter_map(|name| c.find_by_name(&name))
            .collect();
        by_name.sort();

        assert_eq!(by_sequential, vec![b, d]);
        assert_eq!(by_sequential, by_id);
        assert_eq!(by_sequential, by_name);
    }
}
