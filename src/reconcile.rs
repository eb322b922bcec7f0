// Reconciliation engine module
// Plans hash work per update mode and merges results into the record set

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::algorithm::Algorithm;
use crate::error::HashKeepError;
use crate::paths;
use crate::record::{ChecksumRecord, DigestValue, FileStatus, RecordSet};
use crate::walk::FileLister;

/// Update mode, ordered by discovery scope: Brief ⊆ Deep ⊆ Complete for a
/// fixed root. Delta modes share their base mode's discovery and schedule
/// only paths absent from the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateMode {
    /// Recheck exactly the recorded paths, no directory walk
    Brief,
    /// One level inside each directory that holds a recorded file
    Deep,
    /// Recursive under each top-level directory the records span
    Complete,
    DeltaDeep,
    DeltaComplete,
}

impl UpdateMode {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateMode::Brief => "brief",
            UpdateMode::Deep => "deep",
            UpdateMode::Complete => "complete",
            UpdateMode::DeltaDeep => "delta-deep",
            UpdateMode::DeltaComplete => "delta-complete",
        }
    }

    pub fn from_name(name: &str) -> Option<UpdateMode> {
        match name.to_lowercase().as_str() {
            "brief" => Some(UpdateMode::Brief),
            "deep" => Some(UpdateMode::Deep),
            "complete" => Some(UpdateMode::Complete),
            "delta-deep" | "deltadeep" => Some(UpdateMode::DeltaDeep),
            "delta-complete" | "deltacomplete" => Some(UpdateMode::DeltaComplete),
            _ => None,
        }
    }

    /// Delta modes keep matched records verbatim and hash only new paths.
    pub fn is_delta(&self) -> bool {
        matches!(self, UpdateMode::DeltaDeep | UpdateMode::DeltaComplete)
    }

    fn is_recursive(&self) -> bool {
        matches!(self, UpdateMode::Complete | UpdateMode::DeltaComplete)
    }
}

/// What a run does with the digests it computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Fresh digests become the stored digests
    Compute,
    /// Fresh digests are compared against stored ones. A stored digest is
    /// never overwritten; a fresh digest for an algorithm the record lacks
    /// is filled in so the record becomes verifiable next time
    Verify,
    /// Like Compute, over a mode-driven discovery of an existing set
    Update(UpdateMode),
}

/// Knobs the original exposes for update runs.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Scan the root directory itself, not only recorded subdirectories
    pub include_root: bool,
    /// Keep records whose file no longer exists, flagged Missing
    pub keep_missing: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            include_root: true,
            keep_missing: true,
        }
    }
}

/// Engine lifecycle. Cancellation moves straight to Done with whatever has
/// been merged so far; there is no rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Discovering,
    Planning,
    AwaitingResults,
    Merging,
    Done,
}

/// One scheduled hash computation, carrying the prior digests for comparison.
#[derive(Debug, Clone)]
pub struct HashJob {
    pub path: String,
    pub prior: BTreeMap<Algorithm, DigestValue>,
}

/// Output of the planning phase.
#[derive(Debug, Default)]
pub struct WorkPlan {
    /// Paths to hash, in discovery order
    pub jobs: Vec<HashJob>,
    /// Discovered paths whose records a delta run keeps verbatim
    pub existing: Vec<String>,
    /// Recorded paths absent from discovery
    pub missing: Vec<String>,
}

/// Completion of one hash job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Computed(Vec<DigestValue>),
    Inaccessible,
}

/// One digest disagreement found during verification.
#[derive(Debug, Clone, Serialize)]
pub struct MismatchDetail {
    pub path: String,
    pub algorithm: Algorithm,
    pub stored: String,
    pub fresh: String,
}

/// Aggregate counts of a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub good: usize,
    pub mismatched: usize,
    pub inaccessible: usize,
    pub missing: usize,
    pub cancelled: bool,
    pub mismatches: Vec<MismatchDetail>,
}

impl RunSummary {
    /// True when every processed file checked out and nothing was missing.
    pub fn is_clean(&self) -> bool {
        self.mismatched == 0 && self.inaccessible == 0 && self.missing == 0
    }
}

/// Drives one run: discovery, planning, result merging, finalization.
///
/// Merging is keyed by path, so applying the same outcome twice is a no-op
/// and outcomes may arrive in any completion order.
pub struct ReconcileEngine {
    records: RecordSet,
    operation: Operation,
    options: UpdateOptions,
    phase: Phase,
    cancel: Arc<AtomicBool>,
    missing: Vec<String>,
    mismatches: BTreeMap<(String, Algorithm), MismatchDetail>,
}

impl ReconcileEngine {
    pub fn new(records: RecordSet, operation: Operation, options: UpdateOptions) -> Self {
        Self {
            records,
            operation,
            options,
            phase: Phase::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            missing: Vec::new(),
            mismatches: BTreeMap::new(),
        }
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Shared cancellation flag, checked between directories and before each
    /// merge; hand it to whatever executes the plan.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Discover candidate paths per the mode's table and plan the hash jobs.
    /// Only root unavailability aborts; anything per-file ends up as a job or
    /// a missing entry.
    pub fn plan(
        &mut self,
        mode: UpdateMode,
        lister: &dyn FileLister,
    ) -> Result<WorkPlan, HashKeepError> {
        self.phase = Phase::Discovering;
        let discovered = self.discover(mode, lister)?;
        if self.is_cancelled() {
            self.phase = Phase::Done;
            return Ok(WorkPlan::default());
        }

        self.phase = Phase::Planning;
        let discovered_set: HashSet<&str> = discovered.iter().map(String::as_str).collect();
        let mut plan = WorkPlan::default();

        for path in &discovered {
            let prior = self
                .records
                .get(path)
                .map(|r| r.digests.clone())
                .unwrap_or_default();
            if mode.is_delta() && self.records.contains(path) {
                plan.existing.push(path.clone());
            } else {
                plan.jobs.push(HashJob {
                    path: path.clone(),
                    prior,
                });
            }
        }

        for path in self.records.paths() {
            if !discovered_set.contains(path) {
                plan.missing.push(path.to_string());
            }
        }
        self.missing = plan.missing.clone();

        self.phase = Phase::AwaitingResults;
        Ok(plan)
    }

    fn discover(
        &self,
        mode: UpdateMode,
        lister: &dyn FileLister,
    ) -> Result<Vec<String>, HashKeepError> {
        if mode == UpdateMode::Brief {
            // existence probe only, no walk
            return Ok(self
                .records
                .paths()
                .filter(|p| lister.exists(p))
                .map(str::to_string)
                .collect());
        }

        // Directories to scan, deduplicated: parents for one-level modes,
        // top-level directories for recursive modes
        let mut dirs: BTreeSet<String> = BTreeSet::new();
        if mode.is_recursive() && self.options.include_root {
            dirs.insert(String::new());
        } else {
            for path in self.records.paths() {
                let dir = if mode.is_recursive() {
                    paths::top_level_dir(path)
                } else {
                    paths::parent_dir(path)
                };
                if !dir.is_empty() || self.options.include_root {
                    dirs.insert(dir);
                }
            }
            if self.options.include_root {
                dirs.insert(String::new());
            }
        }

        let mut found: BTreeSet<String> = BTreeSet::new();
        for dir in dirs {
            if self.is_cancelled() {
                break;
            }
            match lister.list(&dir, mode.is_recursive()) {
                Ok(files) => found.extend(files),
                Err(HashKeepError::RootUnavailable { path, source }) if !dir.is_empty() => {
                    // a recorded directory vanished; its files become Missing
                    eprintln!(
                        "Warning: Cannot scan {}: {}",
                        path.display(),
                        source
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found.into_iter().collect())
    }

    /// Fold one job outcome into the record set. Idempotent per path and
    /// independent of completion order.
    pub fn merge(&mut self, path: &str, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Computed(digests) => match self.operation {
                Operation::Verify => self.merge_verification(path, digests),
                Operation::Compute | Operation::Update(_) => {
                    for digest in digests {
                        self.records.upsert_digest(path, digest);
                    }
                    if let Some(record) = self.records.get_mut(path) {
                        record.status = FileStatus::Good;
                    }
                }
            },
            JobOutcome::Inaccessible => {
                if !self.records.contains(path) {
                    self.records.insert(ChecksumRecord::new(path));
                }
                if let Some(record) = self.records.get_mut(path) {
                    record.status = FileStatus::Inaccessible;
                }
            }
        }
    }

    // Byte-exact comparison per algorithm; the stored digest stays in the
    // record, the fresh one goes into the mismatch detail
    fn merge_verification(&mut self, path: &str, fresh: Vec<DigestValue>) {
        if !self.records.contains(path) {
            self.records.insert(ChecksumRecord::new(path));
        }
        let mut new_details = Vec::new();
        let mut status = FileStatus::Good;
        if let Some(record) = self.records.get_mut(path) {
            for digest in fresh {
                match record.digest(digest.algorithm) {
                    Some(stored) if stored.bytes == digest.bytes => {}
                    Some(stored) => {
                        status = FileStatus::Mismatch;
                        new_details.push(MismatchDetail {
                            path: path.to_string(),
                            algorithm: digest.algorithm,
                            stored: stored.to_hex(),
                            fresh: digest.to_hex(),
                        });
                    }
                    // no stored digest for this algorithm; keep the fresh one
                    None => {
                        record.set_digest(digest);
                    }
                }
            }
            record.status = status;
        }
        for detail in new_details {
            self.mismatches
                .insert((detail.path.clone(), detail.algorithm), detail);
        }
    }

    /// Apply the missing-file policy and settle the run. The engine is Done
    /// afterwards whether or not the run was cancelled.
    pub fn finalize(&mut self) -> RunSummary {
        self.phase = Phase::Merging;

        let missing_total = self.missing.len();
        for path in std::mem::take(&mut self.missing) {
            if self.options.keep_missing {
                if let Some(record) = self.records.get_mut(&path) {
                    // last-known digest stays in place
                    record.status = FileStatus::Missing;
                }
            } else {
                self.records.remove(&path);
            }
        }

        let mut summary = RunSummary {
            missing: missing_total,
            cancelled: self.is_cancelled(),
            mismatches: self.mismatches.values().cloned().collect(),
            ..RunSummary::default()
        };
        for record in self.records.iter() {
            match record.status {
                FileStatus::Good => summary.good += 1,
                FileStatus::Mismatch => summary.mismatched += 1,
                FileStatus::Inaccessible => summary.inaccessible += 1,
                FileStatus::Unchecked | FileStatus::Missing => {}
            }
        }
        summary.processed = summary.good + summary.mismatched + summary.inaccessible;

        self.phase = Phase::Done;
        summary
    }

    pub fn into_records(self) -> RecordSet {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fixed in-memory filesystem for planning tests
    struct FakeLister {
        files: Vec<String>,
    }

    impl FakeLister {
        fn new(files: &[&str]) -> Self {
            Self {
                files: files.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl FileLister for FakeLister {
        fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, HashKeepError> {
            let mut out: Vec<String> = self
                .files
                .iter()
                .filter(|f| {
                    if recursive {
                        dir.is_empty() || f.starts_with(&format!("{}/", dir))
                    } else {
                        crate::paths::parent_dir(f) == dir
                    }
                })
                .cloned()
                .collect();
            out.sort();
            Ok(out)
        }

        fn exists(&self, storage: &str) -> bool {
            self.files.iter().any(|f| f == storage)
        }
    }

    fn digest(algorithm: Algorithm, byte: u8) -> DigestValue {
        DigestValue::new(algorithm, vec![byte; algorithm.digest_size()])
    }

    fn records_with(paths: &[&str]) -> RecordSet {
        paths
            .iter()
            .map(|p| ChecksumRecord::new(*p).with_digest(digest(Algorithm::Md5, 1)))
            .collect()
    }

    fn plan_paths(mode: UpdateMode, records: RecordSet, lister: &FakeLister) -> Vec<String> {
        let mut engine =
            ReconcileEngine::new(records, Operation::Update(mode), UpdateOptions::default());
        let plan = engine.plan(mode, lister).unwrap();
        let mut all: Vec<String> = plan.jobs.into_iter().map(|j| j.path).collect();
        all.extend(plan.existing);
        all.sort();
        all
    }

    #[test]
    fn discovery_scope_is_monotonic() {
        let lister = FakeLister::new(&["a.txt", "sub/b.txt", "sub/deep/c.txt", "other/d.txt"]);
        let records = records_with(&["sub/b.txt"]);

        let brief = plan_paths(UpdateMode::Brief, records.clone(), &lister);
        let deep = plan_paths(UpdateMode::Deep, records.clone(), &lister);
        let complete = plan_paths(UpdateMode::Complete, records, &lister);

        for p in &brief {
            assert!(deep.contains(p), "{} in brief but not deep", p);
        }
        for p in &deep {
            assert!(complete.contains(p), "{} in deep but not complete", p);
        }
        assert_eq!(brief, vec!["sub/b.txt"]);
        // deep sees root (include_root) and sub/, but not sub/deep
        assert!(deep.contains(&"a.txt".to_string()));
        assert!(!deep.contains(&"sub/deep/c.txt".to_string()));
        assert!(complete.contains(&"sub/deep/c.txt".to_string()));
    }

    #[test]
    fn delta_never_reschedules_known_paths() {
        let lister = FakeLister::new(&["a.txt", "b.txt"]);
        let mut engine = ReconcileEngine::new(
            records_with(&["a.txt"]),
            Operation::Update(UpdateMode::DeltaDeep),
            UpdateOptions::default(),
        );
        let plan = engine.plan(UpdateMode::DeltaDeep, &lister).unwrap();

        let job_paths: Vec<&str> = plan.jobs.iter().map(|j| j.path.as_str()).collect();
        assert_eq!(job_paths, vec!["b.txt"]);
        assert_eq!(plan.existing, vec!["a.txt"]);
        assert!(plan.missing.is_empty());

        // a.txt keeps its digest verbatim, b.txt gets the fresh one
        engine.merge("b.txt", JobOutcome::Computed(vec![digest(Algorithm::Md5, 2)]));
        engine.finalize();
        let records = engine.into_records();
        assert_eq!(
            records.get("a.txt").unwrap().digest(Algorithm::Md5).unwrap().bytes,
            vec![1u8; 16]
        );
        assert_eq!(
            records.get("b.txt").unwrap().digest(Algorithm::Md5).unwrap().bytes,
            vec![2u8; 16]
        );
    }

    #[test]
    fn missing_records_follow_keep_missing_option() {
        let lister = FakeLister::new(&[]);
        for keep in [true, false] {
            let mut engine = ReconcileEngine::new(
                records_with(&["c.txt"]),
                Operation::Update(UpdateMode::Brief),
                UpdateOptions {
                    keep_missing: keep,
                    ..UpdateOptions::default()
                },
            );
            let plan = engine.plan(UpdateMode::Brief, &lister).unwrap();
            assert_eq!(plan.missing, vec!["c.txt"]);
            let summary = engine.finalize();
            assert_eq!(summary.missing, 1);

            let records = engine.into_records();
            if keep {
                let record = records.get("c.txt").unwrap();
                assert_eq!(record.status, FileStatus::Missing);
                // last-known digest preserved
                assert!(record.digest(Algorithm::Md5).is_some());
            } else {
                assert!(records.get("c.txt").is_none());
            }
        }
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let outcomes = [
            ("a.txt", JobOutcome::Computed(vec![digest(Algorithm::Md5, 2)])),
            ("b.txt", JobOutcome::Inaccessible),
            ("c.txt", JobOutcome::Computed(vec![digest(Algorithm::Md5, 3)])),
        ];

        let run = |order: &[usize]| {
            let mut engine = ReconcileEngine::new(
                records_with(&["a.txt", "b.txt", "c.txt"]),
                Operation::Update(UpdateMode::Brief),
                UpdateOptions::default(),
            );
            for &i in order {
                let (path, outcome) = &outcomes[i];
                engine.merge(path, outcome.clone());
                // applying twice changes nothing
                engine.merge(path, outcome.clone());
            }
            let summary = engine.finalize();
            (summary.good, summary.inaccessible, {
                let records = engine.into_records();
                records
                    .iter()
                    .map(|r| (r.path.clone(), r.digests.clone(), r.status))
                    .collect::<Vec<_>>()
            })
        };

        let forward = run(&[0, 1, 2]);
        let backward = run(&[2, 1, 0]);
        assert_eq!(forward, backward);
        assert_eq!(forward.0, 2);
        assert_eq!(forward.1, 1);
    }

    #[test]
    fn verification_keeps_stored_digest_and_reports_both() {
        let mut engine = ReconcileEngine::new(
            records_with(&["a.txt"]),
            Operation::Verify,
            UpdateOptions::default(),
        );
        let lister = FakeLister::new(&["a.txt"]);
        engine.plan(UpdateMode::Brief, &lister).unwrap();
        engine.merge("a.txt", JobOutcome::Computed(vec![digest(Algorithm::Md5, 9)]));
        let summary = engine.finalize();

        assert_eq!(summary.mismatched, 1);
        assert_eq!(summary.mismatches.len(), 1);
        let detail = &summary.mismatches[0];
        assert_eq!(detail.path, "a.txt");
        assert_eq!(detail.stored, DigestValue::new(Algorithm::Md5, vec![1u8; 16]).to_hex());
        assert_eq!(detail.fresh, DigestValue::new(Algorithm::Md5, vec![9u8; 16]).to_hex());
        // stored digest is untouched
        let records = engine.into_records();
        assert_eq!(
            records.get("a.txt").unwrap().digest(Algorithm::Md5).unwrap().bytes,
            vec![1u8; 16]
        );
    }

    #[test]
    fn cancellation_settles_with_partial_results() {
        let mut engine = ReconcileEngine::new(
            records_with(&["a.txt", "b.txt"]),
            Operation::Update(UpdateMode::Brief),
            UpdateOptions::default(),
        );
        let lister = FakeLister::new(&["a.txt", "b.txt"]);
        engine.plan(UpdateMode::Brief, &lister).unwrap();
        engine.merge("a.txt", JobOutcome::Computed(vec![digest(Algorithm::Md5, 5)]));
        engine.cancel();
        let summary = engine.finalize();

        assert!(summary.cancelled);
        assert_eq!(summary.good, 1);
        assert_eq!(engine.phase(), Phase::Done);
    }
}
