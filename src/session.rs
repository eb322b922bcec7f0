// Session orchestration module
// Owns one run end to end: load, plan, parallel hashing, merge, save

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use rayon::prelude::*;

use crate::algorithm::Algorithm;
use crate::error::{HashKeepError, ParseWarning};
use crate::format::{ChecksumReader, ChecksumWriter, FormatConfig, RunStats};
use crate::hasher::{is_computable, FileHasher};
use crate::paths;
use crate::reconcile::{
    JobOutcome, Operation, ReconcileEngine, RunSummary, UpdateMode, UpdateOptions, WorkPlan,
};
use crate::record::{FileStatus, RecordSet};
use crate::walk::DirLister;

// Completed hash results waiting for the merge writer
const RESULT_CHANNEL_CAPACITY: usize = 1024;

/// One per-file status transition, reported as results are merged.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub path: String,
    pub status: FileStatus,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Explicit state for one compute/verify/update run. Holds the record set,
/// format configuration, and operation; nothing lives in globals.
pub struct HashSession {
    root: PathBuf,
    operation: Operation,
    config: FormatConfig,
    options: UpdateOptions,
    algorithms: Vec<Algorithm>,
    records: RecordSet,
    warnings: Vec<ParseWarning>,
    checksum_file: Option<PathBuf>,
    jobs: usize,
    cancel: Arc<AtomicBool>,
    progress_callback: Option<ProgressCallback>,
}

impl HashSession {
    pub fn new(root: impl Into<PathBuf>, operation: Operation) -> Self {
        let config = FormatConfig::default();
        let algorithms = Self::algorithm_list(&config);
        Self {
            root: root.into(),
            operation,
            config,
            options: UpdateOptions::default(),
            algorithms,
            records: RecordSet::new(),
            warnings: Vec::new(),
            checksum_file: None,
            jobs: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            progress_callback: None,
        }
    }

    pub fn with_config(mut self, config: FormatConfig) -> Self {
        self.algorithms = Self::algorithm_list(&config);
        self.config = config;
        self
    }

    /// Algorithms a run hashes: every configured column, or the primary
    /// algorithm when no column layout is set.
    fn algorithm_list(config: &FormatConfig) -> Vec<Algorithm> {
        if config.columns.is_empty() {
            vec![config.algorithm]
        } else {
            config.columns.clone()
        }
    }

    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of worker threads; 0 keeps the rayon default.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &FormatConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Warnings collected while loading the checksum file.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Flag for external cancellation (signal handlers, UI); checked before
    /// each file, so in-flight reads finish and nothing partial is merged.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Load an existing checksum file into the session's record set.
    /// A header naming a different algorithm than configured wins.
    pub fn load(&mut self, path: &Path) -> Result<(), HashKeepError> {
        let reader = ChecksumReader::new(self.config.clone());
        let outcome = reader.read_path(path)?;
        if outcome.algorithm != self.config.algorithm {
            self.config.algorithm = outcome.algorithm;
            // A parse-only algorithm (TTH, AICH) cannot drive hashing; keep
            // the previous computable fallback so verification still runs.
            // A configured column layout also stays authoritative.
            if self.config.columns.is_empty() && is_computable(outcome.algorithm) {
                self.algorithms = vec![outcome.algorithm];
            }
        }
        self.records = outcome.records;
        self.warnings = outcome.warnings;
        self.checksum_file = Some(path.to_path_buf());
        Ok(())
    }

    /// Execute the run: discovery, planning, parallel hashing, single-writer
    /// merge, finalization. Per-file failures become Inaccessible records;
    /// only an unavailable root aborts.
    pub fn run(&mut self) -> Result<RunSummary, HashKeepError> {
        let mode = match self.operation {
            // a fresh compute is a full recursive scan of the root
            Operation::Compute => UpdateMode::Complete,
            // verification touches exactly the recorded paths
            Operation::Verify => UpdateMode::Brief,
            Operation::Update(mode) => mode,
        };
        let options = match self.operation {
            Operation::Compute => UpdateOptions {
                include_root: true,
                ..self.options
            },
            _ => self.options,
        };

        let mut lister = DirLister::new(&self.root);
        if let Some(checksum_file) = &self.checksum_file {
            lister = lister.with_exclude(checksum_file);
        }

        let mut engine = ReconcileEngine::new(
            std::mem::take(&mut self.records),
            self.operation,
            options,
        )
        .with_cancel_flag(Arc::clone(&self.cancel));

        let plan = engine.plan(mode, &lister)?;
        self.execute_plan(&mut engine, plan)?;

        let summary = engine.finalize();
        self.records = engine.into_records();
        Ok(summary)
    }

    /// Persist the record set. Uses the path given, or the loaded file's path.
    pub fn save(&self, path: Option<&Path>, summary: Option<&RunSummary>) -> Result<(), HashKeepError> {
        let target = path
            .map(Path::to_path_buf)
            .or_else(|| self.checksum_file.clone())
            .ok_or_else(|| HashKeepError::Io {
                path: None,
                operation: "saving checksum file".to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "no output path"),
            })?;
        let stats = summary.map(|s| RunStats {
            processed: s.processed,
            good: s.good,
            mismatched: s.mismatched,
            inaccessible: s.inaccessible,
        });
        let writer = ChecksumWriter::new(self.config.clone());
        writer.write_path(&target, &self.records, stats.as_ref())
    }

    fn execute_plan(
        &self,
        engine: &mut ReconcileEngine,
        plan: WorkPlan,
    ) -> Result<(), HashKeepError> {
        if plan.jobs.is_empty() {
            return Ok(());
        }

        let pool = if self.jobs > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.jobs)
                    .build()
                    .map_err(|e| HashKeepError::Io {
                        path: None,
                        operation: "building worker pool".to_string(),
                        source: io::Error::other(e),
                    })?,
            )
        } else {
            None
        };
        self.hash_and_merge(engine, &plan, pool.as_ref());
        Ok(())
    }

    // Workers hash in parallel and push outcomes through a bounded channel;
    // this thread is the only writer into the engine
    fn hash_and_merge(
        &self,
        engine: &mut ReconcileEngine,
        plan: &WorkPlan,
        pool: Option<&rayon::ThreadPool>,
    ) {
        let (tx, rx) = bounded::<(String, JobOutcome)>(RESULT_CHANNEL_CAPACITY);
        let cancel = Arc::clone(&self.cancel);
        let total = plan.jobs.len();
        let root = self.root.clone();
        let session_algorithms = self.algorithms.clone();
        let verify = matches!(self.operation, Operation::Verify);

        thread::scope(|scope| {
            scope.spawn(move || {
                let hasher = FileHasher::new();
                let work = move |tx: &mut crossbeam_channel::Sender<(String, JobOutcome)>,
                                 job: &crate::reconcile::HashJob| {
                    if cancel.load(Ordering::SeqCst) {
                        return;
                    }
                    // verification hashes the algorithms the record stores
                    let mut algorithms: Vec<Algorithm> = if verify {
                        job.prior.keys().copied().filter(|&a| is_computable(a)).collect()
                    } else {
                        session_algorithms
                            .iter()
                            .copied()
                            .filter(|&a| is_computable(a))
                            .collect()
                    };
                    if algorithms.is_empty() {
                        algorithms = session_algorithms
                            .iter()
                            .copied()
                            .filter(|&a| is_computable(a))
                            .collect();
                    }
                    if algorithms.is_empty() {
                        eprintln!(
                            "Warning: No computable algorithm to hash {}; leaving it unchecked",
                            job.path
                        );
                        return;
                    }

                    let file_path = paths::platform_path(&root, &job.path);
                    let outcome = match hasher.compute_many(&file_path, &algorithms) {
                        Ok(digests) => JobOutcome::Computed(digests),
                        Err(e) => {
                            eprintln!("Warning: Failed to hash {}: {}", file_path.display(), e);
                            JobOutcome::Inaccessible
                        }
                    };
                    let _ = tx.send((job.path.clone(), outcome));
                };

                let produce = || plan.jobs.par_iter().for_each_with(tx, work);
                match pool {
                    Some(pool) => pool.install(produce),
                    None => produce(),
                }
            });

            let mut completed = 0usize;
            for (path, outcome) in rx {
                engine.merge(&path, outcome);
                completed += 1;
                if let Some(callback) = &self.progress_callback {
                    let status = engine
                        .records()
                        .get(&path)
                        .map(|r| r.status)
                        .unwrap_or(FileStatus::Unchecked);
                    callback(ProgressUpdate {
                        path,
                        status,
                        completed,
                        total,
                    });
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(root: &Path, name: &str, contents: &[u8]) {
        let path = paths::platform_path(root, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn md5_config() -> FormatConfig {
        FormatConfig::for_algorithm(Algorithm::Md5)
    }

    #[test]
    fn compute_then_verify_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"alpha");
        write_file(dir.path(), "sub/b.txt", b"beta");
        let sums = dir.path().join("sums.md5");

        let mut session =
            HashSession::new(dir.path(), Operation::Compute).with_config(md5_config());
        let summary = session.run().unwrap();
        assert_eq!(summary.good, 2);
        session.save(Some(&sums), Some(&summary)).unwrap();

        let mut verify = HashSession::new(dir.path(), Operation::Verify).with_config(md5_config());
        verify.load(&sums).unwrap();
        let summary = verify.run().unwrap();
        assert_eq!(summary.mismatched, 0);
        assert_eq!(summary.inaccessible, 0);
    }

    #[test]
    fn verify_flags_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"original");
        let sums = dir.path().join("sums.md5");

        let mut session =
            HashSession::new(dir.path(), Operation::Compute).with_config(md5_config());
        let summary = session.run().unwrap();
        session.save(Some(&sums), Some(&summary)).unwrap();

        write_file(dir.path(), "a.txt", b"tampered");

        let mut verify = HashSession::new(dir.path(), Operation::Verify).with_config(md5_config());
        verify.load(&sums).unwrap();
        let summary = verify.run().unwrap();
        assert_eq!(summary.mismatched, 1);
        assert_eq!(summary.mismatches[0].path, "a.txt");
        assert_ne!(summary.mismatches[0].stored, summary.mismatches[0].fresh);
    }

    #[test]
    fn delta_update_only_hashes_new_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"alpha");
        let sums = dir.path().join("sums.md5");

        let mut session =
            HashSession::new(dir.path(), Operation::Compute).with_config(md5_config());
        let summary = session.run().unwrap();
        session.save(Some(&sums), Some(&summary)).unwrap();
        let original_digest = session
            .records()
            .get("a.txt")
            .unwrap()
            .digest(Algorithm::Md5)
            .unwrap()
            .to_hex();

        // change a.txt after recording; delta must not rehash it
        write_file(dir.path(), "a.txt", b"changed");
        write_file(dir.path(), "b.txt", b"brand new");

        let mut update =
            HashSession::new(dir.path(), Operation::Update(UpdateMode::DeltaDeep))
                .with_config(md5_config());
        update.load(&sums).unwrap();
        update.run().unwrap();

        let records = update.records();
        assert_eq!(
            records.get("a.txt").unwrap().digest(Algorithm::Md5).unwrap().to_hex(),
            original_digest
        );
        assert!(records.get("b.txt").is_some());
    }

    #[test]
    fn missing_file_reported_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"alpha");
        let sums = dir.path().join("sums.md5");

        let mut session =
            HashSession::new(dir.path(), Operation::Compute).with_config(md5_config());
        let summary = session.run().unwrap();
        session.save(Some(&sums), Some(&summary)).unwrap();

        fs::remove_file(dir.path().join("a.txt")).unwrap();

        let mut verify = HashSession::new(dir.path(), Operation::Verify).with_config(md5_config());
        verify.load(&sums).unwrap();
        let summary = verify.run().unwrap();
        assert_eq!(summary.missing, 1);
        assert_eq!(
            verify.records().get("a.txt").unwrap().status,
            FileStatus::Missing
        );
    }
}
