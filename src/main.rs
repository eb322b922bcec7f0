mod algorithm;
mod codec;
mod error;
mod format;
mod hasher;
mod paths;
mod reconcile;
mod record;
mod session;
mod walk;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use algorithm::Algorithm;
use codec::DigestEncoding;
use format::{FormatConfig, TextEncoding};
use reconcile::{Operation, RunSummary, UpdateMode, UpdateOptions};
use session::{HashSession, ProgressUpdate};

#[derive(Parser)]
#[command(
    name = "hashkeep",
    version,
    about = "Compute, verify, and incrementally update checksum files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct FormatArgs {
    /// Hash algorithm (crc32, md4, md5, sha1, sha256, sha512, ed2k, ...)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Digest text encoding (hex, hexupper, base32, base32hex, base64, base64url)
    #[arg(long, default_value = "hex")]
    encoding: String,

    /// Text encoding of the checksum file itself (utf-8, latin-1)
    #[arg(long, default_value = "utf-8")]
    charset: String,

    /// Comment character for header and footer lines
    #[arg(long, default_value = ";")]
    comment_char: char,

    /// Write md5sum binary-mode asterisks before paths
    #[arg(long)]
    asterisk: bool,

    /// Embed ?NAME* algorithm type marks before paths
    #[arg(long)]
    type_marks: bool,

    /// Skip the generated-by header block
    #[arg(long)]
    no_header: bool,

    /// Append a footer block with processing counts
    #[arg(long)]
    footer: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Hash every file under a root directory into a new checksum file
    Compute {
        /// Directory to hash
        root: PathBuf,

        /// Checksum file to write; `.xz` suffix compresses transparently
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        format: FormatArgs,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check recorded digests against the files on disk
    Verify {
        /// Checksum file to verify
        file: PathBuf,

        /// Root the recorded paths are relative to (default: the file's directory)
        root: Option<PathBuf>,

        #[command(flatten)]
        format: FormatArgs,

        #[arg(short, long, default_value_t = 0)]
        jobs: usize,

        #[arg(long)]
        json: bool,
    },

    /// Bring an existing checksum file up to date with the filesystem
    Update {
        /// Checksum file to update in place
        file: PathBuf,

        /// Root the recorded paths are relative to (default: the file's directory)
        root: Option<PathBuf>,

        /// brief, deep, complete, delta-deep, or delta-complete
        #[arg(short, long, default_value = "brief")]
        mode: String,

        /// Drop records whose file no longer exists
        #[arg(long)]
        remove_missing: bool,

        /// Leave the root directory itself out of discovery
        #[arg(long)]
        skip_root: bool,

        #[command(flatten)]
        format: FormatArgs,

        #[arg(short, long, default_value_t = 0)]
        jobs: usize,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    match cli.command {
        Command::Compute {
            root,
            output,
            format,
            jobs,
            json,
        } => {
            let config = build_config(&format, Some(&output))?;
            let (pb, callback) = make_progress();
            let mut session = HashSession::new(&root, Operation::Compute)
                .with_config(config)
                .with_jobs(jobs)
                .with_progress_callback(callback);
            let summary = session.run()?;
            pb.finish_and_clear();
            session
                .save(Some(&output), Some(&summary))
                .with_context(|| format!("writing {}", output.display()))?;
            report(&summary, json)?;
            Ok(summary.inaccessible == 0)
        }

        Command::Verify {
            file,
            root,
            format,
            jobs,
            json,
        } => {
            let root = default_root(&file, root)?;
            let config = build_config(&format, Some(&file))?;
            let (pb, callback) = make_progress();
            let mut session = HashSession::new(&root, Operation::Verify)
                .with_config(config)
                .with_jobs(jobs)
                .with_progress_callback(callback);
            session
                .load(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            print_warnings(&session);
            let summary = session.run()?;
            pb.finish_and_clear();
            report(&summary, json)?;
            Ok(summary.is_clean())
        }

        Command::Update {
            file,
            root,
            mode,
            remove_missing,
            skip_root,
            format,
            jobs,
            json,
        } => {
            let mode = UpdateMode::from_name(&mode)
                .with_context(|| format!("unknown update mode {:?}", mode))?;
            let root = default_root(&file, root)?;
            let config = build_config(&format, Some(&file))?;
            let options = UpdateOptions {
                include_root: !skip_root,
                keep_missing: !remove_missing,
            };
            let (pb, callback) = make_progress();
            let mut session = HashSession::new(&root, Operation::Update(mode))
                .with_config(config)
                .with_options(options)
                .with_jobs(jobs)
                .with_progress_callback(callback);
            session
                .load(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            print_warnings(&session);
            let summary = session.run()?;
            pb.finish_and_clear();
            session
                .save(None, Some(&summary))
                .with_context(|| format!("writing {}", file.display()))?;
            report(&summary, json)?;
            Ok(summary.inaccessible == 0)
        }
    }
}

/// Resolve the algorithm and format flags into a FormatConfig. When no
/// algorithm is given, the checksum file's extension decides.
fn build_config(args: &FormatArgs, checksum_file: Option<&Path>) -> Result<FormatConfig> {
    let algorithm = match &args.algorithm {
        Some(name) => {
            Algorithm::from_name(name).with_context(|| format!("unknown algorithm {:?}", name))?
        }
        None => checksum_file
            .and_then(algorithm_from_extension)
            .unwrap_or(Algorithm::Sha256),
    };
    let encoding = DigestEncoding::from_name(&args.encoding)
        .with_context(|| format!("unknown digest encoding {:?}", args.encoding))?;
    let text_encoding = TextEncoding::from_name(&args.charset)
        .with_context(|| format!("unknown charset {:?}", args.charset))?;

    let mut config = FormatConfig::for_algorithm(algorithm).with_encoding(encoding);
    config.text_encoding = text_encoding;
    config.comment_char = args.comment_char;
    config.write_asterisk = args.asterisk;
    config.write_type_marks = args.type_marks;
    config.write_header = !args.no_header;
    config.write_footer = args.footer;
    Ok(config)
}

fn algorithm_from_extension(path: &Path) -> Option<Algorithm> {
    // skip the compression suffix: sums.md5.xz names an MD5 file
    let mut path = path.to_path_buf();
    if path.extension().and_then(|e| e.to_str()) == Some("xz") {
        path.set_extension("");
    }
    let ext = path.extension()?.to_str()?.to_lowercase();
    if ext == "sfv" {
        return Some(Algorithm::Crc32);
    }
    Algorithm::from_name(&ext)
}

fn default_root(file: &Path, root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = root {
        return Ok(root);
    }
    match file.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(PathBuf::from(".")),
        Some(parent) => Ok(parent.to_path_buf()),
        None => bail!("cannot derive a root directory from {}", file.display()),
    }
}

fn make_progress() -> (ProgressBar, session::ProgressCallback) {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    let pb_callback = pb.clone();
    let callback: session::ProgressCallback = Arc::new(move |update: ProgressUpdate| {
        pb_callback.set_length(update.total as u64);
        pb_callback.set_position(update.completed as u64);
        pb_callback.set_message(update.path);
    });
    (pb, callback)
}

fn print_warnings(session: &HashSession) {
    for warning in session.warnings() {
        eprintln!("Warning: {}", warning);
    }
}

/// Console or JSON run report. The console form mirrors the footer counts and
/// lists each digest disagreement with both values.
fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "processed: {}, good: {}, mismatched: {}, inaccessible: {}, missing: {}",
        summary.processed,
        summary.good,
        summary.mismatched,
        summary.inaccessible,
        summary.missing
    );
    if summary.cancelled {
        println!("run cancelled; results are partial");
    }
    for m in &summary.mismatches {
        println!(
            "MISMATCH {} [{}]\n  stored: {}\n  fresh:  {}",
            m.path, m.algorithm, m.stored, m.fresh
        );
    }
    Ok(())
}
