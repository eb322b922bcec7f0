// Checksum file format module
// Reads and writes line-oriented checksum files under a FormatConfig

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::algorithm::{Algorithm, MIN_DIGEST_TEXT_LEN};
use crate::codec::DigestEncoding;
use crate::error::{HashKeepError, ParseWarning};
use crate::paths;
use crate::record::{ChecksumRecord, DigestValue, RecordSet};

/// Field order of a data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumLayout {
    /// md5sum convention: `<digest> <path>`, optionally `<digest> *<path>`
    DigestFirst,
    /// SFV convention: `<path> <digest>`
    PathFirst,
}

/// Character encoding of the checksum file itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn from_name(name: &str) -> Option<TextEncoding> {
        match name.to_lowercase().as_str() {
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Some(TextEncoding::Latin1),
            _ => None,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

/// Immutable configuration bundle for reading and writing one checksum file.
#[derive(Debug, Clone)]
pub struct FormatConfig {
    /// Primary algorithm of the file; the reader's width hint and the
    /// algorithm named in headers and type marks
    pub algorithm: Algorithm,
    /// Explicit digest column layout for legacy multi-algorithm files.
    /// Empty means a single column of the primary algorithm.
    pub columns: Vec<Algorithm>,
    pub digest_encoding: DigestEncoding,
    pub text_encoding: TextEncoding,
    pub layout: ChecksumLayout,
    pub comment_char: char,
    pub delimiter: char,
    pub write_header: bool,
    pub write_footer: bool,
    /// Embed a `?NAME*` type mark before the path (implies asterisk)
    pub write_type_marks: bool,
    /// md5sum binary-mode marker: `*` immediately before the path
    pub write_asterisk: bool,
    /// Header timestamp pattern, Qt style ("dd.MM.yyyy hh:mm:ss")
    pub datetime_format: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            columns: Vec::new(),
            digest_encoding: DigestEncoding::Base16Lower,
            text_encoding: TextEncoding::Utf8,
            layout: ChecksumLayout::DigestFirst,
            comment_char: ';',
            delimiter: ' ',
            write_header: true,
            write_footer: false,
            write_type_marks: false,
            write_asterisk: false,
            datetime_format: "dd.MM.yyyy hh:mm:ss".to_string(),
        }
    }
}

impl FormatConfig {
    /// Conventional configuration for an algorithm: SFV layout for CRC32,
    /// md5sum layout for everything else.
    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        let layout = match algorithm {
            Algorithm::Crc32 => ChecksumLayout::PathFirst,
            _ => ChecksumLayout::DigestFirst,
        };
        Self {
            algorithm,
            layout,
            ..Self::default()
        }
    }

    pub fn with_encoding(mut self, encoding: DigestEncoding) -> Self {
        self.digest_encoding = encoding;
        self
    }

    pub fn with_columns(mut self, columns: Vec<Algorithm>) -> Self {
        self.columns = columns;
        self
    }

    /// Number of digest fields expected per data line.
    fn column_count(&self) -> usize {
        self.columns.len().max(1)
    }
}

/// Translate a Qt date/time pattern to a chrono strftime pattern.
/// Covers the tokens checksum file headers actually use.
pub fn chrono_pattern(qt: &str) -> String {
    let chars: Vec<char> = qt.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        match c {
            'y' if run >= 4 => {
                out.push_str("%Y");
                i += 4;
            }
            'y' if run >= 2 => {
                out.push_str("%y");
                i += 2;
            }
            'M' if run >= 2 => {
                out.push_str("%m");
                i += 2;
            }
            'd' if run >= 2 => {
                out.push_str("%d");
                i += 2;
            }
            'h' | 'H' if run >= 2 => {
                out.push_str("%H");
                i += 2;
            }
            'm' if run >= 2 => {
                out.push_str("%M");
                i += 2;
            }
            's' if run >= 2 => {
                out.push_str("%S");
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Processing statistics echoed into the writer's footer block.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub good: usize,
    pub mismatched: usize,
    pub inaccessible: usize,
}

/// Result of parsing one checksum file.
#[derive(Debug)]
pub struct ParseOutcome {
    pub records: RecordSet,
    pub warnings: Vec<ParseWarning>,
    /// Primary algorithm, possibly corrected from header comments
    pub algorithm: Algorithm,
}

/// Parser for checksum file text.
pub struct ChecksumReader {
    config: FormatConfig,
}

impl ChecksumReader {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    /// Parse checksum file text into an ordered record set plus warnings.
    /// Malformed lines are skipped and reported, never fatal.
    pub fn read_str(&self, text: &str) -> ParseOutcome {
        let mut records = RecordSet::new();
        let mut warnings = Vec::new();
        let mut active = self.config.algorithm;

        // Header comments may name the algorithm the file was generated with
        if let Some(detected) = detect_algorithm_in_comments(text) {
            active = detected;
        }

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim_end();
            if line.is_empty() {
                continue;
            }
            // The configured comment char plus both conventional markers
            if line.starts_with(self.config.comment_char)
                || line.starts_with('#')
                || line.starts_with(';')
            {
                continue;
            }
            if line.len() <= MIN_DIGEST_TEXT_LEN {
                warnings.push(ParseWarning {
                    line: line_no + 1,
                    message: "line too short for a digest entry".to_string(),
                });
                continue;
            }

            match self.parse_data_line(line, active) {
                Ok(record) => records.insert(record),
                Err(message) => warnings.push(ParseWarning { line: line_no + 1, message }),
            }
        }

        ParseOutcome { records, warnings, algorithm: active }
    }

    /// Open and parse a checksum file, decompressing `.xz` transparently and
    /// decoding the configured text encoding.
    pub fn read_path(&self, path: &Path) -> Result<ParseOutcome, HashKeepError> {
        let mut file = File::open(path).map_err(|e| {
            HashKeepError::from_io_error(e, "opening checksum file", Some(path.to_path_buf()))
        })?;
        let mut bytes = Vec::new();
        if is_compressed(path) {
            XzDecoder::new(file).read_to_end(&mut bytes)
        } else {
            file.read_to_end(&mut bytes)
        }
        .map_err(|e| {
            HashKeepError::from_io_error(e, "reading checksum file", Some(path.to_path_buf()))
        })?;
        let text = self.config.text_encoding.decode(&bytes);
        Ok(self.read_str(&text))
    }

    fn parse_data_line(&self, line: &str, active: Algorithm) -> Result<ChecksumRecord, String> {
        let n = self.config.column_count();
        let (digest_fields, path_part) = match self.config.layout {
            ChecksumLayout::DigestFirst => split_digests_front(line, n, self.config.delimiter)?,
            ChecksumLayout::PathFirst => split_digests_back(line, n, self.config.delimiter)?,
        };

        // Type mark (`?NAME*path`) or bare asterisk before the path; the
        // asterisk marks md5sum binary mode and is stripped, not interpreted.
        // A mark binds only its own line, so marked and unmarked lines mix.
        let mut path_text = path_part;
        let mut mark: Option<Algorithm> = None;
        if let Some(rest) = path_text.strip_prefix('?') {
            if let Some(star) = rest.find('*') {
                if let Some(algorithm) = Algorithm::from_name(&rest[..star]) {
                    mark = Some(algorithm);
                }
                path_text = &rest[star + 1..];
            }
        } else if let Some(rest) = path_text.strip_prefix('*') {
            path_text = rest;
        }

        let path = paths::storage_path(path_text.trim());
        if path.is_empty() {
            return Err("empty path field".to_string());
        }

        let mut record = ChecksumRecord::new(path);
        for (i, field) in digest_fields.iter().enumerate() {
            if field.len() < MIN_DIGEST_TEXT_LEN {
                return Err(format!("digest field {:?} too short", field));
            }
            let bytes = self
                .config
                .digest_encoding
                .decode(field)
                .map_err(|e| e.to_string())?;
            let algorithm = self.resolve_column(i, bytes.len(), mark, active)?;
            record.set_digest(DigestValue::new(algorithm, bytes));
        }
        Ok(record)
    }

    /// Decide which algorithm a digest column belongs to: configured position,
    /// explicit type mark, the active algorithm when its width fits, or the
    /// first width-detected candidate.
    fn resolve_column(
        &self,
        index: usize,
        width: usize,
        mark: Option<Algorithm>,
        active: Algorithm,
    ) -> Result<Algorithm, String> {
        if let Some(configured) = self.config.columns.get(index) {
            if configured.digest_size() != width {
                return Err(format!(
                    "digest width {} does not match {} column",
                    width,
                    configured.name()
                ));
            }
            return Ok(*configured);
        }
        if let Some(marked) = mark {
            if marked.digest_size() == width {
                return Ok(marked);
            }
        }
        if active.digest_size() == width {
            return Ok(active);
        }
        Algorithm::detect(width)
            .first()
            .copied()
            .ok_or_else(|| format!("unknown digest length {} for the active encoding", width))
    }
}

/// Serializer for checksum file text.
pub struct ChecksumWriter {
    config: FormatConfig,
}

impl ChecksumWriter {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    /// Serialize a record set: optional header block, one data line per record
    /// in set order, optional footer block with processing statistics.
    ///
    /// Feeding the output back through `ChecksumReader` with the same config
    /// reproduces the record set exactly, up to decorative whitespace.
    pub fn write_str(&self, records: &RecordSet, stats: Option<&RunStats>) -> String {
        let mut out = String::new();
        let c = self.config.comment_char;

        if self.config.write_header {
            out.push_str(&format!(
                "{} {} file checksums generated by hashkeep {}\n",
                c,
                self.config.algorithm.name(),
                env!("CARGO_PKG_VERSION")
            ));
            let pattern = chrono_pattern(&self.config.datetime_format);
            out.push_str(&format!(
                "{} {} ({})\n",
                c,
                Local::now().format(&pattern),
                self.config.datetime_format
            ));
            out.push_str(&format!("{}\n", c));
        }

        for record in records.iter() {
            for line in self.data_lines(record) {
                out.push_str(&line);
                out.push('\n');
            }
        }

        if self.config.write_footer {
            if let Some(stats) = stats {
                out.push_str(&format!("{}\n", c));
                out.push_str(&format!(
                    "{} processed: {}, good: {}, mismatched: {}, inaccessible: {}\n",
                    c, stats.processed, stats.good, stats.mismatched, stats.inaccessible
                ));
            }
        }

        out
    }

    /// Write a checksum file, encoding text and compressing when the target
    /// path carries an `.xz` extension.
    pub fn write_path(
        &self,
        path: &Path,
        records: &RecordSet,
        stats: Option<&RunStats>,
    ) -> Result<(), HashKeepError> {
        let text = self.write_str(records, stats);
        let bytes = self.config.text_encoding.encode(&text);
        let file = File::create(path).map_err(|e| {
            HashKeepError::from_io_error(e, "creating checksum file", Some(path.to_path_buf()))
        })?;
        let io_err = |e| HashKeepError::from_io_error(e, "writing checksum file", Some(path.to_path_buf()));
        if is_compressed(path) {
            let mut encoder = XzEncoder::new(file, 6);
            encoder.write_all(&bytes).map_err(io_err)?;
            encoder.finish().map(|_| ()).map_err(io_err)
        } else {
            let mut file = file;
            file.write_all(&bytes).map_err(io_err)
        }
    }

    /// Data lines for one record. Without a column layout a record holding
    /// digests beyond the primary algorithm cannot sit on one line; each
    /// extra digest gets its own type-marked line, which the reader merges
    /// back into a single record by path.
    fn data_lines(&self, record: &ChecksumRecord) -> Vec<String> {
        if !self.config.columns.is_empty() {
            return self.positional_line(record).into_iter().collect();
        }
        record
            .digests
            .values()
            .map(|digest| {
                let text = self.config.digest_encoding.encode(&digest.bytes);
                let marked =
                    self.config.write_type_marks || digest.algorithm != self.config.algorithm;
                self.assemble_line(&text, record, marked.then_some(digest.algorithm))
            })
            .collect()
    }

    /// Fixed positional layout. A record lacking one of the configured
    /// columns would shift every following field, so it is skipped.
    fn positional_line(&self, record: &ChecksumRecord) -> Option<String> {
        let d = self.config.delimiter;
        let mut digests = Vec::with_capacity(self.config.columns.len());
        for algorithm in &self.config.columns {
            let digest = record.digest(*algorithm)?;
            digests.push(self.config.digest_encoding.encode(&digest.bytes));
        }
        let joined = digests.join(&d.to_string());
        Some(match self.config.layout {
            ChecksumLayout::DigestFirst => format!("{}{}{}", joined, d, record.path),
            ChecksumLayout::PathFirst => format!("{}{}{}", record.path, d, joined),
        })
    }

    fn assemble_line(
        &self,
        digest_text: &str,
        record: &ChecksumRecord,
        mark: Option<Algorithm>,
    ) -> String {
        let d = self.config.delimiter;
        match self.config.layout {
            ChecksumLayout::DigestFirst => {
                let separator = match mark {
                    Some(algorithm) => format!("{}?{}*", d, algorithm.name()),
                    None if self.config.write_asterisk => format!("{}*", d),
                    None => d.to_string(),
                };
                format!("{}{}{}", digest_text, separator, record.path)
            }
            ChecksumLayout::PathFirst => match mark {
                Some(algorithm) => {
                    format!("?{}*{}{}{}", algorithm.name(), record.path, d, digest_text)
                }
                None => format!("{}{}{}", record.path, d, digest_text),
            },
        }
    }
}

/// Compress an existing checksum file with LZMA, producing an `.xz` sibling.
pub fn compress_checksum_file(input_path: &Path) -> Result<PathBuf, HashKeepError> {
    let input = File::open(input_path).map_err(|e| {
        HashKeepError::from_io_error(e, "opening checksum file for compression", Some(input_path.to_path_buf()))
    })?;
    let output_path = match input_path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => input_path.with_extension(format!("{}.xz", ext)),
        None => input_path.with_extension("xz"),
    };
    let output = File::create(&output_path).map_err(|e| {
        HashKeepError::from_io_error(e, "creating compressed checksum file", Some(output_path.clone()))
    })?;
    let mut encoder = XzEncoder::new(output, 6);
    let mut reader = std::io::BufReader::new(input);
    std::io::copy(&mut reader, &mut encoder).map_err(|e| {
        HashKeepError::from_io_error(e, "compressing checksum file", Some(input_path.to_path_buf()))
    })?;
    encoder.finish().map_err(|e| {
        HashKeepError::from_io_error(e, "finalizing compression", Some(output_path.clone()))
    })?;
    Ok(output_path)
}

fn is_compressed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "xz")
        .unwrap_or(false)
}

/// Scan comment lines for a known algorithm name, as written by our header
/// and by most checksum tools.
fn detect_algorithm_in_comments(text: &str) -> Option<Algorithm> {
    for line in text.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') && !trimmed.starts_with(';') {
            continue;
        }
        let upper = trimmed.to_uppercase();
        // Longest names first so SHA512 is not mistaken for SHA1
        let mut by_length: Vec<Algorithm> = Algorithm::ALL.to_vec();
        by_length.sort_by_key(|a| std::cmp::Reverse(a.name().len()));
        for algorithm in by_length {
            if upper.contains(algorithm.name()) {
                return Some(algorithm);
            }
        }
    }
    None
}

/// Split `count` digest fields off the front of a data line.
/// Runs of the delimiter are collapsed, so md5sum's two-space form parses.
fn split_digests_front(
    line: &str,
    count: usize,
    delimiter: char,
) -> Result<(Vec<&str>, &str), String> {
    let mut rest = line;
    let mut digests = Vec::with_capacity(count);
    for i in 0..count {
        rest = rest.trim_start_matches(delimiter);
        let pos = rest
            .find(delimiter)
            .ok_or_else(|| "missing delimiter after digest field".to_string())?;
        if i == 0 && pos < MIN_DIGEST_TEXT_LEN {
            return Err("first field too short to be a digest".to_string());
        }
        digests.push(&rest[..pos]);
        rest = &rest[pos + delimiter.len_utf8()..];
    }
    // second delimiter position belongs to the binary-mode marker, keep '*'
    while rest.starts_with(delimiter) {
        rest = &rest[delimiter.len_utf8()..];
    }
    Ok((digests, rest))
}

/// Split `count` digest fields off the back of a data line (SFV layout).
fn split_digests_back(
    line: &str,
    count: usize,
    delimiter: char,
) -> Result<(Vec<&str>, &str), String> {
    let mut rest = line;
    let mut digests = Vec::with_capacity(count);
    for _ in 0..count {
        rest = rest.trim_end_matches(delimiter);
        let pos = rest
            .rfind(delimiter)
            .ok_or_else(|| "missing delimiter before digest field".to_string())?;
        digests.insert(0, &rest[pos + delimiter.len_utf8()..]);
        rest = &rest[..pos];
    }
    Ok((digests, rest.trim_end_matches(delimiter)))
}
