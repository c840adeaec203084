//! Remote listing parser.
//!
//! Turns raw textual output of the board tool's `ls` command into structured
//! path entries. The raw text arrives either as captured subprocess output or
//! as the content of a log file the interactive shell was redirected into,
//! and the exact shape (header lines, column widths, directory markers,
//! encoding) is a per-tool-version contract. All of that scraping is
//! confined to this module: when the tool's output format drifts, only a
//! [`ListingFormat`] needs to change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::{CommandExecutor, CommandTarget, DeviceCommand, LogFilePoller};

/// A single path entry on the device.
///
/// Directories carry a trailing `/`; files are recognized by their extension.
/// Entries are produced fresh on every listing call and never cached, since
/// the remote file system may change between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Device-side path, always `/`-separated.
    pub path: String,
}

impl RemoteEntry {
    /// Create an entry from a device path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Whether this entry is a directory (trailing separator marker).
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Whether this entry looks like a file (an extension is present in the
    /// final path segment).
    #[must_use]
    pub fn is_file(&self) -> bool {
        !self.is_dir() && self.file_name().rsplit_once('.').is_some_and(|(stem, _)| !stem.is_empty())
    }

    /// Final path segment, without any trailing separator.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    /// Depth of the entry: number of `/`-separated segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .count()
    }
}

impl std::fmt::Display for RemoteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Description of one tool version's listing output shape.
///
/// The textual contract of the board tool is version-dependent and has
/// drifted historically; each known shape gets its own constructor here and
/// nothing outside this module assumes anything about the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFormat {
    /// Fixed number of title/column-header lines to discard from the front.
    pub header_lines: usize,
    /// Fixed number of trailing summary lines to discard from the back.
    pub footer_lines: usize,
    /// Width of the leading size/flags column to strip, in characters.
    /// Zero means the line is a single `size name` pair instead.
    pub leading_width: usize,
    /// Flag token that marks directory rows (e.g. `d----`). Converted to a
    /// trailing `/` on the parsed path.
    pub dir_flag: Option<String>,
    /// Whether lines are `size name` pairs whose size token must be dropped.
    pub size_name_pairs: bool,
    /// Whether long names wrap onto continuation lines that are indented by
    /// `leading_width` spaces and must be re-joined before splitting.
    pub join_wrapped_lines: bool,
}

impl ListingFormat {
    /// Output of the board tool's own `ls` command captured directly:
    /// one `ls :` title line, then right-aligned size and name per line,
    /// directories already marked with a trailing `/`.
    #[must_use]
    pub const fn device() -> Self {
        Self {
            header_lines: 1,
            footer_lines: 0,
            leading_width: 0,
            dir_flag: None,
            size_name_pairs: true,
            join_wrapped_lines: false,
        }
    }

    /// Columnar interactive-shell listing redirected into a log file:
    /// five header lines (blank, directory banner, blank, column headers,
    /// separator), a fifty-character mode/timestamp/length column, and a
    /// `d----` mode prefix on directory rows.
    #[must_use]
    pub fn shell_log() -> Self {
        Self {
            header_lines: 5,
            footer_lines: 0,
            leading_width: 50,
            dir_flag: Some("d----".to_string()),
            size_name_pairs: false,
            join_wrapped_lines: true,
        }
    }

    /// One descriptor per line, no decoration. Used for `connect list`.
    #[must_use]
    pub const fn plain() -> Self {
        Self {
            header_lines: 0,
            footer_lines: 0,
            leading_width: 0,
            dir_flag: None,
            size_name_pairs: false,
            join_wrapped_lines: false,
        }
    }
}

/// Parse raw listing text into ordered path entries.
///
/// Empty or whitespace-only input yields an empty sequence, never an error:
/// callers treat "nothing listed" as "nothing to do".
#[must_use]
pub fn parse_listing(raw: &str, format: &ListingFormat) -> Vec<RemoteEntry> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let unwrapped;
    let text = if format.join_wrapped_lines && format.leading_width > 0 {
        // Wrapped rows continue on the next line, indented to the data column.
        let continuation = format!(r"\r?\n {{{}}}", format.leading_width);
        match regex::Regex::new(&continuation) {
            Ok(re) => {
                unwrapped = re.replace_all(raw, "").into_owned();
                unwrapped.as_str()
            }
            Err(_) => raw,
        }
    } else {
        raw
    };

    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let end = lines.len().saturating_sub(format.footer_lines);
    let data = if format.header_lines >= end {
        &[][..]
    } else {
        &lines[format.header_lines..end]
    };

    let mut entries = Vec::new();
    for line in data {
        if line.trim().is_empty() {
            continue;
        }

        let is_dir_row = format
            .dir_flag
            .as_deref()
            .is_some_and(|flag| line.starts_with(flag));

        let mut name: &str = if format.leading_width > 0 {
            // Strip the fixed-width mode/size column. Rows shorter than the
            // column carry no name at all.
            match line.char_indices().nth(format.leading_width) {
                Some((idx, _)) => &line[idx..],
                None => continue,
            }
        } else {
            line
        };

        if format.size_name_pairs {
            name = match name.trim_start().split_once(' ') {
                Some((_, rest)) => rest,
                // A pair row without a size token is noise.
                None => continue,
            };
        }

        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let path = if is_dir_row && !name.ends_with('/') {
            format!("{name}/")
        } else {
            name.to_string()
        };
        entries.push(RemoteEntry::new(path));
    }

    debug!("Parsed {} listing entries", entries.len());
    entries
}

/// Decode raw listing bytes whose charset is not known in advance.
///
/// The interactive shell's output encoding is locale-dependent, so the
/// charset is sniffed statistically before decoding rather than assumed.
#[must_use]
pub fn decode_listing(bytes: &[u8]) -> String {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding: &'static encoding_rs::Encoding = detector.guess(None, true);
    let (text, actual, malformed) = encoding.decode(bytes);
    if malformed {
        debug!("Listing decode via {} contained malformed sequences", actual.name());
    }
    text.into_owned()
}

/// Acquires remote listings through the transport and parses them.
///
/// Listings are produced fresh on every call; nothing is cached, because the
/// remote file system may change between calls.
#[derive(Clone)]
pub struct RemoteLister {
    executor: Arc<dyn CommandExecutor>,
    format: ListingFormat,
}

impl RemoteLister {
    /// Lister using the captured `ls` output format.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            format: ListingFormat::device(),
        }
    }

    /// Override the expected listing format.
    #[must_use]
    pub fn with_format(mut self, format: ListingFormat) -> Self {
        self.format = format;
        self
    }

    /// List the device by capturing the tool's `ls` output.
    ///
    /// A failed invocation yields an empty sequence rather than an error:
    /// callers treat it as "nothing to do". The no-device case is gated
    /// earlier, when the caller resolves its [`CommandTarget`].
    pub async fn list(&self, target: &CommandTarget) -> Result<Vec<RemoteEntry>> {
        let output = self.executor.run(&DeviceCommand::ls(), target).await?;
        if !output.success {
            warn!("Listing command failed; treating as empty listing");
            return Ok(Vec::new());
        }
        Ok(parse_listing(&output.stdout, &self.format))
    }

    /// List the device from a shell log the terminal redirected to disk.
    ///
    /// The poller waits (bounded) until the log is fully written, and the
    /// shell-log column format is used regardless of this lister's capture
    /// format.
    pub async fn list_from_log(&self, poller: &LogFilePoller) -> Result<Vec<RemoteEntry>> {
        let raw = poller.wait_and_read().await?;
        Ok(parse_listing(&raw, &ListingFormat::shell_log()))
    }
}
