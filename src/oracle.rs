//! Mount status oracles.
//!
//! `RefCounter` asks an oracle, once per path, whether that path is already
//! a mount point. `MountInfo` answers from a Linux mountinfo table; tests and
//! drivers with their own bookkeeping plug in anything implementing
//! `MountOracle`.

use log::warn;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Mount table of the calling process.
pub const SELF_MOUNTINFO: &str = "/proc/self/mountinfo";

#[derive(Debug, Error)]
pub enum MountCheckError {
    #[error("failed to read mount table {}: {source}", .table.display())]
    Io {
        table: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Answers whether a path is currently an active mount point.
pub trait MountOracle {
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError>;
}

impl<T: MountOracle + ?Sized> MountOracle for &T {
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError> {
        (**self).is_mounted(path)
    }
}

impl<T: MountOracle + ?Sized> MountOracle for Box<T> {
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError> {
        (**self).is_mounted(path)
    }
}

impl<T: MountOracle + ?Sized> MountOracle for Arc<T> {
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError> {
        (**self).is_mounted(path)
    }
}

/// Oracle backed by a closure; see [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F>(F);

/// Build an oracle from a closure.
///
/// ```
/// use mount_refcount::{from_fn, RefCounter};
///
/// let counter = RefCounter::with_oracle(from_fn(|p: &str| Ok(p == "/mnt/busy")));
/// assert_eq!(counter.increment("/mnt/busy"), 2);
/// assert_eq!(counter.increment("/mnt/idle"), 1);
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: Fn(&str) -> Result<bool, MountCheckError>,
{
    FromFn(f)
}

impl<F> MountOracle for FromFn<F>
where
    F: Fn(&str) -> Result<bool, MountCheckError>,
{
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError> {
        (self.0)(path)
    }
}

/// Reads a mountinfo table on every query.
///
/// Each line looks like
/// `36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw`;
/// the fifth field is the mount point, with whitespace and backslashes
/// octal-escaped. The table is handled as raw bytes since mount points need
/// not be UTF-8. A path is mounted iff its bytes equal some mount point
/// exactly. Lines without a fifth field are skipped.
#[derive(Debug, Clone)]
pub struct MountInfo {
    table: PathBuf,
}

impl MountInfo {
    pub fn new() -> Self {
        Self::with_table(SELF_MOUNTINFO)
    }

    /// Use another table, e.g. `/proc/<pid>/mountinfo` or a fixture file.
    pub fn with_table(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &Path {
        &self.table
    }

    fn read(&self) -> Result<Vec<u8>, MountCheckError> {
        fs::read(&self.table).map_err(|source| MountCheckError::Io {
            table: self.table.clone(),
            source,
        })
    }

    /// All mount points listed in the table, unescaped, in table order.
    pub fn mount_points(&self) -> Result<Vec<Vec<u8>>, MountCheckError> {
        Ok(Self::parse_mount_points(&self.read()?))
    }

    /// Parse mount points out of already-read mountinfo bytes. Blank lines
    /// are ignored; malformed lines are skipped with a warning.
    pub fn parse_mount_points(table: &[u8]) -> Vec<Vec<u8>> {
        scan(table).into_iter().map(Cow::into_owned).collect()
    }
}

impl Default for MountInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MountOracle for MountInfo {
    fn is_mounted(&self, path: &str) -> Result<bool, MountCheckError> {
        let table = self.read()?;
        Ok(scan(&table).iter().any(|p| p.as_ref() == path.as_bytes()))
    }
}

/// Mount points of every well-formed line. Skipped lines are reported once,
/// after the whole table has been read, so no line hides another.
fn scan(table: &[u8]) -> Vec<Cow<'_, [u8]>> {
    let mut points = Vec::new();
    let mut skipped = Vec::new();
    for (i, line) in table.split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let field = line
            .split(u8::is_ascii_whitespace)
            .filter(|f| !f.is_empty())
            .nth(4);
        match field {
            Some(f) => points.push(unescape(f)),
            None => skipped.push(i + 1),
        }
    }
    if !skipped.is_empty() {
        warn!(
            "skipped {} mount table line(s) without a mount point field: {:?}",
            skipped.len(),
            skipped
        );
    }
    points
}

/// Decode `\NNN` octal escapes as written by the kernel's `seq_path`.
fn unescape(field: &[u8]) -> Cow<'_, [u8]> {
    if !field.contains(&b'\\') {
        return Cow::Borrowed(field);
    }
    let b = field;
    let mut out = Vec::with_capacity(b.len());
    let mut i = 0;
    while i < b.len() {
        if b[i] == b'\\' && i + 3 < b.len() && is_octal_triplet(&b[i + 1..i + 4]) {
            let v = b[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, c| acc * 8 + u32::from(c - b'0'));
            if let Ok(byte) = u8::try_from(v) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(b[i]);
        i += 1;
    }
    Cow::Owned(out)
}

fn is_octal_triplet(b: &[u8]) -> bool {
    b.len() == 3 && b.iter().all(|c| (b'0'..=b'7').contains(c))
}
