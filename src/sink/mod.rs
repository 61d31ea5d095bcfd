use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const MEGABYTE: u64 = 1024 * 1024;

/// Timestamp embedded in rotated backup names, millisecond precision.
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Append-only log file that rotates itself when a write would push it past
/// its size limit.
///
/// Rotation renames the active file to `<stem>-<UTC timestamp>.<ext>` (with a
/// `-N` sequence on collision), optionally gzips the result and prunes old
/// backups by count and age, then reopens a fresh file at the original path.
/// One mutex spans the whole check-rotate-write sequence, so concurrent
/// appends never interleave and never split a rotation boundary.
pub struct RotatingSink {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    max_age_days: u32,
    compress: bool,
    state: Mutex<SinkState>,
}

struct SinkState {
    file: Option<File>,
    size: u64,
}

impl RotatingSink {
    /// Create a sink for `path`. No file is opened until the first append.
    pub fn new(
        path: impl Into<PathBuf>,
        max_size_mb: u64,
        max_backups: usize,
        max_age_days: u32,
        compress: bool,
    ) -> Self {
        Self {
            path: path.into(),
            max_bytes: max_size_mb * MEGABYTE,
            max_backups,
            max_age_days,
            compress,
            state: Mutex::new(SinkState { file: None, size: 0 }),
        }
    }

    /// Append one serialized entry, rotating first if the write would push
    /// the file past the size limit.
    ///
    /// A failed rotation is reported and writing continues on the oversized
    /// file; the pending bytes are not dropped.
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let len = bytes.len() as u64;
        if len > self.max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write length {} exceeds maximum file size {}",
                    len, self.max_bytes
                ),
            ));
        }

        let mut state = self.state.lock();
        if state.file.is_none() {
            self.open_current(&mut state)?;
        }
        if state.size + len > self.max_bytes {
            if let Err(e) = self.rotate_locked(&mut state) {
                warn!("log rotation failed, continuing on current file: {}", e);
                crate::metrics::SINK_ERRORS.inc();
                if state.file.is_none() {
                    self.open_current(&mut state)?;
                }
            }
        }

        let file = state
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file not open"))?;
        file.write_all(bytes)?;
        state.size += len;
        Ok(())
    }

    /// Rotate immediately, regardless of the current file size.
    pub fn rotate(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        self.rotate_locked(&mut state)
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        match state.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_current(&self, state: &mut SinkState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        state.size = file.metadata().map(|m| m.len()).unwrap_or(0);
        state.file = Some(file);
        Ok(())
    }

    fn rotate_locked(&self, state: &mut SinkState) -> io::Result<()> {
        // Close the handle before renaming.
        state.file = None;

        if self.path.exists() {
            let backup = self.backup_path(Utc::now());
            if let Err(e) = fs::rename(&self.path, &backup) {
                // Reattach to the oversized file so pending writes still land.
                let _ = self.open_current(state);
                return Err(e);
            }
            if self.compress {
                if let Err(e) = compress_backup(&backup) {
                    warn!("failed to compress rotated log {:?}: {}", backup, e);
                }
            }
            self.prune_backups();
        }

        self.open_current(state)
    }

    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let dir = self.path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("log");
        let ext = self.path.extension().and_then(|s| s.to_str());
        let ts = now.format(BACKUP_TIME_FORMAT).to_string();

        let mut seq = 0u32;
        loop {
            let name = match (ext, seq) {
                (Some(e), 0) => format!("{}-{}.{}", stem, ts, e),
                (Some(e), n) => format!("{}-{}-{}.{}", stem, ts, n, e),
                (None, 0) => format!("{}-{}", stem, ts),
                (None, n) => format!("{}-{}-{}", stem, ts, n),
            };
            let candidate = dir.join(name);
            if !candidate.exists() && !gz_path(&candidate).exists() {
                return candidate;
            }
            seq += 1;
        }
    }

    /// Delete backups beyond the retained count, then those past the age cap.
    /// Both passes are best effort.
    fn prune_backups(&self) {
        let mut backups = self.list_backups();
        // Newest first; same-millisecond rotations are ordered by their
        // collision sequence number.
        backups.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

        let mut expired: Vec<PathBuf> = Vec::new();
        if self.max_backups > 0 && backups.len() > self.max_backups {
            expired.extend(
                backups
                    .split_off(self.max_backups)
                    .into_iter()
                    .map(|(_, _, p)| p),
            );
        }
        if self.max_age_days > 0 {
            let cutoff = Utc::now() - chrono::Duration::days(self.max_age_days as i64);
            expired.extend(
                backups
                    .iter()
                    .filter(|(ts, _, _)| *ts < cutoff)
                    .map(|(_, _, p)| p.clone()),
            );
        }

        for path in expired {
            if let Err(e) = fs::remove_file(&path) {
                warn!("failed to remove expired log backup {:?}: {}", path, e);
            }
        }
    }

    /// Rotated siblings of the active file, tagged with the timestamp and
    /// collision sequence parsed from their name (file mtime when the name
    /// does not parse).
    fn list_backups(&self) -> Vec<(DateTime<Utc>, u32, PathBuf)> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("log");
        let ext = self.path.extension().and_then(|s| s.to_str());
        let prefix = format!("{}-", stem);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut backups = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else { continue };

            let rest = rest.strip_suffix(".gz").unwrap_or(rest);
            let rest = match ext {
                Some(e) => match rest.strip_suffix(&format!(".{}", e)) {
                    Some(r) => r,
                    None => continue,
                },
                None => rest,
            };

            let tagged = parse_backup_timestamp(rest).or_else(|| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(|mtime| (DateTime::<Utc>::from(mtime), 0))
            });
            if let Some((ts, seq)) = tagged {
                backups.push((ts, seq, entry.path()));
            }
        }
        backups
    }
}

/// Parse the `BACKUP_TIME_FORMAT` portion of a backup name plus its optional
/// trailing `-N` collision sequence.
fn parse_backup_timestamp(s: &str) -> Option<(DateTime<Utc>, u32)> {
    let parse = |v: &str| NaiveDateTime::parse_from_str(v, BACKUP_TIME_FORMAT).ok();
    if let Some(naive) = parse(s) {
        return Some((Utc.from_utc_datetime(&naive), 0));
    }
    let (left, right) = s.rsplit_once('-')?;
    let seq: u32 = right.parse().ok()?;
    let naive = parse(left)?;
    Some((Utc.from_utc_datetime(&naive), seq))
}

fn gz_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".gz");
    PathBuf::from(os)
}

/// Replace `path` with a gzipped copy at `path.gz`.
fn compress_backup(path: &Path) -> io::Result<()> {
    let target = gz_path(path);
    let mut input = File::open(path)?;
    let output = File::create(&target)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    fs::remove_file(path)?;
    Ok(())
}
