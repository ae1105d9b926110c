//! Tracing setup for the `backup` binary.
//!
//! Human logs go to stderr at `info` (or `RUST_LOG`). With `--log-file`, a
//! second layer appends everything at `debug` and above to that file, which
//! is rotated first when it has grown past [`MAX_LOG_BYTES`]:
//!   backup.log → backup.log.1 → … → backup.log.5

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Rotate once the log file reaches 10 MiB.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept next to the live file.
pub const MAX_ROTATED_FILES: usize = 5;

pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(filter);

    let file = match log_file {
        Some(path) => Some(open_log_file(path)?),
        None => None,
    };
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::DEBUG)
    });

    // A subscriber may already be set (tests); keep it.
    let _ = tracing_subscriber::registry()
        .with(stderr)
        .with(file_layer)
        .try_init();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log folder {}", parent.display()))?;
    }
    // Logging is not up yet; report on stderr directly.
    match rotate_if_needed(path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(_) => {}
        Err(err) => eprintln!("warning: log rotation failed for {}: {err}", path.display()),
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// Rotate `log_path` when it is at least `max_bytes` long.
///
/// The oldest copy (`<name>.<max_files>`) is dropped, the others shift up by
/// one and the live file becomes `<name>.1`. Returns whether a rotation
/// happened; a missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
