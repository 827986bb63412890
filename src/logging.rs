//! Log backend setup
//!
//! Lines are written as `MM-DD-YYYY HH:MM:SS <target> <level>: <message>`.
//! `RUST_LOG` overrides the level passed to [`init`].
//!
//! [`init_with_file`] sends the same lines to a file instead of stderr. The
//! file is rotated once it reaches [`LOG_FILE_MAX_BYTES`]: `app.log` becomes
//! `app.log.1`, `app.log.1` becomes `app.log.2` and so on, keeping
//! [`LOG_FILE_BACKUPS`] old files.

use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use env_logger::{Builder, Env, Target};
use log::{LevelFilter, Record};

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

/// Size at which the log file is rotated
pub const LOG_FILE_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Rotated log files kept next to the active one
pub const LOG_FILE_BACKUPS: usize = 5;

/// Install the `env_logger` backend. Calling it again is a no-op.
pub fn init(level: LevelFilter) {
    let _ = builder(level).try_init();
}

/// Install the backend writing to a rotating file at `path`. Fails only when
/// the file cannot be opened; a second install is a no-op as with [`init`].
pub fn init_with_file(level: LevelFilter, path: impl AsRef<Path>) -> Result<()> {
    let file = RotatingFile::open(path, LOG_FILE_MAX_BYTES, LOG_FILE_BACKUPS)?;
    let _ = builder(level).target(Target::Pipe(Box::new(file))).try_init();
    Ok(())
}

/// Backend builder with the client's line format, for callers that want to
/// adjust it before installing
pub fn builder(level: LevelFilter) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format(|buf, record| writeln!(buf, "{}", format_line(record)));
    builder
}

fn format_line(record: &Record<'_>) -> String {
    format!(
        "{} {} {}: {}",
        chrono::Local::now().format(TIMESTAMP_FORMAT),
        record.target(),
        record.level().as_str().to_lowercase(),
        record.args()
    )
}

/// Append-only log file that rotates by size
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
