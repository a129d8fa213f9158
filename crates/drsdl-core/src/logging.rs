//! Logging init: a single subscriber, installed once by the CLI binary,
//! fanning out to a truncate-on-start log file in the current directory and
//! (when `--verbose`) stderr.

use anyhow::Result;
use std::fs;
use std::io;
use std::sync::Mutex;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "drs_downloader.log";

struct FileAndMaybeStderr {
    file: std::fs::File,
    echo_to_stderr: bool,
}

impl io::Write for FileAndMaybeStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.echo_to_stderr {
            io::stderr().lock().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.echo_to_stderr {
            io::stderr().lock().flush()?;
        }
        Ok(())
    }
}

/// `verbose` only controls whether info-and-below also echo to stderr;
/// warn/error always do (§4.5/§6).
struct DualMakeWriter {
    file: Mutex<std::fs::File>,
    verbose: bool,
}

impl DualMakeWriter {
    fn writer(&self, echo_to_stderr: bool) -> FileAndMaybeStderr {
        let file = self
            .file
            .lock()
            .unwrap()
            .try_clone()
            .expect("log file handle is always cloneable");
        FileAndMaybeStderr {
            file,
            echo_to_stderr,
        }
    }
}

impl<'a> MakeWriter<'a> for DualMakeWriter {
    type Writer = FileAndMaybeStderr;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(self.verbose)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        let always_echoes = meta.level() <= &Level::WARN;
        self.writer(always_echoes || self.verbose)
    }
}

/// Initializes logging for the whole process. The file (truncated at start,
/// in the current working directory) always receives every record; stderr
/// always receives warn/error, and additionally info-and-below when
/// `verbose` is set.
pub fn init_logging(verbose: bool) -> Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(LOG_FILE_NAME)?;

    let writer: BoxMakeWriter = BoxMakeWriter::new(DualMakeWriter {
        file: Mutex::new(file),
        verbose,
    });

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},drsdl=debug")));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    tracing::info!("logging initialized at ./{}", LOG_FILE_NAME);
    Ok(())
}
