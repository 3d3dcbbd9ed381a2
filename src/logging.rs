//! Tracing setup: human-oriented stderr output plus a debug-level log file.

use anyhow::{anyhow, Result};
use std::fs::{create_dir_all, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Directive for stderr output at the given `-v` count
fn stderr_directive(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("warn,batchmux=info"),
        _ => Some("info,batchmux=debug"),
    }
}

const FILE_DIRECTIVE: &str = "info,batchmux=debug";

pub fn init_tracing(verbose: u8, log_path: &Path) -> Result<()> {
    let stderr_filter = match stderr_directive(verbose) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let file_layer = create_log_writer(log_path).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(EnvFilter::new(FILE_DIRECTIVE))
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!("failed to init tracing: {err}"))
}

/// Append-mode log file; `None` (with a note on stderr) if it cannot be opened
fn create_log_writer(path: &Path) -> Option<SharedFileMakeWriter> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!("failed to create log directory '{}': {}", parent.display(), err);
                return None;
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(SharedFileMakeWriter::new(file)),
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", path.display(), err);
            None
        }
    }
}

#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl SharedFileMakeWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

struct SharedFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> fmt::MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: self.file.clone(),
        }
    }
}

impl std::io::Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::write(&mut *file, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::flush(&mut *file)
    }
}
