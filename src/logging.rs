//! Structured logging init plus the three plain-text `.meta` transcripts the
//! on-disk KB format carries alongside a compressed KB (`log.meta`,
//! `stdout.meta`, `stderr.meta`).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the process-wide subscriber. Returns a guard that must stay
/// alive for the duration of the run — dropping it stops the non-blocking
/// file writer from flushing.
pub fn init(level: &str, format: LogFormat, log_meta_path: &Path) -> std::io::Result<WorkerGuard> {
    let file = OpenOptions::new().create(true).append(true).open(log_meta_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(guard)
}

/// One of the run's three free-form transcripts; each line is appended as
/// plain text, matching the original's raw stream redirection rather than
/// `tracing`'s structured event format.
pub struct Transcript {
    file: File,
}

impl Transcript {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Transcript { file })
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.file, "{line}")
    }
}

/// The three transcripts a run keeps, opened against `<output_dir>/<id>.meta`.
pub struct Transcripts {
    pub log: Transcript,
    pub stdout: Transcript,
    pub stderr: Transcript,
}

impl Transcripts {
    pub fn open(output_dir: &Path) -> std::io::Result<Self> {
        Ok(Transcripts {
            log: Transcript::create(&output_dir.join("log.meta"))?,
            stdout: Transcript::create(&output_dir.join("stdout.meta"))?,
            stderr: Transcript::create(&output_dir.join("stderr.meta"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.meta");
        let mut transcript = Transcript::create(&path).unwrap();
        transcript.write_line("started").unwrap();
        transcript.write_line("finished").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "started\nfinished\n");
    }

    #[test]
    fn transcripts_open_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let transcripts = Transcripts::open(dir.path()).unwrap();
        drop(transcripts);
        assert!(dir.path().join("log.meta").exists());
        assert!(dir.path().join("stdout.meta").exists());
        assert!(dir.path().join("stderr.meta").exists());
    }
}
