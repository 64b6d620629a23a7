//! Transcript sinks: append-only persistence of turns.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SinkWriteError;
use crate::turn::Turn;

/// Append-only destination for the turns of one scenario run.
///
/// No read, update or delete is exposed. A failed append is reported to
/// the caller and ends the cycle.
pub trait TranscriptSink {
    fn append(&mut self, turn: &Turn) -> Result<(), SinkWriteError>;
}

/// In-memory sink, handy for dry runs and tests.
impl TranscriptSink for Vec<Turn> {
    fn append(&mut self, turn: &Turn) -> Result<(), SinkWriteError> {
        self.push(turn.clone());
        Ok(())
    }
}

/// Newline-delimited JSON file, one object per turn.
///
/// Each append writes one complete line and flushes it, so a crash leaves
/// a valid prefix of the transcript behind.
#[derive(Debug)]
pub struct JsonlTranscript {
    path: PathBuf,
    file: File,
    written: usize,
}

impl JsonlTranscript {
    /// Create (or truncate) the transcript file, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkWriteError> {
        let path = path.as_ref().to_path_buf();
        let wrap = |source| SinkWriteError {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        let file = File::create(&path).map_err(wrap)?;

        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of turns appended so far.
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }
}

impl TranscriptSink for JsonlTranscript {
    fn append(&mut self, turn: &Turn) -> Result<(), SinkWriteError> {
        let mut line = serde_json::to_string(turn).map_err(|e| SinkWriteError {
            path: self.path.clone(),
            source: e.into(),
        })?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|source| SinkWriteError {
                path: self.path.clone(),
                source,
            })?;

        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{Phase, TurnClock};

    #[test]
    fn test_create_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("run.jsonl");
        let sink = JsonlTranscript::create(&path).unwrap();
        assert!(path.exists());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let _sink = JsonlTranscript::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_append_writes_one_line_per_turn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let mut sink = JsonlTranscript::create(&path).unwrap();
        let mut clock = TurnClock::new();

        sink.append(&Turn::new(clock.now(), "God", "Fire in the granary.", Some(Phase::Crisis)))
            .unwrap();
        sink.append(&Turn::new(clock.now(), "Farmer", "Line one\nline two", None))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(sink.len(), 2);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_vec_sink_collects_turns() {
        let mut sink: Vec<Turn> = Vec::new();
        let mut clock = TurnClock::new();
        let turn = Turn::new(clock.now(), "God", "Drought.", Some(Phase::Crisis));
        // Inherent Vec::append would shadow the trait method
        TranscriptSink::append(&mut sink, &turn).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].speaker, "God");
    }
}
