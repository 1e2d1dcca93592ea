use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::ffi::OsStr;
use std::{io::Write, path::PathBuf};

use crate::error::InstrumentError;

const MAX_FLUSH_FAILURES: usize = 10;

/// Buffered JSON Lines writer for instrument readings.
///
/// Records are appended to the file once `buffer_size` of them have been
/// collected. With `final_json` set the file is rewritten as a pretty JSON
/// array by [`DataLogger::finalize_as_json`] (or on drop).
#[derive(Debug)]
pub struct DataLogger<T>
where
    T: Serialize + DeserializeOwned,
{
    buffer: Vec<T>,
    buffer_size: usize,
    file_path: PathBuf,
    final_json: bool,
    finalized: bool,
    flush_failures: usize,
}

impl<T> DataLogger<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new<P: Into<PathBuf>>(file_path: P, buffer_size: usize, final_json: bool) -> Self {
        let mut path = file_path.into();
        let extension = if final_json { "json" } else { "jsonl" };
        if path.extension() != Some(OsStr::new(extension)) {
            path.set_extension(extension);
        }

        Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
            file_path: path,
            final_json,
            finalized: false,
            flush_failures: 0,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.file_path
    }

    /// Buffer a record. Fails once the file has been rewritten as a JSON array.
    pub fn add(&mut self, record: T) -> Result<(), InstrumentError> {
        if self.finalized {
            return Err(InstrumentError::InvalidArgument(format!(
                "{} is already finalized as JSON",
                self.file_path.display()
            )));
        }
        self.buffer.push(record);
        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Append buffered records to the file.
    ///
    /// A failed flush keeps the records buffered and is only reported as an
    /// error after repeated consecutive failures.
    pub fn flush(&mut self) -> Result<(), InstrumentError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        match self.write_buffer() {
            Ok(()) => {
                self.flush_failures = 0;
                self.buffer.clear();
                log::debug!("Flushed readings to {}", self.file_path.display());
                Ok(())
            }
            Err(e) => {
                self.flush_failures += 1;
                log::error!(
                    "Flush failure {}/{}: {}",
                    self.flush_failures,
                    MAX_FLUSH_FAILURES,
                    e
                );
                if self.flush_failures % 3 == 0 {
                    log::warn!(
                        "Experiencing intermittent flush failures ({}/{})",
                        self.flush_failures,
                        MAX_FLUSH_FAILURES
                    );
                }

                if self.flush_failures >= MAX_FLUSH_FAILURES {
                    return Err(InstrumentError::Io {
                        source: std::io::Error::other(e.to_string()),
                        context: format!(
                            "Too many consecutive flush failures ({}) for {:?}",
                            MAX_FLUSH_FAILURES, self.file_path
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    fn write_buffer(&self) -> Result<(), InstrumentError> {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| InstrumentError::io(e, format!("creating {}", parent.display())))?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| InstrumentError::io(e, format!("opening {:?}", self.file_path)))?;

        let mut writer = std::io::BufWriter::new(file);
        for record in &self.buffer {
            let line = serde_json::to_string(record)?;
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Rewrite the JSONL file as a JSON array. Does nothing unless the logger
    /// was created with `final_json`.
    pub fn finalize_as_json(&mut self) -> Result<(), InstrumentError> {
        if !self.final_json || self.finalized {
            return Ok(());
        }
        self.flush()?;
        if !self.file_path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.file_path).map_err(|source| {
            InstrumentError::io(
                source,
                format!("Could not read JSONL file at {:?}", self.file_path),
            )
        })?;

        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let record: T = serde_json::from_str(line)?;
            entries.push(record);
        }

        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.file_path, json).map_err(|source| {
            InstrumentError::io(
                source,
                format!("Could not write JSON file at {:?}", self.file_path),
            )
        })?;

        self.finalized = true;
        info!("Converted {} readings from JSONL to JSON", entries.len());
        Ok(())
    }

    /// Records waiting to be flushed
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> Drop for DataLogger<T>
where
    T: Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        let _ = self.flush();
        let _ = self.finalize_as_json();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        n: u32,
        value: f64,
    }

    #[test]
    fn test_extension_is_forced() {
        let logger: DataLogger<Sample> = DataLogger::new("out/readings.txt", 4, false);
        assert_eq!(logger.path(), std::path::Path::new("out/readings.jsonl"));
        let logger: DataLogger<Sample> = DataLogger::new("out/readings", 4, true);
        assert_eq!(logger.path(), std::path::Path::new("out/readings.json"));
    }

    #[test]
    fn test_flushes_when_buffer_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");
        let mut logger = DataLogger::new(&path, 2, false);

        logger.add(Sample { n: 1, value: 0.5 }).unwrap();
        assert_eq!(logger.len(), 1);
        assert!(!path.exists());

        logger.add(Sample { n: 2, value: 1.5 }).unwrap();
        assert!(logger.is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Sample = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, Sample { n: 1, value: 0.5 });
    }

    #[test]
    fn test_finalize_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        {
            let mut logger = DataLogger::new(&path, 10, true);
            for n in 0..3 {
                logger.add(Sample { n, value: n as f64 }).unwrap();
            }
            logger.finalize_as_json().unwrap();
            // a second call must not re-parse the array
            logger.finalize_as_json().unwrap();
        }

        let entries: Vec<Sample> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], Sample { n: 2, value: 2.0 });
    }

    #[test]
    fn test_add_after_finalize_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        {
            let mut logger = DataLogger::new(&path, 1, true);
            logger.add(Sample { n: 1, value: 1.0 }).unwrap();
            logger.finalize_as_json().unwrap();
            assert!(matches!(
                logger.add(Sample { n: 2, value: 2.0 }),
                Err(InstrumentError::InvalidArgument(_))
            ));
        }

        let entries: Vec<Sample> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(entries, vec![Sample { n: 1, value: 1.0 }]);
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        {
            let mut logger = DataLogger::new(&path, 100, false);
            logger.add(Sample { n: 7, value: 7.0 }).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
