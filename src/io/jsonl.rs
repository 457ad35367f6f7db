//! JSON Lines (JSONL) sources and sinks.
//!
//! - [`JsonlReader`] / [`read_jsonl_vec`]: parse a file row by row with Serde
//! - [`JsonlWriter`] / [`write_jsonl_vec`]: write rows one per line
//! - [`read_jsonl`]: load a file as a sharded [`Dataset`]
//! - [`Dataset::write_jsonl`]: run a pipeline and stream its output to a file
//!
//! # Notes
//! - Blank lines are skipped on read.
//! - A [`Record`](crate::Record) line looks like `{"key": 1, "value": "a"}`. Joined rows
//!   leave out an absent side, so `{"key": 2, "left": "b"}` is a left-outer row.

use crate::dataset::{Dataset, Element, from_vec};
use crate::pipeline::Pipeline;
use crate::runner::{ExecMode, Runner};
use anyhow::{Context, Result};
use log::debug;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Row-by-row parser over a JSONL file.
///
/// Yields one `Result<T>` per non-blank line; errors name the file and line number.
pub struct JsonlReader<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    _t: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// # Errors
    /// If the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            _t: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for JsonlReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let at = || format!("{} line {}", self.path.display(), self.line_no);
            let line = match line.with_context(at) {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            if !line.trim().is_empty() {
                return Some(serde_json::from_str(&line).with_context(at));
            }
        }
    }
}

/// Buffered JSONL sink: one serialized row per line.
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    /// Create (or truncate) `path`, creating missing parent directories.
    ///
    /// # Errors
    /// If a directory or the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
        }
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    /// # Errors
    /// Serialization and I/O failures.
    pub fn write<T: Serialize>(&mut self, row: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, row)
            .with_context(|| format!("write row #{} to {}", self.written, self.path.display()))?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush and return the number of rows written.
    ///
    /// # Errors
    /// If the final flush fails.
    pub fn finish(mut self) -> Result<usize> {
        self.out
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        Ok(self.written)
    }
}

/// Read a whole JSONL file into a `Vec<T>`.
///
/// # Errors
/// The first open, read, or parse failure.
pub fn read_jsonl_vec<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    JsonlReader::open(path)?.collect()
}

/// Write `data` to `path`, returning the number of rows written.
///
/// # Errors
/// As [`JsonlWriter`].
pub fn write_jsonl_vec<T: Serialize>(path: impl AsRef<Path>, data: &[T]) -> Result<usize> {
    let mut w = JsonlWriter::create(path)?;
    for row in data {
        w.write(row)?;
    }
    w.finish()
}

/// Load a JSONL file as a dataset split into `shards` contiguous shards.
///
/// # Errors
/// As [`read_jsonl_vec`].
pub fn read_jsonl<T: Element>(
    p: &Pipeline,
    path: impl AsRef<Path>,
    shards: Option<usize>,
) -> Result<Dataset<T>> {
    Ok(from_vec(p, read_jsonl_vec(path)?, shards))
}

impl<T: Element> Dataset<T> {
    /// Run the pipeline and write its output to `path`, shard 0 first, as the shards
    /// drain.
    ///
    /// # Errors
    /// Pipeline failures and I/O errors.
    pub fn write_jsonl(&self, path: impl AsRef<Path>, mode: ExecMode) -> Result<usize> {
        let mut w = JsonlWriter::create(path)?;
        let runner = Runner {
            mode,
            ..Default::default()
        };
        runner.for_each(&self.pipeline, self.id, |_, row: T| w.write(&row))?;
        let written = w.finish()?;
        debug!("wrote {written} row(s) from stage {}", self.id);
        Ok(written)
    }
}
