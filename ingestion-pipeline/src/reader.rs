use std::{
    fs::File,
    io::{BufRead, BufReader},
    marker::PhantomData,
    path::Path,
};

use common::error::AppError;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Streams records out of a line-delimited JSON source.
///
/// Blank lines are ignored. Lines that are not valid JSON for `T` (including
/// invalid UTF-8) are logged, counted and skipped. Only read failures of the
/// underlying source surface as errors.
pub struct RecordReader<R, T> {
    source: R,
    buf: Vec<u8>,
    line_no: usize,
    malformed: usize,
    remaining: Option<usize>,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordReader<BufReader<File>, T> {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|err| {
            AppError::Io(std::io::Error::new(
                err.kind(),
                format!("opening {}: {err}", path.display()),
            ))
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead, T> RecordReader<R, T> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: Vec::new(),
            line_no: 0,
            malformed: 0,
            remaining: None,
            _record: PhantomData,
        }
    }

    /// Stops after `max` records have been yielded.
    #[must_use]
    pub fn with_limit(mut self, max: Option<usize>) -> Self {
        self.remaining = max;
        self
    }

    /// Malformed lines skipped so far.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Physical lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for RecordReader<R, T> {
    type Item = Result<T, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }

        loop {
            self.buf.clear();
            match self.source.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(AppError::Io(err))),
            }
            self.line_no += 1;

            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<T>(line) {
                Ok(record) => {
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(record));
                }
                Err(err) => {
                    self.malformed += 1;
                    warn!(line = self.line_no, error = %err, "skipping malformed JSON line");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        id: u32,
    }

    fn reader(input: &[u8]) -> RecordReader<Cursor<Vec<u8>>, Probe> {
        RecordReader::new(Cursor::new(input.to_vec()))
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let mut records = reader(b"{\"id\":1}\n\n{not json\n  \n{\"id\":2}\n{\"id\":\"x\"}\n{\"id\":3}");
        let ids: Vec<u32> = records
            .by_ref()
            .map(|record| record.expect("no io errors").id)
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(records.malformed(), 2);
        assert_eq!(records.line_no(), 7);
    }

    #[test]
    fn invalid_utf8_counts_as_malformed() {
        let mut records = reader(b"\xff\xfe\n{\"id\":9}\n");
        let first = records.next().expect("record").expect("ok");
        assert_eq!(first, Probe { id: 9 });
        assert_eq!(records.malformed(), 1);
    }

    #[test]
    fn limit_caps_yielded_records() {
        let records = reader(b"{\"id\":1}\nbad\n{\"id\":2}\n{\"id\":3}\n").with_limit(Some(2));
        let ids: Vec<u32> = records.map(|r| r.expect("ok").id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn open_reports_missing_file() {
        let result = RecordReader::<_, Probe>::open(Path::new("/nonexistent/reviews.jsonl"));
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
