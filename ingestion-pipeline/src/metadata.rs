use std::{io::BufRead, path::Path};

use common::{
    error::AppError,
    storage::{
        store::ReviewStore,
        types::{MetadataRow, RawMetadata},
    },
};
use tracing::{info, warn};

use crate::{
    reader::RecordReader,
    upsert::{FlushOutcome, UpsertEngine},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataReport {
    pub records_read: usize,
    pub malformed_lines: usize,
    pub skipped_missing_key: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub rows_written: u64,
}

/// Upserts every metadata record of `path` in batches of `batch_size`.
pub async fn load_metadata<S: ReviewStore>(
    engine: &mut UpsertEngine<S>,
    path: &Path,
    batch_size: usize,
    max_records: Option<usize>,
) -> Result<MetadataReport, AppError> {
    let reader = RecordReader::<_, RawMetadata>::open(path)?;
    info!(path = %path.display(), batch_size, "loading metadata");
    load_metadata_from(engine, reader.with_limit(max_records), batch_size).await
}

pub async fn load_metadata_from<S: ReviewStore, R: BufRead + Send>(
    engine: &mut UpsertEngine<S>,
    mut reader: RecordReader<R, RawMetadata>,
    batch_size: usize,
) -> Result<MetadataReport, AppError> {
    let batch_size = batch_size.max(1);
    let mut report = MetadataReport::default();
    let mut batch: Vec<MetadataRow> = Vec::with_capacity(batch_size);

    for record in reader.by_ref() {
        report.records_read += 1;
        match MetadataRow::from_raw(record?) {
            Some(row) => batch.push(row),
            None => {
                report.skipped_missing_key += 1;
                warn!(record = report.records_read, "metadata record without parent_asin skipped");
            }
        }

        if batch.len() >= batch_size {
            flush(engine, &batch, &mut report).await?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        flush(engine, &batch, &mut report).await?;
    }

    report.malformed_lines = reader.malformed();
    info!(
        records_read = report.records_read,
        malformed = report.malformed_lines,
        skipped_missing_key = report.skipped_missing_key,
        batches_committed = report.batches_committed,
        batches_failed = report.batches_failed,
        rows_written = report.rows_written,
        "metadata load finished"
    );
    Ok(report)
}

async fn flush<S: ReviewStore>(
    engine: &mut UpsertEngine<S>,
    batch: &[MetadataRow],
    report: &mut MetadataReport,
) -> Result<(), AppError> {
    match engine.flush_metadata(batch).await? {
        FlushOutcome::Committed { rows } => {
            report.batches_committed += 1;
            report.rows_written += rows;
            info!(rows, total = report.rows_written, "metadata batch committed");
        }
        FlushOutcome::RolledBack { .. } => report.batches_failed += 1,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use std::io::Cursor;
    use tempfile::tempdir;

    const METADATA: &str = concat!(
        "{\"parent_asin\":\"P1\",\"title\":\"Serum\",\"average_rating\":\"4.5\",\"price\":\"\u{2014}\"}\n",
        "{\"parent_asin\":\"P2\",\"title\":\"Comb\",\"average_rating\":7,\"rating_number\":\"12\"}\n",
        "{\"title\":\"no key\"}\n",
        "garbage\n",
        "{\"parent_asin\":\"P3\",\"price\":\"N/A\",\"details\":{\"b\":1,\"a\":2}}\n",
    );

    fn reader() -> RecordReader<Cursor<Vec<u8>>, RawMetadata> {
        RecordReader::new(Cursor::new(METADATA.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn loads_and_counts_records() {
        let mut engine = UpsertEngine::new(MemoryStore::default());
        let report = load_metadata_from(&mut engine, reader(), 2)
            .await
            .expect("load");

        assert_eq!(report.records_read, 4);
        assert_eq!(report.malformed_lines, 1);
        assert_eq!(report.skipped_missing_key, 1);
        assert_eq!(report.batches_committed, 2);
        assert_eq!(report.rows_written, 3);

        let rows = engine.into_store().metadata_rows();
        let p1 = rows.iter().find(|row| row.parent_asin == "P1").expect("P1");
        assert_eq!(p1.average_rating, Some(4.5));
        assert_eq!(p1.price, None);
        let p2 = rows.iter().find(|row| row.parent_asin == "P2").expect("P2");
        assert_eq!(p2.average_rating, Some(7.0));
        assert_eq!(p2.rating_number, Some(12));
        let p3 = rows.iter().find(|row| row.parent_asin == "P3").expect("P3");
        assert_eq!(p3.details.as_deref(), Some(r#"{"a":2,"b":1}"#));
    }

    #[tokio::test]
    async fn loading_twice_yields_identical_state() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("meta.jsonl");
        std::fs::write(&path, METADATA).expect("write metadata");

        let mut engine = UpsertEngine::new(MemoryStore::default());
        load_metadata(&mut engine, &path, 500, None).await.expect("first load");
        let once = engine.store().metadata_rows();

        load_metadata(&mut engine, &path, 500, None).await.expect("second load");
        let twice = engine.store().metadata_rows();

        assert_eq!(once.len(), 3);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn failed_metadata_batch_is_skipped() {
        let mut engine = UpsertEngine::new(MemoryStore::default().fail_metadata_batches([0]));
        let report = load_metadata_from(&mut engine, reader(), 2)
            .await
            .expect("load");

        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_committed, 1);
        let store = engine.into_store();
        assert_eq!(store.metadata_len(), 1);
        assert_eq!(store.metadata_title("P1"), None);
    }

    #[tokio::test]
    async fn sample_mode_caps_records() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("meta.jsonl");
        std::fs::write(&path, METADATA).expect("write metadata");

        let mut engine = UpsertEngine::new(MemoryStore::default());
        let report = load_metadata(&mut engine, &path, 500, Some(2))
            .await
            .expect("load");
        assert_eq!(report.records_read, 2);
        assert_eq!(engine.into_store().metadata_len(), 2);
    }
}
