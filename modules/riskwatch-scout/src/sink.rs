use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use riskwatch_common::{AuthorVerdict, HistorySnapshot, Record, RiskWatchError, ScoredRecord};

pub const RAW_RECORDS_FILE: &str = "raw_records.jsonl";
pub const SCORED_RECORDS_FILE: &str = "records_scored.jsonl";
pub const SCORED_RECORDS_CSV: &str = "records_scored.csv";
pub const AUTHORS_FILE: &str = "authors_scored.jsonl";
pub const AUTHORS_CSV: &str = "authors_scored.csv";
pub const HISTORIES_FILE: &str = "authors_history.jsonl";

/// Downstream consumer of everything a run produces.
pub trait Sink: Send + Sync {
    fn write_raw(&self, records: &[Record]) -> Result<(), RiskWatchError>;
    fn write_scored(&self, scored: &[ScoredRecord]) -> Result<(), RiskWatchError>;
    fn write_verdicts(&self, verdicts: &[AuthorVerdict]) -> Result<(), RiskWatchError>;
    /// One snapshot per author; replaces whatever was stored before.
    fn write_histories(&self, histories: &[HistorySnapshot]) -> Result<(), RiskWatchError>;
    /// Histories stored by earlier runs. Empty when there are none.
    fn load_histories(&self) -> Result<Vec<HistorySnapshot>, RiskWatchError>;
}

// --- FileSink ---

/// Writes JSONL and CSV exports into one directory, replacing earlier files.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RiskWatchError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_jsonl<T: Serialize>(&self, name: &str, items: &[T]) -> Result<(), RiskWatchError> {
        let path = self.dir.join(name);
        let mut out = BufWriter::new(File::create(&path)?);
        for item in items {
            serde_json::to_writer(&mut out, item)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        info!(path = %path.display(), rows = items.len(), "Wrote JSONL");
        Ok(())
    }

    fn read_jsonl<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Vec<T>, RiskWatchError> {
        let path = self.dir.join(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut items = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str(&line).map_err(|e| {
                RiskWatchError::Serialization(format!("{}:{}: {e}", path.display(), n + 1))
            })?;
            items.push(item);
        }
        info!(path = %path.display(), rows = items.len(), "Read JSONL");
        Ok(items)
    }

    fn write_csv(
        &self,
        name: &str,
        headers: &[&str],
        rows: impl Iterator<Item = Vec<String>>,
    ) -> Result<(), RiskWatchError> {
        let path = self.dir.join(name);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(csv_error)?;
        writer.write_record(headers).map_err(csv_error)?;
        let mut count = 0usize;
        for row in rows {
            writer.write_record(&row).map_err(csv_error)?;
            count += 1;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = count, "Wrote CSV");
        Ok(())
    }
}

fn csv_error(err: csv::Error) -> RiskWatchError {
    RiskWatchError::Serialization(format!("csv: {err}"))
}

fn score4(value: f64) -> String {
    format!("{value:.4}")
}

impl Sink for FileSink {
    fn write_raw(&self, records: &[Record]) -> Result<(), RiskWatchError> {
        self.write_jsonl(RAW_RECORDS_FILE, records)
    }

    fn write_scored(&self, scored: &[ScoredRecord]) -> Result<(), RiskWatchError> {
        self.write_jsonl(SCORED_RECORDS_FILE, scored)?;
        self.write_csv(
            SCORED_RECORDS_CSV,
            &[
                "id",
                "author",
                "channel",
                "kind",
                "created_at",
                "score",
                "label",
                "explanation",
                "language",
                "matched_terms",
                "permalink",
            ],
            scored.iter().map(|s| {
                vec![
                    s.record.id.clone(),
                    s.record.author.clone(),
                    s.record.channel.clone(),
                    s.record.kind.to_string(),
                    s.record.created_at.to_rfc3339(),
                    score4(s.score),
                    s.label.to_string(),
                    s.explanation.to_string(),
                    s.language.code.clone(),
                    s.matched_terms.join("|"),
                    s.record.permalink.clone(),
                ]
            }),
        )
    }

    fn write_verdicts(&self, verdicts: &[AuthorVerdict]) -> Result<(), RiskWatchError> {
        self.write_jsonl(AUTHORS_FILE, verdicts)?;
        self.write_csv(
            AUTHORS_CSV,
            &[
                "run_id",
                "author",
                "score",
                "label",
                "max_post_score",
                "average_score",
                "count_high_posts",
                "total_posts",
                "explanation",
                "computed_at",
            ],
            verdicts.iter().map(|v| {
                vec![
                    v.run_id.to_string(),
                    v.author.clone(),
                    score4(v.score),
                    v.label.to_string(),
                    score4(v.basis.max_post_score),
                    score4(v.basis.average_score),
                    v.basis.count_high_posts.to_string(),
                    v.basis.total_posts.to_string(),
                    v.explanation.clone(),
                    v.computed_at.to_rfc3339(),
                ]
            }),
        )
    }

    fn write_histories(&self, histories: &[HistorySnapshot]) -> Result<(), RiskWatchError> {
        self.write_jsonl(HISTORIES_FILE, histories)
    }

    fn load_histories(&self) -> Result<Vec<HistorySnapshot>, RiskWatchError> {
        self.read_jsonl(HISTORIES_FILE)
    }
}

// --- MemorySink ---

/// Keeps everything in memory. Each write replaces the previous contents.
#[derive(Default)]
pub struct MemorySink {
    raw: Mutex<Vec<Record>>,
    scored: Mutex<Vec<ScoredRecord>>,
    verdicts: Mutex<Vec<AuthorVerdict>>,
    histories: Mutex<Vec<HistorySnapshot>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Vec<Record> {
        self.raw.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn scored(&self) -> Vec<ScoredRecord> {
        self.scored.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn verdicts(&self) -> Vec<AuthorVerdict> {
        self.verdicts.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn histories(&self) -> Vec<HistorySnapshot> {
        self.histories.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

fn replace<T: Clone>(slot: &Mutex<Vec<T>>, items: &[T]) -> Result<(), RiskWatchError> {
    let mut guard = slot
        .lock()
        .map_err(|_| RiskWatchError::Validation("memory sink lock poisoned".to_string()))?;
    *guard = items.to_vec();
    Ok(())
}

impl Sink for MemorySink {
    fn write_raw(&self, records: &[Record]) -> Result<(), RiskWatchError> {
        replace(&self.raw, records)
    }

    fn write_scored(&self, scored: &[ScoredRecord]) -> Result<(), RiskWatchError> {
        replace(&self.scored, scored)
    }

    fn write_verdicts(&self, verdicts: &[AuthorVerdict]) -> Result<(), RiskWatchError> {
        replace(&self.verdicts, verdicts)
    }

    fn write_histories(&self, histories: &[HistorySnapshot]) -> Result<(), RiskWatchError> {
        replace(&self.histories, histories)
    }

    fn load_histories(&self) -> Result<Vec<HistorySnapshot>, RiskWatchError> {
        Ok(self.histories())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskwatch_common::{AuthorLabel, VerdictBasis};
    use riskwatch_scoring::RecordScorer;
    use uuid::Uuid;

    use crate::testing::record;

    fn verdict() -> AuthorVerdict {
        AuthorVerdict {
            run_id: Uuid::nil(),
            author: "alice".to_string(),
            score: 0.123456,
            label: AuthorLabel::Low,
            explanation: "no additional history available".to_string(),
            basis: VerdictBasis::default(),
            computed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn file_sink_writes_all_exports() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("out")).unwrap();

        let raw = vec![record("a", "alice", "I will kill you"), record("b", "bob", "hello")];
        let scorer = RecordScorer::default();
        let scored: Vec<_> = raw.iter().cloned().map(|r| scorer.score_record(r)).collect();

        sink.write_raw(&raw).unwrap();
        sink.write_scored(&scored).unwrap();
        sink.write_verdicts(&[verdict()]).unwrap();

        let out = dir.path().join("out");
        let raw_lines = fs::read_to_string(out.join(RAW_RECORDS_FILE)).unwrap();
        assert_eq!(raw_lines.lines().count(), 2);
        let first: Record = serde_json::from_str(raw_lines.lines().next().unwrap()).unwrap();
        assert_eq!(first.id, "a");

        let scored_lines = fs::read_to_string(out.join(SCORED_RECORDS_FILE)).unwrap();
        let parsed: ScoredRecord =
            serde_json::from_str(scored_lines.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.record.id, "a");
        assert_eq!(parsed.score, scored[0].score);

        let mut reader = csv::Reader::from_path(out.join(SCORED_RECORDS_CSV)).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "a");
        assert_eq!(&rows[0][5], "0.8000");
        assert_eq!(&rows[0][6], "high");

        let mut reader = csv::Reader::from_path(out.join(AUTHORS_CSV)).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[1], "author");
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[2], "0.1235");
        assert_eq!(&row[3], "low");

        assert!(out.join(AUTHORS_FILE).exists());
    }

    #[test]
    fn histories_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        assert!(sink.load_histories().unwrap().is_empty());

        let now = chrono::Utc::now();
        let snapshot = HistorySnapshot {
            author: "alice".to_string(),
            window_start: now - chrono::Duration::days(60),
            window_end: now,
            records: vec![record("h1", "alice", "I will kill you")],
            crawled_at: now,
        };
        sink.write_histories(&[snapshot.clone()]).unwrap();

        let reopened = FileSink::new(dir.path()).unwrap();
        assert_eq!(reopened.load_histories().unwrap(), vec![snapshot]);
    }

    #[test]
    fn corrupt_history_line_is_reported_with_its_location() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(HISTORIES_FILE), "\n{not json}\n").unwrap();
        let err = FileSink::new(dir.path()).unwrap().load_histories().unwrap_err();
        assert!(matches!(err, RiskWatchError::Serialization(_)));
        assert!(err.to_string().contains(":2:"), "{err}");
    }

    #[test]
    fn memory_sink_replaces_contents() {
        let sink = MemorySink::new();
        sink.write_raw(&[record("a", "alice", "x")]).unwrap();
        sink.write_raw(&[record("b", "bob", "y"), record("c", "carol", "z")]).unwrap();
        assert_eq!(sink.raw().len(), 2);
        assert!(sink.scored().is_empty());
        sink.write_verdicts(&[verdict()]).unwrap();
        assert_eq!(sink.verdicts()[0].author, "alice");
    }
}
