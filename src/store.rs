use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::quiz::frequency::{self, FrequencyEntry, StopWords};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("store file is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store lock was poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
}

/// A finished session as it is written to the store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionRecord {
    pub username: String,
    pub score: u32,
    pub timestamp: DateTime<Utc>,
    pub difficulty: String,
    pub document_id: i64,
    pub correct_answers: u32,
    pub questions_answered: u32,
}

pub trait WordStore {
    fn documents(&self) -> Result<Vec<Document>, StoreError>;
    fn add_document(&self, title: &str) -> Result<i64, StoreError>;
    /// Empty when the document has no stored words.
    fn words_by_document(&self, document_id: i64) -> Result<Vec<FrequencyEntry>, StoreError>;
    /// Replaces the word table of a document.
    fn insert_document_words(
        &self,
        document_id: i64,
        words: &[FrequencyEntry],
    ) -> Result<(), StoreError>;
}

/// Append-only sink for finished sessions.
pub trait SessionSink {
    fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct WordRow {
    document_id: i64,
    term: String,
    count: u32,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct StoreData {
    next_document_id: i64,
    documents: Vec<Document>,
    words: Vec<WordRow>,
    #[serde(skip)]
    sessions: Vec<SessionRecord>,
}

/// Keeps documents and word tables in one JSON file, and finished sessions in
/// a JSON-lines file next to it (`quiz_store.json` -> `quiz_store.sessions.jsonl`).
///
/// Document changes rewrite the JSON file through a temporary file in the same
/// directory, so a crash never leaves a half-written store behind. Sessions are
/// only ever appended, one line each.
pub struct JsonStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut data: StoreData = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            StoreData::default()
        };
        let sessions_path = sessions_path(&path);
        if sessions_path.exists() {
            data.sessions = read_sessions(&sessions_path)?;
        }
        log::info!(
            "Opened store {} ({} documents, {} sessions)",
            path.display(),
            data.documents.len(),
            data.sessions.len()
        );
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    /// Best sessions first; equal scores are ordered by who got there first.
    pub fn leaderboard(
        &self,
        document_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let data = self.lock()?;
        let mut records = data
            .sessions
            .iter()
            .filter(|s| document_id.map_or(true, |id| s.document_id == id))
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        records.truncate(limit);
        Ok(records)
    }

    pub fn sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.lock()?.sessions.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreData>, StoreError> {
        self.data.lock().map_err(|_| StoreError::Poisoned)
    }

    fn flush(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let parent_dir = parent_dir(path);
        fs::create_dir_all(parent_dir)?;

        let temp_file = NamedTempFile::new_in(parent_dir)?;
        {
            let mut writer = BufWriter::new(&temp_file);
            serde_json::to_writer_pretty(&mut writer, data)?;
            writer.flush()?;
        }
        temp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn append_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        fs::create_dir_all(parent_dir(path))?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(sessions_path(path))?;
        file.write_all(&line)?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn sessions_path(store_path: &Path) -> PathBuf {
    store_path.with_extension("sessions.jsonl")
}

/// Reads one session per line. A line that does not parse, such as one cut
/// short by a crash, is skipped.
fn read_sessions(path: &Path) -> Result<Vec<SessionRecord>, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let mut sessions = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => sessions.push(record),
            Err(err) => log::warn!(
                "Skipping line {} of {}: {}",
                number + 1,
                path.display(),
                err
            ),
        }
    }
    Ok(sessions)
}

impl WordStore for JsonStore {
    fn documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.lock()?.documents.clone())
    }

    fn add_document(&self, title: &str) -> Result<i64, StoreError> {
        let mut data = self.lock()?;
        data.next_document_id += 1;
        let id = data.next_document_id;
        data.documents.push(Document {
            id,
            title: title.to_string(),
        });
        self.flush(&data)?;
        Ok(id)
    }

    fn words_by_document(&self, document_id: i64) -> Result<Vec<FrequencyEntry>, StoreError> {
        Ok(self
            .lock()?
            .words
            .iter()
            .filter(|row| row.document_id == document_id)
            .map(|row| FrequencyEntry::new(row.term.clone(), row.count))
            .collect())
    }

    fn insert_document_words(
        &self,
        document_id: i64,
        words: &[FrequencyEntry],
    ) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        data.words.retain(|row| row.document_id != document_id);
        data.words.extend(
            words
                .iter()
                .filter(|w| w.count >= 1)
                .map(|w| WordRow {
                    document_id,
                    term: w.term.clone(),
                    count: w.count,
                }),
        );
        self.flush(&data)
    }
}

impl SessionSink for JsonStore {
    fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        self.append_session(record)?;
        data.sessions.push(record.clone());
        Ok(())
    }
}

/// Registers a new document and stores its frequency table.
pub fn index_document<S: WordStore + ?Sized>(
    store: &S,
    title: &str,
    text: &str,
    stopwords: &StopWords,
) -> Result<i64, StoreError> {
    let words = frequency::build(text, stopwords);
    let id = store.add_document(title)?;
    store.insert_document_words(id, &words)?;
    log::info!("Indexed \"{}\" as document {} ({} terms)", title, id, words.len());
    Ok(id)
}

/// Indexes every `*.txt` file of `dir` whose stem is not a known document title.
/// Files that cannot be read as UTF-8 text are logged and skipped.
/// Returns how many documents were added.
pub fn ingest_directory<S: WordStore + ?Sized>(
    store: &S,
    dir: &Path,
    stopwords: &StopWords,
) -> Result<usize, StoreError> {
    let known = store
        .documents()?
        .into_iter()
        .map(|d| d.title)
        .collect::<Vec<_>>();

    let mut paths = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "txt"))
        .collect::<Vec<_>>();
    paths.sort();

    let mut added = 0;
    for path in paths {
        let Some(title) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if known.iter().any(|k| k == title) {
            continue;
        }
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Skipping {}: {}", path.display(), err);
                continue;
            }
        };
        index_document(store, title, &text, stopwords)?;
        added += 1;
    }
    Ok(added)
}
