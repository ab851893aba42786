//! Scoreboard
//!
//! Finished runs are appended to a scoreboard collaborator. The file
//! implementation writes one `timestamp\tlevel\tscore` line per run and can
//! read back the best entries.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Deserialize};
use tracing::debug;

/// Scoreboard failure. Never blocks gameplay.
#[derive(Debug, thiserror::Error)]
pub enum ScoreboardError {
    /// File could not be written or read
    #[error("Scoreboard I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One finished run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// When the run ended
    pub timestamp: DateTime<Utc>,
    /// Level the run ended on
    pub level: String,
    /// Final score
    pub score: i64,
}

impl ScoreEntry {
    /// Render as a TSV line (no newline).
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.level,
            self.score
        )
    }

    /// Parse a TSV line. Malformed lines yield `None`.
    pub fn from_tsv(line: &str) -> Option<Self> {
        let mut parts = line.split('\t');
        let (ts, level, score) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            timestamp: DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc),
            level: level.to_string(),
            score: score.trim().parse().ok()?,
        })
    }
}

/// Append-only record of finished runs.
pub trait Scoreboard {
    /// Append one entry.
    fn record(&mut self, entry: &ScoreEntry) -> Result<(), ScoreboardError>;
}

/// TSV scoreboard file.
#[derive(Clone, Debug)]
pub struct TsvScoreboard {
    path: PathBuf,
}

impl TsvScoreboard {
    /// Scoreboard at `path`. Nothing is touched until the first record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best `limit` entries, highest score first. A missing file is empty.
    pub fn top_scores(&self, limit: usize) -> Result<Vec<ScoreEntry>, ScoreboardError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<ScoreEntry> = text.lines().filter_map(ScoreEntry::from_tsv).collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(limit);
        Ok(entries)
    }
}

impl Scoreboard for TsvScoreboard {
    fn record(&mut self, entry: &ScoreEntry) -> Result<(), ScoreboardError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", entry.to_tsv())?;

        debug!(path = %self.path.display(), score = entry.score, "score appended");
        Ok(())
    }
}

/// In-memory scoreboard.
#[derive(Clone, Debug, Default)]
pub struct MemoryScoreboard {
    /// Recorded entries, oldest first
    pub entries: Vec<ScoreEntry>,
}

impl MemoryScoreboard {
    /// Empty scoreboard.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scoreboard for MemoryScoreboard {
    fn record(&mut self, entry: &ScoreEntry) -> Result<(), ScoreboardError> {
        self.entries.push(entry.clone());
        Ok(())
    }
}
