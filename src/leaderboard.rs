//! File-backed Tetris high-score table.
//!
//! Scores are kept sorted descending in memory and persisted as a JSON
//! array after every write. Writes happen under one lock, so concurrent
//! submissions are serialised instead of racing on the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

pub const LEADERBOARD_SIZE: usize = 10;
pub const MAX_STORED_SCORES: usize = 100;
pub const MAX_NAME_LENGTH: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access scores file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode scores: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    NotAnObject,
    #[error("Name must be a string")]
    NameNotString,
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Name cannot be longer than {} characters", MAX_NAME_LENGTH)]
    NameTooLong,
    #[error("Score must be an integer")]
    ScoreNotInteger,
    #[error("Score cannot be negative")]
    NegativeScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u64,
    pub date: DateTime<Utc>,
}

/// A `{name, score}` pair that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSubmission {
    pub name: String,
    pub score: u64,
}

impl ScoreSubmission {
    /// Validates an untyped request body so each bad field gets its own message.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;

        let name = match object.get("name") {
            Some(Value::String(name)) => name.trim(),
            _ => return Err(ValidationError::NameNotString),
        };
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(ValidationError::NameTooLong);
        }

        let score = match object.get("score") {
            Some(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or_default(),
            Some(Value::Number(n)) if n.is_i64() => return Err(ValidationError::NegativeScore),
            // Whole floats such as `1000.0` count as integers.
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f < 0.0 => {
                    return Err(ValidationError::NegativeScore)
                }
                Some(f) if f.fract() == 0.0 && f < u64::MAX as f64 => f as u64,
                _ => return Err(ValidationError::ScoreNotInteger),
            },
            _ => return Err(ValidationError::ScoreNotInteger),
        };

        Ok(ScoreSubmission {
            name: name.to_string(),
            score,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedScore {
    pub entry: ScoreEntry,
    /// 1-based position, `None` when the score did not make the stored table.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStanding {
    pub name: String,
    pub best_score: u64,
    pub rank: usize,
    pub scores: Vec<ScoreEntry>,
}

pub struct ScoreStore {
    path: PathBuf,
    scores: Mutex<Vec<ScoreEntry>>,
}

impl ScoreStore {
    /// Loads the table from `path`. A missing file is an empty table; an
    /// unreadable one is logged and replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let scores = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<ScoreEntry>>(&bytes) {
                Ok(mut scores) => {
                    sort_descending(&mut scores);
                    scores.truncate(MAX_STORED_SCORES);
                    scores
                }
                Err(e) => {
                    log::error!(
                        "Scores file {} is corrupt, starting empty: {}",
                        path.display(),
                        e
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No scores file at {}, starting empty", path.display());
                Vec::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        log::info!("Loaded {} scores from {}", scores.len(), path.display());
        Ok(ScoreStore {
            path,
            scores: Mutex::new(scores),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn top(&self, n: usize) -> Vec<ScoreEntry> {
        self.scores.lock().await.iter().take(n).cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.scores.lock().await.len()
    }

    pub async fn submit(&self, submission: ScoreSubmission) -> Result<SubmittedScore, StoreError> {
        let entry = ScoreEntry {
            name: submission.name,
            score: submission.score,
            date: Utc::now(),
        };

        let mut scores = self.scores.lock().await;
        let mut next = scores.clone();
        // Equal scores keep submission order: the newcomer goes after them.
        let position = next.partition_point(|existing| existing.score >= entry.score);
        next.insert(position, entry.clone());
        next.truncate(MAX_STORED_SCORES);

        self.persist(&next).await?;
        *scores = next;

        let rank = (position < MAX_STORED_SCORES).then_some(position + 1);
        log::info!(
            "Recorded score {} for '{}' (rank {:?})",
            entry.score,
            entry.name,
            rank
        );
        Ok(SubmittedScore { entry, rank })
    }

    pub async fn player(&self, name: &str) -> Option<PlayerStanding> {
        let wanted = name.trim().to_lowercase();
        let scores = self.scores.lock().await;

        let mut standing: Option<PlayerStanding> = None;
        for (index, entry) in scores.iter().enumerate() {
            if entry.name.to_lowercase() != wanted {
                continue;
            }
            match standing.as_mut() {
                Some(found) => found.scores.push(entry.clone()),
                None => {
                    standing = Some(PlayerStanding {
                        name: entry.name.clone(),
                        best_score: entry.score,
                        rank: index + 1,
                        scores: vec![entry.clone()],
                    })
                }
            }
        }
        standing
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut scores = self.scores.lock().await;
        self.persist(&[]).await?;
        scores.clear();
        log::warn!("Leaderboard cleared");
        Ok(())
    }

    async fn persist(&self, scores: &[ScoreEntry]) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let body = serde_json::to_vec_pretty(scores)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

fn sort_descending(scores: &mut [ScoreEntry]) {
    scores.sort_by(|a, b| b.score.cmp(&a.score));
}
