//! Checkpoint persistence: one JSON file per profile.
//!
//! The on-disk shape is fixed (`start_date`, `end_date`, `regex`,
//! `included_parties`, `seed`, `scores`, `totals`, `index`) and round-trips
//! losslessly. Writes go through a temp file plus rename so a crash
//! mid-write never corrupts an existing profile.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::score::ScoreBoard;
use crate::session::{Provenance, SessionState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub start_date: String,
    pub end_date: String,
    pub regex: String,
    pub included_parties: Vec<String>,
    pub seed: u64,
    pub scores: BTreeMap<String, u64>,
    pub totals: BTreeMap<String, u64>,
    pub index: usize,
    /// Hash of the motions CSV at save time. A mismatch on load is only a
    /// warning: append-only growth of the dataset is legal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_sha256: Option<String>,
}

impl Checkpoint {
    pub fn from_state(state: &SessionState, dataset_sha256: Option<String>) -> Self {
        Self {
            start_date: state.provenance.start_date.clone(),
            end_date: state.provenance.end_date.clone(),
            regex: state.provenance.regex.clone(),
            included_parties: state.included_parties.iter().cloned().collect(),
            seed: state.seed,
            scores: state.board.scores.clone(),
            totals: state.board.totals.clone(),
            index: state.cursor,
            dataset_sha256,
        }
    }

    pub fn into_state(self) -> SessionState {
        SessionState {
            seed: self.seed,
            cursor: self.index,
            included_parties: self.included_parties.into_iter().collect(),
            provenance: Provenance {
                start_date: self.start_date,
                end_date: self.end_date,
                regex: self.regex,
            },
            board: ScoreBoard::new(self.scores, self.totals),
        }
    }
}

fn profile_path(dir: &Path, profile: &str) -> PathBuf {
    dir.join(format!("{profile}.json"))
}

fn validate_profile_name(dir: &Path, profile: &str) -> Result<(), Error> {
    if profile.is_empty() || profile.contains(['/', '\\']) || profile == "." || profile == ".." {
        return Err(Error::CheckpointWriteFailure {
            path: dir.to_path_buf(),
            reason: format!("invalid profile name: {profile:?}"),
        });
    }
    Ok(())
}

/// Serialize a checkpoint under `profile`. The in-memory session is never
/// touched, so a failed save loses nothing.
pub fn save(dir: &Path, profile: &str, checkpoint: &Checkpoint) -> Result<PathBuf, Error> {
    validate_profile_name(dir, profile)?;
    let path = profile_path(dir, profile);
    let write = |path: &Path| -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(checkpoint).expect("checkpoint serializes");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, path)
    };
    write(&path).map_err(|err| Error::CheckpointWriteFailure {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    Ok(path)
}

/// Read a checkpoint back. A missing or corrupt profile fails this resume
/// only; other profiles are unaffected.
pub fn load(dir: &Path, profile: &str) -> Result<Checkpoint, Error> {
    let path = profile_path(dir, profile);
    let body = fs::read_to_string(&path).map_err(|err| Error::CheckpointReadFailure {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|err| Error::CheckpointReadFailure {
        path: path.clone(),
        reason: format!("corrupt checkpoint: {err}"),
    })
}

/// Saved profile names, sorted. An unreadable directory reads as empty.
pub fn list_profiles(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut profiles: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .collect();
    profiles.sort();
    profiles
}
