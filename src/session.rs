//! Resumable scoring session: state + pure controller.
//!
//! The controller is a reducer: `step` consumes one user input, mutates the
//! session state, and returns the commands the shell must execute (open a
//! document, render standings, write a checkpoint). All I/O lives in the
//! shell, so the whole decision loop is testable without a console.
//!
//! Lifecycle: `Idle` until [`Session::begin`], then `AwaitingDecision` per
//! presented motion, then `Exhausted` once the cursor passes the end.
//! `Exhausted` keeps serving standings and checkpoint requests indefinitely;
//! it never exits on its own. Checkpoint writes happen in the shell; a
//! failed write reports and leaves the in-memory state untouched, so no
//! rollback is ever needed.

use std::collections::BTreeSet;

use anyhow::{bail, Result};

use crate::dataset::Motion;
use crate::score::{Decision, PartyStanding, ScoreBoard};
use crate::shuffle;
use crate::votes::{self, VoteSets};

/// Filter provenance carried for exact resumption. Opaque to the core: the
/// shell re-derives the motion set from these strings on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub start_date: String,
    pub end_date: String,
    pub regex: String,
}

/// Everything a checkpoint must capture to resume bit-for-bit: the seed
/// reproduces the order, the cursor marks progress, the board carries the
/// tallies. The cursor never exceeds the shuffled-sequence length.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub seed: u64,
    pub cursor: usize,
    pub included_parties: BTreeSet<String>,
    pub provenance: Provenance,
    pub board: ScoreBoard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingDecision,
    Exhausted,
}

/// One unit of user input per prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Decide(Decision),
    ShowInfo,
    ReopenDocument,
    ShowStandings,
    SaveCheckpoint(String),
}

/// Side effects for the shell to execute. Indices point into the shuffled
/// sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenDocument { index: usize },
    ShowDetails { index: usize },
    ShowStandings,
    WriteCheckpoint { profile: String },
    ReportMalformed { index: usize, reason: String },
    AnnounceExhausted,
}

pub struct Session {
    motions: Vec<Motion>,
    pending: Option<VoteSets>,
    phase: Phase,
    pub state: SessionState,
}

impl Session {
    /// Fresh session over an already-filtered motion table. The table is
    /// shuffled here; callers handle the empty case upstream.
    pub fn start(
        motions: Vec<Motion>,
        seed: u64,
        included_parties: BTreeSet<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            motions: shuffle::shuffle(motions, seed),
            pending: None,
            phase: Phase::Idle,
            state: SessionState {
                seed,
                cursor: 0,
                included_parties,
                provenance,
                board: ScoreBoard::default(),
            },
        }
    }

    /// Rebuild a session from restored state. The motion table must be the
    /// re-filtered dataset; shuffling it with the stored seed reproduces the
    /// original order, so the stored cursor lands on the exact next motion.
    pub fn resume(motions: Vec<Motion>, state: SessionState) -> Result<Self> {
        let motions = shuffle::shuffle(motions, state.seed);
        if state.cursor > motions.len() {
            bail!(
                "cursor {} exceeds the {} filtered motions; the dataset lost rows since the save",
                state.cursor,
                motions.len()
            );
        }
        Ok(Self { motions, pending: None, phase: Phase::Idle, state })
    }

    /// Leave `Idle`: present the motion under the cursor (or announce
    /// exhaustion straight away).
    pub fn begin(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        self.present_current(&mut commands);
        commands
    }

    /// Advance to the next well-formed motion. Malformed motions are
    /// reported and skipped; the skip advances the cursor, which keeps
    /// resume deterministic because extraction itself is deterministic.
    fn present_current(&mut self, commands: &mut Vec<Command>) {
        loop {
            let index = self.state.cursor;
            let Some(motion) = self.motions.get(index) else {
                self.phase = Phase::Exhausted;
                self.pending = None;
                commands.push(Command::AnnounceExhausted);
                return;
            };
            match votes::extract(motion) {
                Ok(sets) => {
                    self.pending = Some(sets);
                    self.phase = Phase::AwaitingDecision;
                    commands.push(Command::OpenDocument { index });
                    return;
                }
                Err(err) => {
                    commands.push(Command::ReportMalformed { index, reason: err.to_string() });
                    self.state.cursor += 1;
                }
            }
        }
    }

    /// Feed one input through the state machine.
    pub fn step(&mut self, input: Input) -> Vec<Command> {
        let mut commands = Vec::new();
        match (self.phase, input) {
            (Phase::Idle, _) => {}

            (Phase::AwaitingDecision, Input::ShowInfo) => {
                commands.push(Command::ShowDetails { index: self.state.cursor });
            }
            (Phase::AwaitingDecision, Input::ReopenDocument) => {
                commands.push(Command::OpenDocument { index: self.state.cursor });
            }
            (_, Input::ShowStandings) => {
                commands.push(Command::ShowStandings);
            }
            (_, Input::SaveCheckpoint(profile)) => {
                commands.push(Command::WriteCheckpoint { profile });
            }

            (Phase::AwaitingDecision, Input::Decide(decision)) => {
                let sets = self.pending.take().expect("awaiting a decision without extracted votes");
                self.state.board.apply(decision, &sets);
                debug_assert!(self.state.board.conservation_holds());
                self.state.cursor += 1;
                self.present_current(&mut commands);
            }

            (Phase::Exhausted, Input::Decide(_))
            | (Phase::Exhausted, Input::ShowInfo)
            | (Phase::Exhausted, Input::ReopenDocument) => {
                commands.push(Command::AnnounceExhausted);
            }
        }
        commands
    }

    pub fn standings(&self) -> Vec<PartyStanding> {
        self.state.board.standings(&self.state.included_parties)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The motion currently being decided on, if any.
    pub fn current_motion(&self) -> Option<&Motion> {
        match self.phase {
            Phase::AwaitingDecision => self.motions.get(self.state.cursor),
            _ => None,
        }
    }

    pub fn motion(&self, index: usize) -> Option<&Motion> {
        self.motions.get(index)
    }

    /// Shuffled order, for continuity checks.
    pub fn motion_ids(&self) -> Vec<&str> {
        self.motions.iter().map(|m| m.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn motion(id: &str, prop: &[&str], opp: &[&str], abs: &[&str]) -> Motion {
        Motion {
            id: id.to_string(),
            subject: format!("Motie {id}"),
            vote_time: "2022-05-01 09:00:00+02:00".to_string(),
            vote_date: NaiveDate::from_ymd_opt(2022, 5, 1).unwrap(),
            url: format!("https://example.test/{id}/resource"),
            size_bytes: 0,
            accepted: true,
            num_proponents: prop.len() as u32,
            proponents: prop.iter().map(|s| s.to_string()).collect(),
            num_absentees: abs.len() as u32,
            absentees: abs.iter().map(|s| s.to_string()).collect(),
            num_opponents: opp.len() as u32,
            opponents: opp.iter().map(|s| s.to_string()).collect(),
            petitioners: vec![],
        }
    }

    fn session(motions: Vec<Motion>) -> Session {
        let included = crate::dataset::all_parties(&motions).into_iter().collect();
        Session::start(motions, 42, included, Provenance::default())
    }

    #[test]
    fn begin_presents_first_motion() {
        let mut s = session(vec![motion("m1", &["VVD"], &["CDA"], &[])]);
        let commands = s.begin();
        assert_eq!(commands, vec![Command::OpenDocument { index: 0 }]);
        assert_eq!(s.phase(), Phase::AwaitingDecision);
        assert!(s.current_motion().is_some());
    }

    #[test]
    fn empty_table_is_exhausted_immediately() {
        let mut s = session(vec![]);
        assert_eq!(s.begin(), vec![Command::AnnounceExhausted]);
        assert_eq!(s.phase(), Phase::Exhausted);
    }

    #[test]
    fn side_commands_do_not_advance() {
        let mut s = session(vec![motion("m1", &["VVD"], &["CDA"], &[])]);
        s.begin();
        assert_eq!(s.step(Input::ShowInfo), vec![Command::ShowDetails { index: 0 }]);
        assert_eq!(s.step(Input::ReopenDocument), vec![Command::OpenDocument { index: 0 }]);
        assert_eq!(s.step(Input::ShowStandings), vec![Command::ShowStandings]);
        assert_eq!(
            s.step(Input::SaveCheckpoint("p".to_string())),
            vec![Command::WriteCheckpoint { profile: "p".to_string() }]
        );
        assert_eq!(s.state.cursor, 0);
        assert_eq!(s.phase(), Phase::AwaitingDecision);
    }

    #[test]
    fn decision_advances_and_exhausts() {
        let mut s = session(vec![motion("m1", &["VVD"], &["CDA"], &[])]);
        s.begin();
        let commands = s.step(Input::Decide(Decision::Agree));
        assert_eq!(commands, vec![Command::AnnounceExhausted]);
        assert_eq!(s.state.cursor, 1);
        assert_eq!(s.phase(), Phase::Exhausted);
        assert_eq!(s.state.board.scores.get("VVD"), Some(&1));
    }

    #[test]
    fn exhausted_still_serves_standings_and_saves() {
        let mut s = session(vec![]);
        s.begin();
        assert_eq!(s.step(Input::ShowStandings), vec![Command::ShowStandings]);
        assert_eq!(
            s.step(Input::SaveCheckpoint("p".to_string())),
            vec![Command::WriteCheckpoint { profile: "p".to_string() }]
        );
        assert_eq!(s.step(Input::Decide(Decision::Agree)), vec![Command::AnnounceExhausted]);
    }

    #[test]
    fn malformed_motion_is_skipped_not_fatal() {
        // Same party on both sides: malformed, must cost only that motion.
        let bad = motion("bad", &["VVD"], &["VVD"], &[]);
        let good = motion("good", &["VVD"], &["CDA"], &[]);
        let mut s = session(vec![bad, good]);
        let commands = s.begin();
        let reports = commands
            .iter()
            .filter(|c| matches!(c, Command::ReportMalformed { .. }))
            .count();
        let opened = commands.iter().any(|c| matches!(c, Command::OpenDocument { .. }));
        // Shuffle order decides whether the bad row sits first; either way a
        // good motion ends up presented or the report was already emitted.
        assert!(opened);
        assert!(reports <= 1);
        assert_eq!(s.current_motion().unwrap().id, "good");
    }

    #[test]
    fn resume_rejects_cursor_past_end() {
        let state = SessionState {
            seed: 42,
            cursor: 3,
            included_parties: BTreeSet::new(),
            provenance: Provenance::default(),
            board: ScoreBoard::default(),
        };
        assert!(Session::resume(vec![motion("m1", &["VVD"], &[], &[])], state).is_err());
    }

    #[test]
    fn same_seed_reproduces_order() {
        let motions: Vec<Motion> =
            (0..20).map(|i| motion(&format!("m{i}"), &["VVD"], &["CDA"], &[])).collect();
        let a = session(motions.clone());
        let b = session(motions);
        assert_eq!(a.motion_ids(), b.motion_ids());
    }
}
