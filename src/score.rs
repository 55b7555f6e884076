//! Score Accumulator: per-party agreement and applicable counts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::votes::VoteSets;

/// What the user decided about one motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Agree,
    Disagree,
    NoOpinion,
}

/// Sparse counters keyed by party name; a missing key reads as zero.
/// `totals[p]` counts every processed motion on which `p` voted or was
/// absent; `scores[p]` counts decisions matching `p`'s actual vote. An
/// absent party never scores: absence counts as voting against the user's
/// stated position, whatever it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub scores: BTreeMap<String, u64>,
    pub totals: BTreeMap<String, u64>,
}

/// One row of the standings: `percentage` is `100 * score / total` rounded
/// to one decimal.
#[derive(Debug, Clone, PartialEq)]
pub struct PartyStanding {
    pub party: String,
    pub score: u64,
    pub total: u64,
    pub percentage: f64,
}

impl ScoreBoard {
    pub fn new(scores: BTreeMap<String, u64>, totals: BTreeMap<String, u64>) -> Self {
        Self { scores, totals }
    }

    /// Record one decision. Every party on the motion gains an applicable
    /// count regardless of the decision (a NoOpinion still counts toward
    /// totals); only the matching side gains agreement.
    pub fn apply(&mut self, decision: Decision, votes: &VoteSets) {
        for party in votes.all_parties() {
            *self.totals.entry(party.clone()).or_insert(0) += 1;
        }
        let agreeing = match decision {
            Decision::Agree => &votes.proponents,
            Decision::Disagree => &votes.opponents,
            Decision::NoOpinion => return,
        };
        for party in agreeing {
            *self.scores.entry(party.clone()).or_insert(0) += 1;
        }
    }

    /// `agreement_count <= applicable_count` must hold for every party.
    pub fn conservation_holds(&self) -> bool {
        self.scores
            .iter()
            .all(|(party, score)| *score <= self.totals.get(party).copied().unwrap_or(0))
    }

    /// Standings restricted to `included`, sorted by descending percentage
    /// then party name. An included party with no applicable motions renders
    /// as 0.0% rather than being dropped, so it stays visible.
    pub fn standings(&self, included: &BTreeSet<String>) -> Vec<PartyStanding> {
        let mut rows: Vec<PartyStanding> = included
            .iter()
            .map(|party| {
                let score = self.scores.get(party).copied().unwrap_or(0);
                let total = self.totals.get(party).copied().unwrap_or(0);
                let percentage = if total == 0 {
                    0.0
                } else {
                    (1000.0 * score as f64 / total as f64).round() / 10.0
                };
                PartyStanding { party: party.clone(), score, total, percentage }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.percentage
                .partial_cmp(&a.percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.party.cmp(&b.party))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(prop: &[&str], opp: &[&str], abs: &[&str]) -> VoteSets {
        VoteSets {
            proponents: prop.iter().map(|s| s.to_string()).collect(),
            opponents: opp.iter().map(|s| s.to_string()).collect(),
            absentees: abs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn included(parties: &[&str]) -> BTreeSet<String> {
        parties.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn agree_scores_proponents() {
        let mut board = ScoreBoard::default();
        board.apply(Decision::Agree, &votes(&["VVD"], &["CDA"], &[]));
        assert_eq!(board.scores.get("VVD"), Some(&1));
        assert_eq!(board.scores.get("CDA"), None);
        assert_eq!(board.totals.get("VVD"), Some(&1));
        assert_eq!(board.totals.get("CDA"), Some(&1));
    }

    #[test]
    fn disagree_scores_opponents() {
        let mut board = ScoreBoard::default();
        board.apply(Decision::Disagree, &votes(&["VVD"], &["CDA"], &[]));
        assert_eq!(board.scores.get("CDA"), Some(&1));
        assert_eq!(board.scores.get("VVD"), None);
        assert_eq!(board.totals.len(), 2);
    }

    #[test]
    fn no_opinion_only_counts_totals() {
        let mut board = ScoreBoard::default();
        board.apply(Decision::NoOpinion, &votes(&["VVD"], &["CDA"], &[]));
        assert!(board.scores.is_empty());
        assert_eq!(board.totals.get("VVD"), Some(&1));
        assert_eq!(board.totals.get("CDA"), Some(&1));
    }

    #[test]
    fn absent_party_never_scores() {
        let mut board = ScoreBoard::default();
        board.apply(Decision::Agree, &votes(&[], &[], &["SP"]));
        board.apply(Decision::Disagree, &votes(&[], &[], &["SP"]));
        assert_eq!(board.scores.get("SP"), None);
        assert_eq!(board.totals.get("SP"), Some(&2));
    }

    #[test]
    fn conservation_holds_across_decisions() {
        let mut board = ScoreBoard::default();
        for decision in [Decision::Agree, Decision::Disagree, Decision::NoOpinion] {
            board.apply(decision, &votes(&["VVD", "D66"], &["CDA"], &["SP"]));
            assert!(board.conservation_holds());
        }
    }

    #[test]
    fn standings_sorted_and_rounded() {
        let mut board = ScoreBoard::default();
        // VVD 2/3, CDA 1/3.
        board.apply(Decision::Agree, &votes(&["VVD"], &["CDA"], &[]));
        board.apply(Decision::Agree, &votes(&["VVD", "CDA"], &[], &[]));
        board.apply(Decision::Agree, &votes(&[], &["VVD", "CDA"], &[]));
        let rows = board.standings(&included(&["VVD", "CDA"]));
        assert_eq!(rows[0].party, "VVD");
        assert_eq!(rows[0].percentage, 66.7);
        assert_eq!(rows[1].party, "CDA");
        assert_eq!(rows[1].percentage, 33.3);
    }

    #[test]
    fn standings_restricted_to_included() {
        let mut board = ScoreBoard::default();
        board.apply(Decision::Agree, &votes(&["VVD"], &["CDA"], &[]));
        let rows = board.standings(&included(&["CDA"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].party, "CDA");
        assert_eq!(rows[0].percentage, 0.0);
    }

    #[test]
    fn included_party_without_motions_is_zero_not_a_crash() {
        let board = ScoreBoard::default();
        let rows = board.standings(&included(&["BBB"]));
        assert_eq!(rows[0].total, 0);
        assert_eq!(rows[0].percentage, 0.0);
    }
}
