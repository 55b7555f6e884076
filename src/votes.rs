//! Party Vote Extractor: normalize one motion's raw party lists into three
//! disjoint sets.

use std::collections::BTreeSet;

use crate::dataset::Motion;
use crate::error::Error;

/// A motion's vote classification. The three sets are pairwise disjoint;
/// extraction fails rather than repairing source data that violates this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteSets {
    pub proponents: BTreeSet<String>,
    pub opponents: BTreeSet<String>,
    pub absentees: BTreeSet<String>,
}

impl VoteSets {
    /// Every party that existed at the time of this vote.
    pub fn all_parties(&self) -> impl Iterator<Item = &String> {
        self.proponents.iter().chain(self.opponents.iter()).chain(self.absentees.iter())
    }
}

/// Normalize a motion's vote lists. Missing lists become empty sets; an
/// empty party name or a party appearing more than once across the union is
/// a [`Error::MalformedMotion`].
pub fn extract(motion: &Motion) -> Result<VoteSets, Error> {
    let mut sets = VoteSets::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    let lists = [
        (&motion.proponents, &mut sets.proponents),
        (&motion.opponents, &mut sets.opponents),
        (&motion.absentees, &mut sets.absentees),
    ];
    for (source, target) in lists {
        for party in source {
            if party.trim().is_empty() {
                return Err(Error::malformed(&motion.id, "empty party name"));
            }
            if !seen.insert(party.as_str()) {
                return Err(Error::malformed(
                    &motion.id,
                    format!("party {party} appears in more than one vote list"),
                ));
            }
            target.insert(party.clone());
        }
    }
    Ok(sets)
}
