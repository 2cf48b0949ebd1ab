//! An ordered, content-deduplicated set of scored members.
//!
//! Members are unique strings; each carries an integer score. Iteration is
//! ascending by `(score, member)`, so members that share a score fall back to
//! their lexicographic order. Rank 0 is the lowest-scored member.

use std::collections::{BTreeSet, HashMap};

/// A set of members ordered by score, then by member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoredSet {
    scores: HashMap<String, i64>,
    index: BTreeSet<(i64, String)>,
}

impl ScoredSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `member` with `score`.
    ///
    /// Returns `false` and leaves the set untouched if the member is already
    /// present.
    pub fn insert(&mut self, member: &str, score: i64) -> bool {
        if self.scores.contains_key(member) {
            return false;
        }
        self.scores.insert(member.to_string(), score);
        self.index.insert((score, member.to_string()));
        true
    }

    /// The score of `member`, if present.
    #[must_use]
    pub fn score(&self, member: &str) -> Option<i64> {
        self.scores.get(member).copied()
    }

    /// Members with a score of at least `min_score`, ascending.
    pub fn range_from(&self, min_score: i64) -> impl Iterator<Item = &str> {
        self.index
            .range((min_score, String::new())..)
            .map(|(_, member)| member.as_str())
    }

    /// Remove every member except the `keep` highest-ranked ones.
    ///
    /// Returns the number of members removed.
    pub fn retain_top(&mut self, keep: usize) -> usize {
        let mut removed = 0;
        while self.index.len() > keep {
            let Some((_, member)) = self.index.pop_first() else {
                break;
            };
            self.scores.remove(&member);
            removed += 1;
        }
        removed
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
