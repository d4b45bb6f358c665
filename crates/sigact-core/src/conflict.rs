// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Detection of contradictory signal batches.
//!
//! Every signal name is classified against two fixed sets.  A batch that
//! contains at least one positive and at least one negative signal is
//! contradictory and is never evaluated.

use hashbrown::HashSet;

use crate::types::Signal;

/// Names that let traffic continue.
pub const DEFAULT_POSITIVE: [&str; 6] = ["passthrough", "forward", "accept", "allow", "permit", "pass"];

/// Names that stop traffic.
pub const DEFAULT_NEGATIVE: [&str; 5] = ["terminate", "block", "drop", "reject", "reset"];

/// Classification of a single signal name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

/// The positive and negative name sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSets {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

impl Default for ConflictSets {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE, DEFAULT_NEGATIVE)
    }
}

impl ConflictSets {
    pub fn new<P, N>(positive: P, negative: N) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            positive: positive.into_iter().map(Into::into).collect(),
            negative: negative.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_positive(&mut self, name: impl Into<String>) {
        self.positive.insert(name.into());
    }

    pub fn add_negative(&mut self, name: impl Into<String>) {
        self.negative.insert(name.into());
    }

    /// Classify `name`.  A name present in both sets is positive.
    pub fn classify(&self, name: &str) -> Polarity {
        if self.positive.contains(name) {
            Polarity::Positive
        } else if self.negative.contains(name) {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }

    /// Partition `signals` by polarity, keeping batch order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sigact_core::conflict::ConflictSets;
    /// use sigact_core::types::Signal;
    ///
    /// let sets = ConflictSets::default();
    /// let report = sets.detect(&[Signal::new("allow"), Signal::new("block")]);
    /// assert!(report.has_conflict());
    /// assert_eq!(report.positives, ["allow"]);
    /// assert_eq!(report.negatives, ["block"]);
    /// ```
    pub fn detect(&self, signals: &[Signal]) -> ConflictReport {
        let mut report = ConflictReport::default();
        for signal in signals {
            match self.classify(&signal.name) {
                Polarity::Positive => report.positives.push(signal.name.clone()),
                Polarity::Negative => report.negatives.push(signal.name.clone()),
                Polarity::Neutral => {}
            }
        }
        report
    }
}

/// Positive and negative signal names found in one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
}

impl ConflictReport {
    /// `true` iff both sides are non-empty.
    pub fn has_conflict(&self) -> bool {
        !self.positives.is_empty() && !self.negatives.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(names: &[&str]) -> Vec<Signal> {
        names.iter().map(|name| Signal::new(*name)).collect()
    }

    #[test]
    fn test_default_sets() {
        let sets = ConflictSets::default();
        for name in DEFAULT_POSITIVE {
            assert_eq!(sets.classify(name), Polarity::Positive);
        }
        for name in DEFAULT_NEGATIVE {
            assert_eq!(sets.classify(name), Polarity::Negative);
        }
        assert_eq!(sets.classify("log"), Polarity::Neutral);
    }

    #[test]
    fn test_positive_wins_when_in_both_sets() {
        let mut sets = ConflictSets::default();
        sets.add_negative("allow");
        assert_eq!(sets.classify("allow"), Polarity::Positive);
    }

    #[test]
    fn test_mixed_batch_conflicts() {
        let report = ConflictSets::default().detect(&batch(&["allow", "log", "block"]));
        assert!(report.has_conflict());
        assert_eq!(report.positives, ["allow"]);
        assert_eq!(report.negatives, ["block"]);
    }

    #[test]
    fn test_one_sided_batches_do_not_conflict() {
        let sets = ConflictSets::default();
        assert!(!sets.detect(&batch(&["terminate", "reset"])).has_conflict());
        assert!(!sets.detect(&batch(&["pass", "forward", "log"])).has_conflict());
        assert!(!sets.detect(&batch(&["log", "call"])).has_conflict());
        assert!(!sets.detect(&[]).has_conflict());
    }

    #[test]
    fn test_custom_names() {
        let mut sets = ConflictSets::new(["resume"], ["pause"]);
        assert!(sets.detect(&batch(&["resume", "pause"])).has_conflict());
        assert!(!sets.detect(&batch(&["allow", "block"])).has_conflict());

        sets.add_positive("allow");
        sets.add_negative("block");
        assert!(sets.detect(&batch(&["allow", "block"])).has_conflict());
    }
}
