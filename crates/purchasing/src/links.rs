//! Linked documents partitioned into active / ignored / recreated.
//!
//! Invariants: `ignored ∩ recreated = ∅` and both are subsets of `linked`.
//! Anything linked but neither ignored nor recreated is active.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use procurerp_core::DomainResult;

/// Outcome of classifying exceptioned documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification<T> {
    pub ignored: Vec<T>,
    pub recreated: Vec<T>,
}

impl<T> Classification<T> {
    pub fn is_empty(&self) -> bool {
        self.ignored.is_empty() && self.recreated.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedSet<T: Ord> {
    linked: Vec<T>,
    ignored: BTreeSet<T>,
    recreated: BTreeSet<T>,
}

impl<T: Ord> Default for LinkedSet<T> {
    fn default() -> Self {
        Self {
            linked: Vec::new(),
            ignored: BTreeSet::new(),
            recreated: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Copy + core::fmt::Debug> LinkedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a document; linking twice is a no-op.
    pub fn link(&mut self, id: T) {
        if !self.contains(id) {
            self.linked.push(id);
        }
    }

    pub fn contains(&self, id: T) -> bool {
        self.linked.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.linked.is_empty()
    }

    /// All linked documents, in link order.
    pub fn linked(&self) -> &[T] {
        &self.linked
    }

    pub fn ignored(&self) -> &BTreeSet<T> {
        &self.ignored
    }

    pub fn recreated(&self) -> &BTreeSet<T> {
        &self.recreated
    }

    pub fn is_ignored(&self, id: T) -> bool {
        self.ignored.contains(&id)
    }

    pub fn is_recreated(&self, id: T) -> bool {
        self.recreated.contains(&id)
    }

    /// Already classified, one way or the other.
    pub fn is_skipped(&self, id: T) -> bool {
        self.is_ignored(id) || self.is_recreated(id)
    }

    /// Linked documents that are neither ignored nor recreated.
    pub fn active(&self) -> impl Iterator<Item = T> + '_ {
        self.linked.iter().copied().filter(|id| !self.is_skipped(*id))
    }

    /// Linked documents that were not replaced by a recreation.
    pub fn not_recreated(&self) -> impl Iterator<Item = T> + '_ {
        self.linked.iter().copied().filter(|id| !self.is_recreated(*id))
    }

    /// Active documents for which `is_exception` holds.
    pub fn exceptions<F>(&self, mut is_exception: F) -> DomainResult<Vec<T>>
    where
        F: FnMut(T) -> DomainResult<bool>,
    {
        let mut out = Vec::new();
        for id in self.active() {
            if is_exception(id)? {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Split the active documents of `domain` into recreated (those selected
    /// in `recreate`) and ignored (the rest). Documents outside `domain`, not
    /// linked, or already classified are left alone.
    pub fn classify(&self, domain: &[T], recreate: &[T]) -> Classification<T> {
        let mut classification = Classification {
            ignored: Vec::new(),
            recreated: Vec::new(),
        };
        for id in self.active() {
            if !domain.contains(&id) {
                continue;
            }
            if recreate.contains(&id) {
                classification.recreated.push(id);
            } else {
                classification.ignored.push(id);
            }
        }
        classification
    }

    /// Record a classification produced by [`LinkedSet::classify`].
    ///
    /// Ids that are not linked, already classified, or listed on both sides
    /// are skipped, so the partition invariants always hold.
    pub fn absorb(&mut self, classification: &Classification<T>) {
        for id in &classification.ignored {
            if self.contains(*id)
                && !self.is_skipped(*id)
                && !classification.recreated.contains(id)
            {
                self.ignored.insert(*id);
            }
        }
        for id in &classification.recreated {
            if self.contains(*id) && !self.is_skipped(*id) {
                self.recreated.insert(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(ids: &[u32]) -> LinkedSet<u32> {
        let mut s = LinkedSet::new();
        for id in ids {
            s.link(*id);
        }
        s
    }

    #[test]
    fn classify_splits_domain_by_selection() {
        let s = set(&[1, 2, 3, 4]);
        let c = s.classify(&[2, 3, 4], &[3]);
        assert_eq!(c.recreated, vec![3]);
        assert_eq!(c.ignored, vec![2, 4]);
    }

    #[test]
    fn empty_selection_ignores_everything_in_domain() {
        let mut s = set(&[1, 2]);
        let c = s.classify(&[1, 2], &[]);
        assert_eq!(c.ignored, vec![1, 2]);
        s.absorb(&c);
        assert_eq!(s.active().count(), 0);
        // Nothing is left to classify the second time.
        assert!(s.classify(&[1, 2], &[]).is_empty());
    }

    #[test]
    fn absorbing_twice_changes_nothing() {
        let mut s = set(&[7]);
        let c = s.classify(&[7], &[7]);
        s.absorb(&c);
        let once = s.clone();
        s.absorb(&Classification {
            ignored: vec![7],
            recreated: vec![],
        });
        assert_eq!(s, once);
        assert!(s.is_recreated(7));
        assert_eq!(s.not_recreated().count(), 0);
    }

    #[test]
    fn unknown_or_conflicting_ids_are_not_absorbed() {
        let mut s = set(&[1, 2]);
        s.absorb(&Classification {
            ignored: vec![9, 2],
            recreated: vec![2],
        });
        assert!(s.ignored().is_empty());
        assert!(s.is_recreated(2));
        assert!(!s.contains(9));
    }

    proptest! {
        /// Property: after any sequence of classifications, ignored and
        /// recreated are disjoint subsets of linked.
        #[test]
        fn partition_invariants_hold(
            linked in prop::collection::vec(0u32..20, 0..15),
            rounds in prop::collection::vec(
                (prop::collection::vec(0u32..25, 0..10), prop::collection::vec(0u32..25, 0..10)),
                0..5,
            ),
        ) {
            let mut s = set(&linked);
            for (domain, recreate) in rounds {
                let c = s.classify(&domain, &recreate);
                s.absorb(&c);
                // Arbitrary input cannot break the partition either.
                s.absorb(&Classification { ignored: domain.clone(), recreated: recreate.clone() });
            }
            prop_assert!(s.ignored().is_disjoint(s.recreated()));
            prop_assert!(s.ignored().iter().all(|id| s.contains(*id)));
            prop_assert!(s.recreated().iter().all(|id| s.contains(*id)));
        }
    }
}
