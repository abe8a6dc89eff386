//! Merging the ranked lists of the two stores.
//!
//! Overlap-tiered rank fusion. Each candidate (keyed by uuid) is sorted by,
//! ascending:
//!
//! 1. how many of the two lists it is missing from,
//! 2. its worst 0-based rank across the lists it appears in,
//! 3. its negated reciprocal-rank score (`k = 60`),
//! 4. its uuid.
//!
//! Shared candidates therefore come first, and a shared candidate never lands
//! below its worse individual rank: every shared candidate ahead of it has a
//! worst rank no greater than its own, and there are at most that many of
//! them in either list. The output depends only on the two input orderings.

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::driver::RRF_K;

struct Candidate<T> {
    uuid: Uuid,
    item: T,
    fast_rank: Option<usize>,
    quality_rank: Option<usize>,
}

impl<T> Candidate<T> {
    fn missing(&self) -> usize {
        usize::from(self.fast_rank.is_none()) + usize::from(self.quality_rank.is_none())
    }

    fn worst_rank(&self) -> usize {
        self.fast_rank.into_iter().chain(self.quality_rank).max().unwrap_or(usize::MAX)
    }

    fn rrf(&self) -> f32 {
        self.fast_rank
            .into_iter()
            .chain(self.quality_rank)
            .map(|r| 1.0 / (RRF_K + r as f32 + 1.0))
            .sum()
    }

    fn cmp_rank(&self, other: &Self) -> Ordering {
        self.missing()
            .cmp(&other.missing())
            .then_with(|| self.worst_rank().cmp(&other.worst_rank()))
            .then_with(|| other.rrf().total_cmp(&self.rrf()))
            .then_with(|| self.uuid.cmp(&other.uuid))
    }
}

/// Merge the `fast` and `quality` result lists into one, keeping at most `limit`.
///
/// A candidate present in both lists is returned as its `quality` copy.
/// Repeated uuids within one list keep their first rank.
pub fn merge_ranked<T>(fast: Vec<T>, quality: Vec<T>, uuid_of: impl Fn(&T) -> Uuid, limit: usize) -> Vec<T> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut candidates: Vec<Candidate<T>> = Vec::with_capacity(fast.len() + quality.len());

    for (rank, item) in fast.into_iter().enumerate() {
        let uuid = uuid_of(&item);
        if index.contains_key(&uuid) {
            continue;
        }
        index.insert(uuid, candidates.len());
        candidates.push(Candidate {
            uuid,
            item,
            fast_rank: Some(rank),
            quality_rank: None,
        });
    }

    for (rank, item) in quality.into_iter().enumerate() {
        let uuid = uuid_of(&item);
        match index.get(&uuid) {
            Some(&i) if candidates[i].quality_rank.is_none() => {
                candidates[i].quality_rank = Some(rank);
                candidates[i].item = item;
            }
            Some(_) => {}
            None => {
                index.insert(uuid, candidates.len());
                candidates.push(Candidate {
                    uuid,
                    item,
                    fast_rank: None,
                    quality_rank: Some(rank),
                });
            }
        }
    }

    candidates.sort_by(|a, b| a.cmp_rank(b));
    candidates.into_iter().take(limit).map(|c| c.item).collect()
}
