use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Marks = u32;
pub type Rank = u32;

pub const SENTINEL_MARKS: [Marks; 2] = [0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(alias = "m")]
    pub marks: Marks,
    #[serde(alias = "r")]
    pub rank: Rank,
}

impl Observation {
    pub fn new(marks: Marks, rank: Rank) -> Self { Self { marks, rank } }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub marks: Marks,
    pub mean_rank: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTable {
    ranks: BTreeMap<Marks, Vec<Rank>>,
    total: u32,
}

/// Sentinels are written after grouping, so any real observation at marks 0 or 1
/// is replaced rather than merged.
pub fn build(dataset: &[Observation], total: u32) -> RankTable {
    let mut ranks: BTreeMap<Marks, Vec<Rank>> = BTreeMap::new();
    for obs in dataset {
        ranks.entry(obs.marks).or_default().push(obs.rank);
    }
    for key in SENTINEL_MARKS {
        if let Some(shadowed) = ranks.insert(key, vec![total]) {
            tracing::debug!(marks = key, discarded = shadowed.len(), "sentinel replaced observed ranks");
        }
    }
    RankTable { ranks, total }
}

impl RankTable {
    pub fn total(&self) -> u32 { self.total }

    pub fn len(&self) -> usize { self.ranks.len() }

    pub fn is_empty(&self) -> bool { self.ranks.is_empty() }

    pub fn observation_count(&self) -> usize {
        self.ranks
            .iter()
            .filter(|(m, _)| !SENTINEL_MARKS.contains(*m))
            .map(|(_, r)| r.len())
            .sum()
    }

    pub fn ranks_at(&self, marks: Marks) -> Option<&[Rank]> {
        self.ranks.get(&marks).map(Vec::as_slice)
    }

    pub fn contains(&self, marks: Marks) -> bool { self.ranks.contains_key(&marks) }

    pub fn marks_desc(&self) -> impl Iterator<Item = Marks> + '_ {
        self.ranks.keys().rev().copied()
    }

    pub fn levels_desc(&self) -> impl Iterator<Item = Level> + '_ {
        self.ranks.iter().rev().map(|(&marks, ranks)| Level { marks, mean_rank: mean(ranks) })
    }

    pub fn level(&self, marks: Marks) -> Option<Level> {
        self.ranks.get(&marks).map(|ranks| Level { marks, mean_rank: mean(ranks) })
    }

    pub fn top(&self) -> Level {
        self.ranks
            .last_key_value()
            .map(|(&marks, ranks)| Level { marks, mean_rank: mean(ranks) })
            .unwrap_or_else(|| self.floor())
    }

    pub fn bottom(&self) -> Level {
        self.ranks
            .first_key_value()
            .map(|(&marks, ranks)| Level { marks, mean_rank: mean(ranks) })
            .unwrap_or_else(|| self.floor())
    }

    fn floor(&self) -> Level {
        Level { marks: 0, mean_rank: self.total as f64 }
    }
}

fn mean(ranks: &[Rank]) -> f64 {
    if ranks.is_empty() { return 0.0; }
    let sum: u64 = ranks.iter().map(|&r| r as u64).sum();
    sum as f64 / ranks.len() as f64
}
