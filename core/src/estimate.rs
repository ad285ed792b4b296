use crate::table::{Level, Marks, RankTable};

pub type Estimate = i64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: Level,
    pub upper: Level,
}

/// Estimate the rank for `query` marks.
///
/// An exact key returns the rounded mean of its ranks. Anything else is
/// linearly interpolated inside its bracket; queries outside the table use the
/// full span from the lowest to the highest key. Never fails; callers are
/// expected to reject non-finite or negative marks beforehand.
pub fn estimate(table: &RankTable, query: f64) -> Estimate {
    if let Some(level) = exact_key(query).and_then(|m| table.level(m)) {
        return round(level.mean_rank);
    }
    let Bracket { lower, upper } = bracket(table, query);
    if upper.marks == lower.marks {
        return round(lower.mean_rank);
    }
    let span = upper.marks as f64 - lower.marks as f64;
    let rank = lower.mean_rank + (query - lower.marks as f64) * (upper.mean_rank - lower.mean_rank) / span;
    round(rank)
}

pub fn bracket(table: &RankTable, query: f64) -> Bracket {
    let mut above: Option<Level> = None;
    for level in table.levels_desc() {
        if (level.marks as f64) < query {
            if let Some(upper) = above {
                return Bracket { lower: level, upper };
            }
            break;
        }
        above = Some(level);
    }
    Bracket { lower: table.bottom(), upper: table.top() }
}

fn exact_key(query: f64) -> Option<Marks> {
    if query.fract() == 0.0 && query >= 0.0 && query <= Marks::MAX as f64 {
        Some(query as Marks)
    } else {
        None
    }
}

// Half-way values round to the even neighbour.
fn round(rank: f64) -> Estimate {
    rank.round_ties_even() as Estimate
}
