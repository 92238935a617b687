//! Grouped accuracy and reaction-time statistics.

use crate::models::{AggregateResult, GroupStats, NormalizedRow, round1};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    n: u64,
    correct: u64,
    reaction_sum: i128,
}

impl Accumulator {
    fn add(&mut self, row: &NormalizedRow) {
        self.n += 1;
        self.correct += u64::from(row.correct);
        self.reaction_sum += i128::from(row.reaction_ms);
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self, domain_code: String, exercise_code: Option<String>) -> GroupStats {
        let n = self.n as f64;
        GroupStats {
            domain_code,
            exercise_code,
            n: self.n,
            accuracy_pct: round1(100.0 * self.correct as f64 / n),
            mean_reaction_ms: round1(self.reaction_sum as f64 / n),
        }
    }
}

/// Groups rows by domain and by (domain, exercise).
///
/// Per group: `n` rows, `accuracy_pct = 100 * correct / n` and
/// `mean_reaction_ms = sum / n`, both rounded to one decimal place.
/// `by_domain` is sorted by domain code and `by_exercise` by
/// (domain code, exercise code), so equal inputs in any order produce equal
/// results. No rows yields an empty result.
///
/// # Example
///
/// ```rust
/// use cogtrace::{NormalizedRow, aggregate};
///
/// let result = aggregate([
///     NormalizedRow::new("VPM", "E1", true, 400),
///     NormalizedRow::new("MCP", "E2", false, 700),
///     NormalizedRow::new("MCP", "E2", true, 500),
/// ]);
/// assert_eq!(result.by_domain[0].domain_code, "MCP");
/// assert_eq!(result.by_domain[0].accuracy_pct, 50.0);
/// assert_eq!(result.by_domain[0].mean_reaction_ms, 600.0);
/// ```
pub fn aggregate<I>(rows: I) -> AggregateResult
where
    I: IntoIterator<Item = NormalizedRow>,
{
    let mut by_domain: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut by_exercise: BTreeMap<(String, String), Accumulator> = BTreeMap::new();

    for row in rows {
        by_domain.entry(row.domain_code.clone()).or_default().add(&row);
        by_exercise
            .entry((row.domain_code.clone(), row.exercise_code.clone()))
            .or_default()
            .add(&row);
    }

    AggregateResult {
        by_domain: by_domain
            .into_iter()
            .map(|(domain, acc)| acc.finish(domain, None))
            .collect(),
        by_exercise: by_exercise
            .into_iter()
            .map(|((domain, exercise), acc)| acc.finish(domain, Some(exercise)))
            .collect(),
    }
}
