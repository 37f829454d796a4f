//! Stat record aggregation.
//!
//! Groups the flat per-(variation, goal) stat records of one experiment by
//! variation and goal, resolves the baseline, and fixes the order in which
//! variations and goals are reported.

use crate::error::AggregationError;
use crate::models::StatRecord;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Goal identifier ordered by numeric value, numeric ids before others.
///
/// Equal numeric values (`"07"` / `"7"`) and non-numeric ids fall back to
/// string order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GoalKey(String);

impl GoalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }
}

impl From<&str> for GoalKey {
    fn from(id: &str) -> Self {
        GoalKey(id.to_string())
    }
}

impl fmt::Display for GoalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for GoalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_value = match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_value.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for GoalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Stat records of one experiment, grouped and ordered for rendering.
#[derive(Debug, Clone, Default)]
pub struct AggregatedView {
    /// Resolved baseline variation; `None` only when there were no records.
    pub baseline_id: Option<String>,
    stats: HashMap<String, BTreeMap<GoalKey, StatRecord>>,
    variation_names: HashMap<String, String>,
    goal_names: HashMap<String, String>,
    order: Vec<String>,
}

/// One variation's goals, in report order.
#[derive(Debug, Clone, Copy)]
pub struct VariationStats<'a> {
    pub variation_id: &'a str,
    pub goals: &'a BTreeMap<GoalKey, StatRecord>,
}

impl AggregatedView {
    /// Variations in report order (baseline first), each with its goals
    /// ordered by [`GoalKey`].
    pub fn variations(&self) -> impl Iterator<Item = VariationStats<'_>> {
        self.order.iter().filter_map(move |id| {
            self.stats.get(id).map(|goals| VariationStats {
                variation_id: id,
                goals,
            })
        })
    }

    /// Display name of a variation, falling back to its id.
    pub fn variation_name<'a>(&'a self, variation_id: &'a str) -> &'a str {
        self.variation_names
            .get(variation_id)
            .map(String::as_str)
            .unwrap_or(variation_id)
    }

    /// Display name of a goal, falling back to its id.
    pub fn goal_name<'a>(&'a self, goal_id: &'a str) -> &'a str {
        self.goal_names
            .get(goal_id)
            .map(String::as_str)
            .unwrap_or(goal_id)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn variation_count(&self) -> usize {
        self.stats.len()
    }
}

/// Aggregate one experiment's stat records.
///
/// Names are taken from the last record that mentions a given variation or
/// goal. An empty batch yields an empty view. A non-empty batch must contain a
/// `baseline` row and agree on `baseline_id`, and every non-baseline variation
/// id must be numeric.
pub fn aggregate(records: Vec<StatRecord>) -> Result<AggregatedView, AggregationError> {
    let mut view = AggregatedView::default();

    if records.is_empty() {
        return Ok(view);
    }

    if !records.iter().any(|r| r.status.is_baseline()) {
        return Err(AggregationError::MissingBaseline);
    }

    let mut baseline_id: Option<String> = None;

    for record in records {
        let expected = baseline_id.get_or_insert_with(|| record.baseline_id.clone());
        if *expected != record.baseline_id {
            return Err(AggregationError::InconsistentBaseline {
                expected: expected.clone(),
                found: record.baseline_id,
            });
        }

        view.variation_names
            .insert(record.variation_id.clone(), record.variation_name.clone());
        view.goal_names
            .insert(record.goal_id.clone(), record.goal_name.clone());

        view.stats
            .entry(record.variation_id.clone())
            .or_default()
            .insert(GoalKey::from(record.goal_id.as_str()), record);
    }

    let baseline = baseline_id.unwrap_or_default();
    view.order = order_variations(view.stats.keys().map(String::as_str), &baseline)?;
    view.baseline_id = Some(baseline);

    Ok(view)
}

/// Order variation ids: the baseline first, then ascending by numeric value.
pub fn order_variations<'a, I>(ids: I, baseline_id: &str) -> Result<Vec<String>, AggregationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keyed: Vec<(Option<u64>, &str)> = ids
        .into_iter()
        .map(|id| {
            if id == baseline_id {
                Ok((None, id))
            } else {
                id.trim()
                    .parse::<u64>()
                    .map(|n| (Some(n), id))
                    .map_err(|_| AggregationError::InvalidVariationId(id.to_string()))
            }
        })
        .collect::<Result<_, _>>()?;

    keyed.sort_by(|a, b| match (a.0, b.0) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(b.1)),
    });

    Ok(keyed.into_iter().map(|(_, id)| id.to_string()).collect())
}
