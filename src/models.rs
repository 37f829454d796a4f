//! Data models for the analytics provider.
//!
//! This module contains the read-only views fetched from the provider on
//! every run: projects, experiments, and per-(variation, goal) stat records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A provider project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Provider identifier.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Display name, matched exactly against a target's `project_name`.
    #[serde(rename = "project_name")]
    pub name: String,
}

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExperimentStatus {
    Running,
    Paused,
    NotStarted,
    Archived,
    Other(String),
}

impl From<String> for ExperimentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Running" => ExperimentStatus::Running,
            "Paused" => ExperimentStatus::Paused,
            "Not started" => ExperimentStatus::NotStarted,
            "Archived" => ExperimentStatus::Archived,
            _ => ExperimentStatus::Other(s),
        }
    }
}

impl From<ExperimentStatus> for String {
    fn from(status: ExperimentStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentStatus::Running => write!(f, "Running"),
            ExperimentStatus::Paused => write!(f, "Paused"),
            ExperimentStatus::NotStarted => write!(f, "Not started"),
            ExperimentStatus::Archived => write!(f, "Archived"),
            ExperimentStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A URL targeting rule attached to an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCondition {
    /// The URL or pattern being matched.
    pub value: String,
}

/// An experiment belonging to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Provider identifier.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Human readable experiment name.
    #[serde(default)]
    pub description: String,
    /// Lifecycle status; only `Running` experiments are reported.
    pub status: ExperimentStatus,
    /// Last modification timestamp, used as the report start date.
    pub last_modified: DateTime<Utc>,
    /// Free-text details.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub details: String,
    /// Shareable results link.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub shareable_results_link: String,
    /// URL targeting rules.
    #[serde(default)]
    pub url_conditions: Vec<UrlCondition>,
}

impl Experiment {
    /// Returns true if the experiment should be reported.
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }
}

/// Significance status of one (variation, goal) row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GoalStatus {
    Baseline,
    Winner,
    Loser,
    Inconclusive,
    Other(String),
}

impl GoalStatus {
    /// Key used in the `goal_status_icons` configuration map.
    pub fn as_str(&self) -> &str {
        match self {
            GoalStatus::Baseline => "baseline",
            GoalStatus::Winner => "winner",
            GoalStatus::Loser => "loser",
            GoalStatus::Inconclusive => "inconclusive",
            GoalStatus::Other(s) => s,
        }
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, GoalStatus::Baseline)
    }
}

impl From<String> for GoalStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "baseline" => GoalStatus::Baseline,
            "winner" => GoalStatus::Winner,
            "loser" => GoalStatus::Loser,
            "inconclusive" => GoalStatus::Inconclusive,
            _ => GoalStatus::Other(s),
        }
    }
}

impl From<GoalStatus> for String {
    fn from(status: GoalStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One statistics row for a (variation, goal) pair of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    #[serde(deserialize_with = "id_string")]
    pub variation_id: String,
    #[serde(default)]
    pub variation_name: String,
    #[serde(deserialize_with = "id_string")]
    pub goal_id: String,
    #[serde(default)]
    pub goal_name: String,
    /// Variation designated as baseline; identical across one experiment.
    #[serde(deserialize_with = "id_string")]
    pub baseline_id: String,
    pub status: GoalStatus,
    /// Conversion rate as a fraction in [0, 1].
    #[serde(default)]
    pub conversion_rate: f64,
    /// Only meaningful for non-baseline rows.
    #[serde(default)]
    pub visitors_until_statistically_significant: Option<u64>,
}

/// Accepts an identifier given either as a JSON number or a string.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_accepts_numeric_id() {
        let project: Project =
            serde_json::from_str(r#"{"id": 859720118, "project_name": "Storefront"}"#).unwrap();
        assert_eq!(project.id, "859720118");
        assert_eq!(project.name, "Storefront");
    }

    #[test]
    fn test_experiment_status_parsing() {
        assert_eq!(
            ExperimentStatus::from("Running".to_string()),
            ExperimentStatus::Running
        );
        assert_eq!(
            ExperimentStatus::from("Not started".to_string()),
            ExperimentStatus::NotStarted
        );
        assert_eq!(
            ExperimentStatus::from("Draft".to_string()),
            ExperimentStatus::Other("Draft".to_string())
        );
    }

    #[test]
    fn test_experiment_deserialize() {
        let json = r#"{
            "id": 2358472001,
            "description": "Checkout button color",
            "status": "Running",
            "last_modified": "2024-03-01T09:30:00Z",
            "details": null,
            "shareable_results_link": "https://example.com/r/abc",
            "url_conditions": [{"value": "https://shop.example.com/cart", "match_type": "simple", "negate": false}]
        }"#;

        let experiment: Experiment = serde_json::from_str(json).unwrap();
        assert_eq!(experiment.id, "2358472001");
        assert!(experiment.is_running());
        assert_eq!(experiment.details, "");
        assert_eq!(experiment.url_conditions.len(), 1);
        assert_eq!(
            experiment.url_conditions[0].value,
            "https://shop.example.com/cart"
        );
    }

    #[test]
    fn test_stat_record_deserialize() {
        let json = r#"{
            "variation_id": "2401", "variation_name": "Green",
            "goal_id": 77, "goal_name": "Purchases",
            "baseline_id": "2400", "status": "inconclusive",
            "conversion_rate": 0.0425,
            "visitors_until_statistically_significant": 1200
        }"#;

        let record: StatRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.goal_id, "77");
        assert_eq!(record.status, GoalStatus::Inconclusive);
        assert_eq!(record.visitors_until_statistically_significant, Some(1200));
    }

    #[test]
    fn test_goal_status_round_trip_key() {
        assert_eq!(GoalStatus::from("baseline".to_string()).as_str(), "baseline");
        assert!(GoalStatus::Baseline.is_baseline());
        assert!(!GoalStatus::Winner.is_baseline());
        assert_eq!(GoalStatus::Other("custom".to_string()).as_str(), "custom");
    }
}
