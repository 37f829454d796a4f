//! Experiment report generation.
//!
//! A report is first built as a format-agnostic [`ExperimentReport`] and then
//! serialized into a chat message by a [`ReportFormatter`]: either a single
//! fenced text block or a header plus rich attachments.

use crate::analysis::AggregatedView;
use crate::config::{MessageFormat, TargetProject};
use crate::models::Experiment;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

/// Everything shown for one experiment, independent of the output format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentReport {
    pub experiment_id: String,
    pub description: String,
    pub started: NaiveDate,
    /// Whole days since `started`; negative if the provider clock is ahead.
    pub elapsed_days: i64,
    pub details: String,
    pub results_url: String,
    pub target_urls: Vec<String>,
    pub variations: Vec<VariationSection>,
}

/// One variation and its goal lines, in report order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationSection {
    pub variation_id: String,
    pub name: String,
    pub is_baseline: bool,
    pub goals: Vec<GoalLine>,
}

/// One goal measurement within a variation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalLine {
    pub goal_id: String,
    pub icon: String,
    pub name: String,
    pub conversion_rate: f64,
    /// Set only for non-baseline rows.
    pub visitors_until_significant: Option<u64>,
}

impl GoalLine {
    /// Conversion rate as a percentage, e.g. `12.35%`.
    pub fn conversion_label(&self) -> String {
        format!("CVR {}", format_percentage(self.conversion_rate))
    }

    /// Remaining-visitors annotation for non-baseline rows.
    pub fn significance_label(&self) -> Option<String> {
        self.visitors_until_significant
            .map(|n| format!("({} visitors until significant)", n))
    }
}

/// Format a fraction as a percentage with two decimals, rounding half away
/// from zero (`0.12345` becomes `12.35%`).
pub fn format_percentage(fraction: f64) -> String {
    if !fraction.is_finite() {
        return "n/a".to_string();
    }

    // `{:.2}` on the raw percentage would print 0.12345 as 12.34%.
    let hundredths = (fraction * 10_000.0).round();
    format!("{:.2}%", hundredths / 100.0)
}

/// Build the report data for one experiment.
pub fn build_report(
    experiment: &Experiment,
    view: &AggregatedView,
    target: &TargetProject,
    today: NaiveDate,
) -> ExperimentReport {
    let started = experiment.last_modified.date_naive();
    let baseline_id = view.baseline_id.as_deref();

    let variations = view
        .variations()
        .map(|variation| {
            let goals = variation
                .goals
                .iter()
                .map(|(goal_id, record)| GoalLine {
                    goal_id: goal_id.to_string(),
                    icon: target.icon_for(record.status.as_str()).to_string(),
                    name: view.goal_name(goal_id.as_str()).to_string(),
                    conversion_rate: record.conversion_rate,
                    visitors_until_significant: if record.status.is_baseline() {
                        None
                    } else {
                        Some(record.visitors_until_statistically_significant.unwrap_or(0))
                    },
                })
                .collect();

            VariationSection {
                variation_id: variation.variation_id.to_string(),
                name: view.variation_name(variation.variation_id).to_string(),
                is_baseline: Some(variation.variation_id) == baseline_id,
                goals,
            }
        })
        .collect();

    ExperimentReport {
        experiment_id: experiment.id.clone(),
        description: experiment.description.clone(),
        started,
        elapsed_days: (today - started).num_days(),
        details: experiment.details.clone(),
        results_url: experiment.shareable_results_link.clone(),
        target_urls: experiment
            .url_conditions
            .iter()
            .map(|c| c.value.clone())
            .collect(),
        variations,
    }
}

/// A rendered chat message body.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub text: String,
    /// Serialized JSON array of attachments, when the format uses them.
    pub attachments: Option<String>,
}

/// Turns an [`ExperimentReport`] into a message body.
pub trait ReportFormatter {
    fn format(&self, report: &ExperimentReport) -> Result<RenderedMessage, serde_json::Error>;
}

/// Pick the formatter for a target's configured message format.
pub fn formatter_for(format: MessageFormat) -> Box<dyn ReportFormatter + Send + Sync> {
    match format {
        MessageFormat::Text => Box::new(TextFormatter),
        MessageFormat::Attachments => Box::new(AttachmentsFormatter),
    }
}

/// Header lines shared by every format.
fn header_lines(report: &ExperimentReport) -> Vec<String> {
    let mut lines = vec![
        format!("Experiment: {}", report.description),
        format!(
            "Started: {} ({} days elapsed)",
            report.started.format("%Y-%m-%d"),
            report.elapsed_days
        ),
        report.details.clone(),
        format!("Results: {}", report.results_url),
        "Target URLs:".to_string(),
    ];
    lines.extend(report.target_urls.iter().map(|url| format!("  {}", url)));

    lines
}

/// Plain text: the whole report in one fenced block.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &ExperimentReport) -> Result<RenderedMessage, serde_json::Error> {
        let mut output = String::new();

        output.push_str("```\n");
        for line in header_lines(report) {
            output.push_str(&line);
            output.push('\n');
        }

        for variation in &report.variations {
            output.push('\n');
            output.push_str(&format!("■{}\n", variation.name));

            for goal in &variation.goals {
                output.push_str(&format!("{}{}\n", goal.icon, goal.name));
                output.push_str(&goal.conversion_label());
                if let Some(annotation) = goal.significance_label() {
                    output.push(' ');
                    output.push_str(&annotation);
                }
                output.push('\n');
            }
        }

        output.push_str("```");

        Ok(RenderedMessage {
            text: output,
            attachments: None,
        })
    }
}

/// Rich message: header as text, one attachment per variation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachmentsFormatter;

impl AttachmentsFormatter {
    fn attachment(variation: &VariationSection) -> Value {
        let fields: Vec<Value> = variation
            .goals
            .iter()
            .map(|goal| {
                let value = match goal.significance_label() {
                    Some(annotation) => format!("{} {}", goal.conversion_label(), annotation),
                    None => goal.conversion_label(),
                };
                json!({
                    "title": format!("{}{}", goal.icon, goal.name),
                    "value": value,
                    "short": true,
                })
            })
            .collect();

        let color = if variation.is_baseline {
            "#9e9e9e"
        } else {
            "#2eb886"
        };

        json!({
            "fallback": variation.name,
            "title": variation.name,
            "color": color,
            "fields": fields,
        })
    }
}

impl ReportFormatter for AttachmentsFormatter {
    fn format(&self, report: &ExperimentReport) -> Result<RenderedMessage, serde_json::Error> {
        let attachments: Vec<Value> = report.variations.iter().map(Self::attachment).collect();

        Ok(RenderedMessage {
            text: header_lines(report).join("\n"),
            attachments: Some(serde_json::to_string(&attachments)?),
        })
    }
}
