//! Pipeline driver.
//!
//! Walks target projects, their matching provider projects, and each running
//! experiment, builds one report per experiment, and posts it. Every external
//! step runs under its own retry budget; a unit that still fails afterwards is
//! logged and skipped, and the run moves on to the next one.

use crate::analysis;
use crate::config::{Config, Credentials, TargetProject};
use crate::delivery::{ChatDelivery, DeliveryReceipt, OutgoingMessage};
use crate::error::{PipelineError, Stage};
use crate::models::{Experiment, Project};
use crate::provider::AnalyticsProvider;
use crate::report::{self, ReportFormatter};
use crate::retry::{with_retry, RetryPolicy};
use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

/// Counters describing one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Target entries whose project list was fetched.
    pub targets_processed: usize,
    /// Target entries skipped because of configuration problems.
    pub targets_skipped: usize,
    /// Target entries whose project list could not be fetched.
    pub targets_failed: usize,
    /// Provider projects whose experiment list could not be fetched.
    pub projects_failed: usize,
    pub experiments_delivered: usize,
    pub experiments_failed: usize,
}

impl RunSummary {
    /// True if any unit of work was abandoned after exhausting its retries.
    pub fn has_failures(&self) -> bool {
        self.targets_failed > 0 || self.projects_failed > 0 || self.experiments_failed > 0
    }
}

/// Select provider projects by exact name; `None` selects all of them.
pub fn select_projects<'p>(projects: &'p [Project], name: Option<&str>) -> Vec<&'p Project> {
    match name {
        Some(name) => projects.iter().filter(|p| p.name == name).collect(),
        None => projects.iter().collect(),
    }
}

/// One reporting run over every configured target project.
pub struct Pipeline<'a, P, D> {
    config: &'a Config,
    provider: &'a P,
    delivery: &'a D,
    retry: RetryPolicy,
    today: NaiveDate,
    only_project: Option<String>,
}

impl<'a, P, D> Pipeline<'a, P, D>
where
    P: AnalyticsProvider,
    D: ChatDelivery,
{
    /// Create a pipeline using the config's retry settings.
    pub fn new(config: &'a Config, provider: &'a P, delivery: &'a D, today: NaiveDate) -> Self {
        Self {
            config,
            provider,
            delivery,
            retry: RetryPolicy::from(&config.retry),
            today,
            only_project: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Only run target entries whose `project_name` equals `name`.
    pub fn with_project_filter(mut self, name: Option<String>) -> Self {
        self.only_project = name;
        self
    }

    /// Process every target project in order.
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for (index, target) in self.config.target_projects.iter().enumerate() {
            if let Some(ref only) = self.only_project {
                if target.project_filter() != Some(only.as_str()) {
                    debug!(target_project = index, "Not selected by --project, skipping");
                    continue;
                }
            }

            let Some(credentials) = target.credentials(self.config) else {
                warn!(
                    target_project = index,
                    "Missing chat or analytics token ('{}' / '{}'), skipping",
                    target.chat_token_ref,
                    target.analytics_token_ref
                );
                summary.targets_skipped += 1;
                continue;
            };

            match self
                .run_target(index, target, &credentials, &mut summary)
                .await
            {
                Ok(()) => summary.targets_processed += 1,
                Err(e) => {
                    error!(
                        target_project = index,
                        stage = ?e.stage(),
                        "Skipping target project: {}",
                        e
                    );
                    summary.targets_failed += 1;
                }
            }
        }

        summary
    }

    async fn run_target(
        &self,
        index: usize,
        target: &TargetProject,
        credentials: &Credentials,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let provider = self.provider;
        let token = credentials.analytics_token.as_str();
        let key = format!("target_projects[{}]", index);

        let projects = with_retry(&self.retry, Stage::ProjectList, &key, move || {
            provider.list_projects(token)
        })
        .await?;

        let selected = select_projects(&projects, target.project_filter());
        if selected.is_empty() {
            info!(
                target_project = index,
                "No provider project matches {:?}",
                target.project_filter().unwrap_or_default()
            );
            return Ok(());
        }

        for project in selected {
            if let Err(e) = self
                .run_project(index, target, credentials, project, summary)
                .await
            {
                error!(
                    target_project = index,
                    project_id = %project.id,
                    stage = ?e.stage(),
                    "Skipping project {}: {}",
                    project.name,
                    e
                );
                summary.projects_failed += 1;
            }
        }

        Ok(())
    }

    async fn run_project(
        &self,
        index: usize,
        target: &TargetProject,
        credentials: &Credentials,
        project: &Project,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let provider = self.provider;
        let token = credentials.analytics_token.as_str();
        let project_id = project.id.as_str();

        let experiments = with_retry(
            &self.retry,
            Stage::ExperimentList,
            &format!("project {}", project_id),
            move || provider.list_experiments(token, project_id),
        )
        .await?;

        let running: Vec<&Experiment> = experiments.iter().filter(|e| e.is_running()).collect();
        info!(
            target_project = index,
            project_id,
            "Project {}: {} running of {} experiment(s)",
            project.name,
            running.len(),
            experiments.len()
        );

        let boxed = report::formatter_for(target.format);
        let formatter: &dyn ReportFormatter = &*boxed;

        for experiment in running {
            let key = format!("experiment {}", experiment.id);
            let result = with_retry(&self.retry, Stage::Experiment, &key, move || {
                self.process_experiment(target, credentials, project, experiment, formatter)
            })
            .await;

            match result {
                Ok(receipt) => {
                    info!(
                        target_project = index,
                        project_id,
                        experiment_id = %experiment.id,
                        "Posted report for '{}' to {} (ts {})",
                        experiment.description,
                        receipt.channel,
                        receipt.timestamp.as_deref().unwrap_or("-")
                    );
                    summary.experiments_delivered += 1;
                }
                Err(e) => {
                    error!(
                        target_project = index,
                        project_id,
                        experiment_id = %experiment.id,
                        stage = %Stage::Experiment,
                        "Skipping experiment: {}",
                        e
                    );
                    summary.experiments_failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Fetch, aggregate, render, and deliver one experiment's report.
    async fn process_experiment(
        &self,
        target: &TargetProject,
        credentials: &Credentials,
        project: &Project,
        experiment: &Experiment,
        formatter: &dyn ReportFormatter,
    ) -> Result<DeliveryReceipt> {
        let records = self
            .provider
            .fetch_stats(&credentials.analytics_token, &experiment.id)
            .await?;
        debug!(
            "Experiment {}: {} stat record(s)",
            experiment.id,
            records.len()
        );

        let view = analysis::aggregate(records).map_err(PipelineError::Aggregation)?;
        if view.is_empty() {
            debug!("Experiment {} has no statistics yet", experiment.id);
        } else {
            debug!(
                "Experiment {}: {} variation(s), baseline {:?}",
                experiment.id,
                view.variation_count(),
                view.baseline_id
            );
        }
        let report = report::build_report(experiment, &view, target, self.today);
        let rendered = formatter
            .format(&report)
            .map_err(PipelineError::Render)?;

        let message = OutgoingMessage {
            channel: target.channel.clone(),
            username: format!("{} ({})", target.display_name, project.name),
            icon_emoji: target.icon_emoji.clone(),
            text: rendered.text,
            attachments: rendered.attachments,
        };

        let delivery = self.delivery;
        let token = credentials.chat_token.as_str();
        let message = &message;
        let receipt = with_retry(&self.retry, Stage::Delivery, &target.channel, move || {
            delivery.post_message(token, message)
        })
        .await?;

        Ok(receipt)
    }
}
