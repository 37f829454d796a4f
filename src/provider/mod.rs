//! Analytics provider access.
//!
//! The pipeline only depends on [`AnalyticsProvider`]; the REST client in
//! [`optimizely`] is the production implementation.

pub mod optimizely;

pub use optimizely::OptimizelyClient;

use crate::models::{Experiment, Project, StatRecord};
use anyhow::Result;
use std::future::Future;

/// Read access to projects, experiments, and experiment statistics.
///
/// The API token is passed on every call; implementations hold no
/// per-target state.
pub trait AnalyticsProvider {
    fn list_projects(&self, token: &str) -> impl Future<Output = Result<Vec<Project>>> + Send;

    fn list_experiments(
        &self,
        token: &str,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<Experiment>>> + Send;

    fn fetch_stats(
        &self,
        token: &str,
        experiment_id: &str,
    ) -> impl Future<Output = Result<Vec<StatRecord>>> + Send;
}
