//! API types for the Nbship service
//!
//! Status enumerations are pure data: the poller consumes them to decide
//! termination, the console renders them. The wire speaks lowercase
//! snake_case throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An operation the poller can track to completion.
pub trait PolledOperation: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// True once no further state change is expected.
    fn is_terminal(&self) -> bool;
}

/// Status of a model build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Building,
    Success,
    Failed,
}

impl BuildStatus {
    /// Terminal set: {success, failed}
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }
}

/// Status of a deploy pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Processing,
    Deployed,
    Failed,
}

impl PipelineStatus {
    /// Terminal set: {deployed, failed}
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Deployed | PipelineStatus::Failed)
    }
}

/// The steps a deploy pipeline works through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    Parse,
    Dependencies,
    Upload,
    Build,
    Deploy,
}

impl PipelineStep {
    /// Every step in pipeline order
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::Parse,
        PipelineStep::Dependencies,
        PipelineStep::Upload,
        PipelineStep::Build,
        PipelineStep::Deploy,
    ];
}

/// A notebook build tracked by the build status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub status: BuildStatus,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
}

impl PolledOperation for Build {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A deploy pipeline tracked by the pipeline status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub status: PipelineStatus,
    pub notebook_name: String,
    #[serde(default)]
    pub completed_steps: Vec<PipelineStep>,
    pub created_at: DateTime<Utc>,
}

impl Pipeline {
    /// Fraction of pipeline steps completed, in `[0.0, 1.0]`
    pub fn progress(&self) -> f64 {
        self.completed_steps.len() as f64 / PipelineStep::ALL.len() as f64
    }
}

impl PolledOperation for Pipeline {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Request body for deploying a notebook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployNotebookRequest {
    /// Display name of the notebook
    pub notebook_name: String,
    /// Raw notebook JSON content
    pub content: String,
}

/// Request body for selecting the serving version of a model
#[derive(Debug, Serialize)]
pub struct SetActiveVersionRequest<'a> {
    pub version: &'a str,
}

/// A deployed model version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_id: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

/// Response from the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
}
