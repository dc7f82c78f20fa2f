//! # Nbship SDK
//!
//! Rust SDK for the Nbship notebook deployment service.
//!
//! The SDK centers on three pieces:
//! - [`NbshipClient`]: an authenticated HTTP client that transparently
//!   recovers from an expired access token. Concurrent requests that hit a
//!   401 share a single refresh call and replay afterwards; a failed refresh
//!   fails them all together and fires one session-expiry event.
//! - [`OperationPoller`]: a cancellable polling loop that tracks a build or
//!   deploy pipeline until it reaches a terminal status.
//! - [`TokenStore`]: pluggable credential persistence, injected into the
//!   client rather than global.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nbship_sdk::{BuildFetcher, ClientBuilder, OperationPoller};
//!
//! # async fn example() -> nbship_sdk::Result<()> {
//! let client = Arc::new(
//!     ClientBuilder::default()
//!         .base_url("https://api.nbship.dev")
//!         .with_file_auth()
//!         .build()?,
//! );
//!
//! let poller = OperationPoller::new(BuildFetcher::new(Arc::clone(&client)));
//! let mut updates = poller.start_polling("build-123", Duration::from_secs(3)).await;
//! while updates.changed().await.is_ok() {
//!     if let Some(build) = updates.borrow().clone() {
//!         println!("build {} is {:?}", build.id, build.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod poller;
pub mod types;

pub use auth::{
    FileTokenStore, MemoryTokenStore, SessionExpired, TokenSet, TokenStore,
};
pub use client::{ClientBuilder, NbshipClient, DEFAULT_TIMEOUT_SECS};
pub use error::{ApiError, ErrorDetail, ErrorResponse, Result};
pub use poller::{BuildFetcher, OperationFetch, OperationPoller, PipelineFetcher};
pub use types::{
    Build, BuildStatus, DeployNotebookRequest, HealthCheckResponse, ModelVersion, Pipeline,
    PipelineStatus, PipelineStep, PolledOperation, SetActiveVersionRequest,
};
