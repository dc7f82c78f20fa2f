//! Authentication module for the Nbship SDK
//!
//! This module provides:
//! - Credential persistence behind the [`TokenStore`] seam
//! - Single-flight refresh coordination for concurrent 401s
//! - The wire types of the auth endpoints

pub mod refresh;
pub mod token_store;
pub mod types;

// Re-export commonly used types and functions
pub use refresh::{RefreshCoordinator, RefreshOutcome, SessionExpired};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{LoginRequest, RefreshRequest, TokenResponse, TokenSet};
