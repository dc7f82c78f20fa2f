//! Shared building blocks for Nbship crates
//!
//! This crate holds the pieces every Nbship binary and library needs:
//! compiled-in service constants and a standardized logging setup.

pub mod api_constants;
pub mod logging;

pub use api_constants::{
    AUTH_LOGIN_PATH, AUTH_LOGOUT_PATH, AUTH_REFRESH_PATH, DEFAULT_API_URL, TOKEN_FILE_NAME,
};
