//! Service constants for the Nbship API
//!
//! These constants are pre-compiled into the binary to avoid the need for
//! external configuration files.

/// Default base URL for the Nbship API
pub const DEFAULT_API_URL: &str = "https://api.nbship.dev";

/// Path of the login endpoint
pub const AUTH_LOGIN_PATH: &str = "/auth/login";

/// Path of the token refresh endpoint
pub const AUTH_REFRESH_PATH: &str = "/auth/refresh";

/// Path of the logout endpoint
pub const AUTH_LOGOUT_PATH: &str = "/auth/logout";

/// File name used for persisted credentials inside the Nbship data directory
pub const TOKEN_FILE_NAME: &str = "tokens.json";
