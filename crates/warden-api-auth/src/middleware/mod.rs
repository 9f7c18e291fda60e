//! HTTP middleware: authorization, error logging and request helpers.

pub mod authorize;
pub mod client_info;
pub mod current_user;
pub mod error_logging;
pub mod refresh_cookie;

pub use authorize::{authorize, deny_response, safe_redirect, AuthorizeState, DEFAULT_LOGIN_PATH};
pub use client_info::{client_ip, sanitize_user_agent, ClientContext};
pub use current_user::CurrentUser;
pub use error_logging::log_errors;
pub use refresh_cookie::{
    clear_refresh_cookie, create_refresh_cookie, extract_refresh_cookie, REFRESH_COOKIE_NAME,
};
