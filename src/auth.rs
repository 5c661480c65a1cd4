use axum::http::{header, HeaderMap};

use crate::config::Config;
use crate::errors::AppError;

/// Principal roles recognized by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
}

/// Validate the bearer credential on an administrative request.
///
/// The batch recalculation job and any assignment triggered from an
/// administrative surface require `Role::Admin`. Requests without a valid
/// credential get an authorization error, never a silent no-op.
pub fn require_admin(headers: &HeaderMap, config: &Config) -> Result<Role, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Expected Bearer credential".to_string()))?;

    if token != config.admin_api_key {
        return Err(AppError::Unauthorized("Invalid admin credential".to_string()));
    }

    Ok(Role::Admin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn test_config() -> Config {
        Config {
            database_url: "postgresql://test".to_string(),
            port: 3000,
            admin_api_key: "secret-admin-key".to_string(),
            notify_base_url: None,
            notify_token: None,
            auto_assign_threshold: 70,
            recalc_batch_size: 10,
        }
    }

    #[test]
    fn missing_header_rejected() {
        let headers = HeaderMap::new();
        let err = require_admin(&headers, &test_config()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn non_bearer_scheme_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic secret-admin-key"),
        );
        let err = require_admin(&headers, &test_config()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn wrong_token_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wrong-key"),
        );
        let err = require_admin(&headers, &test_config()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn valid_token_grants_admin() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret-admin-key"),
        );
        let role = require_admin(&headers, &test_config()).unwrap();
        assert_eq!(role, Role::Admin);
    }
}
