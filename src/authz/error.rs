use thiserror::Error;

use crate::errors::AppError;

use super::data::AuthzData;

/// Everything that can go wrong while resolving an authorization context.
///
/// The two denial variants that occur after an override was attempted carry
/// the zeroed [`AuthzData`] so callers can still report who asked for what.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Access denied (both course_id and course_instance_id are null)")]
    ScopeMissing,

    #[error("Access denied")]
    BaseAccessDenied,

    #[error("Access denied (insufficient permissions to change the effective user)")]
    OverrideForbidden,

    #[error("Access denied")]
    UserNotFound { uid: String, info: String },

    #[error("Access denied")]
    OverrideEscalationDenied {
        info: String,
        denied: Box<AuthzData>,
    },

    #[error("Access denied")]
    OverrideAccessDenied {
        info: String,
        denied: Box<AuthzData>,
    },

    #[error("invalid {name} override: {value:?}")]
    InvalidOverride { name: &'static str, value: String },

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl AuthzError {
    /// Stable label for logs and audit payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::ScopeMissing => "scope_missing",
            AuthzError::BaseAccessDenied => "base_access_denied",
            AuthzError::OverrideForbidden => "override_forbidden",
            AuthzError::UserNotFound { .. } => "user_not_found",
            AuthzError::OverrideEscalationDenied { .. } => "override_escalation_denied",
            AuthzError::OverrideAccessDenied { .. } => "override_access_denied",
            AuthzError::InvalidOverride { .. } => "invalid_override",
            AuthzError::Store(_) => "store",
        }
    }

    /// The zeroed result attached to post-override denials, when present.
    pub fn denied_data(&self) -> Option<&AuthzData> {
        match self {
            AuthzError::OverrideEscalationDenied { denied, .. }
            | AuthzError::OverrideAccessDenied { denied, .. } => Some(denied),
            _ => None,
        }
    }

    /// Wraps a row-level parse failure as a store error so it surfaces the
    /// same way as any other bad read.
    pub fn store_decode<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AuthzError::Store(sqlx::Error::Decode(Box::new(err)))
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::ScopeMissing
            | AuthzError::BaseAccessDenied
            | AuthzError::OverrideForbidden => AppError::forbidden(err.to_string()),
            AuthzError::UserNotFound { ref info, .. } => {
                AppError::forbidden_with_info(err.to_string(), info.clone())
            }
            AuthzError::OverrideEscalationDenied { ref info, .. }
            | AuthzError::OverrideAccessDenied { ref info, .. } => {
                AppError::forbidden_with_info(err.to_string(), info.clone())
            }
            AuthzError::InvalidOverride { .. } => AppError::bad_request(err.to_string()),
            AuthzError::Store(e) => AppError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_missing_names_both_columns() {
        let err = AuthzError::ScopeMissing;
        assert_eq!(
            err.to_string(),
            "Access denied (both course_id and course_instance_id are null)"
        );
        assert_eq!(err.kind(), "scope_missing");
    }

    #[test]
    fn invalid_override_is_a_bad_request() {
        let err = AuthzError::InvalidOverride {
            name: "Course role",
            value: "Superuser".to_string(),
        };
        let app: AppError = err.into();
        assert!(matches!(app, AppError::BadRequest(_)));
    }

    #[test]
    fn store_errors_stay_internal() {
        let app: AppError = AuthzError::Store(sqlx::Error::RowNotFound).into();
        assert!(matches!(app, AppError::Database(_)));
    }
}
