use crate::errors::AppError;
use crate::models::roles::MaxAccessLevel;

/// How requests are authenticated for this deployment. Mode and date forcing
/// through override hints is only honored when authentication is disabled,
/// which is a development-only setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Jwt,
}

impl AuthType {
    pub fn permits_mode_forcing(&self) -> bool {
        matches!(self, AuthType::None)
    }
}

/// Read-only deployment settings threaded into the authorization engine at
/// construction time. Nothing reads these from the environment mid-request.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub auth_type: AuthType,
    pub max_access_level: MaxAccessLevel,
}

impl DeploymentConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let auth_type = std::env::var("AUTH_TYPE").ok();
        let max_access_level = std::env::var("MAX_ACCESS_LEVEL").ok();
        Self::from_values(auth_type.as_deref(), max_access_level.as_deref())
    }

    fn from_values(
        auth_type: Option<&str>,
        max_access_level: Option<&str>,
    ) -> Result<Self, AppError> {
        let auth_type = match auth_type {
            None | Some("jwt") => AuthType::Jwt,
            Some("none") => AuthType::None,
            Some(other) => {
                return Err(AppError::configuration(format!(
                    "AUTH_TYPE must be \"jwt\" or \"none\", got {other:?}"
                )))
            }
        };

        let max_access_level = match max_access_level {
            None => MaxAccessLevel::Unrestricted,
            Some(value) => value.parse::<MaxAccessLevel>().map_err(|_| {
                AppError::configuration(format!(
                    "MAX_ACCESS_LEVEL must be \"unrestricted\", \"instructor\" or \"student\", got {value:?}"
                ))
            })?,
        };

        Ok(Self {
            auth_type,
            max_access_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_jwt_and_unrestricted() {
        let config = DeploymentConfig::from_values(None, None).unwrap();
        assert_eq!(config.auth_type, AuthType::Jwt);
        assert_eq!(config.max_access_level, MaxAccessLevel::Unrestricted);
    }

    #[test]
    fn parses_explicit_values() {
        let config = DeploymentConfig::from_values(Some("none"), Some("student")).unwrap();
        assert_eq!(config.auth_type, AuthType::None);
        assert_eq!(config.max_access_level, MaxAccessLevel::Student);
        assert!(config.auth_type.permits_mode_forcing());
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(DeploymentConfig::from_values(Some("saml"), None).is_err());
        assert!(DeploymentConfig::from_values(None, Some("root")).is_err());
    }
}
