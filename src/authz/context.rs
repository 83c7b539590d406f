use chrono::{DateTime, Utc};

use crate::models::roles::AccessMode;

/// Request-time facts the resolver needs besides identity and scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    /// Instant access windows are evaluated against. Normally "now", but a
    /// date override replaces it for the whole resolution.
    pub req_date: DateTime<Utc>,
    /// Client address, recorded in audit payloads only.
    pub ip: Option<String>,
    /// Mode forced by an override, when the deployment permits forcing.
    pub forced_mode: Option<AccessMode>,
}

impl AccessContext {
    pub fn now() -> Self {
        AccessContext {
            req_date: Utc::now(),
            ip: None,
            forced_mode: None,
        }
    }

    pub fn at(req_date: DateTime<Utc>) -> Self {
        AccessContext {
            req_date,
            ip: None,
            forced_mode: None,
        }
    }
}
