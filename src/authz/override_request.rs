use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::roles::{AccessMode, CourseInstanceRole, CourseRole};

use super::data::AppliedOverride;
use super::error::AuthzError;

pub const COOKIE_REQUESTED_UID: &str = "lt_requested_uid";
pub const COOKIE_REQUESTED_COURSE_ROLE: &str = "lt_requested_course_role";
pub const COOKIE_REQUESTED_COURSE_INSTANCE_ROLE: &str = "lt_requested_course_instance_role";
pub const COOKIE_REQUESTED_MODE: &str = "lt_requested_mode";
pub const COOKIE_REQUESTED_DATE: &str = "lt_requested_date";

/// Every override cookie, in the order diagnostics list them.
pub const OVERRIDE_COOKIES: [&str; 5] = [
    COOKIE_REQUESTED_UID,
    COOKIE_REQUESTED_COURSE_ROLE,
    COOKIE_REQUESTED_COURSE_INSTANCE_ROLE,
    COOKIE_REQUESTED_MODE,
    COOKIE_REQUESTED_DATE,
];

/// Raw hint values as they arrived on the request, before any parsing.
/// The transport (cookies) is the HTTP layer's concern; the engine only
/// sees this map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideHints {
    pub uid: Option<String>,
    pub course_role: Option<String>,
    pub course_instance_role: Option<String>,
    pub mode: Option<String>,
    pub date: Option<String>,
}

impl OverrideHints {
    pub fn is_empty(&self) -> bool {
        self.uid.is_none()
            && self.course_role.is_none()
            && self.course_instance_role.is_none()
            && self.mode.is_none()
            && self.date.is_none()
    }
}

/// Typed override intent. Malformed hint values never make it past
/// [`OverrideRequest::from_hints`], so the validator only ever sees
/// well-formed roles, modes and dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideRequest {
    pub uid: Option<String>,
    pub course_role: Option<CourseRole>,
    pub course_instance_role: Option<CourseInstanceRole>,
    pub mode: Option<AccessMode>,
    pub date: Option<DateTime<Utc>>,
}

impl OverrideRequest {
    pub fn from_hints(hints: &OverrideHints) -> Result<Self, AuthzError> {
        let uid = hints.uid.as_deref().filter(|v| !v.is_empty());
        let course_role = parse_hint::<CourseRole>(hints.course_role.as_deref(), "Course role")?;
        let course_instance_role = parse_hint::<CourseInstanceRole>(
            hints.course_instance_role.as_deref(),
            "Course instance role",
        )?;
        let mode = parse_hint::<AccessMode>(hints.mode.as_deref(), "Mode")?;

        let date = match hints.date.as_deref().filter(|v| !v.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|_| AuthzError::InvalidOverride {
                        name: "Date",
                        value: raw.to_string(),
                    })?,
            ),
            None => None,
        };

        Ok(OverrideRequest {
            uid: uid.map(str::to_string),
            course_role,
            course_instance_role,
            mode,
            date,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.uid.is_none()
            && self.course_role.is_none()
            && self.course_instance_role.is_none()
            && self.mode.is_none()
            && self.date.is_none()
    }

    /// The hints that were present, in canonical order, rendered for
    /// diagnostics and audit payloads.
    pub fn applied(&self) -> Vec<AppliedOverride> {
        let mut list = Vec::new();
        if let Some(uid) = &self.uid {
            list.push(AppliedOverride {
                name: "UID",
                value: uid.clone(),
                cookie: COOKIE_REQUESTED_UID,
            });
        }
        if let Some(role) = self.course_role {
            list.push(AppliedOverride {
                name: "Course role",
                value: role.as_str().to_string(),
                cookie: COOKIE_REQUESTED_COURSE_ROLE,
            });
        }
        if let Some(role) = self.course_instance_role {
            list.push(AppliedOverride {
                name: "Course instance role",
                value: role.as_str().to_string(),
                cookie: COOKIE_REQUESTED_COURSE_INSTANCE_ROLE,
            });
        }
        if let Some(mode) = self.mode {
            list.push(AppliedOverride {
                name: "Mode",
                value: mode.as_str().to_string(),
                cookie: COOKIE_REQUESTED_MODE,
            });
        }
        if let Some(date) = self.date {
            list.push(AppliedOverride {
                name: "Date",
                value: date.to_rfc3339_opts(SecondsFormat::Secs, true),
                cookie: COOKIE_REQUESTED_DATE,
            });
        }
        list
    }
}

fn parse_hint<T>(raw: Option<&str>, name: &'static str) -> Result<Option<T>, AuthzError>
where
    T: FromStr,
{
    match raw.filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| AuthzError::InvalidOverride {
                name,
                value: value.to_string(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn all_hints_parse_into_typed_fields() {
        let hints = OverrideHints {
            uid: Some("ta@example.edu".to_string()),
            course_role: Some("Viewer".to_string()),
            course_instance_role: Some("StudentDataViewer".to_string()),
            mode: Some("Exam".to_string()),
            date: Some("2026-03-02T10:00:00Z".to_string()),
        };
        let request = OverrideRequest::from_hints(&hints).unwrap();
        assert_eq!(request.uid.as_deref(), Some("ta@example.edu"));
        assert_eq!(request.course_role, Some(CourseRole::Viewer));
        assert_eq!(
            request.course_instance_role,
            Some(CourseInstanceRole::StudentDataViewer)
        );
        assert_eq!(request.mode, Some(AccessMode::Exam));
        assert_eq!(
            request.date,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap())
        );
        assert!(!request.is_empty());
    }

    #[test]
    fn absent_and_empty_hints_mean_no_override() {
        assert!(OverrideRequest::from_hints(&OverrideHints::default())
            .unwrap()
            .is_empty());

        let blank = OverrideHints {
            uid: Some(String::new()),
            course_role: Some(String::new()),
            ..OverrideHints::default()
        };
        assert!(OverrideRequest::from_hints(&blank).unwrap().is_empty());
    }

    #[test]
    fn malformed_role_is_rejected_with_its_hint_name() {
        let hints = OverrideHints {
            course_role: Some("Superuser".to_string()),
            ..OverrideHints::default()
        };
        let err = OverrideRequest::from_hints(&hints).unwrap_err();
        match err {
            AuthzError::InvalidOverride { name, value } => {
                assert_eq!(name, "Course role");
                assert_eq!(value, "Superuser");
            }
            other => panic!("expected InvalidOverride, got {other:?}"),
        }
    }

    #[test]
    fn malformed_date_is_rejected() {
        let hints = OverrideHints {
            date: Some("next tuesday".to_string()),
            ..OverrideHints::default()
        };
        let err = OverrideRequest::from_hints(&hints).unwrap_err();
        assert!(matches!(
            err,
            AuthzError::InvalidOverride { name: "Date", .. }
        ));
    }

    #[test]
    fn applied_list_keeps_canonical_order_and_rendering() {
        let hints = OverrideHints {
            uid: Some("ta@example.edu".to_string()),
            course_role: Some("Editor".to_string()),
            course_instance_role: None,
            mode: None,
            date: Some("2026-03-02T10:00:00+05:00".to_string()),
        };
        let applied = OverrideRequest::from_hints(&hints).unwrap().applied();
        let names: Vec<&str> = applied.iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["UID", "Course role", "Date"]);
        // offset dates are normalized to UTC for display
        assert_eq!(applied[2].value, "2026-03-02T05:00:00Z");
        assert_eq!(applied[0].cookie, COOKIE_REQUESTED_UID);
    }
}
