use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error returned when a role or mode token does not match any known value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {token:?}")]
pub struct TokenParseError {
    kind: &'static str,
    token: String,
}

impl TokenParseError {
    fn new(kind: &'static str, token: &str) -> Self {
        Self {
            kind,
            token: token.to_string(),
        }
    }
}

/// Privilege level a user holds on a course. Variants are declared in
/// ascending privilege order so the derived `Ord` is the role ordering.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum CourseRole {
    #[default]
    None,
    Previewer,
    Viewer,
    Editor,
    Owner,
}

impl CourseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseRole::None => "None",
            CourseRole::Previewer => "Previewer",
            CourseRole::Viewer => "Viewer",
            CourseRole::Editor => "Editor",
            CourseRole::Owner => "Owner",
        }
    }
}

impl fmt::Display for CourseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseRole {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(CourseRole::None),
            "Previewer" => Ok(CourseRole::Previewer),
            "Viewer" => Ok(CourseRole::Viewer),
            "Editor" => Ok(CourseRole::Editor),
            "Owner" => Ok(CourseRole::Owner),
            other => Err(TokenParseError::new("course role", other)),
        }
    }
}

/// Privilege level over student data within one offering of a course.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum CourseInstanceRole {
    #[default]
    None,
    StudentDataViewer,
    StudentDataEditor,
}

impl CourseInstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseInstanceRole::None => "None",
            CourseInstanceRole::StudentDataViewer => "StudentDataViewer",
            CourseInstanceRole::StudentDataEditor => "StudentDataEditor",
        }
    }
}

impl fmt::Display for CourseInstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseInstanceRole {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(CourseInstanceRole::None),
            "StudentDataViewer" => Ok(CourseInstanceRole::StudentDataViewer),
            "StudentDataEditor" => Ok(CourseInstanceRole::StudentDataEditor),
            other => Err(TokenParseError::new("course instance role", other)),
        }
    }
}

/// Mode under which access rules are evaluated for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AccessMode {
    #[default]
    Public,
    Exam,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Public => "Public",
            AccessMode::Exam => "Exam",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Public" => Ok(AccessMode::Public),
            "Exam" => Ok(AccessMode::Exam),
            other => Err(TokenParseError::new("access mode", other)),
        }
    }
}

/// Deployment-level ceiling on effective privileges. Clamps the effective
/// identity only, never the authenticated identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MaxAccessLevel {
    #[default]
    Unrestricted,
    Instructor,
    Student,
}

impl MaxAccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaxAccessLevel::Unrestricted => "Unrestricted",
            MaxAccessLevel::Instructor => "Instructor",
            MaxAccessLevel::Student => "Student",
        }
    }

    pub fn is_restrictive(&self) -> bool {
        *self != MaxAccessLevel::Unrestricted
    }
}

impl fmt::Display for MaxAccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaxAccessLevel {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unrestricted" => Ok(MaxAccessLevel::Unrestricted),
            "instructor" => Ok(MaxAccessLevel::Instructor),
            "student" => Ok(MaxAccessLevel::Student),
            other => Err(TokenParseError::new("max access level", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_roles_are_ordered_by_privilege() {
        assert!(CourseRole::None < CourseRole::Previewer);
        assert!(CourseRole::Previewer < CourseRole::Viewer);
        assert!(CourseRole::Viewer < CourseRole::Editor);
        assert!(CourseRole::Editor < CourseRole::Owner);
    }

    #[test]
    fn course_instance_roles_are_ordered_by_privilege() {
        assert!(CourseInstanceRole::None < CourseInstanceRole::StudentDataViewer);
        assert!(CourseInstanceRole::StudentDataViewer < CourseInstanceRole::StudentDataEditor);
    }

    #[test]
    fn role_tokens_round_trip() {
        for role in [
            CourseRole::None,
            CourseRole::Previewer,
            CourseRole::Viewer,
            CourseRole::Editor,
            CourseRole::Owner,
        ] {
            assert_eq!(role.as_str().parse::<CourseRole>(), Ok(role));
        }
        for role in [
            CourseInstanceRole::None,
            CourseInstanceRole::StudentDataViewer,
            CourseInstanceRole::StudentDataEditor,
        ] {
            assert_eq!(role.as_str().parse::<CourseInstanceRole>(), Ok(role));
        }
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!("Superuser".parse::<CourseRole>().is_err());
        assert!("owner".parse::<CourseRole>().is_err());
        assert!("Student Data Viewer".parse::<CourseInstanceRole>().is_err());
        assert!("exam".parse::<AccessMode>().is_err());
    }

    #[test]
    fn max_access_level_parse_is_case_insensitive() {
        assert_eq!(
            "STUDENT".parse::<MaxAccessLevel>(),
            Ok(MaxAccessLevel::Student)
        );
        assert_eq!(
            "instructor".parse::<MaxAccessLevel>(),
            Ok(MaxAccessLevel::Instructor)
        );
        assert!("admin".parse::<MaxAccessLevel>().is_err());
    }
}
