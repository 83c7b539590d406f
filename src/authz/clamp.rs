use crate::models::roles::{CourseInstanceRole, CourseRole, MaxAccessLevel};

use super::override_request::OverrideRequest;

/// What the candidate store query is allowed to evaluate: the admin flag it
/// may use and the role replacements it must apply. A `Some` role replaces
/// whatever the store has on record for the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedRequest {
    pub is_administrator: bool,
    pub course_role: Option<CourseRole>,
    pub course_instance_role: Option<CourseInstanceRole>,
}

/// Narrows the candidate's requested privilege to the deployment ceiling.
/// Never widens: `Unrestricted` passes everything through, `Instructor`
/// strips the admin flag, `Student` downgrades to a fully unprivileged
/// identity whatever was asked for.
pub fn apply(
    level: MaxAccessLevel,
    candidate_is_administrator: bool,
    request: &OverrideRequest,
) -> ClampedRequest {
    match level {
        MaxAccessLevel::Unrestricted => ClampedRequest {
            is_administrator: candidate_is_administrator,
            course_role: request.course_role,
            course_instance_role: request.course_instance_role,
        },
        MaxAccessLevel::Instructor => ClampedRequest {
            is_administrator: false,
            course_role: request.course_role,
            course_instance_role: request.course_instance_role,
        },
        MaxAccessLevel::Student => ClampedRequest {
            is_administrator: false,
            course_role: Some(CourseRole::None),
            course_instance_role: Some(CourseInstanceRole::None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_everything() -> OverrideRequest {
        OverrideRequest {
            uid: Some("owner@example.edu".to_string()),
            course_role: Some(CourseRole::Owner),
            course_instance_role: Some(CourseInstanceRole::StudentDataEditor),
            mode: None,
            date: None,
        }
    }

    #[test]
    fn student_clamp_downgrades_everything() {
        let clamped = apply(MaxAccessLevel::Student, true, &request_everything());
        assert!(!clamped.is_administrator);
        assert_eq!(clamped.course_role, Some(CourseRole::None));
        assert_eq!(clamped.course_instance_role, Some(CourseInstanceRole::None));
    }

    #[test]
    fn instructor_clamp_only_strips_the_admin_flag() {
        let clamped = apply(MaxAccessLevel::Instructor, true, &request_everything());
        assert!(!clamped.is_administrator);
        assert_eq!(clamped.course_role, Some(CourseRole::Owner));
        assert_eq!(
            clamped.course_instance_role,
            Some(CourseInstanceRole::StudentDataEditor)
        );
    }

    #[test]
    fn unrestricted_clamp_changes_nothing() {
        let clamped = apply(MaxAccessLevel::Unrestricted, true, &request_everything());
        assert!(clamped.is_administrator);
        assert_eq!(clamped.course_role, Some(CourseRole::Owner));

        let empty = apply(MaxAccessLevel::Unrestricted, false, &OverrideRequest::default());
        assert!(!empty.is_administrator);
        assert_eq!(empty.course_role, None);
        assert_eq!(empty.course_instance_role, None);
    }
}
