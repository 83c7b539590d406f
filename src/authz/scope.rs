use uuid::Uuid;

use super::error::AuthzError;

/// Which resource a request is scoped to. Instance scope wins when both ids
/// are present, matching how the route tree nests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKey {
    Course(Uuid),
    CourseInstance(Uuid),
}

impl ScopeKey {
    /// Builds a scope from whichever route parameters were present. A request
    /// carrying neither id cannot be authorized at all.
    pub fn from_params(
        course_id: Option<Uuid>,
        course_instance_id: Option<Uuid>,
    ) -> Result<Self, AuthzError> {
        match (course_instance_id, course_id) {
            (Some(id), _) => Ok(ScopeKey::CourseInstance(id)),
            (None, Some(id)) => Ok(ScopeKey::Course(id)),
            (None, None) => Err(AuthzError::ScopeMissing),
        }
    }

    pub fn is_instance_scoped(&self) -> bool {
        matches!(self, ScopeKey::CourseInstance(_))
    }
}
