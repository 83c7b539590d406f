use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::course::{CourseInstanceSummary, CourseSummary, DbCourse, DbCourseInstance};
use crate::models::roles::{AccessMode, CourseInstanceRole, CourseRole};
use crate::models::user::{DbUser, User};

use super::data::PermissionSet;
use super::error::AuthzError;
use super::scope::ScopeKey;

/// One permission lookup: whose access, where, under which (possibly
/// clamped) role replacements, at what point in time and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveParams {
    pub user_id: Uuid,
    pub is_administrator: bool,
    /// When present, replaces whatever course role the store has on record.
    pub requested_course_role: Option<CourseRole>,
    pub requested_course_instance_role: Option<CourseInstanceRole>,
    pub scope: ScopeKey,
    pub req_date: DateTime<Utc>,
    /// Client address, for stores that derive the evaluation mode from the
    /// network the request came from.
    pub ip: Option<String>,
    pub forced_mode: Option<AccessMode>,
}

/// A successful lookup: the permission set plus the display identity of the
/// scope it was evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAccess {
    pub mode: AccessMode,
    pub permissions: PermissionSet,
    pub course: CourseSummary,
    pub course_instance: Option<CourseInstanceSummary>,
}

/// Read-only permission lookup. `Ok(None)` means the identity has no access
/// to the scope at all; it is never an error.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn resolve(&self, params: &ResolveParams) -> Result<Option<ResolvedAccess>, AuthzError>;
}

/// Read-only identity lookup by login name.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn lookup_by_uid(&self, uid: &str) -> Result<Option<User>, AuthzError>;
}

/// Requested roles replace stored ones; the admin flag lifts the stored role
/// to the top rank but never beats an explicit request.
pub(crate) fn effective_course_role(
    stored: CourseRole,
    requested: Option<CourseRole>,
    is_administrator: bool,
) -> CourseRole {
    if let Some(role) = requested {
        return role;
    }
    if is_administrator {
        return CourseRole::Owner;
    }
    stored
}

pub(crate) fn effective_course_instance_role(
    stored: CourseInstanceRole,
    requested: Option<CourseInstanceRole>,
    is_administrator: bool,
) -> CourseInstanceRole {
    if let Some(role) = requested {
        return role;
    }
    if is_administrator {
        return CourseInstanceRole::StudentDataEditor;
    }
    stored
}

/// Decides whether the combined roles and enrollment standing grant access
/// to the scope, and what the resulting permission set is.
///
/// Course scope needs a course role; instance scope is open to course staff,
/// instance staff, or a student enrolled inside an access window. Instance
/// roles never leak into a course-scoped result.
pub(crate) fn judge_access(
    scope: ScopeKey,
    course_role: CourseRole,
    course_instance_role: CourseInstanceRole,
    is_enrolled_with_access: bool,
) -> Option<PermissionSet> {
    match scope {
        ScopeKey::Course(_) => {
            if course_role == CourseRole::None {
                return None;
            }
            Some(PermissionSet {
                course_role,
                course_instance_role: CourseInstanceRole::None,
                is_enrolled_with_access: false,
            })
        }
        ScopeKey::CourseInstance(_) => {
            if course_role == CourseRole::None
                && course_instance_role == CourseInstanceRole::None
                && !is_enrolled_with_access
            {
                return None;
            }
            Some(PermissionSet {
                course_role,
                course_instance_role,
                is_enrolled_with_access,
            })
        }
    }
}

/// [`PermissionStore`] + [`IdentityStore`] over the SQLite schema. Issues
/// plain SELECTs only, so lookups are safe to run concurrently with writes.
#[derive(Clone)]
pub struct SqlAuthzStore {
    pool: SqlitePool,
}

impl SqlAuthzStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_course(&self, course_id: Uuid) -> Result<Option<CourseSummary>, AuthzError> {
        let row = sqlx::query_as::<_, DbCourse>(
            "SELECT id, short_name, title, created_at, updated_at, deleted_at \
             FROM courses WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(course_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CourseSummary::try_from)
            .transpose()
            .map_err(AuthzError::store_decode)
    }

    async fn load_course_instance(
        &self,
        course_instance_id: Uuid,
    ) -> Result<Option<CourseInstanceSummary>, AuthzError> {
        let row = sqlx::query_as::<_, DbCourseInstance>(
            "SELECT id, course_id, short_name, long_name, created_at, updated_at, deleted_at \
             FROM course_instances WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(course_instance_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CourseInstanceSummary::try_from)
            .transpose()
            .map_err(AuthzError::store_decode)
    }

    async fn stored_course_role(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<CourseRole, AuthzError> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT course_role FROM course_permissions WHERE user_id = ? AND course_id = ?",
        )
        .bind(user_id.to_string())
        .bind(course_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|value| value.parse::<CourseRole>())
            .transpose()
            .map_err(AuthzError::store_decode)
            .map(Option::unwrap_or_default)
    }

    async fn stored_course_instance_role(
        &self,
        user_id: Uuid,
        course_instance_id: Uuid,
    ) -> Result<CourseInstanceRole, AuthzError> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT course_instance_role FROM course_instance_permissions \
             WHERE user_id = ? AND course_instance_id = ?",
        )
        .bind(user_id.to_string())
        .bind(course_instance_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|value| value.parse::<CourseInstanceRole>())
            .transpose()
            .map_err(AuthzError::store_decode)
            .map(Option::unwrap_or_default)
    }

    /// Enrolled and inside at least one access window at `req_date`. An
    /// instance with no access rules admits no students.
    async fn enrolled_with_access(
        &self,
        user_id: Uuid,
        course_instance_id: Uuid,
        req_date: DateTime<Utc>,
    ) -> Result<bool, AuthzError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(1)
            FROM enrollments e
            INNER JOIN course_instance_access_rules r
                ON r.course_instance_id = e.course_instance_id
            WHERE e.user_id = ?
              AND e.course_instance_id = ?
              AND (r.start_date IS NULL OR r.start_date <= ?)
              AND (r.end_date IS NULL OR r.end_date >= ?)
            "#,
        )
        .bind(user_id.to_string())
        .bind(course_instance_id.to_string())
        .bind(req_date)
        .bind(req_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

#[async_trait]
impl PermissionStore for SqlAuthzStore {
    async fn resolve(&self, params: &ResolveParams) -> Result<Option<ResolvedAccess>, AuthzError> {
        let (course, course_instance) = match params.scope {
            ScopeKey::Course(course_id) => match self.load_course(course_id).await? {
                Some(course) => (course, None),
                None => return Ok(None),
            },
            ScopeKey::CourseInstance(instance_id) => {
                let Some(instance) = self.load_course_instance(instance_id).await? else {
                    return Ok(None);
                };
                let Some(course) = self.load_course(instance.course_id).await? else {
                    return Ok(None);
                };
                (course, Some(instance))
            }
        };

        let stored_course_role = self.stored_course_role(params.user_id, course.id).await?;
        let course_role = effective_course_role(
            stored_course_role,
            params.requested_course_role,
            params.is_administrator,
        );

        let (course_instance_role, is_enrolled_with_access) = match &course_instance {
            Some(instance) => {
                let stored = self
                    .stored_course_instance_role(params.user_id, instance.id)
                    .await?;
                let role = effective_course_instance_role(
                    stored,
                    params.requested_course_instance_role,
                    params.is_administrator,
                );
                let enrolled = self
                    .enrolled_with_access(params.user_id, instance.id, params.req_date)
                    .await?;
                (role, enrolled)
            }
            None => (CourseInstanceRole::None, false),
        };

        // This store has no exam-network table, so the mode follows the
        // forced value only; `params.ip` is carried for stores that map
        // client networks to modes.
        let mode = params.forced_mode.unwrap_or(AccessMode::Public);

        Ok(judge_access(
            params.scope,
            course_role,
            course_instance_role,
            is_enrolled_with_access,
        )
        .map(|permissions| ResolvedAccess {
            mode,
            permissions,
            course,
            course_instance,
        }))
    }
}

#[async_trait]
impl IdentityStore for SqlAuthzStore {
    async fn lookup_by_uid(&self, uid: &str) -> Result<Option<User>, AuthzError> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, uid, name, uin, password_hash, is_administrator, \
             created_at, updated_at, deleted_at \
             FROM users WHERE uid = ? AND deleted_at IS NULL",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from)
            .transpose()
            .map_err(AuthzError::store_decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_role_beats_admin_and_stored() {
        let role = effective_course_role(CourseRole::Owner, Some(CourseRole::Viewer), true);
        assert_eq!(role, CourseRole::Viewer);

        let role = effective_course_instance_role(
            CourseInstanceRole::StudentDataEditor,
            Some(CourseInstanceRole::None),
            true,
        );
        assert_eq!(role, CourseInstanceRole::None);
    }

    #[test]
    fn admin_flag_lifts_unrequested_roles_to_top_rank() {
        assert_eq!(
            effective_course_role(CourseRole::Previewer, None, true),
            CourseRole::Owner
        );
        assert_eq!(
            effective_course_instance_role(CourseInstanceRole::None, None, true),
            CourseInstanceRole::StudentDataEditor
        );
    }

    #[test]
    fn stored_roles_are_the_fallback() {
        assert_eq!(
            effective_course_role(CourseRole::Editor, None, false),
            CourseRole::Editor
        );
        assert_eq!(
            effective_course_instance_role(CourseInstanceRole::StudentDataViewer, None, false),
            CourseInstanceRole::StudentDataViewer
        );
    }

    #[test]
    fn course_scope_requires_a_course_role() {
        let scope = ScopeKey::Course(Uuid::new_v4());
        assert!(judge_access(scope, CourseRole::None, CourseInstanceRole::None, false).is_none());

        let set =
            judge_access(scope, CourseRole::Previewer, CourseInstanceRole::None, false).unwrap();
        assert_eq!(set.course_role, CourseRole::Previewer);
        assert!(!set.is_enrolled_with_access);
    }

    #[test]
    fn instance_roles_never_leak_into_course_scope() {
        let scope = ScopeKey::Course(Uuid::new_v4());
        let set = judge_access(
            scope,
            CourseRole::Viewer,
            CourseInstanceRole::StudentDataEditor,
            true,
        )
        .unwrap();
        assert_eq!(set.course_instance_role, CourseInstanceRole::None);
        assert!(!set.is_enrolled_with_access);
    }

    #[test]
    fn instance_scope_admits_staff_or_enrolled_students() {
        let scope = ScopeKey::CourseInstance(Uuid::new_v4());

        // course staff without an instance role
        assert!(
            judge_access(scope, CourseRole::Viewer, CourseInstanceRole::None, false).is_some()
        );
        // instance staff without a course role
        assert!(judge_access(
            scope,
            CourseRole::None,
            CourseInstanceRole::StudentDataViewer,
            false
        )
        .is_some());
        // enrolled student inside an access window
        let set =
            judge_access(scope, CourseRole::None, CourseInstanceRole::None, true).unwrap();
        assert!(set.is_enrolled_with_access);
        assert_eq!(set.course_role, CourseRole::None);

        // nothing at all
        assert!(
            judge_access(scope, CourseRole::None, CourseInstanceRole::None, false).is_none()
        );
    }
}
