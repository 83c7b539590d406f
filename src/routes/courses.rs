use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::authz::{Authz, AuthzView};
use crate::errors::{AppError, AppResult};
use crate::models::course::{CourseInstanceSummary, CourseSummary};

/// A course page plus the authorization context it was rendered under. The
/// `authz` block is what an instructor UI uses to decide which controls to
/// show, and what the effective-user banner displays.
#[derive(Debug, Serialize, ToSchema)]
pub struct CourseAccessResponse {
    pub course: CourseSummary,
    pub authz: AuthzView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseInstanceAccessResponse {
    pub course: CourseSummary,
    pub course_instance: CourseInstanceSummary,
    pub authz: AuthzView,
}

#[utoipa::path(
    get,
    path = "/courses/{course_id}",
    tag = "Courses",
    params(("course_id" = String, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course overview", body = CourseAccessResponse),
        (status = 403, description = "Access denied")
    )
)]
pub async fn course_overview(Authz(data): Authz) -> AppResult<Json<CourseAccessResponse>> {
    if !data.permissions.has_course_permission_preview() {
        return Err(AppError::forbidden("Access denied"));
    }

    Ok(Json(CourseAccessResponse {
        course: data.course.clone(),
        authz: data.view(),
    }))
}

#[utoipa::path(
    get,
    path = "/courses/{course_id}/settings",
    tag = "Courses",
    params(("course_id" = String, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course settings", body = CourseAccessResponse),
        (status = 403, description = "Access denied")
    )
)]
pub async fn course_settings(Authz(data): Authz) -> AppResult<Json<CourseAccessResponse>> {
    if !data.permissions.has_course_permission_edit() {
        return Err(AppError::forbidden("Access denied"));
    }

    Ok(Json(CourseAccessResponse {
        course: data.course.clone(),
        authz: data.view(),
    }))
}

#[utoipa::path(
    get,
    path = "/course_instances/{course_instance_id}",
    tag = "Courses",
    params(("course_instance_id" = String, Path, description = "Course instance id")),
    responses(
        (status = 200, description = "Course instance overview", body = CourseInstanceAccessResponse),
        (status = 403, description = "Access denied")
    )
)]
pub async fn course_instance_overview(
    Authz(data): Authz,
) -> AppResult<Json<CourseInstanceAccessResponse>> {
    // Reaching this handler at all means the resolver judged the effective
    // user to have access, staff or enrolled student alike.
    let course_instance = instance_summary(&data)?;

    Ok(Json(CourseInstanceAccessResponse {
        course: data.course.clone(),
        course_instance,
        authz: data.view(),
    }))
}

#[utoipa::path(
    get,
    path = "/course_instances/{course_instance_id}/gradebook",
    tag = "Courses",
    params(("course_instance_id" = String, Path, description = "Course instance id")),
    responses(
        (status = 200, description = "Gradebook", body = CourseInstanceAccessResponse),
        (status = 403, description = "Access denied")
    )
)]
pub async fn course_instance_gradebook(
    Authz(data): Authz,
) -> AppResult<Json<CourseInstanceAccessResponse>> {
    if !data.permissions.has_course_instance_permission_view() {
        return Err(AppError::forbidden("Access denied"));
    }

    let course_instance = instance_summary(&data)?;

    Ok(Json(CourseInstanceAccessResponse {
        course: data.course.clone(),
        course_instance,
        authz: data.view(),
    }))
}

fn instance_summary(data: &crate::authz::AuthzData) -> AppResult<CourseInstanceSummary> {
    data.course_instance
        .clone()
        .ok_or_else(|| AppError::internal("course instance missing from authorization context"))
}
