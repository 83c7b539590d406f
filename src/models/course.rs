use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Display identity of a course, as carried in authorization results and
/// denial diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CourseSummary {
    pub id: Uuid,
    #[schema(example = "TAM 212")]
    pub short_name: String,
    #[schema(example = "Introductory Dynamics")]
    pub title: String,
}

/// Display identity of one offering of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CourseInstanceSummary {
    pub id: Uuid,
    pub course_id: Uuid,
    #[schema(example = "Sp26")]
    pub short_name: String,
    #[schema(example = "Spring 2026")]
    pub long_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCourse {
    pub id: String,
    pub short_name: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbCourse> for CourseSummary {
    type Error = AppError;

    fn try_from(value: DbCourse) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| AppError::internal("malformed course id in database"))?;

        Ok(CourseSummary {
            id,
            short_name: value.short_name,
            title: value.title,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCourseInstance {
    pub id: String,
    pub course_id: String,
    pub short_name: String,
    pub long_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbCourseInstance> for CourseInstanceSummary {
    type Error = AppError;

    fn try_from(value: DbCourseInstance) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| AppError::internal("malformed course instance id in database"))?;
        let course_id = Uuid::parse_str(&value.course_id)
            .map_err(|_| AppError::internal("malformed course id in database"))?;

        Ok(CourseInstanceSummary {
            id,
            course_id,
            short_name: value.short_name,
            long_name: value.long_name,
        })
    }
}
