//! Typed records for the six EduHub collections
//!
//! Identifiers are UUID v4 strings stored in `_id`. References between
//! records are plain identifiers; nothing enforces them.

use bson::DateTime;
use serde::{Deserialize, Serialize};

pub const USERS: &str = "users";
pub const COURSES: &str = "courses";
pub const ENROLLMENTS: &str = "enrollments";
pub const LESSONS: &str = "lessons";
pub const ASSIGNMENTS: &str = "assignments";
pub const SUBMISSIONS: &str = "submissions";
pub const ARCHIVED_ENROLLMENTS: &str = "archived_enrollments";

/// The collections created by schema setup, in creation order
pub const COLLECTIONS: [&str; 6] = [USERS, COURSES, ENROLLMENTS, LESSONS, ASSIGNMENTS, SUBMISSIONS];

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 3] = [
        EnrollmentStatus::Active,
        EnrollmentStatus::Completed,
        EnrollmentStatus::Dropped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub is_active: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

/// GeoJSON point; coordinates are `[longitude, latitude]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: vec![longitude, latitude],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub instructor_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub enrollment_date: DateTime,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(rename = "_id")]
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub content: String,
    /// 1-based position inside the course
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(rename = "_id")]
    pub id: String,
    pub lesson_id: String,
    pub title: String,
    pub description: String,
    pub due_date: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub submission_date: DateTime,
    pub content: String,
    /// Stored as null until graded
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

// =============================================================================
// Catalog inputs
// =============================================================================

/// Input for `add_new_student`
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub skills: Vec<String>,
}

/// Input for `create_new_course`
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub instructor_id: String,
    pub category: String,
    pub level: Level,
    pub duration: f64,
    pub price: f64,
    pub tags: Vec<String>,
}

/// Changes applied by `update_user_profile`; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub skills_to_add: Vec<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Bson};

    #[test]
    fn test_enum_serialization() {
        assert_eq!(bson::to_bson(&Role::Instructor).unwrap(), Bson::String("instructor".into()));
        assert_eq!(bson::to_bson(&EnrollmentStatus::Dropped).unwrap(), Bson::String("dropped".into()));
        assert_eq!(Level::Intermediate.as_str(), "intermediate");
    }

    #[test]
    fn test_submission_keeps_null_grade() {
        let submission = Submission {
            id: "s1".into(),
            assignment_id: "a1".into(),
            student_id: "u1".into(),
            submission_date: DateTime::now(),
            content: "answer".into(),
            grade: None,
            feedback: None,
            created_at: None,
            updated_at: None,
        };
        let doc = bson::to_document(&submission).unwrap();
        assert_eq!(doc.get("grade"), Some(&Bson::Null));
        assert!(!doc.contains_key("created_at"));
        assert_eq!(doc.get_str("_id").unwrap(), "s1");
    }

    #[test]
    fn test_user_from_document() {
        let now = DateTime::now();
        let user: User = bson::from_document(doc! {
            "_id": "u1",
            "username": "max",
            "email": "max@example.com",
            "password_hash": "x",
            "role": "student",
            "created_at": now,
            "updated_at": now,
            "first_name": "Max",
            "last_name": "Learner",
        })
        .unwrap();
        assert_eq!(user.role, Role::Student);
        assert!(!user.is_active);
        assert_eq!(user.full_name(), "Max Learner");
    }

    #[test]
    fn test_course_without_price() {
        let now = DateTime::now();
        let course: Course = bson::from_document(doc! {
            "_id": "c1",
            "title": "Rust Basics",
            "description": "Ownership and borrowing",
            "instructor_id": "i1",
            "created_at": now,
            "updated_at": now,
        })
        .unwrap();
        assert_eq!(course.price, None);
        assert_eq!(course.duration, None);
        assert!(!bson::to_document(&course).unwrap().contains_key("price"));
    }

    #[test]
    fn test_geo_point() {
        let point = GeoPoint::new(-74.0060, 40.7128);
        let doc = bson::to_document(&point).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "Point");
        assert_eq!(doc.get_array("coordinates").unwrap().len(), 2);
    }
}
