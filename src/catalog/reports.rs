//! Typed rows produced by joined reads and aggregation reports
//!
//! Field names follow the projected document keys, so each row can be
//! deserialized directly from pipeline output and serialized back for
//! display.

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::models::{EnrollmentStatus, GeoPoint, Level};

/// A course joined with its instructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseWithInstructor {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub instructor_name: Option<String>,
    #[serde(default)]
    pub instructor_email: Option<String>,
}

/// A student enrolled in a course, with the enrollment details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStudent {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub enrollment_date: DateTime,
    pub enrollment_status: EnrollmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseEnrollmentCount {
    pub course_id: String,
    pub course_title: String,
    pub total_enrollments: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseGrade {
    pub course_id: String,
    pub course_title: String,
    pub average_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    /// `None` groups courses without a category
    #[serde(default)]
    pub category: Option<String>,
    #[serde(alias = "total_courses")]
    pub course_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentGrade {
    pub student_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    pub average_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRate {
    pub course_id: String,
    pub course_title: String,
    pub total_enrollments: i64,
    pub completed_enrollments: i64,
    /// Percentage, rounded to two decimals
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorStudents {
    pub instructor_id: String,
    #[serde(default)]
    pub instructor_name: Option<String>,
    pub total_students_taught: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorGrade {
    pub instructor_id: String,
    #[serde(default)]
    pub instructor_name: Option<String>,
    pub average_course_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorRevenue {
    pub instructor_id: String,
    #[serde(default)]
    pub instructor_name: Option<String>,
    /// Sum of course prices, rounded to two decimals
    pub total_revenue_from_courses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEnrollments {
    pub year: i32,
    pub month: i32,
    pub enrollment_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEngagement {
    pub student_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    pub total_submissions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended_course_id: String,
    pub recommended_course_title: String,
    #[serde(default)]
    pub recommended_course_category: Option<String>,
    /// Number of co-enrollments shared with the target course
    pub recommendation_strength: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyCourse {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub price: Option<f64>,
    pub distance_km: f64,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_category_count_accepts_both_keys() {
        let a: CategoryCount = bson::from_document(doc! { "category": "Design", "total_courses": 2 }).unwrap();
        let b: CategoryCount = bson::from_document(doc! { "category": null, "course_count": 3 }).unwrap();
        assert_eq!(a.course_count, 2);
        assert_eq!(b.category, None);
    }

    #[test]
    fn test_integer_completion_rate() {
        let row: CompletionRate = bson::from_document(doc! {
            "course_id": "c1",
            "course_title": "Rust",
            "total_enrollments": 2,
            "completed_enrollments": 0,
            "completion_rate": 0,
        })
        .unwrap();
        assert_eq!(row.completion_rate, 0.0);
    }
}
