//! The six EduHub collection schemas

use super::{FieldDef, FieldType, Schema};
use crate::models::{ASSIGNMENTS, COURSES, ENROLLMENTS, LESSONS, SUBMISSIONS, USERS};

pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

fn id() -> FieldDef {
    FieldDef::new("_id", FieldType::String)
        .required()
        .describe("must be a string and is required (e.g., UUID)")
}

fn reference(name: &str, target: &str) -> FieldDef {
    FieldDef::new(name, FieldType::String)
        .required()
        .describe(format!("must be a string referencing {}._id and is required", target))
}

fn text(name: &str, min_length: u32) -> FieldDef {
    FieldDef::new(name, FieldType::String)
        .required()
        .min_length(min_length)
        .describe("must be a string and is required")
}

fn date(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Date)
}

fn required_date(name: &str) -> FieldDef {
    date(name).required().describe("must be a date and is required")
}

fn string_array(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::Array(Box::new(FieldType::String)))
}

pub(super) fn all() -> Vec<Schema> {
    vec![users(), courses(), enrollments(), lessons(), assignments(), submissions()]
}

fn users() -> Schema {
    let profile = FieldType::Object(vec![
        FieldDef::new("bio", FieldType::String),
        FieldDef::new("avatar", FieldType::String),
        string_array("skills"),
    ]);

    Schema::new(USERS)
        .field(id())
        .field(text("username", 3))
        .field(
            FieldDef::new("email", FieldType::String)
                .required()
                .pattern(EMAIL_PATTERN)
                .describe("must be a string and a valid email format, and is required"),
        )
        .field(FieldDef::new("password_hash", FieldType::String).required())
        .field(
            FieldDef::new("role", FieldType::String)
                .required()
                .one_of(&["student", "instructor"])
                .describe("must be \"student\" or \"instructor\" and is required"),
        )
        .field(required_date("created_at"))
        .field(required_date("updated_at"))
        .field(FieldDef::new("first_name", FieldType::String))
        .field(FieldDef::new("last_name", FieldType::String))
        .field(FieldDef::new("profile", profile))
        .field(FieldDef::new("is_active", FieldType::Bool))
}

fn courses() -> Schema {
    Schema::new(COURSES)
        .field(id())
        .field(text("title", 5))
        .field(text("description", 10))
        .field(reference("instructor_id", USERS))
        .field(FieldDef::new("category", FieldType::String))
        .field(
            FieldDef::new("level", FieldType::String)
                .one_of(&["beginner", "intermediate", "advanced"]),
        )
        .field(FieldDef::new("duration", FieldType::Double))
        .field(FieldDef::new("price", FieldType::Double))
        .field(string_array("tags"))
        .field(required_date("created_at"))
        .field(required_date("updated_at"))
        .field(FieldDef::new("is_published", FieldType::Bool))
}

fn enrollments() -> Schema {
    Schema::new(ENROLLMENTS)
        .field(id())
        .field(reference("student_id", USERS))
        .field(reference("course_id", COURSES))
        .field(required_date("enrollment_date"))
        .field(
            FieldDef::new("status", FieldType::String)
                .required()
                .one_of(&["active", "completed", "dropped"])
                .describe("must be \"active\", \"completed\", or \"dropped\" and is required"),
        )
}

fn lessons() -> Schema {
    Schema::new(LESSONS)
        .field(id())
        .field(reference("course_id", COURSES))
        .field(text("title", 5))
        .field(text("content", 20))
        .field(
            FieldDef::new("order", FieldType::Int)
                .required()
                .range(Some(1.0), None)
                .describe("must be an integer representing lesson order and is required"),
        )
        .field(date("created_at"))
        .field(date("updated_at"))
}

fn assignments() -> Schema {
    Schema::new(ASSIGNMENTS)
        .field(id())
        .field(reference("lesson_id", LESSONS))
        .field(text("title", 5))
        .field(text("description", 10))
        .field(required_date("due_date"))
        .field(FieldDef::new("max_score", FieldType::Double))
        .field(date("created_at"))
        .field(date("updated_at"))
}

fn submissions() -> Schema {
    Schema::new(SUBMISSIONS)
        .field(id())
        .field(reference("assignment_id", ASSIGNMENTS))
        .field(reference("student_id", USERS))
        .field(required_date("submission_date"))
        .field(text("content", 1))
        .field(
            FieldDef::new("grade", FieldType::Nullable(Box::new(FieldType::Double)))
                .range(Some(0.0), Some(100.0))
                .describe("must be a number between 0 and 100 if present"),
        )
        .field(FieldDef::new("feedback", FieldType::Nullable(Box::new(FieldType::String))))
        .field(date("created_at"))
        .field(date("updated_at"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields() {
        let users = users();
        let required: Vec<&str> = users.required_fields().collect();
        assert_eq!(
            required,
            vec!["_id", "username", "email", "password_hash", "role", "created_at", "updated_at"]
        );

        let lessons = lessons();
        assert_eq!(lessons.get("order").unwrap().minimum, Some(1.0));
        assert_eq!(lessons.get("content").unwrap().min_length, Some(20));
    }

    #[test]
    fn test_email_pattern() {
        let re = regex::Regex::new(EMAIL_PATTERN).unwrap();
        assert!(re.is_match("student1@eduhub.com"));
        assert!(!re.is_match("not-an-email"));
    }
}
