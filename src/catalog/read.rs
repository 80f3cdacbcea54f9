//! Filtered and joined reads

use bson::{doc, Document};
use tracing::debug;

use super::reports::{CourseStudent, CourseWithInstructor};
use super::{days_from_now, exact_title, full_name, now, partial_title};
use crate::error::{Error, Result};
use crate::models::{Assignment, Course, User, ASSIGNMENTS, COURSES, ENROLLMENTS, USERS};
use crate::validation::validate_search_term;
use crate::EduHub;

/// Enrollments of one course joined with the enrolled users
pub(crate) fn students_in_course_pipeline(course_id: &str) -> Vec<Document> {
    vec![
        doc! { "$match": { "course_id": course_id } },
        doc! { "$lookup": { "from": USERS, "localField": "student_id", "foreignField": "_id", "as": "student_info" } },
        doc! { "$unwind": "$student_info" },
        doc! { "$project": {
            "_id": "$student_info._id",
            "username": "$student_info.username",
            "email": "$student_info.email",
            "first_name": "$student_info.first_name",
            "last_name": "$student_info.last_name",
            "enrollment_date": "$enrollment_date",
            "enrollment_status": "$status",
        } },
    ]
}

pub(crate) fn price_range_filter(min: f64, max: f64) -> Result<Document> {
    if min > max {
        return Err(Error::invalid_input(format!(
            "minimum price {} is greater than maximum price {}",
            min, max
        )));
    }
    Ok(doc! { "price": { "$gte": min, "$lte": max } })
}

pub(crate) fn joined_since_filter(months: u32) -> Result<Document> {
    let since = days_from_now(-(i64::from(months) * 30))?;
    Ok(doc! { "created_at": { "$gte": since } })
}

impl EduHub {
    pub async fn find_active_students(&self) -> Result<Vec<User>> {
        self.find_typed(USERS, doc! { "role": "student", "is_active": true }).await
    }

    pub async fn get_courses_by_category(&self, category: &str) -> Result<Vec<Course>> {
        self.find_typed(COURSES, doc! { "category": category }).await
    }

    /// Courses whose title contains `term`, ignoring case
    ///
    /// The term is matched literally; regex metacharacters are escaped.
    pub async fn search_courses_by_title_partial(&self, term: &str) -> Result<Vec<Course>> {
        validate_search_term(term)?;
        self.find_typed(COURSES, partial_title(term)).await
    }

    /// Courses with `min <= price <= max`
    pub async fn find_courses_by_price_range(&self, min: f64, max: f64) -> Result<Vec<Course>> {
        self.find_typed(COURSES, price_range_filter(min, max)?).await
    }

    /// Users created within the last `months` thirty-day periods
    pub async fn get_users_joined_last_n_months(&self, months: u32) -> Result<Vec<User>> {
        self.find_typed(USERS, joined_since_filter(months)?).await
    }

    /// Courses carrying at least one of `tags`
    pub async fn find_courses_with_specific_tags(&self, tags: &[&str]) -> Result<Vec<Course>> {
        self.find_typed(COURSES, doc! { "tags": { "$in": tags } }).await
    }

    pub async fn get_assignments_due_next_week(&self) -> Result<Vec<Assignment>> {
        let week_out = days_from_now(7)?;
        let filter = doc! { "due_date": { "$gte": now(), "$lte": week_out } };
        self.find_typed(ASSIGNMENTS, filter).await
    }

    /// Courses with their instructor's name and email
    ///
    /// `title` narrows the courses to those whose title contains it.
    pub async fn get_course_details_with_instructor(
        &self,
        title: Option<&str>,
    ) -> Result<Vec<CourseWithInstructor>> {
        let matching = match title {
            Some(term) => partial_title(term),
            None => Document::new(),
        };
        let pipeline = vec![
            doc! { "$match": matching },
            doc! { "$lookup": { "from": USERS, "localField": "instructor_id", "foreignField": "_id", "as": "instructor_info" } },
            doc! { "$unwind": "$instructor_info" },
            doc! { "$project": {
                "_id": 1,
                "title": 1,
                "description": 1,
                "category": 1,
                "level": 1,
                "price": 1,
                "instructor_name": full_name("instructor_info"),
                "instructor_email": "$instructor_info.email",
            } },
        ];
        self.aggregate_rows(COURSES, pipeline).await
    }

    /// Find the course whose title equals `title`, ignoring case
    pub async fn find_course_by_title(&self, title: &str) -> Result<Document> {
        self.store
            .find_one(COURSES, exact_title(title))
            .await?
            .ok_or_else(|| Error::not_found(COURSES, title))
    }

    /// Students enrolled in the course titled `title`
    pub async fn find_students_in_course(&self, title: &str) -> Result<Vec<CourseStudent>> {
        let course = self.find_course_by_title(title).await?;
        let course_id = course.get_str("_id").map_err(|_| Error::not_found(COURSES, title))?;
        debug!(course_id, title, "listing enrolled students");
        self.aggregate_rows(ENROLLMENTS, students_in_course_pipeline(course_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_range_rejects_inverted_bounds() {
        assert!(matches!(price_range_filter(200.0, 50.0), Err(Error::InvalidInput { .. })));
        let filter = price_range_filter(50.0, 50.0).unwrap();
        assert_eq!(filter, doc! { "price": { "$gte": 50.0, "$lte": 50.0 } });
    }

    #[test]
    fn test_joined_since_filter_bounds() {
        assert!(joined_since_filter(3).is_ok());
        assert!(matches!(joined_since_filter(4_000_000), Err(Error::InvalidInput { .. })));
        assert!(matches!(joined_since_filter(u32::MAX), Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_students_pipeline_shape() {
        let pipeline = students_in_course_pipeline("c1");
        assert_eq!(pipeline.len(), 4);
        assert!(docql::pipeline(&pipeline).is_ok());
        let project = pipeline[3].get_document("$project").unwrap();
        assert_eq!(project.get_str("enrollment_status").unwrap(), "$status");
    }
}
