//! Aggregation reports
//!
//! Each report is a fixed pipeline over one collection. Averages and rates
//! are rounded to two decimals on the server side with `$round`.

use bson::{doc, Document};

use super::{full_name, positive_limit};
use super::reports::{
    CategoryCount, CompletionRate, CourseEnrollmentCount, CourseGrade, InstructorGrade,
    InstructorRevenue, InstructorStudents, MonthlyEnrollments, StudentEngagement, StudentGrade,
};
use crate::error::Result;
use crate::models::{ASSIGNMENTS, COURSES, ENROLLMENTS, LESSONS, SUBMISSIONS, USERS};
use crate::EduHub;

fn lookup(from: &str, local: &str, foreign: &str, as_field: &str) -> Document {
    doc! { "$lookup": { "from": from, "localField": local, "foreignField": foreign, "as": as_field } }
}

fn unwind(field: &str) -> Document {
    doc! { "$unwind": format!("${}", field) }
}

fn graded() -> Document {
    doc! { "$match": { "grade": { "$ne": null } } }
}

fn round2(path: &str) -> Document {
    doc! { "$round": [path, 2] }
}

/// Submissions joined up to their course through assignment and lesson
fn submissions_to_lessons() -> Vec<Document> {
    vec![
        lookup(ASSIGNMENTS, "assignment_id", "_id", "assignment_info"),
        unwind("assignment_info"),
        lookup(LESSONS, "assignment_info.lesson_id", "_id", "lesson_info"),
        unwind("lesson_info"),
    ]
}

fn average_grade_by_student() -> Vec<Document> {
    vec![
        graded(),
        doc! { "$group": { "_id": "$student_id", "average_grade": { "$avg": "$grade" } } },
    ]
}

fn project_student_grade() -> Vec<Document> {
    vec![
        lookup(USERS, "_id", "_id", "student_info"),
        unwind("student_info"),
        doc! { "$project": {
            "_id": 0,
            "student_id": "$_id",
            "student_name": full_name("student_info"),
            "average_grade": round2("$average_grade"),
        } },
    ]
}

pub(crate) fn enrollments_per_course() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$course_id", "total_enrollments": { "$sum": 1 } } },
        lookup(COURSES, "_id", "_id", "course_info"),
        unwind("course_info"),
        doc! { "$project": { "_id": 0, "course_id": "$_id", "course_title": "$course_info.title", "total_enrollments": 1 } },
        doc! { "$sort": { "total_enrollments": -1 } },
    ]
}

pub(crate) fn average_grade_per_course() -> Vec<Document> {
    let mut pipeline = submissions_to_lessons();
    pipeline.extend([
        graded(),
        doc! { "$group": { "_id": "$lesson_info.course_id", "average_grade": { "$avg": "$grade" } } },
        lookup(COURSES, "_id", "_id", "course_details"),
        unwind("course_details"),
        doc! { "$project": {
            "_id": 0,
            "course_id": "$_id",
            "course_title": "$course_details.title",
            "average_grade": round2("$average_grade"),
        } },
        doc! { "$sort": { "average_grade": -1 } },
    ]);
    pipeline
}

fn courses_per_category(count_field: &str) -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$category", count_field: { "$sum": 1 } } },
        doc! { "$project": { "_id": 0, "category": "$_id", count_field: 1 } },
        doc! { "$sort": { count_field: -1 } },
    ]
}

pub(crate) fn average_grade_per_student() -> Vec<Document> {
    let mut pipeline = average_grade_by_student();
    pipeline.extend(project_student_grade());
    pipeline.push(doc! { "$sort": { "average_grade": -1 } });
    pipeline
}

pub(crate) fn completion_rate() -> Vec<Document> {
    vec![
        doc! { "$group": {
            "_id": "$course_id",
            "total_enrollments": { "$sum": 1 },
            "completed_enrollments": { "$sum": { "$cond": [{ "$eq": ["$status", "completed"] }, 1, 0] } },
        } },
        doc! { "$addFields": { "completion_rate": { "$cond": [
            { "$eq": ["$total_enrollments", 0] },
            0,
            { "$multiply": [{ "$divide": ["$completed_enrollments", "$total_enrollments"] }, 100] },
        ] } } },
        lookup(COURSES, "_id", "_id", "course_info"),
        unwind("course_info"),
        doc! { "$project": {
            "_id": 0,
            "course_id": "$_id",
            "course_title": "$course_info.title",
            "total_enrollments": 1,
            "completed_enrollments": 1,
            "completion_rate": round2("$completion_rate"),
        } },
        doc! { "$sort": { "completion_rate": -1 } },
    ]
}

pub(crate) fn top_performing_students(limit: i64) -> Vec<Document> {
    let mut pipeline = average_grade_by_student();
    pipeline.push(doc! { "$sort": { "average_grade": -1 } });
    pipeline.push(doc! { "$limit": limit });
    pipeline.extend(project_student_grade());
    pipeline
}

pub(crate) fn students_taught_by_instructor() -> Vec<Document> {
    vec![
        lookup(ENROLLMENTS, "_id", "course_id", "enrollments"),
        unwind("enrollments"),
        doc! { "$group": { "_id": "$instructor_id", "distinct_students": { "$addToSet": "$enrollments.student_id" } } },
        doc! { "$addFields": { "total_students_taught": { "$size": "$distinct_students" } } },
        lookup(USERS, "_id", "_id", "instructor_info"),
        unwind("instructor_info"),
        doc! { "$project": {
            "_id": 0,
            "instructor_id": "$_id",
            "instructor_name": full_name("instructor_info"),
            "total_students_taught": 1,
        } },
        doc! { "$sort": { "total_students_taught": -1 } },
    ]
}

pub(crate) fn average_grade_per_instructor() -> Vec<Document> {
    vec![
        lookup(ASSIGNMENTS, "assignment_id", "_id", "assignment_details"),
        unwind("assignment_details"),
        lookup(LESSONS, "assignment_details.lesson_id", "_id", "lesson_details"),
        unwind("lesson_details"),
        lookup(COURSES, "lesson_details.course_id", "_id", "course_details"),
        unwind("course_details"),
        graded(),
        doc! { "$group": { "_id": "$course_details.instructor_id", "average_grade": { "$avg": "$grade" } } },
        lookup(USERS, "_id", "_id", "instructor_info"),
        unwind("instructor_info"),
        doc! { "$project": {
            "_id": 0,
            "instructor_id": "$_id",
            "instructor_name": full_name("instructor_info"),
            "average_course_grade": round2("$average_grade"),
        } },
        doc! { "$sort": { "average_course_grade": -1 } },
    ]
}

pub(crate) fn revenue_per_instructor() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$instructor_id", "total_course_value": { "$sum": "$price" } } },
        lookup(USERS, "_id", "_id", "instructor_info"),
        unwind("instructor_info"),
        doc! { "$project": {
            "_id": 0,
            "instructor_id": "$_id",
            "instructor_name": full_name("instructor_info"),
            "total_revenue_from_courses": round2("$total_course_value"),
        } },
        doc! { "$sort": { "total_revenue_from_courses": -1 } },
    ]
}

pub(crate) fn monthly_enrollment_trends() -> Vec<Document> {
    vec![
        doc! { "$group": {
            "_id": { "year": { "$year": "$enrollment_date" }, "month": { "$month": "$enrollment_date" } },
            "total_enrollments": { "$sum": 1 },
        } },
        doc! { "$project": { "_id": 0, "year": "$_id.year", "month": "$_id.month", "enrollment_count": "$total_enrollments" } },
        doc! { "$sort": { "year": 1, "month": 1 } },
    ]
}

pub(crate) fn engagement_by_submissions() -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": "$student_id", "total_submissions": { "$sum": 1 } } },
        lookup(USERS, "_id", "_id", "student_info"),
        unwind("student_info"),
        doc! { "$project": {
            "_id": 0,
            "student_id": "$_id",
            "student_name": full_name("student_info"),
            "total_submissions": 1,
        } },
        doc! { "$sort": { "total_submissions": -1 } },
    ]
}

impl EduHub {
    pub async fn get_enrollments_per_course(&self) -> Result<Vec<CourseEnrollmentCount>> {
        self.aggregate_rows(ENROLLMENTS, enrollments_per_course()).await
    }

    /// Mean graded score per course, through submission → assignment → lesson
    pub async fn get_average_grade_per_course(&self) -> Result<Vec<CourseGrade>> {
        self.aggregate_rows(SUBMISSIONS, average_grade_per_course()).await
    }

    pub async fn get_course_count_by_category(&self) -> Result<Vec<CategoryCount>> {
        self.aggregate_rows(COURSES, courses_per_category("total_courses")).await
    }

    pub async fn get_average_grade_per_student(&self) -> Result<Vec<StudentGrade>> {
        self.aggregate_rows(SUBMISSIONS, average_grade_per_student()).await
    }

    /// Share of each course's enrollments with status `completed`, as a percentage
    pub async fn get_course_completion_rate(&self) -> Result<Vec<CompletionRate>> {
        self.aggregate_rows(ENROLLMENTS, completion_rate()).await
    }

    pub async fn get_top_performing_students(&self, limit: usize) -> Result<Vec<StudentGrade>> {
        let limit = positive_limit(limit)?;
        self.aggregate_rows(SUBMISSIONS, top_performing_students(limit)).await
    }

    /// Distinct students enrolled across each instructor's courses
    pub async fn get_total_students_taught_by_instructor(&self) -> Result<Vec<InstructorStudents>> {
        self.aggregate_rows(COURSES, students_taught_by_instructor()).await
    }

    pub async fn get_average_course_rating_per_instructor(&self) -> Result<Vec<InstructorGrade>> {
        self.aggregate_rows(SUBMISSIONS, average_grade_per_instructor()).await
    }

    /// Sum of the list prices of each instructor's courses
    pub async fn get_revenue_generated_per_instructor(&self) -> Result<Vec<InstructorRevenue>> {
        self.aggregate_rows(COURSES, revenue_per_instructor()).await
    }

    /// Enrollment counts per calendar month, oldest first
    pub async fn get_monthly_enrollment_trends(&self) -> Result<Vec<MonthlyEnrollments>> {
        self.aggregate_rows(ENROLLMENTS, monthly_enrollment_trends()).await
    }

    pub async fn get_most_popular_course_categories(&self, limit: usize) -> Result<Vec<CategoryCount>> {
        let limit = positive_limit(limit)?;
        let mut pipeline = courses_per_category("course_count");
        pipeline.push(doc! { "$limit": limit });
        self.aggregate_rows(COURSES, pipeline).await
    }

    pub async fn get_student_engagement_by_submissions(&self) -> Result<Vec<StudentEngagement>> {
        self.aggregate_rows(SUBMISSIONS, engagement_by_submissions()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_pipelines_parse() {
        let pipelines = [
            enrollments_per_course(),
            average_grade_per_course(),
            courses_per_category("total_courses"),
            average_grade_per_student(),
            completion_rate(),
            top_performing_students(5),
            students_taught_by_instructor(),
            average_grade_per_instructor(),
            revenue_per_instructor(),
            monthly_enrollment_trends(),
            engagement_by_submissions(),
        ];
        for pipeline in &pipelines {
            docql::pipeline(pipeline).unwrap();
        }
    }

    #[test]
    fn test_top_performers_limit_before_lookup() {
        let pipeline = top_performing_students(3);
        let limit_at = pipeline.iter().position(|s| s.contains_key("$limit")).unwrap();
        let lookup_at = pipeline.iter().position(|s| s.contains_key("$lookup")).unwrap();
        assert!(limit_at < lookup_at);
        assert_eq!(pipeline[limit_at].get_i64("$limit").unwrap(), 3);
    }
}
