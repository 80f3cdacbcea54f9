//! Point inserts

use bson::doc;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use super::{int_field, now};
use crate::error::{Error, Result};
use crate::models::{
    self, Course, Enrollment, EnrollmentStatus, Lesson, NewCourse, NewStudent, Profile, Role, User,
    COURSES, ENROLLMENTS, LESSONS, USERS,
};
use crate::store::FindOptions;
use crate::EduHub;

const AVATAR_COLORS: [&str; 3] = ["E6E6FA", "C1E1C1", "F0F8FF"];

/// Placeholder avatar showing the user's initials
pub(crate) fn avatar_url(color: &str, first_name: &str, last_name: &str) -> String {
    let initials: String = [first_name, last_name]
        .iter()
        .filter_map(|name| name.chars().next())
        .collect();
    format!("https://placehold.co/100x100/{}/000000?text={}", color, initials)
}

impl EduHub {
    /// Insert an active student and return the new id
    pub async fn add_new_student(&self, student: NewStudent) -> Result<String> {
        let color = AVATAR_COLORS.choose(&mut rand::thread_rng()).copied().unwrap_or(AVATAR_COLORS[0]);
        let timestamp = now();
        let user = User {
            id: models::new_id(),
            username: student.username,
            email: student.email,
            password_hash: student.password_hash,
            role: Role::Student,
            created_at: timestamp,
            updated_at: timestamp,
            profile: Some(Profile {
                bio: Some(student.bio),
                avatar: Some(avatar_url(color, &student.first_name, &student.last_name)),
                skills: student.skills,
            }),
            first_name: Some(student.first_name),
            last_name: Some(student.last_name),
            is_active: true,
        };

        let id = user.id.clone();
        self.store
            .insert_one(USERS, bson::to_document(&user)?)
            .await
            .map_err(|e| e.in_collection(USERS))?;
        info!(id = %id, username = %user.username, "student added");
        Ok(id)
    }

    /// Insert a published course owned by an existing instructor
    pub async fn create_new_course(&self, course: NewCourse) -> Result<String> {
        let instructor: User = bson::from_document(self.require(USERS, &course.instructor_id).await?)?;
        if instructor.role != Role::Instructor {
            return Err(Error::invalid_input(format!(
                "user '{}' is a {}, not an instructor",
                instructor.id,
                instructor.role.as_str()
            )));
        }

        let timestamp = now();
        let record = Course {
            id: models::new_id(),
            title: course.title,
            description: course.description,
            instructor_id: course.instructor_id,
            category: course.category,
            level: Some(course.level),
            duration: Some(course.duration),
            price: Some(course.price),
            tags: course.tags,
            created_at: timestamp,
            updated_at: timestamp,
            is_published: true,
            location: None,
        };

        let id = record.id.clone();
        self.store
            .insert_one(COURSES, bson::to_document(&record)?)
            .await
            .map_err(|e| e.in_collection(COURSES))?;
        info!(id = %id, title = %record.title, "course created");
        Ok(id)
    }

    /// Enroll a student once per course
    pub async fn enroll_student_in_course(&self, student_id: &str, course_id: &str) -> Result<String> {
        self.require(USERS, student_id).await?;
        self.require(COURSES, course_id).await?;

        let existing = self
            .store
            .find_one(ENROLLMENTS, doc! { "student_id": student_id, "course_id": course_id })
            .await?;
        if existing.is_some() {
            return Err(Error::DuplicateKey {
                collection: ENROLLMENTS.to_string(),
                key: format!("{{ student_id: \"{}\", course_id: \"{}\" }}", student_id, course_id),
            });
        }

        let enrollment = Enrollment {
            id: models::new_id(),
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            enrollment_date: now(),
            status: EnrollmentStatus::Active,
        };
        let id = enrollment.id.clone();
        self.store
            .insert_one(ENROLLMENTS, bson::to_document(&enrollment)?)
            .await
            .map_err(|e| e.in_collection(ENROLLMENTS))?;
        debug!(id = %id, student_id, course_id, "student enrolled");
        Ok(id)
    }

    /// Append a lesson after the course's current last lesson
    pub async fn add_new_lesson(&self, course_id: &str, title: &str, content: &str) -> Result<String> {
        self.require(COURSES, course_id).await?;

        let last = self
            .store
            .find(
                LESSONS,
                doc! { "course_id": course_id },
                FindOptions::new().sort(doc! { "order": -1 }).limit(1),
            )
            .await?;
        let next_order = last
            .first()
            .and_then(|lesson| int_field(lesson, "order"))
            .map_or(1, |order| order + 1);
        let order = i32::try_from(next_order)
            .map_err(|_| Error::invalid_input(format!("lesson order {} out of range", next_order)))?;

        let timestamp = now();
        let lesson = Lesson {
            id: models::new_id(),
            course_id: course_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            order,
            created_at: Some(timestamp),
            updated_at: Some(timestamp),
        };
        let id = lesson.id.clone();
        self.store
            .insert_one(LESSONS, bson::to_document(&lesson)?)
            .await
            .map_err(|e| e.in_collection(LESSONS))?;
        debug!(id = %id, course_id, order, "lesson added");
        Ok(id)
    }
}
