//! Soft and hard deletes

use bson::doc;
use tracing::{debug, info};

use super::{int_field, matched, now};
use crate::error::{Error, Result};
use crate::models::{ENROLLMENTS, LESSONS, USERS};
use crate::store::{FindOptions, UpdateOutcome};
use crate::EduHub;

impl EduHub {
    /// Mark a user inactive; the document is kept
    pub async fn soft_delete_user(&self, user_id: &str) -> Result<UpdateOutcome> {
        let update = doc! { "$set": { "is_active": false, "updated_at": now() } };
        let outcome = self
            .store
            .update_one(USERS, doc! { "_id": user_id }, update)
            .await
            .map_err(|e| e.in_collection(USERS))?;
        matched(outcome, USERS, user_id)
    }

    pub async fn delete_enrollment(&self, enrollment_id: &str) -> Result<()> {
        let deleted = self.store.delete_one(ENROLLMENTS, doc! { "_id": enrollment_id }).await?;
        if deleted == 0 {
            return Err(Error::not_found(ENROLLMENTS, enrollment_id));
        }
        debug!(enrollment_id, "enrollment deleted");
        Ok(())
    }

    /// Delete a lesson and close the gap in its course's ordering
    ///
    /// Every later lesson of the same course moves up by one, so orders stay
    /// contiguous from 1. Returns the number of lessons renumbered.
    pub async fn remove_lesson_from_course(&self, lesson_id: &str) -> Result<u64> {
        let lesson = self.require(LESSONS, lesson_id).await?;
        let course_id = lesson
            .get_str("course_id")
            .map_err(|_| Error::invalid_input(format!("lesson '{}' has no course_id", lesson_id)))?;
        let deleted_order = int_field(&lesson, "order")
            .ok_or_else(|| Error::invalid_input(format!("lesson '{}' has no order", lesson_id)))?;

        if self.store.delete_one(LESSONS, doc! { "_id": lesson_id }).await? == 0 {
            return Err(Error::not_found(LESSONS, lesson_id));
        }

        let later = self
            .store
            .find(
                LESSONS,
                doc! { "course_id": course_id, "order": { "$gt": deleted_order } },
                FindOptions::new().sort(doc! { "order": 1 }),
            )
            .await?;

        let mut reordered = 0;
        for next in &later {
            let (Ok(id), Some(order)) = (next.get_str("_id"), int_field(next, "order")) else {
                continue;
            };
            let new_order = i32::try_from(order - 1)
                .map_err(|_| Error::invalid_input(format!("lesson order {} out of range", order)))?;
            let outcome = self
                .store
                .update_one(
                    LESSONS,
                    doc! { "_id": id },
                    doc! { "$set": { "order": new_order, "updated_at": now() } },
                )
                .await
                .map_err(|e| e.in_collection(LESSONS))?;
            reordered += outcome.modified;
        }

        info!(lesson_id, course_id, reordered, "lesson removed");
        Ok(reordered)
    }
}
