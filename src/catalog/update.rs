//! Field-level updates by identifier

use bson::{doc, Document};
use tracing::debug;

use super::{matched, now};
use crate::error::{Error, Result};
use crate::models::{ProfileUpdate, COURSES, SUBMISSIONS, USERS};
use crate::store::UpdateOutcome;
use crate::EduHub;

/// The update document for `update_user_profile`
///
/// Skills go through `$addToSet` with `$each`, so adding a skill that is
/// already present changes nothing.
pub(crate) fn profile_update(changes: &ProfileUpdate) -> Document {
    let mut set = Document::new();
    if let Some(bio) = &changes.bio {
        set.insert("profile.bio", bio.as_str());
    }
    if let Some(avatar) = &changes.avatar {
        set.insert("profile.avatar", avatar.as_str());
    }
    if let Some(active) = changes.is_active {
        set.insert("is_active", active);
    }
    set.insert("updated_at", now());

    let mut update = doc! { "$set": set };
    if !changes.skills_to_add.is_empty() {
        update.insert(
            "$addToSet",
            doc! { "profile.skills": { "$each": changes.skills_to_add.clone() } },
        );
    }
    update
}

impl EduHub {
    pub async fn update_user_profile(&self, user_id: &str, changes: ProfileUpdate) -> Result<UpdateOutcome> {
        let outcome = self
            .store
            .update_one(USERS, doc! { "_id": user_id }, profile_update(&changes))
            .await
            .map_err(|e| e.in_collection(USERS))?;
        debug!(user_id, matched = outcome.matched, modified = outcome.modified, "profile updated");
        matched(outcome, USERS, user_id)
    }

    pub async fn mark_course_as_published(&self, course_id: &str, published: bool) -> Result<UpdateOutcome> {
        let update = doc! { "$set": { "is_published": published, "updated_at": now() } };
        let outcome = self
            .store
            .update_one(COURSES, doc! { "_id": course_id }, update)
            .await
            .map_err(|e| e.in_collection(COURSES))?;
        matched(outcome, COURSES, course_id)
    }

    /// Record a grade in [0, 100] and optional feedback on a submission
    pub async fn update_assignment_grade(
        &self,
        submission_id: &str,
        grade: f64,
        feedback: Option<&str>,
    ) -> Result<UpdateOutcome> {
        if !(0.0..=100.0).contains(&grade) {
            return Err(Error::invalid_input(format!("grade {} is outside 0-100", grade)));
        }

        let mut set = doc! { "grade": grade, "updated_at": now() };
        if let Some(feedback) = feedback {
            set.insert("feedback", feedback);
        }
        let outcome = self
            .store
            .update_one(SUBMISSIONS, doc! { "_id": submission_id }, doc! { "$set": set })
            .await
            .map_err(|e| e.in_collection(SUBMISSIONS))?;
        matched(outcome, SUBMISSIONS, submission_id)
    }

    /// Add tags a course does not carry yet
    pub async fn add_tags_to_course(&self, course_id: &str, tags: &[&str]) -> Result<UpdateOutcome> {
        let update = doc! {
            "$addToSet": { "tags": { "$each": tags } },
            "$set": { "updated_at": now() },
        };
        let outcome = self
            .store
            .update_one(COURSES, doc! { "_id": course_id }, update)
            .await
            .map_err(|e| e.in_collection(COURSES))?;
        matched(outcome, COURSES, course_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_update_document() {
        let update = profile_update(&ProfileUpdate {
            bio: Some("Now intermediate".into()),
            skills_to_add: vec!["Rust".into()],
            ..Default::default()
        });
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("profile.bio").unwrap(), "Now intermediate");
        assert!(set.contains_key("updated_at"));
        assert!(!set.contains_key("is_active"));
        let add = update.get_document("$addToSet").unwrap();
        assert!(add.get_document("profile.skills").unwrap().contains_key("$each"));
        assert!(docql::update(&update).is_ok());
    }

    #[test]
    fn test_profile_update_without_skills() {
        let update = profile_update(&ProfileUpdate {
            is_active: Some(false),
            ..Default::default()
        });
        assert!(!update.contains_key("$addToSet"));
        assert_eq!(update.get_document("$set").unwrap().get_bool("is_active").unwrap(), false);
    }
}
