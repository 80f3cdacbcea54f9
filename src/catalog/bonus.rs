//! Text search, recommendations, archiving and geo queries

use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{partial_title, positive_limit};
use super::reports::{NearbyCourse, Recommendation, TextSearchHit};
use crate::error::{Error, Result};
use crate::models::{GeoPoint, ARCHIVED_ENROLLMENTS, COURSES, ENROLLMENTS};
use crate::store::{FindOptions, IndexSpec};
use crate::EduHub;

pub const TEXT_INDEX: &str = "course_text_index";

/// Locations handed out to courses, as (longitude, latitude)
pub const SAMPLE_LOCATIONS: [(&str, f64, f64); 5] = [
    ("New York City", -74.0060, 40.7128),
    ("Paris", 2.3522, 48.8566),
    ("Tokyo", 139.6917, 35.6895),
    ("London", -0.1278, 51.5074),
    ("Los Angeles", -118.2437, 34.0522),
];

pub(crate) fn recommendation_pipeline(course_id: &str, limit: i64) -> Vec<Document> {
    vec![
        doc! { "$match": { "course_id": course_id } },
        doc! { "$group": { "_id": null, "student_ids": { "$addToSet": "$student_id" } } },
        doc! { "$unwind": "$student_ids" },
        doc! { "$lookup": { "from": ENROLLMENTS, "localField": "student_ids", "foreignField": "student_id", "as": "other_enrollments" } },
        doc! { "$unwind": "$other_enrollments" },
        doc! { "$match": { "other_enrollments.course_id": { "$ne": course_id } } },
        doc! { "$group": { "_id": "$other_enrollments.course_id", "recommendation_count": { "$sum": 1 } } },
        doc! { "$lookup": { "from": COURSES, "localField": "_id", "foreignField": "_id", "as": "course_details" } },
        doc! { "$unwind": "$course_details" },
        doc! { "$project": {
            "_id": 0,
            "recommended_course_id": "$_id",
            "recommended_course_title": "$course_details.title",
            "recommended_course_category": "$course_details.category",
            "recommendation_strength": "$recommendation_count",
        } },
        doc! { "$sort": { "recommendation_strength": -1 } },
        doc! { "$limit": limit },
    ]
}

pub(crate) fn near_pipeline(longitude: f64, latitude: f64, max_km: f64) -> Vec<Document> {
    vec![
        doc! { "$geoNear": {
            "near": { "type": "Point", "coordinates": [longitude, latitude] },
            "distanceField": "distance_km",
            "maxDistance": max_km * 1000.0,
            "spherical": true,
            "key": "location",
            "query": { "is_published": true },
        } },
        doc! { "$addFields": { "distance_km": { "$divide": ["$distance_km", 1000] } } },
        doc! { "$sort": { "distance_km": 1 } },
        doc! { "$project": {
            "title": 1,
            "category": 1,
            "level": 1,
            "price": 1,
            "distance_km": { "$round": ["$distance_km", 2] },
            "location": 1,
        } },
    ]
}

impl EduHub {
    /// Create the text index over course titles and descriptions
    pub async fn setup_text_search_index(&self) -> Result<String> {
        let spec = IndexSpec::new(doc! { "title": "text", "description": "text" })
            .named(TEXT_INDEX)
            .default_language("english");
        let name = self.store.create_index(COURSES, spec).await?;
        info!(index = %name, "text index ready");
        Ok(name)
    }

    /// Courses matching `term`, most relevant first
    pub async fn search_course_content(&self, term: &str) -> Result<Vec<TextSearchHit>> {
        crate::validation::validate_search_term(term)?;
        let pipeline = vec![
            doc! { "$match": { "$text": { "$search": term } } },
            doc! { "$project": { "title": 1, "description": 1, "category": 1, "score": { "$meta": "textScore" } } },
            doc! { "$sort": { "score": -1 } },
        ];
        self.aggregate_rows(COURSES, pipeline).await
    }

    /// Courses most often taken by students of the first course whose title contains `title`
    ///
    /// Strength is the number of co-enrollments; the target course itself is
    /// never recommended.
    pub async fn get_course_recommendations_collaborative(
        &self,
        title: &str,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let limit = positive_limit(limit)?;
        let course = self
            .store
            .find_one(COURSES, partial_title(title))
            .await?
            .ok_or_else(|| Error::not_found(COURSES, title))?;
        let course_id = course.get_str("_id").map_err(|_| Error::not_found(COURSES, title))?;
        self.aggregate_rows(ENROLLMENTS, recommendation_pipeline(course_id, limit)).await
    }

    /// Move enrollments dated before `cutoff` into `archived_enrollments`
    ///
    /// Returns (archived, deleted). Deletion only starts once every document
    /// is in the archive.
    pub async fn archive_old_enrollments(&self, cutoff: DateTime<Utc>) -> Result<(usize, u64)> {
        let filter = doc! { "enrollment_date": { "$lt": bson::DateTime::from_chrono(cutoff) } };
        let old = self.store.find(ENROLLMENTS, filter, FindOptions::new()).await?;
        if old.is_empty() {
            info!(cutoff = %cutoff.format("%Y-%m-%d"), "no enrollments to archive");
            return Ok((0, 0));
        }

        let ids: Vec<Bson> = old.iter().filter_map(|doc| doc.get("_id").cloned()).collect();
        let archived = self
            .store
            .insert_many(ARCHIVED_ENROLLMENTS, old)
            .await
            .map_err(|e| e.in_collection(ARCHIVED_ENROLLMENTS))?;

        let mut deleted = 0;
        for id in ids {
            match self.store.delete_one(ENROLLMENTS, doc! { "_id": id.clone() }).await {
                Ok(n) => deleted += n,
                Err(e) => warn!(id = %id, error = %e, "archived enrollment not deleted"),
            }
        }
        info!(archived, deleted, "enrollments archived");
        Ok((archived, deleted))
    }

    /// Give every course a sample location and index `location` as 2dsphere
    ///
    /// Locations are handed out in turn from [`SAMPLE_LOCATIONS`]. Returns
    /// the number of courses modified.
    pub async fn add_sample_locations_to_courses(&self) -> Result<u64> {
        let courses = self.store.find(COURSES, doc! {}, FindOptions::new()).await?;
        let mut updated = 0;
        for (i, course) in courses.iter().enumerate() {
            let Some(id) = course.get("_id") else { continue };
            let (_, longitude, latitude) = SAMPLE_LOCATIONS[i % SAMPLE_LOCATIONS.len()];
            let location = bson::to_bson(&GeoPoint::new(longitude, latitude))?;
            let outcome = self
                .store
                .update_one(COURSES, doc! { "_id": id.clone() }, doc! { "$set": { "location": location } })
                .await
                .map_err(|e| e.in_collection(COURSES))?;
            updated += outcome.modified;
        }

        self.store
            .create_index(COURSES, IndexSpec::new(doc! { "location": "2dsphere" }))
            .await?;
        info!(updated, "sample locations added");
        Ok(updated)
    }

    /// Published courses within `max_km` of a point, nearest first
    pub async fn find_courses_near_location(
        &self,
        longitude: f64,
        latitude: f64,
        max_km: f64,
    ) -> Result<Vec<NearbyCourse>> {
        if max_km < 0.0 {
            return Err(Error::invalid_input(format!("negative distance {} km", max_km)));
        }
        self.aggregate_rows(COURSES, near_pipeline(longitude, latitude, max_km)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bonus_pipelines_parse() {
        docql::pipeline(&recommendation_pipeline("c1", 3)).unwrap();
        let near = docql::pipeline(&near_pipeline(-74.0060, 40.7128, 200.0)).unwrap();
        match &near[0] {
            docql::Stage::GeoNear(geo) => {
                assert_eq!(geo.max_distance, Some(200_000.0));
                assert_eq!(geo.key.as_deref(), Some("location"));
                assert!(geo.query.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_recommendations_exclude_target() {
        let pipeline = recommendation_pipeline("c1", 3);
        assert_eq!(
            pipeline[5],
            doc! { "$match": { "other_enrollments.course_id": { "$ne": "c1" } } }
        );
    }
}
