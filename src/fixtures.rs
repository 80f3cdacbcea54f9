//! Sample data and the standard index set
//!
//! Fixture generation is driven by a seeded `StdRng`, so a given seed always
//! produces the same names, prices and relationships. Timestamps are still
//! relative to the moment of seeding.

use bson::{doc, DateTime, Document};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{
    Assignment, Course, Enrollment, EnrollmentStatus, Lesson, Level, Profile, Role, Submission, User,
    ASSIGNMENTS, COLLECTIONS, COURSES, ENROLLMENTS, LESSONS, SUBMISSIONS, USERS,
};
use crate::store::IndexSpec;
use crate::EduHub;

/// Seed used by `seed_sample_data`
pub const DEFAULT_SEED: u64 = 2024;

const USER_COUNT: usize = 20;
const COURSE_COUNT: usize = 8;
const ENROLLMENT_COUNT: usize = 15;
const LESSON_CAP: usize = 25;
const ASSIGNMENT_COUNT: usize = 10;
const SUBMISSION_COUNT: usize = 12;

const INSTRUCTOR_FIRST: [&str; 5] = ["Alice", "Bob", "Charlie", "Diana", "Eve"];
const INSTRUCTOR_LAST: [&str; 5] = ["Smith", "Jones", "Williams", "Brown", "Davis"];
const INSTRUCTOR_FIELDS: [&str; 4] = ["AI", "Web Dev", "Data Science", "Networking"];
const INSTRUCTOR_SKILLS: [&str; 8] = [
    "Python",
    "Java",
    "C++",
    "JavaScript",
    "MongoDB",
    "SQL",
    "Machine Learning",
    "Cloud Computing",
];

const STUDENT_FIRST: [&str; 10] = [
    "Frank", "Grace", "Heidi", "Ivan", "Judy", "Karl", "Linda", "Mike", "Nancy", "Oscar",
];
const STUDENT_LAST: [&str; 10] = [
    "Wilson", "Miller", "Taylor", "Anderson", "Thomas", "Jackson", "White", "Harris", "Martin", "Thompson",
];
const STUDENT_INTERESTS: [&str; 4] = ["programming", "design", "history", "science"];
const STUDENT_SKILLS: [&str; 4] = ["Beginner", "Intermediate", "Fast Learner", "Problem Solver"];

const AVATAR_COLORS: [&str; 3] = ["ADD8E6", "FFDDC1", "D4A6C5"];

const CATEGORIES: [&str; 8] = [
    "Programming",
    "Web Development",
    "Data Science",
    "Design",
    "Business",
    "Marketing",
    "Science",
    "Arts",
];
const TITLE_PREFIXES: [&str; 4] = ["Mastering", "Introduction to", "Advanced", "Fundamentals of"];
const COURSE_TAGS: [&str; 6] = [
    "Online",
    "Certification",
    "Project-based",
    "Interactive",
    "Self-paced",
    "Beginner Friendly",
];

const LESSON_TOPICS: [&str; 4] = ["Introduction", "Core Concepts", "Advanced Topics", "Practice Session"];
const LESSON_FOCUS: [&str; 4] = ["algorithms", "frontend", "data analysis", "user experience"];

const ASSIGNMENT_KINDS: [&str; 4] = ["Quiz", "Project", "Essay", "Coding Challenge"];
const ASSIGNMENT_SUBJECTS: [&str; 4] = [
    "data structures",
    "web design",
    "marketing strategies",
    "scientific principles",
];

const FEEDBACK: [Option<&str>; 5] = [
    Some("Excellent work!"),
    Some("Good attempt, review chapter 3."),
    Some("Well done, minor improvements needed."),
    Some("Needs more detail."),
    None,
];

/// Documents inserted per collection by `seed_sample_data`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub courses: usize,
    pub enrollments: usize,
    pub lessons: usize,
    pub assignments: usize,
    pub submissions: usize,
}

impl SeedSummary {
    pub fn total(&self) -> usize {
        self.users + self.courses + self.enrollments + self.lessons + self.assignments + self.submissions
    }
}

/// The standard secondary indexes, per collection
pub fn standard_indexes() -> Vec<(&'static str, IndexSpec)> {
    vec![
        (USERS, IndexSpec::new(doc! { "email": 1 }).named("email_1").unique()),
        (USERS, IndexSpec::new(doc! { "username": 1 }).named("username_1").unique()),
        (USERS, IndexSpec::new(doc! { "created_at": 1 }).named("created_at_1")),
        (COURSES, IndexSpec::new(doc! { "title": 1, "category": 1 }).named("title_1_category_1")),
        (COURSES, IndexSpec::new(doc! { "price": 1 }).named("price_1")),
        (ASSIGNMENTS, IndexSpec::new(doc! { "due_date": 1 }).named("due_date_1")),
        (
            ENROLLMENTS,
            IndexSpec::new(doc! { "student_id": 1, "course_id": 1 }).named("student_id_1_course_id_1"),
        ),
        (ENROLLMENTS, IndexSpec::new(doc! { "student_id": 1 }).named("student_id_1")),
        (ENROLLMENTS, IndexSpec::new(doc! { "course_id": 1 }).named("course_id_1")),
    ]
}

/// Generated fixture documents, ready to insert
#[derive(Debug, Clone, Default)]
pub struct SampleData {
    pub users: Vec<User>,
    pub courses: Vec<Course>,
    pub enrollments: Vec<Enrollment>,
    pub lessons: Vec<Lesson>,
    pub assignments: Vec<Assignment>,
    pub submissions: Vec<Submission>,
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

fn sample(rng: &mut StdRng, items: &[&str], min: usize, max: usize) -> Vec<String> {
    let k = rng.gen_range(min..=max);
    items.choose_multiple(rng, k).map(|s| s.to_string()).collect()
}

fn new_uuid(rng: &mut StdRng) -> String {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string()
}

fn days_ago(rng: &mut StdRng, min: i64, max: i64) -> DateTime {
    DateTime::from_chrono(Utc::now() - Duration::days(rng.gen_range(min..=max)))
}

fn days_ahead(rng: &mut StdRng, min: i64, max: i64) -> DateTime {
    DateTime::from_chrono(Utc::now() + Duration::days(rng.gen_range(min..=max)))
}

impl SampleData {
    /// Generate the full fixture set from `seed`
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = SampleData::default();

        for i in 0..USER_COUNT {
            data.users.push(user(&mut rng, i));
        }
        let students: Vec<String> = data.ids_with_role(Role::Student);
        let instructors: Vec<String> = data.ids_with_role(Role::Instructor);

        for i in 0..COURSE_COUNT {
            let instructor_id = pick(&mut rng, &instructors).clone();
            data.courses.push(course(&mut rng, i, instructor_id));
        }
        let course_ids: Vec<String> = data.courses.iter().map(|c| c.id.clone()).collect();

        for _ in 0..ENROLLMENT_COUNT {
            data.enrollments.push(Enrollment {
                id: new_uuid(&mut rng),
                student_id: pick(&mut rng, &students).clone(),
                course_id: pick(&mut rng, &course_ids).clone(),
                enrollment_date: days_ago(&mut rng, 10, 90),
                status: *pick(&mut rng, &EnrollmentStatus::ALL),
            });
        }

        'courses: for course_id in &course_ids {
            let count = rng.gen_range(3..=5);
            for i in 0..count {
                if data.lessons.len() >= LESSON_CAP {
                    break 'courses;
                }
                data.lessons.push(lesson(&mut rng, course_id, i + 1));
            }
        }
        let lesson_ids: Vec<String> = data.lessons.iter().map(|l| l.id.clone()).collect();

        for i in 0..ASSIGNMENT_COUNT {
            data.assignments.push(Assignment {
                id: new_uuid(&mut rng),
                lesson_id: pick(&mut rng, &lesson_ids).clone(),
                title: format!("Assignment {}: {}", i + 1, pick(&mut rng, &ASSIGNMENT_KINDS)),
                description: format!(
                    "Complete this task to demonstrate your understanding of the lesson. It's about {}.",
                    pick(&mut rng, &ASSIGNMENT_SUBJECTS)
                ),
                due_date: days_ahead(&mut rng, 7, 21),
                max_score: Some(100.0),
                created_at: Some(days_ago(&mut rng, 3, 10)),
                updated_at: Some(days_ago(&mut rng, 0, 3)),
            });
        }
        let assignment_ids: Vec<String> = data.assignments.iter().map(|a| a.id.clone()).collect();

        for _ in 0..SUBMISSION_COUNT {
            let assignment_id = pick(&mut rng, &assignment_ids).clone();
            let student_id = pick(&mut rng, &students).clone();
            let graded = rng.gen_bool(0.5);
            let grade = graded.then(|| (rng.gen_range(50.0..=100.0_f64) * 100.0).round() / 100.0);
            let feedback = if graded {
                pick(&mut rng, &FEEDBACK).map(str::to_string)
            } else {
                None
            };
            data.submissions.push(Submission {
                id: new_uuid(&mut rng),
                content: format!(
                    "Submission content for assignment {} by student {}.",
                    &assignment_id[..8],
                    &student_id[..8]
                ),
                assignment_id,
                student_id,
                submission_date: days_ago(&mut rng, 0, 7),
                grade,
                feedback,
                created_at: Some(days_ago(&mut rng, 0, 7)),
                updated_at: Some(days_ago(&mut rng, 0, 1)),
            });
        }

        data
    }

    fn ids_with_role(&self, role: Role) -> Vec<String> {
        self.users
            .iter()
            .filter(|u| u.role == role)
            .map(|u| u.id.clone())
            .collect()
    }

    pub fn summary(&self) -> SeedSummary {
        SeedSummary {
            users: self.users.len(),
            courses: self.courses.len(),
            enrollments: self.enrollments.len(),
            lessons: self.lessons.len(),
            assignments: self.assignments.len(),
            submissions: self.submissions.len(),
        }
    }
}

/// Even positions are students, odd positions instructors
fn user(rng: &mut StdRng, i: usize) -> User {
    let role = if i % 2 == 0 { Role::Student } else { Role::Instructor };
    let (first, last, bio, skills) = match role {
        Role::Instructor => (
            *pick(rng, &INSTRUCTOR_FIRST),
            *pick(rng, &INSTRUCTOR_LAST),
            format!("Experienced instructor in {}.", pick(rng, &INSTRUCTOR_FIELDS)),
            sample(rng, &INSTRUCTOR_SKILLS, 2, 4),
        ),
        Role::Student => (
            *pick(rng, &STUDENT_FIRST),
            *pick(rng, &STUDENT_LAST),
            format!("Eager to learn about {}.", pick(rng, &STUDENT_INTERESTS)),
            sample(rng, &STUDENT_SKILLS, 1, 2),
        ),
    };
    let id = new_uuid(rng);
    let password_hash = format!("hashed_password_{}", &new_uuid(rng).replace('-', "")[..8]);

    User {
        id,
        username: format!("{}_{}{}", first.to_lowercase(), last.to_lowercase(), i),
        email: format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), i),
        password_hash,
        role,
        created_at: days_ago(rng, 30, 365),
        updated_at: days_ago(rng, 1, 30),
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        profile: Some(Profile {
            bio: Some(bio),
            avatar: Some(crate::catalog::avatar_url(*pick(rng, &AVATAR_COLORS), first, last)),
            skills,
        }),
        is_active: rng.gen_bool(0.5),
    }
}

fn course(rng: &mut StdRng, i: usize, instructor_id: String) -> Course {
    let level = Level::ALL[i % Level::ALL.len()];
    Course {
        id: new_uuid(rng),
        title: format!(
            "{} {} Course {}",
            pick(rng, &TITLE_PREFIXES),
            pick(rng, &CATEGORIES),
            i + 1
        ),
        description: format!(
            "A comprehensive course covering {} concepts and practices. This course is for {} learners.",
            pick(rng, &CATEGORIES).to_lowercase(),
            level.as_str()
        ),
        instructor_id,
        category: pick(rng, &CATEGORIES).to_string(),
        level: Some(level),
        duration: Some(f64::from(rng.gen_range(20..=100_u32))),
        price: Some((rng.gen_range(29.99..=299.99_f64) * 100.0).round() / 100.0),
        tags: sample(rng, &COURSE_TAGS, 2, 4),
        created_at: days_ago(rng, 60, 180),
        updated_at: days_ago(rng, 7, 60),
        is_published: rng.gen_range(0..4) != 0,
        location: None,
    }
}

fn lesson(rng: &mut StdRng, course_id: &str, order: i32) -> Lesson {
    Lesson {
        id: new_uuid(rng),
        course_id: course_id.to_string(),
        title: format!("Lesson {}: {}", order, pick(rng, &LESSON_TOPICS)),
        content: format!(
            "Detailed content for lesson {} covering specific topics within the course. This lesson aims to deepen understanding of {}.",
            order,
            pick(rng, &LESSON_FOCUS)
        ),
        order,
        created_at: Some(days_ago(rng, 5, 45)),
        updated_at: Some(days_ago(rng, 1, 5)),
    }
}

fn documents<T: serde::Serialize>(items: &[T]) -> Result<Vec<Document>> {
    items.iter().map(|item| Ok(bson::to_document(item)?)).collect()
}

impl EduHub {
    /// Clear the six collections and insert fixtures from [`DEFAULT_SEED`]
    pub async fn seed_sample_data(&self) -> Result<SeedSummary> {
        self.seed_sample_data_with(DEFAULT_SEED).await
    }

    pub async fn seed_sample_data_with(&self, seed: u64) -> Result<SeedSummary> {
        for name in COLLECTIONS {
            self.store.delete_many(name, doc! {}).await?;
        }
        info!("cleared existing data");

        let data = SampleData::generate(seed);
        let batches = [
            (USERS, documents(&data.users)?),
            (COURSES, documents(&data.courses)?),
            (ENROLLMENTS, documents(&data.enrollments)?),
            (LESSONS, documents(&data.lessons)?),
            (ASSIGNMENTS, documents(&data.assignments)?),
            (SUBMISSIONS, documents(&data.submissions)?),
        ];
        for (name, docs) in batches {
            let inserted = self
                .store
                .insert_many(name, docs)
                .await
                .map_err(|e| e.in_collection(name))?;
            info!(collection = name, inserted, "sample documents inserted");
        }
        Ok(data.summary())
    }

    /// Create the standard indexes, returning the names that were created
    ///
    /// A failing index is logged and skipped so the rest still get built.
    pub async fn create_all_indexes(&self) -> Result<Vec<String>> {
        let mut created = Vec::new();
        for (collection, spec) in standard_indexes() {
            match self.store.create_index(collection, spec.clone()).await {
                Ok(name) => {
                    info!(collection, index = %name, "index created");
                    created.push(name);
                }
                Err(e) => {
                    let name = spec.resolved_name().unwrap_or_default();
                    warn!(collection, index = %name, error = %e, "index not created");
                }
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_is_deterministic() {
        let a = SampleData::generate(7);
        let b = SampleData::generate(7);
        let ids = |data: &SampleData| data.users.iter().map(|u| u.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(
            a.courses.iter().map(|c| (&c.title, c.price)).collect::<Vec<_>>(),
            b.courses.iter().map(|c| (&c.title, c.price)).collect::<Vec<_>>()
        );
        assert_ne!(ids(&a), ids(&SampleData::generate(8)));
    }

    #[test]
    fn test_users_get_placeholder_avatars() {
        let data = SampleData::generate(DEFAULT_SEED);
        for user in &data.users {
            let avatar = user.profile.as_ref().and_then(|p| p.avatar.as_deref()).unwrap();
            assert!(AVATAR_COLORS
                .iter()
                .any(|color| avatar.starts_with(&format!("https://placehold.co/100x100/{}/", color))));
        }
    }

    #[test]
    fn test_fixture_counts() {
        let data = SampleData::generate(DEFAULT_SEED);
        let summary = data.summary();
        assert_eq!(summary.users, 20);
        assert_eq!(summary.courses, 8);
        assert_eq!(summary.enrollments, 15);
        assert!((24..=25).contains(&summary.lessons));
        assert_eq!(summary.assignments, 10);
        assert_eq!(summary.submissions, 12);
    }

    #[test]
    fn test_fixture_relationships() {
        let data = SampleData::generate(DEFAULT_SEED);
        let instructors: HashSet<&str> = data
            .users
            .iter()
            .filter(|u| u.role == Role::Instructor)
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(instructors.len(), 10);
        assert!(data.courses.iter().all(|c| instructors.contains(c.instructor_id.as_str())));

        let emails: HashSet<&str> = data.users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails.len(), 20);

        for course in &data.courses {
            let mut orders: Vec<i32> = data
                .lessons
                .iter()
                .filter(|l| l.course_id == course.id)
                .map(|l| l.order)
                .collect();
            orders.sort();
            assert_eq!(orders, (1..=orders.len() as i32).collect::<Vec<_>>());
        }

        for submission in &data.submissions {
            if let Some(grade) = submission.grade {
                assert!((50.0..=100.0).contains(&grade));
            } else {
                assert!(submission.feedback.is_none());
            }
        }
    }

    #[test]
    fn test_standard_index_names() {
        let names: Vec<String> = standard_indexes()
            .iter()
            .map(|(_, spec)| spec.resolved_name().unwrap())
            .collect();
        assert!(names.contains(&"email_1".to_string()));
        assert!(names.contains(&"student_id_1_course_id_1".to_string()));
        assert_eq!(names.len(), 9);
    }
}
