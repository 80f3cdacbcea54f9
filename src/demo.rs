//! The end-to-end walkthrough behind `eduhub demo` and `eduhub bonus`
//!
//! Each step prints its results. A step that fails with a recoverable error
//! is reported and the walkthrough moves on; driver and I/O failures stop it.

use bson::{doc, Document};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::catalog::ProbeQuery;
use crate::display::{print_documents, print_lookup, print_rows};
use crate::error::{Error, Result};
use crate::models::{
    self, Level, NewCourse, NewStudent, ProfileUpdate, COURSES, ENROLLMENTS, LESSONS, SUBMISSIONS, USERS,
};
use crate::store::{id_of, FindOptions};
use crate::EduHub;

/// Report a failed step; only unrecoverable errors propagate
fn report<T>(step: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_recoverable() => {
            warn!(step, error = %e, "step failed");
            println!("Error in {}: {}", step, e);
            if let Some(hint) = e.suggestion() {
                println!("  Hint: {}", hint);
            }
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn banner(title: &str) {
    println!("\n\n--- {} ---", title);
}

async fn first_course_title(hub: &EduHub) -> Result<Option<String>> {
    let course = hub
        .store()
        .find(COURSES, doc! {}, FindOptions::new().sort(doc! { "title": 1 }).limit(1))
        .await?;
    Ok(course
        .first()
        .and_then(|c| c.get_str("title").ok())
        .map(str::to_string))
}

fn error_user(username: Option<&str>, email: bson::Bson, role: &str, first: &str, last: &str) -> Document {
    let now = bson::DateTime::now();
    let mut user = doc! {
        "_id": models::new_id(),
        "email": email,
        "password_hash": "hash",
        "role": role,
        "created_at": now,
        "updated_at": now,
        "first_name": first,
        "last_name": last,
        "profile": {},
        "is_active": true,
    };
    if let Some(username) = username {
        user.insert("username", username);
    }
    user
}

/// Run the full walkthrough against a freshly prepared database
pub async fn run(hub: &EduHub) -> Result<()> {
    banner("Setting up collections, sample data and indexes");
    let summary = hub.prepare().await?;
    println!(
        "Inserted {} users, {} courses, {} enrollments, {} lessons, {} assignments, {} submissions",
        summary.users, summary.courses, summary.enrollments, summary.lessons, summary.assignments, summary.submissions
    );
    for name in models::COLLECTIONS {
        let indexes = hub.store().list_index_names(name).await?;
        println!("  {}: {}", name, indexes.join(", "));
    }

    // Create
    banner("Running Basic Create Operations");
    let student_id = report(
        "add_new_student",
        hub.add_new_student(NewStudent {
            username: "new_learner_max".into(),
            email: "max.test@example.com".into(),
            password_hash: "pass123".into(),
            first_name: "Max".into(),
            last_name: "Learner".into(),
            bio: "Eager to explore new subjects.".into(),
            skills: vec!["Curious".into(), "Fast Learner".into()],
        })
        .await,
    )?;
    if let Some(id) = &student_id {
        println!("Added new student (ID: {})", id);
    }

    let instructor = hub.store().find_one(USERS, doc! { "role": "instructor" }).await?;
    let mut course_id = None;
    match instructor.as_ref().and_then(id_of) {
        Some(instructor_id) => {
            course_id = report(
                "create_new_course",
                hub.create_new_course(NewCourse {
                    title: "AI Fundamentals for Kids".into(),
                    description: "An exciting intro to AI for young minds.".into(),
                    instructor_id: instructor_id.to_string(),
                    category: "AI".into(),
                    level: Level::Beginner,
                    duration: 15.0,
                    price: 29.99,
                    tags: vec!["AI".into(), "Kids".into(), "Learning".into()],
                })
                .await,
            )?;
        }
        None => println!("Skipping new course/enrollment: no instructor found."),
    }

    if let (Some(student), Some(course)) = (&student_id, &course_id) {
        println!("Created new course (ID: {})", course);
        if let Some(id) = report("enroll_student_in_course", hub.enroll_student_in_course(student, course).await)? {
            println!("Enrolled student {} (enrollment {})", short(student), id);
        }
        report(
            "add_new_lesson",
            hub.add_new_lesson(course, "Lesson 1: What is AI?", "Learn about the basics of Artificial Intelligence.")
                .await,
        )?;
        report(
            "add_new_lesson",
            hub.add_new_lesson(course, "Lesson 2: Friendly Robots", "Discover how AI helps robots in everyday life.")
                .await,
        )?;
        // Enrolling twice is rejected
        report("enroll_student_in_course", hub.enroll_student_in_course(student, course).await)?;
    }

    // Read
    banner("Running Basic Read Operations");
    let seeded_title = first_course_title(hub).await?.unwrap_or_default();
    if let Some(rows) = report("find_active_students", hub.find_active_students().await)? {
        print_rows("Active Students", &rows)?;
    }
    if let Some(rows) = report("get_courses_by_category", hub.get_courses_by_category("Programming").await)? {
        print_rows("Courses in 'Programming' Category", &rows)?;
    }
    if let Some(rows) = report("search_courses_by_title_partial", hub.search_courses_by_title_partial("python").await)? {
        print_rows("Courses matching 'python' (partial, case-insensitive)", &rows)?;
    }
    if let Some(rows) = report("find_students_in_course", hub.find_students_in_course(&seeded_title).await)? {
        print_rows(&format!("Students in '{}'", seeded_title), &rows)?;
    }
    if let Some(rows) = report(
        "get_course_details_with_instructor",
        hub.get_course_details_with_instructor(Some("AI Fundamentals")).await,
    )? {
        print_rows("Course Details with Instructor Info", &rows)?;
    }

    // Update
    banner("Running Basic Update Operations");
    if let Some(student) = &student_id {
        let changes = ProfileUpdate {
            bio: Some("Now an intermediate learner!".into()),
            skills_to_add: vec!["Advanced Topics".into()],
            ..Default::default()
        };
        if let Some(outcome) = report("update_user_profile", hub.update_user_profile(student, changes).await)? {
            println!("Updated profile. Matched: {}, Modified: {}", outcome.matched, outcome.modified);
        }
    }
    if let Some(course) = &course_id {
        report("mark_course_as_published", hub.mark_course_as_published(course, true).await)?;
        report("add_tags_to_course", hub.add_tags_to_course(course, &["Fun", "Interactive"]).await)?;
    }
    let ungraded = match hub.store().find_one(SUBMISSIONS, doc! { "grade": null }).await? {
        Some(doc) => Some(doc),
        None => hub.store().find_one(SUBMISSIONS, doc! {}).await?,
    };
    if let Some(id) = ungraded.as_ref().and_then(id_of) {
        if report("update_assignment_grade", hub.update_assignment_grade(id, 85.0, Some("Well done!")).await)?.is_some() {
            println!("Updated grade for submission {} to 85", short(id));
        }
    }
    // Out of range, rejected before reaching the store
    report("update_assignment_grade", hub.update_assignment_grade("any", 120.0, None).await)?;

    // Delete
    banner("Running Basic Delete Operations");
    if let Some(student) = &student_id {
        report("soft_delete_user", hub.soft_delete_user(student).await)?;
        let user = hub.store().find_one(USERS, doc! { "_id": student.as_str() }).await?;
        print_lookup("Newly Created Student after Soft Delete", user);
    }
    if let (Some(student), Some(course)) = (&student_id, &course_id) {
        let enrollment = hub
            .store()
            .find_one(ENROLLMENTS, doc! { "student_id": student.as_str(), "course_id": course.as_str() })
            .await?;
        if let Some(id) = enrollment.as_ref().and_then(id_of) {
            report("delete_enrollment", hub.delete_enrollment(id).await)?;
            let gone = hub.store().find_one(ENROLLMENTS, doc! { "_id": id }).await?;
            print_lookup("Enrollment after Hard Delete Check", gone);
        }
    }
    if let Some(course) = &course_id {
        let by_order = || FindOptions::new().sort(doc! { "order": 1 });
        let first = hub
            .store()
            .find_one(LESSONS, doc! { "course_id": course.as_str(), "order": 1 })
            .await?;
        match first.as_ref().and_then(id_of) {
            Some(lesson_id) => {
                let before = hub.store().find(LESSONS, doc! { "course_id": course.as_str() }, by_order()).await?;
                print_documents(&format!("Lessons in course {} before lesson removal", short(course)), &before);
                if let Some(n) = report("remove_lesson_from_course", hub.remove_lesson_from_course(lesson_id).await)? {
                    println!("Re-ordered {} subsequent lessons", n);
                }
                let after = hub.store().find(LESSONS, doc! { "course_id": course.as_str() }, by_order()).await?;
                print_documents(&format!("Lessons in course {} after lesson removal", short(course)), &after);
            }
            None => println!("No lesson found to remove from the new AI course."),
        }
    }

    // Complex queries
    banner("Running Complex Queries");
    if let Some(rows) = report("find_courses_by_price_range", hub.find_courses_by_price_range(50.0, 200.0).await)? {
        print_rows("Courses ($50-$200)", &rows)?;
    }
    if let Some(rows) = report("get_users_joined_last_n_months", hub.get_users_joined_last_n_months(3).await)? {
        print_rows("Users Joined Last 3 Months", &rows)?;
    }
    if let Some(rows) = report(
        "find_courses_with_specific_tags",
        hub.find_courses_with_specific_tags(&["AI", "Beginner"]).await,
    )? {
        print_rows("Courses with 'AI' or 'Beginner' Tags", &rows)?;
    }
    if let Some(rows) = report("get_assignments_due_next_week", hub.get_assignments_due_next_week().await)? {
        print_rows("Assignments Due Next Week", &rows)?;
    }

    run_reports(hub).await?;

    // Performance
    banner("Running Query Optimization Analysis (explain and timing)");
    let probes = [
        ProbeQuery::PriceRange { min: 50.0, max: 150.0 },
        ProbeQuery::JoinedLastMonths(3),
        ProbeQuery::StudentsInCourse(seeded_title.clone()),
    ];
    for probe in &probes {
        if let Some(analysis) = report(probe.label(), hub.analyze_query_performance(probe).await)? {
            println!("\n--- Analyzing Query Performance: {} ---", probe.label());
            println!("{}", analysis);
        }
    }

    run_error_examples(hub).await?;
    info!("walkthrough finished");
    Ok(())
}

async fn run_reports(hub: &EduHub) -> Result<()> {
    banner("Running Aggregation Pipelines");
    if let Some(rows) = report("get_enrollments_per_course", hub.get_enrollments_per_course().await)? {
        print_rows("Enrollments Per Course", &rows)?;
    }
    if let Some(rows) = report("get_average_grade_per_course", hub.get_average_grade_per_course().await)? {
        print_rows("Average Grade Per Course", &rows)?;
    }
    if let Some(rows) = report("get_course_count_by_category", hub.get_course_count_by_category().await)? {
        print_rows("Courses Per Category", &rows)?;
    }
    if let Some(rows) = report("get_average_grade_per_student", hub.get_average_grade_per_student().await)? {
        print_rows("Average Grade Per Student", &rows)?;
    }
    if let Some(rows) = report("get_course_completion_rate", hub.get_course_completion_rate().await)? {
        print_rows("Course Completion Rate", &rows)?;
    }
    if let Some(rows) = report("get_top_performing_students", hub.get_top_performing_students(5).await)? {
        print_rows("Top Performing Students", &rows)?;
    }
    if let Some(rows) = report(
        "get_total_students_taught_by_instructor",
        hub.get_total_students_taught_by_instructor().await,
    )? {
        print_rows("Total Students Taught by Instructor", &rows)?;
    }
    if let Some(rows) = report(
        "get_average_course_rating_per_instructor",
        hub.get_average_course_rating_per_instructor().await,
    )? {
        print_rows("Average Course Grade Per Instructor", &rows)?;
    }
    if let Some(rows) = report(
        "get_revenue_generated_per_instructor",
        hub.get_revenue_generated_per_instructor().await,
    )? {
        print_rows("Revenue Per Instructor", &rows)?;
    }
    if let Some(rows) = report("get_monthly_enrollment_trends", hub.get_monthly_enrollment_trends().await)? {
        print_rows("Monthly Enrollment Trends", &rows)?;
    }
    if let Some(rows) = report(
        "get_most_popular_course_categories",
        hub.get_most_popular_course_categories(5).await,
    )? {
        print_rows("Most Popular Course Categories", &rows)?;
    }
    if let Some(rows) = report(
        "get_student_engagement_by_submissions",
        hub.get_student_engagement_by_submissions().await,
    )? {
        print_rows("Student Engagement by Submissions", &rows)?;
    }
    Ok(())
}

/// Writes the validators and unique indexes are expected to reject
async fn run_error_examples(hub: &EduHub) -> Result<()> {
    banner("Running Error Handling Examples");
    let email = "test.error.user@example.com";
    if hub.store().find_one(USERS, doc! { "username": "testuser" }).await?.is_none() {
        let user = error_user(Some("testuser"), email.into(), "student", "Test", "Error");
        if report("insert test user", hub.store().insert_one(USERS, user).await)?.is_some() {
            println!("Created a test user for error handling: {}", email);
        }
    }

    let attempts = [
        ("duplicate email", error_user(Some("duplicate_email"), email.into(), "student", "Dup", "Email")),
        ("email as a number", error_user(Some("invalid_data_test"), 12345.into(), "student", "Invalid", "Type")),
        ("missing username", error_user(None, "missing.username@example.com".into(), "student", "Missing", "Field")),
        ("role 'manager'", error_user(Some("invalid_role"), "invalid.role@example.com".into(), "manager", "Invalid", "Enum")),
    ];
    for (label, user) in attempts {
        println!("\n--- Attempting to insert user with {} ---", label);
        match hub.store().insert_one(USERS, user).await.map_err(|e| e.in_collection(USERS)) {
            Ok(id) => println!("Inserted user {} (validation did not reject it)", id),
            Err(e @ Error::DuplicateKey { .. }) => println!("Duplicate key rejected: {}", e),
            Err(e @ Error::ValidationFailure { .. }) => println!("Validation rejected the document: {}", e),
            Err(e) => {
                report(label, Err::<(), _>(e))?;
            }
        }
    }
    Ok(())
}

/// Text search, recommendations, archiving and geo queries
///
/// Prepares the database first when it holds no courses.
pub async fn run_bonus(hub: &EduHub) -> Result<()> {
    if hub.store().count_documents(COURSES, doc! {}).await? == 0 {
        info!("no courses found, preparing sample data");
        hub.prepare().await?;
    }

    banner("Text Search");
    report("setup_text_search_index", hub.setup_text_search_index().await)?;
    for term in ["introduction python", "AI concepts"] {
        if let Some(rows) = report("search_course_content", hub.search_course_content(term).await)? {
            print_rows(&format!("Text Search Results for '{}'", term), &rows)?;
        }
    }

    banner("Recommendations");
    let seeded_title = first_course_title(hub).await?.unwrap_or_default();
    for title in [seeded_title.as_str(), "Full-Stack Web Development Bootcamp"] {
        if let Some(rows) = report(
            "get_course_recommendations_collaborative",
            hub.get_course_recommendations_collaborative(title, 3).await,
        )? {
            print_rows(&format!("Recommended Courses for '{}'", title), &rows)?;
        }
    }

    banner("Archiving");
    let student = hub.store().find_one(USERS, doc! { "role": "student" }).await?;
    let course = hub.store().find_one(COURSES, doc! {}).await?;
    match (student.as_ref().and_then(id_of), course.as_ref().and_then(id_of)) {
        (Some(student_id), Some(course_id)) => {
            let old_id = models::new_id();
            let old = doc! {
                "_id": old_id.as_str(),
                "student_id": student_id,
                "course_id": course_id,
                "enrollment_date": bson::DateTime::from_chrono(Utc::now() - Duration::days(400)),
                "status": "completed",
            };
            report("insert old enrollment", hub.store().insert_one(ENROLLMENTS, old).await)?;
            let cutoff = Utc::now() - Duration::days(365);
            if let Some((archived, deleted)) = report("archive_old_enrollments", hub.archive_old_enrollments(cutoff).await)? {
                println!("Archiving Summary: Inserted {} into archive, Deleted {} from original.", archived, deleted);
            }
            let archive = hub
                .store()
                .find(models::ARCHIVED_ENROLLMENTS, doc! {}, FindOptions::new())
                .await?;
            print_documents("Archived Enrollments", &archive);
            let original = hub.store().find_one(ENROLLMENTS, doc! { "_id": old_id.as_str() }).await?;
            print_lookup("Original Enrollments (check for deletion)", original);
        }
        _ => println!("Skipping archiving: no student or course available."),
    }

    banner("Geospatial Queries");
    if let Some(updated) = report("add_sample_locations_to_courses", hub.add_sample_locations_to_courses().await)? {
        println!("Added geospatial locations to {} courses.", updated);
    }
    let searches = [("NYC", -74.0060, 40.7128, 200.0), ("London", -0.1278, 51.5074, 50.0)];
    for (place, longitude, latitude, km) in searches {
        if let Some(rows) = report(
            "find_courses_near_location",
            hub.find_courses_near_location(longitude, latitude, km).await,
        )? {
            print_rows(
                &format!("Courses within {}km of {} ({},{})", km, place, latitude, longitude),
                &rows,
            )?;
        }
    }
    Ok(())
}
