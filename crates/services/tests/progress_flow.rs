use course_core::gate::{AccessDecision, CourseProgress, DenyReason, GateError};
use course_core::model::{
    Course, CourseId, LearnerId, QuizCounts, Section, SectionId, Video, VideoId, VideoState,
};
use course_core::time::fixed_clock;
use services::{AppServices, GateSettings, ProgressServiceError};

const LEARNER: LearnerId = LearnerId::new(42);

fn v(id: u64) -> VideoId {
    VideoId::new(id)
}

/// One section holding v1 (no quiz) and v2 (one question).
fn two_video_course() -> (Course, QuizCounts) {
    let section = Section::new(
        SectionId::new(1),
        "Getting started",
        1,
        vec![Video::new(v(1), "Install", 1), Video::new(v(2), "Hello", 2)],
    );
    let course = Course::new(CourseId::new(1), "Rust", vec![section], vec![]).unwrap();
    let quizzes = [(v(2), 1)].into_iter().collect();
    (course, quizzes)
}

async fn published(course: &Course, quizzes: &QuizCounts) -> AppServices {
    let app = AppServices::in_memory(fixed_clock(), GateSettings::default()).unwrap();
    app.courses().publish_course(course, quizzes).await.unwrap();
    app
}

#[tokio::test]
async fn watched_first_video_unlocks_second_and_counts_half() {
    let (course, quizzes) = two_video_course();
    let app = published(&course, &quizzes).await;
    app.courses().enroll(LEARNER, course.id()).await.unwrap();
    let progress = app.progress();

    progress
        .record_watch(LEARNER, course.id(), v(1), 300, true)
        .await
        .unwrap();

    let decision = progress.check_access(LEARNER, course.id(), v(2)).await.unwrap();
    assert_eq!(decision, AccessDecision::allowed());

    let summary = progress.course_progress(LEARNER, course.id()).await.unwrap();
    assert_eq!(
        summary,
        CourseProgress {
            completed_count: 1,
            total_count: 2,
            percentage: 50
        }
    );
}

#[tokio::test]
async fn failed_quiz_keeps_next_video_locked_until_retry_passes() {
    let section = Section::new(
        SectionId::new(1),
        "Quizzed",
        1,
        vec![Video::new(v(1), "Theory", 1), Video::new(v(2), "Practice", 2)],
    );
    let course = Course::new(CourseId::new(2), "Rust", vec![section], vec![]).unwrap();
    let quizzes: QuizCounts = [(v(1), 4)].into_iter().collect();
    let app = published(&course, &quizzes).await;
    app.courses().enroll(LEARNER, course.id()).await.unwrap();
    let progress = app.progress();

    progress
        .record_watch(LEARNER, course.id(), v(1), 120, true)
        .await
        .unwrap();
    let failed = progress
        .submit_quiz(LEARNER, course.id(), v(1), 1, 4)
        .await
        .unwrap();
    assert!(!failed.passed);
    assert_eq!(failed.progress.test_attempts, 1);

    let decision = progress.check_access(LEARNER, course.id(), v(2)).await.unwrap();
    assert_eq!(decision, AccessDecision::denied(DenyReason::QuizNotPassed));

    let passed = progress
        .submit_quiz(LEARNER, course.id(), v(1), 3, 4)
        .await
        .unwrap();
    assert!(passed.passed);
    assert_eq!(passed.score, 75);
    assert_eq!(passed.progress.test_attempts, 2);

    let decision = progress.check_access(LEARNER, course.id(), v(2)).await.unwrap();
    assert!(decision.can_watch());
}

#[tokio::test]
async fn outline_tracks_states_and_resume_point() {
    let sections = vec![
        Section::new(SectionId::new(2), "Later", 2, vec![Video::new(v(3), "Traits", 1)]),
        Section::new(
            SectionId::new(1),
            "First",
            1,
            vec![Video::new(v(2), "Borrow", 2), Video::new(v(1), "Own", 1)],
        ),
    ];
    let course = Course::new(
        CourseId::new(3),
        "Rust",
        sections,
        vec![Video::new(v(4), "Bonus", 1)],
    )
    .unwrap();
    let quizzes: QuizCounts = [(v(2), 1)].into_iter().collect();
    let app = published(&course, &quizzes).await;
    app.courses().enroll(LEARNER, course.id()).await.unwrap();
    let progress = app.progress();

    progress
        .record_watch(LEARNER, course.id(), v(1), 10, true)
        .await
        .unwrap();
    progress
        .record_watch(LEARNER, course.id(), v(2), 10, true)
        .await
        .unwrap();

    let outline = progress.outline(LEARNER, course.id()).await.unwrap();
    let states: Vec<_> = outline.videos.iter().map(|e| (e.video_id, e.state)).collect();
    assert_eq!(
        states,
        vec![
            (v(1), VideoState::CompletedAndPassed),
            (v(2), VideoState::Watched),
            (v(3), VideoState::Locked),
            (v(4), VideoState::Locked),
        ]
    );
    assert_eq!(outline.resume_at, Some(v(2)));
    assert_eq!(outline.progress.percentage, 25);
    assert_eq!(outline.videos[3].section_id, None);

    let nav = progress.navigation(LEARNER, course.id(), v(3)).await.unwrap();
    assert_eq!(nav.neighbors.previous, Some(v(2)));
    assert_eq!(nav.neighbors.next, Some(v(4)));
    assert!(!nav.next_unlocked);
}

#[tokio::test]
async fn progress_queries_require_enrollment() {
    let (course, quizzes) = two_video_course();
    let app = published(&course, &quizzes).await;
    let progress = app.progress();

    let decision = progress.check_access(LEARNER, course.id(), v(1)).await.unwrap();
    assert_eq!(decision, AccessDecision::denied(DenyReason::NotEnrolled));

    let err = progress
        .course_progress(LEARNER, course.id())
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::Gate(GateError::NotEnrolled)));

    let err = progress
        .record_watch(LEARNER, course.id(), v(1), 5, false)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn strict_ordering_rejects_tied_outlines() {
    let section = Section::new(
        SectionId::new(1),
        "Tied",
        1,
        vec![Video::new(v(1), "A", 1), Video::new(v(2), "B", 1)],
    );
    let course = Course::new(CourseId::new(4), "Rust", vec![section], vec![]).unwrap();

    let lenient = published(&course, &QuizCounts::new()).await;
    lenient.courses().enroll(LEARNER, course.id()).await.unwrap();
    let decision = lenient
        .progress()
        .check_access(LEARNER, course.id(), v(1))
        .await
        .unwrap();
    assert!(decision.can_watch());

    let strict_settings = GateSettings {
        strict_ordering: true,
        ..GateSettings::default()
    };
    let strict = AppServices::in_memory(fixed_clock(), strict_settings).unwrap();
    strict
        .courses()
        .publish_course(&course, &QuizCounts::new())
        .await
        .unwrap();
    strict.courses().enroll(LEARNER, course.id()).await.unwrap();
    let err = strict
        .progress()
        .check_access(LEARNER, course.id(), v(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProgressServiceError::Gate(GateError::MalformedOrdering { order: 1, .. })
    ));
}

#[tokio::test]
async fn sqlite_backed_services_follow_the_same_rules() {
    let (course, quizzes) = two_video_course();
    let app = AppServices::new_sqlite(
        "sqlite:file:memdb_services_flow?mode=memory&cache=shared",
        fixed_clock(),
        GateSettings::default(),
    )
    .await
    .unwrap();
    app.courses().publish_course(&course, &quizzes).await.unwrap();
    app.courses().enroll(LEARNER, course.id()).await.unwrap();
    let progress = app.progress();

    progress
        .record_watch(LEARNER, course.id(), v(1), 90, true)
        .await
        .unwrap();
    progress
        .record_watch(LEARNER, course.id(), v(2), 45, true)
        .await
        .unwrap();
    let result = progress
        .submit_quiz(LEARNER, course.id(), v(2), 1, 1)
        .await
        .unwrap();
    assert!(result.passed);

    let summary = progress.course_progress(LEARNER, course.id()).await.unwrap();
    assert_eq!(summary.percentage, 100);
    let outline = progress.outline(LEARNER, course.id()).await.unwrap();
    assert_eq!(outline.resume_at, None);
}

#[tokio::test]
async fn views_serialize_to_the_documented_json() {
    let (course, quizzes) = two_video_course();
    let app = published(&course, &quizzes).await;
    app.courses().enroll(LEARNER, course.id()).await.unwrap();
    let progress = app.progress();

    let nav = progress.navigation(LEARNER, course.id(), v(1)).await.unwrap();
    assert_eq!(
        serde_json::to_value(nav).unwrap(),
        serde_json::json!({ "previous": null, "next": "2", "nextUnlocked": false })
    );

    let denied = progress.check_access(LEARNER, course.id(), v(2)).await.unwrap();
    assert_eq!(
        serde_json::to_value(denied).unwrap(),
        serde_json::json!({ "canWatch": false, "reason": "previous_incomplete" })
    );

    let outline = progress.outline(LEARNER, course.id()).await.unwrap();
    let json = serde_json::to_value(&outline).unwrap();
    assert_eq!(json["courseId"], "1");
    assert_eq!(json["resumeAt"], "1");
    assert_eq!(
        json["progress"],
        serde_json::json!({ "completedCount": 0, "totalCount": 2, "percentage": 0 })
    );
    assert_eq!(json["videos"][0]["state"], "unlocked");
    assert_eq!(json["videos"][1]["state"], "locked");
}

#[test]
fn invalid_settings_are_rejected_at_startup() {
    let settings = GateSettings {
        pass_threshold: 150,
        ..GateSettings::default()
    };
    assert!(AppServices::in_memory(fixed_clock(), settings).is_err());
}
