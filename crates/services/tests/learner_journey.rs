use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use services::{AppServices, Clock, EvaluationContext, ExerciseAttempt, Reconciliation};
use storage::repository::Storage;
use wellness_core::achievements::AchievementFilter;
use wellness_core::model::{
    ExerciseId, ModuleId, ProgressStatus, Responses, SectionId, TrainingModule, UserId,
};

fn catalog() -> Vec<TrainingModule> {
    serde_json::from_value(json!([
        {
            "id": "stress-2",
            "number": 2,
            "title": "Reframing",
            "sections": [
                {
                    "id": "stress-2-a",
                    "number": 1,
                    "title": "Thought records",
                    "exercises": [
                        {"id": "thoughts", "kind": "thought_record"}
                    ]
                }
            ]
        },
        {
            "id": "stress-1",
            "number": 1,
            "title": "Noticing stress",
            "description": "Spot the early signs.",
            "sections": [
                {
                    "id": "stress-1-a",
                    "number": 1,
                    "title": "Body signals",
                    "content": [{"type": "text", "body": "Notice your shoulders."}],
                    "exercises": [
                        {"id": "scan", "kind": "body_scan", "config": {"minutes": 5}}
                    ]
                },
                {
                    "id": "stress-1-b",
                    "number": 2,
                    "title": "Check in",
                    "exercises": [
                        {"id": "quiz", "kind": "quiz"},
                        {"id": "brand-new", "kind": "hologram_meditation"}
                    ]
                }
            ]
        }
    ]))
    .expect("catalog json")
}

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap() + Duration::days(n)
}

fn quiz_attempt(user: &UserId, score: i64) -> ExerciseAttempt {
    let mut responses = Responses::new();
    responses.insert("score".into(), Value::from(score));
    ExerciseAttempt {
        user_id: user.clone(),
        module_id: ModuleId::new("stress-1"),
        section_id: SectionId::new("stress-1-b"),
        exercise_id: ExerciseId::new("quiz"),
        responses,
        time_spent_secs: 90,
    }
}

#[tokio::test]
async fn learner_finishes_a_module_and_earns_badges() {
    let storage = Storage::sqlite("sqlite:file:svc_journey?mode=memory&cache=shared")
        .await
        .expect("storage");
    let app = AppServices::from_storage(&storage, Clock::fixed(day(0)));
    let user = UserId::new("learner");

    let imported = app.catalog().import(catalog()).await.unwrap();
    assert_eq!(imported, 2);

    let progress = app.progress();
    let opened = progress
        .open_module(&user, &ModuleId::new("stress-1"))
        .await
        .unwrap();
    assert!(opened.warning.is_none());
    let mut session = opened.session;

    progress
        .complete_section(&mut session, &SectionId::new("stress-1-a"))
        .await
        .unwrap();
    let last = progress
        .complete_section(&mut session, &SectionId::new("stress-1-b"))
        .await
        .unwrap();
    assert!(last.persisted);
    assert!(last.completion.module_completed);
    assert_eq!(last.next_module, Some(ModuleId::new("stress-2")));
    assert_eq!(
        progress.refresh(&mut session).await.unwrap(),
        Reconciliation::InSync
    );

    // One quiz a day for a week.
    let mut clock = Clock::fixed(day(0));
    for _ in 0..7 {
        let on_day = AppServices::from_storage(&storage, clock);
        on_day
            .submissions()
            .submit_exercise(quiz_attempt(&user, 90))
            .await
            .unwrap();
        clock.advance(Duration::days(1));
    }

    let overview = progress.overview(&user).await.unwrap();
    let statuses: Vec<_> = overview.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        [ProgressStatus::Completed, ProgressStatus::NotStarted]
    );

    let report = app
        .achievements()
        .report(&user, &EvaluationContext::utc(), &AchievementFilter {
            category: None,
            earned_only: true,
        })
        .await
        .unwrap();
    let earned: Vec<_> = report.achievements.iter().map(|s| s.definition.id).collect();
    assert!(earned.contains(&"first_module"));
    assert!(earned.contains(&"high_scorer"));
    assert!(earned.contains(&"consistency_champion"));
    assert!(!earned.contains(&"exercise_enthusiast"));

    let streak = report
        .achievements
        .iter()
        .find(|s| s.definition.id == "consistency_champion")
        .unwrap();
    assert_eq!(streak.earned_at, Some(day(6)));

    let latest = app
        .submissions()
        .latest_submission(&user, &ModuleId::new("stress-1"), &ExerciseId::new("quiz"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.submitted_at, Some(day(6)));
}

#[tokio::test]
async fn unknown_exercise_kind_is_still_submittable() {
    let app = AppServices::in_memory(Clock::fixed(day(0)));
    app.catalog().import(catalog()).await.unwrap();

    let stored = app
        .submissions()
        .submit_exercise(ExerciseAttempt {
            user_id: UserId::new("learner"),
            module_id: ModuleId::new("stress-1"),
            section_id: SectionId::new("stress-1-b"),
            exercise_id: ExerciseId::new("brand-new"),
            responses: Responses::new(),
            time_spent_secs: 0,
        })
        .await
        .unwrap();
    assert_eq!(stored.score, None);
}
