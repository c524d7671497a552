use chrono::Duration;
use serde_json::{Value, json};
use storage::repository::{
    ModuleRepository, NewSubmission, ProgressRepository, SubmissionQuery, SubmissionRepository,
    load_catalog,
};
use storage::sqlite::SqliteRepository;
use wellness_core::gate::complete_section;
use wellness_core::model::{
    ExerciseId, ExerciseKind, ModuleExercise, ModuleId, ModuleSection, ProgressStatus, Responses,
    SectionId, SubmissionId, TrainingModule, UserId,
};
use wellness_core::time::fixed_now;

fn build_module(id: &str, number: u32, sections: usize) -> TrainingModule {
    TrainingModule {
        id: ModuleId::new(id),
        number,
        title: format!("Module {number}"),
        description: Some("Grounding basics".into()),
        sections: (0..sections)
            .map(|i| ModuleSection {
                id: SectionId::new(format!("{id}-s{i}")),
                number: u32::try_from(i + 1).unwrap(),
                title: format!("Section {i}"),
                content: vec![json!({"type": "text", "body": "Breathe in."})],
                exercises: vec![ModuleExercise {
                    id: ExerciseId::new(format!("{id}-s{i}-ex")),
                    kind: ExerciseKind::BreathingTimer,
                    instructions: "Four counts in, four out.".into(),
                    config: json!({"cycles": 4}),
                }],
            })
            .collect(),
    }
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn submission(user: &str, module: &str, exercise: &str, score: Option<i64>) -> NewSubmission {
    let mut responses = Responses::new();
    responses.insert("mood".into(), Value::from(7));
    NewSubmission {
        user_id: UserId::new(user),
        module_id: ModuleId::new(module),
        exercise_id: ExerciseId::new(exercise),
        section_id: SectionId::new(format!("{module}-s0")),
        responses,
        score,
        feedback: "Nice work.".into(),
        submitted_at: fixed_now(),
        time_spent_secs: 45,
    }
}

#[tokio::test]
async fn modules_roundtrip_and_list_in_number_order() {
    let repo = connect("memdb_modules").await;
    let second = build_module("m2", 2, 1);
    let first = build_module("m1", 1, 3);
    repo.upsert_module(&second).await.unwrap();
    repo.upsert_module(&first).await.unwrap();

    let fetched = repo.get_module(&ModuleId::new("m1")).await.unwrap();
    assert_eq!(fetched.as_ref(), Some(&first));

    let listed = repo.list_modules().await.unwrap();
    let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m2"]);

    let mut renamed = first.clone();
    renamed.title = "Renamed".into();
    repo.upsert_module(&renamed).await.unwrap();
    let catalog = load_catalog(&repo).await.unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.first().unwrap().title, "Renamed");
}

#[tokio::test]
async fn progress_survives_a_reload() {
    let repo = connect("memdb_progress").await;
    let module = build_module("m1", 1, 3);
    repo.upsert_module(&module).await.unwrap();
    let user = UserId::new("learner");

    let mut progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();
    let again = repo
        .start_module(&user, &module, fixed_now() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(again.started_at(), fixed_now());

    let section = SectionId::new("m1-s0");
    let later = fixed_now() + Duration::minutes(10);
    complete_section(&module, &mut progress, &section, later).unwrap();
    repo.record_section_completion(&module, &progress, &section, later)
        .await
        .unwrap();

    let stored = repo
        .get_module_progress(&user, &module)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(stored.status(), ProgressStatus::InProgress);
    assert!(stored.is_section_completed(&section));
    assert_eq!(stored.current_section(), Some(&SectionId::new("m1-s1")));
    assert_eq!(stored.progress_percentage(), 33);
    assert_eq!(stored, progress);
}

#[tokio::test]
async fn finishing_every_section_completes_the_module() {
    let repo = connect("memdb_complete").await;
    let module = build_module("m1", 1, 2);
    repo.upsert_module(&module).await.unwrap();
    let user = UserId::new("learner");

    let mut progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();
    for section in ["m1-s0", "m1-s1"] {
        let section = SectionId::new(section);
        complete_section(&module, &mut progress, &section, fixed_now()).unwrap();
        repo.record_section_completion(&module, &progress, &section, fixed_now())
            .await
            .unwrap();
    }

    let catalog = load_catalog(&repo).await.unwrap();
    let all = repo.list_user_progress(&user, &catalog).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].is_completed());
    assert_eq!(all[0].completed_at(), Some(fixed_now()));
    assert_eq!(all[0].progress_percentage(), 100);
}

#[tokio::test]
async fn uncompleted_section_cannot_be_recorded() {
    let repo = connect("memdb_conflict").await;
    let module = build_module("m1", 1, 2);
    repo.upsert_module(&module).await.unwrap();
    let user = UserId::new("learner");
    let progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();

    let err = repo
        .record_section_completion(&module, &progress, &SectionId::new("m1-s0"), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, storage::repository::StorageError::Conflict));
}

#[tokio::test]
async fn outdated_snapshot_is_merged_not_replayed() {
    let repo = connect("memdb_outdated").await;
    let module = build_module("m3", 1, 3);
    repo.upsert_module(&module).await.unwrap();
    let user = UserId::new("learner");
    let fresh = repo.start_module(&user, &module, fixed_now()).await.unwrap();

    let mut ahead = fresh.clone();
    for section in ["m3-s0", "m3-s1", "m3-s2"] {
        let section = SectionId::new(section);
        complete_section(&module, &mut ahead, &section, fixed_now()).unwrap();
        repo.record_section_completion(&module, &ahead, &section, fixed_now())
            .await
            .unwrap();
    }

    // a second device still holding the freshly started record
    let mut behind = fresh;
    let first = SectionId::new("m3-s0");
    let later = fixed_now() + Duration::hours(3);
    complete_section(&module, &mut behind, &first, later).unwrap();
    let merged = repo
        .record_section_completion(&module, &behind, &first, later)
        .await
        .unwrap();
    assert!(merged.is_completed());

    let stored = repo
        .get_module_progress(&user, &module)
        .await
        .unwrap()
        .expect("record");
    assert_eq!(stored.status(), ProgressStatus::Completed);
    assert_eq!(stored.completed_sections().len(), 3);
    assert_eq!(stored.completed_at(), Some(fixed_now()));
    assert_eq!(stored, merged);
}

#[tokio::test]
async fn growing_a_module_reopens_it_without_breaking_the_listing() {
    let repo = connect("memdb_regrown").await;
    let user = UserId::new("learner");
    for (id, number) in [("m1", 1), ("m2", 2)] {
        let module = build_module(id, number, 1);
        repo.upsert_module(&module).await.unwrap();
        let mut progress = repo.start_module(&user, &module, fixed_now()).await.unwrap();
        let section = SectionId::new(format!("{id}-s0"));
        complete_section(&module, &mut progress, &section, fixed_now()).unwrap();
        repo.record_section_completion(&module, &progress, &section, fixed_now())
            .await
            .unwrap();
    }

    repo.upsert_module(&build_module("m2", 2, 2)).await.unwrap();
    let catalog = load_catalog(&repo).await.unwrap();
    let all = repo.list_user_progress(&user, &catalog).await.unwrap();

    let statuses: Vec<_> = all.iter().map(|p| p.status()).collect();
    assert_eq!(
        statuses,
        [ProgressStatus::Completed, ProgressStatus::InProgress]
    );
    assert_eq!(all[1].progress_percentage(), 50);
    assert_eq!(all[1].current_section(), Some(&SectionId::new("m2-s1")));
}

#[tokio::test]
async fn corrupt_progress_row_is_skipped_in_listings() {
    let repo = connect("memdb_corrupt_progress").await;
    let user = UserId::new("learner");
    let good = build_module("m1", 1, 1);
    let bad = build_module("m2", 2, 1);
    repo.upsert_module(&good).await.unwrap();
    repo.upsert_module(&bad).await.unwrap();
    repo.start_module(&user, &good, fixed_now()).await.unwrap();
    repo.start_module(&user, &bad, fixed_now()).await.unwrap();

    sqlx::query(
        "UPDATE module_progress SET started_at = 'sometime in spring' WHERE module_id = 'm2'",
    )
        .execute(repo.pool())
        .await
        .unwrap();

    let catalog = load_catalog(&repo).await.unwrap();
    let all = repo.list_user_progress(&user, &catalog).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].module_id(), &ModuleId::new("m1"));
}

#[tokio::test]
async fn ledger_appends_in_order_and_filters() {
    let repo = connect("memdb_ledger").await;

    let first = repo
        .append_submission(submission("learner", "m1", "m1-s0-ex", Some(92)))
        .await
        .unwrap();
    repo.append_submission(submission("learner", "m2", "m2-s0-ex", None))
        .await
        .unwrap();
    repo.append_submission(submission("someone", "m1", "m1-s0-ex", Some(10)))
        .await
        .unwrap();
    let last = repo
        .append_submission(submission("learner", "m1", "m1-s0-ex", Some(100)))
        .await
        .unwrap();
    assert_eq!(first.id, SubmissionId::new(1));
    assert_eq!(last.id, SubmissionId::new(4));

    let user = UserId::new("learner");
    let history = repo
        .list_submissions(&user, &SubmissionQuery::all())
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0], first);
    assert_eq!(history[1].score, None);
    assert_eq!(history[2].submitted_at, Some(fixed_now()));
    assert_eq!(history[2].responses.get("mood"), Some(&Value::from(7)));

    let query = SubmissionQuery::for_exercise(ModuleId::new("m1"), ExerciseId::new("m1-s0-ex"));
    let scores: Vec<_> = repo
        .list_submissions(&user, &query)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.score)
        .collect();
    assert_eq!(scores, [Some(92), Some(100)]);
}

#[tokio::test]
async fn unreadable_timestamps_load_as_missing() {
    let repo = connect("memdb_malformed").await;
    sqlx::query(
        r"
            INSERT INTO exercise_submissions (
                user_id, module_id, exercise_id, section_id, responses, score, submitted_at
            )
            VALUES ('learner', 'm1', 'm1-s0-ex', 'm1-s0', 'not json', 250, 'last tuesday')
        ",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let history = repo
        .list_submissions(&UserId::new("learner"), &SubmissionQuery::all())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].submitted_at, None);
    assert!(history[0].responses.is_empty());
    assert_eq!(history[0].score, Some(250));
}
