//! Athlete registry behaviour against the in-memory store.
mod common;

use common::{TestApp, TestUser, athlete_input};
use registration_service::{
    models::{AthleteFilter, AthletePatch, AuditAction, AuditFilter, CompetitionDay},
    services::RegistrationError,
};

#[tokio::test]
async fn coaches_only_see_their_own_athletes() {
    // Arrange
    let app = TestApp::spawn().await;
    let tiger = TestUser::new("tiger@dojo.test");
    let crane = TestUser::new("crane@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&tiger, false, "Tigers").await;
    app.onboard(&crane, false, "Cranes").await;
    app.onboard(&admin, true, "Tigers").await;
    let tiger_caller = app.caller(&tiger).await;
    let crane_caller = app.caller(&crane).await;
    let admin_caller = app.caller(&admin).await;

    // Act
    let athlete = app
        .state
        .athletes
        .register(&tiger_caller, athlete_input("a. lee", "2010-05-01"))
        .await
        .expect("Registration should succeed");

    // Assert
    assert_eq!(athlete.full_name, "A. Lee");
    assert_eq!(athlete.coach_id, tiger.id);

    let crane_view = app
        .state
        .athletes
        .list(&crane_caller, &AthleteFilter::default())
        .await
        .unwrap();
    assert!(crane_view.is_empty());

    let admin_view = app
        .state
        .athletes
        .list(&admin_caller, &AthleteFilter::default())
        .await
        .unwrap();
    assert_eq!(admin_view.len(), 1);

    let err = app
        .state
        .athletes
        .get(&crane_caller, athlete.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));
}

#[tokio::test]
async fn cross_tenant_writes_are_forbidden() {
    let app = TestApp::spawn().await;
    let tiger = TestUser::new("tiger@dojo.test");
    let crane = TestUser::new("crane@dojo.test");
    app.onboard(&tiger, false, "Tigers").await;
    app.onboard(&crane, false, "Cranes").await;
    let tiger_caller = app.caller(&tiger).await;
    let crane_caller = app.caller(&crane).await;

    let athlete = app
        .state
        .athletes
        .register(&tiger_caller, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();

    let patch = AthletePatch {
        belt_rank: Some("Blue".to_string()),
        ..Default::default()
    };
    let err = app
        .state
        .athletes
        .update(&crane_caller, athlete.id, patch)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));

    let err = app
        .state
        .athletes
        .delete(&crane_caller, athlete.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));

    // Untouched.
    let stored = app.state.athletes.get(&tiger_caller, athlete.id).await.unwrap();
    assert_eq!(stored, athlete);
}

#[tokio::test]
async fn duplicate_from_another_coach_of_the_same_dojo_is_rejected_without_audit() {
    let app = TestApp::spawn().await;
    let first = TestUser::new("first@dojo.test");
    let second = TestUser::new("second@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&first, false, "Tigers").await;
    app.onboard(&second, false, "Tigers").await;
    app.whitelist(&admin.email, true).await;

    app.state
        .athletes
        .register(&app.caller(&first).await, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();

    // Same name after normalization, same birth date, same dojo.
    let err = app
        .state
        .athletes
        .register(&app.caller(&second).await, athlete_input("a. LEE", "2010-05-01"))
        .await
        .unwrap_err();
    match &err {
        RegistrationError::DuplicateAthlete {
            full_name,
            date_of_birth,
        } => {
            assert_eq!(full_name, "A. Lee");
            assert_eq!(date_of_birth.to_string(), "2010-05-01");
        }
        other => panic!("expected a duplicate, got {other:?}"),
    }
    assert!(err.to_string().contains("A. Lee"));

    let entries = app
        .state
        .audit
        .read(&app.caller(&admin).await, &AuditFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Register);
}

#[tokio::test]
async fn same_athlete_in_another_dojo_is_not_a_duplicate() {
    let app = TestApp::spawn().await;
    let tiger = TestUser::new("tiger@dojo.test");
    let crane = TestUser::new("crane@dojo.test");
    app.onboard(&tiger, false, "Tigers").await;
    app.onboard(&crane, false, "Cranes").await;

    for user in [&tiger, &crane] {
        app.state
            .athletes
            .register(&app.caller(user).await, athlete_input("A. Lee", "2010-05-01"))
            .await
            .expect("Different dojos may register the same person");
    }
}

#[tokio::test]
async fn concurrent_duplicate_registrations_admit_exactly_one() {
    let app = TestApp::spawn().await;
    let first = TestUser::new("first@dojo.test");
    let second = TestUser::new("second@dojo.test");
    app.onboard(&first, false, "Tigers").await;
    app.onboard(&second, false, "Tigers").await;
    let first_caller = app.caller(&first).await;
    let second_caller = app.caller(&second).await;

    let (a, b) = tokio::join!(
        app.state
            .athletes
            .register(&first_caller, athlete_input("A. Lee", "2010-05-01")),
        app.state
            .athletes
            .register(&second_caller, athlete_input("A. Lee", "2010-05-01")),
    );

    let results = [a, b];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(RegistrationError::DuplicateAthlete { .. })))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(duplicates, 1);
}

#[tokio::test]
async fn bulk_registration_reports_rejected_rows_and_keeps_the_rest() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&coach, false, "Tigers").await;
    app.whitelist(&admin.email, true).await;
    let caller = app.caller(&coach).await;

    app.state
        .athletes
        .register(&caller, athlete_input("B. Kim", "2011-02-03"))
        .await
        .unwrap();

    let outcome = app
        .state
        .athletes
        .bulk_register(
            &caller,
            vec![
                athlete_input("C. Park", "2012-01-01"),
                athlete_input("B. Kim", "2011-02-03"),
                athlete_input("D. Cho", "2009-09-09"),
            ],
        )
        .await
        .expect("Row failures do not fail the batch");

    assert_eq!(outcome.succeeded.len(), 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].index, 1);
    assert_eq!(outcome.rejected[0].code, "duplicate_athlete");

    let bulk_entries = app
        .state
        .audit
        .read(
            &app.caller(&admin).await,
            &AuditFilter {
                action: Some(AuditAction::BulkRegister),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(bulk_entries.len(), 2);
}

#[tokio::test]
async fn bulk_registration_collects_validation_failures() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    app.onboard(&coach, false, "Tigers").await;

    let mut bad = athlete_input("E. Yoon", "2010-05-01");
    bad.gender = "Unknown".to_string();
    bad.kata_event = false;

    let outcome = app
        .state
        .athletes
        .bulk_register(
            &app.caller(&coach).await,
            vec![bad, athlete_input("F. Han", "2010-05-01")],
        )
        .await
        .unwrap();

    assert_eq!(outcome.succeeded.len(), 1);
    let rejection = &outcome.rejected[0];
    assert_eq!(rejection.code, "validation_error");
    let fields: Vec<&str> = rejection.fields.iter().map(|f| f.field.as_str()).collect();
    assert!(fields.contains(&"gender"));
}

#[tokio::test]
async fn empty_bulk_upload_is_invalid() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    app.onboard(&coach, false, "Tigers").await;

    let err = app
        .state
        .athletes
        .bulk_register(&app.caller(&coach).await, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::ValidationError(_)));
}

#[tokio::test]
async fn closed_window_blocks_coaches_but_not_admins() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&coach, false, "Tigers").await;
    app.onboard(&admin, true, "Tigers").await;
    let coach_caller = app.caller(&coach).await;
    let admin_caller = app.caller(&admin).await;

    let existing = app
        .state
        .athletes
        .register(&coach_caller, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();

    app.close_registration().await;

    let err = app
        .state
        .athletes
        .register(&coach_caller, athlete_input("G. Seo", "2010-05-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::RegistrationClosed));

    let err = app
        .state
        .athletes
        .delete(&coach_caller, existing.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::RegistrationClosed));

    app.state
        .athletes
        .register(&admin_caller, athlete_input("G. Seo", "2010-05-01"))
        .await
        .expect("Admins are not bound by the window");
    app.state
        .athletes
        .delete(&admin_caller, existing.id)
        .await
        .expect("Admins are not bound by the window");
}

#[tokio::test]
async fn registration_requires_completed_onboarding() {
    let app = TestApp::spawn().await;
    let newcomer = TestUser::new("new@dojo.test");
    app.whitelist(&newcomer.email, false).await;

    let err = app
        .state
        .athletes
        .register(&app.caller(&newcomer).await, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));
}

#[tokio::test]
async fn invalid_input_reports_each_field() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    app.onboard(&coach, false, "Tigers").await;

    let mut input = athlete_input("A", "not-a-date");
    input.belt_rank = "Rainbow".to_string();
    input.weight_kg = Some(500.0);

    let err = app
        .state
        .athletes
        .register(&app.caller(&coach).await, input)
        .await
        .unwrap_err();

    let RegistrationError::ValidationError(issues) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
    for expected in ["full_name", "date_of_birth", "belt_rank", "weight_kg"] {
        assert!(fields.contains(&expected), "missing issue for {expected}");
    }
}

#[tokio::test]
async fn update_audits_the_changed_fields() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&coach, false, "Tigers").await;
    app.whitelist(&admin.email, true).await;
    let caller = app.caller(&coach).await;

    let athlete = app
        .state
        .athletes
        .register(&caller, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();

    let updated = app
        .state
        .athletes
        .update(
            &caller,
            athlete.id,
            AthletePatch {
                competition_day: Some("Both".to_string()),
                kumite_event: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.competition_day, CompetitionDay::Both);
    assert!(updated.kumite_event);

    let entries = app
        .state
        .audit
        .read(
            &app.caller(&admin).await,
            &AuditFilter {
                action: Some(AuditAction::Update),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    let changed = entries[0].athlete_snapshot["changed_fields"]
        .as_array()
        .expect("changed_fields is a list");
    assert_eq!(changed.len(), 2);
    assert_eq!(entries[0].dojo_name, "Tigers");
    assert_eq!(entries[0].coach_email, coach.email);
}

#[tokio::test]
async fn update_cannot_drop_both_events() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    app.onboard(&coach, false, "Tigers").await;
    let caller = app.caller(&coach).await;

    let athlete = app
        .state
        .athletes
        .register(&caller, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();

    let err = app
        .state
        .athletes
        .update(
            &caller,
            athlete.id,
            AthletePatch {
                kata_event: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::ValidationError(_)));
}

#[tokio::test]
async fn delete_snapshots_the_removed_athlete() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&coach, false, "Tigers").await;
    app.whitelist(&admin.email, true).await;
    let caller = app.caller(&coach).await;

    let athlete = app
        .state
        .athletes
        .register(&caller, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();
    app.state.athletes.delete(&caller, athlete.id).await.unwrap();

    let err = app.state.athletes.get(&caller, athlete.id).await.unwrap_err();
    assert!(matches!(err, RegistrationError::NotFound(_)));

    let entries = app
        .state
        .audit
        .read(
            &app.caller(&admin).await,
            &AuditFilter {
                action: Some(AuditAction::Delete),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].athlete_snapshot["full_name"],
        serde_json::json!("A. Lee")
    );
}

#[tokio::test]
async fn stats_follow_the_caller_scope() {
    let app = TestApp::spawn().await;
    let tiger = TestUser::new("tiger@dojo.test");
    let crane = TestUser::new("crane@dojo.test");
    app.onboard(&tiger, false, "Tigers").await;
    app.onboard(&crane, false, "Cranes").await;

    app.state
        .athletes
        .register(&app.caller(&tiger).await, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();
    app.state
        .athletes
        .register(&app.caller(&crane).await, athlete_input("B. Kim", "2011-05-01"))
        .await
        .unwrap();

    let stats = app.state.athletes.stats(&app.caller(&tiger).await).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.kata, 1);
    assert_eq!(stats.kumite, 0);
    assert_eq!(stats.by_dojo.len(), 1);
    assert_eq!(stats.by_dojo["Tigers"], 1);

    let admin = TestUser::new("admin@dojo.test");
    app.whitelist(&admin.email, true).await;
    let overall = app.state.athletes.stats(&app.caller(&admin).await).await.unwrap();
    assert_eq!(overall.total, 2);
    assert_eq!(overall.by_dojo["Tigers"], 1);
    assert_eq!(overall.by_dojo["Cranes"], 1);
}

#[tokio::test]
async fn renaming_into_an_existing_athlete_is_a_duplicate() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    let admin = TestUser::new("admin@dojo.test");
    app.onboard(&coach, false, "Tigers").await;
    app.whitelist(&admin.email, true).await;
    let caller = app.caller(&coach).await;

    app.state
        .athletes
        .register(&caller, athlete_input("A. Lee", "2010-05-01"))
        .await
        .unwrap();
    let other = app
        .state
        .athletes
        .register(&caller, athlete_input("B. Kim", "2011-06-02"))
        .await
        .unwrap();

    let err = app
        .state
        .athletes
        .update(
            &caller,
            other.id,
            AthletePatch {
                full_name: Some("a. lee".to_string()),
                date_of_birth: Some("2010-05-01".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        RegistrationError::DuplicateAthlete { full_name, .. } if full_name == "A. Lee"
    ));

    let unchanged = app.state.athletes.get(&caller, other.id).await.unwrap();
    assert_eq!(unchanged.full_name, "B. Kim");

    let updates = app
        .state
        .audit
        .read(
            &app.caller(&admin).await,
            &AuditFilter {
                action: Some(AuditAction::Update),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updates.is_empty());
}
