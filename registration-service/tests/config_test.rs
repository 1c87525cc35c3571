mod common;

use chrono::{Duration, Utc};
use common::{TestApp, TestUser};
use registration_service::{
    config::TournamentSettings,
    services::{Caller, ConfigGate, MemoryStore, RegistrationError},
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn seeding_is_idempotent_and_never_overwrites() {
    let app = TestApp::spawn().await;
    let admin = TestUser::new("admin@dojo.test");
    app.whitelist(&admin.email, true).await;

    app.state
        .settings
        .set(&app.caller(&admin).await, "tournament_name", json!("Spring Open"))
        .await
        .unwrap();

    let seeded = app
        .state
        .settings
        .seed(&TournamentSettings::default())
        .await
        .unwrap();
    assert_eq!(seeded, 0);

    let name = app.state.settings.get("tournament_name").await.unwrap();
    assert_eq!(name, json!("Spring Open"));

    let all = app.state.settings.all().await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all["registration_open"], json!(true));
}

#[tokio::test]
async fn only_admins_may_change_settings() {
    let app = TestApp::spawn().await;
    let coach = TestUser::new("coach@dojo.test");
    app.whitelist(&coach.email, false).await;

    let err = app
        .state
        .settings
        .set(&app.caller(&coach).await, "registration_open", json!(false))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Forbidden(_)));
    assert!(app.state.settings.is_registration_open().await.unwrap());
}

#[tokio::test]
async fn unknown_keys_and_bad_values_are_rejected() {
    let app = TestApp::spawn().await;
    let admin = TestUser::new("admin@dojo.test");
    app.whitelist(&admin.email, true).await;
    let admin = app.caller(&admin).await;

    let err = app
        .state
        .settings
        .set(&admin, "max_athletes", json!(10))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::NotFound(_)));

    let err = app
        .state
        .settings
        .set(&admin, "registration_open", json!("yes"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::ValidationError(_)));

    let err = app
        .state
        .settings
        .set(&admin, "registration_deadline", json!("next friday"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::ValidationError(_)));

    let err = app.state.settings.get("max_athletes").await.unwrap_err();
    assert!(matches!(err, RegistrationError::NotFound(_)));
}

#[tokio::test]
async fn window_closes_with_the_flag_or_the_deadline() {
    let app = TestApp::spawn().await;
    let admin = TestUser::new("admin@dojo.test");
    app.whitelist(&admin.email, true).await;
    let admin = app.caller(&admin).await;

    let future = (Utc::now() + Duration::days(2)).to_rfc3339();
    app.state
        .settings
        .set(&admin, "registration_deadline", json!(future))
        .await
        .unwrap();
    let status = app.state.settings.status().await.unwrap();
    assert!(status.open);
    assert!(status.deadline.is_some());
    assert!(status.remaining.is_some());

    app.state
        .settings
        .set(&admin, "registration_open", json!(false))
        .await
        .unwrap();
    assert!(!app.state.settings.is_registration_open().await.unwrap());

    app.state
        .settings
        .set(&admin, "registration_open", json!(true))
        .await
        .unwrap();
    app.close_registration().await;
    let status = app.state.settings.status().await.unwrap();
    assert!(!status.open);

    app.state
        .settings
        .set(&admin, "registration_deadline", json!(null))
        .await
        .unwrap();
    let status = app.state.settings.status().await.unwrap();
    assert!(status.open);
    assert_eq!(status.deadline, None);
    assert_eq!(status.remaining, None);
}

#[tokio::test]
async fn writes_never_create_missing_keys() {
    let store = Arc::new(MemoryStore::new());
    let settings = ConfigGate::new(store);
    let admin = Caller {
        user_id: Uuid::new_v4(),
        email: "admin@dojo.test".to_string(),
        is_admin: true,
    };

    let err = settings
        .set(&admin, "registration_open", json!(false))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::NotFound(_)));
    assert!(settings.all().await.unwrap().is_empty());
    assert!(!settings.is_registration_open().await.unwrap());
}
