mod common;

use axum::http::Method;
use serde_json::json;

use common::app::spawn_test_app;
use common::http::{assert_ok, send};
use common::sign::signed_headers;

#[tokio::test]
async fn it_unknown_user_reads_as_false() {
    let app = spawn_test_app().await;
    let (status, _, body) = send(
        &app.app,
        Method::GET,
        "/user-consent/stranger",
        None,
        &signed_headers(None),
    )
    .await;
    assert_eq!(assert_ok(status, &body)["consent"], false);
}

#[tokio::test]
async fn it_set_and_read_back() {
    let app = spawn_test_app().await;

    let body = json!({"userId": "u1", "consent": true});
    let (status, _, resp) = send(
        &app.app,
        Method::POST,
        "/user-consent",
        Some(body.clone()),
        &signed_headers(Some(&body)),
    )
    .await;
    let data = assert_ok(status, &resp);
    assert_eq!(data["consent"], true);
    assert_eq!(data["userId"], "u1");

    let (status, _, resp) = send(
        &app.app,
        Method::GET,
        "/user-consent/u1",
        None,
        &signed_headers(None),
    )
    .await;
    assert_eq!(assert_ok(status, &resp)["consent"], true);
}

#[tokio::test]
async fn it_revocation_sticks() {
    let app = spawn_test_app().await;

    for consent in [true, false] {
        let body = json!({"userId": "u1", "consent": consent});
        let (status, _, resp) = send(
            &app.app,
            Method::POST,
            "/user-consent",
            Some(body.clone()),
            &signed_headers(Some(&body)),
        )
        .await;
        assert_ok(status, &resp);
    }

    let (status, _, resp) = send(
        &app.app,
        Method::GET,
        "/user-consent/u1",
        None,
        &signed_headers(None),
    )
    .await;
    assert_eq!(assert_ok(status, &resp)["consent"], false);
}

/// A fresh grant with no source configured must still store the record; the
/// backfill is simply skipped.
#[tokio::test]
async fn it_grant_without_source_still_persists() {
    let app = spawn_test_app().await;
    let body = json!({"userId": "u9", "consent": true});
    let (status, _, resp) = send(
        &app.app,
        Method::POST,
        "/user-consent",
        Some(body.clone()),
        &signed_headers(Some(&body)),
    )
    .await;
    assert_ok(status, &resp);
    assert!(app.state.store().get_consent("u9").unwrap());
}
