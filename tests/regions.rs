//! Region Directory Tests

mod common;

use axum::http::StatusCode;
use common::{app, JAWA, SUMATRA};
use serde_json::json;

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;

    let resp = app.get("/health").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
    assert!(resp.json()["timestamp"].is_string());
}

#[tokio::test]
async fn list_regions_returns_seeded_regions() {
    let app = app().await;

    let resp = app.get("/regions").await;

    assert_eq!(resp.status, StatusCode::OK);
    let regions = resp.json();
    let names: Vec<&str> = regions
        .as_array()
        .unwrap()
        .iter()
        .map(|region| region["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 6);
    assert!(names.contains(&"Jawa"));
    assert!(names.contains(&"Papua"));
}

#[tokio::test]
async fn region_summary_lists_only_approved_reports() {
    let app = app().await;

    let approved = app.create_report("Disetujui", JAWA).await;
    app.put_json(
        &format!("/reports/{}", approved["id"].as_i64().unwrap()),
        json!({ "status": 1 }),
    )
    .await;
    app.create_report("Masih menunggu", JAWA).await;
    let elsewhere = app.create_report("Wilayah lain", SUMATRA).await;
    app.put_json(
        &format!("/reports/{}", elsewhere["id"].as_i64().unwrap()),
        json!({ "status": 1 }),
    )
    .await;

    let resp = app.get(&format!("/regions/{}", JAWA)).await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["id"], JAWA);
    assert_eq!(body["name"], "Jawa");
    let reports = body["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["title"], "Disetujui");
}

#[tokio::test]
async fn region_summary_caps_report_count() {
    let app = app().await;
    for i in 0..7 {
        let report = app.create_report(&format!("Laporan {}", i), JAWA).await;
        app.put_json(
            &format!("/reports/{}", report["id"].as_i64().unwrap()),
            json!({ "status": 1 }),
        )
        .await;
    }

    let body = app.get(&format!("/regions/{}", JAWA)).await.json();
    let reports = body["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0]["title"], "Laporan 6");
}

#[tokio::test]
async fn unknown_region_is_not_found() {
    let app = app().await;

    let resp = app.get("/regions/404").await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "region not found");
}
