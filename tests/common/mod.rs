#![allow(dead_code)]

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{ImageFormat, RgbImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use sqlx::PgPool;
use std::path::PathBuf;
use tempfile::TempDir;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use eduaid::config::AppConfig;
use eduaid::infra::{db::Db, memory::MemoryStore, repo::Repositories};
use eduaid::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const BOUNDARY: &str = "eduaid-test-boundary";
pub const TEST_PAYMENT_TOKEN: &str = "test-payment-token-12345";
pub const JAWA: i64 = 1;
pub const SUMATRA: i64 = 2;
pub const TEST_USER_ID: i64 = 7;
pub const TEST_USER_NAME: &str = "Budi";

// ---------------------------------------------------------------------------
// TestApp: one per test, with a fresh store and upload directory
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    uploads: TempDir,
    database: Option<TestDatabase>,
}

/// Throwaway Postgres database created for a single test.
struct TestDatabase {
    base_url: String,
    name: String,
    db: Db,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body_bytes
    }
}

/// A multipart part: either a text field or a file.
pub enum Part {
    Text(&'static str, String),
    File {
        name: &'static str,
        file_name: &'static str,
        content_type: &'static str,
        data: Vec<u8>,
    },
}

impl Part {
    pub fn text(name: &'static str, value: impl ToString) -> Self {
        Part::Text(name, value.to_string())
    }

    pub fn image(name: &'static str, content_type: &'static str, data: Vec<u8>) -> Self {
        Part::File {
            name,
            file_name: "photo.png",
            content_type,
            data,
        }
    }
}

pub async fn app() -> TestApp {
    TestApp::setup(&[]).await
}

/// App with the payment hook protected by `TEST_PAYMENT_TOKEN`.
pub async fn app_with_payment_token() -> TestApp {
    TestApp::setup(&[("PAYMENT_WEBHOOK_TOKEN", TEST_PAYMENT_TOKEN)]).await
}

/// App backed by a fresh Postgres database. Returns `None` when
/// `TEST_DATABASE_BASE_URL` is unset so the suite still runs without one.
pub async fn pg_app() -> Option<TestApp> {
    let Ok(base_url) = std::env::var("TEST_DATABASE_BASE_URL") else {
        eprintln!("TEST_DATABASE_BASE_URL not set, skipping postgres test");
        return None;
    };
    Some(TestApp::setup_postgres(base_url).await)
}

impl TestApp {
    async fn setup(overrides: &[(&str, &str)]) -> Self {
        let uploads = tempfile::tempdir().expect("failed to create upload dir");
        let config = test_config(&uploads, "memory", overrides);

        let store = MemoryStore::seeded().expect("failed to seed regions");
        store
            .add_user(TEST_USER_ID, TEST_USER_NAME)
            .expect("failed to add user");

        Self::build(&config, Repositories::in_memory(store), uploads, None)
    }

    async fn setup_postgres(base_url: String) -> Self {
        let name = format!("eduaid_test_{}", Uuid::new_v4().simple());

        // ---- Create a database just for this test ----
        let admin_pool = PgPool::connect(&format!("{}/postgres", base_url))
            .await
            .expect("cannot connect to postgres admin database");
        // CREATE DATABASE cannot run inside a transaction
        sqlx::query(&format!("CREATE DATABASE \"{}\"", name))
            .execute(&admin_pool)
            .await
            .expect("failed to create test database");
        admin_pool.close().await;

        // ---- Run migrations ----
        let database_url = format!("{}/{}", base_url, name);
        let db_pool = PgPool::connect(&database_url)
            .await
            .expect("cannot connect to test database");

        let mut migration_files: Vec<_> = std::fs::read_dir("migrations")
            .expect("cannot read migrations/")
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "sql"))
            .collect();
        migration_files.sort_by_key(|e| e.file_name());

        for entry in &migration_files {
            let sql = std::fs::read_to_string(entry.path())
                .unwrap_or_else(|_| panic!("cannot read {:?}", entry.path()));
            sqlx::raw_sql(&sql).execute(&db_pool).await.unwrap_or_else(
                |e| panic!("migration {:?} failed: {}", entry.file_name(), e),
            );
        }

        sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
            .bind(TEST_USER_ID)
            .bind(TEST_USER_NAME)
            .bind("budi@example.test")
            .execute(&db_pool)
            .await
            .expect("failed to insert test user");
        db_pool.close().await;

        // ---- Build AppState via AppConfig (same code path as production) ----
        let uploads = tempfile::tempdir().expect("failed to create upload dir");
        let config = test_config(
            &uploads,
            "postgres",
            &[("DATABASE_URL", database_url.as_str())],
        );
        let db = Db::connect(&config)
            .await
            .expect("failed to connect app pool");

        Self::build(
            &config,
            Repositories::postgres(db.clone()),
            uploads,
            Some(TestDatabase { base_url, name, db }),
        )
    }

    fn build(
        config: &AppConfig,
        repos: Repositories,
        uploads: TempDir,
        database: Option<TestDatabase>,
    ) -> Self {
        let state = AppState::new(config, repos);
        let router = eduaid::http::router(state.clone());

        TestApp {
            router,
            state,
            uploads,
            database,
        }
    }

    /// Drops the per-test database, if any. Call at the end of postgres tests.
    pub async fn cleanup(self) {
        let Some(database) = self.database else {
            return;
        };
        database.db.pool().close().await;

        let admin_pool = PgPool::connect(&format!("{}/postgres", database.base_url))
            .await
            .expect("cannot connect to postgres admin database");
        sqlx::query(&format!(
            "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
            database.name
        ))
        .execute(&admin_pool)
        .await
        .expect("failed to drop test database");
        admin_pool.close().await;
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<(String, Vec<u8>)>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some((content_type, bytes)) = body {
            builder
                .header("content-type", content_type)
                .body(Body::from(bytes))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        // Inject ConnectInfo so handlers can fall back to the peer address.
        let mut request = request;
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[]).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, None, &[]).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.send_json(Method::POST, path, body, &[]).await
    }

    pub async fn put_json(&self, path: &str, body: Value) -> TestResponse {
        self.send_json(Method::PUT, path, body, &[]).await
    }

    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let bytes = serde_json::to_vec(&body).unwrap();
        self.request(method, path, Some(("application/json".into(), bytes)), headers)
            .await
    }

    pub async fn post_multipart(&self, path: &str, parts: Vec<Part>) -> TestResponse {
        self.request(Method::POST, path, Some(multipart(parts)), &[])
            .await
    }

    pub async fn put_multipart(&self, path: &str, parts: Vec<Part>) -> TestResponse {
        self.request(Method::PUT, path, Some(multipart(parts)), &[])
            .await
    }

    // ------------------------------------------------------------------
    // Domain helpers
    // ------------------------------------------------------------------

    /// Creates an Active campaign with a deadline 30 days out. Returns its JSON.
    pub async fn create_campaign(&self, region_id: i64, target_amount: i64) -> Value {
        let resp = self
            .post_multipart(
                "/campaigns",
                vec![
                    Part::text("title", "Buku untuk SD Harapan"),
                    Part::text("description", "Membeli buku pelajaran kelas 1-6"),
                    Part::text("regionId", region_id),
                    Part::text("targetAmount", target_amount),
                    Part::text("deadline", days_from_now(30)),
                ],
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.json());
        resp.json()
    }

    pub async fn create_donation(
        &self,
        region_id: i64,
        amount: i64,
        campaign_id: Option<i64>,
    ) -> Value {
        let resp = self
            .post_json(
                "/donations",
                json!({
                    "donorName": "Sari",
                    "amount": amount,
                    "regionId": region_id,
                    "campaignId": campaign_id,
                }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.json());
        resp.json()["donation"].clone()
    }

    pub async fn confirm(&self, donation_id: i64, outcome: Value) -> TestResponse {
        self.post_json(
            &format!("/donations/{}/confirm", donation_id),
            json!({ "outcome": outcome }),
        )
        .await
    }

    pub async fn create_report(&self, title: &str, region_id: i64) -> Value {
        let resp = self
            .post_json(
                "/reports",
                json!({
                    "title": title,
                    "description": "Atap ruang kelas bocor",
                    "regionId": region_id,
                }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{:?}", resp.json());
        resp.json()
    }

    /// Filesystem path behind a public `/uploads/...` URL.
    pub fn upload_path(&self, public_url: &str) -> PathBuf {
        let key = public_url
            .strip_prefix("/uploads/")
            .expect("url outside the uploads prefix");
        self.uploads.path().join(key)
    }

    pub fn upload_root(&self) -> PathBuf {
        self.uploads.path().to_path_buf()
    }

    /// Every file currently stored in `bucket`.
    pub fn files_in(&self, bucket: &str) -> Vec<String> {
        let dir = self.uploads.path().join(bucket);
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn test_config(uploads: &TempDir, backend: &str, overrides: &[(&str, &str)]) -> AppConfig {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("STORE_BACKEND".into(), backend.into());
    env.insert("APP_MODE".into(), "api".into());
    env.insert(
        "UPLOAD_DIR".into(),
        uploads.path().to_string_lossy().into_owned(),
    );
    for &(key, value) in overrides {
        env.insert(key.into(), value.into());
    }

    AppConfig::from_lookup(|key| env.get(key).cloned()).expect("failed to build AppConfig")
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

pub fn multipart(parts: Vec<Part>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("failed to encode png");
    out.into_inner()
}

pub fn days_from_now(days: i64) -> String {
    (OffsetDateTime::now_utc() + time::Duration::days(days))
        .format(&Rfc3339)
        .unwrap()
}
