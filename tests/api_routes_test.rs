//! HTTP surface: routes, status codes, error bodies and middleware

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use bytes::Bytes;
use common::{TestApp, bmp, jpeg, ogg, png, spawn_app, test_config};
use picrank::job_scheduling::PoolKind;
use picrank::utils::ids;
use serde_json::{Value, json};

fn server(app: &TestApp) -> TestServer {
    TestServer::new(app.router()).expect("test server")
}

fn upload(files: &[(&str, Bytes, &str)], duration: Option<&str>) -> MultipartForm {
    let mut form = MultipartForm::new();
    for (name, bytes, mime) in files {
        form = form.add_part(
            "images",
            Part::bytes(bytes.clone()).file_name(*name).mime_type(*mime),
        );
    }
    if let Some(duration) = duration {
        form = form.add_text("duration", duration);
    }
    form
}

fn assert_error(body: &Value, status: StatusCode, msg: &str) {
    assert_eq!(body["error"]["code"], status.as_u16());
    assert_eq!(body["error"]["msg"], msg);
}

/// Upload a small album and wait until it is compressed
async fn create_album(app: &mut TestApp, server: &TestServer, count: u8) -> String {
    let files: Vec<(String, Bytes)> = (0..count)
        .map(|i| (format!("image{i}.png"), png(i)))
        .collect();
    let mut form = MultipartForm::new();
    for (name, bytes) in files {
        form = form.add_part("images", Part::bytes(bytes).file_name(name).mime_type("image/png"));
    }
    form = form.add_text("duration", "1h");

    let response = server.post("/api/albums/").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let id = response.json::<Value>()["album"]["id"]
        .as_str()
        .expect("album id")
        .to_string();
    let album = ids::decode(&id).expect("decodable id");
    app.processed(PoolKind::Compression, album).await;
    id
}

async fn pair(server: &TestServer, album: &str) -> Value {
    let response = server.get(&format!("/api/albums/{album}/pair/")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json::<Value>()["album"].clone()
}

fn vote_body(from: &Value, to: &Value) -> Value {
    json!({
        "album": {
            "imgFrom": { "token": from["token"] },
            "imgTo": { "token": to["token"] },
        }
    })
}

#[tokio::test]
async fn test_upload_reports_progress_after_compression() {
    let mut app = spawn_app(test_config()).await;
    let server = server(&app);

    let form = upload(
        &[
            ("alan.jpg", jpeg(1), "image/jpeg"),
            ("john.bmp", bmp(2), "image/bmp"),
            ("dennis.png", png(3), "image/png"),
        ],
        Some("1h"),
    );
    let response = server.post("/api/albums/").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body = response.json::<Value>();
    let id = body["album"]["id"].as_str().unwrap();
    let album = ids::decode(id).unwrap();

    app.processed(PoolKind::Compression, album).await;
    let status = server.get(&format!("/api/albums/{id}/status/")).await;
    assert_eq!(status.status_code(), StatusCode::OK);
    assert_eq!(status.json::<Value>(), json!({"album": {"progress": 1.0}}));
    app.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_single_file_is_not_enough() {
    let app = spawn_app(test_config()).await;
    let response = server(&app)
        .post("/api/albums/")
        .multipart(upload(&[("alan.jpg", jpeg(1), "image/jpeg")], Some("1h")))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_error(&response.json(), StatusCode::BAD_REQUEST, "Not Enough Images");
}

#[tokio::test]
async fn test_too_many_files() {
    let app = spawn_app(test_config()).await;
    let files: Vec<(&str, Bytes, &str)> = vec![
        ("a.png", png(1), "image/png"),
        ("b.png", png(2), "image/png"),
        ("c.png", png(3), "image/png"),
        ("d.png", png(4), "image/png"),
    ];
    let response = server(&app)
        .post("/api/albums/")
        .multipart(upload(&files, Some("1h")))
        .await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_error(&response.json(), StatusCode::PAYLOAD_TOO_LARGE, "Too Many Images");
}

#[tokio::test]
async fn test_audio_is_not_an_image() {
    let app = spawn_app(test_config()).await;
    let files: Vec<(&str, Bytes, &str)> = vec![
        ("alan.jpg", jpeg(1), "image/jpeg"),
        ("john.bmp", bmp(2), "image/bmp"),
        ("neil.ogg", ogg(), "audio/ogg"),
    ];
    let response = server(&app)
        .post("/api/albums/")
        .multipart(upload(&files, Some("1h")))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_error(
        &response.json(),
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "Unsupported Image Format",
    );
    assert!(app.storage.is_empty().await);
}

#[tokio::test]
async fn test_duration_is_required_and_parsed() {
    let app = spawn_app(test_config()).await;
    let server = server(&app);
    let files: Vec<(&str, Bytes, &str)> =
        vec![("a.png", png(1), "image/png"), ("b.png", png(2), "image/png")];

    let response = server
        .post("/api/albums/")
        .multipart(upload(&files, None))
        .await;
    assert_error(&response.json(), StatusCode::BAD_REQUEST, "Duration Not Set");

    let response = server
        .post("/api/albums/")
        .multipart(upload(&files, Some("fortnight-ish")))
        .await;
    assert_error(&response.json(), StatusCode::BAD_REQUEST, "Duration Invalid");

    let response = server
        .post("/api/albums/")
        .multipart(upload(&files, Some("0")))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_upload_must_be_multipart() {
    let app = spawn_app(test_config()).await;
    let response = server(&app)
        .post("/api/albums/")
        .json(&json!({"images": []}))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_error(
        &response.json(),
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "Unsupported Media Type",
    );
}

#[tokio::test]
async fn test_opposite_votes_rank_evenly() {
    let mut app = spawn_app(test_config()).await;
    let server = server(&app);
    let id = create_album(&mut app, &server, 2).await;
    let album = ids::decode(&id).unwrap();

    let first = pair(&server, &id).await;
    let response = server
        .patch(&format!("/api/albums/{id}/vote/"))
        .json(&vote_body(&first["img1"], &first["img2"]))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    app.processed(PoolKind::Calculation, album).await;

    // Vote against the previous winner
    let second = pair(&server, &id).await;
    let (from, to) = if second["img1"]["src"] == first["img2"]["src"] {
        (&second["img1"], &second["img2"])
    } else {
        (&second["img2"], &second["img1"])
    };
    let response = server
        .patch(&format!("/api/albums/{id}/vote/"))
        .json(&vote_body(from, to))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    app.processed(PoolKind::Calculation, album).await;

    let top = server.get(&format!("/api/albums/{id}/top/")).await;
    assert_eq!(top.status_code(), StatusCode::OK);
    let images = top.json::<Value>()["album"]["images"].clone();
    let images = images.as_array().unwrap();
    assert_eq!(images.len(), 2);
    for image in images {
        let rating = image["rating"].as_f64().unwrap();
        assert!((rating - 0.5).abs() < 1e-15, "rating {rating}");
    }
    app.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tokens_from_another_album_are_rejected() {
    let mut app = spawn_app(test_config()).await;
    let server = server(&app);
    let first = create_album(&mut app, &server, 2).await;
    let second = create_album(&mut app, &server, 2).await;

    let foreign = pair(&server, &first).await;
    let response = server
        .patch(&format!("/api/albums/{second}/vote/"))
        .json(&vote_body(&foreign["img1"], &foreign["img2"]))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_error(&response.json(), StatusCode::NOT_FOUND, "Token Not Found");
    app.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_vote_body_errors() {
    let mut app = spawn_app(test_config()).await;
    let server = server(&app);
    let id = create_album(&mut app, &server, 2).await;

    let response = server
        .patch(&format!("/api/albums/{id}/vote/"))
        .text("imgFrom=a&imgTo=b")
        .await;
    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = server
        .patch(&format!("/api/albums/{id}/vote/"))
        .json(&json!({"album": {"imgFrom": {"token": "!!"}}}))
        .await;
    assert_error(&response.json(), StatusCode::NOT_FOUND, "Token Not Found");

    let response = server
        .patch(&format!("/api/albums/{id}/vote/"))
        .json(&json!({
            "album": {"imgFrom": {"token": "not-base64!"}, "imgTo": {"token": "x"}}
        }))
        .await;
    assert_error(&response.json(), StatusCode::NOT_FOUND, "Token Not Found");
    app.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_album() {
    let app = spawn_app(test_config()).await;
    let server = server(&app);
    let missing = ids::encode(987_654_321);

    for path in ["status", "pair", "top"] {
        let response = server.get(&format!("/api/albums/{missing}/{path}/")).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND, "{path}");
        assert_error(&response.json(), StatusCode::NOT_FOUND, "Album Not Found");
    }

    let response = server.get("/api/albums/short/top/").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_temp_links_serve_images() {
    let mut config = test_config();
    config.service.temp_links = true;
    let mut app = spawn_app(config).await;
    let server = server(&app);
    let id = create_album(&mut app, &server, 2).await;

    let pair = pair(&server, &id).await;
    let src = pair["img1"]["src"].as_str().unwrap();
    assert!(src.starts_with("/api/images/"));

    let response = server.get(src).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/png"
    );
    assert!(!response.as_bytes().is_empty());

    let top = server.get(&format!("/api/albums/{id}/top/")).await;
    for image in top.json::<Value>()["album"]["images"].as_array().unwrap() {
        let src = image["src"].as_str().unwrap();
        assert_eq!(server.get(src).await.status_code(), StatusCode::OK);
    }

    let response = server
        .get(&format!("/api/images/{}/", ids::encode(424_242)))
        .await;
    assert_error(&response.json(), StatusCode::NOT_FOUND, "Token Not Found");
    app.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_image_route_absent_without_temp_links() {
    let app = spawn_app(test_config()).await;
    let response = server(&app)
        .get(&format!("/api/images/{}/", ids::encode(1)))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_spares_health() {
    let mut config = test_config();
    config.middleware.limiter.requests_per_second = 1;
    config.middleware.limiter.burst = 3;
    let app = spawn_app(config).await;
    let server = server(&app);
    let path = format!("/api/albums/{}/status/", ids::encode(5));

    for _ in 0..3 {
        assert_eq!(server.get(&path).await.status_code(), StatusCode::NOT_FOUND);
    }
    let response = server.get(&path).await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_error(&response.json(), StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");

    assert_eq!(server.get("/api/health/").await.status_code(), StatusCode::OK);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert_eq!(server.get(&path).await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let app = spawn_app(test_config()).await;
    let response = server(&app).get("/api/health/").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let headers = response.headers();
    let request_id = headers["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
    assert_eq!(headers["x-content-type-options"], "nosniff");
}
