use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use db::DBService;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::{AppState, routes};
use services::services::{
    config::AppConfig,
    realtime::{RealtimeService, TableInvalidation},
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const API_KEY: &str = "test-key";

async fn test_state(api_key: &str) -> (TempDir, AppState) {
    let storage = TempDir::new().unwrap();
    let storage_dir = storage.path().to_string_lossy().to_string();
    let config = AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("sqlite::memory:".to_string()),
        "API_KEY" => Some(api_key.to_string()),
        "STORAGE_DIR" => Some(storage_dir.clone()),
        "SCHEDULER_ENABLED" => Some("false".to_string()),
        _ => None,
    })
    .unwrap();
    let db = DBService::new_in_memory().await.unwrap();
    (storage, AppState::new(db, config))
}

async fn test_app() -> (TempDir, Router) {
    let (storage, state) = test_state(API_KEY).await;
    (storage, routes::router(state))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("apikey", API_KEY)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("apikey", API_KEY)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn create_unit(app: &Router, name: &str) -> Value {
    let (status, body) = send(
        app,
        json_request("POST", "/api/units", None, json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn test_api_key_is_required() {
    let (_dir, app) = test_app().await;

    let (status, body) = send(
        &app,
        Request::get("/api/sectors").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        Request::get("/api/sectors?apikey=wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Request::get(format!("/api/sectors?apikey={API_KEY}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_api_key_query_parameter_is_percent_decoded() {
    let key = "k+y/with=sign%";
    let (_dir, state) = test_state(key).await;
    let app = routes::router(state);

    let (status, body) = send(
        &app,
        Request::get("/api/sectors?apikey=k%2By%2Fwith%3Dsign%25&other=1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // an undecoded `+` is a space, not the key
    let (status, _) = send(
        &app,
        Request::get("/api/sectors?apikey=k+y%2Fwith%3Dsign%25")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Request::get("/api/sectors")
            .header("apikey", key)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_public() {
    let (_dir, app) = test_app().await;
    let (status, body) = send(
        &app,
        Request::get("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_initialized"], true);
    assert_eq!(body["data"]["missing_tables"], json!([]));
}

#[tokio::test]
async fn test_validation_errors_carry_field_details() {
    let (_dir, app) = test_app().await;
    let (status, body) = send(
        &app,
        json_request("POST", "/api/sectors", None, json!({ "name": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_data"][0]["field"], "name");
}

#[tokio::test]
async fn test_routine_period_lifecycle() {
    let (_dir, app) = test_app().await;
    let user = Uuid::new_v4();
    create_unit(&app, "Loja Centro").await;
    create_unit(&app, "Loja Norte").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/routines", None, json!({ "title": "Conferir caixa" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "acting user is required: {body}");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/routines",
            Some(user),
            json!({ "title": "Conferir caixa", "frequency": "diaria" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let routine_id = body["data"]["id"].as_str().unwrap().to_string();
    let periods_uri = format!("/api/routines/{routine_id}/periods");

    let (status, body) = send(&app, json_request("POST", &periods_uri, Some(user), json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let checkins = body["data"]["checkins"].as_array().unwrap().clone();
    assert_eq!(checkins.len(), 2);
    assert!(checkins.iter().all(|c| c["status"] == "pendente"));

    let (status, body) = send(&app, json_request("POST", &periods_uri, Some(user), json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let checkin_id = checkins[0]["id"].as_str().unwrap();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/checkins/{checkin_id}/complete"),
            Some(user),
            json!({ "notes": "  conferido  " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "concluido");
    assert_eq!(body["data"]["notes"], "conferido");

    let (status, body) = send(&app, get(&format!("/api/routines/{routine_id}"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["summary"]["total"], 2);
    assert_eq!(body["data"]["summary"]["completed"], 1);
    assert_eq!(body["data"]["summary"]["percentage"], 50);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/checkins/{}/complete", Uuid::new_v4()),
            Some(user),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cached_routine_cards_follow_checkin_changes() {
    let (_dir, state) = test_state(API_KEY).await;
    let mut invalidations = state.hub().subscribe();
    let _realtime = RealtimeService::new(
        state.cache().clone(),
        state.hub().clone(),
        Arc::new(TableInvalidation::default()),
    )
    .spawn(state.db())
    .await;
    let app = routes::router(state);
    let user = Uuid::new_v4();
    create_unit(&app, "Loja Centro").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/routines", Some(user), json!({ "title": "Abrir loja" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let routine_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/routines/{routine_id}/periods"),
            Some(user),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let checkin_id = body["data"]["checkins"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/api/routines")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"][0]["summary"]["completed"], 0);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/checkins/{checkin_id}/complete"),
            Some(user),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // events from the earlier writes may still be in flight, so re-read after each one
    let summary = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = send(&app, get("/api/routines")).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            let summary = body["data"][0]["summary"].clone();
            if summary["completed"] == 1 {
                return summary;
            }
            while invalidations.recv().await.unwrap().table != "routines" {}
        }
    })
    .await
    .expect("cached routine cards never reflected the completed checkin");
    assert_eq!(summary["percentage"], 100);
}

#[tokio::test]
async fn test_dashboard_groups_by_unit() {
    let (_dir, app) = test_app().await;
    let unit = create_unit(&app, "Loja Sul").await;

    for (title, status) in [("Inventário", "concluida"), ("Limpeza", "pendente")] {
        let (code, body) = send(
            &app,
            json_request(
                "POST",
                "/api/tasks",
                None,
                json!({ "title": title, "status": status, "unit_id": unit["id"] }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::OK, "{body}");
    }

    let (status, body) = send(&app, get("/api/dashboard?group_by=unit")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let group = &body["data"]["groups"][0];
    assert_eq!(group["label"], "Loja Sul");
    assert_eq!(group["total"], 2);
    assert_eq!(group["completed"], 1);
    assert_eq!(group["percentage"], 50);
    assert_eq!(body["data"]["overall"]["total"], 2);
}

#[tokio::test]
async fn test_note_snaps_and_moves_on_grid() {
    let (_dir, app) = test_app().await;
    let user = Uuid::new_v4();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/notes",
            Some(user),
            json!({ "title": "Lembrete", "pos_x": 250, "pos_y": 10 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Nota salva");
    let note = &body["data"]["note"];
    assert_eq!((note["pos_x"].clone(), note["pos_y"].clone()), (json!(240), json!(0)));
    let note_id = note["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/notes/{note_id}/move"),
            None,
            json!({ "dx": 130, "dy": 200 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["pos_x"], 480);
    assert_eq!(body["data"]["pos_y"], 220);
}

#[tokio::test]
async fn test_multipart_note_attachment_is_downloadable() {
    let (_dir, app) = test_app().await;
    let user = Uuid::new_v4();
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"data\"\r\n\r\n\
         {{\"title\":\"Com anexo\"}}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"files\"; filename=\"lista.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         arroz, feijão\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/api/notes")
        .header("apikey", API_KEY)
        .header("x-user-id", user.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["failed_attachments"], json!([]));
    let attachment = &body["data"]["note"]["attachments"][0];
    assert_eq!(attachment["file_name"], "lista.txt");
    let path = attachment["file_path"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/files/{path}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], "arroz, feijão".as_bytes());
}
