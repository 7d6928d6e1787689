use std::fs;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use studio_core::{Metadata, MetadataPatch, OperationKind, OperationParams};
use studio_engine::{
    FailureKind, OperationClient, OperationJob, OperationOutput, ReqwestOperationClient,
    ServiceSettings, SourceBytes, RESULT_FILENAME_HEADER, RESULT_URL_HEADER,
};
use tempfile::TempDir;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, work: &TempDir) -> ReqwestOperationClient {
    let settings = ServiceSettings {
        base_url: server.uri(),
        ..ServiceSettings::default()
    };
    ReqwestOperationClient::new(settings, work.path().to_path_buf()).expect("client")
}

fn job(kind: OperationKind, params: OperationParams) -> OperationJob {
    OperationJob {
        item_id: 1,
        kind,
        params,
        source: SourceBytes {
            name: "mug.png".to_string(),
            mime: "image/png".to_string(),
            bytes: Bytes::from_static(b"original-bytes"),
        },
    }
}

#[tokio::test]
async fn multipart_result_uses_service_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .and(body_string_contains("remove_bg"))
        .and(body_string_contains("original-bytes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"processed".to_vec(), "image/png")
                .insert_header(RESULT_FILENAME_HEADER, "nobg_mug.png")
                .insert_header(RESULT_URL_HEADER, "http://svc/outputs/nobg_mug.png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let client = client_for(&server, &work);
    let output = client
        .invoke(job(OperationKind::RemoveBg, OperationParams::default()))
        .await
        .expect("invoke ok");

    assert_eq!(
        output,
        OperationOutput::Image {
            url: "http://svc/outputs/nobg_mug.png".to_string(),
            filename: Some("nobg_mug.png".to_string()),
            bytes: Some(Bytes::from_static(b"processed")),
        }
    );
}

#[tokio::test]
async fn upscale_sends_action_and_scale() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .and(body_string_contains("upscale"))
        .and(body_string_contains("name=\"scale\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"big".to_vec(), "image/png")
                .insert_header(RESULT_URL_HEADER, "http://svc/outputs/upscaled_mug.png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let params = OperationParams {
        scale_factor: Some(2),
        ..OperationParams::default()
    };
    let output = client_for(&server, &work)
        .invoke(job(OperationKind::Upscale, params))
        .await
        .expect("invoke ok");
    assert!(matches!(output, OperationOutput::Image { url, .. } if url.ends_with("upscaled_mug.png")));
}

#[tokio::test]
async fn result_without_url_is_written_to_work_dir() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/invert"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"inverted".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let output = client_for(&server, &work)
        .invoke(job(OperationKind::Invert, OperationParams::default()))
        .await
        .expect("invoke ok");

    let OperationOutput::Image { url, filename, .. } = output else {
        panic!("expected an image output");
    };
    assert_eq!(filename, None);
    assert!(url.starts_with(work.path().to_str().unwrap()));
    assert!(url.ends_with(".jpg"));
    assert_eq!(fs::read(&url).unwrap(), b"inverted");
}

#[tokio::test]
async fn json_error_body_becomes_the_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "model not loaded"})),
        )
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let err = client_for(&server, &work)
        .invoke(job(OperationKind::Upscale, OperationParams::default()))
        .await
        .expect_err("should fail");
    assert_eq!(err.kind, FailureKind::HttpStatus(500));
    assert_eq!(err.message, "model not loaded");
}

#[tokio::test]
async fn non_json_error_falls_back_to_status_line() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scale"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let err = client_for(&server, &work)
        .invoke(job(OperationKind::Scale, OperationParams::default()))
        .await
        .expect_err("should fail");
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
    assert!(err.message.contains("503"));
}

#[tokio::test]
async fn empty_image_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let err = client_for(&server, &work)
        .invoke(job(OperationKind::RemoveBg, OperationParams::default()))
        .await
        .expect_err("should fail");
    assert_eq!(err.kind, FailureKind::MalformedResponse);
}

#[tokio::test]
async fn invalid_params_never_reach_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let err = client_for(&server, &work)
        .invoke(job(OperationKind::EditAi, OperationParams::default()))
        .await
        .expect_err("instruction missing");
    assert_eq!(err.kind, FailureKind::InvalidParams);
}

#[tokio::test]
async fn generation_returns_full_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("\"mime\":\"image/png\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "metadata": {
                "brand": "Acme",
                "title": "Blue mug",
                "bullet1": "Ceramic",
                "bullet2": "350 ml",
                "description": "A mug.",
                "keywords": "mug, blue"
            }
        })))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let output = client_for(&server, &work)
        .invoke(job(OperationKind::Generate, OperationParams::default()))
        .await
        .expect("invoke ok");

    assert_eq!(
        output,
        OperationOutput::Metadata(MetadataPatch::Full(Metadata {
            brand: "Acme".to_string(),
            title: "Blue mug".to_string(),
            bullet1: "Ceramic".to_string(),
            bullet2: "350 ml".to_string(),
            description: "A mug.".to_string(),
            keywords: "mug, blue".to_string(),
        }))
    );
}

#[tokio::test]
async fn ai_edit_returns_image_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/edit-ai"))
        .and(body_string_contains("remove the handle"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"imageUrl": "http://svc/outputs/edit_1.png"})),
        )
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let output = client_for(&server, &work)
        .invoke(job(
            OperationKind::EditAi,
            OperationParams::with_instruction("remove the handle"),
        ))
        .await
        .expect("invoke ok");
    assert_eq!(
        output,
        OperationOutput::Image {
            url: "http://svc/outputs/edit_1.png".to_string(),
            filename: Some("edit_1.png".to_string()),
            bytes: None,
        }
    );
}

#[tokio::test]
async fn health_reports_service_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "healthy", "service": "upscayl"})),
        )
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let health = client_for(&server, &work).health().await.expect("health ok");
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service.as_deref(), Some("upscayl"));
}

#[tokio::test]
async fn discard_posts_remote_names_and_removes_local_files() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cleanup"))
        .and(body_json(serde_json::json!({"filenames": ["nobg_mug.png"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"deleted": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let local = work.path().join("result-1.png");
    fs::write(&local, b"x").unwrap();

    client_for(&server, &work)
        .discard(&[
            format!("{}/outputs/nobg_mug.png", server.uri()),
            local.to_string_lossy().into_owned(),
            work.path().join("already-gone.png").to_string_lossy().into_owned(),
        ])
        .await
        .expect("discard ok");
    assert!(!local.exists());
}

#[tokio::test]
async fn fetch_source_reads_http_and_local_references() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/outputs/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"remote".to_vec(), "image/png"))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let local = work.path().join("b.png");
    fs::write(&local, b"local").unwrap();
    let client = client_for(&server, &work);

    let remote = client
        .fetch_source(&format!("{}/outputs/a.png", server.uri()))
        .await
        .unwrap();
    assert_eq!(remote, Bytes::from_static(b"remote"));
    let from_disk = client.fetch_source(local.to_str().unwrap()).await.unwrap();
    assert_eq!(from_disk, Bytes::from_static(b"local"));
}
