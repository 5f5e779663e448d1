//! Route tests for PDF tools and viewer sessions

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use common::*;

fn page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
}

#[tokio::test]
async fn test_merge_keeps_upload_order() {
    let app = test_app().await;
    let request = multipart_request(
        "/api/v1/pdf/merge",
        None,
        vec![
            Part::File("files", "a.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0), (612.0, 792.0)])),
            Part::File("files", "b.pdf", "application/pdf", sample_pdf(&[(300.0, 400.0)])),
        ],
    );

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"merged.pdf\""
    );
    let merged = lopdf::Document::load_mem(&body_bytes(response).await).unwrap();
    let pages: Vec<_> = merged.get_pages().into_values().collect();
    assert_eq!(pages.len(), 3);
    assert_eq!(merged.extract_text(&[3]).unwrap().trim(), "Page 1");
}

#[tokio::test]
async fn test_merge_needs_two_files() {
    let app = test_app().await;
    let request = multipart_request(
        "/api/v1/pdf/merge",
        None,
        vec![Part::File("files", "a.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0)]))],
    );
    expect_json(app.send(request).await, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_split_by_range() {
    let app = test_app().await;
    let request = multipart_request(
        "/api/v1/pdf/split",
        None,
        vec![
            Part::File("file", "book.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0); 5])),
            Part::Text("pages", "2-3,5"),
        ],
    );

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(page_count(&body_bytes(response).await), 3);
}

#[tokio::test]
async fn test_split_rejects_out_of_range() {
    let app = test_app().await;
    let request = multipart_request(
        "/api/v1/pdf/split",
        None,
        vec![
            Part::File("file", "book.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0); 2])),
            Part::Text("pages", "4"),
        ],
    );
    expect_json(app.send(request).await, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_page_numbers_and_text() {
    let app = test_app().await;
    let numbered = app
        .send(multipart_request(
            "/api/v1/pdf/page-numbers",
            None,
            vec![
                Part::File("file", "a.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0); 2])),
                Part::Text("position", "bottom-right"),
            ],
        ))
        .await;
    assert_eq!(numbered.status(), StatusCode::OK);
    let bytes = body_bytes(numbered).await;

    let text = app
        .send(multipart_request(
            "/api/v1/pdf/extract-text",
            None,
            vec![Part::File("file", "numbered_a.pdf", "application/pdf", bytes)],
        ))
        .await;
    assert_eq!(text.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(text).await).unwrap();
    assert!(text.starts_with("--- Page 1 ---"));
    assert!(text.contains("2 / 2"));
}

#[tokio::test]
async fn test_metadata_counts_pages() {
    let app = test_app().await;
    let response = app
        .send(multipart_request(
            "/api/v1/pdf/metadata",
            None,
            vec![Part::File("file", "a.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0); 4]))],
        ))
        .await;
    let body = expect_json(response, StatusCode::OK).await;
    assert_eq!(body["pageCount"], 4);
}

#[tokio::test]
async fn test_images_without_supported_formats() {
    let app = test_app().await;
    let response = app
        .send(multipart_request(
            "/api/v1/pdf/images-to-pdf",
            None,
            vec![Part::File("images", "a.gif", "image/gif", b"GIF89a....".to_vec())],
        ))
        .await;
    let body = expect_json(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["error"], "No supported images provided");
}

async fn open_session(app: &TestApp) -> String {
    let response = app
        .send(multipart_request(
            "/api/v1/viewer/sessions",
            None,
            vec![Part::File("file", "notes.pdf", "application/pdf", sample_pdf(&[(612.0, 792.0), (300.0, 400.0)]))],
        ))
        .await;
    let body = expect_json(response, StatusCode::CREATED).await;
    assert_eq!(body["pageCount"], 2);
    assert_eq!(body["pages"][1]["width"], 300.0);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_viewer_annotate_undo_redo_export() {
    let app = test_app().await;
    let id = open_session(&app).await;
    let base = format!("/api/v1/viewer/sessions/{}", id);

    let stroke = json!({
        "page": 1,
        "tool": "pen",
        "points": [{"x": 0.1, "y": 0.1}, {"x": 0.5, "y": 0.5}, {"x": 0.9, "y": 0.2}]
    });
    let added = expect_json(
        app.send(json_request("POST", &format!("{}/strokes", base), None, stroke)).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(added["strokes"].as_array().unwrap().len(), 1);
    assert_eq!(added["canUndo"], true);

    let undone = expect_json(
        app.send(json_request("POST", &format!("{}/undo", base), None, json!({}))).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(undone["moved"], true);
    assert_eq!(undone["canRedo"], true);

    let redone = expect_json(
        app.send(json_request("POST", &format!("{}/redo", base), None, json!({}))).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(redone["annotations"]["1"].as_array().unwrap().len(), 1);

    let overlay = app
        .send(get(&format!("{}/pages/1/overlay?scale=1&rotation=90", base), None))
        .await;
    assert_eq!(overlay.status(), StatusCode::OK);
    assert_eq!(overlay.headers()[header::CONTENT_TYPE], "image/png");
    let png = body_bytes(overlay).await;
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

    let exported = app.send(get(&format!("{}/export", base), None)).await;
    assert_eq!(exported.status(), StatusCode::OK);
    assert_eq!(
        exported.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"annotated_notes.pdf\""
    );
    assert_eq!(page_count(&body_bytes(exported).await), 2);
}

#[tokio::test]
async fn test_viewer_erase_and_bounds() {
    let app = test_app().await;
    let id = open_session(&app).await;
    let base = format!("/api/v1/viewer/sessions/{}", id);

    let stroke = json!({"page": 2, "tool": "highlighter", "points": [{"x": 0.2, "y": 0.5}, {"x": 0.8, "y": 0.5}]});
    app.send(json_request("POST", &format!("{}/strokes", base), None, stroke)).await;

    let miss = expect_json(
        app.send(json_request("POST", &format!("{}/erase", base), None, json!({"page": 2, "x": 0.5, "y": 0.9})))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(miss["changed"], false);

    let hit = expect_json(
        app.send(json_request("POST", &format!("{}/erase", base), None, json!({"page": 2, "x": 0.8, "y": 0.51})))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(hit["changed"], true);
    assert!(hit["strokes"].as_array().unwrap().is_empty());

    let out_of_range = json!({"page": 3, "tool": "pen", "points": [{"x": 0.1, "y": 0.1}]});
    expect_json(
        app.send(json_request("POST", &format!("{}/strokes", base), None, out_of_range)).await,
        StatusCode::BAD_REQUEST,
    )
    .await;

    let bad_zoom = app.send(get(&format!("{}/pages/1/overlay?scale=9", base), None)).await;
    assert_eq!(bad_zoom.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_viewer_goto_and_close() {
    let app = test_app().await;
    let id = open_session(&app).await;
    let base = format!("/api/v1/viewer/sessions/{}", id);

    let state = expect_json(
        app.send(json_request("POST", &format!("{}/goto", base), None, json!({"page": 2}))).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(state["currentPage"], 2);
    assert!(state["scrollTop"].as_f64().unwrap() > 0.0);

    let close = Request::builder()
        .method("DELETE")
        .uri(&base)
        .body(Body::empty())
        .unwrap();
    expect_json(app.send(close).await, StatusCode::OK).await;
    expect_json(app.send(get(&base, None)).await, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = test_app().await;
    let response = app.send(get("/api/v1/viewer/sessions/not-a-uuid", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pdf_to_images_zip() {
    let app = test_app().await;
    let response = app
        .send(multipart_request(
            "/api/v1/pdf/to-images",
            None,
            vec![
                Part::File("file", "a.pdf", "application/pdf", sample_pdf(&[(100.0, 50.0), (60.0, 80.0)])),
                Part::Text("format", "png"),
                Part::Text("scale", "1"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");

    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(body_bytes(response).await)).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["page-1.png", "page-2.png"]);

    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut zip.by_name("page-1.png").unwrap(), &mut data).unwrap();
    let image = image::load_from_memory(&data).unwrap();
    assert_eq!((image.width(), image.height()), (100, 50));
}

#[tokio::test]
async fn test_pdf_to_images_rejects_bad_options() {
    let app = test_app().await;
    for (field, value) in [("format", "gif"), ("scale", "40")] {
        let response = app
            .send(multipart_request(
                "/api/v1/pdf/to-images",
                None,
                vec![
                    Part::File("file", "a.pdf", "application/pdf", sample_pdf(&[(100.0, 50.0)])),
                    Part::Text(field, value),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}={}", field, value);
    }
}

#[tokio::test]
async fn test_viewer_page_image() {
    let app = test_app().await;
    let id = open_session(&app).await;
    let base = format!("/api/v1/viewer/sessions/{}", id);

    let response = app
        .send(get(&format!("{}/pages/2/image?scale=1&rotation=90", base), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let image = image::load_from_memory(&body_bytes(response).await).unwrap();
    // 300x400 points at 1.5 px per point, turned sideways
    assert_eq!((image.width(), image.height()), (600, 450));

    let missing = app.send(get(&format!("{}/pages/3/image", base), None)).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}
