//! Structural PDF tools
//!
//! Every route takes a multipart upload and answers with the resulting
//! document as an attachment. The work runs on the blocking pool.

use std::collections::HashMap;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Response,
    routing::post,
    Json, Router,
};
use lopdf::Document;
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::pdf::{
    self, add_page_numbers, extract_pages, extract_text, images_to_pdf, load_document, merge,
    metadata, parse_page_range, pdf_to_images, reorder, rotate_all, save_document, sign,
    watermark, PageNumberPosition, PdfMetadata, RasterFormat, SignaturePlacement,
    WatermarkOptions, EXPORT_SCALE,
};
use crate::routes::{attachment, pdf_attachment, MultipartForm, UploadedFile};
use crate::state::AppState;
use crate::storage::validate_pdf_upload;

pub fn router(max_upload_mb: usize) -> Router<AppState> {
    Router::new()
        .route("/merge", post(merge_pdfs))
        .route("/split", post(split_pdf))
        .route("/rotate", post(rotate_pdf))
        .route("/organize", post(organize_pdf))
        .route("/watermark", post(watermark_pdf))
        .route("/page-numbers", post(number_pages))
        .route("/sign", post(sign_pdf))
        .route("/images-to-pdf", post(convert_images))
        .route("/extract-text", post(extract_pdf_text))
        .route("/metadata", post(read_metadata))
        .route("/to-images", post(convert_to_images))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}

/// Run CPU-bound PDF work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> pdf::PdfResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("PDF worker failed: {}", e)))?
        .map_err(AppError::from)
}

fn checked_pdf(file: UploadedFile, max_mb: usize) -> Result<UploadedFile> {
    validate_pdf_upload(&file.file_name, &file.content_type, file.bytes.len(), max_mb)?;
    Ok(file)
}

/// The single PDF sent as `file`
fn single_pdf(state: &AppState, form: &mut MultipartForm) -> Result<UploadedFile> {
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    checked_pdf(file, state.config().server.max_upload_mb)
}

fn json_field<T: DeserializeOwned>(form: &MultipartForm, name: &str) -> Result<Option<T>> {
    form.text(name)
        .map(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", name, e)))
        })
        .transpose()
}

fn int_field(form: &MultipartForm, name: &str) -> Result<Option<i64>> {
    form.text(name)
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", name, raw)))
        })
        .transpose()
}

/// Load, transform and save a single uploaded PDF
async fn transform<F>(file: UploadedFile, prefix: &str, work: F) -> Result<Response>
where
    F: FnOnce(Document) -> pdf::PdfResult<Document> + Send + 'static,
{
    let size = file.bytes.len();
    let bytes = blocking(move || save_document(work(load_document(&file.bytes)?)?)).await?;
    let name = format!("{}{}", prefix, file.file_name);

    tracing::info!(file_name = %name, input_size = size, output_size = bytes.len(), "PDF transformed");
    pdf_attachment(&name, bytes)
}

/// `files`: two or more PDFs, merged in upload order
async fn merge_pdfs(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let form = MultipartForm::read(multipart).await?;
    let max_mb = state.config().server.max_upload_mb;

    let files = form
        .files
        .into_iter()
        .filter(|f| f.field == "files" || f.field == "file")
        .map(|f| checked_pdf(f, max_mb))
        .collect::<Result<Vec<_>>>()?;
    if files.len() < 2 {
        return Err(AppError::BadRequest("Select at least two PDFs to merge".to_string()));
    }

    let count = files.len();
    let bytes = blocking(move || {
        let docs = files
            .iter()
            .map(|f| load_document(&f.bytes))
            .collect::<pdf::PdfResult<Vec<_>>>()?;
        save_document(merge(docs)?)
    })
    .await?;

    tracing::info!(files = count, size = bytes.len(), "Merged PDFs");
    pdf_attachment("merged.pdf", bytes)
}

/// `file` plus `pages`, a 1-based range list such as `1,3-5`
async fn split_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let range = form
        .text("pages")
        .ok_or_else(|| AppError::BadRequest("Missing page range".to_string()))?
        .to_string();

    transform(file, "split_", move |doc| {
        let indices = parse_page_range(&range, doc.get_pages().len())?;
        extract_pages(doc, &indices)
    })
    .await
}

/// `file` plus `degrees` (a multiple of 90, default 90)
async fn rotate_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let degrees = int_field(&form, "degrees")?.unwrap_or(90);

    transform(file, "rotated_", move |doc| rotate_all(doc, degrees)).await
}

/// `file` plus `order` (0-based page indices) and optional `rotations`
/// keyed by original page index
async fn organize_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let order: Vec<usize> = json_field(&form, "order")?
        .ok_or_else(|| AppError::BadRequest("Missing page order".to_string()))?;
    let rotations: HashMap<usize, i64> = json_field(&form, "rotations")?.unwrap_or_default();

    transform(file, "organized_", move |doc| reorder(doc, &order, &rotations)).await
}

/// `file` plus `text`, optional `color` and `opacity`
async fn watermark_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;

    let mut options = WatermarkOptions::new(
        form.text("text")
            .ok_or_else(|| AppError::BadRequest("Missing watermark text".to_string()))?,
    );
    if let Some(color) = form.text("color") {
        options.color = color.to_string();
    }
    if let Some(opacity) = form.text("opacity") {
        options.opacity = opacity
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid opacity: {}", opacity)))?;
    }

    transform(file, "watermarked_", move |doc| watermark(doc, &options)).await
}

/// `file` plus optional `position` (`bottom-left|bottom-center|bottom-right`)
async fn number_pages(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let position: PageNumberPosition = form.text("position").unwrap_or("").parse()?;

    transform(file, "numbered_", move |doc| add_page_numbers(doc, position)).await
}

/// `file`, a PNG `signature` and `placements`
async fn sign_pdf(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let signature = form
        .take_file("signature")
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing signature image".to_string()))?;
    let placements: Vec<SignaturePlacement> = json_field(&form, "placements")?
        .filter(|p: &Vec<SignaturePlacement>| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Place the signature on at least one page".to_string()))?;

    transform(file, "signed_", move |doc| sign(doc, &signature.bytes, &placements)).await
}

/// `images`: JPEG or PNG files, one page each
async fn convert_images(multipart: Multipart) -> Result<Response> {
    let form = MultipartForm::read(multipart).await?;
    let images: Vec<(String, Vec<u8>)> = form
        .files
        .into_iter()
        .filter(|f| !f.bytes.is_empty())
        .map(|f| (f.file_name, f.bytes))
        .collect();
    if images.is_empty() {
        return Err(AppError::BadRequest("No images provided".to_string()));
    }

    let count = images.len();
    let bytes = blocking(move || save_document(images_to_pdf(images)?)).await?;

    tracing::info!(images = count, size = bytes.len(), "Converted images to PDF");
    pdf_attachment("images.pdf", bytes)
}

async fn extract_pdf_text(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let stem = file
        .file_name
        .strip_suffix(".pdf")
        .unwrap_or(&file.file_name)
        .to_string();

    let text = blocking(move || Ok(extract_text(&load_document(&file.bytes)?))).await?;
    attachment(&format!("{}.txt", stem), "text/plain; charset=utf-8", text.into_bytes())
}

async fn read_metadata(State(state): State<AppState>, multipart: Multipart) -> Result<Json<PdfMetadata>> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;

    let info = blocking(move || Ok(metadata(&load_document(&file.bytes)?))).await?;
    Ok(Json(info))
}

/// `file` plus optional `format` (`jpeg` or `png`) and `scale` (pixels per
/// point, default 2); answers a ZIP of `page-{n}` images
async fn convert_to_images(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = single_pdf(&state, &mut form)?;
    let format: RasterFormat = form.text("format").unwrap_or("").parse()?;
    let scale = match form.text("scale") {
        Some(raw) => raw
            .parse::<f32>()
            .ok()
            .filter(|s| (0.1..=5.0).contains(s))
            .ok_or_else(|| AppError::BadRequest(format!("Invalid scale: {}", raw)))?,
        None => EXPORT_SCALE,
    };

    let size = file.bytes.len();
    let archive = blocking(move || pdf_to_images(&file.bytes, format, scale)).await?;

    tracing::info!(input_size = size, output_size = archive.len(), "Converted PDF to images");
    attachment("images.zip", "application/zip", archive)
}
