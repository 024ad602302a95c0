use axum::{
    extract::{Multipart, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{TailorError, TailorResult};
use crate::pipeline::{
    Mode, RerollOutcome, RerollRequest, TailorOutcome, TailorRequest, TailoredDocument,
};

use super::AppState;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const LINES_CHANGED_HEADER: &str = "x-lines-changed";
const TAILORING_APPLIED_HEADER: &str = "x-tailoring-applied";

/// Fields shared by both upload endpoints; each handler reads what it needs.
#[derive(Default)]
struct UploadForm {
    resume: Option<Vec<u8>>,
    file_name: Option<String>,
    job_description: String,
    mode: Option<String>,
    accepted: Option<String>,
    line_index: Option<String>,
    previous_suggestion: Option<String>,
}

impl UploadForm {
    fn take_document(&mut self) -> TailorResult<Vec<u8>> {
        self.resume
            .take()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| TailorError::InvalidInput("no file uploaded".to_string()))
    }
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> TailorError {
    TailorError::InvalidInput(format!("invalid multipart body: {e}"))
}

async fn read_form(mut multipart: Multipart) -> TailorResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                form.file_name = field.file_name().map(str::to_string);
                form.resume = Some(field.bytes().await.map_err(bad_multipart)?.to_vec());
            }
            "jobDescription" => form.job_description = field.text().await.map_err(bad_multipart)?,
            "mode" => form.mode = Some(field.text().await.map_err(bad_multipart)?),
            "acceptedReplacements" => {
                form.accepted = Some(field.text().await.map_err(bad_multipart)?)
            }
            "lineIndex" => form.line_index = Some(field.text().await.map_err(bad_multipart)?),
            "previousSuggestion" => {
                form.previous_suggestion = Some(field.text().await.map_err(bad_multipart)?)
            }
            _ => {}
        }
    }
    Ok(form)
}

/// GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-tailor"
    }))
}

/// POST /api/tailor
pub async fn handle_tailor(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, TailorError> {
    let mut form = read_form(multipart).await?;
    let document = form.take_document()?;
    let mode = Mode::parse(form.mode.as_deref(), form.accepted.as_deref())?;
    info!(
        bytes = document.len(),
        file = form.file_name.as_deref().unwrap_or("-"),
        mode = form.mode.as_deref().unwrap_or("tailor"),
        "tailor request"
    );

    let outcome = state
        .pipeline
        .run(TailorRequest {
            document,
            file_name: form.file_name,
            job_description: form.job_description,
            mode,
        })
        .await?;

    Ok(match outcome {
        TailorOutcome::Document(doc) => document_response(doc),
        TailorOutcome::Preview(payload) => Json(payload).into_response(),
    })
}

/// POST /api/tailor/reroll
pub async fn handle_reroll(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<RerollOutcome>, TailorError> {
    let mut form = read_form(multipart).await?;
    let document = form.take_document()?;
    let line_index = form
        .line_index
        .as_deref()
        .map(str::trim)
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            TailorError::InvalidInput("lineIndex must be a non-negative integer".to_string())
        })?;

    let outcome = state
        .pipeline
        .reroll(RerollRequest {
            document,
            file_name: form.file_name,
            job_description: form.job_description,
            line_index,
            previous_suggestion: form.previous_suggestion,
        })
        .await?;
    Ok(Json(outcome))
}

fn document_response(doc: TailoredDocument) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(DOCX_CONTENT_TYPE));
    let disposition = format!(
        "attachment; filename=\"{}\"",
        doc.file_name.replace(['"', '\\'], "")
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).unwrap_or_else(|_| {
            HeaderValue::from_static("attachment; filename=\"resume_tailored.docx\"")
        }),
    );
    headers.insert(
        HeaderName::from_static(LINES_CHANGED_HEADER),
        HeaderValue::from(doc.lines_changed),
    );
    headers.insert(
        HeaderName::from_static(TAILORING_APPLIED_HEADER),
        HeaderValue::from_static(if doc.applied { "true" } else { "false" }),
    );
    (StatusCode::OK, headers, doc.bytes).into_response()
}
