//! Survey endpoints.
//!
//! - `POST /api/chat`      — free chat, optionally grounded in a stored file
//! - `POST /api/pdf-start` — upload a document and get the opening reply
//! - `POST /api/pdf-turn`  — follow-up question about a stored document
//! - `GET  /health`        — liveness
//!
//! The JSON endpoints accept any body: anything that is not a JSON object is
//! read as `{}`, and fields with the wrong type are ignored.

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::rejection::BytesRejection;
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::Json;
use serde::Serialize;
use serde_json::{Map, Value};
use surveychat_core::assembler::AssemblyInput;
use surveychat_core::message::Conversation;
use surveychat_core::prompt::FileHandle;
use surveychat_core::provider::UploadDocument;
use surveychat_core::relay::TurnOutcome;
use tracing::debug;

use crate::SharedState;
use crate::error::{ApiError, ErrorResponse};

// --- Request parsing ---

/// Fields shared by the JSON endpoints.
#[derive(Debug, Default)]
struct TurnRequest {
    conversation: Conversation,
    file_id: Option<FileHandle>,
    model: Option<String>,
    survey_context: Option<Value>,
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl TurnRequest {
    fn parse(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                if !body.is_empty() {
                    debug!(bytes = body.len(), "Request body is not a JSON object");
                }
                return Self::default();
            }
        };

        Self {
            conversation: Conversation::from_json_lenient(value.get("conversation")),
            file_id: non_empty_str(value.get("file_id")).map(FileHandle::new),
            model: non_empty_str(value.get("model")),
            survey_context: value
                .get("embedded_data")
                .or_else(|| value.get("embeddedData"))
                .filter(|v| v.is_object())
                .cloned(),
        }
    }
}

/// Contents of a `/api/pdf-start` form.
#[derive(Debug, Default)]
struct UploadForm {
    document: Option<UploadDocument>,
    conversation: Conversation,
    model: Option<String>,
    survey_fields: Map<String, Value>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(ApiError::multipart)? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" || field.file_name().is_some() {
                // The first file wins; later ones are drained and dropped.
                if form.document.is_some() {
                    field.bytes().await.map_err(ApiError::multipart)?;
                    continue;
                }
                let filename = field.file_name().map(String::from);
                let mime_type = declared_mime_type(&field)?;
                let bytes = field.bytes().await.map_err(ApiError::multipart)?;
                form.document = Some(UploadDocument::new(filename, mime_type, bytes.to_vec()));
                continue;
            }

            let text = field.text().await.map_err(ApiError::multipart)?;
            match name.as_str() {
                "conversation" => {
                    let parsed = serde_json::from_str::<Value>(&text).ok();
                    form.conversation = Conversation::from_json_lenient(parsed.as_ref());
                }
                "model" => form.model = non_empty_str(Some(&Value::String(text))),
                "" => {}
                _ => {
                    form.survey_fields.insert(name, Value::String(text));
                }
            }
        }

        Ok(form)
    }

    fn survey_context(&self) -> Option<Value> {
        (!self.survey_fields.is_empty()).then(|| Value::Object(self.survey_fields.clone()))
    }
}

/// The part's media type. A missing or blank header falls back to the
/// upload default; one that does not parse is the caller's mistake.
fn declared_mime_type(field: &Field<'_>) -> Result<Option<String>, ApiError> {
    if let Some(mime) = field.content_type() {
        return Ok(Some(mime.to_string()));
    }
    let raw = field
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
        .unwrap_or_default();
    if raw.is_empty() {
        Ok(None)
    } else {
        Err(ApiError::validation(format!("Unsupported file type: {raw}")))
    }
}

// --- Handlers ---

pub(crate) async fn chat(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let body = body.map_err(ApiError::body)?;
    let request = TurnRequest::parse(&body);
    let model = request.model.as_deref().unwrap_or(&state.default_model);

    let input = AssemblyInput::new(&request.conversation)
        .with_file(request.file_id.as_ref())
        .with_survey_context(request.survey_context.as_ref());

    let outcome = state.relay.run_turn(&state.chat, model, input).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub(crate) struct PdfStartResponse {
    file_id: FileHandle,
    reply: String,
    conversation: Conversation,
}

pub(crate) async fn pdf_start(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PdfStartResponse>, ApiError> {
    let mut form = match multipart {
        Ok(multipart) => UploadForm::read(multipart).await?,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Request is not a multipart form");
            UploadForm::default()
        }
    };

    let Some(document) = form.document.take() else {
        return Err(ApiError::validation("No PDF uploaded"));
    };

    let file_id = state.relay.upload(document).await?;

    let survey_context = form.survey_context();
    let model = form.model.as_deref().unwrap_or(&state.default_model);
    let input = AssemblyInput::new(&form.conversation)
        .with_file(Some(&file_id))
        .with_survey_context(survey_context.as_ref())
        .with_opening_prompt(Some(state.opening_prompt.as_str()));

    let TurnOutcome {
        reply,
        conversation,
    } = state.relay.run_turn(&state.pdf_start, model, input).await?;

    Ok(Json(PdfStartResponse {
        file_id,
        reply,
        conversation,
    }))
}

pub(crate) async fn pdf_turn(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let body = body.map_err(ApiError::body)?;
    let request = TurnRequest::parse(&body);
    let Some(file_id) = request.file_id.as_ref() else {
        return Err(ApiError::validation("Missing file_id"));
    };
    let model = request.model.as_deref().unwrap_or(&state.default_model);

    let input = AssemblyInput::new(&request.conversation).with_file(Some(file_id));

    let outcome = state.relay.run_turn(&state.pdf_turn, model, input).await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) async fn method_not_allowed() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new("Method Not Allowed")),
    )
}
