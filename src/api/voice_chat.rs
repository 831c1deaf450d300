//! The voice-chat endpoint
//!
//! `POST /api/voice-chat` accepts either `multipart/form-data` carrying a
//! recorded `audio` blob, or an `application/json` body carrying raw text.
//! Both forms may include serialized history and page context. The handler
//! resolves the input, runs the orchestration pipeline, and returns the
//! transcript, reply text, and base64 synthesized audio.
//!
//! Every response carries CORS headers. The allowed origin comes from
//! configuration, falling back to echoing the request's origin, falling
//! back to a wildcard — which is why the headers are built per response
//! here instead of via a static CORS layer.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::Engine as _;
use serde::Serialize;

use super::ApiState;
use crate::pipeline::TurnInput;
use crate::Error;

/// Build the voice-chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/api/voice-chat",
            post(voice_chat)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .with_state(state)
}

/// Successful turn response
#[derive(Debug, Serialize)]
pub struct VoiceChatResponse {
    pub user_text: String,
    pub assistant_text: String,
    pub audio_base64: String,
    pub audio_mime: String,
}

type CorsHeaders = [(HeaderName, HeaderValue); 3];

/// CORS headers for one response: configured origin, else the request's
/// origin, else a wildcard
fn cors_headers(origin: Option<&HeaderValue>, allow_origin: Option<&str>) -> CorsHeaders {
    let allow = allow_origin
        .and_then(|o| HeaderValue::from_str(o).ok())
        .or_else(|| origin.cloned())
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, allow),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST,OPTIONS"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ),
    ]
}

fn json_error(status: StatusCode, message: &str, cors: &CorsHeaders) -> Response {
    (
        status,
        cors.clone(),
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Preflight check: no body, CORS headers only
async fn preflight(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let cors = cors_headers(headers.get(header::ORIGIN), state.allow_origin.as_deref());
    (StatusCode::NO_CONTENT, cors).into_response()
}

/// Any method other than POST/OPTIONS
async fn method_not_allowed(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let cors = cors_headers(headers.get(header::ORIGIN), state.allow_origin.as_deref());
    json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", &cors)
}

/// The resolved request contents, independent of wire form
struct ResolvedRequest {
    input: TurnInput,
    history: Vec<serde_json::Value>,
    page_context: Option<String>,
}

async fn voice_chat(State(state): State<Arc<ApiState>>, request: Request) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let cors = cors_headers(origin.as_ref(), state.allow_origin.as_deref());

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let resolved = if content_type.contains("multipart/form-data") {
        read_multipart(request).await
    } else if content_type.contains("application/json") {
        read_json(request).await
    } else {
        return json_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported Content-Type",
            &cors,
        );
    };

    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err((status, message)) => return json_error(status, message, &cors),
    };

    let outcome = state
        .pipeline
        .run(
            resolved.input,
            &resolved.history,
            resolved.page_context.as_deref(),
        )
        .await;

    match outcome {
        Ok(outcome) => {
            let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&outcome.audio.bytes);
            (
                StatusCode::OK,
                cors,
                Json(VoiceChatResponse {
                    user_text: outcome.user_text,
                    assistant_text: outcome.assistant_text,
                    audio_base64,
                    audio_mime: outcome.audio.mime,
                }),
            )
                .into_response()
        }
        Err(Error::EmptyTranscript) => {
            json_error(StatusCode::BAD_REQUEST, "Empty transcript", &cors)
        }
        Err(e) => {
            tracing::error!(error = %e, "voice-chat turn failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), &cors)
        }
    }
}

/// Parse a multipart request: `audio` is required; `history` and
/// `page_context` are optional, and a history that fails to parse as JSON
/// is ignored rather than rejected
async fn read_multipart(
    request: Request,
) -> Result<ResolvedRequest, (StatusCode, &'static str)> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?;

    let mut audio: Option<TurnInput> = None;
    let mut history = Vec::new();
    let mut page_context = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return Err((StatusCode::BAD_REQUEST, "Malformed multipart body")),
        };

        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("audio") => {
                let filename = field
                    .file_name()
                    .map_or_else(|| "audio.webm".to_string(), ToString::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?;
                audio = Some(TurnInput::Audio {
                    bytes: bytes.to_vec(),
                    filename,
                });
            }
            Some("history") => {
                let raw = field.text().await.unwrap_or_default();
                if !raw.trim().is_empty() {
                    if let Ok(parsed) = serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
                        history = parsed;
                    }
                }
            }
            Some("page_context") => {
                page_context = field.text().await.ok().filter(|c| !c.is_empty());
            }
            _ => {}
        }
    }

    let Some(input) = audio else {
        return Err((StatusCode::BAD_REQUEST, "Missing audio field"));
    };

    Ok(ResolvedRequest {
        input,
        history,
        page_context,
    })
}

/// Parse a JSON request field by field; `text` is read when it is a
/// string, and a malformed `history` or `page_context` is ignored rather
/// than failing the request. A missing or blank text is rejected
/// downstream as an empty transcript.
async fn read_json(request: Request) -> Result<ResolvedRequest, (StatusCode, &'static str)> {
    let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "Unreadable request body"))?;

    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();

    let text = body
        .get("text")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let history = body
        .get("history")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();
    let page_context = body
        .get("page_context")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .filter(|c| !c.is_empty());

    Ok(ResolvedRequest {
        input: TurnInput::Text(text),
        history,
        page_context,
    })
}
