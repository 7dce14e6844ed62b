//! Daemon HTTP handlers.

use std::convert::Infallible;
use std::path::Path;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use smz_core::{run_flow, EventSink, RunInput, RunOptions};
use smz_models::{
    parse_timeout, path_is_within, RunEvent, RunState, SummaryLength,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

/// `POST /v1/summarize` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeBody {
    pub url: String,
    /// `url` (extract server-side) or `page` (client supplies the text).
    pub mode: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub truncated: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub max_characters: Option<usize>,
    #[serde(default)]
    pub extract_only: Option<bool>,
    #[serde(default)]
    pub timeout: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"ok": false, "error": message})),
    )
        .into_response()
}

/// Accept a summarize job.
pub async fn post_summarize(
    State(state): State<AppState>,
    Json(body): Json<SummarizeBody>,
) -> Response {
    let extract_only = body.extract_only.unwrap_or(false);
    match body.mode.as_str() {
        "url" => {}
        "page" => {
            if extract_only {
                return bad_request("extractOnly requires mode=url");
            }
            if body.text.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return bad_request("mode=page requires text");
            }
        }
        other => return bad_request(&format!("unknown mode '{other}'")),
    }

    let mut options = state.base_options.clone();
    options.extract_only = extract_only;
    if let Some(model) = &body.model {
        options.selector = Some(model.clone());
    }
    if let Some(length) = &body.length {
        match length.parse::<SummaryLength>() {
            Ok(parsed) => options.length = parsed,
            Err(e) => return bad_request(&e.to_string()),
        }
    }
    if let Some(language) = &body.language {
        options.language = Some(language.clone());
    }
    if let Some(prompt) = &body.prompt {
        options.custom_prompt = Some(prompt.clone());
    }
    if let Some(max) = body.max_characters {
        options.max_characters = max;
    }
    if let Some(raw) = &body.timeout {
        match parse_timeout(raw) {
            Some(timeout) => options.timeout = timeout,
            None => return bad_request(&format!("bad timeout '{raw}'")),
        }
    }

    let input = if body.mode == "page" {
        RunInput::Page {
            url: body.url.clone(),
            title: body.title.clone().unwrap_or_default(),
            text: body.text.clone().unwrap_or_default(),
            truncated: body.truncated.unwrap_or(false),
        }
    } else {
        RunInput::Target(body.url.clone())
    };

    let id = state.runs.create(&body.url, state.ctx.now_ms()).await;
    spawn_run(state.clone(), id.clone(), options, input);

    (StatusCode::OK, Json(json!({"ok": true, "id": id}))).into_response()
}

/// Run one job on a dedicated task, translating its lifecycle into events.
fn spawn_run(state: AppState, id: String, options: RunOptions, input: RunInput) {
    tokio::spawn(async move {
        state.runs.set_state(&id, RunState::Running).await;

        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<RunEvent>();
        let sink: EventSink = Arc::new(move |event| {
            let _ = event_tx.send(event);
        });

        // Single writer: this forwarder owns the run's event order.
        let forwarder = {
            let runs = Arc::clone(&state.runs);
            let id = id.clone();
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    runs.append(&id, event).await;
                }
            })
        };

        let outcome = run_flow(&state.ctx, &state.services, &options, input, sink).await;

        match outcome {
            Ok(outcome) => {
                info!(run_id = %id, from_cache = outcome.summary_from_cache, "Run finished");
                // run_flow dropped the sink, closing the channel; wait for
                // the forwarder to drain so ordering stays single-writer.
                let _ = forwarder.await;
                state.runs.append(&id, RunEvent::Done {}).await;
                state.runs.set_state(&id, RunState::Done).await;
            }
            Err(e) => {
                error!(run_id = %id, error = %e, "Run failed");
                let _ = forwarder.await;
                state
                    .runs
                    .append(
                        &id,
                        RunEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                state.runs.append(&id, RunEvent::Done {}).await;
                state.runs.set_state(&id, RunState::Failed).await;
            }
        }
    });
}

/// `GET /v1/summarize/{id}/events`: the only subscription method.
pub async fn get_events(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    let Some(subscription) = state.runs.subscribe(&id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "unknown run"})),
        )
            .into_response();
    };

    let stream = async_stream_events(subscription);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn event_frame(event: &RunEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.data_json().to_string())
}

fn async_stream_events(
    subscription: crate::runs::Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let replay = subscription.replay;
    let live = subscription.live;

    futures::stream::unfold(
        (replay.into_iter(), live, false),
        |(mut replay, mut live, mut done)| async move {
            if done {
                return None;
            }
            // Drain the replay first; it already ends with `done` for
            // finished runs.
            if let Some(event) = replay.next() {
                if matches!(event, RunEvent::Done {}) {
                    done = true;
                }
                return Some((Ok(event_frame(&event)), (replay, live, done)));
            }
            // Then follow the live feed until `done`.
            loop {
                match live.as_mut()?.recv().await {
                    Ok(event) => {
                        if matches!(event, RunEvent::Done {}) {
                            done = true;
                        }
                        return Some((Ok(event_frame(&event)), (replay, live, done)));
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    )
}

/// `GET /v1/slides/{source_id}/{index}`: serve one slide image.
///
/// The resolved path must stay inside the configured slides directory.
pub async fn get_slide_image(
    State(state): State<AppState>,
    UrlPath((source_id, index)): UrlPath<(String, u32)>,
) -> Response {
    // Reject path-segment tricks in the source id outright.
    if source_id.contains("..") || source_id.contains('/') || source_id.contains('\\') {
        return bad_request("invalid source id");
    }

    let dir = state.slides_root.join(&source_id);
    let manifest_path = dir.join("slides.json");
    let Ok(raw) = tokio::fs::read(&manifest_path).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "no slides for source"})),
        )
            .into_response();
    };
    let Ok(manifest) = serde_json::from_slice::<smz_models::SlideExtractionResult>(&raw) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "manifest unreadable"})),
        )
            .into_response();
    };

    let Some(slide) = manifest.slides.iter().find(|s| s.index == index) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "no such slide"})),
        )
            .into_response();
    };

    let image = if slide.image_path.is_absolute() {
        slide.image_path.clone()
    } else {
        dir.join(&slide.image_path)
    };
    if !path_is_within(&image, &state.slides_root) {
        return bad_request("slide path escapes the slides directory");
    }

    match tokio::fs::read(&image).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_for(&image))],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "image missing"})),
        )
            .into_response(),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `GET /v1/slides/{run_id}/snapshot`: final manifest once available.
pub async fn get_slides_snapshot(
    State(state): State<AppState>,
    UrlPath(run_id): UrlPath<String>,
) -> Response {
    let Some(snapshot) = state.runs.snapshot(&run_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "unknown run"})),
        )
            .into_response();
    };

    match snapshot.slides_manifest {
        Some(manifest) => {
            (StatusCode::OK, Json(json!({"ok": true, "slides": manifest}))).into_response()
        }
        None => (
            StatusCode::ACCEPTED,
            Json(json!({"ok": false, "pending": true})),
        )
            .into_response(),
    }
}

/// `GET /healthz`: unauthenticated liveness ping.
pub async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// `GET /v1/status`: small read-only status surface.
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "version": state.version,
        "isIdle": state.runs.is_idle().await,
        "activeRuns": state.runs.active_count().await,
    }))
}
