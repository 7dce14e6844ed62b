//! The slide-extraction pipeline.
//!
//! Stage order: prepare dir → acquire source → probe → calibrate → segmented
//! parallel detection → select → parallel frame extraction → refinement →
//! rename → optional OCR → manifest. YouTube sources detect against a live
//! stream URL and extract from a local download; a stream-stage failure
//! triggers a one-time fallback to a full download and a retry of the failed
//! stage.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use smz_media::{
    detect_scenes, download_video, extract_frame, frame_stats, probe_media, resolve_stream_url,
    FrameStats, ToolPaths, DEFAULT_YTDLP_FORMAT,
};
use smz_models::{
    is_youtube_url, media_source_id, slides_dir_id, AutoTuneInfo, SlideExtractionResult,
    SlideFrame, SlideSettings, SourceKind,
};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::calibrate::{calibrate, THRESHOLD_MIN};
use crate::error::{SlidesError, SlidesResult};
use crate::lock::DirLocks;
use crate::manifest::{load_validated_manifest, write_manifest, ManifestExpectations};
use crate::ocr::ocr_slide;
use crate::progress::{Phase, ProgressTracker, SlidesProgress};
use crate::refine::{accept_candidate, is_dim, probe_offsets};
use crate::segment::{merge_segment_detections, plan_segments};
use crate::select::select_timestamps;

/// Progress callback; invoked from pipeline tasks.
pub type ProgressFn = Arc<dyn Fn(SlidesProgress) + Send + Sync>;

/// Per-stage subprocess timeouts.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const CALIBRATE_TIMEOUT: Duration = Duration::from_secs(45);
const DETECT_TIMEOUT: Duration = Duration::from_secs(600);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(90);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(1800);
const OCR_TIMEOUT: Duration = Duration::from_secs(60);

/// One slide-extraction request.
#[derive(Debug, Clone)]
pub struct SlidesRequest {
    /// Video page URL, direct media URL, or local file path.
    pub source_url: String,
    /// Parent directory; slides land in `<output_dir>/<source_id>`.
    pub output_dir: PathBuf,
    pub settings: SlideSettings,
    /// yt-dlp format override (`SUMMARIZE_SLIDES_YTDLP_FORMAT`).
    pub ytdlp_format: Option<String>,
    /// Extract frames from the stream URL instead of a download
    /// (`SUMMARIZE_SLIDES_EXTRACT_STREAM`).
    pub extract_from_stream: bool,
}

/// Inputs for the detect and extract stages, plus temp-dir ownership.
struct SourceHandles {
    detect_input: String,
    extract_input: String,
    /// Keeps a download alive for the run; removed on drop on every exit
    /// path, success, failure or cancellation.
    _download_dir: Option<TempDir>,
    /// Whether `extract_input` is a live stream that can still fall back to
    /// a download.
    extract_is_stream: bool,
}

struct PipelineCtx<'a> {
    tools: &'a ToolPaths,
    request: &'a SlidesRequest,
    tracker: Arc<ProgressTracker>,
    progress: ProgressFn,
    warnings: Vec<String>,
}

impl PipelineCtx<'_> {
    fn report(&self, phase: Phase, fraction: f64) {
        (self.progress)(self.tracker.observe(phase, fraction));
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(warning = %message, "Slide pipeline warning");
        self.warnings.push(message);
    }
}

/// Run the full pipeline for one source.
pub async fn extract_slides(
    tools: &ToolPaths,
    locks: &DirLocks,
    request: &SlidesRequest,
    progress: ProgressFn,
) -> SlidesResult<SlideExtractionResult> {
    let source_kind = if is_youtube_url(&request.source_url) {
        SourceKind::Youtube
    } else {
        SourceKind::Direct
    };
    let source_id = media_source_id(&request.source_url);
    let slides_dir = request.output_dir.join(&source_id);

    let tracker = Arc::new(ProgressTracker::new());
    let (guard, queued) = locks.acquire(&slides_dir).await;
    if queued {
        progress(SlidesProgress {
            phase: "prepare",
            percent: 0,
            queued: true,
        });
    }
    let _guard = guard;

    // Readers first try a validated cache.
    let expectations = ManifestExpectations {
        source_url: request.source_url.clone(),
        source_kind,
        source_id: source_id.clone(),
        output_dir: request.output_dir.clone(),
        settings: request.settings.clone(),
    };
    if let Some(cached) = load_validated_manifest(&expectations).await {
        info!(source_id = %source_id, "Reusing cached slide manifest");
        progress(tracker.observe(Phase::Finalize, 1.0));
        return Ok(cached);
    }

    let mut ctx = PipelineCtx {
        tools,
        request,
        tracker: Arc::clone(&tracker),
        progress: Arc::clone(&progress),
        warnings: Vec::new(),
    };

    // Writers truncate before producing.
    prepare_dir(&slides_dir).await?;
    ctx.report(Phase::Prepare, 1.0);

    ctx.report(Phase::Fetch, 0.5);
    let mut source = acquire_source(&mut ctx, source_kind).await?;
    ctx.report(Phase::Download, 1.0);

    let probe_input = source.extract_input.clone();
    let info = probe_media(tools, &probe_input, PROBE_TIMEOUT).await?;
    debug!(duration = info.duration, width = info.width, height = info.height, "Probed source");

    let auto_tune = match request.settings.scene_threshold {
        Some(fixed) => AutoTuneInfo {
            enabled: false,
            chosen_threshold: fixed,
            confidence: 1.0,
            strategy: "none".to_string(),
        },
        None => {
            calibrate(
                tools,
                &source.detect_input,
                info.duration,
                request.settings.clamped_samples(),
                CALIBRATE_TIMEOUT,
            )
            .await?
        }
    };

    let detections = detect_with_retry(&mut ctx, &source, info.duration, auto_tune.chosen_threshold)
        .await?;
    ctx.report(Phase::Detect, 1.0);

    let timestamps = select_timestamps(
        &detections,
        info.duration,
        request.settings.min_slide_duration,
        request.settings.max_slides,
    );
    if timestamps.is_empty() {
        return Err(SlidesError::NoFrames);
    }
    info!(
        detections = detections.len(),
        selected = timestamps.len(),
        threshold = auto_tune.chosen_threshold,
        "Selected slide timestamps"
    );

    let mut extracted = extract_all(&ctx, &source.extract_input, &timestamps, &slides_dir).await;

    // A stream-mode failure triggers a one-time fall-back to a full
    // download, retrying the extract stage.
    let any_failed = extracted.iter().any(|r| r.is_none());
    if any_failed && source.extract_is_stream {
        ctx.warn("stream extraction failed; retrying from a full download");
        let dir = TempDir::new()?;
        let format = ctx
            .request
            .ytdlp_format
            .clone()
            .unwrap_or_else(|| DEFAULT_YTDLP_FORMAT.to_string());
        let file = download_video(
            tools,
            &request.source_url,
            &format,
            dir.path(),
            DOWNLOAD_TIMEOUT,
        )
        .await?;
        source.extract_input = file.to_string_lossy().to_string();
        source.extract_is_stream = false;
        source._download_dir = Some(dir);
        extracted = extract_all(&ctx, &source.extract_input, &timestamps, &slides_dir).await;
    }

    let mut slides: Vec<(f64, PathBuf, FrameStats, Option<u32>)> = Vec::new();
    for (idx, result) in extracted.into_iter().enumerate() {
        match result {
            Some((ts, path, stats)) => slides.push((ts, path, stats, None)),
            None => ctx.warn(format!(
                "frame at {:.1}s could not be extracted",
                timestamps[idx]
            )),
        }
    }
    if slides.is_empty() {
        return Err(SlidesError::NoFrames);
    }
    ctx.report(Phase::Extract, 1.0);

    refine_all(&ctx, &source.extract_input, info.duration, &mut slides).await;
    ctx.report(Phase::Refine, 1.0);

    // Sort by timestamp, enforce the cap, rename with embedded timestamps,
    // and re-index from 1.
    slides.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    while slides.len() > request.settings.max_slides as usize {
        if let Some((_, path, _, _)) = slides.pop() {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    let mut frames = Vec::with_capacity(slides.len());
    for (i, (ts, path, _stats, image_version)) in slides.into_iter().enumerate() {
        let index = i as u32 + 1;
        let final_name = format!("slide_{:04}_{}s.png", index, ts.round() as u64);
        let final_path = slides_dir.join(&final_name);
        if path != final_path {
            tokio::fs::rename(&path, &final_path).await?;
        }
        frames.push(SlideFrame {
            index,
            timestamp: ts,
            image_path: PathBuf::from(final_name),
            image_version,
            ocr_text: None,
            ocr_confidence: None,
        });
    }

    let ocr_available = tools.ocr_available();
    if request.settings.ocr {
        if ocr_available {
            ocr_all(&ctx, &slides_dir, &mut frames).await;
        } else {
            ctx.warn("OCR requested but tesseract is not available");
        }
    }
    ctx.report(Phase::Ocr, 1.0);

    let result = SlideExtractionResult {
        source_url: request.source_url.clone(),
        source_kind,
        source_id,
        slides_dir_id: slides_dir_id(&slides_dir),
        slides_dir,
        scene_threshold: auto_tune.chosen_threshold,
        auto_tune,
        max_slides: request.settings.max_slides,
        min_slide_duration: request.settings.min_slide_duration,
        ocr_requested: request.settings.ocr,
        ocr_available,
        slides: frames,
        warnings: ctx.warnings,
    };

    write_manifest(&result).await?;
    progress(tracker.observe(Phase::Finalize, 1.0));
    Ok(result)
}

/// Create the slides dir and drop stale images from an earlier run.
async fn prepare_dir(slides_dir: &PathBuf) -> SlidesResult<()> {
    tokio::fs::create_dir_all(slides_dir).await?;
    let mut entries = tokio::fs::read_dir(slides_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let stale = path
            .extension()
            .is_some_and(|e| e == "png" || e == "json" || e == "tmp");
        if stale {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }
    Ok(())
}

/// Resolve detect/extract inputs for the source.
async fn acquire_source(
    ctx: &mut PipelineCtx<'_>,
    source_kind: SourceKind,
) -> SlidesResult<SourceHandles> {
    let request = ctx.request;
    if source_kind == SourceKind::Direct {
        // Direct URLs and local files feed ffmpeg as-is for both stages.
        return Ok(SourceHandles {
            detect_input: request.source_url.clone(),
            extract_input: request.source_url.clone(),
            _download_dir: None,
            extract_is_stream: request.source_url.starts_with("http"),
        });
    }

    // YouTube: a stream URL is enough for detection, and for extraction too
    // when stream extraction is enabled; otherwise download up front.
    let stream = resolve_stream_url(
        ctx.tools,
        &request.source_url,
        stream_format(request),
        PROBE_TIMEOUT,
    )
    .await;

    match stream {
        Ok(stream_url) if request.extract_from_stream => Ok(SourceHandles {
            detect_input: stream_url.clone(),
            extract_input: stream_url,
            _download_dir: None,
            extract_is_stream: true,
        }),
        Ok(stream_url) => {
            let dir = TempDir::new()?;
            let format = request
                .ytdlp_format
                .clone()
                .unwrap_or_else(|| DEFAULT_YTDLP_FORMAT.to_string());
            let file = download_video(
                ctx.tools,
                &request.source_url,
                &format,
                dir.path(),
                DOWNLOAD_TIMEOUT,
            )
            .await?;
            Ok(SourceHandles {
                detect_input: stream_url,
                extract_input: file.to_string_lossy().to_string(),
                _download_dir: Some(dir),
                extract_is_stream: false,
            })
        }
        Err(e) => {
            // No stream URL: fall back to a download for both stages.
            ctx.warn(format!("stream resolution failed ({e}); downloading"));
            let dir = TempDir::new()?;
            let format = request
                .ytdlp_format
                .clone()
                .unwrap_or_else(|| DEFAULT_YTDLP_FORMAT.to_string());
            let file = download_video(
                ctx.tools,
                &request.source_url,
                &format,
                dir.path(),
                DOWNLOAD_TIMEOUT,
            )
            .await?;
            let input = file.to_string_lossy().to_string();
            Ok(SourceHandles {
                detect_input: input.clone(),
                extract_input: input,
                _download_dir: Some(dir),
                extract_is_stream: false,
            })
        }
    }
}

fn stream_format(request: &SlidesRequest) -> &str {
    request
        .ytdlp_format
        .as_deref()
        .unwrap_or(smz_media::download::DEFAULT_STREAM_FORMAT)
}

/// Segmented parallel detection with a one-time halved-threshold retry.
async fn detect_with_retry(
    ctx: &mut PipelineCtx<'_>,
    source: &SourceHandles,
    duration: f64,
    threshold: f64,
) -> SlidesResult<Vec<f64>> {
    let detections = detect_segmented(ctx, &source.detect_input, duration, threshold).await?;
    if !detections.is_empty() {
        return Ok(detections);
    }

    let halved = (threshold / 2.0).max(THRESHOLD_MIN);
    ctx.warn(format!(
        "no scene changes at threshold {threshold:.3}; retrying at {halved:.3}"
    ));
    detect_segmented(ctx, &source.detect_input, duration, halved).await
}

async fn detect_segmented(
    ctx: &PipelineCtx<'_>,
    input: &str,
    duration: f64,
    threshold: f64,
) -> SlidesResult<Vec<f64>> {
    let workers = ctx.request.settings.clamped_workers() as usize;
    let segments = plan_segments(duration, workers as u32);
    let total = segments.len().max(1);
    let done = Arc::new(AtomicUsize::new(0));

    let results: Vec<(crate::segment::Segment, Vec<f64>)> = stream::iter(segments.into_iter().map(
        |(start, span)| {
            let done = Arc::clone(&done);
            async move {
                let detected = detect_scenes(ctx.tools, input, start, span, threshold, DETECT_TIMEOUT)
                    .await
                    .unwrap_or_else(|e| {
                        debug!(start, error = %e, "Detection segment failed");
                        Vec::new()
                    });
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.report(Phase::Detect, finished as f64 / total as f64);
                ((start, span), detected)
            }
        },
    ))
    .buffer_unordered(workers)
    .collect()
    .await;

    Ok(merge_segment_detections(
        &results,
        ctx.request.settings.min_slide_duration,
    ))
}

/// Parallel frame extraction. Returns one entry per timestamp; failures
/// become `None` and are handled by the caller.
async fn extract_all(
    ctx: &PipelineCtx<'_>,
    input: &str,
    timestamps: &[f64],
    slides_dir: &PathBuf,
) -> Vec<Option<(f64, PathBuf, FrameStats)>> {
    let workers = ctx.request.settings.clamped_workers() as usize;
    let total = timestamps.len().max(1);
    let done = Arc::new(AtomicUsize::new(0));

    let mut results: Vec<(usize, Option<(f64, PathBuf, FrameStats)>)> =
        stream::iter(timestamps.iter().copied().enumerate().map(|(i, ts)| {
            let path = slides_dir.join(format!("slide_{:04}.png", i + 1));
            let done = Arc::clone(&done);
            async move {
                let outcome = match extract_frame(ctx.tools, input, ts, &path, EXTRACT_TIMEOUT).await
                {
                    Ok(stats) => Some((ts, path, stats)),
                    Err(e) => {
                        debug!(ts, error = %e, "Frame extraction failed");
                        None
                    }
                };
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.report(Phase::Extract, finished as f64 / total as f64);
                (i, outcome)
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

    // Workers complete out of order; restore timestamp order by index.
    results.sort_by_key(|(i, _)| *i);
    results.into_iter().map(|(_, r)| r).collect()
}

/// Refine dim frames in parallel.
async fn refine_all(
    ctx: &PipelineCtx<'_>,
    input: &str,
    duration: f64,
    slides: &mut [(f64, PathBuf, FrameStats, Option<u32>)],
) {
    let workers = ctx.request.settings.clamped_workers() as usize;
    let total = slides.len().max(1);
    let done = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = slides
        .iter()
        .enumerate()
        .map(|(i, (ts, path, stats, _))| {
            let early_first = i == 0 && *ts < 8.0;
            let (ts, path, stats) = (*ts, path.clone(), *stats);
            let done = Arc::clone(&done);
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = (usize, Option<(f64, FrameStats)>)> + Send + '_>> =
                Box::pin(async move {
                    let replacement = if is_dim(&stats, early_first) {
                        find_better_frame(ctx, input, duration, ts, &stats, early_first).await
                    } else {
                        None
                    };
                    // Replace the image in place; the slide keeps its nominal
                    // timestamp for ordering and naming.
                    let applied = match replacement {
                        Some((better_ts, better_stats)) => {
                            match extract_frame(ctx.tools, input, better_ts, &path, EXTRACT_TIMEOUT)
                                .await
                            {
                                Ok(_) => Some((better_ts, better_stats)),
                                Err(e) => {
                                    debug!(ts, error = %e, "Refinement re-extract failed");
                                    None
                                }
                            }
                        }
                        None => None,
                    };
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    ctx.report(Phase::Refine, finished as f64 / total as f64);
                    (i, applied)
                });
            fut
        })
        .collect();

    let refinements: Vec<(usize, Option<(f64, FrameStats)>)> =
        stream::iter(futures).buffer_unordered(workers).collect().await;

    for (i, applied) in refinements {
        if let Some((_better_ts, better_stats)) = applied {
            slides[i].2 = better_stats;
            slides[i].3 = Some(2);
        }
    }
}

/// Probe candidate offsets and pick the best acceptable replacement.
async fn find_better_frame(
    ctx: &PipelineCtx<'_>,
    input: &str,
    duration: f64,
    ts: f64,
    original: &FrameStats,
    early_first: bool,
) -> Option<(f64, FrameStats)> {
    let mut best: Option<(f64, FrameStats, f64)> = None;
    for offset in probe_offsets() {
        let candidate_ts = ts + offset;
        if candidate_ts < 0.0 || candidate_ts >= duration {
            continue;
        }
        let Ok(stats) = frame_stats(ctx.tools, input, candidate_ts, EXTRACT_TIMEOUT).await else {
            continue;
        };
        if accept_candidate(original, &stats, offset, early_first) {
            let score = crate::refine::candidate_score(&stats, offset);
            if best.as_ref().map(|(_, _, s)| score > *s).unwrap_or(true) {
                best = Some((candidate_ts, stats, score));
            }
        }
    }
    best.map(|(ts, stats, _)| (ts, stats))
}

/// Parallel OCR over the final slides.
async fn ocr_all(ctx: &PipelineCtx<'_>, slides_dir: &PathBuf, frames: &mut [SlideFrame]) {
    let workers = ctx.request.settings.clamped_workers() as usize;
    let total = frames.len().max(1);
    let done = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let image = slides_dir.join(&frame.image_path);
            let done = Arc::clone(&done);
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = (usize, Option<crate::ocr::OcrOutcome>)> + Send + '_>> =
                Box::pin(async move {
                    let outcome = ocr_slide(ctx.tools, &image, OCR_TIMEOUT)
                        .await
                        .unwrap_or_else(|e| {
                            debug!(image = %image.display(), error = %e, "OCR failed for slide");
                            None
                        });
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    ctx.report(Phase::Ocr, finished as f64 / total as f64);
                    (i, outcome)
                });
            fut
        })
        .collect();

    let outcomes: Vec<(usize, Option<crate::ocr::OcrOutcome>)> =
        stream::iter(futures).buffer_unordered(workers).collect().await;

    for (i, outcome) in outcomes {
        if let Some(out) = outcome {
            frames[i].ocr_text = Some(out.text);
            frames[i].ocr_confidence = Some(out.confidence);
        }
    }
}
