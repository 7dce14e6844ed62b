//! The run-flow orchestrator.
//!
//! Sequence: resolve language → classify → content-cache probe → extract
//! (recursing once into video-only pages) → optional slides side-channel →
//! token-cap check → summary-cache probe per candidate → generate/stream
//! with auto-mode fallback → summary-cache write → cost report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smz_cache::{MediaCache, MetaStore, Namespace};
use smz_extract::{ExtractOptions, Extractor, FirecrawlMode, MarkdownMode};
use smz_llm::{
    clean_visible_text, merge_streaming_chunk, GenerateRequest, InputClass, LlmClient, LlmError,
    ModelRegistry,
};
use smz_media::ToolPaths;
use smz_models::{
    classify_input, classify_url_kind, content_key, is_youtube_url, resolve_language, summary_key,
    text_hash, CallPurpose, CostBook, CostReport, ExtractSettingsKey, ExtractedContent, InputTarget,
    Language, ModelId, PricingTable, RunEvent, SummaryLength, UrlKind,
};
use smz_slides::{extract_slides, DirLocks, SlidesRequest};
use tracing::{debug, info, warn};
use url::Url;

use crate::context::RuntimeContext;
use crate::error::{CoreError, CoreResult};
use crate::prompt::{
    build_chunk_notes_prompt, build_merge_prompt, build_summary_prompt, estimate_tokens,
    split_into_chunks,
};

/// Receives run events (chunks, status, slides, errors) as they happen.
pub type EventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// What the run starts from.
#[derive(Debug, Clone)]
pub enum RunInput {
    /// Raw CLI/daemon input: URL or file path, classified here.
    Target(String),
    /// Pre-extracted page text supplied by a client (daemon `mode=page`).
    Page {
        url: String,
        title: String,
        text: String,
        truncated: bool,
    },
}

/// Slide-extraction options for one run.
#[derive(Debug, Clone)]
pub struct SlideRunOptions {
    pub settings: smz_models::SlideSettings,
    pub output_dir: PathBuf,
    pub ytdlp_format: Option<String>,
    pub extract_from_stream: bool,
}

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Model id or preset name; `None` uses the registry default.
    pub selector: Option<String>,
    pub length: SummaryLength,
    pub language: Option<String>,
    pub custom_prompt: Option<String>,
    pub extract_only: bool,
    pub stream: bool,
    pub firecrawl: FirecrawlMode,
    pub markdown: MarkdownMode,
    pub timeout: Duration,
    pub max_output_tokens: Option<u32>,
    pub max_characters: usize,
    pub slides: Option<SlideRunOptions>,
    /// Refuse before any LLM call above this estimated input size.
    pub input_token_cap: u64,
    /// Chunked map-reduce kicks in above this per-call budget.
    pub chunk_token_budget: u64,
    pub no_cache: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            selector: None,
            length: SummaryLength::default(),
            language: None,
            custom_prompt: None,
            extract_only: false,
            stream: true,
            firecrawl: FirecrawlMode::Auto,
            markdown: MarkdownMode::Off,
            timeout: Duration::from_secs(120),
            max_output_tokens: None,
            max_characters: 80_000,
            slides: None,
            input_token_cap: 300_000,
            chunk_token_budget: 24_000,
            no_cache: false,
        }
    }
}

/// Long-lived collaborators owned by the CLI or daemon top level.
#[derive(Clone)]
pub struct RunServices {
    pub registry: Arc<ModelRegistry>,
    pub meta: Option<Arc<MetaStore>>,
    pub media: Option<Arc<MediaCache>>,
    pub tools: ToolPaths,
    pub locks: Arc<DirLocks>,
    pub pricing: Arc<PricingTable>,
}

/// The result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub content: ExtractedContent,
    pub summary: Option<String>,
    pub model: Option<ModelId>,
    pub report: CostReport,
    pub summary_from_cache: bool,
    pub elapsed_secs: f64,
}

fn input_class(target: &InputTarget) -> InputClass {
    match target {
        InputTarget::File { .. } => InputClass::File,
        InputTarget::Url { url } => {
            if is_youtube_url(url) {
                InputClass::Youtube
            } else {
                match Url::parse(url).map(|u| classify_url_kind(&u)) {
                    Ok(UrlKind::Asset) => InputClass::Asset,
                    _ => InputClass::Website,
                }
            }
        }
    }
}

/// Execute one run end to end.
pub async fn run_flow(
    ctx: &RuntimeContext,
    services: &RunServices,
    options: &RunOptions,
    input: RunInput,
    sink: EventSink,
) -> CoreResult<RunOutcome> {
    let started = Instant::now();
    let mut book = CostBook::new();

    // 1. Language.
    let language = options
        .language
        .as_deref()
        .map(resolve_language)
        .unwrap_or_else(|| resolve_language("en"));

    // 2. Classification. Page-mode input arrives already extracted.
    let (target, preextracted) = match input {
        RunInput::Target(raw) => (
            classify_input(&raw).map_err(|e| CoreError::InvalidInput(e.to_string()))?,
            None,
        ),
        RunInput::Page {
            url,
            title,
            text,
            truncated,
        } => {
            let word_count = ExtractedContent::word_count_of(&text);
            let content = ExtractedContent {
                url: url.clone(),
                title,
                description: None,
                site_name: None,
                total_characters: text.chars().count(),
                word_count,
                content: text,
                truncated,
                transcript: None,
                video: None,
                is_video_only: false,
                diagnostics: Vec::new(),
            };
            (InputTarget::Url { url }, Some(content))
        }
    };
    let class = input_class(&target);
    let selector = options
        .selector
        .clone()
        .unwrap_or_else(|| services.registry.default_selector());
    let candidates = services.registry.resolve_candidates(&selector, class)?;

    // The extractor's Markdown conversion uses the run's current model:
    // the first candidate with credentials.
    let markdown_client: Option<Box<dyn LlmClient>> = candidates
        .iter()
        .find(|m| services.registry.has_credentials(m))
        .and_then(|m| services.registry.build_client(m).ok());

    let extract_options = ExtractOptions {
        firecrawl: options.firecrawl,
        markdown: options.markdown,
        timeout: options.timeout,
        max_characters: options.max_characters,
        language_tag: language.tag.clone(),
    };
    let meta = (!options.no_cache)
        .then(|| services.meta.clone())
        .flatten();
    let extractor = Extractor::new(
        extract_options,
        ctx.env("FIRECRAWL_API_KEY"),
        ctx.env("APIFY_API_TOKEN"),
        ctx.env("OPENAI_API_KEY"),
        meta.as_deref(),
        services.media.as_deref(),
        markdown_client.as_deref(),
    );

    // 3–4. Extraction with content cache and one video-only recursion.
    let mut content = match preextracted {
        Some(content) => content,
        None => {
            (sink)(RunEvent::Status {
                message: "extracting".to_string(),
            });
            extract_with_cache(&extractor, meta.as_deref(), options, &target, &mut book).await?
        }
    };
    if content.is_video_only {
        if let Some(video) = content.video.clone() {
            info!(url = %video.url, "Video-only page, recursing into embedded video");
            (sink)(RunEvent::Status {
                message: "extracting embedded video".to_string(),
            });
            let video_target = InputTarget::Url {
                url: video.url.clone(),
            };
            let mut inner =
                extract_with_cache(&extractor, meta.as_deref(), options, &video_target, &mut book)
                    .await?;
            inner.diagnostics = content
                .diagnostics
                .iter()
                .cloned()
                .chain(inner.diagnostics)
                .collect();
            content = inner;
        }
    }

    // 5. Slides side-channel, non-blocking for the summary.
    let slides_task = options.slides.as_ref().map(|slide_opts| {
        let source_url = content
            .video
            .as_ref()
            .map(|v| v.url.clone())
            .unwrap_or_else(|| content.url.clone());
        spawn_slides(services, slide_opts.clone(), source_url, Arc::clone(&sink))
    });

    // 6. Extract-only stops before any LLM work.
    if options.extract_only {
        if let Some(task) = slides_task {
            let _ = task.await;
        }
        let report = book.report(&services.pricing);
        return Ok(RunOutcome {
            content,
            summary: None,
            model: None,
            report,
            summary_from_cache: false,
            elapsed_secs: started.elapsed().as_secs_f64(),
        });
    }

    // 8. Refuse oversized input before any LLM call; no partial truncation.
    let estimated = estimate_tokens(&content.content);
    if estimated > options.input_token_cap {
        return Err(CoreError::InputTooLarge {
            estimated,
            cap: options.input_token_cap,
        });
    }

    // 7/9/10. Candidate iteration with summary cache and empty-retry.
    let content_hash = text_hash(&content.normalized());
    let prompt_hash = text_hash(options.custom_prompt.as_deref().unwrap_or(""));

    let mut last_error: Option<LlmError> = None;
    let mut chosen: Option<(ModelId, String, bool)> = None;

    for model in &candidates {
        let cache_key = summary_key(
            &content_hash,
            &prompt_hash,
            &model.to_string(),
            options.length.as_str(),
            &language.label,
        );
        if let Some(store) = meta.as_deref() {
            if let Ok(Some(cached)) = store.get(Namespace::Summary, &cache_key) {
                debug!(model = %model, "Summary cache hit");
                (sink)(RunEvent::Chunk {
                    text: cached.clone(),
                });
                chosen = Some((model.clone(), cached, true));
                break;
            }
        }

        if !services.registry.has_credentials(model) {
            last_error = Some(LlmError::MissingApiKey {
                provider: model.provider.to_string(),
                env: model
                    .provider
                    .api_key_env()
                    .unwrap_or("an API key")
                    .to_string(),
            });
            continue;
        }
        let client = match services.registry.build_client(model) {
            Ok(client) => client,
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        };

        (sink)(RunEvent::Status {
            message: format!("summarizing with {model}"),
        });
        match summarize_once(
            client.as_ref(),
            &content,
            options,
            &language,
            &mut book,
            &sink,
        )
        .await
        {
            Ok(summary) => {
                if let Some(store) = meta.as_deref() {
                    if let Err(e) = store.put(Namespace::Summary, &cache_key, &summary) {
                        warn!(error = %e, "Failed to cache summary");
                    }
                }
                chosen = Some((model.clone(), summary, false));
                break;
            }
            Err(e) if e.is_fallback_worthy() && candidates.len() > 1 => {
                warn!(model = %model, error = %e, "Candidate failed, trying next");
                last_error = Some(e);
            }
            Err(e) => {
                last_error = Some(e);
                break;
            }
        }
    }

    // Slides finish whether or not the summary succeeded; the done-hook
    // fires exactly once either way.
    if let Some(task) = slides_task {
        let _ = task.await;
    }

    let (model, summary, summary_from_cache) = match chosen {
        Some(parts) => parts,
        None => {
            let last = last_error.unwrap_or(LlmError::EmptyOutput);
            if matches!(last, LlmError::EmptyOutput) {
                return Err(CoreError::EmptySummary);
            }
            let mut message = last.to_string();
            if let Some(hint) = ModelRegistry::exhausted_hint(&selector) {
                message = format!("{message}; {hint}");
            }
            return Err(CoreError::AllCandidatesFailed(message));
        }
    };

    let report = book.report(&services.pricing);
    Ok(RunOutcome {
        content,
        summary: Some(summary),
        model: Some(model),
        report,
        summary_from_cache,
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}

/// Extraction with the content cache in front.
async fn extract_with_cache(
    extractor: &Extractor<'_>,
    meta: Option<&MetaStore>,
    options: &RunOptions,
    target: &InputTarget,
    book: &mut CostBook,
) -> CoreResult<ExtractedContent> {
    match target {
        InputTarget::File { path } => Ok(extractor.extract_local_file(path, book).await?),
        InputTarget::Url { url } => {
            let settings = ExtractSettingsKey {
                firecrawl: format!("{:?}", options.firecrawl).to_lowercase(),
                markdown: format!("{:?}", options.markdown).to_lowercase(),
                max_characters: Some(options.max_characters),
            };
            let key = content_key(url, &settings);

            if let Some(store) = meta {
                if let Ok(Some(raw)) = store.get(Namespace::Content, &key) {
                    if let Ok(cached) = serde_json::from_str::<ExtractedContent>(&raw) {
                        debug!(url = %url, "Content cache hit");
                        return Ok(cached);
                    }
                }
            }

            let content = extractor.extract(url, book).await?;
            if let Some(store) = meta {
                if let Err(e) =
                    store.put(Namespace::Content, &key, &serde_json::to_string(&content)?)
                {
                    warn!(error = %e, "Failed to cache extracted content");
                }
            }
            Ok(content)
        }
    }
}

/// Spawn the slides pipeline; progress and the exactly-once done-hook are
/// delivered through the sink as `slides` events.
fn spawn_slides(
    services: &RunServices,
    slide_opts: SlideRunOptions,
    source_url: String,
    sink: EventSink,
) -> tokio::task::JoinHandle<()> {
    let tools = services.tools.clone();
    let locks = Arc::clone(&services.locks);
    let meta = services.meta.clone();

    tokio::spawn(async move {
        let request = SlidesRequest {
            source_url: source_url.clone(),
            output_dir: slide_opts.output_dir.clone(),
            settings: slide_opts.settings.clone(),
            ytdlp_format: slide_opts.ytdlp_format.clone(),
            extract_from_stream: slide_opts.extract_from_stream,
        };

        let progress_sink = Arc::clone(&sink);
        let progress: smz_slides::ProgressFn = Arc::new(move |p| {
            (progress_sink)(RunEvent::Slides(serde_json::json!({
                "phase": p.phase,
                "percent": p.percent,
                "queued": p.queued,
            })));
        });

        let result = extract_slides(&tools, &locks, &request, progress).await;
        match result {
            Ok(manifest) => {
                if let Some(store) = meta {
                    let key = smz_models::slides_key(
                        &source_url,
                        &smz_models::SlideSettingsKey {
                            scene_threshold: slide_opts.settings.scene_threshold,
                            max_slides: slide_opts.settings.max_slides,
                            min_slide_duration: slide_opts.settings.min_slide_duration,
                            ocr: slide_opts.settings.ocr,
                        },
                    );
                    if let Ok(raw) = serde_json::to_string(&manifest) {
                        if let Err(e) = store.put(Namespace::Slides, &key, &raw) {
                            warn!(error = %e, "Failed to cache slide manifest row");
                        }
                    }
                }
                (sink)(RunEvent::Slides(serde_json::json!({
                    "done": true,
                    "ok": true,
                    "manifest": manifest,
                })));
            }
            Err(e) => {
                warn!(error = %e, "Slide extraction failed");
                (sink)(RunEvent::Slides(serde_json::json!({
                    "done": true,
                    "ok": false,
                    "error": e.to_string(),
                })));
            }
        }
    })
}

/// One summary attempt against one client, including the single empty
/// retry and chunked map-reduce for long content.
async fn summarize_once(
    client: &dyn LlmClient,
    content: &ExtractedContent,
    options: &RunOptions,
    language: &Language,
    book: &mut CostBook,
    sink: &EventSink,
) -> Result<String, LlmError> {
    for attempt in 0..2 {
        let summary =
            summarize_attempt(client, content, options, language, book, sink).await?;
        if !summary.trim().is_empty() {
            return Ok(summary);
        }
        warn!(attempt, model = %client.model(), "Empty summary, retrying once");
    }
    Err(LlmError::EmptyOutput)
}

async fn summarize_attempt(
    client: &dyn LlmClient,
    content: &ExtractedContent,
    options: &RunOptions,
    language: &Language,
    book: &mut CostBook,
    sink: &EventSink,
) -> Result<String, LlmError> {
    let chunk_chars = (options.chunk_token_budget * 4) as usize;
    let needs_map_reduce = estimate_tokens(&content.content) > options.chunk_token_budget;

    let final_prompt = if needs_map_reduce {
        let chunks = split_into_chunks(&content.content, chunk_chars);
        info!(chunks = chunks.len(), "Content over budget, running map-reduce");
        let mut notes = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let request =
                GenerateRequest::new(build_chunk_notes_prompt(chunk, i, chunks.len(), language))
                    .with_timeout(options.timeout);
            let generated = client.generate(&request).await?;
            book.record_call(client.model().clone(), generated.usage, CallPurpose::ChunkNotes);
            notes.push(generated.text);
        }
        build_merge_prompt(
            &notes,
            &content.title,
            &content.url,
            options.length,
            language,
            options.custom_prompt.as_deref(),
        )
    } else {
        build_summary_prompt(
            &content.content,
            &content.title,
            &content.url,
            options.length,
            language,
            options.custom_prompt.as_deref(),
        )
    };

    let mut request = GenerateRequest::new(final_prompt).with_timeout(options.timeout);
    if let Some(max) = options.max_output_tokens {
        request = request.with_max_output_tokens(max);
    }

    if options.stream {
        let mut handle = client.stream(&request).await?;
        let mut accumulated = String::new();
        while let Some(delta) = handle.deltas.recv().await {
            let delta = delta?;
            let merged = merge_streaming_chunk(&accumulated, &delta);
            if merged.len() > accumulated.len() {
                let fresh = merged[accumulated.len()..].to_string();
                (sink)(RunEvent::Chunk { text: fresh });
            }
            accumulated = merged;
        }
        let usage = handle.usage.await.unwrap_or_default();
        book.record_call(client.model().clone(), usage, CallPurpose::Summary);
        Ok(clean_final_text(&accumulated))
    } else {
        let generated = client.generate(&request).await?;
        book.record_call(client.model().clone(), generated.usage, CallPurpose::Summary);
        if !generated.text.trim().is_empty() {
            (sink)(RunEvent::Chunk {
                text: generated.text.clone(),
            });
        }
        Ok(generated.text)
    }
}

/// The stored/final form trims ends but keeps internal structure; the
/// fully collapsed form is only for single-line consumers.
fn clean_final_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        clean_visible_text(raw)
    } else {
        trimmed.to_string()
    }
}
