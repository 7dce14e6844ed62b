//! The `summarize` CLI.

mod osc;

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smz_cache::{MediaCache, MediaCacheConfig, MetaStore, MetaStoreConfig};
use smz_core::{
    render_report, run_flow, EventSink, FileConfig, Paths, RunInput, RunOptions, RunServices,
    RuntimeContext, SlideRunOptions,
};
use smz_llm::{rank_free_models, ModelRegistry, RankOptions, RegistryConfig};
use smz_media::ToolPaths;
use smz_models::{parse_timeout, PricingTable, RunEvent, SlideSettings, SummaryLength};
use smz_slides::DirLocks;

#[derive(Debug, Parser)]
#[command(name = "summarize", version, about = "Summarize a URL, YouTube video or file")]
struct Cli {
    /// URL or file path to summarize.
    input: Option<String>,

    /// Model id (`provider/name`) or preset (`auto`, `free`, custom).
    #[arg(long)]
    model: Option<String>,

    #[arg(long, default_value = "medium")]
    length: String,

    #[arg(long)]
    language: Option<String>,

    /// auto | on | off
    #[arg(long, default_value = "auto")]
    stream: String,

    /// plain | markdown
    #[arg(long, default_value = "plain")]
    render: String,

    /// Print extracted content along with the summary.
    #[arg(long)]
    extract: bool,

    /// Stop after extraction; no LLM call.
    #[arg(long = "extract-only")]
    extract_only: bool,

    /// Machine-readable JSON output.
    #[arg(long)]
    json: bool,

    /// off | on | detailed
    #[arg(long, default_value = "off")]
    metrics: String,

    /// off | auto | always
    #[arg(long, default_value = "auto")]
    firecrawl: String,

    /// off | auto | llm
    #[arg(long, default_value = "off")]
    markdown: String,

    /// Request timeout: 30s | 30 | 2m | 5000ms
    #[arg(long)]
    timeout: Option<String>,

    #[arg(long = "max-output-tokens")]
    max_output_tokens: Option<u32>,

    /// Custom prompt appended to the summary instructions.
    #[arg(long)]
    prompt: Option<String>,

    /// Extract per-scene slide images alongside the summary.
    #[arg(long)]
    slides: bool,

    #[arg(long = "slides-scene-threshold")]
    slides_scene_threshold: Option<f64>,

    #[arg(long = "slides-ocr")]
    slides_ocr: bool,

    #[arg(long = "no-cache")]
    no_cache: bool,

    #[arg(long = "no-media-cache")]
    no_media_cache: bool,

    #[arg(long = "cache-stats")]
    cache_stats: bool,

    #[arg(long = "clear-cache")]
    clear_cache: bool,

    #[arg(long = "openai-base-url")]
    openai_base_url: Option<String>,

    #[arg(long = "anthropic-base-url")]
    anthropic_base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh the ranked free-model list from the OpenRouter catalog.
    RefreshFree {
        /// Extra probe runs per candidate (total probes = 1 + runs).
        #[arg(long, default_value_t = 1)]
        runs: u32,
        /// Minimum parameter count in billions (name heuristic).
        #[arg(long = "min-params", default_value_t = 27.0)]
        min_params: f64,
        /// Catalog age cutoff in days; 0 disables the filter.
        #[arg(long = "max-age-days", default_value_t = 180)]
        max_age_days: u32,
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let exit = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(exit);
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = RuntimeContext::from_process();
    let paths = Paths::new(&ctx);
    let config = FileConfig::load(&paths.config_file())?;

    if let Some(Command::RefreshFree {
        runs,
        min_params,
        max_age_days,
        verbose,
    }) = cli.command
    {
        return refresh_free(&ctx, &paths, runs, min_params, max_age_days, verbose).await;
    }

    // Cache maintenance flags run without an input.
    let meta = open_meta(&paths, &config, cli.no_cache)?;
    let media = open_media(&paths, &config, cli.no_media_cache).await?;

    if cli.clear_cache {
        if let Some(store) = meta.as_deref() {
            store.clear()?;
        }
        if let Some(cache) = media.as_deref() {
            cache.clear().await?;
        }
        println!("cache cleared");
        return Ok(());
    }
    if cli.cache_stats {
        return print_cache_stats(meta.as_deref(), media.as_deref()).await;
    }

    let Some(input) = cli.input.clone() else {
        return Err("no input given (pass a URL or file path; see --help)".into());
    };

    let registry = ModelRegistry::new(
        RegistryConfig {
            presets: config.models.clone(),
            default_selector: config.model.clone(),
            cli_openai_base_url: cli.openai_base_url.clone(),
            cli_anthropic_base_url: cli.anthropic_base_url.clone(),
            config_openai_base_url: config.openai.base_url.clone(),
            config_anthropic_base_url: config.anthropic.base_url.clone(),
            config_openai_use_chat_completions: config.openai.use_chat_completions,
        },
        ctx.env_fn(),
    );

    let services = RunServices {
        registry: Arc::new(registry),
        meta,
        media,
        tools: ToolPaths::resolve({
            let ctx = ctx.clone();
            move |name| ctx.env(name)
        }),
        locks: Arc::new(DirLocks::new()),
        pricing: Arc::new(PricingTable::builtin()),
    };

    let options = build_options(&cli, &ctx, &config, &paths)?;
    let stdout_tty = std::io::stdout().is_terminal();
    let osc = stdout_tty && osc::supports_osc_progress(|name| ctx.env(name));
    let markdown_render = cli.render == "markdown" && stdout_tty;

    let sink: EventSink = {
        let json = cli.json;
        Arc::new(move |event: RunEvent| match &event {
            RunEvent::Chunk { text } => {
                if !json {
                    let rendered = if markdown_render {
                        osc::linkify_markdown(text)
                    } else {
                        text.clone()
                    };
                    print!("{rendered}");
                    let _ = std::io::stdout().flush();
                }
            }
            RunEvent::Status { message } => {
                if osc {
                    eprint!("{}", osc::progress_indeterminate(message));
                }
            }
            RunEvent::Slides(value) => {
                if osc {
                    if let (Some(phase), Some(percent)) = (
                        value.get("phase").and_then(|v| v.as_str()),
                        value.get("percent").and_then(|v| v.as_u64()),
                    ) {
                        eprint!(
                            "{}",
                            osc::progress_set(percent as u8, &format!("slides: {phase}"))
                        );
                    }
                }
            }
            RunEvent::Error { .. } | RunEvent::Done {} => {}
        })
    };

    let outcome = run_flow(&ctx, &services, &options, RunInput::Target(input), sink).await;
    if osc {
        eprint!("{}", osc::progress_clear("summarize"));
    }
    let outcome = outcome?;

    if cli.json {
        let value = serde_json::json!({
            "content": outcome.content,
            "summary": outcome.summary,
            "model": outcome.model.as_ref().map(|m| m.to_string()),
            "summaryFromCache": outcome.summary_from_cache,
            "costReport": outcome.report,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if cli.extract || cli.extract_only {
        println!("{}", outcome.content.content);
    }
    if outcome.summary.is_some() {
        // Streaming already printed the text; finish the line.
        println!();
    }

    match cli.metrics.as_str() {
        "on" => eprintln!("{}", render_report(&outcome.report, outcome.elapsed_secs, false)),
        "detailed" => eprintln!("{}", render_report(&outcome.report, outcome.elapsed_secs, true)),
        _ => {}
    }

    Ok(())
}

fn build_options(
    cli: &Cli,
    ctx: &RuntimeContext,
    config: &FileConfig,
    paths: &Paths,
) -> Result<RunOptions, Box<dyn std::error::Error>> {
    let mut options = RunOptions {
        selector: cli.model.clone(),
        length: cli.length.parse::<SummaryLength>()?,
        language: cli.language.clone().or_else(|| config.language.clone()),
        custom_prompt: cli.prompt.clone(),
        extract_only: cli.extract_only,
        stream: match cli.stream.as_str() {
            "off" => false,
            "on" => true,
            _ => !cli.json,
        },
        firecrawl: cli.firecrawl.parse().map_err(|e: String| e)?,
        markdown: cli.markdown.parse().map_err(|e: String| e)?,
        max_output_tokens: cli.max_output_tokens,
        no_cache: cli.no_cache,
        ..RunOptions::default()
    };

    if let Some(raw) = &cli.timeout {
        options.timeout =
            parse_timeout(raw).ok_or_else(|| format!("bad --timeout value '{raw}'"))?;
    }

    if cli.slides {
        let mut settings = SlideSettings {
            scene_threshold: cli.slides_scene_threshold,
            ocr: cli.slides_ocr,
            ..SlideSettings::default()
        };
        if let Some(workers) = ctx.env("SUMMARIZE_SLIDES_WORKERS").and_then(|v| v.parse().ok()) {
            settings.workers = workers;
        }
        if let Some(samples) = ctx.env("SUMMARIZE_SLIDES_SAMPLES").and_then(|v| v.parse().ok()) {
            settings.calibration_samples = samples;
        }
        options.slides = Some(SlideRunOptions {
            settings,
            output_dir: paths.slides_dir(),
            ytdlp_format: ctx.env("SUMMARIZE_SLIDES_YTDLP_FORMAT"),
            extract_from_stream: ctx.env_flag("SUMMARIZE_SLIDES_EXTRACT_STREAM"),
        });
    }

    Ok(options)
}

fn open_meta(
    paths: &Paths,
    config: &FileConfig,
    no_cache: bool,
) -> Result<Option<Arc<MetaStore>>, Box<dyn std::error::Error>> {
    if no_cache || !config.cache.enabled {
        return Ok(None);
    }
    let store = MetaStore::open(&MetaStoreConfig {
        path: paths.cache_db(&config.cache),
        max_bytes: config.cache.max_mb * 1024 * 1024,
        ttl_ms: config.cache.ttl_days as i64 * 24 * 3600 * 1000,
    })?;
    Ok(Some(Arc::new(store)))
}

async fn open_media(
    paths: &Paths,
    config: &FileConfig,
    no_media_cache: bool,
) -> Result<Option<Arc<MediaCache>>, Box<dyn std::error::Error>> {
    if no_media_cache || !config.cache.media.enabled {
        return Ok(None);
    }
    let cache = MediaCache::open(MediaCacheConfig {
        dir: paths.media_dir(&config.cache.media),
        max_bytes: config.cache.media.max_mb * 1024 * 1024,
        ttl_ms: Some(config.cache.media.ttl_days as i64 * 24 * 3600 * 1000),
        verify: config.cache.media.verify,
    })
    .await?;
    Ok(Some(Arc::new(cache)))
}

async fn print_cache_stats(
    meta: Option<&MetaStore>,
    media: Option<&MediaCache>,
) -> Result<(), Box<dyn std::error::Error>> {
    match meta {
        Some(store) => {
            let stats = store.stats()?;
            println!(
                "metadata cache: {} entries, {:.1} MB",
                stats.entries,
                stats.total_bytes as f64 / (1024.0 * 1024.0)
            );
        }
        None => println!("metadata cache: disabled"),
    }
    match media {
        Some(cache) => {
            let (entries, bytes) = cache.stats().await;
            println!(
                "media cache: {} entries, {:.1} MB",
                entries,
                bytes as f64 / (1024.0 * 1024.0)
            );
        }
        None => println!("media cache: disabled"),
    }
    Ok(())
}

async fn refresh_free(
    ctx: &RuntimeContext,
    paths: &Paths,
    runs: u32,
    min_params: f64,
    max_age_days: u32,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let api_key = ctx
        .env("OPENROUTER_API_KEY")
        .ok_or("refresh-free requires OPENROUTER_API_KEY")?;

    let http = reqwest::Client::new();
    let catalog = smz_llm::fetch_catalog(&http).await?;
    let all = smz_llm::parse_catalog(&catalog);

    let options = RankOptions {
        runs,
        min_params_b: min_params,
        max_age_days,
        verbose,
    };
    let now_unix = ctx.now_ms() / 1000;
    let candidates = smz_llm::filter_candidates(all, &options, now_unix);
    if candidates.is_empty() {
        return Err("no free models matched the filters".into());
    }
    if verbose {
        for candidate in &candidates {
            eprintln!(
                "candidate: {} (params ~{}B)",
                candidate.id,
                candidate
                    .params_b
                    .map(|p| p.round().to_string())
                    .unwrap_or_else(|| "?".to_string())
            );
        }
    }

    let ranked = rank_free_models(&api_key, &candidates, &options).await?;
    if ranked.is_empty() {
        return Err("every candidate failed its probes".into());
    }

    FileConfig::persist_free_candidates(&paths.config_file(), &ranked)?;
    println!("free preset updated ({} models):", ranked.len());
    for id in &ranked {
        println!("  {id}");
    }
    Ok(())
}
