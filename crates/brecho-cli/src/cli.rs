//! CLI definition and command dispatch for Brecho.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--config`, `--device`, `--bind`)
//! 2. Environment variables (`BRECHO_CONFIG`, `BRECHO_DEVICE`, `BRECHO_VERBOSE`)
//! 3. Config file (`~/.brecho/config.yaml` or the path from `--config`)
//! 4. Built-in defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use brecho_core::{
    BrechoError, CatalogItem, DevicePreference, GlobalConfig, ImageView, IntakeReport,
    IntakeService,
};

use crate::gateway;
use crate::ui::color::terminal_width;
use crate::ui::{format, table, ColorMode, MessageType, Progress, ProgressMode, Style};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Brecho intake - visual similarity search and item analysis for second-hand stores
#[derive(Parser, Debug)]
#[command(name = "brecho")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "BRECHO_VERBOSE")]
    pub verbose: bool,

    /// Suppress progress and informational messages
    #[arg(short, long, global = true, env = "BRECHO_QUIET")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.brecho/config.yaml)
    #[arg(long, global = true, env = "BRECHO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device preference for embedding inference (auto/gpu/cpu)
    #[arg(long, global = true, env = "BRECHO_DEVICE")]
    pub device: Option<String>,

    /// When to color output
    #[arg(long, global = true, env = "BRECHO_COLOR", value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP gateway
    #[command(after_help = r#"EXAMPLES:
    # Serve on the configured address (default 0.0.0.0:8000)
    brecho serve

    # Serve on a different port with debug logs
    brecho serve --bind 127.0.0.1:9000 --verbose
"#)]
    Serve {
        /// Socket address to listen on (overrides server.bind)
        #[arg(long, env = "BRECHO_BIND")]
        bind: Option<String>,
    },

    /// Embed the photos of a catalog item and store it in the index
    #[command(after_help = r#"EXAMPLES:
    # Index an item under its SKU
    brecho index front.jpg back.jpg --sku X1 --brand Farm --list-price 120

    # Without --sku a random id is generated
    brecho index photo.png --category Vestido --json
"#)]
    Index {
        /// Photos of the item
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Catalog key; a random id is used when omitted
        #[arg(long)]
        sku: Option<String>,

        #[arg(long)]
        consignor_id: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        brand: Option<String>,

        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        condition: Option<String>,

        #[arg(long)]
        list_price: Option<f64>,

        /// Extra attributes as a JSON string, stored verbatim
        #[arg(long)]
        extras_json: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find catalog items that look like the given photos
    #[command(after_help = r#"EXAMPLES:
    # Five closest items
    brecho search photo.jpg

    # Pool several views and return ten
    brecho search front.jpg back.jpg --top-k 10

    # Pipe ids to jq
    brecho search photo.jpg --json | jq '.[].id'
"#)]
    Search {
        /// Photos of the item
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Number of results (default: pipeline.neighborCount)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Analyze a new item: similar items, attribute proposal and price
    #[command(after_help = r#"EXAMPLES:
    # Analyze from photos
    brecho intake front.jpg back.jpg label.jpg

    # Include a spoken note from the consignor
    brecho intake front.jpg --audio note.wav

    # Full report as JSON
    brecho intake front.jpg --json
"#)]
    Intake {
        /// Photos of the item
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Audio clip with a spoken description
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show model, index and collaborator status
    #[command(after_help = r#"EXAMPLES:
    # Show status
    brecho status

    # Number of indexed items
    brecho status --json | jq '.indexed_items'
"#)]
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage Brecho configuration (validate, show resolved config)
    #[command(after_help = r#"EXAMPLES:
    # Validate the configuration
    brecho config validate

    # Show resolved configuration as YAML
    brecho config show
"#)]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings
    #[command(alias = "check")]
    Validate {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (file merged with defaults)
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Run function
// ============================================================================

/// Run the CLI application.
///
/// Returns `ExitCode::SUCCESS` on success, or `ExitCode::FAILURE` on error.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let style = Style::new(cli.color);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your global config at ~/.brecho/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to load configuration",
                    Some(&e.to_string()),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Config { action } => handle_config(&style, &config, action),
        command => run_async(&style, config, command, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let domain = e.downcast_ref::<BrechoError>();
            let hint = domain.and_then(error_hint);
            let cause = e.chain().nth(1).map(|c| c.to_string());
            eprintln!(
                "{}",
                style.error_with_context(&e.to_string(), cause.as_deref(), hint)
            );
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise warn (debug with `--verbose`, info for `serve`).
/// The gateway logs JSON lines, other commands plain text on stderr.
fn init_tracing(cli: &Cli) {
    let serving = matches!(cli.command, Command::Serve { .. });
    let level = if cli.verbose {
        "debug"
    } else if serving {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "brecho_core={0},brecho_cli={0},brecho_db={0},brecho_model={0},tower_http={0}",
            level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if serving {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn load_config(cli: &Cli) -> Result<GlobalConfig, BrechoError> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(BrechoError::InvalidGlobalConfig(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            GlobalConfig::from_path(path)?
        }
        None => GlobalConfig::load_default()?,
    };

    if let Some(device) = &cli.device {
        config.embedding.device = device
            .parse::<DevicePreference>()
            .map_err(|reason| BrechoError::InvalidConfiguration {
                message: format!("Invalid device preference '{}': {}", device, reason),
                hint: "Valid options: auto, gpu, cpu".to_string(),
            })?;
    }

    Ok(config)
}

fn error_hint(err: &BrechoError) -> Option<&'static str> {
    match err {
        BrechoError::Extraction { .. } => Some("Use PNG, JPEG or WebP photos"),
        BrechoError::EmbeddingProviderUnavailable { .. } => Some(
            "Download the CLIP model to ~/.brecho/models/embeddings or set embedding.provider: histogram",
        ),
        BrechoError::IndexIncompatible { .. } => {
            Some("The index was built with another model; point index.path to a new directory")
        }
        BrechoError::DeadlineExceeded { .. } => {
            Some("Raise pipeline.requestTimeoutSecs or check the oracle server")
        }
        BrechoError::InvalidConfiguration { .. } | BrechoError::InvalidGlobalConfig(_) => {
            Some("Run `brecho config validate` for details")
        }
        _ => None,
    }
}

/// Commands that need the model, the index and an async runtime.
fn run_async(style: &Style, config: GlobalConfig, command: Command, quiet: bool) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let json = match &command {
        Command::Index { json, .. }
        | Command::Search { json, .. }
        | Command::Intake { json, .. }
        | Command::Status { json } => *json,
        _ => false,
    };
    let mode = ProgressMode::detect(quiet, json);

    let progress = Progress::spinner("Loading embedding model and index", mode);
    let service = IntakeService::from_global_config(config);
    progress.finish_clear();
    let service = Arc::new(service.context("Failed to initialize the intake service")?);

    runtime.block_on(async move {
        match command {
            Command::Serve { bind } => handle_serve(style, service, bind).await,
            Command::Index {
                images,
                sku,
                consignor_id,
                category,
                brand,
                size,
                condition,
                list_price,
                extras_json,
                json,
            } => {
                let item = CatalogItem {
                    sku,
                    consignor_id,
                    category,
                    brand,
                    size,
                    condition,
                    list_price,
                    extras_json,
                };
                handle_index(style, &service, &images, item, json).await
            }
            Command::Search { images, top_k, json } => {
                handle_search(style, &service, &images, top_k, json).await
            }
            Command::Intake { images, audio, json } => {
                handle_intake(style, &service, &images, audio.as_deref(), json, mode).await
            }
            Command::Status { json } => handle_status(style, &service, json).await,
            Command::Config { .. } => Ok(()),
        }
    })
}

// ============================================================================
// Command handlers
// ============================================================================

async fn handle_serve(
    style: &Style,
    service: Arc<IntakeService>,
    bind: Option<String>,
) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| service.config().server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("'{}' is not a socket address", bind))?;

    eprintln!(
        "{}",
        style.message(MessageType::Info, &format!("Serving on http://{}", addr))
    );
    gateway::serve(service, addr).await
}

async fn handle_index(
    style: &Style,
    service: &IntakeService,
    images: &[PathBuf],
    item: CatalogItem,
    json: bool,
) -> anyhow::Result<()> {
    let views = read_views(service, images).await?;
    let indexed = service.index_item(views, item).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&indexed)?);
    } else {
        println!(
            "{}",
            style.message(
                MessageType::Ok,
                &format!(
                    "Indexed {} from {} photo(s)",
                    style.sku(&indexed.id),
                    images.len()
                )
            )
        );
    }
    Ok(())
}

async fn handle_search(
    style: &Style,
    service: &IntakeService,
    images: &[PathBuf],
    top_k: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let views = read_views(service, images).await?;
    let k = top_k.unwrap_or(service.config().pipeline.neighbor_count);
    let results = service.search_by_images(views, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", style.message(MessageType::Info, "The index is empty"));
        println!(
            "{}",
            style.message(MessageType::Hint, "Add items with `brecho index <photos> --sku <SKU>`")
        );
    } else {
        println!("{}", table::render_neighbors_table(&results));
        let best = &results[0];
        println!();
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!(
                    "Closest match {} at distance {}",
                    style.sku(&best.id),
                    style.distance(best.distance)
                )
            )
        );
    }
    Ok(())
}

async fn handle_intake(
    style: &Style,
    service: &IntakeService,
    images: &[PathBuf],
    audio: Option<&Path>,
    json: bool,
    mode: ProgressMode,
) -> anyhow::Result<()> {
    let views = read_views(service, images).await?;
    let audio = match audio {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let progress = Progress::spinner(&format!("Analyzing {} photo(s)", views.len()), mode);
    let report = service.run_intake_pipeline(views, audio).await;
    progress.finish_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_intake_report(style, &report);
    }
    Ok(())
}

fn print_intake_report(style: &Style, report: &IntakeReport) {
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!(
                "Intake {} finished in {} ({} proposal)",
                style.sku(&report.sku),
                format::format_duration_ms(report.elapsed_ms),
                style.source(report.source)
            )
        )
    );

    if let Some(hint) = &report.audio_hint {
        println!("{}", style.message_detail("Audio", hint));
    }
    if let Some(grade) = report.proposal.condition() {
        println!("{}", style.message_detail("Condition", &style.grade(grade)));
    }

    let width = terminal_width().saturating_sub(24).max(30);

    println!();
    println!("{}", style.section("Proposal"));
    if report.proposal.is_empty() {
        println!(
            "{}",
            style.message(MessageType::Warn, "The oracle produced no usable proposal")
        );
    } else {
        println!("{}", table::render_proposal_table(&report.proposal, width));
    }

    if let Some(price) = &report.price_suggestion {
        println!();
        println!("{}", style.section("Price suggestion"));
        println!("{}", table::render_proposal_table(price, width));
    }

    if !report.neighbors.is_empty() {
        println!();
        println!("{}", style.section("Similar items"));
        println!("{}", table::render_neighbors_table(&report.neighbors));
    }

    if !report.descriptors.is_empty() {
        println!();
        println!("{}", style.section("Visual descriptors"));
        println!("{}", table::render_descriptors_table(&report.descriptors));
    }
}

async fn handle_status(style: &Style, service: &IntakeService, json: bool) -> anyhow::Result<()> {
    let health = service.health().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!("{}", style.section("Brecho status"));
    println!(
        "{}",
        style.key_value("Model", &format!("{} ({}d)", health.model_id, health.dimension))
    );
    println!(
        "{}",
        style.key_value(
            "Index",
            &format!(
                "{} at {}",
                health.index_backend,
                service.config().index.effective_path().display()
            )
        )
    );
    println!(
        "{}",
        style.key_value("Indexed items", &health.indexed_items.to_string())
    );
    println!("{}", style.key_value("Oracle", &health.oracle));
    println!(
        "{}",
        style.key_value(
            "Speech",
            if health.speech_enabled { "enabled" } else { "disabled" }
        )
    );
    Ok(())
}

/// Read photo files and decode them.
async fn read_views(service: &IntakeService, paths: &[PathBuf]) -> anyhow::Result<Vec<ImageView>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        images.push(bytes);
    }
    Ok(service.decode_images(images).await?)
}

// ============================================================================
// Config command handler
// ============================================================================

fn handle_config(style: &Style, config: &GlobalConfig, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Validate { json } => handle_config_validate(style, config, json),
        ConfigAction::Show { json } => handle_config_show(config, json),
    }
}

/// Hard errors already failed loading; what is left are warnings.
fn handle_config_validate(style: &Style, config: &GlobalConfig, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate()?;

    if json {
        let body = serde_json::json!({ "valid": true, "warnings": warnings });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if warnings.is_empty() {
        println!("{}", style.message(MessageType::Ok, "Configuration is valid"));
    } else {
        println!(
            "{}",
            style.message(MessageType::Warn, &format!("{} warning(s):", warnings.len()))
        );
        for warning in &warnings {
            println!("  • {}", warning);
        }
        println!();
        println!(
            "{}",
            style.message(MessageType::Ok, "Configuration is valid with warnings")
        );
    }
    Ok(())
}

fn handle_config_show(config: &GlobalConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_intake_with_audio() {
        let cli = Cli::try_parse_from([
            "brecho", "intake", "a.jpg", "b.jpg", "--audio", "note.wav", "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Intake { images, audio, json } => {
                assert_eq!(images.len(), 2);
                assert_eq!(audio, Some(PathBuf::from("note.wav")));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_search_requires_images() {
        assert!(Cli::try_parse_from(["brecho", "search"]).is_err());
    }

    #[test]
    fn test_config_check_alias() {
        let cli = Cli::try_parse_from(["brecho", "config", "check"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Validate { json: false }
            }
        ));
    }

    #[test]
    fn test_hints_for_domain_errors() {
        assert!(error_hint(&BrechoError::extraction("bad")).is_some());
        assert!(error_hint(&BrechoError::Internal("x".into())).is_none());
    }
}
