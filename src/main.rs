//! # Drag Convert - Main Entry Point
//!
//! Punto di ingresso: la riga di comando fa le veci del "drop" di file su un preset.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento di impostazioni e configurazione, scelta del preset
//! - Avvio del batch, progress, retry e riepilogo finale
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file, preset, backend, workers, etc.)
//! 2. Configura il logging (INFO o DEBUG, `RUST_LOG` ha la precedenza)
//! 3. Raccoglie le immagini supportate dai path indicati
//! 4. Avvia il batch con il preset scelto e segue gli snapshot
//! 5. Ripete i batch falliti con `--retries`, poi stampa il riepilogo
//!
//! ## Esempio di utilizzo:
//! ```bash
//! drag-convert ~/Desktop/shoot --preset "HD WebP" --backend worker --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drag_convert::{
    backend,
    converter::ProgressTracker,
    file_manager::FileManager,
    json_output::JsonMessage,
    AppSettings, BackendKind, ConversionOrchestrator, EngineConfig, OutputLocation, SettingsStore, TaskStatus,
};

#[derive(Parser)]
#[command(name = "drag-convert")]
#[command(about = "Resize and re-encode images in batch using saved presets")]
struct Args {
    /// Image files or directories to convert
    files: Vec<PathBuf>,

    /// Preset nickname or id (default: last used)
    #[arg(short, long)]
    preset: Option<String>,

    /// List saved presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Settings file (default: ~/.drag-convert/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transform backend: native or worker
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Number of parallel conversions
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-file timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Restart the batch up to N times while files fail
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Keep the temporary workspace after finishing
    #[arg(long)]
    keep_temp: bool,

    /// Output progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // JSON mode keeps stdout for messages only
    if json {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn print_presets(settings: &AppSettings) {
    let last_used = settings.last_used_preset().id;
    for preset in &settings.presets {
        let marker = if preset.id == last_used { "*" } else { " " };
        println!("{} {:<16} {:<40} [{}]", marker, preset.nickname, preset.describe(), preset.id);
    }
}

async fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match args.config {
        Some(ref path) => EngineConfig::from_file(path).await?,
        None => EngineConfig::default(),
    };

    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if args.workers.is_some() {
        config.max_concurrency = args.workers;
    }
    if args.timeout.is_some() {
        config.task_timeout_secs = args.timeout;
    }
    config.json_output |= args.json;

    config.validate()?;
    Ok(config)
}

async fn run(args: &Args, store: &SettingsStore, settings: &mut AppSettings) -> Result<()> {
    let config = load_config(args).await?;

    let files = FileManager::collect_images(&args.files)?;
    if files.is_empty() {
        return Err(anyhow::anyhow!("No supported images found in the given paths"));
    }

    let preset = match args.preset {
        Some(ref query) => settings
            .find_preset(query)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Unknown preset: {}", query))?,
        None => settings.last_used_preset(),
    };
    if let Err(e) = preset.validate() {
        warn!("Preset '{}': {}", preset.nickname, e);
    }

    let backend = backend::from_config(&config);
    if !backend.supports(preset.format) {
        return Err(anyhow::anyhow!(
            "Preset '{}' writes {}, which the {} backend cannot encode; use --backend worker",
            preset.nickname,
            preset.format,
            backend.name()
        ));
    }
    info!(
        "📂 {} files with preset '{}' ({}) using {} backend",
        files.len(),
        preset.nickname,
        preset.describe(),
        backend.name()
    );

    let orchestrator = ConversionOrchestrator::new(backend, config.clone());
    let mut handle = orchestrator.start_batch(files, preset.clone()).await?;

    settings.set_last_used(preset.id);
    store.save(settings).await;

    let mut attempt = 0;
    let batch = loop {
        let tracker = ProgressTracker::new(&handle.snapshot(), &preset, config.json_output);
        let followed = tracker.follow(handle.subscribe()).await;
        let finished = handle.wait().await.unwrap_or(followed);

        if finished.status() == TaskStatus::Failed && attempt < args.retries {
            attempt += 1;
            warn!("🔁 Retrying batch ({}/{})", attempt, args.retries);
            handle = orchestrator.restart().await?;
            continue;
        }
        break finished;
    };

    if !config.json_output {
        for task in batch.tasks.iter().filter(|t| t.status == TaskStatus::Failed) {
            if let Some(ref error) = task.error {
                eprintln!("  ❌ {}: {}", task.source_path.display(), error);
            }
        }
        match (batch.output_directory.as_ref(), batch.temp_directory.as_ref()) {
            (Some(dir), _) => println!("📁 Output: {}", dir.display()),
            (None, Some(temp)) => println!("📁 Temporary output: {}", temp.display()),
            (None, None) => {}
        }
    }

    if args.keep_temp || preset.output_location == OutputLocation::Temporary {
        if let Some(ref temp) = batch.temp_directory {
            info!("Keeping workspace {}", temp.display());
        }
    } else {
        orchestrator.dismiss().await;
    }

    let failed = batch.tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
    if failed == 0 {
        return Ok(());
    }
    if batch.has_completed_tasks() {
        Err(anyhow::anyhow!(
            "{} of {} files failed, the others were converted",
            failed,
            batch.tasks.len()
        ))
    } else {
        Err(anyhow::anyhow!("All {} files failed", batch.tasks.len()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json)?;

    let store = match args.settings {
        Some(ref path) => SettingsStore::new(path),
        None => SettingsStore::default_location()?,
    };
    let mut settings = store.load().await;

    if args.list_presets {
        print_presets(&settings);
        return Ok(());
    }

    if let Err(e) = run(&args, &store, &mut settings).await {
        if args.json {
            JsonMessage::error("Conversion failed".to_string(), Some(format!("{:#}", e))).emit();
        }
        return Err(e);
    }
    Ok(())
}
