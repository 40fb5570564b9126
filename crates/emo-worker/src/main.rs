//! Face capture worker binary.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use emo_client::ClassifierClient;
use emo_media::{FaceDetector, ImageEncoder, InferenceRunner, LocalFolderSource};
use emo_worker::{CaptureConfig, CaptureOrchestrator, CaptureScheduler, SettingsStore};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // No subscriber yet, so this failure can only go to stderr
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        error!("Capture worker failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    info!("Starting emo-capture");

    let config = CaptureConfig::from_env();
    info!("Capture config: {:?}", config);
    config.validate()?;

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exported");
    }

    let settings = Arc::new(
        SettingsStore::load(&config.settings_path)
            .await
            .context("Failed to load capture settings")?,
    );
    if let Some(enabled) = config.enabled_override {
        settings
            .set_enabled(enabled)
            .await
            .context("Failed to apply CAPTURE_ENABLED")?;
    }
    if let Some(context) = config.context_override.clone() {
        settings
            .set_context(context)
            .await
            .context("Failed to apply CAPTURE_CONTEXT")?;
    }

    let runner = load_runner(&config)?;
    let detector = Arc::new(FaceDetector::new(runner, config.decoder.clone()));
    let encoder = Arc::new(ImageEncoder::new(config.encoder.clone()));
    let classifier =
        ClassifierClient::new(config.client.clone()).context("Failed to create HTTP client")?;
    let source = LocalFolderSource::new(&config.frames_dir);

    let orchestrator = Arc::new(CaptureOrchestrator::new(
        Arc::new(source),
        detector,
        encoder,
        Arc::new(classifier),
        settings.subscribe(),
        config.max_faces,
    ));
    orchestrator
        .initialize()
        .context("Failed to initialize face detector")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Pick up edits to the settings file made by other tools
    let settings_poll = {
        let settings = Arc::clone(&settings);
        let mut shutdown = shutdown_rx.clone();
        let mut interval = tokio::time::interval(config.settings_poll);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {
                        if let Err(e) = settings.reload().await {
                            warn!("Failed to reload capture settings: {}", e);
                        }
                    }
                }
            }
        })
    };

    // Mirror status changes into the log
    let status_log = {
        let mut status = orchestrator.subscribe_status();
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let snapshot = status.borrow_and_update().clone();
                match &snapshot.message {
                    Some(message) => info!(status = %snapshot.status, "{}", message),
                    None if snapshot.status.is_active() => {
                        debug!(status = %snapshot.status, "Status")
                    }
                    None => info!(status = %snapshot.status, faces = snapshot.faces, "Status"),
                }
                if let Some(dominant) = snapshot.analysis.as_ref().and_then(|a| a.dominant()) {
                    info!(
                        label = dominant.label.as_str(),
                        confidence = dominant.confidence,
                        "Latest dominant emotion"
                    );
                }
            }
        })
    };

    let scheduler =
        CaptureScheduler::new(Arc::clone(&orchestrator), settings.subscribe(), config.period);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    shutdown_tx.send(true).ok();

    scheduler_handle.await.ok();
    settings_poll.await.ok();
    status_log.abort();

    info!("Capture worker shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("emo_worker=info".parse()?)
        .add_directive("emo_media=info".parse()?)
        .add_directive("emo_client=info".parse()?)
        .add_directive("ort=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()?;
    }
    Ok(())
}

#[cfg(feature = "onnx")]
fn load_runner(config: &CaptureConfig) -> anyhow::Result<Arc<dyn InferenceRunner>> {
    let (width, height) = config.model_input;
    let mut runner = emo_media::OnnxRunner::load(&config.model_path, width, height)
        .context("Failed to load detector model")?;
    if let Some(output) = &config.model_output {
        runner = runner.with_output_name(output);
    }
    Ok(Arc::new(runner))
}

#[cfg(not(feature = "onnx"))]
fn load_runner(config: &CaptureConfig) -> anyhow::Result<Arc<dyn InferenceRunner>> {
    Err(anyhow!(
        "cannot load {}: emo-capture was built without the `onnx` feature",
        config.model_path.display()
    ))
}
