//! Landcast: vegetation and weather forecasting daemon.
//!
//! Single-binary Tokio application that:
//! 1. Loads region and provider configuration
//! 2. Accepts forecast submissions through an async task orchestrator
//! 3. Keeps scheduled region forecasts warm on an interval
//! 4. Sweeps expired cache entries and stale finished tasks

mod config;
mod service;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info, warn};

use common::types::{DateRange, Location, SeriesKind};
use common::SeriesProvider;
use earth_client::EarthEngineClient;
use meteo_client::MeteoClient;
use orchestrator::TaskStatus;
use service::ForecastService;

/// Vegetation and weather forecasting service
#[derive(Parser)]
#[command(name = "landcast", about = "Vegetation and weather forecasting service")]
struct Cli {
    /// Submit one forecast for the first configured region, poll it to a
    /// terminal state, print the result as JSON, and exit.
    #[arg(long)]
    once: bool,

    /// Probe the configured data providers and exit.
    #[arg(long)]
    check_providers: bool,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "landcast=info,earth_client=info,meteo_client=info,orchestrator=info,compute_cache=info,forecast=info"
                    .into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("Landcast starting up...");

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Regions: {:?}",
        cfg.regions.iter().map(|r| &r.name).collect::<Vec<_>>()
    );
    info!(
        "Cache TTLs: raw={}d, model={}d",
        cfg.cache.raw_ttl_days, cfg.cache.model_ttl_days
    );
    info!(
        "Tasks: timeout={}s, retention={}s, max_periods={}",
        cfg.tasks.timeout_secs, cfg.tasks.retention_secs, cfg.tasks.max_periods
    );

    let earth: Arc<dyn SeriesProvider> = Arc::new(EarthEngineClient::new(&cfg.earth));
    let meteo: Arc<dyn SeriesProvider> = Arc::new(MeteoClient::new(&cfg.meteo));

    // ── Check-providers mode ─────────────────────────────────────────
    if cli.check_providers {
        run_provider_check(&cfg, earth.as_ref(), meteo.as_ref()).await;
        return;
    }

    let service = Arc::new(ForecastService::new(cfg.clone(), earth, meteo));

    // ── Once mode ────────────────────────────────────────────────────
    if cli.once {
        run_once(&service).await;
        return;
    }

    // ── Spawn daemon loops ───────────────────────────────────────────
    info!("Spawning daemon loops...");

    // Loop 1: scheduled region forecasts.
    let refresh_service = service.clone();
    let refresh_cfg = cfg.clone();
    let refresh_handle = tokio::spawn(async move {
        loop {
            run_region_refresh(&refresh_service).await;
            sleep(Duration::from_secs(refresh_cfg.timing.refresh_interval_secs)).await;
        }
    });

    // Loop 2: cache purge + finished-task pruning.
    let maint_service = service.clone();
    let maint_cfg = cfg.clone();
    let maintenance_handle = tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(
                maint_cfg.timing.maintenance_interval_secs,
            ))
            .await;
            let (purged, pruned) = maint_service.run_maintenance().await;
            info!(
                "Maintenance sweep: {} cache entries purged, {} tasks pruned",
                purged, pruned
            );
        }
    });

    // Loop 3: heartbeat.
    let hb_service = service.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let counts = hb_service.task_counts().await;
            info!(
                "HEARTBEAT: tasks total={} pending={} processing={} completed={} failed={}",
                counts.total(),
                counts.pending,
                counts.processing,
                counts.completed,
                counts.failed
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("🌱 Landcast is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = refresh_handle => {
            error!("Refresh loop exited: {:?}", r);
        }
        r = maintenance_handle => {
            error!("Maintenance loop exited: {:?}", r);
        }
        r = heartbeat_handle => {
            error!("Heartbeat loop exited: {:?}", r);
        }
    }

    info!("Landcast shut down.");
}

// ── Mode implementations ──────────────────────────────────────────────

async fn run_provider_check(
    cfg: &common::config::ServiceConfig,
    earth: &dyn SeriesProvider,
    meteo: &dyn SeriesProvider,
) {
    info!("Probing providers...");
    let end = Utc::now().date_naive();
    let start = end - chrono::Duration::days(365);
    let range = match DateRange::new(start, end) {
        Ok(r) => r,
        Err(e) => {
            error!("Probe range construction failed: {}", e);
            std::process::exit(1);
        }
    };

    let region = match cfg.regions.first() {
        Some(r) => r,
        None => {
            error!("No regions configured");
            std::process::exit(1);
        }
    };

    match earth
        .get_series(&Location::Area(region.geometry.clone()), region.index, &range)
        .await
    {
        Ok(series) => info!(
            "✅ Imagery provider OK: {} monthly composites for {:?}",
            series.len(),
            region.name
        ),
        Err(e) => {
            error!("❌ Imagery provider check failed: {}", e);
            std::process::exit(1);
        }
    }

    let probe = Location::Point {
        lat: -1.286,
        lon: 36.817,
    };
    match meteo
        .get_series(&probe, SeriesKind::Temperature, &range)
        .await
    {
        Ok(series) => info!("✅ Weather archive OK: {} monthly rows", series.len()),
        Err(e) => {
            error!("❌ Weather archive check failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_once(service: &ForecastService) {
    let region = service.config().regions[0].clone();
    info!(
        "Running single forecast for {:?} ({} x{} months, seasonal={})",
        region.name,
        region.index.as_str(),
        region.periods,
        region.seasonal
    );

    let submitted = match service
        .submit_vegetation_forecast(
            region.geometry,
            region.index,
            region.periods,
            region.seasonal,
            region.history_years,
        )
        .await
    {
        Ok(s) => s,
        Err(e) => {
            error!("Submission rejected: {}", e);
            std::process::exit(1);
        }
    };
    info!("Task {} accepted; polling...", submitted.task_id);

    loop {
        sleep(POLL_INTERVAL).await;
        let Some(view) = service.task_status(&submitted.task_id).await else {
            error!("Task {} disappeared", submitted.task_id);
            std::process::exit(1);
        };
        match view.status {
            TaskStatus::Completed | TaskStatus::Failed => {
                let rendered = serde_json::to_string_pretty(&view)
                    .unwrap_or_else(|_| format!("{view:?}"));
                println!("{rendered}");
                if view.status == TaskStatus::Failed {
                    std::process::exit(1);
                }
                return;
            }
            _ => {}
        }
    }
}

async fn run_region_refresh(service: &ForecastService) {
    info!("Refreshing scheduled region forecasts...");
    let regions = service.config().regions.clone();
    for region in regions {
        match service
            .submit_vegetation_forecast(
                region.geometry.clone(),
                region.index,
                region.periods,
                region.seasonal,
                region.history_years,
            )
            .await
        {
            Ok(submitted) => {
                info!("Submitted {:?} refresh as task {}", region.name, submitted.task_id);
            }
            Err(e) => {
                warn!("Refresh submission for {:?} rejected: {}", region.name, e);
            }
        }
    }
}
