//! Configuration loader — merges defaults, config.toml, .env, and
//! environment overrides, then validates.

use std::path::Path;

use common::config::ServiceConfig;
use common::Error;

fn parse_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a non-negative integer")))
}

fn parse_usize(raw: &str, env_name: &str) -> Result<usize, Error> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| Error::Config(format!("{env_name} must be a non-negative integer")))
}

fn validate_config(config: &ServiceConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.regions.is_empty() {
        issues.push("regions must contain at least one region".into());
    }
    for region in &config.regions {
        if let Err(e) = region.geometry.validate() {
            issues.push(format!("region {:?}: {}", region.name, e));
        }
        if region.periods == 0 || region.periods > config.tasks.max_periods {
            issues.push(format!(
                "region {:?}: periods must be between 1 and {}",
                region.name, config.tasks.max_periods
            ));
        }
        if region.history_years == 0 {
            issues.push(format!(
                "region {:?}: history_years must be > 0",
                region.name
            ));
        }
    }

    if config.cache.raw_ttl_days == 0 {
        issues.push("cache.raw_ttl_days must be > 0".into());
    }
    if config.cache.model_ttl_days == 0 {
        issues.push("cache.model_ttl_days must be > 0".into());
    }

    if config.tasks.max_periods == 0 {
        issues.push("tasks.max_periods must be > 0".into());
    }
    if config.tasks.retention_secs == 0 {
        issues.push("tasks.retention_secs must be > 0".into());
    }

    if config.timing.refresh_interval_secs == 0 {
        issues.push("timing.refresh_interval_secs must be > 0".into());
    }
    if config.timing.maintenance_interval_secs == 0 {
        issues.push("timing.maintenance_interval_secs must be > 0".into());
    }

    if config.meteo.base_url.trim().is_empty() {
        issues.push("meteo.base_url must not be empty".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load service configuration from environment and optional config file.
pub fn load_config() -> Result<ServiceConfig, Error> {
    // 1. Load .env from the working directory or parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = ServiceConfig::default();

    // 3. Layer config.toml on top if present.
    let config_path =
        std::env::var("LANDCAST_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config_path = Path::new(&config_path);
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", config_path.display(), e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", config_path.display(), e)))?;
    }

    // 4. Environment overrides (highest priority).
    if let Ok(url) = std::env::var("LANDCAST_EARTH_BASE_URL") {
        config.earth.base_url = url;
    }
    if let Ok(key) = std::env::var("LANDCAST_EARTH_API_KEY") {
        config.earth.api_key = key;
    }
    if let Ok(url) = std::env::var("LANDCAST_METEO_BASE_URL") {
        config.meteo.base_url = url;
    }
    if let Ok(raw) = std::env::var("LANDCAST_RAW_TTL_DAYS") {
        config.cache.raw_ttl_days = parse_u64(&raw, "LANDCAST_RAW_TTL_DAYS")?;
    }
    if let Ok(raw) = std::env::var("LANDCAST_MODEL_TTL_DAYS") {
        config.cache.model_ttl_days = parse_u64(&raw, "LANDCAST_MODEL_TTL_DAYS")?;
    }
    if let Ok(raw) = std::env::var("LANDCAST_TASK_TIMEOUT_SECS") {
        config.tasks.timeout_secs = parse_u64(&raw, "LANDCAST_TASK_TIMEOUT_SECS")?;
    }
    if let Ok(raw) = std::env::var("LANDCAST_TASK_RETENTION_SECS") {
        config.tasks.retention_secs = parse_u64(&raw, "LANDCAST_TASK_RETENTION_SECS")?;
    }
    if let Ok(raw) = std::env::var("LANDCAST_MAX_PERIODS") {
        config.tasks.max_periods = parse_usize(&raw, "LANDCAST_MAX_PERIODS")?;
    }
    if let Ok(raw) = std::env::var("LANDCAST_REFRESH_INTERVAL_SECS") {
        config.timing.refresh_interval_secs = parse_u64(&raw, "LANDCAST_REFRESH_INTERVAL_SECS")?;
    }

    // 5. Required fields.
    if config.earth.base_url.trim().is_empty() {
        return Err(Error::Config(
            "LANDCAST_EARTH_BASE_URL is required (set in .env, environment, or config.toml)".into(),
        ));
    }

    validate_config(&config)?;

    Ok(config)
}
