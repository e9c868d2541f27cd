//! Cache-aware fit/forecast pipeline.
//!
//! The engine cleans the input series, reuses a cached fitted model when
//! the caller supplies a cache key and the series fingerprint matches,
//! fits otherwise, and stores fresh fits back under the model TTL. The
//! fingerprint is part of the model cache key, so changed data can never
//! resurrect a stale model.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};

use common::types::{ConfidenceInterval, ForecastResult, ModelInfo, SeriesData};
use common::Error;
use compute_cache::fingerprint::{compose_key, series_fingerprint};
use compute_cache::{CacheDomain, ComputationCache};

use crate::arima::{self, FittedModel};

pub struct ForecastEngine {
    cache: Arc<ComputationCache>,
}

impl ForecastEngine {
    pub fn new(cache: Arc<ComputationCache>) -> Self {
        Self { cache }
    }

    /// Produce a `periods`-step forecast from a dated series.
    ///
    /// With `cache_key`, the fitted model is looked up at
    /// `model:<cache_key>:<series fingerprint>` and stored there after a
    /// fresh fit. `served_from_cache` reports which path ran.
    pub async fn forecast(
        &self,
        series: &SeriesData,
        periods: usize,
        cache_key: Option<&str>,
        seasonal: bool,
    ) -> Result<ForecastResult, Error> {
        if periods == 0 {
            return Err(Error::InvalidPeriods(
                "forecast periods must be positive".into(),
            ));
        }

        let points = series.valid_points();
        let last_date = match points.last() {
            Some((date, _)) => *date,
            None => return Err(Error::NoValidData),
        };
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();

        let fingerprint = series_fingerprint(&values);
        let model_key = cache_key.map(|key| compose_key(CacheDomain::Model, key, &[&fingerprint]));

        let (model, served_from_cache) = match &model_key {
            Some(key) => match self.lookup_model(key).await {
                Some(model) => (model, true),
                None => (arima::fit(&values, seasonal, &fingerprint)?, false),
            },
            None => (arima::fit(&values, seasonal, &fingerprint)?, false),
        };

        if served_from_cache {
            debug!(
                "Reusing cached {} (trained on {} observations)",
                model.describe(),
                model.nobs
            );
        } else {
            info!(
                "Fitted {} on {} observations (aic={:.2})",
                model.describe(),
                model.nobs,
                model.aic
            );
        }

        let fc = model.forecast(periods);
        let (lower, upper) = fc.bounds();
        let forecast_dates = month_starts_after(last_date, periods);

        if !served_from_cache {
            if let Some(key) = &model_key {
                let payload = serde_json::to_value(&model)?;
                self.cache
                    .put(CacheDomain::Model, key, &fingerprint, payload)
                    .await;
            }
        }

        Ok(ForecastResult {
            forecast_dates,
            values: fc.mean,
            confidence_interval: ConfidenceInterval { lower, upper },
            model_info: ModelInfo {
                model_type: model.describe(),
                order: model.order,
                seasonal_order: model.seasonal_order,
                aic: model.aic,
            },
            served_from_cache,
        })
    }

    async fn lookup_model(&self, key: &str) -> Option<FittedModel> {
        let entry = self.cache.get(CacheDomain::Model, key).await?;
        match serde_json::from_value(entry.payload) {
            Ok(model) => Some(model),
            Err(e) => {
                // Unreadable cached state is a miss, not a failure.
                warn!("Discarding undecodable cached model at {}: {}", key, e);
                None
            }
        }
    }
}

/// `periods` consecutive month-start dates beginning the month after
/// `last`.
fn month_starts_after(last: NaiveDate, periods: usize) -> Vec<NaiveDate> {
    let mut year = last.year();
    let mut month = last.month();
    let mut out = Vec::with_capacity(periods);
    for _ in 0..periods {
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
        out.push(NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is valid"));
    }
    out
}
