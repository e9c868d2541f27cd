//! Domain types shared across the service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Geospatial input ──────────────────────────────────────────────────

/// A GeoJSON-style geometry describing a region of interest.
///
/// Coordinates are kept as raw JSON: the service never does geometry math,
/// it only validates the shape and derives cache keys from the canonical
/// serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: serde_json::Value,
}

impl Geometry {
    /// Build a polygon from linear rings of `[lon, lat]` positions.
    pub fn polygon(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self {
            kind: "Polygon".into(),
            coordinates: serde_json::json!(rings),
        }
    }

    /// Validate the shape the way the submission surface requires:
    /// a polygon with at least one ring of at least four positions.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.kind != "Polygon" {
            return Err(crate::Error::InvalidInput(format!(
                "unsupported geometry type: {}",
                self.kind
            )));
        }
        let rings = self
            .coordinates
            .as_array()
            .ok_or_else(|| crate::Error::InvalidInput("coordinates must be an array".into()))?;
        let first = rings
            .first()
            .and_then(|r| r.as_array())
            .ok_or_else(|| crate::Error::InvalidInput("polygon has no rings".into()))?;
        if first.len() < 4 {
            return Err(crate::Error::InvalidInput(
                "polygon ring needs at least 4 positions".into(),
            ));
        }
        Ok(())
    }
}

/// Where a series is sampled: an area geometry (vegetation indices) or a
/// lat/lon point (weather archives).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Location {
    Area(Geometry),
    Point { lat: f64, lon: f64 },
}

/// Inclusive date range for historical queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, crate::Error> {
        if end <= start {
            return Err(crate::Error::InvalidInput(
                "end date must be after start date".into(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Compact label used as a cache-key discriminator.
    pub fn cache_dims(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

// ── Series ────────────────────────────────────────────────────────────

/// Which series a provider is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Ndvi,
    Evi,
    Savi,
    Temperature,
    Precipitation,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Ndvi => "ndvi",
            SeriesKind::Evi => "evi",
            SeriesKind::Savi => "savi",
            SeriesKind::Temperature => "temperature",
            SeriesKind::Precipitation => "precipitation",
        }
    }

    /// Vegetation indices come from area imagery; weather variables from
    /// point archives.
    pub fn is_vegetation(&self) -> bool {
        matches!(self, SeriesKind::Ndvi | SeriesKind::Evi | SeriesKind::Savi)
    }
}

/// A dated numeric series as returned by providers. Values may contain
/// gaps (cloudy months, missing archive days) — the engine drops them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesData {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl SeriesData {
    pub fn len(&self) -> usize {
        self.dates.len().min(self.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paired observations with gaps and non-finite values removed,
    /// preserving order.
    pub fn valid_points(&self) -> Vec<(NaiveDate, f64)> {
        self.dates
            .iter()
            .zip(self.values.iter())
            .filter_map(|(d, v)| match v {
                Some(x) if x.is_finite() => Some((*d, *x)),
                _ => None,
            })
            .collect()
    }
}

// ── Forecast output ───────────────────────────────────────────────────

/// Two-sided per-step bounds around the point forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Description of the model a forecast came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(rename = "type")]
    pub model_type: String,
    pub order: (usize, usize, usize),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_order: Option<(usize, usize, usize, usize)>,
    pub aic: f64,
}

/// A completed forecast: point estimates, interval bounds, and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub forecast_dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub confidence_interval: ConfidenceInterval,
    pub model_info: ModelInfo,
    pub served_from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::polygon(vec![vec![
            [36.0, -1.0],
            [36.1, -1.0],
            [36.1, -0.9],
            [36.0, -0.9],
            [36.0, -1.0],
        ]])
    }

    #[test]
    fn test_polygon_validates() {
        assert!(square().validate().is_ok());
    }

    #[test]
    fn test_non_polygon_rejected() {
        let g = Geometry {
            kind: "Point".into(),
            coordinates: serde_json::json!([36.0, -1.0]),
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_short_ring_rejected() {
        let g = Geometry::polygon(vec![vec![[36.0, -1.0], [36.1, -1.0], [36.0, -1.0]]]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_valid_points_drops_gaps_and_nan() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let series = SeriesData {
            dates: vec![d("2024-01-15"), d("2024-02-15"), d("2024-03-15"), d("2024-04-15")],
            values: vec![Some(0.5), None, Some(f64::NAN), Some(0.7)],
        };
        let points = series.valid_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], (d("2024-01-15"), 0.5));
        assert_eq!(points[1], (d("2024-04-15"), 0.7));
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert!(DateRange::new(d("2024-06-01"), d("2024-01-01")).is_err());
        let range = DateRange::new(d("2023-01-01"), d("2024-12-31")).unwrap();
        assert_eq!(range.cache_dims(), "20230101_20241231");
    }
}
