//! ARIMA(1,1,1) / SARIMA(1,1,1)(1,1,1,12) estimation and forecasting.
//!
//! Estimation is Hannan–Rissanen two-stage conditional least squares: a
//! long autoregression supplies residual proxies, then the ARMA
//! coefficients come from one OLS pass on lagged values and lagged
//! residuals. Prediction intervals use the psi-weight expansion of the
//! full (integrated) operator, so they widen with the horizon.
//!
//! The fitted state is a plain serde struct — coefficients, variance, and
//! the series tails needed to forecast — so cached models stay readable
//! across versions and implementations.

use serde::{Deserialize, Serialize};

use common::Error;

/// Seasonal period: annual seasonality over monthly data.
pub const SEASONAL_PERIOD: usize = 12;

/// Fewest observations accepted for a non-seasonal (1,1,1) fit.
pub const MIN_NONSEASONAL_OBS: usize = 10;

/// Fewest observations accepted for a seasonal fit: three full cycles.
/// (The seasonal difference alone needs 13 points; estimating the lag-12
/// regressors needs usable rows on top of that.)
pub const MIN_SEASONAL_OBS: usize = 36;

/// Two-sided 95% coverage.
const Z_95: f64 = 1.959963984540054;

/// Coefficient clamp keeping the fit stationary and invertible.
const COEF_LIMIT: f64 = 0.98;

const VAR_FLOOR: f64 = 1e-12;

// ── Fitted state ──────────────────────────────────────────────────────

/// A fitted model plus the trailing state needed to forecast from the end
/// of its training series. Serializes to portable JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    pub order: (usize, usize, usize),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_order: Option<(usize, usize, usize, usize)>,
    /// Non-seasonal AR coefficient (phi).
    pub ar: f64,
    /// Non-seasonal MA coefficient (theta).
    pub ma: f64,
    /// Seasonal AR coefficient (Phi); 0 for non-seasonal fits.
    pub seasonal_ar: f64,
    /// Seasonal MA coefficient (Theta); 0 for non-seasonal fits.
    pub seasonal_ma: f64,
    pub intercept: f64,
    pub sigma2: f64,
    pub aic: f64,
    pub nobs: usize,
    /// Fingerprint of the series the model was trained on.
    pub trained_on: String,
    /// Trailing values of the fully differenced series, oldest first.
    diff_tail: Vec<f64>,
    /// Trailing residuals aligned with `diff_tail`.
    resid_tail: Vec<f64>,
    /// Trailing values of the once-differenced series (seasonal fits only).
    first_diff_tail: Vec<f64>,
    /// Last observation of the original series.
    last_value: f64,
}

/// Point forecast plus per-step standard errors on the original scale.
#[derive(Debug, Clone)]
pub struct Forecast {
    pub mean: Vec<f64>,
    pub std_err: Vec<f64>,
}

impl Forecast {
    /// 95% bounds around the point forecast.
    pub fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let lower = self
            .mean
            .iter()
            .zip(&self.std_err)
            .map(|(m, se)| m - Z_95 * se)
            .collect();
        let upper = self
            .mean
            .iter()
            .zip(&self.std_err)
            .map(|(m, se)| m + Z_95 * se)
            .collect();
        (lower, upper)
    }
}

impl FittedModel {
    pub fn describe(&self) -> String {
        match self.seasonal_order {
            Some((p, d, q, s)) => format!(
                "SARIMA({},{},{})({},{},{},{})",
                self.order.0, self.order.1, self.order.2, p, d, q, s
            ),
            None => format!(
                "ARIMA({},{},{})",
                self.order.0, self.order.1, self.order.2
            ),
        }
    }

    fn seasonal(&self) -> bool {
        self.seasonal_order.is_some()
    }

    /// Forecast `steps` ahead from the end of the training series.
    pub fn forecast(&self, steps: usize) -> Forecast {
        let s = SEASONAL_PERIOD;

        // Recurse on the differenced scale with future shocks at zero.
        let mut z = self.diff_tail.clone();
        let mut e = self.resid_tail.clone();
        let base = z.len();
        for h in 0..steps {
            let t = base + h;
            let at = |v: &Vec<f64>, lag: usize| {
                if t >= lag {
                    v.get(t - lag).copied().unwrap_or(0.0)
                } else {
                    0.0
                }
            };
            let mut next = self.intercept + self.ar * at(&z, 1) + self.ma * at(&e, 1);
            if self.seasonal() {
                next += self.seasonal_ar * at(&z, s) - self.ar * self.seasonal_ar * at(&z, s + 1);
                next += self.seasonal_ma * at(&e, s) + self.ma * self.seasonal_ma * at(&e, s + 1);
            }
            z.push(next);
            e.push(0.0);
        }
        let z_future = &z[base..];

        // Undo the differencing.
        let mean = if self.seasonal() {
            let mut w = self.first_diff_tail.clone();
            let wbase = w.len();
            for (h, zf) in z_future.iter().enumerate() {
                let t = wbase + h;
                let prev_season = if t >= s { w[t - s] } else { 0.0 };
                w.push(prev_season + zf);
            }
            let mut y = Vec::with_capacity(steps);
            let mut prev = self.last_value;
            for wf in &w[wbase..] {
                prev += wf;
                y.push(prev);
            }
            y
        } else {
            let mut y = Vec::with_capacity(steps);
            let mut prev = self.last_value;
            for zf in z_future {
                prev += zf;
                y.push(prev);
            }
            y
        };

        // Forecast error variance from psi weights of the full operator.
        let psi = self.psi_weights(steps);
        let mut cum = 0.0;
        let std_err = (0..steps)
            .map(|h| {
                cum += psi[h] * psi[h];
                (self.sigma2 * cum).sqrt()
            })
            .collect();

        Forecast { mean, std_err }
    }

    /// Psi weights of theta(B) / [phi(B) * (1-B)^d * (1-B^s)^D].
    fn psi_weights(&self, steps: usize) -> Vec<f64> {
        let s = SEASONAL_PERIOD;

        // AR side: stationary factors times the differencing operators.
        let mut ar_poly = vec![1.0, -self.ar];
        if self.seasonal() {
            let mut seasonal_ar = vec![0.0; s + 1];
            seasonal_ar[0] = 1.0;
            seasonal_ar[s] = -self.seasonal_ar;
            ar_poly = poly_mul(&ar_poly, &seasonal_ar);
        }
        ar_poly = poly_mul(&ar_poly, &[1.0, -1.0]); // (1-B)^d, d = 1
        if self.seasonal() {
            let mut seasonal_diff = vec![0.0; s + 1];
            seasonal_diff[0] = 1.0;
            seasonal_diff[s] = -1.0;
            ar_poly = poly_mul(&ar_poly, &seasonal_diff); // (1-B^s)^D, D = 1
        }

        let mut ma_poly = vec![1.0, self.ma];
        if self.seasonal() {
            let mut seasonal_ma = vec![0.0; s + 1];
            seasonal_ma[0] = 1.0;
            seasonal_ma[s] = self.seasonal_ma;
            ma_poly = poly_mul(&ma_poly, &seasonal_ma);
        }

        let mut psi = vec![0.0; steps];
        for j in 0..steps {
            if j == 0 {
                psi[0] = 1.0;
                continue;
            }
            let mut value = ma_poly.get(j).copied().unwrap_or(0.0);
            for i in 1..=j.min(ar_poly.len() - 1) {
                value -= ar_poly[i] * psi[j - i];
            }
            psi[j] = value;
        }
        psi
    }
}

// ── Fitting ───────────────────────────────────────────────────────────

/// Fit an order-(1,1,1) model; seasonal mode adds the (1,1,1,12) factor.
///
/// `trained_on` is the fingerprint of the cleaned input series and travels
/// with the model into the cache.
pub fn fit(values: &[f64], seasonal: bool, trained_on: &str) -> Result<FittedModel, Error> {
    if seasonal {
        fit_seasonal(values, trained_on)
    } else {
        fit_nonseasonal(values, trained_on)
    }
}

fn fit_nonseasonal(values: &[f64], trained_on: &str) -> Result<FittedModel, Error> {
    let n = values.len();
    if n < MIN_NONSEASONAL_OBS {
        return Err(Error::InsufficientHistory(format!(
            "ARIMA(1,1,1) needs at least {} observations, got {}",
            MIN_NONSEASONAL_OBS, n
        )));
    }

    let z = diff(values, 1);
    let m = z.len();

    let (ar, ma, intercept, resid) = if variance(&z) <= VAR_FLOOR {
        // Constant differences: pure drift, zero-variance residuals.
        (0.0, 0.0, mean(&z), vec![0.0; m])
    } else {
        let (phi, theta, c) = hannan_rissanen(&z, &[1], &[1])?;
        let resid = css_residuals(&z, c, phi, 0.0, theta, 0.0, false);
        (phi, theta, c, resid)
    };

    let params = 3; // c, phi, theta
    let sigma2 = residual_variance(&resid, 1, params);
    let aic = aic(&resid, 1, params);

    Ok(FittedModel {
        order: (1, 1, 1),
        seasonal_order: None,
        ar,
        ma,
        seasonal_ar: 0.0,
        seasonal_ma: 0.0,
        intercept,
        sigma2,
        aic,
        nobs: n,
        trained_on: trained_on.to_string(),
        diff_tail: tail(&z, 2),
        resid_tail: tail(&resid, 2),
        first_diff_tail: Vec::new(),
        last_value: values[n - 1],
    })
}

fn fit_seasonal(values: &[f64], trained_on: &str) -> Result<FittedModel, Error> {
    let s = SEASONAL_PERIOD;
    let n = values.len();
    if n < MIN_SEASONAL_OBS {
        return Err(Error::InsufficientHistory(format!(
            "SARIMA(1,1,1)(1,1,1,{}) needs at least {} observations, got {} \
             (seasonal differencing alone needs {})",
            s,
            MIN_SEASONAL_OBS,
            n,
            s + 1
        )));
    }

    let w = diff(values, 1);
    let z = seasonal_diff(&w, s);
    let m = z.len();

    let (ar, seasonal_ar, ma, seasonal_ma, intercept, resid) = if variance(&z) <= VAR_FLOOR {
        (0.0, 0.0, 0.0, 0.0, mean(&z), vec![0.0; m])
    } else {
        let (coefs, c) = hannan_rissanen_multi(&z, &[1, s], &[1, s])?;
        let (phi, cap_phi, theta, cap_theta) = (coefs[0], coefs[1], coefs[2], coefs[3]);
        let resid = css_residuals(&z, c, phi, cap_phi, theta, cap_theta, true);
        (phi, cap_phi, theta, cap_theta, c, resid)
    };

    let params = 5; // c, phi, Phi, theta, Theta
    let burn_in = s + 1;
    let sigma2 = residual_variance(&resid, burn_in, params);
    let aic = aic(&resid, burn_in, params);

    Ok(FittedModel {
        order: (1, 1, 1),
        seasonal_order: Some((1, 1, 1, s)),
        ar,
        ma,
        seasonal_ar,
        seasonal_ma,
        intercept,
        sigma2,
        aic,
        nobs: n,
        trained_on: trained_on.to_string(),
        diff_tail: tail(&z, s + 2),
        resid_tail: tail(&resid, s + 2),
        first_diff_tail: tail(&w, s),
        last_value: values[n - 1],
    })
}

/// Two-stage conditional least squares for ARMA(1,1) on `z`.
fn hannan_rissanen(z: &[f64], ar_lags: &[usize], ma_lags: &[usize]) -> Result<(f64, f64, f64), Error> {
    let (coefs, c) = hannan_rissanen_multi(z, ar_lags, ma_lags)?;
    Ok((coefs[0], coefs[1], c))
}

/// Generalized Hannan–Rissanen: regress z_t on the given AR lags of z and
/// MA lags of stage-one residuals. Returns (coefficients in ar_lags ++
/// ma_lags order, intercept).
fn hannan_rissanen_multi(
    z: &[f64],
    ar_lags: &[usize],
    ma_lags: &[usize],
) -> Result<(Vec<f64>, f64), Error> {
    let m = z.len();

    // Stage 1: long AR to approximate the shocks.
    let k = (m / 3).clamp(1, 13);
    let resid_proxy = long_ar_residuals(z, k)?;

    // Stage 2: OLS on lagged values and lagged residual proxies.
    let max_lag = ar_lags
        .iter()
        .chain(ma_lags.iter())
        .copied()
        .max()
        .unwrap_or(1);
    let start = max_lag.max(1);
    let rows = m.saturating_sub(start);
    let cols = 1 + ar_lags.len() + ma_lags.len();
    if rows < cols + 2 {
        return Err(Error::FitFailed(format!(
            "not enough differenced observations for regression ({} rows, {} parameters)",
            rows, cols
        )));
    }

    let mut x = Vec::with_capacity(rows);
    let mut y = Vec::with_capacity(rows);
    for t in start..m {
        let mut row = Vec::with_capacity(cols);
        row.push(1.0);
        for lag in ar_lags {
            row.push(z[t - lag]);
        }
        for lag in ma_lags {
            row.push(resid_proxy[t - lag]);
        }
        x.push(row);
        y.push(z[t]);
    }

    let beta = ols(&x, &y).ok_or_else(|| {
        Error::FitFailed("normal equations are singular; series may be degenerate".into())
    })?;

    let c = beta[0];
    let coefs: Vec<f64> = beta[1..]
        .iter()
        .map(|b| b.clamp(-COEF_LIMIT, COEF_LIMIT))
        .collect();
    Ok((coefs, c))
}

/// Residuals of an OLS AR(k) fit, zero-padded over the first k points.
fn long_ar_residuals(z: &[f64], k: usize) -> Result<Vec<f64>, Error> {
    let m = z.len();
    let mut x = Vec::with_capacity(m - k);
    let mut y = Vec::with_capacity(m - k);
    for t in k..m {
        let mut row = Vec::with_capacity(k + 1);
        row.push(1.0);
        for i in 1..=k {
            row.push(z[t - i]);
        }
        x.push(row);
        y.push(z[t]);
    }
    let beta = ols(&x, &y).ok_or_else(|| {
        Error::FitFailed("long autoregression is singular; series may be degenerate".into())
    })?;

    let mut resid = vec![0.0; m];
    for t in k..m {
        let mut fitted = beta[0];
        for i in 1..=k {
            fitted += beta[i] * z[t - i];
        }
        resid[t] = z[t] - fitted;
    }
    Ok(resid)
}

/// Conditional-sum-of-squares residual recursion with pre-sample values
/// treated as zero.
fn css_residuals(
    z: &[f64],
    c: f64,
    phi: f64,
    cap_phi: f64,
    theta: f64,
    cap_theta: f64,
    seasonal: bool,
) -> Vec<f64> {
    let s = SEASONAL_PERIOD;
    let mut e = vec![0.0; z.len()];
    for t in 0..z.len() {
        let zv = |lag: usize| if t >= lag { z[t - lag] } else { 0.0 };
        let ev = |lag: usize| if t >= lag { e[t - lag] } else { 0.0 };
        let mut pred = c + phi * zv(1) + theta * ev(1);
        if seasonal {
            pred += cap_phi * zv(s) - phi * cap_phi * zv(s + 1);
            pred += cap_theta * ev(s) + theta * cap_theta * ev(s + 1);
        }
        e[t] = z[t] - pred;
    }
    e
}

// ── Numeric helpers ───────────────────────────────────────────────────

fn diff(values: &[f64], order: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..order {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

fn seasonal_diff(values: &[f64], period: usize) -> Vec<f64> {
    values
        .iter()
        .skip(period)
        .zip(values.iter())
        .map(|(a, b)| a - b)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64
}

fn tail(values: &[f64], len: usize) -> Vec<f64> {
    values[values.len().saturating_sub(len)..].to_vec()
}

fn residual_variance(resid: &[f64], burn_in: usize, params: usize) -> f64 {
    let usable = &resid[burn_in.min(resid.len())..];
    let df = usable.len().saturating_sub(params).max(1);
    let sse: f64 = usable.iter().map(|e| e * e).sum();
    (sse / df as f64).max(VAR_FLOOR)
}

fn aic(resid: &[f64], burn_in: usize, params: usize) -> f64 {
    let usable = resid.len().saturating_sub(burn_in).max(1);
    let sse: f64 = resid[burn_in.min(resid.len())..]
        .iter()
        .map(|e| e * e)
        .sum();
    let sigma2 = (sse / usable as f64).max(VAR_FLOOR);
    usable as f64 * sigma2.ln() + 2.0 * (params as f64 + 1.0)
}

/// OLS via normal equations, Gaussian elimination with partial pivoting.
/// Returns `None` when the system is singular.
fn ols(x: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let p = x.first()?.len();
    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for (row, &target) in x.iter().zip(y.iter()) {
        for i in 0..p {
            xty[i] += row[i] * target;
            for j in 0..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    solve(&mut xtx, &mut xty)
}

fn solve(a: &mut [Vec<f64>], b: &mut [f64]) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot_row][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut out = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row][k] * out[k];
        }
        out[row] = acc / a[row][row];
    }
    Some(out)
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic monthly vegetation-like series: trend + annual cycle
    /// + small aperiodic wobble. No RNG so tests are reproducible.
    fn synthetic_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| {
                let t = t as f64;
                0.55 + 0.002 * t
                    + 0.12 * (t * std::f64::consts::PI / 6.0).sin()
                    + 0.015 * (t * 2.39996).sin()
            })
            .collect()
    }

    #[test]
    fn test_fit_rejects_short_series() {
        let short = synthetic_series(MIN_NONSEASONAL_OBS - 1);
        assert!(matches!(
            fit(&short, false, "fp"),
            Err(Error::InsufficientHistory(_))
        ));

        let short_seasonal = synthetic_series(MIN_SEASONAL_OBS - 1);
        assert!(matches!(
            fit(&short_seasonal, true, "fp"),
            Err(Error::InsufficientHistory(_))
        ));
    }

    #[test]
    fn test_nonseasonal_fit_and_forecast_shape() {
        let series = synthetic_series(24);
        let model = fit(&series, false, "fp").unwrap();

        assert_eq!(model.order, (1, 1, 1));
        assert!(model.seasonal_order.is_none());
        assert_eq!(model.describe(), "ARIMA(1,1,1)");
        assert!(model.sigma2 > 0.0);
        assert!(model.aic.is_finite());

        let fc = model.forecast(6);
        assert_eq!(fc.mean.len(), 6);
        assert_eq!(fc.std_err.len(), 6);
        assert!(fc.mean.iter().all(|v| v.is_finite()));

        // Forecasts of a bounded vegetation index stay in a sane band.
        assert!(fc.mean.iter().all(|v| (-0.5..1.5).contains(v)));
    }

    #[test]
    fn test_seasonal_fit_and_forecast_shape() {
        let series = synthetic_series(48);
        let model = fit(&series, true, "fp").unwrap();

        assert_eq!(model.seasonal_order, Some((1, 1, 1, 12)));
        assert_eq!(model.describe(), "SARIMA(1,1,1)(1,1,1,12)");

        let fc = model.forecast(12);
        assert_eq!(fc.mean.len(), 12);
        assert!(fc.mean.iter().all(|v| v.is_finite()));
        assert!(fc.std_err.iter().all(|se| se.is_finite() && *se >= 0.0));
    }

    #[test]
    fn test_intervals_widen_with_horizon() {
        let series = synthetic_series(36);
        let model = fit(&series, false, "fp").unwrap();
        let fc = model.forecast(8);
        let (lower, upper) = fc.bounds();

        let first_width = upper[0] - lower[0];
        let last_width = upper[7] - lower[7];
        assert!(first_width > 0.0);
        assert!(
            last_width > first_width,
            "interval should widen: first={first_width}, last={last_width}"
        );

        // std_err never shrinks with horizon.
        for pair in fc.std_err.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_linear_series_forecasts_drift() {
        // First differences are exactly constant -> pure drift model.
        let series: Vec<f64> = (1..=15).map(|v| v as f64).collect();
        let model = fit(&series, false, "fp").unwrap();
        let fc = model.forecast(3);

        assert!((fc.mean[0] - 16.0).abs() < 1e-9);
        assert!((fc.mean[1] - 17.0).abs() < 1e-9);
        assert!((fc.mean[2] - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_fitted_model_round_trips_through_json() {
        let series = synthetic_series(30);
        let model = fit(&series, false, "fp-roundtrip").unwrap();

        let value = serde_json::to_value(&model).unwrap();
        let restored: FittedModel = serde_json::from_value(value).unwrap();

        assert_eq!(restored.trained_on, "fp-roundtrip");
        let a = model.forecast(6);
        let b = restored.forecast(6);
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.std_err, b.std_err);
    }

    #[test]
    fn test_forecast_is_deterministic() {
        let series = synthetic_series(24);
        let a = fit(&series, false, "fp").unwrap().forecast(6);
        let b = fit(&series, false, "fp").unwrap().forecast(6);
        assert_eq!(a.mean, b.mean);
    }

    #[test]
    fn test_coefficients_stay_in_stationary_region() {
        let series = synthetic_series(40);
        let model = fit(&series, false, "fp").unwrap();
        assert!(model.ar.abs() <= COEF_LIMIT);
        assert!(model.ma.abs() <= COEF_LIMIT);
    }

    #[test]
    fn test_diff_helpers() {
        assert_eq!(diff(&[1.0, 3.0, 6.0], 1), vec![2.0, 3.0]);
        assert_eq!(
            seasonal_diff(&[1.0, 2.0, 3.0, 4.0, 5.0], 3),
            vec![3.0, 3.0]
        );
    }

    #[test]
    fn test_solve_rejects_singular_system() {
        let mut a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let mut b = vec![1.0, 2.0];
        assert!(solve(&mut a, &mut b).is_none());
    }
}
