use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValuationError;
use crate::types::{DcfInputs, FinancialData};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sampling distribution family for a scalar quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Normal,
    Lognormal,
}

impl Default for DistributionKind {
    fn default() -> Self {
        DistributionKind::Normal
    }
}

/// A scalar quantity sampled once per iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub distribution: DistributionKind,
}

/// A per-year quantity sampled as an AR(1) + mean-reversion path across the
/// explicit period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathDistribution {
    /// Per-year centers; the last entry carries forward if the path is longer
    pub means: Vec<f64>,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// AR(1) coefficient on the standardized year-over-year shock
    pub year_correlation: f64,
    /// Pull of each year's level back toward its center
    pub mean_reversion: f64,
}

/// Sampling parameters for the ROIC-driven terminal mechanism.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoicDrivenModelParams {
    pub steady_state_roic: ScalarDistribution,
    pub max_reinvestment_rate: f64,
}

/// Sampling parameters for the fade terminal mechanism.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeModelParams {
    pub fade_years: ScalarDistribution,
    pub fade_start_growth: ScalarDistribution,
    pub fade_start_roic: ScalarDistribution,
}

/// Feasibility constraints and terminal-parameter distributions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalModelParams {
    pub min_wacc_spread: f64,
    pub roic_driven: RoicDrivenModelParams,
    pub fade: FadeModelParams,
}

/// Full configuration for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloParams {
    pub iterations: u32,
    /// Fixed seed for reproducible runs; `None` draws from entropy
    pub seed: Option<u64>,
    pub growth: PathDistribution,
    pub operating_margin: PathDistribution,
    pub wacc: ScalarDistribution,
    pub terminal_growth: ScalarDistribution,
    /// 4x4 correlation over [growth, margin, wacc, terminal growth]
    pub correlation: Vec<Vec<f64>>,
    pub terminal_model: TerminalModelParams,
}

impl Default for MonteCarloParams {
    fn default() -> Self {
        MonteCarloParams {
            iterations: DEFAULT_ITERATIONS,
            seed: None,
            growth: PathDistribution::default(),
            operating_margin: PathDistribution::default(),
            wacc: ScalarDistribution::default(),
            terminal_growth: ScalarDistribution::default(),
            correlation: default_correlation(),
            terminal_model: TerminalModelParams::default(),
        }
    }
}

pub const DEFAULT_ITERATIONS: u32 = 10_000;
pub const MAX_ITERATIONS: u32 = 20_000;
pub const MIN_ITERATIONS: u32 = 1;

/// Correlation over the fixed variable order [growth, margin, wacc,
/// terminal growth]: growth and margin move together, both fight the
/// discount rate, and long-run growth echoes near-term growth.
fn default_correlation() -> Vec<Vec<f64>> {
    vec![
        vec![1.0, 0.35, -0.20, 0.45],
        vec![0.35, 1.0, -0.15, 0.25],
        vec![-0.20, -0.15, 1.0, -0.10],
        vec![0.45, 0.25, -0.10, 1.0],
    ]
}

// ---------------------------------------------------------------------------
// Default construction
// ---------------------------------------------------------------------------

/// Build default simulation parameters around the effective DCF inputs.
/// When the statement bundle is supplied, analyst dispersion tightens or
/// widens the first-year growth and margin uncertainty.
pub fn create_default_params(inputs: &DcfInputs, data: Option<&FinancialData>) -> MonteCarloParams {
    let n = inputs.explicit_period_years.min(inputs.drivers.len());
    let growth_means: Vec<f64> = inputs.drivers[..n].iter().map(|d| d.revenue_growth).collect();
    let margin_means: Vec<f64> = inputs.drivers[..n].iter().map(|d| d.operating_margin).collect();
    let g1 = growth_means.first().copied().unwrap_or(0.0);
    let m1 = margin_means.first().copied().unwrap_or(0.0);

    let mut params = MonteCarloParams {
        iterations: DEFAULT_ITERATIONS,
        seed: None,
        growth: PathDistribution {
            means: growth_means,
            std_dev: (g1.abs() * 0.35).max(0.002),
            min: -0.15,
            max: 0.30,
            year_correlation: 0.5,
            mean_reversion: 0.35,
        },
        operating_margin: PathDistribution {
            means: margin_means,
            std_dev: (m1.abs() * 0.20).max(0.002),
            min: 0.01,
            max: 0.60,
            year_correlation: 0.5,
            mean_reversion: 0.35,
        },
        wacc: ScalarDistribution {
            mean: inputs.wacc,
            std_dev: (inputs.wacc.abs() * 0.15).max(0.0015),
            min: 0.02,
            max: 0.20,
            distribution: DistributionKind::Lognormal,
        },
        terminal_growth: ScalarDistribution {
            mean: inputs.terminal_growth_rate,
            std_dev: (inputs.terminal_growth_rate.abs() * 0.2).max(0.001),
            min: 0.0,
            max: 0.06,
            distribution: DistributionKind::Normal,
        },
        correlation: default_correlation(),
        terminal_model: TerminalModelParams {
            min_wacc_spread: 0.005,
            roic_driven: RoicDrivenModelParams {
                steady_state_roic: ScalarDistribution {
                    mean: inputs.steady_state_roic,
                    std_dev: (inputs.steady_state_roic.abs() * 0.25).max(0.005),
                    min: 0.03,
                    max: 0.50,
                    distribution: DistributionKind::Normal,
                },
                max_reinvestment_rate: 0.80,
            },
            fade: FadeModelParams {
                fade_years: ScalarDistribution {
                    mean: inputs.fade_years as f64,
                    std_dev: ((inputs.fade_years as f64).abs() * 0.2).max(1.0),
                    min: 3.0,
                    max: 20.0,
                    distribution: DistributionKind::Normal,
                },
                fade_start_growth: ScalarDistribution {
                    mean: inputs.fade_start_growth,
                    std_dev: (inputs.fade_start_growth.abs() * 0.2).max(0.005),
                    min: 0.0,
                    max: 0.40,
                    distribution: DistributionKind::Normal,
                },
                fade_start_roic: ScalarDistribution {
                    mean: inputs.fade_start_roic,
                    std_dev: (inputs.fade_start_roic.abs() * 0.2).max(0.005),
                    min: 0.03,
                    max: 0.60,
                    distribution: DistributionKind::Normal,
                },
            },
        },
    };

    if let Some(data) = data {
        apply_analyst_dispersion(&mut params, data, g1, m1);
    }

    params
}

/// Treat the analyst low/high spread as a ~4-sigma range for the first
/// forecast year and let it set the sampled uncertainty, bounded so one
/// outlier desk cannot blow up the distribution.
fn apply_analyst_dispersion(params: &mut MonteCarloParams, data: &FinancialData, g1: f64, m1: f64) {
    let Some(fy1) = data.analyst_estimates.first() else {
        return;
    };

    if fy1.revenue_high > 0.0 && fy1.revenue_low > 0.0 && fy1.revenue_avg > 0.0 && data.ttm_revenue > 0.0
    {
        let range = (fy1.revenue_high - fy1.revenue_low) / data.ttm_revenue;
        let floor = 0.002;
        let cap = (g1.abs() * 0.8).max(floor);
        params.growth.std_dev = (range / 4.0).clamp(floor, cap);
    }

    if fy1.eps_high > 0.0 && fy1.eps_low > 0.0 && fy1.eps_avg > 0.0 {
        let eps_range = (fy1.eps_high - fy1.eps_low) / fy1.eps_avg;
        let floor = 0.002;
        let cap = (m1.abs() * 0.8).max(floor);
        params.operating_margin.std_dev = (eps_range / 4.0 * m1.abs()).clamp(floor, cap);
    }
}

// ---------------------------------------------------------------------------
// Override merge
// ---------------------------------------------------------------------------

/// Apply a caller override patch onto `params`.
///
/// The patch is a recursive JSON merge: object nodes merge, scalars and
/// arrays replace, unknown keys are tolerated for forward compatibility.
/// `iterations` is clamped to [1, 20000] afterwards, with a warning naming
/// both the requested and stored values.
pub fn apply_param_overrides(
    params: &mut MonteCarloParams,
    patch: &Value,
    warnings: &mut Vec<String>,
) -> ValuationResult<()> {
    if patch.is_null() {
        return Ok(());
    }
    if !patch.is_object() {
        return Err(ValuationError::InvalidOverride {
            path: "monte_carlo".into(),
            reason: "override must be an object".into(),
        });
    }

    let requested_iterations = patch.get("iterations").cloned();

    let mut tree = serde_json::to_value(&*params)?;
    merge_json(&mut tree, patch);
    *params = serde_json::from_value(tree).map_err(|e| ValuationError::InvalidOverride {
        path: "monte_carlo".into(),
        reason: e.to_string(),
    })?;

    if params.iterations > MAX_ITERATIONS || params.iterations < MIN_ITERATIONS {
        let requested = requested_iterations
            .map(|v| v.to_string())
            .unwrap_or_else(|| params.iterations.to_string());
        let clamped = params.iterations.clamp(MIN_ITERATIONS, MAX_ITERATIONS);
        warnings.push(format!(
            "Monte Carlo iterations {requested} clamped to {clamped}"
        ));
        params.iterations = clamped;
    }

    Ok(())
}

/// Recursive patch: objects merge key-by-key, everything else replaces.
fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_json(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, _) => {
            *base_slot = patch.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
