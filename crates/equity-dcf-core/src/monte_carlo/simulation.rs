use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::monte_carlo::params::{
    DistributionKind, MonteCarloParams, PathDistribution, ScalarDistribution, TerminalModelParams,
};
use crate::numeric::{
    cholesky_with_jitter, clamp_to_band, correlate_normals, lognormal_from_standard_normal, mean,
    percentile_sorted, population_std_dev,
};
use crate::types::{DcfInputs, FinancialData, TerminalMethod};
use crate::valuation::dcf::calculate_dcf;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Distribution of fair value per share across accepted samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonteCarloResult {
    /// Accepted samples, sorted ascending. May be cleared by the caller to
    /// keep responses small; the summary statistics stand alone.
    pub value_distribution: Vec<f64>,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Share of samples strictly below the current market price (0..100)
    pub current_price_percentile: f64,
}

/// Attempts per iteration before the iteration is skipped entirely.
const MAX_ATTEMPTS: u32 = 25;

fn identity4() -> Vec<Vec<f64>> {
    (0..4)
        .map(|i| (0..4).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the correlated Monte Carlo around `inputs`.
///
/// Four latent variables (first-year growth, first-year margin, WACC,
/// terminal growth) are drawn jointly via Cholesky; growth and margin then
/// evolve through the explicit period as AR(1) shocks with mean reversion;
/// terminal-model parameters are drawn independently. Samples that violate
/// the terminal-model feasibility constraints are rejected and retried up to
/// 25 times, then the iteration is skipped. No sample can fail the run.
pub fn run_monte_carlo(
    params: &MonteCarloParams,
    inputs: &DcfInputs,
    data: &FinancialData,
) -> MonteCarloResult {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    // Unit-normal parameters are compile-time constants; construction cannot
    // fail for (0, 1).
    let std_normal = Normal::new(0.0, 1.0).expect("unit normal");

    let chol = if params.correlation.len() == 4 {
        cholesky_with_jitter(&params.correlation)
    } else {
        cholesky_with_jitter(&identity4())
    };

    let n_years = inputs.explicit_period_years.min(inputs.drivers.len());
    let mut scratch = inputs.clone();
    let mut samples: Vec<f64> = Vec::with_capacity(params.iterations as usize);
    let mut independent = [0.0_f64; 4];
    let mut correlated = [0.0_f64; 4];
    let mut growth_path = vec![0.0_f64; n_years];
    let mut margin_path = vec![0.0_f64; n_years];

    for _ in 0..params.iterations {
        let mut accepted = false;

        for _ in 0..MAX_ATTEMPTS {
            for z in &mut independent {
                *z = rng.sample(std_normal);
            }
            correlate_normals(&chol, &independent, &mut correlated);

            sample_path(&params.growth, correlated[0], &mut growth_path, &mut rng, &std_normal);
            sample_path(
                &params.operating_margin,
                correlated[1],
                &mut margin_path,
                &mut rng,
                &std_normal,
            );

            let wacc = sample_scalar(&params.wacc, correlated[2]);
            let terminal_growth = sample_scalar(&params.terminal_growth, correlated[3]);

            let terminal = &params.terminal_model;
            let steady_state_roic =
                sample_scalar(&terminal.roic_driven.steady_state_roic, rng.sample(std_normal));
            let fade_years =
                sample_scalar(&terminal.fade.fade_years, rng.sample(std_normal)).round();
            let fade_start_growth =
                sample_scalar(&terminal.fade.fade_start_growth, rng.sample(std_normal));
            let fade_start_roic =
                sample_scalar(&terminal.fade.fade_start_roic, rng.sample(std_normal));

            if !is_feasible(
                inputs.terminal_method,
                terminal,
                wacc,
                terminal_growth,
                steady_state_roic,
                fade_start_growth,
                fade_start_roic,
            ) {
                continue;
            }

            scratch.wacc = wacc;
            scratch.terminal_growth_rate = terminal_growth;
            scratch.steady_state_roic = steady_state_roic;
            scratch.fade_years = fade_years.max(1.0) as u32;
            scratch.fade_start_growth = fade_start_growth;
            scratch.fade_start_roic = fade_start_roic;
            for year in 0..n_years {
                scratch.drivers[year].revenue_growth = growth_path[year];
                scratch.drivers[year].operating_margin = margin_path[year];
            }

            accepted = true;
            break;
        }

        if !accepted {
            continue;
        }

        let result = calculate_dcf(&scratch, data);
        let fair_value = result.fair_value_per_share;
        if fair_value.is_finite() && fair_value > 0.0 {
            samples.push(fair_value);
        }
    }

    aggregate(samples, data.current_price)
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Year 1 comes from the correlated draw; later years evolve the
/// standardized shock as AR(1) and blend the level back toward that year's
/// center. Every year is clamped to its own dynamic band.
fn sample_path(
    dist: &PathDistribution,
    z0: f64,
    path: &mut [f64],
    rng: &mut StdRng,
    std_normal: &Normal,
) {
    if path.is_empty() {
        return;
    }
    let mean_for = |year: usize| -> f64 {
        dist.means
            .get(year)
            .or(dist.means.last())
            .copied()
            .unwrap_or(0.0)
    };

    let first_mean = mean_for(0);
    path[0] = clamp_to_band(
        first_mean + z0 * dist.std_dev,
        first_mean,
        dist.std_dev,
        dist.min,
        dist.max,
    );

    let carry = (1.0 - dist.year_correlation * dist.year_correlation).max(0.0).sqrt();
    let mut prev_shock = z0;
    let mut prev_value = path[0];

    for (year, slot) in path.iter_mut().enumerate().skip(1) {
        let shock = dist.year_correlation * prev_shock + carry * rng.sample(*std_normal);
        let center = mean_for(year);
        let blended =
            center + (prev_value - center) * (1.0 - dist.mean_reversion) + shock * dist.std_dev;
        *slot = clamp_to_band(blended, center, dist.std_dev, dist.min, dist.max);
        prev_shock = shock;
        prev_value = *slot;
    }
}

fn sample_scalar(dist: &ScalarDistribution, z: f64) -> f64 {
    let raw = match dist.distribution {
        DistributionKind::Normal => dist.mean + z * dist.std_dev,
        DistributionKind::Lognormal => lognormal_from_standard_normal(dist.mean, dist.std_dev, z),
    };
    clamp_to_band(raw, dist.mean, dist.std_dev, dist.min, dist.max)
}

/// Terminal-model feasibility. A violation rejects the attempt, never the
/// whole simulation.
fn is_feasible(
    method: TerminalMethod,
    terminal: &TerminalModelParams,
    wacc: f64,
    terminal_growth: f64,
    steady_state_roic: f64,
    fade_start_growth: f64,
    fade_start_roic: f64,
) -> bool {
    if wacc - terminal_growth < terminal.min_wacc_spread {
        return false;
    }

    if matches!(method, TerminalMethod::RoicDriven | TerminalMethod::Fade) {
        if steady_state_roic <= 0.0 {
            return false;
        }
        let reinvestment = terminal_growth / steady_state_roic;
        if !(0.0..=terminal.roic_driven.max_reinvestment_rate).contains(&reinvestment) {
            return false;
        }
    }

    if method == TerminalMethod::Fade
        && (fade_start_growth < terminal_growth || fade_start_roic < steady_state_roic)
    {
        return false;
    }

    true
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn aggregate(mut samples: Vec<f64>, current_price: f64) -> MonteCarloResult {
    if samples.is_empty() {
        return MonteCarloResult::default();
    }

    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let below = samples.iter().filter(|&&v| v < current_price).count();
    let current_price_percentile = 100.0 * below as f64 / samples.len() as f64;

    MonteCarloResult {
        p10: percentile_sorted(&samples, 10.0),
        p25: percentile_sorted(&samples, 25.0),
        p50: percentile_sorted(&samples, 50.0),
        p75: percentile_sorted(&samples, 75.0),
        p90: percentile_sorted(&samples, 90.0),
        mean: mean(&samples),
        std_dev: population_std_dev(&samples),
        current_price_percentile,
        value_distribution: samples,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monte_carlo::params::create_default_params;
    use crate::types::ValueDrivers;

    const SEED: u64 = 42;

    fn sample_inputs(method: TerminalMethod) -> DcfInputs {
        DcfInputs {
            symbol: "TEST".into(),
            explicit_period_years: 5,
            drivers: vec![
                ValueDrivers {
                    revenue_growth: 0.08,
                    gross_margin: 0.40,
                    operating_margin: 0.20,
                    tax_rate: 0.21,
                    da_percent: 0.03,
                    capex_percent: 0.04,
                    wc_change_percent: 0.01,
                };
                5
            ],
            terminal_method: method,
            terminal_growth_rate: 0.025,
            steady_state_roic: 0.15,
            fade_years: 10,
            fade_start_growth: 0.08,
            fade_start_roic: 0.15,
            wacc: 0.09,
            base_revenue: 1.0e9,
            base_net_income: 1.6e8,
        }
    }

    fn sample_data() -> FinancialData {
        FinancialData {
            current_price: 150.0,
            shares_outstanding: 2.0e9,
            net_cash: 2.0e10,
            ttm_eps: 8.0,
            ttm_fcf: 1.8e8,
            ..Default::default()
        }
    }

    fn seeded_params(inputs: &DcfInputs, iterations: u32) -> MonteCarloParams {
        let mut params = create_default_params(inputs, None);
        params.iterations = iterations;
        params.seed = Some(SEED);
        params
    }

    #[test]
    fn test_seeded_reproducibility() {
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let params = seeded_params(&inputs, 2000);
        let a = run_monte_carlo(&params, &inputs, &sample_data());
        let b = run_monte_carlo(&params, &inputs, &sample_data());
        assert_eq!(a.p50, b.p50);
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.value_distribution, b.value_distribution);
    }

    #[test]
    fn test_percentile_ordering_and_positivity() {
        for method in [
            TerminalMethod::Perpetuity,
            TerminalMethod::RoicDriven,
            TerminalMethod::Fade,
        ] {
            let inputs = sample_inputs(method);
            let params = seeded_params(&inputs, 3000);
            let result = run_monte_carlo(&params, &inputs, &sample_data());

            assert!(!result.value_distribution.is_empty(), "{method}: no samples");
            assert!(result.p10 <= result.p25);
            assert!(result.p25 <= result.p50);
            assert!(result.p50 <= result.p75);
            assert!(result.p75 <= result.p90);
            assert!(result.value_distribution[0] <= result.p10);
            assert!(*result.value_distribution.last().unwrap() >= result.p90);
            assert!(result.mean.is_finite());
            assert!(result.std_dev.is_finite());
            assert!(result.value_distribution.iter().all(|v| v.is_finite() && *v > 0.0));
        }
    }

    #[test]
    fn test_population_std_dev_estimator() {
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let params = seeded_params(&inputs, 500);
        let result = run_monte_carlo(&params, &inputs, &sample_data());

        let n = result.value_distribution.len() as f64;
        let m = result.value_distribution.iter().sum::<f64>() / n;
        let pop_var = result
            .value_distribution
            .iter()
            .map(|v| (v - m).powi(2))
            .sum::<f64>()
            / n;
        assert!(
            (result.std_dev - pop_var.sqrt()).abs() < 1e-9,
            "std_dev must divide by n, not n-1"
        );
    }

    #[test]
    fn test_current_price_percentile_bounds() {
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let params = seeded_params(&inputs, 1000);

        let mut cheap = sample_data();
        cheap.current_price = 0.01;
        let result = run_monte_carlo(&params, &inputs, &cheap);
        assert_eq!(result.current_price_percentile, 0.0);

        let mut dear = sample_data();
        dear.current_price = 1.0e9;
        let result = run_monte_carlo(&params, &inputs, &dear);
        assert_eq!(result.current_price_percentile, 100.0);
    }

    #[test]
    fn test_infeasible_spread_yields_zero_result() {
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let mut params = seeded_params(&inputs, 200);
        // Pin WACC below terminal growth: every attempt violates the spread.
        params.wacc = ScalarDistribution {
            mean: 0.03,
            std_dev: 0.0001,
            min: 0.03,
            max: 0.03,
            distribution: DistributionKind::Normal,
        };
        params.terminal_growth = ScalarDistribution {
            mean: 0.05,
            std_dev: 0.0001,
            min: 0.05,
            max: 0.05,
            distribution: DistributionKind::Normal,
        };

        let result = run_monte_carlo(&params, &inputs, &sample_data());
        assert!(result.value_distribution.is_empty());
        assert_eq!(result.p50, 0.0);
        assert_eq!(result.mean, 0.0);
        assert_eq!(result.current_price_percentile, 0.0);
    }

    #[test]
    fn test_fade_samples_respect_feasibility() {
        // Re-run the generator's constraints by construction: sampled fade
        // bounds sit well above the terminal draws, so every iteration that
        // produced a value must have satisfied the ordering constraints.
        let inputs = sample_inputs(TerminalMethod::Fade);
        let params = seeded_params(&inputs, 2000);
        let result = run_monte_carlo(&params, &inputs, &sample_data());
        assert!(!result.value_distribution.is_empty());
    }

    #[test]
    fn test_wider_uncertainty_widens_distribution() {
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let narrow = seeded_params(&inputs, 3000);
        let mut wide = seeded_params(&inputs, 3000);
        wide.growth.std_dev *= 3.0;
        wide.operating_margin.std_dev *= 3.0;

        let narrow_result = run_monte_carlo(&narrow, &inputs, &sample_data());
        let wide_result = run_monte_carlo(&wide, &inputs, &sample_data());
        assert!(wide_result.std_dev > narrow_result.std_dev);
    }

    #[test]
    fn test_different_seeds_differ() {
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let mut a = seeded_params(&inputs, 1000);
        let mut b = seeded_params(&inputs, 1000);
        a.seed = Some(1);
        b.seed = Some(2);
        let ra = run_monte_carlo(&a, &inputs, &sample_data());
        let rb = run_monte_carlo(&b, &inputs, &sample_data());
        assert_ne!(ra.p50, rb.p50);
    }

    #[test]
    fn test_mean_tracks_deterministic_value() {
        // The sampled distribution should straddle the deterministic run.
        let inputs = sample_inputs(TerminalMethod::Perpetuity);
        let params = seeded_params(&inputs, 5000);
        let deterministic = calculate_dcf(&inputs, &sample_data()).fair_value_per_share;
        let result = run_monte_carlo(&params, &inputs, &sample_data());
        assert!(
            result.p10 < deterministic && deterministic < result.p90,
            "deterministic {} outside [{}, {}]",
            deterministic,
            result.p10,
            result.p90
        );
    }
}
