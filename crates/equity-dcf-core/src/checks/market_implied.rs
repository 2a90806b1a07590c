//! Layer C: reverse-DCF. Instead of asking what the company is worth, ask
//! what the current market price assumes about long-run growth, margin and
//! returns on capital, then score how often companies have actually
//! delivered those assumptions.

use serde::{Deserialize, Serialize};

use crate::benchmark::{get_industry_benchmark, get_industry_thresholds};
use crate::types::{DcfInputs, FinancialData};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which market-implied assumptions exceed what the industry has shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feasibility {
    pub margin_exceeds_industry_max: bool,
    pub roic_exceeds_historical_max: bool,
    pub growth_exceeds_historical_frequency: bool,
}

/// Long-run assumptions backed out of the current market price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketImplied {
    pub implied_growth_rate: f64,
    pub implied_steady_state_margin: f64,
    pub implied_roic: f64,
    /// 0.1 (slow fade priced in) .. 1.0 (fast fade priced in)
    pub implied_fade_speed: f64,
    pub feasibility: Feasibility,
    /// 1..50 score: how often real companies have sustained what the price
    /// implies; 50 means unremarkable, 1 means almost never seen.
    pub historical_frequency: f64,
}

const IMPLIED_GROWTH_FLOOR: f64 = -0.10;
const IMPLIED_GROWTH_CEILING: f64 = 0.30;
const REINVESTMENT_FALLBACK: f64 = 0.4;
const GROWTH_FREQUENCY_LIMIT: f64 = 0.15;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Invert Gordon growth against the current enterprise value and derive the
/// margin/ROIC/fade assumptions the market is paying for.
pub fn calculate_market_implied(
    data: &FinancialData,
    wacc: f64,
    inputs: &DcfInputs,
) -> MarketImplied {
    let market_cap = data.current_price * data.shares_outstanding;
    let enterprise_value = market_cap - data.net_cash;

    let benchmark = get_industry_benchmark(&data.industry, &data.sector);
    let thresholds = get_industry_thresholds(&benchmark);

    // --- Implied growth: Gordon inversion with TTM FCF as the numerator ---
    let implied_growth_rate = if data.ttm_fcf > 0.0 && enterprise_value > 0.0 {
        let raw = (enterprise_value * wacc - data.ttm_fcf) / (enterprise_value + data.ttm_fcf);
        raw.clamp(IMPLIED_GROWTH_FLOOR, IMPLIED_GROWTH_CEILING)
    } else {
        0.0
    };

    // --- Implied steady-state margin ---
    let fcf_yield = if data.ttm_fcf > 0.0 && enterprise_value > 0.0 {
        data.ttm_fcf / enterprise_value
    } else {
        0.0
    };
    let current_op_margin = if data.ttm_revenue > 0.0 {
        data.ttm_operating_income / data.ttm_revenue
    } else {
        0.0
    };
    let required_fcf_yield = (wacc - implied_growth_rate).max(0.0);
    let margin_multiple = if required_fcf_yield > 0.0 && fcf_yield > 0.0 {
        required_fcf_yield / fcf_yield
    } else {
        1.0
    };
    let implied_steady_state_margin = current_op_margin * margin_multiple;

    // --- Implied ROIC from the assumed reinvestment intensity ---
    let reinvestment = reinvestment_rate(inputs);
    let implied_roic = if implied_growth_rate > 0.0 && reinvestment > 0.0 {
        implied_growth_rate / reinvestment
    } else {
        current_op_margin * 0.8 * 2.0
    };

    // --- Implied fade speed: richer multiples price a slower fade ---
    let implied_fade_speed = if data.current_pe > 0.0 {
        (20.0 / data.current_pe).clamp(0.1, 1.0)
    } else {
        1.0
    };

    let feasibility = Feasibility {
        margin_exceeds_industry_max: implied_steady_state_margin > thresholds.margin_error,
        roic_exceeds_historical_max: implied_roic > thresholds.roic_error,
        growth_exceeds_historical_frequency: implied_growth_rate > GROWTH_FREQUENCY_LIMIT,
    };

    let historical_frequency = frequency_score(
        implied_growth_rate,
        implied_roic,
        implied_steady_state_margin,
        benchmark.after_tax_roic,
        benchmark.operating_margin,
        thresholds.roic_warning,
        thresholds.roic_error,
        thresholds.margin_warning,
        thresholds.margin_error,
    );

    MarketImplied {
        implied_growth_rate,
        implied_steady_state_margin,
        implied_roic,
        implied_fade_speed,
        feasibility,
        historical_frequency,
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Reinvestment intensity from the explicit plan. Prefers the last explicit
/// year; falls back to the all-year average, then to a 0.4 literal. The
/// chain matters: the implied ROIC divides by this number.
fn reinvestment_rate(inputs: &DcfInputs) -> f64 {
    if let Some(last) = inputs.drivers.last() {
        let rate = driver_reinvestment(
            last.capex_percent,
            last.da_percent,
            last.wc_change_percent,
            last.operating_margin,
            last.tax_rate,
        );
        if rate.is_finite() && rate > 0.0 {
            return rate;
        }
    }

    if !inputs.drivers.is_empty() {
        let n = inputs.drivers.len() as f64;
        let capex = inputs.drivers.iter().map(|d| d.capex_percent).sum::<f64>() / n;
        let da = inputs.drivers.iter().map(|d| d.da_percent).sum::<f64>() / n;
        let wc = inputs.drivers.iter().map(|d| d.wc_change_percent).sum::<f64>() / n;
        let margin = inputs.drivers.iter().map(|d| d.operating_margin).sum::<f64>() / n;
        let tax = inputs.drivers.iter().map(|d| d.tax_rate).sum::<f64>() / n;
        let rate = driver_reinvestment(capex, da, wc, margin, tax);
        if rate.is_finite() && rate > 0.0 {
            return rate;
        }
    }

    REINVESTMENT_FALLBACK
}

fn driver_reinvestment(capex: f64, da: f64, wc: f64, margin: f64, tax: f64) -> f64 {
    (capex - da + wc) / (margin * (1.0 - tax))
}

/// How often have real companies sustained the implied assumptions? Start at
/// 50 and deduct per exceedance tier; never below 1.
#[allow(clippy::too_many_arguments)]
fn frequency_score(
    growth: f64,
    roic: f64,
    margin: f64,
    benchmark_roic: f64,
    benchmark_margin: f64,
    roic_warning: f64,
    roic_error: f64,
    margin_warning: f64,
    margin_error: f64,
) -> f64 {
    let mut score: f64 = 50.0;

    if growth > 0.20 {
        score -= 30.0;
    } else if growth > 0.15 {
        score -= 20.0;
    } else if growth > 0.10 {
        score -= 10.0;
    }

    if roic > roic_error {
        score -= 25.0;
    } else if roic > roic_warning {
        score -= 15.0;
    } else if roic > 1.2 * benchmark_roic {
        score -= 5.0;
    }

    if margin > margin_error {
        score -= 20.0;
    } else if margin > margin_warning {
        score -= 10.0;
    } else if margin > 1.2 * benchmark_margin {
        score -= 5.0;
    }

    score.max(1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TerminalMethod, ValueDrivers};

    fn sample_data() -> FinancialData {
        FinancialData {
            current_price: 150.0,
            shares_outstanding: 2.0e9,
            net_cash: 2.0e10,
            ttm_fcf: 1.8e8,
            ttm_revenue: 1.0e9,
            ttm_operating_income: 2.0e8,
            current_pe: 18.75,
            sector: "Technology".into(),
            industry: "Software—Application".into(),
            ..Default::default()
        }
    }

    fn sample_inputs() -> DcfInputs {
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
            terminal_method: TerminalMethod::Perpetuity,
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

    #[test]
    fn test_gordon_inversion_is_clamped() {
        let implied = calculate_market_implied(&sample_data(), 0.09, &sample_inputs());
        // EV = 150 * 2e9 - 2e10 = 2.8e11. With a tiny FCF against that EV the
        // raw inversion approaches WACC and hits the 0.09-ish region.
        let ev = 2.8e11;
        let expected = (ev * 0.09 - 1.8e8) / (ev + 1.8e8);
        assert!((implied.implied_growth_rate - expected).abs() < 1e-9);
        assert!(implied.implied_growth_rate <= IMPLIED_GROWTH_CEILING);
    }

    #[test]
    fn test_zero_fcf_yields_zero_growth() {
        let mut data = sample_data();
        data.ttm_fcf = 0.0;
        let implied = calculate_market_implied(&data, 0.09, &sample_inputs());
        assert_eq!(implied.implied_growth_rate, 0.0);
    }

    #[test]
    fn test_implied_margin_scales_with_required_yield() {
        let data = sample_data();
        let implied = calculate_market_implied(&data, 0.09, &sample_inputs());
        let ev = 2.8e11;
        let fcf_yield = 1.8e8 / ev;
        let required = 0.09 - implied.implied_growth_rate;
        let expected = 0.20 * (required / fcf_yield);
        assert!((implied.implied_steady_state_margin - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reinvestment_prefers_last_driver() {
        let mut inputs = sample_inputs();
        inputs.drivers[4].capex_percent = 0.08;
        let rate = reinvestment_rate(&inputs);
        let expected = (0.08 - 0.03 + 0.01) / (0.20 * 0.79);
        assert!((rate - expected).abs() < 1e-12);
    }

    #[test]
    fn test_reinvestment_falls_back_to_average_then_literal() {
        let mut inputs = sample_inputs();
        // Last driver produces a non-positive rate; average still works.
        inputs.drivers[4].capex_percent = 0.0;
        inputs.drivers[4].da_percent = 0.05;
        inputs.drivers[4].wc_change_percent = 0.0;
        let rate = reinvestment_rate(&inputs);
        let capex = (0.04 * 4.0) / 5.0;
        let da = (0.03 * 4.0 + 0.05) / 5.0;
        let wc = (0.01 * 4.0) / 5.0;
        let expected = (capex - da + wc) / (0.20 * 0.79);
        assert!((rate - expected).abs() < 1e-12);

        // All drivers degenerate -> literal fallback.
        for d in &mut inputs.drivers {
            d.capex_percent = 0.0;
            d.da_percent = 0.05;
            d.wc_change_percent = 0.0;
        }
        assert_eq!(reinvestment_rate(&inputs), REINVESTMENT_FALLBACK);
    }

    #[test]
    fn test_fade_speed_from_pe() {
        let mut data = sample_data();
        data.current_pe = 40.0;
        let implied = calculate_market_implied(&data, 0.09, &sample_inputs());
        assert!((implied.implied_fade_speed - 0.5).abs() < 1e-12);

        data.current_pe = 10.0;
        let implied = calculate_market_implied(&data, 0.09, &sample_inputs());
        assert!((implied.implied_fade_speed - 1.0).abs() < 1e-12);

        data.current_pe = 0.0;
        let implied = calculate_market_implied(&data, 0.09, &sample_inputs());
        assert!((implied.implied_fade_speed - 1.0).abs() < 1e-12);

        data.current_pe = 500.0;
        let implied = calculate_market_implied(&data, 0.09, &sample_inputs());
        assert!((implied.implied_fade_speed - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_frequency_score_deductions() {
        // Benign assumptions keep the full score.
        assert_eq!(frequency_score(0.05, 0.10, 0.10, 0.17, 0.20, 0.22, 0.27, 0.30, 0.40), 50.0);
        // Stacked exceedances bottom out at the floor of 1.
        assert_eq!(frequency_score(0.25, 0.90, 0.70, 0.17, 0.20, 0.22, 0.27, 0.30, 0.40), 1.0);
        // One tier each.
        let score = frequency_score(0.12, 0.25, 0.35, 0.17, 0.20, 0.22, 0.27, 0.30, 0.40);
        assert_eq!(score, 50.0 - 10.0 - 15.0 - 10.0);
    }

    #[test]
    fn test_feasibility_flags() {
        let mut data = sample_data();
        // Tiny FCF against a huge EV with an already-extreme margin: the
        // implied steady state must exceed what the industry has shown.
        data.ttm_fcf = 1.0e6;
        data.current_price = 500.0;
        data.ttm_operating_income = 5.0e8;
        let implied = calculate_market_implied(&data, 0.12, &sample_inputs());
        assert!(implied.feasibility.margin_exceeds_industry_max);
        assert!(implied.feasibility.roic_exceeds_historical_max);
        assert!(implied.historical_frequency < 50.0);
    }
}
