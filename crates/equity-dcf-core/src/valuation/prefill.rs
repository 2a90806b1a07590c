use serde::{Deserialize, Serialize};

use crate::types::{DcfInputs, FinancialData, TerminalMethod, ValueDrivers, WaccInputs};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// WACC decomposition and data-quality warnings from the prefill pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefillAudit {
    pub cost_of_equity: f64,
    pub cost_of_debt: f64,
    pub equity_weight: f64,
    pub debt_weight: f64,
    pub effective_tax_rate: f64,
    /// WACC before clamping
    pub calculated_wacc: f64,
    /// WACC actually written into the inputs
    pub final_wacc: f64,
    pub warnings: Vec<String>,
}

// Fallbacks used when the statement bundle cannot support a calculation.
const DEFAULT_WACC: f64 = 0.10;
const DEFAULT_COST_OF_DEBT: f64 = 0.06;
const DEFAULT_TAX_RATE: f64 = 0.21;
const DEFAULT_EQUITY_WEIGHT: f64 = 0.8;
const DEFAULT_TERMINAL_GROWTH: f64 = 0.025;
const DEFAULT_FADE_YEARS: u32 = 10;
const DEFAULT_STEADY_STATE_ROIC: f64 = 0.15;
const WACC_FLOOR: f64 = 0.06;
const WACC_CEILING: f64 = 0.15;
const EXPLICIT_YEARS: usize = 5;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Turn a raw statement bundle into a complete, internally consistent DCF
/// input set. Deterministic; never errors — every data problem becomes a
/// warning and a defensible default.
pub fn create_prefilled_inputs(
    symbol: &str,
    data: &FinancialData,
    wacc_inputs: &WaccInputs,
) -> (DcfInputs, PrefillAudit) {
    let mut warnings: Vec<String> = Vec::new();

    // --- WACC composition ---
    let cost_of_equity = wacc_inputs.risk_free_rate
        + data.beta * wacc_inputs.market_risk_premium
        + wacc_inputs.country_risk_premium;

    let cost_of_debt = implied_cost_of_debt(data);

    let total_capital = data.market_cap + data.total_debt;
    let equity_weight = if total_capital > 0.0 {
        data.market_cap / total_capital
    } else {
        DEFAULT_EQUITY_WEIGHT
    };
    let debt_weight = 1.0 - equity_weight;

    let effective_tax_rate = if data.effective_tax_rate.is_finite() {
        data.effective_tax_rate
    } else {
        DEFAULT_TAX_RATE
    };

    let calculated_wacc =
        equity_weight * cost_of_equity + debt_weight * cost_of_debt * (1.0 - effective_tax_rate);

    let final_wacc = if calculated_wacc.is_finite() {
        let clamped = calculated_wacc.clamp(WACC_FLOOR, WACC_CEILING);
        if (clamped - calculated_wacc).abs() > f64::EPSILON {
            warnings.push(format!(
                "Calculated WACC {:.4} outside [{WACC_FLOOR}, {WACC_CEILING}]; clamped to {:.4}",
                calculated_wacc, clamped
            ));
        }
        clamped
    } else {
        warnings.push(format!(
            "Calculated WACC is not finite; falling back to default WACC {DEFAULT_WACC}"
        ));
        DEFAULT_WACC
    };

    // --- Anchors ---
    let base_revenue = positive_or(data.latest_annual_revenue, data.ttm_revenue);
    let base_net_income = positive_or(data.latest_annual_net_income, data.ttm_net_income);
    if base_revenue <= 0.0 {
        warnings.push(
            "Base revenue unavailable from latest annual or TTM statements; \
             falling back to 0 — projections will be degenerate"
                .to_string(),
        );
    }

    // --- Drivers ---
    let mut drivers = default_drivers(data, effective_tax_rate);
    let growth_path = analyst_growth_path(data, base_revenue, EXPLICIT_YEARS);
    if let Some(path) = growth_path {
        for (driver, g) in drivers.iter_mut().zip(path.iter()) {
            driver.revenue_growth = *g;
        }
    }

    let fade_start_growth = drivers[EXPLICIT_YEARS - 1].revenue_growth;
    let steady_state_roic = if data.historical_roic > 0.0 {
        data.historical_roic
    } else {
        warnings.push(format!(
            "Historical ROIC unavailable; using default steady-state ROIC {DEFAULT_STEADY_STATE_ROIC}"
        ));
        DEFAULT_STEADY_STATE_ROIC
    };

    let inputs = DcfInputs {
        symbol: symbol.to_string(),
        explicit_period_years: EXPLICIT_YEARS,
        drivers,
        terminal_method: TerminalMethod::Perpetuity,
        terminal_growth_rate: DEFAULT_TERMINAL_GROWTH,
        steady_state_roic,
        fade_years: DEFAULT_FADE_YEARS,
        fade_start_growth,
        fade_start_roic: steady_state_roic,
        wacc: final_wacc,
        base_revenue,
        base_net_income,
    };

    let audit = PrefillAudit {
        cost_of_equity,
        cost_of_debt,
        equity_weight,
        debt_weight,
        effective_tax_rate,
        calculated_wacc,
        final_wacc,
        warnings,
    };

    (inputs, audit)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Cost of debt from the interest coverage the statements imply, banded to
/// keep one-off financing quarters from poisoning the discount rate.
fn implied_cost_of_debt(data: &FinancialData) -> f64 {
    if data.total_debt <= 0.0 || data.interest_expense < 0.0 {
        return DEFAULT_COST_OF_DEBT;
    }
    let rate = data.interest_expense / data.total_debt;
    if rate < 0.02 {
        0.04
    } else if rate > 0.15 {
        0.10
    } else {
        rate
    }
}

fn positive_or(preferred: f64, fallback: f64) -> f64 {
    if preferred > 0.0 {
        preferred
    } else {
        fallback
    }
}

/// Five years of conservative defaults, overlaid with observed ratios where
/// the bundle has positive readings.
fn default_drivers(data: &FinancialData, effective_tax_rate: f64) -> Vec<ValueDrivers> {
    let mut template = ValueDrivers {
        revenue_growth: 0.10,
        gross_margin: 0.40,
        operating_margin: 0.20,
        tax_rate: DEFAULT_TAX_RATE,
        da_percent: 0.03,
        capex_percent: 0.04,
        wc_change_percent: 0.01,
    };

    if data.operating_margin > 0.0 {
        template.operating_margin = data.operating_margin;
    }
    if data.gross_margin > 0.0 {
        template.gross_margin = data.gross_margin;
    }
    if effective_tax_rate > 0.0 {
        template.tax_rate = effective_tax_rate;
    }
    if data.historical_da_percent > 0.0 {
        template.da_percent = data.historical_da_percent;
    }
    if data.historical_capex_percent > 0.0 {
        template.capex_percent = data.historical_capex_percent;
    }
    if data.historical_wc_change_percent > 0.0 {
        template.wc_change_percent = data.historical_wc_change_percent;
    }

    vec![template; EXPLICIT_YEARS]
}

/// Revenue growth path from the analyst panel.
///
/// Preferred form walks consensus revenue year over year from the base
/// anchor, decaying the last observed growth by 10% per missing year. If the
/// panel cannot anchor a walk but carries at least two fiscal years, the
/// FY2/FY1 growth is faded over five years.
fn analyst_growth_path(data: &FinancialData, base_revenue: f64, years: usize) -> Option<Vec<f64>> {
    let estimates = &data.analyst_estimates;

    let first_positive = estimates.first().map(|e| e.revenue_avg > 0.0).unwrap_or(false);
    if first_positive && base_revenue > 0.0 {
        let mut path = Vec::with_capacity(years);
        let mut prev = base_revenue;
        let mut last_growth = 0.0;
        for i in 0..years {
            let growth = match estimates.get(i) {
                Some(e) if e.revenue_avg > 0.0 => {
                    let g = e.revenue_avg / prev - 1.0;
                    prev = e.revenue_avg;
                    g
                }
                _ => last_growth * 0.9,
            };
            last_growth = growth;
            path.push(growth);
        }
        return Some(path);
    }

    // Two-estimate fallback: fade the FY1 -> FY2 growth.
    if estimates.len() >= 2 && estimates[0].revenue_avg > 0.0 && estimates[1].revenue_avg > 0.0 {
        let g = estimates[1].revenue_avg / estimates[0].revenue_avg - 1.0;
        return Some(vec![g, 0.9 * g, 0.8 * g, 0.7 * g, 0.6 * g]);
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
