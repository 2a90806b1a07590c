use serde::{Deserialize, Serialize};

use crate::types::{DcfInputs, FinancialData, TerminalMethod};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Projection for a single year of the explicit period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearProjection {
    pub year: u32,
    pub revenue: f64,
    pub operating_income: f64,
    pub nopat: f64,
    pub fcf: f64,
    pub discount_factor: f64,
    pub present_value: f64,
}

/// Output of one DCF run under one terminal method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfResult {
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub fair_value_per_share: f64,
    pub explicit_period_pv: f64,
    pub terminal_value_pv: f64,
    /// PV(terminal) as a share of enterprise value, in percent (0..100)
    pub terminal_value_percent: f64,
    pub implied_pe: f64,
    pub implied_ev_to_fcf: f64,
    pub projections: Vec<YearProjection>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a single FCFF DCF under the inputs' terminal method.
///
/// The engine never raises: degenerate denominators (`wacc <= g`) flow
/// through as non-finite values for downstream layers to flag or reject.
pub fn calculate_dcf(inputs: &DcfInputs, data: &FinancialData) -> DcfResult {
    let n_years = inputs.explicit_period_years.min(inputs.drivers.len());

    // --- Explicit-period projection ---
    let mut projections = Vec::with_capacity(n_years);
    let mut prev_revenue = inputs.base_revenue;

    for (year_idx, driver) in inputs.drivers.iter().enumerate().take(n_years) {
        let revenue = prev_revenue * (1.0 + driver.revenue_growth);
        let revenue_delta = revenue - prev_revenue;
        let operating_income = revenue * driver.operating_margin;
        let nopat = operating_income * (1.0 - driver.tax_rate);
        let da = revenue * driver.da_percent;
        let capex = revenue * driver.capex_percent;
        // Working capital consumes a slice of the revenue *change*, not of
        // the revenue level.
        let wc_change = revenue_delta * driver.wc_change_percent;
        let fcf = nopat + da - capex - wc_change;

        let discount_factor = (1.0 + inputs.wacc).powi(year_idx as i32 + 1);
        let present_value = fcf / discount_factor;

        projections.push(YearProjection {
            year: year_idx as u32 + 1,
            revenue,
            operating_income,
            nopat,
            fcf,
            discount_factor,
            present_value,
        });

        prev_revenue = revenue;
    }

    let explicit_period_pv: f64 = projections.iter().map(|p| p.present_value).sum();

    // --- Terminal value (stated at the end of year N, pre-discount) ---
    let terminal_value = match projections.last() {
        Some(last) => compute_terminal_value(inputs, last, n_years),
        None => 0.0,
    };
    let terminal_value_pv = terminal_value / (1.0 + inputs.wacc).powi(n_years as i32);

    // --- Aggregation ---
    let enterprise_value = explicit_period_pv + terminal_value_pv;
    let equity_value = enterprise_value + data.net_cash;
    let fair_value_per_share = if data.shares_outstanding > 0.0 {
        equity_value / data.shares_outstanding
    } else {
        0.0
    };
    let implied_pe = if data.ttm_eps > 0.0 {
        fair_value_per_share / data.ttm_eps
    } else {
        0.0
    };
    let implied_ev_to_fcf = if data.ttm_fcf > 0.0 {
        enterprise_value / data.ttm_fcf
    } else {
        0.0
    };
    let terminal_value_percent = if enterprise_value != 0.0 {
        100.0 * terminal_value_pv / enterprise_value
    } else {
        0.0
    };

    DcfResult {
        enterprise_value,
        equity_value,
        fair_value_per_share,
        explicit_period_pv,
        terminal_value_pv,
        terminal_value_percent,
        implied_pe,
        implied_ev_to_fcf,
        projections,
    }
}

// ---------------------------------------------------------------------------
// Terminal value mechanisms
// ---------------------------------------------------------------------------

fn compute_terminal_value(inputs: &DcfInputs, last: &YearProjection, n_years: usize) -> f64 {
    let g = inputs.terminal_growth_rate;
    let wacc = inputs.wacc;

    match inputs.terminal_method {
        TerminalMethod::Perpetuity => last.fcf * (1.0 + g) / (wacc - g),
        TerminalMethod::RoicDriven => {
            let reinvestment = g / inputs.steady_state_roic;
            let nopat_next = last.nopat * (1.0 + g);
            nopat_next * (1.0 - reinvestment) / (wacc - g)
        }
        TerminalMethod::Fade => fade_terminal_value(inputs, last.nopat, n_years),
    }
}

/// Fade mechanism: growth and ROIC glide linearly from their explicit-period
/// exit values to steady state over `fade_years`, with reinvestment tied to
/// growth/ROIC each year, then a Gordon tail at steady state.
///
/// The result is re-inflated by `(1+wacc)^N` so that the caller's uniform
/// `TV / (1+wacc)^N` discounting step recovers the fade path's PV exactly.
fn fade_terminal_value(inputs: &DcfInputs, exit_nopat: f64, n_years: usize) -> f64 {
    let k = inputs.fade_years.max(1);
    let wacc = inputs.wacc;
    let g_start = inputs.fade_start_growth;
    let g_end = inputs.terminal_growth_rate;
    let roic_start = inputs.fade_start_roic;
    let roic_end = inputs.steady_state_roic;

    let mut nopat = exit_nopat;
    let mut pv_fade = 0.0;

    for year in 1..=k {
        let fade_factor = 1.0 - year as f64 / k as f64;
        let growth = g_end + (g_start - g_end) * fade_factor;
        let roic = roic_end + (roic_start - roic_end) * fade_factor;
        let reinvestment = if roic > 0.001 { growth / roic } else { 0.0 };

        nopat *= 1.0 + growth;
        let fcf = nopat * (1.0 - reinvestment);
        pv_fade += fcf / (1.0 + wacc).powi((n_years + year as usize) as i32);
    }

    // Gordon tail once steady state is reached.
    let nopat_post = nopat * (1.0 + g_end);
    let reinvestment_post = if roic_end > 0.001 { g_end / roic_end } else { 0.0 };
    let fcf_post = nopat_post * (1.0 - reinvestment_post);
    let tail = fcf_post / (wacc - g_end);
    let pv_tail = tail / (1.0 + wacc).powi((n_years + k as usize) as i32);

    (pv_fade + pv_tail) * (1.0 + wacc).powi(n_years as i32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
