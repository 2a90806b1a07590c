//! Layer B: structural consistency of the assumption set. Checks that the
//! inputs obey the accounting and economic identities a coherent DCF must
//! satisfy, independent of whether the resulting value is plausible.

use serde::{Deserialize, Serialize};

use crate::benchmark::{get_industry_benchmark, get_industry_thresholds};
use crate::numeric::mean;
use crate::types::{DcfInputs, FinancialData};
use crate::valuation::dcf::DcfResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Does assumed revenue growth square with what the reinvestment plan can
/// fund at the company's historical ROIC?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthConsistency {
    pub implied_growth: f64,
    pub assumed_growth: f64,
    pub deviation: f64,
    pub is_valid: bool,
}

/// Steady-state CapEx should roughly replace depreciation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexDaRatio {
    pub current: f64,
    pub target: f64,
    pub is_reasonable: bool,
}

/// Terminal-year FCF conversion against the usual industry band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcfQuality {
    pub fcf_to_ni: f64,
    pub industry_range: (f64, f64),
    pub is_reasonable: bool,
}

/// Full Layer B verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralCheck {
    pub growth_consistency: GrowthConsistency,
    pub capex_da_ratio: CapexDaRatio,
    pub fcf_quality: FcfQuality,
    pub has_warnings: bool,
    pub warnings: Vec<String>,
}

const GROWTH_DEVIATION_LIMIT: f64 = 0.05;
const CAPEX_DA_RANGE: (f64, f64) = (0.8, 1.5);
const FCF_NI_RANGE: (f64, f64) = (0.6, 1.2);
const TERMINAL_SHARE_LIMIT: f64 = 80.0;
const TERMINAL_GROWTH_LIMIT: f64 = 0.04;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Audit `inputs`/`result` for structural consistency. Pure and total; all
/// findings surface as flags and warnings.
pub fn run_structural_check(
    inputs: &DcfInputs,
    result: &DcfResult,
    data: &FinancialData,
) -> StructuralCheck {
    let mut warnings: Vec<String> = Vec::new();

    let growth_consistency = check_growth_consistency(inputs, data, &mut warnings);
    let capex_da_ratio = check_capex_da(inputs);
    let fcf_quality = check_fcf_quality(result);

    if !growth_consistency.is_valid {
        warnings.push(format!(
            "Assumed revenue growth {:.1}% deviates from the reinvestment-implied {:.1}% by more than {:.0}pp",
            growth_consistency.assumed_growth * 100.0,
            growth_consistency.implied_growth * 100.0,
            GROWTH_DEVIATION_LIMIT * 100.0
        ));
    }
    if !capex_da_ratio.is_reasonable {
        warnings.push(format!(
            "CapEx/D&A ratio {:.2} outside [{}, {}]; steady state should replace depreciation",
            capex_da_ratio.current, CAPEX_DA_RANGE.0, CAPEX_DA_RANGE.1
        ));
    }
    if !fcf_quality.is_reasonable {
        warnings.push(format!(
            "Terminal-year FCF/NOPAT {:.2} outside the industry band [{}, {}]",
            fcf_quality.fcf_to_ni, FCF_NI_RANGE.0, FCF_NI_RANGE.1
        ));
    }
    if result.terminal_value_percent > TERMINAL_SHARE_LIMIT {
        warnings.push(format!(
            "Terminal value carries {:.1}% of enterprise value; explicit period barely matters",
            result.terminal_value_percent
        ));
    }
    if inputs.terminal_growth_rate >= inputs.wacc {
        warnings.push(format!(
            "Terminal growth {:.4} is at or above WACC {:.4}; valuation is undefined",
            inputs.terminal_growth_rate, inputs.wacc
        ));
    }
    if inputs.terminal_growth_rate > TERMINAL_GROWTH_LIMIT {
        warnings.push(format!(
            "Terminal growth {:.1}% exceeds {:.0}%; no company outgrows the economy forever",
            inputs.terminal_growth_rate * 100.0,
            TERMINAL_GROWTH_LIMIT * 100.0
        ));
    }

    StructuralCheck {
        growth_consistency,
        capex_da_ratio,
        fcf_quality,
        has_warnings: !warnings.is_empty(),
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

fn check_growth_consistency(
    inputs: &DcfInputs,
    data: &FinancialData,
    warnings: &mut Vec<String>,
) -> GrowthConsistency {
    let n = inputs.explicit_period_years.min(inputs.drivers.len());
    let explicit = &inputs.drivers[..n];

    let avg_margin = mean(&explicit.iter().map(|d| d.operating_margin).collect::<Vec<_>>());
    let avg_tax = mean(&explicit.iter().map(|d| d.tax_rate).collect::<Vec<_>>());
    let avg_capex = mean(&explicit.iter().map(|d| d.capex_percent).collect::<Vec<_>>());
    let avg_da = mean(&explicit.iter().map(|d| d.da_percent).collect::<Vec<_>>());
    let avg_wc = mean(&explicit.iter().map(|d| d.wc_change_percent).collect::<Vec<_>>());
    let assumed_growth = mean(&explicit.iter().map(|d| d.revenue_growth).collect::<Vec<_>>());

    let net_nopat_margin = avg_margin * (1.0 - avg_tax);
    let reinvestment_rate = if net_nopat_margin > 0.0 {
        let raw = (avg_capex - avg_da + avg_wc) / net_nopat_margin;
        if raw > 0.0 {
            raw
        } else {
            0.0
        }
    } else {
        0.0
    };

    let implied_growth = data.historical_roic * reinvestment_rate;
    let deviation = (assumed_growth - implied_growth).abs();

    // Flag a historical ROIC the industry would consider implausible before
    // trusting the growth cross-check built on it.
    let benchmark = get_industry_benchmark(&data.industry, &data.sector);
    let thresholds = get_industry_thresholds(&benchmark);
    let roic_floor = (-0.10_f64).min(benchmark.after_tax_roic - 0.30);
    if data.historical_roic < roic_floor || data.historical_roic > thresholds.roic_error {
        warnings.push(format!(
            "Historical ROIC {:.1}% sits outside the plausible industry band [{:.1}%, {:.1}%]",
            data.historical_roic * 100.0,
            roic_floor * 100.0,
            thresholds.roic_error * 100.0
        ));
    }

    GrowthConsistency {
        implied_growth,
        assumed_growth,
        deviation,
        is_valid: deviation < GROWTH_DEVIATION_LIMIT,
    }
}

fn check_capex_da(inputs: &DcfInputs) -> CapexDaRatio {
    let n = inputs.explicit_period_years.min(inputs.drivers.len());
    let current = match inputs.drivers.get(n.saturating_sub(1)) {
        Some(last) if last.da_percent != 0.0 => last.capex_percent / last.da_percent,
        _ => 0.0,
    };
    CapexDaRatio {
        current,
        target: 1.0,
        is_reasonable: (CAPEX_DA_RANGE.0..=CAPEX_DA_RANGE.1).contains(&current),
    }
}

fn check_fcf_quality(result: &DcfResult) -> FcfQuality {
    let fcf_to_ni = match result.projections.last() {
        Some(last) if last.nopat > 0.0 => last.fcf / last.nopat,
        _ => 0.0,
    };
    FcfQuality {
        fcf_to_ni,
        industry_range: FCF_NI_RANGE,
        is_reasonable: (FCF_NI_RANGE.0..=FCF_NI_RANGE.1).contains(&fcf_to_ni),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
