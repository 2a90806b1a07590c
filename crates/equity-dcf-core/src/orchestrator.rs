use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checks::market_implied::{calculate_market_implied, MarketImplied};
use crate::checks::structural::{run_structural_check, StructuralCheck};
use crate::error::ValuationError;
use crate::monte_carlo::params::{apply_param_overrides, create_default_params, MonteCarloParams};
use crate::monte_carlo::simulation::{run_monte_carlo, MonteCarloResult};
use crate::types::{DcfInputs, FinancialData, TerminalMethod, WaccInputs};
use crate::valuation::dcf::{calculate_dcf, DcfResult};
use crate::valuation::prefill::create_prefilled_inputs;
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One valuation request: a statement bundle, discount-rate inputs and
/// optional caller overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationRequest {
    pub symbol: String,
    pub financial_data: FinancialData,
    pub wacc_inputs: WaccInputs,
    pub overrides: Option<ValuationOverrides>,
    /// When false, every `value_distribution` in the response is emptied;
    /// percentiles and summary statistics remain populated.
    pub include_distribution: bool,
    pub request_id: String,
}

/// Caller overrides. Unknown keys are tolerated everywhere; absent keys are
/// no-ops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationOverrides {
    pub dcf: Option<DcfOverrides>,
    /// Recursive patch onto the default Monte Carlo parameter tree: object
    /// nodes merge, scalars and arrays replace.
    pub monte_carlo: Option<Value>,
}

/// Recognized DCF overrides. Every numeric value must be finite; a
/// non-finite value fails the whole request with the offending path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DcfOverrides {
    pub wacc: Option<f64>,
    pub terminal_growth_rate: Option<f64>,
    pub steady_state_roic: Option<f64>,
    pub fade_years: Option<f64>,
    pub fade_start_growth: Option<f64>,
    pub fade_start_roic: Option<f64>,
    pub explicit_period_years: Option<f64>,
    pub base_revenue: Option<f64>,
    pub base_net_income: Option<f64>,
    /// Per-year patches addressed by 1-based `year`. Entries addressing a
    /// year outside the driver grid are ignored with a warning rather than
    /// failing the request.
    pub drivers: Option<Vec<DriverOverride>>,
}

/// Patch for a single explicit-period year.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOverride {
    pub year: i64,
    pub revenue_growth: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub tax_rate: Option<f64>,
    pub da_percent: Option<f64>,
    pub capex_percent: Option<f64>,
    pub wc_change_percent: Option<f64>,
}

/// Request identification and versioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub symbol: String,
    pub company_name: String,
    pub generated_at: DateTime<Utc>,
    pub api_version: String,
    pub core_version: String,
}

/// The inputs actually used after prefill, overrides and sanity clamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveInputs {
    pub dcf_inputs: DcfInputs,
    pub monte_carlo_by_method: MonteCarloByMethod,
}

/// Monte Carlo parameters per terminal method. The trees differ only in the
/// seed, which is offset per method so the streams stay disjoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloByMethod {
    pub perpetuity: MonteCarloParams,
    pub roic_driven: MonteCarloParams,
    pub fade: MonteCarloParams,
}

/// DCF, structural audit and value distribution for one terminal method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResult {
    pub dcf: DcfResult,
    pub layer_b: StructuralCheck,
    pub monte_carlo: MonteCarloResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResults {
    pub perpetuity: MethodResult,
    pub roic_driven: MethodResult,
    pub fade: MethodResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub layer_c: MarketImplied,
}

/// Full valuation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResponse {
    pub meta: ResponseMeta,
    pub effective_inputs: EffectiveInputs,
    pub results: MethodResults,
    pub validation: Validation,
    pub warnings: Vec<String>,
}

pub const API_VERSION: &str = "v1";
const MIN_WACC_SPREAD: f64 = 0.005;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the full valuation pipeline: prefill, overrides, sanity clamps, the
/// three terminal-method triples (DCF, structural check, Monte Carlo), and
/// one reverse-DCF pass.
///
/// Errors only on structurally invalid overrides; every numeric doubt is a
/// warning on the response.
pub fn run_valuation(request: &ValuationRequest) -> ValuationResult<ValuationResponse> {
    let data = &request.financial_data;

    let (mut inputs, audit) =
        create_prefilled_inputs(&request.symbol, data, &request.wacc_inputs);
    let mut warnings = audit.warnings.clone();

    if let Some(dcf_overrides) = request.overrides.as_ref().and_then(|o| o.dcf.as_ref()) {
        apply_dcf_overrides(&mut inputs, dcf_overrides, &mut warnings)?;
    }

    apply_sanity_clamps(&mut inputs, &mut warnings);

    // One parameter tree for all methods; per-method copies only re-seed.
    let mut base_params = create_default_params(&inputs, Some(data));
    if let Some(patch) = request.overrides.as_ref().and_then(|o| o.monte_carlo.as_ref()) {
        apply_param_overrides(&mut base_params, patch, &mut warnings)?;
    }

    let (perpetuity_params, perpetuity) = run_method(
        TerminalMethod::Perpetuity,
        0,
        &inputs,
        &base_params,
        data,
        request.include_distribution,
    );
    let (roic_params, roic_driven) = run_method(
        TerminalMethod::RoicDriven,
        1,
        &inputs,
        &base_params,
        data,
        request.include_distribution,
    );
    let (fade_params, fade) = run_method(
        TerminalMethod::Fade,
        2,
        &inputs,
        &base_params,
        data,
        request.include_distribution,
    );

    let layer_c = calculate_market_implied(data, inputs.wacc, &inputs);

    Ok(ValuationResponse {
        meta: ResponseMeta {
            request_id: request.request_id.clone(),
            symbol: request.symbol.clone(),
            company_name: data.company_name.clone(),
            generated_at: Utc::now(),
            api_version: API_VERSION.to_string(),
            core_version: env!("CARGO_PKG_VERSION").to_string(),
        },
        effective_inputs: EffectiveInputs {
            dcf_inputs: inputs,
            monte_carlo_by_method: MonteCarloByMethod {
                perpetuity: perpetuity_params,
                roic_driven: roic_params,
                fade: fade_params,
            },
        },
        results: MethodResults {
            perpetuity,
            roic_driven,
            fade,
        },
        validation: Validation { layer_c },
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Per-method pipeline
// ---------------------------------------------------------------------------

fn run_method(
    method: TerminalMethod,
    seed_offset: u64,
    inputs: &DcfInputs,
    base_params: &MonteCarloParams,
    data: &FinancialData,
    include_distribution: bool,
) -> (MonteCarloParams, MethodResult) {
    let mut method_inputs = inputs.clone();
    method_inputs.terminal_method = method;

    let dcf = calculate_dcf(&method_inputs, data);
    let layer_b = run_structural_check(&method_inputs, &dcf, data);

    let mut params = base_params.clone();
    params.seed = base_params.seed.map(|s| s.wrapping_add(seed_offset));

    let mut monte_carlo = run_monte_carlo(&params, &method_inputs, data);
    if !include_distribution {
        monte_carlo.value_distribution = Vec::new();
    }

    (
        params,
        MethodResult {
            dcf,
            layer_b,
            monte_carlo,
        },
    )
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

fn require_finite(value: f64, path: &str) -> ValuationResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValuationError::InvalidOverride {
            path: path.to_string(),
            reason: "must be a finite number".to_string(),
        })
    }
}

fn clamp_with_warning(
    value: f64,
    lo: f64,
    hi: f64,
    path: &str,
    warnings: &mut Vec<String>,
) -> f64 {
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        warnings.push(format!(
            "Override {path}={value} outside [{lo}, {hi}]; clamped to {clamped}"
        ));
    }
    clamped
}

fn apply_dcf_overrides(
    inputs: &mut DcfInputs,
    overrides: &DcfOverrides,
    warnings: &mut Vec<String>,
) -> ValuationResult<()> {
    if let Some(wacc) = overrides.wacc {
        require_finite(wacc, "dcf.wacc")?;
        inputs.wacc = clamp_with_warning(wacc, 0.02, 0.30, "dcf.wacc", warnings);
    }
    if let Some(g) = overrides.terminal_growth_rate {
        require_finite(g, "dcf.terminal_growth_rate")?;
        inputs.terminal_growth_rate =
            clamp_with_warning(g, -0.05, 0.15, "dcf.terminal_growth_rate", warnings);
    }
    if let Some(roic) = overrides.steady_state_roic {
        require_finite(roic, "dcf.steady_state_roic")?;
        inputs.steady_state_roic =
            clamp_with_warning(roic, 0.001, 1.0, "dcf.steady_state_roic", warnings);
    }
    if let Some(years) = overrides.fade_years {
        require_finite(years, "dcf.fade_years")?;
        let rounded = clamp_with_warning(years.round(), 1.0, 30.0, "dcf.fade_years", warnings);
        inputs.fade_years = rounded as u32;
    }
    if let Some(g) = overrides.fade_start_growth {
        require_finite(g, "dcf.fade_start_growth")?;
        inputs.fade_start_growth =
            clamp_with_warning(g, -0.05, 0.50, "dcf.fade_start_growth", warnings);
    }
    if let Some(roic) = overrides.fade_start_roic {
        require_finite(roic, "dcf.fade_start_roic")?;
        inputs.fade_start_roic =
            clamp_with_warning(roic, 0.001, 1.0, "dcf.fade_start_roic", warnings);
    }
    if let Some(years) = overrides.explicit_period_years {
        require_finite(years, "dcf.explicit_period_years")?;
        let rounded = years.round() as i64;
        if rounded < 1 || rounded as usize > inputs.drivers.len() {
            return Err(ValuationError::InvalidOverride {
                path: "dcf.explicit_period_years".to_string(),
                reason: format!("must be an integer in [1, {}]", inputs.drivers.len()),
            });
        }
        inputs.explicit_period_years = rounded as usize;
    }
    if let Some(revenue) = overrides.base_revenue {
        require_finite(revenue, "dcf.base_revenue")?;
        if revenue < 0.0 {
            warnings.push(format!(
                "Override dcf.base_revenue={revenue} is negative; clamped to 0"
            ));
        }
        inputs.base_revenue = revenue.max(0.0);
    }
    if let Some(net_income) = overrides.base_net_income {
        require_finite(net_income, "dcf.base_net_income")?;
        inputs.base_net_income = net_income;
    }

    if let Some(driver_patches) = &overrides.drivers {
        for patch in driver_patches {
            let year = patch.year;
            if year < 1 || year as usize > inputs.drivers.len() {
                warnings.push(format!(
                    "Driver override for year {year} is outside [1, {}]; ignored",
                    inputs.drivers.len()
                ));
                continue;
            }
            let slot = &mut inputs.drivers[(year - 1) as usize];
            apply_driver_field(patch.revenue_growth, &mut slot.revenue_growth, year, "revenue_growth")?;
            apply_driver_field(patch.gross_margin, &mut slot.gross_margin, year, "gross_margin")?;
            apply_driver_field(
                patch.operating_margin,
                &mut slot.operating_margin,
                year,
                "operating_margin",
            )?;
            apply_driver_field(patch.tax_rate, &mut slot.tax_rate, year, "tax_rate")?;
            apply_driver_field(patch.da_percent, &mut slot.da_percent, year, "da_percent")?;
            apply_driver_field(patch.capex_percent, &mut slot.capex_percent, year, "capex_percent")?;
            apply_driver_field(
                patch.wc_change_percent,
                &mut slot.wc_change_percent,
                year,
                "wc_change_percent",
            )?;
        }
    }

    Ok(())
}

fn apply_driver_field(
    value: Option<f64>,
    slot: &mut f64,
    year: i64,
    field: &str,
) -> ValuationResult<()> {
    if let Some(v) = value {
        require_finite(v, &format!("dcf.drivers[year={year}].{field}"))?;
        *slot = v;
    }
    Ok(())
}

/// Clamps that hold regardless of where the numbers came from: the Gordon
/// denominator must stay positive and a fade must start at or above its
/// terminal growth.
fn apply_sanity_clamps(inputs: &mut DcfInputs, warnings: &mut Vec<String>) {
    if inputs.terminal_growth_rate >= inputs.wacc {
        let requested = inputs.terminal_growth_rate;
        let adjusted = inputs.wacc - MIN_WACC_SPREAD;
        inputs.terminal_growth_rate = adjusted;
        warnings.push(format!(
            "Terminal growth {requested} is not below WACC {}; adjusted to {adjusted}",
            inputs.wacc
        ));
    }
    if inputs.fade_start_growth < inputs.terminal_growth_rate {
        let requested = inputs.fade_start_growth;
        inputs.fade_start_growth = inputs.terminal_growth_rate;
        warnings.push(format!(
            "Fade-start growth {requested} below terminal growth {}; raised to match",
            inputs.terminal_growth_rate
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalystEstimate;

    fn sample_data() -> FinancialData {
        FinancialData {
            symbol: "TEST".into(),
            company_name: "Test Corp".into(),
            currency: "USD".into(),
            current_price: 150.0,
            market_cap: 3.0e11,
            shares_outstanding: 2.0e9,
            beta: 1.1,
            ttm_revenue: 1.0e9,
            ttm_operating_income: 2.0e8,
            ttm_net_income: 1.6e8,
            ttm_eps: 8.0,
            ttm_fcf: 1.8e8,
            interest_expense: 1.5e9,
            gross_margin: 0.40,
            operating_margin: 0.20,
            total_cash: 5.0e10,
            total_debt: 3.0e10,
            net_cash: 2.0e10,
            total_equity: 1.0e11,
            historical_da_percent: 0.03,
            historical_capex_percent: 0.04,
            historical_wc_change_percent: 0.01,
            historical_roic: 0.15,
            effective_tax_rate: 0.21,
            current_pe: 18.75,
            analyst_estimates: vec![
                AnalystEstimate {
                    fiscal_year: 2026,
                    revenue_low: 1.02e9,
                    revenue_avg: 1.08e9,
                    revenue_high: 1.16e9,
                    eps_low: 7.0,
                    eps_avg: 8.0,
                    eps_high: 9.0,
                    num_analysts: 20,
                },
                AnalystEstimate {
                    fiscal_year: 2027,
                    revenue_low: 1.09e9,
                    revenue_avg: 1.15e9,
                    revenue_high: 1.24e9,
                    eps_low: 8.0,
                    eps_avg: 9.0,
                    eps_high: 10.0,
                    num_analysts: 18,
                },
            ],
            sector: "Technology".into(),
            industry: "Software—Application".into(),
            ..Default::default()
        }
    }

    fn sample_request() -> ValuationRequest {
        ValuationRequest {
            symbol: "TEST".into(),
            financial_data: sample_data(),
            wacc_inputs: WaccInputs {
                risk_free_rate: 0.045,
                market_risk_premium: 0.05,
                country_risk_premium: 0.0,
            },
            overrides: None,
            include_distribution: false,
            request_id: "req-test".into(),
        }
    }

    fn seeded(mut request: ValuationRequest, iterations: u32) -> ValuationRequest {
        let patch = serde_json::json!({ "seed": 7, "iterations": iterations });
        let overrides = request.overrides.get_or_insert_with(Default::default);
        overrides.monte_carlo = Some(match overrides.monte_carlo.take() {
            Some(mut existing) => {
                if let (Some(base), Some(extra)) = (existing.as_object_mut(), patch.as_object()) {
                    for (k, v) in extra {
                        base.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                existing
            }
            None => patch,
        });
        request
    }

    #[test]
    fn test_wacc_override_passes_through() {
        let mut request = seeded(sample_request(), 300);
        request.overrides.as_mut().unwrap().dcf = Some(DcfOverrides {
            wacc: Some(0.11),
            drivers: Some(vec![DriverOverride {
                year: 2,
                operating_margin: Some(0.25),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let response = run_valuation(&request).unwrap();
        assert!((response.effective_inputs.dcf_inputs.wacc - 0.11).abs() < 1e-6);
        assert!(
            (response.effective_inputs.dcf_inputs.drivers[1].operating_margin - 0.25).abs() < 1e-6
        );
        // Untouched years keep the prefilled margin.
        assert!(
            (response.effective_inputs.dcf_inputs.drivers[0].operating_margin - 0.20).abs() < 1e-6
        );
    }

    #[test]
    fn test_out_of_range_driver_year_warns_and_ignores() {
        let mut request = seeded(sample_request(), 300);
        request.overrides.as_mut().unwrap().dcf = Some(DcfOverrides {
            drivers: Some(vec![DriverOverride {
                year: 6,
                operating_margin: Some(0.5),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let response = run_valuation(&request).unwrap();
        assert!(response
            .warnings
            .iter()
            .any(|w| w.contains("year 6") && w.contains("ignored")));
        assert!(response
            .effective_inputs
            .dcf_inputs
            .drivers
            .iter()
            .all(|d| (d.operating_margin - 0.20).abs() < 1e-9));
    }

    #[test]
    fn test_non_finite_override_fails_with_path() {
        let mut request = sample_request();
        request.overrides = Some(ValuationOverrides {
            dcf: Some(DcfOverrides {
                wacc: Some(f64::NAN),
                ..Default::default()
            }),
            monte_carlo: None,
        });

        let err = run_valuation(&request).unwrap_err();
        match err {
            ValuationError::InvalidOverride { path, .. } => assert!(path.contains("wacc")),
            other => panic!("expected InvalidOverride, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_driver_override_fails_with_full_path() {
        let mut request = sample_request();
        request.overrides = Some(ValuationOverrides {
            dcf: Some(DcfOverrides {
                drivers: Some(vec![DriverOverride {
                    year: 3,
                    operating_margin: Some(f64::INFINITY),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            monte_carlo: None,
        });

        let err = run_valuation(&request).unwrap_err();
        match err {
            ValuationError::InvalidOverride { path, .. } => {
                assert_eq!(path, "dcf.drivers[year=3].operating_margin")
            }
            other => panic!("expected InvalidOverride, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_period_years_out_of_range_fails() {
        let mut request = sample_request();
        request.overrides = Some(ValuationOverrides {
            dcf: Some(DcfOverrides {
                explicit_period_years: Some(9.0),
                ..Default::default()
            }),
            monte_carlo: None,
        });
        assert!(run_valuation(&request).is_err());
    }

    #[test]
    fn test_spread_enforcement() {
        let mut request = seeded(sample_request(), 300);
        request.overrides.as_mut().unwrap().dcf = Some(DcfOverrides {
            wacc: Some(0.08),
            terminal_growth_rate: Some(0.10),
            ..Default::default()
        });

        let response = run_valuation(&request).unwrap();
        assert!((response.effective_inputs.dcf_inputs.terminal_growth_rate - 0.075).abs() < 1e-12);
        assert!(response
            .warnings
            .iter()
            .any(|w| w.contains("0.1") && w.contains("0.075")));
    }

    #[test]
    fn test_method_seeds_are_disjoint() {
        let request = seeded(sample_request(), 300);
        let response = run_valuation(&request).unwrap();
        let by_method = &response.effective_inputs.monte_carlo_by_method;
        assert_eq!(by_method.perpetuity.seed, Some(7));
        assert_eq!(by_method.roic_driven.seed, Some(8));
        assert_eq!(by_method.fade.seed, Some(9));
    }

    #[test]
    fn test_distribution_stripping() {
        let mut request = seeded(sample_request(), 300);
        request.include_distribution = false;
        let response = run_valuation(&request).unwrap();
        assert!(response.results.perpetuity.monte_carlo.value_distribution.is_empty());
        assert!(response.results.perpetuity.monte_carlo.p50 > 0.0);

        request.include_distribution = true;
        let response = run_valuation(&request).unwrap();
        assert!(!response.results.perpetuity.monte_carlo.value_distribution.is_empty());
    }

    #[test]
    fn test_fade_start_raise() {
        let mut request = seeded(sample_request(), 300);
        request.overrides.as_mut().unwrap().dcf = Some(DcfOverrides {
            terminal_growth_rate: Some(0.06),
            fade_start_growth: Some(0.0),
            ..Default::default()
        });
        let response = run_valuation(&request).unwrap();
        let inputs = &response.effective_inputs.dcf_inputs;
        assert!(inputs.fade_start_growth >= inputs.terminal_growth_rate);
        assert!(response.warnings.iter().any(|w| w.contains("Fade-start")));
    }

    #[test]
    fn test_meta_versions() {
        let request = seeded(sample_request(), 200);
        let response = run_valuation(&request).unwrap();
        assert_eq!(response.meta.api_version, API_VERSION);
        assert_eq!(response.meta.core_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(response.meta.symbol, "TEST");
        assert_eq!(response.meta.request_id, "req-test");
    }
}
