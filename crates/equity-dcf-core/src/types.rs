use serde::{Deserialize, Serialize};

/// Consensus estimate for one fiscal year, aggregated across the analyst panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystEstimate {
    pub fiscal_year: i32,
    pub revenue_low: f64,
    pub revenue_avg: f64,
    pub revenue_high: f64,
    pub eps_low: f64,
    pub eps_avg: f64,
    pub eps_high: f64,
    pub num_analysts: u32,
}

/// Historical distribution of a valuation multiple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplePercentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub min: f64,
    pub max: f64,
}

/// Normalized statement bundle for one company. All monetary fields are in a
/// single currency; upstream owns currency conversion and TTM aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialData {
    pub symbol: String,
    pub company_name: String,
    pub currency: String,

    // Market snapshot
    pub current_price: f64,
    pub market_cap: f64,
    pub shares_outstanding: f64,
    pub beta: f64,

    // Trailing-twelve-month income statement
    pub ttm_revenue: f64,
    pub ttm_gross_profit: f64,
    pub ttm_operating_income: f64,
    pub ttm_net_income: f64,
    pub ttm_eps: f64,
    pub ttm_fcf: f64,
    pub ttm_sbc: f64,
    pub interest_expense: f64,

    // Derived margins
    pub gross_margin: f64,
    pub operating_margin: f64,
    pub net_margin: f64,

    // Latest full-year anchors
    pub latest_annual_revenue: f64,
    pub latest_annual_net_income: f64,

    // Balance sheet
    pub total_cash: f64,
    pub total_debt: f64,
    /// total_cash - total_debt
    pub net_cash: f64,
    pub total_equity: f64,

    // Historical ratios
    pub historical_da_percent: f64,
    pub historical_capex_percent: f64,
    pub historical_wc_change_percent: f64,
    pub historical_roic: f64,
    pub effective_tax_rate: f64,
    pub cost_of_debt: f64,

    /// Forward estimates ordered by fiscal year
    pub analyst_estimates: Vec<AnalystEstimate>,

    // Valuation multiples: historical percentiles and current readings
    pub pe_percentiles: MultiplePercentiles,
    pub peg_percentiles: MultiplePercentiles,
    pub pfcf_percentiles: MultiplePercentiles,
    pub current_pe: f64,
    pub current_peg: f64,
    pub current_pfcf: f64,

    // Classification
    pub sector: String,
    pub industry: String,
}

/// Market-level discount rate inputs, all unit-less fractions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaccInputs {
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub country_risk_premium: f64,
}

/// Per-year assumptions for the explicit forecast period. All rates are
/// fractions of revenue, except `wc_change_percent` which is a fraction of
/// the year-over-year revenue change.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueDrivers {
    pub revenue_growth: f64,
    pub gross_margin: f64,
    pub operating_margin: f64,
    pub tax_rate: f64,
    pub da_percent: f64,
    pub capex_percent: f64,
    pub wc_change_percent: f64,
}

/// Mechanism for the value beyond the explicit period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalMethod {
    /// Gordon growth perpetuity on terminal-year FCF
    #[serde(rename = "perpetuity")]
    Perpetuity,
    /// Reinvestment-consistent perpetuity: payout = 1 - g / steady-state ROIC
    #[serde(rename = "roic-driven")]
    RoicDriven,
    /// Linear fade of growth and ROIC to steady state, then a Gordon tail
    #[serde(rename = "fade")]
    Fade,
}

impl Default for TerminalMethod {
    fn default() -> Self {
        TerminalMethod::Perpetuity
    }
}

impl std::fmt::Display for TerminalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalMethod::Perpetuity => write!(f, "perpetuity"),
            TerminalMethod::RoicDriven => write!(f, "roic-driven"),
            TerminalMethod::Fade => write!(f, "fade"),
        }
    }
}

/// Complete input set for one DCF run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInputs {
    pub symbol: String,
    /// Number of explicit forecast years, within [1, drivers.len()]
    pub explicit_period_years: usize,
    /// Per-year assumptions; at least `explicit_period_years` entries
    pub drivers: Vec<ValueDrivers>,
    pub terminal_method: TerminalMethod,
    pub terminal_growth_rate: f64,
    pub steady_state_roic: f64,
    pub fade_years: u32,
    pub fade_start_growth: f64,
    pub fade_start_roic: f64,
    pub wacc: f64,
    pub base_revenue: f64,
    pub base_net_income: f64,
}
