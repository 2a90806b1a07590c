use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use equity_dcf_core::checks::market_implied::calculate_market_implied;
use equity_dcf_core::checks::structural::run_structural_check;
use equity_dcf_core::types::{DcfInputs, FinancialData};
use equity_dcf_core::valuation::dcf::calculate_dcf;

use crate::commands::valuation::DcfRequest;
use crate::input::load_request;

/// Arguments for the structural (Layer B) check
#[derive(Args)]
pub struct StructuralCheckArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the reverse-DCF (Layer C) check
#[derive(Args)]
pub struct MarketImpliedArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Deserialize)]
struct MarketImpliedRequest {
    financial_data: FinancialData,
    wacc: f64,
    inputs: DcfInputs,
}

pub fn run_structural(args: StructuralCheckArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: DcfRequest = load_request(&args.input, "structural-check")?;
    let result = calculate_dcf(&request.inputs, &request.financial_data);
    let check = run_structural_check(&request.inputs, &result, &request.financial_data);
    Ok(serde_json::json!({ "dcf": result, "check": check }))
}

pub fn run_market_implied(args: MarketImpliedArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: MarketImpliedRequest = load_request(&args.input, "market-implied")?;
    let implied =
        calculate_market_implied(&request.financial_data, request.wacc, &request.inputs);
    Ok(serde_json::to_value(implied)?)
}
