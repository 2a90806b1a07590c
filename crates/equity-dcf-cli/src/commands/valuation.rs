use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use equity_dcf_core::orchestrator::{run_valuation, ValuationRequest};
use equity_dcf_core::types::{DcfInputs, FinancialData, WaccInputs};
use equity_dcf_core::valuation::dcf::calculate_dcf;
use equity_dcf_core::valuation::prefill::create_prefilled_inputs;

use crate::input::load_request;

/// Arguments for the full valuation pipeline
#[derive(Args)]
pub struct ValuationArgs {
    /// Path to JSON request file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the prefill pass alone
#[derive(Args)]
pub struct PrefillArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for a single DCF run
#[derive(Args)]
pub struct DcfArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Deserialize)]
struct PrefillRequest {
    symbol: String,
    financial_data: FinancialData,
    wacc_inputs: WaccInputs,
}

#[derive(Deserialize)]
pub(crate) struct DcfRequest {
    pub inputs: DcfInputs,
    pub financial_data: FinancialData,
}

pub fn run_valuation_command(args: ValuationArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ValuationRequest = load_request(&args.input, "valuation")?;
    let response = run_valuation(&request)?;
    Ok(serde_json::to_value(response)?)
}

pub fn run_prefill(args: PrefillArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: PrefillRequest = load_request(&args.input, "prefill")?;
    let (inputs, audit) =
        create_prefilled_inputs(&request.symbol, &request.financial_data, &request.wacc_inputs);
    Ok(serde_json::json!({ "inputs": inputs, "audit": audit }))
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: DcfRequest = load_request(&args.input, "dcf")?;
    let result = calculate_dcf(&request.inputs, &request.financial_data);
    Ok(serde_json::to_value(result)?)
}
