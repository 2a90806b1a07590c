use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use equity_dcf_core::monte_carlo::params::{apply_param_overrides, create_default_params};
use equity_dcf_core::monte_carlo::simulation::run_monte_carlo;
use equity_dcf_core::types::{DcfInputs, FinancialData};

use crate::input::load_request;

/// Arguments for a standalone Monte Carlo run
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Deserialize)]
struct MonteCarloRequest {
    inputs: DcfInputs,
    financial_data: FinancialData,
    /// Recursive patch onto the default parameter tree
    #[serde(default)]
    params: Option<Value>,
}

pub fn run_monte_carlo_command(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: MonteCarloRequest = load_request(&args.input, "monte-carlo")?;

    let mut warnings: Vec<String> = Vec::new();
    let mut params = create_default_params(&request.inputs, Some(&request.financial_data));
    if let Some(patch) = &request.params {
        apply_param_overrides(&mut params, patch, &mut warnings)?;
    }

    let result = run_monte_carlo(&params, &request.inputs, &request.financial_data);
    Ok(serde_json::json!({
        "params": params,
        "result": result,
        "warnings": warnings,
    }))
}
