use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

#[napi]
pub fn run_valuation(request_json: String) -> NapiResult<String> {
    let request: equity_dcf_core::orchestrator::ValuationRequest =
        serde_json::from_str(&request_json).map_err(to_napi_error)?;
    let response =
        equity_dcf_core::orchestrator::run_valuation(&request).map_err(to_napi_error)?;
    serde_json::to_string(&response).map_err(to_napi_error)
}

#[napi]
pub fn prefill_inputs(
    symbol: String,
    financial_data_json: String,
    wacc_inputs_json: String,
) -> NapiResult<String> {
    let data: equity_dcf_core::types::FinancialData =
        serde_json::from_str(&financial_data_json).map_err(to_napi_error)?;
    let wacc_inputs: equity_dcf_core::types::WaccInputs =
        serde_json::from_str(&wacc_inputs_json).map_err(to_napi_error)?;
    let (inputs, audit) =
        equity_dcf_core::valuation::prefill::create_prefilled_inputs(&symbol, &data, &wacc_inputs);
    serde_json::to_string(&serde_json::json!({ "inputs": inputs, "audit": audit }))
        .map_err(to_napi_error)
}

#[napi]
pub fn calculate_dcf(inputs_json: String, financial_data_json: String) -> NapiResult<String> {
    let inputs: equity_dcf_core::types::DcfInputs =
        serde_json::from_str(&inputs_json).map_err(to_napi_error)?;
    let data: equity_dcf_core::types::FinancialData =
        serde_json::from_str(&financial_data_json).map_err(to_napi_error)?;
    let result = equity_dcf_core::valuation::dcf::calculate_dcf(&inputs, &data);
    serde_json::to_string(&result).map_err(to_napi_error)
}

#[napi]
pub fn market_implied(
    financial_data_json: String,
    wacc: f64,
    inputs_json: String,
) -> NapiResult<String> {
    let data: equity_dcf_core::types::FinancialData =
        serde_json::from_str(&financial_data_json).map_err(to_napi_error)?;
    let inputs: equity_dcf_core::types::DcfInputs =
        serde_json::from_str(&inputs_json).map_err(to_napi_error)?;
    let implied =
        equity_dcf_core::checks::market_implied::calculate_market_implied(&data, wacc, &inputs);
    serde_json::to_string(&implied).map_err(to_napi_error)
}
