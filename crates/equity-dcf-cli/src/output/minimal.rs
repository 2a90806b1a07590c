use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Heuristic: look for well-known result fields in order of priority,
/// then fall back to the first field in the object.
pub fn print_minimal(value: &Value) {
    let priority_paths = [
        &["results", "perpetuity", "dcf", "fair_value_per_share"][..],
        &["fair_value_per_share"][..],
        &["final_wacc"][..],
        &["p50"][..],
        &["implied_growth_rate"][..],
        &["enterprise_value"][..],
    ];

    for path in &priority_paths {
        let mut cursor = value;
        let mut found = true;
        for segment in *path {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found && !cursor.is_null() {
            println!("{}", format_minimal(cursor));
            return;
        }
    }

    if let Value::Object(map) = value {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(value));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
