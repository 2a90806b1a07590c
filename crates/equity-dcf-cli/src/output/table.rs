use serde_json::Value;
use tabled::{builder::Builder, Table};

/// Format output as a field/value table. Nested objects are flattened one
/// level with dotted keys; the warnings array prints as a trailing list.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (key, val) in map {
                if key == "warnings" {
                    continue;
                }
                match val {
                    Value::Object(inner) => {
                        for (inner_key, inner_val) in inner {
                            builder.push_record([
                                format!("{key}.{inner_key}").as_str(),
                                &format_value(inner_val),
                            ]);
                        }
                    }
                    other => {
                        builder.push_record([key.as_str(), &format_value(other)]);
                    }
                }
            }
            let table = Table::from(builder);
            println!("{}", table);

            if let Some(Value::Array(warnings)) = map.get("warnings") {
                if !warnings.is_empty() {
                    println!("\nWarnings:");
                    for w in warnings {
                        if let Value::String(s) = w {
                            println!("  - {}", s);
                        }
                    }
                }
            }
        }
        other => println!("{}", other),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
