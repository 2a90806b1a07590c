//! Request loading for the eqval subcommands. Every command consumes exactly
//! one JSON request document — a `ValuationRequest`, a `DcfInputs` bundle, a
//! Monte Carlo request — from `--input <file>` or piped stdin, deserialized
//! straight into the command's typed request.

use serde::de::DeserializeOwned;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

/// Load the typed request document for a subcommand.
///
/// An explicit `--input` path wins; otherwise piped stdin is consumed. An
/// interactive terminal with no path is an error, since no eqval operation
/// can run without a full request.
pub fn load_request<T: DeserializeOwned>(
    input_path: &Option<String>,
    command: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    match input_path {
        Some(path) => request_from_file(path, command),
        None => request_from_stdin(command),
    }
}

fn request_from_file<T: DeserializeOwned>(
    path: &str,
    command: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    let resolved = resolve_request_path(path)?;
    let contents = fs::read_to_string(&resolved)
        .map_err(|e| format!("Failed to read '{}': {}", resolved.display(), e))?;
    parse_request(&contents, command, &resolved.display().to_string())
}

fn request_from_stdin<T: DeserializeOwned>(command: &str) -> Result<T, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Err(format!(
            "the {command} command needs a JSON request: pass --input <file.json> or pipe it on stdin"
        )
        .into());
    }

    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    if buffer.trim().is_empty() {
        return Err(format!("stdin carried no data for the {command} command").into());
    }

    parse_request(&buffer, command, "stdin")
}

fn parse_request<T: DeserializeOwned>(
    raw: &str,
    command: &str,
    source: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    serde_json::from_str(raw.trim())
        .map_err(|e| format!("{source} is not a valid {command} request: {e}").into())
}

fn resolve_request_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = std::path::Path::new(path);
    let resolved = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !resolved.is_file() {
        return Err(format!("Request file not found: {}", resolved.display()).into());
    }

    Ok(resolved)
}
