#![warn(missing_docs)]
//! # spa-auth-contract-tests
//!
//! Frozen JSON schemas for the backend endpoints the session talks to, with
//! helpers for loading them. Validation lives in `tests/`.

use jsonschema::JSONSchema;
use serde_json::Value;

/// Directory holding schemas and fixtures.
pub const CONTRACTS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts");

/// Returns the path of a file under the contracts directory.
pub fn contract_path(relative: &str) -> String {
    format!("{CONTRACTS_DIR}/{relative}")
}

/// Reads and parses a JSON file.
///
/// # Errors
/// Returns a message naming the file when it is unreadable or not JSON.
pub fn load_json(path: &str) -> Result<Value, String> {
    let raw = std::fs::read_to_string(path).map_err(|error| format!("{path}: {error}"))?;
    serde_json::from_str(&raw).map_err(|error| format!("{path}: {error}"))
}

/// Compiles the schema at `contracts/<name>.schema.json`.
///
/// # Errors
/// Returns a message when the schema cannot be loaded or compiled.
pub fn compile_contract(name: &str) -> Result<JSONSchema, String> {
    let schema = load_json(&contract_path(&format!("{name}.schema.json")))?;
    JSONSchema::compile(&schema).map_err(|error| format!("{name}: {error}"))
}
