//! `fieldseal encrypt-field` / `fieldseal decrypt-field`: seal or open a
//! single value bound to `{field}:{record_id}`.

use serde_json::Value;

use crate::cli::{open_seal, parse_json, read_value, Cli};
use crate::errors::Result;

/// Execute the `encrypt-field` command.  Prints the envelope JSON.
pub fn execute_encrypt(
    cli: &Cli,
    field: &str,
    record_id: &str,
    value: Option<&str>,
    json: bool,
) -> Result<()> {
    let raw = read_value(value, &format!("Enter value for {field}"))?;
    let value = if json {
        parse_json::<Value>(&raw, "value")?
    } else {
        Value::String(raw.to_string())
    };

    let seal = open_seal(cli)?;
    let envelope = seal.fields().encrypt_field(&value, field, record_id)?;
    println!("{envelope}");

    Ok(())
}

/// Execute the `decrypt-field` command.  Strings print raw, anything
/// else prints as JSON.
pub fn execute_decrypt(
    cli: &Cli,
    field: &str,
    record_id: &str,
    envelope: Option<&str>,
) -> Result<()> {
    let encoded = match envelope {
        Some(e) => e.to_string(),
        None => crate::cli::read_input(None)?.trim().to_string(),
    };

    let seal = open_seal(cli)?;
    match seal.fields().decrypt_field(&encoded, field, record_id)? {
        Value::String(s) => println!("{s}"),
        other => println!("{other}"),
    }

    Ok(())
}
