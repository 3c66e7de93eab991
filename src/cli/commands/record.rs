//! `fieldseal record encrypt|decrypt`: apply a table's field policy to a
//! JSON record.

use serde_json::{Map, Value};

use crate::cli::{open_seal, output, parse_json, print_json, read_input, Cli};
use crate::errors::{FieldSealError, Result};

/// Execute `record encrypt`.
pub fn execute_encrypt(cli: &Cli, table: &str, file: Option<&str>) -> Result<()> {
    let record = load_record(file)?;
    let seal = open_seal(cli)?;

    if seal.fields().tables().policy_for(table).is_none() {
        output::warning(&format!(
            "No sensitive fields configured for table '{table}'; record unchanged."
        ));
    }

    let encrypted = seal.fields().encrypt_record(&record, table)?;
    print_json(&encrypted)
}

/// Execute `record decrypt`.
pub fn execute_decrypt(cli: &Cli, table: &str, file: Option<&str>) -> Result<()> {
    let record = load_record(file)?;
    let seal = open_seal(cli)?;

    let decrypted = seal.fields().decrypt_record(&record, table)?;
    print_json(&decrypted)
}

fn load_record(file: Option<&str>) -> Result<Map<String, Value>> {
    match parse_json::<Value>(&read_input(file)?, "record")? {
        Value::Object(map) => Ok(map),
        _ => Err(FieldSealError::CommandFailed(
            "record must be a JSON object".into(),
        )),
    }
}
