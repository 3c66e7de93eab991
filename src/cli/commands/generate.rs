//! `fieldseal gen-id` / `fieldseal gen-key`.

use crate::cli::output;
use crate::crypto::{generate_secure_id, MasterKey};
use crate::errors::Result;

/// Execute `gen-id`.
pub fn execute_id(prefix: Option<&str>) -> Result<()> {
    println!("{}", generate_secure_id(prefix));
    Ok(())
}

/// Execute `gen-key`.  Prints 32 random bytes as hex, suitable for the
/// master key environment variable.
pub fn execute_key() -> Result<()> {
    let key = MasterKey::generate();
    println!("{}", hex::encode(key.as_bytes()));
    output::tip("Store it in a secret manager and export it as FIELDSEAL_MASTER_KEY.");
    Ok(())
}
