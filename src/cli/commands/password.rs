//! `fieldseal hash-password` / `fieldseal verify-password`.
//!
//! The password itself comes from `FIELDSEAL_PASSWORD` or a hidden
//! prompt, never from the command line.

use crate::cli::{print_json, project_dir, prompt_password, Cli};
use crate::config::Settings;
use crate::crypto::HashingService;
use crate::errors::{FieldSealError, Result};

fn hashing_service(cli: &Cli, iterations: Option<u32>) -> Result<HashingService> {
    let iterations = match iterations {
        Some(n) => n,
        None => Settings::load(&project_dir(cli)?)?.kdf_iterations,
    };
    HashingService::new(iterations)
}

/// Execute `hash-password`.  Prints `{hash, salt, algorithm, iterations}`.
pub fn execute_hash(cli: &Cli, iterations: Option<u32>) -> Result<()> {
    let service = hashing_service(cli, iterations)?;
    let password = prompt_password("Password to hash")?;
    let hashed = service.hash_password(&password)?;
    print_json(&hashed)
}

/// Execute `verify-password`.  A mismatch is an error (exit code 1).
pub fn execute_verify(cli: &Cli, hash: &str, salt: &str, iterations: Option<u32>) -> Result<()> {
    let service = hashing_service(cli, iterations)?;
    let password = prompt_password("Password to verify")?;

    if service.verify_password(&password, hash, salt, service.iterations()) {
        crate::cli::output::success("Password matches.");
        Ok(())
    } else {
        Err(FieldSealError::CommandFailed(
            "password does not match".into(),
        ))
    }
}
