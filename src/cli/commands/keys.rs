//! `fieldseal keys`: list the loaded master key versions.

use crate::cli::{open_seal, output, Cli};
use crate::errors::Result;

/// Execute the `keys` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let seal = open_seal(cli)?;
    let keys = seal.keys();

    output::print_key_table(keys);
    output::info(&format!(
        "PBKDF2 iterations: {}, cache TTL: {} days",
        keys.options().iterations,
        keys.options().rotation_interval.num_days()
    ));

    Ok(())
}
