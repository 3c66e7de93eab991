//! One module per CLI subcommand.

pub mod audit_cmd;
pub mod backup;
pub mod field;
pub mod generate;
pub mod keys;
pub mod password;
pub mod record;
