pub mod audit;
pub mod backup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod crypto;
pub mod errors;
pub mod fields;
pub mod tokens;

pub use context::{FieldSeal, FieldSealBuilder};
pub use errors::{FieldSealError, Result, TokenError};
