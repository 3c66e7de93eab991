//! Static table → sensitive-fields configuration.
//!
//! Lives in `fieldseal.toml` under `[tables.<name>]`:
//!
//! ```toml
//! [tables.users]
//! fields = ["email", "phone"]
//!
//! [tables.incidents]
//! fields = ["description"]
//! condition = { kind = "value_in", field = "severity", values = ["high", "critical"] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// When a record of a table qualifies for field encryption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncryptWhen {
    /// Every record.
    #[default]
    Always,
    /// Only records whose `flag` column is `true`.
    FlagTrue { flag: String },
    /// Only records whose `field` column equals one of `values`.
    ValueIn { field: String, values: Vec<Value> },
}

impl EncryptWhen {
    pub fn applies(&self, record: &Map<String, Value>) -> bool {
        match self {
            Self::Always => true,
            Self::FlagTrue { flag } => matches!(record.get(flag), Some(Value::Bool(true))),
            Self::ValueIn { field, values } => record
                .get(field)
                .is_some_and(|v| values.iter().any(|allowed| allowed == v)),
        }
    }
}

/// The sensitive fields of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePolicy {
    pub fields: Vec<String>,

    #[serde(default)]
    pub condition: EncryptWhen,

    /// Column holding the record id bound into each field's context.
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl TablePolicy {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            condition: EncryptWhen::Always,
            id_field: default_id_field(),
        }
    }

    pub fn when(mut self, condition: EncryptWhen) -> Self {
        self.condition = condition;
        self
    }

    pub fn id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }
}

/// All table policies, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensitiveFields {
    tables: BTreeMap<String, TablePolicy>,
}

impl SensitiveFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the policy for `table`.
    pub fn table(mut self, table: impl Into<String>, policy: TablePolicy) -> Self {
        self.tables.insert(table.into(), policy);
        self
    }

    pub fn policy_for(&self, table: &str) -> Option<&TablePolicy> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
