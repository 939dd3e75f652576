use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::{DocumentError, OperationKind, ParsedOperation, parse_operation};
use crate::domain::selection::Selection;

/// A GraphQL request as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl Operation {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Parse the document and resolve the selected operation against the
    /// request variables.
    pub fn document(&self) -> Result<ParsedOperation, DocumentError> {
        parse_operation(
            &self.query,
            self.operation_name.as_deref(),
            self.variables.as_ref(),
        )
    }

    /// Selection the cache reads and writes for this operation. `None` for
    /// mutations, subscriptions and documents that fail to parse.
    pub fn cache_selection(&self) -> Option<Vec<Selection>> {
        let parsed = self.document().ok()?;
        (parsed.kind == OperationKind::Query).then_some(parsed.selections)
    }

    pub fn dedup_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.query.clone())
    }
}
