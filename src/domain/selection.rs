//! Selection sets the normalized cache reads and writes through.

use serde_json::{Map, Value};

pub(crate) const TYPENAME_KEY: &str = "__typename";

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(FieldSelection),
    /// Fields spread from a named or inline fragment.
    Fragment {
        type_condition: Option<String>,
        selections: Vec<Selection>,
    },
}

impl Selection {
    pub fn field(field: FieldSelection) -> Self {
        Self::Field(field)
    }

    pub fn fragment(type_condition: Option<&str>, selections: Vec<Selection>) -> Self {
        Self::Fragment {
            type_condition: type_condition.map(str::to_string),
            selections,
        }
    }
}

/// One selected field with its arguments already resolved to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Map<String, Value>,
    pub selections: Option<Vec<Selection>>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Map::new(),
            selections: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn with_selections(mut self, selections: Vec<Selection>) -> Self {
        self.selections = Some(selections);
        self
    }

    /// Key the field appears under in a response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Key the field is stored under: the name, plus its arguments as JSON
    /// when it has any (`product({"id":7})`).
    pub fn storage_key(&self) -> String {
        if self.arguments.is_empty() {
            return self.name.clone();
        }
        let encoded = serde_json::to_string(&self.arguments).unwrap_or_default();
        format!("{}({encoded})", self.name)
    }
}

/// A fragment applies unless the object's `__typename` is known and differs.
pub(crate) fn fragment_applies(type_condition: Option<&str>, object: &Map<String, Value>) -> bool {
    match (
        type_condition,
        object.get(TYPENAME_KEY).and_then(Value::as_str),
    ) {
        (Some(condition), Some(typename)) => condition == typename,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn storage_key_carries_sorted_arguments() {
        let field = FieldSelection::new("products")
            .with_argument("first", json!(3))
            .with_argument("category", json!("tea"));
        assert_eq!(
            field.storage_key(),
            r#"products({"category":"tea","first":3})"#
        );
        assert_eq!(FieldSelection::new("viewer").storage_key(), "viewer");
    }

    #[test]
    fn alias_only_changes_the_response_key() {
        let field = FieldSelection::new("user")
            .with_alias("me")
            .with_argument("id", json!(1));
        assert_eq!(field.response_key(), "me");
        assert_eq!(field.storage_key(), r#"user({"id":1})"#);
    }

    #[test]
    fn fragments_match_on_typename() {
        let user = json!({ "__typename": "User" });
        let untyped = json!({ "id": 1 });
        let (Value::Object(user), Value::Object(untyped)) = (user, untyped) else {
            unreachable!()
        };
        assert!(fragment_applies(Some("User"), &user));
        assert!(!fragment_applies(Some("Team"), &user));
        assert!(fragment_applies(Some("Team"), &untyped));
        assert!(fragment_applies(None, &user));
    }
}
