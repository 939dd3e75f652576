//! Normalized in-memory result cache.
//!
//! Query results are flattened into a key-value store: every object carrying a
//! `__typename` and an `id` (or `_id`) becomes its own entity, and the place it
//! was found holds a `{"__ref": "<Type>:<id>"}` pointer instead. Root fields are
//! stored on the `ROOT_QUERY` entity. Reads and writes follow a selection set,
//! so fields are stored under their argument-qualified keys and a read only
//! succeeds when every selected field is present.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use super::selection::{Selection, TYPENAME_KEY, fragment_applies};

pub const ROOT_QUERY: &str = "ROOT_QUERY";
const REF_KEY: &str = "__ref";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache state must be a JSON object")]
    NotAnObject,
    #[error("cache entity `{key}` must be a JSON object")]
    InvalidEntity { key: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedCache {
    entities: BTreeMap<String, Map<String, Value>>,
}

impl NormalizedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, key: &str) -> Option<&Map<String, Value>> {
        self.entities.get(key)
    }

    /// Store the selected root fields of `data` under `ROOT_QUERY`.
    ///
    /// Only selected fields are written, each under its storage key. Objects
    /// keep their `__typename` so they can be identified later. Non-object
    /// `data` is ignored.
    pub fn write_root(&mut self, selections: &[Selection], data: &Value) {
        let Value::Object(fields) = data else {
            return;
        };
        let root = self.normalize_fields(selections, fields);
        if !root.is_empty() {
            self.merge_entity(ROOT_QUERY.to_string(), root);
        }
    }

    /// Read the selection back from `ROOT_QUERY`, resolving every reference.
    ///
    /// Returns `None` when any selected field, at any depth, has never been
    /// written. Dangling references read as `null`.
    pub fn read_root(&self, selections: &[Selection]) -> Option<Value> {
        let root = self.entities.get(ROOT_QUERY)?;
        self.read_fields(selections, root).map(Value::Object)
    }

    /// Snapshot the whole store as a plain JSON object.
    pub fn extract(&self) -> Value {
        let entities = self
            .entities
            .iter()
            .map(|(key, fields)| (key.clone(), Value::Object(fields.clone())))
            .collect::<Map<_, _>>();
        Value::Object(entities)
    }

    /// Replace the store with a previously extracted snapshot.
    pub fn restore(&mut self, state: Value) -> Result<(), CacheError> {
        let Value::Object(entries) = state else {
            return Err(CacheError::NotAnObject);
        };

        let mut entities = BTreeMap::new();
        for (key, entity) in entries {
            match entity {
                Value::Object(fields) => {
                    entities.insert(key, fields);
                }
                _ => return Err(CacheError::InvalidEntity { key }),
            }
        }
        self.entities = entities;
        Ok(())
    }

    fn normalize_fields(
        &mut self,
        selections: &[Selection],
        object: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        self.collect_writes(selections, object, &mut out);
        out
    }

    fn collect_writes(
        &mut self,
        selections: &[Selection],
        object: &Map<String, Value>,
        out: &mut Map<String, Value>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    let Some(value) = object.get(field.response_key()) else {
                        continue;
                    };
                    let stored = match field.selections.as_deref() {
                        Some(inner) => self.normalize(inner, value),
                        None => value.clone(),
                    };
                    out.insert(field.storage_key(), stored);
                }
                Selection::Fragment {
                    type_condition,
                    selections,
                } => {
                    if fragment_applies(type_condition.as_deref(), object) {
                        self.collect_writes(selections, object, out);
                    }
                }
            }
        }
    }

    fn normalize(&mut self, selections: &[Selection], value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.normalize(selections, item))
                    .collect(),
            ),
            Value::Object(fields) => {
                let mut normalized = self.normalize_fields(selections, fields);
                if let Some(typename) = fields.get(TYPENAME_KEY) {
                    normalized.insert(TYPENAME_KEY.to_string(), typename.clone());
                }
                match entity_key(fields) {
                    Some(key) => {
                        self.merge_entity(key.clone(), normalized);
                        reference(key)
                    }
                    None => Value::Object(normalized),
                }
            }
            other => other.clone(),
        }
    }

    fn merge_entity(&mut self, key: String, fields: Map<String, Value>) {
        let entry = self.entities.entry(key).or_default();
        for (name, value) in fields {
            entry.insert(name, value);
        }
    }

    fn read_fields(
        &self,
        selections: &[Selection],
        stored: &Map<String, Value>,
    ) -> Option<Map<String, Value>> {
        let mut out = Map::new();
        self.collect_reads(selections, stored, &mut out)?;
        Some(out)
    }

    fn collect_reads(
        &self,
        selections: &[Selection],
        stored: &Map<String, Value>,
        out: &mut Map<String, Value>,
    ) -> Option<()> {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    let value = stored.get(&field.storage_key())?;
                    let read = match field.selections.as_deref() {
                        Some(inner) => self.read_value(inner, value)?,
                        None => value.clone(),
                    };
                    out.insert(field.response_key().to_string(), read);
                }
                Selection::Fragment {
                    type_condition,
                    selections,
                } => {
                    if fragment_applies(type_condition.as_deref(), stored) {
                        self.collect_reads(selections, stored, out)?;
                    }
                }
            }
        }
        Some(())
    }

    fn read_value(&self, selections: &[Selection], value: &Value) -> Option<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.read_value(selections, item))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Value::Object(fields) => {
                let object = match ref_target(fields) {
                    Some(key) => match self.entities.get(key) {
                        Some(entity) => entity,
                        None => return Some(Value::Null),
                    },
                    None => fields,
                };
                let mut out = self.read_fields(selections, object)?;
                if let Some(typename) = object.get(TYPENAME_KEY) {
                    out.entry(TYPENAME_KEY).or_insert_with(|| typename.clone());
                }
                Some(Value::Object(out))
            }
            other => Some(other.clone()),
        }
    }
}

fn entity_key(fields: &Map<String, Value>) -> Option<String> {
    let typename = fields.get(TYPENAME_KEY)?.as_str()?;
    let id = fields.get("id").or_else(|| fields.get("_id"))?;
    let id = match id {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    Some(format!("{typename}:{id}"))
}

fn ref_target(fields: &Map<String, Value>) -> Option<&str> {
    if fields.len() != 1 {
        return None;
    }
    fields.get(REF_KEY)?.as_str()
}

fn reference(key: String) -> Value {
    let mut pointer = Map::new();
    pointer.insert(REF_KEY.to_string(), Value::String(key));
    Value::Object(pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::selection::FieldSelection;
    use serde_json::json;

    fn leaf(name: &str) -> Selection {
        Selection::field(FieldSelection::new(name))
    }

    fn object(name: &str, fields: Vec<Selection>) -> Selection {
        Selection::field(FieldSelection::new(name).with_selections(fields))
    }

    fn user_selection() -> Vec<Selection> {
        vec![object(
            "viewer",
            vec![
                leaf("id"),
                leaf("name"),
                object("team", vec![leaf("id"), leaf("label")]),
            ],
        )]
    }

    #[test]
    fn nested_entities_are_flattened_into_references() {
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &user_selection(),
            &json!({
                "viewer": {
                    "__typename": "User",
                    "id": "u1",
                    "name": "Ada",
                    "team": { "__typename": "Team", "id": 7, "label": "core" }
                }
            }),
        );

        assert_eq!(
            cache.entity(ROOT_QUERY).and_then(|root| root.get("viewer")),
            Some(&json!({ "__ref": "User:u1" }))
        );
        assert_eq!(
            cache.entity("User:u1").and_then(|user| user.get("team")),
            Some(&json!({ "__ref": "Team:7" }))
        );
        assert_eq!(
            cache.entity("Team:7").and_then(|team| team.get("label")),
            Some(&json!("core"))
        );
        assert_eq!(
            cache.read_root(&user_selection()),
            Some(json!({
                "viewer": {
                    "__typename": "User",
                    "id": "u1",
                    "name": "Ada",
                    "team": { "__typename": "Team", "id": 7, "label": "core" }
                }
            }))
        );
    }

    #[test]
    fn objects_without_identity_stay_inline() {
        let selection = vec![object("stats", vec![leaf("count")])];
        let mut cache = NormalizedCache::new();
        cache.write_root(&selection, &json!({ "stats": { "count": 3 } }));

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.read_root(&selection),
            Some(json!({ "stats": { "count": 3 } }))
        );
    }

    #[test]
    fn unselected_fields_are_not_stored() {
        let mut cache = NormalizedCache::new();
        cache.write_root(&[leaf("a")], &json!({ "a": 1, "b": 2 }));
        assert_eq!(cache.entity(ROOT_QUERY), json!({ "a": 1 }).as_object());
    }

    #[test]
    fn later_writes_merge_into_existing_entities() {
        let name = vec![object("a", vec![leaf("id"), leaf("name")])];
        let email = vec![object("b", vec![leaf("id"), leaf("email")])];
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &name,
            &json!({ "a": { "__typename": "User", "id": 1, "name": "Ada" } }),
        );
        cache.write_root(
            &email,
            &json!({ "b": { "__typename": "User", "id": 1, "email": "ada@example.com" } }),
        );

        let both = vec![object("a", vec![leaf("name"), leaf("email")])];
        let read = cache.read_root(&both).expect("cached");
        assert_eq!(read["a"]["name"], json!("Ada"));
        assert_eq!(read["a"]["email"], json!("ada@example.com"));
    }

    #[test]
    fn fields_with_different_arguments_are_stored_apart() {
        let product = |id: i64| {
            vec![Selection::field(
                FieldSelection::new("product")
                    .with_argument("id", json!(id))
                    .with_selections(vec![leaf("id"), leaf("name")]),
            )]
        };
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &product(7),
            &json!({ "product": { "__typename": "Product", "id": 7, "name": "Kettle" } }),
        );

        assert_eq!(cache.read_root(&product(8)), None);
        cache.write_root(
            &product(8),
            &json!({ "product": { "__typename": "Product", "id": 8, "name": "Teapot" } }),
        );

        let root = cache.entity(ROOT_QUERY).expect("root");
        assert_eq!(root.get(r#"product({"id":7})"#), Some(&json!({ "__ref": "Product:7" })));
        assert_eq!(root.get(r#"product({"id":8})"#), Some(&json!({ "__ref": "Product:8" })));
        assert_eq!(cache.read_root(&product(7)).expect("7")["product"]["name"], "Kettle");
        assert_eq!(cache.read_root(&product(8)).expect("8")["product"]["name"], "Teapot");
    }

    #[test]
    fn read_misses_when_any_field_is_unknown() {
        let mut cache = NormalizedCache::new();
        cache.write_root(&[leaf("a")], &json!({ "a": 1 }));
        assert_eq!(cache.read_root(&[leaf("a"), leaf("b")]), None);
        assert_eq!(NormalizedCache::new().read_root(&[leaf("a")]), None);
    }

    #[test]
    fn wider_selection_misses_after_a_narrower_write() {
        let narrow = vec![object("viewer", vec![leaf("id")])];
        let wide = vec![object("viewer", vec![leaf("id"), leaf("price")])];
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &narrow,
            &json!({ "viewer": { "__typename": "User", "id": 1 } }),
        );

        assert!(cache.read_root(&narrow).is_some());
        assert_eq!(cache.read_root(&wide), None);
    }

    #[test]
    fn list_reads_miss_when_one_element_lacks_a_field() {
        let mut cache = NormalizedCache::new();
        cache
            .restore(json!({
                "ROOT_QUERY": { "posts": [{ "__ref": "Post:1" }, { "__ref": "Post:2" }] },
                "Post:1": { "title": "a" },
                "Post:2": {}
            }))
            .expect("restore");
        assert_eq!(cache.read_root(&[object("posts", vec![leaf("title")])]), None);
    }

    #[test]
    fn aliases_are_stored_by_field_and_read_by_alias() {
        let aliased = vec![Selection::field(
            FieldSelection::new("user")
                .with_alias("me")
                .with_argument("id", json!(1))
                .with_selections(vec![leaf("id"), leaf("name")]),
        )];
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &aliased,
            &json!({ "me": { "__typename": "User", "id": 1, "name": "Ada" } }),
        );

        assert!(
            cache
                .entity(ROOT_QUERY)
                .is_some_and(|root| root.contains_key(r#"user({"id":1})"#))
        );
        assert_eq!(cache.read_root(&aliased).expect("cached")["me"]["name"], "Ada");
    }

    #[test]
    fn fragments_only_apply_to_matching_types() {
        let selection = vec![object(
            "node",
            vec![
                leaf("id"),
                Selection::fragment(Some("User"), vec![leaf("name")]),
                Selection::fragment(Some("Team"), vec![leaf("label")]),
            ],
        )];
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &selection,
            &json!({ "node": { "__typename": "User", "id": 1, "name": "Ada" } }),
        );

        assert_eq!(
            cache.read_root(&selection),
            Some(json!({ "node": { "__typename": "User", "id": 1, "name": "Ada" } }))
        );
    }

    #[test]
    fn dangling_references_read_as_null() {
        let mut cache = NormalizedCache::new();
        cache
            .restore(json!({ "ROOT_QUERY": { "viewer": { "__ref": "User:gone" } } }))
            .expect("restore");
        assert_eq!(
            cache.read_root(&[object("viewer", vec![leaf("id")])]),
            Some(json!({ "viewer": null }))
        );
    }

    #[test]
    fn self_referencing_entities_terminate() {
        let mut cache = NormalizedCache::new();
        cache
            .restore(json!({
                "ROOT_QUERY": { "node": { "__ref": "Node:1" } },
                "Node:1": { "id": 1, "next": { "__ref": "Node:1" } }
            }))
            .expect("restore");
        let selection = vec![object(
            "node",
            vec![object("next", vec![object("next", vec![leaf("id")])])],
        )];
        assert_eq!(
            cache.read_root(&selection),
            Some(json!({ "node": { "next": { "next": { "id": 1 } } } }))
        );
    }

    #[test]
    fn restore_then_extract_is_identity() {
        let state = json!({ "Query": { "id": 1 } });
        let mut cache = NormalizedCache::new();
        cache.restore(state.clone()).expect("restore");
        assert_eq!(cache.extract(), state);
    }

    #[test]
    fn restore_rejects_malformed_state() {
        let mut cache = NormalizedCache::new();
        assert_eq!(cache.restore(json!([1, 2])), Err(CacheError::NotAnObject));
        assert_eq!(
            cache.restore(json!({ "Query": 1 })),
            Err(CacheError::InvalidEntity {
                key: "Query".to_string()
            })
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn extract_snapshot_lists_entities_in_key_order() {
        let mut cache = NormalizedCache::new();
        cache.write_root(
            &[object("posts", vec![leaf("id"), leaf("title")])],
            &json!({ "posts": [
                { "__typename": "Post", "id": 2, "title": "b" },
                { "__typename": "Post", "id": 1, "title": "a" }
            ] }),
        );

        insta::assert_json_snapshot!(cache.extract(), @r#"
        {
          "Post:1": {
            "__typename": "Post",
            "id": 1,
            "title": "a"
          },
          "Post:2": {
            "__typename": "Post",
            "id": 2,
            "title": "b"
          },
          "ROOT_QUERY": {
            "posts": [
              {
                "__ref": "Post:2"
              },
              {
                "__ref": "Post:1"
              }
            ]
          }
        }
        "#);
    }
}
