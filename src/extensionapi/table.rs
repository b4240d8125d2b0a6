//! # Table Conversion
//!
//! Renders lists as `meta.k8s.io/v1` Tables for `kubectl get`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use serde::Serialize;
use serde_json::Value;

use super::object::ApiObject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub format: String,
    pub description: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub cells: Vec<Value>,
    pub object: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub metadata: ListMeta,
    pub column_definitions: Vec<TableColumnDefinition>,
    pub rows: Vec<TableRow>,
}

pub trait TableConvertor<K>: Send + Sync {
    fn convert_to_table(&self, items: &[K], list_meta: &ListMeta) -> Table;
}

/// Extra column read from each object by a dotted path such as
/// `.spec.type` or `.status.phase`.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub definition: TableColumnDefinition,
    pub path: String,
}

impl TableColumn {
    pub fn new(name: &str, type_: &str, path: &str) -> Self {
        Self {
            definition: TableColumnDefinition {
                name: name.to_string(),
                type_: type_.to_string(),
                format: String::new(),
                description: String::new(),
                priority: 0,
            },
            path: path.to_string(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.definition.priority = priority;
        self
    }
}

/// Name, optional extra columns, then creation time.
#[derive(Debug, Clone, Default)]
pub struct DefaultTableConvertor {
    columns: Vec<TableColumn>,
}

impl DefaultTableConvertor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_columns(columns: Vec<TableColumn>) -> Self {
        Self { columns }
    }

    fn definitions(&self) -> Vec<TableColumnDefinition> {
        let mut defs = vec![TableColumnDefinition {
            name: "Name".to_string(),
            type_: "string".to_string(),
            format: "name".to_string(),
            description: "Name must be unique within a namespace.".to_string(),
            priority: 0,
        }];
        defs.extend(self.columns.iter().map(|c| c.definition.clone()));
        defs.push(TableColumnDefinition {
            name: "Created At".to_string(),
            type_: "date".to_string(),
            format: String::new(),
            description: "CreationTimestamp of the object.".to_string(),
            priority: 0,
        });
        defs
    }
}

impl<K: ApiObject> TableConvertor<K> for DefaultTableConvertor {
    fn convert_to_table(&self, items: &[K], list_meta: &ListMeta) -> Table {
        let rows = items
            .iter()
            .map(|item| {
                let doc = serde_json::to_value(item).unwrap_or(Value::Null);
                let meta = item.meta();
                let mut cells = vec![Value::from(meta.name.clone().unwrap_or_default())];
                cells.extend(self.columns.iter().map(|c| lookup(&doc, &c.path)));
                cells.push(doc.pointer("/metadata/creationTimestamp").cloned().unwrap_or(Value::Null));
                TableRow {
                    cells,
                    object: partial_object_metadata(meta),
                }
            })
            .collect();
        Table {
            kind: "Table",
            api_version: "meta.k8s.io/v1",
            metadata: list_meta.clone(),
            column_definitions: self.definitions(),
            rows,
        }
    }
}

fn partial_object_metadata(meta: &ObjectMeta) -> Value {
    serde_json::json!({
        "kind": "PartialObjectMetadata",
        "apiVersion": "meta.k8s.io/v1",
        "metadata": meta,
    })
}

/// Resolve a dotted path; missing values render as empty strings.
fn lookup(doc: &Value, path: &str) -> Value {
    let pointer: String = path
        .trim_start_matches('.')
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| format!("/{s}"))
        .collect();
    match doc.pointer(&pointer) {
        Some(Value::Null) | None => Value::from(""),
        Some(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;

    #[test]
    fn test_default_columns() {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("acme".to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        let table = DefaultTableConvertor::new().convert_to_table(&[ns], &ListMeta::default());
        assert_eq!(table.column_definitions.len(), 2);
        assert_eq!(table.rows[0].cells[0], "acme");
        assert_eq!(table.rows[0].object["kind"], "PartialObjectMetadata");
    }

    #[test]
    fn test_extra_columns_resolve_paths() {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("acme".to_string()),
                ..ObjectMeta::default()
            },
            status: Some(k8s_openapi::api::core::v1::NamespaceStatus {
                phase: Some("Active".to_string()),
                ..Default::default()
            }),
            ..Namespace::default()
        };
        let tc = DefaultTableConvertor::with_columns(vec![
            TableColumn::new("Phase", "string", ".status.phase"),
            TableColumn::new("Missing", "string", ".spec.nothing"),
        ]);
        let table = tc.convert_to_table(&[ns], &ListMeta::default());
        assert_eq!(table.rows[0].cells[1], "Active");
        assert_eq!(table.rows[0].cells[2], "");
    }
}
