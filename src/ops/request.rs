//! Inbound request and outbound response shapes.
//!
//! Requests deserialize from camelCase JSON; every field except the ones an
//! operation cannot run without is optional and falls back to
//! [`OperationDefaults`](crate::config::OperationDefaults).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ConnectionOverrides;

/// Nearest-neighbor search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchRequest {
    pub table: Option<String>,
    pub column: Option<String>,
    /// Query embedding in any encoding the vector codec accepts.
    pub vector: Value,
    /// `cosine`, `l2`, `ip` / `inner-product`. Unknown names mean cosine.
    pub metric: Option<String>,
    pub limit: Option<i64>,
    /// Column equality filters, ANDed in insertion order.
    pub filter: Map<String, Value>,
    /// Raw boolean expression ANDed into the WHERE clause as written.
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub select: Option<String>,
    pub normalize: Option<bool>,
    pub dimension: Option<usize>,
    pub probes: Option<u32>,
    pub ef_search: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub connection: ConnectionOverrides,
}

/// One record to write: its embedding plus any other columns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordInput {
    #[serde(default)]
    pub vector: Value,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A single item or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

/// Insert or upsert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteRequest {
    pub table: Option<String>,
    pub column: Option<String>,
    pub id_column: Option<String>,
    pub records: OneOrMany<RecordInput>,
    pub normalize: Option<bool>,
    pub dimension: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub connection: ConnectionOverrides,
}

/// Identifiers returned by a write.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub ids: Vec<Value>,
    pub row_count: u64,
}

/// Caller-authored SQL with positional parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RawQueryRequest {
    pub sql: Option<String>,
    pub params: Vec<Value>,
    pub timeout_ms: Option<u64>,
    pub connection: ConnectionOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminAction {
    CreateExtension,
    CreateTable,
    CreateIvfflat,
    CreateHnsw,
    SetProbes,
    DropIndex,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::CreateExtension => "create-extension",
            AdminAction::CreateTable => "create-table",
            AdminAction::CreateIvfflat => "create-ivfflat",
            AdminAction::CreateHnsw => "create-hnsw",
            AdminAction::SetProbes => "set-probes",
            AdminAction::DropIndex => "drop-index",
        }
    }
}

/// Schema management.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdminRequest {
    pub action: AdminAction,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub probes: Option<u32>,
    /// ivfflat list count.
    #[serde(default)]
    pub lists: Option<u32>,
    /// hnsw graph degree.
    #[serde(default)]
    pub m: Option<u32>,
    #[serde(default)]
    pub ef_construction: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub connection: ConnectionOverrides,
}

impl AdminRequest {
    pub fn new(action: AdminAction) -> Self {
        Self {
            action,
            table: None,
            column: None,
            id_column: None,
            metric: None,
            dimension: None,
            index_name: None,
            probes: None,
            lists: None,
            m: None,
            ef_construction: None,
            timeout_ms: None,
            connection: ConnectionOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub ok: bool,
    pub action: AdminAction,
    pub row_count: u64,
    /// Index name for index actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

/// Table listing, or one table's columns when `table` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaRequest {
    pub table: Option<String>,
    pub timeout_ms: Option<u64>,
    pub connection: ConnectionOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    #[serde(alias = "table_schema")]
    pub schema: String,
    #[serde(alias = "table_name")]
    pub name: String,
    #[serde(alias = "table_type")]
    pub table_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    #[serde(alias = "column_name")]
    pub name: String,
    #[serde(alias = "data_type")]
    pub data_type: String,
    #[serde(alias = "udt_name")]
    pub udt_name: String,
    pub nullable: bool,
    #[serde(alias = "ordinal_position")]
    pub ordinal_position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaResponse {
    Tables { tables: Vec<TableInfo> },
    Columns { table: String, columns: Vec<ColumnInfo> },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_search_request_camel_case() {
        let request: SearchRequest = serde_json::from_value(json!({
            "table": "items",
            "vector": [0.1, 0.2],
            "where": "created_at > now() - interval '1 day'",
            "efSearch": 40,
            "timeoutMs": 500,
            "filter": {"b": 1, "a": 2},
            "connection": {"host": "replica"}
        }))
        .unwrap();

        assert_eq!(request.table.as_deref(), Some("items"));
        assert_eq!(request.ef_search, Some(40));
        assert_eq!(request.timeout_ms, Some(500));
        assert!(request.where_clause.unwrap().starts_with("created_at"));
        assert_eq!(request.filter.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(request.connection.host.as_deref(), Some("replica"));
    }

    #[test]
    fn test_records_one_or_many() {
        let one: WriteRequest = serde_json::from_value(json!({
            "records": {"vector": [1, 2], "content": "a"}
        }))
        .unwrap();
        let records = one.records.into_vec();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, json!([1, 2]));
        assert_eq!(records[0].fields["content"], "a");
        assert!(!records[0].fields.contains_key("vector"));

        let many: WriteRequest = serde_json::from_value(json!({
            "idColumn": "doc_id",
            "records": [{"vector": "1,2"}, {"vector": [3, 4], "doc_id": 9}]
        }))
        .unwrap();
        assert_eq!(many.id_column.as_deref(), Some("doc_id"));
        let records = many.records.into_vec();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].fields["doc_id"], 9);
    }

    #[test]
    fn test_admin_actions() {
        for (name, action) in [
            ("create-extension", AdminAction::CreateExtension),
            ("create-table", AdminAction::CreateTable),
            ("create-ivfflat", AdminAction::CreateIvfflat),
            ("create-hnsw", AdminAction::CreateHnsw),
            ("set-probes", AdminAction::SetProbes),
            ("drop-index", AdminAction::DropIndex),
        ] {
            let request: AdminRequest =
                serde_json::from_value(json!({ "action": name })).unwrap();
            assert_eq!(request.action, action);
            assert_eq!(action.as_str(), name);
        }
        assert!(serde_json::from_value::<AdminRequest>(json!({"action": "vacuum"})).is_err());
    }

    #[test]
    fn test_unknown_request_field_rejected() {
        assert!(serde_json::from_value::<SearchRequest>(json!({"tabel": "x"})).is_err());
    }

    #[test]
    fn test_schema_rows_deserialize() {
        let column: ColumnInfo = serde_json::from_value(json!({
            "column_name": "embedding",
            "data_type": "USER-DEFINED",
            "udt_name": "vector",
            "nullable": false,
            "ordinal_position": 2
        }))
        .unwrap();
        assert_eq!(column.name, "embedding");
        assert_eq!(column.udt_name, "vector");

        let json = serde_json::to_value(SchemaResponse::Columns {
            table: "items".into(),
            columns: vec![column],
        })
        .unwrap();
        assert_eq!(json["columns"][0]["dataType"], "USER-DEFINED");
    }
}
