// 🕸️ Graph store - idempotent node/edge upserts
//
// Node identity: (label, key value). Edge identity: (source, type, target).
// Every upsert is its own unit of work and overwrites all properties of the
// matched node or edge. Nothing spans a whole legislator.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::fs;
use std::path::Path;

pub type Properties = serde_json::Map<String, Value>;

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Handle to a node by its natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub label: String,
    pub key_property: String,
    pub key_value: String,
}

pub trait GraphStore {
    /// Create the node or overwrite its properties; the key property is
    /// always part of the stored properties.
    fn upsert_node(
        &self,
        label: &str,
        key_property: &str,
        key_value: &str,
        properties: &Properties,
    ) -> Result<NodeRef>;

    /// Create the edge or overwrite its properties; both ends must exist
    fn upsert_edge(
        &self,
        from: &NodeRef,
        edge_type: &str,
        to: &NodeRef,
        properties: &Properties,
    ) -> Result<()>;

    /// Upsert log hook; stores without one ignore it
    fn record_upsert(&self, _event: &UpsertEvent) -> Result<()> {
        Ok(())
    }
}

/// Labels, edge types and property names end up in query text
fn check_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(PipelineError::Persistence(format!("invalid {} '{}'", kind, name)))
    }
}

fn with_key(key_property: &str, key_value: &str, properties: &Properties) -> Properties {
    let mut stored = properties.clone();
    stored.insert(key_property.to_string(), Value::String(key_value.to_string()));
    stored
}

// ============================================================================
// UPSERT LOG
// ============================================================================

/// One legislator written by one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertEvent {
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
    /// MP node key
    pub legislator: String,
    pub details: Value,
}

impl UpsertEvent {
    pub fn new(run_id: &str, legislator: &str, details: Value) -> Self {
        UpsertEvent {
            run_id: run_id.to_string(),
            recorded_at: Utc::now(),
            legislator: legislator.to_string(),
            details,
        }
    }
}

fn upsert_event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpsertEvent> {
    let recorded_at: String = row.get(1)?;
    let details: String = row.get(3)?;

    Ok(UpsertEvent {
        run_id: row.get(0)?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
        legislator: row.get(2)?,
        details: serde_json::from_str(&details)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
    })
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Property graph kept in SQLite tables
///
/// Owns its connection; dropping the store (or `close`) ends the session.
pub struct SqliteGraphStore {
    conn: Connection,
}

impl SqliteGraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        setup_schema(&conn)?;
        Ok(SqliteGraphStore { conn })
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    fn node_exists(&self, node: &NodeRef) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM nodes WHERE label = ?1 AND key_value = ?2",
                params![node.label, node.key_value],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn node_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?)
    }

    pub fn edge_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?)
    }

    pub fn count_by_label(&self, label: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE label = ?1",
            params![label],
            |row| row.get(0),
        )?)
    }

    pub fn count_by_edge_type(&self, edge_type: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE edge_type = ?1",
            params![edge_type],
            |row| row.get(0),
        )?)
    }

    pub fn node_properties(&self, label: &str, key_value: &str) -> Result<Option<Properties>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT properties FROM nodes WHERE label = ?1 AND key_value = ?2",
                params![label, key_value],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|text| serde_json::from_str(&text).map_err(PipelineError::from))
            .transpose()
    }

    pub fn edge_properties(&self, from: &NodeRef, edge_type: &str, to: &NodeRef) -> Result<Option<Properties>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT properties FROM edges
                 WHERE from_label = ?1 AND from_key = ?2 AND edge_type = ?3
                   AND to_label = ?4 AND to_key = ?5",
                params![from.label, from.key_value, edge_type, to.label, to.key_value],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|text| serde_json::from_str(&text).map_err(PipelineError::from))
            .transpose()
    }

    /// Key values of the targets of `edge_type` edges leaving a node
    pub fn neighbours(&self, from: &NodeRef, edge_type: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT to_key FROM edges
             WHERE from_label = ?1 AND from_key = ?2 AND edge_type = ?3
             ORDER BY to_key",
        )?;

        let keys = stmt
            .query_map(params![from.label, from.key_value, edge_type], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Node counts per label followed by edge counts per type
    pub fn stats(&self) -> Result<Vec<GraphStat>> {
        let mut stats = Vec::new();

        let mut stmt = self
            .conn
            .prepare("SELECT label, COUNT(*) FROM nodes GROUP BY label ORDER BY label")?;
        let nodes = stmt
            .query_map([], |row| {
                Ok(GraphStat {
                    kind: StatKind::Node,
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        stats.extend(nodes);

        let mut stmt = self
            .conn
            .prepare("SELECT edge_type, COUNT(*) FROM edges GROUP BY edge_type ORDER BY edge_type")?;
        let edges = stmt
            .query_map([], |row| {
                Ok(GraphStat {
                    kind: StatKind::Edge,
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        stats.extend(edges);

        Ok(stats)
    }

    /// Run that most recently wrote a legislator
    pub fn latest_run_id(&self) -> Result<Option<String>> {
        let run_id = self
            .conn
            .query_row("SELECT run_id FROM upsert_log ORDER BY id DESC LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(run_id)
    }

    /// Everything one run wrote, in write order
    pub fn run_events(&self, run_id: &str) -> Result<Vec<UpsertEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, recorded_at, legislator, details
             FROM upsert_log
             WHERE run_id = ?1
             ORDER BY id",
        )?;

        let events = stmt
            .query_map(params![run_id], upsert_event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

impl GraphStore for SqliteGraphStore {
    fn upsert_node(
        &self,
        label: &str,
        key_property: &str,
        key_value: &str,
        properties: &Properties,
    ) -> Result<NodeRef> {
        check_identifier("label", label)?;
        check_identifier("key property", key_property)?;

        let stored = with_key(key_property, key_value, properties);
        self.conn.execute(
            "INSERT INTO nodes (label, key_property, key_value, properties, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(label, key_value) DO UPDATE SET
                key_property = excluded.key_property,
                properties = excluded.properties,
                updated_at = excluded.updated_at",
            params![
                label,
                key_property,
                key_value,
                serde_json::to_string(&stored)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(NodeRef {
            label: label.to_string(),
            key_property: key_property.to_string(),
            key_value: key_value.to_string(),
        })
    }

    fn upsert_edge(
        &self,
        from: &NodeRef,
        edge_type: &str,
        to: &NodeRef,
        properties: &Properties,
    ) -> Result<()> {
        check_identifier("edge type", edge_type)?;
        for node in [from, to] {
            if !self.node_exists(node)? {
                return Err(PipelineError::Persistence(format!(
                    "cannot connect {} edge to missing {} node '{}'",
                    edge_type, node.label, node.key_value
                )));
            }
        }

        self.conn.execute(
            "INSERT INTO edges (from_label, from_key, edge_type, to_label, to_key, properties, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(from_label, from_key, edge_type, to_label, to_key) DO UPDATE SET
                properties = excluded.properties,
                updated_at = excluded.updated_at",
            params![
                from.label,
                from.key_value,
                edge_type,
                to.label,
                to.key_value,
                serde_json::to_string(properties)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn record_upsert(&self, event: &UpsertEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO upsert_log (run_id, recorded_at, legislator, details) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.run_id,
                event.recorded_at.to_rfc3339(),
                event.legislator,
                serde_json::to_string(&event.details)?,
            ],
        )?;
        Ok(())
    }
}

fn setup_schema(conn: &Connection) -> Result<()> {
    // WAL keeps readers consistent while a run is writing ("memory" for in-memory databases)
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            key_property TEXT NOT NULL,
            key_value TEXT NOT NULL,
            properties TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL,
            UNIQUE(label, key_value)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_label TEXT NOT NULL,
            from_key TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            to_label TEXT NOT NULL,
            to_key TEXT NOT NULL,
            properties TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL,
            UNIQUE(from_label, from_key, edge_type, to_label, to_key)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS upsert_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            legislator TEXT NOT NULL,
            details TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_label, to_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_upsert_log_run ON upsert_log(run_id)",
        [],
    )?;

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Node,
    Edge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStat {
    pub kind: StatKind,
    pub name: String,
    pub count: i64,
}

// ============================================================================
// CYPHER SCRIPT
// ============================================================================

/// Renders every upsert as a Cypher MERGE statement
///
/// Replaying the script against a Neo4j-compatible database is idempotent.
#[derive(Debug, Default)]
pub struct CypherScript {
    statements: RefCell<Vec<String>>,
}

impl CypherScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.borrow().is_empty()
    }

    pub fn render(&self) -> String {
        let mut script = self.statements.borrow().join("\n");
        if !script.is_empty() {
            script.push('\n');
        }
        script
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

fn cypher_string(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn cypher_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => cypher_string(text),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(cypher_value).collect::<Vec<_>>().join(", ")
        ),
        // Nested maps are not valid property values
        Value::Object(_) => cypher_string(&value.to_string()),
    }
}

fn cypher_map(properties: &Properties) -> Result<String> {
    let mut entries = Vec::with_capacity(properties.len());
    for (name, value) in properties {
        check_identifier("property name", name)?;
        entries.push(format!("{}: {}", name, cypher_value(value)));
    }
    Ok(format!("{{{}}}", entries.join(", ")))
}

fn cypher_match(variable: &str, node: &NodeRef) -> String {
    format!(
        "({}:{} {{{}: {}}})",
        variable,
        node.label,
        node.key_property,
        cypher_string(&node.key_value)
    )
}

impl GraphStore for CypherScript {
    fn upsert_node(
        &self,
        label: &str,
        key_property: &str,
        key_value: &str,
        properties: &Properties,
    ) -> Result<NodeRef> {
        check_identifier("label", label)?;
        check_identifier("key property", key_property)?;

        let node = NodeRef {
            label: label.to_string(),
            key_property: key_property.to_string(),
            key_value: key_value.to_string(),
        };
        let stored = with_key(key_property, key_value, properties);

        self.statements.borrow_mut().push(format!(
            "MERGE {} SET n = {};",
            cypher_match("n", &node),
            cypher_map(&stored)?
        ));
        Ok(node)
    }

    fn upsert_edge(
        &self,
        from: &NodeRef,
        edge_type: &str,
        to: &NodeRef,
        properties: &Properties,
    ) -> Result<()> {
        check_identifier("edge type", edge_type)?;

        self.statements.borrow_mut().push(format!(
            "MATCH {}, {} MERGE (a)-[r:{}]->(b) SET r = {};",
            cypher_match("a", from),
            cypher_match("b", to),
            edge_type,
            cypher_map(properties)?
        ));
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    #[test]
    fn test_node_upsert_is_idempotent_and_overwrites() {
        let store = SqliteGraphStore::open_in_memory().unwrap();

        store
            .upsert_node("MP", "name", "MP 1", &props(json!({"party": "Labour", "turnout": 500})))
            .unwrap();
        store
            .upsert_node("MP", "name", "MP 1", &props(json!({"party": "Conservative"})))
            .unwrap();

        assert_eq!(store.node_count().unwrap(), 1);
        let stored = store.node_properties("MP", "MP 1").unwrap().unwrap();
        assert_eq!(stored["party"], "Conservative");
        assert_eq!(stored["name"], "MP 1");
        // Last write wins for the whole property set
        assert!(!stored.contains_key("turnout"));
    }

    #[test]
    fn test_same_key_different_label_are_distinct() {
        let store = SqliteGraphStore::open_in_memory().unwrap();

        store.upsert_node("Party", "name", "Green", &Properties::new()).unwrap();
        store.upsert_node("Policy", "name", "Green", &Properties::new()).unwrap();

        assert_eq!(store.node_count().unwrap(), 2);
        assert_eq!(store.count_by_label("Party").unwrap(), 1);
    }

    #[test]
    fn test_edge_identity_is_the_triple() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mp = store.upsert_node("MP", "name", "MP 1", &Properties::new()).unwrap();
        let policy = store.upsert_node("Policy", "name", "Policy 1", &Properties::new()).unwrap();

        store
            .upsert_edge(&mp, "VOTED_FOR", &policy, &props(json!({"strength": 0.75})))
            .unwrap();
        store
            .upsert_edge(&mp, "VOTED_FOR", &policy, &props(json!({"strength": 0.8})))
            .unwrap();
        store
            .upsert_edge(&mp, "VOTED_AGAINST", &policy, &props(json!({"strength": 0.9})))
            .unwrap();

        assert_eq!(store.edge_count().unwrap(), 2);
        let stored = store.edge_properties(&mp, "VOTED_FOR", &policy).unwrap().unwrap();
        assert_eq!(stored["strength"], 0.8);
        assert_eq!(store.neighbours(&mp, "VOTED_AGAINST").unwrap(), vec!["Policy 1"]);
    }

    #[test]
    fn test_edge_to_missing_node_is_rejected() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mp = store.upsert_node("MP", "name", "MP 1", &Properties::new()).unwrap();
        let ghost = NodeRef {
            label: "Party".to_string(),
            key_property: "name".to_string(),
            key_value: "Ghost".to_string(),
        };

        let err = store
            .upsert_edge(&mp, "IS_A_MEMBER_OF", &ghost, &Properties::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert_eq!(store.edge_count().unwrap(), 0);
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        let store = SqliteGraphStore::open_in_memory().unwrap();

        assert!(store.upsert_node("MP) DETACH DELETE", "name", "x", &Properties::new()).is_err());
        assert!(store.upsert_node("MP", "1name", "x", &Properties::new()).is_err());
    }

    #[test]
    fn test_upsert_log_groups_by_run() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        assert_eq!(store.latest_run_id().unwrap(), None);

        store.record_upsert(&UpsertEvent::new("run-1", "MP 1", json!({"votes": 3}))).unwrap();
        store.record_upsert(&UpsertEvent::new("run-2", "MP 1", json!({"votes": 4}))).unwrap();
        store.record_upsert(&UpsertEvent::new("run-2", "MP 2", json!({"votes": 0}))).unwrap();

        assert_eq!(store.latest_run_id().unwrap().as_deref(), Some("run-2"));
        let events = store.run_events("run-2").unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.legislator.as_str()).collect();
        assert_eq!(names, vec!["MP 1", "MP 2"]);
        assert_eq!(events[0].details["votes"], 4);
        assert_eq!(store.run_events("run-1").unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        let store = SqliteGraphStore::open(&path).unwrap();
        store.upsert_node("Region", "name", "London", &Properties::new()).unwrap();
        store.close().unwrap();

        let reopened = SqliteGraphStore::open(&path).unwrap();
        assert_eq!(reopened.count_by_label("Region").unwrap(), 1);
        let stats = reopened.stats().unwrap();
        assert_eq!(
            stats,
            vec![GraphStat {
                kind: StatKind::Node,
                name: "Region".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_cypher_rendering() {
        let script = CypherScript::new();
        let mp = script
            .upsert_node("MP", "name", "Dan O'Brien", &props(json!({"majority": 200, "post": null})))
            .unwrap();
        let party = script.upsert_node("Party", "name", "Labour", &Properties::new()).unwrap();
        script
            .upsert_edge(&mp, "IS_A_MEMBER_OF", &party, &Properties::new())
            .unwrap();

        let rendered = script.render();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(script.len(), 3);
        assert_eq!(
            lines[0],
            r"MERGE (n:MP {name: 'Dan O\'Brien'}) SET n = {majority: 200, name: 'Dan O\'Brien', post: null};"
        );
        assert_eq!(
            lines[2],
            r"MATCH (a:MP {name: 'Dan O\'Brien'}), (b:Party {name: 'Labour'}) MERGE (a)-[r:IS_A_MEMBER_OF]->(b) SET r = {};"
        );
    }
}
