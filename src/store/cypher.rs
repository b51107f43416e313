//! Cypher statement rendering
//!
//! Bolt-backed driver implementations execute parameterized UNWIND
//! statements; this module renders them from the operation-level batch
//! types so every driver issues byte-identical Cypher. The in-memory
//! store bypasses this layer entirely.

use serde_json::{json, Value};

use super::{GraphTransaction, NodeRow, RelPattern, RelRow, StoreResult};

/// A parameterized statement ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: Value,
}

/// Render the Clear step's detach-delete.
pub fn clear_statement() -> Statement {
    Statement {
        text: "MATCH (n) DETACH DELETE n".to_string(),
        parameters: json!({}),
    }
}

/// Render a bulk node merge.
///
/// `SET n = row.props` replaces prior properties rather than
/// accumulating them; the uid is re-asserted afterwards because the
/// full assignment overwrites it.
pub fn merge_nodes_statement(label: &str, rows: &[NodeRow]) -> Statement {
    let rows: Vec<Value> = rows
        .iter()
        .map(|r| json!({"uid": r.uid, "props": Value::Object(r.properties.clone())}))
        .collect();
    Statement {
        text: format!(
            "UNWIND $rows AS row\n\
             MERGE (n:`{label}` {{uid: row.uid}})\n\
             SET n = row.props\n\
             SET n.uid = row.uid"
        ),
        parameters: json!({ "rows": rows }),
    }
}

/// Render a bulk relationship merge for one endpoint pattern.
pub fn merge_relationships_statement(pattern: &RelPattern, rows: &[RelRow]) -> Statement {
    let rows: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "start_uid": r.start_uid,
                "end_uid": r.end_uid,
                "props": Value::Object(r.properties.clone()),
            })
        })
        .collect();
    Statement {
        text: format!(
            "UNWIND $rows AS row\n\
             MATCH (a:`{}` {{uid: row.start_uid}})\n\
             MATCH (b:`{}` {{uid: row.end_uid}})\n\
             MERGE (a)-[r:`{}`]->(b)\n\
             SET r += row.props",
            pattern.start_label, pattern.end_label, pattern.rel_type
        ),
        parameters: json!({ "rows": rows }),
    }
}

/// The surface a bolt-backed driver exposes to the adapter below.
pub trait StatementRunner {
    fn run(&mut self, statement: &Statement) -> StoreResult<()>;
}

/// Adapter turning any [`StatementRunner`] into a [`GraphTransaction`].
pub struct CypherTransaction<'a, R: StatementRunner> {
    runner: &'a mut R,
}

impl<'a, R: StatementRunner> CypherTransaction<'a, R> {
    pub fn new(runner: &'a mut R) -> Self {
        CypherTransaction { runner }
    }
}

impl<R: StatementRunner> GraphTransaction for CypherTransaction<'_, R> {
    fn delete_all(&mut self) -> StoreResult<()> {
        self.runner.run(&clear_statement())
    }

    fn merge_nodes(&mut self, label: &str, rows: &[NodeRow]) -> StoreResult<()> {
        self.runner.run(&merge_nodes_statement(label, rows))
    }

    fn merge_relationships(&mut self, pattern: &RelPattern, rows: &[RelRow]) -> StoreResult<()> {
        self.runner.run(&merge_relationships_statement(pattern, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn node_row(uid: &str) -> NodeRow {
        let mut properties = Map::new();
        properties.insert("layer".to_string(), json!("0"));
        NodeRow { uid: uid.to_string(), properties }
    }

    #[test]
    fn test_clear_statement_text() {
        assert_eq!(clear_statement().text, "MATCH (n) DETACH DELETE n");
    }

    #[test]
    fn test_merge_nodes_statement_text() {
        let stmt = merge_nodes_statement("Space", &[node_row("space_1")]);
        assert_eq!(
            stmt.text,
            "UNWIND $rows AS row\n\
             MERGE (n:`Space` {uid: row.uid})\n\
             SET n = row.props\n\
             SET n.uid = row.uid"
        );
        assert_eq!(stmt.parameters["rows"][0]["uid"], json!("space_1"));
        assert_eq!(stmt.parameters["rows"][0]["props"]["layer"], json!("0"));
    }

    #[test]
    fn test_merge_relationships_statement_text() {
        let pattern = RelPattern {
            start_label: "Floor".to_string(),
            rel_type: "HAS_SPACE".to_string(),
            end_label: "Space".to_string(),
        };
        let row = RelRow {
            start_uid: "floor_1".to_string(),
            end_uid: "space_1".to_string(),
            properties: Map::new(),
        };
        let stmt = merge_relationships_statement(&pattern, &[row]);
        assert_eq!(
            stmt.text,
            "UNWIND $rows AS row\n\
             MATCH (a:`Floor` {uid: row.start_uid})\n\
             MATCH (b:`Space` {uid: row.end_uid})\n\
             MERGE (a)-[r:`HAS_SPACE`]->(b)\n\
             SET r += row.props"
        );
        assert_eq!(stmt.parameters["rows"][0]["end_uid"], json!("space_1"));
    }

    #[test]
    fn test_adapter_routes_operations() {
        #[derive(Default)]
        struct Recorder {
            statements: Vec<Statement>,
        }
        impl StatementRunner for Recorder {
            fn run(&mut self, statement: &Statement) -> StoreResult<()> {
                self.statements.push(statement.clone());
                Ok(())
            }
        }

        let mut recorder = Recorder::default();
        {
            let mut tx = CypherTransaction::new(&mut recorder);
            tx.delete_all().unwrap();
            tx.merge_nodes("Building", &[node_row("building_1")]).unwrap();
        }
        assert_eq!(recorder.statements.len(), 2);
        assert!(recorder.statements[1].text.contains("MERGE (n:`Building`"));
    }
}
