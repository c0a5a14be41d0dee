use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Map, Value};
use sheetwire_core::{CallData, Engine, EngineError};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::naming::{
    check_db_name, generate_column_name, generate_table_id, quote_ident, raw_table_name,
    table_id_from_raw,
};
use crate::value::{from_sql, to_sql};

/// SQLite engine serving many databases, routed by `dbName`
///
/// Connections are opened on first use, either in memory or as
/// `<root>/<dbName>.db`.
pub struct Databank {
    root: Option<PathBuf>,
    connections: HashMap<String, Connection>,
}

impl Databank {
    /// Keep every database in memory
    pub fn in_memory() -> Self {
        Self {
            root: None,
            connections: HashMap::new(),
        }
    }

    /// Store databases as files under `root`, creating it if needed
    pub fn open_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Databank opened");
        Ok(Self {
            root: Some(root),
            connections: HashMap::new(),
        })
    }

    /// Names of the databases opened so far
    pub fn databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn connection(&mut self, db_name: &str) -> Result<&mut Connection> {
        let db_name = check_db_name(db_name)?;
        if !self.connections.contains_key(db_name) {
            let conn = match &self.root {
                Some(root) => {
                    let conn = Connection::open(root.join(format!("{}.db", db_name)))?;
                    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
                    conn
                }
                None => {
                    let conn = Connection::open_in_memory()?;
                    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                    conn
                }
            };
            debug!(db_name, "Opened database");
            self.connections.insert(db_name.to_string(), conn);
        }
        self.connections
            .get_mut(db_name)
            .ok_or_else(|| Error::InvalidIdentifier(db_name.to_string()))
    }

    /// Run one statement; rows come back as objects, writes as `{ "changes": n }`
    pub fn sql(&mut self, db_name: &str, query: &str, bindings: &[Value]) -> Result<Value> {
        let conn = self.connection(db_name)?;
        run_statement(conn, query, bindings)
    }

    /// Run a script of statements, discarding any rows
    pub fn exec(&mut self, db_name: &str, script: &str) -> Result<()> {
        self.connection(db_name)?.execute_batch(script)?;
        Ok(())
    }

    /// Ids of all user tables
    pub fn list_tables(&mut self, db_name: &str) -> Result<Vec<String>> {
        let conn = self.connection(db_name)?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name LIKE 'tb\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names
            .iter()
            .map(|raw| table_id_from_raw(raw).to_string())
            .collect())
    }

    /// Create `tb_<table_id>` with an `_id` key and the given columns
    pub fn create_table(
        &mut self,
        db_name: &str,
        table_id: &str,
        columns: &[String],
    ) -> Result<()> {
        let mut defs = vec!["_id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for column in columns {
            defs.push(quote_ident(column)?);
        }
        let sql = format!(
            "CREATE TABLE {} ({})",
            quote_ident(&raw_table_name(table_id))?,
            defs.join(", ")
        );
        self.exec(db_name, &sql)
    }

    /// Add a column with a generated name and return that name
    pub fn add_column(&mut self, db_name: &str, table_id: &str) -> Result<String> {
        let column = generate_column_name();
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(&raw_table_name(table_id))?,
            quote_ident(&column)?
        );
        self.exec(db_name, &sql)?;
        Ok(column)
    }

    pub fn delete_table(&mut self, db_name: &str, table_id: &str) -> Result<()> {
        let sql = format!("DROP TABLE {}", quote_ident(&raw_table_name(table_id))?);
        self.exec(db_name, &sql)
    }

    /// Insert one row and return its `_id`
    pub fn insert_row(
        &mut self,
        db_name: &str,
        table_id: &str,
        row: &Map<String, Value>,
    ) -> Result<i64> {
        let table = quote_ident(&raw_table_name(table_id))?;
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let columns = row
                .keys()
                .map(|k| quote_ident(k))
                .collect::<Result<Vec<_>>>()?;
            let placeholders = (1..=row.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        let conn = self.connection(db_name)?;
        conn.execute(&sql, params_from_iter(row.values().map(to_sql)))?;
        Ok(conn.last_insert_rowid())
    }

    /// All rows of a table ordered by `_id`
    pub fn query_table(&mut self, db_name: &str, table_id: &str) -> Result<Value> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY _id",
            quote_ident(&raw_table_name(table_id))?
        );
        self.sql(db_name, &sql, &[])
    }

    fn dispatch(&mut self, data: &CallData) -> Result<Value> {
        let method = data.method.as_str();
        let db = data.db_name.as_str();
        match method {
            "sql" => {
                let query = str_param(data, &data.params, 0)?;
                let bindings = match data.params.get(1) {
                    None | Some(Value::Null) => &[][..],
                    Some(Value::Array(items)) => items.as_slice(),
                    Some(_) => return Err(Error::bad_params(method, "bindings must be an array")),
                };
                self.sql(db, query, bindings)
            }
            "exec" => {
                let script = str_param(data, &data.params, 0)?;
                self.exec(db, script)?;
                Ok(Value::Null)
            }
            "listTables" => Ok(json!(self.list_tables(db)?)),
            "createTable" => {
                // Missing table id means "make one up"
                let (table_id, rest) = match table_target(data) {
                    Ok((id, rest)) => (id.to_string(), rest),
                    Err(_) => (generate_table_id(), &data.params[..]),
                };
                let columns = match rest.first() {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                Error::bad_params(method, "column names must be strings")
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                    Some(_) => return Err(Error::bad_params(method, "columns must be an array")),
                };
                self.create_table(db, &table_id, &columns)?;
                Ok(json!({ "tableId": table_id }))
            }
            "addColumn" => {
                let (table_id, _) = table_target(data)?;
                Ok(json!(self.add_column(db, table_id)?))
            }
            "deleteTable" => {
                let (table_id, _) = table_target(data)?;
                self.delete_table(db, table_id)?;
                Ok(Value::Null)
            }
            "insertRow" => {
                let (table_id, rest) = table_target(data)?;
                let row = match rest.first() {
                    Some(Value::Object(row)) => row,
                    _ => return Err(Error::bad_params(method, "expected a row object")),
                };
                let id = self.insert_row(db, table_id, row)?;
                Ok(json!({ "_id": id }))
            }
            "queryTable" => {
                let (table_id, _) = table_target(data)?;
                self.query_table(db, table_id)
            }
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

impl Engine for Databank {
    fn call(&mut self, data: &CallData) -> std::result::Result<Value, EngineError> {
        self.dispatch(data).map_err(|err| {
            debug!(
                method = %data.method,
                db_name = %data.db_name,
                error = %err,
                "Engine call failed"
            );
            EngineError::from(err)
        })
    }
}

fn run_statement(conn: &Connection, query: &str, bindings: &[Value]) -> Result<Value> {
    let mut stmt = conn.prepare(query)?;
    let params = params_from_iter(bindings.iter().map(to_sql));

    if stmt.column_count() == 0 {
        let changes = stmt.execute(params)?;
        return Ok(json!({ "changes": changes }));
    }

    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            object.insert(name.clone(), from_sql(row.get_ref(i)?));
        }
        out.push(Value::Object(object));
    }
    Ok(Value::Array(out))
}

fn str_param<'a>(data: &CallData, params: &'a [Value], index: usize) -> Result<&'a str> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::bad_params(&data.method, format!("param {} must be a string", index)))
}

/// Table for table-scoped methods: the envelope's `tableId`, or else the
/// first param, in which case the remaining params shift left.
fn table_target(data: &CallData) -> Result<(&str, &[Value])> {
    match &data.table_id {
        Some(table_id) => Ok((table_id.as_str(), &data.params[..])),
        None => {
            let table_id = str_param(data, &data.params, 0)?;
            Ok((table_id, &data.params[1..]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(
        bank: &mut Databank,
        method: &str,
        params: Vec<Value>,
    ) -> std::result::Result<Value, EngineError> {
        bank.call(&CallData {
            method: method.to_string(),
            params,
            db_name: "space1".to_string(),
            table_id: None,
            user_id: None,
        })
    }

    #[test]
    fn sql_returns_rows_as_objects() {
        let mut bank = Databank::in_memory();
        let rows = bank.sql("db", "SELECT 1 AS one, 'x' AS two", &[]).unwrap();
        assert_eq!(rows, json!([{"one": 1, "two": "x"}]));
    }

    #[test]
    fn writes_report_changes() {
        let mut bank = Databank::in_memory();
        bank.exec("db", "CREATE TABLE t (a)").unwrap();
        let out = bank
            .sql("db", "INSERT INTO t (a) VALUES (?1), (?2)", &[json!(1), json!("b")])
            .unwrap();
        assert_eq!(out, json!({"changes": 2}));
    }

    #[test]
    fn databases_are_isolated_by_name() {
        let mut bank = Databank::in_memory();
        bank.create_table("a", "t1", &[]).unwrap();
        assert_eq!(bank.list_tables("a").unwrap(), vec!["t1"]);
        assert!(bank.list_tables("b").unwrap().is_empty());
        assert_eq!(bank.databases(), vec!["a", "b"]);
    }

    #[test]
    fn table_lifecycle_through_engine_calls() {
        let mut bank = Databank::in_memory();
        let created = call(&mut bank, "createTable", vec![json!("t1"), json!(["title"])]).unwrap();
        assert_eq!(created, json!({"tableId": "t1"}));

        let row = json!({"title": "hello"});
        let inserted = call(&mut bank, "insertRow", vec![json!("t1"), row]).unwrap();
        assert_eq!(inserted, json!({"_id": 1}));

        let column = call(&mut bank, "addColumn", vec![json!("t1")]).unwrap();
        assert!(column.as_str().unwrap().starts_with("cl_"));

        let rows = call(&mut bank, "queryTable", vec![json!("t1")]).unwrap();
        assert_eq!(rows[0]["title"], json!("hello"));
        assert_eq!(rows[0]["_id"], json!(1));

        assert_eq!(call(&mut bank, "listTables", vec![]).unwrap(), json!(["t1"]));
        call(&mut bank, "deleteTable", vec![json!("t1")]).unwrap();
        assert_eq!(call(&mut bank, "listTables", vec![]).unwrap(), json!([]));
    }

    #[test]
    fn create_table_without_id_generates_one() {
        let mut bank = Databank::in_memory();
        let created = call(&mut bank, "createTable", vec![]).unwrap();
        let id = created["tableId"].as_str().unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(bank.list_tables("space1").unwrap(), vec![id.to_string()]);
    }

    #[test]
    fn table_id_from_context_wins() {
        let mut bank = Databank::in_memory();
        bank.create_table("space1", "ctx", &["n".to_string()]).unwrap();
        let out = bank
            .call(&CallData {
                method: "insertRow".to_string(),
                params: vec![json!({"n": 5})],
                db_name: "space1".to_string(),
                table_id: Some("ctx".to_string()),
                user_id: None,
            })
            .unwrap();
        assert_eq!(out, json!({"_id": 1}));
    }

    #[test]
    fn errors_become_engine_errors() {
        let mut bank = Databank::in_memory();
        let err = call(&mut bank, "sql", vec![json!("SELEC nonsense")]).unwrap_err();
        assert!(err.message.starts_with("SQLite error"));

        let err = call(&mut bank, "teleport", vec![]).unwrap_err();
        assert_eq!(err.message, "Unknown method: teleport");

        let err = call(&mut bank, "sql", vec![json!(1)]).unwrap_err();
        assert!(err.message.contains("Invalid params for sql"));
    }

    #[test]
    fn bad_database_name_is_refused() {
        let mut bank = Databank::in_memory();
        assert!(matches!(
            bank.sql("../x", "SELECT 1", &[]),
            Err(Error::InvalidIdentifier(_))
        ));
    }
}
