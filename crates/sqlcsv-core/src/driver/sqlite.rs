use std::{fs, path::Path};

use rusqlite::{
    Connection, OpenFlags, params_from_iter,
    types::{Value as SqliteValue, ValueRef},
};

use crate::SQLiteOptions;

use super::{DatabaseDriver, DatabaseSession, DriverError, Placeholder, QueryReq, QueryResp, Value, bind_named, validate_sql};

#[derive(Debug, Clone, Copy)]
pub struct SQLiteDriver;

struct SQLiteConnection {
    conn: Connection,
}

impl SQLiteConnection {
    fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for SQLiteConnection {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError> {
        let (sql, args) = match req {
            QueryReq::Sql { sql, params } => {
                validate_sql(&sql)?;
                let bound = bind_named(&sql, &params, Placeholder::Question)?;
                (bound.sql, bound.args)
            }
            QueryReq::Raw { sql } => {
                validate_sql(&sql)?;
                (sql, vec![])
            }
        };
        tracing::debug!(sql = %sql);

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| DriverError::Other(format!("准备查询失败: {}", err)))?;
        let columns = stmt.column_names().iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut rows = stmt
            .query(params_from_iter(args.iter().map(to_sqlite)))
            .map_err(|err| DriverError::Other(format!("执行查询失败: {}", err)))?;

        let mut records = vec![];
        while let Some(row) = rows
            .next()
            .map_err(|err| DriverError::Other(format!("读取结果失败: {}", err)))?
        {
            let mut record = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|err| DriverError::Other(format!("读取列 {name} 失败: {}", err)))?;
                record.push(parse_value(value));
            }
            records.push(record);
        }

        Ok(QueryResp {
            cols: columns,
            rows: records,
        })
    }
}

impl DatabaseDriver for SQLiteDriver {
    type Config = SQLiteOptions;

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(config)?;
        Ok(Box::new(SQLiteConnection::new(conn)))
    }
}

fn open_conn(config: &SQLiteOptions) -> Result<Connection, DriverError> {
    let path_str = config.filepath.trim();
    if path_str.is_empty() {
        return Err(DriverError::MissingField("file_path".into()));
    }

    let path = Path::new(path_str);

    if config.readonly {
        if !path.exists() {
            return Err(DriverError::InvalidField("file_path 不存在".into()));
        }
    } else if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| DriverError::Other(format!("创建目录失败: {}", err)))?;
        }
    }

    let flags = if config.readonly {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };

    Connection::open_with_flags(path, flags).map_err(|err| DriverError::Other(format!("打开 SQLite 失败: {}", err)))
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(*b as i64),
        Value::Int(i) => SqliteValue::Integer(*i),
        // SQLite 整数上限为 i64，超出时按文本存储
        Value::UInt(u) => i64::try_from(*u)
            .map(SqliteValue::Integer)
            .unwrap_or_else(|_| SqliteValue::Text(u.to_string())),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
    }
}

fn parse_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::Int(int),
        ValueRef::Real(real) => Value::Float(real),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Bytes(blob.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Params;

    fn session(dir: &tempfile::TempDir) -> Box<dyn DatabaseSession> {
        let path = dir.path().join("data").join("test.db");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER, name TEXT, price REAL, raw BLOB);
             INSERT INTO items VALUES (1, 'apple', 1.5, x'00ff'), (2, 'pear', NULL, NULL);",
        )
        .unwrap();
        drop(conn);

        SQLiteDriver
            .create_connection(&SQLiteOptions {
                readonly: true,
                filepath: path.to_string_lossy().into_owned(),
            })
            .unwrap()
    }

    #[test]
    fn rows_keep_column_order_and_types() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&dir);
        let resp = session
            .query(QueryReq::Raw {
                sql: "SELECT price, id, name, raw FROM items ORDER BY id".into(),
            })
            .unwrap();

        assert_eq!(resp.cols, vec!["price", "id", "name", "raw"]);
        assert_eq!(
            resp.rows[0],
            vec![
                Value::Float(1.5),
                Value::Int(1),
                Value::Text("apple".into()),
                Value::Bytes(vec![0x00, 0xff])
            ]
        );
        assert_eq!(resp.rows[1][0], Value::Null);
    }

    #[test]
    fn named_params_are_bound() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&dir);
        let mut params = Params::new();
        params.insert("min_id".into(), Value::Int(1));

        let resp = session
            .query(QueryReq::Sql {
                sql: "SELECT name FROM items WHERE id > %(min_id)s".into(),
                params,
            })
            .unwrap();
        assert_eq!(resp.rows, vec![vec![Value::Text("pear".into())]]);
    }

    #[test]
    fn readonly_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SQLiteDriver
            .create_connection(&SQLiteOptions {
                readonly: true,
                filepath: dir.path().join("missing.db").to_string_lossy().into_owned(),
            })
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::InvalidField(_)));
    }

    #[test]
    fn scalar_of_empty_table_max_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&dir);
        let value = session.query_scalar("SELECT MAX(id) FROM items WHERE id > 100").unwrap();
        assert_eq!(value, Some(Value::Null));
    }
}
