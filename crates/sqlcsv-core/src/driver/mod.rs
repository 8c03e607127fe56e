use std::{borrow::Cow, fmt};

use indexmap::IndexMap;

use crate::DataSourceOptions;

pub use self::bind::{Bound, Placeholder, bind_named};
pub use self::mysql::MySQLDriver;
pub use self::postgres::PostgresDriver;
pub use self::sqlite::SQLiteDriver;

mod bind;
mod mysql;
mod postgres;
mod sqlite;

/// 单个标量值（绑定参数与结果单元格共用）
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// 与调度端约定一致的"假值"：NULL、false、0、空串、空字节
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::UInt(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
        }
    }

    /// 输出到文本文件时的表示；NULL 输出空字段，字节输出十六进制
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Int(i) => Cow::Owned(i.to_string()),
            Value::UInt(u) => Cow::Owned(u.to_string()),
            Value::Float(f) => Cow::Owned(f.to_string()),
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            Value::Bytes(bytes) => Cow::Owned(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.render()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// 一行结果，顺序与 select 列表一致
pub type Record = Vec<Value>;

/// 命名绑定参数
pub type Params = IndexMap<String, Value>;

#[derive(Clone, Debug)]
pub enum QueryReq {
    /// 含 `%(name)s` 占位符的 SQL，按驱动方言绑定参数后执行
    Sql { sql: String, params: Params },
    /// 原样执行，不做占位符处理
    Raw { sql: String },
}

#[derive(Clone, Debug, Default)]
pub struct QueryResp {
    pub cols: Vec<String>,
    pub rows: Vec<Record>,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{0}")]
    Other(String),
    #[error("配置字段缺失: {0}")]
    MissingField(String),
    #[error("配置字段非法: {0}")]
    InvalidField(String),
    #[error("缺少绑定参数: {0}")]
    MissingParam(String),
    #[error("数据源不存在: {0}")]
    UnknownSource(String),
}

pub trait DatabaseDriver {
    type Config;

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError>;
}

pub trait DatabaseSession: Send {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError>;

    /// 取第一行第一列；无结果行时返回 `None`
    fn query_scalar(
        &mut self,
        sql: &str,
    ) -> Result<Option<Value>, DriverError> {
        let resp = self.query(QueryReq::Raw { sql: sql.to_string() })?;
        Ok(resp.rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }
}

pub fn create_connection(opts: &DataSourceOptions) -> Result<Box<dyn DatabaseSession>, DriverError> {
    match opts {
        DataSourceOptions::MySQL(config) => MySQLDriver.create_connection(config),
        DataSourceOptions::SQLite(config) => SQLiteDriver.create_connection(config),
        DataSourceOptions::Postgres(config) => PostgresDriver.create_connection(config),
    }
}

pub fn validate_sql(sql: &str) -> Result<(), DriverError> {
    if sql.trim().is_empty() {
        return Err(DriverError::InvalidField("sql".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneRow(Vec<Record>);

    impl DatabaseSession for OneRow {
        fn query(
            &mut self,
            _req: QueryReq,
        ) -> Result<QueryResp, DriverError> {
            Ok(QueryResp {
                cols: vec!["max".into()],
                rows: self.0.clone(),
            })
        }
    }

    #[test]
    fn falsy_values_follow_truthiness() {
        assert!(Value::Null.is_falsy());
        assert!(Value::Text(String::new()).is_falsy());
        assert!(Value::Int(0).is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(!Value::Text("2024-01-01".into()).is_falsy());
        assert!(!Value::Int(42).is_falsy());
    }

    #[test]
    fn render_matches_file_output() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::Float(1.5).render(), "1.5");
        assert_eq!(Value::Bytes(vec![0x0a, 0xff]).render(), "0aff");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn query_scalar_takes_first_cell() {
        let mut session = OneRow(vec![vec![Value::Int(7), Value::Int(8)]]);
        assert_eq!(session.query_scalar("SELECT 1").unwrap(), Some(Value::Int(7)));

        let mut empty = OneRow(vec![]);
        assert_eq!(empty.query_scalar("SELECT 1").unwrap(), None);
    }

    #[test]
    fn validate_sql_rejects_blank() {
        assert!(validate_sql("  \n").is_err());
        assert!(validate_sql("SELECT 1").is_ok());
    }
}
