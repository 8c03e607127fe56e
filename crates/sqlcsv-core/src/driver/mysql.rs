use mysql::{Conn, Opts, OptsBuilder, SslOpts, Value as MySqlValue, prelude::Queryable};

use crate::MySQLOptions;

use super::{DatabaseDriver, DatabaseSession, DriverError, Placeholder, QueryReq, QueryResp, Value, bind_named, validate_sql};

#[derive(Debug, Clone, Copy)]
pub struct MySQLDriver;

impl DatabaseDriver for MySQLDriver {
    type Config = MySQLOptions;

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(config)?;
        Ok(Box::new(MySQLSession::new(conn)))
    }
}

struct MySQLSession {
    conn: Conn,
}

impl MySQLSession {
    fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for MySQLSession {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError> {
        let (sql, params) = match req {
            QueryReq::Sql { sql, params } => {
                validate_sql(&sql)?;
                let bound = bind_named(&sql, &params, Placeholder::EscapedQuestion)?;
                let params: Vec<MySqlValue> = bound.args.iter().map(to_mysql).collect();
                (bound.sql, params)
            }
            QueryReq::Raw { sql } => {
                validate_sql(&sql)?;
                (sql, vec![])
            }
        };
        tracing::debug!(sql = %sql);

        let iter = self
            .conn
            .exec_iter(&sql, params)
            .map_err(|err| DriverError::Other(format!("执行查询失败: {}", err)))?;

        let rows: Vec<mysql::Row> = iter
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DriverError::Other(format!("读取结果失败: {}", err)))?;

        if rows.is_empty() {
            return Ok(QueryResp::default());
        }

        let columns: Vec<String> = rows[0]
            .columns_ref()
            .iter()
            .map(|col| col.name_str().to_string())
            .collect();

        let records = rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(parse_value).collect())
            .collect();

        Ok(QueryResp {
            cols: columns,
            rows: records,
        })
    }
}

fn open_conn(config: &MySQLOptions) -> Result<Conn, DriverError> {
    if config.host.trim().is_empty() {
        return Err(DriverError::MissingField("host".into()));
    }
    if config.username.trim().is_empty() {
        return Err(DriverError::MissingField("username".into()));
    }
    if config.password.trim().is_empty() {
        return Err(DriverError::MissingField("password".into()));
    }
    if config.database.trim().is_empty() {
        return Err(DriverError::MissingField("database".into()));
    }

    let mut builder = OptsBuilder::new();
    builder = builder.ip_or_hostname(Some(config.host.clone()));
    builder = builder.tcp_port(config.port.parse().unwrap_or(3306));
    builder = builder.user(Some(config.username.clone()));
    builder = builder.pass(Some(config.password.clone()));
    builder = builder.db_name(Some(config.database.clone()));

    if config.use_tls {
        builder = builder.ssl_opts(Some(SslOpts::default()));
    }
    let opts = Opts::from(builder);
    Conn::new(opts).map_err(|err| DriverError::Other(format!("连接失败: {}", err)))
}

fn to_mysql(value: &Value) -> MySqlValue {
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(b) => MySqlValue::Int(*b as i64),
        Value::Int(i) => MySqlValue::Int(*i),
        Value::UInt(u) => MySqlValue::UInt(*u),
        Value::Float(f) => MySqlValue::Double(*f),
        Value::Text(s) => MySqlValue::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => MySqlValue::Bytes(b.clone()),
    }
}

fn parse_value(value: MySqlValue) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(err) => Value::Bytes(err.into_bytes()),
        },
        MySqlValue::Int(int) => Value::Int(int),
        MySqlValue::UInt(uint) => Value::UInt(uint),
        MySqlValue::Float(float) => Value::Float(float as f64),
        MySqlValue::Double(double) => Value::Float(double),
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => Value::Text(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        )),
        MySqlValue::Time(neg, days, hours, minutes, seconds, micros) => {
            let sign = if neg { "-" } else { "" };
            Value::Text(format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}.{micros:06}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_bytes_decode_as_text() {
        assert_eq!(parse_value(MySqlValue::Bytes(b"abc".to_vec())), Value::Text("abc".into()));
        assert_eq!(parse_value(MySqlValue::Bytes(vec![0xff, 0xfe])), Value::Bytes(vec![0xff, 0xfe]));
    }

    #[test]
    fn temporal_values_render_as_text() {
        assert_eq!(
            parse_value(MySqlValue::Date(2024, 3, 9, 7, 5, 1, 250)),
            Value::Text("2024-03-09 07:05:01.000250".into())
        );
        assert_eq!(
            parse_value(MySqlValue::Time(true, 1, 2, 3, 4, 0)),
            Value::Text("-1 02:03:04.000000".into())
        );
    }

    #[test]
    fn bind_values_map_to_wire_types() {
        assert_eq!(to_mysql(&Value::Bool(true)), MySqlValue::Int(1));
        assert_eq!(to_mysql(&Value::from("x")), MySqlValue::Bytes(b"x".to_vec()));
        assert_eq!(to_mysql(&Value::Null), MySqlValue::NULL);
    }

    #[test]
    fn missing_credentials_fail_before_connecting() {
        let err = MySQLDriver
            .create_connection(&MySQLOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::MissingField(ref f) if f == "password"));
    }
}
