use chrono::{DateTime, Utc};
use postgres::{Client, Config, Error as PostgresError, NoTls, SimpleQueryMessage, types::Type};

use crate::PostgresOptions;

use super::{DatabaseDriver, DatabaseSession, DriverError, Placeholder, QueryReq, QueryResp, Value, bind_named, validate_sql};

#[derive(Debug, Clone, Copy)]
pub struct PostgresDriver;

impl DatabaseDriver for PostgresDriver {
    type Config = PostgresOptions;

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let client = open_conn(config)?;
        Ok(Box::new(PostgresSession::new(client)))
    }
}

struct PostgresSession {
    client: Client,
}

impl PostgresSession {
    fn new(client: Client) -> Self {
        Self { client }
    }
}

impl DatabaseSession for PostgresSession {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError> {
        // 参数以字面量内联，由服务端按上下文推断类型（与文本比较的时间戳列可直接使用）
        let sql = match req {
            QueryReq::Sql { sql, params } => {
                validate_sql(&sql)?;
                bind_named(&sql, &params, Placeholder::Inline)?.sql
            }
            QueryReq::Raw { sql } => {
                validate_sql(&sql)?;
                sql
            }
        };
        tracing::debug!(sql = %sql);

        // 先 prepare 取列名与类型，再以文本协议执行，任意列类型都能按文本读出
        let stmt = self
            .client
            .prepare(&sql)
            .map_err(|err| DriverError::Other(format!("准备查询失败: {}", err)))?;
        let columns: Vec<String> = stmt.columns().iter().map(|col| col.name().to_string()).collect();
        let types: Vec<Type> = stmt.columns().iter().map(|col| col.type_().clone()).collect();

        let messages = self
            .client
            .simple_query(&sql)
            .map_err(|err| DriverError::Other(format!("执行查询失败: {}", err)))?;

        let mut records = vec![];
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut record = Vec::with_capacity(row.len());
                for idx in 0..row.len() {
                    let text = row.try_get(idx).map_err(map_pg_err)?;
                    record.push(match types.get(idx) {
                        Some(ty) => parse_value(ty, text),
                        None => text.map(|t| Value::Text(t.to_string())).unwrap_or(Value::Null),
                    });
                }
                records.push(record);
            }
        }

        Ok(QueryResp {
            cols: columns,
            rows: records,
        })
    }
}

fn open_conn(config: &PostgresOptions) -> Result<Client, DriverError> {
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
    if config.use_tls {
        return Err(DriverError::Other("PostgreSQL 暂未支持 TLS 连接".into()));
    }

    let mut pg_config = Config::new();
    pg_config.host(config.host.trim());
    pg_config.port(config.port.parse().unwrap_or(5432));
    pg_config.user(config.username.trim());
    pg_config.password(config.password.as_str());
    pg_config.dbname(config.database.trim());

    let client = pg_config
        .connect(NoTls)
        .map_err(|err| DriverError::Other(format!("连接失败: {}", err)))?;
    Ok(client)
}

/// 文本协议下的单元格转换，未识别或解析失败的类型保留原文本（numeric、uuid、json 等）
fn parse_value(
    ty: &Type,
    text: Option<&str>,
) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };

    let parsed = match *ty {
        Type::BOOL => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        Type::INT2 | Type::INT4 | Type::INT8 => text.parse().ok().map(Value::Int),
        Type::OID => text.parse().ok().map(Value::UInt),
        Type::FLOAT4 | Type::FLOAT8 => text.parse().ok().map(Value::Float),
        Type::BYTEA => decode_bytea(text).map(Value::Bytes),
        Type::TIMESTAMPTZ => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|v| Value::Text(format_timestamptz(&v.with_timezone(&Utc)))),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}

/// bytea 的 hex 输出格式：`\x0aff`
fn decode_bytea(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// 带时区时间统一输出为 UTC，例如 `2024-05-01 08:30:00.250+00:00`
fn format_timestamptz(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()
}

fn map_pg_err(err: PostgresError) -> DriverError {
    DriverError::Other(format!("PostgreSQL 解析字段失败: {}", err))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamptz_keeps_offset_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(format_timestamptz(&ts), "2024-05-01 08:30:00+00:00");
    }

    #[test]
    fn text_cells_follow_column_type() {
        assert_eq!(parse_value(&Type::NUMERIC, Some("12.50")), Value::Text("12.50".into()));
        assert_eq!(
            parse_value(&Type::UUID, Some("0e5d8a0c-3f6a-4b1e-9a57-6c1d2e3f4a5b")),
            Value::Text("0e5d8a0c-3f6a-4b1e-9a57-6c1d2e3f4a5b".into())
        );
        assert_eq!(parse_value(&Type::JSONB, Some("{\"a\": 1}")), Value::Text("{\"a\": 1}".into()));
        assert_eq!(parse_value(&Type::INT4, Some("42")), Value::Int(42));
        assert_eq!(parse_value(&Type::BOOL, Some("t")), Value::Bool(true));
        assert_eq!(parse_value(&Type::FLOAT8, Some("2.5")), Value::Float(2.5));
        assert_eq!(parse_value(&Type::BYTEA, Some("\\x0aff")), Value::Bytes(vec![0x0a, 0xff]));
        assert_eq!(parse_value(&Type::NUMERIC, None), Value::Null);
    }

    #[test]
    fn timestamptz_text_is_normalized_to_utc() {
        assert_eq!(
            parse_value(&Type::TIMESTAMPTZ, Some("2024-01-01 08:00:00.123456+00")),
            Value::Text("2024-01-01 08:00:00.123456+00:00".into())
        );
        assert_eq!(
            parse_value(&Type::TIMESTAMPTZ, Some("2024-01-01 13:30:00+05:30")),
            Value::Text("2024-01-01 08:00:00+00:00".into())
        );
        assert_eq!(
            parse_value(&Type::TIMESTAMP, Some("2024-01-01 08:00:00")),
            Value::Text("2024-01-01 08:00:00".into())
        );
    }

    #[test]
    fn tls_is_rejected_before_connecting() {
        let opts = PostgresOptions {
            database: "warehouse".into(),
            password: "secret".into(),
            use_tls: true,
            ..Default::default()
        };
        let err = PostgresDriver.create_connection(&opts).err().unwrap();
        assert!(err.to_string().contains("TLS"));
    }

    #[test]
    fn missing_database_is_reported() {
        let opts = PostgresOptions {
            password: "secret".into(),
            ..Default::default()
        };
        let err = PostgresDriver.create_connection(&opts).err().unwrap();
        assert!(matches!(err, DriverError::MissingField(ref f) if f == "database"));
    }
}
