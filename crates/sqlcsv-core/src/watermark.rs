use crate::{DatabaseSession, DriverError, Value};

/// 查询目标表跟踪列的当前最大值作为增量水位
///
/// 表为空或最大值为假值（NULL、空串、0 等）时返回 `default`。
/// 列名和表名原样拼入 SQL，由配置方负责其可信。
pub fn resolve_watermark(
    session: &mut dyn DatabaseSession,
    column: &str,
    table: &str,
    default: &str,
) -> Result<Value, DriverError> {
    let sql = format!("SELECT MAX({}) FROM {}", column, table);
    let found = session.query_scalar(&sql)?;

    match found {
        Some(value) if !value.is_falsy() => {
            tracing::info!("目标表 {}.{} 当前水位: {}", table, column, value);
            Ok(value)
        }
        _ => {
            tracing::info!("目标表 {} 无数据，使用默认水位: {}", table, default);
            Ok(Value::Text(default.to_string()))
        }
    }
}
