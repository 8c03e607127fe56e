//! `%(name)s` 命名占位符绑定。
//!
//! 调用方 SQL 统一使用 `%(name)s` 写法，按驱动方言改写：
//! - `Question`：改写为 `?`，按出现顺序输出参数（SQLite）
//! - `EscapedQuestion`：同 `Question`，字符串内 `\` 为转义符（MySQL）
//! - `Inline`：直接内联为 SQL 字面量，不输出参数（PostgreSQL，字面量类型由服务端推断）
//!
//! 字符串、引号标识符与注释内的内容保持原样；`%%` 输出为 `%`。
//! PostgreSQL 的 `E'...'` 字符串同样按 `\` 转义处理。

use std::collections::HashMap;

use super::{DriverError, Params, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Question,
    EscapedQuestion,
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub sql: String,
    pub args: Vec<Value>,
}

pub fn bind_named(
    sql: &str,
    params: &Params,
    style: Placeholder,
) -> Result<Bound, DriverError> {
    let mut out = String::with_capacity(sql.len());
    let mut args = vec![];
    // 同名参数只渲染一次字面量
    let mut literals: HashMap<&str, String> = HashMap::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                let escapes = match style {
                    Placeholder::Question => false,
                    Placeholder::EscapedQuestion => ch != '`',
                    Placeholder::Inline => ch == '\'' && matches!(out.chars().next_back(), Some('E' | 'e')),
                };
                out.push(ch);
                let mut escaped = false;
                for (_, c) in chars.by_ref() {
                    out.push(c);
                    if escaped {
                        escaped = false;
                    } else if escapes && c == '\\' {
                        escaped = true;
                    } else if c == ch {
                        break;
                    }
                }
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(ch);
                for (_, c) in chars.by_ref() {
                    out.push(c);
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                out.push_str("/*");
                let mut prev = '\0';
                for (_, c) in chars.by_ref() {
                    out.push(c);
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '%' => match chars.peek() {
                Some((_, '%')) => {
                    chars.next();
                    out.push('%');
                }
                Some((_, '(')) => {
                    chars.next();
                    let start = idx + 2;
                    let mut end = None;
                    for (pos, c) in chars.by_ref() {
                        if c == ')' {
                            end = Some(pos);
                            break;
                        }
                    }
                    let end = end.ok_or_else(|| DriverError::InvalidField(format!("占位符未闭合: {}", &sql[idx..])))?;
                    match chars.next() {
                        Some((_, 's')) => {}
                        _ => {
                            return Err(DriverError::InvalidField(format!(
                                "占位符格式错误: {}",
                                &sql[idx..=end]
                            )));
                        }
                    }

                    let name = &sql[start..end];
                    let value = params
                        .get(name)
                        .ok_or_else(|| DriverError::MissingParam(name.to_string()))?;
                    match style {
                        Placeholder::Question | Placeholder::EscapedQuestion => {
                            out.push('?');
                            args.push(value.clone());
                        }
                        Placeholder::Inline => {
                            let rendered = literals.entry(name).or_insert_with(|| literal(value));
                            out.push_str(rendered);
                        }
                    }
                }
                _ => out.push('%'),
            },
            _ => out.push(ch),
        }
    }

    Ok(Bound { sql: out, args })
}

/// 渲染为 PostgreSQL 字面量
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::Bool(b) => (if *b { "true" } else { "false" }).to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(f) if f.is_nan() => "'NaN'::float8".into(),
        Value::Float(f) if *f > 0.0 => "'Infinity'::float8".into(),
        Value::Float(_) => "'-Infinity'::float8".into(),
        Value::Text(s) if s.contains('\\') => format!("E'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("'\\x{}'::bytea", hex)
        }
    }
}
