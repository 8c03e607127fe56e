use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::{Params, Value};

/// 目标表为空时使用的默认水位
pub const DEFAULT_WATERMARK: &str = "1970-01-01 00:00:00+00:00";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("参数 parameters 必须是键值映射")]
    ParametersNotMapping,
    #[error("参数 {0} 的值必须是标量")]
    UnsupportedParameter(String),
    #[error("增量抽取必须配置 {0}")]
    MissingIncrementalField(&'static str),
    #[error("配置字段缺失: {0}")]
    MissingField(&'static str),
    #[error("分隔符必须是单个 ASCII 字符，且不能是引号或换行: {0:?}")]
    InvalidDelimiter(char),
}

fn default_watermark() -> String {
    DEFAULT_WATERMARK.to_string()
}

fn default_delimiter() -> char {
    ','
}

/// 任务配置文件中的原始抽取配置，经 `ExtractionConfig::try_from` 校验后使用
#[derive(Debug, Clone, Deserialize)]
pub struct RawExtractionConfig {
    pub sql: String,
    #[serde(default)]
    pub primary_connection_id: String,
    #[serde(default)]
    pub destination_connection_id: Option<String>,
    pub output_path: PathBuf,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub tracked_table: String,
    #[serde(default)]
    pub tracked_column: String,
    #[serde(default = "default_watermark")]
    pub default_watermark: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

/// 一次抽取的完整配置，构造后只读
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    sql: String,
    primary_connection_id: String,
    destination_connection_id: String,
    output_path: PathBuf,
    parameters: Params,
    headers: Option<Vec<String>>,
    incremental: bool,
    tracked_table: String,
    tracked_column: String,
    default_watermark: String,
    delimiter: u8,
}

impl ExtractionConfig {
    pub fn builder(
        sql: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            raw: RawExtractionConfig {
                sql: sql.into(),
                primary_connection_id: String::new(),
                destination_connection_id: None,
                output_path: output_path.into(),
                parameters: serde_json::Value::Null,
                headers: None,
                incremental: false,
                tracked_table: String::new(),
                tracked_column: String::new(),
                default_watermark: default_watermark(),
                delimiter: default_delimiter(),
            },
            parameters: Params::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn primary_connection_id(&self) -> &str {
        &self.primary_connection_id
    }

    /// 未配置时与主连接相同
    pub fn destination_connection_id(&self) -> &str {
        &self.destination_connection_id
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn parameters(&self) -> &Params {
        &self.parameters
    }

    /// 显式表头；`None` 表示从 SQL 推导
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref().filter(|h| !h.is_empty())
    }

    pub fn incremental(&self) -> bool {
        self.incremental
    }

    pub fn tracked_table(&self) -> &str {
        &self.tracked_table
    }

    pub fn tracked_column(&self) -> &str {
        &self.tracked_column
    }

    pub fn default_watermark(&self) -> &str {
        &self.default_watermark
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sql.trim().is_empty() {
            return Err(ConfigError::MissingField("sql"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("output_path"));
        }
        if self.incremental {
            if self.tracked_column.trim().is_empty() {
                return Err(ConfigError::MissingIncrementalField("tracked_column"));
            }
            if self.tracked_table.trim().is_empty() {
                return Err(ConfigError::MissingIncrementalField("tracked_table"));
            }
        }
        Ok(())
    }
}

impl TryFrom<RawExtractionConfig> for ExtractionConfig {
    type Error = ConfigError;

    fn try_from(raw: RawExtractionConfig) -> Result<Self, Self::Error> {
        let parameters = parse_parameters(raw.parameters)?;
        if !raw.delimiter.is_ascii() || matches!(raw.delimiter, '"' | '\n' | '\r') {
            return Err(ConfigError::InvalidDelimiter(raw.delimiter));
        }

        let destination_connection_id = raw
            .destination_connection_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| raw.primary_connection_id.clone());

        let config = Self {
            sql: raw.sql,
            primary_connection_id: raw.primary_connection_id,
            destination_connection_id,
            output_path: raw.output_path,
            parameters,
            headers: raw.headers,
            incremental: raw.incremental,
            tracked_table: raw.tracked_table,
            tracked_column: raw.tracked_column,
            default_watermark: raw.default_watermark,
            delimiter: raw.delimiter as u8,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_parameters(value: serde_json::Value) -> Result<Params, ConfigError> {
    let map = match value {
        serde_json::Value::Null => return Ok(Params::new()),
        serde_json::Value::Object(map) => map,
        _ => return Err(ConfigError::ParametersNotMapping),
    };

    map.into_iter()
        .map(|(name, value)| {
            let value = match value {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::Bool(b) => Value::Bool(b),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Value::Int(i)
                    } else if let Some(u) = n.as_u64() {
                        Value::UInt(u)
                    } else {
                        Value::Float(n.as_f64().unwrap_or_default())
                    }
                }
                serde_json::Value::String(s) => Value::Text(s),
                _ => return Err(ConfigError::UnsupportedParameter(name)),
            };
            Ok((name, value))
        })
        .collect()
}

/// 代码内构造配置，`build` 时与反序列化路径做同样的校验
#[derive(Debug, Clone)]
pub struct ExtractionConfigBuilder {
    raw: RawExtractionConfig,
    parameters: Params,
}

impl ExtractionConfigBuilder {
    pub fn primary_connection(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.raw.primary_connection_id = id.into();
        self
    }

    pub fn destination_connection(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.raw.destination_connection_id = Some(id.into());
        self
    }

    pub fn parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn headers<I, S>(
        mut self,
        headers: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn incremental(
        mut self,
        tracked_column: impl Into<String>,
        tracked_table: impl Into<String>,
    ) -> Self {
        self.raw.incremental = true;
        self.raw.tracked_column = tracked_column.into();
        self.raw.tracked_table = tracked_table.into();
        self
    }

    pub fn default_watermark(
        mut self,
        value: impl Into<String>,
    ) -> Self {
        self.raw.default_watermark = value.into();
        self
    }

    pub fn delimiter(
        mut self,
        delimiter: char,
    ) -> Self {
        self.raw.delimiter = delimiter;
        self
    }

    pub fn build(self) -> Result<ExtractionConfig, ConfigError> {
        let mut config = ExtractionConfig::try_from(self.raw)?;
        config.parameters.extend(self.parameters);
        Ok(config)
    }
}
