use std::{
    fmt,
    path::PathBuf,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    ConfigError, DatabaseSession, DriverError, ExportError, ExportWriter, ExtractionConfig, QueryReq, Value,
    headers_from_sql, resolve_watermark,
};

/// 增量水位绑定到主查询时使用的参数名，主查询需写作 `%(last_updated_value)s`
pub const LAST_UPDATED_PARAM: &str = "last_updated_value";

/// 按连接 ID 打开会话
pub trait Connector {
    fn connect(
        &mut self,
        connection_id: &str,
    ) -> Result<Box<dyn DatabaseSession>, DriverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractState {
    Init,
    ResolvingWatermark,
    Querying,
    DerivingHeaders,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for ExtractState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let label = match self {
            ExtractState::Init => "init",
            ExtractState::ResolvingWatermark => "resolving_watermark",
            ExtractState::Querying => "querying",
            ExtractState::DerivingHeaders => "deriving_headers",
            ExtractState::Writing => "writing",
            ExtractState::Done => "done",
            ExtractState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    #[error("查询失败: {0}")]
    Query(#[from] DriverError),
    #[error("无法从 SQL 推导表头，请显式配置 headers")]
    NoHeaders,
    #[error("导出失败: {0}")]
    Export(#[from] ExportError),
}

/// 一次抽取的结果
#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub headers: Vec<String>,
    pub rows: u64,
    /// 增量模式下绑定的水位
    pub watermark: Option<Value>,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

struct Extraction<'a> {
    config: &'a ExtractionConfig,
    state: ExtractState,
}

impl Extraction<'_> {
    fn enter(
        &mut self,
        next: ExtractState,
    ) {
        tracing::debug!("抽取状态: {} -> {}", self.state, next);
        self.state = next;
    }

    fn execute(
        &mut self,
        connector: &mut dyn Connector,
    ) -> Result<ExtractReport, ExtractError> {
        let config = self.config;
        let start = Instant::now();

        config.validate()?;

        // 水位只写入本次执行的参数副本
        let mut params = config.parameters().clone();
        let mut watermark = None;

        if config.incremental() {
            self.enter(ExtractState::ResolvingWatermark);
            let mut destination = connector.connect(config.destination_connection_id())?;
            let value = resolve_watermark(
                destination.as_mut(),
                config.tracked_column(),
                config.tracked_table(),
                config.default_watermark(),
            )?;
            drop(destination);

            params.insert(LAST_UPDATED_PARAM.to_string(), value.clone());
            watermark = Some(value);
        }

        self.enter(ExtractState::Querying);
        let mut session = connector.connect(config.primary_connection_id())?;
        let resp = session.query(QueryReq::Sql {
            sql: config.sql().to_string(),
            params,
        })?;
        drop(session);

        if resp.rows.is_empty() {
            tracing::info!("主查询未返回数据");
        } else {
            tracing::info!("主查询返回 {} 行", resp.rows.len());
        }

        let headers = match config.headers() {
            Some(headers) => headers.to_vec(),
            None => {
                self.enter(ExtractState::DerivingHeaders);
                let derived = headers_from_sql(config.sql());
                if derived.is_empty() {
                    return Err(ExtractError::NoHeaders);
                }
                tracing::info!("推导表头: {:?}", derived);
                derived
            }
        };

        self.enter(ExtractState::Writing);
        let rows = ExportWriter::with_delimiter(config.delimiter()).write(config.output_path(), &headers, &resp.rows)?;

        Ok(ExtractReport {
            headers,
            rows,
            watermark,
            output_path: config.output_path().to_path_buf(),
            elapsed: start.elapsed(),
        })
    }
}

/// 执行一次抽取：（可选）解析水位 -> 主查询 -> 确定表头 -> 写出文件
pub fn run(
    config: &ExtractionConfig,
    connector: &mut dyn Connector,
) -> Result<ExtractReport, ExtractError> {
    let mut extraction = Extraction {
        config,
        state: ExtractState::Init,
    };

    match extraction.execute(connector) {
        Ok(report) => {
            extraction.enter(ExtractState::Done);
            Ok(report)
        }
        Err(err) => {
            tracing::error!("抽取在 {} 阶段失败: {}", extraction.state, err);
            extraction.enter(ExtractState::Failed);
            Err(err)
        }
    }
}
