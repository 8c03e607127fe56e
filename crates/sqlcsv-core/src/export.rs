use std::{fs, io, path::Path};

use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

use crate::Record;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("写入文件失败: {0}")]
    Io(#[from] io::Error),
    #[error("写入分隔文件失败: {0}")]
    Csv(#[from] csv::Error),
}

/// 分隔文本写出器：首行表头，之后每条记录一行
#[derive(Debug, Clone, Copy)]
pub struct ExportWriter {
    delimiter: u8,
}

impl Default for ExportWriter {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl ExportWriter {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// 覆盖写入 `path`，返回写出的数据行数（不含表头）
    ///
    /// 记录的列数不必与表头一致，按原样写出。
    pub fn write(
        &self,
        path: &Path,
        headers: &[String],
        rows: &[Record],
    ) -> Result<u64, ExportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .flexible(true)
            .from_path(path)?;

        writer.write_record(headers)?;

        if rows.is_empty() {
            tracing::info!("查询结果为空，仅写入表头");
        }

        let mut written = 0u64;
        for row in rows {
            writer.write_record(row.iter().map(|value| value.render().into_owned()))?;
            written += 1;
        }
        writer.flush()?;

        tracing::info!("导出完成: {} 行 -> {}", written, path.display());
        Ok(written)
    }
}

/// 以默认逗号分隔写出
pub fn write_records(
    path: &Path,
    headers: &[String],
    rows: &[Record],
) -> Result<u64, ExportError> {
    ExportWriter::default().write(path, headers, rows)
}
