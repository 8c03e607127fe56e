use std::env;
use std::error::Error;
use std::fs;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::process::exit;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing_appender::{non_blocking, rolling::never};
use tracing_subscriber::{EnvFilter, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt};

use sqlcsv_core::{AppCache, ExtractReport, ExtractionConfig, RawExtractionConfig, run};

/// 任务配置（task_dir/config.json）
#[derive(Debug, Deserialize)]
pub struct TaskConfig {
    pub task_id: String,
    #[serde(default)]
    pub created_at: String,
    pub extract: RawExtractionConfig,
}

/// 进度输出消息（写入 stdout 的 JSON Lines）
#[derive(Debug, Serialize)]
pub struct ProgressMessage {
    kind: MessageKind,
    data: serde_json::Value,
}

/// 消息类型
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Status,
    Error,
    Completed,
}

/// 初始化任务日志系统
fn init_task_logging(task_dir: &Path) -> non_blocking::WorkerGuard {
    let log_file = never(task_dir, "task.log");
    let (non_blocking, guard) = non_blocking(log_file);

    tracing_subscriber::registry()
        .with(EnvFilter::new("info"))
        .with(layer().with_writer(stdout))
        .with(layer().with_writer(non_blocking).with_ansi(false))
        .init();

    guard
}

fn parse_task_dir(args: &[String]) -> Option<PathBuf> {
    args.windows(2)
        .find(|pair| pair[0] == "--task-dir")
        .map(|pair| PathBuf::from(&pair[1]))
}

fn main() {
    // 1. 解析命令行参数
    let args: Vec<String> = env::args().collect();
    let task_dir = match parse_task_dir(&args) {
        Some(dir) => dir,
        None => {
            print_error("fatal", "缺少 --task-dir 参数");
            eprintln!("用法: sqlcsv-task --task-dir <DIR>");
            exit(1);
        }
    };

    // 2. 初始化日志系统
    let _log_guard = init_task_logging(&task_dir);
    tracing::info!("任务进程启动，task_dir: {:?}", task_dir);

    // 3. 读取并校验任务配置
    let (task, config) = match load_task(&task_dir) {
        Ok(loaded) => loaded,
        Err(e) => {
            print_error("fatal", &format!("任务配置无效: {}", e));
            exit(1);
        }
    };
    tracing::info!("任务配置解析成功: task_id={}, created_at={}", task.task_id, task.created_at);

    // 4. 从加密缓存加载数据源
    let mut cache = match AppCache::init() {
        Ok(cache) => cache,
        Err(e) => {
            print_error("fatal", &format!("无法加载数据源: {}", e));
            exit(1);
        }
    };

    // 5. 执行抽取
    print_status(&task.task_id, "running");
    match run(&config, &mut cache) {
        Ok(report) => print_completed(completed_data(&task, &report)),
        Err(e) => {
            print_error("fatal", &format!("抽取失败: {}", e));
            exit(1);
        }
    }
}

fn load_task(task_dir: &Path) -> Result<(TaskConfig, ExtractionConfig), Box<dyn Error>> {
    let config_path = task_dir.join("config.json");
    let content = fs::read_to_string(&config_path).map_err(|e| format!("无法读取配置文件: {}", e))?;
    let mut task: TaskConfig = serde_json::from_str(&content).map_err(|e| format!("配置文件格式错误: {}", e))?;

    task.extract.sql = resolve_sql(&task.extract.sql, task_dir)?;
    let config = ExtractionConfig::try_from(task.extract.clone())?;
    Ok((task, config))
}

/// 以 `.sql` 结尾的取值视为文件路径，相对路径基于任务目录
fn resolve_sql(
    sql: &str,
    task_dir: &Path,
) -> Result<String, Box<dyn Error>> {
    let trimmed = sql.trim();
    if !trimmed.to_ascii_lowercase().ends_with(".sql") {
        return Ok(sql.to_string());
    }

    let path = task_dir.join(trimmed);
    tracing::info!("从文件读取 SQL: {}", path.display());
    fs::read_to_string(&path).map_err(|e| format!("无法读取 SQL 文件 {}: {}", path.display(), e).into())
}

fn completed_data(
    task: &TaskConfig,
    report: &ExtractReport,
) -> serde_json::Value {
    serde_json::json!({
        "status": "success",
        "task_id": task.task_id,
        "total_rows": report.rows,
        "headers": report.headers,
        "watermark": report.watermark.as_ref().map(|v| v.render().into_owned()),
        "output_path": report.output_path,
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "finished_at": Utc::now().to_rfc3339(),
    })
}

pub fn print_status(
    task_id: &str,
    status: &str,
) {
    print_progress(ProgressMessage {
        kind: MessageKind::Status,
        data: serde_json::json!({
            "task_id": task_id,
            "status": status,
        }),
    });
}

pub fn print_error(
    severity: &str,
    message: &str,
) {
    tracing::error!("{}", message);
    print_progress(ProgressMessage {
        kind: MessageKind::Error,
        data: serde_json::json!({
            "severity": severity,
            "message": message,
        }),
    });
}

pub fn print_completed(data: serde_json::Value) {
    print_progress(ProgressMessage {
        kind: MessageKind::Completed,
        data,
    });
}

pub fn print_progress(msg: ProgressMessage) {
    if let Ok(json) = serde_json::to_string(&msg) {
        println!("{}", json);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sqlcsv_core::Value;

    use super::*;

    #[test]
    fn task_dir_argument_is_found() {
        let args: Vec<String> = ["sqlcsv-task", "--task-dir", "/tmp/t1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_task_dir(&args), Some(PathBuf::from("/tmp/t1")));

        let args = vec!["sqlcsv-task".to_string(), "--task-dir".to_string()];
        assert_eq!(parse_task_dir(&args), None);
    }

    #[test]
    fn sql_file_is_read_relative_to_task_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("orders.sql"), "SELECT id FROM orders").unwrap();

        assert_eq!(resolve_sql("orders.sql", dir.path()).unwrap(), "SELECT id FROM orders");
        assert_eq!(resolve_sql("SELECT 1", dir.path()).unwrap(), "SELECT 1");
        assert!(resolve_sql("missing.sql", dir.path()).is_err());
    }

    #[test]
    fn task_config_is_loaded_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extract.sql"), "SELECT a.id, a.name AS n FROM a").unwrap();
        fs::write(
            dir.path().join("config.json"),
            serde_json::json!({
                "task_id": "t-1",
                "created_at": "2025-01-01T00:00:00Z",
                "extract": {
                    "sql": "extract.sql",
                    "primary_connection_id": "src",
                    "output_path": "/tmp/out.csv"
                }
            })
            .to_string(),
        )
        .unwrap();

        let (task, config) = load_task(dir.path()).unwrap();
        assert_eq!(task.task_id, "t-1");
        assert_eq!(config.sql(), "SELECT a.id, a.name AS n FROM a");
        assert_eq!(config.destination_connection_id(), "src");
    }

    #[test]
    fn invalid_incremental_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            serde_json::json!({
                "task_id": "t-2",
                "extract": {
                    "sql": "SELECT a FROM t",
                    "output_path": "/tmp/out.csv",
                    "incremental": true,
                    "tracked_column": "updated_at"
                }
            })
            .to_string(),
        )
        .unwrap();

        let err = load_task(dir.path()).unwrap_err();
        assert!(err.to_string().contains("tracked_table"));
    }

    #[test]
    fn completed_message_shape() {
        let task = TaskConfig {
            task_id: "t-3".into(),
            created_at: String::new(),
            extract: serde_json::from_value(serde_json::json!({
                "sql": "SELECT 1 AS one",
                "output_path": "/tmp/out.csv"
            }))
            .unwrap(),
        };
        let report = ExtractReport {
            headers: vec!["one".into()],
            rows: 1,
            watermark: Some(Value::Int(7)),
            output_path: PathBuf::from("/tmp/out.csv"),
            elapsed: Duration::from_millis(12),
        };

        let data = completed_data(&task, &report);
        assert_eq!(data["total_rows"], 1);
        assert_eq!(data["watermark"], "7");
        assert_eq!(data["elapsed_ms"], 12);
        assert_eq!(data["headers"][0], "one");

        let msg = serde_json::to_value(ProgressMessage {
            kind: MessageKind::Completed,
            data,
        })
        .unwrap();
        assert_eq!(msg["kind"], "completed");
    }
}
