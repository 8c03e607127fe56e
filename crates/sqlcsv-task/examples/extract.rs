use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use sqlcsv_core::{AppCache, DataSource, DataSourceKind, DataSourceOptions, QueryReq, SQLiteOptions, create_connection};

const SOURCE_DB: &str = "/tmp/sqlcsv-demo/shop.db";

/// 准备演示数据库并注册为数据源，返回数据源 ID
fn register_demo_source() -> String {
    if let Some(parent) = PathBuf::from(SOURCE_DB).parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let _ = fs::remove_file(SOURCE_DB);

    let options = DataSourceOptions::SQLite(SQLiteOptions {
        readonly: false,
        filepath: SOURCE_DB.into(),
    });
    let mut session = create_connection(&options).expect("打开演示数据库失败");
    for sql in [
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT, updated_at TEXT)",
        "INSERT INTO orders VALUES (1, 'alice', '2024-01-15 10:00:00+00:00'), (2, 'bob', '2024-02-20 12:30:00+00:00')",
        "CREATE TABLE orders_copy (id INTEGER, updated_at TEXT)",
    ] {
        session.query(QueryReq::Raw { sql: sql.into() }).unwrap();
    }

    let mut cache = AppCache::init().expect("加载数据源失败");
    let source = DataSource::new("sqlcsv-demo".into(), DataSourceKind::SQLite, options);
    let id = source.id.clone();
    cache.upsert(source);
    cache.save().expect("保存数据源失败");
    id
}

/// 示例：增量抽取 orders 表（目标表为空，使用默认水位）
fn extract_orders(source_id: &str) {
    let task_dir = PathBuf::from("/tmp/sqlcsv-tasks/extract-orders");
    let output_file = PathBuf::from("/tmp/sqlcsv-demo/orders.csv");

    // 清除上次任务的信息
    if task_dir.exists() {
        fs::remove_dir_all(&task_dir).unwrap();
    }
    fs::create_dir_all(&task_dir).unwrap();

    fs::write(
        task_dir.join("orders.sql"),
        "SELECT o.id, o.customer AS name, o.updated_at\n\
         FROM orders o\n\
         WHERE o.updated_at > %(last_updated_value)s\n\
         ORDER BY o.id\n",
    )
    .unwrap();

    let config = json!({
        "task_id": "extract-orders-001",
        "created_at": "2025-12-27T10:00:00Z",
        "extract": {
            "sql": "orders.sql",
            "primary_connection_id": source_id,
            "output_path": output_file,
            "incremental": true,
            "tracked_table": "orders_copy",
            "tracked_column": "updated_at"
        }
    });

    fs::write(task_dir.join("config.json"), serde_json::to_string_pretty(&config).unwrap()).unwrap();

    println!("配置文件已创建: {:?}/config.json", task_dir);
    println!("正在执行任务...\n");

    let status = Command::new("cargo")
        .args(["run", "-p", "sqlcsv-task", "--", "--task-dir"])
        .arg(&task_dir)
        .status()
        .expect("创建任务失败");

    if status.success() {
        println!("\n✓ 任务执行成功，输出: {:?}", output_file);
    } else {
        println!("\n✗ 任务执行失败，日志: {:?}/task.log", task_dir);
    }
}

fn main() {
    println!("=== sqlcsv Task Extract 示例 ===\n");

    let source_id = register_demo_source();
    println!("已注册演示数据源: {}\n", source_id);

    extract_orders(&source_id);
}
