use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// 核心模块导出
pub mod cache;
pub mod config;
pub mod driver;
pub mod export;
pub mod extract;
pub mod paths;
pub mod sql;
pub mod watermark;

pub use cache::{AppCache, CacheError};
pub use config::{ConfigError, DEFAULT_WATERMARK, ExtractionConfig, ExtractionConfigBuilder, RawExtractionConfig};
pub use driver::{
    DatabaseDriver, DatabaseSession, DriverError, Params, Placeholder, QueryReq, QueryResp, Record, Value,
    create_connection,
};
pub use export::{ExportError, ExportWriter, write_records};
pub use extract::{Connector, ExtractError, ExtractReport, ExtractState, LAST_UPDATED_PARAM, run};
pub use paths::{root_dir, sources_db};
pub use sql::{header_from_field, headers_from_sql};
pub use watermark::resolve_watermark;

// ============================================================================
// Data Source Types
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub kind: DataSourceKind,
    pub options: DataSourceOptions,
}

impl DataSource {
    pub fn new(
        name: String,
        kind: DataSourceKind,
        options: DataSourceOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            kind,
            options,
        }
    }

    pub fn display_endpoint(&self) -> String {
        match &self.options {
            DataSourceOptions::MySQL(opts) => opts.endpoint(),
            DataSourceOptions::SQLite(opts) => opts.endpoint(),
            DataSourceOptions::Postgres(opts) => opts.endpoint(),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceKind {
    MySQL,
    SQLite,
    Postgres,
}

impl DataSourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            DataSourceKind::MySQL => "MySQL",
            DataSourceKind::SQLite => "SQLite",
            DataSourceKind::Postgres => "PostgreSQL",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MySQLOptions {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub use_tls: bool,
}

impl Default for MySQLOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: "3306".into(),
            username: "root".into(),
            password: "".into(),
            database: String::new(),
            use_tls: false,
        }
    }
}

impl MySQLOptions {
    pub fn endpoint(&self) -> String {
        let scheme = if self.use_tls { "mysqls" } else { "mysql" };
        let db = self.database.trim();
        if db.is_empty() {
            format!("{}://{}:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}", scheme, self.host, self.port, db)
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SQLiteOptions {
    pub readonly: bool,
    pub filepath: String,
}

impl SQLiteOptions {
    pub fn endpoint(&self) -> String {
        let path = self.filepath.trim();
        if path.is_empty() {
            return "sqlite://<未配置文件>".into();
        }

        let name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path);

        if self.readonly {
            format!("sqlite://{}?mode=ro", name)
        } else {
            format!("sqlite://{}", name)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostgresOptions {
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: "5432".into(),
            database: String::new(),
            username: "postgres".into(),
            password: "".into(),
            use_tls: false,
        }
    }
}

impl PostgresOptions {
    pub fn endpoint(&self) -> String {
        let db = self.database.trim();
        let suffix = if db.is_empty() {
            String::new()
        } else {
            format!("/{}", db)
        };
        format!("postgres://{}:{}{}", self.host, self.port, suffix)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DataSourceOptions {
    MySQL(MySQLOptions),
    SQLite(SQLiteOptions),
    Postgres(PostgresOptions),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_hide_credentials() {
        let pg = PostgresOptions {
            database: "warehouse".into(),
            password: "secret".into(),
            ..Default::default()
        };
        assert_eq!(pg.endpoint(), "postgres://127.0.0.1:5432/warehouse");

        let mysql = MySQLOptions {
            use_tls: true,
            ..Default::default()
        };
        assert_eq!(mysql.endpoint(), "mysqls://127.0.0.1:3306");
    }

    #[test]
    fn sqlite_endpoint_uses_file_name() {
        let opts = SQLiteOptions {
            readonly: true,
            filepath: "/var/data/orders.db".into(),
        };
        assert_eq!(opts.endpoint(), "sqlite://orders.db?mode=ro");
        assert_eq!(SQLiteOptions::default().endpoint(), "sqlite://<未配置文件>");
    }

    #[test]
    fn data_source_gets_fresh_id() {
        let a = DataSource::new(
            "a".into(),
            DataSourceKind::SQLite,
            DataSourceOptions::SQLite(SQLiteOptions::default()),
        );
        let b = DataSource::new(
            "b".into(),
            DataSourceKind::SQLite,
            DataSourceOptions::SQLite(SQLiteOptions::default()),
        );
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind.label(), "SQLite");
    }
}
