use std::{fs, io, path::PathBuf};

use aes_gcm::{
    Aes256Gcm,
    aead::{Aead, KeyInit},
};
use thiserror::Error;

use crate::{DataSource, DatabaseSession, DriverError, create_connection, extract::Connector, sources_db};

const ENCRYPTION_KEY: [u8; 32] = [
    0x7f, 0x3e, 0x9a, 0x5c, 0x2b, 0x8f, 0x1d, 0x6e, 0x4a, 0x0c, 0x7b, 0x9f, 0x3d, 0x5a, 0x8e, 0x2c, 0x1f, 0x6b, 0x4d,
    0x9a, 0x0e, 0x7c, 0x3f, 0x5b, 0x8d, 0x2a, 0x9e, 0x1c, 0x6f, 0x4b, 0x0d, 0x7a,
];

const NONCE: [u8; 12] = [0xa1, 0xb2, 0xc3, 0xd4, 0xe5, 0xf6, 0x07, 0x18, 0x29, 0x3a, 0x4b, 0x5c];

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}

/// 数据源注册表，按连接 ID 解析连接配置
pub struct AppCache {
    sources: Vec<DataSource>,
    sources_path: PathBuf,
}

impl AppCache {
    /// 从默认位置（~/.sqlcsv/sources.db）加载
    pub fn init() -> Result<Self, CacheError> {
        Self::open(sources_db())
    }

    pub fn open(sources_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let sources_path = sources_path.into();

        let sources = if sources_path.exists() {
            let encrypted = fs::read(&sources_path)?;
            let decrypted = Self::decrypt(&encrypted)?;
            serde_json::from_slice(&decrypted)?
        } else {
            vec![]
        };

        Ok(Self { sources, sources_path })
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub fn source(
        &self,
        id: &str,
    ) -> Option<&DataSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// 新增或替换（按 ID）数据源，需调用 `save` 落盘
    pub fn upsert(
        &mut self,
        source: DataSource,
    ) {
        match self.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.sources_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec(&self.sources)?;
        let encrypted = Self::encrypt(&json)?;
        fs::write(&self.sources_path, encrypted)?;
        Ok(())
    }

    fn encrypt(data: &[u8]) -> Result<Vec<u8>, CacheError> {
        Aes256Gcm::new(&ENCRYPTION_KEY.into())
            .encrypt(&NONCE.into(), data)
            .map_err(|e| CacheError::Encryption(e.to_string()))
    }

    fn decrypt(data: &[u8]) -> Result<Vec<u8>, CacheError> {
        Aes256Gcm::new(&ENCRYPTION_KEY.into())
            .decrypt(&NONCE.into(), data)
            .map_err(|e| CacheError::Decryption(e.to_string()))
    }
}

impl Connector for AppCache {
    fn connect(
        &mut self,
        connection_id: &str,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let source = self
            .source(connection_id)
            .ok_or_else(|| DriverError::UnknownSource(connection_id.to_string()))?;
        tracing::info!(
            "连接数据源: {} ({}, {})",
            source.name,
            source.kind.label(),
            source.display_endpoint()
        );
        create_connection(&source.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataSourceKind, DataSourceOptions, SQLiteOptions};

    fn sqlite_source(
        name: &str,
        path: &str,
    ) -> DataSource {
        DataSource::new(
            name.into(),
            DataSourceKind::SQLite,
            DataSourceOptions::SQLite(SQLiteOptions {
                readonly: false,
                filepath: path.into(),
            }),
        )
    }

    #[test]
    fn missing_file_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AppCache::open(dir.path().join("sources.db")).unwrap();
        assert!(cache.sources().is_empty());
    }

    #[test]
    fn saved_sources_survive_reload_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sources.db");

        let mut cache = AppCache::open(&path).unwrap();
        let source = sqlite_source("orders", "/tmp/orders.db");
        let id = source.id.clone();
        cache.upsert(source);
        cache.save().unwrap();

        let raw = fs::read(&path).unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&raw).is_err());

        let reloaded = AppCache::open(&path).unwrap();
        assert_eq!(reloaded.sources().len(), 1);
        assert_eq!(reloaded.source(&id).unwrap().name, "orders");
    }

    #[test]
    fn upsert_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = AppCache::open(dir.path().join("sources.db")).unwrap();
        let mut source = sqlite_source("v1", "/tmp/a.db");
        cache.upsert(source.clone());
        source.name = "v2".into();
        cache.upsert(source.clone());

        assert_eq!(cache.sources().len(), 1);
        assert_eq!(cache.source(&source.id).unwrap().name, "v2");
    }

    #[test]
    fn corrupted_file_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.db");
        fs::write(&path, b"not encrypted").unwrap();
        assert!(matches!(AppCache::open(&path), Err(CacheError::Decryption(_))));
    }

    #[test]
    fn unknown_connection_id_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = AppCache::open(dir.path().join("sources.db")).unwrap();
        let err = cache.connect("missing").err().unwrap();
        assert!(matches!(err, DriverError::UnknownSource(ref id) if id == "missing"));
    }
}
