use std::path::PathBuf;

/// 获取 sqlcsv 根目录（~/.sqlcsv）
///
/// Fallback: 如果 home_dir 失败，使用 ./.sqlcsv
pub fn root_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".sqlcsv"))
        .unwrap_or_else(|| PathBuf::from(".sqlcsv"))
}

/// 获取数据源配置文件路径（~/.sqlcsv/sources.db）
pub fn sources_db() -> PathBuf {
    root_dir().join("sources.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_db_lives_under_root() {
        let db = sources_db();
        assert_eq!(db.parent(), Some(root_dir().as_path()));
        assert!(root_dir().ends_with(".sqlcsv"));
    }
}
