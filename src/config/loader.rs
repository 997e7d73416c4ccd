//! 設定ファイルの読み込み関数

use std::path::Path;

use super::{
    BackendOptions,
    ConfigError,
};

/// 設定ファイルを読み込む
///
/// # Arguments
/// * `config_path` - 設定ファイル（JSON）のパス
///
/// # Returns
/// - `Ok(Some(options))`: 設定ファイルが見つかり、読み込みに成功
/// - `Ok(None)`: 設定ファイルが見つからない
/// - `Err(ConfigError)`: ファイル読み込みまたはパースエラー
///
/// # Errors
/// - ファイル読み込みエラー
/// - JSON パースエラー
pub fn load_from_file(config_path: &Path) -> Result<Option<BackendOptions>, ConfigError> {
    if !config_path.exists() {
        tracing::debug!("Configuration file not found: {:?}", config_path);
        return Ok(None);
    }

    tracing::debug!("Loading configuration from: {:?}", config_path);

    let content = std::fs::read_to_string(config_path)?;
    let options: BackendOptions = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;

    Ok(Some(options))
}

impl BackendOptions {
    /// 設定ファイルを読み込み、バリデーションする
    ///
    /// ファイルが存在しない場合はデフォルト値を使用します。
    ///
    /// # Errors
    /// - ファイル読み込みエラー
    /// - JSON パースエラー
    /// - バリデーションエラー
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let options = load_from_file(config_path)?.unwrap_or_default();

        options.validate().map_err(ConfigError::ValidationErrors)?;
        tracing::debug!("Options loaded successfully: {:?}", options);

        Ok(options)
    }
}
