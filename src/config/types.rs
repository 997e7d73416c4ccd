use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use thiserror::Error;

use super::template::PathTemplate;

/// 読み込み先のデフォルトテンプレート
pub const DEFAULT_LOAD_PATH: &str = "/locales/{{lng}}/{{ns}}.json";
/// 未翻訳キーの書き込み先のデフォルトテンプレート
pub const DEFAULT_ADD_PATH: &str = "/locales/{{lng}}/{{ns}}.missing.json";
/// デフォルトのデバウンス時間（ミリ秒）
pub const DEFAULT_DELAY_MS: u64 = 300;

/// 設定の検証エラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error in '{field_path}': {message}")]
pub struct ValidationError {
    /// フィールドの JSON パス（例: "loadPath"）
    pub field_path: String,
    /// エラーメッセージ
    pub message: String,
}

impl ValidationError {
    /// 検証エラーを作成する
    #[must_use]
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field_path: field_path.into(), message: message.into() }
    }
}

/// 設定の読み込み・検証エラー
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    ValidationErrors(Vec<ValidationError>),

    #[error("Failed to load configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// サンドボックス化されたバックエンドにホストへのトランスポートが指定されていない
    #[error(
        "No transport configured for a sandboxed backend. Bind the renderer bridge before building the backend"
    )]
    MissingTransport,
}

/// 検証エラーを番号付きの一覧に整形する
fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("  {}. {} - {}", i + 1, err.field_path, err.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// バックエンドの設定
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendOptions {
    /// `read` の読み込み先テンプレート（`{{lng}}` と `{{ns}}` を置換）
    pub load_path: String,

    /// `create` で未翻訳キーを書き込むテンプレート
    pub add_path: String,

    /// 未翻訳キーの書き込みのデバウンス時間（ミリ秒）
    pub delay: u64,

    /// ネストしたキーの区切り文字
    ///
    /// - `None`（未指定または `false`）: キーをそのまま書き込む
    /// - `Some(".")`: `a.b.c` を `{"a":{"b":{"c":…}}}` としてマージする
    #[serde(deserialize_with = "deserialize_key_separator")]
    pub key_separator: Option<String>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            load_path: DEFAULT_LOAD_PATH.to_string(),
            add_path: DEFAULT_ADD_PATH.to_string(),
            delay: DEFAULT_DELAY_MS,
            key_separator: None,
        }
    }
}

/// `keySeparator` の設定値（i18next は文字列か `false` を受け付ける）
#[derive(Deserialize)]
#[serde(untagged)]
enum KeySeparatorSetting {
    /// 区切り文字
    Text(String),
    /// `false` のみ有効
    Flag(bool),
}

/// `keySeparator` を `Option<String>` として読み込む（`true` はエラー）
fn deserialize_key_separator<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let setting = Option::<KeySeparatorSetting>::deserialize(deserializer)?;
    match setting {
        Some(KeySeparatorSetting::Text(separator)) => Ok(Some(separator)),
        Some(KeySeparatorSetting::Flag(false)) | None => Ok(None),
        Some(KeySeparatorSetting::Flag(true)) => {
            Err(serde::de::Error::custom("keySeparator must be a string or false"))
        }
    }
}

impl BackendOptions {
    /// 設定を検証し、問題をすべて集めて返す
    ///
    /// # Errors
    /// - 空または不正なパステンプレート
    /// - 空の区切り文字
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, template) in [("loadPath", &self.load_path), ("addPath", &self.add_path)] {
            if template.is_empty() {
                errors.push(ValidationError::new(
                    field,
                    "The path cannot be empty. Example: \"/locales/{{lng}}/{{ns}}.json\"",
                ));
            } else if let Err(e) = PathTemplate::parse(template) {
                errors.push(ValidationError::new(
                    field,
                    format!("Invalid path template '{template}': {e}"),
                ));
            }
        }

        if let Some(sep) = &self.key_separator
            && sep.is_empty()
        {
            errors.push(ValidationError::new(
                "keySeparator",
                "The separator cannot be empty. Please specify a separator (e.g., \".\"), or set it to false",
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// デバウンス時間を [`std::time::Duration`] で返す
    #[must_use]
    pub const fn delay_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delay)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::expect_used, clippy::panic)]
mod tests {
    use googletest::prelude::*;
    use rstest::*;

    use super::*;

    #[rstest]
    fn validate_default_options() {
        let options = BackendOptions::default();

        assert_that!(options.validate(), ok(anything()));
    }

    #[rstest]
    fn deserialize_empty_options() {
        let options: BackendOptions = serde_json::from_str("{}").unwrap();

        assert_that!(options.load_path, eq(DEFAULT_LOAD_PATH));
        assert_that!(options.add_path, eq(DEFAULT_ADD_PATH));
        assert_that!(options.delay, eq(300));
        assert_that!(options.key_separator.as_deref(), none());
    }

    #[rstest]
    fn deserialize_partial_options() {
        let json = r#"{"delay": 50, "keySeparator": "."}"#;

        let options: BackendOptions = serde_json::from_str(json).unwrap();

        assert_that!(options.delay, eq(50));
        assert_that!(options.key_separator.as_deref(), some(eq(".")));
        assert_that!(options.load_path, eq(DEFAULT_LOAD_PATH));
    }

    #[rstest]
    #[case(r#"{"keySeparator": false}"#)]
    #[case(r#"{"keySeparator": null}"#)]
    fn deserialize_disabled_key_separator(#[case] json: &str) {
        let options: BackendOptions = serde_json::from_str(json).unwrap();

        assert_that!(options.key_separator.as_deref(), none());
    }

    #[rstest]
    fn deserialize_rejects_true_key_separator() {
        let result = serde_json::from_str::<BackendOptions>(r#"{"keySeparator": true}"#);

        assert!(result.is_err());
    }

    #[rstest]
    fn validate_invalid_key_separator_empty() {
        let options =
            BackendOptions { key_separator: Some(String::new()), ..BackendOptions::default() };

        assert_that!(
            options.validate(),
            err(elements_are![all![
                field!(ValidationError.field_path, eq("keySeparator")),
                field!(ValidationError.message, contains_substring("cannot be empty"))
            ]])
        );
    }

    #[rstest]
    fn validate_invalid_templates() {
        let options = BackendOptions {
            load_path: String::new(),
            add_path: "/locales/{{lang}}/{{ns}}.json".to_string(),
            ..BackendOptions::default()
        };

        assert_that!(
            options.validate(),
            err(elements_are![
                all![
                    field!(ValidationError.field_path, eq("loadPath")),
                    field!(ValidationError.message, contains_substring("cannot be empty"))
                ],
                all![
                    field!(ValidationError.field_path, eq("addPath")),
                    field!(ValidationError.message, contains_substring("{{lang}}"))
                ]
            ])
        );
    }

    #[rstest]
    fn config_error_validation_errors_format() {
        let options = BackendOptions {
            load_path: String::new(),
            key_separator: Some(String::new()),
            ..BackendOptions::default()
        };

        let errors = options.validate().unwrap_err();
        let message = format!("{}", ConfigError::ValidationErrors(errors));

        assert_that!(message, contains_substring("Configuration validation failed"));
        assert_that!(message, contains_substring("1. loadPath"));
        assert_that!(message, contains_substring("2. keySeparator"));
    }
}
