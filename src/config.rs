//! バックエンドの設定

/// 設定ファイルの読み込み
mod loader;
/// パステンプレートの解析と展開
mod template;
/// 設定の型と検証
mod types;

pub use loader::load_from_file;
pub use template::{
    InterpolationError,
    PathTemplate,
};
pub use types::{
    BackendOptions,
    ConfigError,
    DEFAULT_ADD_PATH,
    DEFAULT_DELAY_MS,
    DEFAULT_LOAD_PATH,
    ValidationError,
};
