//! プロセス境界をまたぐチャンネル名とメッセージ

use std::fmt;
use std::io;

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

use super::registry::CorrelationId;

/// 読み込み要求（レンダラー → ホスト）
pub const READ_FILE_REQUEST: &str = "ReadFile-Request";
/// 読み込み応答（ホスト → レンダラー）
pub const READ_FILE_RESPONSE: &str = "ReadFile-Response";
/// 書き込み要求（レンダラー → ホスト）
pub const WRITE_FILE_REQUEST: &str = "WriteFile-Request";
/// 書き込み応答（ホスト → レンダラー）
pub const WRITE_FILE_RESPONSE: &str = "WriteFile-Response";
/// 言語変更の通知（ホスト → レンダラー）
pub const CHANGE_LANGUAGE_REQUEST: &str = "ChangeLanguage-Request";

/// ホストが報告するエラー（Node.js のシステムエラーと同じ形）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcError {
    /// errno 形式のコード（`ENOENT` や `EACCES` など）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// エラーメッセージ
    pub message: String,
}

impl IpcError {
    /// ファイルが存在しないことを示すコード
    pub const NOT_FOUND: &'static str = "ENOENT";

    /// コードなしのエラーを作成する
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into() }
    }

    /// ファイルが存在しないことによるエラーかどうか
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code.as_deref() == Some(Self::NOT_FOUND)
    }
}

impl From<&io::Error> for IpcError {
    fn from(error: &io::Error) -> Self {
        let code = match error.kind() {
            io::ErrorKind::NotFound => Some(Self::NOT_FOUND),
            io::ErrorKind::PermissionDenied => Some("EACCES"),
            io::ErrorKind::AlreadyExists => Some("EEXIST"),
            io::ErrorKind::IsADirectory => Some("EISDIR"),
            _ => None,
        };
        Self { code: code.map(str::to_string), message: error.to_string() }
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// [`READ_FILE_REQUEST`] のペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFileRequest {
    /// 相関 ID
    pub key: CorrelationId,
    /// 読み込むファイル
    pub filename: String,
}

/// [`READ_FILE_RESPONSE`] のペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFileResponse {
    /// 対応する要求の相関 ID
    pub key: CorrelationId,
    /// 読み込みに失敗した場合のエラー
    #[serde(default)]
    pub error: Option<IpcError>,
    /// ファイルの生の内容（エラー時は空）
    #[serde(default)]
    pub data: String,
}

/// [`WRITE_FILE_REQUEST`] のペイロード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFileRequest {
    /// この書き込みを待っている相関 ID
    pub keys: Vec<CorrelationId>,
    /// 書き込むファイル
    pub filename: String,
    /// 書き込む JSON
    pub data: Value,
}

/// [`WRITE_FILE_RESPONSE`] のペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileResponse {
    /// 要求の `keys` をそのまま返す
    pub keys: Vec<CorrelationId>,
    /// 書き込みに失敗した場合のエラー
    #[serde(default)]
    pub error: Option<IpcError>,
}

/// [`CHANGE_LANGUAGE_REQUEST`] のペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLanguageRequest {
    /// 新しい言語コード
    pub lng: String,
}
