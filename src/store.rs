//! 翻訳ファイルストア
//!
//! ストアは翻訳ドキュメントをファイル単位で読み書きします。[`FileStore`] は
//! [`FileSystem`] を直接使い、[`IpcStore`] はトランスポート越しに特権ホストへ依頼します。

pub mod document;
pub mod file;
pub mod fs;
pub mod remote;

use std::fmt;
use std::io;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

pub use document::TranslationDocument;
pub use file::FileStore;
pub use fs::{
    FileSystem,
    MemoryFileSystem,
    TokioFileSystem,
};
pub use remote::IpcStore;

use crate::ipc::IpcError;

/// 翻訳ドキュメントの読み込みエラー
#[derive(Error, Debug, Clone)]
pub enum ReadError {
    /// ファイルがまだ存在しない（呼び出し側は空のドキュメントとして扱う）
    #[error("translation file '{path}' does not exist")]
    NotFound { path: String },

    /// JSON オブジェクトとして解析できない
    #[error("Error parsing '{path}'. Message: '{message}'.")]
    Parse { path: String, message: String },

    /// ファイル I/O の失敗
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// ホストが「ファイルなし」以外のエラーを報告した
    #[error("host failed to read '{path}': {error}")]
    Remote { path: String, error: IpcError },

    /// ホストの応答前にトランスポートが切断された
    #[error("no response for reading '{path}': transport disconnected")]
    Disconnected { path: String },
}

impl ReadError {
    /// I/O エラーを変換する（`NotFound` は [`ReadError::NotFound`] に）
    pub(crate) fn from_io(path: &str, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path: path.to_string() }
        } else {
            Self::Io { path: path.to_string(), source: Arc::new(error) }
        }
    }

    /// 回復可能な「ファイルなし」かどうか
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// 翻訳ドキュメントの書き込みエラー
#[derive(Error, Debug, Clone)]
pub enum WriteError {
    /// ファイル I/O の失敗
    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// JSON へのシリアライズの失敗
    #[error("failed to serialize '{path}': {message}")]
    Serialize { path: String, message: String },

    /// ホストが書き込みエラーを報告した
    #[error("host failed to write '{path}': {error}")]
    Remote { path: String, error: IpcError },

    /// ホストの応答前にトランスポートが切断された
    #[error("no response for writing '{path}': transport disconnected")]
    Disconnected { path: String },
}

impl WriteError {
    /// I/O エラーを変換する
    pub(crate) fn from_io(path: &str, error: io::Error) -> Self {
        Self::Io { path: path.to_string(), source: Arc::new(error) }
    }
}

/// 翻訳ドキュメントをファイル単位で読み書きする
pub trait TranslationStore: Send + Sync + fmt::Debug {
    /// `path` のドキュメントを毎回読み直す
    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<TranslationDocument, ReadError>>;

    /// `path` のドキュメントを置き換える（親ディレクトリは必要に応じて作成）
    fn write<'a>(
        &'a self,
        path: &'a str,
        document: &'a TranslationDocument,
    ) -> BoxFuture<'a, Result<(), WriteError>>;
}
