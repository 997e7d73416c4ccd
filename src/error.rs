//! バックエンドと書き込みチケットが返すエラー

use thiserror::Error;

use crate::config::InterpolationError;
use crate::store::{
    ReadError,
    WriteError,
};

/// [`Backend`](crate::Backend) の操作と書き込みチケットが返すエラー
///
/// 1 回のフラッシュの失敗を、そのフラッシュに含まれたすべての呼び出し元に渡すため `Clone` です。
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// 読み込みの失敗
    #[error(transparent)]
    Read(#[from] ReadError),

    /// 書き込みの失敗
    #[error(transparent)]
    Write(#[from] WriteError),

    /// この言語・名前空間ではパステンプレートを展開できない
    #[error("cannot resolve translation path: {0}")]
    InvalidPath(#[from] InterpolationError),

    /// サポートしていない操作
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// `path` の更新がフラッシュされる前にキューが破棄された
    #[error("write queue dropped before '{path}' was flushed")]
    Dropped { path: String },
}
