//! i18n-fs-backend
//!
//! i18next 向けの翻訳ファイルバックエンド。サンドボックス化されたレンダラーから
//! 特権プロセスにファイル I/O を依頼し、未翻訳キーの書き込みをファイル単位で集約します。

pub mod backend;
pub mod config;
pub mod error;
pub mod ipc;
pub mod queue;
pub mod store;

pub use backend::{
    Backend,
    BackendBuilder,
    Languages,
};
pub use config::BackendOptions;
pub use error::BackendError;
pub use queue::{
    WriteQueue,
    WriteTicket,
};
