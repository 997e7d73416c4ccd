//! 特権プロセス側のバインディング
//!
//! レンダラーからのファイル読み書きリクエストを受け取り、実際のファイル I/O を
//! 行って結果を返します。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::channel::{
    CHANGE_LANGUAGE_REQUEST,
    ChangeLanguageRequest,
    IpcError,
    READ_FILE_REQUEST,
    READ_FILE_RESPONSE,
    ReadFileRequest,
    ReadFileResponse,
    WRITE_FILE_REQUEST,
    WRITE_FILE_RESPONSE,
    WriteFileRequest,
    WriteFileResponse,
};
use super::transport::Transport;
use crate::store::FileSystem;
use crate::store::document::parent_dir;

/// ホスト側のリクエストハンドラー
#[derive(Debug, Clone)]
pub struct HostBindings {
    /// レンダラーとの通信路
    transport: Arc<dyn Transport>,
    /// 実際のファイル I/O
    fs: Arc<dyn FileSystem>,
}

impl HostBindings {
    /// リクエストハンドラーを登録する
    ///
    /// ハンドラーは tokio タスクを生成するため、ランタイム内で呼び出す必要があります。
    pub fn bind(transport: Arc<dyn Transport>, fs: Arc<dyn FileSystem>) -> Self {
        let bindings = Self { transport, fs };

        let reader = bindings.clone();
        bindings.transport.on_receive(
            READ_FILE_REQUEST,
            Arc::new(move |payload| match serde_json::from_value::<ReadFileRequest>(payload) {
                Ok(request) => {
                    let reader = reader.clone();
                    tokio::spawn(async move { reader.handle_read(request).await });
                }
                Err(e) => tracing::warn!("Malformed read request: {}", e),
            }),
        );

        let writer = bindings.clone();
        bindings.transport.on_receive(
            WRITE_FILE_REQUEST,
            Arc::new(move |payload| match serde_json::from_value::<WriteFileRequest>(payload) {
                Ok(request) => {
                    let writer = writer.clone();
                    tokio::spawn(async move { writer.handle_write(request).await });
                }
                Err(e) => tracing::warn!("Malformed write request: {}", e),
            }),
        );

        bindings
    }

    /// レンダラーに言語の切り替えを通知する
    pub fn notify_language_change(&self, lng: &str) {
        self.reply(CHANGE_LANGUAGE_REQUEST, &ChangeLanguageRequest { lng: lng.to_string() });
    }

    /// 登録したハンドラーをすべて解除する
    pub fn clear(&self) {
        self.transport.teardown();
    }

    /// 読み込みリクエストを処理
    async fn handle_read(&self, request: ReadFileRequest) {
        tracing::debug!(id = %request.key, file = %request.filename, "Read request");

        let response = match self.fs.read_raw(&request.filename).await {
            Ok(raw) => ReadFileResponse {
                key: request.key,
                error: None,
                data: String::from_utf8_lossy(&raw).into_owned(),
            },
            Err(e) => {
                // 存在しないファイルは想定内（まだキーが書き込まれていない）
                tracing::debug!(file = %request.filename, "Read failed: {}", e);
                ReadFileResponse {
                    key: request.key,
                    error: Some(IpcError::from(&e)),
                    data: String::new(),
                }
            }
        };

        self.reply(READ_FILE_RESPONSE, &response);
    }

    /// 書き込みリクエストを処理
    async fn handle_write(&self, request: WriteFileRequest) {
        tracing::debug!(ids = request.keys.len(), file = %request.filename, "Write request");

        let error = self.write_file(&request.filename, &request.data).await.err();
        if let Some(error) = &error {
            tracing::error!(file = %request.filename, "Write failed: {}", error);
        }

        self.reply(WRITE_FILE_RESPONSE, &WriteFileResponse { keys: request.keys, error });
    }

    /// 親ディレクトリを作成し、`data` をコンパクトな JSON で書き込む
    async fn write_file(&self, filename: &str, data: &Value) -> Result<(), IpcError> {
        // ディレクトリ作成の失敗は書き込み自体のエラーで報告される
        if let Some(dir) = parent_dir(filename)
            && let Err(e) = self.fs.create_dir_all(dir).await
        {
            tracing::warn!(dir = %dir, "Failed to create directory: {}", e);
        }

        let contents = serde_json::to_vec(data).map_err(|e| IpcError::new(e.to_string()))?;
        self.fs.write_raw(filename, contents).await.map_err(|e| IpcError::from(&e))
    }

    /// レンダラーへ応答を送る
    fn reply<T: Serialize>(&self, channel: &str, message: &T) {
        match serde_json::to_value(message) {
            Ok(payload) => self.transport.send(channel, payload),
            Err(e) => tracing::error!(channel, "Failed to serialize response: {}", e),
        }
    }
}
