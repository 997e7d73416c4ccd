//! トランスポートの向こう側にある翻訳ファイルストア

use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::document::parse_document;
use super::{
    ReadError,
    TranslationDocument,
    TranslationStore,
    WriteError,
};
use crate::ipc::channel::{
    READ_FILE_REQUEST,
    READ_FILE_RESPONSE,
    ReadFileRequest,
    ReadFileResponse,
    WRITE_FILE_REQUEST,
    WRITE_FILE_RESPONSE,
    WriteFileRequest,
    WriteFileResponse,
};
use crate::ipc::{
    CorrelationRegistry,
    IpcError,
    Transport,
};

/// 応答待ちの読み書き（応答ハンドラーが解決する）
#[derive(Debug)]
struct Pending {
    /// 読み込み要求
    reads: CorrelationRegistry<ReadFileResponse>,
    /// 書き込み要求
    writes: CorrelationRegistry<Option<IpcError>>,
    /// `teardown` 済みかどうか
    closed: AtomicBool,
}

/// ファイル I/O をホストプロセスに依頼するストア
///
/// 応答は相関 ID で要求と対応付けます。パースはこちら側で行うため、
/// ホストは生のテキストを運ぶだけです。
#[derive(Debug, Clone)]
pub struct IpcStore {
    /// ホストへの通信路
    transport: Arc<dyn Transport>,
    /// 応答待ちの要求
    pending: Arc<Pending>,
}

impl IpcStore {
    /// `transport` に応答ハンドラーを登録する
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let pending = Arc::new(Pending {
            reads: CorrelationRegistry::new("read"),
            writes: CorrelationRegistry::new("write"),
            closed: AtomicBool::new(false),
        });

        let reads = Arc::clone(&pending);
        transport.on_receive(
            READ_FILE_RESPONSE,
            Arc::new(move |payload| match serde_json::from_value::<ReadFileResponse>(payload) {
                Ok(response) => {
                    let id = response.key;
                    reads.reads.resolve(&id, response);
                }
                Err(e) => tracing::warn!("Malformed read response: {}", e),
            }),
        );

        let writes = Arc::clone(&pending);
        transport.on_receive(
            WRITE_FILE_RESPONSE,
            Arc::new(move |payload| match serde_json::from_value::<WriteFileResponse>(payload) {
                Ok(response) => {
                    for id in &response.keys {
                        writes.writes.resolve(id, response.error.clone());
                    }
                }
                Err(e) => tracing::warn!("Malformed write response: {}", e),
            }),
        );

        Self { transport, pending }
    }

    /// ホストの応答を待っている要求数
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.reads.len() + self.pending.writes.len()
    }

    /// `teardown` 済みかどうか
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pending.closed.load(Ordering::SeqCst)
    }

    /// 応答ハンドラーを解除し、応答待ちの要求をすべて失敗させる
    ///
    /// 以降の要求は送信されず、すぐに `Disconnected` で失敗します。解除するのは
    /// このストアの応答チャンネルだけです。
    pub fn teardown(&self) {
        self.pending.closed.store(true, Ordering::SeqCst);
        self.transport.remove_handlers(READ_FILE_RESPONSE);
        self.transport.remove_handlers(WRITE_FILE_RESPONSE);
        let dropped = self.pending.reads.clear() + self.pending.writes.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Abandoned outstanding requests on teardown");
        }
    }

    /// 読み込みを依頼し、応答を待つ
    async fn request_read(&self, path: &str) -> Result<TranslationDocument, ReadError> {
        if self.is_closed() {
            return Err(ReadError::Disconnected { path: path.to_string() });
        }
        let (id, response) = self.pending.reads.register();
        // 登録と teardown が競合した場合
        if self.is_closed() {
            self.pending.reads.cancel(&id);
            return Err(ReadError::Disconnected { path: path.to_string() });
        }
        let request = ReadFileRequest { key: id, filename: path.to_string() };
        match serde_json::to_value(&request) {
            Ok(payload) => self.transport.send(READ_FILE_REQUEST, payload),
            Err(e) => {
                self.pending.reads.cancel(&id);
                let error = IpcError::new(e.to_string());
                return Err(ReadError::Remote { path: path.to_string(), error });
            }
        }
        tracing::debug!(%id, file = %path, "Requested file read");

        let response =
            response.await.map_err(|_| ReadError::Disconnected { path: path.to_string() })?;

        match response.error {
            Some(error) if error.is_not_found() => {
                Err(ReadError::NotFound { path: path.to_string() })
            }
            Some(error) => Err(ReadError::Remote { path: path.to_string(), error }),
            None => parse_document(path, response.data.as_bytes()),
        }
    }

    /// 書き込みを依頼し、応答を待つ
    async fn request_write(
        &self,
        path: &str,
        document: &TranslationDocument,
    ) -> Result<(), WriteError> {
        if self.is_closed() {
            return Err(WriteError::Disconnected { path: path.to_string() });
        }
        let (id, response) = self.pending.writes.register();
        if self.is_closed() {
            self.pending.writes.cancel(&id);
            return Err(WriteError::Disconnected { path: path.to_string() });
        }
        let request = WriteFileRequest {
            keys: vec![id],
            filename: path.to_string(),
            data: Value::Object(document.clone()),
        };
        match serde_json::to_value(&request) {
            Ok(payload) => self.transport.send(WRITE_FILE_REQUEST, payload),
            Err(e) => {
                self.pending.writes.cancel(&id);
                let message = e.to_string();
                return Err(WriteError::Serialize { path: path.to_string(), message });
            }
        }
        tracing::debug!(%id, file = %path, keys = document.len(), "Requested file write");

        match response.await {
            Ok(None) => Ok(()),
            Ok(Some(error)) => Err(WriteError::Remote { path: path.to_string(), error }),
            Err(_) => Err(WriteError::Disconnected { path: path.to_string() }),
        }
    }
}

impl TranslationStore for IpcStore {
    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<TranslationDocument, ReadError>> {
        self.request_read(path).boxed()
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        document: &'a TranslationDocument,
    ) -> BoxFuture<'a, Result<(), WriteError>> {
        self.request_write(path, document).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use googletest::prelude::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ipc::{
        CorrelationId,
        LocalTransport,
    };

    /// レンダラー側のストアと、手動で応答する偽のホスト
    fn setup(channel: &str) -> (IpcStore, LocalTransport, mpsc::UnboundedReceiver<Value>) {
        let (renderer, host) = LocalTransport::pair();
        let (tx, rx) = mpsc::unbounded_channel();
        host.on_receive(
            channel,
            Arc::new(move |payload| {
                let _ = tx.send(payload);
            }),
        );
        (IpcStore::new(Arc::new(renderer)), host, rx)
    }

    #[tokio::test]
    async fn read_resolves_with_parsed_document() {
        let (store, host, mut requests) = setup(READ_FILE_REQUEST);
        let read = tokio::spawn(async move { store.read("/locales/en/common.json").await });

        let request: ReadFileRequest =
            serde_json::from_value(requests.recv().await.unwrap()).unwrap();
        assert_eq!(request.filename, "/locales/en/common.json");
        host.send(
            READ_FILE_RESPONSE,
            json!({ "key": request.key, "data": "\u{feff}{\"hello\":\"Hello\"}" }),
        );

        let document = read.await.unwrap().unwrap();
        assert_that!(document.get("hello"), some(eq(&json!("Hello"))));
    }

    #[tokio::test]
    async fn read_maps_enoent_to_not_found() {
        let (store, host, mut requests) = setup(READ_FILE_REQUEST);
        let read = tokio::spawn(async move { store.read("/missing.json").await });

        let request: ReadFileRequest =
            serde_json::from_value(requests.recv().await.unwrap()).unwrap();
        host.send(
            READ_FILE_RESPONSE,
            json!({ "key": request.key, "error": { "code": "ENOENT", "message": "no such file" } }),
        );

        assert!(matches!(read.await.unwrap(), Err(ReadError::NotFound { .. })));
    }

    #[tokio::test]
    async fn stale_responses_are_ignored() {
        let (store, host, mut requests) = setup(READ_FILE_REQUEST);
        let reader = store.clone();
        let read = tokio::spawn(async move { reader.read("/a.json").await });

        let request: ReadFileRequest =
            serde_json::from_value(requests.recv().await.unwrap()).unwrap();
        host.send(READ_FILE_RESPONSE, json!({ "key": CorrelationId::new(), "data": "{\"x\":1}" }));
        host.send(READ_FILE_RESPONSE, json!({ "key": request.key, "data": "{\"y\":2}" }));
        host.send(READ_FILE_RESPONSE, json!({ "key": request.key, "data": "{\"z\":3}" }));

        let document = read.await.unwrap().unwrap();
        assert_that!(Value::Object(document), eq(&json!({ "y": 2 })));
        assert_that!(store.outstanding(), eq(0));
    }

    #[tokio::test]
    async fn write_resolves_every_known_key() {
        let (store, host, mut requests) = setup(WRITE_FILE_REQUEST);
        let writer = store.clone();
        let write = tokio::spawn(async move {
            let Value::Object(document) = json!({ "k": "v" }) else { unreachable!() };
            writer.write("/a.json", &document).await
        });

        let request: WriteFileRequest =
            serde_json::from_value(requests.recv().await.unwrap()).unwrap();
        assert_that!(request.data, eq(&json!({ "k": "v" })));
        // An unknown id ahead of ours must not stop resolution.
        host.send(
            WRITE_FILE_RESPONSE,
            json!({ "keys": [CorrelationId::new(), request.keys[0]], "error": null }),
        );

        assert!(write.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn write_error_from_host_is_reported() {
        let (store, host, mut requests) = setup(WRITE_FILE_REQUEST);
        let write =
            tokio::spawn(async move { store.write("/a.json", &TranslationDocument::new()).await });

        let request: WriteFileRequest =
            serde_json::from_value(requests.recv().await.unwrap()).unwrap();
        host.send(
            WRITE_FILE_RESPONSE,
            json!({ "keys": request.keys, "error": { "code": "EACCES", "message": "denied" } }),
        );

        let result = write.await.unwrap();
        assert!(matches!(
            result,
            Err(WriteError::Remote { error, .. }) if error.code.as_deref() == Some("EACCES")
        ));
    }

    #[tokio::test]
    async fn teardown_fails_outstanding_requests() {
        let (store, _host, mut requests) = setup(READ_FILE_REQUEST);
        let reader = store.clone();
        let read = tokio::spawn(async move { reader.read("/a.json").await });

        requests.recv().await.unwrap();
        store.teardown();

        assert!(matches!(read.await.unwrap(), Err(ReadError::Disconnected { .. })));
    }

    #[tokio::test]
    async fn requests_after_teardown_fail_without_being_sent() {
        let (store, _host, mut requests) = setup(READ_FILE_REQUEST);
        store.teardown();

        let read = store.read("/a.json").await;
        let write = store.write("/a.json", &TranslationDocument::new()).await;

        assert!(store.is_closed());
        assert!(matches!(read, Err(ReadError::Disconnected { .. })));
        assert!(matches!(write, Err(WriteError::Disconnected { .. })));
        assert_that!(store.outstanding(), eq(0));
        tokio::task::yield_now().await;
        assert!(requests.try_recv().is_err());
    }
}
