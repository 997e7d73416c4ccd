//! レンダラー側のブリッジ
//!
//! レンダラーに許可するのはファイル要求の送信とその応答の受信だけで、
//! それ以外のチャンネルは拒否します。ホストからの言語切り替え通知は別途公開します。

use std::sync::Arc;

use serde_json::Value;

use super::channel::{
    CHANGE_LANGUAGE_REQUEST,
    ChangeLanguageRequest,
    READ_FILE_REQUEST,
    READ_FILE_RESPONSE,
    WRITE_FILE_REQUEST,
    WRITE_FILE_RESPONSE,
};
use super::transport::{
    Handler,
    Transport,
};

/// レンダラーが送信できるチャンネル
const SENDABLE: [&str; 2] = [READ_FILE_REQUEST, WRITE_FILE_REQUEST];
/// レンダラーが受信できるチャンネル
const RECEIVABLE: [&str; 2] = [READ_FILE_RESPONSE, WRITE_FILE_RESPONSE];

/// レンダラーのトランスポートの前に置くチャンネル制限
#[derive(Debug, Clone)]
pub struct RendererBridge {
    /// 包んでいるトランスポート
    inner: Arc<dyn Transport>,
}

impl RendererBridge {
    /// `inner` を包む
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }

    /// ホストから言語の切り替えを求められるたびに、言語コードで `handler` を呼ぶ
    pub fn on_language_change<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.on_receive(
            CHANGE_LANGUAGE_REQUEST,
            Arc::new(move |payload| match serde_json::from_value::<ChangeLanguageRequest>(payload) {
                Ok(request) => handler(request.lng),
                Err(e) => tracing::warn!("Malformed language change notification: {}", e),
            }),
        );
    }
}

impl Transport for RendererBridge {
    fn send(&self, channel: &str, payload: Value) {
        if SENDABLE.contains(&channel) {
            self.inner.send(channel, payload);
        } else {
            tracing::warn!(channel, "Renderer may not send on this channel");
        }
    }

    fn on_receive(&self, channel: &str, handler: Handler) {
        if RECEIVABLE.contains(&channel) {
            self.inner.on_receive(channel, handler);
        } else {
            tracing::warn!(channel, "Renderer may not listen on this channel");
        }
    }

    fn remove_handlers(&self, channel: &str) {
        if RECEIVABLE.contains(&channel) {
            self.inner.remove_handlers(channel);
        } else {
            tracing::warn!(channel, "Renderer may not listen on this channel");
        }
    }

    /// このブリッジ経由で登録できるチャンネルのハンドラーだけを解除する
    ///
    /// 包んでいるトランスポートに直接登録されたハンドラーには触れません。
    fn teardown(&self) {
        for channel in RECEIVABLE {
            self.inner.remove_handlers(channel);
        }
        self.inner.remove_handlers(CHANGE_LANGUAGE_REQUEST);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ipc::LocalTransport;

    #[tokio::test]
    async fn only_request_channels_are_forwarded() {
        let (renderer, host) = LocalTransport::pair();
        let bridge = RendererBridge::new(Arc::new(renderer));
        let (tx, mut rx) = mpsc::unbounded_channel();
        for channel in [READ_FILE_REQUEST, "Shell-Exec"] {
            let tx = tx.clone();
            host.on_receive(
                channel,
                Arc::new(move |payload| {
                    let _ = tx.send(payload);
                }),
            );
        }

        bridge.send("Shell-Exec", json!("rm -rf /"));
        bridge.send(READ_FILE_REQUEST, json!("ok"));

        assert_eq!(rx.recv().await.unwrap(), json!("ok"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn language_change_notifications_reach_the_handler() {
        let (renderer, host) = LocalTransport::pair();
        let bridge = RendererBridge::new(Arc::new(renderer));
        let (tx, mut rx) = mpsc::unbounded_channel();
        bridge.on_language_change(move |lng| {
            let _ = tx.send(lng);
        });

        host.send(CHANGE_LANGUAGE_REQUEST, json!({ "lng": "ja" }));

        assert_eq!(rx.recv().await.unwrap(), "ja");
    }

    #[tokio::test]
    async fn teardown_leaves_other_channels_alone() {
        let (renderer, host) = LocalTransport::pair();
        let renderer = Arc::new(renderer);
        let bridge = RendererBridge::new(renderer.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response_tx = tx.clone();
        bridge.on_receive(
            READ_FILE_RESPONSE,
            Arc::new(move |_| {
                let _ = response_tx.send("response");
            }),
        );
        renderer.on_receive(
            "App-Event",
            Arc::new(move |_| {
                let _ = tx.send("app");
            }),
        );

        bridge.teardown();
        host.send(READ_FILE_RESPONSE, json!({}));
        host.send("App-Event", json!({}));

        assert_eq!(rx.recv().await.unwrap(), "app");
        assert!(rx.try_recv().is_err());
    }
}
