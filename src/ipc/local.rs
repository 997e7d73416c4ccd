//! プロセス内トランスポート
//!
//! 両端が同じプロセスにあり、それぞれが専用の配送タスクを持ちます。
//! ホストをバックエンドと同居させる場合やテストで使います。

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use super::transport::{
    Envelope,
    Handler,
    HandlerTable,
    Transport,
};

/// プロセス内チャンネルペアの片側
#[derive(Debug)]
pub struct LocalTransport {
    /// どちら側か（ログ用）
    side: &'static str,
    /// 受信側のハンドラー
    handlers: Arc<HandlerTable>,
    /// 相手側の受信キュー
    peer: mpsc::UnboundedSender<Envelope>,
}

impl LocalTransport {
    /// 接続済みの両端 `(renderer, host)` を作成する
    ///
    /// tokio ランタイム内で呼び出す必要があります。各端は専用タスクから
    /// 1 件ずつ配送します。
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (to_renderer, renderer_rx) = mpsc::unbounded_channel();
        let (to_host, host_rx) = mpsc::unbounded_channel();

        let renderer = Self::spawn("renderer", to_host, renderer_rx);
        let host = Self::spawn("host", to_renderer, host_rx);
        (renderer, host)
    }

    /// 片側を作成し、配送タスクを起動する
    fn spawn(
        side: &'static str,
        peer: mpsc::UnboundedSender<Envelope>,
        mut inbox: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        let handlers = Arc::new(HandlerTable::new());
        let dispatch_to = Arc::clone(&handlers);
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                tracing::trace!(side, channel = %envelope.channel, "Local message received");
                dispatch_to.dispatch(envelope);
            }
            tracing::debug!(side, "Local transport peer closed");
        });

        Self { side, handlers, peer }
    }
}

impl Transport for LocalTransport {
    fn send(&self, channel: &str, payload: Value) {
        let envelope = Envelope { channel: channel.to_string(), payload };
        if self.peer.send(envelope).is_err() {
            tracing::warn!(side = self.side, channel, "Dropping message, peer is gone");
        }
    }

    fn on_receive(&self, channel: &str, handler: Handler) {
        self.handlers.register(channel, handler);
    }

    fn remove_handlers(&self, channel: &str) {
        self.handlers.remove(channel);
    }

    fn teardown(&self) {
        self.handlers.clear();
    }
}
