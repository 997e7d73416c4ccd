//! プロセス境界をまたぐメッセージ通信の抽象化

use std::collections::HashMap;
use std::fmt;
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

/// チャンネルにメッセージが届くたびに呼ばれるコールバック
pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// 境界の両側をつなぐ送りっぱなしのメッセージング
///
/// 実装は、同じチャンネルのメッセージを到着順に配送し、同じエンドポイントの
/// ハンドラーを同時に実行しないこと。
pub trait Transport: Send + Sync + fmt::Debug {
    /// `channel` に `payload` を送る（配送保証なし）
    fn send(&self, channel: &str, payload: Value);

    /// `channel` に届くメッセージのハンドラーを登録する
    fn on_receive(&self, channel: &str, handler: Handler);

    /// `channel` のハンドラーをすべて解除する
    fn remove_handlers(&self, channel: &str);

    /// すべてのハンドラーを解除する
    fn teardown(&self);
}

/// エンドポイント間を流れるメッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// チャンネル名
    pub channel: String,
    /// メッセージ本体
    pub payload: Value,
}

/// トランスポート実装が共有するハンドラーテーブル
#[derive(Default)]
pub struct HandlerTable {
    /// チャンネル名 → 登録順のハンドラー
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl HandlerTable {
    /// 空のテーブルを作成する
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラーを追加する
    pub fn register(&self, channel: &str, handler: Handler) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }

    /// メッセージのチャンネルに登録されたハンドラーをすべて呼び出す
    ///
    /// ハンドラーはロックの外で実行されるため、ハンドラー内から登録しても構いません。
    pub fn dispatch(&self, envelope: Envelope) {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.channel)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(channel = %envelope.channel, "No handler for message");
            return;
        }

        let Some((last, rest)) = handlers.split_last() else {
            return;
        };
        for handler in rest {
            handler(envelope.payload.clone());
        }
        last(envelope.payload);
    }

    /// `channel` のハンドラーを解除し、解除した数を返す
    pub fn remove(&self, channel: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel)
            .map_or(0, |handlers| handlers.len())
    }

    /// すべてのハンドラーを解除する
    pub fn clear(&self) {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// `channel` に登録されているハンドラー数
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).get(channel).map_or(0, Vec::len)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut channels: Vec<_> = handlers.keys().collect();
        channels.sort();
        f.debug_struct("HandlerTable").field("channels", &channels).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use googletest::prelude::*;
    use serde_json::json;

    use super::*;

    /// 呼び出し回数を数えるハンドラー
    fn counting_handler(counter: &Arc<AtomicUsize>) -> Handler {
        let counter = counter.clone();
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[googletest::test]
    fn dispatch_reaches_every_handler_of_the_channel() {
        let table = HandlerTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        table.register("a", counting_handler(&hits));
        table.register("a", counting_handler(&hits));
        table.register("b", counting_handler(&hits));

        table.dispatch(Envelope { channel: "a".to_string(), payload: json!({}) });

        expect_that!(hits.load(Ordering::SeqCst), eq(2));
    }

    #[googletest::test]
    fn clear_removes_handlers() {
        let table = HandlerTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        table.register("a", counting_handler(&hits));

        table.clear();
        table.dispatch(Envelope { channel: "a".to_string(), payload: json!(null) });

        expect_that!(hits.load(Ordering::SeqCst), eq(0));
        expect_that!(table.handler_count("a"), eq(0));
    }

    #[googletest::test]
    fn remove_only_affects_one_channel() {
        let table = HandlerTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        table.register("a", counting_handler(&hits));
        table.register("a", counting_handler(&hits));
        table.register("b", counting_handler(&hits));

        expect_that!(table.remove("a"), eq(2));
        table.dispatch(Envelope { channel: "a".to_string(), payload: json!(null) });
        table.dispatch(Envelope { channel: "b".to_string(), payload: json!(null) });

        expect_that!(hits.load(Ordering::SeqCst), eq(1));
        expect_that!(table.handler_count("b"), eq(1));
    }
}
