//! 相関 ID レジストリ
//!
//! 一方向のメッセージチャンネルを要求/応答の組に変換します。要求ごとに新しい
//! [`CorrelationId`] を登録して受信側を受け取り、応答ハンドラーがその ID を解決すると
//! エントリが削除され、値がちょうど 1 回だけ届きます。

use std::collections::HashMap;
use std::fmt;
use std::sync::{
    Mutex,
    PoisonError,
};

use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::oneshot;
use uuid::Uuid;

/// 要求の識別子（RFC 4122 v4 のランダム UUID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// 新しい ID を生成する
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 型 `T` の応答を待っている要求の一覧
pub struct CorrelationRegistry<T> {
    /// ログ出力用の名前
    name: &'static str,
    /// ID ごとの応答の送信側
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<T>>>,
}

impl<T> CorrelationRegistry<T> {
    /// 空のレジストリを作成する
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, pending: Mutex::new(HashMap::new()) }
    }

    /// 一覧のロックを取得する（poison は無視）
    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<T>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 新しい要求を登録する
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending();
        let mut id = CorrelationId::new();
        while pending.contains_key(&id) {
            id = CorrelationId::new();
        }
        pending.insert(id, tx);
        tracing::trace!(registry = self.name, %id, outstanding = pending.len(), "Registered");
        (id, rx)
    }

    /// 要求 `id` に `value` を届ける
    ///
    /// 未知の ID や解決済みの ID の場合は何もせず `false` を返します。
    pub fn resolve(&self, id: &CorrelationId, value: T) -> bool {
        let Some(tx) = self.pending().remove(id) else {
            tracing::debug!(registry = self.name, %id, "Ignoring response for unknown id");
            return false;
        };
        if tx.send(value).is_err() {
            tracing::debug!(registry = self.name, %id, "Requester no longer waiting");
        }
        true
    }

    /// 要求を破棄する（受信側はチャンネルのクローズを受け取る）
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.pending().remove(id).is_some()
    }

    /// すべての要求を破棄し、その件数を返す
    pub fn clear(&self) -> usize {
        let mut pending = self.pending();
        let count = pending.len();
        pending.clear();
        count
    }

    /// 応答待ちの要求数
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    /// 応答待ちの要求がないかどうか
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for CorrelationRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("name", &self.name)
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use googletest::prelude::*;

    use super::*;

    #[tokio::test]
    async fn resolve_delivers_value_once() {
        let registry = CorrelationRegistry::<u32>::new("test");
        let (id, rx) = registry.register();

        assert!(registry.resolve(&id, 7));
        assert!(!registry.resolve(&id, 8));

        assert_eq!(rx.await.unwrap(), 7);
        assert!(registry.is_empty());
    }

    #[googletest::test]
    fn resolve_unknown_id_is_noop() {
        let registry = CorrelationRegistry::<u32>::new("test");
        let (_id, _rx) = registry.register();

        expect_that!(registry.resolve(&CorrelationId::new(), 1), eq(false));
        expect_that!(registry.len(), eq(1));
    }

    #[tokio::test]
    async fn resolve_after_requester_dropped_still_removes_entry() {
        let registry = CorrelationRegistry::<u32>::new("test");
        let (id, rx) = registry.register();
        drop(rx);

        assert!(registry.resolve(&id, 1));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn cancel_and_clear_close_receivers() {
        let registry = CorrelationRegistry::<u32>::new("test");
        let (first, first_rx) = registry.register();
        let (_second, second_rx) = registry.register();

        assert!(registry.cancel(&first));
        assert!(!registry.cancel(&first));
        assert_eq!(registry.clear(), 1);

        assert!(first_rx.await.is_err());
        assert!(second_rx.await.is_err());
    }

    #[googletest::test]
    fn ids_are_unique_v4_uuids() {
        let registry = CorrelationRegistry::<()>::new("test");
        let ids: HashSet<_> = (0..1000).map(|_| registry.register().0).collect();

        expect_that!(ids.len(), eq(1000));
        for id in &ids {
            expect_that!(id.0.get_version_num(), eq(4));
        }
    }
}
