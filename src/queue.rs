//! 書き込み集約キュー
//!
//! 未翻訳キーの書き込みをファイルごとにまとめ、最後の追加から `delay` 経過後に
//! 読み込み → マージ → 書き込みを 1 回だけ行います。
//!
//! # 状態遷移（ファイル単位）
//!
//! - `Idle` → `Accumulating`: 最初の `enqueue` でバッチを作成し、タイマーを起動
//! - `Accumulating` → `Accumulating`: 追加のたびにタイマーを再起動（trailing debounce）
//! - `Accumulating` → `Flushing`: タイマー発火でロックし、更新をスナップショット
//! - `Flushing` → `Idle` / `Accumulating`: ロック中に届いた更新（overflow）があれば
//!   次のバッチとしてタイマーを再起動、なければバッチを破棄

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    Weak,
};
use std::task::{
    Context,
    Poll,
};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{
    Notify,
    oneshot,
};
use tokio::task::JoinHandle;

use crate::error::BackendError;
use crate::store::document::apply_missing_key;
use crate::store::{
    TranslationDocument,
    TranslationStore,
};

/// フラッシュ結果をチケットへ返す送信側
type Responder = oneshot::Sender<Result<(), BackendError>>;

/// キューに積まれた 1 件の更新
#[derive(Debug)]
struct PendingWrite {
    /// 追加するキー
    key: String,
    /// キーに書き込む値
    fallback_value: String,
    /// 完了通知先
    responder: Responder,
}

/// 1 ファイル分のバッチ
#[derive(Debug, Default)]
struct FileBatch {
    /// 次のフラッシュで適用する更新（追加順）
    updates: Vec<PendingWrite>,
    /// フラッシュ中に届いた更新
    overflow: Vec<PendingWrite>,
    /// フラッシュ中かどうか
    locked: bool,
    /// 待機中のデバウンスタイマー
    timer: Option<JoinHandle<()>>,
    /// タイマーの世代。古いタイマーは発火してもフラッシュしない
    generation: u64,
}

/// キューの共有状態（タイマーからは `Weak` で参照）
#[derive(Debug)]
struct Inner {
    /// 読み書き先
    store: Arc<dyn TranslationStore>,
    /// デバウンス時間
    delay: Duration,
    /// ネストしたキーの区切り文字（`None` ならフラット）
    key_separator: Option<String>,
    /// ファイルごとのバッチ
    batches: Mutex<HashMap<String, FileBatch>>,
    /// キュー全体で単調増加する世代カウンター
    ///
    /// バッチを作り直しても古いタイマーの世代と一致しないようにする
    generations: AtomicU64,
    /// フラッシュが終わるたびに通知する
    flushed: Notify,
}

/// 書き込み集約キュー
///
/// バックエンドごとに 1 つ作成します。ドロップすると未フラッシュの更新は破棄され、
/// 対応する [`WriteTicket`] は [`BackendError::Dropped`] で完了します。
#[derive(Debug)]
pub struct WriteQueue {
    /// タイマーと共有する状態
    inner: Arc<Inner>,
}

impl WriteQueue {
    /// `delay` のデバウンスで `store` に書き込むキューを作成する
    #[must_use]
    pub fn new(
        store: Arc<dyn TranslationStore>,
        delay: Duration,
        key_separator: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                delay,
                key_separator,
                batches: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                flushed: Notify::new(),
            }),
        }
    }

    /// `file` に `key` を記録するよう予約する
    ///
    /// 返り値のチケットは、この更新を含むフラッシュが完了すると解決します。
    /// チケットを捨てても書き込みは行われます。
    ///
    /// # Panics
    /// tokio ランタイムの外で呼び出した場合（タイマーを起動できないため）
    pub fn enqueue(
        &self,
        file: impl Into<String>,
        key: impl Into<String>,
        fallback_value: impl Into<String>,
    ) -> WriteTicket {
        let file = file.into();
        let (responder, rx) = oneshot::channel();
        let update = PendingWrite { key: key.into(), fallback_value: fallback_value.into(), responder };

        let mut batches = self.inner.lock_batches();
        let batch = batches.entry(file.clone()).or_default();
        if batch.locked {
            tracing::debug!(file = %file, key = %update.key, "File is being flushed, deferring update");
            batch.overflow.push(update);
        } else {
            tracing::debug!(file = %file, key = %update.key, "Queued missing key");
            batch.updates.push(update);
            self.inner.arm(&file, batch);
        }

        WriteTicket { file, rx }
    }

    /// 蓄積中のバッチをすべて即座にフラッシュし、完了を待つ
    ///
    /// フラッシュ中のファイルはスキップします（その overflow は通常どおり再スケジュールされます）。
    /// 実行中のフラッシュも含めて待つ場合は [`WriteQueue::drain`] を使います。
    pub async fn flush_all(&self) {
        let files: Vec<String> = {
            let mut batches = self.inner.lock_batches();
            batches
                .iter_mut()
                .filter(|(_, batch)| !batch.locked && !batch.updates.is_empty())
                .map(|(file, batch)| {
                    self.inner.disarm(batch);
                    file.clone()
                })
                .collect()
        };

        if files.is_empty() {
            return;
        }
        tracing::debug!(files = files.len(), "Flushing all pending batches");
        futures::future::join_all(files.iter().map(|file| self.inner.flush(file, None))).await;
    }

    /// すべてのバッチが書き込まれるまでフラッシュを繰り返す
    ///
    /// 実行中のフラッシュの完了を待ち、その間に届いた overflow もデバウンスを待たずに
    /// 書き込みます。完了後は [`WriteQueue::pending_files`] が 0 になります。
    pub async fn drain(&self) {
        loop {
            // flush_all 中に終わったフラッシュの通知も取りこぼさない
            let flushed = self.inner.flushed.notified();
            self.flush_all().await;
            let remaining = self.pending_files();
            if remaining == 0 {
                return;
            }
            tracing::debug!(files = remaining, "Waiting for in-flight flushes");
            flushed.await;
        }
    }

    /// バッチが存在するファイル数（蓄積中・フラッシュ中を含む）
    #[must_use]
    pub fn pending_files(&self) -> usize {
        self.inner.lock_batches().len()
    }
}

impl Inner {
    /// バッチのロックを取得する（poison は無視）
    fn lock_batches(&self) -> MutexGuard<'_, HashMap<String, FileBatch>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// デバウンスタイマーを（再）起動する
    ///
    /// タイマーは `Weak` しか持たないため、キューのドロップを妨げません。
    fn arm(self: &Arc<Self>, file: &str, batch: &mut FileBatch) {
        self.disarm(batch);
        let generation = batch.generation;
        let inner: Weak<Self> = Arc::downgrade(self);
        let delay = self.delay;
        let file = file.to_string();

        batch.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.flush(&file, Some(generation)).await;
            }
        }));
    }

    /// `file` のバッチをフラッシュする
    ///
    /// `generation` が指定されていれば、最新のタイマーからの呼び出しの場合のみ実行します。
    async fn flush(self: &Arc<Self>, file: &str, generation: Option<u64>) {
        let updates = {
            let mut batches = self.lock_batches();
            let Some(batch) = batches.get_mut(file) else {
                return;
            };
            if batch.locked
                || batch.updates.is_empty()
                || generation.is_some_and(|generation| generation != batch.generation)
            {
                return;
            }
            batch.locked = true;
            // タイマーからの呼び出しでは実行中のタイマー自身なので abort しない
            if let Some(timer) = batch.timer.take()
                && generation.is_none()
            {
                timer.abort();
            }
            std::mem::take(&mut batch.updates)
        };

        tracing::debug!(file, updates = updates.len(), "Flushing missing keys");
        let result = self.read_merge_write(file, &updates).await;
        match &result {
            Ok(()) => tracing::debug!(file, updates = updates.len(), "Flush complete"),
            Err(e) => tracing::error!(file, updates = updates.len(), "Flush failed: {}", e),
        }

        self.unlock(file);

        for update in updates {
            // 受け取り側がチケットを捨てていても問題ない
            let _ = update.responder.send(result.clone());
        }
    }

    /// ファイルを読み直し、更新をマージして書き込む
    async fn read_merge_write(
        &self,
        file: &str,
        updates: &[PendingWrite],
    ) -> Result<(), BackendError> {
        // 毎回読み直す（外部での編集を尊重する）
        let mut document = match self.store.read(file).await {
            Ok(document) => document,
            Err(e) if e.is_not_found() => {
                tracing::debug!(file, "Translation file does not exist yet, starting empty");
                TranslationDocument::new()
            }
            Err(e) => return Err(e.into()),
        };

        for update in updates {
            apply_missing_key(
                &mut document,
                &update.key,
                &update.fallback_value,
                self.key_separator.as_deref(),
            );
        }

        self.store.write(file, &document).await?;
        Ok(())
    }

    /// ロックを解除し、overflow があれば次のバッチとして再スケジュールする
    fn unlock(self: &Arc<Self>, file: &str) {
        {
            let mut batches = self.lock_batches();
            let Some(batch) = batches.get_mut(file) else {
                return;
            };
            batch.locked = false;

            if batch.overflow.is_empty() {
                batches.remove(file);
            } else {
                batch.updates = std::mem::take(&mut batch.overflow);
                tracing::debug!(file, updates = batch.updates.len(), "Promoting deferred updates");
                self.arm(file, batch);
            }
        }
        self.flushed.notify_waiters();
    }

    /// 待機中のタイマーを無効化し、バッチに新しい世代を割り当てる
    fn disarm(&self, batch: &mut FileBatch) {
        batch.generation = self.generations.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if let Some(timer) = batch.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let batches = self.batches.get_mut().unwrap_or_else(PoisonError::into_inner);
        for batch in batches.values_mut() {
            if let Some(timer) = batch.timer.take() {
                timer.abort();
            }
        }
    }
}

/// 1 件の更新の完了を待つ Future
#[derive(Debug)]
pub struct WriteTicket {
    /// 書き込み先のファイル
    file: String,
    /// フラッシュ結果の受信側
    rx: oneshot::Receiver<Result<(), BackendError>>,
}

impl WriteTicket {
    /// 書き込み先のファイル
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }
}

impl Future for WriteTicket {
    type Output = Result<(), BackendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(BackendError::Dropped { path: self.file.clone() }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
