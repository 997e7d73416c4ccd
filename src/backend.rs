//! i18next バックエンド
//!
//! `read` / `create` / `readMulti` を提供し、パステンプレート・ストア・
//! 書き込み集約キューを組み合わせます。

use std::sync::Arc;

use crate::config::{
    BackendOptions,
    ConfigError,
    PathTemplate,
    ValidationError,
};
use crate::error::BackendError;
use crate::ipc::{
    RendererBridge,
    Transport,
};
use crate::queue::{
    WriteQueue,
    WriteTicket,
};
use crate::store::{
    FileStore,
    FileSystem,
    IpcStore,
    TokioFileSystem,
    TranslationDocument,
    TranslationStore,
};

/// `create` に渡す言語（単一または複数）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Languages(Vec<String>);

impl Languages {
    /// 言語コードを順に返す
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for Languages {
    fn from(language: &str) -> Self {
        Self(vec![language.to_string()])
    }
}

impl From<String> for Languages {
    fn from(language: String) -> Self {
        Self(vec![language])
    }
}

impl From<Vec<String>> for Languages {
    fn from(languages: Vec<String>) -> Self {
        Self(languages)
    }
}

impl From<&[&str]> for Languages {
    fn from(languages: &[&str]) -> Self {
        Self(languages.iter().map(|language| (*language).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Languages {
    fn from(languages: [&str; N]) -> Self {
        Self(languages.iter().map(|language| (*language).to_string()).collect())
    }
}

/// ストアの接続先
#[derive(Debug)]
enum StoreKind {
    /// 同一プロセスでファイル I/O を行う
    Local,
    /// トランスポート越しにホストへ依頼する
    Remote(IpcStore),
}

/// i18next バックエンド
pub struct Backend {
    /// 検証済みの設定
    options: BackendOptions,
    /// 読み込み先のテンプレート
    load_path: PathTemplate,
    /// 未翻訳キーの書き込み先のテンプレート
    add_path: PathTemplate,
    /// 読み込みに使うストア（キューと共有）
    store: Arc<dyn TranslationStore>,
    /// 切断処理のための接続種別
    kind: StoreKind,
    /// 書き込み集約キュー
    queue: WriteQueue,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("options", &self.options)
            .field("store", &self.store)
            .field("queue", &"<WriteQueue>")
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// ビルダーを作成する
    #[must_use]
    pub fn builder() -> BackendBuilder {
        BackendBuilder::default()
    }

    /// 有効な設定
    #[must_use]
    pub const fn options(&self) -> &BackendOptions {
        &self.options
    }

    /// 翻訳ファイルを読み込む
    ///
    /// ファイルが存在しない場合は空のドキュメントを返します。
    ///
    /// # Errors
    /// - パスを展開できない場合（言語・名前空間が空）
    /// - 読み込み・パースに失敗した場合
    pub async fn read(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<TranslationDocument, BackendError> {
        let path = self.load_path.render(language, namespace)?;

        match self.store.read(&path).await {
            Ok(document) => {
                tracing::debug!(file = %path, keys = document.len(), "Loaded translations");
                Ok(document)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(file = %path, "No translation file yet, returning empty namespace");
                Ok(TranslationDocument::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 未翻訳キーを各言語の `addPath` に記録するよう予約する
    ///
    /// パスを展開できない言語は警告を出してスキップします。返り値のチケットは
    /// 予約できた言語の分だけ、言語の順に並びます。
    ///
    /// # Panics
    /// tokio ランタイムの外で呼び出した場合
    pub fn create(
        &self,
        languages: impl Into<Languages>,
        namespace: &str,
        key: &str,
        fallback_value: &str,
    ) -> Vec<WriteTicket> {
        let languages = languages.into();
        languages
            .iter()
            .filter_map(|language| match self.add_path.render(language, namespace) {
                Ok(path) => Some(self.queue.enqueue(path, key, fallback_value)),
                Err(e) => {
                    tracing::warn!(
                        language,
                        namespace,
                        key,
                        "Skipping missing key, cannot resolve addPath: {}",
                        e
                    );
                    None
                }
            })
            .collect()
    }

    /// 未対応
    ///
    /// # Errors
    /// 常に [`BackendError::NotImplemented`]
    pub fn read_multi(
        &self,
        _languages: &[&str],
        _namespaces: &[&str],
    ) -> Result<TranslationDocument, BackendError> {
        Err(BackendError::NotImplemented("readMulti"))
    }

    /// 蓄積中の未翻訳キーをすぐに書き込む
    pub async fn flush(&self) {
        self.queue.flush_all().await;
    }

    /// 実行中・蓄積中の書き込みをすべて済ませてから、トランスポートを切断する
    ///
    /// 切断後の `read` / `create` はホストへ送信されず、`Disconnected` で失敗します。
    pub async fn shutdown(&self) {
        self.queue.drain().await;
        if let StoreKind::Remote(store) = &self.kind {
            store.teardown();
        }
        tracing::debug!("Backend shut down");
    }
}

/// [`Backend`] のビルダー
#[derive(Debug, Default)]
pub struct BackendBuilder {
    /// 設定（未指定ならデフォルト）
    options: Option<BackendOptions>,
    /// ホストへのトランスポート
    transport: Option<Arc<dyn Transport>>,
    /// ローカルストアのファイルシステム
    file_system: Option<Arc<dyn FileSystem>>,
    /// トランスポートを必須にするか
    require_transport: bool,
}

impl BackendBuilder {
    /// 設定を指定する（未指定ならデフォルト）
    #[must_use]
    pub fn options(mut self, options: BackendOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// ホストプロセスへのトランスポート
    ///
    /// 指定した場合、ファイル I/O はすべてホストに依頼します。レンダラー側の
    /// チャンネル制限をかけるため [`RendererBridge`] で包みます。
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// ローカルのファイル I/O に使うファイルシステム（既定: [`TokioFileSystem`]）
    #[must_use]
    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    /// サンドボックス内で動作するため、トランスポートを必須にする
    #[must_use]
    pub const fn require_transport(mut self) -> Self {
        self.require_transport = true;
        self
    }

    /// # Errors
    /// - 設定のバリデーションエラー
    /// - `require_transport` 指定時にトランスポートがない
    pub fn build(self) -> Result<Backend, ConfigError> {
        let options = self.options.unwrap_or_default();
        options.validate().map_err(ConfigError::ValidationErrors)?;

        let load_path = parse_template("loadPath", &options.load_path)?;
        let add_path = parse_template("addPath", &options.add_path)?;

        let (store, kind): (Arc<dyn TranslationStore>, StoreKind) = match self.transport {
            Some(transport) => {
                let bridge: Arc<dyn Transport> = Arc::new(RendererBridge::new(transport));
                let remote = IpcStore::new(bridge);
                (Arc::new(remote.clone()), StoreKind::Remote(remote))
            }
            None if self.require_transport => return Err(ConfigError::MissingTransport),
            None => {
                let fs: Arc<dyn FileSystem> = match self.file_system {
                    Some(fs) => fs,
                    None => Arc::new(TokioFileSystem),
                };
                (Arc::new(FileStore::new(fs)), StoreKind::Local)
            }
        };

        let queue = WriteQueue::new(
            Arc::clone(&store),
            options.delay_duration(),
            options.key_separator.clone(),
        );
        tracing::debug!(
            load_path = %options.load_path,
            add_path = %options.add_path,
            delay = options.delay,
            remote = matches!(kind, StoreKind::Remote(_)),
            "Backend initialized"
        );

        Ok(Backend { options, load_path, add_path, store, kind, queue })
    }
}

/// テンプレートを解析し、失敗を設定エラーとして返す
fn parse_template(field: &str, template: &str) -> Result<PathTemplate, ConfigError> {
    PathTemplate::parse(template).map_err(|e| {
        ConfigError::ValidationErrors(vec![ValidationError::new(field, e.to_string())])
    })
}
