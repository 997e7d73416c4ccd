//! [`FileSystem`] 上の翻訳ファイルストア

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::document::{
    parent_dir,
    parse_document,
    serialize_document,
};
use super::{
    FileSystem,
    ReadError,
    TranslationDocument,
    TranslationStore,
    WriteError,
};

/// [`FileSystem`] を通して翻訳ファイルを読み書きする
#[derive(Debug, Clone)]
pub struct FileStore {
    /// 読み書き先のファイルシステム
    fs: Arc<dyn FileSystem>,
}

impl FileStore {
    /// `fs` を使うストアを作成する
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// ファイルを読み込み、解析する
    async fn read_document(&self, path: &str) -> Result<TranslationDocument, ReadError> {
        let raw = self.fs.read_raw(path).await.map_err(|e| ReadError::from_io(path, e))?;
        parse_document(path, &raw)
    }

    /// 親ディレクトリを作成してから、コンパクトな JSON で書き込む
    async fn write_document(
        &self,
        path: &str,
        document: &TranslationDocument,
    ) -> Result<(), WriteError> {
        if let Some(dir) = parent_dir(path) {
            self.fs.create_dir_all(dir).await.map_err(|e| WriteError::from_io(path, e))?;
        }

        let contents = serialize_document(document)
            .map_err(|e| WriteError::Serialize { path: path.to_string(), message: e.to_string() })?;

        self.fs.write_raw(path, contents).await.map_err(|e| WriteError::from_io(path, e))?;
        tracing::debug!(file = %path, keys = document.len(), "Translation file written");
        Ok(())
    }
}

impl TranslationStore for FileStore {
    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<TranslationDocument, ReadError>> {
        self.read_document(path).boxed()
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        document: &'a TranslationDocument,
    ) -> BoxFuture<'a, Result<(), WriteError>> {
        self.write_document(path, document).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use googletest::prelude::*;
    use serde_json::{
        Value,
        json,
    };

    use super::*;
    use crate::store::MemoryFileSystem;

    fn store_with(fs: &Arc<MemoryFileSystem>) -> FileStore {
        FileStore::new(fs.clone())
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = store_with(&fs);

        let result = store.read("/locales/fr/common.json").await;

        assert!(matches!(result, Err(ReadError::NotFound { path }) if path == "/locales/fr/common.json"));
    }

    #[tokio::test]
    async fn read_invalid_json_is_parse_error() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("/locales/en/common.json", "{ nope");
        let store = store_with(&fs);

        let result = store.read("/locales/en/common.json").await;

        assert!(matches!(result, Err(ReadError::Parse { .. })));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = store_with(&fs);
        let Value::Object(document) = json!({ "greeting": "Hello", "nested": { "a": "A" } }) else {
            unreachable!()
        };

        store.write("/locales/en/common.json", &document).await.unwrap();
        let loaded = store.read("/locales/en/common.json").await.unwrap();

        assert_that!(loaded, eq(&document));
        assert_that!(fs.has_directory("/locales/en"), eq(true));
    }

    #[tokio::test]
    async fn write_with_windows_separators_creates_parent() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = store_with(&fs);

        store.write("C:\\app\\locales\\en\\common.json", &TranslationDocument::new()).await.unwrap();

        assert_that!(fs.has_directory("C:\\app\\locales\\en"), eq(true));
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.set_fail_writes(true);
        let store = store_with(&fs);

        let result = store.write("/locales/en/common.json", &TranslationDocument::new()).await;

        let Err(WriteError::Io { source, .. }) = &result else {
            panic!("expected an I/O error, got {result:?}");
        };
        assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
