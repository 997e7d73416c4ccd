//! ファイルアクセスの基本操作

use std::collections::{
    HashMap,
    HashSet,
};
use std::io;
use std::sync::atomic::{
    AtomicBool,
    AtomicUsize,
    Ordering,
};
use std::sync::{
    Mutex,
    PoisonError,
};

use futures::FutureExt;
use futures::future::BoxFuture;

/// ストアが使うバイト単位のファイルアクセス
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// ファイル全体を読み込む
    fn read_raw<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<Vec<u8>>>;

    /// ファイル全体を置き換える
    fn write_raw<'a>(&'a self, path: &'a str, contents: Vec<u8>) -> BoxFuture<'a, io::Result<()>>;

    /// ディレクトリを親も含めて作成する（既に存在していれば成功）
    fn create_dir_all<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<()>>;
}

/// `tokio::fs` を使う実際のファイルシステム
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl FileSystem for TokioFileSystem {
    fn read_raw<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        tokio::fs::read(path).boxed()
    }

    fn write_raw<'a>(&'a self, path: &'a str, contents: Vec<u8>) -> BoxFuture<'a, io::Result<()>> {
        tokio::fs::write(path, contents).boxed()
    }

    fn create_dir_all<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<()>> {
        tokio::fs::create_dir_all(path).boxed()
    }
}

/// パス文字列をキーにしたインメモリのファイルシステム
///
/// ディレクトリは記録するだけで、書き込みには不要です。エラー経路の確認用に
/// 書き込みを失敗させることができます。
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    /// パスごとの内容
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// `create_dir_all` で作成されたディレクトリ
    directories: Mutex<HashSet<String>>,
    /// 書き込みを失敗させるか
    fail_writes: AtomicBool,
    /// 成功した書き込みの回数
    write_count: AtomicUsize,
}

impl MemoryFileSystem {
    /// 空のファイルシステムを作成する
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ファイルを作成または上書きする
    pub fn insert(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), contents.into());
    }

    /// ファイルの現在の内容
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }

    /// `path` に対して `create_dir_all` が呼ばれたかどうか
    #[must_use]
    pub fn has_directory(&self, path: &str) -> bool {
        self.directories.lock().unwrap_or_else(PoisonError::into_inner).contains(path)
    }

    /// 以降の書き込みを `PermissionDenied` で失敗させる
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// これまでに成功した書き込みの回数
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_raw<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        let result = self.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}"))
        });
        futures::future::ready(result).boxed()
    }

    fn write_raw<'a>(&'a self, path: &'a str, contents: Vec<u8>) -> BoxFuture<'a, io::Result<()>> {
        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("read-only: {path}")))
        } else {
            self.insert(path, contents);
            self.write_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        futures::future::ready(result).boxed()
    }

    fn create_dir_all<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<()>> {
        self.directories.lock().unwrap_or_else(PoisonError::into_inner).insert(path.to_string());
        futures::future::ready(Ok(())).boxed()
    }
}
