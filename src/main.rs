//! 特権ホストプロセス
//!
//! サンドボックス化されたレンダラーに対し、stdin/stdout 越しに翻訳ファイルの読み書きを
//! 提供します。stdout はプロトコルに使うため、ログは stderr に出力します。

use std::sync::Arc;

use i18n_fs_backend::ipc::{
    HostBindings,
    StreamTransport,
};
use i18n_fs_backend::store::TokioFileSystem;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
        )
        .init();

    let transport = Arc::new(StreamTransport::spawn(tokio::io::stdin(), tokio::io::stdout()));
    let bindings = HostBindings::bind(transport.clone(), Arc::new(TokioFileSystem));
    tracing::info!("i18n-fs-host ready");

    tokio::select! {
        () = transport.closed() => tracing::info!("Renderer closed the connection"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Interrupted, shutting down"),
            Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
        },
    }

    bindings.clear();
}
