//! バイトストリーム上の改行区切り JSON トランスポート
//!
//! 1 メッセージ = 1 行（`{"channel": "...", "payload": {...}}`）。ホストバイナリは
//! stdin/stdout で、レンダラーは子プロセスのパイプで使います。

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt,
    AsyncRead,
    AsyncWrite,
    AsyncWriteExt,
    BufReader,
};
use tokio::sync::{
    mpsc,
    watch,
};

use super::transport::{
    Envelope,
    Handler,
    HandlerTable,
    Transport,
};

/// [`Envelope`] を JSON Lines として送受信するトランスポート
#[derive(Debug)]
pub struct StreamTransport {
    /// 受信メッセージのハンドラー
    handlers: Arc<HandlerTable>,
    /// 書き込みタスクへの送信キュー
    outgoing: mpsc::UnboundedSender<Envelope>,
    /// 入力が終端に達したら `true`
    closed: watch::Receiver<bool>,
}

impl StreamTransport {
    /// 読み込み・書き込みタスクを起動する（tokio ランタイム内で呼び出すこと）
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handlers = Arc::new(HandlerTable::new());
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);

        tokio::spawn(write_loop(writer, outgoing_rx));

        let dispatch_to = Arc::clone(&handlers);
        tokio::spawn(async move {
            read_loop(reader, &dispatch_to).await;
            let _ = closed_tx.send(true);
        });

        Self { handlers, outgoing, closed }
    }

    /// 入力ストリームが終了すると完了する
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

/// 1 行ずつ読み、ハンドラーに配送する
async fn read_loop<R>(reader: R, handlers: &HandlerTable)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Envelope>(&line) {
                    Ok(envelope) => handlers.dispatch(envelope),
                    Err(e) => tracing::warn!("Ignoring malformed message: {}", e),
                }
            }
            Ok(None) => {
                tracing::debug!("Stream transport reached end of input");
                break;
            }
            Err(e) => {
                tracing::error!("Stream transport read failed: {}", e);
                break;
            }
        }
    }
}

/// 送信キューのメッセージを 1 行ずつ書き出す
async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<Envelope>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outgoing.recv().await {
        let mut line = match serde_json::to_vec(&envelope) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(channel = %envelope.channel, "Failed to serialize message: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = writer.write_all(&line).await {
            tracing::error!("Stream transport write failed: {}", e);
            break;
        }
        if let Err(e) = writer.flush().await {
            tracing::error!("Stream transport flush failed: {}", e);
            break;
        }
    }
}

impl Transport for StreamTransport {
    fn send(&self, channel: &str, payload: Value) {
        let envelope = Envelope { channel: channel.to_string(), payload };
        if self.outgoing.send(envelope).is_err() {
            tracing::warn!(channel, "Dropping message, writer has stopped");
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tokio::io::{
        AsyncReadExt,
        duplex,
    };

    use super::*;

    #[tokio::test]
    async fn outgoing_messages_are_json_lines() {
        let (ours, mut theirs) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StreamTransport::spawn(read_half, write_half);

        transport.send("ReadFile-Request", json!({ "filename": "a.json" }));

        let mut buf = vec![0_u8; 4096];
        let n = theirs.read(&mut buf).await.unwrap();
        let line = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(line.ends_with('\n'));
        let envelope: Envelope = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(envelope.channel, "ReadFile-Request");
        assert_eq!(envelope.payload, json!({ "filename": "a.json" }));
    }

    #[tokio::test]
    async fn incoming_lines_are_dispatched_and_garbage_skipped() {
        let (ours, mut theirs) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StreamTransport::spawn(read_half, write_half);
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.on_receive(
            "ReadFile-Response",
            Arc::new(move |payload| {
                let _ = tx.send(payload);
            }),
        );

        theirs.write_all(b"not json\n\n").await.unwrap();
        theirs
            .write_all(b"{\"channel\":\"ReadFile-Response\",\"payload\":{\"data\":\"{}\"}}\n")
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), json!({ "data": "{}" }));
    }

    #[tokio::test]
    async fn closed_resolves_at_end_of_input() {
        let (ours, theirs) = duplex(64);
        let (read_half, write_half) = tokio::io::split(ours);
        let transport = StreamTransport::spawn(read_half, write_half);

        drop(theirs);

        transport.closed().await;
    }
}
