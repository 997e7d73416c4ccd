//! レンダラーとホストのプロセス境界をまたぐメッセージング

pub mod bridge;
pub mod channel;
pub mod host;
pub mod local;
pub mod registry;
pub mod stream;
pub mod transport;

pub use bridge::RendererBridge;
pub use channel::IpcError;
pub use host::HostBindings;
pub use local::LocalTransport;
pub use registry::{
    CorrelationId,
    CorrelationRegistry,
};
pub use stream::StreamTransport;
pub use transport::{
    Envelope,
    Handler,
    HandlerTable,
    Transport,
};
