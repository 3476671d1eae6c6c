pub mod transport;

pub use transport::{
    DEFAULT_FRAME_PORT, Endpoint, FrameSink, RECONNECT_DELAY, TransportClient, TransportConfig,
};
