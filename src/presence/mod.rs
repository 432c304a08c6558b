mod connection;
mod manager;
mod payload;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use connection::{
    close_connection, delay_after_attempt, Backoff, ConnectError, Connector, DEFAULT_MAX_ATTEMPTS,
};
pub use manager::{LoopTiming, PresenceLoop, TickError};
pub use payload::{Activity, DisplayOptions, PresenceText};
pub use traits::{
    ConnectionState, NowPlaying, NowPlayingSource, PresenceTransport, SourceError, TransportError,
    TransportFactory,
};
