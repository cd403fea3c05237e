//! HTTP surface: still-image proxy, MJPEG relay and published states.

mod auth;
mod handlers;
pub mod mjpeg;
mod server;
mod stats;
mod stream;

pub use auth::{AUTH_HEADER, AUTH_QUERY_PARAM};
pub use server::{router, RelayServer, RelayServerBuilder, RelayState};
pub use stats::{RelayStats, StreamStats};
pub use stream::mjpeg_stream;
