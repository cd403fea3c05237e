pub mod camera;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod registry;
pub mod state;

#[cfg(feature = "server")]
pub mod app;

#[cfg(feature = "server")]
pub mod relay;

pub use camera::{Camera, ImageSource, StillImage, StreamSession};
pub use config::RelayConfig;
pub use devices::{set_switch, PollableMetric, ToggleableSwitch};
pub use error::{RelayError, Result, StreamError};
pub use events::{EventBus, RelayEvent};
pub use registry::EntityRegistry;
pub use state::{EntityState, StateStore};

#[cfg(feature = "server")]
pub use app::{ComponentState, RelayApp, ShutdownReason};

#[cfg(feature = "server")]
pub use relay::{RelayServer, RelayServerBuilder, StreamStats};
