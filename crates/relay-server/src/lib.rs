pub mod bridge;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::{load_config, ConfigError, OperatorCredentials, RelayConfig};
pub use server::{build_router, AppState, HeartbeatSettings, RelayServer};
pub use shutdown::ShutdownCoordinator;
