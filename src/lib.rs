pub mod config;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod plugin;
pub mod pool;
pub mod refresh;
pub mod zone;

pub use config::SqlConfig;
pub use dns::DNSPacket;
pub use error::{ConfigError, HandlerError, SetupError, StoreError};
pub use plugin::{EndOfChain, Handler, HandlerChain, SqlBackend, SqlPlugin, setup};
