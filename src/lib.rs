pub mod config;
pub mod heartbeat;
pub mod listener;
pub mod session;
pub mod timer;

#[cfg(feature = "test-support")]
pub mod testing;

pub use config::MonitorConfig;
pub use heartbeat::HeartbeatMonitor;
pub use listener::{ChannelListener, HeartbeatMonitorListener, MonitorEvent, MonitorEventKind};
pub use session::{DEFAULT_SESSION_ID, SessionId};
