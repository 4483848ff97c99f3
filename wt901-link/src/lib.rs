pub mod config;
pub mod pump;
pub mod radio;
pub mod session;
pub mod sink;

pub use config::{Config, DeviceConfig, OutputConfig, RadioConfig, SessionConfig};
pub use pump::{NotificationPump, PumpReport};
pub use radio::mock::ScriptedRadio;
pub use radio::sim::SimulatedRadio;
pub use radio::{Event, LinkError, RadioStack};
pub use session::{Session, SessionState, SessionStats};
pub use sink::{ChannelSink, JsonLinesSink, ReadingSink, TracingSink};
