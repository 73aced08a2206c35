pub mod chat;
pub mod config;
pub mod detect;
pub mod error;
pub mod intent;
pub mod plants;
pub mod sensor;
pub mod state;

// Re-export main types for convenience
pub use chat::{ChatClient, ChatContext, StreamEnd, StreamSummary};
pub use config::{Config, Settings};
pub use error::{ChatError, ConfigError, SensorError};
pub use intent::Intent;
pub use plants::PlantCard;
pub use sensor::{PollState, SensorPoller, SensorSnapshot};
pub use state::{ChatMessage, ChatRole, Conversation};
