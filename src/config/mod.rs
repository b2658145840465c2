pub mod leagues;
pub mod settings;

pub use leagues::{League, LeaguePriorities, UnknownLeague};
pub use settings::{AppConfig, LiveSettings, QueueSettings};
