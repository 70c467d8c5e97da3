mod error;
pub mod event_manager;
pub mod net_event;

pub use error::EventError;
