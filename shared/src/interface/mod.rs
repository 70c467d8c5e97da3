mod net_interface;
mod registry;

pub use net_interface::{NetInterface, MAX_REMOVED_CONNECTIONS};
pub use registry::ConnectionRegistry;
