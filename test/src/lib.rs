pub mod local_socket;
pub mod test_protocol;
pub mod test_world;

pub use helpers::*;
pub use local_socket::LocalNetwork;
pub use test_protocol::{class_names, TestEvent, TestObject, NAME_MASK, X_MASK, Y_MASK};
pub use test_world::TestWorld;
