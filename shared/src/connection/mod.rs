pub mod ack_manager;
pub mod connection_config;
pub mod connection_event;
pub mod error;
pub mod handshake;
pub mod net_connection;
pub mod network_stats;
pub mod packet_notify;
pub mod packet_type;
pub mod rate;
pub mod standard_header;
