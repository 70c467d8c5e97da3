pub mod connection_string_table;
pub mod net_string;
pub mod string_codec;
