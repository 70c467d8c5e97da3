use crate::transport::LinkConditionerConfig;

pub const PING_TIMEOUT_MS: u32 = 4500;
pub const DEFAULT_PING_RETRY_COUNT: u32 = 15;
pub const DEFAULT_WINDOW_SIZE: u16 = 30;
pub const MAX_GHOST_COUNT: u16 = 1 << crate::ghosts::GHOST_ID_BIT_SIZE;

/// Contains Config properties which will be used by a Server or Client
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Packets per second sent towards the accepting side, clamped to 8-32
    pub packet_rate_to_server: u32,
    /// Packets per second sent towards the initiating side, clamped to 1-32
    pub packet_rate_to_client: u32,
    /// Byte budget of a data packet, clamped to 100-450
    pub packet_size: u32,
    /// Silence in milliseconds after which a keep-alive ping is sent
    pub ping_timeout_ms: u32,
    /// Unanswered pings tolerated before the connection times out
    pub ping_retry_count: u32,
    /// Milliseconds between connect request retransmissions
    pub connect_retry_interval_ms: u32,
    /// Connect requests sent before giving up
    pub connect_retry_count: u32,
    /// Data packets that may be in flight before sending pauses
    pub window_size: u16,
    /// Whether repeated strings are replaced by per-connection table indices
    pub translate_strings: bool,
    /// Whether this side may post application events
    pub send_events: bool,
    /// Class group both sides must agree on during the handshake
    pub net_class_group: u8,
    /// CRC of the class data for `net_class_group`, see [`class_crc`]
    pub class_crc: u32,
    /// Ghost slots available on each connection, at most 4096
    pub max_ghost_count: u16,
    /// Simulated loss and latency applied to outgoing packets
    pub link_conditioner: Option<LinkConditionerConfig>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            packet_rate_to_server: 32,
            packet_rate_to_client: 10,
            packet_size: 200,
            ping_timeout_ms: PING_TIMEOUT_MS,
            ping_retry_count: DEFAULT_PING_RETRY_COUNT,
            connect_retry_interval_ms: 2500,
            connect_retry_count: 4,
            window_size: DEFAULT_WINDOW_SIZE,
            translate_strings: true,
            send_events: true,
            net_class_group: 0,
            class_crc: 0,
            max_ghost_count: MAX_GHOST_COUNT,
            link_conditioner: None,
        }
    }
}

impl ConnectionConfig {
    /// Sets the class group and derives the CRC from the given class names
    pub fn with_classes<'a>(
        mut self,
        net_class_group: u8,
        class_names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.net_class_group = net_class_group;
        self.class_crc = class_crc(class_names);
        self
    }

    pub fn with_link_conditioner(mut self, config: LinkConditionerConfig) -> Self {
        self.link_conditioner = Some(config);
        self
    }
}

/// CRC32 over the ordered list of replicated class names. Both peers must
/// produce the same value for the handshake to succeed.
pub fn class_crc<'a>(class_names: impl IntoIterator<Item = &'a str>) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for name in class_names {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}
