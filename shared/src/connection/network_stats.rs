/// Running counters for one connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkStats {
    pub bits_sent: u64,
    pub bits_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Data packets the peer acknowledged
    pub packets_delivered: u64,
    /// Data packets the peer reported lost
    pub packets_dropped: u64,
    /// Ghost creates and updates written into data packets
    pub ghost_updates_written: u64,
    /// Smoothed round trip time in milliseconds
    pub rtt_ms: f32,
}

impl NetworkStats {
    /// Share of resolved data packets that were lost, from 0.0 to 1.0.
    pub fn packet_loss(&self) -> f32 {
        let resolved = self.packets_delivered + self.packets_dropped;
        if resolved == 0 {
            return 0.0;
        }
        self.packets_dropped as f32 / resolved as f32
    }
}
