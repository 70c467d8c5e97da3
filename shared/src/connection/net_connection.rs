use std::{collections::VecDeque, io::Write, net::SocketAddr};

use log::{debug, info, trace, warn};

use wraith_serde::{BitReader, BitWrite, BitWriter, Serde, UnsignedVariableInteger};

use crate::{
    connection::{
        ack_manager::AckManager,
        connection_config::ConnectionConfig,
        connection_event::{ConnectionEvent, ConnectionState},
        error::{ConnectionError, HandshakeError, PacketError},
        handshake::{ConnectAccept, ConnectReject, ConnectRequest, Disconnect},
        network_stats::NetworkStats,
        packet_notify::{PacketNotify, PacketNotifyQueue},
        packet_type::PacketType,
        rate::{NetRate, MIN_PACKET_SIZE, RATE_FIELD_BITS},
        standard_header::StandardHeader,
    },
    demo::{DemoBlockType, DemoError, DemoPlayer, DemoRecorder},
    events::{
        event_manager::EventManager,
        net_event::{ConnectionMessage, Event, GhostControl, NetEvent},
        EventError,
    },
    ghosts::{
        ghost_receiver::{GhostEvent, GhostReceiver},
        ghost_sender::GhostSender,
        replicate::{GhostSource, Replicate},
    },
    strings::{
        connection_string_table::ConnectionStringTable,
        string_codec::{StringPacker, StringUnpacker},
    },
    transport::{LinkConditioner, PacketSender},
    types::{GhostId, Millis, ObjectId, StateMask},
};

/// Upper bound on the send delay credit carried between packets.
pub const MAX_SEND_DELAY_CREDIT: Millis = 1000;

/// Bits a data packet spends before its event block: the header and both
/// optional rate announcements.
fn data_packet_overhead_bits() -> u32 {
    let header = StandardHeader::new(PacketType::Data, false, 0, 0, 0);
    header.bit_length() + 2 * (1 + 2 * u32::from(RATE_FIELD_BITS))
}

/// One remote peer: handshake, acknowledgments, rate negotiation, events,
/// ghosting and demo recording.
///
/// A connection never touches a socket. Every operation that produces
/// datagrams takes a [`PacketSender`], and received datagrams are handed in
/// through [`NetConnection::process_packet`].
pub struct NetConnection<E, R> {
    config: ConnectionConfig,
    address: SocketAddr,
    state: ConnectionState,
    initiator: bool,
    connect_sequence: u32,
    established: bool,
    peer_ready: bool,

    ack_manager: AckManager,
    notify_queue: PacketNotifyQueue<E>,
    max_rate: NetRate,
    cur_rate: NetRate,
    last_update_time: Millis,
    send_delay_credit: Millis,

    last_ping_time: Millis,
    ping_send_count: u32,
    connect_send_time: Millis,
    connect_send_count: u32,

    strings: ConnectionStringTable,
    events: EventManager<E>,
    ghost_sender: GhostSender,
    ghost_receiver: GhostReceiver<R>,

    incoming_events: VecDeque<E>,
    ghost_events: VecDeque<GhostEvent>,
    connection_events: VecDeque<ConnectionEvent>,

    stats: NetworkStats,
    link_conditioner: Option<LinkConditioner>,
    demo_recorder: Option<DemoRecorder<Box<dyn Write>>>,
    closed_at: Option<Millis>,
}

impl<E: Event, R: Replicate> NetConnection<E, R> {
    /// Connection we initiate. The first connect request goes out on the
    /// next [`NetConnection::tick`].
    pub fn connect(
        config: ConnectionConfig,
        address: SocketAddr,
        connect_sequence: u32,
        now: Millis,
    ) -> Self {
        let mut connection = Self::new(config, address, connect_sequence, true, now);
        connection.state = ConnectionState::Connecting;
        connection
    }

    /// Connection created for a peer whose connect request passed
    /// validation. It is established right away.
    pub fn accept(
        config: ConnectionConfig,
        address: SocketAddr,
        connect_sequence: u32,
        now: Millis,
    ) -> Self {
        let mut connection = Self::new(config, address, connect_sequence, false, now);
        connection.set_established();
        connection
    }

    fn new(
        config: ConnectionConfig,
        address: SocketAddr,
        connect_sequence: u32,
        initiator: bool,
        now: Millis,
    ) -> Self {
        let max_rate = Self::local_max_rate(&config, initiator);
        let cur_rate = NetRate {
            changed: false,
            ..max_rate
        };

        Self {
            address,
            state: ConnectionState::NotConnected,
            initiator,
            connect_sequence,
            established: false,
            peer_ready: initiator,

            ack_manager: AckManager::new(config.window_size),
            notify_queue: PacketNotifyQueue::new(),
            max_rate,
            cur_rate,
            last_update_time: now,
            send_delay_credit: 0,

            last_ping_time: now,
            ping_send_count: 0,
            connect_send_time: now,
            connect_send_count: 0,

            strings: ConnectionStringTable::new(),
            events: EventManager::new(),
            ghost_sender: GhostSender::new(config.max_ghost_count),
            ghost_receiver: GhostReceiver::new(),

            incoming_events: VecDeque::new(),
            ghost_events: VecDeque::new(),
            connection_events: VecDeque::new(),

            stats: NetworkStats::default(),
            link_conditioner: config.link_conditioner.clone().map(LinkConditioner::new),
            demo_recorder: None,
            closed_at: None,
            config,
        }
    }

    /// The rate we are willing to receive at. The initiator receives what
    /// the config calls "to client" traffic.
    fn local_max_rate(config: &ConnectionConfig, initiator: bool) -> NetRate {
        let mut rate = if initiator {
            NetRate::from_config(config.packet_rate_to_client, config.packet_size, false)
        } else {
            NetRate::from_config(config.packet_rate_to_server, config.packet_size, true)
        };
        rate.changed = true;
        rate
    }

    fn set_established(&mut self) {
        self.established = true;
        self.state = ConnectionState::Connected;
        self.connection_events.push_back(ConnectionEvent::Connected);
        info!(
            "connection to {} established, connect sequence {}",
            self.address, self.connect_sequence
        );
    }

    // Accessors

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// When the connection entered its terminal state, if it has.
    pub fn closed_at(&self) -> Option<Millis> {
        self.closed_at
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn connect_sequence(&self) -> u32 {
        self.connect_sequence
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Smoothed round trip time in milliseconds.
    pub fn rtt(&self) -> f32 {
        self.notify_queue.rtt()
    }

    /// Rate both directions currently send at.
    pub fn cur_rate(&self) -> &NetRate {
        &self.cur_rate
    }

    pub fn max_rate(&self) -> &NetRate {
        &self.max_rate
    }

    pub fn packets_in_flight(&self) -> usize {
        self.notify_queue.len()
    }

    pub fn last_acked_event_seq(&self) -> Option<u32> {
        self.events.last_acked_event_seq()
    }

    pub fn string_table(&self) -> &ConnectionStringTable {
        &self.strings
    }

    fn parity(&self) -> bool {
        self.connect_sequence & 1 == 1
    }

    // Settings

    pub fn set_translate_strings(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        self.check_not_established("translate_strings")?;
        self.config.translate_strings = enabled;
        Ok(())
    }

    pub fn set_send_events(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        self.check_not_established("send_events")?;
        self.config.send_events = enabled;
        Ok(())
    }

    pub fn set_net_class_group(
        &mut self,
        net_class_group: u8,
        class_crc: u32,
    ) -> Result<(), ConnectionError> {
        self.check_not_established("net_class_group")?;
        self.config.net_class_group = net_class_group;
        self.config.class_crc = class_crc;
        Ok(())
    }

    fn check_not_established(&self, setting: &'static str) -> Result<(), ConnectionError> {
        if self.established {
            return Err(ConnectionError::AlreadyEstablished { setting });
        }
        Ok(())
    }

    /// Changes the rate we are willing to receive at. A new maximum is
    /// announced to the peer and renegotiated.
    pub fn set_max_rate(&mut self, packet_rate: u32, packet_size: u32) {
        let to_server = !self.initiator;
        let rate = NetRate::from_config(packet_rate, packet_size, to_server);
        if rate.same_values(&self.max_rate) {
            return;
        }
        debug!(
            "max rate for {} now {}ms / {} bytes",
            self.address, rate.update_delay, rate.packet_size
        );
        self.max_rate = NetRate {
            changed: true,
            ..rate
        };
    }

    // Events

    /// Queues an application event for the peer.
    pub fn post_event(&mut self, event: E) -> Result<(), ConnectionError> {
        if !self.config.send_events {
            return Err(EventError::EventsDisabled.into());
        }

        let event = NetEvent::Application(event);
        let max_bits = Self::max_event_bits();
        let mut strings = self.string_packer();
        let result = EventManager::check_event_size(&event, &mut strings, max_bits);
        self.queue_string_announcements();
        if let Err(error) = result {
            warn!("event for {} dropped: {}", self.address, error);
            return Err(error.into());
        }

        self.events.post_event(event);
        Ok(())
    }

    /// Interns a tagged string ahead of its first use, so the peer learns
    /// the mapping early.
    pub fn validate_send_string(&mut self, value: &str) {
        self.string_packer().validate_send_string(value);
        self.queue_string_announcements();
    }

    /// Event budget of the smallest packet the rate negotiation can settle
    /// on, minus the ghost block terminator. An event passing this check
    /// fits into every data packet.
    fn max_event_bits() -> u32 {
        MIN_PACKET_SIZE * 8 - data_packet_overhead_bits() - 1
    }

    fn string_packer(&mut self) -> StringPacker<'_> {
        StringPacker::new(self.config.translate_strings.then_some(&mut self.strings))
    }

    fn queue_string_announcements(&mut self) {
        for (index, string) in self.strings.take_announcements() {
            trace!("announcing string slot {} to {}", index, self.address);
            self.events
                .post_event(NetEvent::StringMapping { index, string });
        }
    }

    pub fn take_events(&mut self) -> Vec<E> {
        self.incoming_events.drain(..).collect()
    }

    pub fn take_ghost_events(&mut self) -> Vec<GhostEvent> {
        self.ghost_events.drain(..).collect()
    }

    pub fn take_connection_events(&mut self) -> Vec<ConnectionEvent> {
        self.connection_events.drain(..).collect()
    }

    // Ghosting

    /// Starts ghosting objects to the peer. Ghosts flow once the peer
    /// answers that it is ready.
    pub fn activate_ghosting(&mut self) -> Result<(), ConnectionError> {
        if !self.established {
            return Err(ConnectionError::NotEstablished);
        }
        let message = self.ghost_sender.activate();
        info!(
            "activating ghosting to {}, sequence {}",
            self.address, message.sequence
        );
        self.events.post_event(NetEvent::ConnectionMessage(message));
        Ok(())
    }

    /// Drops every ghost on both sides.
    pub fn reset_ghosting(&mut self) -> Result<(), ConnectionError> {
        if !self.established {
            return Err(ConnectionError::NotEstablished);
        }
        let message = self.ghost_sender.reset();
        info!("resetting ghosting to {}", self.address);
        self.events.post_event(NetEvent::ConnectionMessage(message));
        Ok(())
    }

    pub fn is_ghosting(&self) -> bool {
        self.ghost_sender.is_ghosting()
    }

    /// Object whose point of view decides what is in scope.
    pub fn set_scope_object(&mut self, object: Option<ObjectId>) {
        self.ghost_sender.set_scope_object(object);
    }

    /// Scope-always objects are ghosted regardless of the scope query and
    /// never evicted.
    pub fn set_scope_always(&mut self, object: ObjectId, always: bool) {
        self.ghost_sender.set_scope_always(object, always);
    }

    /// Marks state bits of an object dirty.
    pub fn object_changed(&mut self, object: ObjectId, mask: StateMask) {
        self.ghost_sender.object_changed(object, mask);
    }

    /// Our ghost id for a local object, if it is ghosted to the peer.
    pub fn ghost_id(&self, object: ObjectId) -> Option<GhostId> {
        self.ghost_sender.ghost_id(object)
    }

    pub fn ghost_sender(&self) -> &GhostSender {
        &self.ghost_sender
    }

    /// Replica of an object the peer ghosts to us.
    pub fn ghost(&self, id: GhostId) -> Option<&R> {
        self.ghost_receiver.ghost(id)
    }

    pub fn ghost_count(&self) -> usize {
        self.ghost_receiver.ghost_count()
    }

    pub fn ghost_receiver(&self) -> &GhostReceiver<R> {
        &self.ghost_receiver
    }

    // Tick

    /// Drives retries, timeouts and packet sending. Once the connection is
    /// in a terminal state this only flushes delayed packets.
    pub fn tick(
        &mut self,
        now: Millis,
        sender: &mut dyn PacketSender,
        source: &dyn GhostSource<R>,
    ) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connecting => self.check_connect_retry(now, sender)?,
            ConnectionState::Connected => {
                if self.check_timeout(now, sender)? {
                    info!("connection to {} timed out", self.address);
                    self.close(now, ConnectionState::TimedOut);
                    self.connection_events.push_back(ConnectionEvent::TimedOut);
                } else {
                    self.check_packet_send(now, false, sender, source)?;
                }
            }
            _ => {}
        }
        self.flush_link_conditioner(now, sender)
    }

    fn check_connect_retry(
        &mut self,
        now: Millis,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        if self.connect_send_count > 0
            && now.wrapping_sub(self.connect_send_time) < self.config.connect_retry_interval_ms
        {
            return Ok(());
        }
        if self.connect_send_count >= self.config.connect_retry_count {
            info!("connect to {} timed out", self.address);
            self.close(now, ConnectionState::TimedOut);
            self.connection_events
                .push_back(ConnectionEvent::ConnectTimedOut);
            return Ok(());
        }

        self.connect_send_count += 1;
        self.connect_send_time = now;
        debug!(
            "sending connect request {} to {}",
            self.connect_send_count, self.address
        );
        let request = ConnectRequest {
            connect_sequence: self.connect_sequence,
            net_class_group: self.config.net_class_group,
            class_crc: self.config.class_crc,
        };
        self.send_handshake_packet(now, PacketType::ConnectRequest, &request, sender)
    }

    /// Returns true once the peer has been silent for longer than the ping
    /// timeout after every retry ping was spent. Otherwise pings the peer
    /// whenever a timeout period passes without traffic.
    pub fn check_timeout(
        &mut self,
        now: Millis,
        sender: &mut dyn PacketSender,
    ) -> Result<bool, ConnectionError> {
        if now.wrapping_sub(self.last_ping_time) <= self.config.ping_timeout_ms {
            return Ok(false);
        }
        if self.ping_send_count >= self.config.ping_retry_count {
            return Ok(true);
        }
        self.last_ping_time = now;
        self.ping_send_count += 1;
        trace!(
            "pinging {} ({} of {})",
            self.address,
            self.ping_send_count,
            self.config.ping_retry_count
        );
        self.send_header_only(now, PacketType::Ping, sender)?;
        Ok(false)
    }

    fn keep_alive(&mut self, now: Millis) {
        self.last_ping_time = now;
        self.ping_send_count = 0;
    }

    /// Sends a data packet if the negotiated rate allows one now, or
    /// unconditionally when `force` is set. Returns true if a data packet
    /// went out.
    ///
    /// While the reliability window is full no data is sent, only an ack
    /// when the peer is owed one.
    pub fn check_packet_send(
        &mut self,
        now: Millis,
        force: bool,
        sender: &mut dyn PacketSender,
        source: &dyn GhostSource<R>,
    ) -> Result<bool, ConnectionError> {
        // the acceptor waits for the initiator's first packet, which proves
        // the accept arrived and the initiator can take our data
        if !self.established || !self.peer_ready {
            return Ok(false);
        }

        if !force {
            let due = self
                .last_update_time
                .saturating_add(self.cur_rate.update_delay)
                .saturating_sub(self.send_delay_credit);
            if now < due {
                return Ok(false);
            }
            self.send_delay_credit = (now - due).min(MAX_SEND_DELAY_CREDIT);
            self.record_demo_block(DemoBlockType::SendPacket, &[]);
        }

        if self.ack_manager.window_full() {
            if self.ack_manager.ack_owed() {
                self.send_header_only(now, PacketType::Ack, sender)?;
            }
            return Ok(false);
        }

        self.last_update_time = now;
        let bytes = self.write_data_packet(now, source);
        self.send_datagram(now, bytes, sender)?;
        Ok(true)
    }

    fn write_data_packet(&mut self, now: Millis, source: &dyn GhostSource<R>) -> Vec<u8> {
        let mut writer = BitWriter::with_max_bytes(self.cur_rate.packet_size as usize);
        let parity = self.parity();
        self.ack_manager
            .next_outgoing_packet_header(PacketType::Data, parity)
            .ser(&mut writer);

        let mut notify = PacketNotify::new(now);

        notify.rate_changed = self.cur_rate.changed;
        writer.write_bit(self.cur_rate.changed);
        if self.cur_rate.changed {
            self.cur_rate.write_fields(&mut writer);
            self.cur_rate.changed = false;
        }

        notify.max_rate_changed = self.max_rate.changed;
        writer.write_bit(self.max_rate.changed);
        if self.max_rate.changed {
            self.max_rate.write_fields(&mut writer);
            self.max_rate.changed = false;
        }

        let mut strings =
            StringPacker::new(self.config.translate_strings.then_some(&mut self.strings));

        // ghost block terminator
        writer.reserve_bits(1);
        notify.events = self.events.write_packet(&mut writer, &mut strings);
        writer.release_bits(1);
        notify.ghosts = self
            .ghost_sender
            .write_packet::<R, _>(&mut writer, &mut strings, source);

        self.stats.ghost_updates_written += notify.ghosts.update_count() as u64;
        trace!(
            "data packet to {}: {} bits, {} events, {} ghost entries",
            self.address,
            writer.bits_written(),
            notify.events.len(),
            notify.ghosts.entries.len()
        );
        self.notify_queue.allocate(notify);
        self.queue_string_announcements();

        writer.to_bytes()
    }

    fn send_header_only(
        &mut self,
        now: Millis,
        packet_type: PacketType,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        let mut writer = BitWriter::new();
        let parity = self.parity();
        self.ack_manager
            .next_outgoing_packet_header(packet_type, parity)
            .ser(&mut writer);
        self.send_datagram(now, writer.to_bytes(), sender)
    }

    fn send_handshake_packet(
        &mut self,
        now: Millis,
        packet_type: PacketType,
        payload: &impl Serde,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        let mut writer = BitWriter::new();
        StandardHeader::handshake(packet_type).ser(&mut writer);
        payload.ser(&mut writer);
        self.send_datagram(now, writer.to_bytes(), sender)
    }

    fn send_datagram(
        &mut self,
        now: Millis,
        bytes: Vec<u8>,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        self.stats.packets_sent += 1;
        self.stats.bits_sent += (bytes.len() * 8) as u64;
        match self.link_conditioner.as_mut() {
            Some(conditioner) => {
                conditioner.condition(now, self.address, bytes);
                Ok(())
            }
            None => Ok(sender.send(&self.address, &bytes)?),
        }
    }

    fn flush_link_conditioner(
        &mut self,
        now: Millis,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        let Some(conditioner) = self.link_conditioner.as_mut() else {
            return Ok(());
        };
        while let Some((address, bytes)) = conditioner.pop_ready(now) {
            sender.send(&address, &bytes)?;
        }
        Ok(())
    }

    /// Tells the peer we are leaving. No event is raised locally.
    pub fn disconnect(
        &mut self,
        now: Millis,
        reason: &str,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        info!("disconnecting from {} at {}ms: {}", self.address, now, reason);
        let was_established = self.established;
        self.close(now, ConnectionState::Disconnected);
        if !was_established {
            return Ok(());
        }

        let mut writer = BitWriter::new();
        let parity = self.parity();
        self.ack_manager
            .next_outgoing_packet_header(PacketType::Disconnect, parity)
            .ser(&mut writer);
        Disconnect {
            reason: reason.to_string(),
        }
        .ser(&mut writer);
        // bypasses the link conditioner, the connection is about to go away
        let bytes = writer.to_bytes();
        self.stats.packets_sent += 1;
        self.stats.bits_sent += (bytes.len() * 8) as u64;
        Ok(sender.send(&self.address, &bytes)?)
    }

    fn close(&mut self, now: Millis, state: ConnectionState) {
        self.state = state;
        self.closed_at = Some(now);
    }

    // Incoming

    /// Handles one datagram from the peer.
    ///
    /// A packet failing validation is dropped with an error and leaves the
    /// connection untouched. If a data packet's body fails to decode after
    /// its header was accepted, the packet still counts as received and
    /// whatever was read before the failure stays applied.
    pub fn process_packet(
        &mut self,
        now: Millis,
        payload: &[u8],
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        self.record_demo_block(DemoBlockType::Packet, payload);
        self.stats.packets_received += 1;
        self.stats.bits_received += (payload.len() * 8) as u64;

        let mut reader = BitReader::new(payload);
        let header =
            StandardHeader::de(&mut reader).map_err(|_| PacketError::MalformedHeader)?;
        let packet_type = header.packet_type();

        match packet_type {
            PacketType::ConnectRequest => {
                return self.handle_connect_request(now, &mut reader, sender)
            }
            PacketType::ConnectAccept => return self.handle_connect_accept(now, &mut reader),
            PacketType::ConnectReject => return self.handle_connect_reject(now, &mut reader),
            _ => {}
        }

        if !self.established || self.state != ConnectionState::Connected {
            return Err(PacketError::UnexpectedPacketType {
                packet_type: packet_type.name(),
            }
            .into());
        }
        if header.connect_sequence_parity() != self.parity() {
            return Err(PacketError::StaleConnectSequence.into());
        }

        if packet_type == PacketType::Disconnect {
            let disconnect = Disconnect::de(&mut reader)?;
            info!("{} disconnected: {}", self.address, disconnect.reason);
            self.close(now, ConnectionState::Disconnected);
            self.connection_events
                .push_back(ConnectionEvent::Disconnected {
                    reason: disconnect.reason,
                });
            return Ok(());
        }

        let report = self.ack_manager.process_incoming_header(&header)?;
        self.keep_alive(now);
        self.peer_ready = true;
        for delivered in report.notifications {
            self.handle_notify(now, delivered);
        }

        match packet_type {
            PacketType::Ping => self.send_header_only(now, PacketType::Ack, sender)?,
            PacketType::Data if report.accepted => self.read_data_packet(&mut reader)?,
            _ => {}
        }
        Ok(())
    }

    fn handle_connect_request(
        &mut self,
        now: Millis,
        reader: &mut BitReader,
        sender: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        let request = ConnectRequest::de(reader).map_err(|_| HandshakeError::MalformedRequest)?;
        if self.initiator {
            return Err(PacketError::UnexpectedPacketType {
                packet_type: PacketType::ConnectRequest.name(),
            }
            .into());
        }
        if request.connect_sequence != self.connect_sequence {
            return Err(PacketError::StaleConnectSequence.into());
        }
        // our accept was lost, answer again
        let accept = ConnectAccept {
            connect_sequence: self.connect_sequence,
        };
        self.send_handshake_packet(now, PacketType::ConnectAccept, &accept, sender)
    }

    fn handle_connect_accept(
        &mut self,
        now: Millis,
        reader: &mut BitReader,
    ) -> Result<(), ConnectionError> {
        let accept = ConnectAccept::de(reader)?;
        if !self.initiator || accept.connect_sequence != self.connect_sequence {
            return Err(PacketError::StaleConnectSequence.into());
        }
        if self.state == ConnectionState::Connecting {
            self.keep_alive(now);
            self.set_established();
        }
        Ok(())
    }

    fn handle_connect_reject(
        &mut self,
        now: Millis,
        reader: &mut BitReader,
    ) -> Result<(), ConnectionError> {
        let reject = ConnectReject::de(reader)?;
        if self.state != ConnectionState::Connecting
            || reject.connect_sequence != self.connect_sequence
        {
            return Err(PacketError::StaleConnectSequence.into());
        }
        warn!("connection to {} rejected: {}", self.address, reject.reason);
        self.close(now, ConnectionState::ConnectRejected);
        self.connection_events
            .push_back(ConnectionEvent::ConnectionRejected {
                reason: reject.reason,
            });
        Ok(())
    }

    fn read_data_packet(&mut self, reader: &mut BitReader) -> Result<(), ConnectionError> {
        if bool::de(reader)? {
            let rate = NetRate::read_fields(reader)?;
            if !rate.same_values(&self.cur_rate) {
                debug!(
                    "{} set rate to {}ms / {} bytes",
                    self.address, rate.update_delay, rate.packet_size
                );
            }
            self.cur_rate = rate;
        }
        if bool::de(reader)? {
            let remote_max = NetRate::read_fields(reader)?;
            let negotiated = NetRate::negotiate(&self.max_rate, &remote_max);
            if !negotiated.same_values(&self.cur_rate) {
                self.cur_rate = NetRate {
                    changed: true,
                    ..negotiated
                };
            }
        }

        let mut delivered = Vec::new();
        let read = self.events.read_packet(reader, &mut self.strings, &mut delivered);
        for event in delivered {
            self.dispatch_event(event);
        }
        read?;

        let unpacker = StringUnpacker::new(Some(&self.strings));
        let mut ghost_events = Vec::new();
        let read = self
            .ghost_receiver
            .read_packet(reader, &unpacker, &mut ghost_events);
        self.ghost_events.extend(ghost_events);
        Ok(read?)
    }

    fn dispatch_event(&mut self, event: NetEvent<E>) {
        match event {
            NetEvent::Application(event) => self.incoming_events.push_back(event),
            NetEvent::ConnectionMessage(message) => self.handle_connection_message(message),
            NetEvent::StringMapping { .. } => {}
        }
    }

    fn handle_connection_message(&mut self, message: ConnectionMessage) {
        match message.message {
            GhostControl::StartGhosting => {
                let deleted = self.ghost_receiver.start_ghosting(message.sequence);
                self.ghost_events.extend(deleted);
                self.events
                    .post_event(NetEvent::ConnectionMessage(ConnectionMessage {
                        message: GhostControl::ReadyForGhosts,
                        sequence: message.sequence,
                        ghost_count: 0,
                    }));
            }
            GhostControl::ReadyForGhosts => {
                self.ghost_sender.ready_for_ghosts(message.sequence);
            }
            GhostControl::EndGhosting => {
                let deleted = self.ghost_receiver.end_ghosting();
                self.ghost_events.extend(deleted);
            }
        }
    }

    /// Resolves the oldest outstanding data packet.
    fn handle_notify(&mut self, now: Millis, delivered: bool) {
        let Some(notify) = self.notify_queue.consume_head(now, delivered) else {
            debug_assert!(false, "notification without an outstanding packet");
            return;
        };

        if delivered {
            self.stats.packets_delivered += 1;
            self.events.packet_received(notify.events, &mut self.strings);
            self.ghost_sender.packet_received(notify.ghosts);
        } else {
            self.stats.packets_dropped += 1;
            trace!("packet to {} dropped", self.address);
            if notify.rate_changed {
                self.cur_rate.changed = true;
            }
            if notify.max_rate_changed {
                self.max_rate.changed = true;
            }
            self.events.packet_dropped(notify.events, &self.strings);
            self.ghost_sender
                .packet_dropped(notify.ghosts, self.notify_queue.iter().map(|n| &n.ghosts));
        }
        self.stats.rtt_ms = self.notify_queue.rtt();
    }

    /// Tears the connection down before it leaves its registry: every
    /// outstanding packet counts as dropped, then events and ghosts are
    /// released.
    pub fn on_remove(&mut self, now: Millis) {
        while !self.notify_queue.is_empty() {
            self.handle_notify(now, false);
        }
        self.events.clear();
        self.ghost_sender.clear();
        let deleted = self.ghost_receiver.clear();
        self.ghost_events.extend(deleted);
        self.established = false;
        debug!("connection to {} removed", self.address);
    }

    // Demo

    /// Starts recording every received packet and send decision. The
    /// current connection state goes first as the start block.
    pub fn start_demo_recording(&mut self, writer: Box<dyn Write>) -> Result<(), ConnectionError> {
        let mut start_block = BitWriter::with_max_bits(u32::MAX);
        self.write_demo_start_block(&mut start_block);
        let recorder = DemoRecorder::start(writer, &start_block.to_bytes())?;
        info!("recording demo of {}", self.address);
        self.demo_recorder = Some(recorder);
        Ok(())
    }

    /// Stops recording and hands the writer back.
    pub fn stop_demo_recording(&mut self) -> Result<Option<Box<dyn Write>>, ConnectionError> {
        let Some(recorder) = self.demo_recorder.take() else {
            return Ok(None);
        };
        info!(
            "demo of {} stopped after {} blocks",
            self.address,
            recorder.blocks_written()
        );
        Ok(Some(recorder.finish()?))
    }

    pub fn is_recording_demo(&self) -> bool {
        self.demo_recorder.is_some()
    }

    fn record_demo_block(&mut self, block_type: DemoBlockType, payload: &[u8]) {
        let Some(recorder) = self.demo_recorder.as_mut() else {
            return;
        };
        if let Err(error) = recorder.write_block(block_type, payload) {
            warn!("demo recording of {} stopped: {}", self.address, error);
            self.demo_recorder = None;
        }
    }

    fn write_demo_start_block(&self, writer: &mut dyn BitWrite) {
        self.connect_sequence.ser(writer);
        self.initiator.ser(writer);
        self.notify_queue.rtt().to_bits().ser(writer);
        self.stats.packet_loss().to_bits().ser(writer);
        self.cur_rate.write_fields(writer);
        self.max_rate.write_fields(writer);
        self.strings.write_start_block(writer);
        self.ack_manager.write_start_block(writer);
        UnsignedVariableInteger::<7>::new(self.notify_queue.len() as i64).ser(writer);
        self.events.write_start_block(writer);
        self.ghost_receiver.write_start_block(writer);
    }

    /// Rebuilds a connection from a demo start block. It behaves as an
    /// established connection whose outgoing packets go nowhere.
    pub fn from_demo(
        config: ConnectionConfig,
        address: SocketAddr,
        start_block: &[u8],
        now: Millis,
    ) -> Result<Self, ConnectionError> {
        let mut reader = BitReader::new(start_block);
        let connect_sequence = u32::de(&mut reader).map_err(|_| DemoError::MalformedStartBlock)?;
        let initiator = bool::de(&mut reader).map_err(|_| DemoError::MalformedStartBlock)?;

        let mut connection = Self::new(config, address, connect_sequence, initiator, now);
        connection.established = true;
        connection.peer_ready = true;
        connection.state = ConnectionState::Connected;
        connection
            .read_demo_start_block(&mut reader)
            .map_err(|_| DemoError::MalformedStartBlock)?;
        Ok(connection)
    }

    fn read_demo_start_block(&mut self, reader: &mut BitReader) -> Result<(), ConnectionError> {
        self.notify_queue.set_rtt(f32::from_bits(u32::de(reader)?));
        self.stats.rtt_ms = self.notify_queue.rtt();
        let _packet_loss = f32::from_bits(u32::de(reader)?);
        self.cur_rate = NetRate::read_fields(reader)?;
        self.max_rate = NetRate::read_fields(reader)?;
        self.strings.read_start_block(reader)?;
        self.ack_manager.read_start_block(reader)?;
        let notify_count = UnsignedVariableInteger::<7>::de(reader)?.get();
        for _ in 0..notify_count {
            self.notify_queue.allocate(PacketNotify::new(0));
        }
        self.events.read_start_block(reader)?;
        let created = self.ghost_receiver.read_start_block(reader)?;
        self.ghost_events.extend(created);
        Ok(())
    }

    /// Replays one recorded block. Packets that failed when recorded fail
    /// the same way here and are skipped.
    pub fn play_demo_block(
        &mut self,
        now: Millis,
        block_type: DemoBlockType,
        payload: &[u8],
        sink: &mut dyn PacketSender,
    ) -> Result<(), ConnectionError> {
        match block_type {
            DemoBlockType::Packet => {
                if let Err(error) = self.process_packet(now, payload, sink) {
                    debug!("recorded packet skipped: {}", error);
                }
                Ok(())
            }
            DemoBlockType::SendPacket => {
                self.check_packet_send(now, true, sink, &())?;
                Ok(())
            }
        }
    }

    /// Replays a whole demo into a fresh connection.
    pub fn play_demo(
        config: ConnectionConfig,
        address: SocketAddr,
        player: &mut DemoPlayer,
        now: Millis,
    ) -> Result<Self, ConnectionError> {
        let mut connection = Self::from_demo(config, address, player.start_block(), now)?;
        let mut sink: Vec<(SocketAddr, Vec<u8>)> = Vec::new();
        while let Some((block_type, payload)) = player.next_block()? {
            connection.play_demo_block(now, block_type, payload, &mut sink)?;
            sink.clear();
        }
        Ok(connection)
    }
}
