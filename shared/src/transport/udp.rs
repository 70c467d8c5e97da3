use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
};

use log::info;

use wraith_serde::MTU_SIZE_BYTES;

use super::{PacketReceiver, PacketSender, TransportError};

/// Non-blocking UDP socket, split into a sender and a receiver that share
/// the same local port.
pub struct UdpTransport;

impl UdpTransport {
    pub fn listen(
        address: SocketAddr,
    ) -> Result<(UdpPacketSender, UdpPacketReceiver), TransportError> {
        let bind_failed = |error: std::io::Error| TransportError::BindFailed {
            address,
            reason: error.to_string(),
        };
        let socket = UdpSocket::bind(address).map_err(bind_failed)?;
        socket.set_nonblocking(true).map_err(bind_failed)?;
        let receive_socket = socket.try_clone().map_err(bind_failed)?;
        info!("UDP transport listening on {:?}", socket.local_addr().ok());

        Ok((
            UdpPacketSender { socket },
            UdpPacketReceiver {
                socket: receive_socket,
                buffer: vec![0; MTU_SIZE_BYTES],
            },
        ))
    }
}

pub struct UdpPacketSender {
    socket: UdpSocket,
}

impl UdpPacketSender {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

impl PacketSender for UdpPacketSender {
    fn send(&mut self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MTU_SIZE_BYTES {
            return Err(TransportError::PayloadTooLarge {
                bytes: payload.len(),
                max_bytes: MTU_SIZE_BYTES,
            });
        }
        self.socket
            .send_to(payload, address)
            .map(|_| ())
            .map_err(|error| TransportError::SendFailed {
                address: *address,
                bytes: payload.len(),
                reason: error.to_string(),
            })
    }
}

pub struct UdpPacketReceiver {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl PacketReceiver for UdpPacketReceiver {
    fn receive(&mut self) -> Result<Option<(SocketAddr, Vec<u8>)>, TransportError> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((length, address)) => Ok(Some((address, self.buffer[..length].to_vec()))),
            Err(error) if error.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(TransportError::ReceiveFailed {
                reason: error.to_string(),
            }),
        }
    }
}
