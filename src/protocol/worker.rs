//! # Packet Worker
//!
//! Stateful converter between raw wire bytes, [`Packet`] values and their
//! serialized form.
//!
//! Every slot-style method clears the last error on entry, records the error
//! on failure and returns `None`. A failure never poisons the worker. The
//! `try_*` forms return the error directly and leave the slot alone.
//!
//! ## Usage
//! ```rust
//! use packetlib::core::header::PacketType;
//! use packetlib::core::serialization::SerializedFormat;
//! use packetlib::protocol::{Packet, PacketWorker};
//!
//! let mut worker = PacketWorker::new(PacketType::NGS, SerializedFormat::JSON);
//! let packet = worker.raw_to_packet(&[8, 0, 0, 0, 3, 4, 0, 0]).unwrap();
//! assert!(matches!(packet, Packet::LoadLevel(_)));
//! assert_eq!(worker.packet_to_ser(&packet).unwrap(), br#"{"LoadLevel":{}}"#);
//! ```

use super::Packet;
use crate::config::WorkerConfig;
use crate::core::header::PacketType;
use crate::core::serialization::{MultiFormat, SerializedFormat};
use crate::error::Result;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Converts between raw, structured and serialized packets
#[derive(Debug, Clone, Default)]
pub struct PacketWorker {
    packet_type: PacketType,
    format: SerializedFormat,
    queue: VecDeque<Packet>,
    last_error: Option<String>,
}

impl PacketWorker {
    pub fn new(packet_type: PacketType, format: SerializedFormat) -> Self {
        Self {
            packet_type,
            format,
            ..Default::default()
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.packet_type, config.serde_format)
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn set_packet_type(&mut self, packet_type: PacketType) {
        self.packet_type = packet_type;
    }

    pub fn serde_format(&self) -> SerializedFormat {
        self.format
    }

    pub fn set_serde_format(&mut self, format: SerializedFormat) {
        self.format = format;
    }

    /// Whether this build can encode `format`
    pub fn serde_supported(format: SerializedFormat) -> bool {
        format.is_supported()
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Hand out the most recent failure once
    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Packets decoded from earlier multi-frame input
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Oldest queued packet
    pub fn next_queued(&mut self) -> Option<Packet> {
        self.queue.pop_front()
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        self.last_error = None;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, packet_type = %self.packet_type, "worker call failed");
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// Decode `data` and return the oldest pending packet.
    ///
    /// Frames from `data` are appended behind packets queued by earlier calls,
    /// so successive calls hand out every frame in arrival order. Empty input
    /// drains the queue and yields [`Packet::None`] once it is empty. Nothing
    /// from `data` is queued when any of its frames fails to decode.
    pub fn try_raw_to_packet(&mut self, data: &[u8]) -> Result<Packet> {
        let packets = Packet::read(data, self.packet_type)?;
        self.queue.extend(packets);
        let first = self.queue.pop_front().unwrap_or_default();
        trace!(packet = first.name(), queued = self.queue.len(), "decoded");
        Ok(first)
    }

    pub fn raw_to_packet(&mut self, data: &[u8]) -> Option<Packet> {
        let result = self.try_raw_to_packet(data);
        self.record(result)
    }

    pub fn try_packet_to_raw(&self, packet: &Packet) -> Result<Vec<u8>> {
        packet.try_write(self.packet_type)
    }

    pub fn packet_to_raw(&mut self, packet: &Packet) -> Option<Vec<u8>> {
        let result = self.try_packet_to_raw(packet);
        self.record(result)
    }

    pub fn try_ser_to_packet(&self, data: &[u8]) -> Result<Packet> {
        Packet::deserialize_format(data, self.format)
    }

    pub fn ser_to_packet(&mut self, data: &[u8]) -> Option<Packet> {
        let result = self.try_ser_to_packet(data);
        self.record(result)
    }

    pub fn try_packet_to_ser(&self, packet: &Packet) -> Result<Vec<u8>> {
        packet.serialize_format(self.format)
    }

    pub fn packet_to_ser(&mut self, packet: &Packet) -> Option<Vec<u8>> {
        let result = self.try_packet_to_ser(packet);
        self.record(result)
    }

    /// Raw bytes straight to serialized form
    pub fn try_parse_packet(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let packet = self.try_raw_to_packet(data)?;
        self.try_packet_to_ser(&packet)
    }

    pub fn parse_packet(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let result = self.try_parse_packet(data);
        self.record(result)
    }

    /// Serialized form straight to raw bytes
    pub fn try_create_packet(&self, data: &[u8]) -> Result<Vec<u8>> {
        let packet = self.try_ser_to_packet(data)?;
        self.try_packet_to_raw(&packet)
    }

    pub fn create_packet(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        let result = self.try_create_packet(data);
        self.record(result)
    }
}
