use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use super::endpoint::SendStatus;
use super::protocol::{
    ACK_LIST_TERMINATOR, FIRST_ORDINAL, MAX_ACKS_PER_PACKET, MAX_DATA_HEADER_SIZE,
    PacketKind, PacketOrdinal, ProtocolError, SEND_PACKET_LIMIT,
};
use crate::codec::Packet;

/// Decides whether an unacknowledged packet is sent again.
///
/// Arguments are the number of send passes since the packet was last
/// transmitted, the time since then, and the current mean latency.
pub type RetransmitPredicate = fn(u32, Duration, Duration) -> bool;

pub fn default_retransmit_predicate(
    _cycles_since_last_transmit: u32,
    time_since_last_send: Duration,
    latency: Duration,
) -> bool {
    time_since_last_send >= 2 * latency
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendTag {
    ReadyForSending,
    NotAcknowledged,
    AcknowledgedWeakly,
    AcknowledgedStrongly,
}

#[derive(Debug)]
struct TaggedPacket {
    packet: Packet,
    header_len: usize,
    stopwatch: Instant,
    cycles_since_last_transmit: u32,
    tag: SendTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Already acknowledged earlier; nothing changed.
    Stale,
    Weak,
    Strong { time_to_ack: Duration },
}

/// Outgoing DATA packets, indexed by ordinal from `head`.
///
/// The last packet is always the "next outgoing" one that new data is
/// appended to; it is never sent before the next send pass.
#[derive(Debug)]
pub struct SendBuffer {
    packets: VecDeque<TaggedPacket>,
    head: PacketOrdinal,
    pending_acks: VecDeque<PacketOrdinal>,
    weak_acks: Vec<PacketOrdinal>,
    max_packet_size: usize,
}

impl SendBuffer {
    pub fn new(max_packet_size: usize) -> Self {
        let mut buffer = Self {
            packets: VecDeque::new(),
            head: FIRST_ORDINAL,
            pending_acks: VecDeque::new(),
            weak_acks: Vec::new(),
            max_packet_size,
        };
        buffer.prepare_next_outgoing(PacketKind::Data);
        buffer
    }

    pub fn reset(&mut self) {
        self.packets.clear();
        self.head = FIRST_ORDINAL;
        self.pending_acks.clear();
        self.weak_acks.clear();
        self.prepare_next_outgoing(PacketKind::Data);
    }

    /// Queues an acknowledgement of a received ordinal: weakly in the next
    /// ACKS datagram and strongly in the header of a future DATA packet.
    pub fn push_ack(&mut self, ordinal: PacketOrdinal) {
        self.pending_acks.push_back(ordinal);
        self.weak_acks.push(ordinal);
    }

    pub fn append_data(&mut self, data: &[u8]) {
        let max = self.max_packet_size;
        let tail_len = self.tail().packet.len();

        if tail_len + data.len() <= max {
            self.tail_mut().packet.append_bytes(data);
            return;
        }

        if data.len() + self.next_header_len() <= max {
            self.prepare_next_outgoing(PacketKind::Data);
            self.tail_mut().packet.append_bytes(data);
            return;
        }

        // Fragmented: DATA_MORE ... DATA_MORE DATA_TAIL.
        if tail_len > max / 2 {
            self.prepare_next_outgoing(PacketKind::DataMore);
        } else {
            self.set_tail_kind(PacketKind::DataMore);
        }

        let mut rest = data;
        loop {
            let room = max - self.tail().packet.len();
            let take = room.min(rest.len());
            self.tail_mut().packet.append_bytes(&rest[..take]);
            rest = &rest[take..];

            if rest.is_empty() {
                self.set_tail_kind(PacketKind::DataTail);
                break;
            }
            self.prepare_next_outgoing(PacketKind::DataMore);
        }

        self.prepare_next_outgoing(PacketKind::Data);
    }

    pub fn send<F>(
        &mut self,
        latency: Duration,
        predicate: RetransmitPredicate,
        mut send_fn: F,
    ) -> io::Result<()>
    where
        F: FnMut(&Packet) -> io::Result<SendStatus>,
    {
        let mut limit = SEND_PACKET_LIMIT;

        for tagged in self.packets.iter_mut() {
            if limit == 0 {
                break;
            }

            match tagged.tag {
                SendTag::AcknowledgedWeakly | SendTag::AcknowledgedStrongly => continue,
                SendTag::ReadyForSending => {}
                SendTag::NotAcknowledged => {
                    let since_last = tagged.stopwatch.elapsed();
                    if !predicate(tagged.cycles_since_last_transmit, since_last, latency) {
                        tagged.cycles_since_last_transmit += 1;
                        continue;
                    }
                }
            }

            match send_fn(&tagged.packet)? {
                SendStatus::Sent(_) => {
                    tagged.stopwatch = Instant::now();
                    tagged.cycles_since_last_transmit = 0;
                    tagged.tag = SendTag::NotAcknowledged;
                    limit -= 1;
                }
                SendStatus::NotReady => break,
            }
        }

        if self.tail().tag != SendTag::ReadyForSending {
            self.prepare_next_outgoing(PacketKind::Data);
        }

        Ok(())
    }

    pub fn ack_received(
        &mut self,
        ordinal: PacketOrdinal,
        strong: bool,
    ) -> Result<AckOutcome, ProtocolError> {
        if ordinal < self.head {
            return Ok(AckOutcome::Stale);
        }

        let index = (ordinal - self.head) as usize;
        let Some(tagged) = self.packets.get_mut(index) else {
            return Err(ProtocolError::InvalidAck(ordinal));
        };

        match (tagged.tag, strong) {
            (SendTag::ReadyForSending, _) => return Err(ProtocolError::InvalidAck(ordinal)),
            (SendTag::AcknowledgedStrongly, _) => return Ok(AckOutcome::Stale),
            (SendTag::AcknowledgedWeakly, false) => return Ok(AckOutcome::Stale),
            (SendTag::NotAcknowledged, false) => {
                tagged.tag = SendTag::AcknowledgedWeakly;
                tagged.packet = Packet::new();
                return Ok(AckOutcome::Weak);
            }
            (SendTag::NotAcknowledged | SendTag::AcknowledgedWeakly, true) => {}
        }

        let time_to_ack = tagged.stopwatch.elapsed();
        tagged.tag = SendTag::AcknowledgedStrongly;
        tagged.packet = Packet::new();

        while self
            .packets
            .front()
            .is_some_and(|p| p.tag == SendTag::AcknowledgedStrongly)
        {
            self.packets.pop_front();
            self.head += 1;
        }

        if self.packets.is_empty() {
            self.prepare_next_outgoing(PacketKind::Data);
        }

        Ok(AckOutcome::Strong { time_to_ack })
    }

    /// ACKS datagrams carrying every ordinal received since the last call.
    pub fn take_weak_ack_packets(&mut self) -> Vec<Packet> {
        let per_packet = (self.max_packet_size - 4) / 4;
        let packets = self
            .weak_acks
            .chunks(per_packet)
            .map(|chunk| {
                let mut packet = Packet::with_capacity(4 + chunk.len() * 4);
                packet.append(&PacketKind::Acks.tag());
                for ordinal in chunk {
                    packet.append(ordinal);
                }
                packet
            })
            .collect();
        self.weak_acks.clear();
        packets
    }

    /// Drains every packet carrying data for a peer that needs no
    /// acknowledgements. An empty next-outgoing packet stays behind so its
    /// ordinal is not consumed.
    pub fn export_packets(&mut self) -> Vec<Packet> {
        let mut exported = Vec::new();

        while let Some(front) = self.packets.front() {
            if self.packets.len() == 1 && front.packet.len() == front.header_len {
                break;
            }
            if let Some(tagged) = self.packets.pop_front() {
                exported.push(tagged.packet);
                self.head += 1;
            }
        }

        if self.packets.is_empty() {
            self.prepare_next_outgoing(PacketKind::Data);
        }

        exported
    }

    fn prepare_next_outgoing(&mut self, kind: PacketKind) {
        let ordinal = self.head + self.packets.len() as PacketOrdinal;

        let mut packet = Packet::with_capacity(self.max_packet_size);
        packet.append(&kind.tag()).append(&ordinal);
        let count = self.pending_acks.len().min(MAX_ACKS_PER_PACKET);
        for ack in self.pending_acks.drain(..count) {
            packet.append(&ack);
        }
        packet.append(&ACK_LIST_TERMINATOR);

        let header_len = packet.len();
        self.packets.push_back(TaggedPacket {
            packet,
            header_len,
            stopwatch: Instant::now(),
            cycles_since_last_transmit: 0,
            tag: SendTag::ReadyForSending,
        });
    }

    fn next_header_len(&self) -> usize {
        let acks = self.pending_acks.len().min(MAX_ACKS_PER_PACKET);
        MAX_DATA_HEADER_SIZE - 4 * (MAX_ACKS_PER_PACKET - acks)
    }

    fn set_tail_kind(&mut self, kind: PacketKind) {
        self.tail_mut().packet.overwrite(0, &kind.tag().to_be_bytes());
    }

    fn tail(&self) -> &TaggedPacket {
        // A next-outgoing packet is prepared on construction and after every pop.
        &self.packets[self.packets.len() - 1]
    }

    fn tail_mut(&mut self) -> &mut TaggedPacket {
        let last = self.packets.len() - 1;
        &mut self.packets[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(packet: &Packet) -> (u32, u32, Vec<u32>, Vec<u8>) {
        let mut packet = packet.clone();
        let kind = packet.extract::<u32>().unwrap();
        let ordinal = packet.extract::<u32>().unwrap();
        let mut acks = Vec::new();
        loop {
            let ack = packet.extract::<u32>().unwrap();
            if ack == ACK_LIST_TERMINATOR {
                break;
            }
            acks.push(ack);
        }
        (kind, ordinal, acks, packet.remaining_bytes().to_vec())
    }

    fn send_all(buffer: &mut SendBuffer) -> Vec<Packet> {
        let mut sent = Vec::new();
        buffer
            .send(Duration::from_secs(60), default_retransmit_predicate, |p| {
                sent.push(p.clone());
                Ok(SendStatus::Sent(p.len()))
            })
            .unwrap();
        sent
    }

    #[test]
    fn small_data_shares_one_packet() {
        let mut buffer = SendBuffer::new(200);
        buffer.append_data(&[1, 2, 3]);
        buffer.append_data(&[4, 5]);

        let sent = send_all(&mut buffer);
        assert_eq!(sent.len(), 1);

        let (kind, ordinal, acks, payload) = header(&sent[0]);
        assert_eq!(kind, PacketKind::Data.tag());
        assert_eq!(ordinal, 1);
        assert!(acks.is_empty());
        assert_eq!(payload, vec![1, 2, 3, 4, 5]);

        // A fresh next-outgoing packet was prepared.
        assert_eq!(buffer.packets.len(), 2);
    }

    #[test]
    fn pending_acks_go_into_next_packet_header() {
        let mut buffer = SendBuffer::new(200);
        buffer.push_ack(7);
        buffer.push_ack(9);

        // The current tail was prepared before the acks arrived.
        let first = send_all(&mut buffer);
        assert!(header(&first[0]).2.is_empty());

        buffer.ack_received(1, true).unwrap();
        let second = send_all(&mut buffer);
        let (_, ordinal, acks, _) = header(&second[0]);
        assert_eq!(ordinal, 2);
        assert_eq!(acks, vec![7, 9]);
    }

    #[test]
    fn oversized_data_is_fragmented() {
        let mut buffer = SendBuffer::new(200);
        let data: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
        buffer.append_data(&data);

        let sent = send_all(&mut buffer);
        let kinds: Vec<u32> = sent.iter().map(|p| header(p).0).collect();
        assert_eq!(kinds.first(), Some(&PacketKind::DataMore.tag()));
        assert_eq!(kinds.last(), Some(&PacketKind::Data.tag()));
        assert_eq!(kinds[kinds.len() - 2], PacketKind::DataTail.tag());
        assert!(sent.iter().all(|p| p.len() <= 200));

        let joined: Vec<u8> = sent.iter().flat_map(|p| header(p).3).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn strong_ack_pops_from_head_in_order() {
        let mut buffer = SendBuffer::new(200);
        send_all(&mut buffer);
        buffer.append_data(&[1]);
        send_all(&mut buffer);
        assert_eq!(buffer.packets.len(), 3);

        // Acking ordinal 2 first does not move the head past 1.
        assert!(matches!(
            buffer.ack_received(2, true).unwrap(),
            AckOutcome::Strong { .. }
        ));
        assert_eq!(buffer.head, 1);

        buffer.ack_received(1, true).unwrap();
        assert_eq!(buffer.head, 3);
        assert_eq!(buffer.ack_received(1, true).unwrap(), AckOutcome::Stale);
    }

    #[test]
    fn weakly_acked_packets_are_not_retransmitted() {
        let mut buffer = SendBuffer::new(200);
        send_all(&mut buffer);
        assert_eq!(buffer.ack_received(1, false).unwrap(), AckOutcome::Weak);

        let mut count = 0;
        buffer
            .send(Duration::ZERO, default_retransmit_predicate, |_| {
                count += 1;
                Ok(SendStatus::Sent(0))
            })
            .unwrap();
        // Only the new tail goes out.
        assert_eq!(count, 1);
        assert_eq!(buffer.head, 1);
    }

    #[test]
    fn unacknowledged_packets_are_retransmitted() {
        let mut buffer = SendBuffer::new(200);
        buffer.append_data(&[42]);
        send_all(&mut buffer);

        let mut resent = Vec::new();
        buffer
            .send(Duration::ZERO, default_retransmit_predicate, |p| {
                resent.push(p.clone());
                Ok(SendStatus::Sent(p.len()))
            })
            .unwrap();

        assert_eq!(resent.len(), 2);
        assert_eq!(header(&resent[0]).1, 1);
        assert_eq!(header(&resent[0]).3, vec![42]);
    }

    #[test]
    fn ack_for_unsent_ordinal_is_rejected() {
        let mut buffer = SendBuffer::new(200);
        assert!(matches!(
            buffer.ack_received(1, true),
            Err(ProtocolError::InvalidAck(1))
        ));
        assert!(matches!(
            buffer.ack_received(50, false),
            Err(ProtocolError::InvalidAck(50))
        ));
    }

    #[test]
    fn send_limit_caps_datagrams_per_pass() {
        let mut buffer = SendBuffer::new(200);
        for _ in 0..30 {
            buffer.append_data(&[0u8; 150]);
        }
        let sent = send_all(&mut buffer);
        assert_eq!(sent.len(), SEND_PACKET_LIMIT);
    }

    #[test]
    fn weak_acks_are_chunked() {
        let mut buffer = SendBuffer::new(128);
        for ordinal in 1..=100 {
            buffer.push_ack(ordinal);
        }
        let packets = buffer.take_weak_ack_packets();
        assert_eq!(packets.len(), 4);
        assert!(packets.iter().all(|p| p.len() <= 128));
        assert!(buffer.take_weak_ack_packets().is_empty());
    }

    #[test]
    fn export_skips_empty_tail() {
        let mut buffer = SendBuffer::new(200);
        assert!(buffer.export_packets().is_empty());

        buffer.append_data(&[1, 2]);
        let exported = buffer.export_packets();
        assert_eq!(exported.len(), 1);
        assert_eq!(header(&exported[0]).1, 1);
        assert_eq!(buffer.head, 2);

        buffer.append_data(&[3]);
        let exported = buffer.export_packets();
        assert_eq!(header(&exported[0]).1, 2);
    }
}
