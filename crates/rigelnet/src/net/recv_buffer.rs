use std::collections::VecDeque;

use super::protocol::{
    ACK_LIST_TERMINATOR, FIRST_ORDINAL, PacketKind, PacketOrdinal, ProtocolError, RECV_WINDOW,
};
use crate::codec::Packet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum RecvTag {
    #[default]
    WaitingForData,
    Fragment,
    FragmentTail,
    ReadyForUnpacking,
}

#[derive(Debug, Default)]
struct RecvSlot {
    payload: Vec<u8>,
    tag: RecvTag,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Stored; carries the strong acknowledgements from the packet header.
    Stored(Vec<PacketOrdinal>),
    Duplicate,
    OutOfWindow,
}

#[derive(Debug)]
pub struct RecvBuffer {
    slots: VecDeque<RecvSlot>,
    head: PacketOrdinal,
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self {
            slots: VecDeque::new(),
            head: FIRST_ORDINAL,
        }
    }

    pub fn reset(&mut self) {
        self.slots.clear();
        self.head = FIRST_ORDINAL;
    }

    /// `packet` must be positioned right after the ordinal.
    pub fn store(
        &mut self,
        ordinal: PacketOrdinal,
        kind: PacketKind,
        packet: &mut Packet,
    ) -> Result<StoreOutcome, ProtocolError> {
        if ordinal < self.head {
            return Ok(StoreOutcome::Duplicate);
        }

        let index = (ordinal - self.head) as usize;
        if index >= RECV_WINDOW {
            return Ok(StoreOutcome::OutOfWindow);
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, RecvSlot::default);
        }
        if self.slots[index].tag != RecvTag::WaitingForData {
            return Ok(StoreOutcome::Duplicate);
        }

        let mut acks = Vec::new();
        loop {
            let ack: PacketOrdinal = packet.extract()?;
            if ack == ACK_LIST_TERMINATOR {
                break;
            }
            acks.push(ack);
        }

        let tag = match kind {
            PacketKind::DataMore => RecvTag::Fragment,
            PacketKind::DataTail => RecvTag::FragmentTail,
            _ => RecvTag::ReadyForUnpacking,
        };
        self.slots[index] = RecvSlot {
            payload: packet.remaining_bytes().to_vec(),
            tag,
        };

        Ok(StoreOutcome::Stored(acks))
    }

    /// Next payload in ordinal order, with fragment chains joined.
    /// Returns `Ok(None)` while the head is still missing.
    pub fn take_next_ready(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let Some(front) = self.slots.front() else {
            return Ok(None);
        };

        match front.tag {
            RecvTag::WaitingForData => Ok(None),
            RecvTag::ReadyForUnpacking => Ok(self.pop_front().map(|slot| slot.payload)),
            RecvTag::Fragment | RecvTag::FragmentTail => {
                let mut tail_index = None;
                for (i, slot) in self.slots.iter().enumerate() {
                    match slot.tag {
                        RecvTag::Fragment => continue,
                        RecvTag::FragmentTail => {
                            tail_index = Some(i);
                            break;
                        }
                        RecvTag::WaitingForData => return Ok(None),
                        RecvTag::ReadyForUnpacking => {
                            return Err(ProtocolError::BrokenFragmentChain);
                        }
                    }
                }
                let Some(tail_index) = tail_index else {
                    return Ok(None);
                };

                let mut joined = Vec::new();
                for _ in 0..=tail_index {
                    if let Some(slot) = self.pop_front() {
                        joined.extend_from_slice(&slot.payload);
                    }
                }
                Ok(Some(joined))
            }
        }
    }

    fn pop_front(&mut self) -> Option<RecvSlot> {
        let slot = self.slots.pop_front()?;
        self.head += 1;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(acks: &[u32], payload: &[u8]) -> Packet {
        let mut packet = Packet::new();
        for ack in acks {
            packet.append(ack);
        }
        packet.append(&ACK_LIST_TERMINATOR).append_bytes(payload);
        packet
    }

    fn store(buffer: &mut RecvBuffer, ordinal: u32, kind: PacketKind, payload: &[u8]) -> StoreOutcome {
        buffer.store(ordinal, kind, &mut body(&[], payload)).unwrap()
    }

    #[test]
    fn delivers_in_order_after_gap_fills() {
        let mut buffer = RecvBuffer::new();
        store(&mut buffer, 3, PacketKind::Data, b"c");
        store(&mut buffer, 2, PacketKind::Data, b"b");
        assert_eq!(buffer.take_next_ready().unwrap(), None);

        store(&mut buffer, 1, PacketKind::Data, b"a");
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"a".to_vec()));
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"b".to_vec()));
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"c".to_vec()));
        assert_eq!(buffer.take_next_ready().unwrap(), None);
        assert_eq!(buffer.head, 4);
    }

    #[test]
    fn duplicates_are_detected() {
        let mut buffer = RecvBuffer::new();
        assert_eq!(
            store(&mut buffer, 2, PacketKind::Data, b"x"),
            StoreOutcome::Stored(vec![])
        );
        assert_eq!(
            store(&mut buffer, 2, PacketKind::Data, b"x"),
            StoreOutcome::Duplicate
        );

        store(&mut buffer, 1, PacketKind::Data, b"y");
        buffer.take_next_ready().unwrap();
        assert_eq!(
            store(&mut buffer, 1, PacketKind::Data, b"y"),
            StoreOutcome::Duplicate
        );
    }

    #[test]
    fn resized_slots_wait_for_data() {
        let mut buffer = RecvBuffer::new();
        store(&mut buffer, 5, PacketKind::Data, b"e");

        // Slots 1..=4 were created by the resize and must still accept data.
        for ordinal in 1..=4 {
            assert_eq!(
                store(&mut buffer, ordinal, PacketKind::Data, b"-"),
                StoreOutcome::Stored(vec![])
            );
        }
    }

    #[test]
    fn strong_acks_are_returned() {
        let mut buffer = RecvBuffer::new();
        let outcome = buffer
            .store(1, PacketKind::Data, &mut body(&[4, 5, 6], b"p"))
            .unwrap();
        assert_eq!(outcome, StoreOutcome::Stored(vec![4, 5, 6]));
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"p".to_vec()));
    }

    #[test]
    fn fragments_are_joined() {
        let mut buffer = RecvBuffer::new();
        store(&mut buffer, 1, PacketKind::DataMore, b"he");
        store(&mut buffer, 3, PacketKind::DataTail, b"lo");
        store(&mut buffer, 4, PacketKind::Data, b"!");
        assert_eq!(buffer.take_next_ready().unwrap(), None);

        store(&mut buffer, 2, PacketKind::DataMore, b"l");
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"hello".to_vec()));
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"!".to_vec()));
    }

    #[test]
    fn lone_tail_is_a_complete_chain() {
        let mut buffer = RecvBuffer::new();
        store(&mut buffer, 1, PacketKind::DataTail, b"solo");
        assert_eq!(buffer.take_next_ready().unwrap(), Some(b"solo".to_vec()));
    }

    #[test]
    fn unterminated_chain_is_an_error() {
        let mut buffer = RecvBuffer::new();
        store(&mut buffer, 1, PacketKind::DataMore, b"a");
        store(&mut buffer, 2, PacketKind::Data, b"b");
        assert!(matches!(
            buffer.take_next_ready(),
            Err(ProtocolError::BrokenFragmentChain)
        ));
    }

    #[test]
    fn far_ordinals_are_out_of_window() {
        let mut buffer = RecvBuffer::new();
        assert_eq!(
            store(&mut buffer, u32::MAX, PacketKind::Data, b"x"),
            StoreOutcome::OutOfWindow
        );
    }

    #[test]
    fn truncated_ack_list_is_malformed() {
        let mut buffer = RecvBuffer::new();
        let mut packet = Packet::new();
        packet.append(&9u32);
        assert!(matches!(
            buffer.store(1, PacketKind::Data, &mut packet),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
