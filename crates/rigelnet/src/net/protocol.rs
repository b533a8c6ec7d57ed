use std::time::Duration;

pub const DEFAULT_MAX_PACKET_SIZE: usize = 1200;
pub const MIN_MAX_PACKET_SIZE: usize = 128;
/// Largest payload of a single IPv4 UDP datagram.
pub const MAX_MAX_PACKET_SIZE: usize = 65_507;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PORT: u16 = 27015;

/// Bytes of UDP header counted into telemetry for every datagram.
pub const UDP_HEADER_BYTE_COUNT: u64 = 8;

/// Ordinal of a DATA packet. Zero is never used; it terminates ack lists.
pub type PacketOrdinal = u32;

pub const FIRST_ORDINAL: PacketOrdinal = 1;
pub const ACK_LIST_TERMINATOR: PacketOrdinal = 0;

pub const MAX_ACKS_PER_PACKET: usize = 16;

/// Kind, ordinal, a full ack list and its terminator.
pub const MAX_DATA_HEADER_SIZE: usize = 4 + 4 + 4 * MAX_ACKS_PER_PACKET + 4;

/// Ordinals further than this ahead of the receive head are dropped unacknowledged.
pub const RECV_WINDOW: usize = 8192;

/// Upper bound on datagrams sent by one connector in one send pass.
pub const SEND_PACKET_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Hello,
    Connect,
    Disconnect,
    Data,
    DataMore,
    DataTail,
    Acks,
}

impl PacketKind {
    pub const fn tag(self) -> u32 {
        match self {
            Self::Hello => 0x3BF0_E110,
            Self::Connect => 0x83C9_6CA4,
            Self::Disconnect => 0xD0F2_35AB,
            Self::Data => 0xA765_B8F6,
            Self::DataMore => 0x782A_2A78,
            Self::DataTail => 0x00DA_7A11,
            Self::Acks => 0x71AC_2519,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        [
            Self::Hello,
            Self::Connect,
            Self::Disconnect,
            Self::Data,
            Self::DataMore,
            Self::DataTail,
            Self::Acks,
        ]
        .into_iter()
        .find(|kind| kind.tag() == tag)
    }

    pub fn is_data(self) -> bool {
        matches!(self, Self::Data | Self::DataMore | Self::DataTail)
    }
}

/// Malformed or out-of-window datagrams. These never escape a node's
/// `update`; the affected connector is reset instead.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown packet kind {0:#010x}")]
    UnknownKind(u32),
    #[error("unexpected {kind:?} packet while {state}")]
    UnexpectedPacket { kind: PacketKind, state: &'static str },
    #[error("acknowledgement for ordinal {0} which was never sent")]
    InvalidAck(PacketOrdinal),
    #[error("fragment chain is not terminated")]
    BrokenFragmentChain,
    #[error("malformed packet: {0}")]
    Malformed(#[from] crate::codec::ExtractError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in [
            PacketKind::Hello,
            PacketKind::Connect,
            PacketKind::Disconnect,
            PacketKind::Data,
            PacketKind::DataMore,
            PacketKind::DataTail,
            PacketKind::Acks,
        ] {
            assert_eq!(PacketKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(PacketKind::from_tag(0x1234_5678), None);
    }

    #[test]
    fn data_kinds() {
        assert!(PacketKind::Data.is_data());
        assert!(PacketKind::DataMore.is_data());
        assert!(PacketKind::DataTail.is_data());
        assert!(!PacketKind::Acks.is_data());
        assert!(!PacketKind::Hello.is_data());
    }
}
