use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::codec::{Decode, Encode, ExtractError, InputStream, OutputStream};

/// Identifier shared by a master object and its proxies.
///
/// Bit 0 marks the master's own id; both sides key their maps by the id
/// with that bit cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncId(pub u64);

impl SyncId {
    pub fn is_master(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn key(self) -> SyncId {
        SyncId(self.0 & !1)
    }
}

impl std::fmt::Display for SyncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Encode for SyncId {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.0.encode(out);
    }
}

impl Decode for SyncId {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        u64::decode(input).map(SyncId)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SyncFlags: u8 {
        const FULL_STATE = 0x01;
        const NO_CHAIN = 0x40;
        const PACEMAKER_PULSE = 0x80;
    }
}

impl Encode for SyncFlags {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.bits().encode(out);
    }
}

impl Decode for SyncFlags {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        u8::decode(input).map(SyncFlags::from_bits_retain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Packet;

    #[test]
    fn master_bit() {
        let master = SyncId(7);
        assert!(master.is_master());
        assert_eq!(master.key(), SyncId(6));
        assert!(!SyncId(6).is_master());
        assert_eq!(SyncId(6).key(), SyncId(6));
    }

    #[test]
    fn flags_codec() {
        let mut packet = Packet::new();
        packet.append(&(SyncFlags::FULL_STATE | SyncFlags::PACEMAKER_PULSE));
        assert_eq!(packet.as_bytes(), &[0x81]);
        assert_eq!(
            packet.extract::<SyncFlags>().unwrap(),
            SyncFlags::FULL_STATE | SyncFlags::PACEMAKER_PULSE
        );
    }
}
