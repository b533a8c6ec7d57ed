use super::stream::{ExtractError, InputStream, OutputStream};
use super::value::{Decode, Encode};

/// Growable byte buffer with a read cursor.
///
/// Values are appended at the end and extracted from the cursor. A failed
/// extraction puts the packet into an error state which stays set until
/// [`Packet::clear_read_error`] is called; every extraction in that state fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    read_pos: usize,
    read_error: bool,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
            read_error: false,
        }
    }

    pub fn append<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self);
        self
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn extract<T: Decode>(&mut self) -> Result<T, ExtractError> {
        if self.read_error {
            return Err(ExtractError::StreamInError {
                remaining: Some(self.remaining()),
            });
        }
        T::decode(self)
    }

    /// Like [`Packet::extract`], but logs the failure and returns
    /// `T::default()` instead. The error flag is still set.
    pub fn extract_no_throw<T: Decode + Default>(&mut self) -> T {
        match self.extract() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Packet extraction failed: {e}");
                self.read_error = true;
                T::default()
            }
        }
    }

    pub fn extract_bytes(&mut self, count: usize) -> Result<&[u8], ExtractError> {
        if self.read_error {
            return Err(ExtractError::StreamInError {
                remaining: Some(self.remaining()),
            });
        }
        if count > self.remaining() {
            self.read_error = true;
            return Err(ExtractError::NotEnoughData {
                requested: count,
                remaining: Some(self.remaining()),
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..self.read_pos])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn remaining_bytes(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Overwrites already written bytes starting at `offset`.
    pub fn overwrite(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn position(&self) -> usize {
        self.read_pos
    }

    pub fn end_of_packet(&self) -> bool {
        self.read_pos >= self.data.len()
    }

    pub fn is_good(&self) -> bool {
        !self.read_error
    }

    pub fn clear_read_error(&mut self) {
        self.read_error = false;
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.read_error = false;
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            read_pos: 0,
            read_error: false,
        }
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl OutputStream for Packet {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

impl InputStream for Packet {
    fn read_bytes_into(&mut self, dest: &mut [u8]) -> Result<(), ExtractError> {
        let bytes = self.extract_bytes(dest.len())?;
        dest.copy_from_slice(bytes);
        Ok(())
    }

    fn is_predetermined(&self) -> bool {
        true
    }

    fn data_size(&self) -> Option<usize> {
        Some(self.len())
    }

    fn remaining_data_size(&self) -> Option<usize> {
        Some(self.remaining())
    }

    fn read_position(&self) -> Option<usize> {
        Some(self.read_pos)
    }

    fn has_read_error(&self) -> bool {
        self.read_error
    }

    fn set_read_error(&mut self) {
        self.read_error = true;
    }

    fn clear_read_error(&mut self) {
        self.read_error = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_is_predetermined() {
        let mut packet = Packet::new();
        packet.append(&1u32).append(&2u16);

        assert!(packet.is_predetermined());
        assert_eq!(packet.data_size(), Some(6));
        assert_eq!(packet.remaining_data_size(), Some(6));

        packet.extract::<u32>().unwrap();
        assert_eq!(packet.read_position(), Some(4));
        assert_eq!(packet.remaining_data_size(), Some(2));
    }

    #[test]
    fn extraction_past_end_reports_remaining() {
        let mut packet = Packet::new();
        packet.append(&7u16);

        let err = packet.extract::<u32>().unwrap_err();
        assert_eq!(err.remaining(), Some(2));
        assert!(!packet.is_good());
    }

    #[test]
    fn error_flag_is_sticky() {
        let mut packet = Packet::new();
        packet.append(&7u16);

        assert!(packet.extract::<u64>().is_err());
        // Enough data for a u8, but the packet is still in error.
        assert!(matches!(
            packet.extract::<u8>(),
            Err(ExtractError::StreamInError { remaining: Some(2) })
        ));

        packet.clear_read_error();
        assert_eq!(packet.extract::<u16>().unwrap(), 7);
    }

    #[test]
    fn no_throw_returns_default() {
        let mut packet = Packet::new();
        packet.append(&5u8);

        assert_eq!(packet.extract_no_throw::<u8>(), 5);
        assert_eq!(packet.extract_no_throw::<u32>(), 0);
        assert_eq!(packet.extract_no_throw::<String>(), "");
        assert!(!packet.is_good());
    }

    #[test]
    fn overwrite_replaces_bytes_in_place() {
        let mut packet = Packet::new();
        packet.append(&0u32).append(&9u8);
        packet.overwrite(0, &0xAABBCCDDu32.to_be_bytes());

        assert_eq!(packet.extract::<u32>().unwrap(), 0xAABBCCDD);
        assert_eq!(packet.extract::<u8>().unwrap(), 9);
        assert!(packet.end_of_packet());
    }
}
