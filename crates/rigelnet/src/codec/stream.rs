use std::io::{self, Read};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("cannot extract {requested} bytes, {remaining:?} remaining")]
    NotEnoughData {
        requested: usize,
        remaining: Option<usize>,
    },
    #[error("stream is in an error state, {remaining:?} bytes unread")]
    StreamInError { remaining: Option<usize> },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("read failed: {0}")]
    Io(String),
}

impl ExtractError {
    /// Number of bytes that were still unread when extraction failed, if known.
    pub fn remaining(&self) -> Option<usize> {
        match self {
            Self::NotEnoughData { remaining, .. } | Self::StreamInError { remaining } => {
                *remaining
            }
            Self::InvalidUtf8 | Self::Io(_) => None,
        }
    }
}

pub trait OutputStream {
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// Source of big-endian encoded values.
///
/// Fixed-length sources are *predetermined*; for those the size queries
/// return `Some`. Unbounded sources (a socket, a pipe) return `None`.
pub trait InputStream {
    fn read_bytes_into(&mut self, dest: &mut [u8]) -> Result<(), ExtractError>;

    fn is_predetermined(&self) -> bool;

    fn data_size(&self) -> Option<usize>;

    fn remaining_data_size(&self) -> Option<usize>;

    fn read_position(&self) -> Option<usize>;

    fn has_read_error(&self) -> bool;

    fn set_read_error(&mut self);

    fn clear_read_error(&mut self);

    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, ExtractError> {
        if let Some(remaining) = self.remaining_data_size() {
            if remaining < len {
                self.set_read_error();
                return Err(ExtractError::NotEnoughData {
                    requested: len,
                    remaining: Some(remaining),
                });
            }
            let mut buf = vec![0; len];
            self.read_bytes_into(&mut buf)?;
            return Ok(buf);
        }

        // Unknown length: grow in chunks so a bogus prefix cannot force a huge allocation.
        const CHUNK: usize = 4096;
        let mut buf = Vec::with_capacity(len.min(CHUNK));
        while buf.len() < len {
            let start = buf.len();
            let step = (len - start).min(CHUNK);
            buf.resize(start + step, 0);
            self.read_bytes_into(&mut buf[start..])?;
        }
        Ok(buf)
    }
}

/// Unbounded input stream over any [`Read`] implementation.
pub struct ReaderStream<R> {
    reader: R,
    read_error: bool,
}

impl<R: Read> ReaderStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_error: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> InputStream for ReaderStream<R> {
    fn read_bytes_into(&mut self, dest: &mut [u8]) -> Result<(), ExtractError> {
        if self.read_error {
            return Err(ExtractError::StreamInError { remaining: None });
        }
        match self.reader.read_exact(dest) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.read_error = true;
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    Err(ExtractError::NotEnoughData {
                        requested: dest.len(),
                        remaining: None,
                    })
                } else {
                    Err(ExtractError::Io(e.to_string()))
                }
            }
        }
    }

    fn is_predetermined(&self) -> bool {
        false
    }

    fn data_size(&self) -> Option<usize> {
        None
    }

    fn remaining_data_size(&self) -> Option<usize> {
        None
    }

    fn read_position(&self) -> Option<usize> {
        None
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
