mod packet;
mod stream;
mod value;

pub use packet::Packet;
pub use stream::{ExtractError, InputStream, OutputStream, ReaderStream};
pub use value::{Decode, Encode, MAX_SEQUENCE_LEN};
