pub mod codec;
pub mod correlate;
pub mod icmp;
pub mod socket;

pub use codec::*;
pub use correlate::{ParsedReply, ReplyKind, parse_reply};
pub use icmp::*;
pub use socket::*;
