//! Byte-level plumbing around the dispatcher: the client wire format, the
//! outbound backend connections and the client accept loop.

pub mod codec;
pub mod link;
pub mod server;

pub use codec::{JobCodec, TagCodec};
pub use link::{BackendLink, TcpLink};
pub use server::ClientListener;
