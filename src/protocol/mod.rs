//! Component E: the typed request/response protocol (spec §4.E, §6).

mod codec;
mod message;

pub use codec::{ProtocolError, RequestCodec, ResponseCodec, MAX_MESSAGE_SIZE};
pub use message::{ClusterLevel, KadRequest, KadResponse, WirePeerInfo};
