//! Length-prefixed framing for [`KadRequest`]/[`KadResponse`] (spec §4.E:
//! "Serialization is length-prefixed framed, one request message then one
//! response message per stream").
//!
//! A 4-byte big-endian length prefix followed by a `bincode`-encoded
//! payload, the same split `ant-node/src/networking/kad/protocol.rs` uses
//! between its `MessageHeader` and payload, expressed here through
//! `asynchronous-codec`'s `Encoder`/`Decoder` traits — the framing crate
//! `ant-kad`'s own `Cargo.toml` already declares for this job.

use asynchronous_codec::{Decoder, Encoder};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::protocol::message::{KadRequest, KadResponse};

/// Maximum encoded message size accepted on the wire, guarding against a
/// malicious or buggy peer claiming an unbounded length prefix.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("message of {0} bytes exceeds the maximum of {MAX_MESSAGE_SIZE}")]
    TooLarge(usize),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),
}

const LENGTH_PREFIX: usize = 4;

fn encode_payload(payload: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(payload.len()));
    }
    dst.reserve(LENGTH_PREFIX + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.extend_from_slice(payload);
    Ok(())
}

fn decode_payload(src: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
    if src.len() < LENGTH_PREFIX {
        return Ok(None);
    }
    let len = u32::from_be_bytes(src[..LENGTH_PREFIX].try_into().expect("checked length")) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }
    if src.len() < LENGTH_PREFIX + len {
        return Ok(None);
    }
    src.advance(LENGTH_PREFIX);
    Ok(Some(src.split_to(len)))
}

/// Codec for the request half of a stream (client → server).
#[derive(Default)]
pub struct RequestCodec;

impl Encoder<KadRequest> for RequestCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: KadRequest, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = bincode::serialize(&item).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        encode_payload(&payload, dst)
    }
}

impl Decoder for RequestCodec {
    type Item = KadRequest;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<KadRequest>, ProtocolError> {
        match decode_payload(src)? {
            Some(buf) => {
                let request = bincode::deserialize(&buf).map_err(|e| ProtocolError::Decode(e.to_string()))?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }
}

/// Codec for the response half of a stream (server → client).
#[derive(Default)]
pub struct ResponseCodec;

impl Encoder<KadResponse> for ResponseCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: KadResponse, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = bincode::serialize(&item).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        encode_payload(&payload, dst)
    }
}

impl Decoder for ResponseCodec {
    type Item = KadResponse;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<KadResponse>, ProtocolError> {
        match decode_payload(src)? {
            Some(buf) => {
                let response = bincode::deserialize(&buf).map_err(|e| ProtocolError::Decode(e.to_string()))?;
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips_through_codec() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::new();
        let request = KadRequest::FindNode { target: vec![1, 2, 3] };
        codec.encode(request.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, request);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_a_full_frame() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::new();
        codec.encode(KadRequest::Ping, &mut buf).unwrap();
        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn response_roundtrips_through_codec() {
        let mut codec = ResponseCodec;
        let mut buf = BytesMut::new();
        let response = KadResponse::empty();
        codec.encode(response.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, response);
    }
}
