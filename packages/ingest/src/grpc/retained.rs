// packages/ingest/src/grpc/retained.rs
//! Requests that keep the bytes they were decoded from
//!
//! Proxy targets must receive exactly what the client sent, including fields
//! this server does not know about. [`Retained`] decodes the message for local
//! use and re-encodes by writing the original bytes back out.

use bytes::{Buf, BufMut, Bytes};
use prost::encoding::{DecodeContext, WireType};
use prost::{DecodeError, Message};
use std::ops::Deref;

use crate::grpc::proto::{PublishBuildToolEventStreamRequest, PublishLifecycleEventRequest};

/// Inbound `PublishBuildToolEventStream` request
pub type ToolEventRequest = Retained<PublishBuildToolEventStreamRequest>;

/// Inbound `PublishLifecycleEvent` request
pub type LifecycleEventRequest = Retained<PublishLifecycleEventRequest>;

/// A decoded message paired with its wire encoding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retained<M> {
    raw: Bytes,
    message: M,
}

impl<M: Message> Retained<M> {
    /// Wrap a locally built message, encoding it once
    pub fn new(message: M) -> Self {
        Self {
            raw: Bytes::from(message.encode_to_vec()),
            message,
        }
    }

    /// Bytes exactly as received, or as first encoded
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_message(self) -> M {
        self.message
    }
}

impl<M: Message> From<M> for Retained<M> {
    fn from(message: M) -> Self {
        Self::new(message)
    }
}

impl<M> Deref for Retained<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.message
    }
}

impl<M> Message for Retained<M>
where
    M: Message + Default,
{
    fn encode_raw<B>(&self, buf: &mut B)
    where
        B: BufMut,
        Self: Sized,
    {
        buf.put_slice(&self.raw);
    }

    fn merge_field<B>(&mut self, tag: u32, wire_type: WireType, buf: &mut B, ctx: DecodeContext) -> Result<(), DecodeError>
    where
        B: Buf,
        Self: Sized,
    {
        // Field-wise merging loses the original framing; fall back to re-encoding.
        self.message.merge_field(tag, wire_type, buf, ctx)?;
        self.raw = Bytes::from(self.message.encode_to_vec());
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        self.raw.len()
    }

    fn clear(&mut self) {
        self.raw = Bytes::new();
        self.message.clear();
    }

    fn decode<B>(mut buf: B) -> Result<Self, DecodeError>
    where
        B: Buf,
        Self: Default,
    {
        let raw = buf.copy_to_bytes(buf.remaining());
        let message = M::decode(raw.clone())?;
        Ok(Self { raw, message })
    }
}
