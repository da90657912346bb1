//! Encoding events for cross-host transfer.
//!
//! Closures do not cross hosts. An event that may travel carries a wire
//! form — a codec tag plus an opaque payload — and the receiving host
//! rebuilds the event through a constructor registered under that tag.
//! The kernel frames the wire form together with the target context and
//! absolute timestamp; everything inside the payload is the
//! application's business.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;
use skein_core::Event;

// ── CodecError ───────────────────────────────────────────────────

/// Failure to encode or decode a cross-host event.
#[derive(Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The event has no wire form; it cannot leave this host.
    NotEncodable,
    /// No constructor is registered under the received tag.
    UnknownTag {
        /// The offending tag.
        tag: u32,
    },
    /// The byte stream ended mid-record.
    Truncated,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEncodable => write!(f, "event has no wire form"),
            Self::UnknownTag { tag } => write!(f, "no event constructor for tag {tag}"),
            Self::Truncated => write!(f, "truncated event record"),
        }
    }
}

impl Error for CodecError {}

// ── EventCodec ───────────────────────────────────────────────────

/// Turns events into bytes and back for the bus.
pub trait EventCodec: Send + Sync {
    /// Encode an event's wire form.
    fn encode(&self, event: &Event) -> Result<Vec<u8>, CodecError>;

    /// Rebuild an event from bytes produced by a peer's `encode`.
    fn decode(&self, bytes: &[u8]) -> Result<Event, CodecError>;
}

// ── RegistryCodec ────────────────────────────────────────────────

type Constructor = Box<dyn Fn(&[u8]) -> Event + Send + Sync>;

/// Tag-indexed constructor registry.
///
/// Both hosts register the same tags; `encode` writes
/// `tag | payload_len | payload`, `decode` looks the tag up and hands
/// the payload to the registered constructor.
#[derive(Default)]
pub struct RegistryCodec {
    constructors: IndexMap<u32, Constructor>,
}

impl RegistryCodec {
    /// An empty registry.
    pub fn new() -> RegistryCodec {
        RegistryCodec::default()
    }

    /// Register the constructor for `tag`, replacing any previous one.
    pub fn register(&mut self, tag: u32, f: impl Fn(&[u8]) -> Event + Send + Sync + 'static) {
        self.constructors.insert(tag, Box::new(f));
    }
}

impl EventCodec for RegistryCodec {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, CodecError> {
        let (tag, payload) = event.wire_form().ok_or(CodecError::NotEncodable)?;
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Event, CodecError> {
        if bytes.len() < 8 {
            return Err(CodecError::Truncated);
        }
        let tag = u32::from_le_bytes(bytes[0..4].try_into().expect("4-byte slice"));
        let len = u32::from_le_bytes(bytes[4..8].try_into().expect("4-byte slice")) as usize;
        let payload = bytes.get(8..8 + len).ok_or(CodecError::Truncated)?;
        let constructor = self
            .constructors
            .get(&tag)
            .ok_or(CodecError::UnknownTag { tag })?;
        Ok(constructor(payload))
    }
}

impl fmt::Debug for RegistryCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCodec")
            .field("tags", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Message framing ──────────────────────────────────────────────

/// Frame a remote event for the bus:
/// `context: u32 | ts: u64 | encoded event`.
pub(crate) fn encode_remote(
    codec: &dyn EventCodec,
    context: u32,
    ts: u64,
    event: &Event,
) -> Result<Vec<u8>, CodecError> {
    let body = codec.encode(event)?;
    let mut out = Vec::with_capacity(12 + body.len());
    out.extend_from_slice(&context.to_le_bytes());
    out.extend_from_slice(&ts.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse a frame produced by [`encode_remote`].
pub(crate) fn decode_remote(
    codec: &dyn EventCodec,
    bytes: &[u8],
) -> Result<(u32, u64, Event), CodecError> {
    if bytes.len() < 12 {
        return Err(CodecError::Truncated);
    }
    let context = u32::from_le_bytes(bytes[0..4].try_into().expect("4-byte slice"));
    let ts = u64::from_le_bytes(bytes[4..12].try_into().expect("8-byte slice"));
    let event = codec.decode(&bytes[12..])?;
    Ok((context, ts, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_codec(hits: Arc<AtomicU32>) -> RegistryCodec {
        let mut codec = RegistryCodec::new();
        codec.register(7, move |payload| {
            let step = payload.first().copied().unwrap_or(0) as u32;
            let hits = hits.clone();
            Event::new(move || {
                hits.fetch_add(step, Ordering::SeqCst);
            })
        });
        codec
    }

    #[test]
    fn encode_decode_rebuilds_a_runnable_event() {
        let hits = Arc::new(AtomicU32::new(0));
        let codec = counting_codec(hits.clone());
        let original = Event::with_wire(7, vec![5], || {});
        let bytes = codec.encode(&original).unwrap();
        let rebuilt = codec.decode(&bytes).unwrap();
        assert!(rebuilt.invoke());
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn plain_events_are_not_encodable() {
        let codec = RegistryCodec::new();
        assert_eq!(
            codec.encode(&Event::new(|| {})),
            Err(CodecError::NotEncodable)
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let codec = RegistryCodec::new();
        let event = Event::with_wire(99, vec![], || {});
        let bytes = RegistryCodec::new().encode(&event).unwrap();
        assert_eq!(codec.decode(&bytes), Err(CodecError::UnknownTag { tag: 99 }));
    }

    #[test]
    fn remote_frame_round_trips_context_and_timestamp() {
        let hits = Arc::new(AtomicU32::new(0));
        let codec = counting_codec(hits);
        let event = Event::with_wire(7, vec![1], || {});
        let frame = encode_remote(&codec, 42, 500_000, &event).unwrap();
        let (context, ts, _event) = decode_remote(&codec, &frame).unwrap();
        assert_eq!((context, ts), (42, 500_000));
        assert_eq!(
            decode_remote(&codec, &frame[..4]),
            Err(CodecError::Truncated)
        );
    }
}
