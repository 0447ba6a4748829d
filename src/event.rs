//! Typed tags and structural validation for events received from relays.
//!
//! Relay data is untrusted. Every event goes through [`validate_event`] before
//! it reaches a caller; the router drops whatever fails.

use nostr::{Event, EventId, Kind, PublicKey};
use thiserror::Error;

pub const KIND_METADATA: u16 = 0;
pub const KIND_CONTACTS: u16 = 3;
pub const KIND_DELETION: u16 = 5;

/// Why an event was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("id or signature does not verify")]
    BadSignature,

    #[error("empty tag at index {0}")]
    EmptyTag(usize),

    #[error("invalid event reference: {0}")]
    InvalidEventReference(String),

    #[error("invalid address coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("addressable kind {0} without a d tag")]
    MissingIdentifier(u16),

    #[error("deletion request references nothing")]
    EmptyDeletion,

    #[error("metadata content is not a JSON object")]
    InvalidMetadata,
}

/// A parsed tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTag {
    /// `["e", <event id>, <relay hint>?, ...]`
    EventReference {
        id: EventId,
        relay_hint: Option<String>,
    },
    /// `["a", "<kind>:<pubkey>:<identifier>", ...]`
    AddressableReference {
        kind: Kind,
        author: PublicKey,
        identifier: String,
    },
    /// `["d", <identifier>]`
    Identifier(String),
    Generic { name: String, values: Vec<String> },
}

impl EventTag {
    /// Parse a raw tag. The first element is the tag name.
    pub fn parse(raw: &[String], index: usize) -> Result<Self, MalformedEvent> {
        let (name, values) = raw.split_first().ok_or(MalformedEvent::EmptyTag(index))?;

        match name.as_str() {
            "e" => {
                let value = values
                    .first()
                    .ok_or_else(|| MalformedEvent::InvalidEventReference(String::new()))?;
                let id = EventId::from_hex(value)
                    .map_err(|_| MalformedEvent::InvalidEventReference(value.clone()))?;
                let relay_hint = values.get(1).filter(|hint| !hint.is_empty()).cloned();
                Ok(Self::EventReference { id, relay_hint })
            }
            "a" => {
                let value = values
                    .first()
                    .ok_or_else(|| MalformedEvent::InvalidCoordinate(String::new()))?;
                parse_coordinate(value)
            }
            // A bare ["d"] is the empty identifier
            "d" => Ok(Self::Identifier(values.first().cloned().unwrap_or_default())),
            _ => Ok(Self::Generic {
                name: name.clone(),
                values: values.to_vec(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::EventReference { .. } => "e",
            Self::AddressableReference { .. } => "a",
            Self::Identifier(_) => "d",
            Self::Generic { name, .. } => name,
        }
    }
}

fn parse_coordinate(value: &str) -> Result<EventTag, MalformedEvent> {
    let invalid = || MalformedEvent::InvalidCoordinate(value.to_string());

    // The identifier itself may contain ':'
    let mut parts = value.splitn(3, ':');
    let kind: u16 = parts.next().and_then(|k| k.parse().ok()).ok_or_else(invalid)?;
    let author = parts
        .next()
        .and_then(|pk| PublicKey::from_hex(pk).ok())
        .ok_or_else(invalid)?;
    let identifier = parts.next().ok_or_else(invalid)?.to_string();

    Ok(EventTag::AddressableReference {
        kind: Kind::from(kind),
        author,
        identifier,
    })
}

/// Parse every tag of an event into its typed form.
pub fn parse_tags(event: &Event) -> Result<Vec<EventTag>, MalformedEvent> {
    event
        .tags
        .iter()
        .enumerate()
        .map(|(index, tag)| EventTag::parse(tag.as_slice(), index))
        .collect()
}

pub fn is_replaceable_kind(kind: u16) -> bool {
    kind == KIND_METADATA || kind == KIND_CONTACTS || (10_000..20_000).contains(&kind)
}

pub fn is_addressable_kind(kind: u16) -> bool {
    (30_000..40_000).contains(&kind)
}

/// Check that an event is well formed for the kind it claims to be.
pub fn validate_event(event: &Event) -> Result<Vec<EventTag>, MalformedEvent> {
    event.verify().map_err(|_| MalformedEvent::BadSignature)?;

    let tags = parse_tags(event)?;
    let kind = event.kind.as_u16();

    if is_addressable_kind(kind) && !tags.iter().any(|t| matches!(t, EventTag::Identifier(_))) {
        return Err(MalformedEvent::MissingIdentifier(kind));
    }

    if kind == KIND_DELETION
        && !tags.iter().any(|t| {
            matches!(
                t,
                EventTag::EventReference { .. } | EventTag::AddressableReference { .. }
            )
        })
    {
        return Err(MalformedEvent::EmptyDeletion);
    }

    if kind == KIND_METADATA {
        match serde_json::from_str::<serde_json::Value>(&event.content) {
            Ok(serde_json::Value::Object(_)) => {}
            _ => return Err(MalformedEvent::InvalidMetadata),
        }
    }

    Ok(tags)
}
