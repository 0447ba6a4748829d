//! Resolution of replaceable and addressable events.
//!
//! Relays may hand back several versions of the same replaceable event. The
//! router only removes exact duplicates; consumers that want the current
//! version run the merged list through [`latest_versions`].

use nostr::{Event, PublicKey};
use std::collections::HashMap;

use crate::event::{is_addressable_kind, is_replaceable_kind};

/// The `(kind, author, d)` address shared by every version of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub kind: u16,
    pub author: PublicKey,
    /// Empty for plain replaceable kinds
    pub identifier: String,
}

impl Coordinate {
    /// Address of the event, or `None` for regular events
    pub fn of(event: &Event) -> Option<Self> {
        let kind = event.kind.as_u16();

        let identifier = if is_replaceable_kind(kind) {
            String::new()
        } else if is_addressable_kind(kind) {
            event
                .tags
                .iter()
                .map(|tag| tag.as_slice())
                .find(|raw| raw.first().map(String::as_str) == Some("d"))
                .and_then(|raw| raw.get(1).cloned())
                .unwrap_or_default()
        } else {
            return None;
        };

        Some(Self {
            kind,
            author: event.pubkey,
            identifier,
        })
    }
}

/// Whether `candidate` supersedes `current`: newer wins, lower id breaks ties
fn supersedes(candidate: &Event, current: &Event) -> bool {
    candidate.created_at > current.created_at
        || (candidate.created_at == current.created_at && candidate.id < current.id)
}

/// Keep only the latest version of every replaceable event.
///
/// Regular events pass through untouched. Output order follows the first
/// appearance of each event or coordinate.
pub fn latest_versions(events: impl IntoIterator<Item = Event>) -> Vec<Event> {
    let mut output: Vec<Event> = Vec::new();
    let mut slots: HashMap<Coordinate, usize> = HashMap::new();

    for event in events {
        let Some(coordinate) = Coordinate::of(&event) else {
            output.push(event);
            continue;
        };

        match slots.get(&coordinate) {
            Some(&slot) => {
                if supersedes(&event, &output[slot]) {
                    output[slot] = event;
                }
            }
            None => {
                slots.insert(coordinate, output.len());
                output.push(event);
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::prelude::*;
    use super::Coordinate;

    fn article(keys: &Keys, slug: &str, body: &str, at: u64) -> Event {
        EventBuilder::new(Kind::from(30023), body)
            .tag(Tag::identifier(slug))
            .custom_created_at(Timestamp::from(at))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn test_latest_article_version_wins() {
        let keys = Keys::generate();
        let v1 = article(&keys, "intro", "first draft", 100);
        let v2 = article(&keys, "intro", "second draft", 200);
        let other = article(&keys, "outro", "bye", 150);

        let latest = latest_versions(vec![v1, other.clone(), v2.clone()]);
        assert_eq!(latest, vec![v2, other]);
    }

    #[test]
    fn test_older_version_does_not_replace_newer() {
        let keys = Keys::generate();
        let v1 = article(&keys, "intro", "first draft", 100);
        let v2 = article(&keys, "intro", "second draft", 200);

        assert_eq!(latest_versions(vec![v2.clone(), v1]), vec![v2]);
    }

    #[test]
    fn test_same_slug_different_authors_are_distinct() {
        let a = article(&Keys::generate(), "intro", "alice", 100);
        let b = article(&Keys::generate(), "intro", "bob", 100);

        assert_eq!(latest_versions(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_metadata_is_replaceable_without_identifier() {
        let keys = Keys::generate();
        let old = EventBuilder::new(Kind::from(0), r#"{"name":"old"}"#)
            .custom_created_at(Timestamp::from(10))
            .sign_with_keys(&keys)
            .unwrap();
        let new = EventBuilder::new(Kind::from(0), r#"{"name":"new"}"#)
            .custom_created_at(Timestamp::from(20))
            .sign_with_keys(&keys)
            .unwrap();

        let coordinate = Coordinate::of(&new).unwrap();
        assert_eq!(coordinate.identifier, "");
        assert_eq!(latest_versions(vec![old, new.clone()]), vec![new]);
    }

    #[test]
    fn test_tie_broken_by_lowest_id() {
        let keys = Keys::generate();
        let a = article(&keys, "intro", "a", 100);
        let b = article(&keys, "intro", "b", 100);
        let expected = if a.id < b.id { a.clone() } else { b.clone() };

        assert_eq!(latest_versions(vec![a.clone(), b.clone()]), vec![expected.clone()]);
        assert_eq!(latest_versions(vec![b, a]), vec![expected]);
    }

    #[test]
    fn test_regular_events_pass_through() {
        let keys = Keys::generate();
        let note = EventBuilder::text_note("hi").sign_with_keys(&keys).unwrap();

        assert!(Coordinate::of(&note).is_none());
        assert_eq!(latest_versions(vec![note.clone(), note.clone()]).len(), 2);
    }
}
