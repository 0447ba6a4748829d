use nostr::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A query constraint. Fields left as `None` do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Author public keys, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event ids, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Tag name ("e" or "#e") to accepted values
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.get_or_insert_with(Vec::new).push(author.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.get_or_insert_with(Vec::new).push(id.into());
        self
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if an event satisfies every constraint of this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref ids) = self.ids {
            let id = event.id.to_hex();
            if !ids.iter().any(|candidate| candidate.eq_ignore_ascii_case(&id)) {
                return false;
            }
        }

        if let Some(ref authors) = self.authors {
            let author = event.pubkey.to_hex();
            if !authors.iter().any(|candidate| candidate.eq_ignore_ascii_case(&author)) {
                return false;
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind.as_u16()) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }

        for (tag_name, filter_values) in &self.tags {
            let tag_key = tag_name.strip_prefix('#').unwrap_or(tag_name);

            // At least one event tag value must match one filter value
            let matched = event.tags.iter().any(|tag| {
                let raw = tag.as_slice();
                raw.first().map(String::as_str) == Some(tag_key)
                    && raw.get(1).is_some_and(|value| filter_values.contains(value))
            });

            if !matched {
                return false;
            }
        }

        true
    }

    /// Build the protocol filter sent to relays.
    ///
    /// Returns `None` when an `ids` or `authors` constraint has no valid
    /// entry left: such a filter matches no event locally, and dropping the
    /// constraint would widen it on the relay instead.
    pub fn to_nostr_filter(&self) -> Option<Filter> {
        let mut filter = Filter::new();

        if let Some(ref ids) = self.ids {
            let ids: Vec<EventId> = ids
                .iter()
                .filter_map(|hex| match EventId::from_hex(hex) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("Skipping invalid event id {} in filter: {}", hex, e);
                        None
                    }
                })
                .collect();
            if ids.is_empty() {
                warn!("Filter has no valid event id, not sending it");
                return None;
            }
            filter = filter.ids(ids);
        }

        if let Some(ref authors) = self.authors {
            let pubkeys: Vec<PublicKey> = authors
                .iter()
                .filter_map(|hex| match PublicKey::from_hex(hex) {
                    Ok(pk) => Some(pk),
                    Err(e) => {
                        warn!("Skipping invalid author {} in filter: {}", hex, e);
                        None
                    }
                })
                .collect();
            if pubkeys.is_empty() {
                warn!("Filter has no valid author, not sending it");
                return None;
            }
            filter = filter.authors(pubkeys);
        }

        if let Some(ref kinds) = self.kinds {
            filter = filter.kinds(kinds.iter().map(|k| Kind::from(*k)));
        }

        for (tag_name, values) in &self.tags {
            let tag_key = tag_name.strip_prefix('#').unwrap_or(tag_name);

            let mut chars = tag_key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => {
                    if let Ok(single_letter_tag) = SingleLetterTag::from_char(c) {
                        filter = filter.custom_tags(single_letter_tag, values.clone());
                    }
                }
                _ => warn!("Ignoring non single-letter tag filter: {}", tag_name),
            }
        }

        if let Some(since) = self.since {
            filter = filter.since(since);
        }

        if let Some(until) = self.until {
            filter = filter.until(until);
        }

        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }

        Some(filter)
    }
}

/// Check if an event matches any of the provided filters.
/// No filters means everything passes.
pub fn event_matches_filters(event: &Event, filters: &[QueryFilter]) -> bool {
    filters.is_empty() || filters.iter().any(|filter| filter.matches(event))
}

/// Convert query filters to protocol filters, an empty list becoming one open filter.
/// Filters that can match nothing are left out, so the result may be empty.
pub fn convert_filters_to_nostr(filters: &[QueryFilter]) -> Vec<Filter> {
    if filters.is_empty() {
        return vec![Filter::new()];
    }

    filters.iter().filter_map(QueryFilter::to_nostr_filter).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(keys: &Keys, content: &str, tags: Vec<Tag>) -> Event {
        EventBuilder::text_note(content)
            .tags(tags)
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn test_matches_kind_and_author() {
        let keys = Keys::generate();
        let event = note(&keys, "hello", vec![]);

        assert!(QueryFilter::new().kind(1).matches(&event));
        assert!(!QueryFilter::new().kind(30023).matches(&event));
        assert!(QueryFilter::new().author(keys.public_key().to_hex()).matches(&event));
        assert!(!QueryFilter::new()
            .author(Keys::generate().public_key().to_hex())
            .matches(&event));
    }

    #[test]
    fn test_matches_tags_with_and_without_hash() {
        let keys = Keys::generate();
        let event = note(&keys, "tagged", vec![Tag::hashtag("rust")]);

        assert!(QueryFilter::new().tag("t", "rust").matches(&event));
        assert!(QueryFilter::new().tag("#t", "rust").matches(&event));
        assert!(!QueryFilter::new().tag("t", "go").matches(&event));
        assert!(!QueryFilter::new().tag("e", "rust").matches(&event));
    }

    #[test]
    fn test_matches_time_bounds() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("dated")
            .custom_created_at(Timestamp::from(1_000))
            .sign_with_keys(&keys)
            .unwrap();

        assert!(QueryFilter::new().since(Timestamp::from(1_000)).matches(&event));
        assert!(!QueryFilter::new().since(Timestamp::from(1_001)).matches(&event));
        assert!(QueryFilter::new().until(Timestamp::from(1_000)).matches(&event));
        assert!(!QueryFilter::new().until(Timestamp::from(999)).matches(&event));
    }

    #[test]
    fn test_filters_are_ored() {
        let keys = Keys::generate();
        let event = note(&keys, "hello", vec![]);
        let filters = vec![QueryFilter::new().kind(7), QueryFilter::new().id(event.id.to_hex())];

        assert!(event_matches_filters(&event, &filters));
        assert!(event_matches_filters(&event, &[]));
        assert!(!event_matches_filters(&event, &filters[..1]));
    }

    #[test]
    fn test_empty_filter_list_converts_to_open_filter() {
        assert_eq!(convert_filters_to_nostr(&[]), vec![Filter::new()]);
        assert_eq!(convert_filters_to_nostr(&[QueryFilter::new(), QueryFilter::new()]).len(), 2);
    }

    #[test]
    fn test_filter_without_valid_ids_is_not_sent() {
        let keys = Keys::generate();
        let event = note(&keys, "hello", vec![]);

        let bad_ids = QueryFilter::new().id("not-hex");
        let bad_authors = QueryFilter::new().author("zz").kind(1);

        // Neither matches locally, so neither is sent
        assert!(!bad_ids.matches(&event));
        assert!(!bad_authors.matches(&event));
        assert_eq!(bad_ids.to_nostr_filter(), None);
        assert_eq!(bad_authors.to_nostr_filter(), None);
        assert!(convert_filters_to_nostr(&[bad_ids.clone(), bad_authors]).is_empty());

        // A valid entry alongside an invalid one keeps the constraint
        let mixed = QueryFilter::new().id("not-hex").id(event.id.to_hex());
        assert_eq!(mixed.to_nostr_filter(), Some(Filter::new().id(event.id)));

        let filters = convert_filters_to_nostr(&[bad_ids, QueryFilter::new().kind(1)]);
        assert_eq!(filters, vec![Filter::new().kind(Kind::TextNote)]);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let filter: QueryFilter = toml::from_str(
            r##"
            kinds = [30023]
            since = 1700000000
            limit = 20

            [tags]
            "#t" = ["rust"]
            "##,
        )
        .unwrap();

        assert_eq!(filter.kinds, Some(vec![30023]));
        assert_eq!(filter.since, Some(Timestamp::from(1_700_000_000)));
        assert_eq!(filter.limit, Some(20));
        assert_eq!(filter.tags.get("#t"), Some(&vec!["rust".to_string()]));
    }
}
