//! Counts the tags seen in NFT metadata during one block and writes them as
//! counter increments to the `tags` index.

use crate::converters::format_painless_source;
use crate::data::BufferSlice;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CountTags {
    counts: HashMap<String, u64>,
}

impl CountTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_tags(&mut self, tags: &[String]) {
        for tag in tags {
            if tag.is_empty() {
                continue;
            }
            *self.counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Document IDs are the base64 of the tag, so arbitrary tag bytes stay
    /// valid in the bulk metadata.
    pub fn serialize(&self, buffer: &mut BufferSlice, index: &str) {
        let mut ordered: Vec<_> = self.counts.iter().collect();
        ordered.sort_by_key(|(tag, _)| tag.clone());
        for (tag, count) in ordered {
            let id = STANDARD.encode(tag);
            let meta = format!(r#"{{ "update" : {{ "_index": "{index}", "_id" : "{id}" }} }}"#);

            let script = format_painless_source("ctx._source.count += params.count");
            let payload = json!({
                "script": {
                    "source": script,
                    "lang": "painless",
                    "params": { "count": count },
                },
                "upsert": { "tag": tag, "count": count },
            });
            buffer.put(meta.as_bytes(), Some(payload.to_string().as_bytes()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_repeated_tags() {
        let mut tags = CountTags::new();
        tags.parse_tags(&["art".into(), "music".into(), String::new()]);
        tags.parse_tags(&["art".into()]);

        assert_eq!(tags.len(), 2);
        assert_eq!(tags.counts["art"], 2);
        assert_eq!(tags.counts["music"], 1);
    }

    #[test]
    fn serializes_counter_upserts() {
        let mut tags = CountTags::new();
        tags.parse_tags(&["art".into()]);

        let mut buffer = BufferSlice::default();
        tags.serialize(&mut buffer, "tags");
        let body = String::from_utf8(buffer.buffers().next().unwrap().to_vec()).unwrap();

        assert!(body.contains(r#""_id" : "YXJ0""#));
        assert!(body.contains("ctx._source.count += params.count"));
        assert!(body.contains(r#""upsert":{"count":1,"tag":"art"}"#));
    }
}
