//! Accumulates bulk action/payload pairs into NDJSON buffers capped at the
//! configured request size.

/// Default cap for a single bulk request body, in bytes.
pub const DEFAULT_MAX_BULK_SIZE: usize = 4 * 1024 * 1024;

pub struct BufferSlice {
    buffers: Vec<Vec<u8>>,
    max_size: usize,
}

impl BufferSlice {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffers: vec![Vec::new()],
            max_size,
        }
    }

    /// Appends `meta\n` and, when present, `payload\n` to the current buffer,
    /// starting a fresh buffer when the entry would cross the size cap.
    pub fn put(&mut self, meta: &[u8], payload: Option<&[u8]>) {
        let entry_len = meta.len() + 1 + payload.map_or(0, |p| p.len() + 1);

        let current = self.buffers.last_mut().expect("at least one buffer");
        let target = if !current.is_empty() && current.len() + entry_len > self.max_size {
            self.buffers.push(Vec::with_capacity(entry_len));
            self.buffers.last_mut().expect("just pushed")
        } else {
            current
        };

        target.extend_from_slice(meta);
        target.push(b'\n');
        if let Some(payload) = payload {
            target.extend_from_slice(payload);
            target.push(b'\n');
        }
    }

    /// The accumulated buffers, skipping a trailing empty one.
    pub fn buffers(&self) -> impl Iterator<Item = &[u8]> {
        self.buffers
            .iter()
            .filter(|buffer| !buffer.is_empty())
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(Vec::is_empty)
    }
}

impl Default for BufferSlice {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BULK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_meta_and_payload_lines() {
        let mut slice = BufferSlice::new(1024);
        slice.put(br#"{"index":{"_id":"a"}}"#, Some(br#"{"x":1}"#));
        slice.put(br#"{"delete":{"_id":"b"}}"#, None);

        let buffers: Vec<_> = slice.buffers().collect();
        assert_eq!(buffers.len(), 1);
        assert_eq!(
            buffers[0],
            b"{\"index\":{\"_id\":\"a\"}}\n{\"x\":1}\n{\"delete\":{\"_id\":\"b\"}}\n"
        );
    }

    #[test]
    fn splits_at_the_size_cap() {
        let mut slice = BufferSlice::new(32);
        for _ in 0..4 {
            slice.put(b"0123456789", Some(b"0123456789"));
        }

        let buffers: Vec<_> = slice.buffers().collect();
        // Each entry is 22 bytes, so only one fits per 32-byte buffer.
        assert_eq!(buffers.len(), 4);
        assert!(buffers.iter().all(|b| b.len() == 22));
    }

    #[test]
    fn oversized_entry_still_lands_in_one_buffer() {
        let mut slice = BufferSlice::new(8);
        slice.put(b"0123456789", Some(b"0123456789"));

        let buffers: Vec<_> = slice.buffers().collect();
        assert_eq!(buffers.len(), 1);
    }

    #[test]
    fn empty_slice_yields_no_buffers() {
        let slice = BufferSlice::new(16);
        assert!(slice.is_empty());
        assert_eq!(slice.buffers().count(), 0);
    }
}
