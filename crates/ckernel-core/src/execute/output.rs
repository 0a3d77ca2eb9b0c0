//! Per-stream output buffering.

/// Holds back an incomplete UTF-8 sequence at the end of a chunk so every
/// forwarded chunk decodes cleanly. Bytes that are not UTF-8 at all pass
/// through untouched.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pending: Vec<u8>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream and return what can be forwarded.
    pub fn push(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let hold = incomplete_tail(&self.pending);
        if hold == self.pending.len() {
            return None;
        }

        let tail = self.pending.split_off(self.pending.len() - hold);
        Some(std::mem::replace(&mut self.pending, tail))
    }

    /// Take whatever is held back. Used at end of stream.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn discard(&mut self) {
        self.pending.clear();
    }
}

/// Length of a trailing, not yet complete, multi-byte UTF-8 sequence.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
