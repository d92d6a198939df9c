//! Incremental UTF-8 decoding: bytes arrive in arbitrary chunk sizes and a
//! multi-byte code point may straddle two reads.

/// Decodes a byte stream to text, carrying over any undecodable tail bytes
/// to the next call. A genuinely invalid (not just incomplete) sequence, or
/// a tail still incomplete at `finish`, is lossily replaced with `U+FFFD`.
#[derive(Debug, Default)]
pub struct IncrementalDecoder {
    pending: Vec<u8>,
}

impl IncrementalDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning as much text as can be produced
    /// without guessing at a still-incomplete trailing sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let (text, consumed) = decode_prefix(&self.pending);
        self.pending.drain(..consumed);
        text
    }

    /// Flush any undecodable tail at stream EOF, lossily replacing it.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Decode as much of `buf` as forms complete, valid UTF-8, leaving any
/// trailing incomplete sequence (valid *prefix* of a multi-byte code point)
/// unconsumed. Returns `(decoded_text, bytes_consumed)`.
fn decode_prefix(buf: &[u8]) -> (String, usize) {
    match std::str::from_utf8(buf) {
        Ok(text) => (text.to_string(), buf.len()),
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            let text = std::str::from_utf8(&buf[..valid_up_to])
                .expect("prefix validated by error_len boundary")
                .to_string();
            match e.error_len() {
                // A malformed (not just incomplete) sequence: replace it and
                // keep going from just past it rather than stalling forever.
                Some(bad_len) => {
                    let mut text = text;
                    text.push('\u{FFFD}');
                    (text, valid_up_to + bad_len)
                }
                // Incomplete trailing sequence — wait for more bytes.
                None => (text, valid_up_to),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_whole_chunks_directly() {
        let mut decoder = IncrementalDecoder::new();
        assert_eq!(decoder.decode("hello".as_bytes()), "hello");
    }

    #[test]
    fn carries_partial_multibyte_sequence_across_calls() {
        let snowman = "\u{2603}".as_bytes(); // 3 bytes: E2 98 83
        let mut decoder = IncrementalDecoder::new();
        assert_eq!(decoder.decode(&snowman[..1]), "");
        assert_eq!(decoder.decode(&snowman[1..2]), "");
        assert_eq!(decoder.decode(&snowman[2..3]), "\u{2603}");
    }

    #[test]
    fn four_byte_code_point_one_byte_at_a_time_yields_one_code_point() {
        let emoji = "\u{1F600}".as_bytes(); // 4 bytes
        let mut decoder = IncrementalDecoder::new();
        let mut out = String::new();
        for byte in emoji {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        assert_eq!(out, "\u{1F600}");
    }

    #[test]
    fn decoding_is_chunk_size_independent() {
        let text = "hello \u{2603} world \u{1F600}!";
        let bytes = text.as_bytes();
        for chunk_size in 1..=bytes.len() {
            let mut decoder = IncrementalDecoder::new();
            let mut out = String::new();
            for chunk in bytes.chunks(chunk_size) {
                out.push_str(&decoder.decode(chunk));
            }
            out.push_str(&decoder.finish());
            assert_eq!(out, text, "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn trailing_partial_sequence_at_finish_is_replaced() {
        let snowman = "\u{2603}".as_bytes();
        let mut decoder = IncrementalDecoder::new();
        decoder.decode(&snowman[..2]);
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
