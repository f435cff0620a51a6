use encoding_rs::{CoderResult, Encoding};

use crate::error::Result;

/// Pull based byte source, an empty block means it is exhausted.
pub trait DataSupplier {
    fn next_data(&mut self, max: usize) -> Result<Vec<u8>>;
}

/// Number of bytes up to and including the first `terminator`.
///
/// Reading stops at `limit` bytes, in which case exactly the limit is
/// returned. When the supplier runs dry first, everything consumed so far is
/// returned. A byte order mark counts towards the size but is never matched.
pub fn size_until_termination(
    encoding: &'static Encoding,
    terminator: char,
    supplier: &mut dyn DataSupplier,
    limit: Option<u64>,
    block_size: usize,
) -> Result<u64> {
    let mut decoder = encoding.new_decoder();
    let block_size = block_size.max(1);
    let mut consumed: u64 = 0;
    let mut decoded = String::new();

    loop {
        let want = match limit {
            Some(limit) if consumed >= limit => return Ok(limit),
            Some(limit) => block_size.min((limit - consumed) as usize),
            None => block_size,
        };

        let block = supplier.next_data(want)?;
        if block.is_empty() {
            return Ok(consumed);
        }

        // One byte at a time so characters split across blocks still decode
        for byte in block {
            consumed += 1;

            decoded.clear();
            decoded.reserve(decoder.max_utf8_buffer_length(1).unwrap_or(16));
            let single = [byte];
            let mut input = &single[..];
            loop {
                let (result, read, _) = decoder.decode_to_string(input, &mut decoded, false);
                input = &input[read..];
                match result {
                    CoderResult::InputEmpty => break,
                    CoderResult::OutputFull => decoded.reserve(16),
                }
            }

            if decoded.contains(terminator) {
                return Ok(consumed);
            }
            if limit == Some(consumed) {
                return Ok(consumed);
            }
        }
    }
}
