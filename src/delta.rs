//! Delta transform against a reference buffer.
//!
//! Each byte is XORed with the reference byte at the same logical
//! position.  Positions past the end of the reference wrap around, so a
//! short reference still covers an arbitrarily long chunk.  An empty
//! reference leaves the data untouched.
//!
//! XOR is its own inverse, so [`decode`] is [`encode`] applied in place.

/// `dest[i] = src[i] ^ reference[(offset + i) % reference.len()]`.
///
/// `dest` must be at least as long as `src`.
pub fn encode(reference: &[u8], offset: usize, src: &[u8], dest: &mut [u8]) {
    let dest = &mut dest[..src.len()];
    if reference.is_empty() {
        dest.copy_from_slice(src);
        return;
    }
    for (i, (d, s)) in dest.iter_mut().zip(src).enumerate() {
        *d = s ^ reference[(offset + i) % reference.len()];
    }
}

/// Undo [`encode`] in place.
pub fn decode(reference: &[u8], offset: usize, buf: &mut [u8]) {
    if reference.is_empty() {
        return;
    }
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= reference[(offset + i) % reference.len()];
    }
}
