//! Byte and bit shuffle transforms.
//!
//! Both operate on the `len / typesize` whole elements at the front of the
//! buffer; trailing bytes that do not form a whole element are copied
//! through unchanged.

/// Group byte `j` of every element together: `out[j*n + i] = src[i*ts + j]`.
pub fn shuffle(typesize: usize, src: &[u8]) -> Vec<u8> {
    let mut out = src.to_vec();
    if typesize <= 1 {
        return out;
    }
    let n = src.len() / typesize;
    for i in 0..n {
        for j in 0..typesize {
            out[j * n + i] = src[i * typesize + j];
        }
    }
    out
}

pub fn unshuffle(typesize: usize, src: &[u8], dest: &mut [u8]) {
    dest[..src.len()].copy_from_slice(src);
    if typesize <= 1 {
        return;
    }
    let n = src.len() / typesize;
    for i in 0..n {
        for j in 0..typesize {
            dest[i * typesize + j] = src[j * n + i];
        }
    }
}

/// Bit-level transpose: bit `k` of byte `j` of element `i` lands at bit
/// position `(j*8 + k) * n + i` of the output region.
pub fn bitshuffle(typesize: usize, src: &[u8]) -> Vec<u8> {
    let ts = typesize.max(1);
    let mut out = src.to_vec();
    let n = src.len() / ts;
    let region = n * ts;
    out[..region].iter_mut().for_each(|b| *b = 0);
    for i in 0..n {
        for j in 0..ts {
            let byte = src[i * ts + j];
            for k in 0..8 {
                if byte >> k & 1 == 1 {
                    let pos = (j * 8 + k) * n + i;
                    out[pos / 8] |= 1 << (pos % 8);
                }
            }
        }
    }
    out
}

pub fn bitunshuffle(typesize: usize, src: &[u8], dest: &mut [u8]) {
    let ts = typesize.max(1);
    let n = src.len() / ts;
    let region = n * ts;
    dest[..src.len()].copy_from_slice(src);
    dest[..region].iter_mut().for_each(|b| *b = 0);
    for i in 0..n {
        for j in 0..ts {
            let mut byte = 0u8;
            for k in 0..8 {
                let pos = (j * 8 + k) * n + i;
                if src[pos / 8] >> (pos % 8) & 1 == 1 {
                    byte |= 1 << k;
                }
            }
            dest[i * ts + j] = byte;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_shuffle_groups_significance() {
        let src: Vec<u8> = [1u32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = shuffle(4, &src);
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert!(out[3..].iter().all(|&b| b == 0));

        let mut back = vec![0u8; src.len()];
        unshuffle(4, &out, &mut back);
        assert_eq!(back, src);
    }

    #[test]
    fn leftover_bytes_pass_through() {
        let src: Vec<u8> = (0u8..11).collect();
        let out = shuffle(4, &src);
        assert_eq!(&out[8..], &[8, 9, 10]);
        let mut back = vec![0u8; 11];
        unshuffle(4, &out, &mut back);
        assert_eq!(back, src);
    }

    #[test]
    fn bitshuffle_roundtrip() {
        let src: Vec<u8> = (0u16..300).map(|v| (v * 7 % 251) as u8).collect();
        for ts in [1, 2, 4, 8, 3] {
            let out = bitshuffle(ts, &src);
            let mut back = vec![0u8; src.len()];
            bitunshuffle(ts, &out, &mut back);
            assert_eq!(back, src, "typesize {ts}");
        }
    }

    #[test]
    fn bitshuffle_packs_low_entropy() {
        // Eight 1-byte elements all equal to 1: only bit-row 0 is set.
        let out = bitshuffle(1, &[1u8; 8]);
        assert_eq!(out, vec![0xFF, 0, 0, 0, 0, 0, 0, 0]);
    }
}
