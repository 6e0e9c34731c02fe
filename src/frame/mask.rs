/// XORs `payload` against `key`, cycling the key from index 0.
///
/// Applying the same key twice restores the original bytes.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}
