//! Test payloads.

/// Deterministic bytes of length `len`, distinct per `seed`.
#[allow(dead_code)]
pub fn chunk_data(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_mul(17).wrapping_add(i as u8))
        .collect()
}

/// Split `data` into `chunk_size` pieces, keeping a final short piece.
#[allow(dead_code)]
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}
