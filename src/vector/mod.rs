//! VectorCodec (C5): the FAFCAS protocol — normalize to unit length, store
//! raw little-endian float32 bytes, score by dot product.
//!
//! Grounded in the teacher's `storage::sqlite_vec` byte-reinterpretation
//! code (`f32_slice_as_bytes`/`bytes_as_f32_slice`), adapted here to the
//! brute-force-in-application-code contract spec.md §4.5/§9 mandates
//! instead of the teacher's `sqlite-vec` extension approach.

/// Encode a raw embedding as its FAFCAS byte representation: L2-normalize,
/// then reinterpret as little-endian `float32` bytes. Zero-magnitude input
/// is emitted as all-zero bytes rather than dividing by zero (spec.md §4.5).
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let norm = l2_norm(vector);
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    if norm > 1e-6 {
        for component in vector {
            bytes.extend_from_slice(&(component / norm).to_le_bytes());
        }
    } else {
        bytes.resize(vector.len() * 4, 0);
    }
    bytes
}

/// Decode a FAFCAS byte blob back into a `Vec<f32>`. Copies into an aligned
/// buffer (spec.md §9: readers must guard against unaligned loads) rather
/// than reinterpreting the byte slice in place.
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Dot product of two equal-length vectors. For unit vectors this equals
/// cosine similarity (spec.md §4.5).
pub fn score(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Dot product between a raw vector and a decoded FAFCAS blob, used by
/// brute-force candidate scanning in the store.
pub fn score_bytes(query: &[f32], blob: &[u8]) -> f32 {
    let mut acc = 0.0f32;
    for (i, chunk) in blob.chunks_exact(4).enumerate() {
        let component = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        acc += query.get(i).copied().unwrap_or(0.0) * component;
    }
    acc
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// `true` iff `vector`'s L2 norm is within `1e-5` of 1, or is exactly zero
/// (invariant I3 / property P4).
pub fn is_unit_norm(vector: &[f32]) -> bool {
    let norm = l2_norm(vector);
    norm == 0.0 || (norm - 1.0).abs() <= 1e-5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_is_unit_norm() {
        let raw = vec![3.0_f32, 4.0, 0.0];
        let decoded = decode(&encode(&raw));
        assert!(is_unit_norm(&decoded));
        assert!((decoded[0] - 0.6).abs() < 1e-6);
        assert!((decoded[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_encodes_to_zero_bytes() {
        let raw = vec![0.0_f32; 4];
        let bytes = encode(&raw);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn score_of_identical_unit_vectors_is_one() {
        let raw = vec![1.0_f32, 2.0, 2.0];
        let decoded = decode(&encode(&raw));
        let self_score = score(&decoded, &decoded);
        assert!((self_score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn score_bytes_matches_decode_then_score() {
        let a = vec![1.0_f32, 0.0, 0.0];
        let b = vec![0.5_f32, 0.5, 0.0];
        let blob = encode(&b);
        let decoded_score = score(&decode(&encode(&a)), &decode(&blob));
        let blob_score = score_bytes(&decode(&encode(&a)), &blob);
        assert!((decoded_score - blob_score).abs() < 1e-6);
    }

    #[test]
    fn byte_length_is_four_times_dimension() {
        let raw = vec![1.0_f32; 7];
        assert_eq!(encode(&raw).len(), 28);
    }
}
