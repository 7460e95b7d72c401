//! Fixed-width binary form of embedding vectors and the similarity measure used to compare them.
//!
//! Vectors are stored as consecutive little-endian IEEE-754 `f32` values, four bytes per
//! dimension, with no header. The stored dimension is therefore always `bytes.len() / 4`.

pub const BYTES_PER_DIM: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VectorError {
	#[error("Vector blob length {len} is not a multiple of {BYTES_PER_DIM}.")]
	Length { len: usize },
	#[error("Vector component {index} is not a finite number.")]
	NonFinite { index: usize },
}

pub fn encode(vector: &[f32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(vector.len() * BYTES_PER_DIM);

	for value in vector {
		out.extend_from_slice(&value.to_le_bytes());
	}

	out
}

pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, VectorError> {
	if bytes.len() % BYTES_PER_DIM != 0 {
		return Err(VectorError::Length { len: bytes.len() });
	}

	let mut out = Vec::with_capacity(bytes.len() / BYTES_PER_DIM);

	for (index, chunk) in bytes.chunks_exact(BYTES_PER_DIM).enumerate() {
		let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);

		if !value.is_finite() {
			return Err(VectorError::NonFinite { index });
		}

		out.push(value);
	}

	Ok(out)
}

/// Cosine similarity of two vectors.
///
/// Returns `None` when the inputs are empty, differ in length, or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.is_empty() || a.len() != b.len() {
		return None;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let x = f64::from(*x);
		let y = f64::from(*y);

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return None;
	}

	Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

pub fn is_zero_norm(vector: &[f32]) -> bool {
	vector.iter().all(|value| *value == 0.0)
}
