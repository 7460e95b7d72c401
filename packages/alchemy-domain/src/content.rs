use unicode_normalization::UnicodeNormalization;

/// Canonical form used for deduplication: NFC, trimmed, internal whitespace runs collapsed to a
/// single space. Case is preserved.
pub fn normalize(content: &str) -> String {
	let composed: String = content.nfc().collect();

	composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn content_hash(content: &str) -> String {
	blake3::hash(normalize(content).as_bytes()).to_hex().to_string()
}
