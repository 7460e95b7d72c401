use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Embeds `texts` through an OpenAI-compatible endpoint, returning one vector per input in
/// input order.
pub async fn embed(
	cfg: &alchemy_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;

	if !res.status().is_success() {
		let status = res.status().as_u16();
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Status { status, body: truncate(body) });
	}

	let json: Value = res.json().await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response has {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	Ok(vectors)
}

fn truncate(mut body: String) -> String {
	if let Some((cut, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
		body.truncate(cut);
	}

	body
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: "Embedding response is missing data array.".to_string(),
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding =
			item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
				Error::InvalidResponse {
					message: "Embedding item missing embedding array.".to_string(),
				}
			})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed.len(), 2);
		assert_eq!(parsed[0], vec![0.5, 1.5]);
		assert_eq!(parsed[1], vec![2.0, 3.0]);
	}

	#[test]
	fn rejects_non_numeric_components() {
		let json = serde_json::json!({ "data": [{ "index": 0, "embedding": ["x"] }] });

		assert!(matches!(parse_embedding_response(json), Err(Error::InvalidResponse { .. })));
	}
}
