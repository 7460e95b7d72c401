mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Learning, Lifecycle, Ranking, RankingWeights, Search,
	Service, Sqlite, Storage, TemperatureBand,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::Read { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::Parse { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.service.request_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "service.request_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.sqlite.path.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.sqlite.path must be non-empty.".to_string(),
		});
	}
	if cfg.storage.sqlite.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.sqlite.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	validate_embedding(cfg)?;
	validate_search(cfg)?;
	validate_ranking(cfg)?;
	validate_lifecycle(cfg)?;
	validate_learning(cfg)?;

	Ok(())
}

fn validate_embedding(cfg: &Config) -> Result<()> {
	let embedding = &cfg.embedding;

	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "embedding.model must be non-empty.".to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (model, dimensions) in &embedding.registered_dimensions {
		if *dimensions == 0 {
			return Err(Error::Validation {
				message: format!(
					"embedding.registered_dimensions.{model} must be greater than zero."
				),
			});
		}
		if model == &embedding.model && *dimensions != embedding.dimensions {
			return Err(Error::Validation {
				message: "embedding.registered_dimensions must agree with embedding.dimensions for the active model."
					.to_string(),
			});
		}
	}
	for (key, value) in &embedding.default_headers {
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!("embedding.default_headers.{key} must be a string."),
			});
		}
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	check_unit("search.relevance_floor", cfg.search.relevance_floor)?;
	check_unit("search.default_min_similarity", cfg.search.default_min_similarity)?;

	if cfg.search.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "search.candidate_multiplier must be greater than zero.".to_string(),
		});
	}
	if cfg.search.scan_batch_size == 0 {
		return Err(Error::Validation {
			message: "search.scan_batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	for (label, value) in [
		("ranking.weights.temperature", ranking.weights.temperature),
		("ranking.weights.token_usage", ranking.weights.token_usage),
		("ranking.weights.context", ranking.weights.context),
		("ranking.weights.recency", ranking.weights.recency),
		("ranking.weights.performance", ranking.weights.performance),
		("ranking.performance_alpha", ranking.performance_alpha),
	] {
		check_unit(label, value)?;
	}

	if ranking.performance_alpha == 0.0 {
		return Err(Error::Validation {
			message: "ranking.performance_alpha must be greater than zero.".to_string(),
		});
	}
	if !ranking.recency_tau_days.is_finite() || ranking.recency_tau_days <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.recency_tau_days must be a finite number greater than zero."
				.to_string(),
		});
	}

	check_band("ranking.temperature", &ranking.temperature)?;

	for (phase, band) in &ranking.phase_temperature {
		if !matches!(phase.as_str(), "prima-materia" | "solutio" | "coagulatio") {
			return Err(Error::Validation {
				message: format!(
					"ranking.phase_temperature.{phase} must name one of prima-materia, solutio, or coagulatio."
				),
			});
		}

		check_band(&format!("ranking.phase_temperature.{phase}"), band)?;
	}

	Ok(())
}

fn validate_lifecycle(cfg: &Config) -> Result<()> {
	let lifecycle = &cfg.lifecycle;

	if !lifecycle.decay_factor.is_finite()
		|| lifecycle.decay_factor <= 0.0
		|| lifecycle.decay_factor > 1.0
	{
		return Err(Error::Validation {
			message: "lifecycle.decay_factor must be in the range (0.0, 1.0].".to_string(),
		});
	}

	check_unit("lifecycle.decay_floor", lifecycle.decay_floor)?;
	check_unit("lifecycle.boost_increment", lifecycle.boost_increment)?;
	check_unit("lifecycle.cleanup_threshold", lifecycle.cleanup_threshold)?;

	for (label, value) in [
		("lifecycle.decay_interval_secs", lifecycle.decay_interval_secs),
		("lifecycle.cleanup_interval_secs", lifecycle.cleanup_interval_secs),
		("lifecycle.consolidation_interval_secs", lifecycle.consolidation_interval_secs),
		("lifecycle.batch_size", u64::from(lifecycle.batch_size)),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	Ok(())
}

fn validate_learning(cfg: &Config) -> Result<()> {
	let learning = &cfg.learning;

	check_unit("learning.learning_rate", learning.learning_rate)?;
	check_unit("learning.max_step", learning.max_step)?;
	check_unit("learning.success_threshold", learning.success_threshold)?;
	check_unit("learning.failure_threshold", learning.failure_threshold)?;
	check_unit("learning.min_confidence", learning.min_confidence)?;

	if learning.failure_threshold >= learning.success_threshold {
		return Err(Error::Validation {
			message: "learning.failure_threshold must be less than learning.success_threshold."
				.to_string(),
		});
	}
	if learning.min_samples == 0 {
		return Err(Error::Validation {
			message: "learning.min_samples must be greater than zero.".to_string(),
		});
	}
	if learning.max_patterns == 0 {
		return Err(Error::Validation {
			message: "learning.max_patterns must be greater than zero.".to_string(),
		});
	}
	if learning.training_interval_secs == 0 {
		return Err(Error::Validation {
			message: "learning.training_interval_secs must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn check_unit(label: &str, value: f32) -> Result<()> {
	if !value.is_finite() {
		return Err(Error::Validation { message: format!("{label} must be a finite number.") });
	}
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::Validation {
			message: format!("{label} must be in the range 0.0-1.0."),
		});
	}

	Ok(())
}

fn check_band(label: &str, band: &TemperatureBand) -> Result<()> {
	if !band.min.is_finite() || !band.max.is_finite() || band.min > band.max {
		return Err(Error::Validation {
			message: format!("{label}.min must be a finite number no greater than {label}.max."),
		});
	}
	if !band.falloff.is_finite() || band.falloff <= 0.0 {
		return Err(Error::Validation {
			message: format!("{label}.falloff must be greater than zero."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
	cfg.embedding.api_base = cfg.embedding.api_base.trim_end_matches('/').to_string();
	cfg.embedding.registered_dimensions.retain(|model, _| !model.trim().is_empty());
}
