use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Phase {
	#[serde(rename = "prima-materia")]
	PrimaMateria,
	#[serde(rename = "solutio")]
	Solutio,
	#[serde(rename = "coagulatio")]
	Coagulatio,
}
impl Phase {
	pub const ALL: [Phase; 3] = [Phase::PrimaMateria, Phase::Solutio, Phase::Coagulatio];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::PrimaMateria => "prima-materia",
			Self::Solutio => "solutio",
			Self::Coagulatio => "coagulatio",
		}
	}
}
impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Phase {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|phase| phase.as_str() == raw)
			.ok_or_else(|| format!("Unknown phase {raw:?}."))
	}
}
