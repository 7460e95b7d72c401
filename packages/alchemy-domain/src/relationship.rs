use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
	DerivedFrom,
	SimilarTo,
	InspiredBy,
	MergedWith,
}
impl RelationshipType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::DerivedFrom => "derived_from",
			Self::SimilarTo => "similar_to",
			Self::InspiredBy => "inspired_by",
			Self::MergedWith => "merged_with",
		}
	}
}
impl fmt::Display for RelationshipType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for RelationshipType {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"derived_from" => Ok(Self::DerivedFrom),
			"similar_to" => Ok(Self::SimilarTo),
			"inspired_by" => Ok(Self::InspiredBy),
			"merged_with" => Ok(Self::MergedWith),
			_ => Err(format!("Unknown relationship type {raw:?}.")),
		}
	}
}
