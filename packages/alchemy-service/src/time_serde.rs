//! RFC 3339 rendering for timestamps in requests and reports.
//!
//! Storage keeps millisecond precision, so serialized values are truncated to the millisecond
//! and a report always matches what a later read returns.

use serde::{Deserialize, Deserializer, Serializer, de, ser};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&render(value).map_err(ser::Error::custom)?)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	parse(&String::deserialize(deserializer)?).map_err(de::Error::custom)
}

pub mod option {
	use super::*;

	pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(value) => super::serialize(value, serializer),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<String>::deserialize(deserializer)?
			.map(|raw| parse(&raw).map_err(de::Error::custom))
			.transpose()
	}
}

fn render(value: &OffsetDateTime) -> Result<String, String> {
	value
		.replace_millisecond(value.millisecond())
		.map_err(|err| err.to_string())?
		.format(&Rfc3339)
		.map_err(|err| err.to_string())
}

fn parse(raw: &str) -> Result<OffsetDateTime, String> {
	OffsetDateTime::parse(raw, &Rfc3339)
		.map_err(|err| format!("Invalid RFC 3339 timestamp {raw:?}: {err}."))
}

#[cfg(test)]
mod tests {
	use serde::{Deserialize, Serialize};
	use time::macros::datetime;

	use super::*;

	#[derive(Debug, Deserialize, PartialEq, Serialize)]
	struct Stamped {
		#[serde(with = "crate::time_serde")]
		at: OffsetDateTime,
		#[serde(with = "crate::time_serde::option", default)]
		seen: Option<OffsetDateTime>,
	}

	#[test]
	fn renders_at_storage_precision() {
		let stamped = Stamped { at: datetime!(2026-03-01 12:00:00.123456789 UTC), seen: None };
		let json = serde_json::to_string(&stamped).expect("Failed to serialize.");

		assert_eq!(json, r#"{"at":"2026-03-01T12:00:00.123Z","seen":null}"#);
	}

	#[test]
	fn missing_optional_timestamp_reads_as_none() {
		let stamped: Stamped =
			serde_json::from_str(r#"{"at":"2026-03-01T12:00:00Z"}"#).expect("Failed to parse.");

		assert_eq!(stamped, Stamped { at: datetime!(2026-03-01 12:00 UTC), seen: None });
	}

	#[test]
	fn rejects_non_rfc3339_input() {
		let err = serde_json::from_str::<Stamped>(r#"{"at":"yesterday"}"#)
			.expect_err("Free-form dates must be rejected.");

		assert!(err.to_string().contains("Invalid RFC 3339 timestamp"));
	}
}
