use time::OffsetDateTime;

use crate::{Error, Result};

pub(crate) fn to_millis(ts: OffsetDateTime) -> i64 {
	(ts.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(ms: i64) -> Result<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
		.map_err(|err| Error::Corrupt(format!("Timestamp {ms} is out of range: {err}.")))
}

pub(crate) fn from_millis_opt(ms: Option<i64>) -> Result<Option<OffsetDateTime>> {
	ms.map(from_millis).transpose()
}
