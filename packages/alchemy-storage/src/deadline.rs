use std::{future::Future, time::Duration};

use tokio::time::{self, Instant};

use crate::Error;

/// Optional point in time after which an operation gives up with [`Error::Timeout`].
///
/// Futures run under [`Deadline::run`] are dropped when the deadline passes. Any `sqlx`
/// transaction they hold is rolled back on drop, so an expired write leaves no partial state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);
impl Deadline {
	pub fn none() -> Self {
		Self(None)
	}

	pub fn after(timeout: Duration) -> Self {
		Self(Some(Instant::now() + timeout))
	}

	pub fn at(instant: Instant) -> Self {
		Self(Some(instant))
	}

	pub fn is_expired(&self) -> bool {
		self.0.map(|at| Instant::now() >= at).unwrap_or(false)
	}

	pub fn check(&self) -> Result<(), Error> {
		if self.is_expired() { Err(Error::Timeout) } else { Ok(()) }
	}

	pub async fn run<F, T, E>(&self, fut: F) -> Result<T, E>
	where
		F: Future<Output = Result<T, E>>,
		E: From<Error>,
	{
		match self.0 {
			None => fut.await,
			Some(at) => time::timeout_at(at, fut).await.map_err(|_| E::from(Error::Timeout))?,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn expired_deadline_aborts_pending_work() {
		let deadline = Deadline::after(Duration::from_millis(10));
		let result: Result<(), Error> = deadline
			.run(async {
				time::sleep(Duration::from_secs(5)).await;

				Ok(())
			})
			.await;

		assert!(matches!(result, Err(Error::Timeout)));
		assert!(deadline.check().is_err());
	}

	#[tokio::test]
	async fn no_deadline_never_expires() {
		let deadline = Deadline::none();
		let value: Result<u8, Error> = deadline.run(async { Ok(7) }).await;

		assert_eq!(value.expect("Work without a deadline must complete."), 7);
		assert!(deadline.check().is_ok());
	}
}
