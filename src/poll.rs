use std::{future::Future, time::Duration};

use anyhow::{bail, Result};

#[derive(Debug)]
pub enum PollStatus<T> {
    Pending,
    Complete(T),
    Failed(String),
}

/// Sleeps `interval`, fetches, and repeats until `fetch` reports a terminal status.
///
/// There is no retry: an error returned by `fetch` ends the wait. There is no upper
/// bound on the number of attempts either, the server decides when a job is done.
pub async fn poll_until<T, F, Fut>(interval: Duration, mut fetch: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    loop {
        tokio::time::sleep(interval).await;
        match fetch().await? {
            PollStatus::Pending => continue,
            PollStatus::Complete(value) => return Ok(value),
            PollStatus::Failed(message) => bail!(message),
        }
    }
}
