use std::future::Future;

use futures::stream::{self, StreamExt};

/// Run independent jobs with at most `concurrency` in flight. Results come
/// back in completion order; callers that need input order key on the
/// returned value.
pub async fn run_bounded<I, F, Fut, T>(items: I, concurrency: usize, job: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items.into_iter().map(job))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
