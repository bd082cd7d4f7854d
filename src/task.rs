use std::future::Future;

use futures::future::try_join_all;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Runs every future as its own task and collects the results in input order.
///
/// Returns on the first error. The other tasks are detached, not aborted:
/// they keep running and whatever they write to a cache stays there.
pub(crate) async fn join_detached<T, F>(futures: impl IntoIterator<Item = F>) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let handles: Vec<JoinHandle<Result<T>>> = futures.into_iter().map(tokio::spawn).collect();
    try_join_all(handles.into_iter().map(|handle| async move { handle.await? })).await
}
