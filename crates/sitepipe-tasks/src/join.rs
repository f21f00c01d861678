use std::future::poll_fn;
use std::task::Poll;

use crate::registry::TaskError;
use crate::task::BoxFuture;

/// Drive every future on the calling task until all of them complete.
///
/// Futures are polled in the order given, so work a future performs before
/// its first suspension point happens before any later future starts. A
/// failure does not stop the others; the first failure to complete is
/// returned once every future has finished.
pub(crate) async fn join_all<'a>(
    futures: Vec<BoxFuture<'a, Result<(), TaskError>>>,
) -> Result<(), TaskError> {
    let mut slots: Vec<Option<BoxFuture<'a, Result<(), TaskError>>>> =
        futures.into_iter().map(Some).collect();
    let mut first_error: Option<TaskError> = None;

    poll_fn(move |cx| {
        let mut pending = false;

        for slot in slots.iter_mut() {
            let Some(future) = slot.as_mut() else {
                continue;
            };

            match future.as_mut().poll(cx) {
                Poll::Ready(result) => {
                    *slot = None;
                    if let Err(e) = result {
                        first_error.get_or_insert(e);
                    }
                }
                Poll::Pending => pending = true,
            }
        }

        if pending {
            Poll::Pending
        } else {
            Poll::Ready(match first_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            })
        }
    })
    .await
}
