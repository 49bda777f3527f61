//! Stream reconciliation loop
//!
//! Consumes the relayed byte stream one network chunk at a time,
//! decodes increments with [`StreamDecoder`], and hands each increment
//! to the caller's delta callback before the next chunk is awaited.
//! The loop is cooperative and single-task: it suspends only while
//! waiting for network data, so store updates for one increment always
//! complete before the next increment is applied.

use crate::error::{ChatRelayError, Result};
use crate::stream::decoder::StreamDecoder;
use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

/// How a reconciliation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream completed (sentinel seen or transport closed)
    Completed,
    /// The cancellation token fired; a clean stop, not an error
    Cancelled,
}

/// Consume a relayed byte stream, applying increments in arrival order
///
/// Cancellation aborts the network read and returns
/// [`StreamOutcome::Cancelled`] without surfacing an error. Any other
/// read failure is returned as an error after the increments that
/// arrived before it have been applied.
///
/// # Arguments
///
/// * `stream` - The relayed HTTP body as a stream of byte chunks
/// * `cancel` - Token bound to this send; firing it stops the read
/// * `on_delta` - Invoked once per non-empty, non-sentinel increment
///
/// # Errors
///
/// Returns `ChatRelayError::Stream` if reading a chunk fails for any
/// reason other than cancellation.
pub async fn reconcile<S, F>(
    stream: S,
    cancel: &CancellationToken,
    mut on_delta: F,
) -> Result<StreamOutcome>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
    F: FnMut(&str),
{
    tokio::pin!(stream);
    let mut decoder = StreamDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Stream reconciliation cancelled");
                return Ok(StreamOutcome::Cancelled);
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for increment in decoder.push(&chunk) {
                    on_delta(&increment);
                }
                if decoder.is_done() {
                    return Ok(StreamOutcome::Completed);
                }
            }
            Some(Err(e)) => {
                return Err(ChatRelayError::Stream(format!("Read failed: {}", e)).into());
            }
            None => break,
        }
    }

    // Transport closed without a sentinel; flush the carry buffer.
    if let Some(increment) = decoder.finish() {
        on_delta(&increment);
    }
    Ok(StreamOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&[u8]]) -> Vec<reqwest::Result<Bytes>> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    #[tokio::test]
    async fn test_reconcile_applies_in_order() {
        let stream = futures::stream::iter(chunks(&[
            b"data: one\n\n",
            b"data: two\n\nda",
            b"ta: three\n\ndata: [DONE]\n\n",
        ]));
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let outcome = reconcile(stream, &cancel, |delta| seen.push(delta.to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_reconcile_sentinel_stops_before_trailing_bytes() {
        let stream = futures::stream::iter(chunks(&[
            b"data: A\n\ndata: B\n\ndata: [DONE]\n\ndata: C\n\n",
        ]));
        let cancel = CancellationToken::new();
        let mut content = String::new();

        let outcome = reconcile(stream, &cancel, |delta| content.push_str(delta))
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(content, "AB");
    }

    #[tokio::test]
    async fn test_reconcile_transport_close_flushes_tail() {
        let stream = futures::stream::iter(chunks(&[b"data: partial tail"]));
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let outcome = reconcile(stream, &cancel, |delta| seen.push(delta.to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(seen, vec!["partial tail"]);
    }

    #[tokio::test]
    async fn test_reconcile_pre_cancelled_is_clean_stop() {
        let stream = futures::stream::iter(chunks(&[b"data: never seen\n\n"]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut seen: Vec<String> = Vec::new();

        let outcome = reconcile(stream, &cancel, |delta| seen.push(delta.to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_cancel_mid_stream() {
        // A pending stream that never yields keeps the loop suspended
        // at the network read; cancellation must win the race.
        let stream = futures::stream::pending::<reqwest::Result<Bytes>>();
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let outcome = reconcile(stream, &cancel, |_| {}).await.unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_cancellation_is_idempotent() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        cancel.cancel(); // second cancel is a no-op, not an error

        let stream = futures::stream::iter(chunks(&[b"data: x\n\n"]));
        let outcome = reconcile(stream, &cancel, |_| {}).await.unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled);
    }
}
