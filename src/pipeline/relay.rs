//! Streaming delivery.
//!
//! Forwards teacher chunks to the transport in order and unmodified while
//! keeping a copy of everything that was actually handed over.

use crate::error::{Result, TutorError};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forward every chunk of `chunks` into `sink`.
///
/// Returns the concatenation of the forwarded chunks once the source ends.
/// If the source fails, the error is pushed into `sink` so the transport
/// aborts, and `StreamInterrupted` is returned. If the receiving side is
/// gone, forwarding stops and `StreamInterrupted` is returned; the source
/// is dropped, which cancels the upstream call.
pub async fn forward<S>(mut chunks: S, sink: &mpsc::Sender<Result<String>>) -> Result<String>
where
    S: Stream<Item = anyhow::Result<String>> + Unpin,
{
    let mut delivered = String::new();
    let mut count = 0usize;

    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                if sink.send(Ok(text.clone())).await.is_err() {
                    warn!(
                        "Client went away after {} chunks ({} bytes)",
                        count,
                        delivered.len()
                    );
                    return Err(TutorError::StreamInterrupted(
                        "client disconnected".to_string(),
                    ));
                }
                delivered.push_str(&text);
                count += 1;
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("Teacher stream failed after {} chunks: {}", count, message);
                let _ = sink
                    .send(Err(TutorError::StreamInterrupted(message.clone())))
                    .await;
                return Err(TutorError::StreamInterrupted(message));
            }
        }
    }

    debug!("Forwarded {} chunks ({} bytes)", count, delivered.len());
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_forward_preserves_order_and_text() {
        let (tx, mut rx) = mpsc::channel(8);
        let source = stream::iter(vec![
            Ok("Why ".to_string()),
            Ok(String::new()),
            Ok("does it ".to_string()),
            Ok("fail?".to_string()),
        ]);

        let delivered = forward(source, &tx).await.unwrap();
        drop(tx);

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk.unwrap());
        }
        assert_eq!(received, vec!["Why ", "does it ", "fail?"]);
        assert_eq!(delivered, received.concat());
    }

    #[tokio::test]
    async fn test_forward_source_failure() {
        let (tx, mut rx) = mpsc::channel(8);
        let source = stream::iter(vec![
            Ok("partial".to_string()),
            Err(anyhow::anyhow!("connection reset")),
            Ok("never sent".to_string()),
        ]);

        let err = forward(source, &tx).await.unwrap_err();
        assert!(matches!(err, TutorError::StreamInterrupted(_)));
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().unwrap(), "partial");
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_receiver_dropped() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let source = stream::iter(vec![Ok("hello".to_string())]);

        let err = forward(source, &tx).await.unwrap_err();
        assert!(err.to_string().contains("client disconnected"));
    }
}
