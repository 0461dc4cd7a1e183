//! Response streaming adapter.
//!
//! The orchestrator pushes answer tokens into a `StreamSink`; the caller
//! consumes an ordered, finite sequence of `StreamEvent`s terminated by
//! exactly one `Done`. A dropped receiver turns every further `token`
//! call into a cancellation signal.

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
}

const CHANNEL_CAPACITY: usize = 64;

pub fn channel() -> (StreamSink, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (StreamSink { tx }, rx)
}

pub struct StreamSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl StreamSink {
    /// Forward one token verbatim. Returns `false` when the caller has
    /// disconnected; producers must stop pulling work at that point.
    pub async fn token(&self, text: impl Into<String>) -> bool {
        self.tx.send(StreamEvent::Token(text.into())).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Emit the end-of-stream marker. Consumes the sink so `Done` is sent
    /// exactly once per stream.
    pub async fn finish(self) {
        let _ = self.tx.send(StreamEvent::Done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn empty_stream_still_ends_with_one_done() {
        let (sink, rx) = channel();
        sink.finish().await;
        let events = drain(rx).await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn tokens_arrive_in_order_then_done() {
        let (sink, rx) = channel();
        tokio::spawn(async move {
            for token in ["La", " póliza", " cubre"] {
                assert!(sink.token(token).await);
            }
            sink.finish().await;
        });

        let events = drain(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("La".to_string()),
                StreamEvent::Token(" póliza".to_string()),
                StreamEvent::Token(" cubre".to_string()),
                StreamEvent::Done,
            ]
        );
        let done_count = events.iter().filter(|e| **e == StreamEvent::Done).count();
        assert_eq!(done_count, 1);
    }

    #[tokio::test]
    async fn dropped_receiver_signals_cancellation() {
        let (sink, rx) = channel();
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.token("ignored").await);
        sink.finish().await; // must not panic
    }
}
