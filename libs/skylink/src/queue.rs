use std::sync::Arc;
use std::time::Duration;

use crate::{Frame, Timestamp};

pub const DEFAULT_QUEUE_CAPACITY: usize = 15;

pub type QueuedFrame = (Timestamp, Arc<Frame>);

/// Bounded FIFO of undecoded frames. A push onto a full queue evicts the oldest entry, so the
/// producer never blocks.
pub struct FrameQueue {
    tx: flume::Sender<QueuedFrame>,
    rx: flume::Receiver<QueuedFrame>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity.max(1));
        FrameQueue { tx, rx }
    }

    /// Returns the evicted frame, if any.
    pub fn push(&self, item: QueuedFrame) -> Option<QueuedFrame> {
        let mut item = item;
        let mut evicted = None;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return evicted,
                Err(flume::TrySendError::Full(rejected)) => {
                    item = rejected;
                    if let Ok(oldest) = self.rx.try_recv() {
                        evicted = Some(oldest);
                    }
                }
                // the queue owns a receiver, so it cannot be disconnected
                Err(flume::TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    pub fn pop(&self, timeout: Duration) -> Option<QueuedFrame> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_pop(&self) -> Option<QueuedFrame> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn clear(&self) {
        self.rx.drain().for_each(drop);
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        FrameQueue::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Header, Payload};

    fn ack(n: u16) -> QueuedFrame {
        (
            Timestamp(n as i64),
            Arc::new(Frame::new(
                Header::default(),
                Payload::CommandAck {
                    command: n,
                    result: 0,
                },
            )),
        )
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = FrameQueue::default();
        for n in 0..15 {
            assert!(queue.push(ack(n)).is_none());
        }
        let (evicted, _) = queue.push(ack(15)).unwrap();
        assert_eq!(evicted, Timestamp(0));
        assert_eq!(queue.len(), 15);

        let kept: Vec<i64> = std::iter::from_fn(|| queue.try_pop())
            .map(|(ts, _)| ts.0)
            .collect();
        assert_eq!(kept, (1..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let queue = FrameQueue::new(2);
        assert!(queue.pop(Duration::from_millis(1)).is_none());
        queue.push(ack(1));
        assert_eq!(queue.pop(Duration::from_millis(1)).unwrap().0, Timestamp(1));
        assert!(queue.is_empty());
    }
}
