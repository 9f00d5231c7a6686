use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use autopilot_core_types::CoreError;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Publish to current subscribers, returning how many received it.
    fn publish(&self, event: E) -> Result<usize, CoreError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// In-memory broadcast bus. Publishing with no subscribers is not an error.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, CoreError> {
        if self.sender.receiver_count() == 0 {
            trace!("event dropped: no subscribers");
            return Ok(0);
        }
        self.sender
            .send(event)
            .map_err(|err| CoreError::new(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = InMemoryBus::<u32>::new(4);
        assert_eq!(bus.publish(7).unwrap(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = InMemoryBus::<&'static str>::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish("start").unwrap(), 1);
        bus.publish("ok").unwrap();

        assert_eq!(rx.recv().await.unwrap(), "start");
        assert_eq!(rx.recv().await.unwrap(), "ok");
    }
}
