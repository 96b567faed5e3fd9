//! Outbound notifications to the allowed client.

use crossbeam_channel::{Receiver, Sender, unbounded};
use mancon_types::{ClientId, Outbound};
use tracing::debug;

/// The connection layer's send side, seen from the bridge.
pub trait ClientNotifier: Send + Sync {
    /// Deliver `message` to `client`.  Delivery is best effort.
    fn notify(&self, client: &ClientId, message: Outbound);
}

/// Queues every notification on a channel for the embedding application to
/// forward.
pub struct ChannelNotifier {
    tx: Sender<(ClientId, Outbound)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<(ClientId, Outbound)>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ClientNotifier for ChannelNotifier {
    fn notify(&self, client: &ClientId, message: Outbound) {
        debug!(%client, id = %message.id, "queueing notification");
        if self.tx.send((client.clone(), message)).is_err() {
            debug!(%client, "notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mancon_types::Notification;

    #[test]
    fn notifications_arrive_in_order() {
        let (notifier, rx) = ChannelNotifier::new();
        let client = ClientId::new("a");
        let changed = Notification::HardwareStatusChanged { handles: vec![0] };
        let ended = Notification::SessionEnded {
            reason: "bye".into(),
        };
        notifier.notify(&client, Outbound::new(changed));
        notifier.notify(&client, Outbound::new(ended));

        let (to, first) = rx.try_recv().unwrap();
        assert_eq!(to, client);
        assert!(matches!(first.notification, Notification::HardwareStatusChanged { .. }));
        assert!(matches!(rx.try_recv().unwrap().1.notification, Notification::SessionEnded { .. }));
    }

    #[test]
    fn dropped_receiver_is_not_an_error() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let ended = Notification::SessionEnded {
            reason: String::new(),
        };
        notifier.notify(&ClientId::new("a"), Outbound::new(ended));
    }
}
