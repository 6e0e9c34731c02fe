use crate::socket::ConnectionId;
use tokio::sync::mpsc::UnboundedSender;

/// Receives server lifecycle notifications.
///
/// Methods are called from whichever task triggered the event and must not
/// block. Every method defaults to doing nothing.
pub trait Observer: Send + Sync {
    fn connected(&self, _id: &ConnectionId) {}

    fn disconnected(&self, _id: &ConnectionId) {}

    fn message_received(&self, _id: &ConnectionId, _text: &str) {}

    fn message_sent(&self, _id: &ConnectionId, _text: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected(ConnectionId),
    Disconnected(ConnectionId),
    MessageReceived(ConnectionId, String),
    MessageSent(ConnectionId, String),
}

/// Forwards every notification into a channel; events are dropped once the
/// receiver is gone.
impl Observer for UnboundedSender<Event> {
    fn connected(&self, id: &ConnectionId) {
        let _ = self.send(Event::Connected(id.clone()));
    }

    fn disconnected(&self, id: &ConnectionId) {
        let _ = self.send(Event::Disconnected(id.clone()));
    }

    fn message_received(&self, id: &ConnectionId, text: &str) {
        let _ = self.send(Event::MessageReceived(id.clone(), text.to_owned()));
    }

    fn message_sent(&self, id: &ConnectionId, text: &str) {
        let _ = self.send(Event::MessageSent(id.clone(), text.to_owned()));
    }
}
