//! Actors and the channels between them.
//!
//! Every message carries the span that was current when it was sent, so work
//! done on the receiving side is attributed to the caller in the logs.

use tokio::sync::mpsc;
use tracing::Span;

pub mod action_icon;
pub mod event_tap;
pub mod notification_center;
pub mod reactor;

pub type Receiver<E> = mpsc::UnboundedReceiver<(Span, E)>;

#[derive(Debug)]
pub struct Sender<E>(mpsc::UnboundedSender<(Span, E)>);

impl<E> Clone for Sender<E> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

pub fn channel<E>() -> (Sender<E>, Receiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sender(tx), rx)
}

impl<E> Sender<E> {
    /// Sends an event, ignoring a closed receiver.
    pub fn send(&self, event: E) { _ = self.try_send(event) }

    pub fn try_send(&self, event: E) -> Result<(), mpsc::error::SendError<(Span, E)>> {
        self.0.send((Span::current(), event))
    }
}
