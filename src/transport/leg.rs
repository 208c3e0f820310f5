//! Channel-backed leg for hosts that stream frames into a response body.

use tokio::sync::mpsc;

use crate::core::{Leg, LegClosed};

/// What a [`ChannelLeg`] hands to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegEvent {
    /// A frame to write to the response.
    Frame(String),
    /// The session closed the leg; finish the response.
    Closed,
}

/// A [`Leg`] forwarding frames into an unbounded channel.
///
/// Writes fail once the receiving half is dropped, i.e. once the host's
/// response is gone.
#[derive(Debug)]
pub struct ChannelLeg {
    tx: mpsc::UnboundedSender<LegEvent>,
    closed: bool,
}

impl ChannelLeg {
    /// A leg and the receiver the host drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LegEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, closed: false }, rx)
    }
}

impl Leg for ChannelLeg {
    fn write_frame(&mut self, frame: &str) -> Result<(), LegClosed> {
        if self.closed {
            return Err(LegClosed);
        }
        self.tx
            .send(LegEvent::Frame(frame.to_owned()))
            .map_err(|_| LegClosed)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(LegEvent::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_then_close() {
        let (mut leg, mut rx) = ChannelLeg::channel();
        leg.write_frame("o").unwrap();
        leg.close();
        leg.close();

        assert_eq!(rx.try_recv().unwrap(), LegEvent::Frame("o".into()));
        assert_eq!(rx.try_recv().unwrap(), LegEvent::Closed);
        assert!(rx.try_recv().is_err());
        assert_eq!(leg.write_frame("h"), Err(LegClosed));
    }

    #[test]
    fn dropped_receiver_refuses_writes() {
        let (mut leg, rx) = ChannelLeg::channel();
        drop(rx);
        assert_eq!(leg.write_frame("a[\"x\"]"), Err(LegClosed));
    }
}
