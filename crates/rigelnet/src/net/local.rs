use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::codec::Packet;
use crate::event::DisconnectReason;

#[derive(Debug, Default)]
struct LinkState {
    inboxes: [VecDeque<Packet>; 2],
    ended: Option<(DisconnectReason, String)>,
}

/// One side of an in-process connection between a server slot and a client.
#[derive(Debug, Clone)]
pub struct LocalLinkEnd {
    state: Rc<RefCell<LinkState>>,
    side: usize,
}

impl LocalLinkEnd {
    pub fn pair() -> (Self, Self) {
        let state = Rc::new(RefCell::new(LinkState::default()));
        (
            Self {
                state: Rc::clone(&state),
                side: 0,
            },
            Self { state, side: 1 },
        )
    }

    pub fn push_to_peer(&self, packets: Vec<Packet>) {
        let mut state = self.state.borrow_mut();
        state.inboxes[1 - self.side].extend(packets);
    }

    pub fn take_inbox(&self) -> Vec<Packet> {
        let mut state = self.state.borrow_mut();
        state.inboxes[self.side].drain(..).collect()
    }

    /// Marks the link ended. Only the first call records its reason.
    pub fn close(&self, reason: DisconnectReason, message: &str) {
        let mut state = self.state.borrow_mut();
        if state.ended.is_none() {
            state.ended = Some((reason, message.to_owned()));
        }
    }

    pub fn ended(&self) -> Option<(DisconnectReason, String)> {
        self.state.borrow().ended.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_cross_to_the_other_side() {
        let (a, b) = LocalLinkEnd::pair();
        a.push_to_peer(vec![Packet::from(vec![1u8]), Packet::from(vec![2u8])]);

        assert!(a.take_inbox().is_empty());
        let received = b.take_inbox();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].as_bytes(), &[2]);
        assert!(b.take_inbox().is_empty());
    }

    #[test]
    fn first_close_wins() {
        let (a, b) = LocalLinkEnd::pair();
        assert!(b.ended().is_none());

        a.close(DisconnectReason::Error, "boom");
        b.close(DisconnectReason::Graceful, "bye");
        assert_eq!(b.ended(), Some((DisconnectReason::Error, "boom".to_owned())));
    }
}
