//! Event handoff between a completion context and the main loop.
//!
//! A radio driver posts an event from its interrupt (or receive thread);
//! the main loop takes it on its next iteration. Like an interrupt flag
//! register, each distinct event is held at most once: posting an event
//! that is already pending is dropped, but a pending event never blocks a
//! different one. The main loop can suspend delivery while it works on
//! the current event.

use std::cell::RefCell;

use critical_section::Mutex;

#[derive(Debug)]
struct Slot<T> {
    items: Vec<T>,
    suspended: bool,
}

/// A mailbox of pending events guarded by critical sections.
pub struct Mailbox<T> {
    slot: Mutex<RefCell<Slot<T>>>,
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox accepting posts.
    pub const fn new() -> Self {
        Mailbox {
            slot: Mutex::new(RefCell::new(Slot {
                items: Vec::new(),
                suspended: false,
            })),
        }
    }

    /// Take the oldest pending item, if any.
    pub fn take(&self) -> Option<T> {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow(cs).borrow_mut();
            if slot.items.is_empty() {
                None
            } else {
                Some(slot.items.remove(0))
            }
        })
    }

    /// Drop posts until [`Mailbox::resume`] is called.
    pub fn suspend(&self) {
        critical_section::with(|cs| self.slot.borrow(cs).borrow_mut().suspended = true);
    }

    /// Accept posts again.
    pub fn resume(&self) {
        critical_section::with(|cs| self.slot.borrow(cs).borrow_mut().suspended = false);
    }

    /// Check whether posts are currently dropped.
    pub fn is_suspended(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).borrow().suspended)
    }

    /// Check whether an item is waiting.
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| !self.slot.borrow(cs).borrow().items.is_empty())
    }
}

impl<T: PartialEq> Mailbox<T> {
    /// Deliver `item` unless an equal item is pending or delivery is suspended.
    ///
    /// Returns `false` when the item was dropped.
    pub fn post(&self, item: T) -> bool {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow(cs).borrow_mut();
            if slot.suspended || slot.items.contains(&item) {
                return false;
            }
            slot.items.push(item);
            true
        })
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_and_take() {
        let mailbox = Mailbox::new();
        assert!(mailbox.post(1));
        assert!(mailbox.is_pending());
        assert_eq!(mailbox.take(), Some(1));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_repeated_post_is_dropped() {
        let mailbox = Mailbox::new();
        assert!(mailbox.post("done"));
        assert!(!mailbox.post("done"));
        assert_eq!(mailbox.take(), Some("done"));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_distinct_events_are_kept_in_order() {
        let mailbox = Mailbox::new();
        assert!(mailbox.post("received"));
        assert!(mailbox.post("done"));
        assert_eq!(mailbox.take(), Some("received"));
        assert_eq!(mailbox.take(), Some("done"));
    }

    #[test]
    fn test_suspended_mailbox_drops_posts() {
        let mailbox = Mailbox::new();
        mailbox.suspend();
        assert!(mailbox.is_suspended());
        assert!(!mailbox.post(7));
        assert!(!mailbox.is_pending());

        mailbox.resume();
        assert!(mailbox.post(7));
        assert_eq!(mailbox.take(), Some(7));
    }

    #[test]
    fn test_post_from_another_thread() {
        static MAILBOX: Mailbox<u32> = Mailbox::new();
        let shared = Arc::new(Mailbox::new());

        let poster = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                MAILBOX.post(42);
                shared.post(43)
            })
        };
        assert!(poster.join().unwrap());
        assert_eq!(MAILBOX.take(), Some(42));
        assert_eq!(shared.take(), Some(43));
    }
}
