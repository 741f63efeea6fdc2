//! Framebuffer resize notifications.
//!
//! The window event handler posts into a [`PendingResize`] mailbox and the
//! frame loop takes from it at the top of the next frame. Only the latest
//! notification is kept.

use std::sync::{Arc, Mutex, MutexGuard};

/// New framebuffer size in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferResized {
    pub width: u32,
    pub height: u32,
}

impl FramebufferResized {
    /// Creates a notification.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, e.g. while minimized.
    #[inline]
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Single-slot, latest-wins resize mailbox.
///
/// Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct PendingResize {
    slot: Arc<Mutex<Option<FramebufferResized>>>,
}

impl PendingResize {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `event`, replacing any notification not yet taken.
    pub fn post(&self, event: FramebufferResized) {
        let mut slot = self.lock();
        if let Some(previous) = slot.replace(event) {
            tracing::trace!(
                "Resize {}x{} superseded by {}x{}",
                previous.width,
                previous.height,
                event.width,
                event.height
            );
        }
    }

    /// Removes and returns the pending notification.
    pub fn take(&self) -> Option<FramebufferResized> {
        self.lock().take()
    }

    /// Removes the pending notification only if `predicate` accepts it.
    pub fn take_if(
        &self,
        predicate: impl FnOnce(&FramebufferResized) -> bool,
    ) -> Option<FramebufferResized> {
        self.lock().take_if(|event| predicate(event))
    }

    /// Returns the pending notification without removing it.
    pub fn peek(&self) -> Option<FramebufferResized> {
        *self.lock()
    }

    /// True when a notification is waiting.
    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<FramebufferResized>> {
        // The slot holds plain data, so a poisoned lock is still consistent.
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mailbox() {
        let pending = PendingResize::new();
        assert!(!pending.is_pending());
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_latest_notification_wins() {
        let pending = PendingResize::new();
        pending.post(FramebufferResized::new(800, 600));
        pending.post(FramebufferResized::new(1024, 768));

        assert_eq!(pending.take(), Some(FramebufferResized::new(1024, 768)));
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_peek_keeps_notification() {
        let pending = PendingResize::new();
        pending.post(FramebufferResized::new(0, 0));

        assert_eq!(pending.peek(), Some(FramebufferResized::new(0, 0)));
        assert!(pending.is_pending());
    }

    #[test]
    fn test_take_if_leaves_rejected_notification() {
        let pending = PendingResize::new();
        pending.post(FramebufferResized::new(0, 0));

        assert_eq!(pending.take_if(|event| !event.is_zero_area()), None);
        assert!(pending.is_pending());

        pending.post(FramebufferResized::new(800, 600));
        assert_eq!(
            pending.take_if(|event| !event.is_zero_area()),
            Some(FramebufferResized::new(800, 600))
        );
        assert!(!pending.is_pending());
    }

    #[test]
    fn test_clones_share_slot() {
        let writer = PendingResize::new();
        let reader = writer.clone();

        writer.post(FramebufferResized::new(640, 480));
        assert_eq!(reader.take(), Some(FramebufferResized::new(640, 480)));
        assert!(!writer.is_pending());
    }

    #[test]
    fn test_post_from_another_thread() {
        let pending = PendingResize::new();
        let writer = pending.clone();

        std::thread::spawn(move || writer.post(FramebufferResized::new(320, 200)))
            .join()
            .unwrap();

        assert_eq!(pending.take(), Some(FramebufferResized::new(320, 200)));
    }

    #[test]
    fn test_zero_area() {
        assert!(FramebufferResized::new(0, 600).is_zero_area());
        assert!(FramebufferResized::new(800, 0).is_zero_area());
        assert!(!FramebufferResized::new(1, 1).is_zero_area());
    }
}
