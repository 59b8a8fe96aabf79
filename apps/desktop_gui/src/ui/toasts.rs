//! Transient notifications shown in the corner of the window.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use vision_core::{Notice, NoticeLevel};

pub const TOAST_TTL: Duration = Duration::from_secs(3);
const MAX_TOASTS: usize = 4;

#[derive(Debug, Clone)]
pub struct Toast {
    pub level: NoticeLevel,
    pub message: String,
    shown_at: Instant,
}

#[derive(Debug)]
pub struct ToastQueue {
    toasts: VecDeque<Toast>,
    ttl: Duration,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::with_ttl(TOAST_TTL)
    }
}

impl ToastQueue {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            toasts: VecDeque::new(),
            ttl,
        }
    }

    pub fn push(&mut self, notice: Notice, now: Instant) {
        if self.toasts.len() == MAX_TOASTS {
            self.toasts.pop_front();
        }
        self.toasts.push_back(Toast {
            level: notice.level,
            message: notice.message,
            shown_at: now,
        });
    }

    /// Drops expired toasts and reports whether any are still visible.
    pub fn prune(&mut self, now: Instant) -> bool {
        let ttl = self.ttl;
        self.toasts
            .retain(|toast| now.saturating_duration_since(toast.shown_at) < ttl);
        !self.toasts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(level: NoticeLevel, message: &str) -> Notice {
        Notice {
            level,
            message: message.to_string(),
        }
    }

    #[test]
    fn toasts_expire_after_ttl() {
        let start = Instant::now();
        let mut queue = ToastQueue::with_ttl(Duration::from_secs(3));
        queue.push(notice(NoticeLevel::Success, "Image uploaded!"), start);
        queue.push(
            notice(NoticeLevel::Success, "Image analyzed successfully!"),
            start + Duration::from_secs(2),
        );

        assert!(queue.prune(start + Duration::from_millis(2999)));
        assert_eq!(queue.toasts.len(), 2);

        assert!(queue.prune(start + Duration::from_secs(3)));
        let remaining: Vec<_> = queue.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(remaining, vec!["Image analyzed successfully!"]);

        assert!(!queue.prune(start + Duration::from_secs(5)));
    }

    #[test]
    fn oldest_toast_is_dropped_when_full() {
        let now = Instant::now();
        let mut queue = ToastQueue::default();
        for i in 0..=MAX_TOASTS {
            queue.push(notice(NoticeLevel::Error, &format!("toast {i}")), now);
        }

        assert_eq!(queue.toasts.len(), MAX_TOASTS);
        assert_eq!(queue.iter().next().map(|t| t.message.as_str()), Some("toast 1"));
    }
}
