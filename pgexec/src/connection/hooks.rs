//! Single-slot handlers for asynchronous server events.
use std::fmt;

use crate::{
    common::debug_log,
    session::{Notice, Notification},
};

/// Caller-registered handlers for notices and notifications.
///
/// Each kind has exactly one slot; registering again replaces the previous
/// handler. Events with no handler are dropped.
#[derive(Default)]
pub(crate) struct Hooks {
    notice: Option<Box<dyn FnMut(Notice) + Send>>,
    notification: Option<Box<dyn FnMut(Notification) + Send>>,
}

impl Hooks {
    pub(crate) fn set_notice(&mut self, handler: impl FnMut(Notice) + Send + 'static) {
        self.notice = Some(Box::new(handler));
    }

    pub(crate) fn set_notification(
        &mut self,
        handler: impl FnMut(Notification) + Send + 'static,
    ) {
        self.notification = Some(Box::new(handler));
    }

    pub(crate) fn notice(&mut self, notice: Notice) {
        match &mut self.notice {
            Some(handler) => handler(notice),
            None => {
                debug_log!("dropped notice: {}", notice.message);
            },
        }
    }

    pub(crate) fn notification(&mut self, notification: Notification) {
        match &mut self.notification {
            Some(handler) => handler(notification),
            None => {
                debug_log!("dropped notification on {:?}", notification.channel);
            },
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("notice", &self.notice.is_some())
            .field("notification", &self.notification.is_some())
            .finish()
    }
}
