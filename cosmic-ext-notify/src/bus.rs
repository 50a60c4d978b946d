//! Settings Change Bus
//!
//! Publish/subscribe broadcast of [`ChangeType`] values. Listeners register
//! for the whole bus and filter kinds themselves; the only payload is the
//! kind, listeners re-read the settings snapshot they care about.
//!
//! Delivery is synchronous and in publish order. A listener that publishes
//! from inside its callback does not recurse: the nested kind is queued and
//! delivered to everyone after the current kind has been delivered.
//!
//! Each listener is owned by the [`Subscription`] handle returned from
//! [`SettingsBus::subscribe`]; dropping (or releasing) the handle removes it.
//!
//! ```rust
//! use cosmic_ext_notify::{ChangeType, SettingsBus};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let bus = SettingsBus::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let subscription = bus.subscribe(move |kind| sink.borrow_mut().push(kind));
//!
//! bus.publish(ChangeType::SoundEnabled);
//! subscription.release();
//! bus.publish(ChangeType::Corner);
//!
//! assert_eq!(*seen.borrow(), vec![ChangeType::SoundEnabled]);
//! ```

use crate::settings::ChangeType;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use tracing::trace;

type Listener = Rc<RefCell<dyn FnMut(ChangeType)>>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    queue: VecDeque<ChangeType>,
    publishing: bool,
}

/// Broadcast bus for settings changes
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct SettingsBus {
    inner: Rc<RefCell<BusInner>>,
}

impl SettingsBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every change kind
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(ChangeType) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(RefCell::new(listener))));
        trace!("Settings listener {} subscribed", id);

        Subscription {
            id,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Deliver `kind` to every current listener
    pub fn publish(&self, kind: ChangeType) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.queue.push_back(kind);
            if inner.publishing {
                return;
            }
            inner.publishing = true;
        }

        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.pop_front() {
                    Some(kind) => Some((
                        kind,
                        inner
                            .listeners
                            .iter()
                            .map(|(_, listener)| listener.clone())
                            .collect::<Vec<_>>(),
                    )),
                    None => {
                        inner.publishing = false;
                        None
                    }
                }
            };

            let Some((kind, listeners)) = next else {
                break;
            };

            trace!("Publishing {:?} to {} listeners", kind, listeners.len());
            for listener in listeners {
                (listener.borrow_mut())(kind);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

/// Handle keeping a bus listener registered
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    bus: Weak<RefCell<BusInner>>,
}

impl Subscription {
    /// Unsubscribe explicitly
    pub fn release(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            // Never held across listener calls, but stay safe during teardown.
            if let Ok(mut inner) = bus.try_borrow_mut() {
                inner.listeners.retain(|(id, _)| *id != self.id);
                trace!("Settings listener {} released", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &SettingsBus) -> (Subscription, Rc<RefCell<Vec<ChangeType>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = bus.subscribe(move |kind| sink.borrow_mut().push(kind));
        (subscription, seen)
    }

    #[test]
    fn test_delivery_in_publish_order() {
        let bus = SettingsBus::new();
        let (_sub, seen) = recorder(&bus);

        bus.publish(ChangeType::MaxCount);
        bus.publish(ChangeType::Corner);
        bus.publish(ChangeType::DemoIsShown);

        assert_eq!(
            *seen.borrow(),
            vec![ChangeType::MaxCount, ChangeType::Corner, ChangeType::DemoIsShown]
        );
    }

    #[test]
    fn test_every_subscriber_receives_every_kind() {
        let bus = SettingsBus::new();
        let (_a, seen_a) = recorder(&bus);
        let (_b, seen_b) = recorder(&bus);

        bus.publish(ChangeType::IncludeMuted);

        assert_eq!(*seen_a.borrow(), vec![ChangeType::IncludeMuted]);
        assert_eq!(*seen_b.borrow(), vec![ChangeType::IncludeMuted]);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = SettingsBus::new();
        let (sub, seen) = recorder(&bus);
        drop(sub);

        bus.publish(ChangeType::SoundEnabled);
        assert!(seen.borrow().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_nested_publish_is_queued() {
        let bus = SettingsBus::new();
        let republisher = bus.clone();
        let _echo = bus.subscribe(move |kind| {
            if kind == ChangeType::DesktopEnabled {
                republisher.publish(ChangeType::ViewParams);
            }
        });
        let (_sub, seen) = recorder(&bus);

        bus.publish(ChangeType::DesktopEnabled);

        assert_eq!(
            *seen.borrow(),
            vec![ChangeType::DesktopEnabled, ChangeType::ViewParams]
        );
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = SettingsBus::new();
        let (sub, _seen) = recorder(&bus);
        drop(bus);
        sub.release();
    }
}
