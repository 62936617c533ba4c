use std::fmt::Display;
use std::num::NonZeroU64;
use std::ops::BitOr;
use std::sync::{Arc, Mutex};

use super::Memory;

/// Kind of access reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Read,
    Write,
    /// Fired before the value is fetched, so the observer can refresh it.
    PreRead,
}

/// Set of [`Event`]s a subscription wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const PRE_READ: Self = Self(1 << 2);

    #[must_use]
    pub const fn contains(self, event: Event) -> bool {
        self.0 & Self::of(event).0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    const fn of(event: Event) -> Self {
        match event {
            Event::Read => Self::READ,
            Event::Write => Self::WRITE,
            Event::PreRead => Self::PRE_READ,
        }
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl From<Event> for EventMask {
    fn from(event: Event) -> Self {
        Self::of(event)
    }
}

/// Handle returned by [`Memory::observe`].
///
/// Ids grow monotonically starting from 1 and are never reused; 0 is
/// reserved, which is why the id is stored as a `NonZeroU64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(NonZeroU64);

impl SubscriptionId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an observer receives: the triggering access, reported once per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub subscription: SubscriptionId,
    pub address: u32,
    pub length: u32,
    pub event: Event,
}

impl Access {
    /// True when the access touched the byte at `address`.
    #[must_use]
    pub fn covers(&self, address: u32) -> bool {
        let start = u64::from(self.address);
        (start..start + u64::from(self.length)).contains(&u64::from(address))
    }
}

pub trait MemoryObserver {
    /// Called synchronously from the access that triggered it. The observer
    /// may read and write `memory`; nested notifications to an observer that
    /// is already running are dropped.
    fn notify(&mut self, memory: &mut Memory, access: &Access);
}

pub type SharedObserver = Arc<Mutex<dyn MemoryObserver + Send>>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    address: u32,
    length: u32,
    events: EventMask,
    observer: SharedObserver,
}

impl Subscription {
    fn overlaps(&self, address: u32, length: u32) -> bool {
        let start = u64::from(self.address);
        let end = start + u64::from(self.length);
        let access = u64::from(address);

        access < end && start < access + u64::from(length)
    }
}

/// Linear list of subscriptions; peripheral counts stay small.
#[derive(Clone)]
pub(super) struct Registry {
    next_id: NonZeroU64,
    subscriptions: Vec<Subscription>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            next_id: NonZeroU64::MIN,
            subscriptions: Vec::new(),
        }
    }
}

impl Registry {
    pub(super) fn insert(
        &mut self,
        address: u32,
        length: u32,
        events: EventMask,
        observer: SharedObserver,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);

        self.subscriptions.push(Subscription {
            id,
            address,
            length,
            events,
            observer,
        });

        id
    }

    pub(super) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions
            .iter()
            .position(|s| s.id == id)
            .map(|index| self.subscriptions.remove(index))
            .is_some()
    }

    pub(super) fn matching(
        &self,
        address: u32,
        length: u32,
        event: Event,
    ) -> Vec<(SubscriptionId, SharedObserver)> {
        self.subscriptions
            .iter()
            .filter(|s| s.events.contains(event) && s.overlaps(address, length))
            .map(|s| (s.id, Arc::clone(&s.observer)))
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
