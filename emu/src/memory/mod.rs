//! # Addressable Memory
//!
//! A sparse byte array split in fixed-size pages. A page only exists once
//! something has been written to it; reading an absent page yields zeros and
//! never allocates.
//!
//! ```text
//!  address ─┬─ page index  = address / page_size
//!           └─ page offset = address % page_size
//!
//!  ┌────────┬────────┬────────┬────────┐
//!  │ page 0 │   --   │ page 2 │   --   │   -- = never written, reads as 0
//!  └────────┴────────┴────────┴────────┘
//! ```
//!
//! Multi-byte values are little-endian and may straddle two pages; no access
//! assumes natural alignment.
//!
//! ## Observers
//!
//! Peripherals model memory-mapped registers by subscribing to a window of
//! addresses with [`Memory::observe`]. Accesses made through
//! [`Memory::tracked`] report [`Event::PreRead`], [`Event::Read`] and
//! [`Event::Write`] once per call, whatever the access width.

mod observer;
mod tracked;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::TryLockError;

use serde::{Deserialize, Serialize};

use crate::error::{EmuError, Result};
use observer::Registry;

pub use observer::{Access, Event, EventMask, MemoryObserver, SharedObserver, SubscriptionId};
pub use tracked::Tracked;

/// The whole 32-bit address space.
pub const DEFAULT_MEMORY_SIZE: u64 = 1 << 32;
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Total number of addressable bytes.
    pub size: u64,
    /// Must be a non-zero power of two.
    pub page_size: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_MEMORY_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Cloning deep-copies the pages. Observers are shared with the clone.
#[derive(Clone)]
pub struct Memory {
    size: u64,
    page_size: u64,
    pages: BTreeMap<u64, Box<[u8]>>,
    observers: Registry,
}

impl Default for Memory {
    fn default() -> Self {
        Self::build(MemoryConfig::default())
    }
}

impl Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.size)
            .field("page_size", &self.page_size)
            .field("allocated_pages", &self.pages.len())
            .field("subscriptions", &self.observers.len())
            .finish()
    }
}

impl Memory {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        if !config.page_size.is_power_of_two() {
            return Err(EmuError::Logic(format!(
                "page size {} is not a power of two",
                config.page_size
            )));
        }

        Ok(Self::build(config))
    }

    /// Memory of `size` bytes with the default page size.
    #[must_use]
    pub fn with_size(size: u64) -> Self {
        Self::build(MemoryConfig {
            size,
            ..MemoryConfig::default()
        })
    }

    fn build(config: MemoryConfig) -> Self {
        Self {
            size: config.size,
            page_size: config.page_size.into(),
            pages: BTreeMap::new(),
            observers: Registry::default(),
        }
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn byte(&self, address: u32) -> Result<u8> {
        Ok(self.read_array::<1>(address)?[0])
    }

    pub fn put_byte(&mut self, address: u32, value: u8) -> Result<()> {
        self.write_array(address, [value])
    }

    pub fn half_word(&self, address: u32) -> Result<u16> {
        self.read_array(address).map(u16::from_le_bytes)
    }

    pub fn put_half_word(&mut self, address: u32, value: u16) -> Result<()> {
        self.write_array(address, value.to_le_bytes())
    }

    pub fn word(&self, address: u32) -> Result<u32> {
        self.read_array(address).map(u32::from_le_bytes)
    }

    pub fn put_word(&mut self, address: u32, value: u32) -> Result<()> {
        self.write_array(address, value.to_le_bytes())
    }

    /// Low word at `address`, high word right after it.
    pub fn dword(&self, address: u32) -> Result<u64> {
        self.read_array(address).map(u64::from_le_bytes)
    }

    pub fn put_dword(&mut self, address: u32, value: u64) -> Result<()> {
        self.write_array(address, value.to_le_bytes())
    }

    /// Copies as many bytes as fit before the end of memory and returns how
    /// many were written.
    pub fn put_chunk(&mut self, address: u32, bytes: &[u8]) -> usize {
        let count = self.clip(address, bytes.len());
        self.write_bytes(address.into(), &bytes[..count]);
        count
    }

    /// Reads up to `length` bytes, clipped to the end of memory.
    /// Absent pages read as zero and stay absent.
    #[must_use]
    pub fn chunk(&self, address: u32, length: usize) -> Vec<u8> {
        let mut buffer = vec![0; self.clip(address, length)];
        self.read_bytes(address.into(), &mut buffer);
        buffer
    }

    /// Page-aligned start addresses of every materialized page, ascending.
    #[must_use]
    pub fn allocated_pages(&self) -> Vec<u64> {
        self.pages.keys().map(|page| page * self.page_size).collect()
    }

    /// Subscribes `observer` to `events` on `[address, address + length)`.
    pub fn observe(
        &mut self,
        address: u32,
        length: u32,
        events: EventMask,
        observer: SharedObserver,
    ) -> Result<SubscriptionId> {
        if length == 0 {
            return Err(EmuError::Logic(format!(
                "empty subscription at 0x{address:08x}"
            )));
        }
        if events.is_empty() {
            return Err(EmuError::Logic(format!(
                "subscription at 0x{address:08x} listens to no event"
            )));
        }

        let id = self.observers.insert(address, length, events, observer);
        tracing::debug!("subscription {id} on 0x{address:08x}+{length}");
        Ok(id)
    }

    /// Removes exactly the subscription `id`. Returns false if it was unknown.
    pub fn unobserve(&mut self, id: SubscriptionId) -> bool {
        self.observers.remove(id)
    }

    pub fn tracked(&mut self) -> Tracked<'_> {
        Tracked::new(self)
    }

    fn notify(&mut self, address: u32, length: u32, event: Event) {
        if self.observers.is_empty() {
            return;
        }

        for (subscription, handle) in self.observers.matching(address, length, event) {
            let mut observer = match handle.try_lock() {
                Ok(observer) => observer,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                // Already running further up this call stack.
                Err(TryLockError::WouldBlock) => continue,
            };

            observer.notify(
                self,
                &Access {
                    subscription,
                    address,
                    length,
                    event,
                },
            );
        }
    }

    fn check(&self, address: u32, length: u32) -> Result<()> {
        let address = u64::from(address);
        if address + u64::from(length) > self.size {
            return Err(EmuError::OutOfRange {
                address: address.max(self.size),
                size: self.size,
            });
        }

        Ok(())
    }

    fn clip(&self, address: u32, length: usize) -> usize {
        let available = self.size.saturating_sub(address.into());
        usize::try_from(available).map_or(length, |available| available.min(length))
    }

    fn read_array<const N: usize>(&self, address: u32) -> Result<[u8; N]> {
        self.check(address, N as u32)?;

        let mut bytes = [0; N];
        self.read_bytes(address.into(), &mut bytes);
        Ok(bytes)
    }

    fn write_array<const N: usize>(&mut self, address: u32, bytes: [u8; N]) -> Result<()> {
        self.check(address, N as u32)?;

        self.write_bytes(address.into(), &bytes);
        Ok(())
    }

    fn read_bytes(&self, mut address: u64, buffer: &mut [u8]) {
        let mut done = 0;
        while done < buffer.len() {
            let (page, offset) = self.locate(address);
            let count = (self.page_size as usize - offset).min(buffer.len() - done);
            let target = &mut buffer[done..done + count];

            match self.pages.get(&page) {
                Some(data) => target.copy_from_slice(&data[offset..offset + count]),
                None => target.fill(0),
            }

            done += count;
            address += count as u64;
        }
    }

    fn write_bytes(&mut self, mut address: u64, bytes: &[u8]) {
        let page_size = self.page_size as usize;
        let mut done = 0;
        while done < bytes.len() {
            let (page, offset) = self.locate(address);
            let count = (page_size - offset).min(bytes.len() - done);

            let data = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0; page_size].into_boxed_slice());
            data[offset..offset + count].copy_from_slice(&bytes[done..done + count]);

            done += count;
            address += count as u64;
        }
    }

    const fn locate(&self, address: u64) -> (u64, usize) {
        (address / self.page_size, (address % self.page_size) as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    #[derive(Default)]
    struct Recorder {
        accesses: Vec<Access>,
    }

    impl MemoryObserver for Recorder {
        fn notify(&mut self, _memory: &mut Memory, access: &Access) {
            self.accesses.push(*access);
        }
    }

    /// Bumps the watched word before every read and echoes writes one word up.
    struct Echo {
        address: u32,
    }

    impl MemoryObserver for Echo {
        fn notify(&mut self, memory: &mut Memory, access: &Access) {
            match access.event {
                Event::PreRead => {
                    let value = memory.word(self.address).unwrap_or_default();
                    memory.put_word(self.address, value + 1).ok();
                }
                Event::Write => {
                    let value = memory.word(self.address).unwrap_or_default();
                    // Re-enters the registry: this observer is busy and must be skipped.
                    memory.tracked().put_word(self.address, value).ok();
                    memory.put_word(self.address + 4, value).ok();
                }
                Event::Read => {}
            }
        }
    }

    #[test]
    fn word_round_trip_across_pages() {
        let mut memory = Memory::with_size(0x1_0000);
        let page_size = memory.page_size() as u32;

        let straddling = page_size - 2;
        memory.put_word(straddling, 0xA1B2_C3D4).unwrap();

        assert_eq!(memory.word(straddling).unwrap(), 0xA1B2_C3D4);
        assert_eq!(memory.byte(straddling).unwrap(), 0xD4);
        assert_eq!(memory.byte(page_size + 1).unwrap(), 0xA1);
        assert_eq!(memory.allocated_pages(), vec![0, u64::from(page_size)]);
    }

    #[test]
    fn word_round_trip_at_random_addresses() {
        let mut memory = Memory::default();
        let mut rng = rand::thread_rng();

        for _ in 0..256 {
            let address = rng.gen_range(0..=u32::MAX - 3);
            let value = rng.r#gen::<u32>();
            memory.put_word(address, value).unwrap();
            assert_eq!(memory.word(address).unwrap(), value);
        }
    }

    #[test]
    fn dword_is_two_little_endian_words() {
        let mut memory = Memory::with_size(0x100);
        memory.put_dword(0x10, 0x0102_0304_0506_0708).unwrap();

        assert_eq!(memory.word(0x10).unwrap(), 0x0506_0708);
        assert_eq!(memory.word(0x14).unwrap(), 0x0102_0304);
        assert_eq!(memory.half_word(0x12).unwrap(), 0x0506);
        assert_eq!(memory.dword(0x10).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn reads_never_allocate() {
        let mut memory = Memory::default();

        assert_eq!(memory.word(0x8000).unwrap(), 0);
        assert_eq!(memory.chunk(0x1000, 0x3000), vec![0; 0x3000]);
        assert!(memory.allocated_pages().is_empty());

        memory.put_byte(0x1234, 7).unwrap();
        assert_eq!(memory.allocated_pages(), vec![0x1000]);

        let chunk = memory.chunk(0x1233, 3);
        assert_eq!(chunk, vec![0, 7, 0]);
        assert_eq!(memory.allocated_pages(), vec![0x1000]);
    }

    #[test]
    fn bounds_are_enforced() {
        let size = 0x2000;
        let mut memory = Memory::with_size(size);

        assert!(memory.put_byte(0x1FFF, 1).is_ok());
        assert_eq!(
            memory.put_byte(0x2000, 1),
            Err(EmuError::OutOfRange {
                address: 0x2000,
                size
            })
        );
        assert_eq!(
            memory.word(0x1FFE),
            Err(EmuError::OutOfRange {
                address: 0x2000,
                size
            })
        );
        assert!(memory.put_word(0x1FFC, 1).is_ok());

        let full_address_space = Memory::default();
        assert!(full_address_space.word(u32::MAX - 3).is_ok());
        assert!(full_address_space.word(u32::MAX - 2).is_err());
    }

    #[test]
    fn put_chunk_clips_at_the_end() {
        let mut memory = Memory::with_size(0x1000);

        assert_eq!(memory.put_chunk(0xFFE, &[1, 2, 3, 4]), 2);
        assert_eq!(memory.chunk(0xFFC, 16), vec![0, 0, 1, 2]);
        assert_eq!(memory.put_chunk(0x2000, &[1]), 0);
        assert!(memory.chunk(0x2000, 4).is_empty());
    }

    #[test]
    fn page_size_must_be_a_power_of_two() {
        let config = MemoryConfig {
            size: 0x1000,
            page_size: 1000,
        };
        assert!(matches!(Memory::new(config), Err(EmuError::Logic(_))));

        let config = MemoryConfig {
            size: 0x1000,
            page_size: 0,
        };
        assert!(Memory::new(config).is_err());

        let config = MemoryConfig {
            size: 0x1000,
            page_size: 16,
        };
        let mut memory = Memory::new(config).unwrap();
        memory.put_word(14, u32::MAX).unwrap();
        assert_eq!(memory.allocated_pages(), vec![0, 16]);
    }

    #[test]
    fn subscriptions_are_exact() {
        let mut memory = Memory::default();
        let recorder = Arc::new(Mutex::new(Recorder::default()));

        assert!(
            memory
                .observe(0x100, 0, EventMask::WRITE, recorder.clone())
                .is_err()
        );

        let first = memory
            .observe(0x100, 4, EventMask::WRITE, recorder.clone())
            .unwrap();
        let second = memory
            .observe(0x100, 4, EventMask::WRITE, recorder.clone())
            .unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);

        assert!(memory.unobserve(first));
        assert!(!memory.unobserve(first));

        memory.tracked().put_word(0x100, 1).unwrap();
        assert_eq!(recorder.lock().unwrap().accesses.len(), 1);

        assert!(memory.unobserve(second));
        let third = memory
            .observe(0x100, 4, EventMask::WRITE, recorder.clone())
            .unwrap();
        assert_eq!(third.get(), 3);
    }

    #[test]
    fn tracked_accesses_notify_once_per_call() {
        let mut memory = Memory::default();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let id = memory
            .observe(
                0x200,
                8,
                EventMask::READ | EventMask::WRITE | EventMask::PRE_READ,
                recorder.clone(),
            )
            .unwrap();

        memory.tracked().put_dword(0x1FC, u64::MAX).unwrap();
        memory.tracked().half_word(0x206).unwrap();
        memory.tracked().byte(0x208).unwrap();
        memory.put_word(0x200, 5).unwrap();
        memory.word(0x200).unwrap();

        let events: Vec<_> = recorder
            .lock()
            .unwrap()
            .accesses
            .iter()
            .map(|a| (a.subscription, a.address, a.length, a.event))
            .collect();
        assert_eq!(
            events,
            vec![
                (id, 0x1FC, 8, Event::Write),
                (id, 0x206, 2, Event::PreRead),
                (id, 0x206, 2, Event::Read),
            ]
        );
    }

    #[test]
    fn pre_read_refreshes_the_value_and_reentry_is_tolerated() {
        let mut memory = Memory::default();
        let echo = Arc::new(Mutex::new(Echo { address: 0x300 }));
        memory
            .observe(
                0x300,
                4,
                EventMask::PRE_READ | EventMask::WRITE,
                echo.clone(),
            )
            .unwrap();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        memory
            .observe(0x300, 4, EventMask::WRITE, recorder.clone())
            .unwrap();

        memory.put_word(0x300, 41).unwrap();
        assert_eq!(memory.tracked().word(0x300).unwrap(), 42);

        memory.tracked().put_word(0x300, 7).unwrap();
        assert_eq!(memory.word(0x304).unwrap(), 7);
        // The outer write and the echo's nested write.
        assert_eq!(recorder.lock().unwrap().accesses.len(), 2);
    }

    #[test]
    fn clones_are_deep() {
        let mut memory = Memory::with_size(0x1000);
        memory.put_word(0x10, 1).unwrap();

        let snapshot = memory.clone();
        memory.put_word(0x10, 2).unwrap();

        assert_eq!(snapshot.word(0x10).unwrap(), 1);
        assert_eq!(memory.word(0x10).unwrap(), 2);
    }
}
