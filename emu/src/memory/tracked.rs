use super::{Event, Memory};
use crate::error::Result;

/// View over [`Memory`] that reports every access to the observers.
///
/// Instruction execution goes through this path; bulk loading and test setup
/// use the plain [`Memory`] accessors, which never notify.
pub struct Tracked<'a> {
    memory: &'a mut Memory,
}

impl<'a> Tracked<'a> {
    pub(super) const fn new(memory: &'a mut Memory) -> Self {
        Self { memory }
    }
}

impl Tracked<'_> {
    pub fn byte(&mut self, address: u32) -> Result<u8> {
        self.read(address, 1, Memory::byte)
    }

    pub fn half_word(&mut self, address: u32) -> Result<u16> {
        self.read(address, 2, Memory::half_word)
    }

    pub fn word(&mut self, address: u32) -> Result<u32> {
        self.read(address, 4, Memory::word)
    }

    pub fn dword(&mut self, address: u32) -> Result<u64> {
        self.read(address, 8, Memory::dword)
    }

    pub fn put_byte(&mut self, address: u32, value: u8) -> Result<()> {
        self.write(address, 1, |memory| memory.put_byte(address, value))
    }

    pub fn put_half_word(&mut self, address: u32, value: u16) -> Result<()> {
        self.write(address, 2, |memory| memory.put_half_word(address, value))
    }

    pub fn put_word(&mut self, address: u32, value: u32) -> Result<()> {
        self.write(address, 4, |memory| memory.put_word(address, value))
    }

    pub fn put_dword(&mut self, address: u32, value: u64) -> Result<()> {
        self.write(address, 8, |memory| memory.put_dword(address, value))
    }

    fn read<T>(
        &mut self,
        address: u32,
        length: u32,
        read: impl Fn(&Memory, u32) -> Result<T>,
    ) -> Result<T> {
        self.memory.check(address, length)?;

        self.memory.notify(address, length, Event::PreRead);
        let value = read(&*self.memory, address)?;
        self.memory.notify(address, length, Event::Read);

        Ok(value)
    }

    fn write(
        &mut self,
        address: u32,
        length: u32,
        write: impl FnOnce(&mut Memory) -> Result<()>,
    ) -> Result<()> {
        write(self.memory)?;
        self.memory.notify(address, length, Event::Write);

        Ok(())
    }
}
