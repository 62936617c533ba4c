//! # GPU Mailbox
//!
//! The CPU talks to the GPU through a block of memory-mapped registers:
//!
//! ```text
//! offset  register
//! ┌──────┬────────────────────────────────────────────┐
//! │ 0x00 │ read        (channel in bits 0-3)           │
//! │ 0x04 │ reserved                                    │
//! │ 0x08 │ reserved                                    │
//! │ 0x0C │ reserved                                    │
//! │ 0x10 │ poll                                        │
//! │ 0x14 │ sender                                      │
//! │ 0x18 │ status      bit 30 = empty, bit 31 = full   │
//! │ 0x1C │ configuration                               │
//! │ 0x20 │ write       (channel in bits 0-3)           │
//! └──────┴────────────────────────────────────────────┘
//! ```
//!
//! The only message understood is a framebuffer request: bits 4-31 of the
//! mail point to a [`Framebuffer`] descriptor that the GPU completes with a
//! pitch, a pointer and a size. The framebuffer is placed right below the
//! configured end address.

use crate::bitwise::Bits;
use crate::error::{EmuError, Result};
use crate::hardware::{Peripheral, Watch};
use crate::memory::{Access, Event, EventMask, Memory, MemoryObserver};
use crate::render::Canvas;
use crate::render::color::Color;

pub const MAILBOX_READ: u32 = 0x00;
pub const MAILBOX_POLL: u32 = 0x10;
pub const MAILBOX_SENDER: u32 = 0x14;
pub const MAILBOX_STATUS: u32 = 0x18;
pub const MAILBOX_CONFIG: u32 = 0x1C;
pub const MAILBOX_WRITE: u32 = 0x20;

/// Bytes covered by the register block, write register included.
pub const MAILBOX_SIZE: u32 = MAILBOX_WRITE + 4;

/// Status bit set while there is nothing to read.
const STATUS_EMPTY: u8 = 30;
/// Status bit set while a write would not be accepted.
const STATUS_FULL: u8 = 31;

/// Descriptor exchanged through the mailbox, ten consecutive words.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    pub physical_width: u32,
    pub physical_height: u32,
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub pitch: u32,
    pub depth: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub pointer: u32,
    pub size: u32,
}

impl Framebuffer {
    pub const WORDS: u32 = 10;

    fn read(memory: &Memory, address: u32) -> Result<Self> {
        let word = |index: u32| memory.word(address.wrapping_add(index * 4));
        Ok(Self {
            physical_width: word(0)?,
            physical_height: word(1)?,
            virtual_width: word(2)?,
            virtual_height: word(3)?,
            pitch: word(4)?,
            depth: word(5)?,
            x_offset: word(6)?,
            y_offset: word(7)?,
            pointer: word(8)?,
            size: word(9)?,
        })
    }

    fn write(&self, memory: &mut Memory, address: u32) -> Result<()> {
        let words = [
            self.physical_width,
            self.physical_height,
            self.virtual_width,
            self.virtual_height,
            self.pitch,
            self.depth,
            self.x_offset,
            self.y_offset,
            self.pointer,
            self.size,
        ];
        for (index, word) in (0..Self::WORDS).zip(words) {
            memory.put_word(address.wrapping_add(index * 4), word)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Gpu {
    mailbox_base: Option<u32>,
    framebuffer_end: Option<u32>,
    initialized: bool,
    read_ready: bool,
    write_ready: bool,
    pending: Option<u32>,
    framebuffer: Option<Framebuffer>,
}

impl Gpu {
    #[must_use]
    pub const fn new(mailbox_base: u32, framebuffer_end: u32) -> Self {
        Self {
            mailbox_base: Some(mailbox_base),
            framebuffer_end: Some(framebuffer_end),
            initialized: false,
            read_ready: false,
            write_ready: false,
            pending: None,
            framebuffer: None,
        }
    }

    pub fn set_mailbox_base(&mut self, address: u32) -> Result<()> {
        self.ensure_not_initialized("mailbox base")?;
        self.mailbox_base = Some(address);
        Ok(())
    }

    pub fn set_framebuffer_end(&mut self, address: u32) -> Result<()> {
        self.ensure_not_initialized("framebuffer end")?;
        self.framebuffer_end = Some(address);
        Ok(())
    }

    /// The last negotiated framebuffer.
    #[must_use]
    pub const fn framebuffer(&self) -> Option<Framebuffer> {
        self.framebuffer
    }

    #[must_use]
    pub const fn read_ready(&self) -> bool {
        self.read_ready
    }

    #[must_use]
    pub const fn write_ready(&self) -> bool {
        self.write_ready
    }

    /// Copies the framebuffer to `canvas`. Only 16 bits per pixel (5-6-5)
    /// is supported. Does nothing before a framebuffer was negotiated.
    pub fn draw(&self, memory: &Memory, canvas: &mut dyn Canvas) -> Result<()> {
        let Some(framebuffer) = self.framebuffer else {
            return Ok(());
        };

        if framebuffer.depth != 16 {
            return Err(EmuError::UnhandledCase {
                context: "framebuffer bit depth",
                value: framebuffer.depth,
            });
        }

        // offsets come from the guest, address math wraps like the CPU's
        for y in 0..framebuffer.physical_height {
            let line = y.wrapping_add(framebuffer.y_offset);
            let row = framebuffer
                .pointer
                .wrapping_add(line.wrapping_mul(framebuffer.pitch));
            for x in 0..framebuffer.physical_width {
                let column = x.wrapping_add(framebuffer.x_offset);
                let address = row.wrapping_add(column.wrapping_mul(2));
                let bytes = [memory.byte(address)?, memory.byte(address.wrapping_add(1))?];
                canvas.set_pixel(x, y, Color::from_rgb565(bytes));
            }
        }

        Ok(())
    }

    fn ensure_not_initialized(&self, what: &str) -> Result<()> {
        if self.initialized {
            return Err(EmuError::Logic(format!(
                "cannot change the GPU {what} after first use"
            )));
        }
        Ok(())
    }

    fn base(&self) -> Result<u32> {
        self.mailbox_base
            .ok_or_else(|| EmuError::Logic("GPU mailbox base is not configured".to_owned()))
    }

    fn publish_status(&self, memory: &mut Memory) -> Result<()> {
        let mut status = 0_u32;
        status.set_bit(STATUS_EMPTY, !self.read_ready);
        status.set_bit(STATUS_FULL, !self.write_ready);
        memory.put_word(self.base()?.wrapping_add(MAILBOX_STATUS), status)
    }

    /// Answers a framebuffer request.
    fn allocate(&mut self, memory: &mut Memory, mail: u32) -> Result<()> {
        let channel = mail.get_bits(0..=3);
        let address = mail & !0xF;
        let end = self
            .framebuffer_end
            .ok_or_else(|| EmuError::Logic("GPU framebuffer end is not configured".to_owned()))?;

        let mut framebuffer = Framebuffer::read(memory, address)?;
        framebuffer.pitch = framebuffer
            .virtual_width
            .checked_mul(framebuffer.depth.div_ceil(8))
            .ok_or_else(|| EmuError::Logic("framebuffer pitch overflows".to_owned()))?;
        framebuffer.size = framebuffer
            .pitch
            .checked_mul(framebuffer.virtual_height)
            .ok_or_else(|| EmuError::Logic("framebuffer size overflows".to_owned()))?;
        framebuffer.pointer = end.checked_sub(framebuffer.size).ok_or_else(|| {
            EmuError::Logic(format!(
                "a framebuffer of 0x{:x} bytes does not fit below 0x{end:08x}",
                framebuffer.size
            ))
        })?;
        framebuffer.write(memory, address)?;

        tracing::debug!(
            width = framebuffer.virtual_width,
            height = framebuffer.virtual_height,
            depth = framebuffer.depth,
            pointer = format_args!("0x{:08x}", framebuffer.pointer),
            "framebuffer allocated"
        );
        self.framebuffer = Some(framebuffer);

        memory
            .tracked()
            .put_word(self.base()?.wrapping_add(MAILBOX_READ), channel)?;
        self.read_ready = true;
        self.write_ready = true;
        self.publish_status(memory)
    }
}

impl Peripheral for Gpu {
    fn initialize(&mut self, memory: &mut Memory) -> Result<Vec<Watch>> {
        let base = self.base()?;
        if self.framebuffer_end.is_none() {
            return Err(EmuError::Logic(
                "GPU framebuffer end is not configured".to_owned(),
            ));
        }

        self.initialized = true;
        self.write_ready = true;
        self.read_ready = false;
        self.publish_status(memory)?;

        Ok(vec![Watch {
            address: base,
            length: MAILBOX_SIZE,
            events: EventMask::READ | EventMask::WRITE,
        }])
    }

    fn step(&mut self, memory: &mut Memory) -> Result<()> {
        match self.pending.take() {
            Some(mail) => self.allocate(memory, mail),
            None => Ok(()),
        }
    }
}

impl MemoryObserver for Gpu {
    fn notify(&mut self, memory: &mut Memory, access: &Access) {
        let Some(base) = self.mailbox_base else {
            return;
        };

        let changed = match access.event {
            Event::Write if self.write_ready && access.covers(base.wrapping_add(MAILBOX_WRITE)) => {
                match memory.word(base.wrapping_add(MAILBOX_WRITE)) {
                    Ok(mail) => {
                        tracing::debug!(mail = format_args!("0x{mail:08x}"), "mailbox latched");
                        self.pending = Some(mail);
                        self.write_ready = false;
                        true
                    }
                    Err(error) => {
                        tracing::warn!(%error, "mailbox write register unreadable");
                        false
                    }
                }
            }
            Event::Read if access.covers(base.wrapping_add(MAILBOX_READ)) => {
                self.read_ready = false;
                true
            }
            _ => false,
        };

        if changed && let Err(error) = self.publish_status(memory) {
            tracing::warn!(%error, "mailbox status update failed");
        }
    }
}
