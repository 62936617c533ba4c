//! The fetch/decode/execute loop.
//!
//! ```text
//!            ┌────────────── prefetch queue ─────────────┐
//!  memory ──►│ word @ X+4 │ word @ X │──► decode ──► execute
//!            └───────────────────────────────────────────┘
//!                    r15 = X + 8 while X executes
//! ```
//!
//! Every cycle first steps the attached peripherals, then tops the queue up
//! to two words, then executes the oldest. When the instruction writes r15
//! the queue is dropped and refilled from the new pc on the next cycle.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

use crate::cpu::Cpu;
use crate::cpu::arm::mode::ArmModeOpcode;
use crate::cpu::arm::operations::{PREFETCH_SIZE, SIZE_OF_INSTRUCTION};
use crate::error::{EmuError, Result};
use crate::hardware::Peripheral;
use crate::memory::{Memory, MemoryObserver, SharedObserver, SubscriptionId};

/// Words kept ahead of the executing instruction.
const PREFETCH_DEPTH: usize = (PREFETCH_SIZE / SIZE_OF_INSTRUCTION) as usize;

type SharedPeripheral = Arc<Mutex<dyn Peripheral + Send>>;

#[derive(Clone)]
struct Attachment {
    peripheral: SharedPeripheral,
    observer: SharedObserver,
    /// `None` until the peripheral has been initialized.
    subscriptions: Option<Vec<SubscriptionId>>,
}

#[derive(Clone)]
pub struct Machine {
    pub cpu: Cpu,
    pub memory: Memory,
    prefetch: VecDeque<u32>,
    attachments: Vec<Attachment>,
    cycles: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(Memory::default())
    }
}

impl Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("cpu", &self.cpu)
            .field("memory", &self.memory)
            .field("prefetch", &self.prefetch)
            .field("peripherals", &self.attachments.len())
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl Machine {
    #[must_use]
    pub fn new(memory: Memory) -> Self {
        Self {
            cpu: Cpu::default(),
            memory,
            prefetch: VecDeque::with_capacity(PREFETCH_DEPTH),
            attachments: Vec::new(),
            cycles: 0,
        }
    }

    /// Registers a peripheral. It is initialized, and its watches subscribed,
    /// on the next cycle.
    pub fn attach<P>(&mut self, peripheral: Arc<Mutex<P>>)
    where
        P: Peripheral + MemoryObserver + Send + 'static,
    {
        self.attachments.push(Attachment {
            peripheral: peripheral.clone(),
            observer: peripheral,
            subscriptions: None,
        });
    }

    /// Drops every peripheral together with its memory subscriptions.
    pub fn detach_peripherals(&mut self) {
        for attachment in self.attachments.drain(..) {
            for id in attachment.subscriptions.into_iter().flatten() {
                self.memory.unobserve(id);
            }
        }
    }

    /// Executes one instruction.
    pub fn cycle(&mut self) -> Result<()> {
        self.step_peripherals()?;

        while self.prefetch.len() < PREFETCH_DEPTH {
            let pc = self.cpu.registers.program_counter();
            self.prefetch.push_back(self.memory.word(pc)?);
            self.cpu.registers.advance_program_counter(SIZE_OF_INSTRUCTION);
        }

        let address = self
            .cpu
            .registers
            .program_counter()
            .wrapping_sub(PREFETCH_SIZE);
        let word = self
            .prefetch
            .pop_front()
            .ok_or_else(|| EmuError::Logic("empty prefetch queue".to_owned()))?;

        let opcode = ArmModeOpcode::try_from(word).map_err(|error| error.at(address))?;
        tracing::trace!(
            address = format_args!("0x{address:08x}"),
            "{}",
            opcode.disassembler()
        );

        let branched = self
            .cpu
            .execute_arm(&mut self.memory, &opcode)
            .map_err(|error| error.at(address))?;
        if branched {
            self.prefetch.clear();
        }

        self.cycles += 1;
        Ok(())
    }

    /// Cycles until `max_cycles` more instructions ran, or forever when
    /// `None`. Returns how many instructions this call executed; on error
    /// the count so far is still available through [`Machine::cycles`].
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<u64> {
        let start = self.cycles;
        while max_cycles.is_none_or(|max| self.cycles - start < max) {
            self.cycle()?;
        }
        Ok(self.cycles - start)
    }

    /// Instructions executed since construction.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Copies `program` to address 0, bypassing observers. Returns how many
    /// bytes fit in memory.
    pub fn load_program(&mut self, program: &[u8]) -> usize {
        let written = self.memory.put_chunk(0, program);
        if written < program.len() {
            tracing::warn!(
                size = program.len(),
                written,
                "program truncated to the memory size"
            );
        }
        self.prefetch.clear();
        written
    }

    /// Deep copy of the CPU, memory and pipeline. Peripherals are shared
    /// with the copy, not duplicated.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: &Self) {
        self.clone_from(snapshot);
    }

    fn step_peripherals(&mut self) -> Result<()> {
        for attachment in &mut self.attachments {
            let mut peripheral = attachment
                .peripheral
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if attachment.subscriptions.is_none() {
                let watches = peripheral.initialize(&mut self.memory)?;
                let mut ids = Vec::with_capacity(watches.len());
                for watch in watches {
                    ids.push(self.memory.observe(
                        watch.address,
                        watch.length,
                        watch.events,
                        attachment.observer.clone(),
                    )?);
                }
                attachment.subscriptions = Some(ids);
            }

            peripheral.step(&mut self.memory)?;
        }
        Ok(())
    }
}
