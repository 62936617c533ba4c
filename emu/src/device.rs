//! Board variants and the name → factory registry.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::Result;
use crate::hardware::mailbox::Gpu;
use crate::hardware::timer::Timer;
use crate::machine::Machine;
use crate::memory::Memory;
use crate::render::Canvas;

/// Addresses that differ between boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardConfig {
    pub name: &'static str,
    pub gpio_base: u32,
    pub gpio_pin_count: u32,
    pub mailbox_base: u32,
    pub timer_base: u32,
    pub framebuffer_end: u32,
}

impl BoardConfig {
    /// BCM2835.
    pub const PI: Self = Self {
        name: "pi",
        gpio_base: 0x2020_0000,
        gpio_pin_count: 54,
        mailbox_base: 0x2000_B880,
        timer_base: 0x2000_3000,
        framebuffer_end: 0x2000_0000,
    };

    /// BCM2836.
    pub const PI2: Self = Self {
        name: "pi2",
        gpio_base: 0x3F20_0000,
        gpio_pin_count: 54,
        mailbox_base: 0x3F00_B880,
        timer_base: 0x3F00_3000,
        framebuffer_end: 0x3C00_0000,
    };

    /// BCM2837.
    pub const PI3: Self = Self {
        name: "pi3",
        ..Self::PI2
    };
}

/// A machine wired to the peripherals of one board.
#[derive(Debug)]
pub struct Device {
    pub board: BoardConfig,
    pub machine: Machine,
    pub gpu: Arc<Mutex<Gpu>>,
    pub timer: Arc<Mutex<Timer>>,
}

impl Device {
    #[must_use]
    pub fn new(board: BoardConfig) -> Self {
        let mut machine = Machine::new(Memory::default());
        let gpu = Arc::new(Mutex::new(Gpu::new(
            board.mailbox_base,
            board.framebuffer_end,
        )));
        let timer = Arc::new(Mutex::new(Timer::new(board.timer_base)));
        machine.attach(gpu.clone());
        machine.attach(timer.clone());

        Self {
            board,
            machine,
            gpu,
            timer,
        }
    }

    pub fn cycle(&mut self) -> Result<()> {
        self.machine.cycle()
    }

    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<u64> {
        self.machine.run(max_cycles)
    }

    /// Renders the negotiated framebuffer, if any.
    pub fn draw(&self, canvas: &mut dyn Canvas) -> Result<()> {
        self.gpu
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .draw(&self.machine.memory, canvas)
    }
}

pub type DeviceFactory = fn() -> Device;

fn pi() -> Device {
    Device::new(BoardConfig::PI)
}

fn pi2() -> Device {
    Device::new(BoardConfig::PI2)
}

fn pi3() -> Device {
    Device::new(BoardConfig::PI3)
}

pub static DEVICES: &[(&str, DeviceFactory)] = &[
    ("pi", pi as DeviceFactory),
    ("pi2", pi2 as DeviceFactory),
    ("pi3", pi3 as DeviceFactory),
];

#[must_use]
pub fn find(name: &str) -> Option<DeviceFactory> {
    DEVICES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|&(_, factory)| factory)
}

#[must_use]
pub fn names() -> Vec<&'static str> {
    DEVICES.iter().map(|&(name, _)| name).collect()
}
