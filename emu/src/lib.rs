#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
pub mod bitwise;

pub mod cpu;
pub mod device;
pub mod error;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
pub mod loader;

#[allow(clippy::cast_possible_truncation)]
pub mod machine;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_lossless)]
pub mod memory;
#[allow(clippy::cast_possible_truncation)]
pub mod render;
