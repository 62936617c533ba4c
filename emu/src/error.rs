use thiserror::Error;

/// Everything that can stop the emulated machine.
///
/// Opcode errors are created without knowing where the instruction lives in
/// memory; the pipeline fills the address in with [`EmuError::at`] before the
/// error reaches the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmuError {
    /// A decoded instruction with a forbidden operand combination.
    #[error("illegal opcode 0x{op_code:08x} at 0x{address:08x}: {reason}")]
    IllegalOpcode {
        op_code: u32,
        address: u32,
        reason: &'static str,
    },

    /// No decoder rule recognized the word.
    #[error("unknown opcode 0x{op_code:08x} at 0x{address:08x}")]
    UnknownOpcode { op_code: u32, address: u32 },

    /// A sub-opcode field hit a branch that decoding should have excluded.
    #[error("unhandled {context}: 0x{value:x}")]
    UnhandledCase { context: &'static str, value: u32 },

    #[error("address 0x{address:x} is out of range, memory size is 0x{size:x}")]
    OutOfRange { address: u64, size: u64 },

    #[error("cpu mode 0x{0:x} has no saved status register")]
    ModeOutOfRange(u32),

    /// Misuse of the emulator by the host, e.g. a peripheral reconfigured after first use.
    #[error("{0}")]
    Logic(String),
}

impl EmuError {
    pub(crate) const fn illegal(op_code: u32, reason: &'static str) -> Self {
        Self::IllegalOpcode {
            op_code,
            address: 0,
            reason,
        }
    }

    /// Annotates opcode errors with the address of the faulting instruction.
    /// Other kinds are returned unchanged.
    #[must_use]
    pub fn at(self, address: u32) -> Self {
        match self {
            Self::IllegalOpcode {
                op_code, reason, ..
            } => Self::IllegalOpcode {
                op_code,
                address,
                reason,
            },
            Self::UnknownOpcode { op_code, .. } => Self::UnknownOpcode { op_code, address },
            other => other,
        }
    }
}

pub type Result<T, E = EmuError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn at_annotates_opcode_errors_only() {
        let error = EmuError::illegal(0xE000_0190, "rd and rm must differ").at(0x40);
        assert_eq!(
            error.to_string(),
            "illegal opcode 0xe0000190 at 0x00000040: rd and rm must differ"
        );

        let range = EmuError::OutOfRange {
            address: 0x10,
            size: 0x10,
        };
        assert_eq!(range.clone().at(0x40), range);
    }
}
