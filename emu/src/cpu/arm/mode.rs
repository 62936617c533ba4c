use crate::bitwise::Bits;
use crate::cpu::arm::instructions::ArmModeInstruction;
use crate::cpu::condition::Condition;
use crate::error::EmuError;

/// A decoded word together with its condition and the raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmModeOpcode {
    pub instruction: ArmModeInstruction,
    pub condition: Condition,
    pub raw: u32,
}

impl ArmModeOpcode {
    #[must_use]
    pub fn disassembler(&self) -> String {
        self.instruction.disassembler(self.condition)
    }
}

impl TryFrom<u32> for ArmModeOpcode {
    type Error = EmuError;

    fn try_from(op_code: u32) -> Result<Self, Self::Error> {
        Ok(Self {
            instruction: ArmModeInstruction::decode(op_code)?,
            condition: Condition::from(op_code.get_bits(28..=31) as u8),
            raw: op_code,
        })
    }
}

impl std::ops::Deref for ArmModeOpcode {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl std::fmt::Display for ArmModeOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let instruction = format!("INS: {}\n", self.disassembler());

        let bytes_pos1 = "POS: |..3 ..................2 ..................1 ..................0|\n";
        let bytes_pos2 = "     |1_0_9_8_7_6_5_4_3_2_1_0_9_8_7_6_5_4_3_2_1_0_9_8_7_6_5_4_3_2_1_0|\n";

        let op_code_format: &str = match &self.instruction {
            ArmModeInstruction::DataProcessing { .. } => {
                "FMT: |_Cond__|0_0|I|_code__|S|__Rn___|__Rd___|_______operand2________|"
            }
            ArmModeInstruction::PsrTransfer { .. } => {
                "FMT: |_Cond__|0_0|I|1_0|P|D|0|_Field_|__Rd___|_______operand2________|"
            }
            ArmModeInstruction::Multiply { .. } => {
                "FMT: |_Cond__|0_0_0_0_0_0|A|S|__Rd___|__Rn___|__Rs___|1_0_0_1|__Rm___|"
            }
            ArmModeInstruction::MultiplyLong { .. } => {
                "FMT: |_Cond__|0_0_0_0_1|U|A|S|_RdHi__|_RdLo__|__Rs___|1_0_0_1|__Rm___|"
            }
            ArmModeInstruction::SingleDataSwap { .. } => {
                "FMT: |_Cond__|0_0_0_1_0|B|0_0|__Rn___|__Rd___|0_0_0_0|1_0_0_1|__Rm___|"
            }
            ArmModeInstruction::BranchAndExchange { .. } => {
                "FMT: |_Cond__|0_0_0_1|0_0_1_0|1_1_1_1|1_1_1_1|1_1_1_1|0_0_0_1|__Rn___|"
            }
            ArmModeInstruction::ByteReverse { .. } => {
                "FMT: |_Cond__|0_1_1_0_1|H|1_1|1_1_1_1|__Rd___|1_1_1_1|B|0_1_1|__Rm___|"
            }
            ArmModeInstruction::HalfwordDataTransfer { .. }
            | ArmModeInstruction::DoublewordDataTransfer { .. } => {
                "FMT: |_Cond__|0_0_0|P|U|I|W|L|__Rn___|__Rd___|_Offset|1|S|H|1|_Offset|"
            }
            ArmModeInstruction::SingleDataTransfer { .. } => {
                "FMT: |_Cond__|0_1|I|P|U|B|W|L|__Rn___|__Rd___|________Offset_________|"
            }
            ArmModeInstruction::BlockDataTransfer { .. } => {
                "FMT: |_Cond__|1_0_0|P|U|S|W|L|__Rn___|_____________Reg_List__________|"
            }
            ArmModeInstruction::Branch { .. } => {
                "FMT: |_Cond__|1_0_1|L|______________________Offset___________________|"
            }
            ArmModeInstruction::CoprocessorDataTransfer { .. } => {
                "FMT: |_Cond__|1_1_0|P|U|N|W|L|__Rn___|__CRd__|__Cp#__|____Offset_____|"
            }
            ArmModeInstruction::CoprocessorDataOperation { .. } => {
                "FMT: |_Cond__|1_1_1_0|_CP_Opc|__CRn__|__CRd__|__Cp#__|_CP__|0|__CRm__|"
            }
            ArmModeInstruction::CoprocessorRegisterTransfer { .. } => {
                "FMT: |_Cond__|1_1_1_0|CPOpc|L|__CRn__|__Rd___|__Cp#__|_CP__|1|__CRm__|"
            }
            ArmModeInstruction::SoftwareInterrupt { .. } => {
                "FMT: |_Cond__|1_1_1_1|_____________Ignored by processor______________|"
            }
        };

        let mut raw_bits = String::new();
        for i in format!("{:#034b}", self.raw).chars().skip(2) {
            raw_bits.push(i);
            raw_bits.push('_');
        }
        raw_bits.pop();
        let raw_bits = format!("RAW: |{raw_bits}|\n");

        writeln!(
            f,
            "{instruction}{bytes_pos1}{bytes_pos2}{raw_bits}{op_code_format}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn opcode_carries_condition() {
        let opcode = ArmModeOpcode::try_from(0x1A00_0002).unwrap();
        assert_eq!(opcode.condition, Condition::NE);
        assert_eq!(*opcode, 0x1A00_0002);
        assert_eq!(opcode.disassembler(), "BNE #8");
    }

    #[test]
    fn display_shows_bits() {
        let opcode = ArmModeOpcode::try_from(0xE1A0_0000).unwrap();
        let text = opcode.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "INS: MOV R0, R0");
        assert!(lines[3].starts_with("RAW: |1_1_1_0_0_0_0_1_1_0_1_0_"));
        assert!(lines[4].starts_with("FMT: |_Cond__|0_0|I|"));
    }

    #[test]
    fn decode_errors_propagate() {
        assert!(ArmModeOpcode::try_from(0xE16F_0F10).is_err());
    }
}
