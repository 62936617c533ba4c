use crate::bitwise::Bits;
use crate::cpu::Cpu;
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArithmeticOpResult, ArmModeAluInstruction, MsrOperand, PsrKind,
    PsrOpKind, ShiftOperator, ShiftResult, add_inner_op, add_with_carry, psr_byte_mask,
    rotated_immediate, shift_by_immediate, shift_by_register, sub_inner_op, sub_with_carry,
};
use crate::cpu::arm::instructions::{
    ArmModeInstruction, ArmModeMultiplyLongVariant, ArmModeMultiplyVariant, ByteReverseVariant,
    HalfwordOffset, SingleDataTransferOffsetInfo,
};
use crate::cpu::arm::mode::ArmModeOpcode;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, ReadWriteKind,
};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};
use crate::error::{EmuError, Result};
use crate::memory::Memory;

pub const SIZE_OF_INSTRUCTION: u32 = 4;

/// How far r15 runs ahead of the executing instruction.
pub const PREFETCH_SIZE: u32 = 2 * SIZE_OF_INSTRUCTION;

/// Addressing fields shared by the halfword, doubleword and word transfers.
#[derive(Clone, Copy)]
struct Addressing {
    indexing: Indexing,
    offsetting: Offsetting,
    write_back: bool,
    rn: usize,
}

impl Addressing {
    /// Returns the transfer address and, when the base is updated, its new value.
    fn resolve(self, base: u32, offset: u32) -> (u32, Option<u32>) {
        let offset_address = self.offsetting.apply(base, offset);
        let address = match self.indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };
        let writes_back = self.write_back || self.indexing == Indexing::Post;

        (address, writes_back.then_some(offset_address))
    }
}

impl Cpu {
    /// Executes one decoded instruction.
    ///
    /// Returns whether r15 was written, in which case the words already
    /// prefetched behind this instruction are stale.
    pub fn execute_arm(&mut self, memory: &mut Memory, opcode: &ArmModeOpcode) -> Result<bool> {
        let can_execute = self
            .cpsr
            .can_execute(opcode.condition)
            .ok_or_else(|| EmuError::illegal(opcode.raw, "the NV condition is reserved"))?;
        if !can_execute {
            return Ok(false);
        }

        let pc_before = self.registers.program_counter();

        match opcode.instruction {
            ArmModeInstruction::DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => self.data_processing(alu_instruction, set_conditions, rn, destination, op2),
            ArmModeInstruction::PsrTransfer { psr_kind, kind } => {
                self.psr_transfer(psr_kind, kind)?;
            }
            ArmModeInstruction::Multiply {
                variant,
                set_conditions,
                rd,
                rn,
                rs,
                rm,
            } => self.multiply(variant, set_conditions, rd, rn, rs, rm),
            ArmModeInstruction::MultiplyLong {
                variant,
                set_conditions,
                rdhi,
                rdlo,
                rs,
                rm,
            } => self.multiply_long(variant, set_conditions, rdhi, rdlo, rs, rm),
            ArmModeInstruction::SingleDataSwap {
                quantity,
                rn,
                rd,
                rm,
            } => self.single_data_swap(memory, quantity, rn, rd, rm)?,
            ArmModeInstruction::BranchAndExchange { register } => {
                self.branch_and_exchange(opcode.raw, register)?;
            }
            ArmModeInstruction::ByteReverse { variant, rd, rm } => {
                self.byte_reverse(variant, rd, rm);
            }
            ArmModeInstruction::HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store,
                offset,
                rn,
                rd,
                transfer_kind,
            } => {
                let addressing = Addressing {
                    indexing,
                    offsetting,
                    write_back,
                    rn,
                };
                self.halfword_data_transfer(
                    memory,
                    addressing,
                    load_store,
                    offset,
                    rd,
                    transfer_kind,
                )?;
            }
            ArmModeInstruction::DoublewordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store,
                offset,
                rn,
                rd,
            } => {
                let addressing = Addressing {
                    indexing,
                    offsetting,
                    write_back,
                    rn,
                };
                self.doubleword_data_transfer(memory, addressing, load_store, offset, rd)?;
            }
            ArmModeInstruction::SingleDataTransfer {
                load_store,
                quantity,
                write_back,
                indexing,
                offsetting,
                rd,
                rn,
                offset,
            } => {
                let addressing = Addressing {
                    indexing,
                    offsetting,
                    write_back,
                    rn,
                };
                self.single_data_transfer(memory, addressing, load_store, quantity, rd, offset)?;
            }
            ArmModeInstruction::BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            } => {
                if load_psr {
                    tracing::debug!(
                        op_code = format_args!("0x{:08x}", opcode.raw),
                        "block transfer S bit ignored"
                    );
                }
                self.block_data_transfer(
                    memory,
                    indexing,
                    offsetting,
                    write_back,
                    load_store,
                    rn,
                    register_list,
                )?;
            }
            ArmModeInstruction::Branch { link, offset } => self.branch(link, offset),
            ArmModeInstruction::CoprocessorDataTransfer { .. }
            | ArmModeInstruction::CoprocessorDataOperation { .. }
            | ArmModeInstruction::CoprocessorRegisterTransfer { .. }
            | ArmModeInstruction::SoftwareInterrupt { .. } => {
                tracing::debug!(
                    op_code = format_args!("0x{:08x}", opcode.raw),
                    instruction = %opcode.disassembler(),
                    "executed as a no-op"
                );
            }
        }

        Ok(writes_program_counter(&opcode.instruction)
            || self.registers.program_counter() != pc_before)
    }

    /// Value of `reg` as an operand. r15 reads one word further ahead when
    /// the instruction needs an extra fetch cycle (register shifts, stores).
    fn operand(&self, reg: usize, extra_cycle: bool) -> u32 {
        let value = self.registers.register_at(reg);
        if reg == REG_PROGRAM_COUNTER && extra_cycle {
            value.wrapping_add(SIZE_OF_INSTRUCTION)
        } else {
            value
        }
    }

    fn shift_operand(&self, op2: AluSecondOperandInfo) -> ShiftResult {
        let carry = self.cpsr.carry_flag();
        match op2 {
            AluSecondOperandInfo::Immediate { base, rotate } => {
                rotated_immediate(base, rotate, carry)
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => shift_by_immediate(shift_kind, amount, self.operand(register, false), carry),
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => shift_by_register(
                shift_kind,
                self.registers.register_at(rs),
                self.operand(register, true),
                carry,
            ),
        }
    }

    fn data_processing(
        &mut self,
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: usize,
        destination: usize,
        op2: AluSecondOperandInfo,
    ) {
        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };

        let register_shift = matches!(
            op2,
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(_),
                ..
            }
        );
        let op1 = self.operand(rn, register_shift);
        let shifted = self.shift_operand(op2);
        let op2 = shifted.value;

        let carry = self.cpsr.carry_flag();
        let overflow = self.cpsr.overflow_flag();
        let logical = |result| ArithmeticOpResult::logical(result, shifted.carry, overflow);

        let result = match alu_instruction {
            And | Tst => logical(op1 & op2),
            Eor | Teq => logical(op1 ^ op2),
            Orr => logical(op1 | op2),
            Mov => logical(op2),
            Bic => logical(op1 & !op2),
            Mvn => logical(!op2),
            Sub | Cmp => sub_inner_op(op1, op2),
            Rsb => sub_inner_op(op2, op1),
            Add | Cmn => add_inner_op(op1, op2),
            Adc => add_with_carry(op1, op2, carry),
            Sbc => sub_with_carry(op1, op2, carry),
            Rsc => sub_with_carry(op2, op1, carry),
        };

        // With Rd = r15 the S bit still only updates the flags: no SPSR restore.
        if set_conditions {
            self.cpsr.set_flags(&result);
        }

        if !alu_instruction.is_test() {
            self.registers.set_register_at(destination, result.result);
        }
    }

    fn psr_transfer(&mut self, psr_kind: PsrKind, kind: PsrOpKind) -> Result<()> {
        match kind {
            PsrOpKind::Mrs {
                destination_register,
            } => {
                let value = match psr_kind {
                    PsrKind::Cpsr => self.cpsr.dump(),
                    PsrKind::Spsr => self.spsr()?.dump(),
                };
                self.registers.set_register_at(destination_register, value);
            }
            PsrOpKind::Msr {
                operand,
                field_mask,
            } => {
                let value = match operand {
                    MsrOperand::Register(rm) => self.registers.register_at(rm),
                    MsrOperand::Immediate { base, rotate } => base.rotate_right(rotate * 2),
                };
                let mask = psr_byte_mask(field_mask);
                let psr = match psr_kind {
                    PsrKind::Cpsr => &mut self.cpsr,
                    PsrKind::Spsr => self.spsr_mut()?,
                };
                psr.store((psr.dump() & !mask) | (value & mask));
            }
        }

        Ok(())
    }

    fn multiply(
        &mut self,
        variant: ArmModeMultiplyVariant,
        set_conditions: bool,
        rd: usize,
        rn: usize,
        rs: usize,
        rm: usize,
    ) {
        let product = self
            .registers
            .register_at(rm)
            .wrapping_mul(self.registers.register_at(rs));
        let result = match variant {
            ArmModeMultiplyVariant::Mul => product,
            ArmModeMultiplyVariant::Mla => product.wrapping_add(self.registers.register_at(rn)),
        };
        self.registers.set_register_at(rd, result);

        if set_conditions {
            self.cpsr.set_sign_flag(result.get_bit(31));
            self.cpsr.set_zero_flag(result == 0);
            // C is architecturally meaningless here; mirror bit 0 of the result.
            self.cpsr.set_carry_flag(result.get_bit(0));
        }
    }

    fn multiply_long(
        &mut self,
        variant: ArmModeMultiplyLongVariant,
        set_conditions: bool,
        rdhi: usize,
        rdlo: usize,
        rs: usize,
        rm: usize,
    ) {
        let rm_value = self.registers.register_at(rm);
        let rs_value = self.registers.register_at(rs);

        let product = if variant.is_signed() {
            (i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64
        } else {
            u64::from(rm_value) * u64::from(rs_value)
        };
        let accumulator = if variant.accumulates() {
            (u64::from(self.registers.register_at(rdhi)) << 32)
                | u64::from(self.registers.register_at(rdlo))
        } else {
            0
        };
        let result = product.wrapping_add(accumulator);

        let low = result as u32;
        self.registers.set_register_at(rdlo, low);
        self.registers.set_register_at(rdhi, (result >> 32) as u32);

        if set_conditions {
            self.cpsr.set_sign_flag(result.get_bit(63));
            self.cpsr.set_zero_flag(result == 0);
            // C and V are meaningless here; they mirror bits 0 and 1 of RdLo.
            self.cpsr.set_carry_flag(low.get_bit(0));
            self.cpsr.set_overflow_flag(low.get_bit(1));
        }
    }

    fn single_data_swap(
        &mut self,
        memory: &mut Memory,
        quantity: ReadWriteKind,
        rn: usize,
        rd: usize,
        rm: usize,
    ) -> Result<()> {
        let address = self.registers.register_at(rn);
        let source = self.registers.register_at(rm);
        let mut memory = memory.tracked();

        let old = match quantity {
            ReadWriteKind::Byte => {
                let old = memory.byte(address)?;
                memory.put_byte(address, source as u8)?;
                u32::from(old)
            }
            ReadWriteKind::Word => {
                let old = memory.word(address)?;
                memory.put_word(address, source)?;
                old
            }
        };
        self.registers.set_register_at(rd, old);

        Ok(())
    }

    fn branch_and_exchange(&mut self, op_code: u32, register: usize) -> Result<()> {
        let target = self.registers.register_at(register);
        if target.get_bit(0) {
            return Err(EmuError::illegal(op_code, "Thumb state is not supported"));
        }

        self.registers.set_program_counter(target & !0b11);
        Ok(())
    }

    fn byte_reverse(&mut self, variant: ByteReverseVariant, rd: usize, rm: usize) {
        let value = self.registers.register_at(rm);
        let result = match variant {
            ByteReverseVariant::Rev => value.swap_bytes(),
            ByteReverseVariant::Rev16 => ((value & 0x00FF_00FF) << 8) | ((value >> 8) & 0x00FF_00FF),
            ByteReverseVariant::Revsh => u32::from((value as u16).swap_bytes()).sign_extended(16),
        };
        self.registers.set_register_at(rd, result);
    }

    fn halfword_data_transfer(
        &mut self,
        memory: &mut Memory,
        addressing: Addressing,
        load_store: LoadStoreKind,
        offset: HalfwordOffset,
        rd: usize,
        transfer_kind: HalfwordTransferKind,
    ) -> Result<()> {
        let offset = match offset {
            HalfwordOffset::Immediate { offset } => offset,
            HalfwordOffset::Register { register } => self.registers.register_at(register),
        };
        let base = self.registers.register_at(addressing.rn);
        let (address, new_base) = addressing.resolve(base, offset);
        let mut memory = memory.tracked();

        match load_store {
            LoadStoreKind::Load => {
                let value = match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfwords => u32::from(memory.half_word(address)?),
                    HalfwordTransferKind::SignedByte => {
                        u32::from(memory.byte(address)?).sign_extended(8)
                    }
                    HalfwordTransferKind::SignedHalfwords => {
                        u32::from(memory.half_word(address)?).sign_extended(16)
                    }
                };
                if let Some(new_base) = new_base {
                    self.registers.set_register_at(addressing.rn, new_base);
                }
                self.registers.set_register_at(rd, value);
            }
            LoadStoreKind::Store => {
                if transfer_kind != HalfwordTransferKind::UnsignedHalfwords {
                    return Err(EmuError::UnhandledCase {
                        context: "halfword store kind",
                        value: transfer_kind as u32,
                    });
                }
                let value = self.operand(rd, true);
                memory.put_half_word(address, value as u16)?;
                if let Some(new_base) = new_base {
                    self.registers.set_register_at(addressing.rn, new_base);
                }
            }
        }

        Ok(())
    }

    fn doubleword_data_transfer(
        &mut self,
        memory: &mut Memory,
        addressing: Addressing,
        load_store: LoadStoreKind,
        offset: HalfwordOffset,
        rd: usize,
    ) -> Result<()> {
        let offset = match offset {
            HalfwordOffset::Immediate { offset } => offset,
            HalfwordOffset::Register { register } => self.registers.register_at(register),
        };
        let base = self.registers.register_at(addressing.rn);
        let (address, new_base) = addressing.resolve(base, offset);
        let next = address.wrapping_add(SIZE_OF_INSTRUCTION);
        let mut memory = memory.tracked();

        match load_store {
            LoadStoreKind::Load => {
                let low = memory.word(address)?;
                let high = memory.word(next)?;
                if let Some(new_base) = new_base {
                    self.registers.set_register_at(addressing.rn, new_base);
                }
                self.registers.set_register_at(rd, low);
                self.registers.set_register_at(rd + 1, high);
            }
            LoadStoreKind::Store => {
                memory.put_word(address, self.registers.register_at(rd))?;
                memory.put_word(next, self.registers.register_at(rd + 1))?;
                if let Some(new_base) = new_base {
                    self.registers.set_register_at(addressing.rn, new_base);
                }
            }
        }

        Ok(())
    }

    fn single_data_transfer(
        &mut self,
        memory: &mut Memory,
        addressing: Addressing,
        load_store: LoadStoreKind,
        quantity: ReadWriteKind,
        rd: usize,
        offset: SingleDataTransferOffsetInfo,
    ) -> Result<()> {
        let offset = match offset {
            SingleDataTransferOffsetInfo::Immediate { offset } => offset,
            SingleDataTransferOffsetInfo::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => {
                shift_by_immediate(
                    shift_kind,
                    shift_amount,
                    self.registers.register_at(reg_offset),
                    self.cpsr.carry_flag(),
                )
                .value
            }
        };
        let base = self.registers.register_at(addressing.rn);
        let (address, new_base) = addressing.resolve(base, offset);
        let mut memory = memory.tracked();

        match load_store {
            LoadStoreKind::Load => {
                let value = match quantity {
                    ReadWriteKind::Byte => u32::from(memory.byte(address)?),
                    ReadWriteKind::Word => memory.word(address)?,
                };
                // the loaded value wins when rd == rn
                if let Some(new_base) = new_base {
                    self.registers.set_register_at(addressing.rn, new_base);
                }
                self.registers.set_register_at(rd, value);
            }
            LoadStoreKind::Store => {
                let value = self.operand(rd, true);
                match quantity {
                    ReadWriteKind::Byte => memory.put_byte(address, value as u8)?,
                    ReadWriteKind::Word => memory.put_word(address, value)?,
                }
                if let Some(new_base) = new_base {
                    self.registers.set_register_at(addressing.rn, new_base);
                }
            }
        }

        Ok(())
    }

    /// LDM/STM. Registers are transferred in ascending order from the lowest
    /// address of the block, whatever the direction.
    ///
    /// STM writes the base back right after the first register is stored, so
    /// a base that is not the lowest listed register is stored updated.
    #[allow(clippy::too_many_arguments)]
    fn block_data_transfer(
        &mut self,
        memory: &mut Memory,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: usize,
        register_list: u16,
    ) -> Result<()> {
        let base = self.registers.register_at(rn);
        let size = register_list.count_ones() * SIZE_OF_INSTRUCTION;

        let (mut address, new_base) = match (offsetting, indexing) {
            (Offsetting::Up, Indexing::Post) => (base, base.wrapping_add(size)),
            (Offsetting::Up, Indexing::Pre) => {
                (base.wrapping_add(SIZE_OF_INSTRUCTION), base.wrapping_add(size))
            }
            (Offsetting::Down, Indexing::Post) => (
                base.wrapping_sub(size).wrapping_add(SIZE_OF_INSTRUCTION),
                base.wrapping_sub(size),
            ),
            (Offsetting::Down, Indexing::Pre) => (base.wrapping_sub(size), base.wrapping_sub(size)),
        };

        let registers = (0..16_u8)
            .filter(|&reg| register_list.get_bit(reg))
            .map(usize::from);
        let mut memory = memory.tracked();

        match load_store {
            LoadStoreKind::Load => {
                if write_back {
                    self.registers.set_register_at(rn, new_base);
                }
                for reg in registers {
                    let value = memory.word(address)?;
                    self.registers.set_register_at(reg, value);
                    address = address.wrapping_add(SIZE_OF_INSTRUCTION);
                }
            }
            LoadStoreKind::Store => {
                for (index, reg) in registers.enumerate() {
                    memory.put_word(address, self.operand(reg, true))?;
                    address = address.wrapping_add(SIZE_OF_INSTRUCTION);
                    if index == 0 && write_back {
                        self.registers.set_register_at(rn, new_base);
                    }
                }
            }
        }

        Ok(())
    }

    fn branch(&mut self, link: bool, offset: i32) {
        let pc = self.registers.program_counter();
        if link {
            self.registers.set_register_at(
                REG_LR,
                pc.wrapping_sub(PREFETCH_SIZE)
                    .wrapping_add(SIZE_OF_INSTRUCTION),
            );
        }

        self.registers.set_program_counter(pc.wrapping_add_signed(offset));
    }
}

/// Whether an executed instruction targets r15, even with the value it
/// already held (e.g. `BL` with a zero offset).
fn writes_program_counter(instruction: &ArmModeInstruction) -> bool {
    let pc = REG_PROGRAM_COUNTER;
    match *instruction {
        ArmModeInstruction::Branch { .. } | ArmModeInstruction::BranchAndExchange { .. } => true,
        ArmModeInstruction::DataProcessing {
            alu_instruction,
            destination,
            ..
        } => destination == pc && !alu_instruction.is_test(),
        ArmModeInstruction::SingleDataTransfer {
            load_store: LoadStoreKind::Load,
            rd,
            ..
        }
        | ArmModeInstruction::HalfwordDataTransfer {
            load_store: LoadStoreKind::Load,
            rd,
            ..
        } => rd == pc,
        ArmModeInstruction::BlockDataTransfer {
            load_store: LoadStoreKind::Load,
            register_list,
            ..
        } => register_list.get_bit(15),
        _ => false,
    }
}
