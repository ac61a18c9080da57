use thiserror::Error;

use crate::arm::{decode_arm, ArmInstruction, Condition};
use crate::instructions::{thumb_alu, thumb_branch, thumb_load_store};
use crate::registers::{Registers, StatusFlags};
use crate::thumb::{decode_thumb, ThumbInstruction};

//==============================================================================
// MEMORIA E BUS
//==============================================================================
// Il MemoryBus è il trait con cui la CPU accede alla memoria. Qualsiasi
// componente che lo implementa può fare da bus: la RAM piatta del test
// harness, il bus di sistema completo, o un finto bus nei test unitari.
//
// Tutti gli accessi sono little-endian. Gli accessi halfword richiedono
// indirizzo pari, quelli word un multiplo di 4; un indirizzo fuori da
// ogni regione mappata produce MemoryError, che la CPU propaga al
// chiamante (il quale decide tra data abort e fallimento terminale).
//==============================================================================

/// Fault di memoria sollevato da un'implementazione del bus
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("accesso a indirizzo non mappato {addr:#010X}")]
    Unmapped { addr: u32 },

    #[error("accesso disallineato a {addr:#010X} (ampiezza {width} byte)")]
    Misaligned { addr: u32, width: u32 },

    #[error("scrittura su regione di sola lettura {addr:#010X}")]
    ReadOnly { addr: u32 },
}

/// Trait per l'accesso alla memoria dalla CPU
pub trait MemoryBus {
    fn read_byte(&mut self, addr: u32) -> Result<u8, MemoryError>;
    fn read_halfword(&mut self, addr: u32) -> Result<u16, MemoryError>;
    fn read_word(&mut self, addr: u32) -> Result<u32, MemoryError>;

    fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), MemoryError>;
    fn write_halfword(&mut self, addr: u32, value: u16) -> Result<(), MemoryError>;
    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), MemoryError>;
}

//==============================================================================
// ECCEZIONI
//==============================================================================

/// Eccezioni architetturali dell'ARM7TDMI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Reset,
    UndefinedInstruction,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    /// Indirizzo del vettore
    pub fn vector(self) -> u32 {
        match self {
            Exception::Reset => 0x0000_0000,
            Exception::UndefinedInstruction => 0x0000_0004,
            Exception::SoftwareInterrupt => 0x0000_0008,
            Exception::PrefetchAbort => 0x0000_000C,
            Exception::DataAbort => 0x0000_0010,
            Exception::Irq => 0x0000_0018,
            Exception::Fiq => 0x0000_001C,
        }
    }

    /// Modalità in cui si entra
    pub fn target_mode(self) -> crate::registers::Mode {
        use crate::registers::Mode;
        match self {
            Exception::Reset | Exception::SoftwareInterrupt => Mode::Supervisor,
            Exception::UndefinedInstruction => Mode::Undefined,
            Exception::PrefetchAbort | Exception::DataAbort => Mode::Abort,
            Exception::Irq => Mode::IRQ,
            Exception::Fiq => Mode::FIQ,
        }
    }
}

//==============================================================================
// CPU ARM7TDMI
//==============================================================================
// Il processore del Game Boy Advance: set ARM a 32-bit e THUMB a 16-bit,
// 16 registri visibili più i banchi per modalità, prefetch a pipeline.
//
// Il core esegue il set THUMB completo (19 formati). Dello stato ARM
// implementa il minimo che serve ai cambi di modalità: BX, B/BL e il
// valutatore di condizioni. step() esegue una istruzione e restituisce
// il costo in cicli della sua classe (tabella nel modulo `timing`).
//==============================================================================

/// Vettore di reset
pub const RESET_VECTOR: u32 = 0x0000_0000;

/// CPU ARM7TDMI
///
/// Campi:
/// - `regs`: registri (R0-R15, CPSR, SPSR, banchi per modalità)
/// - `cycles`: contatore cicli totali eseguiti
/// - `halted`: CPU in stato HALT fino al prossimo interrupt
/// - `swi_passthrough`: in test mode la SWI avanza solo il PC invece di
///   entrare in Supervisor (comportamento documentato del harness)
pub struct ARM7TDMI {
    pub regs: Registers,
    pub cycles: u64,
    pub halted: bool,
    pub swi_passthrough: bool,
}

impl ARM7TDMI {
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            cycles: 0,
            halted: false,
            swi_passthrough: false,
        }
    }

    /// Reset della CPU: registri azzerati, PC al vettore di reset,
    /// Supervisor con IRQ e FIQ disabilitati, stato ARM
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.regs.set_pc(RESET_VECTOR);
        self.cycles = 0;
        self.halted = false;
    }

    /// Esegui una singola istruzione e restituisci i cicli usati.
    ///
    /// Un fault di memoria risale al chiamante senza toccare i registri
    /// oltre a quanto già eseguito: sta al livello superiore scegliere
    /// tra `data_abort()` (comportamento di produzione) e interruzione.
    pub fn step<M: MemoryBus>(&mut self, bus: &mut M) -> Result<u32, MemoryError> {
        if self.halted {
            self.cycles += 1;
            return Ok(1);
        }

        let cycles = if self.regs.is_thumb() {
            self.execute_thumb(bus)?
        } else {
            self.execute_arm(bus)?
        };

        self.cycles += cycles as u64;
        Ok(cycles)
    }

    /// Esegui esattamente `steps` istruzioni; restituisce i cicli totali.
    /// Superficie usata dal test harness.
    pub fn execute<M: MemoryBus>(&mut self, bus: &mut M, steps: u32) -> Result<u32, MemoryError> {
        let mut total = 0;
        for _ in 0..steps {
            total += self.step(bus)?;
        }
        Ok(total)
    }

    //==========================================================================
    // Accessori per test e debugger
    //==========================================================================

    /// Lettura di un registro della vista attiva
    #[inline(always)]
    pub fn register(&self, index: usize) -> u32 {
        self.regs.r[index]
    }

    /// Scrittura di un registro della vista attiva
    #[inline(always)]
    pub fn set_register(&mut self, index: usize, value: u32) {
        self.regs.r[index] = value;
    }

    #[inline(always)]
    pub fn cpsr(&self) -> u32 {
        self.regs.cpsr
    }

    pub fn set_cpsr(&mut self, value: u32) {
        self.regs.set_cpsr(value);
    }

    #[inline(always)]
    pub fn flag(&self, flag: StatusFlags) -> bool {
        self.regs.flag(flag)
    }

    //==========================================================================
    // Esecuzione THUMB
    //==========================================================================

    fn execute_thumb<M: MemoryBus>(&mut self, bus: &mut M) -> Result<u32, MemoryError> {
        let pc = self.regs.pc();
        let opcode = bus.read_halfword(pc & !1)?;
        self.regs.set_pc(pc.wrapping_add(2));

        let cycles = match decode_thumb(opcode) {
            ThumbInstruction::ShiftImmediate { op, imm5, rs, rd } => {
                thumb_alu::shift_immediate(&mut self.regs, op, imm5, rs, rd)
            }
            ThumbInstruction::AddSubtract {
                sub,
                immediate,
                rn_or_imm3,
                rs,
                rd,
            } => thumb_alu::add_subtract(&mut self.regs, sub, immediate, rn_or_imm3, rs, rd),
            ThumbInstruction::AluImmediate { op, rd, imm8 } => {
                thumb_alu::alu_immediate(&mut self.regs, op, rd, imm8)
            }
            ThumbInstruction::AluRegister { op, rs, rd } => {
                thumb_alu::alu_register(&mut self.regs, op, rs, rd)
            }
            ThumbInstruction::HiRegisterOp { op, rs, rd } => {
                thumb_alu::hi_register_op(&mut self.regs, op, rs, rd)
            }
            ThumbInstruction::LoadPcRelative { rd, imm8 } => {
                thumb_load_store::pc_relative_load(&mut self.regs, bus, rd, imm8)?
            }
            ThumbInstruction::LoadStoreRegister {
                load,
                byte,
                ro,
                rb,
                rd,
            } => thumb_load_store::register_offset(&mut self.regs, bus, load, byte, ro, rb, rd)?,
            ThumbInstruction::LoadStoreSignExtended {
                half,
                sign,
                ro,
                rb,
                rd,
            } => thumb_load_store::sign_extended(&mut self.regs, bus, half, sign, ro, rb, rd)?,
            ThumbInstruction::LoadStoreImmediate {
                load,
                byte,
                imm5,
                rb,
                rd,
            } => thumb_load_store::immediate_offset(&mut self.regs, bus, load, byte, imm5, rb, rd)?,
            ThumbInstruction::LoadStoreHalfword { load, imm5, rb, rd } => {
                thumb_load_store::halfword_immediate(&mut self.regs, bus, load, imm5, rb, rd)?
            }
            ThumbInstruction::LoadStoreSpRelative { load, rd, imm8 } => {
                thumb_load_store::sp_relative(&mut self.regs, bus, load, rd, imm8)?
            }
            ThumbInstruction::LoadAddress { sp, rd, imm8 } => {
                thumb_alu::load_address(&mut self.regs, sp, rd, imm8)
            }
            ThumbInstruction::AdjustSp { sub, imm7 } => {
                thumb_alu::adjust_sp(&mut self.regs, sub, imm7)
            }
            ThumbInstruction::PushPop { load, r, rlist } => {
                thumb_load_store::push_pop(&mut self.regs, bus, load, r, rlist)?
            }
            ThumbInstruction::LoadStoreMultiple { load, rb, rlist } => {
                thumb_load_store::load_store_multiple(&mut self.regs, bus, load, rb, rlist)?
            }
            ThumbInstruction::ConditionalBranch { cond, offset } => {
                thumb_branch::conditional_branch(&mut self.regs, cond, offset)
            }
            ThumbInstruction::SoftwareInterrupt { comment } => self.software_interrupt(comment),
            ThumbInstruction::UnconditionalBranch { offset } => {
                thumb_branch::unconditional_branch(&mut self.regs, offset)
            }
            ThumbInstruction::LongBranchLink { high, offset } => {
                thumb_branch::long_branch_link(&mut self.regs, high, offset)
            }
            ThumbInstruction::Undefined => self.undefined_instruction(opcode),
        };

        Ok(cycles)
    }

    //==========================================================================
    // Esecuzione ARM (sottoinsieme per i cambi di modalità)
    //==========================================================================

    fn execute_arm<M: MemoryBus>(&mut self, bus: &mut M) -> Result<u32, MemoryError> {
        let pc = self.regs.pc();
        let instruction = bus.read_word(pc & !3)?;
        self.regs.set_pc(pc.wrapping_add(4));

        if !Condition::from_bits(instruction >> 28).check(self.regs.cpsr) {
            return Ok(timing::BRANCH_NOT_TAKEN);
        }

        let cycles = match decode_arm(instruction) {
            ArmInstruction::BranchExchange { rn } => {
                // R15 come operando vale istruzione + 8
                let target = if rn == 15 {
                    self.regs.pc().wrapping_add(4)
                } else {
                    self.regs.r[rn as usize]
                };
                thumb_branch::branch_exchange(&mut self.regs, target)
            }
            ArmInstruction::Branch { link, offset } => {
                let base = self.regs.pc().wrapping_add(4);
                if link {
                    // Ritorno all'istruzione successiva
                    self.regs.set_lr(self.regs.pc());
                }
                self.regs.set_pc(base.wrapping_add(offset as u32) & !3);
                timing::BRANCH
            }
            ArmInstruction::Unhandled => {
                log::warn!("istruzione ARM fuori contratto {instruction:#010X} @ {pc:#010X}");
                timing::ALU
            }
        };

        Ok(cycles)
    }

    //==========================================================================
    // Eccezioni e interrupt
    //==========================================================================

    /// Ingresso in eccezione: SPSR <- CPSR, cambio banco, LR <- ritorno,
    /// IRQ disabilitati (e FIQ per Reset/FIQ), stato ARM, PC al vettore.
    pub fn enter_exception(&mut self, exception: Exception, return_addr: u32) {
        log::debug!(
            "eccezione {:?}: vettore {:#04X}, ritorno {:#010X}",
            exception,
            exception.vector(),
            return_addr
        );

        let old_cpsr = self.regs.cpsr;
        self.regs.change_mode(exception.target_mode());
        self.regs.set_spsr(old_cpsr);
        self.regs.set_lr(return_addr);
        self.regs.cpsr |= StatusFlags::IRQ_DISABLE.bits();
        if matches!(exception, Exception::Reset | Exception::Fiq) {
            self.regs.cpsr |= StatusFlags::FIQ_DISABLE.bits();
        }
        self.regs.set_thumb(false);
        self.regs.set_pc(exception.vector());
    }

    /// Uscita dall'eccezione corrente: CPSR <- SPSR, PC <- LR riallineato
    /// allo stato ripristinato.
    pub fn leave_exception(&mut self) {
        let spsr = self.regs.spsr();
        let return_addr = self.regs.lr();
        self.regs.set_cpsr(spsr);
        if self.regs.is_thumb() {
            self.regs.set_pc(return_addr & !1);
        } else {
            self.regs.set_pc(return_addr & !3);
        }
    }

    /// Consegna un IRQ se il CPSR lo permette. Restituisce true se la CPU
    /// è entrata nel gestore. Un IRQ riattiva una CPU in HALT.
    ///
    /// LR riceve l'indirizzo della prossima istruzione non eseguita, così
    /// leave_exception() riprende esattamente da lì.
    pub fn signal_irq(&mut self) -> bool {
        if self.regs.flag(StatusFlags::IRQ_DISABLE) {
            return false;
        }
        self.halted = false;
        let return_addr = self.regs.pc();
        self.enter_exception(Exception::Irq, return_addr);
        true
    }

    /// Data abort per un fault di memoria (politica di produzione).
    /// Nessun accesso viene ritentato: il ritorno salta l'istruzione
    /// che ha causato il fault.
    pub fn data_abort(&mut self) {
        let return_addr = self.regs.pc();
        self.enter_exception(Exception::DataAbort, return_addr);
    }

    fn software_interrupt(&mut self, comment: u8) -> u32 {
        if self.swi_passthrough {
            // Test mode: la SWI non tocca registri né flag
            log::trace!("SWI #{comment:#04X} in passthrough");
            return timing::EXCEPTION;
        }
        let return_addr = self.regs.pc();
        self.enter_exception(Exception::SoftwareInterrupt, return_addr);
        timing::EXCEPTION
    }

    fn undefined_instruction(&mut self, opcode: u16) -> u32 {
        log::warn!(
            "istruzione THUMB non definita {opcode:#06X} @ {:#010X}",
            self.regs.pc().wrapping_sub(2)
        );
        let return_addr = self.regs.pc();
        self.enter_exception(Exception::UndefinedInstruction, return_addr);
        timing::EXCEPTION
    }
}

impl Default for ARM7TDMI {
    fn default() -> Self {
        Self::new()
    }
}

/// Costi in cicli per classe di istruzione.
///
/// Stima per classe, non modello del bus: niente wait state né prefetch
/// buffer. I valori seguono le classi S/N/I dell'ARM7TDMI:
/// le operazioni dato-registro costano 1S, un load 1S+1N+1I, uno store
/// 2N, un salto preso 2S+1N.
pub mod timing {
    /// Operazioni dato-registro (shift, aritmetica, logica)
    pub const ALU: u32 = 1;
    /// Moltiplicazione (costo fisso, senza early-out)
    pub const MUL: u32 = 1;
    /// Load singolo (1S + 1N + 1I)
    pub const LOAD: u32 = 3;
    /// Store singolo (2N)
    pub const STORE: u32 = 2;
    /// Salto preso, BX, ingresso eccezione (2S + 1N)
    pub const BRANCH: u32 = 3;
    /// Salto non preso o condizione ARM non soddisfatta
    pub const BRANCH_NOT_TAKEN: u32 = 1;
    /// Prima metà di una BL (solo scrittura di LR)
    pub const BL_HIGH: u32 = 1;
    /// Ingresso in eccezione (SWI, undefined, IRQ)
    pub const EXCEPTION: u32 = 3;

    /// LDMIA/POP di `count` registri (nS + 1N + 1I)
    pub fn block_load(count: u32) -> u32 {
        count + 2
    }

    /// STMIA/PUSH di `count` registri ((n-1)S + 2N)
    pub fn block_store(count: u32) -> u32 {
        count + 1
    }
}
