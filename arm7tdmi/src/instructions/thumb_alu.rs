// Esecutori THUMB: formati aritmetico-logici
//
// Formato 1  - shift con immediato (LSL/LSR/ASR)
// Formato 2  - ADD/SUB a tre registri o con imm3
// Formato 3  - MOV/CMP/ADD/SUB con imm8
// Formato 4  - ALU registro-registro (AND..MVN)
// Formato 5  - ADD/CMP/MOV/BX sui registri alti
// Formato 12 - load address (PC o SP + imm8*4)
// Formato 13 - aggiustamento SP
//
// Ogni esecutore restituisce il costo in cicli della propria classe.
// I flag seguono il contratto del formato: le operazioni marcate
// "flags unaffected" non toccano il CPSR in nessun percorso.

use crate::cpu::timing;
use crate::instructions::{alu, thumb_branch};
use crate::registers::Registers;
use crate::thumb::{thumb_alu as op4, thumb_hi, thumb_imm, ShiftOp};

/// Valore di un registro come lo vede l'istruzione: R15 legge
/// l'indirizzo dell'istruzione + 4 (prefetch della pipeline).
#[inline]
fn read_pipelined(regs: &Registers, reg: u8) -> u32 {
    if reg == 15 {
        regs.pc().wrapping_add(2)
    } else {
        regs.r[reg as usize]
    }
}

/// Formato 1: Rd = shift(Rs, #imm5). N/Z dal risultato, C dallo shifter.
pub fn shift_immediate(regs: &mut Registers, op: ShiftOp, imm5: u8, rs: u8, rd: u8) -> u32 {
    let value = regs.r[rs as usize];
    let (result, carry) = match op {
        // LSL #0 lascia il valore e il carry com'erano
        ShiftOp::Lsl => alu::lsl(value, imm5 as u32, regs.flag_c()),
        // LSR/ASR #0 codificano #32
        ShiftOp::Lsr => alu::lsr_imm(value, imm5 as u32),
        ShiftOp::Asr => alu::asr_imm(value, imm5 as u32),
    };
    regs.r[rd as usize] = result;
    alu::update_nz_shifter(regs, result, carry);
    timing::ALU
}

/// Formato 2: Rd = Rs +/- (Rn | #imm3). Tutti e quattro i flag.
pub fn add_subtract(
    regs: &mut Registers,
    sub: bool,
    immediate: bool,
    rn_or_imm3: u8,
    rs: u8,
    rd: u8,
) -> u32 {
    let lhs = regs.r[rs as usize];
    let rhs = if immediate {
        rn_or_imm3 as u32
    } else {
        regs.r[rn_or_imm3 as usize]
    };

    let (result, carry, overflow) = if sub {
        alu::sub(lhs, rhs)
    } else {
        alu::add(lhs, rhs)
    };

    regs.r[rd as usize] = result;
    alu::update_nzcv(regs, result, carry, overflow);
    timing::ALU
}

/// Formato 3: MOV/CMP/ADD/SUB Rd, #imm8
pub fn alu_immediate(regs: &mut Registers, op: u8, rd: u8, imm8: u8) -> u32 {
    let imm = imm8 as u32;
    let current = regs.r[rd as usize];

    match op {
        // MOV: N/Z dal risultato, C e V restano come sono
        thumb_imm::MOV => {
            regs.r[rd as usize] = imm;
            alu::update_nz(regs, imm);
        }
        thumb_imm::CMP => {
            let (result, carry, overflow) = alu::sub(current, imm);
            alu::update_nzcv(regs, result, carry, overflow);
        }
        thumb_imm::ADD => {
            let (result, carry, overflow) = alu::add(current, imm);
            regs.r[rd as usize] = result;
            alu::update_nzcv(regs, result, carry, overflow);
        }
        _ => {
            let (result, carry, overflow) = alu::sub(current, imm);
            regs.r[rd as usize] = result;
            alu::update_nzcv(regs, result, carry, overflow);
        }
    }
    timing::ALU
}

/// Formato 4: operazioni ALU a due operandi su R0-R7
pub fn alu_register(regs: &mut Registers, op: u8, rs: u8, rd: u8) -> u32 {
    let rd_value = regs.r[rd as usize];
    let rs_value = regs.r[rs as usize];
    let carry_in = regs.flag_c();

    match op {
        op4::AND => {
            let result = rd_value & rs_value;
            regs.r[rd as usize] = result;
            alu::update_nz(regs, result);
        }
        op4::EOR => {
            let result = rd_value ^ rs_value;
            regs.r[rd as usize] = result;
            alu::update_nz(regs, result);
        }
        // Gli shift a registro usano gli 8 bit bassi di Rs;
        // amount 0 lascia valore e carry intatti
        op4::LSL => {
            let (result, carry) = alu::lsl(rd_value, rs_value & 0xFF, carry_in);
            regs.r[rd as usize] = result;
            alu::update_nz_shifter(regs, result, carry);
        }
        op4::LSR => {
            let (result, carry) = alu::lsr(rd_value, rs_value & 0xFF, carry_in);
            regs.r[rd as usize] = result;
            alu::update_nz_shifter(regs, result, carry);
        }
        op4::ASR => {
            let (result, carry) = alu::asr(rd_value, rs_value & 0xFF, carry_in);
            regs.r[rd as usize] = result;
            alu::update_nz_shifter(regs, result, carry);
        }
        op4::ADC => {
            let (result, carry, overflow) = alu::add_with_carry(rd_value, rs_value, carry_in);
            regs.r[rd as usize] = result;
            alu::update_nzcv(regs, result, carry, overflow);
        }
        op4::SBC => {
            let (result, carry, overflow) = alu::sbc(rd_value, rs_value, carry_in);
            regs.r[rd as usize] = result;
            alu::update_nzcv(regs, result, carry, overflow);
        }
        op4::ROR => {
            let (result, carry) = alu::ror(rd_value, rs_value & 0xFF, carry_in);
            regs.r[rd as usize] = result;
            alu::update_nz_shifter(regs, result, carry);
        }
        // TST: solo flag, Rd intatto
        op4::TST => {
            alu::update_nz(regs, rd_value & rs_value);
        }
        op4::NEG => {
            let (result, carry, overflow) = alu::sub(0, rs_value);
            regs.r[rd as usize] = result;
            alu::update_nzcv(regs, result, carry, overflow);
        }
        op4::CMP => {
            let (result, carry, overflow) = alu::sub(rd_value, rs_value);
            alu::update_nzcv(regs, result, carry, overflow);
        }
        op4::CMN => {
            let (result, carry, overflow) = alu::add(rd_value, rs_value);
            alu::update_nzcv(regs, result, carry, overflow);
        }
        op4::ORR => {
            let result = rd_value | rs_value;
            regs.r[rd as usize] = result;
            alu::update_nz(regs, result);
        }
        // MUL: parola bassa del prodotto; C e V restano com'erano
        op4::MUL => {
            let result = rd_value.wrapping_mul(rs_value);
            regs.r[rd as usize] = result;
            alu::update_nz(regs, result);
            return timing::MUL;
        }
        op4::BIC => {
            let result = rd_value & !rs_value;
            regs.r[rd as usize] = result;
            alu::update_nz(regs, result);
        }
        _ => {
            let result = !rs_value;
            regs.r[rd as usize] = result;
            alu::update_nz(regs, result);
        }
    }
    timing::ALU
}

/// Formato 5: ADD/CMP/MOV/BX con accesso a R8-R15.
/// ADD e MOV non toccano i flag; una scrittura su R15 è un salto
/// (bit 0 azzerato, stato THUMB invariato). BX scambia lo stato.
pub fn hi_register_op(regs: &mut Registers, op: u8, rs: u8, rd: u8) -> u32 {
    let rs_value = read_pipelined(regs, rs);

    match op {
        thumb_hi::ADD => {
            let result = read_pipelined(regs, rd).wrapping_add(rs_value);
            if rd == 15 {
                regs.set_pc(result & !1);
                timing::BRANCH
            } else {
                regs.r[rd as usize] = result;
                timing::ALU
            }
        }
        thumb_hi::CMP => {
            let (result, carry, overflow) = alu::sub(read_pipelined(regs, rd), rs_value);
            alu::update_nzcv(regs, result, carry, overflow);
            timing::ALU
        }
        thumb_hi::MOV => {
            if rd == 15 {
                regs.set_pc(rs_value & !1);
                timing::BRANCH
            } else {
                regs.r[rd as usize] = rs_value;
                timing::ALU
            }
        }
        _ => thumb_branch::branch_exchange(regs, rs_value),
    }
}

/// Formato 12: Rd = (PC word-aligned | SP) + imm8*4. Flag intatti.
pub fn load_address(regs: &mut Registers, sp: bool, rd: u8, imm8: u8) -> u32 {
    let base = if sp {
        regs.sp()
    } else {
        // R15 in pipeline, arrotondato alla word
        regs.pc().wrapping_add(2) & !3
    };
    regs.r[rd as usize] = base.wrapping_add((imm8 as u32) * 4);
    timing::ALU
}

/// Formato 13: SP = SP +/- imm7*4. Flag intatti.
pub fn adjust_sp(regs: &mut Registers, sub: bool, imm7: u8) -> u32 {
    let offset = (imm7 as u32) * 4;
    let sp = if sub {
        regs.sp().wrapping_sub(offset)
    } else {
        regs.sp().wrapping_add(offset)
    };
    regs.set_sp(sp);
    timing::ALU
}
