// Esecutori THUMB: load/store
//
// Formato 6  - LDR PC-relative
// Formato 7  - LDR/STR/LDRB/STRB con offset a registro
// Formato 8  - STRH/LDRH/LDSB/LDSH con offset a registro
// Formato 9  - LDR/STR/LDRB/STRB con offset immediato
// Formato 10 - LDRH/STRH con offset immediato
// Formato 11 - LDR/STR SP-relative
// Formato 14 - PUSH/POP (stack full-descending)
// Formato 15 - STMIA/LDMIA con writeback
//
// Gli accessi word vengono allineati a 4 byte e gli halfword a 2 prima
// di toccare il bus; un fault di memoria risale al chiamante con `?`.
// Nessuna di queste istruzioni tocca i flag.

use crate::cpu::{timing, MemoryBus, MemoryError};
use crate::registers::Registers;

/// Formato 6: Rd = mem32[(PC word-aligned) + imm8*4]
pub fn pc_relative_load<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    rd: u8,
    imm8: u8,
) -> Result<u32, MemoryError> {
    // R15 in pipeline (istruzione + 4), arrotondato alla word
    let base = regs.pc().wrapping_add(2) & !3;
    let address = base.wrapping_add((imm8 as u32) * 4);
    regs.r[rd as usize] = bus.read_word(address)?;
    Ok(timing::LOAD)
}

/// Formato 7: LDR/STR/LDRB/STRB Rd, [Rb, Ro]
pub fn register_offset<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    byte: bool,
    ro: u8,
    rb: u8,
    rd: u8,
) -> Result<u32, MemoryError> {
    let address = regs.r[rb as usize].wrapping_add(regs.r[ro as usize]);
    transfer_word_or_byte(regs, bus, load, byte, address, rd)
}

/// Formato 9: LDR/STR/LDRB/STRB Rd, [Rb, #offset]
pub fn immediate_offset<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    byte: bool,
    imm5: u8,
    rb: u8,
    rd: u8,
) -> Result<u32, MemoryError> {
    // Forma word: offset in word. Forma byte: offset in byte.
    let offset = if byte { imm5 as u32 } else { (imm5 as u32) * 4 };
    let address = regs.r[rb as usize].wrapping_add(offset);
    transfer_word_or_byte(regs, bus, load, byte, address, rd)
}

fn transfer_word_or_byte<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    byte: bool,
    address: u32,
    rd: u8,
) -> Result<u32, MemoryError> {
    if load {
        regs.r[rd as usize] = if byte {
            bus.read_byte(address)? as u32
        } else {
            bus.read_word(address & !3)?
        };
        Ok(timing::LOAD)
    } else {
        let value = regs.r[rd as usize];
        if byte {
            bus.write_byte(address, value as u8)?;
        } else {
            bus.write_word(address & !3, value)?;
        }
        Ok(timing::STORE)
    }
}

/// Formato 8: STRH/LDRH/LDSB/LDSH Rd, [Rb, Ro]
pub fn sign_extended<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    half: bool,
    sign: bool,
    ro: u8,
    rb: u8,
    rd: u8,
) -> Result<u32, MemoryError> {
    let address = regs.r[rb as usize].wrapping_add(regs.r[ro as usize]);

    let cycles = match (sign, half) {
        // STRH
        (false, false) => {
            bus.write_halfword(address & !1, regs.r[rd as usize] as u16)?;
            timing::STORE
        }
        // LDRH (zero-extend)
        (false, true) => {
            regs.r[rd as usize] = bus.read_halfword(address & !1)? as u32;
            timing::LOAD
        }
        // LDSB (sign-extend da 8 bit)
        (true, false) => {
            regs.r[rd as usize] = bus.read_byte(address)? as i8 as i32 as u32;
            timing::LOAD
        }
        // LDSH (sign-extend da 16 bit)
        (true, true) => {
            regs.r[rd as usize] = bus.read_halfword(address & !1)? as i16 as i32 as u32;
            timing::LOAD
        }
    };
    Ok(cycles)
}

/// Formato 10: LDRH/STRH Rd, [Rb, #imm5*2]
pub fn halfword_immediate<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    imm5: u8,
    rb: u8,
    rd: u8,
) -> Result<u32, MemoryError> {
    let address = regs.r[rb as usize].wrapping_add((imm5 as u32) * 2);
    if load {
        regs.r[rd as usize] = bus.read_halfword(address & !1)? as u32;
        Ok(timing::LOAD)
    } else {
        bus.write_halfword(address & !1, regs.r[rd as usize] as u16)?;
        Ok(timing::STORE)
    }
}

/// Formato 11: LDR/STR Rd, [SP, #imm8*4]
pub fn sp_relative<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    rd: u8,
    imm8: u8,
) -> Result<u32, MemoryError> {
    let address = regs.sp().wrapping_add((imm8 as u32) * 4);
    if load {
        regs.r[rd as usize] = bus.read_word(address & !3)?;
        Ok(timing::LOAD)
    } else {
        bus.write_word(address & !3, regs.r[rd as usize])?;
        Ok(timing::STORE)
    }
}

/// Formato 14: PUSH {rlist[, LR]} / POP {rlist[, PC]}
///
/// Stack full-descending: PUSH decrementa SP dell'intero blocco e scrive
/// R0 all'indirizzo più basso; POP rilegge in ordine inverso. Il PC
/// caricato da POP perde il bit 0 e lo stato resta THUMB (ARMv4T).
/// Lista vuota: SP non viene toccato.
pub fn push_pop<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    r: bool,
    rlist: u8,
) -> Result<u32, MemoryError> {
    let count = rlist.count_ones() + r as u32;
    if count == 0 {
        return Ok(timing::ALU);
    }

    if load {
        // POP: dal basso verso l'alto, poi SP sale
        let mut address = regs.sp();
        for i in 0..8 {
            if rlist & (1 << i) != 0 {
                regs.r[i] = bus.read_word(address & !3)?;
                address = address.wrapping_add(4);
            }
        }
        let mut cycles = timing::block_load(rlist.count_ones());
        if r {
            let target = bus.read_word(address & !3)?;
            address = address.wrapping_add(4);
            regs.set_pc(target & !1);
            cycles += 2;
        }
        regs.set_sp(address);
        Ok(cycles)
    } else {
        // PUSH: SP scende dell'intero blocco prima delle scritture
        let base = regs.sp().wrapping_sub(count * 4);
        let mut address = base;
        for i in 0..8 {
            if rlist & (1 << i) != 0 {
                bus.write_word(address & !3, regs.r[i])?;
                address = address.wrapping_add(4);
            }
        }
        if r {
            bus.write_word(address & !3, regs.lr())?;
        }
        regs.set_sp(base);
        Ok(timing::block_store(count))
    }
}

/// Formato 15: STMIA/LDMIA Rb!, {rlist}
///
/// Trasferimento ascendente a passo 4 da Rb. Casi particolari:
/// - lista vuota: Rb resta invariato
/// - STMIA con Rb in lista: viene immagazzinato il valore originale di Rb
/// - LDMIA con Rb in lista: Rb tiene il valore caricato, non il writeback
pub fn load_store_multiple<M: MemoryBus>(
    regs: &mut Registers,
    bus: &mut M,
    load: bool,
    rb: u8,
    rlist: u8,
) -> Result<u32, MemoryError> {
    if rlist == 0 {
        return Ok(timing::ALU);
    }

    let base = regs.r[rb as usize];
    let count = rlist.count_ones();
    let mut address = base;

    if load {
        let mut base_loaded = false;
        for i in 0..8 {
            if rlist & (1 << i) != 0 {
                regs.r[i] = bus.read_word(address & !3)?;
                address = address.wrapping_add(4);
                if i == rb as usize {
                    base_loaded = true;
                }
            }
        }
        if !base_loaded {
            regs.r[rb as usize] = base.wrapping_add(count * 4);
        }
        Ok(timing::block_load(count))
    } else {
        // Le scritture leggono la vista registri prima del writeback
        for i in 0..8 {
            if rlist & (1 << i) != 0 {
                bus.write_word(address & !3, regs.r[i])?;
                address = address.wrapping_add(4);
            }
        }
        regs.r[rb as usize] = base.wrapping_add(count * 4);
        Ok(timing::block_store(count))
    }
}
