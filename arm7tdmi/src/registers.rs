use bitflags::bitflags;
use serde::{Deserialize, Serialize};

//==============================================================================
// REGISTRI CPU ARM7TDMI
//==============================================================================
// La CPU ARM7TDMI ha 16 registri visibili più un insieme di registri "banked"
// che entrano in gioco al cambio di modalità:
//
// R0-R12  : Registri generali (R8-R12 hanno un banco dedicato in FIQ)
// R13 (SP): Stack Pointer (uno per modalità privilegiata)
// R14 (LR): Link Register (uno per modalità privilegiata)
// R15 (PC): Program Counter
// CPSR    : Current Program Status Register (flag NZCV, I/F/T, modalità)
// SPSR    : Saved Program Status Register (solo modalità privilegiate)
//
// ORGANIZZAZIONE:
// `r` è la vista attiva: le istruzioni leggono e scrivono sempre lì.
// I banchi per modalità stanno in array indicizzati da Mode::bank_index();
// change_mode() salva la vista nel banco uscente e ricarica quello entrante.
// Nel percorso caldo Thumb non si cambia mai banco: solo le eccezioni
// (SWI, abort, IRQ) passano di qui.
//==============================================================================

/// Modalità operative della CPU ARM7TDMI
///
/// - User: esecuzione normale
/// - FIQ/IRQ: gestione interrupt (FIQ ha priorità e banco R8-R12 proprio)
/// - Supervisor: BIOS / SWI
/// - Abort: fault di memoria
/// - Undefined: istruzioni non riconosciute
/// - System: privilegiata ma con i registri User
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    User = 0b10000,
    FIQ = 0b10001,
    IRQ = 0b10010,
    Supervisor = 0b10011,
    Abort = 0b10111,
    Undefined = 0b11011,
    System = 0b11111,
}

impl Mode {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0x1F {
            0b10000 => Some(Mode::User),
            0b10001 => Some(Mode::FIQ),
            0b10010 => Some(Mode::IRQ),
            0b10011 => Some(Mode::Supervisor),
            0b10111 => Some(Mode::Abort),
            0b11011 => Some(Mode::Undefined),
            0b11111 => Some(Mode::System),
            _ => None,
        }
    }

    /// Indice nel banco registri. User e System condividono lo stesso banco.
    fn bank_index(self) -> usize {
        match self {
            Mode::User | Mode::System => 0,
            Mode::FIQ => 1,
            Mode::IRQ => 2,
            Mode::Supervisor => 3,
            Mode::Abort => 4,
            Mode::Undefined => 5,
        }
    }

    /// User e System non hanno uno SPSR proprio
    pub fn has_spsr(self) -> bool {
        !matches!(self, Mode::User | Mode::System)
    }
}

/// Stato della CPU (ARM o THUMB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    ARM,
    THUMB,
}

bitflags! {
    /// Flag del Program Status Register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusFlags: u32 {
        const NEGATIVE    = 1 << 31; // N
        const ZERO        = 1 << 30; // Z
        const CARRY       = 1 << 29; // C
        const OVERFLOW    = 1 << 28; // V
        const IRQ_DISABLE = 1 << 7;  // I
        const FIQ_DISABLE = 1 << 6;  // F
        const THUMB_STATE = 1 << 5;  // T
    }
}

/// Numero di banchi per modalità (User/System, FIQ, IRQ, SVC, ABT, UND)
const BANK_COUNT: usize = 6;

/// Set di registri ARM7TDMI con banking per modalità
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registers {
    /// Vista attiva R0-R15
    pub r: [u32; 16],

    /// SP (R13) per banco
    bank_r13: [u32; BANK_COUNT],
    /// LR (R14) per banco
    bank_r14: [u32; BANK_COUNT],
    /// SPSR per banco (slot 0 inutilizzato: User/System leggono il CPSR)
    bank_spsr: [u32; BANK_COUNT],

    /// R8-R12 del banco FIQ
    r8_12_fiq: [u32; 5],
    /// Copia User di R8-R12 mentre il banco FIQ è attivo
    r8_12_user: [u32; 5],

    /// Current Program Status Register
    pub cpsr: u32,

    /// Modalità corrente (sempre coerente col banco caricato in `r`)
    pub mode: Mode,
}

impl Registers {
    /// Stato post-reset: modalità Supervisor, IRQ e FIQ disabilitati, ARM
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            bank_r13: [0; BANK_COUNT],
            bank_r14: [0; BANK_COUNT],
            bank_spsr: [0; BANK_COUNT],
            r8_12_fiq: [0; 5],
            r8_12_user: [0; 5],
            cpsr: Mode::Supervisor as u32
                | StatusFlags::IRQ_DISABLE.bits()
                | StatusFlags::FIQ_DISABLE.bits(),
            mode: Mode::Supervisor,
        }
    }

    /// Program Counter (R15)
    #[inline(always)]
    pub fn pc(&self) -> u32 {
        self.r[15]
    }

    /// Set Program Counter
    #[inline(always)]
    pub fn set_pc(&mut self, value: u32) {
        self.r[15] = value;
    }

    /// Stack Pointer (R13)
    #[inline(always)]
    pub fn sp(&self) -> u32 {
        self.r[13]
    }

    /// Set Stack Pointer
    #[inline(always)]
    pub fn set_sp(&mut self, value: u32) {
        self.r[13] = value;
    }

    /// Link Register (R14)
    #[inline(always)]
    pub fn lr(&self) -> u32 {
        self.r[14]
    }

    /// Set Link Register
    #[inline(always)]
    pub fn set_lr(&mut self, value: u32) {
        self.r[14] = value;
    }

    /// Verifica se siamo in stato THUMB
    #[inline(always)]
    pub fn is_thumb(&self) -> bool {
        self.cpsr & StatusFlags::THUMB_STATE.bits() != 0
    }

    /// Imposta stato THUMB
    #[inline(always)]
    pub fn set_thumb(&mut self, thumb: bool) {
        if thumb {
            self.cpsr |= StatusFlags::THUMB_STATE.bits();
        } else {
            self.cpsr &= !StatusFlags::THUMB_STATE.bits();
        }
    }

    /// Stato corrente della CPU
    #[inline(always)]
    pub fn cpu_state(&self) -> CpuState {
        if self.is_thumb() {
            CpuState::THUMB
        } else {
            CpuState::ARM
        }
    }

    /// Lettura generica di un flag del CPSR
    #[inline(always)]
    pub fn flag(&self, flag: StatusFlags) -> bool {
        self.cpsr & flag.bits() != 0
    }

    fn set_flag(&mut self, flag: StatusFlags, value: bool) {
        if value {
            self.cpsr |= flag.bits();
        } else {
            self.cpsr &= !flag.bits();
        }
    }

    /// Flag Negative
    #[inline(always)]
    pub fn flag_n(&self) -> bool {
        self.flag(StatusFlags::NEGATIVE)
    }

    #[inline(always)]
    pub fn set_flag_n(&mut self, value: bool) {
        self.set_flag(StatusFlags::NEGATIVE, value);
    }

    /// Flag Zero
    #[inline(always)]
    pub fn flag_z(&self) -> bool {
        self.flag(StatusFlags::ZERO)
    }

    #[inline(always)]
    pub fn set_flag_z(&mut self, value: bool) {
        self.set_flag(StatusFlags::ZERO, value);
    }

    /// Flag Carry
    #[inline(always)]
    pub fn flag_c(&self) -> bool {
        self.flag(StatusFlags::CARRY)
    }

    #[inline(always)]
    pub fn set_flag_c(&mut self, value: bool) {
        self.set_flag(StatusFlags::CARRY, value);
    }

    /// Flag Overflow
    #[inline(always)]
    pub fn flag_v(&self) -> bool {
        self.flag(StatusFlags::OVERFLOW)
    }

    #[inline(always)]
    pub fn set_flag_v(&mut self, value: bool) {
        self.set_flag(StatusFlags::OVERFLOW, value);
    }

    /// Scrittura atomica dei quattro flag NZCV
    #[inline(always)]
    pub fn set_nzcv(&mut self, n: bool, z: bool, c: bool, v: bool) {
        let mut cpsr = self.cpsr & 0x0FFF_FFFF;
        if n {
            cpsr |= StatusFlags::NEGATIVE.bits();
        }
        if z {
            cpsr |= StatusFlags::ZERO.bits();
        }
        if c {
            cpsr |= StatusFlags::CARRY.bits();
        }
        if v {
            cpsr |= StatusFlags::OVERFLOW.bits();
        }
        self.cpsr = cpsr;
    }

    /// Cambia modalità CPU, scambiando i banchi SP/LR (e R8-R12 per FIQ)
    pub fn change_mode(&mut self, new_mode: Mode) {
        if self.mode == new_mode {
            return;
        }

        let old_bank = self.mode.bank_index();
        let new_bank = new_mode.bank_index();

        // Salva la vista attiva nel banco uscente, carica quello entrante
        self.bank_r13[old_bank] = self.r[13];
        self.bank_r14[old_bank] = self.r[14];
        self.r[13] = self.bank_r13[new_bank];
        self.r[14] = self.bank_r14[new_bank];

        // R8-R12 hanno un banco dedicato solo in FIQ
        if (self.mode == Mode::FIQ) != (new_mode == Mode::FIQ) {
            if new_mode == Mode::FIQ {
                for i in 0..5 {
                    self.r8_12_user[i] = self.r[8 + i];
                    self.r[8 + i] = self.r8_12_fiq[i];
                }
            } else {
                for i in 0..5 {
                    self.r8_12_fiq[i] = self.r[8 + i];
                    self.r[8 + i] = self.r8_12_user[i];
                }
            }
        }

        self.mode = new_mode;
        self.cpsr = (self.cpsr & !0x1F) | (new_mode as u32);
    }

    /// Scrive il CPSR completo, riallineando il banco se i bit di modalità
    /// sono validi. Bit di modalità non validi lasciano il banco attivo
    /// com'è (il test harness scrive parole di soli flag).
    pub fn set_cpsr(&mut self, value: u32) {
        if let Some(mode) = Mode::from_bits(value) {
            self.change_mode(mode);
        }
        self.cpsr = value;
    }

    /// SPSR della modalità corrente (CPSR in User/System)
    pub fn spsr(&self) -> u32 {
        if self.mode.has_spsr() {
            self.bank_spsr[self.mode.bank_index()]
        } else {
            self.cpsr
        }
    }

    /// Scrive lo SPSR della modalità corrente (no-op in User/System)
    pub fn set_spsr(&mut self, value: u32) {
        if self.mode.has_spsr() {
            self.bank_spsr[self.mode.bank_index()] = value;
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
