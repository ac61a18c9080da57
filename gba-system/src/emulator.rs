use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use arm7tdmi::cpu::timing;
use arm7tdmi::ARM7TDMI;

use crate::interrupt::{InterruptController, InterruptKind};
use crate::memory::{FlatRam, SharedRam};
use crate::scheduler::Scheduler;

//==============================================================================
// SESSIONE DI EMULAZIONE
//==============================================================================
// La sessione possiede esattamente una CPU e uno scheduler; la memoria e
// il controller interrupt sono condivisi con le callback delle
// periferiche tramite Rc<RefCell<...>>.
//
// CONTROL FLOW PER PASSO:
// 1. la CPU esegue un'istruzione (fetch -> decode -> execute)
// 2. lo scheduler avanza del costo dell'istruzione e drena gli eventi
//    scaduti (le periferiche girano solo ai confini di istruzione)
// 3. se il controller ha una richiesta abilitata, l'IRQ viene consegnato
//
// POLITICA SUI FAULT DI MEMORIA:
// in run_until() (produzione) un fault diventa un data abort
// architetturale e l'esecuzione prosegue dal vettore; in
// step_instructions() (superficie di test) il fault è terminale.
//==============================================================================

/// Sessione di emulazione in configurazione di test: RAM piatta da 8 KiB
/// a 0x00000000, PC al vettore di reset
pub struct Emulator {
    pub cpu: ARM7TDMI,
    pub scheduler: Scheduler,
    pub bus: SharedRam,
    pub interrupt: Rc<RefCell<InterruptController>>,
}

impl Emulator {
    pub fn new() -> Self {
        let mut cpu = ARM7TDMI::new();
        cpu.reset();
        Self {
            cpu,
            scheduler: Scheduler::new(),
            bus: SharedRam::new(FlatRam::new()),
            interrupt: Rc::new(RefCell::new(InterruptController::new())),
        }
    }

    /// Riporta l'intera sessione allo stato iniziale
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.scheduler.reset();
        self.interrupt.borrow_mut().if_ = 0;
    }

    /// Loop di produzione: esegue finché il contatore dello scheduler non
    /// raggiunge `target`. I fault di memoria diventano data abort.
    pub fn run_until(&mut self, target: u64) {
        while self.scheduler.current_cycle() < target {
            let cost = match self.cpu.step(&mut self.bus) {
                Ok(cycles) => cycles,
                Err(err) => {
                    log::error!(
                        "fault di memoria al ciclo {}: {err}",
                        self.scheduler.current_cycle()
                    );
                    self.cpu.data_abort();
                    timing::EXCEPTION
                }
            };

            let next = (self.scheduler.current_cycle() + cost as u64).min(target);
            self.scheduler.run_until(next);

            if self.interrupt.borrow().pending() {
                self.cpu.signal_irq();
            }
        }
    }

    /// Superficie di test: esegue esattamente `steps` istruzioni tenendo
    /// lo scheduler in passo con la CPU. Un fault di memoria qui è un
    /// errore terminale.
    pub fn step_instructions(&mut self, steps: u32) -> Result<u32> {
        let mut total = 0;
        for _ in 0..steps {
            let cycles = self
                .cpu
                .step(&mut self.bus)
                .context("esecuzione interrotta da un fault di memoria")?;
            total += cycles;
            self.scheduler
                .run_until(self.scheduler.current_cycle() + cycles as u64);
            if self.interrupt.borrow().pending() {
                self.cpu.signal_irq();
            }
        }
        Ok(total)
    }

    /// Programma una richiesta di interrupt fra `delta` cicli: il modello
    /// delle periferiche (timer, video) come produttori di callback
    pub fn schedule_irq(&mut self, delta: u32, kind: InterruptKind) {
        let interrupt = Rc::clone(&self.interrupt);
        self.scheduler.schedule(delta, move |_| {
            interrupt.borrow_mut().request(kind);
        });
    }

    /// Come schedule_irq, ma l'evento si rischedula a ogni scadenza
    pub fn schedule_periodic_irq(&mut self, period: u32, kind: InterruptKind) {
        fn tick(
            scheduler: &mut Scheduler,
            interrupt: Rc<RefCell<InterruptController>>,
            period: u32,
            kind: InterruptKind,
        ) {
            interrupt.borrow_mut().request(kind);
            let next = Rc::clone(&interrupt);
            scheduler.schedule(period, move |s| tick(s, next, period, kind));
        }

        let interrupt = Rc::clone(&self.interrupt);
        self.scheduler
            .schedule(period, move |s| tick(s, interrupt, period, kind));
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}
