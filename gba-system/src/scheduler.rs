use std::cmp::Ordering;
use std::collections::BinaryHeap;

//==============================================================================
// SCHEDULER A EVENTI DISCRETI
//==============================================================================
// Il sistema avanza su un contatore di cicli monotono a 64 bit. CPU e
// periferiche si sincronizzano qui: ogni periferica registra una callback
// da eseguire a un ciclo futuro, la CPU fa avanzare il contatore del
// costo di ogni istruzione e il loop di emulazione drena gli eventi
// scaduti con run_until().
//
// ORDINAMENTO:
// gli eventi scattano in ordine non decrescente di ciclo; a parità di
// ciclo vale l'ordine di inserimento (ogni evento porta un numero di
// sequenza monotono accoppiato alla chiave del min-heap).
//
// Le callback girano tutte sullo stesso thread, mai in concorrenza, e
// ricevono lo scheduler per potersi rischedulare; lo stato condiviso
// con le periferiche viaggia dentro la closure (Rc<RefCell<...>>).
//==============================================================================

/// Callback di un evento schedulato. Consumata alla scadenza; un evento
/// periodico si rischedula da dentro la callback.
pub type EventCallback = Box<dyn FnOnce(&mut Scheduler)>;

struct ScheduledEvent {
    trigger_cycle: u64,
    seq: u64,
    callback: EventCallback,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.trigger_cycle == other.trigger_cycle && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Invertito: BinaryHeap è un max-heap, in testa vogliamo la
        // chiave (ciclo, sequenza) più piccola
        other
            .trigger_cycle
            .cmp(&self.trigger_cycle)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Coda di eventi ordinata sul contatore di cicli globale
pub struct Scheduler {
    current_cycle: u64,
    next_seq: u64,
    queue: BinaryHeap<ScheduledEvent>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            current_cycle: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Ciclo corrente
    #[inline(always)]
    pub fn current_cycle(&self) -> u64 {
        self.current_cycle
    }

    /// Ciclo del prossimo evento in coda, se presente
    pub fn next_event_cycle(&self) -> Option<u64> {
        self.queue.peek().map(|event| event.trigger_cycle)
    }

    /// Numero di eventi in attesa
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Registra una callback a `current + delta` cicli. Un delta di zero
    /// scatta al prossimo drenaggio. Il tipo unsigned rende
    /// irrappresentabile un delta negativo.
    pub fn schedule<F>(&mut self, delta: u32, callback: F)
    where
        F: FnOnce(&mut Scheduler) + 'static,
    {
        let trigger_cycle = self.current_cycle + delta as u64;
        let seq = self.next_seq;
        self.next_seq += 1;
        log::trace!("evento #{seq} schedulato al ciclo {trigger_cycle}");
        self.queue.push(ScheduledEvent {
            trigger_cycle,
            seq,
            callback: Box::new(callback),
        });
    }

    /// Drena tutti gli eventi con scadenza <= target, portando il
    /// contatore al ciclo di ciascun evento prima di invocarlo; alla
    /// fine il contatore vale max(corrente, target). Una callback può
    /// schedulare altri eventi: se cadono entro il target scattano in
    /// questo stesso drenaggio.
    pub fn run_until(&mut self, target: u64) {
        while let Some(head) = self.queue.peek() {
            if head.trigger_cycle > target {
                break;
            }
            let event = self.queue.pop().unwrap();
            self.current_cycle = event.trigger_cycle;
            (event.callback)(self);
        }

        if self.current_cycle < target {
            self.current_cycle = target;
        }
    }

    /// Svuota la coda e azzera il contatore
    pub fn reset(&mut self) {
        self.current_cycle = 0;
        self.next_seq = 0;
        self.queue.clear();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
