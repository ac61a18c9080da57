// Test dello scheduler: ordinamento, tie-break FIFO, drenaggio,
// rischedulazione dalle callback e monotonia del contatore.

use std::cell::RefCell;
use std::rc::Rc;

use crate::scheduler::Scheduler;

/// Traccia condivisa dell'ordine di esecuzione delle callback
fn trace() -> Rc<RefCell<Vec<&'static str>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn record(
    scheduler: &mut Scheduler,
    delta: u32,
    log: &Rc<RefCell<Vec<&'static str>>>,
    tag: &'static str,
) {
    let log = Rc::clone(log);
    scheduler.schedule(delta, move |_| log.borrow_mut().push(tag));
}

#[test]
fn test_events_fire_in_cycle_order() {
    // schedule(10, A); schedule(5, B); schedule(10, C) -> B, A, C
    let mut scheduler = Scheduler::new();
    let log = trace();
    record(&mut scheduler, 10, &log, "A");
    record(&mut scheduler, 5, &log, "B");
    record(&mut scheduler, 10, &log, "C");

    scheduler.run_until(10);
    assert_eq!(*log.borrow(), vec!["B", "A", "C"]);
    assert_eq!(scheduler.current_cycle(), 10);
    assert_eq!(scheduler.pending_events(), 0);
}

#[test]
fn test_equal_cycle_ties_break_by_insertion() {
    let mut scheduler = Scheduler::new();
    let log = trace();
    for tag in ["primo", "secondo", "terzo", "quarto"] {
        record(&mut scheduler, 7, &log, tag);
    }

    scheduler.run_until(7);
    assert_eq!(*log.borrow(), vec!["primo", "secondo", "terzo", "quarto"]);
}

#[test]
fn test_run_until_advances_with_empty_queue() {
    let mut scheduler = Scheduler::new();
    scheduler.run_until(1234);
    assert_eq!(scheduler.current_cycle(), 1234);
}

#[test]
fn test_run_until_leaves_future_events_queued() {
    let mut scheduler = Scheduler::new();
    let log = trace();
    record(&mut scheduler, 5, &log, "dentro");
    record(&mut scheduler, 15, &log, "fuori");

    scheduler.run_until(10);
    assert_eq!(*log.borrow(), vec!["dentro"]);
    assert_eq!(scheduler.current_cycle(), 10);
    // la testa della coda resta oltre il target
    assert_eq!(scheduler.next_event_cycle(), Some(15));

    scheduler.run_until(15);
    assert_eq!(*log.borrow(), vec!["dentro", "fuori"]);
}

#[test]
fn test_zero_delta_fires_at_next_drain() {
    let mut scheduler = Scheduler::new();
    let log = trace();
    record(&mut scheduler, 0, &log, "subito");

    scheduler.run_until(0);
    assert_eq!(*log.borrow(), vec!["subito"]);
    assert_eq!(scheduler.current_cycle(), 0);
}

#[test]
fn test_counter_advances_to_each_trigger_cycle() {
    // la callback osserva il contatore già posizionato sul proprio ciclo
    let mut scheduler = Scheduler::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    for delta in [3u32, 9, 6] {
        let seen = Rc::clone(&seen);
        scheduler.schedule(delta, move |s| seen.borrow_mut().push(s.current_cycle()));
    }

    scheduler.run_until(20);
    assert_eq!(*seen.borrow(), vec![3, 6, 9]);
}

#[test]
fn test_callback_reschedules_within_target() {
    // un evento schedulato da una callback scatta nello stesso drenaggio
    // se cade entro il target
    let mut scheduler = Scheduler::new();
    let log = trace();
    let inner_log = Rc::clone(&log);
    scheduler.schedule(5, move |s| {
        inner_log.borrow_mut().push("esterno");
        let log = Rc::clone(&inner_log);
        s.schedule(2, move |_| log.borrow_mut().push("interno"));
    });

    scheduler.run_until(10);
    assert_eq!(*log.borrow(), vec!["esterno", "interno"]);
    assert_eq!(scheduler.current_cycle(), 10);
}

#[test]
fn test_callback_reschedule_beyond_target_is_deferred() {
    let mut scheduler = Scheduler::new();
    let log = trace();
    let inner_log = Rc::clone(&log);
    scheduler.schedule(5, move |s| {
        inner_log.borrow_mut().push("esterno");
        let log = Rc::clone(&inner_log);
        s.schedule(100, move |_| log.borrow_mut().push("tardi"));
    });

    scheduler.run_until(10);
    assert_eq!(*log.borrow(), vec!["esterno"]);
    assert_eq!(scheduler.next_event_cycle(), Some(105));
}

#[test]
fn test_same_cycle_chain_respects_insertion_order() {
    // A (che accoda D a delta zero) e B stanno allo stesso ciclo: D deve
    // scattare dopo B, perché accodato dopo
    let mut scheduler = Scheduler::new();
    let log = trace();
    let a_log = Rc::clone(&log);
    scheduler.schedule(5, move |s| {
        a_log.borrow_mut().push("A");
        let log = Rc::clone(&a_log);
        s.schedule(0, move |_| log.borrow_mut().push("D"));
    });
    record(&mut scheduler, 5, &log, "B");

    scheduler.run_until(10);
    assert_eq!(*log.borrow(), vec!["A", "B", "D"]);
}

#[test]
fn test_run_until_is_monotonic() {
    let mut scheduler = Scheduler::new();
    scheduler.run_until(100);
    // un target nel passato non riporta indietro il contatore
    scheduler.run_until(40);
    assert_eq!(scheduler.current_cycle(), 100);
}

#[test]
fn test_reset_empties_queue_and_counter() {
    let mut scheduler = Scheduler::new();
    let log = trace();
    record(&mut scheduler, 5, &log, "fantasma");
    scheduler.run_until(2);

    scheduler.reset();
    assert_eq!(scheduler.current_cycle(), 0);
    assert_eq!(scheduler.pending_events(), 0);

    scheduler.run_until(10);
    assert!(log.borrow().is_empty()); // l'evento pre-reset non scatta
}

#[test]
fn test_periodic_event_self_reschedules() {
    fn tick(scheduler: &mut Scheduler, counter: Rc<RefCell<u32>>, period: u32) {
        *counter.borrow_mut() += 1;
        let next = Rc::clone(&counter);
        scheduler.schedule(period, move |s| tick(s, next, period));
    }

    let mut scheduler = Scheduler::new();
    let counter = Rc::new(RefCell::new(0u32));
    let first = Rc::clone(&counter);
    scheduler.schedule(10, move |s| tick(s, first, 10));

    scheduler.run_until(100);
    assert_eq!(*counter.borrow(), 10); // cicli 10, 20, ..., 100
    assert_eq!(scheduler.next_event_cycle(), Some(110));
}

#[test]
fn test_counter_is_64_bit() {
    let mut scheduler = Scheduler::new();
    scheduler.run_until(5_000_000_000);
    assert_eq!(scheduler.current_cycle(), 5_000_000_000);

    let log = trace();
    record(&mut scheduler, 10, &log, "oltre i 32 bit");
    scheduler.run_until(5_000_000_010);
    assert_eq!(*log.borrow(), vec!["oltre i 32 bit"]);
}
