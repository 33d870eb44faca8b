//! Pause signal

use crate::common::*;
use logwriter::engine::{LoopExit, LoopState};
use std::thread;
use std::time::Duration;

#[test]
fn paused_loop_writes_nothing_until_resumed() {
    let h = Harness::new();
    h.pause.pause();
    let handle = h.spawn(test_options());
    assert!(handle.wait_for_state(LoopState::Paused, WAIT));

    h.push(entries(1, 3));
    thread::sleep(Duration::from_millis(50));
    assert!(h.log_store().is_empty());
    assert!(h.outbound.is_empty());
    assert_eq!(handle.state(), LoopState::Paused);

    handle.resume();
    assert_eq!(ids(&h.take_outbound(3)), ids(&entries(1, 3)));
    assert_eq!(handle.state(), LoopState::Running);

    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Shutdown);
}

#[test]
fn pause_takes_effect_between_batches() {
    let h = Harness::new();
    let handle = h.spawn(test_options());
    h.push(entries(1, 2));
    h.take_outbound(2);

    handle.pause();
    assert!(handle.wait_for_state(LoopState::Paused, WAIT));
    h.push(entries(3, 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.log_store().len(), 2);

    handle.resume();
    h.take_outbound(2);
    assert_eq!(h.log_store().len(), 4);

    handle.shutdown();
    handle.join().unwrap();
}

#[test]
fn shutdown_while_paused_exits() {
    let h = Harness::new();
    h.pause.pause();
    let handle = h.spawn(test_options());
    assert!(handle.wait_for_state(LoopState::Paused, WAIT));

    handle.shutdown();
    assert_eq!(handle.join().unwrap(), LoopExit::Shutdown);
    assert!(h.pause.is_paused());
}
