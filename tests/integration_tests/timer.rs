//! Timer scenarios from spec.md §8.

use std::time::Instant;

use woodpecker_reactor::Reactor;

#[test]
fn timeout_is_respected_with_no_sources() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    let start = Instant::now();
    reactor.run_once(250).unwrap();
    assert!(
        start.elapsed().as_millis() >= 250,
        "run_once(250) should block for at least 250ms when nothing is ready"
    );
}

#[test]
fn timer_registration_is_observable() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    assert!(!reactor.has_timer(1));

    reactor.add_timer(1, 250, None).unwrap();
    assert!(reactor.has_timer(1));

    reactor.remove_timer(1);
    assert!(!reactor.has_timer(1), "removal is semantically immediate");

    reactor.run_once(0).unwrap();
    assert!(!reactor.has_timer(1));
}

#[test]
fn timer_fires_once_within_window() {
    let mut reactor: Reactor<u32> = Reactor::create().unwrap();
    reactor
        .add_timer(
            1,
            100,
            Some(Box::new(|_r, _id, counter: &mut u32| {
                *counter += 1;
            })),
        )
        .unwrap();

    reactor.run_once(200).unwrap();
    assert_eq!(*reactor.context(), 1);
}

#[test]
fn timer_fires_repeatedly_and_can_self_stop() {
    let mut reactor: Reactor<u32> = Reactor::create().unwrap();
    reactor
        .add_timer(
            1,
            100,
            Some(Box::new(|r, _id, counter: &mut u32| {
                *counter += 1;
                if *counter >= 5 {
                    r.stop();
                }
            })),
        )
        .unwrap();

    reactor.run().unwrap();
    assert_eq!(*reactor.context(), 5);
}

#[test]
fn duplicate_timer_registration_is_rejected() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    reactor.add_timer(7, 1000, None).unwrap();
    assert!(reactor.add_timer(7, 2000, None).is_err());
    assert!(reactor.has_timer(7));
}

#[test]
fn removing_an_absent_timer_is_a_no_op() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    reactor.remove_timer(42);
    reactor.remove_timer(42);
    assert!(!reactor.has_timer(42));
}
