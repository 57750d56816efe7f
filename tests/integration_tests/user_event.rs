//! User event scenarios from spec.md §8: reserved id, membership,
//! coalescing.

use woodpecker_reactor::{Reactor, RESERVED_STOP_ID};

#[test]
fn reserved_stop_id_is_rejected_for_user_registration() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    let err = reactor.add_user_event(RESERVED_STOP_ID, None).unwrap_err();
    assert!(matches!(err, woodpecker_reactor::ReactorError::ReservedId));
}

#[test]
fn user_event_membership_tracks_add_and_remove() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    assert!(!reactor.has_user_event(1));

    reactor.add_user_event(1, None).unwrap();
    assert!(reactor.has_user_event(1));

    reactor.remove_user_event(1);
    assert!(!reactor.has_user_event(1));
}

#[test]
fn duplicate_user_event_registration_is_rejected() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    reactor.add_user_event(3, None).unwrap();
    assert!(reactor.add_user_event(3, None).is_err());
    assert!(reactor.has_user_event(3));
}

#[test]
fn consecutive_triggers_coalesce_into_one_invocation() {
    let mut reactor: Reactor<u32> = Reactor::create().unwrap();
    reactor
        .add_user_event(
            1,
            Some(Box::new(|_r, _id, counter: &mut u32| {
                *counter += 1;
            })),
        )
        .unwrap();

    for _ in 0..10 {
        reactor.trigger_user_event(1);
    }

    reactor.run_once(200).unwrap();
    assert_eq!(
        *reactor.context(),
        1,
        "N consecutive triggers between two dispatches must fire the callback exactly once"
    );
}

#[test]
fn removing_an_absent_user_event_is_a_no_op() {
    let mut reactor: Reactor<()> = Reactor::create().unwrap();
    reactor.remove_user_event(99);
    reactor.remove_user_event(99);
    assert!(!reactor.has_user_event(99));
}
