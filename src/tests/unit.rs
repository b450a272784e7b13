//! Scheduler entry points exercised in isolation.

#![cfg(feature = "std-shim")]

use super::helpers;
use crate::scheduler;
use crate::thread::Status;

#[test]
fn create_assigns_distinct_ids_and_initializes_fields() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(false);

    let a = helpers::spawn("unit-a", 20);
    let b = helpers::spawn("unit-b", 21);
    assert_ne!(a, b);

    let a_tcb = scheduler::find_by_id(a).expect("a must be registered");
    let b_tcb = scheduler::find_by_id(b).expect("b must be registered");
    unsafe {
        assert_eq!(a_tcb.as_ref().name(), "unit-a");
        assert_eq!(a_tcb.as_ref().base_priority(), 20);
        assert_eq!(b_tcb.as_ref().base_priority(), 21);
        // create() always yields into Ready/Running, never leaves a freshly
        // made thread Blocked.
        assert_ne!(a_tcb.as_ref().status(), Status::Blocked);
        assert_ne!(b_tcb.as_ref().status(), Status::Blocked);
    }
}

#[test]
fn find_by_id_reports_not_found_for_an_id_never_created() {
    let _guard = helpers::serialize();
    helpers::boot();

    let phantom = crate::thread::allocate_id();
    assert_eq!(scheduler::find_by_id(phantom), Err(crate::errors::LookupError::NotFound));
}

#[test]
fn foreach_visits_every_live_thread() {
    let _guard = helpers::serialize();
    helpers::boot();

    let id = helpers::spawn_default("unit-foreach");
    let mut seen = false;
    scheduler::foreach(|t| {
        if t.id() == id {
            seen = true;
        }
    });
    assert!(seen, "a just-created thread must show up in an all_list walk");
}

#[test]
fn set_priority_updates_effective_priority_and_is_a_no_op_under_mlfqs() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(false);

    let id = helpers::spawn("unit-set-priority", 10);
    let tcb = scheduler::find_by_id(id).unwrap();
    scheduler::set_current_for_test(tcb);

    scheduler::set_priority(25);
    assert_eq!(unsafe { tcb.as_ref().priority() }, 25);
    assert_eq!(unsafe { tcb.as_ref().base_priority() }, 25);

    scheduler::set_mlfqs_enabled(true);
    scheduler::set_current_for_test(tcb);
    scheduler::set_priority(5);
    assert_eq!(
        unsafe { tcb.as_ref().base_priority() },
        25,
        "set_priority must be ignored once MLFQS governs priority"
    );
    scheduler::set_mlfqs_enabled(false);
}

#[test]
fn set_nice_is_clamped_and_drives_the_mlfqs_priority_formula() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(true);

    let id = helpers::spawn("unit-set-nice", scheduler::PRI_DEFAULT);
    let tcb = scheduler::find_by_id(id).unwrap();
    scheduler::set_current_for_test(tcb);

    scheduler::set_nice(1000);
    assert_eq!(unsafe { tcb.as_ref().nice() }, scheduler::NICE_MAX);
    // recent_cpu = 0, nice = NICE_MAX (20) -> PRI_MAX - 0 - 40, clamped to PRI_MIN.
    assert_eq!(unsafe { tcb.as_ref().priority() }, scheduler::PRI_MIN);

    scheduler::set_current_for_test(tcb);
    scheduler::set_nice(-1000);
    assert_eq!(unsafe { tcb.as_ref().nice() }, scheduler::NICE_MIN);

    scheduler::set_mlfqs_enabled(false);
}

#[test]
fn mlfqs_enabled_setter_overrides_the_compiled_in_default() {
    let _guard = helpers::serialize();

    scheduler::set_mlfqs_enabled(true);
    assert!(scheduler::mlfqs_enabled());
    scheduler::set_mlfqs_enabled(false);
    assert!(!scheduler::mlfqs_enabled());
}

#[test]
fn tick_hook_advances_the_monotonic_tick_counter() {
    let _guard = helpers::serialize();
    helpers::boot();

    let before = crate::time::ticks_now();
    scheduler::tick_hook();
    assert_eq!(crate::time::ticks_now(), before + 1);
}
