//! Multi-thread scenarios scripted against the real scheduler, lock and
//! priority-donation code paths via [`helpers::serialize`]/[`helpers::boot`]
//! and [`helpers::force_current`].
//!
//! These assertions favor invariants ("the thread that was running is no
//! longer current") over exact identity where a *different* test earlier in
//! the same binary could have left unrelated threads sitting `Ready`
//! forever (there is no `exit()` path these tests can safely exercise under
//! `NoOpArch` to clean them up) — `all_list`/`ready_list` only ever grow
//! over a test binary's lifetime.

#![cfg(feature = "std-shim")]

use super::helpers;
use crate::scheduler;
use crate::sync::Lock;
use crate::thread::Status;

#[test]
fn a_blocked_thread_donates_priority_to_its_locks_holder() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(false);

    let lock = Lock::new();

    let low_id = helpers::spawn("donate-low", 10);
    let high_id = helpers::spawn("donate-high", 30);
    let low = scheduler::find_by_id(low_id).unwrap();
    let high = scheduler::find_by_id(high_id).unwrap();

    helpers::force_current(low);
    lock.acquire();
    assert!(lock.is_held_by_current());

    helpers::force_current(high);
    lock.acquire();
    assert_eq!(unsafe { high.as_ref().status() }, Status::Blocked);
    assert_eq!(
        unsafe { low.as_ref().priority() },
        30,
        "the holder must inherit the blocked waiter's priority"
    );

    helpers::force_current(low);
    lock.release();
    assert_eq!(
        unsafe { low.as_ref().priority() },
        10,
        "releasing the lock must drop the donation-free priority back"
    );
    assert_eq!(unsafe { high.as_ref().status() }, Status::Ready);
}

/// The three-thread donation chain: C waits on a lock held by B, which
/// itself waits on a lock held by A. A donation must cascade through B to
/// A, and unwinds one hop at a time as each lock is released.
#[test]
fn donation_cascades_through_a_chain_of_lock_holders() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(false);

    let l1 = Lock::new();
    let l2 = Lock::new();

    let a_id = helpers::spawn("chain-a", 10);
    let b_id = helpers::spawn("chain-b", 20);
    let c_id = helpers::spawn("chain-c", 30);
    let a = scheduler::find_by_id(a_id).unwrap();
    let b = scheduler::find_by_id(b_id).unwrap();
    let c = scheduler::find_by_id(c_id).unwrap();

    helpers::force_current(a);
    l1.acquire();

    helpers::force_current(b);
    l2.acquire();

    helpers::force_current(b);
    l1.acquire();
    assert_eq!(unsafe { b.as_ref().status() }, Status::Blocked);
    assert_eq!(unsafe { a.as_ref().priority() }, 20, "A inherits B's priority through L1");

    helpers::force_current(c);
    l2.acquire();
    assert_eq!(unsafe { c.as_ref().status() }, Status::Blocked);
    assert_eq!(unsafe { b.as_ref().priority() }, 30, "B inherits C's priority through L2");
    assert_eq!(unsafe { a.as_ref().priority() }, 30, "the donation cascades on to A through B");

    helpers::force_current(a);
    l1.release();
    assert_eq!(unsafe { a.as_ref().priority() }, 10, "A drops back to its base priority");
    assert_eq!(unsafe { b.as_ref().priority() }, 30, "B keeps C's donation and now holds L1");
    assert_eq!(unsafe { b.as_ref().status() }, Status::Ready);

    helpers::force_current(b);
    l2.release();
    assert_eq!(unsafe { b.as_ref().priority() }, 20, "B drops back to its base priority");
    assert_eq!(unsafe { c.as_ref().priority() }, 30, "C's own base priority is unaffected throughout");
    assert_eq!(unsafe { c.as_ref().status() }, Status::Ready);
}

#[test]
fn creating_a_higher_priority_thread_preempts_the_current_one() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(false);

    let low_id = helpers::spawn("preempt-low", 10);
    let low = scheduler::find_by_id(low_id).unwrap();
    helpers::force_current(low);

    helpers::spawn("preempt-high", scheduler::PRI_MAX);

    // `create` must yield to a higher-priority ready thread before
    // returning, so the thread that called it can no longer be current.
    assert_ne!(scheduler::current(), low);
    assert_eq!(unsafe { scheduler::current().as_ref().priority() }, scheduler::PRI_MAX);
}

#[test]
fn time_slice_expiry_preempts_an_equal_priority_ready_thread() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(false);

    let hog_id = helpers::spawn("slice-hog", scheduler::PRI_MAX);
    let hog = scheduler::find_by_id(hog_id).unwrap();
    helpers::spawn("slice-other", scheduler::PRI_MAX);

    helpers::force_current(hog);
    for _ in 0..scheduler::TIME_SLICE {
        scheduler::tick_hook();
    }

    // Exactly one time-slice boundary is crossed over `TIME_SLICE`
    // consecutive ticks regardless of how many ticks had already accrued
    // from earlier tests, so the hog must have been switched away from by
    // now.
    assert_ne!(scheduler::current(), hog);
    assert_eq!(unsafe { hog.as_ref().status() }, Status::Ready);
}

#[test]
fn mlfqs_recomputes_priority_every_four_ticks_from_recent_cpu() {
    let _guard = helpers::serialize();
    helpers::boot();
    scheduler::set_mlfqs_enabled(true);

    let id = helpers::spawn("mlfqs-tick", scheduler::PRI_DEFAULT);
    let tcb = scheduler::find_by_id(id).unwrap();

    // The global tick counter outlives this test, so its phase relative to
    // the every-4-ticks recompute boundary is whatever earlier tests left
    // it at. Tick as this thread until a recompute boundary actually lands
    // (at most 4 calls away), so `recent_cpu` at that instant is known.
    let mut calls = 0u64;
    loop {
        helpers::force_current(tcb);
        scheduler::tick_hook();
        calls += 1;
        if crate::time::ticks_now() % 4 == 0 {
            break;
        }
        assert!(calls <= 4, "a multiple of 4 must land within 4 ticks");
    }

    let recent_cpu = unsafe { tcb.as_ref().recent_cpu() };
    assert_eq!(recent_cpu.to_int_round(), calls as i32);

    let pri_max = crate::fixed_point::Fp::from_int(scheduler::PRI_MAX as i32);
    let expected = pri_max
        .sub(recent_cpu.div_int(4))
        .sub(crate::fixed_point::Fp::from_int(unsafe { tcb.as_ref().nice() } * 2))
        .to_int_trunc()
        .clamp(scheduler::PRI_MIN as i32, scheduler::PRI_MAX as i32) as u8;
    assert_eq!(unsafe { tcb.as_ref().priority() }, expected);

    scheduler::set_mlfqs_enabled(false);
}
