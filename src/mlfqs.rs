//! The multi-level feedback queue scheduler's fixed-point formula cascade
//! (component G).
//!
//! Three recomputations run at different cadences, driven by
//! [`crate::scheduler::tick_hook`]:
//!
//! - every tick: the running thread's `recent_cpu` gains `1.0`
//! - every 4 ticks: every thread's priority is recomputed from its
//!   `recent_cpu`/`nice`, and the ready list is re-sorted
//! - every [`crate::time::TICKS_PER_SECOND`] ticks: `load_avg` is
//!   recomputed from the ready-thread count, then every thread's
//!   `recent_cpu` is recomputed from the new `load_avg`
//!
//! The formulas themselves (`thread_calculate_bsd_priority`,
//! `thread_calculate_load_avg`, `thread_calculate_recent_cpu`) are a direct
//! 17.14 fixed-point translation of the teaching kernel's BSD scheduler;
//! only the recompute cadence has been changed, from "recompute everything
//! inside `schedule()`" to the tick-driven schedule above (a deliberate
//! simplification so that priority recomputation doesn't have to happen on
//! the hot `schedule()` path).

use crate::fixed_point::Fp;
use crate::list::List;
use crate::priority;
use crate::scheduler::{NICE_MAX, NICE_MIN, PRI_MAX, PRI_MIN};
use crate::thread::{AllTag, ReadyTag, Tcb};
use core::ptr::NonNull;

/// Recompute `t`'s priority from its `recent_cpu`/`nice`:
/// `priority = PRI_MAX - recent_cpu / 4 - 2 * nice`, clamped to
/// `[PRI_MIN, PRI_MAX]`.
pub fn recalculate_priority(t: &mut Tcb) {
    let pri_max = Fp::from_int(PRI_MAX as i32);
    let cpu_term = t.recent_cpu().div_int(4);
    let nice_term = Fp::from_int(t.nice() * 2);
    let computed = pri_max.sub(cpu_term).sub(nice_term).to_int_trunc();
    t.priority = computed.clamp(PRI_MIN as i32, PRI_MAX as i32) as u8;
}

/// `load_avg = (59/60) * load_avg + (1/60) * ready_threads`, where
/// `ready_threads` counts the running thread as ready unless it is idle.
pub fn recalculate_load_avg(load_avg: Fp, ready_threads: i32) -> Fp {
    let fifty_nine_sixtieths = Fp::from_int(59).div_int(60);
    let one_sixtieth = Fp::from_int(1).div_int(60);
    fifty_nine_sixtieths.mul(load_avg).add(one_sixtieth.mul_int(ready_threads))
}

/// `recent_cpu = (2*load_avg) / (2*load_avg + 1) * recent_cpu + nice`.
pub fn recalculate_recent_cpu(t: &mut Tcb, load_avg: Fp) {
    let twice_load_avg = load_avg.mul_int(2);
    let coefficient = twice_load_avg.div(twice_load_avg.add_int(1));
    t.recent_cpu = coefficient.mul(t.recent_cpu()).add_int(t.nice());
}

/// Advance the running thread's `recent_cpu` by one tick (`recent_cpu += 1`),
/// skipped for the idle thread.
pub fn tick_recent_cpu(running: NonNull<Tcb>, idle: NonNull<Tcb>) {
    if running == idle {
        return;
    }
    unsafe { (*running.as_ptr()).recent_cpu = (*running.as_ptr()).recent_cpu.add_int(1) };
}

/// Every-4-ticks step: recompute every thread's priority and re-sort the
/// ready list.
pub fn recompute_priorities(all_list: &List<Tcb, AllTag>, ready_list: &mut List<Tcb, ReadyTag>) {
    for t in all_list.iter() {
        unsafe { recalculate_priority(&mut *t.as_ptr()) };
    }
    ready_list.sort(priority::higher_priority);
}

/// Every-second step: recompute `load_avg`, then every thread's
/// `recent_cpu` from the new value.
pub fn recompute_load_avg_and_recent_cpu(
    load_avg: &mut Fp,
    ready_threads: i32,
    all_list: &List<Tcb, AllTag>,
) {
    *load_avg = recalculate_load_avg(*load_avg, ready_threads);
    for t in all_list.iter() {
        unsafe { recalculate_recent_cpu(&mut *t.as_ptr(), *load_avg) };
    }
}

/// Clamp a requested niceness into `[NICE_MIN, NICE_MAX]`.
pub fn clamp_nice(nice: i32) -> i32 {
    nice.clamp(NICE_MIN, NICE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_formula_matches_known_values() {
        // recent_cpu = 0, nice = 0 -> priority = PRI_MAX
        let mut t_state = (Fp::ZERO, 0i32);
        let pri_max = Fp::from_int(PRI_MAX as i32);
        let cpu_term = t_state.0.div_int(4);
        let nice_term = Fp::from_int(t_state.1 * 2);
        let computed = pri_max.sub(cpu_term).sub(nice_term).to_int_trunc();
        assert_eq!(computed, PRI_MAX as i32);

        // recent_cpu = 4.0 (4*F), nice = 0 -> priority = PRI_MAX - 1
        t_state.0 = Fp::from_int(4);
        let cpu_term = t_state.0.div_int(4);
        let computed = pri_max.sub(cpu_term).sub(nice_term).to_int_trunc();
        assert_eq!(computed, PRI_MAX as i32 - 1);
    }

    #[test]
    fn load_avg_converges_toward_steady_ready_count() {
        let mut load_avg = Fp::ZERO;
        for _ in 0..2000 {
            load_avg = recalculate_load_avg(load_avg, 1);
        }
        // steady state: load_avg = (59/60) load_avg + 1/60  =>  load_avg = 1
        assert_eq!(load_avg.to_int_round(), 1);
    }

    #[test]
    fn recent_cpu_decays_toward_zero_with_no_load() {
        let mut t = crate::thread::tests_support::bare_tcb(31, 0, Fp::from_int(100));
        for _ in 0..10_000 {
            recalculate_recent_cpu(&mut t, Fp::ZERO);
        }
        assert!(t.recent_cpu().to_int_round().abs() <= 1);
    }

    #[test]
    fn nice_is_clamped() {
        assert_eq!(clamp_nice(100), NICE_MAX);
        assert_eq!(clamp_nice(-100), NICE_MIN);
        assert_eq!(clamp_nice(5), 5);
    }
}
