//! Scheduler singleton and public entry points (components D, H and M).
//!
//! There is exactly one scheduler instance, reached through the free
//! functions in this module rather than through a handle, mirroring the
//! teaching kernel's own global `ready_list`/`all_list`/`current_thread`
//! variables. The sole concurrency discipline is disabling interrupts:
//! every operation that touches scheduler state does so inside an
//! [`InterruptGuard`], and nothing here ever blocks on a lock — there would
//! be nobody else to make progress and release it.

use crate::fixed_point::Fp;
use crate::list::List;
use crate::mem::page::PagePool;
use crate::mlfqs;
use crate::priority;
use crate::thread::{AllTag, ReadyTag, Status, Tcb, ThreadFn, ThreadId};
use crate::time;
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use portable_atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// Lowest valid (donation-free) thread priority.
pub const PRI_MIN: u8 = 0;
/// Priority newly created threads start at absent an explicit request.
pub const PRI_DEFAULT: u8 = 31;
/// Highest valid thread priority.
pub const PRI_MAX: u8 = 63;

/// Lowest valid niceness.
pub const NICE_MIN: i32 = -20;
/// Niceness newly created threads start at.
pub const NICE_DEFAULT: i32 = 0;
/// Highest valid niceness.
pub const NICE_MAX: i32 = 20;

/// Ticks given to a thread before it is preempted in round-robin mode (not
/// MLFQS mode, where priority alone decides who runs next).
pub const TIME_SLICE: u32 = 4;

/// A cell whose contents may only be touched while interrupts are
/// disabled. Unlike a spinlock, it never blocks: on a single core with
/// interrupts off, nothing else can be running to contend with it.
pub(crate) struct NoInterruptCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for NoInterruptCell<T> {}

impl<T> NoInterruptCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    ///
    /// The caller must hold interrupts disabled for the duration the
    /// returned pointer is used.
    pub unsafe fn get(&self) -> *mut T {
        self.0.get()
    }
}

/// RAII interrupt mask: disables interrupts on construction, restores the
/// previously observed level on drop. Mirrors `intr_disable`/
/// `intr_set_level(old_level)`.
pub struct InterruptGuard {
    previously_enabled: bool,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.previously_enabled {
            crate::arch::DefaultArch::enable_interrupts();
        }
    }
}

/// Disable interrupts, returning a guard that restores the prior level
/// when dropped.
pub fn interrupts_off() -> InterruptGuard {
    use crate::arch::Arch;
    let previously_enabled = crate::arch::DefaultArch::interrupts_enabled();
    crate::arch::DefaultArch::disable_interrupts();
    InterruptGuard { previously_enabled }
}

struct SchedulerState {
    ready_list: List<Tcb, ReadyTag>,
    all_list: List<Tcb, AllTag>,
    current: Option<NonNull<Tcb>>,
    idle: Option<NonNull<Tcb>>,
    initial: Option<NonNull<Tcb>>,
    thread_ticks: u32,
    load_avg: Fp,
    idle_started: bool,
    idle_ticks: u64,
    kernel_ticks: u64,
    /// The thread being switched away from, and whether it was `Dying`, set
    /// just before the raw switch and consumed by [`run_schedule_tail`]. A
    /// brand new thread's first dispatch lands in [`crate::thread`]'s
    /// trampoline rather than returning from `schedule`'s own call to the
    /// raw switch, so the tail work cannot simply live inline after that
    /// call — it has to be reachable from both places.
    pending_tail: Option<(NonNull<Tcb>, bool)>,
}

unsafe impl Send for SchedulerState {}

impl SchedulerState {
    const fn new() -> Self {
        Self {
            ready_list: List::new(),
            all_list: List::new(),
            current: None,
            idle: None,
            initial: None,
            thread_ticks: 0,
            load_avg: Fp::ZERO,
            idle_started: false,
            idle_ticks: 0,
            kernel_ticks: 0,
            pending_tail: None,
        }
    }
}

static STATE: NoInterruptCell<SchedulerState> = NoInterruptCell::new(SchedulerState::new());
static PAGE_POOL: PagePool = PagePool::new();
static MLFQS_ENABLED: AtomicBool = AtomicBool::new(cfg!(feature = "mlfqs"));
static INITIAL_TCB: Mutex<Option<Tcb>> = Mutex::new(None);

unsafe fn state() -> &'static mut SchedulerState {
    unsafe { &mut *STATE.get() }
}

/// Whether the MLFQS formula cascade is in control of thread priorities
/// (as opposed to plain user-set priorities with donation).
pub fn mlfqs_enabled() -> bool {
    MLFQS_ENABLED.load(Ordering::Relaxed)
}

/// Override whether the MLFQS formula cascade is in control of thread
/// priorities. Mirrors the `-mlfqs` kernel command-line flag: it only has a
/// well-defined effect before [`init`] runs, since switching modes mid-boot
/// would leave already-created threads with priorities computed under the
/// old regime.
pub fn set_mlfqs_enabled(enabled: bool) {
    MLFQS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Adopt the calling context as the system's initial thread. Must be
/// called exactly once, before interrupts are enabled.
pub fn init() {
    let _guard = interrupts_off();
    let tcb = Tcb::adopt_initial(&INITIAL_TCB, "main", PRI_DEFAULT);
    let s = unsafe { state() };
    s.all_list.push_back(tcb);
    s.current = Some(tcb);
    s.initial = Some(tcb);
}

/// Body of the idle thread: signals that it has started, wakes the
/// initial thread that is waiting on that signal, then spends the rest of
/// its life blocking itself and waiting for an interrupt, exactly like any
/// other moment with nothing runnable.
fn idle_entry(_aux: usize) {
    {
        let _guard = interrupts_off();
        let s = unsafe { state() };
        s.idle_started = true;
        if let Some(initial) = s.initial {
            unblock(initial);
        }
    }
    loop {
        {
            let _guard = interrupts_off();
            block_current();
        }
        // `_guard` dropped above re-enabled interrupts; wait for the next
        // one rather than spinning.
        crate::arch::DefaultArch::wait_for_interrupt();
    }
}

/// Create the idle thread and begin preemptive scheduling by enabling
/// interrupts. Blocks the calling (initial) thread until the idle thread
/// has run at least once and recorded its identity — mirroring
/// `thread_start`'s wait on `idle_started`.
pub fn start() {
    create("idle", PRI_MIN, idle_entry, 0).expect("idle thread must be created");
    crate::arch::DefaultArch::enable_interrupts();

    let _guard = interrupts_off();
    if !unsafe { state() }.idle_started {
        block_current();
    }
}

/// Create a new thread and make it runnable. Returns its id, or an error
/// if no page was available.
pub fn create(
    name: &str,
    priority: u8,
    entry: ThreadFn,
    aux: usize,
) -> Result<ThreadId, crate::errors::CreateError> {
    debug_assert!((PRI_MIN..=PRI_MAX).contains(&priority), "priority out of range");
    let tcb = Tcb::create(&PAGE_POOL, name, priority, entry, aux)
        .ok_or(crate::errors::CreateError::OutOfMemory)?;
    let id = unsafe { tcb.as_ref().id() };

    let _guard = interrupts_off();
    let s = unsafe { state() };
    s.all_list.push_back(tcb);
    if s.idle.is_none() && name == "idle" {
        s.idle = Some(tcb);
    }
    unblock_locked(s, tcb);
    drop(_guard);

    maybe_yield_to_higher_priority();

    Ok(id)
}

/// Yield if the running thread is no longer the highest-priority runnable
/// thread, per `thread_max_yield` in the original: called after any
/// operation that may have raised a ready thread's priority above the
/// current one's (`create`, `set_priority`, `set_nice`).
fn maybe_yield_to_higher_priority() {
    let _guard = interrupts_off();
    let s = unsafe { state() };
    let current = s.current.unwrap();
    let should_yield = match s.ready_list.front() {
        Some(front) => unsafe { front.as_ref().priority() > current.as_ref().priority() },
        None => false,
    };
    drop(_guard);
    if should_yield {
        yield_now();
    }
}

fn unblock_locked(s: &mut SchedulerState, t: NonNull<Tcb>) {
    unsafe { (*t.as_ptr()).status = Status::Ready };
    s.ready_list.insert_ordered(t, priority::higher_priority);
}

/// Make a blocked thread runnable again. Must be called with interrupts
/// disabled; `t` must currently be `Blocked`.
pub fn unblock(t: NonNull<Tcb>) {
    debug_assert_eq!(unsafe { t.as_ref().status() }, Status::Blocked);
    unblock_locked(unsafe { state() }, t);
}

/// The currently running thread.
pub fn current() -> NonNull<Tcb> {
    unsafe { state() }.current.expect("scheduler::init must run first")
}

/// Force `current()` to report `t`, without touching its status or list
/// membership.
///
/// Host tests have no real second CPU context to switch into, so a test
/// that wants to script "thread B calls `lock.acquire()` while A holds it"
/// drives the illusion by setting `current` to each TCB in turn around
/// calls into [`crate::sync`]/[`crate::priority`], which only ever consult
/// `current()` rather than an actual call stack. Not part of the public
/// scheduler contract.
#[cfg(any(test, feature = "std-shim"))]
pub fn set_current_for_test(t: NonNull<Tcb>) {
    unsafe { state() }.current = Some(t);
}

/// Direct, interrupts-off access to the ready list, for [`crate::priority`]
/// and [`crate::sync`] to reinsert or re-sort a thread in place.
pub(crate) fn ready_list_mut() -> &'static mut List<Tcb, ReadyTag> {
    let s = unsafe { state() };
    &mut s.ready_list
}

/// Block the current thread and schedule another. The caller must have
/// already disabled interrupts and arranged for the thread to be woken via
/// [`unblock`] (it is not on any list while blocked).
pub fn block_current() {
    let s = unsafe { state() };
    unsafe { (*s.current.unwrap().as_ptr()).status = Status::Blocked };
    schedule();
}

/// Voluntarily give up the CPU. The current thread remains ready and may
/// run again immediately.
pub fn yield_now() {
    let _guard = interrupts_off();
    let s = unsafe { state() };
    let current = s.current.unwrap();
    if Some(current) != s.idle {
        unsafe { (*current.as_ptr()).status = Status::Ready };
        s.ready_list.insert_ordered(current, priority::higher_priority);
    }
    schedule();
}

/// Terminate the current thread. Never returns; its page is reclaimed once
/// the next thread has been switched in.
pub fn exit() -> ! {
    let _guard = interrupts_off();
    let s = unsafe { state() };
    let current = s.current.unwrap();
    s.all_list.remove(current);
    unsafe { (*current.as_ptr()).status = Status::Dying };
    schedule();
    unreachable!("a dying thread is never rescheduled")
}

fn next_thread_to_run(s: &mut SchedulerState) -> NonNull<Tcb> {
    s.ready_list.pop_front().unwrap_or_else(|| s.idle.expect("idle thread must exist once scheduling starts"))
}

/// Pick the next thread to run and switch to it if it differs from the
/// current one. Must be called with interrupts disabled and the current
/// thread's status already updated away from `Running`.
fn schedule() {
    use crate::arch::Arch;

    let s = unsafe { state() };
    let prev = s.current.expect("scheduler::init must run first");
    let next = next_thread_to_run(s);

    if mlfqs_enabled() {
        for t in s.all_list.iter() {
            unsafe { mlfqs::recalculate_priority(&mut *t.as_ptr()) };
        }
        s.ready_list.sort(priority::higher_priority);
    }

    let dying = unsafe { prev.as_ref().status() } == Status::Dying;

    if prev != next {
        s.pending_tail = Some((prev, dying));
        s.current = Some(next);
        let prev_ctx = unsafe { (*prev.as_ptr()).context_ptr() };
        let next_ctx = unsafe { (*next.as_ptr()).context_ptr() };
        unsafe { crate::arch::DefaultArch::context_switch(prev_ctx, next_ctx) };
        // Execution resumes here once this thread is switched back in, via
        // a later schedule() call elsewhere that names it `next`. A thread
        // dispatched for the *first* time never reaches this line at all —
        // it lands directly in the trampoline, which calls
        // `run_schedule_tail` itself instead.
        run_schedule_tail();
    } else {
        unsafe { (*prev.as_ptr()).status = Status::Running };
        s.thread_ticks = 0;
    }
}

/// Finish dispatching whichever thread the scheduler just switched to: mark
/// it `Running`, reset `thread_ticks`, and free a `Dying` predecessor's page
/// (`schedule_tail`, component E). Must run exactly once per switch, on the
/// newly active thread's own execution — either here, right after
/// `schedule`'s raw switch returns, or at the top of [`crate::thread`]'s
/// trampoline for a thread's first dispatch, which bypasses `schedule`
/// entirely on the way in.
pub(crate) fn run_schedule_tail() {
    let s = unsafe { state() };
    if let Some((prev, dying)) = s.pending_tail.take() {
        let cur = s.current.expect("current must be set");
        unsafe { (*cur.as_ptr()).status = Status::Running };
        s.thread_ticks = 0;
        if dying && Some(prev) != s.initial {
            unsafe { Tcb::destroy(prev, &PAGE_POOL) };
        }
    }
}

/// Drive the MLFQS cascade and enforce the round-robin time slice. Called
/// once per timer tick, with interrupts already disabled (interrupt
/// context).
pub fn tick_hook() {
    let ticks = time::tick();
    let s = unsafe { state() };
    let current = s.current.expect("scheduler::init must run first");

    if Some(current) == s.idle {
        s.idle_ticks += 1;
    } else {
        s.kernel_ticks += 1;
    }

    if mlfqs_enabled() {
        mlfqs::tick_recent_cpu(current, s.idle.unwrap_or(current));

        if ticks % time::TICKS_PER_SECOND as u64 == 0 {
            let ready_threads = ready_thread_count(s);
            mlfqs::recompute_load_avg_and_recent_cpu(&mut s.load_avg, ready_threads, &s.all_list);
        }
        if ticks % 4 == 0 {
            mlfqs::recompute_priorities(&s.all_list, &mut s.ready_list);
        }
    }

    s.thread_ticks += 1;
    if s.thread_ticks >= TIME_SLICE {
        let current = s.current.unwrap();
        if Some(current) != s.idle {
            unsafe { (*current.as_ptr()).status = Status::Ready };
            s.ready_list.insert_ordered(current, priority::higher_priority);
        }
        schedule();
    }
}

fn ready_thread_count(s: &SchedulerState) -> i32 {
    let running_counts = match s.current {
        Some(c) if Some(c) != s.idle => 1,
        _ => 0,
    };
    s.ready_list.len() as i32 + running_counts
}

/// The current system-wide `load_avg`, for diagnostics (`thread_get_load_avg`).
pub fn load_avg() -> Fp {
    let _guard = interrupts_off();
    unsafe { state() }.load_avg
}

/// `round_nearest(100 * load_avg)`, matching `thread_get_load_avg`'s
/// reporting convention.
pub fn load_avg_percent() -> i32 {
    debug_assert!(mlfqs_enabled(), "load_avg queried outside mlfqs mode");
    load_avg().mul_int(100).to_int_round()
}

/// `round_nearest(100 * recent_cpu)` of the current thread, matching
/// `thread_get_recent_cpu`.
pub fn recent_cpu_percent() -> i32 {
    debug_assert!(mlfqs_enabled(), "recent_cpu queried outside mlfqs mode");
    let _guard = interrupts_off();
    unsafe { current().as_ref().recent_cpu() }.mul_int(100).to_int_round()
}

/// The current thread's niceness (MLFQS only).
pub fn nice() -> i32 {
    debug_assert!(mlfqs_enabled(), "nice queried outside mlfqs mode");
    let _guard = interrupts_off();
    unsafe { current().as_ref().nice() }
}

/// Set the current thread's niceness, clamped to `[NICE_MIN, NICE_MAX]`,
/// recompute its priority, and yield if it is no longer the highest
/// priority runnable thread.
pub fn set_nice(requested: i32) {
    debug_assert!(mlfqs_enabled(), "nice set outside mlfqs mode");
    let _guard = interrupts_off();
    let nice = mlfqs::clamp_nice(requested);
    let current = current();
    unsafe { (*current.as_ptr()).nice = nice };
    mlfqs::recalculate_priority(unsafe { &mut *current.as_ptr() });
    if unsafe { current.as_ref().status() } == Status::Ready {
        let s = unsafe { state() };
        s.ready_list.remove(current);
        s.ready_list.insert_ordered(current, priority::higher_priority);
    }
    drop(_guard);
    maybe_yield_to_higher_priority();
}

/// The current thread's effective priority.
pub fn priority() -> u8 {
    let _guard = interrupts_off();
    unsafe { current().as_ref().priority() }
}

/// Set the current thread's base priority, recompute its effective
/// priority (`max(base, donated)`), and yield if it is no longer the
/// highest priority runnable thread. Ignored under MLFQS, where `nice`
/// governs priority instead (mirrors `thread_set_priority`'s no-op when
/// `thread_mlfqs` is set).
pub fn set_priority(new_base_priority: u8) {
    debug_assert!((PRI_MIN..=PRI_MAX).contains(&new_base_priority), "priority out of range");
    if mlfqs_enabled() {
        return;
    }
    let _guard = interrupts_off();
    let current = current();
    unsafe { (*current.as_ptr()).base_priority = new_base_priority };
    priority::reset_priority(ready_list_mut(), current);
    drop(_guard);
    maybe_yield_to_higher_priority();
}

/// Invoke `f` on every live thread, in `all_list` order. Must be called
/// with interrupts disabled by the caller if `f` touches scheduler state.
pub fn foreach<F: FnMut(&Tcb)>(mut f: F) {
    let _guard = interrupts_off();
    let s = unsafe { state() };
    for t in s.all_list.iter() {
        f(unsafe { t.as_ref() });
    }
}

/// Find the live thread with the given id, if any, by walking `all_list`.
pub fn find_by_id(id: ThreadId) -> Result<NonNull<Tcb>, crate::errors::LookupError> {
    let _guard = interrupts_off();
    let s = unsafe { state() };
    s.all_list
        .iter()
        .find(|t| unsafe { t.as_ref().id() } == id)
        .ok_or(crate::errors::LookupError::NotFound)
}

/// Log the kernel's tick counters, mirroring `thread_print_stats`. There is
/// no user-process layer in this core, so `user_ticks` is always zero and
/// every non-idle tick is counted as a kernel tick.
pub fn print_stats() {
    let _guard = interrupts_off();
    let s = unsafe { state() };
    log::info!(
        "thread ticks: idle={} kernel={} user=0",
        s.idle_ticks,
        s.kernel_ticks
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_the_documented_ranges() {
        assert!(PRI_MIN < PRI_DEFAULT && PRI_DEFAULT < PRI_MAX);
        assert!(NICE_MIN < NICE_DEFAULT && NICE_DEFAULT < NICE_MAX);
    }
}
