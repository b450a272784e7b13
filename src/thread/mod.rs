//! Thread control block: per-thread state, stack, list hooks and priority
//! fields (component C).
//!
//! A [`Tcb`] is pinned at the base of a single page obtained from
//! [`crate::mem::page`]; the thread's stack grows down from the top of the
//! same page. The TCB is never moved or reference-counted — every list that
//! references it (`ready_list`, `all_list`, a donee's `donations`) holds a
//! non-owning raw pointer, matching the ownership model in `DESIGN.md`.

use crate::arch::{Arch, DefaultArch};
use crate::fixed_point::Fp;
use crate::list::{Link, Linked};
use crate::mem::page::{PagePool, PAGE_SIZE};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

/// Sentinel written into a TCB's `magic` field; corrupted on stack overflow.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Unique, monotonically assigned thread identifier (`id ≥ 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(core::num::NonZeroU64);

impl ThreadId {
    fn from_raw(id: u64) -> Self {
        Self(core::num::NonZeroU64::new(id).expect("thread ids start at 1"))
    }

    /// The raw identifier value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static ID_LOCK: Mutex<()> = Mutex::new(());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next monotonically increasing thread id.
///
/// Guarded by `id_lock`; per `§5` this is the only lock in the scheduler
/// core and is only ever taken after interrupts have been re-enabled.
pub fn allocate_id() -> ThreadId {
    let _guard = ID_LOCK.lock();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    ThreadId::from_raw(id)
}

/// A thread's scheduling status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Tag types selecting which of a [`Tcb`]'s three embedded links a
/// [`crate::list::List`] operates on.
pub struct ReadyTag;
pub struct AllTag;
pub struct DonationTag;
/// Tag for the intrusive list of threads blocked waiting on a
/// [`crate::sync::Lock`].
pub struct WaiterTag;

/// Function executed by a newly created thread; `aux` is an opaque,
/// caller-supplied payload (matching `thread_create`'s `void *aux`).
pub type ThreadFn = fn(aux: usize);

const NAME_CAP: usize = 16;

/// Thread control block. One per thread, living at the base of its page.
#[repr(C)]
pub struct Tcb {
    magic: u32,
    id: ThreadId,
    name: [u8; NAME_CAP],
    name_len: u8,
    pub(crate) status: Status,

    /// The priority this thread "deserves" absent donation.
    pub(crate) base_priority: u8,
    /// The priority the scheduler actually compares on.
    pub(crate) priority: u8,

    /// MLFQS-only: niceness in `[NICE_MIN, NICE_MAX]`.
    pub(crate) nice: i32,
    /// MLFQS-only: 17.14 fixed-point recent CPU usage.
    pub(crate) recent_cpu: Fp,

    pub(crate) ready_hook: Link<Tcb, ReadyTag>,
    pub(crate) all_hook: Link<Tcb, AllTag>,
    pub(crate) donation_hook: Link<Tcb, DonationTag>,
    pub(crate) waiter_hook: Link<Tcb, WaiterTag>,
    pub(crate) donations: crate::list::List<Tcb, DonationTag>,

    /// The thread whose `donations` list currently holds this thread's
    /// `donation_hook`, if any. Tracked explicitly (rather than relying on a
    /// sentinel-based list that can self-remove) so [`crate::priority`] can
    /// detach a stale donation without being told which holder it was made
    /// to.
    pub(crate) donated_into: Option<NonNull<Tcb>>,

    /// The lock this thread is blocked trying to acquire, if any. Opaque to
    /// this module: only its holder matters to the priority model.
    pub(crate) required_lock: Option<NonNull<crate::sync::LockState>>,

    page: NonNull<u8>,
    stack_top: *mut u8,
    entry: Option<(ThreadFn, usize)>,
    context: Mutex<<DefaultArch as Arch>::SavedContext>,
}

unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

unsafe impl Linked<ReadyTag> for Tcb {
    fn link(this: NonNull<Self>) -> NonNull<Link<Self, ReadyTag>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*this.as_ptr()).ready_hook)) }
    }
}

unsafe impl Linked<AllTag> for Tcb {
    fn link(this: NonNull<Self>) -> NonNull<Link<Self, AllTag>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*this.as_ptr()).all_hook)) }
    }
}

unsafe impl Linked<DonationTag> for Tcb {
    fn link(this: NonNull<Self>) -> NonNull<Link<Self, DonationTag>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*this.as_ptr()).donation_hook)) }
    }
}

unsafe impl Linked<WaiterTag> for Tcb {
    fn link(this: NonNull<Self>) -> NonNull<Link<Self, WaiterTag>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*this.as_ptr()).waiter_hook)) }
    }
}

impl Tcb {
    /// Allocate a fresh page and construct a TCB in place at its base, in
    /// the `Blocked` status (callers `unblock` it once fully initialized,
    /// per `thread_create`'s contract).
    pub fn create(
        pool: &PagePool,
        name: &str,
        priority: u8,
        entry: ThreadFn,
        aux: usize,
    ) -> Option<NonNull<Tcb>> {
        let page = pool.allocate()?;
        let tcb_ptr = page.as_ptr() as *mut Tcb;

        let mut name_buf = [0u8; NAME_CAP];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_CAP);
        name_buf[..len].copy_from_slice(&bytes[..len]);

        let stack_top = {
            let end = (page.as_ptr() as usize) + PAGE_SIZE;
            (end & !0xF) as *mut u8
        };

        let id = allocate_id();

        unsafe {
            core::ptr::write(
                tcb_ptr,
                Tcb {
                    magic: THREAD_MAGIC,
                    id,
                    name: name_buf,
                    name_len: len as u8,
                    status: Status::Blocked,
                    base_priority: priority,
                    priority,
                    nice: crate::scheduler::NICE_DEFAULT,
                    recent_cpu: Fp::ZERO,
                    ready_hook: Link::new(),
                    all_hook: Link::new(),
                    donation_hook: Link::new(),
                    waiter_hook: Link::new(),
                    donations: crate::list::List::new(),
                    donated_into: None,
                    required_lock: None,
                    page,
                    stack_top,
                    entry: Some((entry, aux)),
                    context: Mutex::new(Default::default()),
                },
            );
        }

        let tcb = unsafe { NonNull::new_unchecked(tcb_ptr) };
        unsafe { (*tcb_ptr).setup_initial_context() };
        Some(tcb)
    }

    /// Adopt the currently executing stack as a TCB with no owned page
    /// (used once, for the boot thread). The returned TCB is never freed.
    pub fn adopt_initial(storage: &'static Mutex<Option<Tcb>>, name: &str, priority: u8) -> NonNull<Tcb> {
        let mut name_buf = [0u8; NAME_CAP];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_CAP);
        name_buf[..len].copy_from_slice(&bytes[..len]);

        let id = allocate_id();
        let mut guard = storage.lock();
        *guard = Some(Tcb {
            magic: THREAD_MAGIC,
            id,
            name: name_buf,
            name_len: len as u8,
            status: Status::Running,
            base_priority: priority,
            priority,
            nice: crate::scheduler::NICE_DEFAULT,
            recent_cpu: Fp::ZERO,
            ready_hook: Link::new(),
            all_hook: Link::new(),
            donation_hook: Link::new(),
            waiter_hook: Link::new(),
            donations: crate::list::List::new(),
            donated_into: None,
            required_lock: None,
            page: NonNull::dangling(),
            stack_top: core::ptr::null_mut(),
            entry: None,
            context: Mutex::new(Default::default()),
        });
        unsafe { NonNull::new_unchecked(guard.as_mut().unwrap() as *mut Tcb) }
    }

    fn setup_initial_context(&mut self) {
        let (entry, aux) = self.entry.expect("only newly created threads are set up");
        let mut ctx = self.context.lock();
        *ctx = DefaultArch::init_context(trampoline as usize, self.stack_top as usize, entry as usize, aux);
    }

    /// Unique thread identifier.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The thread's name, as a UTF-8 `&str` (best-effort: names are stored
    /// as raw bytes and are not guaranteed valid UTF-8 if truncated
    /// mid-codepoint).
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn base_priority(&self) -> u8 {
        self.base_priority
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn nice(&self) -> i32 {
        self.nice
    }

    pub fn recent_cpu(&self) -> Fp {
        self.recent_cpu
    }

    /// Check the stack-overflow canary. A corrupted `magic` means the
    /// thread's stack grew down into its own TCB header.
    pub fn check_magic(&self) -> bool {
        self.magic == THREAD_MAGIC
    }

    pub(crate) fn context_ptr(&self) -> *mut <DefaultArch as Arch>::SavedContext {
        let guard = self.context.lock();
        &*guard as *const _ as *mut _
    }

    /// Return this thread's page to `pool`. Must only be called once the
    /// thread is `Dying` and is not the initial thread.
    pub(crate) unsafe fn destroy(tcb: NonNull<Tcb>, pool: &PagePool) {
        let page = unsafe { (*tcb.as_ptr()).page };
        unsafe { pool.free(page) };
    }
}

/// Trampoline a newly scheduled thread's initial context lands on. Unlike
/// every later dispatch of this same thread, its first ever run never
/// returns from `schedule`'s raw switch call, so it must run
/// `schedule_tail`'s duties itself before anything else — matching
/// component E's "switch-entry frame", whose whole job in the original is
/// exactly this: run schedule_tail, then fall into the kernel-thread
/// function with its argument.
extern "C" fn trampoline(entry: usize, aux: usize) -> ! {
    crate::scheduler::run_schedule_tail();
    DefaultArch::enable_interrupts();
    let entry: ThreadFn = unsafe { core::mem::transmute(entry) };
    entry(aux);
    crate::scheduler::exit();
}

/// Bare `Tcb` construction for tests that only exercise pure formulas
/// (mlfqs, priority) and never link the thread into any list or run it.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    pub fn bare_tcb(priority: u8, nice: i32, recent_cpu: Fp) -> Tcb {
        Tcb {
            magic: THREAD_MAGIC,
            id: allocate_id(),
            name: [0u8; NAME_CAP],
            name_len: 0,
            status: Status::Blocked,
            base_priority: priority,
            priority,
            nice,
            recent_cpu,
            ready_hook: Link::new(),
            all_hook: Link::new(),
            donation_hook: Link::new(),
            waiter_hook: Link::new(),
            donations: crate::list::List::new(),
            donated_into: None,
            required_lock: None,
            page: NonNull::dangling(),
            stack_top: core::ptr::null_mut(),
            entry: None,
            context: Mutex::new(Default::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_nonzero() {
        let a = allocate_id();
        let b = allocate_id();
        assert!(a.get() >= 1);
        assert!(b.get() > a.get());
    }

    #[cfg(feature = "std-shim")]
    #[test]
    fn create_initializes_fields() {
        let pool = PagePool::new();
        fn noop(_: usize) {}
        let tcb = Tcb::create(&pool, "worker", 31, noop, 0).unwrap();
        let tcb = unsafe { tcb.as_ref() };
        assert_eq!(tcb.name(), "worker");
        assert_eq!(tcb.base_priority(), 31);
        assert_eq!(tcb.priority(), 31);
        assert_eq!(tcb.status(), Status::Blocked);
        assert!(tcb.check_magic());
    }
}
