//! # Cooperative FIFO task scheduler (§4.9)
//!
//! A tiny round-robin scheduler for kernel-mode tasks. Each task gets its own
//! stack and saved register frame; a task gives up the CPU by executing
//! `int 0x30` ([`yield_now`]) or `int 0x31` ([`exit_current`]). Both trap
//! into [`do_yield`]/[`do_exit`] with a pointer to the interrupt frame
//! sitting on the current stack, which is then overwritten in place with the
//! next task's saved frame before `iretq` — since `iretq` in long mode always
//! pops `SS:RSP` as well as `RIP:CS:RFLAGS`, this single instruction both
//! resumes the new task's code *and* switches onto its stack, with no
//! separate stack-switch step required.
//!
//! The queue itself is a fixed-capacity, intrusive, singly-linked FIFO
//! (next-links are indices into [`Tasks`], not pointers), matching the
//! bounded, allocation-free style used elsewhere in this kernel before a
//! general-purpose heap is available this early in boot.

use crate::gdt::{KERNEL_CS, KERNEL_DS};
use crate::interrupts::{GateType, Idt};
use crate::sched_entry::{sched_exit_entry, sched_yield_entry};
use kernel_sync::SpinLock;

/// Software interrupt vector used to voluntarily give up the CPU.
pub const YIELD_VECTOR: usize = 0x30;
/// Software interrupt vector used to terminate the calling task.
pub const EXIT_VECTOR: usize = 0x31;

/// Bytes of stack given to each task.
const STACK_BYTES: usize = 16 * 1024;
/// Maximum number of concurrently alive tasks, including the boot task.
pub const MAX_TASKS: usize = 8;

/// The full interrupt frame saved/restored across a task switch.
///
/// Layout matches the push order used by [`crate::sched_entry`]'s naked entry
/// stubs (ascending from the stack pointer passed to the Rust dispatcher),
/// followed by the hardware-pushed `rip`/`cs`/`rflags`/`rsp`/`ss`.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct TrapFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Caller-visible task metadata, mirroring what a task may inspect about
/// itself.
#[derive(Clone, Copy)]
pub struct TaskControlBlock {
    pub name: &'static str,
    pub runnable: bool,
}

/// Opaque handle identifying a live task slot.
pub type TaskId = usize;

struct TaskSlot {
    used: bool,
    control: TaskControlBlock,
    frame: TrapFrame,
    next: Option<TaskId>,
    stack: [u8; STACK_BYTES],
}

impl TaskSlot {
    const fn empty() -> Self {
        Self {
            used: false,
            control: TaskControlBlock { name: "", runnable: false },
            frame: TrapFrame {
                rax: 0,
                rbx: 0,
                rcx: 0,
                rdx: 0,
                rsi: 0,
                rdi: 0,
                rbp: 0,
                r8: 0,
                r9: 0,
                r10: 0,
                r11: 0,
                r12: 0,
                r13: 0,
                r14: 0,
                r15: 0,
                rip: 0,
                cs: 0,
                rflags: 0,
                rsp: 0,
                ss: 0,
            },
            next: None,
            stack: [0u8; STACK_BYTES],
        }
    }
}

/// The run queue plus the currently-executing task, guarded by one lock.
///
/// A single BSP-resident scheduler: APs brought up via [`crate::smp`] do not
/// yet share this queue.
struct Scheduler {
    slots: [TaskSlot; MAX_TASKS],
    front: Option<TaskId>,
    back: Option<TaskId>,
    current: Option<TaskId>,
}

impl Scheduler {
    const fn new() -> Self {
        const EMPTY: TaskSlot = TaskSlot::empty();
        Self {
            slots: [EMPTY; MAX_TASKS],
            front: None,
            back: None,
            current: None,
        }
    }

    fn alloc_slot(&mut self) -> Option<TaskId> {
        self.slots.iter().position(|s| !s.used)
    }

    fn insert_back(&mut self, id: TaskId) {
        self.slots[id].next = None;
        if let Some(back) = self.back {
            self.slots[back].next = Some(id);
        } else {
            self.front = Some(id);
        }
        self.back = Some(id);
    }

    fn peek(&self) -> Option<TaskId> {
        self.front
    }

    fn get_and_pop(&mut self) -> Option<TaskId> {
        let id = self.front?;
        self.front = self.slots[id].next;
        if self.front.is_none() {
            self.back = None;
        }
        self.slots[id].next = None;
        Some(id)
    }

    /// Re-insert `current` at the back, then dequeue the front: the core FIFO
    /// rotation behind [`yield_now`].
    fn rotate(&mut self, current: TaskId) -> TaskId {
        self.insert_back(current);
        self.get_and_pop().expect("just inserted a task, queue cannot be empty")
    }
}

static SCHEDULER: SpinLock<Scheduler> = SpinLock::new(Scheduler::new());

/// Mark the currently-executing bootstrap control flow as the main task.
///
/// The main task is never placed in the run queue itself (mirroring how
/// other tasks only ever see it via yield/exit rotation); it simply becomes
/// `current` until it yields or exits.
pub fn init_main_task(name: &'static str) -> TaskId {
    SCHEDULER.with_lock(|sched| {
        let id = sched.alloc_slot().expect("scheduler slot exhausted for main task");
        let slot = &mut sched.slots[id];
        slot.used = true;
        slot.control = TaskControlBlock { name, runnable: true };
        slot.frame = TrapFrame::default();
        slot.next = None;
        sched.current = Some(id);
        id
    })
}

/// Create a new kernel task running `entry` and enqueue it to run.
///
/// # Panics
/// Panics if [`MAX_TASKS`] concurrently alive tasks already exist.
pub fn spawn(name: &'static str, entry: extern "C" fn() -> !) -> TaskId {
    SCHEDULER.with_lock(|sched| {
        let id = sched.alloc_slot().expect("scheduler slot exhausted");
        let stack_top = core::ptr::addr_of!(sched.slots[id].stack) as u64 + STACK_BYTES as u64;
        let rsp = stack_top & !0xF; // 16-byte align

        let slot = &mut sched.slots[id];
        slot.used = true;
        slot.control = TaskControlBlock { name, runnable: true };
        slot.frame = TrapFrame {
            rip: entry as u64,
            cs: u64::from(KERNEL_CS),
            rflags: 0x202, // IF set
            rsp,
            ss: u64::from(KERNEL_DS),
            ..TrapFrame::default()
        };
        sched.insert_back(id);
        id
    })
}

/// The `int 0x30` dispatcher: save the interrupted task's registers, rotate
/// the queue, and overwrite `frame` with whichever task runs next.
///
/// If the queue is empty there is nothing else to run; this is a no-op and
/// execution resumes the calling task unchanged.
///
/// # Safety
/// `frame` must point at a live [`TrapFrame`] built by
/// [`crate::sched_entry::sched_yield_entry`]'s prologue.
pub unsafe fn do_yield(frame: *mut TrapFrame) {
    SCHEDULER.with_lock(|sched| {
        if sched.peek().is_none() {
            return;
        }
        let cur = sched.current.expect("do_yield invoked with no current task");
        sched.slots[cur].frame = unsafe { *frame };
        let next = sched.rotate(cur);
        sched.current = Some(next);
        unsafe { *frame = sched.slots[next].frame };
    });
}

/// The `int 0x31` dispatcher: retire the current task and switch to the next
/// one. If no other task is runnable, halts forever — there is nothing left
/// for this CPU to do.
///
/// # Safety
/// Same requirements as [`do_yield`].
pub unsafe fn do_exit(frame: *mut TrapFrame) {
    loop {
        let next = SCHEDULER.with_lock(|sched| {
            let cur = sched.current.take().expect("do_exit invoked with no current task");
            sched.slots[cur].used = false;
            sched.slots[cur].next = None;
            sched.get_and_pop()
        });

        if let Some(next) = next {
            SCHEDULER.with_lock(|sched| {
                sched.current = Some(next);
                unsafe { *frame = sched.slots[next].frame };
            });
            return;
        }

        // Nothing left to run on this CPU.
        unsafe { core::arch::asm!("sti", "hlt", "cli", options(nostack)) };
    }
}

/// Voluntarily give up the CPU to the next runnable task, if any.
#[inline]
pub fn yield_now() {
    unsafe { core::arch::asm!("int {vec}", vec = const YIELD_VECTOR) };
}

/// Terminate the calling task and switch to the next runnable one.
#[inline]
pub fn exit_current() -> ! {
    unsafe {
        core::arch::asm!("int {vec}", vec = const EXIT_VECTOR, options(noreturn));
    }
}

/// Installs the scheduler's two software-interrupt gates (0x30, 0x31).
pub trait SchedulerInterrupt {
    fn init_scheduler_gates(&mut self) -> &mut Self;
}

impl SchedulerInterrupt for Idt {
    fn init_scheduler_gates(&mut self) -> &mut Self {
        self[YIELD_VECTOR]
            .set_handler(sched_yield_entry)
            .selector(KERNEL_CS)
            .dpl(0)
            .present(true)
            .gate_type(GateType::InterruptGate);
        self[EXIT_VECTOR]
            .set_handler(sched_exit_entry)
            .selector(KERNEL_CS)
            .dpl(0)
            .present(true)
            .gate_type(GateType::InterruptGate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_rotation_matches_round_robin_order() {
        let mut sched = Scheduler::new();
        let a = sched.alloc_slot().unwrap();
        sched.slots[a].used = true;
        let b = sched.alloc_slot().unwrap();
        sched.slots[b].used = true;
        sched.insert_back(b);
        let c = sched.alloc_slot().unwrap();
        sched.slots[c].used = true;
        sched.insert_back(c);

        // Task A is "current" (not in queue), running first.
        let mut current = a;
        let mut order = [0usize; 7];
        for slot in &mut order {
            current = sched.rotate(current);
            *slot = current;
        }

        assert_eq!(order, [b, c, a, b, c, a, b]);
    }

    #[test]
    fn get_and_pop_empties_queue_correctly() {
        let mut sched = Scheduler::new();
        let a = sched.alloc_slot().unwrap();
        sched.slots[a].used = true;
        sched.insert_back(a);

        assert_eq!(sched.peek(), Some(a));
        assert_eq!(sched.get_and_pop(), Some(a));
        assert_eq!(sched.peek(), None);
        assert_eq!(sched.get_and_pop(), None);
    }
}
