#![allow(clippy::missing_safety_doc)]

//! Naked entry stubs for the scheduler's software interrupt vectors.
//!
//! Mirrors [`crate::interrupts::int80_entry`]'s push/call/pop/iretq shape: all
//! callee-saved-or-not GPRs are pushed in a fixed order, `rsp` (now pointing
//! at the top of that saved frame) is handed to the Rust dispatcher as a
//! [`crate::scheduler::TrapFrame`] pointer, and whatever the dispatcher wrote
//! back into that memory is what gets popped and `iretq`'d into.

use crate::scheduler::{do_exit, do_yield};
use core::arch::naked_asm;

/// Entry stub for [`crate::scheduler::YIELD_VECTOR`] (`int 0x30`).
#[unsafe(naked)]
pub extern "C" fn sched_yield_entry() {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        "mov rdi, rsp",
        "call {rust}",
        "pop rax",
        "pop rbx",
        "pop rcx",
        "pop rdx",
        "pop rsi",
        "pop rdi",
        "pop rbp",
        "pop r8",
        "pop r9",
        "pop r10",
        "pop r11",
        "pop r12",
        "pop r13",
        "pop r14",
        "pop r15",
        "iretq",
        rust = sym sched_yield_dispatch,
    );
}

/// Entry stub for [`crate::scheduler::EXIT_VECTOR`] (`int 0x31`).
#[unsafe(naked)]
pub extern "C" fn sched_exit_entry() {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        "mov rdi, rsp",
        "call {rust}",
        "pop rax",
        "pop rbx",
        "pop rcx",
        "pop rdx",
        "pop rsi",
        "pop rdi",
        "pop rbp",
        "pop r8",
        "pop r9",
        "pop r10",
        "pop r11",
        "pop r12",
        "pop r13",
        "pop r14",
        "pop r15",
        "iretq",
        rust = sym sched_exit_dispatch,
    );
}

extern "C" fn sched_yield_dispatch(frame: *mut crate::scheduler::TrapFrame) {
    unsafe { do_yield(frame) };
}

extern "C" fn sched_exit_dispatch(frame: *mut crate::scheduler::TrapFrame) {
    unsafe { do_exit(frame) };
}
