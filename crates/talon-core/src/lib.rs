//! # talon-core
//!
//! Low-level debugging primitives and process control for Talon.
//!
//! This crate provides the foundational debugging capabilities, including:
//! - Process launch, attachment, and control over ptrace
//! - Register inspection and manipulation
//! - Memory reading/writing
//! - Software and hardware breakpoints and watchpoints
//! - ELF and DWARF v4 parsing with source-level stepping
//!
//! ## Platform Support
//!
//! Linux on x86-64 only. The crate leans on `ptrace`,
//! `process_vm_readv`, `/proc`, and the x86 debug registers, all of
//! which are assumed bit-exactly.
//!
//! ## Why unsafe code is needed
//!
//! This crate requires `unsafe` code because we're calling low-level
//! system APIs that interact directly with the kernel. These APIs can
//! access and modify the memory of other processes, which is exactly
//! what a debugger is for. We wrap these unsafe calls in safe
//! abstractions, but the underlying system calls themselves must be
//! `unsafe`.

#![allow(unsafe_code)]

pub mod disassembler;
pub mod dwarf;
pub mod elf;
pub mod error;
pub mod pipe;
pub mod process;
pub mod registers;
pub mod stoppoints;
pub mod syscalls;
pub mod target;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use elf::{Elf, ElfCollection};
pub use error::{Result, TalonError};
pub use process::{
    LaunchOptions, Process, ProcessState, StopReason, SyscallCatchPolicy, TrapType,
};
pub use registers::{RegisterId, RegisterValue, Registers};
pub use stoppoints::{
    Breakpoint, BreakpointId, BreakpointKind, BreakpointSite, SiteId, Stoppoint,
    StoppointCollection, StoppointMode, Watchpoint, WatchpointId,
};
pub use target::Target;
pub use types::{FileAddr, FileOffset, VirtAddr};
pub use value::{Type, TypedData};
