//! # Process Control
//!
//! ptrace-driven lifecycle of the tracee: launch and attach, stop and
//! resume, register and memory I/O, single-stepping, hardware debug
//! registers, and the auxiliary vector.
//!
//! The debugger is single-threaded and cooperates with the tracee
//! through a blocking [`Process::wait_on_signal`]; every ptrace call
//! assumes the tracee is stopped. Register state is cached per stop and
//! written through immediately on modification, so nothing needs
//! flushing at resume time.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, fork, setpgid, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::{Result, TalonError};
use crate::pipe::Pipe;
use crate::registers::{
    read_user_area, register_info_by_id, write_register, RegisterId, RegisterValue, Registers,
};
use crate::stoppoints::site::{peek_data, poke_data};
use crate::stoppoints::{
    BreakpointId, BreakpointSite, SiteId, Stoppoint, StoppointCollection, StoppointMode,
    Watchpoint, WatchpointId,
};
use crate::types::{from_bytes, VirtAddr};

/// Execution state of the tracee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState
{
    Stopped,
    Running,
    Exited,
    Terminated,
}

/// Refined cause of a SIGTRAP stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapType
{
    SingleStep,
    SoftwareBreakpoint,
    HardwareBreakpoint,
    Syscall,
}

/// Which end of a syscall a stop captured, and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallData
{
    /// Entry: the six argument registers.
    Args([u64; 6]),
    /// Exit: the return value.
    Ret(i64),
}

/// Syscall information attached to a syscall-trap stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallInfo
{
    pub id: u64,
    pub entry: bool,
    pub data: SyscallData,
}

/// Which syscalls stop the tracee when syscall tracing is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallCatchPolicy
{
    /// Do not trace syscalls at all.
    None,
    /// Stop on the listed syscall numbers only.
    Some(Vec<u64>),
    /// Stop on every syscall.
    All,
}

/// Why the tracee stopped, as decoded from `waitpid` and refined through
/// `siginfo`, breakpoint sites, and the debug registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReason
{
    pub(crate) state: ProcessState,
    pub(crate) exit_status: Option<i32>,
    pub(crate) signal: Option<Signal>,
    pub(crate) trap: Option<TrapType>,
    pub(crate) syscall: Option<SyscallInfo>,
}

impl StopReason
{
    pub(crate) fn synthetic_single_step() -> Self
    {
        StopReason {
            state: ProcessState::Stopped,
            exit_status: None,
            signal: Some(Signal::SIGTRAP),
            trap: Some(TrapType::SingleStep),
            syscall: None,
        }
    }

    pub fn state(&self) -> ProcessState
    {
        self.state
    }

    /// Exit code when the tracee exited.
    pub fn exit_status(&self) -> Option<i32>
    {
        self.exit_status
    }

    /// Stopping or terminating signal, when there is one.
    pub fn signal(&self) -> Option<Signal>
    {
        self.signal
    }

    pub fn trap_type(&self) -> Option<TrapType>
    {
        self.trap
    }

    pub fn syscall_info(&self) -> Option<&SyscallInfo>
    {
        self.syscall.as_ref()
    }

    /// A single-step stop (real or simulated).
    pub fn is_step(&self) -> bool
    {
        self.state == ProcessState::Stopped
            && self.signal == Some(Signal::SIGTRAP)
            && self.trap == Some(TrapType::SingleStep)
    }

    /// A software or hardware breakpoint stop.
    pub fn is_breakpoint(&self) -> bool
    {
        self.state == ProcessState::Stopped
            && self.signal == Some(Signal::SIGTRAP)
            && matches!(
                self.trap,
                Some(TrapType::SoftwareBreakpoint | TrapType::HardwareBreakpoint)
            )
    }
}

/// The hardware stop-point a debug-register trap resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareStoppoint
{
    Breakpoint(SiteId),
    Watchpoint(WatchpointId),
}

/// Options for [`Process::launch`].
#[derive(Debug, Clone)]
pub struct LaunchOptions
{
    /// Trace the child (`PTRACE_TRACEME`). Off spawns an ordinary child.
    pub debug: bool,
    /// File descriptor to replace the child's stdout with.
    pub stdout_replacement: Option<i32>,
    /// Disable address space randomization in the child.
    pub disable_aslr: bool,
}

impl Default for LaunchOptions
{
    fn default() -> Self
    {
        LaunchOptions {
            debug: true,
            stdout_replacement: None,
            disable_aslr: true,
        }
    }
}

/// A tracee and the debugger-side state that shadows it.
pub struct Process
{
    pid: Pid,
    state: ProcessState,
    is_attached: bool,
    terminate_on_end: bool,
    registers: Registers,
    breakpoint_sites: StoppointCollection<BreakpointSite>,
    watchpoints: StoppointCollection<Watchpoint>,
    syscall_policy: SyscallCatchPolicy,
    expecting_syscall_exit: bool,
    next_site_id: i32,
    next_watchpoint_id: i32,
    auxv: once_cell::unsync::OnceCell<HashMap<u64, u64>>,
}

impl Process
{
    fn new(pid: Pid, terminate_on_end: bool, is_attached: bool) -> Self
    {
        Process {
            pid,
            state: ProcessState::Stopped,
            is_attached,
            terminate_on_end,
            registers: Registers::zeroed(),
            breakpoint_sites: StoppointCollection::new(),
            watchpoints: StoppointCollection::new(),
            syscall_policy: SyscallCatchPolicy::None,
            expecting_syscall_exit: false,
            next_site_id: 1,
            next_watchpoint_id: 1,
            auxv: once_cell::unsync::OnceCell::new(),
        }
    }

    /// Fork and exec `path` under tracing.
    ///
    /// The child reports any pre-exec failure (personality, setpgid,
    /// dup2, traceme, exec) through a close-on-exec pipe; a zero-length
    /// read therefore means the exec succeeded. On success the tracee is
    /// left in its initial SIGTRAP stop.
    pub fn launch(path: impl AsRef<Path>, options: LaunchOptions) -> Result<Self>
    {
        let path = path.as_ref();
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| TalonError::InvalidArgument("path contains a NUL byte".into()))?;

        let mut channel = Pipe::cloexec()?;

        match unsafe { fork() } {
            Err(e) => Err(TalonError::os("fork failed", e)),
            Ok(ForkResult::Child) => {
                channel.close_read();
                Self::launch_child(channel, c_path, &options);
            }
            Ok(ForkResult::Parent { child }) => {
                channel.close_write();
                let data = channel.read()?;
                if !data.is_empty() {
                    let _ = waitpid(child, None);
                    return Err(TalonError::Launch {
                        path: path.to_path_buf(),
                        message: String::from_utf8_lossy(&data).into_owned(),
                    });
                }

                debug!(pid = child.as_raw(), path = %path.display(), "launched tracee");
                let mut process = Self::new(child, true, options.debug);
                if options.debug {
                    process.wait_on_signal()?;
                    set_ptrace_options(child)?;
                } else {
                    process.state = ProcessState::Running;
                }
                Ok(process)
            }
        }
    }

    /// Child-side half of [`Process::launch`]; never returns.
    fn launch_child(mut channel: Pipe, c_path: CString, options: &LaunchOptions) -> !
    {
        if options.disable_aslr {
            match personality::get() {
                Ok(persona) => {
                    if personality::set(persona | Persona::ADDR_NO_RANDOMIZE).is_err() {
                        exit_with_error(&mut channel, "could not disable ASLR");
                    }
                }
                Err(_) => exit_with_error(&mut channel, "could not read personality"),
            }
        }

        if setpgid(Pid::from_raw(0), Pid::from_raw(0)).is_err() {
            exit_with_error(&mut channel, "could not set pgid");
        }

        if let Some(fd) = options.stdout_replacement {
            if unsafe { libc::dup2(fd, libc::STDOUT_FILENO) } < 0 {
                exit_with_error(&mut channel, "stdout replacement failed");
            }
        }

        if options.debug && ptrace::traceme().is_err() {
            exit_with_error(&mut channel, "tracing failed");
        }

        let args = [c_path.clone()];
        let _ = execvp(&c_path, &args);
        exit_with_error(&mut channel, "exec failed");
    }

    /// Attach to a running process and wait for it to stop.
    pub fn attach(pid: i32) -> Result<Self>
    {
        if pid <= 0 {
            return Err(TalonError::InvalidArgument("invalid PID".into()));
        }
        let pid = Pid::from_raw(pid);
        ptrace::attach(pid).map_err(|e| TalonError::os("could not attach", e))?;

        let mut process = Self::new(pid, false, true);
        process.wait_on_signal()?;
        set_ptrace_options(pid)?;
        debug!(pid = pid.as_raw(), "attached to tracee");
        Ok(process)
    }

    pub fn pid(&self) -> Pid
    {
        self.pid
    }

    pub fn state(&self) -> ProcessState
    {
        self.state
    }

    pub fn is_attached(&self) -> bool
    {
        self.is_attached
    }

    /// The register cache populated at the most recent stop.
    pub fn registers(&self) -> &Registers
    {
        &self.registers
    }

    pub fn syscall_policy(&self) -> &SyscallCatchPolicy
    {
        &self.syscall_policy
    }

    pub fn set_syscall_policy(&mut self, policy: SyscallCatchPolicy)
    {
        self.syscall_policy = policy;
    }

    pub fn breakpoint_sites(&self) -> &StoppointCollection<BreakpointSite>
    {
        &self.breakpoint_sites
    }

    pub fn watchpoints(&self) -> &StoppointCollection<Watchpoint>
    {
        &self.watchpoints
    }

    fn ensure_stopped(&self, operation: &str) -> Result<()>
    {
        if self.state != ProcessState::Stopped {
            return Err(TalonError::ProcessState(format!(
                "cannot {operation}: process is not stopped"
            )));
        }
        Ok(())
    }

    /// Resume the tracee.
    ///
    /// Steps over an enabled software breakpoint at the current PC first
    /// (disable, single-step, re-enable, all while stopped), then
    /// continues — with `PTRACE_SYSCALL` when a syscall-catch policy is
    /// active.
    pub fn resume(&mut self) -> Result<()>
    {
        self.ensure_stopped("resume")?;
        let pc = self.get_pc()?;
        if self.breakpoint_sites.enabled_stoppoint_at_address(pc) {
            let pid = self.pid;
            let site = self.breakpoint_sites.get_by_address_mut(pc)?;
            site.disable(&mut self.registers)?;
            ptrace::step(pid, None).map_err(|e| TalonError::os("could not single step", e))?;
            waitpid(pid, None).map_err(|e| TalonError::os("waitpid failed", e))?;
            site.enable(&mut self.registers)?;
        }

        let result = match self.syscall_policy {
            SyscallCatchPolicy::None => ptrace::cont(self.pid, None),
            _ => ptrace::syscall(self.pid, None),
        };
        result.map_err(|e| TalonError::os("could not resume", e))?;
        self.state = ProcessState::Running;
        Ok(())
    }

    /// Execute exactly one instruction.
    ///
    /// An enabled software breakpoint at the current PC is lifted for the
    /// duration of the step. This is the unit step that all source-level
    /// stepping builds on.
    pub fn step_instruction(&mut self) -> Result<StopReason>
    {
        self.ensure_stopped("step")?;
        let pc = self.get_pc()?;
        let stepping_over_breakpoint = self.breakpoint_sites.enabled_stoppoint_at_address(pc);
        if stepping_over_breakpoint {
            let site = self.breakpoint_sites.get_by_address_mut(pc)?;
            site.disable(&mut self.registers)?;
        }

        ptrace::step(self.pid, None).map_err(|e| TalonError::os("could not single step", e))?;
        let reason = self.wait_on_signal()?;

        if stepping_over_breakpoint {
            let site = self.breakpoint_sites.get_by_address_mut(pc)?;
            site.enable(&mut self.registers)?;
        }
        Ok(reason)
    }

    /// Block until the tracee changes state and decode why.
    ///
    /// On a stop this refreshes the register cache, classifies the trap
    /// through `siginfo`, rewinds the PC over a software breakpoint's
    /// trap byte, refreshes watchpoint data, and applies the
    /// syscall-catch policy (transparently resuming past uncaught
    /// syscalls).
    pub fn wait_on_signal(&mut self) -> Result<StopReason>
    {
        let status = waitpid(self.pid, None).map_err(|e| TalonError::os("waitpid failed", e))?;
        let reason = match status {
            WaitStatus::Exited(_, code) => {
                self.state = ProcessState::Exited;
                StopReason {
                    state: ProcessState::Exited,
                    exit_status: Some(code),
                    signal: None,
                    trap: None,
                    syscall: None,
                }
            }
            WaitStatus::Signaled(_, signal, _) => {
                self.state = ProcessState::Terminated;
                StopReason {
                    state: ProcessState::Terminated,
                    exit_status: None,
                    signal: Some(signal),
                    trap: None,
                    syscall: None,
                }
            }
            WaitStatus::Stopped(_, signal) => {
                self.state = ProcessState::Stopped;
                let mut reason = StopReason {
                    state: ProcessState::Stopped,
                    exit_status: None,
                    signal: Some(signal),
                    trap: None,
                    syscall: None,
                };
                if self.is_attached {
                    self.read_all_registers()?;
                    self.augment_stop_reason(&mut reason)?;

                    if reason.signal == Some(Signal::SIGTRAP) {
                        let instruction_begin = self.get_pc()? - 1;
                        if reason.trap == Some(TrapType::SoftwareBreakpoint)
                            && self
                                .breakpoint_sites
                                .enabled_stoppoint_at_address(instruction_begin)
                        {
                            self.set_pc(instruction_begin)?;
                        }
                        if reason.trap == Some(TrapType::HardwareBreakpoint) {
                            self.refresh_triggered_watchpoint()?;
                        }
                    }
                }
                reason
            }
            WaitStatus::PtraceSyscall(_) => {
                self.state = ProcessState::Stopped;
                let mut reason = StopReason {
                    state: ProcessState::Stopped,
                    exit_status: None,
                    signal: Some(Signal::SIGTRAP),
                    trap: Some(TrapType::Syscall),
                    syscall: None,
                };
                if self.is_attached {
                    self.read_all_registers()?;
                    self.augment_stop_reason(&mut reason)?;
                    return self.maybe_resume_from_syscall(reason);
                }
                reason
            }
            other => {
                return Err(TalonError::ProcessState(format!(
                    "unexpected wait status {other:?}"
                )))
            }
        };
        Ok(reason)
    }

    /// Refine a SIGTRAP stop by consulting `siginfo` and, for syscall
    /// stops, the syscall argument and return registers.
    fn augment_stop_reason(&mut self, reason: &mut StopReason) -> Result<()>
    {
        let info = ptrace::getsiginfo(self.pid)
            .map_err(|e| TalonError::os("could not get signal info", e))?;

        if reason.trap == Some(TrapType::Syscall) {
            let id = self.registers.read_by_id_as_u64(RegisterId::OrigRax)?;
            let syscall = if self.expecting_syscall_exit {
                self.expecting_syscall_exit = false;
                SyscallInfo {
                    id,
                    entry: false,
                    data: SyscallData::Ret(
                        self.registers.read_by_id_as_u64(RegisterId::Rax)? as i64
                    ),
                }
            } else {
                self.expecting_syscall_exit = true;
                let arg_registers = [
                    RegisterId::Rdi,
                    RegisterId::Rsi,
                    RegisterId::Rdx,
                    RegisterId::R10,
                    RegisterId::R8,
                    RegisterId::R9,
                ];
                let mut args = [0u64; 6];
                for (slot, id) in args.iter_mut().zip(arg_registers) {
                    *slot = self.registers.read_by_id_as_u64(id)?;
                }
                SyscallInfo {
                    id,
                    entry: true,
                    data: SyscallData::Args(args),
                }
            };
            reason.syscall = Some(syscall);
            return Ok(());
        }

        self.expecting_syscall_exit = false;
        if reason.signal == Some(Signal::SIGTRAP) {
            reason.trap = match info.si_code {
                libc::TRAP_TRACE => Some(TrapType::SingleStep),
                libc::TRAP_BRKPT | libc::SI_KERNEL => Some(TrapType::SoftwareBreakpoint),
                libc::TRAP_HWBKPT => Some(TrapType::HardwareBreakpoint),
                _ => None,
            };
        }
        Ok(())
    }

    /// Apply the syscall-catch policy: resume transparently when the
    /// stop's syscall is not one the caller asked for.
    fn maybe_resume_from_syscall(&mut self, reason: StopReason) -> Result<StopReason>
    {
        if let SyscallCatchPolicy::Some(to_catch) = &self.syscall_policy {
            if let Some(info) = &reason.syscall {
                if !to_catch.contains(&info.id) {
                    self.resume()?;
                    return self.wait_on_signal();
                }
            }
        }
        Ok(reason)
    }

    /// Update `prev_data`/`data` of the watchpoint that triggered the
    /// current hardware trap.
    fn refresh_triggered_watchpoint(&mut self) -> Result<()>
    {
        if let Ok(HardwareStoppoint::Watchpoint(id)) = self.get_current_hardware_stoppoint() {
            let (address, size) = {
                let watchpoint = self.watchpoints.get_by_id(id)?;
                (watchpoint.address(), watchpoint.size())
            };
            let memory = self.read_memory(address, size)?;
            self.watchpoints.get_by_id_mut(id)?.update_data(&memory);
        }
        Ok(())
    }

    /// Refresh the whole register cache from the tracee: GPRs via
    /// `GETREGS`, the floating-point block via `GETFPREGS`, and the
    /// debug registers via `PEEKUSER`.
    pub fn read_all_registers(&mut self) -> Result<()>
    {
        let gprs = ptrace::getregs(self.pid)
            .map_err(|e| TalonError::os("could not read GPR registers", e))?;
        self.registers.user_mut().regs = gprs;

        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_GETFPREGS,
                self.pid.as_raw(),
                std::ptr::null_mut::<libc::c_void>(),
                &mut self.registers.user_mut().i387 as *mut _ as *mut libc::c_void,
            )
        };
        if ret < 0 {
            return Err(TalonError::os_last("could not read FPR registers"));
        }

        let debug_register_ids = [
            RegisterId::Dr0,
            RegisterId::Dr1,
            RegisterId::Dr2,
            RegisterId::Dr3,
            RegisterId::Dr4,
            RegisterId::Dr5,
            RegisterId::Dr6,
            RegisterId::Dr7,
        ];
        for (i, id) in debug_register_ids.into_iter().enumerate() {
            let info = register_info_by_id(id);
            let word = read_user_area(self.pid, info.offset)?;
            self.registers.user_mut().u_debugreg[i] = word;
        }
        Ok(())
    }

    /// Write a register by id, updating the cache and the tracee.
    pub fn write_register(&mut self, id: RegisterId, value: RegisterValue) -> Result<()>
    {
        write_register(self.pid, &mut self.registers, register_info_by_id(id), value)
    }

    /// Write a register by its DWARF number.
    pub fn write_register_by_dwarf_id(&mut self, dwarf_id: i32, value: RegisterValue)
        -> Result<()>
    {
        let info = crate::registers::register_info_by_dwarf_id(dwarf_id)?;
        write_register(self.pid, &mut self.registers, info, value)
    }

    /// The current program counter.
    pub fn get_pc(&self) -> Result<VirtAddr>
    {
        Ok(VirtAddr::new(self.registers.read_by_id_as_u64(RegisterId::Rip)?))
    }

    /// Redirect the program counter.
    pub fn set_pc(&mut self, address: VirtAddr) -> Result<()>
    {
        self.write_register(RegisterId::Rip, RegisterValue::U64(address.addr()))
    }

    /// Read tracee memory via `process_vm_readv`, split at page
    /// boundaries; falls back to word-wise `PEEKDATA` when the fast path
    /// is unavailable.
    pub fn read_memory(&self, address: VirtAddr, amount: usize) -> Result<Vec<u8>>
    {
        if amount == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; amount];

        let local_iov = libc::iovec {
            iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
            iov_len: buffer.len(),
        };
        let mut remote_iovs = Vec::new();
        let mut current = address;
        let mut remaining = amount;
        while remaining > 0 {
            let up_to_next_page = 0x1000 - (current.addr() & 0xfff) as usize;
            let chunk = remaining.min(up_to_next_page);
            remote_iovs.push(libc::iovec {
                iov_base: current.addr() as *mut libc::c_void,
                iov_len: chunk,
            });
            remaining -= chunk;
            current = current + chunk as u64;
        }

        let read = unsafe {
            libc::process_vm_readv(
                self.pid.as_raw(),
                &local_iov,
                1,
                remote_iovs.as_ptr(),
                remote_iovs.len() as libc::c_ulong,
                0,
            )
        };
        if read >= 0 {
            buffer.truncate(read as usize);
            if buffer.len() == amount {
                return Ok(buffer);
            }
        }

        // Fall back to ptrace word reads (works where process_vm_readv
        // is filtered or partially faulted).
        let mut buffer = Vec::with_capacity(amount);
        let mut current = address;
        while buffer.len() < amount {
            let word = peek_data(self.pid, current)?;
            let bytes = word.to_le_bytes();
            let take = (amount - buffer.len()).min(8);
            buffer.extend_from_slice(&bytes[..take]);
            current = current + 8;
        }
        Ok(buffer)
    }

    /// Like [`read_memory`](Self::read_memory), but with the saved
    /// original bytes of enabled software breakpoint sites spliced back
    /// in.
    pub fn read_memory_without_traps(&self, address: VirtAddr, amount: usize) -> Result<Vec<u8>>
    {
        let mut memory = self.read_memory(address, amount)?;
        let sites = self
            .breakpoint_sites
            .get_in_region(address, address + amount as u64);
        for site in sites {
            if !site.is_enabled() || site.is_hardware() {
                continue;
            }
            let offset = (site.address() - address) as usize;
            memory[offset] = site.saved_data();
        }
        Ok(memory)
    }

    /// Read a POD value out of tracee memory.
    pub fn read_memory_as<T: Copy>(&self, address: VirtAddr) -> Result<T>
    {
        let data = self.read_memory(address, std::mem::size_of::<T>())?;
        from_bytes(&data)
    }

    /// Write tracee memory at word granularity, read-modify-writing
    /// partial words at the tail.
    pub fn write_memory(&self, address: VirtAddr, data: &[u8]) -> Result<()>
    {
        let mut written = 0;
        while written < data.len() {
            let remaining = data.len() - written;
            let target = address + written as u64;
            let word = if remaining >= 8 {
                u64::from_le_bytes(data[written..written + 8].try_into().unwrap())
            } else {
                let existing = self.read_memory(target, 8)?;
                let mut bytes = [0u8; 8];
                bytes[..remaining].copy_from_slice(&data[written..]);
                bytes[remaining..].copy_from_slice(&existing[remaining..]);
                u64::from_le_bytes(bytes)
            };
            poke_data(self.pid, target, word)?;
            written += 8;
        }
        Ok(())
    }

    /// Read a NUL-terminated string from tracee memory, page by page.
    pub fn read_string(&self, address: VirtAddr) -> Result<String>
    {
        let mut result = Vec::new();
        let mut current = address;
        loop {
            let up_to_next_page = 0x1000 - (current.addr() & 0xfff) as usize;
            let chunk = self.read_memory(current, up_to_next_page.min(256))?;
            match chunk.iter().position(|&b| b == 0) {
                Some(end) => {
                    result.extend_from_slice(&chunk[..end]);
                    return Ok(String::from_utf8_lossy(&result).into_owned());
                }
                None => {
                    result.extend_from_slice(&chunk);
                    current = current + chunk.len() as u64;
                }
            }
        }
    }

    /// The auxiliary vector from `/proc/<pid>/auxv`, loaded once.
    pub fn get_auxv(&self) -> Result<&HashMap<u64, u64>>
    {
        self.auxv.get_or_try_init(|| {
            let path = PathBuf::from(format!("/proc/{}/auxv", self.pid));
            let mut file = File::open(&path)?;
            let mut auxv = HashMap::new();
            let mut buf = [0u8; 16];
            while file.read_exact(&mut buf).is_ok() {
                let tag = u64::from_ne_bytes(buf[0..8].try_into().unwrap());
                let value = u64::from_ne_bytes(buf[8..16].try_into().unwrap());
                if tag == 0 {
                    break;
                }
                auxv.insert(tag, value);
            }
            Ok(auxv)
        })
    }

    /// Register a breakpoint site at `address`, or adopt the existing
    /// one (updating its parent link when a breakpoint claims it).
    pub fn create_breakpoint_site(
        &mut self,
        address: VirtAddr,
        is_hardware: bool,
        is_internal: bool,
        parent: Option<BreakpointId>,
    ) -> Result<SiteId>
    {
        if let Ok(existing) = self.breakpoint_sites.get_by_address_mut(address) {
            if let Some(parent) = parent {
                existing.set_parent(parent);
            }
            return Ok(existing.id());
        }

        let id = SiteId::from_raw(self.next_site_id);
        self.next_site_id += 1;
        self.breakpoint_sites.push(BreakpointSite::new(
            id,
            self.pid,
            address,
            is_hardware,
            is_internal,
            parent,
        ));
        Ok(id)
    }

    /// Install the site with `id`.
    pub fn enable_breakpoint_site(&mut self, id: SiteId) -> Result<()>
    {
        let site = self.breakpoint_sites.get_by_id_mut(id)?;
        site.enable(&mut self.registers)
    }

    /// Uninstall the site with `id`.
    pub fn disable_breakpoint_site(&mut self, id: SiteId) -> Result<()>
    {
        let site = self.breakpoint_sites.get_by_id_mut(id)?;
        site.disable(&mut self.registers)
    }

    /// Uninstall and remove the site with `id`.
    pub fn remove_breakpoint_site(&mut self, id: SiteId) -> Result<()>
    {
        if let Ok(site) = self.breakpoint_sites.get_by_id_mut(id) {
            site.disable(&mut self.registers)?;
        }
        self.breakpoint_sites.remove_by_id(id)?;
        Ok(())
    }

    /// Uninstall and remove the site at `address`.
    pub fn remove_breakpoint_site_by_address(&mut self, address: VirtAddr) -> Result<()>
    {
        if let Ok(site) = self.breakpoint_sites.get_by_address_mut(address) {
            site.disable(&mut self.registers)?;
        }
        self.breakpoint_sites.remove_by_address(address)?;
        Ok(())
    }

    /// Drop a site without touching the tracee. Used when the memory the
    /// trap lived in has been unmapped by a library unload.
    pub(crate) fn discard_breakpoint_site(&mut self, id: SiteId)
    {
        let _ = self.breakpoint_sites.remove_by_id(id);
    }

    /// Create a hardware watchpoint over `size` bytes at `address`.
    pub fn create_watchpoint(
        &mut self,
        address: VirtAddr,
        mode: StoppointMode,
        size: usize,
    ) -> Result<WatchpointId>
    {
        if self.watchpoints.contains_address(address) {
            return Err(TalonError::InvalidArgument(format!(
                "watchpoint already exists at {address}"
            )));
        }
        let id = WatchpointId::from_raw(self.next_watchpoint_id);
        self.next_watchpoint_id += 1;
        let watchpoint = Watchpoint::new(id, self.pid, address, mode, size)?;
        self.watchpoints.push(watchpoint);
        Ok(id)
    }

    /// Program the watchpoint with `id` into a debug register slot.
    pub fn enable_watchpoint(&mut self, id: WatchpointId) -> Result<()>
    {
        let watchpoint = self.watchpoints.get_by_id_mut(id)?;
        watchpoint.enable(&mut self.registers)
    }

    /// Release the watchpoint's debug register slot.
    pub fn disable_watchpoint(&mut self, id: WatchpointId) -> Result<()>
    {
        let watchpoint = self.watchpoints.get_by_id_mut(id)?;
        watchpoint.disable(&mut self.registers)
    }

    /// Release and remove the watchpoint with `id`.
    pub fn remove_watchpoint(&mut self, id: WatchpointId) -> Result<()>
    {
        if let Ok(watchpoint) = self.watchpoints.get_by_id_mut(id) {
            watchpoint.disable(&mut self.registers)?;
        }
        self.watchpoints.remove_by_id(id)?;
        Ok(())
    }

    /// Resolve the hardware stop-point that raised the current debug
    /// trap by reading DR6 and matching the triggering slot's address.
    pub fn get_current_hardware_stoppoint(&self) -> Result<HardwareStoppoint>
    {
        let status = self.registers.read_by_id_as_u64(RegisterId::Dr6)?;
        if status & 0xf == 0 {
            return Err(TalonError::lookup("no hardware stoppoint triggered"));
        }
        let slot = (status & 0xf).trailing_zeros() as usize;

        let info = register_info_by_id(
            crate::registers::info::DEBUG_ADDRESS_REGISTER_IDS[slot],
        );
        let address = VirtAddr::new(
            self.registers
                .read(info)?
                .as_u64()
                .unwrap_or_default(),
        );

        if let Ok(site) = self.breakpoint_sites.get_by_address(address) {
            return Ok(HardwareStoppoint::Breakpoint(site.id()));
        }
        if let Ok(watchpoint) = self.watchpoints.get_by_address(address) {
            return Ok(HardwareStoppoint::Watchpoint(watchpoint.id()));
        }
        Err(TalonError::lookup(format!(
            "debug register {slot} does not match a known stoppoint"
        )))
    }
}

impl Drop for Process
{
    /// Detach and optionally kill the tracee.
    ///
    /// A running tracee must be stopped before `PTRACE_DETACH` is legal,
    /// so it gets a SIGSTOP first; the SIGCONT afterwards undoes that for
    /// processes we merely attached to.
    fn drop(&mut self)
    {
        if self.pid.as_raw() == 0 {
            return;
        }
        if self.is_attached {
            if self.state == ProcessState::Running {
                let _ = kill(self.pid, Signal::SIGSTOP);
                let _ = waitpid(self.pid, None);
            }
            if let Err(e) = ptrace::detach(self.pid, None) {
                warn!(pid = self.pid.as_raw(), error = %e, "detach failed during teardown");
            }
            let _ = kill(self.pid, Signal::SIGCONT);
        }
        if self.terminate_on_end {
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

fn set_ptrace_options(pid: Pid) -> Result<()>
{
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_SETOPTIONS,
            pid.as_raw(),
            std::ptr::null_mut::<libc::c_void>(),
            libc::PTRACE_O_TRACESYSGOOD,
        )
    };
    if ret < 0 {
        return Err(TalonError::os_last("could not set ptrace options"));
    }
    Ok(())
}

/// Report a pre-exec failure to the parent and exit the child.
fn exit_with_error(channel: &mut Pipe, prefix: &str) -> !
{
    let message = format!("{prefix}: {}", nix::errno::Errno::last().desc());
    let _ = channel.write(message.as_bytes());
    std::process::exit(1);
}

/// Auxiliary vector tag for the program entry point.
pub const AT_ENTRY: u64 = 9;
