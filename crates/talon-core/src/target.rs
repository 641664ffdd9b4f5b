//! # Target
//!
//! Composes a [`Process`] with the loaded ELF objects and their DWARF
//! data to provide source-level debugging: step-in/over/out with inline
//! awareness, breakpoint resolution across objects, and dynamic-linker
//! rendezvous tracking.

use std::path::{Path, PathBuf};

use rustc_demangle::demangle;
use tracing::{debug, warn};

use crate::disassembler::disassemble;
use crate::dwarf::encoding::{DW_TAG_inlined_subroutine, DW_TAG_subprogram};
use crate::dwarf::line::LineEntry;
use crate::dwarf::Die;
use crate::elf::{elf64_st_type, Elf, Elf64Dyn, Elf64Sym, ElfCollection, DT_DEBUG, STT_FUNC};
use crate::error::{Result, TalonError};
use crate::process::{
    LaunchOptions, Process, ProcessState, StopReason, TrapType, AT_ENTRY,
};
use crate::stoppoints::{
    Breakpoint, BreakpointId, BreakpointKind, SiteId, Stoppoint, StoppointCollection,
    StoppointMode, WatchpointId,
};
use crate::types::{FileAddr, VirtAddr};

/// Dynamic linker debug interface (`struct r_debug` from `<link.h>`).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct RDebug
{
    r_version: i32,
    r_map: u64,
    r_brk: u64,
    r_state: i32,
    r_ldbase: u64,
}

/// One entry of the dynamic linker's link map.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct LinkMap
{
    l_addr: u64,
    l_name: u64,
    l_ld: u64,
    l_next: u64,
    l_prev: u64,
}

const RT_CONSISTENT: i32 = 0;

/// The call-chain cursor: how many inline frames above the innermost
/// one the user is currently "in" at the stopped PC.
#[derive(Debug, Default)]
pub struct Stack
{
    inline_height: usize,
}

impl Stack
{
    pub fn inline_height(&self) -> usize
    {
        self.inline_height
    }

    /// Pretend to step into the next inlined callee at this address.
    pub fn simulate_inlined_step_in(&mut self)
    {
        self.inline_height = self.inline_height.saturating_sub(1);
    }
}

/// One frame of an RBP-chain backtrace.
#[derive(Debug, Clone)]
pub struct StackFrame
{
    pub pc: VirtAddr,
    pub function_name: Option<String>,
}

/// Functions matching a name: DWARF DIEs first, ELF symbols as the
/// fallback. Indices refer to the target's ELF collection.
pub struct FindFunctionsResult
{
    pub dwarf_functions: Vec<(usize, Die)>,
    pub elf_functions: Vec<(usize, Elf64Sym)>,
}

/// A debugged program: the process plus every object mapped into it.
pub struct Target
{
    process: Process,
    elves: ElfCollection,
    breakpoints: StoppointCollection<Breakpoint>,
    next_breakpoint_id: i32,
    stack: Stack,
    rendezvous_address: Option<VirtAddr>,
    rendezvous_brk: Option<VirtAddr>,
}

impl Target
{
    /// Launch `path` under tracing and load its main ELF.
    ///
    /// The load bias comes from `AT_ENTRY - e_entry`, which holds for
    /// both `ET_EXEC` (bias zero) and `ET_DYN` objects.
    pub fn launch(path: impl AsRef<Path>, stdout_replacement: Option<i32>) -> Result<Self>
    {
        let path = path.as_ref();
        let options = LaunchOptions {
            stdout_replacement,
            ..LaunchOptions::default()
        };
        let process = Process::launch(path, options)?;
        Self::with_process(process, path)
    }

    /// Attach to a running process; its main ELF is found through
    /// `/proc/<pid>/exe`.
    pub fn attach(pid: i32) -> Result<Self>
    {
        let path = PathBuf::from(format!("/proc/{pid}/exe"));
        let process = Process::attach(pid)?;
        Self::with_process(process, &path)
    }

    fn with_process(process: Process, path: &Path) -> Result<Self>
    {
        let mut elf = Elf::new(path)?;
        let entry = *process
            .get_auxv()?
            .get(&AT_ENTRY)
            .ok_or_else(|| TalonError::lookup("auxiliary vector carries no entry point"))?;
        elf.notify_loaded(VirtAddr::new(entry.wrapping_sub(elf.header().e_entry)));

        let mut elves = ElfCollection::default();
        elves.push(elf);
        let mut target = Target {
            process,
            elves,
            breakpoints: StoppointCollection::new(),
            next_breakpoint_id: 1,
            stack: Stack::default(),
            rendezvous_address: None,
            rendezvous_brk: None,
        };
        if let Err(e) = target.resolve_dynamic_linker_rendezvous() {
            // The linker may simply not have initialized yet; retried on
            // every stop.
            debug!(error = %e, "rendezvous not available at first stop");
        }
        Ok(target)
    }

    pub fn process(&self) -> &Process
    {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut Process
    {
        &mut self.process
    }

    pub fn elves(&self) -> &ElfCollection
    {
        &self.elves
    }

    /// The main executable's ELF.
    pub fn main_elf(&self) -> &Elf
    {
        self.elves.get(0).expect("target always holds its main ELF")
    }

    pub fn stack(&self) -> &Stack
    {
        &self.stack
    }

    pub fn breakpoints(&self) -> &StoppointCollection<Breakpoint>
    {
        &self.breakpoints
    }

    /// Resume the tracee.
    pub fn resume(&mut self) -> Result<()>
    {
        self.process.resume()
    }

    /// Wait for the next stop and apply target-level bookkeeping: the
    /// inline cursor reset and dynamic-linker tracking.
    pub fn wait_on_signal(&mut self) -> Result<StopReason>
    {
        let reason = self.process.wait_on_signal()?;
        self.notify_stop(&reason)?;
        Ok(reason)
    }

    /// Refresh per-stop state after the process reported `reason`.
    pub fn notify_stop(&mut self, reason: &StopReason) -> Result<()>
    {
        if reason.state() != ProcessState::Stopped {
            return Ok(());
        }
        if let Err(e) = self.reset_inline_height() {
            warn!(error = %e, "could not compute the inline stack at the stop site");
        }
        if self.rendezvous_address.is_none() {
            if let Err(e) = self.resolve_dynamic_linker_rendezvous() {
                debug!(error = %e, "rendezvous still unavailable");
            }
        } else if self.rendezvous_brk == Some(self.process.get_pc()?) {
            self.reload_dynamic_libraries()?;
        }
        Ok(())
    }

    /// The current PC translated into the coordinates of the object that
    /// contains it.
    pub fn pc_file_address(&self) -> Result<Option<(&Elf, FileAddr)>>
    {
        let pc = self.process.get_pc()?;
        let Some(elf) = self.elves.get_elf_containing_address(pc) else {
            return Ok(None);
        };
        Ok(pc.to_file_addr(elf).map(|addr| (elf, addr)))
    }

    /// The line-table row covering the current PC.
    pub fn line_entry_at_pc(&self) -> Result<Option<LineEntry>>
    {
        let Some((elf, pc)) = self.pc_file_address()? else {
            return Ok(None);
        };
        let dwarf = elf.dwarf()?;
        let Some(cu) = dwarf.compile_unit_containing_address(pc)? else {
            return Ok(None);
        };
        let Some(table) = cu.lines(dwarf)? else {
            return Ok(None);
        };
        table.get_entry_by_address(dwarf, pc)
    }

    /// The inline stack at the current PC, outermost first, together
    /// with the object it came from.
    pub fn inline_stack_at_pc(&self) -> Result<(Option<&Elf>, Vec<Die>)>
    {
        let Some((elf, pc)) = self.pc_file_address()? else {
            return Ok((None, Vec::new()));
        };
        let stack = elf.dwarf()?.inline_stack_at_address(pc)?;
        Ok((Some(elf), stack))
    }

    fn reset_inline_height(&mut self) -> Result<()>
    {
        self.stack.inline_height = 0;
        let Some((elf, pc)) = self.pc_file_address()? else {
            return Ok(());
        };
        let dwarf = elf.dwarf()?;
        let stack = dwarf.inline_stack_at_address(pc)?;
        let mut height = 0;
        for die in stack.iter().rev() {
            if die.low_pc(dwarf)? == pc {
                height += 1;
            } else {
                break;
            }
        }
        self.stack.inline_height = height;
        Ok(())
    }

    /// Run to `address`, installing a temporary internal breakpoint site
    /// there when none exists.
    ///
    /// A breakpoint stop at exactly `address` is reported as a single
    /// step so callers can treat the movement as one logical step.
    pub fn run_until_address(&mut self, address: VirtAddr) -> Result<StopReason>
    {
        let mut temporary_site = None;
        if !self.process.breakpoint_sites().contains_address(address) {
            let id = self.process.create_breakpoint_site(address, false, true, None)?;
            self.process.enable_breakpoint_site(id)?;
            temporary_site = Some(address);
        }

        self.process.resume()?;
        let mut reason = self.process.wait_on_signal()?;
        if reason.is_breakpoint() && self.process.get_pc()? == address {
            reason.trap = Some(TrapType::SingleStep);
        }

        if let Some(address) = temporary_site {
            self.process.remove_breakpoint_site_by_address(address)?;
        }
        Ok(reason)
    }

    /// Step one source line, entering calls.
    ///
    /// A pending simulated inline frame is consumed first. Otherwise
    /// single-steps until the line entry changes, then skips function
    /// prologues by running to the next row when the PC landed at a
    /// function's entry.
    pub fn step_in(&mut self) -> Result<StopReason>
    {
        if self.stack.inline_height() > 0 {
            self.stack.simulate_inlined_step_in();
            return Ok(StopReason::synthetic_single_step());
        }

        let orig_line = self.line_entry_at_pc()?;
        loop {
            let reason = self.process.step_instruction()?;
            if !reason.is_step() {
                self.notify_stop(&reason)?;
                return Ok(reason);
            }
            let entry = self.line_entry_at_pc()?;
            match &entry {
                None => break,
                Some(e) => {
                    if !(entry == orig_line || e.end_sequence) {
                        break;
                    }
                }
            }
        }

        // Prologue skip: when we stopped at a function entry, run ahead
        // to the first row past the prologue.
        let next_row = {
            match self.pc_file_address()? {
                Some((elf, pc)) => {
                    let dwarf = elf.dwarf()?;
                    let at_entry = match dwarf.function_containing_address(pc)? {
                        Some(func) => func.low_pc(dwarf)? == pc,
                        None => false,
                    };
                    if at_entry {
                        match dwarf.compile_unit_containing_address(pc)? {
                            Some(cu) => match cu.lines(dwarf)? {
                                Some(table) => table
                                    .get_entry_after_address(dwarf, pc)?
                                    .map(|entry| entry.address.to_virt_addr(elf)),
                                None => None,
                            },
                            None => None,
                        }
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(address) = next_row {
            let reason = self.run_until_address(address)?;
            self.notify_stop(&reason)?;
            return Ok(reason);
        }

        let reason = StopReason::synthetic_single_step();
        self.notify_stop(&reason)?;
        Ok(reason)
    }

    /// Step one source line without entering calls.
    ///
    /// Inlined callees are skipped by running to their high PC; real
    /// calls are skipped by running to the instruction after the `call`;
    /// anything else single-steps.
    pub fn step_over(&mut self) -> Result<StopReason>
    {
        let orig_line = self.line_entry_at_pc()?;
        let mut reason;
        loop {
            let inline_return = {
                let (elf, inline_stack) = self.inline_stack_at_pc()?;
                let height = self.stack.inline_height();
                if height > 0 && height <= inline_stack.len() {
                    let elf = elf.ok_or_else(|| {
                        TalonError::lookup("inline stack without a containing object")
                    })?;
                    let dwarf = elf.dwarf()?;
                    let frame_to_skip = &inline_stack[inline_stack.len() - height];
                    Some(frame_to_skip.high_pc(dwarf)?.to_virt_addr(elf))
                } else {
                    None
                }
            };

            if let Some(return_address) = inline_return {
                reason = self.run_until_address(return_address)?;
                if !reason.is_step() || self.process.get_pc()? != return_address {
                    self.notify_stop(&reason)?;
                    return Ok(reason);
                }
            } else {
                let pc = self.process.get_pc()?;
                let instructions = disassemble(&self.process, 2, pc)?;
                if instructions.len() == 2 && instructions[0].text.starts_with("call") {
                    let return_address = instructions[1].address;
                    reason = self.run_until_address(return_address)?;
                    if !reason.is_step() || self.process.get_pc()? != return_address {
                        self.notify_stop(&reason)?;
                        return Ok(reason);
                    }
                } else {
                    reason = self.process.step_instruction()?;
                    if !reason.is_step() {
                        self.notify_stop(&reason)?;
                        return Ok(reason);
                    }
                }
            }

            let entry = self.line_entry_at_pc()?;
            match &entry {
                None => break,
                Some(e) => {
                    if !(entry == orig_line || e.end_sequence) {
                        break;
                    }
                }
            }
        }
        self.notify_stop(&reason)?;
        Ok(reason)
    }

    /// Step out of the current frame.
    ///
    /// Inside an inline stack this runs to the enclosing inlined frame's
    /// high PC; at the outermost frame it reads the return address from
    /// `[rbp + 8]`, which requires the target to keep frame pointers.
    pub fn step_out(&mut self) -> Result<StopReason>
    {
        let inline_return = {
            let (elf, inline_stack) = self.inline_stack_at_pc()?;
            let has_inline_frames = inline_stack.len() > 1;
            let at_inline_frame = self.stack.inline_height() < inline_stack.len().saturating_sub(1);
            if has_inline_frames && at_inline_frame {
                let elf = elf.ok_or_else(|| {
                    TalonError::lookup("inline stack without a containing object")
                })?;
                let dwarf = elf.dwarf()?;
                let index = inline_stack.len() - self.stack.inline_height() - 1;
                Some(inline_stack[index].high_pc(dwarf)?.to_virt_addr(elf))
            } else {
                None
            }
        };
        if let Some(return_address) = inline_return {
            let reason = self.run_until_address(return_address)?;
            self.notify_stop(&reason)?;
            return Ok(reason);
        }

        let frame_pointer = self
            .process
            .registers()
            .read_by_id_as_u64(crate::registers::RegisterId::Rbp)?;
        let return_address: u64 = self
            .process
            .read_memory_as(VirtAddr::new(frame_pointer + 8))?;
        let reason = self.run_until_address(VirtAddr::new(return_address))?;
        self.notify_stop(&reason)?;
        Ok(reason)
    }

    /// Walk the RBP chain and name each return site.
    pub fn backtrace(&self) -> Result<Vec<StackFrame>>
    {
        const MAX_FRAMES: usize = 64;

        let mut frames = Vec::new();
        let mut pc = self.process.get_pc()?;
        let mut rbp = self
            .process
            .registers()
            .read_by_id_as_u64(crate::registers::RegisterId::Rbp)?;

        while frames.len() < MAX_FRAMES {
            frames.push(StackFrame {
                pc,
                function_name: self.function_name_at_address(pc)?,
            });
            if rbp == 0 {
                break;
            }
            let return_address: u64 = self.process.read_memory_as(VirtAddr::new(rbp + 8))?;
            let next = VirtAddr::new(return_address);
            if return_address == 0 || self.elves.get_elf_containing_address(next).is_none() {
                break;
            }
            rbp = self.process.read_memory_as(VirtAddr::new(rbp))?;
            pc = next;
        }
        Ok(frames)
    }

    /// All functions named `name`.
    ///
    /// DWARF is authoritative; ELF symbol tables are consulted only when
    /// no object's debug information matches, and duplicate addresses
    /// are dropped later during breakpoint resolution.
    pub fn find_functions(&self, name: &str) -> Result<FindFunctionsResult>
    {
        let mut result = FindFunctionsResult {
            dwarf_functions: Vec::new(),
            elf_functions: Vec::new(),
        };
        for (index, elf) in self.elves.iter().enumerate() {
            for die in elf.dwarf()?.find_functions(name)? {
                result.dwarf_functions.push((index, die));
            }
        }
        if result.dwarf_functions.is_empty() {
            for (index, elf) in self.elves.iter().enumerate() {
                for sym in elf.get_symbols_by_name(name) {
                    if elf64_st_type(sym.st_info) == STT_FUNC {
                        result.elf_functions.push((index, *sym));
                    }
                }
            }
        }
        Ok(result)
    }

    /// Name of the function whose symbol covers `address`, demangled.
    pub fn function_name_at_address(&self, address: VirtAddr) -> Result<Option<String>>
    {
        let Some(elf) = self.elves.get_elf_containing_address(address) else {
            return Ok(None);
        };
        let Some(symbol) = elf.get_symbol_containing_virt_addr(address) else {
            return Ok(None);
        };
        let name = elf.get_string(symbol.st_name as usize)?;
        Ok(Some(demangle(name).to_string()))
    }

    /// Line-table rows matching `path` and `line` across every loaded
    /// object.
    pub fn get_line_entries_by_line(&self, path: &Path, line: u64)
        -> Result<Vec<(usize, LineEntry)>>
    {
        let mut entries = Vec::new();
        for (index, elf) in self.elves.iter().enumerate() {
            let dwarf = elf.dwarf()?;
            for cu in dwarf.compile_units() {
                if let Some(table) = cu.lines(dwarf)? {
                    for entry in table.get_entries_by_line(dwarf, path, line)? {
                        entries.push((index, entry));
                    }
                }
            }
        }
        Ok(entries)
    }

    fn push_breakpoint(&mut self, kind: BreakpointKind, hardware: bool, internal: bool)
        -> BreakpointId
    {
        let id = BreakpointId::from_raw(self.next_breakpoint_id);
        self.next_breakpoint_id += 1;
        self.breakpoints
            .push(Breakpoint::new(id, kind, hardware, internal));
        id
    }

    /// Create a breakpoint pinned to one virtual address.
    pub fn create_address_breakpoint(
        &mut self,
        address: VirtAddr,
        hardware: bool,
        internal: bool,
    ) -> BreakpointId
    {
        self.push_breakpoint(BreakpointKind::Address(address), hardware, internal)
    }

    /// Create a breakpoint on every function named `name`.
    pub fn create_function_breakpoint(
        &mut self,
        name: impl Into<String>,
        hardware: bool,
        internal: bool,
    ) -> BreakpointId
    {
        self.push_breakpoint(BreakpointKind::Function(name.into()), hardware, internal)
    }

    /// Create a breakpoint on a source line.
    pub fn create_line_breakpoint(
        &mut self,
        file: impl Into<PathBuf>,
        line: u64,
        hardware: bool,
        internal: bool,
    ) -> BreakpointId
    {
        self.push_breakpoint(
            BreakpointKind::Line {
                file: file.into(),
                line,
            },
            hardware,
            internal,
        )
    }

    /// Materialize sites for the breakpoint's current matches.
    ///
    /// Idempotent; re-run after every library load so matches that had
    /// no site yet get one. Newly created sites inherit the breakpoint's
    /// enabled state.
    pub fn resolve_breakpoint(&mut self, id: BreakpointId) -> Result<()>
    {
        let (kind, hardware, internal, enabled, existing) = {
            let breakpoint = self.breakpoints.get_by_id(id)?;
            (
                breakpoint.kind().clone(),
                breakpoint.is_hardware(),
                breakpoint.is_internal(),
                breakpoint.is_enabled(),
                breakpoint.addresses(),
            )
        };

        let mut addresses = match &kind {
            BreakpointKind::Address(address) => vec![*address],
            BreakpointKind::Function(name) => self.resolve_function_addresses(name)?,
            BreakpointKind::Line { file, line } => {
                let mut addresses = Vec::new();
                for (index, entry) in self.get_line_entries_by_line(file, *line)? {
                    let elf = self.elves.get(index).expect("entry index in range");
                    addresses.push(entry.address.to_virt_addr(elf));
                }
                addresses
            }
        };
        addresses.sort();
        addresses.dedup();

        for address in addresses {
            if existing.contains(&address) {
                continue;
            }
            let site = self
                .process
                .create_breakpoint_site(address, hardware, internal, Some(id))?;
            self.breakpoints.get_by_id_mut(id)?.record_site(site, address);
            if enabled {
                self.process.enable_breakpoint_site(site)?;
            }
        }
        Ok(())
    }

    fn resolve_function_addresses(&self, name: &str) -> Result<Vec<VirtAddr>>
    {
        let functions = self.find_functions(name)?;
        let mut addresses = Vec::new();
        for (index, die) in &functions.dwarf_functions {
            let elf = self.elves.get(*index).expect("die index in range");
            let dwarf = elf.dwarf()?;
            let tag = die.tag();
            if tag == DW_TAG_subprogram || tag == DW_TAG_inlined_subroutine {
                addresses.push(die.low_pc(dwarf)?.to_virt_addr(elf));
            }
        }
        for (index, sym) in &functions.elf_functions {
            let elf = self.elves.get(*index).expect("symbol index in range");
            addresses.push(FileAddr::new(sym.st_value).to_virt_addr(elf));
        }
        Ok(addresses)
    }

    /// Resolve and arm a breakpoint: every owned site gets enabled.
    pub fn enable_breakpoint(&mut self, id: BreakpointId) -> Result<()>
    {
        self.resolve_breakpoint(id)?;
        self.breakpoints.get_by_id_mut(id)?.set_enabled(true);
        let sites = self.breakpoints.get_by_id(id)?.site_ids();
        for site in sites {
            self.process.enable_breakpoint_site(site)?;
        }
        Ok(())
    }

    /// Disarm a breakpoint: every owned site gets disabled.
    pub fn disable_breakpoint(&mut self, id: BreakpointId) -> Result<()>
    {
        self.breakpoints.get_by_id_mut(id)?.set_enabled(false);
        let sites = self.breakpoints.get_by_id(id)?.site_ids();
        for site in sites {
            self.process.disable_breakpoint_site(site)?;
        }
        Ok(())
    }

    /// Disarm, tear down sites, and forget the breakpoint.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<()>
    {
        let sites = self.breakpoints.get_by_id(id)?.site_ids();
        for site in sites {
            self.process.remove_breakpoint_site(site)?;
        }
        self.breakpoints.remove_by_id(id)?;
        Ok(())
    }

    /// Create and arm a watchpoint over `size` bytes at `address`.
    pub fn create_watchpoint(
        &mut self,
        address: VirtAddr,
        mode: StoppointMode,
        size: usize,
    ) -> Result<WatchpointId>
    {
        self.process.create_watchpoint(address, mode, size)
    }

    /// Read the dynamic linker's `r_debug` structure, when its location
    /// is known.
    pub fn read_dynamic_linker_rendezvous(&self) -> Result<Option<(i32, VirtAddr)>>
    {
        let Some(address) = self.rendezvous_address else {
            return Ok(None);
        };
        let rdebug: RDebug = self.process.read_memory_as(address)?;
        Ok(Some((rdebug.r_state, VirtAddr::new(rdebug.r_brk))))
    }

    /// Locate `r_debug` through the main object's `DT_DEBUG` entry and
    /// trap the linker's `r_brk` hook.
    ///
    /// The linker fills `DT_DEBUG` during startup, so this quietly does
    /// nothing until the first stop after that; callers retry per stop.
    fn resolve_dynamic_linker_rendezvous(&mut self) -> Result<()>
    {
        if self.rendezvous_address.is_some() {
            return Ok(());
        }
        let main = self.main_elf();
        let Some(dynamic_start) = main.get_section_start_address(".dynamic") else {
            return Ok(());
        };
        let mut entry_address = dynamic_start.to_virt_addr(main);

        loop {
            let entry: Elf64Dyn = self.process.read_memory_as(entry_address)?;
            if entry.d_tag == 0 {
                return Ok(());
            }
            if entry.d_tag == DT_DEBUG {
                if entry.d_val == 0 {
                    return Ok(());
                }
                let rendezvous = VirtAddr::new(entry.d_val);
                let rdebug: RDebug = self.process.read_memory_as(rendezvous)?;
                if rdebug.r_brk == 0 {
                    return Ok(());
                }
                self.rendezvous_address = Some(rendezvous);
                let brk = VirtAddr::new(rdebug.r_brk);
                self.rendezvous_brk = Some(brk);
                let site = self.process.create_breakpoint_site(brk, false, true, None)?;
                self.process.enable_breakpoint_site(site)?;
                debug!(brk = %brk, "installed dynamic linker rendezvous trap");
                self.reload_dynamic_libraries()?;
                return Ok(());
            }
            entry_address = entry_address + std::mem::size_of::<Elf64Dyn>() as u64;
        }
    }

    /// Synchronize the ELF collection with the linker's link map.
    ///
    /// Only acts in the `RT_CONSISTENT` state; `RT_ADD`/`RT_DELETE`
    /// stops are ignored until the linker finishes the transition. Newly
    /// listed objects are loaded with their `l_addr` as bias, vanished
    /// ones dropped, and every breakpoint re-resolved.
    fn reload_dynamic_libraries(&mut self) -> Result<()>
    {
        let Some(rendezvous) = self.rendezvous_address else {
            return Ok(());
        };
        let rdebug: RDebug = self.process.read_memory_as(rendezvous)?;
        if rdebug.r_state != RT_CONSISTENT {
            return Ok(());
        }

        let mut listed = Vec::new();
        let mut entry_pointer = rdebug.r_map;
        while entry_pointer != 0 {
            let entry: LinkMap = self.process.read_memory_as(VirtAddr::new(entry_pointer))?;
            if entry.l_name != 0 {
                let name = self.process.read_string(VirtAddr::new(entry.l_name))?;
                if !name.is_empty() {
                    let path = PathBuf::from(&name);
                    if self.elves.get_elf_by_path(&path).is_none() && path.exists() {
                        match Elf::new(&path) {
                            Ok(mut elf) => {
                                elf.notify_loaded(VirtAddr::new(entry.l_addr));
                                self.elves.push(elf);
                                debug!(path = %path.display(), "loaded shared object");
                            }
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "could not load shared object");
                            }
                        }
                    }
                    listed.push(path);
                }
            }
            entry_pointer = entry.l_next;
        }

        let before = self.elves.len();
        self.elves.retain_paths(&listed);
        if self.elves.len() != before {
            self.purge_unmapped_sites();
        }

        let ids: Vec<BreakpointId> = self.breakpoints.iter().map(|b| b.id()).collect();
        for id in ids {
            self.resolve_breakpoint(id)?;
        }
        Ok(())
    }

    /// Drop breakpoint sites whose addresses no longer belong to any
    /// loaded object. The traps vanished with the mapping, so the sites
    /// are discarded without touching tracee memory.
    fn purge_unmapped_sites(&mut self)
    {
        let mut orphans: Vec<(BreakpointId, SiteId)> = Vec::new();
        for breakpoint in self.breakpoints.iter() {
            for (site, address) in breakpoint.sites() {
                if self.elves.get_elf_containing_address(*address).is_none() {
                    orphans.push((breakpoint.id(), *site));
                }
            }
        }
        for (breakpoint, site) in orphans {
            if let Ok(breakpoint) = self.breakpoints.get_by_id_mut(breakpoint) {
                breakpoint.forget_site(site);
            }
            self.process.discard_breakpoint_site(site);
        }
    }
}
