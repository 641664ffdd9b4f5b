//! Live process-control tests.
//!
//! These drive real tracees: `yes` (runs forever, stdout discarded) for
//! stopped-state inspection and `/bin/echo` for run-to-exit paths.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;

use talon_core::process::{
    HardwareStoppoint, LaunchOptions, Process, ProcessState, SyscallCatchPolicy, TrapType,
    AT_ENTRY,
};
use talon_core::registers::{RegisterId, RegisterValue};
use talon_core::types::VirtAddr;
use talon_core::{StoppointMode, TalonError};

/// Launch a tracee that blocks forever, with its stdout discarded.
fn launch_paused() -> Process
{
    let devnull = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .expect("no /dev/null");
    let options = LaunchOptions {
        stdout_replacement: Some(devnull.as_raw_fd()),
        ..LaunchOptions::default()
    };
    Process::launch("yes", options).expect("could not launch test tracee")
}

fn process_exists(pid: i32) -> bool
{
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[test]
fn test_launch_success()
{
    let process = launch_paused();
    assert_eq!(process.state(), ProcessState::Stopped);
    assert!(process_exists(process.pid().as_raw()));
}

#[test]
fn test_launch_no_such_program()
{
    let result = Process::launch("you_do_not_have_to_be_good", LaunchOptions::default());
    assert!(matches!(result, Err(TalonError::Launch { .. })));
}

#[test]
fn test_attach_invalid_pid()
{
    assert!(Process::attach(0).is_err());
}

#[test]
fn test_resume_until_exit()
{
    let devnull = OpenOptions::new().write(true).open("/dev/null").unwrap();
    let options = LaunchOptions {
        stdout_replacement: Some(devnull.as_raw_fd()),
        ..LaunchOptions::default()
    };
    let mut process = Process::launch("/bin/echo", options).unwrap();

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.state(), ProcessState::Exited);
    assert_eq!(reason.exit_status(), Some(0));

    // Resuming a finished tracee is a state error, not a crash.
    assert!(matches!(process.resume(), Err(TalonError::ProcessState(_))));
}

#[test]
fn test_register_write_round_trip()
{
    let mut process = launch_paused();

    process
        .write_register(RegisterId::Rdi, RegisterValue::U64(0xcafe_cafe))
        .unwrap();
    assert_eq!(
        process.registers().read_by_id_as_u64(RegisterId::Rdi).unwrap(),
        0xcafe_cafe
    );

    // The write went through to the kernel, not just the cache.
    process.read_all_registers().unwrap();
    assert_eq!(
        process.registers().read_by_id_as_u64(RegisterId::Rdi).unwrap(),
        0xcafe_cafe
    );
}

#[test]
fn test_sub_register_write_preserves_parent()
{
    let mut process = launch_paused();

    process
        .write_register(RegisterId::Rdx, RegisterValue::U64(0x1111_2222_3333_4444))
        .unwrap();
    process
        .write_register(RegisterId::Dl, RegisterValue::U8(0xab))
        .unwrap();
    process.read_all_registers().unwrap();
    assert_eq!(
        process.registers().read_by_id_as_u64(RegisterId::Rdx).unwrap(),
        0x1111_2222_3333_44ab
    );
}

#[test]
fn test_register_format_mismatch_is_rejected()
{
    let mut process = launch_paused();
    let result = process.write_register(RegisterId::Rdi, RegisterValue::Bytes16([0; 16]));
    assert!(matches!(result, Err(TalonError::InvalidArgument(_))));
}

#[test]
fn test_read_by_dwarf_id()
{
    let mut process = launch_paused();
    process
        .write_register(RegisterId::Rsi, RegisterValue::U64(0x1234))
        .unwrap();
    // DWARF register 4 is rsi in the System V numbering.
    let value = process.registers().read_by_dwarf_id(4).unwrap();
    assert_eq!(value, RegisterValue::U64(0x1234));
}

#[test]
fn test_memory_round_trip()
{
    let process = launch_paused();
    let rsp = VirtAddr::new(
        process.registers().read_by_id_as_u64(RegisterId::Rsp).unwrap(),
    );

    process.write_memory(rsp, b"talon!!!").unwrap();
    let read = process.read_memory(rsp, 8).unwrap();
    assert_eq!(&read, b"talon!!!");

    let word: u64 = process.read_memory_as(rsp).unwrap();
    assert_eq!(word, u64::from_le_bytes(*b"talon!!!"));
}

#[test]
fn test_partial_word_write()
{
    let process = launch_paused();
    let rsp = VirtAddr::new(
        process.registers().read_by_id_as_u64(RegisterId::Rsp).unwrap(),
    );

    process.write_memory(rsp, &[0u8; 16]).unwrap();
    process.write_memory(rsp, b"abc").unwrap();
    let read = process.read_memory(rsp, 8).unwrap();
    assert_eq!(&read, b"abc\0\0\0\0\0");
}

#[test]
fn test_read_string()
{
    let process = launch_paused();
    let rsp = VirtAddr::new(
        process.registers().read_by_id_as_u64(RegisterId::Rsp).unwrap(),
    );

    process.write_memory(rsp, b"talon\0").unwrap();
    assert_eq!(process.read_string(rsp).unwrap(), "talon");
}

#[test]
fn test_software_breakpoint_site_masks_memory()
{
    let mut process = launch_paused();
    let pc = process.get_pc().unwrap();
    let original = process.read_memory(pc, 1).unwrap()[0];

    let site = process.create_breakpoint_site(pc, false, false, None).unwrap();
    process.enable_breakpoint_site(site).unwrap();

    assert_eq!(process.read_memory(pc, 1).unwrap()[0], 0xcc);
    assert_eq!(process.read_memory_without_traps(pc, 1).unwrap()[0], original);

    process.disable_breakpoint_site(site).unwrap();
    assert_eq!(process.read_memory(pc, 1).unwrap()[0], original);

    process.remove_breakpoint_site(site).unwrap();
    assert!(!process.breakpoint_sites().contains_address(pc));
}

#[test]
fn test_breakpoint_site_reuse_at_same_address()
{
    let mut process = launch_paused();
    let pc = process.get_pc().unwrap();

    let first = process.create_breakpoint_site(pc, false, false, None).unwrap();
    let second = process.create_breakpoint_site(pc, false, false, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(process.breakpoint_sites().len(), 1);
}

#[test]
fn test_hardware_breakpoint_sites()
{
    let mut process = launch_paused();
    let pc = process.get_pc().unwrap();

    let site = process.create_breakpoint_site(pc, true, false, None).unwrap();
    process.enable_breakpoint_site(site).unwrap();
    process.disable_breakpoint_site(site).unwrap();
    process.remove_breakpoint_site(site).unwrap();
}

#[test]
fn test_hardware_slots_are_finite()
{
    let mut process = launch_paused();
    let pc = process.get_pc().unwrap();

    for i in 0..4u64 {
        let site = process
            .create_breakpoint_site(pc + i, true, false, None)
            .unwrap();
        process.enable_breakpoint_site(site).unwrap();
    }
    let site = process
        .create_breakpoint_site(pc + 4u64, true, false, None)
        .unwrap();
    assert!(matches!(
        process.enable_breakpoint_site(site),
        Err(TalonError::ResourceExhausted(_))
    ));
}

#[test]
fn test_watchpoint_lifecycle()
{
    let mut process = launch_paused();
    let rsp = process.registers().read_by_id_as_u64(RegisterId::Rsp).unwrap() & !7;
    let address = VirtAddr::new(rsp);

    let id = process
        .create_watchpoint(address, StoppointMode::Write, 8)
        .unwrap();
    process.enable_watchpoint(id).unwrap();
    process.disable_watchpoint(id).unwrap();
    process.remove_watchpoint(id).unwrap();
}

#[test]
fn test_watchpoint_geometry_is_validated()
{
    let mut process = launch_paused();
    let rsp = process.registers().read_by_id_as_u64(RegisterId::Rsp).unwrap() & !7;

    assert!(process
        .create_watchpoint(VirtAddr::new(rsp + 1), StoppointMode::Write, 8)
        .is_err());
    assert!(process
        .create_watchpoint(VirtAddr::new(rsp), StoppointMode::Write, 3)
        .is_err());
}

#[test]
fn test_watchpoint_fires_on_write()
{
    let mut process = launch_paused();
    let rsp = process.registers().read_by_id_as_u64(RegisterId::Rsp).unwrap();

    // The first call instruction after the entry point pushes its return
    // address at rsp - 8, so a write watchpoint there fires immediately.
    let address = VirtAddr::new((rsp & !7) - 8);
    let id = process
        .create_watchpoint(address, StoppointMode::Write, 8)
        .unwrap();
    process.enable_watchpoint(id).unwrap();

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.trap_type(), Some(TrapType::HardwareBreakpoint));

    match process.get_current_hardware_stoppoint().unwrap() {
        HardwareStoppoint::Watchpoint(fired) => assert_eq!(fired, id),
        HardwareStoppoint::Breakpoint(site) => panic!("expected a watchpoint, hit site {site}"),
    }
    let watchpoint = process.watchpoints().get_by_id(id).unwrap();
    assert_ne!(watchpoint.data(), watchpoint.previous_data());

    process.remove_watchpoint(id).unwrap();
}

#[test]
fn test_step_instruction()
{
    let mut process = launch_paused();
    let reason = process.step_instruction().unwrap();
    assert!(reason.is_step());
    assert_eq!(process.state(), ProcessState::Stopped);
}

#[test]
fn test_auxv_has_entry_point()
{
    let process = launch_paused();
    let auxv = process.get_auxv().unwrap();
    assert!(auxv.contains_key(&AT_ENTRY));
    assert_ne!(auxv[&AT_ENTRY], 0);
}

#[test]
fn test_syscall_catch_all_alternates_entry_and_exit()
{
    let mut process = launch_paused();
    process.set_syscall_policy(SyscallCatchPolicy::All);

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.trap_type(), Some(TrapType::Syscall));
    let entry = reason.syscall_info().copied().unwrap();
    assert!(entry.entry);

    process.resume().unwrap();
    let reason = process.wait_on_signal().unwrap();
    assert_eq!(reason.trap_type(), Some(TrapType::Syscall));
    let exit = reason.syscall_info().copied().unwrap();
    assert!(!exit.entry);
    assert_eq!(entry.id, exit.id);
}
