//! Live target-level tests: breakpoints, rendezvous tracking, and
//! stop-reason enrichment against real system binaries.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;

use talon_core::process::{ProcessState, TrapType, AT_ENTRY};
use talon_core::types::VirtAddr;
use talon_core::{Stoppoint, Target};

fn devnull_fd() -> (std::fs::File, i32)
{
    let file = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .expect("no /dev/null");
    let fd = file.as_raw_fd();
    (file, fd)
}

fn entry_point(target: &Target) -> VirtAddr
{
    VirtAddr::new(
        *target
            .process()
            .get_auxv()
            .unwrap()
            .get(&AT_ENTRY)
            .expect("auxv has no entry"),
    )
}

#[test]
fn test_launch_loads_main_elf()
{
    let (_devnull, fd) = devnull_fd();
    let target = Target::launch("/bin/echo", Some(fd)).unwrap();

    assert_eq!(target.process().state(), ProcessState::Stopped);
    assert_eq!(target.elves().len(), 1);
    assert!(target.main_elf().get_section(".text").is_some());
    // The load bias satisfies virt = file + bias for the entry point.
    let entry = entry_point(&target);
    assert_eq!(
        target.main_elf().load_bias().addr(),
        entry.addr() - target.main_elf().header().e_entry
    );
}

#[test]
fn test_address_breakpoint_hit_and_rendezvous()
{
    let (_devnull, fd) = devnull_fd();
    let mut target = Target::launch("/bin/echo", Some(fd)).unwrap();
    let entry = entry_point(&target);

    let id = target.create_address_breakpoint(entry, false, false);
    target.enable_breakpoint(id).unwrap();
    assert!(target.breakpoints().get_by_id(id).unwrap().is_enabled());

    target.resume().unwrap();
    let reason = target.wait_on_signal().unwrap();
    assert_eq!(reason.trap_type(), Some(TrapType::SoftwareBreakpoint));
    assert_eq!(target.process().get_pc().unwrap(), entry);

    // By the time the entry point runs, the dynamic linker has published
    // its link map; the shared objects should be loaded.
    assert!(target.elves().len() > 1);
    let rendezvous = target.read_dynamic_linker_rendezvous().unwrap();
    assert!(rendezvous.is_some());
    assert_ne!(rendezvous.unwrap().1, VirtAddr::NULL);

    // The PC now resolves into the main object.
    assert!(target.pc_file_address().unwrap().is_some());

    target.disable_breakpoint(id).unwrap();
    target.remove_breakpoint(id).unwrap();

    target.resume().unwrap();
    let reason = target.wait_on_signal().unwrap();
    assert_eq!(reason.state(), ProcessState::Exited);
}

#[test]
fn test_run_until_address()
{
    let (_devnull, fd) = devnull_fd();
    let mut target = Target::launch("/bin/echo", Some(fd)).unwrap();
    let entry = entry_point(&target);

    let reason = target.run_until_address(entry).unwrap();
    // A stop at the requested address reads as a single step.
    assert!(reason.is_step());
    assert_eq!(target.process().get_pc().unwrap(), entry);
    // The temporary internal site is gone again.
    assert!(!target.process().breakpoint_sites().contains_address(entry));
}

#[test]
fn test_unresolvable_breakpoints_hold_zero_sites()
{
    let (_devnull, fd) = devnull_fd();
    let mut target = Target::launch("/bin/echo", Some(fd)).unwrap();

    let function = target.create_function_breakpoint("this_function_does_not_exist", false, false);
    target.enable_breakpoint(function).unwrap();
    assert!(target
        .breakpoints()
        .get_by_id(function)
        .unwrap()
        .addresses()
        .is_empty());

    let line = target.create_line_breakpoint("no_such_file.c", 42, false, false);
    target.enable_breakpoint(line).unwrap();
    assert!(target
        .breakpoints()
        .get_by_id(line)
        .unwrap()
        .addresses()
        .is_empty());
}

#[test]
fn test_breakpoint_ids_are_distinct()
{
    let (_devnull, fd) = devnull_fd();
    let mut target = Target::launch("/bin/echo", Some(fd)).unwrap();

    let a = target.create_address_breakpoint(VirtAddr::new(0x1000), false, false);
    let b = target.create_address_breakpoint(VirtAddr::new(0x2000), false, false);
    assert_ne!(a, b);
    assert!(target.breakpoints().contains_id(a));
    assert!(target.breakpoints().contains_id(b));
}

#[test]
fn test_attach_to_spawned_child()
{
    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .stdout(std::process::Stdio::null())
        .spawn()
        .expect("could not spawn sleep");

    // Give it a moment to exec.
    std::thread::sleep(std::time::Duration::from_millis(100));

    {
        let target = Target::attach(child.id() as i32).unwrap();
        assert_eq!(target.process().state(), ProcessState::Stopped);
        assert!(target.process().is_attached());
        assert_ne!(target.process().get_pc().unwrap().addr(), 0);
        assert!(target.main_elf().get_section(".text").is_some());
    }

    // Dropping the target detached; the child is still ours to reap.
    child.kill().ok();
    child.wait().ok();
}
