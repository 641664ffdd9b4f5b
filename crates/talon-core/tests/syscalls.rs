//! Tests for the syscall name table.

use talon_core::syscalls::{syscall_id, syscall_name};

#[test]
fn test_name_lookup()
{
    assert_eq!(syscall_name(0).unwrap(), "read");
    assert_eq!(syscall_name(1).unwrap(), "write");
    assert_eq!(syscall_name(59).unwrap(), "execve");
    assert_eq!(syscall_name(101).unwrap(), "ptrace");
    assert_eq!(syscall_name(257).unwrap(), "openat");
    assert_eq!(syscall_name(310).unwrap(), "process_vm_readv");
    assert_eq!(syscall_name(435).unwrap(), "clone3");
}

#[test]
fn test_id_lookup()
{
    assert_eq!(syscall_id("read").unwrap(), 0);
    assert_eq!(syscall_id("mmap").unwrap(), 9);
    assert_eq!(syscall_id("exit_group").unwrap(), 231);
    assert_eq!(syscall_id("pidfd_open").unwrap(), 434);
}

#[test]
fn test_unknown_values_are_lookup_errors()
{
    assert!(syscall_name(423).is_err());
    assert!(syscall_name(100_000).is_err());
    assert!(syscall_id("definitely_not_a_syscall").is_err());
}

#[test]
fn test_round_trip()
{
    for name in ["read", "openat", "futex", "ptrace", "rseq", "fchmodat2"] {
        let id = syscall_id(name).unwrap();
        assert_eq!(syscall_name(id).unwrap(), name);
    }
}
