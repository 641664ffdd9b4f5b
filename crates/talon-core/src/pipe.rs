//! One-shot close-on-exec pipe for the launch error protocol.
//!
//! The parent creates the pipe before forking; the child writes a
//! textual error if anything fails before `exec`. Because the write end
//! is close-on-exec, a successful exec closes it and the parent's read
//! returns zero bytes.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::error::{Result, TalonError};

/// A one-shot byte channel between parent and child.
pub struct Pipe
{
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl Pipe
{
    /// Create the pipe with `O_CLOEXEC` set on both ends.
    pub fn cloexec() -> Result<Self>
    {
        let (read, write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| TalonError::os("could not create pipe", e))?;
        Ok(Pipe {
            read: Some(read),
            write: Some(write),
        })
    }

    pub fn close_read(&mut self)
    {
        self.read = None;
    }

    pub fn close_write(&mut self)
    {
        self.write = None;
    }

    /// Drain the read end until EOF, consuming it.
    pub fn read(&mut self) -> Result<Vec<u8>>
    {
        let fd = self
            .read
            .take()
            .ok_or_else(|| TalonError::InvalidArgument("pipe read end already closed".into()))?;
        let mut data = Vec::new();
        File::from(fd).read_to_end(&mut data)?;
        Ok(data)
    }

    /// Write `bytes` to the write end, consuming it.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()>
    {
        let fd = self
            .write
            .take()
            .ok_or_else(|| TalonError::InvalidArgument("pipe write end already closed".into()))?;
        File::from(fd).write_all(bytes)?;
        Ok(())
    }
}
