//! Instruction decoding, delegated to `iced-x86`.
//!
//! The stepping logic only needs to know where the next instructions
//! start and whether the first one is a `call`; the text form also feeds
//! stop-site reporting in front-ends.

use iced_x86::{Decoder, DecoderOptions, Formatter, NasmFormatter};

use crate::error::Result;
use crate::process::Process;
use crate::types::VirtAddr;

/// Longest x86 instruction encoding.
const MAX_INSTRUCTION_BYTES: usize = 15;

/// One decoded instruction.
pub struct Instruction
{
    pub address: VirtAddr,
    pub text: String,
}

/// Decode up to `n_instructions` starting at `address`.
///
/// Reads through [`Process::read_memory_without_traps`] so installed
/// breakpoint bytes never reach the decoder.
pub fn disassemble(
    process: &Process,
    n_instructions: usize,
    address: VirtAddr,
) -> Result<Vec<Instruction>>
{
    let code =
        process.read_memory_without_traps(address, n_instructions * MAX_INSTRUCTION_BYTES)?;

    let mut decoder = Decoder::with_ip(64, &code, address.addr(), DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();

    let mut instructions = Vec::with_capacity(n_instructions);
    for _ in 0..n_instructions {
        if !decoder.can_decode() {
            break;
        }
        let instruction = decoder.decode();
        let mut text = String::new();
        formatter.format(&instruction, &mut text);
        instructions.push(Instruction {
            address: VirtAddr::new(instruction.ip()),
            text,
        });
    }
    Ok(instructions)
}
