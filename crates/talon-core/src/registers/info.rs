//! The register metadata table.
//!
//! One declarative list enumerates every register the debugger can touch:
//! its id, name, DWARF register number, byte size, offset into the kernel
//! `user` area, category, and value format. The table is the single
//! source of truth; everything else (typed reads, user-area writes,
//! DWARF-number lookups) is driven from it.

use std::mem::offset_of;

use libc::{user, user_fpregs_struct, user_regs_struct};

use crate::error::{Result, TalonError};

/// Where a register lives and how it is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterType
{
    /// 64-bit general-purpose register (written via `POKEUSER`)
    Gpr,
    /// Sub-view of a GPR (al, ax, eax, ...); writes read-modify-write the
    /// containing 64-bit word
    SubGpr,
    /// Floating-point/SIMD register (written via `SETFPREGS`)
    Fpr,
    /// x86 debug register (written via `POKEUSER`)
    Dr,
}

/// How a register's bytes should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFormat
{
    Uint,
    DoubleFloat,
    LongDouble,
    Vector,
}

/// Metadata for one register.
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo
{
    pub id: RegisterId,
    pub name: &'static str,
    pub dwarf_id: i32,
    pub size: usize,
    pub offset: usize,
    pub reg_type: RegisterType,
    pub format: RegisterFormat,
}

macro_rules! gpr_offset {
    ($field:ident) => {
        offset_of!(user, regs) + offset_of!(user_regs_struct, $field)
    };
}

macro_rules! fpr_offset {
    ($field:ident) => {
        offset_of!(user, i387) + offset_of!(user_fpregs_struct, $field)
    };
}

const fn dr_offset(number: usize) -> usize
{
    offset_of!(user, u_debugreg) + number * 8
}

const fn st_offset(number: usize) -> usize
{
    offset_of!(user, i387) + offset_of!(user_fpregs_struct, st_space) + number * 16
}

const fn xmm_offset(number: usize) -> usize
{
    offset_of!(user, i387) + offset_of!(user_fpregs_struct, xmm_space) + number * 16
}

macro_rules! define_registers {
    ($($variant:ident => ($name:literal, $dwarf:literal, $size:expr, $offset:expr, $ty:ident, $fmt:ident)),* $(,)?) => {
        /// Identifier for every register in the table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RegisterId
        {
            $($variant),*
        }

        /// The register metadata table, in [`RegisterId`] order.
        pub static REGISTER_INFOS: &[RegisterInfo] = &[
            $(RegisterInfo {
                id: RegisterId::$variant,
                name: $name,
                dwarf_id: $dwarf,
                size: $size,
                offset: $offset,
                reg_type: RegisterType::$ty,
                format: RegisterFormat::$fmt,
            }),*
        ];
    };
}

define_registers! {
    // 64-bit general-purpose registers.
    Rax => ("rax", 0, 8, gpr_offset!(rax), Gpr, Uint),
    Rdx => ("rdx", 1, 8, gpr_offset!(rdx), Gpr, Uint),
    Rcx => ("rcx", 2, 8, gpr_offset!(rcx), Gpr, Uint),
    Rbx => ("rbx", 3, 8, gpr_offset!(rbx), Gpr, Uint),
    Rsi => ("rsi", 4, 8, gpr_offset!(rsi), Gpr, Uint),
    Rdi => ("rdi", 5, 8, gpr_offset!(rdi), Gpr, Uint),
    Rbp => ("rbp", 6, 8, gpr_offset!(rbp), Gpr, Uint),
    Rsp => ("rsp", 7, 8, gpr_offset!(rsp), Gpr, Uint),
    R8 => ("r8", 8, 8, gpr_offset!(r8), Gpr, Uint),
    R9 => ("r9", 9, 8, gpr_offset!(r9), Gpr, Uint),
    R10 => ("r10", 10, 8, gpr_offset!(r10), Gpr, Uint),
    R11 => ("r11", 11, 8, gpr_offset!(r11), Gpr, Uint),
    R12 => ("r12", 12, 8, gpr_offset!(r12), Gpr, Uint),
    R13 => ("r13", 13, 8, gpr_offset!(r13), Gpr, Uint),
    R14 => ("r14", 14, 8, gpr_offset!(r14), Gpr, Uint),
    R15 => ("r15", 15, 8, gpr_offset!(r15), Gpr, Uint),
    Rip => ("rip", 16, 8, gpr_offset!(rip), Gpr, Uint),
    Rflags => ("rflags", 49, 8, gpr_offset!(eflags), Gpr, Uint),
    Es => ("es", 50, 8, gpr_offset!(es), Gpr, Uint),
    Cs => ("cs", 51, 8, gpr_offset!(cs), Gpr, Uint),
    Ss => ("ss", 52, 8, gpr_offset!(ss), Gpr, Uint),
    Ds => ("ds", 53, 8, gpr_offset!(ds), Gpr, Uint),
    Fs => ("fs", 54, 8, gpr_offset!(fs), Gpr, Uint),
    Gs => ("gs", 55, 8, gpr_offset!(gs), Gpr, Uint),
    FsBase => ("fs_base", 58, 8, gpr_offset!(fs_base), Gpr, Uint),
    GsBase => ("gs_base", 59, 8, gpr_offset!(gs_base), Gpr, Uint),
    OrigRax => ("orig_rax", -1, 8, gpr_offset!(orig_rax), Gpr, Uint),

    // 32-bit sub-registers.
    Eax => ("eax", -1, 4, gpr_offset!(rax), SubGpr, Uint),
    Edx => ("edx", -1, 4, gpr_offset!(rdx), SubGpr, Uint),
    Ecx => ("ecx", -1, 4, gpr_offset!(rcx), SubGpr, Uint),
    Ebx => ("ebx", -1, 4, gpr_offset!(rbx), SubGpr, Uint),
    Esi => ("esi", -1, 4, gpr_offset!(rsi), SubGpr, Uint),
    Edi => ("edi", -1, 4, gpr_offset!(rdi), SubGpr, Uint),
    Ebp => ("ebp", -1, 4, gpr_offset!(rbp), SubGpr, Uint),
    Esp => ("esp", -1, 4, gpr_offset!(rsp), SubGpr, Uint),
    R8d => ("r8d", -1, 4, gpr_offset!(r8), SubGpr, Uint),
    R9d => ("r9d", -1, 4, gpr_offset!(r9), SubGpr, Uint),
    R10d => ("r10d", -1, 4, gpr_offset!(r10), SubGpr, Uint),
    R11d => ("r11d", -1, 4, gpr_offset!(r11), SubGpr, Uint),
    R12d => ("r12d", -1, 4, gpr_offset!(r12), SubGpr, Uint),
    R13d => ("r13d", -1, 4, gpr_offset!(r13), SubGpr, Uint),
    R14d => ("r14d", -1, 4, gpr_offset!(r14), SubGpr, Uint),
    R15d => ("r15d", -1, 4, gpr_offset!(r15), SubGpr, Uint),

    // 16-bit sub-registers.
    Ax => ("ax", -1, 2, gpr_offset!(rax), SubGpr, Uint),
    Dx => ("dx", -1, 2, gpr_offset!(rdx), SubGpr, Uint),
    Cx => ("cx", -1, 2, gpr_offset!(rcx), SubGpr, Uint),
    Bx => ("bx", -1, 2, gpr_offset!(rbx), SubGpr, Uint),
    Si => ("si", -1, 2, gpr_offset!(rsi), SubGpr, Uint),
    Di => ("di", -1, 2, gpr_offset!(rdi), SubGpr, Uint),
    Bp => ("bp", -1, 2, gpr_offset!(rbp), SubGpr, Uint),
    Sp => ("sp", -1, 2, gpr_offset!(rsp), SubGpr, Uint),
    R8w => ("r8w", -1, 2, gpr_offset!(r8), SubGpr, Uint),
    R9w => ("r9w", -1, 2, gpr_offset!(r9), SubGpr, Uint),
    R10w => ("r10w", -1, 2, gpr_offset!(r10), SubGpr, Uint),
    R11w => ("r11w", -1, 2, gpr_offset!(r11), SubGpr, Uint),
    R12w => ("r12w", -1, 2, gpr_offset!(r12), SubGpr, Uint),
    R13w => ("r13w", -1, 2, gpr_offset!(r13), SubGpr, Uint),
    R14w => ("r14w", -1, 2, gpr_offset!(r14), SubGpr, Uint),
    R15w => ("r15w", -1, 2, gpr_offset!(r15), SubGpr, Uint),

    // 8-bit low sub-registers.
    Al => ("al", -1, 1, gpr_offset!(rax), SubGpr, Uint),
    Dl => ("dl", -1, 1, gpr_offset!(rdx), SubGpr, Uint),
    Cl => ("cl", -1, 1, gpr_offset!(rcx), SubGpr, Uint),
    Bl => ("bl", -1, 1, gpr_offset!(rbx), SubGpr, Uint),
    Sil => ("sil", -1, 1, gpr_offset!(rsi), SubGpr, Uint),
    Dil => ("dil", -1, 1, gpr_offset!(rdi), SubGpr, Uint),
    Bpl => ("bpl", -1, 1, gpr_offset!(rbp), SubGpr, Uint),
    Spl => ("spl", -1, 1, gpr_offset!(rsp), SubGpr, Uint),
    R8b => ("r8b", -1, 1, gpr_offset!(r8), SubGpr, Uint),
    R9b => ("r9b", -1, 1, gpr_offset!(r9), SubGpr, Uint),
    R10b => ("r10b", -1, 1, gpr_offset!(r10), SubGpr, Uint),
    R11b => ("r11b", -1, 1, gpr_offset!(r11), SubGpr, Uint),
    R12b => ("r12b", -1, 1, gpr_offset!(r12), SubGpr, Uint),
    R13b => ("r13b", -1, 1, gpr_offset!(r13), SubGpr, Uint),
    R14b => ("r14b", -1, 1, gpr_offset!(r14), SubGpr, Uint),
    R15b => ("r15b", -1, 1, gpr_offset!(r15), SubGpr, Uint),

    // 8-bit high sub-registers.
    Ah => ("ah", -1, 1, gpr_offset!(rax) + 1, SubGpr, Uint),
    Dh => ("dh", -1, 1, gpr_offset!(rdx) + 1, SubGpr, Uint),
    Ch => ("ch", -1, 1, gpr_offset!(rcx) + 1, SubGpr, Uint),
    Bh => ("bh", -1, 1, gpr_offset!(rbx) + 1, SubGpr, Uint),

    // x87/SSE control and status registers.
    Fcw => ("fcw", 65, 2, fpr_offset!(cwd), Fpr, Uint),
    Fsw => ("fsw", 66, 2, fpr_offset!(swd), Fpr, Uint),
    Ftw => ("ftw", -1, 2, fpr_offset!(ftw), Fpr, Uint),
    Fop => ("fop", -1, 2, fpr_offset!(fop), Fpr, Uint),
    Frip => ("frip", -1, 8, fpr_offset!(rip), Fpr, Uint),
    Frdp => ("frdp", -1, 8, fpr_offset!(rdp), Fpr, Uint),
    Mxcsr => ("mxcsr", 64, 4, fpr_offset!(mxcsr), Fpr, Uint),
    Mxcsrmask => ("mxcsrmask", -1, 4, fpr_offset!(mxcr_mask), Fpr, Uint),

    // x87 floating-point stack.
    St0 => ("st0", 33, 16, st_offset(0), Fpr, LongDouble),
    St1 => ("st1", 34, 16, st_offset(1), Fpr, LongDouble),
    St2 => ("st2", 35, 16, st_offset(2), Fpr, LongDouble),
    St3 => ("st3", 36, 16, st_offset(3), Fpr, LongDouble),
    St4 => ("st4", 37, 16, st_offset(4), Fpr, LongDouble),
    St5 => ("st5", 38, 16, st_offset(5), Fpr, LongDouble),
    St6 => ("st6", 39, 16, st_offset(6), Fpr, LongDouble),
    St7 => ("st7", 40, 16, st_offset(7), Fpr, LongDouble),

    // MMX registers (aliased onto the x87 stack).
    Mm0 => ("mm0", 41, 8, st_offset(0), Fpr, Vector),
    Mm1 => ("mm1", 42, 8, st_offset(1), Fpr, Vector),
    Mm2 => ("mm2", 43, 8, st_offset(2), Fpr, Vector),
    Mm3 => ("mm3", 44, 8, st_offset(3), Fpr, Vector),
    Mm4 => ("mm4", 45, 8, st_offset(4), Fpr, Vector),
    Mm5 => ("mm5", 46, 8, st_offset(5), Fpr, Vector),
    Mm6 => ("mm6", 47, 8, st_offset(6), Fpr, Vector),
    Mm7 => ("mm7", 48, 8, st_offset(7), Fpr, Vector),

    // SSE registers.
    Xmm0 => ("xmm0", 17, 16, xmm_offset(0), Fpr, Vector),
    Xmm1 => ("xmm1", 18, 16, xmm_offset(1), Fpr, Vector),
    Xmm2 => ("xmm2", 19, 16, xmm_offset(2), Fpr, Vector),
    Xmm3 => ("xmm3", 20, 16, xmm_offset(3), Fpr, Vector),
    Xmm4 => ("xmm4", 21, 16, xmm_offset(4), Fpr, Vector),
    Xmm5 => ("xmm5", 22, 16, xmm_offset(5), Fpr, Vector),
    Xmm6 => ("xmm6", 23, 16, xmm_offset(6), Fpr, Vector),
    Xmm7 => ("xmm7", 24, 16, xmm_offset(7), Fpr, Vector),
    Xmm8 => ("xmm8", 25, 16, xmm_offset(8), Fpr, Vector),
    Xmm9 => ("xmm9", 26, 16, xmm_offset(9), Fpr, Vector),
    Xmm10 => ("xmm10", 27, 16, xmm_offset(10), Fpr, Vector),
    Xmm11 => ("xmm11", 28, 16, xmm_offset(11), Fpr, Vector),
    Xmm12 => ("xmm12", 29, 16, xmm_offset(12), Fpr, Vector),
    Xmm13 => ("xmm13", 30, 16, xmm_offset(13), Fpr, Vector),
    Xmm14 => ("xmm14", 31, 16, xmm_offset(14), Fpr, Vector),
    Xmm15 => ("xmm15", 32, 16, xmm_offset(15), Fpr, Vector),

    // Debug registers.
    Dr0 => ("dr0", -1, 8, dr_offset(0), Dr, Uint),
    Dr1 => ("dr1", -1, 8, dr_offset(1), Dr, Uint),
    Dr2 => ("dr2", -1, 8, dr_offset(2), Dr, Uint),
    Dr3 => ("dr3", -1, 8, dr_offset(3), Dr, Uint),
    Dr4 => ("dr4", -1, 8, dr_offset(4), Dr, Uint),
    Dr5 => ("dr5", -1, 8, dr_offset(5), Dr, Uint),
    Dr6 => ("dr6", -1, 8, dr_offset(6), Dr, Uint),
    Dr7 => ("dr7", -1, 8, dr_offset(7), Dr, Uint),
}

/// The four hardware stop-point address slots, in DR6 bit order.
pub(crate) const DEBUG_ADDRESS_REGISTER_IDS: [RegisterId; 4] =
    [RegisterId::Dr0, RegisterId::Dr1, RegisterId::Dr2, RegisterId::Dr3];

/// Metadata for `id`.
///
/// The table is generated alongside the enum, so indexing by
/// discriminant cannot miss.
pub fn register_info_by_id(id: RegisterId) -> &'static RegisterInfo
{
    &REGISTER_INFOS[id as usize]
}

/// Metadata for the register named `name`.
pub fn register_info_by_name(name: &str) -> Result<&'static RegisterInfo>
{
    REGISTER_INFOS
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| TalonError::lookup(format!("no register named {name}")))
}

/// Metadata for the register with DWARF number `dwarf_id`.
pub fn register_info_by_dwarf_id(dwarf_id: i32) -> Result<&'static RegisterInfo>
{
    REGISTER_INFOS
        .iter()
        .find(|info| info.dwarf_id == dwarf_id && info.dwarf_id >= 0)
        .ok_or_else(|| TalonError::lookup(format!("no register with DWARF id {dwarf_id}")))
}
