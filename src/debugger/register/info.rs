//! Static description of every register the debugger exposes.
//!
//! The `offset` of each entry is its position inside the kernel `user`
//! structure, computed from the real `libc` layout. The same offsets address
//! the local mirror and the `PTRACE_PEEKUSER`/`PTRACE_POKEUSER` interface, so
//! the two views cannot drift apart.

use crate::debugger::error::Error;
use nix::libc::{user, user_fpregs_struct, user_regs_struct};
use std::mem::{offset_of, size_of};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterCategory {
    /// General purpose register.
    Gpr,
    /// Subregister of a general purpose register.
    SubGpr,
    /// Floating point register.
    Fpr,
    /// Debug register.
    Dr,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterFormat {
    UnsignedInt,
    DoubleFloat,
    LongDouble,
    Vector,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterId {
    Rax, Rdx, Rcx, Rbx, Rsi, Rdi, Rbp, Rsp,
    R8, R9, R10, R11, R12, R13, R14, R15,
    Rip, Eflags, Cs, Fs, Gs, Ss, Ds, Es, OrigRax,

    Eax, Edx, Ecx, Ebx, Esi, Edi, Ebp, Esp,
    R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d,
    Ax, Dx, Cx, Bx, Si, Di, Bp, Sp,
    R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w,
    Ah, Dh, Ch, Bh,
    Al, Dl, Cl, Bl, Sil, Dil, Bpl, Spl,
    R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,

    Fcw, Fsw, Ftw, Fop, Frip, Frdp, Mxcsr, Mxcsrmask,
    St0, St1, St2, St3, St4, St5, St6, St7,
    Mm0, Mm1, Mm2, Mm3, Mm4, Mm5, Mm6, Mm7,
    Xmm0, Xmm1, Xmm2, Xmm3, Xmm4, Xmm5, Xmm6, Xmm7,
    Xmm8, Xmm9, Xmm10, Xmm11, Xmm12, Xmm13, Xmm14, Xmm15,

    Dr0, Dr1, Dr2, Dr3, Dr4, Dr5, Dr6, Dr7,
}

pub struct RegisterInfo {
    pub id: RegisterId,
    pub name: &'static str,
    /// DWARF register number, -1 when the format defines none.
    pub dwarf_id: i32,
    pub size: usize,
    /// Offset inside the kernel `user` structure.
    pub offset: usize,
    pub category: RegisterCategory,
    pub format: RegisterFormat,
}

pub const DEBUG_REGISTER_IDS: [RegisterId; 8] = [
    RegisterId::Dr0,
    RegisterId::Dr1,
    RegisterId::Dr2,
    RegisterId::Dr3,
    RegisterId::Dr4,
    RegisterId::Dr5,
    RegisterId::Dr6,
    RegisterId::Dr7,
];

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

macro_rules! dr_offset {
    ($n:expr) => {
        offset_of!(user, u_debugreg) + $n * 8
    };
}

macro_rules! define_register {
    ($name:ident, $id:ident, $dwarf:expr, $size:expr, $offset:expr, $category:ident, $format:ident) => {
        RegisterInfo {
            id: RegisterId::$id,
            name: stringify!($name),
            dwarf_id: $dwarf,
            size: $size,
            offset: $offset,
            category: RegisterCategory::$category,
            format: RegisterFormat::$format,
        }
    };
}

macro_rules! define_gpr_64 {
    ($name:ident, $id:ident, $dwarf:expr) => {
        define_register!($name, $id, $dwarf, 8, gpr_offset!($name), Gpr, UnsignedInt)
    };
}

macro_rules! define_gpr_32 {
    ($name:ident, $id:ident, $super:ident) => {
        define_register!($name, $id, -1, 4, gpr_offset!($super), SubGpr, UnsignedInt)
    };
}

macro_rules! define_gpr_16 {
    ($name:ident, $id:ident, $super:ident) => {
        define_register!($name, $id, -1, 2, gpr_offset!($super), SubGpr, UnsignedInt)
    };
}

macro_rules! define_gpr_8h {
    ($name:ident, $id:ident, $super:ident) => {
        define_register!($name, $id, -1, 1, gpr_offset!($super) + 1, SubGpr, UnsignedInt)
    };
}

macro_rules! define_gpr_8l {
    ($name:ident, $id:ident, $super:ident) => {
        define_register!($name, $id, -1, 1, gpr_offset!($super), SubGpr, UnsignedInt)
    };
}

macro_rules! define_fpr {
    ($name:ident, $id:ident, $dwarf:expr, $field:ident, $repr:ty) => {
        define_register!(
            $name,
            $id,
            $dwarf,
            size_of::<$repr>(),
            fpr_offset!($field),
            Fpr,
            UnsignedInt
        )
    };
}

// st and mm registers share the 16-byte x87 data slots.
macro_rules! define_fp_st {
    ($name:ident, $id:ident, $n:expr) => {
        define_register!(
            $name,
            $id,
            33 + $n,
            16,
            fpr_offset!(st_space) + $n * 16,
            Fpr,
            LongDouble
        )
    };
}

macro_rules! define_fp_mm {
    ($name:ident, $id:ident, $n:expr) => {
        define_register!(
            $name,
            $id,
            41 + $n,
            8,
            fpr_offset!(st_space) + $n * 16,
            Fpr,
            Vector
        )
    };
}

macro_rules! define_fp_xmm {
    ($name:ident, $id:ident, $n:expr) => {
        define_register!(
            $name,
            $id,
            17 + $n,
            16,
            fpr_offset!(xmm_space) + $n * 16,
            Fpr,
            Vector
        )
    };
}

macro_rules! define_dr {
    ($name:ident, $id:ident, $n:expr) => {
        define_register!($name, $id, -1, 8, dr_offset!($n), Dr, UnsignedInt)
    };
}

#[rustfmt::skip]
pub const REGISTER_INFOS: &[RegisterInfo] = &[
    define_gpr_64!(rax, Rax, 0),
    define_gpr_64!(rdx, Rdx, 1),
    define_gpr_64!(rcx, Rcx, 2),
    define_gpr_64!(rbx, Rbx, 3),
    define_gpr_64!(rsi, Rsi, 4),
    define_gpr_64!(rdi, Rdi, 5),
    define_gpr_64!(rbp, Rbp, 6),
    define_gpr_64!(rsp, Rsp, 7),
    define_gpr_64!(r8, R8, 8),
    define_gpr_64!(r9, R9, 9),
    define_gpr_64!(r10, R10, 10),
    define_gpr_64!(r11, R11, 11),
    define_gpr_64!(r12, R12, 12),
    define_gpr_64!(r13, R13, 13),
    define_gpr_64!(r14, R14, 14),
    define_gpr_64!(r15, R15, 15),
    define_gpr_64!(rip, Rip, -1),
    define_gpr_64!(eflags, Eflags, 49),
    define_gpr_64!(es, Es, 50),
    define_gpr_64!(cs, Cs, 51),
    define_gpr_64!(ss, Ss, 52),
    define_gpr_64!(ds, Ds, 53),
    define_gpr_64!(fs, Fs, 54),
    define_gpr_64!(gs, Gs, 55),
    define_gpr_64!(orig_rax, OrigRax, -1),

    define_gpr_32!(eax, Eax, rax),
    define_gpr_32!(edx, Edx, rdx),
    define_gpr_32!(ecx, Ecx, rcx),
    define_gpr_32!(ebx, Ebx, rbx),
    define_gpr_32!(esi, Esi, rsi),
    define_gpr_32!(edi, Edi, rdi),
    define_gpr_32!(ebp, Ebp, rbp),
    define_gpr_32!(esp, Esp, rsp),
    define_gpr_32!(r8d, R8d, r8),
    define_gpr_32!(r9d, R9d, r9),
    define_gpr_32!(r10d, R10d, r10),
    define_gpr_32!(r11d, R11d, r11),
    define_gpr_32!(r12d, R12d, r12),
    define_gpr_32!(r13d, R13d, r13),
    define_gpr_32!(r14d, R14d, r14),
    define_gpr_32!(r15d, R15d, r15),

    define_gpr_16!(ax, Ax, rax),
    define_gpr_16!(dx, Dx, rdx),
    define_gpr_16!(cx, Cx, rcx),
    define_gpr_16!(bx, Bx, rbx),
    define_gpr_16!(si, Si, rsi),
    define_gpr_16!(di, Di, rdi),
    define_gpr_16!(bp, Bp, rbp),
    define_gpr_16!(sp, Sp, rsp),
    define_gpr_16!(r8w, R8w, r8),
    define_gpr_16!(r9w, R9w, r9),
    define_gpr_16!(r10w, R10w, r10),
    define_gpr_16!(r11w, R11w, r11),
    define_gpr_16!(r12w, R12w, r12),
    define_gpr_16!(r13w, R13w, r13),
    define_gpr_16!(r14w, R14w, r14),
    define_gpr_16!(r15w, R15w, r15),

    define_gpr_8h!(ah, Ah, rax),
    define_gpr_8h!(dh, Dh, rdx),
    define_gpr_8h!(ch, Ch, rcx),
    define_gpr_8h!(bh, Bh, rbx),

    define_gpr_8l!(al, Al, rax),
    define_gpr_8l!(dl, Dl, rdx),
    define_gpr_8l!(cl, Cl, rcx),
    define_gpr_8l!(bl, Bl, rbx),
    define_gpr_8l!(sil, Sil, rsi),
    define_gpr_8l!(dil, Dil, rdi),
    define_gpr_8l!(bpl, Bpl, rbp),
    define_gpr_8l!(spl, Spl, rsp),
    define_gpr_8l!(r8b, R8b, r8),
    define_gpr_8l!(r9b, R9b, r9),
    define_gpr_8l!(r10b, R10b, r10),
    define_gpr_8l!(r11b, R11b, r11),
    define_gpr_8l!(r12b, R12b, r12),
    define_gpr_8l!(r13b, R13b, r13),
    define_gpr_8l!(r14b, R14b, r14),
    define_gpr_8l!(r15b, R15b, r15),

    define_fpr!(fcw, Fcw, 65, cwd, u16),
    define_fpr!(fsw, Fsw, 66, swd, u16),
    define_fpr!(ftw, Ftw, -1, ftw, u16),
    define_fpr!(fop, Fop, -1, fop, u16),
    define_fpr!(frip, Frip, -1, rip, u64),
    define_fpr!(frdp, Frdp, -1, rdp, u64),
    define_fpr!(mxcsr, Mxcsr, 64, mxcsr, u32),
    define_fpr!(mxcsrmask, Mxcsrmask, -1, mxcr_mask, u32),

    define_fp_st!(st0, St0, 0),
    define_fp_st!(st1, St1, 1),
    define_fp_st!(st2, St2, 2),
    define_fp_st!(st3, St3, 3),
    define_fp_st!(st4, St4, 4),
    define_fp_st!(st5, St5, 5),
    define_fp_st!(st6, St6, 6),
    define_fp_st!(st7, St7, 7),

    define_fp_mm!(mm0, Mm0, 0),
    define_fp_mm!(mm1, Mm1, 1),
    define_fp_mm!(mm2, Mm2, 2),
    define_fp_mm!(mm3, Mm3, 3),
    define_fp_mm!(mm4, Mm4, 4),
    define_fp_mm!(mm5, Mm5, 5),
    define_fp_mm!(mm6, Mm6, 6),
    define_fp_mm!(mm7, Mm7, 7),

    define_fp_xmm!(xmm0, Xmm0, 0),
    define_fp_xmm!(xmm1, Xmm1, 1),
    define_fp_xmm!(xmm2, Xmm2, 2),
    define_fp_xmm!(xmm3, Xmm3, 3),
    define_fp_xmm!(xmm4, Xmm4, 4),
    define_fp_xmm!(xmm5, Xmm5, 5),
    define_fp_xmm!(xmm6, Xmm6, 6),
    define_fp_xmm!(xmm7, Xmm7, 7),
    define_fp_xmm!(xmm8, Xmm8, 8),
    define_fp_xmm!(xmm9, Xmm9, 9),
    define_fp_xmm!(xmm10, Xmm10, 10),
    define_fp_xmm!(xmm11, Xmm11, 11),
    define_fp_xmm!(xmm12, Xmm12, 12),
    define_fp_xmm!(xmm13, Xmm13, 13),
    define_fp_xmm!(xmm14, Xmm14, 14),
    define_fp_xmm!(xmm15, Xmm15, 15),

    define_dr!(dr0, Dr0, 0),
    define_dr!(dr1, Dr1, 1),
    define_dr!(dr2, Dr2, 2),
    define_dr!(dr3, Dr3, 3),
    define_dr!(dr4, Dr4, 4),
    define_dr!(dr5, Dr5, 5),
    define_dr!(dr6, Dr6, 6),
    define_dr!(dr7, Dr7, 7),
];

fn register_info_by<F: FnMut(&&RegisterInfo) -> bool>(f: F) -> Option<&'static RegisterInfo> {
    REGISTER_INFOS.iter().find(f)
}

pub fn register_info_by_id(id: RegisterId) -> Result<&'static RegisterInfo, Error> {
    register_info_by(|info| info.id == id).ok_or_else(|| Error::RegisterNotFound(format!("{id:?}")))
}

pub fn register_info_by_name(name: &str) -> Result<&'static RegisterInfo, Error> {
    register_info_by(|info| info.name == name)
        .ok_or_else(|| Error::RegisterNotFound(name.to_string()))
}

pub fn register_info_by_dwarf(dwarf_id: i32) -> Result<&'static RegisterInfo, Error> {
    register_info_by(|info| info.dwarf_id == dwarf_id && dwarf_id != -1)
        .ok_or_else(|| Error::RegisterNotFound(format!("dwarf id {dwarf_id}")))
}
