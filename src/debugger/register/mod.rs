pub mod f80;
pub mod info;

use crate::debugger::error::{Error, Result};
use crate::debugger::register::f80::F80;
use crate::debugger::register::info::{
    register_info_by_id, RegisterFormat, RegisterId, RegisterInfo,
};
use nix::libc;
use std::fmt::{Display, Formatter};
use std::{mem, slice};

/// Value of a single register, tagged with its representation.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum RegisterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    F80(F80),
    Bytes8([u8; 8]),
    Bytes16([u8; 16]),
}

impl RegisterValue {
    /// In-memory size of the carried value. [`F80`] counts as its full
    /// 16-byte slot, the size of the `long double` object it stands for.
    pub fn byte_size(&self) -> usize {
        match self {
            RegisterValue::U8(_) | RegisterValue::I8(_) => 1,
            RegisterValue::U16(_) | RegisterValue::I16(_) => 2,
            RegisterValue::U32(_) | RegisterValue::I32(_) => 4,
            RegisterValue::U64(_) | RegisterValue::I64(_) | RegisterValue::F64(_) => 8,
            RegisterValue::Bytes8(_) => 8,
            RegisterValue::F80(_) | RegisterValue::Bytes16(_) => 16,
        }
    }
}

impl Display for RegisterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterValue::U8(v) => write!(f, "{v:#04x}"),
            RegisterValue::U16(v) => write!(f, "{v:#06x}"),
            RegisterValue::U32(v) => write!(f, "{v:#010x}"),
            RegisterValue::U64(v) => write!(f, "{v:#018x}"),
            RegisterValue::I8(v) => write!(f, "{v}"),
            RegisterValue::I16(v) => write!(f, "{v}"),
            RegisterValue::I32(v) => write!(f, "{v}"),
            RegisterValue::I64(v) => write!(f, "{v}"),
            RegisterValue::F64(v) => write!(f, "{v}"),
            RegisterValue::F80(v) => write!(f, "{}", v.to_f64()),
            RegisterValue::Bytes8(bytes) => {
                write!(f, "[")?;
                for (i, byte) in bytes.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{byte:#04x}")?;
                }
                write!(f, "]")
            }
            RegisterValue::Bytes16(bytes) => {
                write!(f, "[")?;
                for (i, byte) in bytes.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{byte:#04x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident, $expected:literal);* $(;)?) => {
        $(
            impl From<$ty> for RegisterValue {
                fn from(value: $ty) -> Self {
                    RegisterValue::$variant(value)
                }
            }

            impl TryFrom<RegisterValue> for $ty {
                type Error = Error;

                fn try_from(value: RegisterValue) -> Result<Self> {
                    match value {
                        RegisterValue::$variant(value) => Ok(value),
                        _ => Err(Error::TypeMismatch($expected)),
                    }
                }
            }
        )*
    };
}

impl_value_conversions! {
    u8 => U8, "u8";
    u16 => U16, "u16";
    u32 => U32, "u32";
    u64 => U64, "u64";
    i8 => I8, "i8";
    i16 => I16, "i16";
    i32 => I32, "i32";
    i64 => I64, "i64";
    f64 => F64, "f64";
    F80 => F80, "f80";
    [u8; 8] => Bytes8, "8 byte vector";
    [u8; 16] => Bytes16, "16 byte vector";
}

/// Spread a value into a 16-byte staging buffer according to the target
/// register format: floats are converted to the register's floating width,
/// signed integers sign-extend into unsigned-integer registers, everything
/// else is kept verbatim over zeros.
fn widen(info: &RegisterInfo, value: RegisterValue) -> [u8; 16] {
    let mut staging = [0u8; 16];

    match value {
        RegisterValue::F64(v) => match info.format {
            RegisterFormat::LongDouble => return F80::from(v).to_slot(),
            _ => staging[..8].copy_from_slice(&v.to_ne_bytes()),
        },
        RegisterValue::F80(v) => return v.to_slot(),
        RegisterValue::I8(v) => widen_signed(info, v as i64, 1, &mut staging),
        RegisterValue::I16(v) => widen_signed(info, v as i64, 2, &mut staging),
        RegisterValue::I32(v) => widen_signed(info, v as i64, 4, &mut staging),
        RegisterValue::I64(v) => staging[..8].copy_from_slice(&v.to_ne_bytes()),
        RegisterValue::U8(v) => staging[0] = v,
        RegisterValue::U16(v) => staging[..2].copy_from_slice(&v.to_ne_bytes()),
        RegisterValue::U32(v) => staging[..4].copy_from_slice(&v.to_ne_bytes()),
        RegisterValue::U64(v) => staging[..8].copy_from_slice(&v.to_ne_bytes()),
        RegisterValue::Bytes8(bytes) => staging[..8].copy_from_slice(&bytes),
        RegisterValue::Bytes16(bytes) => return bytes,
    }

    staging
}

fn widen_signed(info: &RegisterInfo, value: i64, value_size: usize, staging: &mut [u8; 16]) {
    if info.format == RegisterFormat::UnsignedInt {
        match info.size {
            2 => staging[..2].copy_from_slice(&(value as i16).to_ne_bytes()),
            4 => staging[..4].copy_from_slice(&(value as i32).to_ne_bytes()),
            8 => staging[..8].copy_from_slice(&value.to_ne_bytes()),
            _ => staging[..value_size].copy_from_slice(&value.to_ne_bytes()[..value_size]),
        }
    } else {
        staging[..value_size].copy_from_slice(&value.to_ne_bytes()[..value_size]);
    }
}

/// Byte-exact mirror of the kernel `user` area of one tracee: the general
/// purpose block, the x87/SSE save area and the eight debug registers.
///
/// The bank never talks to the kernel itself. It is refreshed in bulk by the
/// owning process on every stop and flushed by [`Process::write_register`];
/// this keeps the typed views testable without a live tracee.
///
/// [`Process::write_register`]: crate::debugger::process::Process::write_register
#[derive(Debug)]
pub struct Registers {
    pub(super) data: libc::user,
}

impl Registers {
    pub(super) fn new() -> Self {
        Self {
            // POD mirror, every bit pattern is a valid initial state.
            data: unsafe { mem::zeroed() },
        }
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe {
            slice::from_raw_parts(
                &self.data as *const libc::user as *const u8,
                mem::size_of::<libc::user>(),
            )
        }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            slice::from_raw_parts_mut(
                &mut self.data as *mut libc::user as *mut u8,
                mem::size_of::<libc::user>(),
            )
        }
    }

    /// Read a register in the representation dictated by its format and size.
    pub fn read(&self, info: &RegisterInfo) -> RegisterValue {
        let bytes = &self.as_bytes()[info.offset..];

        match (info.format, info.size) {
            (RegisterFormat::UnsignedInt, 1) => RegisterValue::U8(bytes[0]),
            (RegisterFormat::UnsignedInt, 2) => {
                RegisterValue::U16(u16::from_ne_bytes(read_array(bytes)))
            }
            (RegisterFormat::UnsignedInt, 4) => {
                RegisterValue::U32(u32::from_ne_bytes(read_array(bytes)))
            }
            (RegisterFormat::UnsignedInt, _) => {
                RegisterValue::U64(u64::from_ne_bytes(read_array(bytes)))
            }
            (RegisterFormat::DoubleFloat, _) => {
                RegisterValue::F64(f64::from_ne_bytes(read_array(bytes)))
            }
            (RegisterFormat::LongDouble, _) => {
                RegisterValue::F80(F80::from_bytes(read_array(bytes)))
            }
            (RegisterFormat::Vector, 8) => RegisterValue::Bytes8(read_array(bytes)),
            (RegisterFormat::Vector, _) => RegisterValue::Bytes16(read_array(bytes)),
        }
    }

    /// Read a register and narrow the result to `T`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` when the register's representation is not `T`.
    pub fn read_by_id<T>(&self, id: RegisterId) -> Result<T>
    where
        T: TryFrom<RegisterValue, Error = Error>,
    {
        let info = register_info_by_id(id)?;
        T::try_from(self.read(info))
    }

    /// Store a value into the mirror. Exactly `value.byte_size()` bytes of
    /// the widened value land at the register's offset; flushing the change
    /// to the tracee is the owning process's job.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` when the value is larger than the register.
    pub fn write(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()> {
        let value_size = value.byte_size();
        if value_size > info.size {
            return Err(Error::SizeMismatch {
                register_size: info.size,
                value_size,
            });
        }

        let staging = widen(info, value);
        let offset = info.offset;
        self.as_bytes_mut()[offset..offset + value_size].copy_from_slice(&staging[..value_size]);

        Ok(())
    }

    /// The 8-byte word containing `offset`, as currently held in the mirror.
    /// `PTRACE_POKEUSER` can only move aligned words, so flushes read the
    /// containing word back from here.
    pub(super) fn user_word_at(&self, aligned_offset: usize) -> u64 {
        u64::from_ne_bytes(read_array(&self.as_bytes()[aligned_offset..]))
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
