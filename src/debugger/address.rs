use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Address in the tracee virtual address space.
///
/// Kept opaque so raw integers never masquerade as addresses; conversions are
/// always explicit.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Default, PartialOrd, Ord)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline(always)]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Move the address by a signed offset, wrapping on overflow.
    #[inline(always)]
    pub fn offset(self, offset: i64) -> VirtualAddress {
        VirtualAddress(self.0.wrapping_add_signed(offset))
    }
}

impl From<u64> for VirtualAddress {
    fn from(addr: u64) -> Self {
        VirtualAddress(addr)
    }
}

impl From<usize> for VirtualAddress {
    fn from(addr: usize) -> Self {
        VirtualAddress(addr as u64)
    }
}

impl From<VirtualAddress> for u64 {
    fn from(addr: VirtualAddress) -> Self {
        addr.0
    }
}

impl From<VirtualAddress> for usize {
    fn from(addr: VirtualAddress) -> Self {
        addr.0 as usize
    }
}

impl Add<i64> for VirtualAddress {
    type Output = VirtualAddress;

    fn add(self, offset: i64) -> Self::Output {
        self.offset(offset)
    }
}

impl AddAssign<i64> for VirtualAddress {
    fn add_assign(&mut self, offset: i64) {
        *self = self.offset(offset);
    }
}

impl Sub<i64> for VirtualAddress {
    type Output = VirtualAddress;

    fn sub(self, offset: i64) -> Self::Output {
        self.offset(offset.wrapping_neg())
    }
}

impl SubAssign<i64> for VirtualAddress {
    fn sub_assign(&mut self, offset: i64) {
        *self = *self - offset;
    }
}

impl Display for VirtualAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#016x}", self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_arithmetic() {
        let addr = VirtualAddress::from(0x1000u64);
        assert_eq!(addr + 8, VirtualAddress::from(0x1008u64));
        assert_eq!(addr - 1, VirtualAddress::from(0xfffu64));
        assert_eq!(addr + (-16), VirtualAddress::from(0xff0u64));

        let mut addr = addr;
        addr += 0x10;
        addr -= 0x8;
        assert_eq!(addr, VirtualAddress::from(0x1008u64));
    }

    #[test]
    fn offset_wraps() {
        let addr = VirtualAddress::from(0u64);
        assert_eq!(addr - 1, VirtualAddress::from(u64::MAX));
        assert_eq!(VirtualAddress::from(u64::MAX) + 1, addr);
    }

    #[test]
    fn ordering() {
        let low = VirtualAddress::from(42u64);
        let high = VirtualAddress::from(45u64);
        assert!(low < high);
        assert!(high >= low);
        assert_eq!(low, VirtualAddress::from(42u64));
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(
            VirtualAddress::from(0xcafeu64).to_string(),
            "0x0000000000cafe"
        );
    }
}
