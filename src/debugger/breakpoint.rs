use crate::debugger::address::VirtualAddress;
use crate::debugger::error::{Error, Result};
use nix::errno::Errno;
use nix::libc::{self, c_void};
use nix::sys;
use nix::unistd::Pid;
use std::cell::Cell;

const INT3: u64 = 0xcc;

/// A software breakpoint: an address patched with `int3` plus the byte needed
/// to take the patch back out.
///
/// Sites are owned by a [`StoppointCollection`] and identified by a strictly
/// positive id that is never reused within one process.
#[derive(Debug)]
pub struct BreakpointSite {
    id: i32,
    pid: Pid,
    address: VirtualAddress,
    enabled: Cell<bool>,
    saved_data: Cell<u8>,
}

impl BreakpointSite {
    fn new(id: i32, pid: Pid, address: VirtualAddress) -> Self {
        Self {
            id,
            pid,
            address,
            enabled: Cell::new(false),
            saved_data: Cell::new(0),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn address(&self) -> VirtualAddress {
        self.address
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn saved_data(&self) -> u8 {
        self.saved_data.get()
    }

    pub fn at_address(&self, address: VirtualAddress) -> bool {
        self.address == address
    }

    /// True when the site lies in the half-open range `[low, high)`.
    pub fn in_range(&self, low: VirtualAddress, high: VirtualAddress) -> bool {
        low <= self.address && self.address < high
    }

    /// Patch `int3` into the tracee, remembering the displaced byte.
    pub fn enable(&self) -> Result<()> {
        if self.enabled.get() {
            return Ok(());
        }

        let data = sys::ptrace::read(self.pid, self.address.as_u64() as *mut c_void)
            .map_err(|e| Error::Syscall("PTRACE_PEEKDATA", e))? as u64;
        self.saved_data.set((data & 0xff) as u8);

        let patched = (data & !0xff) | INT3;
        poke_data(self.pid, self.address, patched)?;
        self.enabled.set(true);

        Ok(())
    }

    /// Restore the original byte.
    pub fn disable(&self) -> Result<()> {
        if !self.enabled.get() {
            return Ok(());
        }

        let data = sys::ptrace::read(self.pid, self.address.as_u64() as *mut c_void)
            .map_err(|e| Error::Syscall("PTRACE_PEEKDATA", e))? as u64;
        let restored = (data & !0xff) | self.saved_data.get() as u64;
        poke_data(self.pid, self.address, restored)?;
        self.enabled.set(false);

        Ok(())
    }
}

fn poke_data(pid: Pid, address: VirtualAddress, word: u64) -> Result<()> {
    let result = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEDATA,
            pid.as_raw(),
            address.as_u64() as *mut c_void,
            word as *mut c_void,
        )
    };
    if result < 0 {
        return Err(Error::Syscall("PTRACE_POKEDATA", Errno::last()));
    }
    Ok(())
}

/// Insertion-ordered set of breakpoint sites with id and address indexes.
#[derive(Debug)]
pub struct StoppointCollection {
    stoppoints: Vec<BreakpointSite>,
    next_id: i32,
}

impl StoppointCollection {
    pub(super) fn new() -> Self {
        Self {
            stoppoints: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a new (disabled) site.
    ///
    /// # Errors
    ///
    /// `DuplicateAddress` if a site already exists at `address`.
    pub(super) fn add(&mut self, pid: Pid, address: VirtualAddress) -> Result<&BreakpointSite> {
        if self.contains_address(address) {
            return Err(Error::DuplicateAddress(address));
        }

        self.next_id += 1;
        self.stoppoints
            .push(BreakpointSite::new(self.next_id, pid, address));

        Ok(&self.stoppoints[self.stoppoints.len() - 1])
    }

    pub fn contains_id(&self, id: i32) -> bool {
        self.stoppoints.iter().any(|site| site.id == id)
    }

    pub fn contains_address(&self, address: VirtualAddress) -> bool {
        self.stoppoints.iter().any(|site| site.at_address(address))
    }

    pub fn enabled_stoppoint_at_address(&self, address: VirtualAddress) -> bool {
        self.get_by_address(address)
            .map(|site| site.is_enabled())
            .unwrap_or(false)
    }

    pub fn get_by_id(&self, id: i32) -> Result<&BreakpointSite> {
        self.stoppoints
            .iter()
            .find(|site| site.id == id)
            .ok_or(Error::StoppointNotFound)
    }

    pub fn get_by_address(&self, address: VirtualAddress) -> Result<&BreakpointSite> {
        self.stoppoints
            .iter()
            .find(|site| site.at_address(address))
            .ok_or(Error::StoppointNotFound)
    }

    /// Remove a site, restoring the tracee byte first.
    pub fn remove_by_id(&mut self, id: i32) -> Result<()> {
        let index = self
            .stoppoints
            .iter()
            .position(|site| site.id == id)
            .ok_or(Error::StoppointNotFound)?;
        self.stoppoints[index].disable()?;
        self.stoppoints.remove(index);
        Ok(())
    }

    /// Remove the site at `address`, restoring the tracee byte first.
    pub fn remove_by_address(&mut self, address: VirtualAddress) -> Result<()> {
        let index = self
            .stoppoints
            .iter()
            .position(|site| site.at_address(address))
            .ok_or(Error::StoppointNotFound)?;
        self.stoppoints[index].disable()?;
        self.stoppoints.remove(index);
        Ok(())
    }

    /// Sites whose address falls in the half-open range `[low, high)`.
    pub fn get_in_region(&self, low: VirtualAddress, high: VirtualAddress) -> Vec<&BreakpointSite> {
        self.stoppoints
            .iter()
            .filter(|site| site.in_range(low, high))
            .collect()
    }

    /// Iterate sites in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointSite> {
        self.stoppoints.iter()
    }

    pub fn len(&self) -> usize {
        self.stoppoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stoppoints.is_empty()
    }
}
