use crate::debugger::address::VirtualAddress;
use crate::debugger::breakpoint::{BreakpointSite, StoppointCollection};
use crate::debugger::error::{Error, Result};
use crate::debugger::register::info::{
    register_info_by_id, RegisterCategory, RegisterId, RegisterInfo, DEBUG_REGISTER_IDS,
};
use crate::debugger::register::{RegisterValue, Registers};
use log::debug;
use nix::errno::Errno;
use nix::libc::{self, c_void};
use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{dup2, execvp, fork, ForkResult, Pid};
use os_pipe::PipeWriter;
use std::ffi::CString;
use std::io::{IoSliceMut, Read, Write};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::{process, ptr};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessState {
    Stopped,
    Running,
    Exited,
    Terminated,
}

/// Why the tracee stopped being [`ProcessState::Running`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StopReason {
    pub reason: ProcessState,
    /// Exit code for `Exited`, terminating signal for `Terminated`, stop
    /// signal for `Stopped`.
    pub info: u8,
}

impl StopReason {
    fn from_wait_status(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => StopReason {
                reason: ProcessState::Exited,
                info: code as u8,
            },
            WaitStatus::Signaled(_, signal, _) => StopReason {
                reason: ProcessState::Terminated,
                info: signal as u8,
            },
            WaitStatus::Stopped(_, signal) => StopReason {
                reason: ProcessState::Stopped,
                info: signal as u8,
            },
            WaitStatus::PtraceEvent(_, signal, _) => StopReason {
                reason: ProcessState::Stopped,
                info: signal as u8,
            },
            WaitStatus::PtraceSyscall(_) => StopReason {
                reason: ProcessState::Stopped,
                info: Signal::SIGTRAP as u8,
            },
            // Only possible with WNOHANG/WCONTINUED, which are never passed.
            WaitStatus::StillAlive | WaitStatus::Continued(_) => StopReason {
                reason: ProcessState::Running,
                info: 0,
            },
        }
    }
}

/// One traced process: its lifecycle state, register bank and breakpoint
/// sites. The only component that issues syscalls against the tracee.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    terminate_on_end: bool,
    is_attached: bool,
    state: ProcessState,
    registers: Registers,
    breakpoint_sites: StoppointCollection,
}

impl Process {
    /// Fork and execute `path` under trace.
    ///
    /// The child reports bootstrap failures over a close-on-exec pipe; a
    /// successful `execvp` closes the write end and the parent reads EOF.
    /// With `attach = false` the child runs free (the debugger can attach by
    /// pid later). `stdout_replacement` is installed as the child's fd 1.
    ///
    /// # Errors
    ///
    /// `Launch` with the child's message when any bootstrap step fails,
    /// `Syscall` when fork itself does.
    pub fn launch(path: &Path, attach: bool, stdout_replacement: Option<RawFd>) -> Result<Self> {
        // The pipe must exist on both sides of the fork.
        let (mut reader, writer) = os_pipe::pipe()?;

        debug!(target: "process", "launch {}", path.display());
        match unsafe { fork() }.map_err(|e| Error::Syscall("fork", e))? {
            ForkResult::Child => {
                drop(reader);
                execute_debugee(path, attach, stdout_replacement, writer)
            }
            ForkResult::Parent { child } => {
                drop(writer);
                let mut message = Vec::new();
                reader.read_to_end(&mut message)?;

                if !message.is_empty() {
                    let _ = waitpid(child, None);
                    return Err(Error::Launch(String::from_utf8_lossy(&message).into_owned()));
                }

                let mut proc = Process {
                    pid: child,
                    terminate_on_end: true,
                    is_attached: attach,
                    state: ProcessState::Stopped,
                    registers: Registers::new(),
                    breakpoint_sites: StoppointCollection::new(),
                };

                if attach {
                    // Consume the stop the initial exec delivers.
                    proc.wait_on_signal()?;
                }

                Ok(proc)
            }
        }
    }

    /// Attach to an already running process and wait for it to stop.
    ///
    /// # Errors
    ///
    /// `InvalidPid` for pid 0, `Syscall` when the kernel refuses the attach.
    pub fn attach(pid: Pid) -> Result<Self> {
        if pid.as_raw() == 0 {
            return Err(Error::InvalidPid);
        }

        debug!(target: "process", "attach to {pid}");
        ptrace::attach(pid).map_err(|e| Error::Syscall("PTRACE_ATTACH", e))?;

        let mut proc = Process {
            pid,
            terminate_on_end: false,
            is_attached: true,
            state: ProcessState::Stopped,
            registers: Registers::new(),
            breakpoint_sites: StoppointCollection::new(),
        };
        proc.wait_on_signal()?;

        Ok(proc)
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn breakpoint_sites(&self) -> &StoppointCollection {
        &self.breakpoint_sites
    }

    pub fn breakpoint_sites_mut(&mut self) -> &mut StoppointCollection {
        &mut self.breakpoint_sites
    }

    /// Continue the tracee. An enabled breakpoint under the program counter
    /// is stepped over first: its byte is restored, one instruction executes,
    /// the trap goes back in.
    pub fn resume(&mut self) -> Result<()> {
        self.ensure_stopped()?;

        let pc = self.get_pc()?;
        if self.breakpoint_sites.enabled_stoppoint_at_address(pc) {
            let site = self.breakpoint_sites.get_by_address(pc)?;
            site.disable()?;
            ptrace::step(self.pid, None).map_err(|e| Error::Syscall("PTRACE_SINGLESTEP", e))?;
            // Plain waitpid on purpose: the step must complete without
            // updating observable state.
            waitpid(self.pid, None).map_err(|e| Error::Syscall("waitpid", e))?;
            site.enable()?;
        }

        debug!(target: "process", "continue {pid}", pid = self.pid);
        ptrace::cont(self.pid, None).map_err(|e| Error::Syscall("PTRACE_CONT", e))?;
        self.state = ProcessState::Running;

        Ok(())
    }

    /// Block until the tracee changes state and decode why.
    ///
    /// On an attached stop the register mirror is refreshed, and when the
    /// stop is a `SIGTRAP` with an enabled site at `pc - 1` the program
    /// counter is rewound onto the site (`int3` traps after executing).
    pub fn wait_on_signal(&mut self) -> Result<StopReason> {
        let status = waitpid(self.pid, None).map_err(|e| Error::Syscall("waitpid", e))?;
        let reason = StopReason::from_wait_status(status);
        self.state = reason.reason;
        debug!(target: "process", "tracee {pid} now {reason:?}", pid = self.pid);

        if self.is_attached && self.state == ProcessState::Stopped {
            self.read_all_registers()?;

            let instruction_begin = self.get_pc()? - 1;
            if reason.info == Signal::SIGTRAP as u8
                && self
                    .breakpoint_sites
                    .enabled_stoppoint_at_address(instruction_begin)
            {
                self.set_pc(instruction_begin)?;
            }
        }

        Ok(reason)
    }

    /// Execute exactly one instruction, transparently lifting an enabled
    /// breakpoint under the program counter for the duration of the step.
    pub fn step_instruction(&mut self) -> Result<StopReason> {
        self.ensure_stopped()?;

        let pc = self.get_pc()?;
        let mut stepped_over = None;
        if self.breakpoint_sites.enabled_stoppoint_at_address(pc) {
            let site = self.breakpoint_sites.get_by_address(pc)?;
            site.disable()?;
            stepped_over = Some(pc);
        }

        ptrace::step(self.pid, None).map_err(|e| Error::Syscall("PTRACE_SINGLESTEP", e))?;
        let reason = self.wait_on_signal()?;

        if let Some(address) = stepped_over {
            self.breakpoint_sites.get_by_address(address)?.enable()?;
        }

        Ok(reason)
    }

    /// Register a breakpoint site at `address`. The new site starts disabled.
    ///
    /// # Errors
    ///
    /// `DuplicateAddress` if a site already exists there.
    pub fn create_breakpoint_site(&mut self, address: VirtualAddress) -> Result<&BreakpointSite> {
        self.ensure_stopped()?;
        self.breakpoint_sites.add(self.pid, address)
    }

    /// Read `amount` bytes of tracee memory in one `process_vm_readv` call.
    /// The result is truncated to what the kernel could actually read.
    pub fn read_memory(&self, address: VirtualAddress, amount: usize) -> Result<Vec<u8>> {
        self.ensure_stopped()?;

        let mut buffer = vec![0u8; amount];
        let remote = RemoteIoVec {
            base: address.as_usize(),
            len: amount,
        };
        let read = process_vm_readv(self.pid, &mut [IoSliceMut::new(&mut buffer)], &[remote])
            .map_err(|e| Error::Syscall("process_vm_readv", e))?;
        buffer.truncate(read);

        Ok(buffer)
    }

    /// [`read_memory`](Self::read_memory), with the bytes displaced by
    /// enabled breakpoints put back so callers never observe `0xcc` patches.
    pub fn read_memory_without_traps(
        &self,
        address: VirtualAddress,
        amount: usize,
    ) -> Result<Vec<u8>> {
        let mut memory = self.read_memory(address, amount)?;

        let end = address + memory.len() as i64;
        for site in self.breakpoint_sites.get_in_region(address, end) {
            if !site.is_enabled() {
                continue;
            }
            let offset = (site.address().as_u64() - address.as_u64()) as usize;
            memory[offset] = site.saved_data();
        }

        Ok(memory)
    }

    /// Write `data` into tracee memory in 8-byte `PTRACE_POKEDATA` strides.
    /// The trailing partial word is read back first and overlaid so bytes
    /// past the end of `data` survive.
    pub fn write_memory(&mut self, address: VirtualAddress, data: &[u8]) -> Result<()> {
        self.ensure_stopped()?;

        let mut written = 0;
        while written < data.len() {
            let remaining = data.len() - written;
            let word = if remaining >= 8 {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data[written..written + 8]);
                u64::from_ne_bytes(bytes)
            } else {
                let read = self.read_memory(address + written as i64, 8)?;
                let mut bytes = [0u8; 8];
                bytes[..remaining].copy_from_slice(&data[written..]);
                bytes[remaining..].copy_from_slice(&read[remaining..]);
                u64::from_ne_bytes(bytes)
            };

            self.poke_data(address + written as i64, word)?;
            written += 8;
        }

        Ok(())
    }

    /// Read a register from the mirror refreshed at the last stop.
    pub fn read_register(&self, info: &RegisterInfo) -> Result<RegisterValue> {
        self.ensure_stopped()?;
        Ok(self.registers.read(info))
    }

    /// Write a register: stage the value in the mirror, then push it to the
    /// tracee. FPRs go out as the whole x87/SSE block via `PTRACE_SETFPREGS`;
    /// everything else as the 8-byte-aligned containing word via
    /// `PTRACE_POKEUSER` (the request only accepts aligned offsets, and the
    /// word around the register was refreshed at the last stop).
    pub fn write_register(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()> {
        self.ensure_stopped()?;
        self.registers.write(info, value)?;

        if info.category == RegisterCategory::Fpr {
            self.write_fprs()
        } else {
            let aligned_offset = info.offset & !0b111;
            self.write_user_area(aligned_offset, self.registers.user_word_at(aligned_offset))
        }
    }

    pub fn write_register_by_id(&mut self, id: RegisterId, value: RegisterValue) -> Result<()> {
        let info = register_info_by_id(id)?;
        self.write_register(info, value)
    }

    /// Current program counter, as of the last stop.
    pub fn get_pc(&self) -> Result<VirtualAddress> {
        self.ensure_stopped()?;
        let pc: u64 = self.registers.read_by_id(RegisterId::Rip)?;
        Ok(VirtualAddress::from(pc))
    }

    pub fn set_pc(&mut self, address: VirtualAddress) -> Result<()> {
        self.write_register_by_id(RegisterId::Rip, RegisterValue::U64(address.as_u64()))
    }

    fn ensure_stopped(&self) -> Result<()> {
        if self.state != ProcessState::Stopped {
            return Err(Error::InvalidState(self.state));
        }
        Ok(())
    }

    /// Refresh the whole mirror from the tracee: GPR block, x87/SSE block and
    /// the eight debug registers.
    fn read_all_registers(&mut self) -> Result<()> {
        let regs = ptrace::getregs(self.pid).map_err(|e| Error::Syscall("PTRACE_GETREGS", e))?;
        self.registers.data.regs = regs;

        let result = unsafe {
            libc::ptrace(
                libc::PTRACE_GETFPREGS,
                self.pid.as_raw(),
                ptr::null_mut::<c_void>(),
                &mut self.registers.data.i387 as *mut _ as *mut c_void,
            )
        };
        if result < 0 {
            return Err(Error::Syscall("PTRACE_GETFPREGS", Errno::last()));
        }

        for (index, id) in DEBUG_REGISTER_IDS.iter().enumerate() {
            let info = register_info_by_id(*id)?;

            // PEEKUSER returns the word in-band, so errno alone separates a
            // -1 register value from a failure.
            Errno::clear();
            let data = unsafe {
                libc::ptrace(
                    libc::PTRACE_PEEKUSER,
                    self.pid.as_raw(),
                    info.offset,
                    ptr::null_mut::<c_void>(),
                )
            };
            if data == -1 && Errno::last_raw() != 0 {
                return Err(Error::Syscall("PTRACE_PEEKUSER", Errno::last()));
            }

            self.registers.data.u_debugreg[index] = data as u64;
        }

        Ok(())
    }

    fn write_user_area(&self, offset: usize, word: u64) -> Result<()> {
        let result = unsafe {
            libc::ptrace(
                libc::PTRACE_POKEUSER,
                self.pid.as_raw(),
                offset,
                word as *mut c_void,
            )
        };
        if result < 0 {
            return Err(Error::Syscall("PTRACE_POKEUSER", Errno::last()));
        }
        Ok(())
    }

    fn write_fprs(&self) -> Result<()> {
        let result = unsafe {
            libc::ptrace(
                libc::PTRACE_SETFPREGS,
                self.pid.as_raw(),
                ptr::null_mut::<c_void>(),
                &self.registers.data.i387 as *const _ as *mut c_void,
            )
        };
        if result < 0 {
            return Err(Error::Syscall("PTRACE_SETFPREGS", Errno::last()));
        }
        Ok(())
    }

    fn poke_data(&self, address: VirtualAddress, word: u64) -> Result<()> {
        let result = unsafe {
            libc::ptrace(
                libc::PTRACE_POKEDATA,
                self.pid.as_raw(),
                address.as_u64() as *mut c_void,
                word as *mut c_void,
            )
        };
        if result < 0 {
            return Err(Error::Syscall("PTRACE_POKEDATA", Errno::last()));
        }
        Ok(())
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.pid.as_raw() == 0 {
            return;
        }

        debug!(target: "process", "drop tracee {pid}", pid = self.pid);
        if self.is_attached {
            // Detaching requires a stopped tracee.
            if self.state == ProcessState::Running {
                let _ = kill(self.pid, Signal::SIGSTOP);
                let _ = waitpid(self.pid, None);
            }
            let _ = ptrace::detach(self.pid, None);
            let _ = kill(self.pid, Signal::SIGCONT);
        }

        if self.terminate_on_end {
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

/// Child side of [`Process::launch`]; never returns.
fn execute_debugee(
    path: &Path,
    attach: bool,
    stdout_replacement: Option<RawFd>,
    channel: PipeWriter,
) -> ! {
    if let Err(errno) = personality::set(Persona::ADDR_NO_RANDOMIZE) {
        exit_with_errno(channel, "Disabling ASLR failed", errno);
    }

    if let Some(fd) = stdout_replacement {
        if let Err(errno) = dup2(fd, libc::STDOUT_FILENO) {
            exit_with_errno(channel, "Failed to replace stdout", errno);
        }
    }

    if attach {
        if let Err(errno) = ptrace::traceme() {
            exit_with_errno(channel, "Tracing failed", errno);
        }
    }

    let program = match CString::new(path.as_os_str().as_bytes()) {
        Ok(program) => program,
        Err(_) => exit_with_errno(channel, "Exec failed", Errno::EINVAL),
    };
    let errno = match execvp(&program, &[program.as_c_str()]) {
        Err(errno) => errno,
        Ok(infallible) => match infallible {},
    };
    exit_with_errno(channel, "Exec failed", errno)
}

fn exit_with_errno(mut channel: PipeWriter, prefix: &str, errno: Errno) -> ! {
    let _ = write!(channel, "{prefix}: {}", errno.desc());
    process::exit(-1)
}
