use crate::debugger::address::VirtualAddress;
use crate::debugger::process::ProcessState;
use nix::errno::Errno;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // --------------------------------- syscall errors --------------------------------------------
    #[error("{0} syscall error: {1}")]
    Syscall(&'static str, Errno),
    #[error("launch failed: {0}")]
    Launch(String),

    // --------------------------------- debugger entity not found ---------------------------------
    #[error("unknown register {0}")]
    RegisterNotFound(String),
    #[error("stoppoint not found")]
    StoppointNotFound,

    // --------------------------------- register bank errors --------------------------------------
    #[error("register value type mismatch, expected {0}")]
    TypeMismatch(&'static str),
    #[error("value of {value_size} bytes does not fit into a {register_size} byte register")]
    SizeMismatch {
        register_size: usize,
        value_size: usize,
    },

    // --------------------------------- tracee control errors -------------------------------------
    #[error("breakpoint site already exists at {0}")]
    DuplicateAddress(VirtualAddress),
    #[error("invalid pid")]
    InvalidPid,
    #[error("operation is not valid while the process is {0:?}")]
    InvalidState(ProcessState),

    // --------------------------------- disasm ----------------------------------------------------
    #[error("install disassembler: {0}")]
    DisasmInit(capstone::Error),
    #[error("instructions disassembly error: {0}")]
    Disasm(capstone::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
