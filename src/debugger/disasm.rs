use crate::debugger::address::VirtualAddress;
use crate::debugger::error::{Error, Result};
use crate::debugger::process::Process;
use capstone::prelude::*;

// No x86-64 instruction is longer than this.
const MAX_INSTRUCTION_SIZE: usize = 15;

/// Single decoded instruction.
pub struct Instruction {
    pub address: VirtualAddress,
    pub text: String,
}

/// Thin wrapper over the capstone decoder. Reads code through
/// [`Process::read_memory_without_traps`] so patched-in trap bytes are never
/// decoded.
pub struct Disassembler {
    cs: Capstone,
}

impl Disassembler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            cs: Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .syntax(arch::x86::ArchSyntax::Att)
                .build()
                .map_err(Error::DisasmInit)?,
        })
    }

    /// Decode up to `count` instructions starting at `address` (the current
    /// program counter when `None`).
    pub fn disassemble(
        &self,
        process: &Process,
        count: usize,
        address: Option<VirtualAddress>,
    ) -> Result<Vec<Instruction>> {
        let address = match address {
            Some(address) => address,
            None => process.get_pc()?,
        };

        let code = process.read_memory_without_traps(address, count * MAX_INSTRUCTION_SIZE)?;
        let instructions = self
            .cs
            .disasm_count(&code, address.as_u64(), count)
            .map_err(Error::Disasm)?;

        Ok(instructions
            .iter()
            .map(|instruction| Instruction {
                address: VirtualAddress::from(instruction.address()),
                text: match (instruction.mnemonic(), instruction.op_str()) {
                    (Some(mnemonic), Some("")) | (Some(mnemonic), None) => mnemonic.to_string(),
                    (Some(mnemonic), Some(operands)) => format!("{mnemonic} {operands}"),
                    _ => String::new(),
                },
            })
            .collect())
    }
}
