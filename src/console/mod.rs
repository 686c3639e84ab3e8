mod help;

use crate::debugger::address::VirtualAddress;
use crate::debugger::disasm::Disassembler;
use crate::debugger::process::{Process, ProcessState, StopReason};
use crate::debugger::register::f80::F80;
use crate::debugger::register::info::{
    register_info_by_name, RegisterCategory, RegisterFormat, RegisterInfo, REGISTER_INFOS,
};
use crate::debugger::register::RegisterValue;
use anyhow::{anyhow, bail};
use nix::sys::signal::Signal;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PROMPT: &str = "bugtrap> ";
const DISASSEMBLE_AFTER_STOP: usize = 5;

/// Interactive command loop around one traced process.
pub struct Console {
    process: Process,
    disassembler: Disassembler,
}

impl Console {
    pub fn new(process: Process) -> anyhow::Result<Self> {
        Ok(Self {
            process,
            disassembler: Disassembler::new()?,
        })
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let mut editor = DefaultEditor::new()?;

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);

                    if matches!(line, "q" | "quit") {
                        break;
                    }
                    if let Err(e) = self.handle_command(line) {
                        println!("bugtrap error: {e:#}");
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    println!("bugtrap error: {e}");
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_command(&mut self, line: &str) -> anyhow::Result<()> {
        let args: Vec<&str> = line.split_whitespace().collect();

        match args[0] {
            "c" | "continue" => {
                self.process.resume()?;
                let reason = self.process.wait_on_signal()?;
                self.report_stop(reason)?;
            }
            "s" | "step" => {
                let reason = self.process.step_instruction()?;
                self.report_stop(reason)?;
            }
            "r" | "register" => self.handle_register(&args)?,
            "m" | "memory" => self.handle_memory(&args)?,
            "b" | "breakpoint" => self.handle_breakpoint(&args)?,
            "d" | "disassemble" => {
                let count = match args.get(1) {
                    Some(count) => count.parse()?,
                    None => DISASSEMBLE_AFTER_STOP,
                };
                let address = args.get(2).map(|text| parse_address(text)).transpose()?;
                self.print_disassembly(count, address)?;
            }
            "help" => println!("{}", help::text(args.get(1).copied())),
            _ => bail!("unknown command (try `help`)"),
        }

        Ok(())
    }

    fn handle_register(&mut self, args: &[&str]) -> anyhow::Result<()> {
        match args.get(1) {
            Some(&"read") => match args.get(2) {
                Some(name) => {
                    let info = register_info_by_name(name)?;
                    println!("{:10}{}", info.name, self.process.read_register(info)?);
                }
                None => {
                    for info in REGISTER_INFOS
                        .iter()
                        .filter(|info| info.category == RegisterCategory::Gpr)
                    {
                        println!("{:10}{}", info.name, self.process.read_register(info)?);
                    }
                }
            },
            Some(&"write") => {
                let (name, text) = match (args.get(2), args.get(3)) {
                    (Some(name), Some(text)) => (name, text),
                    _ => bail!("usage: register write <name> <value>"),
                };
                let info = register_info_by_name(name)?;
                let value = parse_register_value(info, text)?;
                self.process.write_register(info, value)?;
            }
            _ => bail!("usage: register read [name] | register write <name> <value>"),
        }
        Ok(())
    }

    fn handle_memory(&mut self, args: &[&str]) -> anyhow::Result<()> {
        match args.get(1) {
            Some(&"read") => {
                let address = parse_address(args.get(2).ok_or_else(usage_memory)?)?;
                let amount = match args.get(3) {
                    Some(amount) => amount.parse()?,
                    None => 32,
                };
                let memory = self.process.read_memory(address, amount)?;
                for (row, chunk) in memory.chunks(8).enumerate() {
                    let bytes: Vec<String> =
                        chunk.iter().map(|byte| format!("{byte:02x}")).collect();
                    println!("{}: {}", address + (row * 8) as i64, bytes.join(" "));
                }
            }
            Some(&"write") => {
                let address = parse_address(args.get(2).ok_or_else(usage_memory)?)?;
                if args.len() < 4 {
                    bail!(usage_memory());
                }
                let data: Vec<u8> = args[3..]
                    .iter()
                    .map(|byte| parse_byte(byte))
                    .collect::<anyhow::Result<_>>()?;
                self.process.write_memory(address, &data)?;
            }
            _ => bail!(usage_memory()),
        }
        Ok(())
    }

    fn handle_breakpoint(&mut self, args: &[&str]) -> anyhow::Result<()> {
        let usage = || anyhow!("usage: breakpoint set <address> | list | enable|disable|delete <id>");

        match args.get(1) {
            Some(&"set") => {
                let address = parse_address(args.get(2).ok_or_else(usage)?)?;
                let id = {
                    let site = self.process.create_breakpoint_site(address)?;
                    site.enable()?;
                    site.id()
                };
                println!("breakpoint {id} set at {address}");
            }
            Some(&"list") => {
                if self.process.breakpoint_sites().is_empty() {
                    println!("no breakpoints set");
                }
                for site in self.process.breakpoint_sites().iter() {
                    println!(
                        "{}: address = {}, {}",
                        site.id(),
                        site.address(),
                        if site.is_enabled() { "enabled" } else { "disabled" }
                    );
                }
            }
            Some(&"enable") => {
                let id = parse_id(args.get(2).ok_or_else(usage)?)?;
                self.process.breakpoint_sites().get_by_id(id)?.enable()?;
            }
            Some(&"disable") => {
                let id = parse_id(args.get(2).ok_or_else(usage)?)?;
                self.process.breakpoint_sites().get_by_id(id)?.disable()?;
            }
            Some(&"delete") => {
                let id = parse_id(args.get(2).ok_or_else(usage)?)?;
                self.process.breakpoint_sites_mut().remove_by_id(id)?;
            }
            _ => bail!(usage()),
        }
        Ok(())
    }

    fn report_stop(&self, reason: StopReason) -> anyhow::Result<()> {
        let pid = self.process.pid();
        match reason.reason {
            ProcessState::Exited => {
                println!("Process {pid} exited with status {}", reason.info);
            }
            ProcessState::Terminated => {
                println!(
                    "Process {pid} terminated with signal {}",
                    signal_name(reason.info)
                );
            }
            ProcessState::Stopped => {
                println!(
                    "Process {pid} stopped with signal {} at {}",
                    signal_name(reason.info),
                    self.process.get_pc()?
                );
                self.print_disassembly(DISASSEMBLE_AFTER_STOP, None)?;
            }
            ProcessState::Running => {}
        }
        Ok(())
    }

    fn print_disassembly(
        &self,
        count: usize,
        address: Option<VirtualAddress>,
    ) -> anyhow::Result<()> {
        let instructions = self.disassembler.disassemble(&self.process, count, address)?;
        for instruction in instructions {
            println!("{}: {}", instruction.address, instruction.text);
        }
        Ok(())
    }
}

fn usage_memory() -> anyhow::Error {
    anyhow!("usage: memory read <address> [bytes] | memory write <address> <byte>...")
}

fn signal_name(signal: u8) -> String {
    Signal::try_from(signal as i32)
        .map(|signal| signal.to_string())
        .unwrap_or_else(|_| format!("{signal}"))
}

fn parse_address(text: &str) -> anyhow::Result<VirtualAddress> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let address = u64::from_str_radix(digits, 16)
        .map_err(|_| anyhow!("expected a hexadecimal address, got `{text}`"))?;
    Ok(VirtualAddress::from(address))
}

fn parse_byte(text: &str) -> anyhow::Result<u8> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u8::from_str_radix(digits, 16).map_err(|_| anyhow!("expected a byte value, got `{text}`"))
}

fn parse_id(text: &str) -> anyhow::Result<i32> {
    text.parse()
        .map_err(|_| anyhow!("expected a stoppoint id, got `{text}`"))
}

fn parse_register_value(info: &RegisterInfo, text: &str) -> anyhow::Result<RegisterValue> {
    let value = match info.format {
        RegisterFormat::UnsignedInt => {
            let digits = text.strip_prefix("0x").unwrap_or(text);
            let wide = u64::from_str_radix(digits, 16)
                .or_else(|_| text.parse())
                .map_err(|_| anyhow!("expected an integer value, got `{text}`"))?;
            match info.size {
                1 => RegisterValue::U8(wide as u8),
                2 => RegisterValue::U16(wide as u16),
                4 => RegisterValue::U32(wide as u32),
                _ => RegisterValue::U64(wide),
            }
        }
        RegisterFormat::DoubleFloat => RegisterValue::F64(text.parse()?),
        RegisterFormat::LongDouble => RegisterValue::F80(F80::from(text.parse::<f64>()?)),
        RegisterFormat::Vector => {
            let bytes: Vec<u8> = text
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(parse_byte)
                .collect::<anyhow::Result<_>>()?;
            match info.size {
                8 => RegisterValue::Bytes8(
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| anyhow!("expected 8 bytes"))?,
                ),
                _ => RegisterValue::Bytes16(
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| anyhow!("expected 16 bytes"))?,
                ),
            }
        }
    };
    Ok(value)
}
