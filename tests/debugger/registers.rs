use crate::common;
use bugtrap::debugger::error::Error;
use bugtrap::debugger::process::ProcessState;
use bugtrap::debugger::register::f80::F80;
use bugtrap::debugger::register::info::{
    register_info_by_name, RegisterId, DEBUG_REGISTER_IDS,
};
use bugtrap::debugger::register::RegisterValue;
use nix::sys::ptrace;
use serial_test::serial;

#[test]
#[serial]
fn gpr_write_reaches_the_tracee() {
    let mut proc = common::launch_attached("yes");
    let r13 = register_info_by_name("r13").unwrap();
    proc.write_register(r13, RegisterValue::U64(0xcafe_cafe))
        .unwrap();

    let regs = ptrace::getregs(proc.pid()).unwrap();
    assert_eq!(regs.r13, 0xcafe_cafe);
}

#[test]
#[serial]
fn subregister_write_touches_only_its_bytes() {
    let mut proc = common::launch_attached("yes");
    proc.write_register_by_id(RegisterId::R13, RegisterValue::U64(0xdead_beef_dead_beef))
        .unwrap();
    proc.write_register_by_id(RegisterId::R13b, RegisterValue::U8(42))
        .unwrap();

    let regs = ptrace::getregs(proc.pid()).unwrap();
    assert_eq!(regs.r13, 0xdead_beef_dead_be2a);
}

#[test]
#[serial]
fn xmm_write_survives_a_step() {
    let mut proc = common::launch_attached("yes");
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&42.42f64.to_ne_bytes());
    proc.write_register_by_id(RegisterId::Xmm0, RegisterValue::Bytes16(bytes))
        .unwrap();

    proc.step_instruction().unwrap();
    assert_eq!(
        proc.registers()
            .read_by_id::<[u8; 16]>(RegisterId::Xmm0)
            .unwrap(),
        bytes
    );
}

#[test]
#[serial]
fn mm_write_survives_a_step() {
    let mut proc = common::launch_attached("yes");
    let bytes = 0xba5e_ba11u64.to_ne_bytes();
    proc.write_register_by_id(RegisterId::Mm0, RegisterValue::Bytes8(bytes))
        .unwrap();

    proc.step_instruction().unwrap();
    assert_eq!(
        proc.registers()
            .read_by_id::<[u8; 8]>(RegisterId::Mm0)
            .unwrap(),
        bytes
    );
}

#[test]
#[serial]
fn st0_write_survives_a_step() {
    let mut proc = common::launch_attached("yes");
    proc.write_register_by_id(RegisterId::St0, RegisterValue::F80(F80::from(64.125)))
        .unwrap();
    // Mark the x87 stack as holding one valid value in st0: top of stack at
    // slot 7 in the status word, tag word declaring slot 0 valid.
    proc.write_register_by_id(RegisterId::Fsw, RegisterValue::U16(0b0011_1000_0000_0000))
        .unwrap();
    proc.write_register_by_id(RegisterId::Ftw, RegisterValue::U16(0b0011_1111_1111_1111))
        .unwrap();

    proc.step_instruction().unwrap();
    let st0: F80 = proc.registers().read_by_id(RegisterId::St0).unwrap();
    assert_eq!(st0.to_f64(), 64.125);
    assert_eq!(
        proc.registers().read_by_id::<u16>(RegisterId::Fsw).unwrap(),
        0b0011_1000_0000_0000
    );
}

#[test]
#[serial]
fn debug_registers_are_refreshed_on_stop() {
    // A fresh tracee owns no hardware breakpoints, so the PEEKUSER refresh
    // must have seen empty debug registers.
    let proc = common::launch_attached("yes");
    for id in DEBUG_REGISTER_IDS {
        assert_eq!(proc.registers().read_by_id::<u64>(id).unwrap(), 0);
    }
}

#[test]
#[serial]
fn rip_mirror_matches_the_kernel() {
    let proc = common::launch_attached("yes");
    let regs = ptrace::getregs(proc.pid()).unwrap();
    assert_eq!(proc.get_pc().unwrap().as_u64(), regs.rip);
}

#[test]
#[serial]
fn writes_are_rejected_while_running() {
    let mut proc = common::launch_attached("yes");
    proc.resume().unwrap();
    let err = proc
        .write_register_by_id(RegisterId::R13, RegisterValue::U64(1))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(ProcessState::Running)));
}
