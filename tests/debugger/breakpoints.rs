use crate::common;
use bugtrap::debugger::disasm::Disassembler;
use bugtrap::debugger::error::Error;
use bugtrap::debugger::process::ProcessState;
use nix::sys::signal::Signal;
use serial_test::serial;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn enable_and_disable_restore_the_original_byte() {
    let mut proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    let original = proc.read_memory(pc, 1).unwrap()[0];

    {
        let site = proc.create_breakpoint_site(pc).unwrap();
        site.enable().unwrap();
        // Enabling twice is a no-op, not a double patch.
        site.enable().unwrap();
    }
    assert_eq!(proc.read_memory(pc, 1).unwrap()[0], 0xcc);

    let site = proc.breakpoint_sites().get_by_address(pc).unwrap();
    assert_eq!(site.saved_data(), original);
    site.disable().unwrap();
    assert_eq!(proc.read_memory(pc, 1).unwrap()[0], original);
}

#[test]
#[serial]
fn duplicate_sites_are_rejected() {
    let mut proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    proc.create_breakpoint_site(pc).unwrap();
    let err = proc.create_breakpoint_site(pc).unwrap_err();
    assert!(matches!(err, Error::DuplicateAddress(_)));
}

#[test]
#[serial]
fn ids_increase_across_creations() {
    let mut proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    let first = proc.create_breakpoint_site(pc).unwrap().id();
    let second = proc.create_breakpoint_site(pc + 1).unwrap().id();
    let third = proc.create_breakpoint_site(pc + 2).unwrap().id();
    assert!(first > 0);
    assert!(first < second && second < third);
}

#[test]
#[serial]
fn trap_stops_and_rewinds_onto_the_site() {
    let mut proc = common::launch_attached("yes");

    // The entry instruction falls through, so a trap on the following
    // instruction is guaranteed to execute.
    let disassembler = Disassembler::new().unwrap();
    let second = disassembler.disassemble(&proc, 2, None).unwrap()[1].address;

    {
        let site = proc.create_breakpoint_site(second).unwrap();
        site.enable().unwrap();
    }

    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_eq!(reason.info, Signal::SIGTRAP as u8);
    assert_eq!(proc.get_pc().unwrap(), second);

    // Stepping from the trapped instruction lifts the patch for the step and
    // puts it back.
    let reason = proc.step_instruction().unwrap();
    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_ne!(proc.get_pc().unwrap(), second);
    let site = proc.breakpoint_sites().get_by_address(second).unwrap();
    assert!(site.is_enabled());
}

#[test]
#[serial]
fn resume_steps_over_a_site_under_pc() {
    let mut proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    {
        let site = proc.create_breakpoint_site(pc).unwrap();
        site.enable().unwrap();
    }

    proc.resume().unwrap();
    thread::sleep(Duration::from_millis(50));

    let state = common::proc_stat_state(proc.pid());
    assert!(state == 'R' || state == 'S', "unexpected state {state}");
}
