use crate::common;
use bugtrap::debugger::address::VirtualAddress;
use bugtrap::debugger::error::Error;
use bugtrap::debugger::process::{Process, ProcessState};
use nix::unistd::Pid;
use serial_test::serial;
use std::path::Path;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn launch_stops_the_tracee() {
    let proc = common::launch_attached("yes");
    assert!(common::process_exists(proc.pid()));
    assert_eq!(proc.state(), ProcessState::Stopped);
    assert_eq!(common::proc_stat_state(proc.pid()), 't');
}

#[test]
#[serial]
fn launch_nonexistent_program_fails() {
    let err = Process::launch(Path::new("you_do_not_have_to_be_good"), true, None).unwrap_err();
    assert!(matches!(err, Error::Launch(_)));
    assert!(err.to_string().contains("Exec failed"));
}

#[test]
#[serial]
fn drop_terminates_a_launched_tracee() {
    let proc = common::launch_attached("yes");
    let pid = proc.pid();
    drop(proc);
    assert!(!common::process_exists(pid));
}

#[test]
#[serial]
fn attach_stops_the_target() {
    let target = common::launch_free("yes");
    // Give the child a moment to get through exec.
    thread::sleep(Duration::from_millis(50));

    let attached = Process::attach(target.pid()).unwrap();
    assert_eq!(attached.state(), ProcessState::Stopped);
    assert_eq!(common::proc_stat_state(attached.pid()), 't');
}

#[test]
#[serial]
fn attach_to_pid_zero_is_rejected() {
    let err = Process::attach(Pid::from_raw(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidPid));
}

#[test]
#[serial]
fn resume_runs_to_exit() {
    let mut proc = common::launch_attached("true");
    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 0);

    let err = proc.resume().unwrap_err();
    assert!(matches!(err, Error::InvalidState(ProcessState::Exited)));
}

#[test]
#[serial]
fn resume_leaves_the_tracee_running() {
    let mut proc = common::launch_attached("yes");
    proc.resume().unwrap();
    thread::sleep(Duration::from_millis(50));

    let state = common::proc_stat_state(proc.pid());
    assert!(state == 'R' || state == 'S', "unexpected state {state}");

    let err = proc.read_memory(VirtualAddress::from(0u64), 8).unwrap_err();
    assert!(matches!(err, Error::InvalidState(ProcessState::Running)));
}

#[test]
#[serial]
fn step_advances_the_program_counter() {
    let mut proc = common::launch_attached("yes");
    let before = proc.get_pc().unwrap();
    let reason = proc.step_instruction().unwrap();
    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_ne!(proc.get_pc().unwrap(), before);
}
