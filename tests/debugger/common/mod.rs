use bugtrap::debugger::process::Process;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

/// Launch `program` under trace, with its stdout pointed at /dev/null so
/// chatty targets like `yes` stay quiet.
pub fn launch_attached(program: &str) -> Process {
    let devnull = File::options().write(true).open("/dev/null").unwrap();
    Process::launch(Path::new(program), true, Some(devnull.as_raw_fd())).unwrap()
}

/// Launch `program` without tracing it; the returned handle still terminates
/// the child on drop.
pub fn launch_free(program: &str) -> Process {
    let devnull = File::options().write(true).open("/dev/null").unwrap();
    Process::launch(Path::new(program), false, Some(devnull.as_raw_fd())).unwrap()
}

pub fn process_exists(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

/// Process state character from `/proc/<pid>/stat` ('t' = tracing stop).
pub fn proc_stat_state(pid: Pid) -> char {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();
    // The comm field is parenthesized and may itself contain spaces.
    let after_comm = &stat[stat.rfind(')').unwrap() + 2..];
    after_comm.chars().next().unwrap()
}
