use anyhow::bail;
use bugtrap::console::Console;
use bugtrap::debugger::process::Process;
use nix::unistd::Pid;
use std::env;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let process = match args.as_slice() {
        [_, "-p", pid] => Process::attach(Pid::from_raw(pid.parse()?))?,
        [_, program] => Process::launch(Path::new(program), true, None)?,
        _ => bail!("usage: bugtrap <program> | bugtrap -p <pid>"),
    };

    println!("Process {} stopped", process.pid());
    Console::new(process)?.run()
}
