pub fn text(topic: Option<&str>) -> &'static str {
    match topic {
        Some("register") => {
            "register read            dump general purpose registers
register read <name>     read one register
register write <name> <value>
    integer registers take hex or decimal values,
    st registers take floats, vector registers take [aa,bb,...] bytes"
        }
        Some("memory") => {
            "memory read <address> [bytes]   hex dump (default 32 bytes)
memory write <address> <byte>...
    addresses and bytes are hexadecimal"
        }
        Some("breakpoint") => {
            "breakpoint set <address>        create and enable a site
breakpoint list
breakpoint enable <id>
breakpoint disable <id>
breakpoint delete <id>"
        }
        Some("disassemble") => "disassemble [count] [address]   default: 5 instructions at pc",
        _ => {
            "available commands:
    continue (c)       resume the tracee
    step (s)           execute one instruction
    register (r)       read or write registers (`help register`)
    memory (m)         read or write tracee memory (`help memory`)
    breakpoint (b)     manage breakpoints (`help breakpoint`)
    disassemble (d)    decode instructions (`help disassemble`)
    quit (q)           detach / terminate and leave"
        }
    }
}
