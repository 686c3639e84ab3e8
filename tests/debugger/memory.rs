use crate::common;
use serial_test::serial;

#[test]
#[serial]
fn read_memory_at_pc() {
    let proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    let memory = proc.read_memory(pc, 16).unwrap();
    assert_eq!(memory.len(), 16);
}

#[test]
#[serial]
fn write_memory_round_trips_partial_words() {
    let mut proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    let original = proc.read_memory(pc, 16).unwrap();

    // 13 bytes: one full word plus a 5 byte tail exercising the read-merge.
    let pattern: Vec<u8> = (0..13u8).map(|i| 0xa0 + i).collect();
    proc.write_memory(pc, &pattern).unwrap();

    let written = proc.read_memory(pc, 16).unwrap();
    assert_eq!(&written[..13], pattern.as_slice());
    assert_eq!(&written[13..], &original[13..]);
}

#[test]
#[serial]
fn enabled_traps_are_hidden_from_readers() {
    let mut proc = common::launch_attached("yes");
    let pc = proc.get_pc().unwrap();
    let original = proc.read_memory(pc, 4).unwrap();

    {
        let site = proc.create_breakpoint_site(pc).unwrap();
        site.enable().unwrap();
    }

    assert_eq!(proc.read_memory(pc, 4).unwrap()[0], 0xcc);

    let masked = proc.read_memory_without_traps(pc, 4).unwrap();
    assert_eq!(masked, original);

    // Removal restores the original byte.
    proc.breakpoint_sites_mut().remove_by_address(pc).unwrap();
    assert_eq!(proc.read_memory(pc, 4).unwrap(), original);
}
