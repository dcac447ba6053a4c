mod common;

use common::{image, word};
use vm32_emu::primitives::constants::FS_SZ;
use vm32_emu::primitives::opcode;
use vm32_emu::{Machine, StopReason};

#[test]
fn minimal_halt_program_runs_to_completion() {
    let mut machine = Machine::new(8);
    let img = image(0, &[word(opcode::HALT, 0)]);
    machine.load(&img, None).unwrap();
    let reason = machine.run();
    assert_eq!(reason, StopReason::Halt);
    assert!(machine.cpu.cycle >= 1);
}

#[test]
fn default_initial_sp_is_top_of_memory_minus_fs_window() {
    let machine = Machine::new(8);
    assert_eq!(machine.default_initial_sp(), machine.cpu.memory().len() - FS_SZ);
}

#[test]
fn cycle_counter_is_monotonically_non_decreasing() {
    let mut machine = Machine::new(8);
    let img = image(
        0,
        &[word(opcode::JMP, 4), word(opcode::JMP, -4), word(opcode::HALT, 0)],
    );
    machine.load(&img, None).unwrap();
    let mut last = machine.cpu.cycle;
    for _ in 0..5 {
        machine.step();
        assert!(machine.cpu.cycle >= last);
        last = machine.cpu.cycle;
    }
}
