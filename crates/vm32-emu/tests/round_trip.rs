mod common;

use common::{image, stack_word, word};
use vm32_emu::primitives::opcode;
use vm32_emu::Machine;

#[test]
fn push_pop_round_trip_restores_register_and_sp() {
    let mut machine = Machine::new(8);
    let img = image(
        0,
        &[
            stack_word(opcode::PUSH, 0), // push A
            stack_word(opcode::POP, 1),  // pop into B
            word(opcode::HALT, 0),
        ],
    );
    machine.load(&img, None).unwrap();
    machine.cpu.regs.a = 0x1234_5678;
    let sp_before = machine.cpu.sp;

    machine.step(); // push
    machine.step(); // pop

    assert_eq!(machine.cpu.regs.b, 0x1234_5678);
    assert_eq!(machine.cpu.sp, sp_before);
}

#[test]
fn jsr_lev_returns_to_the_instruction_after_jsr_with_frame_restored() {
    // pc=0: JSR +8   -> jumps to the callee at pc=8, pushes the return address (4)
    // pc=4: HALT     -> landed on after LEV returns
    // pc=8: ENT 16   -> push old SP, reserve 16 bytes of locals
    // pc=12: LEV 16  -> undo the reservation, pop saved SP, pop return PC
    let mut machine = Machine::new(8);
    let img = image(
        0,
        &[
            word(opcode::JSR, 8),
            word(opcode::HALT, 0),
            word(opcode::ENT, 16),
            word(opcode::LEV, 16),
        ],
    );
    machine.load(&img, None).unwrap();
    let sp_before = machine.cpu.sp;

    machine.step(); // JSR
    assert_eq!(machine.cpu.pc, 8);
    assert_eq!(machine.cpu.sp, sp_before - 4);

    machine.step(); // ENT
    assert_eq!(machine.cpu.sp, sp_before - 4 - 4 - 16);

    machine.step(); // LEV
    assert_eq!(machine.cpu.pc, 4);
    assert_eq!(machine.cpu.sp, sp_before);
}

#[test]
fn sti_immediately_after_cli_restores_iena() {
    let mut machine = Machine::new(8);
    let img = image(
        0,
        &[word(opcode::CLI, 0), word(opcode::STI, 0), word(opcode::HALT, 0)],
    );
    machine.load(&img, None).unwrap();
    machine.cpu.iena = true;

    machine.step(); // CLI
    assert!(!machine.cpu.iena);

    machine.step(); // STI
    assert!(machine.cpu.iena);
}
