//! Shared helpers for building tiny in-memory images and hand-encoded instruction words,
//! the same way `crates/vm32-emu/src/emu.rs`'s own unit tests do.
#![allow(dead_code)]

use vm32_emu::primitives::constants::IMAGE_MAGIC;

/// Pack an opcode and its 24-bit signed immediate into one instruction word.
pub fn word(opcode: u8, imm: i32) -> u32 {
    (opcode as u32) | ((imm as u32) << 8)
}

/// Build a loadable image: header (magic, bss, entry, flags) followed by `words` as the
/// body. The stack pointer is never part of an image; tests that care about a specific SP
/// set `machine.cpu.sp` directly after `load`.
pub fn image(entry: u32, words: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&IMAGE_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // bss
    bytes.extend_from_slice(&entry.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
    let body: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    bytes.extend_from_slice(&body);
    bytes
}

/// Encode a load/store operand word. `mode`: 0=Sp, 1=Pc, 2=Indexed, 3=Imm. `int_reg`:
/// 0=A, 1=B, 2=C. `offset` is a signed 19-bit residual.
pub fn mem_word(opcode: u8, mode: u32, int_reg: u32, base_is_b: bool, offset: i32) -> u32 {
    let imm = (mode << 22) | (int_reg << 20) | ((base_is_b as u32) << 19) | (offset as u32 & 0x7_ffff);
    (opcode as u32) | (imm << 8)
}

/// Encode an integer-ALU word. `form`: 0=Reg, 1=Imm, 2=Mem. `operand` is a signed 22-bit
/// residual, ignored for the `Reg` form.
pub fn alu_word(opcode: u8, form: u32, operand: i32) -> u32 {
    let imm = (form << 22) | (operand as u32 & 0x3f_ffff);
    (opcode as u32) | (imm << 8)
}

/// Encode a push/pop word. `reg`: 0=A, 1=B, 2=C, 3=F, 4=G.
pub fn stack_word(opcode: u8, reg: u32) -> u32 {
    (opcode as u32) | (reg << 29)
}
