//! Opcode execution. One function per family, dispatched by [`execute`] from the `step`
//! loop in the parent module.

use super::{Cpu, WindowKind};
use crate::exception::Fault;
use crate::mmu::Access;
use crate::primitives::constants::{PAGE_OFFSET_MASK, PAGE_SIZE, USER_BIT};
use crate::primitives::opcode::{self as op, decode_alu_form, decode_alu_operand, decode_float_fn,
    decode_float_reg, decode_mem_operand, decode_stack_reg, imm24, AddrMode, AluForm, FloatFn,
    MemOperand, StackReg};

pub(super) fn execute(cpu: &mut Cpu, word: u32, pc_of_instr: u32) -> Result<(), Fault> {
    let imm = imm24(word);

    match op::opcode(word) {
        op::HALT => {
            cpu.pending_stop = Some(super::StopReason::Halt);
            Ok(())
        }
        op::IDLE => exec_idle(cpu),
        op::JMP => {
            cpu.pc = pc_of_instr.wrapping_add(imm as u32);
            Ok(())
        }
        op::JMPI => {
            cpu.pc = cpu.regs.a.wrapping_add(imm as u32);
            Ok(())
        }
        op::JSR => {
            let ret = cpu.pc;
            cpu.push_word(ret)?;
            cpu.pc = pc_of_instr.wrapping_add(imm as u32);
            Ok(())
        }
        op::RET => {
            cpu.pc = cpu.pop_word()?;
            Ok(())
        }
        op::ENT => {
            cpu.push_word(cpu.sp)?;
            cpu.sp = cpu.sp.wrapping_sub(imm as u32);
            Ok(())
        }
        op::LEV => {
            cpu.sp = cpu.sp.wrapping_add(imm as u32);
            let saved_sp = cpu.pop_word()?;
            cpu.sp = saved_sp;
            cpu.pc = cpu.pop_word()?;
            Ok(())
        }

        op::BZ => branch(cpu, pc_of_instr, imm, cpu.regs.a == 0),
        op::BNZ => branch(cpu, pc_of_instr, imm, cpu.regs.a != 0),
        op::BLTS => branch(cpu, pc_of_instr, imm, (cpu.regs.a as i32) < cpu.regs.b as i32),
        op::BGES => branch(cpu, pc_of_instr, imm, (cpu.regs.a as i32) >= cpu.regs.b as i32),
        op::BLTU => branch(cpu, pc_of_instr, imm, cpu.regs.a < cpu.regs.b),
        op::BGEU => branch(cpu, pc_of_instr, imm, cpu.regs.a >= cpu.regs.b),
        op::BFLT => branch(cpu, pc_of_instr, imm, cpu.fregs.f < cpu.fregs.g),
        op::BFGE => branch(cpu, pc_of_instr, imm, cpu.fregs.f >= cpu.fregs.g),

        op::CEQ => set_bool(cpu, cpu.regs.a == cpu.regs.b),
        op::CNE => set_bool(cpu, cpu.regs.a != cpu.regs.b),
        op::CLTS => set_bool(cpu, (cpu.regs.a as i32) < cpu.regs.b as i32),
        op::CLTU => set_bool(cpu, cpu.regs.a < cpu.regs.b),
        op::CGTS => set_bool(cpu, (cpu.regs.a as i32) > cpu.regs.b as i32),
        op::CGTU => set_bool(cpu, cpu.regs.a > cpu.regs.b),
        op::FCEQ => set_bool(cpu, cpu.fregs.f == cpu.fregs.g),
        op::FCLT => set_bool(cpu, cpu.fregs.f < cpu.fregs.g),
        op::FCGT => set_bool(cpu, cpu.fregs.f > cpu.fregs.g),

        op::ITOD => {
            cpu.fregs.f = cpu.regs.a as i32 as f64;
            Ok(())
        }
        op::UTOD => {
            cpu.fregs.f = cpu.regs.a as f64;
            Ok(())
        }
        op::DTOI => {
            cpu.regs.a = cpu.fregs.f as i32 as u32;
            Ok(())
        }
        op::DTOU => {
            cpu.regs.a = cpu.fregs.f as u32;
            Ok(())
        }

        op::ADD => alu(cpu, word, |a, b| Ok(a.wrapping_add(b))),
        op::SUB => alu(cpu, word, |a, b| Ok(a.wrapping_sub(b))),
        op::MUL => alu(cpu, word, |a, b| Ok(a.wrapping_mul(b))),
        op::DIVS => alu(cpu, word, |a, b| {
            if b == 0 {
                Err(Fault::Arithmetic)
            } else {
                Ok(((a as i32).wrapping_div(b as i32)) as u32)
            }
        }),
        op::DIVU => alu(cpu, word, |a, b| {
            a.checked_div(b).ok_or(Fault::Arithmetic)
        }),
        op::MODS => alu(cpu, word, |a, b| {
            if b == 0 {
                Err(Fault::Arithmetic)
            } else {
                Ok(((a as i32).wrapping_rem(b as i32)) as u32)
            }
        }),
        op::MODU => alu(cpu, word, |a, b| {
            a.checked_rem(b).ok_or(Fault::Arithmetic)
        }),
        op::AND => alu(cpu, word, |a, b| Ok(a & b)),
        op::OR => alu(cpu, word, |a, b| Ok(a | b)),
        op::XOR => alu(cpu, word, |a, b| Ok(a ^ b)),
        op::SHL => alu(cpu, word, |a, b| Ok(a.wrapping_shl(b & 31))),
        op::SHR => alu(cpu, word, |a, b| Ok(a.wrapping_shr(b & 31))),
        op::SAR => alu(cpu, word, |a, b| Ok(((a as i32).wrapping_shr(b & 31)) as u32)),

        op::FADD => {
            cpu.fregs.f += cpu.fregs.g;
            Ok(())
        }
        op::FSUB => {
            cpu.fregs.f -= cpu.fregs.g;
            Ok(())
        }
        op::FMUL => {
            cpu.fregs.f *= cpu.fregs.g;
            Ok(())
        }
        op::FDIV => {
            if cpu.fregs.g == 0.0 {
                Err(Fault::Arithmetic)
            } else {
                cpu.fregs.f /= cpu.fregs.g;
                Ok(())
            }
        }
        op::FLIB => exec_flib(cpu, word),

        op::LD8 => exec_load_int(cpu, word, pc_of_instr, 8),
        op::LD16 => exec_load_int(cpu, word, pc_of_instr, 16),
        op::LD32 => exec_load_int(cpu, word, pc_of_instr, 32),
        op::LD64 => exec_load_int(cpu, word, pc_of_instr, 64),
        op::LDF => exec_load_float(cpu, word, pc_of_instr),
        op::ST8 => exec_store_int(cpu, word, pc_of_instr, 8),
        op::ST16 => exec_store_int(cpu, word, pc_of_instr, 16),
        op::ST32 => exec_store_int(cpu, word, pc_of_instr, 32),
        op::ST64 => exec_store_int(cpu, word, pc_of_instr, 64),
        op::STF => exec_store_float(cpu, word, pc_of_instr),

        op::PUSH => exec_push(cpu, word),
        op::POP => exec_pop(cpu, word),

        op::MCPY => exec_mcpy(cpu),
        op::MCMP => exec_mcmp(cpu),
        op::MCHR => exec_mchr(cpu),
        op::MSET => exec_mset(cpu),

        op::BIN => {
            check_privileged(cpu)?;
            cpu.regs.a = cpu.console.take();
            Ok(())
        }
        op::BOUT => {
            check_privileged(cpu)?;
            if cpu.regs.a == 1 {
                cpu.console.write_byte(cpu.regs.b as u8);
            }
            Ok(())
        }

        op::IVEC => {
            check_privileged(cpu)?;
            cpu.ivec = cpu.regs.a;
            Ok(())
        }
        op::PDIR => {
            check_privileged(cpu)?;
            cpu.pdir = cpu.regs.a;
            cpu.flush_tlb();
            Ok(())
        }
        op::SPAG => {
            check_privileged(cpu)?;
            cpu.vmem = cpu.regs.a != 0;
            cpu.flush_tlb();
            Ok(())
        }
        op::LUSP => {
            check_privileged(cpu)?;
            cpu.regs.a = cpu.usp;
            Ok(())
        }
        op::SUSP => {
            check_privileged(cpu)?;
            cpu.usp = cpu.regs.a;
            Ok(())
        }
        op::LVAD => {
            check_privileged(cpu)?;
            cpu.regs.a = cpu.vadr;
            Ok(())
        }
        op::TIME => {
            check_privileged(cpu)?;
            cpu.timer.set_timeout(cpu.regs.a);
            Ok(())
        }
        op::RCYC => {
            cpu.regs.a = cpu.cycle as u32;
            Ok(())
        }
        op::MSIZ => {
            check_privileged(cpu)?;
            cpu.regs.a = cpu.mem.len();
            Ok(())
        }
        op::CLI => {
            check_privileged(cpu)?;
            cpu.iena = false;
            Ok(())
        }
        op::STI => {
            check_privileged(cpu)?;
            cpu.iena = true;
            Ok(())
        }
        op::RTI => exec_rti(cpu),
        op::TRAP => Err(Fault::Syscall),

        _ => Err(Fault::IllegalInstruction),
    }
}

fn check_privileged(cpu: &Cpu) -> Result<(), Fault> {
    if cpu.user {
        Err(Fault::Privileged)
    } else {
        Ok(())
    }
}

fn branch(cpu: &mut Cpu, pc_of_instr: u32, imm: i32, taken: bool) -> Result<(), Fault> {
    if taken {
        cpu.pc = pc_of_instr.wrapping_add(imm as u32);
    }
    Ok(())
}

fn set_bool(cpu: &mut Cpu, value: bool) -> Result<(), Fault> {
    cpu.regs.a = value as u32;
    Ok(())
}

/// Resolve the second operand of an integer-ALU opcode per its packed form, then apply `op`
/// to `(A, operand)` and write the result back to A. `op` returning `Err` (division/modulo by
/// zero) leaves A untouched, preserving restartability.
fn alu(cpu: &mut Cpu, word: u32, op: impl FnOnce(u32, u32) -> Result<u32, Fault>) -> Result<(), Fault> {
    let operand = alu_operand(cpu, word)?;
    let result = op(cpu.regs.a, operand)?;
    cpu.regs.a = result;
    Ok(())
}

fn alu_operand(cpu: &mut Cpu, word: u32) -> Result<u32, Fault> {
    match decode_alu_form(word).ok_or(Fault::IllegalInstruction)? {
        AluForm::Reg => Ok(cpu.regs.b),
        AluForm::Imm => Ok(decode_alu_operand(word) as u32),
        AluForm::Mem => {
            let offset = decode_alu_operand(word);
            let addr = cpu.sp.wrapping_add(offset as u32);
            let phys = cpu.translate_windowed(WindowKind::Stack, addr, Access::Read)?;
            cpu.mem.read_u32(phys).ok_or(Fault::BadPhysical)
        }
    }
}

fn exec_idle(cpu: &mut Cpu) -> Result<(), Fault> {
    if !cpu.iena {
        return Err(Fault::IllegalInstruction);
    }
    loop {
        if let Some(stop) = cpu.poll_tick() {
            cpu.pending_stop = Some(stop);
            return Ok(());
        }
        if !cpu.iena {
            // poll_tick delivered a trap (keyboard or timer), which disabled iena.
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_micros(200));
    }
}

fn exec_rti(cpu: &mut Cpu) -> Result<(), Fault> {
    check_privileged(cpu)?;
    let trap = cpu.pop_word()?;
    let pc = cpu.pop_word()?;
    cpu.trap = trap;
    cpu.pc = pc;
    if trap & USER_BIT != 0 {
        cpu.ssp = cpu.sp;
        cpu.sp = cpu.usp;
        cpu.user = true;
    }
    cpu.flush_tlb();
    cpu.iena = true;

    if cpu.ipend != 0 {
        let bit = cpu.ipend & cpu.ipend.wrapping_neg();
        cpu.ipend &= !bit;
        let fault = Cpu::fault_for_bit(bit);
        let faulting_pc = cpu.pc;
        if let Some(stop) = cpu.take_trap(fault, faulting_pc) {
            cpu.pending_stop = Some(stop);
        }
    }
    Ok(())
}

fn mem_address(cpu: &Cpu, operand: &MemOperand, pc_of_instr: u32) -> Option<u32> {
    match operand.mode {
        AddrMode::Sp => Some(cpu.sp.wrapping_add(operand.offset as u32)),
        AddrMode::Pc => Some(pc_of_instr.wrapping_add(operand.offset as u32)),
        AddrMode::Indexed => {
            let base = if operand.base_is_b { cpu.regs.b } else { cpu.regs.a };
            Some(base.wrapping_add(operand.offset as u32))
        }
        AddrMode::Imm => None,
    }
}

fn translate_operand(cpu: &mut Cpu, operand: &MemOperand, addr: u32, access: Access) -> Result<u32, Fault> {
    if operand.mode == AddrMode::Sp {
        cpu.translate_windowed(WindowKind::Stack, addr, access)
    } else {
        cpu.translate_plain(addr, access)
    }
}

fn exec_load_int(cpu: &mut Cpu, word: u32, pc_of_instr: u32, width: u8) -> Result<(), Fault> {
    let operand = decode_mem_operand(word);
    let value = if operand.mode == AddrMode::Imm {
        operand.offset as u32
    } else {
        let addr = mem_address(cpu, &operand, pc_of_instr).unwrap();
        let phys = translate_operand(cpu, &operand, addr, Access::Read)?;
        match width {
            8 => cpu.mem.read_u8(phys).ok_or(Fault::BadPhysical)? as u32,
            16 => cpu.mem.read_u16(phys).ok_or(Fault::BadPhysical)? as u32,
            32 => cpu.mem.read_u32(phys).ok_or(Fault::BadPhysical)?,
            64 => cpu.mem.read_u64(phys).ok_or(Fault::BadPhysical)? as u32,
            _ => unreachable!("width is one of 8/16/32/64"),
        }
    };
    cpu.regs.write(operand.int_reg, value);
    Ok(())
}

fn exec_store_int(cpu: &mut Cpu, word: u32, pc_of_instr: u32, width: u8) -> Result<(), Fault> {
    let operand = decode_mem_operand(word);
    let value = cpu.regs.read(operand.int_reg);
    let addr = match operand.mode {
        AddrMode::Imm => operand.offset as u32,
        _ => mem_address(cpu, &operand, pc_of_instr).unwrap(),
    };
    let phys = translate_operand(cpu, &operand, addr, Access::Write)?;
    let ok = match width {
        8 => cpu.mem.write_u8(phys, value as u8),
        16 => cpu.mem.write_u16(phys, value as u16),
        32 => cpu.mem.write_u32(phys, value),
        64 => cpu.mem.write_u64(phys, value as u64),
        _ => unreachable!("width is one of 8/16/32/64"),
    };
    ok.ok_or(Fault::BadPhysical)
}

fn exec_load_float(cpu: &mut Cpu, word: u32, pc_of_instr: u32) -> Result<(), Fault> {
    let operand = decode_mem_operand(word);
    let freg = decode_float_reg(word);
    let value = if operand.mode == AddrMode::Imm {
        operand.offset as f32 as f64
    } else {
        let addr = mem_address(cpu, &operand, pc_of_instr).unwrap();
        let phys = translate_operand(cpu, &operand, addr, Access::Read)?;
        let bits = cpu.mem.read_u32(phys).ok_or(Fault::BadPhysical)?;
        f32::from_bits(bits) as f64
    };
    cpu.fregs.write(freg, value);
    Ok(())
}

fn exec_store_float(cpu: &mut Cpu, word: u32, pc_of_instr: u32) -> Result<(), Fault> {
    let operand = decode_mem_operand(word);
    let freg = decode_float_reg(word);
    let value = cpu.fregs.read(freg) as f32;
    let addr = match operand.mode {
        AddrMode::Imm => operand.offset as u32,
        _ => mem_address(cpu, &operand, pc_of_instr).unwrap(),
    };
    let phys = translate_operand(cpu, &operand, addr, Access::Write)?;
    cpu.mem.write_u32(phys, value.to_bits()).ok_or(Fault::BadPhysical)
}

fn exec_push(cpu: &mut Cpu, word: u32) -> Result<(), Fault> {
    match decode_stack_reg(word).ok_or(Fault::IllegalInstruction)? {
        StackReg::A => cpu.push_word(cpu.regs.a),
        StackReg::B => cpu.push_word(cpu.regs.b),
        StackReg::C => cpu.push_word(cpu.regs.c),
        StackReg::F => cpu.push_double(cpu.fregs.f),
        StackReg::G => cpu.push_double(cpu.fregs.g),
    }
}

fn exec_pop(cpu: &mut Cpu, word: u32) -> Result<(), Fault> {
    match decode_stack_reg(word).ok_or(Fault::IllegalInstruction)? {
        StackReg::A => {
            cpu.regs.a = cpu.pop_word()?;
            Ok(())
        }
        StackReg::B => {
            cpu.regs.b = cpu.pop_word()?;
            Ok(())
        }
        StackReg::C => {
            cpu.regs.c = cpu.pop_word()?;
            Ok(())
        }
        StackReg::F => {
            cpu.fregs.f = cpu.pop_double()?;
            Ok(())
        }
        StackReg::G => {
            cpu.fregs.g = cpu.pop_double()?;
            Ok(())
        }
    }
}

fn exec_flib(cpu: &mut Cpu, word: u32) -> Result<(), Fault> {
    let func = decode_float_fn(word).ok_or(Fault::IllegalInstruction)?;
    let f = cpu.fregs.f;
    let g = cpu.fregs.g;
    cpu.fregs.f = match func {
        FloatFn::Pow => f.powf(g),
        FloatFn::Atan2 => f.atan2(g),
        FloatFn::Exp => f.exp(),
        FloatFn::Log => f.ln(),
        FloatFn::Log10 => f.log10(),
        FloatFn::Sqrt => f.sqrt(),
        FloatFn::Sin => f.sin(),
        FloatFn::Cos => f.cos(),
        FloatFn::Tan => f.tan(),
        FloatFn::Asin => f.asin(),
        FloatFn::Acos => f.acos(),
        FloatFn::Sinh => f.sinh(),
        FloatFn::Cosh => f.cosh(),
        FloatFn::Tanh => f.tanh(),
        FloatFn::Atan => f.atan(),
        FloatFn::Fabs => f.abs(),
        FloatFn::Floor => f.floor(),
        FloatFn::Ceil => f.ceil(),
        FloatFn::Hypot => f.hypot(g),
        FloatFn::Fmod => f % g,
    };
    Ok(())
}

fn page_remaining(addr: u32) -> u32 {
    PAGE_SIZE - (addr & PAGE_OFFSET_MASK)
}

fn chunk_len(a: u32, b: u32, c: u32) -> u32 {
    page_remaining(a).min(page_remaining(b)).min(c)
}

fn exec_mcpy(cpu: &mut Cpu) -> Result<(), Fault> {
    while cpu.regs.c != 0 {
        let chunk = chunk_len(cpu.regs.a, cpu.regs.b, cpu.regs.c);
        let src = cpu.translate_plain(cpu.regs.a, Access::Read)?;
        let dst = cpu.translate_plain(cpu.regs.b, Access::Write)?;
        cpu.mem.copy_within(src, dst, chunk).ok_or(Fault::BadPhysical)?;
        cpu.regs.a = cpu.regs.a.wrapping_add(chunk);
        cpu.regs.b = cpu.regs.b.wrapping_add(chunk);
        cpu.regs.c -= chunk;
    }
    Ok(())
}

fn exec_mcmp(cpu: &mut Cpu) -> Result<(), Fault> {
    while cpu.regs.c != 0 {
        let chunk = chunk_len(cpu.regs.a, cpu.regs.b, cpu.regs.c) as usize;
        let src_phys = cpu.translate_plain(cpu.regs.a, Access::Read)?;
        let dst_phys = cpu.translate_plain(cpu.regs.b, Access::Read)?;
        let src = cpu.mem.slice(src_phys, chunk as u32).ok_or(Fault::BadPhysical)?.to_vec();
        let dst = cpu.mem.slice(dst_phys, chunk as u32).ok_or(Fault::BadPhysical)?.to_vec();
        if let Some(i) = (0..chunk).find(|&i| src[i] != dst[i]) {
            let diff = src[i] as i32 - dst[i] as i32;
            cpu.regs.a = cpu.regs.a.wrapping_add(i as u32);
            cpu.regs.b = cpu.regs.b.wrapping_add(i as u32);
            cpu.regs.c -= i as u32;
            cpu.regs.a = diff as u32;
            return Ok(());
        }
        cpu.regs.a = cpu.regs.a.wrapping_add(chunk as u32);
        cpu.regs.b = cpu.regs.b.wrapping_add(chunk as u32);
        cpu.regs.c -= chunk as u32;
    }
    cpu.regs.a = 0;
    Ok(())
}

fn exec_mchr(cpu: &mut Cpu) -> Result<(), Fault> {
    let target = cpu.regs.b as u8;
    let mut scanned = 0u32;
    while cpu.regs.c != 0 {
        let chunk = page_remaining(cpu.regs.a).min(cpu.regs.c);
        let phys = cpu.translate_plain(cpu.regs.a, Access::Read)?;
        let data = cpu.mem.slice(phys, chunk).ok_or(Fault::BadPhysical)?;
        if let Some(pos) = data.iter().position(|&b| b == target) {
            cpu.regs.a = scanned + pos as u32;
            return Ok(());
        }
        cpu.regs.a = cpu.regs.a.wrapping_add(chunk);
        cpu.regs.c -= chunk;
        scanned += chunk;
    }
    cpu.regs.a = 0;
    Ok(())
}

fn exec_mset(cpu: &mut Cpu) -> Result<(), Fault> {
    let value = cpu.regs.b as u8;
    while cpu.regs.c != 0 {
        let chunk = page_remaining(cpu.regs.a).min(cpu.regs.c);
        let phys = cpu.translate_plain(cpu.regs.a, Access::Write)?;
        cpu.mem.slice_mut(phys, chunk).ok_or(Fault::BadPhysical)?.fill(value);
        cpu.regs.a = cpu.regs.a.wrapping_add(chunk);
        cpu.regs.c -= chunk;
    }
    Ok(())
}
