//! A line-oriented single-step debugger, prompted before every instruction when `-g` is
//! given. Reads only through `Cpu`'s public fields and [`vm32_emu::Cpu::peek_u8`]; it never
//! writes guest state.

use std::io::{self, Write};

use vm32_emu::{Machine, StopReason};

pub fn run(machine: &mut Machine) -> StopReason {
    let mut running_free = false;
    loop {
        if !running_free {
            print_prompt(machine);
            match read_command() {
                Command::Continue => running_free = true,
                Command::Step => {}
                Command::Quit => return StopReason::ConsoleEscape,
                Command::Inspect => {
                    print_registers(machine);
                    continue;
                }
                Command::Examine(addr) => {
                    match machine.cpu.peek_u8(addr) {
                        Some(byte) => println!("{addr:#010x}: {byte:#04x}"),
                        None => println!("{addr:#010x}: <unmapped>"),
                    }
                    continue;
                }
                Command::Help => {
                    print_help();
                    continue;
                }
                Command::Unknown(line) => {
                    println!("unrecognized command: {line}");
                    continue;
                }
            }
        }
        if let Some(reason) = machine.step() {
            return reason;
        }
    }
}

enum Command {
    Continue,
    Step,
    Quit,
    Inspect,
    Examine(u32),
    Help,
    Unknown(String),
}

fn print_prompt(machine: &Machine) {
    print!("vm32 [pc={:#010x}] > ", machine.cpu.pc);
    let _ = io::stdout().flush();
}

fn read_command() -> Command {
    let mut line = String::new();
    if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
        return Command::Quit;
    }
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("c") => Command::Continue,
        Some("s") | None => Command::Step,
        Some("q") => Command::Quit,
        Some("i") => Command::Inspect,
        Some("h") => Command::Help,
        Some("x") => match parts.next().and_then(|hex| u32::from_str_radix(hex.trim_start_matches("0x"), 16).ok()) {
            Some(addr) => Command::Examine(addr),
            None => Command::Unknown(line.to_string()),
        },
        _ => Command::Unknown(line.to_string()),
    }
}

fn print_registers(machine: &Machine) {
    let cpu = &machine.cpu;
    println!(
        "a={:#010x} b={:#010x} c={:#010x} f={} g={}",
        cpu.regs.a, cpu.regs.b, cpu.regs.c, cpu.fregs.f, cpu.fregs.g
    );
    println!(
        "pc={:#010x} sp={:#010x} usp={:#010x} ssp={:#010x}",
        cpu.pc, cpu.sp, cpu.usp, cpu.ssp
    );
    println!(
        "user={} iena={} ipend={:#010x} trap={:#x} vadr={:#010x} cycle={}",
        cpu.user, cpu.iena, cpu.ipend, cpu.trap, cpu.vadr, cpu.cycle
    );
}

fn print_help() {
    println!("c         continue until halt/fault/escape");
    println!("s         single step (default)");
    println!("q         quit");
    println!("i         register dump");
    println!("x HEX     display one byte at a guest virtual address");
    println!("h         this help");
}
