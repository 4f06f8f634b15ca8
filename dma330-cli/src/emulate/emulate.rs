// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Args;
use dma330::dmac::{self, Dmac, DmacConfig, Timeout};
use dma330::emu::Emulator;
use dma330::emu::ram::{self, Ram};
use dma330::plan::{Swap, TransferKind, TransferRequest};
use dma330::program::{self, Microprogram, ProgramBuffer};
use serde::Deserialize;
use serde_aco::{Help, help_text};
use snafu::{Location, ResultExt, Snafu};

const PROGRAM_ALIGN: u64 = 0x20;

#[derive(Debug, Snafu)]
#[snafu(module, context(suffix(false)))]
pub enum Error {
    #[snafu(display("Failed to parse {arg}"))]
    ParseArg {
        arg: String,
        #[snafu(source)]
        error: serde_aco::Error,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Memory size {size:#x} must be within 4 GiB"))]
    RamSize {
        size: u64,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("No room for a {len}-byte program below {limit:#x}"))]
    NoRoom {
        len: usize,
        limit: u64,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Failed to build a program"))]
    Build {
        source: program::Error,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Controller error"))]
    Dmac {
        source: dmac::Error,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Memory error"))]
    Memory {
        source: ram::Error,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Destination differs at byte {offset:#x}"))]
    Mismatch {
        offset: usize,
        #[snafu(implicit)]
        _location: Location,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Args, Debug, Clone)]
#[command(arg_required_else_help = true)]
pub struct CopyArgs {
    #[arg(long, help(
        help_text::<DmacConfig>("The emulated controller.")
    ), default_value = "base=0x20000000")]
    dmac: String,

    #[arg(short, long, help(
        help_text::<TransferRequest>("The transfer to run.")
    ), value_name = "TRANSFER")]
    transfer: String,

    /// Channel thread that runs the program.
    #[arg(short, long, default_value_t = 0)]
    chan: u8,

    /// Milliseconds to wait for the channel to stop.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u32,

    /// Size of the emulated memory starting at address 0.
    #[arg(long, default_value = "16m")]
    mem_size: String,
}

#[derive(Debug, Clone, Deserialize, Help)]
pub struct ZeroParam {
    /// Bus address of the first byte to clear.
    pub addr: u32,
    /// Number of bytes to clear.
    pub size: u32,
}

#[derive(Args, Debug, Clone)]
#[command(arg_required_else_help = true)]
pub struct ZeroArgs {
    #[arg(long, help(
        help_text::<DmacConfig>("The emulated controller.")
    ), default_value = "base=0x20000000")]
    dmac: String,

    #[arg(short, long, help(
        help_text::<ZeroParam>("The region to clear.")
    ), value_name = "REGION")]
    region: String,

    /// Channel thread that runs the program.
    #[arg(short, long, default_value_t = 0)]
    chan: u8,

    /// Milliseconds to wait for the channel to stop.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u32,

    /// Size of the emulated memory starting at address 0.
    #[arg(long, default_value = "16m")]
    mem_size: String,
}

fn parse_arg<T>(arg: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_aco::from_arg(arg).context(error::ParseArg { arg })
}

fn create_emulator(config: &DmacConfig, mem_size: &str) -> Result<Emulator> {
    let size: u64 = parse_arg(mem_size)?;
    if size > 1 << 32 {
        return error::RamSize { size }.fail();
    }
    let ram = Ram::new(0, size as usize);
    Ok(Emulator::new(config.variant.capability(), config.base, ram))
}

/// Places the program in the last aligned slot of memory.
fn program_addr(ram: &Ram, len: usize) -> Result<u32> {
    let limit = ram.base() + ram.size();
    let addr = limit
        .checked_sub(len as u64)
        .map(|addr| addr & !(PROGRAM_ALIGN - 1))
        .filter(|addr| *addr >= ram.base());
    match addr {
        Some(addr) => Ok(addr as u32),
        None => error::NoRoom { len, limit }.fail(),
    }
}

fn run(
    dmac: &Dmac<&Emulator>,
    chan: u8,
    program: &Microprogram,
    timeout_ms: u32,
) -> Result<()> {
    let emu = dmac.platform();
    emu.ram()
        .write(program.bus_addr() as u64, program.code())
        .context(error::Memory)?;
    let mut ctx = dmac.context(chan).context(error::Dmac)?;
    ctx.start(program).context(error::Dmac)?;
    ctx.finish(Timeout::Millis(timeout_ms)).context(error::Dmac)?;
    Ok(())
}

/// Compares memory at `addr` with `expected`.
fn verify(ram: &Ram, addr: u64, expected: &[u8]) -> Result<()> {
    let actual = ram.to_vec(addr, expected.len()).context(error::Memory)?;
    match actual.iter().zip(expected).position(|(a, e)| a != e) {
        Some(offset) => error::Mismatch { offset }.fail(),
        None => Ok(()),
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(7)).collect()
}

pub fn main_copy(args: CopyArgs) -> Result<()> {
    let config: DmacConfig = parse_arg(&args.dmac)?;
    let req: TransferRequest = parse_arg(&args.transfer)?;
    let emu = create_emulator(&config, &args.mem_size)?;
    let dmac = Dmac::new(&emu, &config);
    let info = dmac.probe().context(error::Dmac)?;
    log::info!("{}: {info:x?}", dmac.capability().name);

    let src = pattern(req.size as usize);
    if !matches!(req.kind, TransferKind::Periph2Mem) {
        emu.ram()
            .write(req.src as u64, &src)
            .context(error::Memory)?;
    }

    let len = program::required_size(&req, dmac.capability()).context(error::Build)?;
    let bus_addr = program_addr(emu.ram(), len)?;
    let mut buf = vec![0; len];
    let program = dmac
        .plan_and_build(&req, ProgramBuffer::new(&mut buf, bus_addr))
        .context(error::Build)?;
    log::info!("program: {len} bytes at {bus_addr:#x}");
    run(&dmac, args.chan, &program, args.timeout_ms)?;

    let moved = (req.size - program.residue()) as usize;
    if req.kind == TransferKind::Mem2Mem && req.swap == Swap::None {
        verify(emu.ram(), req.dst as u64, &src[..moved])?;
    }
    println!(
        "Moved {moved} bytes from {:#x} to {:#x} on channel {}",
        req.src, req.dst, args.chan
    );
    if program.residue() != 0 {
        println!("{} bytes left for the caller", program.residue());
    }
    Ok(())
}

pub fn main_zero(args: ZeroArgs) -> Result<()> {
    let config: DmacConfig = parse_arg(&args.dmac)?;
    let region: ZeroParam = parse_arg(&args.region)?;
    let emu = create_emulator(&config, &args.mem_size)?;
    let dmac = Dmac::new(&emu, &config);
    dmac.probe().context(error::Dmac)?;

    emu.ram()
        .fill(region.addr as u64, region.size as usize, 0xa5)
        .context(error::Memory)?;

    let cap = dmac.capability();
    let len = program::zero_fill_size(cap, region.addr, region.size).context(error::Build)?;
    let bus_addr = program_addr(emu.ram(), len)?;
    let mut buf = vec![0; len];
    let program = dmac
        .plan_and_build_zero_fill(
            region.addr,
            region.size,
            ProgramBuffer::new(&mut buf, bus_addr),
        )
        .context(error::Build)?;
    run(&dmac, args.chan, &program, args.timeout_ms)?;

    let cleared = (region.size - program.residue()) as usize;
    verify(emu.ram(), region.addr as u64, &vec![0; cleared])?;
    println!("Cleared {cleared} bytes from {:#x}", region.addr);
    Ok(())
}

#[cfg(test)]
#[path = "emulate_test.rs"]
mod tests;
