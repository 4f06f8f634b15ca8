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
use dma330::dmac::Variant;
use dma330::plan::{PhaseKind, TransferRequest};
use dma330::program::{self, ProgramBuffer};
use serde_aco::help_text;
use snafu::{Location, ResultExt, Snafu};

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
    #[snafu(display("Failed to build a program"))]
    Build {
        source: program::Error,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Program does not fit below 4 GiB at {bus_addr:#x}"))]
    BusAddr {
        bus_addr: u32,
        #[snafu(implicit)]
        _location: Location,
    },
}

#[derive(Args, Debug, Clone)]
#[command(arg_required_else_help = true)]
pub struct PlanArgs {
    #[arg(short, long, help(
        help_text::<TransferRequest>("The transfer to plan.")
    ), value_name = "TRANSFER")]
    transfer: String,

    #[arg(long, help(
        help_text::<Variant>("Controller generation.")
    ), default_value = "pl330")]
    variant: String,

    /// Bus address the program is placed at.
    #[arg(long, default_value = "0x0")]
    bus_addr: String,
}

pub fn main_plan(args: PlanArgs) -> Result<(), Error> {
    let req: TransferRequest = parse_arg(&args.transfer)?;
    let variant: Variant = parse_arg(&args.variant)?;
    let bus_addr: u32 = parse_arg(&args.bus_addr)?;
    let cap = variant.capability();

    let size = program::required_size(&req, cap).context(error::Build)?;
    if bus_addr.checked_add(size as u32).is_none() {
        return error::BusAddr { bus_addr }.fail();
    }
    let mut buf = vec![0; size];
    let program = program::plan_and_build(&req, cap, ProgramBuffer::new(&mut buf, bus_addr))
        .context(error::Build)?;

    println!("{}: {} bytes at {bus_addr:#x}", cap.name, program.len());
    for phase in &program.plan().phases {
        let kind = match phase.kind {
            PhaseKind::Burst => "burst",
            PhaseKind::Single => "single",
        };
        println!(
            "  {kind}: {} bytes per iteration, {} bytes, CCR {:#010x}",
            phase.unit,
            phase.bytes(),
            phase.ccr.0
        );
    }
    if program.residue() != 0 {
        println!("  residue: {} bytes", program.residue());
    }
    for (offset, insn) in program.disassemble() {
        match insn {
            Ok(insn) => println!("{:#010x}: {insn}", bus_addr as usize + offset),
            Err(e) => log::error!("{:#010x}: {e}", bus_addr as usize + offset),
        }
    }
    Ok(())
}

pub(crate) fn parse_arg<T>(arg: &str) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned,
{
    serde_aco::from_arg(arg).context(error::ParseArg { arg })
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
