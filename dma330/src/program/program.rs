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

use snafu::{Location, Snafu};

use crate::dmac::{Capability, Security};
use crate::isa::{Cond, Disassembly, Insn, LoopCounter, MovReg, disassemble};
use crate::plan::{self, LoopPlan, Mode, Plan, Swap, TransferKind, TransferRequest};

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Invalid transfer"), context(false))]
    Plan {
        source: plan::Error,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Program needs more than {capacity} bytes"))]
    BufferOverflow {
        need: usize,
        capacity: usize,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Loop body of {len} bytes is out of the backward jump range"))]
    LoopTooLong {
        len: usize,
        #[snafu(implicit)]
        _location: Location,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caller owned memory that receives a program.
#[derive(Debug)]
pub struct ProgramBuffer<'a> {
    bytes: &'a mut [u8],
    bus_addr: u32,
}

impl<'a> ProgramBuffer<'a> {
    /// `bus_addr` is where the controller fetches `bytes` from.
    pub fn new(bytes: &'a mut [u8], bus_addr: u32) -> Self {
        ProgramBuffer { bytes, bus_addr }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn bus_addr(&self) -> u32 {
        self.bus_addr
    }
}

/// A complete program, ready to be started on a channel.
#[derive(Debug)]
pub struct Microprogram<'a> {
    code: &'a [u8],
    bus_addr: u32,
    non_secure: bool,
    plan: Plan,
}

impl<'a> Microprogram<'a> {
    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn bus_addr(&self) -> u32 {
        self.bus_addr
    }

    pub fn non_secure(&self) -> bool {
        self.non_secure
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Bytes at the end of the transfer the program does not move.
    pub fn residue(&self) -> u32 {
        self.plan.residue
    }

    pub fn disassemble(&self) -> Disassembly<'a> {
        disassemble(self.code)
    }
}

#[derive(Debug)]
struct LoopFrame {
    lc: LoopCounter,
    /// Offset of the first instruction of the loop body.
    start: usize,
}

/// Appends instructions to a buffer, or only counts their bytes.
#[derive(Debug)]
struct Builder<'b> {
    buf: Option<&'b mut [u8]>,
    capacity: usize,
    off: usize,
}

impl<'b> Builder<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Builder {
            capacity: buf.len(),
            buf: Some(buf),
            off: 0,
        }
    }

    fn measure() -> Self {
        Builder {
            buf: None,
            capacity: usize::MAX,
            off: 0,
        }
    }

    fn emit(&mut self, insn: Insn) -> Result<()> {
        let end = self.off + insn.len();
        if end > self.capacity {
            return error::BufferOverflow {
                need: end,
                capacity: self.capacity,
            }
            .fail();
        }
        if let Some(buf) = self.buf.as_deref_mut() {
            insn.encode(&mut buf[self.off..end]);
        }
        self.off = end;
        Ok(())
    }

    fn loop_begin(&mut self, lc: LoopCounter, iter: u16) -> Result<LoopFrame> {
        self.emit(Insn::Lp { lc, iter })?;
        Ok(LoopFrame {
            lc,
            start: self.off,
        })
    }

    fn loop_end(&mut self, frame: LoopFrame) -> Result<()> {
        let len = self.off - frame.start;
        let Ok(bjump) = u8::try_from(len) else {
            return error::LoopTooLong { len }.fail();
        };
        self.emit(Insn::LpEnd {
            lc: frame.lc,
            cond: Cond::Always,
            bjump,
        })
    }

    fn emit_loop(&mut self, lp: &LoopPlan, body: &[Insn]) -> Result<()> {
        let outer = match lp.outer {
            Some(iter) => Some(self.loop_begin(LoopCounter::Lc1, iter)?),
            None => None,
        };
        let inner = self.loop_begin(LoopCounter::Lc0, lp.inner)?;
        for insn in body {
            self.emit(*insn)?;
        }
        self.loop_end(inner)?;
        if let Some(outer) = outer {
            self.loop_end(outer)?;
        }
        Ok(())
    }
}

fn loop_body(plan: &Plan, req: &TransferRequest, phase: plan::PhaseKind) -> Vec<Insn> {
    let periph = req.periph;
    match (plan.mode, req.kind) {
        (Mode::ZeroFill, _) => vec![Insn::Stz],
        (Mode::Copy, TransferKind::Mem2Mem) => vec![
            Insn::Ld(Cond::Always),
            Insn::Rmb,
            Insn::St(Cond::Always),
            Insn::Wmb,
        ],
        (Mode::Copy, TransferKind::Mem2Periph) => vec![
            Insn::Wfp {
                cond: phase.wfp_cond(),
                periph,
            },
            Insn::Ld(Cond::Always),
            Insn::Rmb,
            Insn::Stp {
                cond: phase.periph_cond(),
                periph,
            },
            Insn::Wmb,
        ],
        (Mode::Copy, TransferKind::Periph2Mem) => vec![
            Insn::Wfp {
                cond: phase.wfp_cond(),
                periph,
            },
            Insn::Ldp {
                cond: phase.periph_cond(),
                periph,
            },
            Insn::Rmb,
            Insn::St(Cond::Always),
            Insn::Wmb,
        ],
    }
}

fn emit_program(plan: &Plan, req: &TransferRequest, builder: &mut Builder) -> Result<()> {
    if plan.mode == Mode::Copy {
        builder.emit(Insn::Mov {
            reg: MovReg::Sar,
            imm: req.src,
        })?;
    }
    builder.emit(Insn::Mov {
        reg: MovReg::Dar,
        imm: req.dst,
    })?;
    if plan.mode == Mode::Copy && req.kind.is_periph() {
        builder.emit(Insn::FlushP { periph: req.periph })?;
    }
    for phase in &plan.phases {
        builder.emit(Insn::Mov {
            reg: MovReg::Ccr,
            imm: phase.ccr.0,
        })?;
        let body = loop_body(plan, req, phase.kind);
        for lp in &phase.loops {
            builder.emit_loop(lp, &body)?;
        }
    }
    if plan.mode == Mode::ZeroFill {
        builder.emit(Insn::Wmb)?;
    }
    builder.emit(Insn::End)
}

fn assemble<'a>(
    plan: Plan,
    req: &TransferRequest,
    buf: ProgramBuffer<'a>,
) -> Result<Microprogram<'a>> {
    let ProgramBuffer { bytes, bus_addr } = buf;
    let capacity = bytes.len();
    let ret = {
        let mut builder = Builder::new(&mut *bytes);
        emit_program(&plan, req, &mut builder).map(|()| builder.off)
    };
    let len = match ret {
        Ok(len) => len,
        Err(e) => {
            // A failed build leaves DMAEND at the start of the buffer.
            if capacity > 0 {
                Insn::End.encode(bytes);
            }
            log::error!("Cannot build program at {bus_addr:#x}: {e}");
            return Err(e);
        }
    };
    let code: &'a [u8] = bytes;
    log::debug!("Built {:?} program of {len} bytes at {bus_addr:#x}", plan.mode);
    Ok(Microprogram {
        code: &code[..len],
        bus_addr,
        non_secure: req.security == Security::NonSecure,
        plan,
    })
}

/// Bytes [`plan_and_build`] would emit for `req`.
pub fn required_size(req: &TransferRequest, cap: &Capability) -> Result<usize> {
    let plan = plan::plan(req, cap, Mode::Copy)?;
    let mut builder = Builder::measure();
    emit_program(&plan, req, &mut builder)?;
    Ok(builder.off)
}

pub fn plan_and_build<'a>(
    req: &TransferRequest,
    cap: &Capability,
    buf: ProgramBuffer<'a>,
) -> Result<Microprogram<'a>> {
    let plan = plan::plan(req, cap, Mode::Copy)?;
    assemble(plan, req, buf)
}

fn zero_fill_request(
    cap: &Capability,
    dst: u32,
    size: u32,
    security: Security,
) -> TransferRequest {
    TransferRequest {
        src: 0,
        dst,
        size,
        burst_size: cap.max_burst_size,
        burst_len: plan::MAX_BURST_LEN,
        single_burst_size: 0,
        periph: 0,
        kind: TransferKind::Mem2Mem,
        cache: false,
        security,
        swap: Swap::None,
    }
}

/// Bytes [`plan_and_build_zero_fill`] would emit.
pub fn zero_fill_size(cap: &Capability, dst: u32, size: u32) -> Result<usize> {
    let req = zero_fill_request(cap, dst, size, Security::Secure);
    let plan = plan::plan(&req, cap, Mode::ZeroFill)?;
    let mut builder = Builder::measure();
    emit_program(&plan, &req, &mut builder)?;
    Ok(builder.off)
}

/// Builds a program that writes `size` zero bytes from `dst` on.
///
/// `dst` must be aligned to the data bus width. The program runs in the
/// `security` state, which must match the register window it is started
/// through.
pub fn plan_and_build_zero_fill<'a>(
    cap: &Capability,
    dst: u32,
    size: u32,
    security: Security,
    buf: ProgramBuffer<'a>,
) -> Result<Microprogram<'a>> {
    let req = zero_fill_request(cap, dst, size, security);
    let plan = plan::plan(&req, cap, Mode::ZeroFill)?;
    assemble(plan, &req, buf)
}

#[cfg(test)]
#[path = "program_test.rs"]
mod tests;
