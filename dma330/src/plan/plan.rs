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

//! Splits a transfer into loop nests the 8-bit hardware loop counters can
//! express.

use serde::Deserialize;
use serde_aco::Help;
use snafu::{Location, Snafu};

use crate::dmac::{Capability, Security};
use crate::isa::{PeriphCond, WfpCond};
use crate::reg::{
    CACHE_BUFFERABLE, CACHE_WRITE_BACK, Ccr, PROT_NON_SECURE, PROT_PRIVILEGED,
};

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Transfer size is zero"))]
    ZeroSize {
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Burst length {len} is not in [1, 16]"))]
    BurstLen {
        len: u8,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Burst size 2^{size} exceeds the 2^{max}-byte data bus"))]
    BurstSize {
        size: u8,
        max: u8,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Single burst size 2^{single} exceeds burst size 2^{size}"))]
    SingleBurstSize {
        single: u8,
        size: u8,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("{name} address {addr:#x} is not {align}-byte aligned"))]
    Unaligned {
        name: &'static str,
        addr: u32,
        align: u32,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("{name} range {addr:#x}+{size:#x} overflows the 32-bit bus"))]
    AddrOverflow {
        name: &'static str,
        addr: u32,
        size: u32,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Peripheral {periph} is not in [0, {max}]"))]
    PeriphId {
        periph: u8,
        max: u8,
        #[snafu(implicit)]
        _location: Location,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub const MAX_BURST_LEN: u8 = 16;
/// Iterations one loop counter can count.
pub const LOOP_MAX: u32 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Help)]
pub enum TransferKind {
    /// Memory to memory.
    #[default]
    #[serde(alias = "mem2mem")]
    Mem2Mem,
    /// Memory to a peripheral FIFO.
    #[serde(alias = "mem2periph")]
    Mem2Periph,
    /// Peripheral FIFO to memory.
    #[serde(alias = "periph2mem")]
    Periph2Mem,
}

impl TransferKind {
    pub fn is_periph(self) -> bool {
        self != TransferKind::Mem2Mem
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Help)]
pub enum Swap {
    /// No byte swapping.
    #[default]
    #[serde(alias = "none")]
    None,
    /// Swap bytes within 16-bit data.
    #[serde(alias = "16")]
    Bits16,
    /// Swap bytes within 32-bit data.
    #[serde(alias = "32")]
    Bits32,
    /// Swap bytes within 64-bit data.
    #[serde(alias = "64")]
    Bits64,
    /// Swap bytes within 128-bit data.
    #[serde(alias = "128")]
    Bits128,
}

impl Swap {
    pub const fn bits(self) -> u8 {
        match self {
            Swap::None => 0,
            Swap::Bits16 => 1,
            Swap::Bits32 => 2,
            Swap::Bits64 => 3,
            Swap::Bits128 => 4,
        }
    }
}

fn default_burst_len() -> u8 {
    MAX_BURST_LEN
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Help)]
pub struct TransferRequest {
    /// Source bus address.
    pub src: u32,
    /// Destination bus address.
    pub dst: u32,
    /// Number of bytes to move.
    pub size: u32,
    /// log2 of the bytes per beat in the burst phase.
    pub burst_size: u8,
    /// Beats per burst, 1 to 16. [default: 16]
    #[serde(default = "default_burst_len")]
    pub burst_len: u8,
    /// log2 of the bytes per beat in the tail phase. [default: 0]
    #[serde(default)]
    pub single_burst_size: u8,
    /// Peripheral request interface, for peripheral transfers. [default: 0]
    #[serde(default)]
    pub periph: u8,
    /// Transfer direction. [default: mem2mem]
    #[serde(default)]
    pub kind: TransferKind,
    /// Use cacheable write-back accesses on the memory side. [default: false]
    #[serde(default)]
    pub cache: bool,
    /// Security state the channel runs in. [default: secure]
    #[serde(default)]
    pub security: Security,
    /// Endian swap size. [default: none]
    #[serde(default)]
    pub swap: Swap,
}

impl TransferRequest {
    /// A memory to memory copy with 16-beat bursts and a byte-granular tail.
    pub fn mem_to_mem(src: u32, dst: u32, size: u32, burst_size: u8) -> Self {
        TransferRequest {
            src,
            dst,
            size,
            burst_size,
            burst_len: MAX_BURST_LEN,
            single_burst_size: 0,
            periph: 0,
            kind: TransferKind::Mem2Mem,
            cache: false,
            security: Security::Secure,
            swap: Swap::None,
        }
    }

    pub fn burst_bytes(&self) -> u32 {
        (1 << self.burst_size) * self.burst_len as u32
    }

    pub fn single_bytes(&self) -> u32 {
        1 << self.single_burst_size
    }
}

/// What the builder emits in each loop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// DMALD then DMAST, or DMASTP towards a peripheral.
    Copy,
    /// DMASTZ only; the source side is never touched.
    ZeroFill,
}

/// One loop nest: `inner` iterations of the loop body on LC0, optionally
/// repeated `outer` times on LC1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPlan {
    pub inner: u16,
    pub outer: Option<u16>,
}

impl LoopPlan {
    pub fn iterations(&self) -> u32 {
        self.inner as u32 * self.outer.unwrap_or(1) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Burst,
    Single,
}

impl PhaseKind {
    pub fn wfp_cond(self) -> WfpCond {
        match self {
            PhaseKind::Burst => WfpCond::Burst,
            PhaseKind::Single => WfpCond::Single,
        }
    }

    pub fn periph_cond(self) -> PeriphCond {
        match self {
            PhaseKind::Burst => PeriphCond::Burst,
            PhaseKind::Single => PeriphCond::Single,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub kind: PhaseKind,
    pub ccr: Ccr,
    /// Bytes moved by one iteration of the loop body.
    pub unit: u32,
    pub loops: Vec<LoopPlan>,
}

impl Phase {
    pub fn bytes(&self) -> u64 {
        self.loops
            .iter()
            .map(|l| l.iterations() as u64 * self.unit as u64)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub mode: Mode,
    /// Burst phase first, then the tail. Empty phases are left out.
    pub phases: Vec<Phase>,
    /// Trailing bytes smaller than one single beat, not transferred.
    pub residue: u32,
}

impl Plan {
    pub fn phase(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    pub fn bytes(&self) -> u64 {
        self.phases.iter().map(Phase::bytes).sum()
    }
}

/// Splits `count` loop iterations into nests of at most two frames.
pub fn split_loops(count: u32) -> Vec<LoopPlan> {
    let mut loops = vec![];
    let mut remain = count;
    while remain > 0 {
        let lp = if remain >= LOOP_MAX * LOOP_MAX {
            LoopPlan {
                inner: LOOP_MAX as u16,
                outer: Some(LOOP_MAX as u16),
            }
        } else if remain > LOOP_MAX {
            LoopPlan {
                inner: LOOP_MAX as u16,
                outer: Some((remain / LOOP_MAX) as u16),
            }
        } else {
            LoopPlan {
                inner: remain as u16,
                outer: None,
            }
        };
        remain -= lp.iterations();
        loops.push(lp);
    }
    loops
}

/// Channel control for one phase of `req`.
pub fn prepare_ccr(req: &TransferRequest, mode: Mode, burst_size: u8, burst_len: u8) -> Ccr {
    let (src_inc, dst_inc) = match (mode, req.kind) {
        (Mode::ZeroFill, _) => (false, true),
        (Mode::Copy, TransferKind::Mem2Mem) => (true, true),
        (Mode::Copy, TransferKind::Mem2Periph) => (true, false),
        (Mode::Copy, TransferKind::Periph2Mem) => (false, true),
    };
    let (src_cache, dst_cache) = match (req.cache, req.kind) {
        (false, _) => (CACHE_BUFFERABLE, CACHE_BUFFERABLE),
        (true, TransferKind::Mem2Mem) => (CACHE_WRITE_BACK, CACHE_WRITE_BACK),
        (true, TransferKind::Mem2Periph) => (CACHE_WRITE_BACK, CACHE_BUFFERABLE),
        (true, TransferKind::Periph2Mem) => (CACHE_BUFFERABLE, CACHE_WRITE_BACK),
    };
    let mut prot = PROT_PRIVILEGED;
    if req.security == Security::NonSecure {
        prot |= PROT_NON_SECURE;
    }

    let mut ccr = Ccr(0);
    ccr.set_src_inc(src_inc);
    ccr.set_src_burst_size(burst_size);
    ccr.set_src_burst_len(burst_len - 1);
    ccr.set_src_prot(prot);
    ccr.set_src_cache(src_cache);
    ccr.set_dst_inc(dst_inc);
    ccr.set_dst_burst_size(burst_size);
    ccr.set_dst_burst_len(burst_len - 1);
    ccr.set_dst_prot(prot);
    ccr.set_dst_cache(dst_cache);
    ccr.set_endian_swap(req.swap.bits());
    ccr
}

fn check_range(name: &'static str, addr: u32, size: u32, align: u32) -> Result<()> {
    if addr & (align - 1) != 0 {
        return error::Unaligned { name, addr, align }.fail();
    }
    if addr.checked_add(size - 1).is_none() {
        return error::AddrOverflow { name, addr, size }.fail();
    }
    Ok(())
}

pub fn validate(req: &TransferRequest, cap: &Capability, mode: Mode) -> Result<()> {
    if req.size == 0 {
        return error::ZeroSize.fail();
    }
    if !(1..=MAX_BURST_LEN).contains(&req.burst_len) {
        return error::BurstLen { len: req.burst_len }.fail();
    }
    if req.burst_size > cap.max_burst_size {
        return error::BurstSize {
            size: req.burst_size,
            max: cap.max_burst_size,
        }
        .fail();
    }
    if req.single_burst_size > req.burst_size {
        return error::SingleBurstSize {
            single: req.single_burst_size,
            size: req.burst_size,
        }
        .fail();
    }
    let align = 1 << req.burst_size;
    if mode == Mode::Copy {
        check_range("Source", req.src, req.size, align)?;
    }
    check_range("Destination", req.dst, req.size, align)?;
    if mode == Mode::Copy && req.kind.is_periph() && req.periph >= cap.num_periph {
        return error::PeriphId {
            periph: req.periph,
            max: cap.num_periph.saturating_sub(1),
        }
        .fail();
    }
    Ok(())
}

pub fn plan(req: &TransferRequest, cap: &Capability, mode: Mode) -> Result<Plan> {
    validate(req, cap, mode)?;

    let mut phases = vec![];
    let burst_unit = req.burst_bytes();
    let bursts = req.size / burst_unit;
    if bursts > 0 {
        phases.push(Phase {
            kind: PhaseKind::Burst,
            ccr: prepare_ccr(req, mode, req.burst_size, req.burst_len),
            unit: burst_unit,
            loops: split_loops(bursts),
        });
    }

    let remain = req.size % burst_unit;
    let single_unit = req.single_bytes();
    let singles = remain / single_unit;
    if singles > 0 {
        phases.push(Phase {
            kind: PhaseKind::Single,
            ccr: prepare_ccr(req, mode, req.single_burst_size, 1),
            unit: single_unit,
            loops: split_loops(singles),
        });
    }

    let residue = remain % single_unit;
    if residue != 0 {
        log::warn!(
            "{residue} trailing bytes of {:#x}+{:#x} are smaller than a {single_unit}-byte beat and will not be transferred",
            req.dst,
            req.size
        );
    }
    log::debug!(
        "{mode:?} {:#x} -> {:#x}, {:#x} bytes: {bursts} bursts, {singles} singles, residue {residue}",
        req.src,
        req.dst,
        req.size
    );
    Ok(Plan {
        mode,
        phases,
        residue,
    })
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
