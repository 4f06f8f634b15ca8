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

//! DMA-330 instruction set.
//! See: https://developer.arm.com/documentation/ddi0424/d/instruction-set

use std::fmt;

use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(module, context(suffix(false)))]
pub enum Error {
    #[snafu(display("Instruction needs {need} bytes, only {remain} left"))]
    Truncated {
        need: usize,
        remain: usize,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Unknown opcode {opcode:#04x}"))]
    UnknownOpcode {
        opcode: u8,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Invalid operand {operand:#04x} for opcode {opcode:#04x}"))]
    InvalidOperand {
        opcode: u8,
        operand: u8,
        #[snafu(implicit)]
        _location: Location,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Length of the longest instruction, DMAMOV and DMAGO.
pub const MAX_INSN_LEN: usize = 6;

const OP_END: u8 = 0x00;
const OP_KILL: u8 = 0x01;
const OP_LD: u8 = 0x04;
const OP_ST: u8 = 0x08;
const OP_STZ: u8 = 0x0C;
const OP_RMB: u8 = 0x12;
const OP_WMB: u8 = 0x13;
const OP_NOP: u8 = 0x18;
const OP_LP: u8 = 0x20;
const OP_LDP: u8 = 0x25;
const OP_STP: u8 = 0x29;
const OP_WFP: u8 = 0x30;
const OP_SEV: u8 = 0x34;
const OP_FLUSHP: u8 = 0x35;
const OP_WFE: u8 = 0x36;
const OP_LPEND: u8 = 0x38;
const OP_ADDH: u8 = 0x54;
const OP_GO: u8 = 0xA0;
const OP_MOV: u8 = 0xBC;

const PERIPH_SHIFT: u8 = 3;

/// Execution condition of DMALD, DMAST and DMALPEND, encoded as `bs:x` in
/// the low two bits of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Always,
    Single,
    Burst,
}

impl Cond {
    const fn bits(self) -> u8 {
        match self {
            Cond::Always => 0b00,
            Cond::Single => 0b01,
            Cond::Burst => 0b11,
        }
    }

    const fn from_bits(bits: u8) -> Option<Cond> {
        match bits & 0b11 {
            0b00 => Some(Cond::Always),
            0b01 => Some(Cond::Single),
            0b11 => Some(Cond::Burst),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Cond::Always => "",
            Cond::Single => "S",
            Cond::Burst => "B",
        }
    }
}

/// Request type of DMALDP and DMASTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriphCond {
    Single,
    Burst,
}

impl PeriphCond {
    fn suffix(self) -> &'static str {
        match self {
            PeriphCond::Single => "S",
            PeriphCond::Burst => "B",
        }
    }
}

/// Request type DMAWFP waits for, encoded as `bs:p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WfpCond {
    Single,
    Periph,
    Burst,
}

impl WfpCond {
    const fn bits(self) -> u8 {
        match self {
            WfpCond::Single => 0b00,
            WfpCond::Periph => 0b01,
            WfpCond::Burst => 0b10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovReg {
    Sar = 0,
    Ccr = 1,
    Dar = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrReg {
    Sar = 0,
    Dar = 1,
}

/// One of the two loop counters of a channel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopCounter {
    Lc0 = 0,
    Lc1 = 1,
}

impl LoopCounter {
    const fn from_bit(bit: u8) -> LoopCounter {
        if bit & 1 == 0 {
            LoopCounter::Lc0
        } else {
            LoopCounter::Lc1
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Insn {
    End,
    Kill,
    Nop,
    Rmb,
    Wmb,
    Stz,
    Ld(Cond),
    St(Cond),
    Ldp {
        cond: PeriphCond,
        periph: u8,
    },
    Stp {
        cond: PeriphCond,
        periph: u8,
    },
    /// `iter` is the number of iterations, 1 to 256.
    Lp {
        lc: LoopCounter,
        iter: u16,
    },
    /// `bjump` is the distance from this instruction back to the first
    /// instruction of the loop body.
    LpEnd {
        lc: LoopCounter,
        cond: Cond,
        bjump: u8,
    },
    Wfp {
        cond: WfpCond,
        periph: u8,
    },
    FlushP {
        periph: u8,
    },
    Sev {
        event: u8,
    },
    Wfe {
        event: u8,
        invalidate: bool,
    },
    AddH {
        reg: AddrReg,
        imm: u16,
    },
    Mov {
        reg: MovReg,
        imm: u32,
    },
    Go {
        chan: u8,
        pc: u32,
        non_secure: bool,
    },
}

const fn opcode_len(opcode: u8) -> Option<usize> {
    match opcode {
        0x00 | 0x01 | 0x04 | 0x05 | 0x07 | 0x08 | 0x09 | 0x0B | 0x0C | 0x12 | 0x13 | 0x18 => {
            Some(1)
        }
        0x20 | 0x22 | 0x25 | 0x27 | 0x29 | 0x2B | 0x30 | 0x31 | 0x32 | 0x34 | 0x35 | 0x36 => {
            Some(2)
        }
        0x38 | 0x39 | 0x3B | 0x3C | 0x3D | 0x3F => Some(2),
        0x54 | 0x56 => Some(3),
        0xA0 | 0xA2 | 0xBC => Some(6),
        _ => None,
    }
}

impl Insn {
    pub const fn len(&self) -> usize {
        match self {
            Insn::End | Insn::Kill | Insn::Nop | Insn::Rmb | Insn::Wmb | Insn::Stz => 1,
            Insn::Ld(_) | Insn::St(_) => 1,
            Insn::Ldp { .. }
            | Insn::Stp { .. }
            | Insn::Lp { .. }
            | Insn::LpEnd { .. }
            | Insn::Wfp { .. }
            | Insn::FlushP { .. }
            | Insn::Sev { .. }
            | Insn::Wfe { .. } => 2,
            Insn::AddH { .. } => 3,
            Insn::Mov { .. } | Insn::Go { .. } => 6,
        }
    }

    /// Writes the encoding to the start of `buf` and returns its length.
    ///
    /// Operands are not range-checked and `buf` must hold at least
    /// [`Insn::len`] bytes.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let len = self.len();
        let buf = &mut buf[..len];
        match *self {
            Insn::End => buf[0] = OP_END,
            Insn::Kill => buf[0] = OP_KILL,
            Insn::Nop => buf[0] = OP_NOP,
            Insn::Rmb => buf[0] = OP_RMB,
            Insn::Wmb => buf[0] = OP_WMB,
            Insn::Stz => buf[0] = OP_STZ,
            Insn::Ld(cond) => buf[0] = OP_LD | cond.bits(),
            Insn::St(cond) => buf[0] = OP_ST | cond.bits(),
            Insn::Ldp { cond, periph } => {
                buf[0] = OP_LDP | (cond as u8) << 1;
                buf[1] = periph << PERIPH_SHIFT;
            }
            Insn::Stp { cond, periph } => {
                buf[0] = OP_STP | (cond as u8) << 1;
                buf[1] = periph << PERIPH_SHIFT;
            }
            Insn::Lp { lc, iter } => {
                buf[0] = OP_LP | (lc as u8) << 1;
                buf[1] = iter.wrapping_sub(1) as u8;
            }
            Insn::LpEnd { lc, cond, bjump } => {
                buf[0] = OP_LPEND | (lc as u8) << 2 | cond.bits();
                buf[1] = bjump;
            }
            Insn::Wfp { cond, periph } => {
                buf[0] = OP_WFP | cond.bits();
                buf[1] = periph << PERIPH_SHIFT;
            }
            Insn::FlushP { periph } => {
                buf[0] = OP_FLUSHP;
                buf[1] = periph << PERIPH_SHIFT;
            }
            Insn::Sev { event } => {
                buf[0] = OP_SEV;
                buf[1] = event << 3;
            }
            Insn::Wfe { event, invalidate } => {
                buf[0] = OP_WFE;
                buf[1] = event << 3 | (invalidate as u8) << 1;
            }
            Insn::AddH { reg, imm } => {
                buf[0] = OP_ADDH | (reg as u8) << 1;
                buf[1..3].copy_from_slice(&imm.to_le_bytes());
            }
            Insn::Mov { reg, imm } => {
                buf[0] = OP_MOV;
                buf[1] = reg as u8;
                buf[2..6].copy_from_slice(&imm.to_le_bytes());
            }
            Insn::Go {
                chan,
                pc,
                non_secure,
            } => {
                buf[0] = OP_GO | (non_secure as u8) << 1;
                buf[1] = chan & 0b111;
                buf[2..6].copy_from_slice(&pc.to_le_bytes());
            }
        }
        log::trace!("emit {self}: {buf:02x?}");
        len
    }

    /// Decodes the instruction at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Insn> {
        let Some(&opcode) = bytes.first() else {
            return error::Truncated {
                need: 1usize,
                remain: 0usize,
            }
            .fail();
        };
        let Some(len) = opcode_len(opcode) else {
            return error::UnknownOpcode { opcode }.fail();
        };
        let Some(bytes) = bytes.get(..len) else {
            return error::Truncated {
                need: len,
                remain: bytes.len(),
            }
            .fail();
        };
        let periph = || bytes[1] >> PERIPH_SHIFT;
        let imm32 = || u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let insn = match opcode {
            OP_END => Insn::End,
            OP_KILL => Insn::Kill,
            OP_NOP => Insn::Nop,
            OP_RMB => Insn::Rmb,
            OP_WMB => Insn::Wmb,
            OP_STZ => Insn::Stz,
            0x04..=0x07 => match Cond::from_bits(opcode) {
                Some(cond) => Insn::Ld(cond),
                None => return error::UnknownOpcode { opcode }.fail(),
            },
            0x08..=0x0B => match Cond::from_bits(opcode) {
                Some(cond) => Insn::St(cond),
                None => return error::UnknownOpcode { opcode }.fail(),
            },
            0x20 | 0x22 => Insn::Lp {
                lc: LoopCounter::from_bit(opcode >> 1),
                iter: bytes[1] as u16 + 1,
            },
            0x25 | 0x27 | 0x29 | 0x2B => {
                let cond = if opcode & 0b10 == 0 {
                    PeriphCond::Single
                } else {
                    PeriphCond::Burst
                };
                if opcode & !0b10 == OP_LDP {
                    Insn::Ldp {
                        cond,
                        periph: periph(),
                    }
                } else {
                    Insn::Stp {
                        cond,
                        periph: periph(),
                    }
                }
            }
            0x30..=0x32 => {
                let cond = match opcode & 0b11 {
                    0b00 => WfpCond::Single,
                    0b01 => WfpCond::Periph,
                    _ => WfpCond::Burst,
                };
                Insn::Wfp {
                    cond,
                    periph: periph(),
                }
            }
            OP_SEV => Insn::Sev { event: bytes[1] >> 3 },
            OP_FLUSHP => Insn::FlushP { periph: periph() },
            OP_WFE => Insn::Wfe {
                event: bytes[1] >> 3,
                invalidate: bytes[1] & 0b10 != 0,
            },
            0x38..=0x3F => match Cond::from_bits(opcode) {
                Some(cond) => Insn::LpEnd {
                    lc: LoopCounter::from_bit(opcode >> 2),
                    cond,
                    bjump: bytes[1],
                },
                None => return error::UnknownOpcode { opcode }.fail(),
            },
            0x54 | 0x56 => {
                let reg = if opcode & 0b10 == 0 {
                    AddrReg::Sar
                } else {
                    AddrReg::Dar
                };
                Insn::AddH {
                    reg,
                    imm: u16::from_le_bytes([bytes[1], bytes[2]]),
                }
            }
            0xA0 | 0xA2 => Insn::Go {
                chan: bytes[1] & 0b111,
                pc: imm32(),
                non_secure: opcode & 0b10 != 0,
            },
            OP_MOV => {
                let reg = match bytes[1] {
                    0 => MovReg::Sar,
                    1 => MovReg::Ccr,
                    2 => MovReg::Dar,
                    operand => return error::InvalidOperand { opcode, operand }.fail(),
                };
                Insn::Mov { reg, imm: imm32() }
            }
            _ => return error::UnknownOpcode { opcode }.fail(),
        };
        Ok(insn)
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Insn::End => write!(f, "DMAEND"),
            Insn::Kill => write!(f, "DMAKILL"),
            Insn::Nop => write!(f, "DMANOP"),
            Insn::Rmb => write!(f, "DMARMB"),
            Insn::Wmb => write!(f, "DMAWMB"),
            Insn::Stz => write!(f, "DMASTZ"),
            Insn::Ld(cond) => write!(f, "DMALD{}", cond.suffix()),
            Insn::St(cond) => write!(f, "DMAST{}", cond.suffix()),
            Insn::Ldp { cond, periph } => write!(f, "DMALDP{} P{periph}", cond.suffix()),
            Insn::Stp { cond, periph } => write!(f, "DMASTP{} P{periph}", cond.suffix()),
            Insn::Lp { lc, iter } => write!(f, "DMALP_{} {iter}", lc as u8),
            Insn::LpEnd { lc, cond, bjump } => {
                write!(f, "DMALPEND{}_{} bjmp {bjump}", cond.suffix(), lc as u8)
            }
            Insn::Wfp { cond, periph } => {
                let c = match cond {
                    WfpCond::Single => "single",
                    WfpCond::Periph => "periph",
                    WfpCond::Burst => "burst",
                };
                write!(f, "DMAWFP P{periph}, {c}")
            }
            Insn::FlushP { periph } => write!(f, "DMAFLUSHP P{periph}"),
            Insn::Sev { event } => write!(f, "DMASEV {event}"),
            Insn::Wfe { event, invalidate } => {
                write!(f, "DMAWFE {event}")?;
                if invalidate {
                    write!(f, ", invalid")?;
                }
                Ok(())
            }
            Insn::AddH { reg, imm } => write!(f, "DMAADDH {reg:?}, {imm:#x}"),
            Insn::Mov { reg, imm } => {
                let r = match reg {
                    MovReg::Sar => "SAR",
                    MovReg::Ccr => "CCR",
                    MovReg::Dar => "DAR",
                };
                write!(f, "DMAMOV {r}, {imm:#010x}")
            }
            Insn::Go {
                chan,
                pc,
                non_secure,
            } => {
                write!(f, "DMAGO C{chan}, {pc:#010x}")?;
                if non_secure {
                    write!(f, ", ns")?;
                }
                Ok(())
            }
        }
    }
}

/// Iterator over the instructions of a microprogram, yielding the offset of
/// each instruction. Stops after the first decode error.
#[derive(Debug, Clone)]
pub struct Disassembly<'a> {
    code: &'a [u8],
    offset: usize,
}

pub fn disassemble(code: &[u8]) -> Disassembly<'_> {
    Disassembly { code, offset: 0 }
}

impl Iterator for Disassembly<'_> {
    type Item = (usize, Result<Insn>);

    fn next(&mut self) -> Option<Self::Item> {
        let remain = self.code.get(self.offset..).filter(|r| !r.is_empty())?;
        let offset = self.offset;
        match Insn::decode(remain) {
            Ok(insn) => {
                self.offset += insn.len();
                Some((offset, Ok(insn)))
            }
            Err(e) => {
                self.offset = self.code.len();
                Some((offset, Err(e)))
            }
        }
    }
}

#[cfg(test)]
#[path = "isa_test.rs"]
mod tests;
