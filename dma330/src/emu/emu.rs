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

//! Emulated DMA-330 controller and bus memory.
//!
//! Channel threads only make progress in [`Emulator::run`], which
//! [`Platform::delay_ms`] drives.

pub mod ram;

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::dmac::{Capability, Security};
use crate::isa::{self, AddrReg, Cond, Insn, MAX_INSN_LEN, MovReg, PeriphCond, WfpCond};
use crate::platform::Platform;
use crate::reg::{
    CR0, CRD, ChannelFault, Ccr, Cr0, Crd, Csr, DBGCMD, DBGINST0, DBGINST1, DBGSTATUS, DPC, DSR,
    DbgInst0, DbgStatus, Dsr, FSRC, FSRD, FTRD, INT_EVENT_RIS, INTCLR, INTEN, INTMIS,
    ManagerFault, PCELL_ID0, PERIPH_ID0, PROT_NON_SECURE, STATUS_COMPLETING, STATUS_EXECUTING,
    STATUS_FAULT_COMPLETING, STATUS_FAULTING, STATUS_KILLING, STATUS_STOPPED, STATUS_WFE,
    WINDOW_SIZE, csr, ftr, sar,
};

use self::ram::Ram;

const PCELL_ID: [u8; 4] = [0x0d, 0xf0, 0x05, 0xb1];

/// Instructions each channel executes per emulated millisecond.
pub const DEFAULT_STEPS_PER_MS: u32 = 1000;

#[derive(Debug, Default)]
struct ChannelReg {
    status: u8,
    pc: u32,
    sar: u32,
    dar: u32,
    ccr: Ccr,
    /// Remaining iterations minus one.
    lc: [u8; 2],
    ftr: ChannelFault,
    non_secure: bool,
    /// Request type latched by the last DMAWFP.
    req_burst: bool,
    wfe_event: u8,
    mfifo: VecDeque<u8>,
}

#[derive(Debug, Default)]
struct ManagerReg {
    status: u8,
    pc: u32,
    ftr: ManagerFault,
}

#[derive(Debug)]
struct Dma330Reg {
    manager: ManagerReg,
    channels: Vec<ChannelReg>,
    dbg_inst: [u32; 2],
    inten: u32,
    events: u32,
    halted: bool,
}

#[derive(Debug)]
pub struct Dma330 {
    name: Box<str>,
    cap: &'static Capability,
    reg: Mutex<Dma330Reg>,
}

fn cond_met(req_burst: bool, cond: Cond) -> bool {
    match cond {
        Cond::Always => true,
        Cond::Single => !req_burst,
        Cond::Burst => req_burst,
    }
}

fn periph_cond_met(req_burst: bool, cond: PeriphCond) -> bool {
    match cond {
        PeriphCond::Single => !req_burst,
        PeriphCond::Burst => req_burst,
    }
}

fn swap_endian(data: &mut [u8], swap: u8) {
    if swap == 0 {
        return;
    }
    for chunk in data.chunks_mut(1 << swap) {
        chunk.reverse();
    }
}

impl Dma330 {
    pub fn new(cap: &'static Capability, base_addr: u64) -> Self {
        let channels = (0..cap.num_channels)
            .map(|_| ChannelReg::default())
            .collect();
        Dma330 {
            name: Box::from(format!("{}@{base_addr:x}", cap.name)),
            cap,
            reg: Mutex::new(Dma330Reg {
                manager: ManagerReg::default(),
                channels,
                dbg_inst: [0; 2],
                inten: 0,
                events: 0,
                halted: false,
            }),
        }
    }

    pub fn capability(&self) -> &'static Capability {
        self.cap
    }

    /// Keeps the debug interface busy, as a controller that stopped
    /// responding does.
    pub fn set_halted(&self, halted: bool) {
        self.reg.lock().halted = halted;
    }

    fn periph_id(&self) -> [u8; 4] {
        [0x30, 0x13, 0x04 | (self.cap.revision << 4), 0x00]
    }

    fn cr0(&self) -> Cr0 {
        let mut cr0 = Cr0(0);
        cr0.set_periph_req(self.cap.num_periph > 0);
        cr0.set_num_chnls(self.cap.num_channels - 1);
        cr0.set_num_periph_req(self.cap.num_periph.saturating_sub(1));
        cr0.set_num_events(self.cap.num_events - 1);
        cr0
    }

    fn crd(&self) -> Crd {
        let mut crd = Crd(0);
        crd.set_data_width(self.cap.max_burst_size);
        crd.set_wr_cap(7);
        crd.set_wr_q_dep(15);
        crd.set_rd_cap(7);
        crd.set_rd_q_dep(15);
        crd.set_data_buffer_dep(self.cap.mfifo_lines - 1);
        crd
    }

    fn read_channel(ch: &ChannelReg, offset: u64) -> Option<u32> {
        let val = match offset {
            0x0 => ch.sar,
            0x4 => ch.dar,
            0x8 => ch.ccr.0,
            0xc => ch.lc[0] as u32,
            0x10 => ch.lc[1] as u32,
            _ => return None,
        };
        Some(val)
    }

    pub fn read(&self, offset: u64) -> u32 {
        let reg = self.reg.lock();
        let num = self.cap.num_channels as u64;
        let val = match offset {
            DSR => {
                let mut dsr = Dsr(0);
                dsr.set_status(reg.manager.status);
                dsr.0
            }
            DPC => reg.manager.pc,
            INTEN => reg.inten,
            INT_EVENT_RIS => reg.events,
            INTMIS => reg.events & reg.inten,
            FSRD => (reg.manager.status == STATUS_FAULTING) as u32,
            FSRC => reg
                .channels
                .iter()
                .enumerate()
                .filter(|(_, ch)| ch.status == STATUS_FAULTING)
                .fold(0, |fsrc, (chan, _)| fsrc | 1 << chan),
            FTRD => reg.manager.ftr.bits(),
            DBGSTATUS if reg.halted => DbgStatus::BUSY.bits(),
            DBGSTATUS => 0,
            CR0 => self.cr0().0,
            CRD => self.crd().0,
            o if (PERIPH_ID0..PERIPH_ID0 + 0x10).contains(&o) && o & 3 == 0 => {
                self.periph_id()[((o - PERIPH_ID0) >> 2) as usize] as u32
            }
            o if (PCELL_ID0..PCELL_ID0 + 0x10).contains(&o) && o & 3 == 0 => {
                PCELL_ID[((o - PCELL_ID0) >> 2) as usize] as u32
            }
            o if (ftr(0)..ftr(0) + 4 * num).contains(&o) && o & 3 == 0 => {
                reg.channels[((o - ftr(0)) >> 2) as usize].ftr.bits()
            }
            o if (csr(0)..csr(0) + 8 * num).contains(&o) && o & 3 == 0 => {
                let ch = &reg.channels[((o - csr(0)) >> 3) as usize];
                if o & 4 == 0 {
                    let mut csr = Csr(0);
                    csr.set_status(ch.status);
                    csr.set_cns(ch.non_secure);
                    csr.0
                } else {
                    ch.pc
                }
            }
            o if (sar(0)..sar(0) + 0x20 * num).contains(&o) => {
                let ch = &reg.channels[((o - sar(0)) >> 5) as usize];
                match Self::read_channel(ch, (o - sar(0)) & 0x1f) {
                    Some(val) => val,
                    None => {
                        log::warn!("{}: read from unknown offset {offset:#x}", self.name);
                        0
                    }
                }
            }
            _ => {
                log::warn!("{}: read from unknown offset {offset:#x}", self.name);
                0
            }
        };
        log::trace!("{}: read {val:#x} from offset {offset:#x}", self.name);
        val
    }

    /// `security` is the register window the access came through.
    pub fn write(&self, security: Security, offset: u64, val: u32) {
        let mut reg = self.reg.lock();
        match offset {
            INTEN => reg.inten = val,
            INTCLR => reg.events &= !val,
            DBGINST0 => reg.dbg_inst[0] = val,
            DBGINST1 => reg.dbg_inst[1] = val,
            DBGCMD if val == 0 => self.debug_command(&mut reg, security),
            _ => {
                log::warn!(
                    "{}: write {val:#x} to unknown offset {offset:#x}",
                    self.name,
                );
            }
        }
        log::trace!("{}: write {val:#x} to offset {offset:#x}", self.name);
    }

    fn manager_fault(&self, reg: &mut Dma330Reg, fault: ManagerFault) {
        log::debug!("{}: manager fault {fault:?}", self.name);
        reg.manager.ftr |= fault | ManagerFault::DBG_INSTR;
        reg.manager.status = STATUS_FAULTING;
    }

    fn debug_command(&self, reg: &mut Dma330Reg, security: Security) {
        if reg.halted {
            log::warn!("{}: debug interface halted", self.name);
            return;
        }
        let inst0 = DbgInst0(reg.dbg_inst[0]);
        let [b2, b3, b4, b5] = reg.dbg_inst[1].to_le_bytes();
        let bytes = [inst0.insn_byte0(), inst0.insn_byte1(), b2, b3, b4, b5];
        let insn = match Insn::decode(&bytes) {
            Ok(insn) => insn,
            Err(e) => {
                log::warn!("{}: invalid debug instruction: {e}", self.name);
                if !inst0.channel_thread() {
                    self.manager_fault(reg, ManagerFault::UNDEF_INSTR);
                }
                return;
            }
        };

        if inst0.channel_thread() {
            let chan = inst0.chan();
            let Some(ch) = reg.channels.get_mut(chan as usize) else {
                log::warn!("{}: debug instruction to unknown channel {chan}", self.name);
                return;
            };
            match insn {
                Insn::Kill if ch.status != STATUS_STOPPED => {
                    ch.status = STATUS_KILLING;
                    ch.ftr = ChannelFault::empty();
                    ch.mfifo.clear();
                }
                Insn::Kill => {}
                _ => log::warn!("{}: C{chan}: unsupported debug {insn}", self.name),
            }
            return;
        }

        match insn {
            Insn::Go {
                chan,
                pc,
                non_secure,
            } => {
                if security == Security::NonSecure && !non_secure {
                    return self.manager_fault(reg, ManagerFault::DMAGO_ERR);
                }
                let Some(ch) = reg.channels.get_mut(chan as usize) else {
                    return self.manager_fault(reg, ManagerFault::OPERAND_INVALID);
                };
                if ch.status != STATUS_STOPPED {
                    log::warn!("{}: C{chan}: DMAGO ignored while busy", self.name);
                    return;
                }
                *ch = ChannelReg {
                    status: STATUS_EXECUTING,
                    pc,
                    non_secure,
                    ..Default::default()
                };
                log::debug!("{}: C{chan}: started at {pc:#x}", self.name);
            }
            Insn::Kill => {
                reg.manager.status = STATUS_STOPPED;
                reg.manager.ftr = ManagerFault::empty();
            }
            _ => self.manager_fault(reg, ManagerFault::UNDEF_INSTR),
        }
    }

    fn check_periph(&self, periph: u8) -> Result<(), ChannelFault> {
        if periph >= self.cap.num_periph {
            return Err(ChannelFault::CH_PERIPH_ERR);
        }
        Ok(())
    }

    fn check_event(&self, event: u8) -> Result<(), ChannelFault> {
        if event >= self.cap.num_events {
            return Err(ChannelFault::CH_EVNT_ERR);
        }
        Ok(())
    }

    fn load(&self, ch: &mut ChannelReg, ram: &Ram) -> Result<(), ChannelFault> {
        let len = ch.ccr.src_burst_bytes() as usize;
        if ch.mfifo.len() + len > self.cap.mfifo_bytes() as usize {
            return Err(ChannelFault::MFIFO_ERR);
        }
        let mut buf = vec![0; len];
        if ram.read(ch.sar as u64, &mut buf).is_err() {
            return Err(ChannelFault::DATA_READ_ERR);
        }
        ch.mfifo.extend(buf);
        if ch.ccr.src_inc() {
            ch.sar = ch.sar.wrapping_add(len as u32);
        }
        Ok(())
    }

    fn store(&self, ch: &mut ChannelReg, ram: &Ram) -> Result<(), ChannelFault> {
        let len = ch.ccr.dst_burst_bytes() as usize;
        if ch.mfifo.len() < len {
            return Err(ChannelFault::ST_DATA_UNAVAILABLE);
        }
        let mut buf: Vec<_> = ch.mfifo.drain(..len).collect();
        swap_endian(&mut buf, ch.ccr.endian_swap());
        if ram.write(ch.dar as u64, &buf).is_err() {
            return Err(ChannelFault::DATA_WRITE_ERR);
        }
        if ch.ccr.dst_inc() {
            ch.dar = ch.dar.wrapping_add(len as u32);
        }
        Ok(())
    }

    fn store_zero(&self, ch: &mut ChannelReg, ram: &Ram) -> Result<(), ChannelFault> {
        let len = ch.ccr.dst_burst_bytes() as usize;
        if ram.fill(ch.dar as u64, len, 0).is_err() {
            return Err(ChannelFault::DATA_WRITE_ERR);
        }
        if ch.ccr.dst_inc() {
            ch.dar = ch.dar.wrapping_add(len as u32);
        }
        Ok(())
    }

    fn execute(
        &self,
        chan: u8,
        ch: &mut ChannelReg,
        events: &mut u32,
        ram: &Ram,
    ) -> Result<(), ChannelFault> {
        let mut buf = [0; MAX_INSN_LEN];
        let len = ram.read_avail(ch.pc as u64, &mut buf);
        let insn = match Insn::decode(&buf[..len]) {
            Ok(insn) => insn,
            Err(isa::Error::Truncated { .. }) => return Err(ChannelFault::INSTR_FETCH_ERR),
            Err(isa::Error::UnknownOpcode { .. }) => return Err(ChannelFault::UNDEF_INSTR),
            Err(isa::Error::InvalidOperand { .. }) => {
                return Err(ChannelFault::OPERAND_INVALID);
            }
        };
        log::trace!("{}: C{chan}: {:#x}: {insn}", self.name, ch.pc);

        let next = ch.pc.wrapping_add(insn.len() as u32);
        match insn {
            Insn::End => {
                ch.status = STATUS_COMPLETING;
                return Ok(());
            }
            Insn::Kill => {
                ch.status = STATUS_KILLING;
                return Ok(());
            }
            Insn::Nop | Insn::Rmb | Insn::Wmb => {}
            Insn::FlushP { periph } => self.check_periph(periph)?,
            Insn::Mov { reg, imm } => match reg {
                MovReg::Sar => ch.sar = imm,
                MovReg::Dar => ch.dar = imm,
                MovReg::Ccr => {
                    let ccr = Ccr(imm);
                    let ns = |prot: u8| prot & PROT_NON_SECURE != 0;
                    if ch.non_secure && !(ns(ccr.src_prot()) && ns(ccr.dst_prot())) {
                        return Err(ChannelFault::CH_RDWR_ERR);
                    }
                    ch.ccr = ccr;
                }
            },
            Insn::AddH { reg, imm } => match reg {
                AddrReg::Sar => ch.sar = ch.sar.wrapping_add(imm as u32),
                AddrReg::Dar => ch.dar = ch.dar.wrapping_add(imm as u32),
            },
            Insn::Lp { lc, iter } => ch.lc[lc.index()] = iter.wrapping_sub(1) as u8,
            Insn::LpEnd { lc, cond, bjump } => {
                let counter = &mut ch.lc[lc.index()];
                if cond_met(ch.req_burst, cond) && *counter != 0 {
                    *counter -= 1;
                    ch.pc = ch.pc.wrapping_sub(bjump as u32);
                    return Ok(());
                }
            }
            Insn::Ld(cond) => {
                if cond_met(ch.req_burst, cond) {
                    self.load(ch, ram)?;
                }
            }
            Insn::Ldp { cond, periph } => {
                self.check_periph(periph)?;
                if periph_cond_met(ch.req_burst, cond) {
                    self.load(ch, ram)?;
                }
            }
            Insn::St(cond) => {
                if cond_met(ch.req_burst, cond) {
                    self.store(ch, ram)?;
                }
            }
            Insn::Stp { cond, periph } => {
                self.check_periph(periph)?;
                if periph_cond_met(ch.req_burst, cond) {
                    self.store(ch, ram)?;
                }
            }
            Insn::Stz => self.store_zero(ch, ram)?,
            Insn::Wfp { cond, periph } => {
                self.check_periph(periph)?;
                // Emulated peripherals always have a request pending.
                ch.req_burst = cond != WfpCond::Single;
            }
            Insn::Sev { event } => {
                self.check_event(event)?;
                *events |= 1 << event;
            }
            Insn::Wfe { event, .. } => {
                self.check_event(event)?;
                if *events & (1 << event) == 0 {
                    ch.wfe_event = event;
                    ch.status = STATUS_WFE;
                    return Ok(());
                }
                *events &= !(1 << event);
            }
            Insn::Go { .. } => return Err(ChannelFault::UNDEF_INSTR),
        }
        ch.pc = next;
        Ok(())
    }

    /// Advances one channel by one instruction or state transition.
    /// Returns false if the channel cannot make further progress now.
    fn tick(&self, chan: u8, ch: &mut ChannelReg, events: &mut u32, ram: &Ram) -> bool {
        match ch.status {
            STATUS_COMPLETING | STATUS_KILLING => {
                ch.status = STATUS_STOPPED;
                ch.mfifo.clear();
                false
            }
            STATUS_FAULT_COMPLETING => {
                ch.status = STATUS_FAULTING;
                false
            }
            STATUS_EXECUTING => {
                if let Err(fault) = self.execute(chan, ch, events, ram) {
                    log::debug!("{}: C{chan}: fault {fault:?} at {:#x}", self.name, ch.pc);
                    ch.ftr = fault;
                    ch.status = STATUS_FAULT_COMPLETING;
                    ch.mfifo.clear();
                }
                true
            }
            STATUS_WFE => {
                let bit = 1 << ch.wfe_event;
                if *events & bit == 0 {
                    return false;
                }
                *events &= !bit;
                ch.pc = ch.pc.wrapping_add(2);
                ch.status = STATUS_EXECUTING;
                true
            }
            _ => false,
        }
    }

    /// Runs every channel for up to `steps` ticks.
    pub fn step(&self, ram: &Ram, steps: u32) {
        let mut reg = self.reg.lock();
        let Dma330Reg {
            channels, events, ..
        } = &mut *reg;
        for (chan, ch) in channels.iter_mut().enumerate() {
            for _ in 0..steps {
                if !self.tick(chan as u8, ch, events, ram) {
                    break;
                }
            }
        }
    }
}

/// A [`Platform`] backed by an emulated controller and memory.
///
/// Addresses in either register window of the controller go to the
/// controller, everything else goes to memory.
#[derive(Debug)]
pub struct Emulator {
    base: u64,
    dmac: Dma330,
    ram: Ram,
    steps_per_ms: u32,
}

impl Emulator {
    pub fn new(cap: &'static Capability, base: u64, ram: Ram) -> Self {
        Emulator {
            base,
            dmac: Dma330::new(cap, base),
            ram,
            steps_per_ms: DEFAULT_STEPS_PER_MS,
        }
    }

    pub fn with_steps_per_ms(mut self, steps: u32) -> Self {
        self.steps_per_ms = steps;
        self
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn dmac(&self) -> &Dma330 {
        &self.dmac
    }

    pub fn run(&self, steps: u32) {
        self.dmac.step(&self.ram, steps)
    }

    fn window(&self, addr: u64) -> Option<(Security, u64)> {
        let cap = self.dmac.capability();
        [Security::Secure, Security::NonSecure]
            .into_iter()
            .find_map(|security| {
                let start = self.base + cap.window(security);
                (start..start + WINDOW_SIZE)
                    .contains(&addr)
                    .then(|| (security, addr - start))
            })
    }
}

impl Platform for Emulator {
    fn read32(&self, addr: u64) -> u32 {
        if let Some((_, offset)) = self.window(addr) {
            return self.dmac.read(offset);
        }
        match self.ram.read_u32(addr) {
            Ok(val) => val,
            Err(e) => {
                log::warn!("{e}");
                0
            }
        }
    }

    fn write32(&self, addr: u64, val: u32) {
        if let Some((security, offset)) = self.window(addr) {
            return self.dmac.write(security, offset, val);
        }
        if let Err(e) = self.ram.write_u32(addr, val) {
            log::warn!("{e}");
        }
    }

    fn read8(&self, addr: u64) -> u8 {
        if let Some((_, offset)) = self.window(addr) {
            return (self.dmac.read(offset & !3) >> ((offset & 3) * 8)) as u8;
        }
        let mut buf = [0];
        if let Err(e) = self.ram.read(addr, &mut buf) {
            log::warn!("{e}");
        }
        buf[0]
    }

    fn write8(&self, addr: u64, val: u8) {
        if self.window(addr).is_some() {
            log::warn!("{}: byte write {val:#x} to {addr:#x} ignored", self.dmac.name);
            return;
        }
        if let Err(e) = self.ram.write(addr, &[val]) {
            log::warn!("{e}");
        }
    }

    fn delay_ms(&self, ms: u32) {
        self.run(self.steps_per_ms.saturating_mul(ms))
    }
}

#[cfg(test)]
#[path = "emu_test.rs"]
mod tests;
