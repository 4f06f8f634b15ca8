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

pub mod state;

use std::fmt::{self, Display, Formatter};

use serde::Deserialize;
use serde_aco::Help;
use snafu::{Location, Snafu};

use crate::isa::{Insn, MAX_INSN_LEN};
use crate::plan::TransferRequest;
use crate::platform::Platform;
use crate::program::{self, Microprogram, ProgramBuffer};
use crate::reg::{
    CR0, CRD, ChannelFault, Cr0, Crd, DBGCMD, DBGINST0, DBGINST1, DBGSTATUS, DPC, DSR, DbgInst0,
    DbgStatus, FTRD, ManagerFault, PCELL_ID, PCELL_ID0, PERIPH_ID, PERIPH_ID_MASK, PERIPH_ID0,
    cpc, csr, ftr,
};

use self::state::ChannelState;

/// A DMA thread of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thread {
    Manager,
    Channel(u8),
}

impl Display for Thread {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Thread::Manager => write!(f, "manager"),
            Thread::Channel(chan) => write!(f, "channel {chan}"),
        }
    }
}

/// Decoded content of FTR(n) or FTRD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Channel(ChannelFault),
    Manager(ManagerFault),
}

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("{thread} is busy in state {state:?}"))]
    Busy {
        thread: Thread,
        state: ChannelState,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("{thread} faulted at {pc:#x}: {fault:x?}"))]
    Fault {
        thread: Thread,
        pc: u32,
        /// `pc` relative to the start of the program, if one was started
        /// on this context.
        offset: Option<u32>,
        fault: FaultType,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("{thread} is still {state:?} after {waited_ms} ms"))]
    Timeout {
        thread: Thread,
        state: ChannelState,
        waited_ms: u32,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("DMAC halted: debug interface busy for {timeout_ms} ms"))]
    DebugTimeout {
        timeout_ms: u32,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("{thread} reports an invalid state"))]
    InvalidState {
        thread: Thread,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Programs can only be started on a channel thread"))]
    NotChannel {
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Channel {chan} is not in [0, {num})"))]
    ChannelOutOfRange {
        chan: u8,
        num: u8,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Unknown peripheral id {id:#x}"))]
    UnknownPeriphId {
        id: u32,
        #[snafu(implicit)]
        _location: Location,
    },
    #[snafu(display("Unknown component id {id:#x}"))]
    UnknownPcellId {
        id: u32,
        #[snafu(implicit)]
        _location: Location,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fixed properties of one controller generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub num_channels: u8,
    /// log2 of the AXI data bus width in bytes.
    pub max_burst_size: u8,
    pub num_periph: u8,
    pub num_events: u8,
    /// Offset of the secure register window from the controller base.
    pub secure_offset: u64,
    /// Offset of the non-secure register window from the controller base.
    pub nonsecure_offset: u64,
    pub revision: u8,
    /// Lines of the shared MFIFO, each one data bus wide.
    pub mfifo_lines: u16,
}

impl Capability {
    pub fn mfifo_bytes(&self) -> u32 {
        self.mfifo_lines as u32 * (1 << self.max_burst_size)
    }

    pub fn window(&self, security: Security) -> u64 {
        match security {
            Security::Secure => self.secure_offset,
            Security::NonSecure => self.nonsecure_offset,
        }
    }
}

pub const PL330: Capability = Capability {
    name: "pl330",
    num_channels: 8,
    max_burst_size: 3,
    num_periph: 32,
    num_events: 32,
    secure_offset: 0x0,
    nonsecure_offset: 0x1000,
    revision: 2,
    mfifo_lines: 64,
};

pub const DMA330: Capability = Capability {
    name: "dma330",
    num_channels: 8,
    max_burst_size: 4,
    num_periph: 32,
    num_events: 32,
    secure_offset: 0x1000,
    nonsecure_offset: 0x0,
    revision: 3,
    mfifo_lines: 128,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Help)]
pub enum Variant {
    /// PL330 with a 64-bit data bus.
    #[default]
    #[serde(alias = "pl330")]
    Pl330,
    /// DMA-330 with a 128-bit data bus.
    #[serde(alias = "dma330")]
    Dma330,
}

impl Variant {
    pub fn capability(self) -> &'static Capability {
        match self {
            Variant::Pl330 => &PL330,
            Variant::Dma330 => &DMA330,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Help)]
pub enum Security {
    /// Secure accesses.
    #[default]
    #[serde(alias = "secure")]
    Secure,
    /// Non-secure accesses.
    #[serde(alias = "non_secure", alias = "ns")]
    NonSecure,
}

fn default_timeout_ms() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Help)]
pub struct DmacConfig {
    /// Controller generation. [default: pl330]
    #[serde(default)]
    pub variant: Variant,
    /// Bus address of the controller.
    pub base: u64,
    /// Register window used to drive the controller. [default: secure]
    #[serde(default)]
    pub security: Security,
    /// Milliseconds to wait for the debug interface to accept an
    /// instruction. [default: 100]
    #[serde(default = "default_timeout_ms")]
    pub debug_timeout_ms: u32,
    /// Milliseconds to wait for a channel to settle before start and
    /// kill. [default: 100]
    #[serde(default = "default_timeout_ms")]
    pub settle_timeout_ms: u32,
}

impl DmacConfig {
    pub fn new(variant: Variant, base: u64) -> Self {
        DmacConfig {
            variant,
            base,
            security: Security::Secure,
            debug_timeout_ms: default_timeout_ms(),
            settle_timeout_ms: default_timeout_ms(),
        }
    }
}

/// How long [`ExecutionContext::finish`] may poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Millis(u32),
    Unbounded,
}

/// Configuration read back from the identification and configuration
/// registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwInfo {
    pub revision: u8,
    pub num_channels: u8,
    pub num_periph: u8,
    pub num_events: u8,
    pub data_width: u8,
    pub mfifo_bytes: u32,
    pub manager_ns: bool,
}

#[derive(Debug)]
pub struct Dmac<P> {
    platform: P,
    cap: &'static Capability,
    regs: u64,
    security: Security,
    debug_timeout_ms: u32,
    settle_timeout_ms: u32,
}

impl<P> Dmac<P>
where
    P: Platform,
{
    pub fn new(platform: P, config: &DmacConfig) -> Self {
        let cap = config.variant.capability();
        Dmac {
            platform,
            cap,
            regs: config.base + cap.window(config.security),
            security: config.security,
            debug_timeout_ms: config.debug_timeout_ms,
            settle_timeout_ms: config.settle_timeout_ms,
        }
    }

    pub fn capability(&self) -> &'static Capability {
        self.cap
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn security(&self) -> Security {
        self.security
    }

    /// Bus address of the register window in use.
    pub fn regs(&self) -> u64 {
        self.regs
    }

    fn read(&self, reg: u64) -> u32 {
        self.platform.read32(self.regs + reg)
    }

    fn write(&self, reg: u64, val: u32) {
        self.platform.write32(self.regs + reg, val)
    }

    fn read_id(&self, reg: u64) -> u32 {
        let mut id = 0;
        for i in 0..4 {
            let b = self.platform.read8(self.regs + reg + i * 4);
            id |= (b as u32) << (i * 8);
        }
        id
    }

    /// Identifies the controller and reads its configuration.
    pub fn probe(&self) -> Result<HwInfo> {
        let id = self.read_id(PERIPH_ID0);
        if id & PERIPH_ID_MASK != PERIPH_ID {
            log::error!("{}: unknown peripheral id {id:#x}", self.cap.name);
            return error::UnknownPeriphId { id }.fail();
        }
        let pcell = self.read_id(PCELL_ID0);
        if pcell != PCELL_ID {
            return error::UnknownPcellId { id: pcell }.fail();
        }
        let cr0 = Cr0(self.read(CR0));
        let crd = Crd(self.read(CRD));
        let info = HwInfo {
            revision: ((id >> 20) & 0xf) as u8,
            num_channels: cr0.num_chnls() + 1,
            num_periph: if cr0.periph_req() {
                cr0.num_periph_req() + 1
            } else {
                0
            },
            num_events: cr0.num_events() + 1,
            data_width: crd.data_width(),
            mfifo_bytes: (crd.data_buffer_dep() as u32 + 1) << crd.data_width(),
            manager_ns: cr0.mgr_ns_at_rst(),
        };
        if info.num_channels != self.cap.num_channels
            || info.data_width != self.cap.max_burst_size
        {
            log::warn!(
                "{}: hardware reports {} channels and a 2^{}-byte bus",
                self.cap.name,
                info.num_channels,
                info.data_width
            );
        }
        log::info!("{}: r{}, {info:x?}", self.cap.name, info.revision);
        Ok(info)
    }

    pub fn manager(&self) -> ExecutionContext<'_, P> {
        ExecutionContext {
            dmac: self,
            thread: Thread::Manager,
            program_base: None,
        }
    }

    pub fn context(&self, chan: u8) -> Result<ExecutionContext<'_, P>> {
        let num = self.cap.num_channels;
        if chan >= num {
            return error::ChannelOutOfRange { chan, num }.fail();
        }
        Ok(ExecutionContext {
            dmac: self,
            thread: Thread::Channel(chan),
            program_base: None,
        })
    }

    pub fn plan_and_build<'a>(
        &self,
        req: &TransferRequest,
        buf: ProgramBuffer<'a>,
    ) -> program::Result<Microprogram<'a>> {
        program::plan_and_build(req, self.cap, buf)
    }

    /// The program runs in the security state of the register window in
    /// use.
    pub fn plan_and_build_zero_fill<'a>(
        &self,
        dst: u32,
        size: u32,
        buf: ProgramBuffer<'a>,
    ) -> program::Result<Microprogram<'a>> {
        program::plan_and_build_zero_fill(self.cap, dst, size, self.security, buf)
    }

    fn wait_debug_idle(&self) -> Result<()> {
        let mut waited = 0;
        loop {
            let status = DbgStatus::from_bits_retain(self.read(DBGSTATUS));
            if !status.contains(DbgStatus::BUSY) {
                return Ok(());
            }
            if waited >= self.debug_timeout_ms {
                log::error!("{}: DMAC halted", self.cap.name);
                return error::DebugTimeout {
                    timeout_ms: self.debug_timeout_ms,
                }
                .fail();
            }
            self.platform.delay_ms(1);
            waited += 1;
        }
    }

    /// Fault type and program counter of a faulting thread.
    fn fault_info(&self, thread: Thread) -> (FaultType, u32) {
        match thread {
            Thread::Manager => (
                FaultType::Manager(ManagerFault::from_bits_retain(self.read(FTRD))),
                self.read(DPC),
            ),
            Thread::Channel(chan) => (
                FaultType::Channel(ChannelFault::from_bits_retain(self.read(ftr(chan)))),
                self.read(cpc(chan)),
            ),
        }
    }

    /// Runs one instruction on `thread` through the debug interface.
    fn execute_dbginsn(&self, insn: &Insn, thread: Thread) -> Result<()> {
        let mut bytes = [0u8; MAX_INSN_LEN];
        insn.encode(&mut bytes);

        let mut inst0 = DbgInst0(0);
        if let Thread::Channel(chan) = thread {
            inst0.set_channel_thread(true);
            inst0.set_chan(chan);
        }
        inst0.set_insn_byte0(bytes[0]);
        inst0.set_insn_byte1(bytes[1]);
        let inst1 = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);

        self.wait_debug_idle()?;
        self.write(DBGINST0, inst0.0);
        self.write(DBGINST1, inst1);
        log::trace!("{}: {thread}: debug {insn}", self.cap.name);
        self.write(DBGCMD, 0);
        Ok(())
    }
}

/// Drives one DMA thread.
#[derive(Debug)]
pub struct ExecutionContext<'d, P> {
    dmac: &'d Dmac<P>,
    thread: Thread,
    /// Bus address of the program started on this context.
    program_base: Option<u32>,
}

impl<P> ExecutionContext<'_, P>
where
    P: Platform,
{
    pub fn thread(&self) -> Thread {
        self.thread
    }

    pub fn poll_state(&self) -> ChannelState {
        let raw = match self.thread {
            Thread::Manager => self.dmac.read(DSR),
            Thread::Channel(chan) => self.dmac.read(csr(chan)),
        };
        ChannelState::from_raw(self.thread, raw as u8)
    }

    pub fn program_counter(&self) -> u32 {
        match self.thread {
            Thread::Manager => self.dmac.read(DPC),
            Thread::Channel(chan) => self.dmac.read(cpc(chan)),
        }
    }

    fn wait_until(
        &self,
        done: impl Fn(ChannelState) -> bool,
        timeout: Timeout,
    ) -> Result<ChannelState> {
        let mut waited = 0u32;
        loop {
            let state = self.poll_state();
            if done(state) {
                return Ok(state);
            }
            if let Timeout::Millis(ms) = timeout {
                if waited >= ms {
                    return error::Timeout {
                        thread: self.thread,
                        state,
                        waited_ms: waited,
                    }
                    .fail();
                }
            }
            self.dmac.platform.delay_ms(1);
            waited = waited.saturating_add(1);
        }
    }

    fn settle(&self, done: impl Fn(ChannelState) -> bool) -> Result<ChannelState> {
        self.wait_until(done, Timeout::Millis(self.dmac.settle_timeout_ms))
    }

    fn settle_fault_completing(&self, state: ChannelState) -> Result<ChannelState> {
        if state != ChannelState::FaultCompleting {
            return Ok(state);
        }
        self.settle(|s| matches!(s, ChannelState::Faulting | ChannelState::Killing))
    }

    /// Starts `program` on this channel.
    ///
    /// A channel left faulting by a previous program is killed first, and
    /// so is a manager left faulting by a rejected DMAGO.
    pub fn start(&mut self, program: &Microprogram) -> Result<()> {
        let Thread::Channel(chan) = self.thread else {
            return error::NotChannel.fail();
        };

        let mut state = self.settle_fault_completing(self.poll_state())?;
        if state == ChannelState::Faulting {
            self.dmac.execute_dbginsn(&Insn::Kill, self.thread)?;
            state = ChannelState::Killing;
        }
        if matches!(state, ChannelState::Killing | ChannelState::Completing) {
            state = self.settle(|s| s == ChannelState::Stopped)?;
        }
        match state {
            ChannelState::Stopped => {}
            ChannelState::Invalid => {
                return error::InvalidState {
                    thread: self.thread,
                }
                .fail();
            }
            state => {
                return error::Busy {
                    thread: self.thread,
                    state,
                }
                .fail();
            }
        }

        let manager = self.dmac.manager();
        if manager.poll_state() == ChannelState::Faulting {
            let (fault, pc) = self.dmac.fault_info(Thread::Manager);
            log::warn!(
                "{}: manager left faulting at {pc:#x}: {fault:x?}",
                self.dmac.cap.name
            );
            self.dmac.execute_dbginsn(&Insn::Kill, Thread::Manager)?;
            manager.settle(|s| s == ChannelState::Stopped)?;
        }

        let go = Insn::Go {
            chan,
            pc: program.bus_addr(),
            non_secure: program.non_secure(),
        };
        self.dmac.execute_dbginsn(&go, Thread::Manager)?;
        if manager.poll_state() == ChannelState::Faulting {
            let (fault, pc) = self.dmac.fault_info(Thread::Manager);
            log::error!("{}: DMAGO to {} rejected: {fault:x?}", self.dmac.cap.name, self.thread);
            return error::Fault {
                thread: Thread::Manager,
                pc,
                offset: None,
                fault,
            }
            .fail();
        }
        self.program_base = Some(program.bus_addr());
        log::debug!(
            "{}: {}: started {} bytes at {:#x}",
            self.dmac.cap.name,
            self.thread,
            program.len(),
            program.bus_addr()
        );
        Ok(())
    }

    /// Stops the thread. Does nothing if it is already stopping or stopped.
    pub fn kill(&mut self) -> Result<()> {
        let state = self.settle_fault_completing(self.poll_state())?;
        if !matches!(
            state,
            ChannelState::Completing | ChannelState::Killing | ChannelState::Stopped
        ) {
            self.dmac.execute_dbginsn(&Insn::Kill, self.thread)?;
            log::debug!("{}: {}: killed in {state:?}", self.dmac.cap.name, self.thread);
        }
        self.program_base = None;
        Ok(())
    }

    /// Waits for the thread to stop, reporting where it faulted otherwise.
    pub fn finish(&mut self, timeout: Timeout) -> Result<()> {
        let state = self.wait_until(
            |s| matches!(s, ChannelState::Stopped | ChannelState::Faulting),
            timeout,
        )?;
        if state == ChannelState::Stopped {
            self.program_base = None;
            return Ok(());
        }

        let (fault, pc) = self.dmac.fault_info(self.thread);
        let offset = self.program_base.map(|base| pc.wrapping_sub(base));
        log::error!(
            "{}: {}: fault {fault:x?} at {pc:#x}, program offset {offset:x?}",
            self.dmac.cap.name,
            self.thread
        );
        error::Fault {
            thread: self.thread,
            pc,
            offset,
            fault,
        }
        .fail()
    }
}

#[cfg(test)]
#[path = "dmac_test.rs"]
mod tests;
