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

//! Register map of the DMA-330.
//! See: https://developer.arm.com/documentation/ddi0424/d/programmers-model/register-summary

use bitfield::bitfield;
use bitflags::bitflags;

/// RO DMA Manager Status Register
pub const DSR: u64 = 0x000;
/// RO DMA Program Counter Register
pub const DPC: u64 = 0x004;
/// RW Interrupt Enable Register
pub const INTEN: u64 = 0x020;
/// RO Event-Interrupt Raw Status Register
pub const INT_EVENT_RIS: u64 = 0x024;
/// RO Interrupt Status Register
pub const INTMIS: u64 = 0x028;
/// WO Interrupt Clear Register
pub const INTCLR: u64 = 0x02C;
/// RO Fault Status DMA Manager Register
pub const FSRD: u64 = 0x030;
/// RO Fault Status DMA Channel Register
pub const FSRC: u64 = 0x034;
/// RO Fault Type DMA Manager Register
pub const FTRD: u64 = 0x038;
/// RO Debug Status Register
pub const DBGSTATUS: u64 = 0xD00;
/// WO Debug Command Register
pub const DBGCMD: u64 = 0xD04;
/// WO Debug Instruction-0 Register
pub const DBGINST0: u64 = 0xD08;
/// WO Debug Instruction-1 Register
pub const DBGINST1: u64 = 0xD0C;
/// RO Configuration Register 0
pub const CR0: u64 = 0xE00;
/// RO DMA Configuration Register
pub const CRD: u64 = 0xE14;
/// RO Peripheral Identification Registers 0-3
pub const PERIPH_ID0: u64 = 0xFE0;
/// RO Component Identification Registers 0-3
pub const PCELL_ID0: u64 = 0xFF0;

/// Size of one register window.
pub const WINDOW_SIZE: u64 = 0x1000;

/// Fault Type DMA Channel Register
pub const fn ftr(chan: u8) -> u64 {
    0x040 + chan as u64 * 0x4
}

/// Channel Status Register
pub const fn csr(chan: u8) -> u64 {
    0x100 + chan as u64 * 0x8
}

/// Channel Program Counter Register
pub const fn cpc(chan: u8) -> u64 {
    0x104 + chan as u64 * 0x8
}

const fn chan_axi(chan: u8) -> u64 {
    0x400 + chan as u64 * 0x20
}

/// Source Address Register
pub const fn sar(chan: u8) -> u64 {
    chan_axi(chan)
}

/// Destination Address Register
pub const fn dar(chan: u8) -> u64 {
    chan_axi(chan) + 0x4
}

/// Channel Control Register
pub const fn ccr(chan: u8) -> u64 {
    chan_axi(chan) + 0x8
}

/// Loop Counter 0 Register
pub const fn lc0(chan: u8) -> u64 {
    chan_axi(chan) + 0xC
}

/// Loop Counter 1 Register
pub const fn lc1(chan: u8) -> u64 {
    chan_axi(chan) + 0x10
}

// Raw 4-bit thread status codes of DSR and CSR(n).
pub const STATUS_STOPPED: u8 = 0x0;
pub const STATUS_EXECUTING: u8 = 0x1;
pub const STATUS_CACHE_MISS: u8 = 0x2;
pub const STATUS_UPDATE_PC: u8 = 0x3;
pub const STATUS_WFE: u8 = 0x4;
pub const STATUS_AT_BARRIER: u8 = 0x5;
pub const STATUS_QUEUE_BUSY: u8 = 0x6;
pub const STATUS_WFP: u8 = 0x7;
pub const STATUS_KILLING: u8 = 0x8;
pub const STATUS_COMPLETING: u8 = 0x9;
pub const STATUS_FAULT_COMPLETING: u8 = 0xE;
pub const STATUS_FAULTING: u8 = 0xF;

/// `PERIPH_ID0..3` assembled, revision nibble masked off.
pub const PERIPH_ID: u32 = 0x0004_1330;
pub const PERIPH_ID_MASK: u32 = 0x000F_FFFF;
/// `PCELL_ID0..3` assembled.
pub const PCELL_ID: u32 = 0xB105_F00D;

// AXI cache attributes for the cache_ctrl fields of CCR.
pub const CACHE_BUFFERABLE: u8 = 0b001;
pub const CACHE_WRITE_BACK: u8 = 0b111;

// AXI protection attributes for the prot_ctrl fields of CCR.
pub const PROT_PRIVILEGED: u8 = 1 << 0;
pub const PROT_NON_SECURE: u8 = 1 << 1;
pub const PROT_INSN: u8 = 1 << 2;

bitfield! {
    /// Channel Control Register.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct Ccr(u32);
    impl Debug;
    pub src_inc, set_src_inc: 0;
    /// log2 of the bytes per beat.
    pub u8, src_burst_size, set_src_burst_size: 3, 1;
    /// Beats per burst minus one.
    pub u8, src_burst_len, set_src_burst_len: 7, 4;
    pub u8, src_prot, set_src_prot: 10, 8;
    pub u8, src_cache, set_src_cache: 13, 11;
    pub dst_inc, set_dst_inc: 14;
    pub u8, dst_burst_size, set_dst_burst_size: 17, 15;
    pub u8, dst_burst_len, set_dst_burst_len: 21, 18;
    pub u8, dst_prot, set_dst_prot: 24, 22;
    pub u8, dst_cache, set_dst_cache: 27, 25;
    pub u8, endian_swap, set_endian_swap: 30, 28;
}

impl Ccr {
    /// Bytes moved by one source burst.
    pub fn src_burst_bytes(&self) -> u32 {
        (1 << self.src_burst_size()) * (self.src_burst_len() as u32 + 1)
    }

    /// Bytes moved by one destination burst.
    pub fn dst_burst_bytes(&self) -> u32 {
        (1 << self.dst_burst_size()) * (self.dst_burst_len() as u32 + 1)
    }
}

bitfield! {
    /// DMA Manager Status Register.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct Dsr(u32);
    impl Debug;
    pub u8, status, set_status: 3, 0;
    pub u8, wakeup_event, set_wakeup_event: 8, 4;
    pub dns, set_dns: 9;
}

bitfield! {
    /// Channel Status Register.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct Csr(u32);
    impl Debug;
    pub u8, status, set_status: 3, 0;
    pub u8, wakeup_number, set_wakeup_number: 8, 4;
    pub dmawfp_b_ns, set_dmawfp_b_ns: 14;
    pub dmawfp_periph, set_dmawfp_periph: 15;
    pub cns, set_cns: 21;
}

bitfield! {
    /// Debug Instruction-0 Register.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct DbgInst0(u32);
    impl Debug;
    /// 0 selects the manager thread, 1 a channel thread.
    pub channel_thread, set_channel_thread: 0;
    pub u8, chan, set_chan: 10, 8;
    pub u8, insn_byte0, set_insn_byte0: 23, 16;
    pub u8, insn_byte1, set_insn_byte1: 31, 24;
}

bitfield! {
    /// Configuration Register 0.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct Cr0(u32);
    impl Debug;
    pub periph_req, set_periph_req: 0;
    pub boot_en, set_boot_en: 1;
    pub mgr_ns_at_rst, set_mgr_ns_at_rst: 2;
    /// Number of channels minus one.
    pub u8, num_chnls, set_num_chnls: 6, 4;
    /// Number of peripheral request interfaces minus one.
    pub u8, num_periph_req, set_num_periph_req: 16, 12;
    /// Number of events minus one.
    pub u8, num_events, set_num_events: 21, 17;
}

bitfield! {
    /// DMA Configuration Register.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct Crd(u32);
    impl Debug;
    /// log2 of the AXI data bus width in bytes.
    pub u8, data_width, set_data_width: 2, 0;
    pub u8, wr_cap, set_wr_cap: 6, 4;
    pub u8, wr_q_dep, set_wr_q_dep: 11, 8;
    pub u8, rd_cap, set_rd_cap: 14, 12;
    pub u8, rd_q_dep, set_rd_q_dep: 19, 16;
    pub u16, data_buffer_dep, set_data_buffer_dep: 29, 20;
}

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DbgStatus: u32 {
        const BUSY = 1 << 0;
    }
}

bitflags! {
    /// Fault Type DMA Channel Register.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelFault: u32 {
        /// Undefined instruction.
        const UNDEF_INSTR = 1 << 0;
        /// Invalid operand for the instruction.
        const OPERAND_INVALID = 1 << 1;
        /// DMASEV/DMAWFE with an inaccessible event.
        const CH_EVNT_ERR = 1 << 5;
        /// DMAWFP/DMALDP/DMASTP/DMAFLUSHP with an inaccessible peripheral.
        const CH_PERIPH_ERR = 1 << 6;
        /// Secure CCR settings in a non-secure thread.
        const CH_RDWR_ERR = 1 << 7;
        /// MFIFO too small for the program.
        const MFIFO_ERR = 1 << 12;
        /// DMAST without enough data in the MFIFO.
        const ST_DATA_UNAVAILABLE = 1 << 13;
        const INSTR_FETCH_ERR = 1 << 16;
        const DATA_WRITE_ERR = 1 << 17;
        const DATA_READ_ERR = 1 << 18;
        /// Fault caused by an instruction from the debug interface.
        const DBG_INSTR = 1 << 30;
        const LOCKUP_ERR = 1 << 31;
    }
}

bitflags! {
    /// Fault Type DMA Manager Register.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ManagerFault: u32 {
        const UNDEF_INSTR = 1 << 0;
        const OPERAND_INVALID = 1 << 1;
        /// DMAGO to a channel with a higher security level.
        const DMAGO_ERR = 1 << 4;
        const MGR_EVNT_ERR = 1 << 5;
        const INSTR_FETCH_ERR = 1 << 16;
        const DBG_INSTR = 1 << 30;
    }
}
