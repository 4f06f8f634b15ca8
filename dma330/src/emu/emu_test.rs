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

use rstest::{fixture, rstest};

use crate::dmac::{DMA330, PL330};
use crate::isa::{Cond, Insn, MovReg};
use crate::plan::{Swap, TransferRequest};
use crate::platform::Platform;
use crate::program::{ProgramBuffer, plan_and_build};
use crate::reg::{
    CR0, CRD, ChannelFault, Ccr, Cr0, Crd, DBGCMD, DBGINST0, DBGINST1, DBGSTATUS, DSR, DbgInst0,
    FSRC, FTRD, ManagerFault, PCELL_ID, PCELL_ID0, PERIPH_ID, PERIPH_ID0, PROT_PRIVILEGED,
    STATUS_COMPLETING, STATUS_EXECUTING, STATUS_FAULT_COMPLETING, STATUS_FAULTING,
    STATUS_KILLING, STATUS_STOPPED, STATUS_WFE, cpc, csr, ftr,
};

use super::ram::Ram;
use super::Emulator;

const BASE: u64 = 0x2000_0000;
const PROGRAM: u32 = 0x8000;

#[fixture]
fn emu() -> Emulator {
    Emulator::new(&PL330, BASE, Ram::new(0, 0x10000))
}

fn assemble(insns: &[Insn]) -> Vec<u8> {
    let mut code = vec![0; insns.iter().map(Insn::len).sum()];
    let mut off = 0;
    for insn in insns {
        off += insn.encode(&mut code[off..]);
    }
    code
}

fn debug(emu: &Emulator, window: u64, insn: Insn, chan: Option<u8>) {
    let mut bytes = [0; 6];
    insn.encode(&mut bytes);
    let mut inst0 = DbgInst0(0);
    if let Some(chan) = chan {
        inst0.set_channel_thread(true);
        inst0.set_chan(chan);
    }
    inst0.set_insn_byte0(bytes[0]);
    inst0.set_insn_byte1(bytes[1]);
    emu.write32(window + DBGINST0, inst0.0);
    emu.write32(
        window + DBGINST1,
        u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
    );
    emu.write32(window + DBGCMD, 0);
}

fn go(emu: &Emulator, chan: u8, pc: u32) {
    let insn = Insn::Go {
        chan,
        pc,
        non_secure: false,
    };
    debug(emu, BASE, insn, None);
}

fn status(emu: &Emulator, chan: u8) -> u8 {
    (emu.read32(BASE + csr(chan)) & 0xf) as u8
}

#[rstest]
fn test_emu_ids(emu: Emulator) {
    let id = |reg: u64| {
        (0..4).fold(0, |id, i| {
            id | (emu.read8(BASE + reg + i * 4) as u32) << (i * 8)
        })
    };
    assert_eq!(id(PERIPH_ID0) & 0xf_ffff, PERIPH_ID);
    assert_eq!((id(PERIPH_ID0) >> 20) & 0xf, PL330.revision as u32);
    assert_eq!(id(PCELL_ID0), PCELL_ID);

    let cr0 = Cr0(emu.read32(BASE + CR0));
    assert_eq!(cr0.num_chnls(), 7);
    assert!(cr0.periph_req());
    assert_eq!(cr0.num_periph_req(), 31);
    let crd = Crd(emu.read32(BASE + CRD));
    assert_eq!(crd.data_width(), 3);
    assert_eq!(crd.data_buffer_dep(), 63);
}

#[test]
fn test_emu_windows() {
    let emu = Emulator::new(&DMA330, BASE, Ram::new(0, 0x1000));
    let secure = BASE + DMA330.secure_offset;
    let non_secure = BASE + DMA330.nonsecure_offset;
    assert_eq!(emu.read32(secure + CRD) & 0x7, 4);
    assert_eq!(emu.read32(non_secure + CRD) & 0x7, 4);
    assert_eq!(emu.read32(BASE + 0x2000 + CRD), 0);
}

#[rstest]
fn test_emu_ram_access(emu: Emulator) {
    emu.write32(0x100, 0x1234_5678);
    assert_eq!(emu.read8(0x101), 0x56);
    emu.write8(0x103, 0xab);
    assert_eq!(emu.read32(0x100), 0xab34_5678);
    assert_eq!(emu.read32(0x10000), 0);
}

#[rstest]
fn test_emu_copy(emu: Emulator) {
    let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
    emu.ram().write(0x1000, &data).unwrap();
    let req = TransferRequest::mem_to_mem(0x1000, 0x4000, 1000, 3);
    let mut buf = [0; 64];
    let program = plan_and_build(&req, &PL330, ProgramBuffer::new(&mut buf, PROGRAM)).unwrap();
    emu.ram().write(PROGRAM as u64, program.code()).unwrap();

    go(&emu, 2, PROGRAM);
    assert_eq!(status(&emu, 2), STATUS_EXECUTING);
    emu.run(10000);
    assert_eq!(status(&emu, 2), STATUS_STOPPED);
    assert_eq!(emu.ram().to_vec(0x4000, 1000).unwrap(), data);
    assert_eq!(emu.ram().to_vec(0x4000 + 1000, 8).unwrap(), [0; 8]);
}

#[rstest]
#[case(Swap::Bits16, [2, 1, 4, 3, 6, 5, 8, 7])]
#[case(Swap::Bits32, [4, 3, 2, 1, 8, 7, 6, 5])]
#[case(Swap::Bits64, [8, 7, 6, 5, 4, 3, 2, 1])]
fn test_emu_endian_swap(emu: Emulator, #[case] swap: Swap, #[case] expected: [u8; 8]) {
    emu.ram().write(0x1000, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let mut req = TransferRequest::mem_to_mem(0x1000, 0x2000, 8, 3);
    req.burst_len = 1;
    req.swap = swap;
    let mut buf = [0; 64];
    let program = plan_and_build(&req, &PL330, ProgramBuffer::new(&mut buf, PROGRAM)).unwrap();
    emu.ram().write(PROGRAM as u64, program.code()).unwrap();

    go(&emu, 0, PROGRAM);
    emu.run(100);
    assert_eq!(emu.ram().to_vec(0x2000, 8).unwrap(), expected);
}

#[rstest]
fn test_emu_channel_lifecycle(emu: Emulator) {
    emu.ram().write(PROGRAM as u64, &assemble(&[Insn::Nop, Insn::End])).unwrap();
    go(&emu, 1, PROGRAM);
    emu.run(2);
    assert_eq!(status(&emu, 1), STATUS_COMPLETING);
    emu.run(1);
    assert_eq!(status(&emu, 1), STATUS_STOPPED);
}

#[rstest]
#[case(&[0xff], ChannelFault::UNDEF_INSTR)]
#[case(&[0xbc, 0x03, 0, 0, 0, 0], ChannelFault::OPERAND_INVALID)]
#[case(&[0x08], ChannelFault::ST_DATA_UNAVAILABLE)]
#[case(&[0xa0, 0x00, 0, 0, 0, 0], ChannelFault::UNDEF_INSTR)]
fn test_emu_fault(emu: Emulator, #[case] code: &[u8], #[case] fault: ChannelFault) {
    emu.ram().write(PROGRAM as u64, code).unwrap();
    go(&emu, 3, PROGRAM);
    emu.run(1);
    assert_eq!(status(&emu, 3), STATUS_FAULT_COMPLETING);
    emu.run(1);
    assert_eq!(status(&emu, 3), STATUS_FAULTING);
    assert_eq!(emu.read32(BASE + ftr(3)), fault.bits());
    assert_eq!(emu.read32(BASE + cpc(3)), PROGRAM);
    assert_eq!(emu.read32(BASE + FSRC), 1 << 3);

    debug(&emu, BASE, Insn::Kill, Some(3));
    assert_eq!(status(&emu, 3), STATUS_KILLING);
    emu.run(1);
    assert_eq!(status(&emu, 3), STATUS_STOPPED);
    assert_eq!(emu.read32(BASE + ftr(3)), 0);
}

#[rstest]
fn test_emu_fetch_error(emu: Emulator) {
    go(&emu, 0, 0x10000);
    emu.run(2);
    assert_eq!(status(&emu, 0), STATUS_FAULTING);
    assert_eq!(
        emu.read32(BASE + ftr(0)),
        ChannelFault::INSTR_FETCH_ERR.bits()
    );
}

#[rstest]
fn test_emu_data_errors(emu: Emulator) {
    let req = TransferRequest::mem_to_mem(0xf000_0000, 0x2000, 64, 2);
    let mut buf = [0; 64];
    let program = plan_and_build(&req, &PL330, ProgramBuffer::new(&mut buf, PROGRAM)).unwrap();
    emu.ram().write(PROGRAM as u64, program.code()).unwrap();
    go(&emu, 0, PROGRAM);
    emu.run(100);
    assert_eq!(status(&emu, 0), STATUS_FAULTING);
    assert_eq!(emu.read32(BASE + ftr(0)), ChannelFault::DATA_READ_ERR.bits());

    let req = TransferRequest::mem_to_mem(0x1000, 0xf000_0000, 64, 2);
    let mut buf = [0; 64];
    let program = plan_and_build(&req, &PL330, ProgramBuffer::new(&mut buf, PROGRAM)).unwrap();
    emu.ram().write(PROGRAM as u64, program.code()).unwrap();
    go(&emu, 1, PROGRAM);
    emu.run(100);
    assert_eq!(status(&emu, 1), STATUS_FAULTING);
    assert_eq!(
        emu.read32(BASE + ftr(1)),
        ChannelFault::DATA_WRITE_ERR.bits()
    );
}

#[rstest]
fn test_emu_mfifo_overflow(emu: Emulator) {
    let mut ccr = Ccr(0);
    ccr.set_src_inc(true);
    ccr.set_src_burst_size(3);
    ccr.set_src_burst_len(15);
    ccr.set_src_prot(PROT_PRIVILEGED);
    let code = assemble(&[
        Insn::Mov {
            reg: MovReg::Ccr,
            imm: ccr.0,
        },
        Insn::Ld(Cond::Always),
        Insn::Ld(Cond::Always),
        Insn::Ld(Cond::Always),
        Insn::Ld(Cond::Always),
        Insn::Ld(Cond::Always),
        Insn::End,
    ]);
    emu.ram().write(PROGRAM as u64, &code).unwrap();
    go(&emu, 0, PROGRAM);
    emu.run(100);
    assert_eq!(status(&emu, 0), STATUS_FAULTING);
    assert_eq!(emu.read32(BASE + ftr(0)), ChannelFault::MFIFO_ERR.bits());
    assert_eq!(emu.read32(BASE + cpc(0)), PROGRAM + 6 + 4);
}

#[rstest]
fn test_emu_wfe_sev(emu: Emulator) {
    let waiter = assemble(&[
        Insn::Wfe {
            event: 3,
            invalidate: false,
        },
        Insn::End,
    ]);
    let signaler = assemble(&[Insn::Sev { event: 3 }, Insn::End]);
    emu.ram().write(PROGRAM as u64, &waiter).unwrap();
    emu.ram().write(PROGRAM as u64 + 0x100, &signaler).unwrap();

    go(&emu, 0, PROGRAM);
    emu.run(100);
    assert_eq!(status(&emu, 0), STATUS_WFE);

    go(&emu, 1, PROGRAM + 0x100);
    emu.run(100);
    assert_eq!(status(&emu, 1), STATUS_STOPPED);
    emu.run(100);
    assert_eq!(status(&emu, 0), STATUS_STOPPED);
}

#[rstest]
fn test_emu_non_secure_channel_secure_ccr(emu: Emulator) {
    let mut ccr = Ccr(0);
    ccr.set_src_prot(PROT_PRIVILEGED);
    ccr.set_dst_prot(PROT_PRIVILEGED);
    let code = assemble(&[
        Insn::Mov {
            reg: MovReg::Ccr,
            imm: ccr.0,
        },
        Insn::End,
    ]);
    emu.ram().write(PROGRAM as u64, &code).unwrap();
    let insn = Insn::Go {
        chan: 4,
        pc: PROGRAM,
        non_secure: true,
    };
    debug(&emu, BASE, insn, None);
    emu.run(10);
    assert_eq!(status(&emu, 4), STATUS_FAULTING);
    assert_eq!(emu.read32(BASE + ftr(4)), ChannelFault::CH_RDWR_ERR.bits());
}

#[rstest]
fn test_emu_go_from_non_secure_window(emu: Emulator) {
    emu.ram().write(PROGRAM as u64, &[0x00]).unwrap();
    let insn = Insn::Go {
        chan: 0,
        pc: PROGRAM,
        non_secure: false,
    };
    debug(&emu, BASE + PL330.nonsecure_offset, insn, None);
    assert_eq!(emu.read32(BASE + DSR) & 0xf, STATUS_FAULTING as u32);
    assert_eq!(
        emu.read32(BASE + FTRD),
        (ManagerFault::DMAGO_ERR | ManagerFault::DBG_INSTR).bits()
    );
    assert_eq!(status(&emu, 0), STATUS_STOPPED);

    debug(&emu, BASE, Insn::Kill, None);
    assert_eq!(emu.read32(BASE + DSR) & 0xf, STATUS_STOPPED as u32);
    assert_eq!(emu.read32(BASE + FTRD), 0);
}

#[rstest]
fn test_emu_go_busy_channel_ignored(emu: Emulator) {
    emu.ram()
        .write(PROGRAM as u64, &assemble(&[Insn::Nop, Insn::End]))
        .unwrap();
    go(&emu, 0, PROGRAM);
    go(&emu, 0, PROGRAM + 1);
    assert_eq!(emu.read32(BASE + cpc(0)), PROGRAM);
    assert_eq!(emu.read32(BASE + DSR) & 0xf, STATUS_STOPPED as u32);
}

#[rstest]
fn test_emu_kill_executing(emu: Emulator) {
    let code = assemble(&[Insn::Wfe {
        event: 0,
        invalidate: false,
    }]);
    emu.ram().write(PROGRAM as u64, &code).unwrap();
    go(&emu, 5, PROGRAM);
    emu.run(1);
    assert_eq!(status(&emu, 5), STATUS_WFE);
    debug(&emu, BASE, Insn::Kill, Some(5));
    assert_eq!(status(&emu, 5), STATUS_KILLING);
    emu.run(1);
    assert_eq!(status(&emu, 5), STATUS_STOPPED);
}

#[rstest]
fn test_emu_halted(emu: Emulator) {
    emu.ram().write(PROGRAM as u64, &[0x00]).unwrap();
    emu.dmac().set_halted(true);
    assert_eq!(emu.read32(BASE + DBGSTATUS), 1);
    go(&emu, 0, PROGRAM);
    assert_eq!(status(&emu, 0), STATUS_STOPPED);

    emu.dmac().set_halted(false);
    assert_eq!(emu.read32(BASE + DBGSTATUS), 0);
    go(&emu, 0, PROGRAM);
    assert_eq!(status(&emu, 0), STATUS_EXECUTING);
}

#[rstest]
fn test_emu_delay_runs_channels(emu: Emulator) {
    emu.ram()
        .write(PROGRAM as u64, &assemble(&[Insn::Nop, Insn::End]))
        .unwrap();
    go(&emu, 0, PROGRAM);
    emu.delay_ms(1);
    assert_eq!(status(&emu, 0), STATUS_STOPPED);
    assert_eq!(status(&emu, 1), STATUS_STOPPED);
}
