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

use assert_matches::assert_matches;
use rstest::rstest;

use super::{
    AddrReg, Cond, Error, Insn, LoopCounter, MAX_INSN_LEN, MovReg, PeriphCond, WfpCond,
    disassemble,
};

#[rstest]
#[case(Insn::End, &[0x00])]
#[case(Insn::Kill, &[0x01])]
#[case(Insn::Nop, &[0x18])]
#[case(Insn::Rmb, &[0x12])]
#[case(Insn::Wmb, &[0x13])]
#[case(Insn::Stz, &[0x0c])]
#[case(Insn::Ld(Cond::Always), &[0x04])]
#[case(Insn::Ld(Cond::Single), &[0x05])]
#[case(Insn::Ld(Cond::Burst), &[0x07])]
#[case(Insn::St(Cond::Always), &[0x08])]
#[case(Insn::St(Cond::Single), &[0x09])]
#[case(Insn::St(Cond::Burst), &[0x0b])]
#[case(Insn::Ldp { cond: PeriphCond::Single, periph: 3 }, &[0x25, 0x18])]
#[case(Insn::Ldp { cond: PeriphCond::Burst, periph: 3 }, &[0x27, 0x18])]
#[case(Insn::Stp { cond: PeriphCond::Single, periph: 31 }, &[0x29, 0xf8])]
#[case(Insn::Stp { cond: PeriphCond::Burst, periph: 1 }, &[0x2b, 0x08])]
#[case(Insn::Lp { lc: LoopCounter::Lc0, iter: 32 }, &[0x20, 0x1f])]
#[case(Insn::Lp { lc: LoopCounter::Lc1, iter: 256 }, &[0x22, 0xff])]
#[case(Insn::Lp { lc: LoopCounter::Lc0, iter: 1 }, &[0x20, 0x00])]
#[case(Insn::LpEnd { lc: LoopCounter::Lc0, cond: Cond::Always, bjump: 4 }, &[0x38, 0x04])]
#[case(Insn::LpEnd { lc: LoopCounter::Lc1, cond: Cond::Always, bjump: 8 }, &[0x3c, 0x08])]
#[case(Insn::LpEnd { lc: LoopCounter::Lc0, cond: Cond::Single, bjump: 1 }, &[0x39, 0x01])]
#[case(Insn::LpEnd { lc: LoopCounter::Lc1, cond: Cond::Burst, bjump: 2 }, &[0x3f, 0x02])]
#[case(Insn::Wfp { cond: WfpCond::Single, periph: 2 }, &[0x30, 0x10])]
#[case(Insn::Wfp { cond: WfpCond::Periph, periph: 2 }, &[0x31, 0x10])]
#[case(Insn::Wfp { cond: WfpCond::Burst, periph: 2 }, &[0x32, 0x10])]
#[case(Insn::FlushP { periph: 5 }, &[0x35, 0x28])]
#[case(Insn::Sev { event: 7 }, &[0x34, 0x38])]
#[case(Insn::Wfe { event: 7, invalidate: true }, &[0x36, 0x3a])]
#[case(Insn::AddH { reg: AddrReg::Dar, imm: 0x1234 }, &[0x56, 0x34, 0x12])]
#[case(Insn::Mov { reg: MovReg::Sar, imm: 0x1234_5678 }, &[0xbc, 0x00, 0x78, 0x56, 0x34, 0x12])]
#[case(Insn::Mov { reg: MovReg::Ccr, imm: 0x0042_c027 }, &[0xbc, 0x01, 0x27, 0xc0, 0x42, 0x00])]
#[case(Insn::Mov { reg: MovReg::Dar, imm: 0xffda_0000 }, &[0xbc, 0x02, 0x00, 0x00, 0xda, 0xff])]
#[case(Insn::Go { chan: 3, pc: 0x8000_0000, non_secure: false }, &[0xa0, 0x03, 0x00, 0x00, 0x00, 0x80])]
#[case(Insn::Go { chan: 7, pc: 0x10, non_secure: true }, &[0xa2, 0x07, 0x10, 0x00, 0x00, 0x00])]
fn test_encode_decode(#[case] insn: Insn, #[case] bytes: &[u8]) {
    let mut buf = [0xaa; MAX_INSN_LEN + 1];
    let len = insn.encode(&mut buf);
    assert_eq!(len, insn.len());
    assert_eq!(&buf[..len], bytes);
    assert!(buf[len..].iter().all(|b| *b == 0xaa));

    assert_eq!(Insn::decode(&buf[..len]).unwrap(), insn);
}

#[test]
fn test_round_trip_loop_body() {
    let program = [
        Insn::Mov {
            reg: MovReg::Sar,
            imm: 0x1000,
        },
        Insn::Mov {
            reg: MovReg::Dar,
            imm: 0x2000,
        },
        Insn::Lp {
            lc: LoopCounter::Lc1,
            iter: 3,
        },
        Insn::Lp {
            lc: LoopCounter::Lc0,
            iter: 200,
        },
        Insn::Wfp {
            cond: WfpCond::Burst,
            periph: 17,
        },
        Insn::Ld(Cond::Always),
        Insn::Stp {
            cond: PeriphCond::Burst,
            periph: 17,
        },
        Insn::LpEnd {
            lc: LoopCounter::Lc0,
            cond: Cond::Always,
            bjump: 5,
        },
        Insn::LpEnd {
            lc: LoopCounter::Lc1,
            cond: Cond::Always,
            bjump: 9,
        },
        Insn::End,
    ];
    let mut code = vec![0; program.iter().map(Insn::len).sum()];
    let mut off = 0;
    for insn in &program {
        off += insn.encode(&mut code[off..]);
    }
    assert_eq!(off, code.len());

    let decoded: Vec<_> = disassemble(&code).map(|(_, r)| r.unwrap()).collect();
    assert_eq!(decoded, program);

    let offsets: Vec<_> = disassemble(&code).map(|(o, _)| o).collect();
    assert_eq!(offsets, [0, 6, 12, 14, 16, 18, 19, 21, 23, 25]);
}

#[rstest]
#[case(&[0x06], 0x06)]
#[case(&[0x0a], 0x0a)]
#[case(&[0x33, 0x00], 0x33)]
#[case(&[0x3a, 0x00], 0x3a)]
#[case(&[0x28, 0x00], 0x28)]
#[case(&[0xff], 0xff)]
fn test_decode_unknown(#[case] bytes: &[u8], #[case] op: u8) {
    assert_matches!(Insn::decode(bytes), Err(Error::UnknownOpcode { opcode, .. }) if opcode == op);
}

#[rstest]
#[case(&[], 1, 0)]
#[case(&[0xbc, 0x00, 0x01], 6, 3)]
#[case(&[0x20], 2, 1)]
#[case(&[0x54, 0x00], 3, 2)]
fn test_decode_truncated(#[case] bytes: &[u8], #[case] n: usize, #[case] r: usize) {
    assert_matches!(
        Insn::decode(bytes),
        Err(Error::Truncated { need, remain, .. }) if need == n && remain == r
    );
}

#[test]
fn test_decode_invalid_mov_register() {
    assert_matches!(
        Insn::decode(&[0xbc, 0x03, 0, 0, 0, 0]),
        Err(Error::InvalidOperand {
            opcode: 0xbc,
            operand: 0x03,
            ..
        })
    );
}

#[rstest]
#[case(Insn::End, "DMAEND")]
#[case(Insn::Ld(Cond::Always), "DMALD")]
#[case(Insn::St(Cond::Burst), "DMASTB")]
#[case(Insn::Stp { cond: PeriphCond::Single, periph: 4 }, "DMASTPS P4")]
#[case(Insn::Lp { lc: LoopCounter::Lc1, iter: 256 }, "DMALP_1 256")]
#[case(Insn::LpEnd { lc: LoopCounter::Lc0, cond: Cond::Always, bjump: 6 }, "DMALPEND_0 bjmp 6")]
#[case(Insn::Wfp { cond: WfpCond::Burst, periph: 1 }, "DMAWFP P1, burst")]
#[case(Insn::Mov { reg: MovReg::Ccr, imm: 0x1 }, "DMAMOV CCR, 0x00000001")]
#[case(Insn::Go { chan: 2, pc: 0x100, non_secure: true }, "DMAGO C2, 0x00000100, ns")]
#[case(Insn::Wfe { event: 3, invalidate: false }, "DMAWFE 3")]
fn test_display(#[case] insn: Insn, #[case] text: &str) {
    assert_eq!(insn.to_string(), text);
}

#[test]
fn test_disassemble_stops_on_error() {
    let code = [0x18, 0x06, 0x00];
    let items: Vec<_> = disassemble(&code).collect();
    assert_eq!(items.len(), 2);
    assert_matches!(items[0], (0, Ok(Insn::Nop)));
    assert_matches!(items[1], (1, Err(Error::UnknownOpcode { opcode: 0x06, .. })));
}
