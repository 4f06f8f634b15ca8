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
use dma330::dmac::{Security, Variant};
use dma330::plan::TransferRequest;
use rstest::rstest;

use super::{Error, PlanArgs, main_plan, parse_arg};

fn plan_args(transfer: &str, variant: &str, bus_addr: &str) -> PlanArgs {
    PlanArgs {
        transfer: transfer.to_owned(),
        variant: variant.to_owned(),
        bus_addr: bus_addr.to_owned(),
    }
}

#[rstest]
#[case("src=0x1000,dst=0x3000,size=0x1000,burst_size=3", "pl330", "0x0")]
#[case("src=0x1000,dst=0x3001,size=7,burst_size=0", "pl330", "0x8000")]
#[case(
    "src=0x1000,dst=0x3000,size=0x1010,burst_size=4,single_burst_size=2",
    "dma330",
    "0x10000000"
)]
#[case(
    "src=0x1000,dst=0x3000,size=0x100,burst_size=2,kind=mem2periph,periph=5",
    "pl330",
    "0x0"
)]
#[case(
    "src=0x1000,dst=0x3000,size=0x100,burst_size=2,kind=periph2mem,periph=5,security=ns",
    "dma330",
    "0x0"
)]
fn test_main_plan(#[case] transfer: &str, #[case] variant: &str, #[case] bus_addr: &str) {
    main_plan(plan_args(transfer, variant, bus_addr)).unwrap();
}

#[test]
fn test_main_plan_bad_variant() {
    let args = plan_args("src=0x1000,dst=0x3000,size=64,burst_size=3", "pl331", "0x0");
    assert_matches!(
        main_plan(args),
        Err(Error::ParseArg { arg, .. }) if arg == "pl331"
    );
}

#[rstest]
#[case("src=0x1001,dst=0x3000,size=64,burst_size=3")]
#[case("src=0x1000,dst=0x3000,size=0,burst_size=3")]
#[case("src=0x1000,dst=0x3000,size=64,burst_size=5")]
#[case("src=0x1000,dst=0x3000,size=64,burst_size=2,burst_len=17")]
fn test_main_plan_invalid_transfer(#[case] transfer: &str) {
    let args = plan_args(transfer, "pl330", "0x0");
    assert_matches!(main_plan(args), Err(Error::Build { .. }));
}

#[test]
fn test_main_plan_bus_addr() {
    let args = plan_args(
        "src=0x1000,dst=0x3000,size=64,burst_size=3",
        "pl330",
        "0xffffffff",
    );
    assert_matches!(
        main_plan(args),
        Err(Error::BusAddr {
            bus_addr: 0xffff_ffff,
            ..
        })
    );
}

#[test]
fn test_parse_arg() {
    let variant: Variant = parse_arg("dma330").unwrap();
    assert_eq!(variant, Variant::Dma330);
    let req: TransferRequest = parse_arg("src=0x10,dst=0x20,size=1k,burst_size=2,security=ns")
        .unwrap();
    assert_eq!(req.size, 0x400);
    assert_eq!(req.security, Security::NonSecure);
    assert_matches!(parse_arg::<u32>("0x100000000"), Err(Error::ParseArg { .. }));
}
