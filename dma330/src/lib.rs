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

//! Microprogram compiler and channel driver for the ARM PL330/DMA-330 DMA
//! controller.
//!
//! See: https://developer.arm.com/documentation/ddi0424/d

#[path = "dmac/dmac.rs"]
pub mod dmac;
#[path = "emu/emu.rs"]
pub mod emu;
#[path = "isa/isa.rs"]
pub mod isa;
#[path = "plan/plan.rs"]
pub mod plan;
#[path = "platform/platform.rs"]
pub mod platform;
#[path = "program/program.rs"]
pub mod program;
pub mod reg;
