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

use crate::dmac::Thread;
use crate::reg::{
    STATUS_AT_BARRIER, STATUS_CACHE_MISS, STATUS_COMPLETING, STATUS_EXECUTING,
    STATUS_FAULT_COMPLETING, STATUS_FAULTING, STATUS_KILLING, STATUS_QUEUE_BUSY,
    STATUS_STOPPED, STATUS_UPDATE_PC, STATUS_WFE, STATUS_WFP,
};

/// Operating state of a DMA thread.
/// See: https://developer.arm.com/documentation/ddi0424/d/functional-overview/operating-states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Stopped,
    Executing,
    CacheMiss,
    UpdatePc,
    Wfe,
    AtBarrier,
    QueueBusy,
    Wfp,
    Killing,
    Completing,
    Faulting,
    FaultCompleting,
    Invalid,
}

impl ChannelState {
    /// Decodes the status field of DSR or CSR(n).
    pub fn from_raw(thread: Thread, raw: u8) -> Self {
        let channel = matches!(thread, Thread::Channel(_));
        match raw & 0xf {
            STATUS_STOPPED => ChannelState::Stopped,
            STATUS_EXECUTING => ChannelState::Executing,
            STATUS_CACHE_MISS => ChannelState::CacheMiss,
            STATUS_UPDATE_PC => ChannelState::UpdatePc,
            STATUS_WFE => ChannelState::Wfe,
            STATUS_FAULTING => ChannelState::Faulting,
            // The manager thread never reports the states below.
            STATUS_AT_BARRIER if channel => ChannelState::AtBarrier,
            STATUS_QUEUE_BUSY if channel => ChannelState::QueueBusy,
            STATUS_WFP if channel => ChannelState::Wfp,
            STATUS_KILLING if channel => ChannelState::Killing,
            STATUS_COMPLETING if channel => ChannelState::Completing,
            STATUS_FAULT_COMPLETING if channel => ChannelState::FaultCompleting,
            _ => ChannelState::Invalid,
        }
    }

    /// The thread owns a program that is still making progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ChannelState::Executing
                | ChannelState::CacheMiss
                | ChannelState::UpdatePc
                | ChannelState::Wfe
                | ChannelState::AtBarrier
                | ChannelState::QueueBusy
                | ChannelState::Wfp
        )
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
