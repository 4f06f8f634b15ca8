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

use std::fmt::Debug;
use std::ptr::{read_volatile, write_volatile};
use std::thread;
use std::time::Duration;

/// Register access and delay primitives the driver runs on.
///
/// Addresses are absolute bus addresses.
pub trait Platform: Debug {
    fn read32(&self, addr: u64) -> u32;
    fn write32(&self, addr: u64, val: u32);
    fn read8(&self, addr: u64) -> u8;
    fn write8(&self, addr: u64, val: u8);
    fn delay_ms(&self, ms: u32);
}

impl<P> Platform for &P
where
    P: Platform + ?Sized,
{
    fn read32(&self, addr: u64) -> u32 {
        P::read32(self, addr)
    }

    fn write32(&self, addr: u64, val: u32) {
        P::write32(self, addr, val)
    }

    fn read8(&self, addr: u64) -> u8 {
        P::read8(self, addr)
    }

    fn write8(&self, addr: u64, val: u8) {
        P::write8(self, addr, val)
    }

    fn delay_ms(&self, ms: u32) {
        P::delay_ms(self, ms)
    }
}

/// Direct volatile access to identity-mapped device memory.
#[derive(Debug)]
pub struct RawMmio {
    _private: (),
}

impl RawMmio {
    /// # Safety
    ///
    /// Every address later passed to this platform must be a mapped, device
    /// type, naturally aligned location that is safe to access with volatile
    /// loads and stores of the given width.
    pub unsafe fn new() -> Self {
        RawMmio { _private: () }
    }
}

impl Platform for RawMmio {
    fn read32(&self, addr: u64) -> u32 {
        // SAFETY: guaranteed by the contract of RawMmio::new().
        unsafe { read_volatile(addr as usize as *const u32) }
    }

    fn write32(&self, addr: u64, val: u32) {
        // SAFETY: guaranteed by the contract of RawMmio::new().
        unsafe { write_volatile(addr as usize as *mut u32, val) }
    }

    fn read8(&self, addr: u64) -> u8 {
        // SAFETY: guaranteed by the contract of RawMmio::new().
        unsafe { read_volatile(addr as usize as *const u8) }
    }

    fn write8(&self, addr: u64, val: u8) {
        // SAFETY: guaranteed by the contract of RawMmio::new().
        unsafe { write_volatile(addr as usize as *mut u8, val) }
    }

    fn delay_ms(&self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64))
    }
}
