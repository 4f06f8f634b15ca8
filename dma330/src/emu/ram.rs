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

use std::ops::Range;

use parking_lot::Mutex;
use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Range {addr:#x}+{len:#x} is outside of memory"))]
    OutOfRange {
        addr: u64,
        len: usize,
        #[snafu(implicit)]
        _location: Location,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Bus memory shared by the emulated controller and its users.
#[derive(Debug)]
pub struct Ram {
    base: u64,
    data: Mutex<Vec<u8>>,
}

impl Ram {
    pub fn new(base: u64, size: usize) -> Self {
        Ram {
            base,
            data: Mutex::new(vec![0; size]),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size()
    }

    fn range(&self, mem_len: usize, addr: u64, len: usize) -> Result<Range<usize>> {
        let start = addr
            .checked_sub(self.base)
            .and_then(|s| usize::try_from(s).ok());
        match start {
            Some(start) if start.checked_add(len).is_some_and(|end| end <= mem_len) => {
                Ok(start..start + len)
            }
            _ => error::OutOfRange { addr, len }.fail(),
        }
    }

    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.lock();
        let range = self.range(data.len(), addr, buf.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    /// Reads as many bytes as are backed by memory, up to `buf.len()`.
    pub fn read_avail(&self, addr: u64, buf: &mut [u8]) -> usize {
        let data = self.data.lock();
        let Some(start) = addr
            .checked_sub(self.base)
            .and_then(|s| usize::try_from(s).ok())
            .filter(|s| *s < data.len())
        else {
            return 0;
        };
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        len
    }

    pub fn write(&self, addr: u64, val: &[u8]) -> Result<()> {
        let mut data = self.data.lock();
        let range = self.range(data.len(), addr, val.len())?;
        data[range].copy_from_slice(val);
        Ok(())
    }

    pub fn fill(&self, addr: u64, len: usize, val: u8) -> Result<()> {
        let mut data = self.data.lock();
        let range = self.range(data.len(), addr, len)?;
        data[range].fill(val);
        Ok(())
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32> {
        let mut buf = [0; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u32(&self, addr: u64, val: u32) -> Result<()> {
        self.write(addr, &val.to_le_bytes())
    }

    pub fn to_vec(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
#[path = "ram_test.rs"]
mod tests;
