//! Flat real-mode memory
//!
//! The core talks to memory only through the `Memory8086` trait so a driver
//! can substitute its own bus. `ArrayMemory` is the vector-backed default.

use crate::error::CpuError;
use crate::logging::{log, LogCategory, LogLevel};

/// Default memory size: the full 1 MiB real-mode address space
pub const DEFAULT_MEMORY_SIZE: u32 = 0x10_0000;

/// Smallest memory `ArrayMemory` will allocate (one full segment)
pub const MIN_MEMORY_SIZE: u32 = 0x1_0000;

/// Largest memory `ArrayMemory` will allocate
pub const MAX_MEMORY_SIZE: u32 = 0x100_0000;

/// Access width for multi-byte memory operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    /// Number of bytes covered by this width
    #[inline]
    pub fn bytes(self) -> u8 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
        }
    }

    /// Mask selecting the low `bytes()` bytes of a value
    #[inline]
    pub fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Dword => 0xFFFF_FFFF,
        }
    }
}

/// Memory interface for the 8086 core.
///
/// Implementors provide byte access and a size; multi-byte access, address
/// translation and image loading are derived from those.
pub trait Memory8086 {
    /// Total addressable bytes
    fn size(&self) -> u32;

    /// Read one byte at a physical address
    fn read_u8(&self, addr: u32) -> Result<u8, CpuError>;

    /// Write one byte at a physical address
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<(), CpuError>;

    /// Fail with `OutOfBounds` unless `width` bytes starting at `addr` exist
    #[inline]
    fn check_range(&self, addr: u32, width: Width) -> Result<(), CpuError> {
        let size = self.size();
        if addr as u64 + width.bytes() as u64 > size as u64 {
            log(LogCategory::Memory, LogLevel::Debug, || {
                format!(
                    "[MEM] out of bounds: {} byte(s) at 0x{:05X}, size 0x{:05X}",
                    width.bytes(),
                    addr,
                    size
                )
            });
            return Err(CpuError::OutOfBounds {
                address: addr,
                width: width.bytes(),
                size,
            });
        }
        Ok(())
    }

    /// Read 1, 2 or 4 bytes little-endian
    fn read(&self, addr: u32, width: Width) -> Result<u32, CpuError> {
        self.check_range(addr, width)?;
        let mut value = 0u32;
        for i in (0..width.bytes() as u32).rev() {
            value = (value << 8) | self.read_u8(addr + i)? as u32;
        }
        Ok(value)
    }

    /// Store the low `width` bytes of `value` little-endian.
    /// Nothing is written when the range check fails.
    fn write(&mut self, addr: u32, width: Width, value: u32) -> Result<(), CpuError> {
        self.check_range(addr, width)?;
        for i in 0..width.bytes() as u32 {
            self.write_u8(addr + i, (value >> (8 * i)) as u8)?;
        }
        Ok(())
    }

    /// Translate segment:offset to a physical address, wrapping at the end
    /// of memory (on a 1 MiB memory this is the 8086's 20-bit wrap)
    #[inline]
    fn physical_address(&self, segment: u16, offset: u16) -> u32 {
        let linear = ((segment as u32) << 4) + offset as u32;
        linear % self.size()
    }

    /// Copy a binary image to segment:offset
    fn load_image(&mut self, bytes: &[u8], segment: u16, offset: u16) -> Result<(), CpuError> {
        let start = self.physical_address(segment, offset);
        let size = self.size();
        if start as u64 + bytes.len() as u64 > size as u64 {
            return Err(CpuError::OutOfBounds {
                address: start,
                width: 1,
                size,
            });
        }
        for (i, &byte) in bytes.iter().enumerate() {
            self.write_u8(start + i as u32, byte)?;
        }
        log(LogCategory::Memory, LogLevel::Info, || {
            format!(
                "[MEM] loaded {} byte image at {:04X}:{:04X} (0x{:05X})",
                bytes.len(),
                segment,
                offset,
                start
            )
        });
        Ok(())
    }
}

/// Vector-backed memory
#[derive(Debug, Clone)]
pub struct ArrayMemory {
    data: Vec<u8>,
}

impl ArrayMemory {
    /// 1 MiB of zeroed memory
    pub fn new() -> Self {
        Self::with_size(DEFAULT_MEMORY_SIZE)
    }

    /// Zeroed memory of `size` bytes, clamped to
    /// `MIN_MEMORY_SIZE..=MAX_MEMORY_SIZE`
    pub fn with_size(size: u32) -> Self {
        let size = size.clamp(MIN_MEMORY_SIZE, MAX_MEMORY_SIZE);
        Self {
            data: vec![0; size as usize],
        }
    }

    /// Load a program at a physical address
    pub fn load_program(&mut self, addr: u32, program: &[u8]) -> Result<(), CpuError> {
        let end = addr as u64 + program.len() as u64;
        if end > self.data.len() as u64 {
            return Err(CpuError::OutOfBounds {
                address: addr,
                width: 1,
                size: self.size(),
            });
        }
        let start = addr as usize;
        self.data[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Zero every byte
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory8086 for ArrayMemory {
    #[inline]
    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    #[inline]
    fn read_u8(&self, addr: u32) -> Result<u8, CpuError> {
        self.data
            .get(addr as usize)
            .copied()
            .ok_or(CpuError::OutOfBounds {
                address: addr,
                width: 1,
                size: self.data.len() as u32,
            })
    }

    #[inline]
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<(), CpuError> {
        let size = self.data.len() as u32;
        match self.data.get_mut(addr as usize) {
            Some(slot) => {
                *slot = val;
                Ok(())
            }
            None => Err(CpuError::OutOfBounds {
                address: addr,
                width: 1,
                size,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_is_one_megabyte() {
        let mem = ArrayMemory::new();
        assert_eq!(mem.size(), 0x100000);
    }

    #[test]
    fn test_size_is_clamped() {
        assert_eq!(ArrayMemory::with_size(16).size(), MIN_MEMORY_SIZE);
        assert_eq!(ArrayMemory::with_size(u32::MAX).size(), MAX_MEMORY_SIZE);
    }

    #[test]
    fn test_little_endian_widths() {
        let mut mem = ArrayMemory::new();
        mem.write(0x200, Width::Dword, 0x1234_5678).unwrap();

        assert_eq!(mem.read_u8(0x200).unwrap(), 0x78);
        assert_eq!(mem.read_u8(0x203).unwrap(), 0x12);
        assert_eq!(mem.read(0x200, Width::Byte).unwrap(), 0x78);
        assert_eq!(mem.read(0x200, Width::Word).unwrap(), 0x5678);
        assert_eq!(mem.read(0x201, Width::Word).unwrap(), 0x3456);
        assert_eq!(mem.read(0x200, Width::Dword).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_write_keeps_only_low_bytes() {
        let mut mem = ArrayMemory::new();
        mem.write(0x10, Width::Byte, 0xABCD).unwrap();
        assert_eq!(mem.read(0x10, Width::Word).unwrap(), 0x00CD);
    }

    #[test]
    fn test_out_of_bounds_read_and_write() {
        let mut mem = ArrayMemory::new();
        let last = mem.size() - 1;

        assert!(mem.read(last, Width::Byte).is_ok());
        assert_eq!(
            mem.read(last, Width::Word),
            Err(CpuError::OutOfBounds {
                address: last,
                width: 2,
                size: 0x100000
            })
        );

        // A failing write must not modify the byte that does fit
        mem.write_u8(last, 0x55).unwrap();
        assert!(mem.write(last, Width::Word, 0xFFFF).is_err());
        assert_eq!(mem.read_u8(last).unwrap(), 0x55);
    }

    #[test]
    fn test_physical_address_wraps() {
        let mem = ArrayMemory::new();
        assert_eq!(mem.physical_address(0x1000, 0x0234), 0x10234);
        // 0xFFFF:0x0010 is 0x100000, which wraps to 0 on a 1 MiB machine
        assert_eq!(mem.physical_address(0xFFFF, 0x0010), 0x00000);
        assert_eq!(mem.physical_address(0xFFFF, 0xFFFF), 0x0FFEF);
    }

    #[test]
    fn test_segment_overlap_aliases_same_byte() {
        let mut mem = ArrayMemory::new();
        let a = mem.physical_address(0x0700, 0x0100);
        let b = mem.physical_address(0x0710, 0x0000);
        assert_eq!(a, b);

        mem.write_u8(a, 0x42).unwrap();
        assert_eq!(mem.read_u8(b).unwrap(), 0x42);
    }

    #[test]
    fn test_load_image() {
        let mut mem = ArrayMemory::new();
        mem.load_image(&[0xB8, 0x05, 0x00], 0x0700, 0x0100).unwrap();
        assert_eq!(mem.read_u8(0x7100).unwrap(), 0xB8);
        assert_eq!(mem.read(0x7101, Width::Word).unwrap(), 0x0005);
    }

    #[test]
    fn test_load_image_past_end_fails() {
        let mut mem = ArrayMemory::with_size(MIN_MEMORY_SIZE);
        let image = vec![0x90; 0x20];
        assert!(matches!(
            mem.load_image(&image, 0x0FFF, 0x0000),
            Err(CpuError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_load_program_bounds() {
        let mut mem = ArrayMemory::new();
        assert!(mem.load_program(0xFFFFE, &[1, 2]).is_ok());
        assert!(mem.load_program(0xFFFFF, &[1, 2]).is_err());
    }
}
