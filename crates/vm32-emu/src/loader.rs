//! Parses an executable image and installs it into physical memory.

use crate::mem::PhysicalMemory;
use crate::primitives::constants::{FS_SZ, IMAGE_HEADER_SIZE, IMAGE_MAGIC};

/// Why an image failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("image shorter than the header")]
    Truncated,
    #[error("bad magic number")]
    BadMagic,
    #[error("image does not fit in physical memory")]
    TooLarge,
    #[error("filesystem image does not fit in the reserved window")]
    FsTooLarge,
}

/// Entry point and bss size recovered from an image header, ready to seed a fresh CPU. The
/// initial stack pointer is never part of an image; the caller always derives it from the
/// size of physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: u32,
    pub bss: u32,
    pub flags: u32,
}

/// Image header: magic, bss size, entry point, and flags. Every byte of `image` after the
/// header is the code/data body and is copied verbatim to physical offset 0.
struct Header {
    bss: u32,
    entry: u32,
    flags: u32,
}

fn parse_header(image: &[u8]) -> Result<Header, LoaderError> {
    if image.len() < IMAGE_HEADER_SIZE {
        return Err(LoaderError::Truncated);
    }
    let word = |offset: usize| -> u32 {
        u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap())
    };
    if word(0) != IMAGE_MAGIC {
        return Err(LoaderError::BadMagic);
    }
    Ok(Header {
        bss: word(4),
        entry: word(8),
        flags: word(12),
    })
}

/// Parse `image`, copy its body into `memory` at physical offset 0, and optionally copy
/// `fs_image` into the filesystem window reserved at the top of memory. Returns the entry
/// point and header fields the caller should seed the CPU with; the stack pointer is never
/// read from the image and must be derived separately.
pub fn load(
    memory: &mut PhysicalMemory,
    image: &[u8],
    fs_image: Option<&[u8]>,
) -> Result<LoadedImage, LoaderError> {
    let header = parse_header(image)?;
    let body = &image[IMAGE_HEADER_SIZE..];
    if !memory.load_image(0, body) {
        return Err(LoaderError::TooLarge);
    }

    if let Some(fs) = fs_image {
        if fs.len() as u32 > FS_SZ {
            return Err(LoaderError::FsTooLarge);
        }
        let fs_offset = memory.len() - FS_SZ;
        if !memory.load_image(fs_offset, fs) {
            return Err(LoaderError::FsTooLarge);
        }
    }

    Ok(LoadedImage {
        entry: header.entry,
        bss: header.bss,
        flags: header.flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bss: u32, entry: u32, flags: u32, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&IMAGE_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&bss.to_le_bytes());
        bytes.extend_from_slice(&entry.to_le_bytes());
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn loads_entry_and_body() {
        let mut mem = PhysicalMemory::new(4096 * 4);
        let img = image(0, 0x100, 0, &[1, 2, 3, 4]);
        let loaded = load(&mut mem, &img, None).unwrap();
        assert_eq!(loaded.entry, 0x100);
        assert_eq!(mem.slice(0, 4).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut mem = PhysicalMemory::new(4096);
        let mut img = image(0, 0, 0, &[]);
        img[0] = 0;
        assert_eq!(load(&mut mem, &img, None).unwrap_err(), LoaderError::BadMagic);
    }

    #[test]
    fn rejects_truncated_header() {
        let mut mem = PhysicalMemory::new(4096);
        assert_eq!(load(&mut mem, &[1, 2, 3], None).unwrap_err(), LoaderError::Truncated);
    }

    #[test]
    fn rejects_body_larger_than_memory() {
        let mut mem = PhysicalMemory::new(4096);
        let img = image(0, 0, 0, &vec![0u8; 8192]);
        assert_eq!(load(&mut mem, &img, None).unwrap_err(), LoaderError::TooLarge);
    }

    #[test]
    fn body_is_every_byte_after_the_header_with_no_length_field() {
        let mut mem = PhysicalMemory::new(4096 * 4);
        let body = vec![0xABu8; 37];
        let img = image(0, 0, 0, &body);
        load(&mut mem, &img, None).unwrap();
        assert_eq!(mem.slice(0, 37).unwrap(), body.as_slice());
    }

    #[test]
    fn loads_fs_image_at_top_of_memory() {
        let mut mem = PhysicalMemory::new(FS_SZ * 2);
        let img = image(0, 0, 0, &[]);
        let fs = vec![0xABu8; 16];
        load(&mut mem, &img, Some(&fs)).unwrap();
        let fs_offset = mem.len() - FS_SZ;
        assert_eq!(mem.slice(fs_offset, 16).unwrap(), fs.as_slice());
    }
}
