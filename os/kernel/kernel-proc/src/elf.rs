//! Minimal ELF32 reader: validate the header, walk program headers, find the
//! entry point and the highest address the image occupies in memory.
//!
//! Nothing is relocated and segment permissions are not enforced; the loader
//! maps everything user read/write.

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfErr {
    #[error("image shorter than an ELF header")]
    TooShort,
    #[error("missing ELF magic")]
    BadMagic,
    #[error("not a 32-bit ELF image")]
    BadClass,
    #[error("unsupported ELF header")]
    BadHeader,
    #[error("not an i386 image")]
    BadMachine,
    #[error("program headers out of bounds")]
    Oob,
    #[error("program header wraps the address space")]
    BadPh,
}

#[derive(Copy, Clone, Debug)]
#[allow(dead_code, clippy::struct_field_names)]
pub struct Eh32 {
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: VirtualAddress,
    e_phoff: u32,
    e_shoff: u32,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
}

#[derive(Copy, Clone, Debug)]
#[allow(clippy::struct_field_names)]
pub struct Ph32 {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: VirtualAddress,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: PFlags,
    pub p_align: u32,
}

impl Ph32 {
    /// One past the last byte the segment occupies in memory.
    #[inline]
    #[must_use]
    pub const fn mem_end(&self) -> Option<VirtualAddress> {
        self.p_vaddr.checked_add(self.p_memsz)
    }
}

/// `Elf32_Phdr.p_flags` (SVr4): bit0=X, bit1=W, bit2=R.
#[bitfield(u32)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool, // PF_X = 1
    #[bits(1)]
    pub write: bool, // PF_W = 2
    #[bits(1)]
    pub read: bool, // PF_R = 4
    #[bits(29)]
    __: u32,
}

pub const EHDR_SIZE: usize = 52;
pub const PHDR_SIZE: usize = 32;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const EM_386: u16 = 3;
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
pub const PT_LOAD: u32 = 1;

#[inline]
fn le16(x: &[u8]) -> u16 {
    u16::from_le_bytes([x[0], x[1]])
}

#[inline]
fn le32(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}

pub struct ElfView<'a> {
    pub eh: Eh32,
    ph: PhSlice<'a>,
}

/// Validate `bytes` as an i386 ELF32 executable and return a view into it.
///
/// # Errors
/// Any header field this kernel cannot run, or a program-header table that
/// does not fit inside `bytes`.
pub fn elf32_view(bytes: &[u8]) -> Result<ElfView<'_>, ElfErr> {
    use ElfErr::{BadClass, BadHeader, BadMachine, BadMagic, Oob, TooShort};
    if bytes.len() < EHDR_SIZE {
        return Err(TooShort);
    }

    if &bytes[0..4] != b"\x7FELF" {
        return Err(BadMagic);
    }

    if bytes[4] != ELFCLASS32 {
        return Err(BadClass);
    }

    if bytes[5] != ELFDATA2LSB {
        return Err(BadHeader);
    }

    let eh = Eh32 {
        e_type: le16(&bytes[16..18]),
        e_machine: le16(&bytes[18..20]),
        e_version: le32(&bytes[20..24]),
        e_entry: VirtualAddress::new(le32(&bytes[24..28])),
        e_phoff: le32(&bytes[28..32]),
        e_shoff: le32(&bytes[32..36]),
        e_flags: le32(&bytes[36..40]),
        e_ehsize: le16(&bytes[40..42]),
        e_phentsize: le16(&bytes[42..44]),
        e_phnum: le16(&bytes[44..46]),
    };

    if !(eh.e_type == ET_EXEC || eh.e_type == ET_DYN) {
        return Err(BadHeader);
    }

    if eh.e_machine != EM_386 {
        return Err(BadMachine);
    }

    if eh.e_version != 1 {
        return Err(BadHeader);
    }

    if eh.e_phnum != 0 && eh.e_phentsize as usize != PHDR_SIZE {
        return Err(BadHeader);
    }

    let phoff = eh.e_phoff as usize;
    let phnum = eh.e_phnum as usize;
    let need = phoff
        .checked_add(phnum.checked_mul(PHDR_SIZE).ok_or(Oob)?)
        .ok_or(Oob)?;
    if need > bytes.len() {
        return Err(Oob);
    }

    let ph = PhSlice {
        b: bytes,
        off: phoff,
        num: phnum,
    };

    Ok(ElfView { eh, ph })
}

// Program-header "view" without allocations.
#[derive(Copy, Clone)]
struct PhSlice<'a> {
    b: &'a [u8],
    off: usize,
    num: usize,
}

impl PhSlice<'_> {
    fn get(&self, i: usize) -> Option<Ph32> {
        if i >= self.num {
            return None;
        }
        let p = self.off + i * PHDR_SIZE;
        let s = self.b.get(p..p + PHDR_SIZE)?;
        Some(Ph32 {
            p_type: le32(&s[0..4]),
            p_offset: le32(&s[4..8]),
            p_vaddr: VirtualAddress::new(le32(&s[8..12])),
            p_paddr: le32(&s[12..16]),
            p_filesz: le32(&s[16..20]),
            p_memsz: le32(&s[20..24]),
            p_flags: PFlags::from_bits(le32(&s[24..28])),
            p_align: le32(&s[28..32]),
        })
    }
}

pub struct PhIter<'a> {
    ps: PhSlice<'a>,
    i: usize,
}

impl Iterator for PhIter<'_> {
    type Item = Ph32;
    fn next(&mut self) -> Option<Self::Item> {
        let v = self.ps.get(self.i)?;
        self.i += 1;
        Some(v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.ps.num.saturating_sub(self.i);
        (r, Some(r))
    }
}

impl ExactSizeIterator for PhIter<'_> {}
impl core::iter::FusedIterator for PhIter<'_> {}

impl ElfView<'_> {
    /// Iterate all program headers.
    #[must_use]
    pub const fn iter_ph(&self) -> PhIter<'_> {
        PhIter { ps: self.ph, i: 0 }
    }

    #[must_use]
    pub const fn entry(&self) -> VirtualAddress {
        self.eh.e_entry
    }

    /// Highest `p_vaddr + p_memsz` over every program header, or `None` if
    /// the image has none.
    ///
    /// All headers count, not just `PT_LOAD`: the loader only needs an upper
    /// bound for what to map.
    ///
    /// # Errors
    /// [`ElfErr::BadPh`] if a segment end does not fit in 32 bits.
    pub fn memory_top(&self) -> Result<Option<VirtualAddress>, ElfErr> {
        self.iter_ph().try_fold(None, |top: Option<VirtualAddress>, ph| {
            let end = ph.mem_end().ok_or(ElfErr::BadPh)?;
            Ok(Some(top.map_or(end, |t| t.max(end))))
        })
    }
}
