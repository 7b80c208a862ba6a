//! # Kernel-loader wire-format rewriter
//!
//! Implements the disk-sector kernel-loader handoff format documented in
//! spec.md §6: the legacy BIOS bootloader stage (not part of this
//! workspace's UEFI-hosted boot path, see `uefi-loader`) locates a 16-byte
//! magic on disk, loads the following pages, and rewrites specific 8-byte
//! placeholder fields within them with boot-time values before jumping to
//! the loaded code.
//!
//! This crate is a pure, host-buildable implementation of that rewrite pass
//! only — it owns no disk I/O, no paging, and is not invoked anywhere in
//! this workspace's runtime boot path. It exists so the wire contract is
//! specified as executable, tested code rather than only prose, documenting
//! the legacy handoff this codebase's UEFI path supersedes.
#![cfg_attr(not(test), no_std)]

/// The 16-byte magic that marks the start of the kernel-loader's first
/// sector on disk. The bootloader scans up to 1,000 sectors looking for
/// this exact byte sequence.
pub const DISK_HEADER_MAGIC: [u8; 16] = [
    0x09, 0xF9, 0x11, 0x02, 0x9D, 0x74, 0xE3, 0x5B, 0xD8, 0x41, 0x56, 0xC5, 0x63, 0x56, 0x88, 0xC0,
];

/// Size of one kernel-loader page, and the unit the rewrite pass operates
/// over.
pub const PAGE_SIZE: usize = 4096;

/// Width in bytes of every placeholder field. Fields are recognised and
/// rewritten at 8-byte-aligned word boundaries only.
const WORD_SIZE: usize = 8;

macro_rules! magic8 {
    ($s:literal) => {{
        let bytes: &[u8] = $s;
        let mut out = [0u8; WORD_SIZE];
        let mut i = 0;
        while i < bytes.len() {
            out[i] = bytes[i];
            i += 1;
        }
        out
    }};
}

const MAGIC_FLORKLOD: [u8; WORD_SIZE] = *b"FLORKLOD";
const MAGIC_PHYS_FREE: [u8; WORD_SIZE] = *b"PhysFree";
const MAGIC_PHYS_BASE: [u8; WORD_SIZE] = *b"PhysBase";
const MAGIC_PHYS_END: [u8; WORD_SIZE] = magic8!(b"PhysEnd\0");
const MAGIC_HIGH_RANG: [u8; WORD_SIZE] = *b"HighRang";
const MAGIC_DISP_WIDE: [u8; WORD_SIZE] = *b"DispWide";
const MAGIC_DISP_HIGH: [u8; WORD_SIZE] = *b"DispHigh";
const MAGIC_DISP_PITC: [u8; WORD_SIZE] = *b"DispPitc";
const MAGIC_FRAME_BUF: [u8; WORD_SIZE] = *b"FrameBuf";
const MAGIC_DRIVE_NUM: [u8; WORD_SIZE] = *b"DriveNum";
const MAGIC_DISP_VGAX: [u8; WORD_SIZE] = *b"DispVGAX";
const MAGIC_DISP_VGAY: [u8; WORD_SIZE] = *b"DispVGAY";
const MAGIC_UNKNOWN: [u8; WORD_SIZE] = *b"UNKNOMAG";

/// Boot-time values the rewrite pass substitutes for each recognised
/// placeholder magic, per spec.md §6's table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteValues {
    /// Pointer to the physical freelist head record (`"PhysFree"`).
    pub phys_free: u64,
    /// Physical-memory virtual base, PMVB (`"PhysBase"`).
    pub phys_base: u64,
    /// PMVB + highest physical address seen in the memory map (`"PhysEnd\0"`).
    pub phys_end: u64,
    /// Pointer to the high-memory ranges vector (`"HighRang"`).
    pub high_rang: u64,
    /// Framebuffer width in pixels (`"DispWide"`).
    pub disp_wide: u64,
    /// Framebuffer height in pixels (`"DispHigh"`).
    pub disp_high: u64,
    /// Framebuffer pitch/stride in bytes (`"DispPitc"`).
    pub disp_pitch: u64,
    /// Framebuffer physical address (`"FrameBuf"`).
    pub frame_buf: u64,
    /// BIOS drive number the kernel was booted from (`"DriveNum"`).
    pub drive_num: u64,
    /// VGA cursor column (`"DispVGAX"`).
    pub disp_vga_x: u64,
    /// VGA cursor row (`"DispVGAY"`).
    pub disp_vga_y: u64,
}

/// Outcome of one [`rewrite_words`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// Index (in 8-byte words from the start of `buf`) of the `"FLORKLOD"`
    /// entry-address placeholder, if the scan reached it. Per the original
    /// format, the *following* word holds the loader's entry address, and
    /// the scan stops the instant this magic is found — everything after
    /// it is the loader's actual code and is left untouched.
    pub loader_entry_word_index: Option<usize>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatchError {
    /// `buf.len()` was not a multiple of 8.
    #[error("buffer length {0} is not a multiple of the 8-byte field width")]
    UnalignedLength(usize),
}

/// Rewrite the recognised magic placeholder words in `buf` with the values
/// from `values`, starting at word index `start_word`.
///
/// Scans `buf` word-by-word (8 bytes each) until either the end of the
/// buffer or the `"FLORKLOD"` entry-address placeholder is found, whichever
/// comes first — mirroring the original format's bounded header scan (see
/// this crate's module docs): only a short run of placeholder words at the
/// front of the loader image is ever subject to rewriting, so a coincidental
/// match deeper in actual loader code is never touched. Every word in the
/// scanned prefix that isn't one of the eleven named magics is overwritten
/// with `"UNKNOMAG"`, per spec.md §6's "any other" rule.
///
/// `start_word` lets the caller skip the two header words (16-byte disk
/// magic + page-count) that only the very first page of the loader image
/// carries; later pages pass `0`.
pub fn rewrite_words(
    buf: &mut [u8],
    start_word: usize,
    values: &RewriteValues,
) -> Result<RewriteOutcome, PatchError> {
    if !buf.len().is_multiple_of(WORD_SIZE) {
        return Err(PatchError::UnalignedLength(buf.len()));
    }

    let total_words = buf.len() / WORD_SIZE;
    let mut loader_entry_word_index = None;

    let mut idx = start_word;
    while idx < total_words {
        let start = idx * WORD_SIZE;
        let word: [u8; WORD_SIZE] = buf[start..start + WORD_SIZE]
            .try_into()
            .expect("slice is exactly WORD_SIZE bytes");

        let replacement = match word {
            MAGIC_FLORKLOD => {
                loader_entry_word_index = Some(idx);
                None
            }
            MAGIC_PHYS_FREE => Some(values.phys_free),
            MAGIC_PHYS_BASE => Some(values.phys_base),
            MAGIC_PHYS_END => Some(values.phys_end),
            MAGIC_HIGH_RANG => Some(values.high_rang),
            MAGIC_DISP_WIDE => Some(values.disp_wide),
            MAGIC_DISP_HIGH => Some(values.disp_high),
            MAGIC_DISP_PITC => Some(values.disp_pitch),
            MAGIC_FRAME_BUF => Some(values.frame_buf),
            MAGIC_DRIVE_NUM => Some(values.drive_num),
            MAGIC_DISP_VGAX => Some(values.disp_vga_x),
            MAGIC_DISP_VGAY => Some(values.disp_vga_y),
            _ => Some(u64::from_le_bytes(MAGIC_UNKNOWN)),
        };

        if loader_entry_word_index.is_some() {
            break;
        }

        if let Some(v) = replacement {
            buf[start..start + WORD_SIZE].copy_from_slice(&v.to_le_bytes());
        }

        idx += 1;
    }

    Ok(RewriteOutcome {
        loader_entry_word_index,
    })
}

/// Convenience wrapper over [`rewrite_words`] for a single loader page:
/// skips the 16-byte disk-header magic and page-count word when `is_first_page`
/// is set, matching the original format's `passedMagic` bookkeeping.
pub fn rewrite_page(
    page: &mut [u8; PAGE_SIZE],
    is_first_page: bool,
    values: &RewriteValues,
) -> Result<RewriteOutcome, PatchError> {
    let start_word = usize::from(is_first_page) * 2;
    rewrite_words(page, start_word, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_at(buf: &[u8], idx: usize) -> u64 {
        u64::from_le_bytes(buf[idx * 8..idx * 8 + 8].try_into().unwrap())
    }

    /// S3 — kernel-loader rewrite scenario from spec.md §8.
    #[test]
    fn physbase_and_physfree_rewrite_and_unknown_tail_becomes_unknomag() {
        let mut buf = [0u8; 32];
        buf[0..8].copy_from_slice(b"PhysBase");
        buf[8..16].copy_from_slice(b"PhysFree");
        buf[16..24].copy_from_slice(b"garbage!");
        buf[24..32].copy_from_slice(b"lolwhat?");

        let values = RewriteValues {
            phys_base: 0x0000_C000_0000_0000,
            phys_free: 0x0000_0000_0019_2000,
            ..Default::default()
        };

        let outcome = rewrite_words(&mut buf, 0, &values).unwrap();
        assert_eq!(outcome.loader_entry_word_index, None);

        assert_eq!(word_at(&buf, 0), 0x0000_C000_0000_0000);
        assert_eq!(word_at(&buf, 1), 0x0000_0000_0019_2000);
        assert_eq!(&buf[16..24], b"UNKNOMAG");
        assert_eq!(&buf[24..32], b"UNKNOMAG");
    }

    #[test]
    fn scan_stops_at_florklod_and_reports_entry_word_index() {
        let mut buf = [0u8; 40];
        buf[0..8].copy_from_slice(b"PhysBase");
        buf[8..16].copy_from_slice(b"FLORKLOD");
        // Entry address slot (the word right after FLORKLOD) plus trailing
        // "code" that must survive untouched.
        buf[16..24].copy_from_slice(&0xDEAD_BEEF_u64.to_le_bytes());
        buf[24..32].copy_from_slice(b"NotAMagc");
        buf[32..40].copy_from_slice(b"RealCode");

        let values = RewriteValues {
            phys_base: 0x1111_2222_3333_4444,
            ..Default::default()
        };

        let outcome = rewrite_words(&mut buf, 0, &values).unwrap();
        assert_eq!(outcome.loader_entry_word_index, Some(1));

        assert_eq!(word_at(&buf, 0), 0x1111_2222_3333_4444);
        // Untouched: scan stopped the instant FLORKLOD was found.
        assert_eq!(word_at(&buf, 2), 0xDEAD_BEEF);
        assert_eq!(&buf[24..32], b"NotAMagc");
        assert_eq!(&buf[32..40], b"RealCode");
    }

    #[test]
    fn start_word_skips_first_page_disk_header() {
        let mut page = [0u8; PAGE_SIZE];
        page[0..16].copy_from_slice(&DISK_HEADER_MAGIC);
        page[16..24].copy_from_slice(&3u64.to_le_bytes());
        page[24..32].copy_from_slice(b"PhysBase");

        let values = RewriteValues {
            phys_base: 0xAAAA_BBBB_CCCC_DDDD,
            ..Default::default()
        };

        let outcome = rewrite_page(&mut page, true, &values).unwrap();
        assert_eq!(outcome.loader_entry_word_index, None);
        // Header words (0 and 1) are untouched.
        assert_eq!(&page[0..16], &DISK_HEADER_MAGIC);
        assert_eq!(word_at(&page, 3), 0xAAAA_BBBB_CCCC_DDDD);
    }

    #[test]
    fn rejects_unaligned_buffer_length() {
        let mut buf = [0u8; 5];
        assert_eq!(
            rewrite_words(&mut buf, 0, &RewriteValues::default()),
            Err(PatchError::UnalignedLength(5))
        );
    }
}
