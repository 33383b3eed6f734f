//! Page allocation for the device database
//!
//! Pages are fixed-size blocks (4096 by default, the size is a run
//! parameter) with:
//! - Fixed header at offset 0x00-0x27
//! - Heap growing forward from offset 0x28
//! - Row index growing backward from the page end
//!
//! Row index structure (per 16-row group, from the end of the page):
//! - 2 bytes presence flags (bitmask of which rows exist)
//! - 16 x 2-byte offsets pointing at row data, heap-relative, stored in
//!   reverse row order within the group
//!
//! Heap and index are two independent cursors; an insert that would make
//! them meet is refused so the caller opens a linked continuation page.

use std::io::Cursor;

use binrw::{binrw, BinWrite};

use crate::error::{Error, Result};

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest supported page size; smaller pages could not hold a
/// worst-case clamped track row
pub const MIN_PAGE_SIZE: usize = 4096;

/// Largest supported page size; the u16 used/free header fields cap the
/// heap region
pub const MAX_PAGE_SIZE: usize = 65536;

/// Offset where heap data begins
pub const HEAP_START: usize = 0x28;

/// Size of each row group in the backward-growing index:
/// 2 (presence flags) + 16 * 2 (offsets)
pub const ROW_GROUP_SIZE: usize = 34;

/// Rows per index group
pub const ROWS_PER_GROUP: usize = 16;

/// Next-page value marking the end of a table's chain
pub const NO_NEXT_PAGE: u32 = 0xFFFF_FFFF;

/// Page flags byte for a normal data page
const PAGE_FLAGS_DATA: u8 = 0x34;

/// Table/page types
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageType {
    Tracks = 0,
    Genres = 1,
    Artists = 2,
    Albums = 3,
    Cues = 4,
    Keys = 5,
}

/// A single page being built
pub struct PageBuilder {
    data: Vec<u8>,
    /// Current heap write position (offset from page start)
    heap_pos: usize,
    row_count: usize,
    page_index: u32,
    page_type: PageType,
    /// Row offsets relative to HEAP_START
    row_offsets: Vec<u16>,
}

impl PageBuilder {
    pub fn new(page_index: u32, page_type: PageType, page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size],
            heap_pos: HEAP_START,
            row_count: 0,
            page_index,
            page_type,
            row_offsets: Vec::new(),
        }
    }

    fn page_size(&self) -> usize {
        self.data.len()
    }

    /// Index bytes needed for `rows` rows
    fn index_size(rows: usize) -> usize {
        rows.div_ceil(ROWS_PER_GROUP) * ROW_GROUP_SIZE
    }

    /// Free bytes left between heap and index
    pub fn free_size(&self) -> usize {
        let index_start = self.page_size() - Self::index_size(self.row_count.max(1));
        index_start.saturating_sub(self.heap_pos)
    }

    /// Whether inserting `row_len` bytes would make heap and index overlap,
    /// accounting for the index growth of one more row
    pub fn would_overflow(&self, row_len: usize) -> bool {
        let index_start = self.page_size() - Self::index_size(self.row_count + 1);
        self.heap_pos + row_len > index_start
    }

    /// Append one row to the heap and record it in the index
    ///
    /// Returns the heap-relative offset of the row.
    pub fn write_row(&mut self, row: &[u8]) -> Result<u16> {
        if self.would_overflow(row.len()) {
            return Err(Error::PageOverflow(format!(
                "cannot insert {} bytes into page {}, {} free",
                row.len(),
                self.page_index,
                self.free_size()
            )));
        }

        let offset = (self.heap_pos - HEAP_START) as u16;
        self.data[self.heap_pos..self.heap_pos + row.len()].copy_from_slice(row);
        self.heap_pos += row.len();
        self.row_offsets.push(offset);
        self.row_count += 1;
        Ok(offset)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Finalize the page: write header and row index, return the bytes
    pub fn finalize(mut self, next_page: u32) -> Vec<u8> {
        self.write_header(next_page);
        self.write_row_index();
        self.data
    }

    fn write_header(&mut self, next_page: u32) {
        // Bytes 0-3: always zero
        self.data[4..8].copy_from_slice(&self.page_index.to_le_bytes());
        self.data[8..12].copy_from_slice(&(self.page_type as u32).to_le_bytes());
        self.data[12..16].copy_from_slice(&next_page.to_le_bytes());
        // Bytes 16-19: structure version
        self.data[16..20].copy_from_slice(&1u32.to_le_bytes());
        // Bytes 20-23: zero

        // Bytes 24-26: packed row counts
        // Lower 13 bits: offsets ever allocated, upper 11 bits: live rows
        let packed =
            (self.row_count as u32 & 0x1FFF) | ((self.row_count as u32 & 0x7FF) << 13);
        self.data[24] = (packed & 0xFF) as u8;
        self.data[25] = ((packed >> 8) & 0xFF) as u8;
        self.data[26] = ((packed >> 16) & 0xFF) as u8;

        self.data[27] = PAGE_FLAGS_DATA;

        let free_size = self.free_size() as u16;
        self.data[28..30].copy_from_slice(&free_size.to_le_bytes());
        let used_size = (self.heap_pos - HEAP_START) as u16;
        self.data[30..32].copy_from_slice(&used_size.to_le_bytes());
        // Bytes 32-39: reserved, zero
    }

    fn write_row_index(&mut self) {
        let page_size = self.page_size();
        let num_groups = self.row_offsets.len().div_ceil(ROWS_PER_GROUP);

        for group_idx in 0..num_groups {
            let group_start = page_size - (group_idx + 1) * ROW_GROUP_SIZE;

            let first_row = group_idx * ROWS_PER_GROUP;
            let rows_in_group = ROWS_PER_GROUP.min(self.row_offsets.len() - first_row);

            let presence: u16 = if rows_in_group == ROWS_PER_GROUP {
                u16::MAX
            } else {
                (1u16 << rows_in_group) - 1
            };
            self.data[group_start..group_start + 2].copy_from_slice(&presence.to_le_bytes());

            // Offsets in reverse row order: the group's first row sits at
            // the highest slot address
            for local in 0..rows_in_group {
                let slot = ROWS_PER_GROUP - 1 - local;
                let pos = group_start + 2 + slot * 2;
                self.data[pos..pos + 2]
                    .copy_from_slice(&self.row_offsets[first_row + local].to_le_bytes());
            }
        }
    }
}

/// Hands out globally unique, monotonically increasing page indices
#[derive(Debug, Default)]
pub struct PageAllocator {
    next: u32,
}

impl PageAllocator {
    /// Page 0 is the file header; data pages start at 1
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> u32 {
        let index = self.next;
        self.next += 1;
        index
    }

    pub fn next_unused(&self) -> u32 {
        self.next
    }
}

/// Collects one table's rows into a chain of linked pages
///
/// Per-table state machine: a fresh builder is Empty, accepts rows until
/// the next row would collide with the index region, then opens a linked
/// continuation page and retries. The retry always succeeds because row
/// encoders clamp rows far below page capacity.
pub struct TableBuilder {
    page_type: PageType,
    page_size: usize,
    pages: Vec<PageBuilder>,
    row_count: usize,
}

impl TableBuilder {
    pub fn new(page_type: PageType, page_size: usize) -> Self {
        Self {
            page_type,
            page_size,
            pages: Vec::new(),
            row_count: 0,
        }
    }

    pub fn push_row(&mut self, alloc: &mut PageAllocator, row: &[u8]) -> Result<()> {
        if self.pages.is_empty() || self.pages.last().is_some_and(|p| p.would_overflow(row.len())) {
            self.pages
                .push(PageBuilder::new(alloc.allocate(), self.page_type, self.page_size));
        }
        // Cannot fail: the row fits a fresh page by construction
        let page = self.pages.last_mut().ok_or_else(|| {
            Error::Database("table builder lost its current page".into())
        })?;
        page.write_row(row)?;
        self.row_count += 1;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    /// Directory pointer for this table, if it holds any pages
    pub fn table_pointer(&self) -> Option<TablePointer> {
        let first = self.pages.first()?.page_index();
        let last = self.pages.last()?.page_index();
        Some(TablePointer {
            table_type: self.page_type as u32,
            empty_candidate: last,
            first_page: first,
            last_page: last,
        })
    }

    /// Serialize all pages, linking each to its successor
    pub fn finalize(self) -> Vec<Vec<u8>> {
        let next_indices: Vec<u32> = self
            .pages
            .iter()
            .skip(1)
            .map(|p| p.page_index())
            .chain(std::iter::once(NO_NEXT_PAGE))
            .collect();
        self.pages
            .into_iter()
            .zip(next_indices)
            .map(|(page, next)| page.finalize(next))
            .collect()
    }
}

/// Directory entry in the file header, one per non-empty table
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TablePointer {
    pub table_type: u32,
    /// Page an insert would try first; the chain's last page here
    pub empty_candidate: u32,
    pub first_page: u32,
    pub last_page: u32,
}

/// Database file header, serialized into page 0
#[binrw]
#[brw(little)]
#[derive(Debug)]
pub struct FileHeader {
    /// Always zero
    pub signature: u32,
    pub page_size: u32,
    #[bw(calc = tables.len() as u32)]
    #[br(temp)]
    pub num_tables: u32,
    pub next_unused_page: u32,
    pub unknown: u32,
    pub sequence: u32,
    /// Gap before the directory entries at byte 28
    pub reserved: u32,
    #[br(count = num_tables)]
    pub tables: Vec<TablePointer>,
}

impl FileHeader {
    pub fn new(page_size: usize, next_unused_page: u32, tables: Vec<TablePointer>) -> Self {
        Self {
            signature: 0,
            page_size: page_size as u32,
            next_unused_page,
            unknown: 0,
            sequence: 1,
            reserved: 0,
            tables,
        }
    }

    /// Serialize into a full zero-padded page
    pub fn to_page(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.page_size as usize));
        self.write(&mut cursor)?;
        let mut page = cursor.into_inner();
        if page.len() > self.page_size as usize {
            return Err(Error::Database(format!(
                "{} directory entries overflow the header page",
                self.tables.len()
            )));
        }
        page.resize(self.page_size as usize, 0);
        Ok(page)
    }
}
