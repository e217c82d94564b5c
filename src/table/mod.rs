//! Table-side filter lifecycle.
//!
//! The SSTable format itself lives elsewhere; this module owns the filter
//! section a table file carries and its hookup to the multi-queue cache:
//!
//! ```text
//! +--------------------------+
//! | unit 0                   |  <- units_offset (disk_offset in trailer)
//! | unit 1                   |
//! | ...                      |
//! | unit N-1                 |
//! +--------------------------+
//! | filter trailer           |  <- trailer_offset
//! +--------------------------+
//! | crc32(trailer)  u32 LE   |
//! | trailer_offset  u64 LE   |
//! +--------------------------+
//! ```
//!
//! Opening a table registers its reader in the cache under
//! `"filter." || policy name || fixed64_le(table_id)`; closing releases the
//! resident units but keeps the entry so a reopen restores them cheaply.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc::Crc;

use crate::cache::{filter_cache_key, Handle, MultiQueue};
use crate::errcorrupt;
use crate::error::Result;
use crate::file::{RandomAccessFile, StringSink};
use crate::filter::{FilterBlockBuilder, FilterBlockReader, FilterPolicy, UnitsHandle};

/// Footer bytes at the tail of the filter section.
pub const FOOTER_SIZE: u64 = 12;

const CRC32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISCSI);

/// Appends a finished filter section to `sink`: the raw units back to back,
/// the trailer, then the footer locating and checksumming the trailer.
/// Returns where the units landed.
pub fn write_filter_block(
    builder: &mut FilterBlockBuilder,
    sink: &mut StringSink,
) -> Result<UnitsHandle> {
    let units_offset = sink.offset();
    let units = builder.return_filters();
    let handle = UnitsHandle {
        offset: units_offset,
        size: units.first().map_or(0, |unit| unit.len()) as u32,
    };
    for unit in units {
        sink.append(unit);
    }

    let trailer = builder.finish(&handle);
    let trailer_offset = sink.offset();
    sink.append(&trailer);

    let mut footer = Vec::with_capacity(FOOTER_SIZE as usize);
    footer.write_u32::<LittleEndian>(CRC32.checksum(&trailer)).unwrap();
    footer.write_u64::<LittleEndian>(trailer_offset).unwrap();
    sink.append(&footer);
    Ok(handle)
}

/// One open table's filter, registered in the multi-queue cache.
pub struct TableFilter {
    cache: Arc<MultiQueue>,
    handle: Handle,
    cache_key: Vec<u8>,
}

impl TableFilter {
    /// Opens the filter section of a table file: validates the footer and
    /// trailer, constructs the reader (its initial units load in the
    /// background) and registers it in the cache. A corrupt trailer fails
    /// the open and nothing is inserted.
    pub fn open(
        policy: Arc<dyn FilterPolicy>,
        cache: Arc<MultiQueue>,
        file: Arc<dyn RandomAccessFile>,
        size: u64,
        table_id: u64,
    ) -> Result<Self> {
        if size < FOOTER_SIZE {
            return errcorrupt!("file too short for a filter footer: {size} bytes");
        }

        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_at(size - FOOTER_SIZE, &mut footer)?;
        let expected_crc = LittleEndian::read_u32(&footer);
        let trailer_offset = LittleEndian::read_u64(&footer[4..]);
        if trailer_offset > size - FOOTER_SIZE {
            return errcorrupt!(
                "filter trailer offset {trailer_offset} past footer in {size}-byte file"
            );
        }

        let mut trailer = vec![0u8; (size - FOOTER_SIZE - trailer_offset) as usize];
        file.read_at(trailer_offset, &mut trailer)?;
        if CRC32.checksum(&trailer) != expected_crc {
            return errcorrupt!("filter trailer checksum mismatch");
        }

        let reader = FilterBlockReader::new(policy.clone(), &trailer, file)?;
        let cache_key = filter_cache_key(policy.name(), table_id);
        let handle = cache.insert(&cache_key, reader, None);
        Ok(Self {
            cache,
            handle,
            cache_key,
        })
    }

    /// Routes a point-lookup probe through the cache: MRU promotion, a
    /// possible adjustment, then the probe itself.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        self.cache.key_may_match(self.handle, block_offset, key)
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn cache_key(&self) -> &[u8] {
        &self.cache_key
    }

    /// Drops all resident units but keeps the cache entry for a reopen.
    pub fn close(&self) {
        self.cache.release(self.handle);
    }

    /// Re-binds a reopened table file and restores the initial residency.
    pub fn reopen(&self, file: Arc<dyn RandomAccessFile>) -> Result<()> {
        self.cache.go_back_to_init_filter(self.handle, file)
    }

    /// Removes the cache entry entirely; called once compaction has deleted
    /// the table file.
    pub fn evict(self) {
        self.cache.erase(&self.cache_key);
    }
}
