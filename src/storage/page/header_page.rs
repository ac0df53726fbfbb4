//! Root directory page.
//!
//! Splits and merges move a tree's root, so the only durable way to find a
//! tree after a restart is this page: a table of (index name, root page id)
//! records stored at [`PageId::HEADER`].
//!
//! ```text
//! | PageHeader (13) | record_count (4) | NAME(32)+ROOT(4) | NAME(32)+ROOT(4) | ...
//! ```
//!
//! Names are stored zero-padded; a zeroed page decodes as an empty directory.

use crate::common::config::{MAX_INDEX_NAME_LEN, PAGE_SIZE};
use crate::common::{Error, PageId, Result};

use super::b_plus_tree_page::read_u32;
use super::page::Page;
use super::page_header::{PageHeader, PageType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPage {
    records: Vec<(String, PageId)>,
}

impl HeaderPage {
    const OFFSET_COUNT: usize = PageHeader::SIZE;
    const OFFSET_RECORDS: usize = Self::OFFSET_COUNT + 4;
    const RECORD_SIZE: usize = MAX_INDEX_NAME_LEN + PageId::ENCODED_SIZE;

    /// Most records one page can hold.
    pub const MAX_RECORDS: usize = (PAGE_SIZE - Self::OFFSET_RECORDS) / Self::RECORD_SIZE;

    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the directory. An unformatted (all-zero) page is an empty one.
    pub fn decode(page: &Page) -> Result<Self> {
        match page.page_type() {
            PageType::Directory => {}
            PageType::Invalid => return Ok(Self::new()),
            other => {
                return Err(Error::corrupt(
                    PageId::HEADER.0,
                    format!("expected the root directory, found {:?}", other),
                ))
            }
        }
        if !page.verify_checksum() {
            return Err(Error::ChecksumMismatch(PageId::HEADER.0));
        }

        let data = page.as_slice();
        let count = read_u32(data, Self::OFFSET_COUNT) as usize;
        if count > Self::MAX_RECORDS {
            return Err(Error::corrupt(
                PageId::HEADER.0,
                format!("directory holds {} records, limit is {}", count, Self::MAX_RECORDS),
            ));
        }

        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let offset = Self::OFFSET_RECORDS + i * Self::RECORD_SIZE;
            let raw = &data[offset..offset + MAX_INDEX_NAME_LEN];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let name = String::from_utf8_lossy(&raw[..end]).into_owned();
            let root = PageId::decode(&data[offset + MAX_INDEX_NAME_LEN..]);
            records.push((name, root));
        }
        Ok(Self { records })
    }

    pub fn write_to(&self, page: &mut Page) {
        page.set_page_type(PageType::Directory);
        let data = page.as_mut_slice();
        data[Self::OFFSET_COUNT..Self::OFFSET_COUNT + 4]
            .copy_from_slice(&(self.records.len() as u32).to_le_bytes());

        for (i, (name, root)) in self.records.iter().enumerate() {
            let offset = Self::OFFSET_RECORDS + i * Self::RECORD_SIZE;
            let slot = &mut data[offset..offset + MAX_INDEX_NAME_LEN];
            slot.fill(0);
            slot[..name.len()].copy_from_slice(name.as_bytes());
            root.encode(&mut data[offset + MAX_INDEX_NAME_LEN..]);
        }
        page.stamp_checksum();
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Add a record. Returns false if `name` is already registered.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<bool> {
        Self::check_name(name)?;
        if self.find(name).is_some() {
            return Ok(false);
        }
        if self.records.len() >= Self::MAX_RECORDS {
            return Err(Error::DirectoryFull);
        }
        self.records.push((name.to_owned(), root_page_id));
        Ok(true)
    }

    /// Point an existing record at a new root. Returns false if absent.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        match self.find(name) {
            Some(index) => {
                self.records[index].1 = root_page_id;
                true
            }
            None => false,
        }
    }

    /// Drop a record. Returns false if absent.
    pub fn delete_record(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find(name).map(|index| self.records[index].1)
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|(n, _)| n == name)
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_INDEX_NAME_LEN || name.as_bytes().contains(&0) {
            return Err(Error::InvalidIndexName(name.to_owned()));
        }
        Ok(())
    }
}
