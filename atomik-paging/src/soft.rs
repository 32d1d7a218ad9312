//! Software MMU
//!
//! Holds the active translation root and counts TLB maintenance. Virtual
//! accesses are resolved by walking the live tables, so whatever the tables
//! say is exactly what a thread running on this root would observe.

use atomik_common::{PAGE_SIZE, PhysAddr, PhysMemory, VirtAddr};

use crate::arch::i386::{PageDirectory, PgTable, resolve_page};
use crate::permissions::PageAttributes;
use crate::traits::{Mmu, PagingError};

/// MMU state for one CPU.
#[derive(Debug, Clone)]
pub struct SoftMmu {
    boot_root: PhysAddr,
    current: PhysAddr,
    invalidations: u64,
    switches: u64,
}

impl SoftMmu {
    /// Create an MMU running on the boot directory.
    #[must_use]
    pub const fn new(boot_root: PhysAddr) -> Self {
        Self {
            boot_root,
            current: boot_root,
            invalidations: 0,
            switches: 0,
        }
    }

    /// The boot-time page directory.
    #[inline]
    #[must_use]
    pub const fn boot_root(&self) -> PhysAddr {
        self.boot_root
    }

    /// Single-page invalidations issued so far.
    #[inline]
    #[must_use]
    pub const fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Address space switches issued so far.
    #[inline]
    #[must_use]
    pub const fn switches(&self) -> u64 {
        self.switches
    }

    /// Translate `va` through the active root, checking `access`.
    ///
    /// # Errors
    ///
    /// `NotPresent` if unmapped or if the mapping lacks any attribute in
    /// `access`.
    pub fn translate<M: PhysMemory + ?Sized>(
        &self,
        mem: &M,
        va: VirtAddr,
        access: PageAttributes,
    ) -> Result<PhysAddr, PagingError> {
        let root = PageDirectory::from_pa(self.current);
        let (frame, attrs) = resolve_page(mem, root, va.page_align_down())?;
        if !attrs.contains(access) {
            return Err(PagingError::NotPresent);
        }
        Ok(frame.offset(va.page_offset()))
    }

    /// Read `buf.len()` bytes at `va` through the active root.
    ///
    /// # Errors
    ///
    /// `NotPresent` if any touched page is unmapped or unreadable.
    pub fn read_virt<M: PhysMemory + ?Sized>(
        &self,
        mem: &M,
        va: VirtAddr,
        buf: &mut [u8],
    ) -> Result<(), PagingError> {
        let mut done = 0usize;
        while done < buf.len() {
            let cursor = va.offset(done as u64);
            let pa = self.translate(mem, cursor, PageAttributes::READABLE)?;
            let count = (PAGE_SIZE - cursor.page_offset() as usize).min(buf.len() - done);
            mem.read_bytes(pa, &mut buf[done..done + count]);
            done += count;
        }
        Ok(())
    }

    /// Write `data` at `va` through the active root.
    ///
    /// # Errors
    ///
    /// `NotPresent` if any touched page is unmapped or read-only.
    pub fn write_virt<M: PhysMemory + ?Sized>(
        &self,
        mem: &mut M,
        va: VirtAddr,
        data: &[u8],
    ) -> Result<(), PagingError> {
        let mut done = 0usize;
        while done < data.len() {
            let cursor = va.offset(done as u64);
            let pa = self.translate(&*mem, cursor, PageAttributes::WRITABLE)?;
            let count = (PAGE_SIZE - cursor.page_offset() as usize).min(data.len() - done);
            mem.write_bytes(pa, &data[done..done + count]);
            done += count;
        }
        Ok(())
    }
}

impl Mmu for SoftMmu {
    fn invalidate_page(&mut self, va: VirtAddr) {
        log::trace!("invlpg {}", va);
        self.invalidations += 1;
    }

    fn switch_address_space(&mut self, root: Option<PhysAddr>) {
        self.current = root.unwrap_or(self.boot_root);
        self.switches += 1;
        log::trace!("cr3 <- {}", self.current);
    }

    fn current_root(&self) -> PhysAddr {
        self.current
    }
}
