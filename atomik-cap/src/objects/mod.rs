//! Capability object types
//!
//! Every capability slot carries one [`CapObject`]: a closed sum type whose
//! variant is the object type and whose payload is the per-type state the
//! kernel keeps in the slot itself.
//!
//! # Object Categories
//!
//! ## Memory Objects
//! - [`UntypedCap`]: Raw physical memory, carved by a watermark
//! - [`PoolCap`]: Physical memory split into same-typed objects by a buddy allocator
//!
//! ## Translation Objects
//! - [`PageCap`]: One 4 KiB frame
//! - [`PageTableCap`]: Second-level table
//! - [`PageDirectoryCap`]: Top-level table (address space root)
//!
//! ## Execution and IPC Objects
//! - [`CNodeCap`]: Capability storage container
//! - [`TcbCap`]: Thread control block
//! - [`EndpointCap`], [`NotificationCap`]: IPC rendezvous objects

pub mod cnode_obj;
pub mod endpoint;
pub mod frame;
pub mod page_table;
pub mod pool;
pub mod tcb;
pub mod untyped;
pub mod vspace;

use core::fmt;

use atomik_common::{PAGE_BITS, PhysAddr};
use atomik_syscall::CapInfo;

pub use cnode_obj::CNodeCap;
pub use endpoint::{EndpointCap, EndpointState, NotificationCap};
pub use frame::PageCap;
pub use page_table::PageTableCap;
pub use pool::PoolCap;
pub use tcb::TcbCap;
pub use untyped::UntypedCap;
pub use vspace::PageDirectoryCap;

use crate::cnode::{MAX_CNODE_RADIX, MIN_CNODE_RADIX};
use crate::error::{CapError, CapResult};
use crate::rights::CapRights;
use crate::slot::ObjectType;

// -- Object sizes (log2 bytes)

/// Size of one capability slot.
pub const CAPSLOT_SIZE_BITS: u32 = 4;

/// Size of a thread control block.
pub const TCB_SIZE_BITS: u32 = 7;

/// Size of an endpoint.
pub const ENDPOINT_SIZE_BITS: u32 = 4;

/// Size of a notification.
pub const NOTIFICATION_SIZE_BITS: u32 = 4;

/// Smallest untyped region or pool that can be created.
pub const MIN_UNTYPED_SIZE_BITS: u32 = 4;

/// Largest untyped region or pool (the whole 32-bit physical space).
pub const MAX_UNTYPED_SIZE_BITS: u32 = 32;

/// Compute the log2 byte size of one object.
///
/// `size_bits` is only consulted for variable-size types: the region size
/// for Untyped and Pool, the entry-count log2 for CNode. Page, table, TCB
/// and IPC objects have architecture-fixed sizes.
///
/// # Errors
///
/// - `InvalidSize` if a variable size is out of range
/// - `InvalidType` for the Null type
pub const fn object_size_bits(ty: ObjectType, size_bits: u32) -> CapResult<u32> {
    match ty {
        ObjectType::Null => Err(CapError::InvalidType),
        ObjectType::Untyped | ObjectType::Pool => {
            if size_bits < MIN_UNTYPED_SIZE_BITS || size_bits > MAX_UNTYPED_SIZE_BITS {
                Err(CapError::InvalidSize)
            } else {
                Ok(size_bits)
            }
        }
        ObjectType::CNode => {
            if size_bits < MIN_CNODE_RADIX || size_bits > MAX_CNODE_RADIX {
                Err(CapError::InvalidSize)
            } else {
                Ok(size_bits + CAPSLOT_SIZE_BITS)
            }
        }
        ObjectType::Page | ObjectType::PageTable | ObjectType::PageDirectory => Ok(PAGE_BITS),
        ObjectType::ThreadControlBlock => Ok(TCB_SIZE_BITS),
        ObjectType::Endpoint => Ok(ENDPOINT_SIZE_BITS),
        ObjectType::Notification => Ok(NOTIFICATION_SIZE_BITS),
    }
}

/// Capability payload.
///
/// The variant is the object type; `Null` marks an empty slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CapObject {
    /// Empty slot.
    #[default]
    Null,
    /// Untyped memory.
    Untyped(UntypedCap),
    /// Capability node.
    CNode(CNodeCap),
    /// Page frame.
    Page(PageCap),
    /// Page table.
    PageTable(PageTableCap),
    /// Page directory.
    PageDirectory(PageDirectoryCap),
    /// Endpoint.
    Endpoint(EndpointCap),
    /// Notification.
    Notification(NotificationCap),
    /// Thread control block.
    Tcb(TcbCap),
    /// Object pool.
    Pool(PoolCap),
}

impl CapObject {
    /// Get the object type tag.
    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        match self {
            Self::Null => ObjectType::Null,
            Self::Untyped(_) => ObjectType::Untyped,
            Self::CNode(_) => ObjectType::CNode,
            Self::Page(_) => ObjectType::Page,
            Self::PageTable(_) => ObjectType::PageTable,
            Self::PageDirectory(_) => ObjectType::PageDirectory,
            Self::Endpoint(_) => ObjectType::Endpoint,
            Self::Notification(_) => ObjectType::Notification,
            Self::Tcb(_) => ObjectType::ThreadControlBlock,
            Self::Pool(_) => ObjectType::Pool,
        }
    }

    /// Get the access rights (none for an empty slot).
    #[must_use]
    pub const fn rights(&self) -> CapRights {
        match self {
            Self::Null => CapRights::NONE,
            Self::Untyped(ut) => ut.rights,
            Self::CNode(cnode) => cnode.rights,
            Self::Page(page) => page.rights,
            Self::PageTable(pt) => pt.rights,
            Self::PageDirectory(pd) => pd.rights,
            Self::Endpoint(ep) => ep.rights,
            Self::Notification(ntfn) => ntfn.rights,
            Self::Tcb(tcb) => tcb.rights,
            Self::Pool(pool) => pool.rights,
        }
    }

    /// Replace the access rights. No effect on an empty slot.
    pub fn set_rights(&mut self, rights: CapRights) {
        match self {
            Self::Null => {}
            Self::Untyped(ut) => ut.rights = rights,
            Self::CNode(cnode) => cnode.rights = rights,
            Self::Page(page) => page.rights = rights,
            Self::PageTable(pt) => pt.rights = rights,
            Self::PageDirectory(pd) => pd.rights = rights,
            Self::Endpoint(ep) => ep.rights = rights,
            Self::Notification(ntfn) => ntfn.rights = rights,
            Self::Tcb(tcb) => tcb.rights = rights,
            Self::Pool(pool) => pool.rights = rights,
        }
    }

    /// Physical base address of the object.
    #[must_use]
    pub const fn base(&self) -> PhysAddr {
        match self {
            Self::Null => PhysAddr::new(0),
            Self::Untyped(ut) => ut.base,
            Self::CNode(cnode) => cnode.base,
            Self::Page(page) => page.base,
            Self::PageTable(pt) => pt.base,
            Self::PageDirectory(pd) => pd.base,
            Self::Endpoint(ep) => ep.base,
            Self::Notification(ntfn) => ntfn.base,
            Self::Tcb(tcb) => tcb.base,
            Self::Pool(pool) => pool.base,
        }
    }

    /// Log2 of the object's physical footprint in bytes.
    #[must_use]
    pub const fn size_bits(&self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Untyped(ut) => ut.size_bits,
            Self::CNode(cnode) => cnode.size_bits + CAPSLOT_SIZE_BITS,
            Self::Page(_) | Self::PageTable(_) | Self::PageDirectory(_) => PAGE_BITS,
            Self::Endpoint(_) => ENDPOINT_SIZE_BITS,
            Self::Notification(_) => NOTIFICATION_SIZE_BITS,
            Self::Tcb(_) => TCB_SIZE_BITS,
            Self::Pool(pool) => pool.size_bits,
        }
    }
    /// Describe the capability for `cap_get_info`.
    ///
    /// CNodes report their entry count; Untyped reports the watermark in
    /// place of a virtual address.
    #[must_use]
    pub fn info(&self) -> CapInfo {
        let mut info = CapInfo {
            object_type: self.object_type() as u32,
            size_bits: self.size_bits() as u8,
            access: self.rights().bits(),
            paddr: self.base().as_u64() as u32,
            ..CapInfo::default()
        };
        match self {
            Self::Untyped(ut) => info.vaddr = ut.watermark as u32,
            Self::CNode(cnode) => {
                info.size_bits = cnode.size_bits as u8;
                info.guard = cnode.guard;
                info.guard_bits = cnode.guard_bits as u8;
            }
            Self::Page(page) => info.vaddr = page.vaddr.as_u64() as u32,
            Self::PageTable(pt) => info.vaddr = pt.vaddr.as_u64() as u32,
            _ => {}
        }
        info
    }
}

impl fmt::Display for CapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Untyped(ut) => write!(f, "Untyped({}, 2^{}, wm={:#x})", ut.base, ut.size_bits, ut.watermark),
            Self::CNode(cnode) => write!(
                f,
                "CNode({}, 2^{} entries, guard={:#x}/{})",
                cnode.base, cnode.size_bits, cnode.guard, cnode.guard_bits
            ),
            Self::Page(page) => write!(f, "Page({}, at {})", page.base, page.vaddr),
            Self::PageTable(pt) => write!(f, "PageTable({}, at {})", pt.base, pt.vaddr),
            Self::PageDirectory(pd) => write!(f, "PageDirectory({})", pd.base),
            Self::Endpoint(ep) => write!(f, "Endpoint({}, {:?})", ep.base, ep.state),
            Self::Notification(ntfn) => write!(f, "Notification({})", ntfn.base),
            Self::Tcb(tcb) => write!(f, "TCB({})", tcb.base),
            Self::Pool(pool) => write!(
                f,
                "Pool({}, 2^{}, {} x 2^{}, {}/{} free)",
                pool.base, pool.size_bits, pool.pool_type, pool.object_size_bits, pool.available, pool.capacity
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes_ignore_argument() {
        assert_eq!(object_size_bits(ObjectType::Page, 3), Ok(12));
        assert_eq!(object_size_bits(ObjectType::PageDirectory, 30), Ok(12));
        assert_eq!(object_size_bits(ObjectType::ThreadControlBlock, 0), Ok(7));
        assert_eq!(object_size_bits(ObjectType::Endpoint, 0), Ok(4));
    }

    #[test]
    fn test_cnode_size_includes_slot() {
        assert_eq!(object_size_bits(ObjectType::CNode, 8), Ok(12));
        assert_eq!(object_size_bits(ObjectType::CNode, 0), Err(CapError::InvalidSize));
        assert_eq!(object_size_bits(ObjectType::CNode, 25), Err(CapError::InvalidSize));
    }

    #[test]
    fn test_untyped_minimum() {
        assert_eq!(object_size_bits(ObjectType::Untyped, 3), Err(CapError::InvalidSize));
        assert_eq!(object_size_bits(ObjectType::Untyped, 5), Ok(5));
        assert_eq!(object_size_bits(ObjectType::Null, 5), Err(CapError::InvalidType));
    }

    #[test]
    fn test_null_payload() {
        let obj = CapObject::default();
        assert_eq!(obj.object_type(), ObjectType::Null);
        assert!(obj.rights().is_empty());
        assert_eq!(obj.size_bits(), 0);
        assert_eq!(obj.info(), CapInfo::default());
    }

    #[test]
    fn test_info_for_cnode_and_untyped() {
        let mut ut = UntypedCap::new(PhysAddr::new(0x0020_0000), 16, CapRights::ALL);
        ut.watermark = 0x3000;
        let info = CapObject::Untyped(ut).info();
        assert_eq!(info.object_type, ObjectType::Untyped as u32);
        assert_eq!(info.size_bits, 16);
        assert_eq!(info.access, 0x1F);
        assert_eq!(info.paddr, 0x0020_0000);
        assert_eq!(info.vaddr, 0x3000);
    }
}
