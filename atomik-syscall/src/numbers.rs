//! Syscall numbers
//!
//! A syscall number is `(class << 24) | function`: the object class the
//! call operates on, and a function index within that class. The debug
//! calls sit at the top of the number space.

/// Object classes as seen by the syscall ABI.
///
/// The values match the kernel's object type tags.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    /// Calls valid on any capability.
    Any = 0,
    /// Untyped memory.
    Untyped = 1,
    /// Capability node.
    CNode = 2,
    /// Physical page.
    Page = 3,
    /// Second-level page table.
    PageTable = 4,
    /// Top-level page directory.
    PageDirectory = 5,
    /// IPC endpoint.
    Endpoint = 6,
    /// Notification object.
    Notification = 7,
    /// Thread control block.
    Tcb = 8,
    /// Object pool.
    Pool = 9,
}

/// Bit position of the class within a syscall number.
pub const CLASS_SHIFT: u32 = 24;

/// Mask of the function index within a syscall number.
pub const FUNCTION_MASK: u32 = (1 << CLASS_SHIFT) - 1;

/// Build a syscall number from a class and function index.
#[inline]
#[must_use]
pub const fn number(class: ObjectClass, function: u32) -> u32 {
    ((class as u32) << CLASS_SHIFT) | (function & FUNCTION_MASK)
}

/// Syscall numbers.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syscall {
    // === Any capability ===
    /// Describe a capability (type, size, rights, addresses).
    CapGetInfo = number(ObjectClass::Any, 0),
    /// Delete a capability.
    CapDelete = number(ObjectClass::Any, 1),
    /// Delete every capability derived from a capability.
    CapRevoke = number(ObjectClass::Any, 2),
    /// Remove rights from a capability.
    CapDrop = number(ObjectClass::Any, 3),

    // === Untyped ===
    /// Carve objects out of untyped memory.
    UtRetype = number(ObjectClass::Untyped, 1),

    // === Paging ===
    /// Change the attributes of a mapped page.
    PageRemap = number(ObjectClass::Page, 1),
    /// Map a page through a page table.
    PtMapPage = number(ObjectClass::PageTable, 0),
    /// Change the attributes of a mapped page table.
    PtRemap = number(ObjectClass::PageTable, 1),
    /// Map a page table into a page directory.
    PdMapPt = number(ObjectClass::PageDirectory, 0),

    // === Threads ===
    /// Bind a thread to its CSpace, VSpace and fault endpoint.
    TcbConfig = number(ObjectClass::Tcb, 0),
    /// Add a thread to the run queue.
    SchedPush = number(ObjectClass::Tcb, 1),
    /// Remove a thread from the run queue.
    SchedPull = number(ObjectClass::Tcb, 2),
    /// Give up the processor.
    SchedYield = number(ObjectClass::Tcb, 3),

    // === Pools ===
    /// Split a pool into objects of one type.
    PoolRetype = number(ObjectClass::Pool, 0),
    /// Allocate objects from a pool.
    PoolAlloc = number(ObjectClass::Pool, 1),
    /// Return an object to its pool.
    PoolFree = number(ObjectClass::Pool, 2),

    // === Debug (development only) ===
    /// Halt the machine.
    DebugHalt = 0xFFFF_FFFE,
    /// Debug print character.
    DebugPutChar = 0xFFFF_FFFF,
}

impl Syscall {
    /// Try to convert from a raw syscall number.
    pub fn from_number(num: u32) -> Option<Self> {
        const CAP_GET_INFO: u32 = Syscall::CapGetInfo as u32;
        const CAP_DELETE: u32 = Syscall::CapDelete as u32;
        const CAP_REVOKE: u32 = Syscall::CapRevoke as u32;
        const CAP_DROP: u32 = Syscall::CapDrop as u32;
        const UT_RETYPE: u32 = Syscall::UtRetype as u32;
        const PAGE_REMAP: u32 = Syscall::PageRemap as u32;
        const PT_MAP_PAGE: u32 = Syscall::PtMapPage as u32;
        const PT_REMAP: u32 = Syscall::PtRemap as u32;
        const PD_MAP_PT: u32 = Syscall::PdMapPt as u32;
        const TCB_CONFIG: u32 = Syscall::TcbConfig as u32;
        const SCHED_PUSH: u32 = Syscall::SchedPush as u32;
        const SCHED_PULL: u32 = Syscall::SchedPull as u32;
        const SCHED_YIELD: u32 = Syscall::SchedYield as u32;
        const POOL_RETYPE: u32 = Syscall::PoolRetype as u32;
        const POOL_ALLOC: u32 = Syscall::PoolAlloc as u32;
        const POOL_FREE: u32 = Syscall::PoolFree as u32;
        const DEBUG_HALT: u32 = Syscall::DebugHalt as u32;
        const DEBUG_PUT_CHAR: u32 = Syscall::DebugPutChar as u32;

        match num {
            CAP_GET_INFO => Some(Self::CapGetInfo),
            CAP_DELETE => Some(Self::CapDelete),
            CAP_REVOKE => Some(Self::CapRevoke),
            CAP_DROP => Some(Self::CapDrop),
            UT_RETYPE => Some(Self::UtRetype),
            PAGE_REMAP => Some(Self::PageRemap),
            PT_MAP_PAGE => Some(Self::PtMapPage),
            PT_REMAP => Some(Self::PtRemap),
            PD_MAP_PT => Some(Self::PdMapPt),
            TCB_CONFIG => Some(Self::TcbConfig),
            SCHED_PUSH => Some(Self::SchedPush),
            SCHED_PULL => Some(Self::SchedPull),
            SCHED_YIELD => Some(Self::SchedYield),
            POOL_RETYPE => Some(Self::PoolRetype),
            POOL_ALLOC => Some(Self::PoolAlloc),
            POOL_FREE => Some(Self::PoolFree),
            DEBUG_HALT => Some(Self::DebugHalt),
            DEBUG_PUT_CHAR => Some(Self::DebugPutChar),
            _ => None,
        }
    }

    /// Raw syscall number.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Object class the call operates on, `None` for debug calls.
    #[must_use]
    pub const fn class(self) -> Option<ObjectClass> {
        match self.as_u32() >> CLASS_SHIFT {
            0 => Some(ObjectClass::Any),
            1 => Some(ObjectClass::Untyped),
            3 => Some(ObjectClass::Page),
            4 => Some(ObjectClass::PageTable),
            5 => Some(ObjectClass::PageDirectory),
            8 => Some(ObjectClass::Tcb),
            9 => Some(ObjectClass::Pool),
            _ => None,
        }
    }

    /// Get the syscall name for logging.
    pub const fn name(self) -> &'static str {
        match self {
            Self::CapGetInfo => "cap_get_info",
            Self::CapDelete => "cap_delete",
            Self::CapRevoke => "cap_revoke",
            Self::CapDrop => "cap_drop",
            Self::UtRetype => "ut_retype",
            Self::PageRemap => "page_remap",
            Self::PtMapPage => "pt_map_page",
            Self::PtRemap => "pt_remap",
            Self::PdMapPt => "pd_map_pt",
            Self::TcbConfig => "tcb_config",
            Self::SchedPush => "sched_push",
            Self::SchedPull => "sched_pull",
            Self::SchedYield => "sched_yield",
            Self::PoolRetype => "pool_retype",
            Self::PoolAlloc => "pool_alloc",
            Self::PoolFree => "pool_free",
            Self::DebugHalt => "d_halt",
            Self::DebugPutChar => "d_putc",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_scheme() {
        assert_eq!(Syscall::CapGetInfo.as_u32(), 0);
        assert_eq!(Syscall::UtRetype.as_u32(), 0x0100_0001);
        assert_eq!(Syscall::PdMapPt.as_u32(), 0x0500_0000);
        assert_eq!(Syscall::SchedYield.as_u32(), 0x0800_0003);
        assert_eq!(Syscall::PoolFree.as_u32(), 0x0900_0002);
    }

    #[test]
    fn test_from_number() {
        assert_eq!(Syscall::from_number(0x0400_0001), Some(Syscall::PtRemap));
        assert_eq!(Syscall::from_number(0xFFFF_FFFF), Some(Syscall::DebugPutChar));
        assert_eq!(Syscall::from_number(0x0100_0000), None);
        assert_eq!(Syscall::from_number(0x0600_0000), None);
    }

    #[test]
    fn test_class() {
        assert_eq!(Syscall::PageRemap.class(), Some(ObjectClass::Page));
        assert_eq!(Syscall::CapDrop.class(), Some(ObjectClass::Any));
        assert_eq!(Syscall::DebugHalt.class(), None);
    }
}
