//! Kernel self-test
//!
//! [`run_tests`] exercises the capability core on the live kernel state:
//! untyped coverage and retype, guarded CSpace resolution, derivation
//! tree operations, address spaces and pools.
//!
//! Each suite borrows an unused root Untyped and revokes it when done,
//! so a passing run leaves the root CNode as it found it.

extern crate alloc;

use alloc::vec::Vec;

use atomik_cap::cnode::FULL_DEPTH;
use atomik_cap::cptr::{LookupFault, resolve};
use atomik_cap::objects::{pool, untyped};
use atomik_cap::{
    CSpaceStore, CapError, CapObject, CapResult, CapRights, CdtOps, ObjectType, SlotRef, ops, vspace,
};
use atomik_common::{PAGE_BITS, PAGE_SIZE, PhysAddr, PhysMemory, VirtAddr};
use atomik_paging::Mmu;

use crate::state::KernelState;
use crate::vspace::activate_current;

/// Region translated by the test page table.
const USER_TABLE: u64 = 0x0800_0000;

/// First test page.
const USER_TEXT: u64 = 0x0804_8000;

/// Pages mapped by the paging suites.
const USER_PAGES: usize = 8;

/// Objects allocated one by one from the test pool.
const POOL_ALLOCS: u32 = 3000;

struct Suite {
    name: &'static str,
    run: fn(&mut KernelState) -> CapResult<()>,
}

const SUITES: &[Suite] = &[
    Suite {
        name: "ut_coverage",
        run: ut_coverage,
    },
    Suite {
        name: "ut_retype",
        run: ut_retype,
    },
    Suite {
        name: "cspace_resolve",
        run: cspace_resolve,
    },
    Suite {
        name: "cdt_ops",
        run: cdt_ops,
    },
    Suite {
        name: "vspace",
        run: vspace_kernel,
    },
    Suite {
        name: "vspace_paging",
        run: vspace_paging,
    },
    Suite {
        name: "vspace_switch",
        run: vspace_switch,
    },
    Suite {
        name: "pool_ops",
        run: pool_ops,
    },
];

/// Run every suite and log the results.
///
/// # Errors
///
/// `TestFailed` if any suite failed.
pub fn run_tests(state: &mut KernelState) -> CapResult<()> {
    let mut failed = 0;

    for suite in SUITES {
        log::info!("selftest {}: starting", suite.name);
        match (suite.run)(state) {
            Ok(()) => log::info!("selftest {}: ok", suite.name),
            Err(err) => {
                log::error!("selftest {}: failed ({})", suite.name, err);
                failed += 1;
            }
        }
    }

    log::info!("selftest: {} suites run, {} failed", SUITES.len(), failed);
    if failed > 0 {
        return Err(CapError::TestFailed);
    }
    Ok(())
}

// -- Checks

fn check(cond: bool, what: &str) -> CapResult<()> {
    if cond {
        Ok(())
    } else {
        log::warn!("selftest: check failed: {}", what);
        Err(CapError::TestFailed)
    }
}

fn expect_err<T>(result: CapResult<T>, expected: CapError, what: &str) -> CapResult<()> {
    match result {
        Err(err) if err == expected => Ok(()),
        Err(err) => {
            log::warn!("selftest: {}: expected {}, got {}", what, expected, err);
            Err(CapError::TestFailed)
        }
        Ok(_) => {
            log::warn!("selftest: {}: expected {}, got success", what, expected);
            Err(CapError::TestFailed)
        }
    }
}

// -- Scratch objects

fn root_slot(state: &KernelState, index: u32) -> CapResult<SlotRef> {
    state.cspace.cnode_slot(state.root, index)
}

/// Smallest unused, remappable root Untyped of at least `2^bits` bytes.
fn find_untyped(state: &KernelState, bits: u32) -> CapResult<SlotRef> {
    let mut found: Option<(u32, SlotRef)> = None;

    for index in 0..state.untyped_count {
        let at = root_slot(state, index)?;
        let CapObject::Untyped(ut) = state.cspace.object(at)? else {
            continue;
        };
        if ut.size_bits < bits
            || ut.watermark != 0
            || !state.machine.arena.is_remappable(ut.base, ut.size())
        {
            continue;
        }
        if found.is_none_or(|(best, _)| ut.size_bits < best) {
            found = Some((ut.size_bits, at));
        }
    }

    found.map(|(_, at)| at).ok_or_else(|| {
        log::warn!("selftest: no free untyped of 2^{} bytes", bits);
        CapError::NotEnoughMemory
    })
}

/// `count` consecutive empty root slots past the boot Untyped.
fn free_slots(state: &KernelState, count: u32) -> CapResult<Vec<SlotRef>> {
    let entries = state.cspace.cnode_cap(state.root)?.num_slots() as u32;
    let mut run = 0;

    for index in state.untyped_count..entries {
        if !state.cspace.slot(root_slot(state, index)?)?.is_null() {
            run = 0;
            continue;
        }
        run += 1;
        if run == count {
            let first = index + 1 - count;
            return (first..=index).map(|i| root_slot(state, i)).collect();
        }
    }
    Err(CapError::Range)
}

fn retype_into(
    state: &mut KernelState,
    ut: SlotRef,
    ty: ObjectType,
    size_bits: u32,
    count: u32,
) -> CapResult<Vec<SlotRef>> {
    let dest = free_slots(state, count)?;
    untyped::retype(&mut state.cspace, &mut state.machine, ut, ty, size_bits, &dest)?;
    Ok(dest)
}

fn retype_one(state: &mut KernelState, ut: SlotRef, ty: ObjectType, size_bits: u32) -> CapResult<SlotRef> {
    let dest = free_slots(state, 1)?;
    untyped::retype(&mut state.cspace, &mut state.machine, ut, ty, size_bits, &dest)?;
    Ok(dest[0])
}

/// Run `f` on an unused Untyped of at least `2^bits` bytes and revoke
/// everything it derived afterwards.
fn with_untyped<F>(state: &mut KernelState, bits: u32, f: F) -> CapResult<()>
where
    F: FnOnce(&mut KernelState, SlotRef) -> CapResult<()>,
{
    let ut = find_untyped(state, bits)?;
    let result = f(state, ut);
    let cleanup = ops::revoke(&mut state.cspace, &mut state.machine, ut);
    result.and(cleanup)
}

fn watermark(state: &KernelState, at: SlotRef) -> CapResult<u64> {
    match state.cspace.object(at)? {
        CapObject::Untyped(ut) => Ok(ut.watermark),
        _ => Err(CapError::InvalidCapability),
    }
}

// -- Suites

/// Root Untyped capabilities tile free memory after the root CNode page.
fn ut_coverage(state: &mut KernelState) -> CapResult<()> {
    let boot = *state.machine.arena.boot();
    let mut next = boot.free_start.offset(PAGE_SIZE as u64);
    let mut total = 0;

    for index in 0..state.untyped_count {
        let CapObject::Untyped(ut) = state.cspace.object(root_slot(state, index)?)? else {
            return check(false, "boot slots hold Untyped capabilities");
        };
        check(ut.base == next, "untyped blocks are contiguous")?;
        check(ut.base.is_aligned_to(ut.size_bits), "untyped blocks are naturally aligned")?;
        total += ut.size();
        next = ut.base.offset(ut.size());
    }

    log::debug!("selftest: {} untyped, {:#x} of {:#x} bytes", state.untyped_count, total, boot.free_size);
    check(total == boot.free_size - PAGE_SIZE as u64, "untyped covers free memory")
}

fn ut_retype(state: &mut KernelState) -> CapResult<()> {
    with_untyped(state, 7, |state, ut| {
        let dest = retype_into(state, ut, ObjectType::Untyped, 5, 4)?;

        check(state.cspace.links(ut)?.child == dest[3], "newest child heads the list")?;
        for (i, &at) in dest.iter().enumerate() {
            let links = state.cspace.links(at)?;
            let prev = dest.get(i + 1).copied().unwrap_or(SlotRef::NULL);
            let next = if i == 0 { SlotRef::NULL } else { dest[i - 1] };
            check(state.cspace.slot(at)?.object_type() == ObjectType::Untyped, "children are Untyped")?;
            check(links.parent == ut, "children name their parent")?;
            check(links.prev == prev && links.next == next, "sibling links")?;
        }
        check(watermark(state, ut)? == 4 << 5, "watermark past the children")?;

        ops::revoke(&mut state.cspace, &mut state.machine, ut)?;
        check(watermark(state, ut)? == 0, "revoke rewinds the watermark")?;
        for &at in &dest {
            check(state.cspace.slot(at)?.is_null(), "revoke empties the children")?;
        }
        Ok(())
    })
}

fn cspace_resolve(state: &mut KernelState) -> CapResult<()> {
    let root = state.root;
    let cs = &state.cspace;

    check(resolve(cs, root, 0, 0) == Ok(root), "depth 0 names the root")?;
    check(resolve(cs, root, 0xA000_0000, 12) == Ok(root_slot(state, 0)?), "0xA0000000 is entry 0")?;
    check(resolve(cs, root, 0xA010_0000, 12) == Ok(root_slot(state, 1)?), "0xA0100000 is entry 1")?;
    check(
        matches!(
            resolve(cs, root, 0xB010_0000, 12),
            Err(LookupFault::GuardMismatch {
                guard: 0xA,
                guard_bits: 4,
                ..
            })
        ),
        "a wrong guard is rejected",
    )?;
    check(
        matches!(resolve(cs, root, 0xA010_0000, 8), Err(LookupFault::DepthMismatch { .. })),
        "a depth inside a level is rejected",
    )?;

    with_untyped(state, 8, |state, ut| {
        let cnode = retype_one(state, ut, ObjectType::CNode, 4)?;
        let leaf = state.cspace.cnode_slot(cnode, 3)?;
        untyped::retype(&mut state.cspace, &mut state.machine, ut, ObjectType::Endpoint, 0, &[leaf])?;

        let prefix = 0xA000_0000 | (cnode.index << 20);
        let cs = &state.cspace;
        check(resolve(cs, root, prefix, 12) == Ok(cnode), "the nested CNode itself")?;
        check(resolve(cs, root, prefix | 3 << 16, 16) == Ok(leaf), "two levels")?;
        check(resolve(cs, root, prefix | 3 << 16, FULL_DEPTH) == Ok(leaf), "full depth stops at the leaf")?;
        check(
            matches!(
                resolve(cs, root, prefix | 4 << 16, FULL_DEPTH),
                Err(LookupFault::MissingCapability { .. })
            ),
            "full depth through an empty slot",
        )
    })
}

fn cdt_ops(state: &mut KernelState) -> CapResult<()> {
    with_untyped(state, PAGE_BITS, |state, ut| {
        let parent = retype_one(state, ut, ObjectType::Untyped, 10)?;
        let eps = retype_into(state, parent, ObjectType::Endpoint, 0, 3)?;

        expect_err(
            ops::delete(&mut state.cspace, &mut state.machine, parent),
            CapError::RevokeFirst,
            "delete of a parent",
        )?;
        expect_err(
            ops::drop_rights(&mut state.cspace, &mut state.machine, parent, CapRights::WRITE),
            CapError::RevokeFirst,
            "drop on a parent",
        )?;

        ops::delete(&mut state.cspace, &mut state.machine, eps[1])?;
        check(state.cspace.child_count(parent)? == 2, "delete removes one child")?;
        check(state.cspace.children_consistent(parent)?, "delete relinks the siblings")?;

        ops::drop_rights(&mut state.cspace, &mut state.machine, eps[0], CapRights::WRITE | CapRights::GRANT)?;
        let rights = state.cspace.object(eps[0])?.rights();
        check(!rights.contains(CapRights::WRITE), "drop removes the named rights")?;
        check(rights.contains(CapRights::READ), "drop keeps the others")?;

        ops::revoke(&mut state.cspace, &mut state.machine, parent)?;
        check(state.cspace.count_descendants(parent)? == 0, "revoke deletes the subtree")?;
        check(watermark(state, parent)? == 0, "revoke rewinds the watermark")?;

        ops::delete(&mut state.cspace, &mut state.machine, parent)?;
        check(state.cspace.slot(parent)?.is_null(), "delete empties the slot")?;
        expect_err(
            ops::delete(&mut state.cspace, &mut state.machine, parent),
            CapError::IllegalOperation,
            "delete of an empty slot",
        )
    })
}

/// A new PageDirectory already translates the kernel half.
fn vspace_kernel(state: &mut KernelState) -> CapResult<()> {
    with_untyped(state, PAGE_BITS, |state, ut| {
        let pd = retype_one(state, ut, ObjectType::PageDirectory, 0)?;
        let kernel = state.machine.kernel;
        let boot = *state.machine.arena.boot();

        for offset in (0..kernel.size).step_by(PAGE_SIZE) {
            let phys = vspace::resolve(&state.cspace, &state.machine, pd, kernel.virt.offset(offset), CapRights::NONE)?;
            if phys != kernel.phys.offset(offset) {
                log::warn!("selftest: {} -> {}, expected {}", kernel.virt.offset(offset), phys, kernel.phys.offset(offset));
                return Err(CapError::TestFailed);
            }
        }

        for offset in [0, boot.remappable_size() - PAGE_SIZE as u64] {
            let phys = vspace::resolve(&state.cspace, &state.machine, pd, boot.remap_start.offset(offset), CapRights::NONE)?;
            check(phys == boot.free_start.offset(offset), "remap window translation")?;
        }

        expect_err(
            vspace::resolve(&state.cspace, &state.machine, pd, VirtAddr::new(USER_TEXT), CapRights::NONE),
            CapError::InvalidAddress,
            "the user half starts empty",
        )
    })
}

/// A PageDirectory with one table and [`USER_PAGES`] pages mapped from
/// [`USER_TEXT`].
struct UserSpace {
    pd: SlotRef,
    pages: Vec<SlotRef>,
}

fn map_user_space(state: &mut KernelState, ut: SlotRef) -> CapResult<UserSpace> {
    let pd = retype_one(state, ut, ObjectType::PageDirectory, 0)?;
    let pt = retype_one(state, ut, ObjectType::PageTable, 0)?;
    let pages = retype_into(state, ut, ObjectType::Page, 0, USER_PAGES as u32)?;

    vspace::map_pagetable(&mut state.cspace, &mut state.machine, pd, pt, VirtAddr::new(USER_TABLE))?;
    for (i, &page) in pages.iter().enumerate() {
        let vaddr = user_page(i);
        vspace::map_page(&mut state.cspace, &mut state.machine, pt, page, vaddr)?;
        check(
            matches!(state.cspace.object(page)?, CapObject::Page(p) if p.vaddr == vaddr),
            "page records its address",
        )?;
    }
    Ok(UserSpace { pd, pages })
}

fn user_page(index: usize) -> VirtAddr {
    VirtAddr::new(USER_TEXT + (index * PAGE_SIZE) as u64)
}

/// Page `i` keeps the access rights whose bits spell `i`.
fn vspace_paging(state: &mut KernelState) -> CapResult<()> {
    with_untyped(state, PAGE_BITS + 4, |state, ut| {
        let space = map_user_space(state, ut)?;

        for (i, &page) in space.pages.iter().enumerate() {
            let keep = CapRights::from_bits(i as u8);
            ops::drop_rights(&mut state.cspace, &mut state.machine, page, CapRights::ALL.remove(keep))?;
        }

        for (i, &page) in space.pages.iter().enumerate() {
            let vaddr = user_page(i);
            let base = state.cspace.object(page)?.base();
            let phys = vspace::resolve(&state.cspace, &state.machine, space.pd, vaddr, CapRights::NONE)?;
            check(phys == base, "pages translate to their frames")?;

            let keep = CapRights::from_bits(i as u8);
            for access in [CapRights::READ, CapRights::WRITE, CapRights::EXEC] {
                match vspace::resolve(&state.cspace, &state.machine, space.pd, vaddr, access) {
                    Ok(_) => check(keep.contains(access), "access needs the right")?,
                    Err(CapError::AccessDenied) => check(!keep.contains(access), "the right grants access")?,
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    })
}

fn signature(index: usize, base: PhysAddr) -> [u8; 16] {
    let mut sig = [0u8; 16];
    sig[..6].copy_from_slice(b"page #");
    sig[6] = b'0' + index as u8;
    sig[8..].copy_from_slice(&base.as_u64().to_le_bytes());
    sig
}

/// Page contents written physically show up through the new directory.
fn vspace_switch(state: &mut KernelState) -> CapResult<()> {
    with_untyped(state, PAGE_BITS + 4, |state, ut| {
        let space = map_user_space(state, ut)?;
        let mut bases = Vec::with_capacity(space.pages.len());
        for (i, &page) in space.pages.iter().enumerate() {
            let base = state.cspace.object(page)?.base();
            state.machine.arena.write_bytes(base, &signature(i, base));
            bases.push(base);
        }

        let pd_base = state.cspace.object(space.pd)?.base();
        state.machine.mmu.switch_address_space(Some(pd_base));
        let result = bases.iter().enumerate().try_for_each(|(i, &base)| {
            let mut buf = [0u8; 16];
            state
                .machine
                .mmu
                .read_virt(&state.machine.arena, user_page(i), &mut buf)
                .map_err(CapError::from)?;
            let mut remapped = [0u8; 16];
            state
                .machine
                .arena
                .phys_to_remap(base)
                .and_then(|va| state.machine.arena.read_remap(va, &mut remapped))
                .ok_or(CapError::InvalidAddress)?;
            check(buf == remapped, "user and kernel views agree")?;
            check(buf == signature(i, base), "page contents through the new directory")
        });
        activate_current(state);
        result?;

        check(state.machine.mmu.current_root() != pd_base, "switched back")
    })
}

fn pool_ops(state: &mut KernelState) -> CapResult<()> {
    // The slot CNode outlives the pool objects it holds.
    with_untyped(state, 16, |state, cnode_ut| {
        let cnode = retype_one(state, cnode_ut, ObjectType::CNode, 12)?;
        with_untyped(state, 17, |state, pool_ut| pool_checks(state, pool_ut, cnode))
    })
}

fn pool_checks(state: &mut KernelState, ut: SlotRef, cnode: SlotRef) -> CapResult<()> {
    let pool_at = retype_one(state, ut, ObjectType::Pool, 16)?;
    let first = state.cspace.cnode_slot(cnode, 0)?;

    expect_err(
        pool::pool_alloc(&mut state.cspace, &mut state.machine, pool_at, &[first]),
        CapError::InitFirst,
        "alloc before retype",
    )?;
    pool::pool_retype(&mut state.cspace, &mut state.machine, pool_at, ObjectType::Endpoint, 0)?;
    expect_err(
        pool::pool_retype(&mut state.cspace, &mut state.machine, pool_at, ObjectType::Endpoint, 0),
        CapError::DeleteFirst,
        "second retype",
    )?;

    for i in 0..POOL_ALLOCS {
        let at = state.cspace.cnode_slot(cnode, i)?;
        pool::pool_alloc(&mut state.cspace, &mut state.machine, pool_at, &[at])?;
    }
    check(state.cspace.child_count(pool_at)? == POOL_ALLOCS as usize, "every allocation is a child")?;

    let victim = state.cspace.cnode_slot(cnode, POOL_ALLOCS / 2)?;
    let base = state.cspace.object(victim)?.base();
    ops::delete(&mut state.cspace, &mut state.machine, victim)?;
    pool::pool_alloc(&mut state.cspace, &mut state.machine, pool_at, &[victim])?;
    check(state.cspace.object(victim)?.base() == base, "a freed object is reused")?;

    let small = retype_one(state, ut, ObjectType::Pool, PAGE_BITS)?;
    expect_err(
        pool::pool_retype(&mut state.cspace, &mut state.machine, small, ObjectType::Page, 0),
        CapError::NotEnoughMemory,
        "metadata leaves no object",
    )?;

    ops::revoke(&mut state.cspace, &mut state.machine, pool_at)?;
    check(state.cspace.child_count(pool_at)? == 0, "revoke frees every object")?;
    check(
        matches!(state.cspace.object(pool_at)?, CapObject::Pool(p) if !p.is_typed()),
        "revoke resets the pool",
    )?;
    for i in 0..POOL_ALLOCS {
        check(state.cspace.slot(state.cspace.cnode_slot(cnode, i)?)?.is_null(), "revoke empties the slots")?;
    }
    Ok(())
}
