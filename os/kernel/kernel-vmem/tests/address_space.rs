use std::cell::UnsafeCell;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use kernel_vmem::info::{KERNBASE, PAGE_SIZE, USER_BASE, USER_STACK_BASE};
use kernel_vmem::{
    AddressSpace, AddressSpaceError, FrameAlloc, PageDirectory, PageEntryBits, PageTable,
    PdEntry, PdIndex, PhysMapper, PtEntry, PtIndex,
};

/// A 4 KiB-aligned raw frame; the "physical RAM" backing store in tests.
#[repr(align(4096))]
struct Aligned4K([u8; 4096]);

/// Simulated physical memory: physical address `n * 4096` is frame `n`.
struct TestPhys {
    frames: Vec<UnsafeCell<Aligned4K>>,
}

impl TestPhys {
    /// Frames start out filled with `junk` so tests can tell zeroed frames apart.
    fn with_frames(n: usize, junk: u8) -> Self {
        Self {
            frames: (0..n).map(|_| UnsafeCell::new(Aligned4K([junk; 4096]))).collect(),
        }
    }

    fn byte(&self, pa: PhysicalAddress) -> u8 {
        let (page, off) = pa.split::<Size4K>();
        unsafe { (*self.frames[page.frame_number() as usize].get()).0[off.as_u32() as usize] }
    }

    fn set_byte(&self, pa: PhysicalAddress, v: u8) {
        let (page, off) = pa.split::<Size4K>();
        unsafe { (*self.frames[page.frame_number() as usize].get()).0[off.as_u32() as usize] = v }
    }
}

impl PhysMapper for TestPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let (page, off) = pa.split::<Size4K>();
        debug_assert_eq!(off.as_u32(), 0);
        let frame = self.frames[page.frame_number() as usize].get();
        unsafe { &mut *frame.cast::<T>() }
    }
}

/// Bump allocator that never reuses frames and records what was freed.
struct BumpAlloc {
    next: u32,
    end: u32,
    freed: Vec<PhysicalPage<Size4K>>,
}

impl BumpAlloc {
    /// Hands out frames `1..end`; frame 0 stays unused.
    fn new(end: u32) -> Self {
        Self {
            next: 1,
            end,
            freed: Vec::new(),
        }
    }

    fn allocated(&self) -> usize {
        (self.next - 1) as usize
    }
}

impl FrameAlloc for BumpAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.next >= self.end {
            return None;
        }
        let f = PhysicalPage::from_frame_number(self.next);
        self.next += 1;
        Some(f)
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        self.freed.push(frame);
    }
}

const KERNEL_PDX: u16 = (KERNBASE >> 22) as u16;

/// A kernel directory with a supervisor-only 4 MiB leaf at `KERNBASE`.
fn kernel_root(phys: &TestPhys, alloc: &mut BumpAlloc) -> PhysicalPage<Size4K> {
    let root = alloc.alloc_4k().expect("kernel root");
    let pd = unsafe { phys.phys_to_mut::<PageDirectory>(root.base()) };
    *pd = PageDirectory::zeroed();
    let big = PhysicalAddress::new(0).page::<Size4M>();
    pd.set(
        PdIndex::new(KERNEL_PDX),
        PdEntry::make_4m(big, PageEntryBits::new().with_writable(true)),
    );
    root
}

fn setup(frames: u32) -> (TestPhys, BumpAlloc, PhysicalPage<Size4K>) {
    let phys = TestPhys::with_frames(frames as usize, 0xAA);
    let mut alloc = BumpAlloc::new(frames);
    let kroot = kernel_root(&phys, &mut alloc);
    (phys, alloc, kroot)
}

fn va(v: u32) -> VirtualAddress {
    VirtualAddress::new(v)
}

#[test]
fn new_user_shares_the_kernel_half_only() {
    let (phys, mut alloc, kroot) = setup(16);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");

    let pd = unsafe { phys.phys_to_mut::<PageDirectory>(space.root_page().base()) };
    let kpd = unsafe { phys.phys_to_mut::<PageDirectory>(kroot.base()) };
    for i in 0..KERNEL_PDX {
        assert!(!pd.get(PdIndex::new(i)).is_present(), "user slot {i} not empty");
    }
    for i in KERNEL_PDX..1024 {
        assert_eq!(pd.get(PdIndex::new(i)).raw(), kpd.get(PdIndex::new(i)).raw());
    }
}

#[test]
fn mapped_pages_are_zeroed_user_writable() {
    let (phys, mut alloc, kroot) = setup(16);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");

    let n = space
        .map_user_region(&phys, &mut alloc, va(USER_BASE), va(USER_BASE + PAGE_SIZE + 1))
        .expect("map");
    assert_eq!(n, 2);

    for off in [0, PAGE_SIZE - 1, PAGE_SIZE, 2 * PAGE_SIZE - 1] {
        let pa = space.query(&phys, va(USER_BASE + off)).expect("mapped");
        assert_eq!(phys.byte(pa), 0);
    }
    assert!(space.query(&phys, va(USER_BASE + 2 * PAGE_SIZE)).is_none());
    assert!(space.query(&phys, va(USER_BASE - 1)).is_none());

    let pd = unsafe { phys.phys_to_mut::<PageDirectory>(space.root_page().base()) };
    let pt_page = pd.get(PdIndex::from(va(USER_BASE))).next_table().expect("pt");
    let pt = unsafe { phys.phys_to_mut::<PageTable>(pt_page.base()) };
    let (_, flags) = pt.get(PtIndex::from(va(USER_BASE))).page_4k().expect("pte");
    assert!(flags.user_access() && flags.writable());
}

#[test]
fn remapping_keeps_existing_contents() {
    let (phys, mut alloc, kroot) = setup(16);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    space
        .map_user_region(&phys, &mut alloc, va(USER_BASE), va(USER_BASE + PAGE_SIZE))
        .expect("map");
    let pa = space.query(&phys, va(USER_BASE + 7)).expect("mapped");
    phys.set_byte(pa, 0x42);

    let n = space
        .map_user_region(&phys, &mut alloc, va(USER_BASE + 7), va(USER_BASE + 3 * PAGE_SIZE))
        .expect("extend");
    assert_eq!(n, 2);
    assert_eq!(space.query(&phys, va(USER_BASE + 7)), Some(pa));
    assert_eq!(phys.byte(pa), 0x42);
}

#[test]
fn empty_range_maps_nothing() {
    let (phys, mut alloc, kroot) = setup(8);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    let before = alloc.allocated();
    assert_eq!(space.map_user_region(&phys, &mut alloc, va(USER_BASE), va(USER_BASE)), Ok(0));
    assert_eq!(alloc.allocated(), before);
}

#[test]
fn kernel_range_is_rejected() {
    let (phys, mut alloc, kroot) = setup(8);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");

    let err = space
        .map_user_region(&phys, &mut alloc, va(KERNBASE - PAGE_SIZE), va(KERNBASE + 1))
        .unwrap_err();
    assert_eq!(
        err,
        AddressSpaceError::KernelRange {
            start: va(KERNBASE - PAGE_SIZE),
            end: va(KERNBASE + 1),
        }
    );
    assert_eq!(
        space.map_user_region(&phys, &mut alloc, va(0xFFFF_F001), va(0xFFFF_FFFF)),
        Err(AddressSpaceError::Overflow)
    );
}

#[test]
fn running_out_of_frames_reports_oom() {
    // kernel root + user root + one page table + one page, then nothing.
    let (phys, mut alloc, kroot) = setup(5);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    assert_eq!(
        space.map_user_region(&phys, &mut alloc, va(USER_BASE), va(USER_BASE + 2 * PAGE_SIZE)),
        Err(AddressSpaceError::OutOfMemory)
    );
    assert!(space.query(&phys, va(USER_BASE)).is_some());
}

#[test]
fn readable_after_counts_to_the_end_of_the_mapped_run() {
    let (phys, mut alloc, kroot) = setup(16);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    let stack_bottom = USER_STACK_BASE - 2 * PAGE_SIZE;
    space
        .map_user_region(&phys, &mut alloc, va(stack_bottom), va(USER_STACK_BASE))
        .expect("stack");

    assert_eq!(space.user_readable_after(&phys, va(USER_STACK_BASE - 1)), 1);
    assert_eq!(space.user_readable_after(&phys, va(stack_bottom)), 2 * PAGE_SIZE);
    assert_eq!(space.user_readable_after(&phys, va(stack_bottom + PAGE_SIZE)), PAGE_SIZE);
    assert_eq!(space.user_readable_after(&phys, va(stack_bottom + 0x10)), 2 * PAGE_SIZE - 0x10);
    assert_eq!(space.user_readable_after(&phys, va(USER_STACK_BASE)), 0);
    assert_eq!(space.user_readable_after(&phys, va(stack_bottom - 1)), 0);
}

#[test]
fn readable_after_is_zero_in_kernel_space() {
    let (phys, mut alloc, kroot) = setup(8);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    for a in [KERNBASE, KERNBASE + 1, 0xFFFF_FFFF] {
        assert_eq!(space.user_readable_after(&phys, va(a)), 0);
    }
}

#[test]
fn supervisor_page_stops_the_walk() {
    let (phys, mut alloc, kroot) = setup(16);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    space
        .map_user_region(&phys, &mut alloc, va(USER_BASE), va(USER_BASE + 3 * PAGE_SIZE))
        .expect("map");

    let pd = unsafe { phys.phys_to_mut::<PageDirectory>(space.root_page().base()) };
    let pt_page = pd.get(PdIndex::from(va(USER_BASE))).next_table().expect("pt");
    let pt = unsafe { phys.phys_to_mut::<PageTable>(pt_page.base()) };
    let i = PtIndex::from(va(USER_BASE + PAGE_SIZE));
    let (frame, flags) = pt.get(i).page_4k().expect("pte");
    pt.set(i, PtEntry::make_4k(frame, flags.with_user_access(false)));

    assert_eq!(space.user_readable_after(&phys, va(USER_BASE + 4)), PAGE_SIZE - 4);
    assert_eq!(space.user_readable_after(&phys, va(USER_BASE + PAGE_SIZE)), 0);
    assert_eq!(space.user_readable_after(&phys, va(USER_BASE + 2 * PAGE_SIZE)), PAGE_SIZE);
}

#[test]
fn large_user_leaf_is_walked_but_capped_at_kernbase() {
    let (phys, mut alloc, kroot) = setup(8);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    let pd = unsafe { phys.phys_to_mut::<PageDirectory>(space.root_page().base()) };
    let big = PhysicalAddress::new(0x0080_0000).page::<Size4M>();
    pd.set(
        PdIndex::new(KERNEL_PDX - 1),
        PdEntry::make_4m(big, PageEntryBits::new_user_rw()),
    );
    // A user-accessible leaf in the kernel half must still not count.
    pd.set(
        PdIndex::new(KERNEL_PDX),
        PdEntry::make_4m(big, PageEntryBits::new_user_rw()),
    );

    let start = KERNBASE - 0x40_0000 + 5;
    assert_eq!(space.user_readable_after(&phys, va(start)), 0x40_0000 - 5);
    assert_eq!(
        space.query(&phys, va(start)),
        Some(PhysicalAddress::new(0x0080_0005))
    );
}

#[test]
fn destroy_releases_every_user_frame_and_the_root() {
    let (phys, mut alloc, kroot) = setup(32);
    let space = AddressSpace::new_user(&phys, &mut alloc, kroot).expect("space");
    let root = space.root_page();
    space
        .map_user_region(&phys, &mut alloc, va(USER_BASE), va(USER_BASE + 3 * PAGE_SIZE))
        .expect("image");
    space
        .map_user_region(&phys, &mut alloc, va(USER_STACK_BASE - 2 * PAGE_SIZE), va(USER_STACK_BASE))
        .expect("stack");

    // Everything except the kernel root belongs to the space.
    let owned = alloc.allocated() - 1;
    let freed = space.destroy(&phys, &mut alloc);
    assert_eq!(freed, owned);
    assert_eq!(alloc.freed.len(), owned);
    assert!(alloc.freed.contains(&root));
    assert!(!alloc.freed.contains(&kroot));

    let kpd = unsafe { phys.phys_to_mut::<PageDirectory>(kroot.base()) };
    assert!(kpd.get(PdIndex::new(KERNEL_PDX)).is_present());
}
