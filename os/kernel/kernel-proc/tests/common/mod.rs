//! Shared doubles: simulated physical memory, a bump frame allocator, a
//! recording CPU and an in-memory file system.

#![allow(dead_code)]

use std::cell::{RefCell, UnsafeCell};
use std::ptr::NonNull;
use std::rc::Rc;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use kernel_proc::tss::TaskState;
use kernel_proc::{
    ContextPtr, Cpu, ExecutionContext, FileStat, FileSystem, FsError, LoadError, PagedMemory, Process,
};
use kernel_vmem::address_space::RootPage;
use kernel_vmem::info::{KERNBASE, PAGE_SIZE};
use kernel_vmem::{AddressSpace, FrameAlloc, PageDirectory, PageEntryBits, PdEntry, PdIndex, PhysMapper};

pub const TRAMPOLINE: u32 = 0xC010_0040;

/// What the kernel's registers held when it entered the task.
pub const KERNEL_REGS: ExecutionContext = ExecutionContext {
    edi: 0x1111_1111,
    esi: 0x2222_2222,
    ebx: 0x3333_3333,
    ebp: 0x8001_FF00,
    eip: 0x8010_2A3C,
};

#[repr(align(4096))]
struct Aligned4K([u8; 4096]);

/// Simulated physical memory: physical address `n * 4096` is frame `n`.
pub struct TestPhys {
    frames: Vec<UnsafeCell<Aligned4K>>,
}

impl TestPhys {
    /// Leaked so that the memory manager and the CPU double can share it.
    pub fn leak(n: usize) -> &'static Self {
        Box::leak(Box::new(Self {
            frames: (0..n).map(|_| UnsafeCell::new(Aligned4K([0xAA; 4096]))).collect(),
        }))
    }

    fn ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!((pa.as_u32() as usize) < self.frames.len() * 4096, "{pa} outside test RAM");
        self.frames
            .as_ptr()
            .cast::<u8>()
            .cast_mut()
            .wrapping_add(pa.as_u32() as usize)
    }

    pub fn byte(&self, pa: PhysicalAddress) -> u8 {
        unsafe { *self.ptr(pa) }
    }
}

impl PhysMapper for TestPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.ptr(pa).cast::<T>() }
    }
}

/// Bump allocator that never reuses frames and records what was freed, both
/// in `freed` and in the log it shares with the CPU double.
pub struct BumpAlloc {
    next: u32,
    end: u32,
    pub freed: Vec<PhysicalPage<Size4K>>,
    log: Log,
}

impl BumpAlloc {
    pub fn allocated(&self) -> usize {
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
        self.log.borrow_mut().push(Event::Free(frame));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LoadTaskState { esp0: u32, ss0: u16 },
    LoadPageDirectory(RootPage),
    EnableInterrupts,
    DisableInterrupts,
    Enter(ExecutionContext),
    Resume,
    /// Recorded by the allocator; left out of [`TestCpu::events`].
    Free(PhysicalPage<Size4K>),
}

type Log = Rc<RefCell<Vec<Event>>>;

/// Carried by the unwind out of [`Cpu::resume`].
#[derive(Debug, PartialEq, Eq)]
pub struct Resumed(pub ExecutionContext);

/// Records privileged operations. `suspend_and_save` runs the hook set by
/// [`on_enter`] as the task's trap path, then returns as if the task had
/// already been killed; `resume` unwinds with [`Resumed`].
pub struct TestCpu {
    phys: &'static TestPhys,
    pub active: RootPage,
    log: Log,
    kernel: NonNull<ExecutionContext>,
    trap: Option<Box<dyn FnOnce()>>,
}

impl TestCpu {
    /// CPU events in order, without the allocator's frees.
    pub fn events(&self) -> Vec<Event> {
        self.timeline()
            .into_iter()
            .filter(|e| !matches!(e, Event::Free(_)))
            .collect()
    }

    pub fn events_since(&self, n: usize) -> Vec<Event> {
        self.events().split_off(n)
    }

    /// CPU events and frees, interleaved as they happened.
    pub fn timeline(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    fn record(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }
}

/// Run `trap` from inside the next enter, in place of the user program.
pub fn on_enter(cpu: &mut TestCpu, trap: impl FnOnce() + 'static) {
    cpu.trap = Some(Box::new(trap));
}

impl Cpu for TestCpu {
    fn load_page_directory(&mut self, root: RootPage) {
        self.active = root;
        self.record(Event::LoadPageDirectory(root));
    }

    fn load_task_state(&mut self, tss: &mut TaskState) {
        self.record(Event::LoadTaskState {
            esp0: tss.esp0,
            ss0: tss.ss0,
        });
    }

    fn enable_interrupts(&mut self) {
        self.record(Event::EnableInterrupts);
    }

    fn disable_interrupts(&mut self) {
        self.record(Event::DisableInterrupts);
    }

    fn entry_trampoline(&self) -> u32 {
        TRAMPOLINE
    }

    unsafe fn user_memory<'a>(&mut self, start: VirtualAddress, len: u32) -> &'a mut [u8] {
        if len == 0 {
            return &mut [];
        }
        let space = AddressSpace::from_root(self.active);
        let base = space.query(self.phys, start).expect("window start mapped");
        let mut off = 0;
        while off < len {
            let va = VirtualAddress::new(start.as_u32() + off);
            let pa = space.query(self.phys, va).expect("window mapped");
            assert_eq!(pa.as_u32(), base.as_u32() + off, "window not physically contiguous");
            off += PAGE_SIZE - va.as_u32() % PAGE_SIZE;
        }
        unsafe { std::slice::from_raw_parts_mut(self.phys.ptr(base), len as usize) }
    }

    unsafe fn suspend_and_save(this: *mut Self, save: *mut Option<ContextPtr>, to: ContextPtr) {
        let trap = unsafe {
            let cpu = &mut *this;
            cpu.record(Event::Enter(*to.as_ptr()));
            cpu.kernel.write(KERNEL_REGS);
            *save = Some(ContextPtr::new(cpu.kernel));
            cpu.trap.take()
        };
        if let Some(trap) = trap {
            trap();
        }
    }

    unsafe fn resume(this: *mut Self, to: ContextPtr) -> ! {
        unsafe { (*this).record(Event::Resume) };
        let ctx = unsafe { *to.as_ptr() };
        std::panic::panic_any(Resumed(ctx))
    }
}

/// In-memory files. A file's `stat` size may claim more than its contents
/// to simulate a short read.
#[derive(Default)]
pub struct MemFs {
    files: Vec<(String, Vec<u8>, u32)>,
    pub fail_reads: bool,
}

impl MemFs {
    pub fn with(mut self, name: &str, data: Vec<u8>) -> Self {
        let size = data.len() as u32;
        self.files.push((name.to_owned(), data, size));
        self
    }

    pub fn with_size(mut self, name: &str, data: Vec<u8>, size: u32) -> Self {
        self.files.push((name.to_owned(), data, size));
        self
    }
}

impl FileSystem for MemFs {
    fn stat(&mut self, name: &str) -> Option<FileStat> {
        self.files
            .iter()
            .position(|(n, _, _)| n == name)
            .map(|i| FileStat {
                size: self.files[i].2,
                inode: i as u32,
            })
    }

    fn read_file(&mut self, stat: &FileStat, dest: &mut [u8]) -> Result<usize, FsError> {
        if self.fail_reads {
            return Err(FsError::Io);
        }
        let data = &self.files[stat.inode as usize].1;
        let n = data.len().min(dest.len());
        dest[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

/// An i386 executable of exactly `len` bytes with one `PT_LOAD` header per
/// `(vaddr, memsz)`. The last byte of the file is `0x5A`.
pub fn elf_image(entry: u32, segs: &[(u32, u32)], len: usize) -> Vec<u8> {
    const EHDR: usize = 52;
    const PHDR: usize = 32;
    assert!(len >= EHDR + segs.len() * PHDR);
    let mut b = vec![0u8; len];
    b[0..4].copy_from_slice(b"\x7FELF");
    b[4] = 1; // ELFCLASS32
    b[5] = 1; // little endian
    b[6] = 1;
    b[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    b[18..20].copy_from_slice(&3u16.to_le_bytes()); // EM_386
    b[20..24].copy_from_slice(&1u32.to_le_bytes());
    b[24..28].copy_from_slice(&entry.to_le_bytes());
    b[28..32].copy_from_slice(&(EHDR as u32).to_le_bytes());
    b[40..42].copy_from_slice(&(EHDR as u16).to_le_bytes());
    b[42..44].copy_from_slice(&(PHDR as u16).to_le_bytes());
    b[44..46].copy_from_slice(&(segs.len() as u16).to_le_bytes());
    for (i, &(vaddr, memsz)) in segs.iter().enumerate() {
        let p = EHDR + i * PHDR;
        b[p..p + 4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        b[p + 8..p + 12].copy_from_slice(&vaddr.to_le_bytes());
        b[p + 16..p + 20].copy_from_slice(&memsz.min(len as u32).to_le_bytes());
        b[p + 20..p + 24].copy_from_slice(&memsz.to_le_bytes());
        b[p + 24..p + 28].copy_from_slice(&0b111u32.to_le_bytes());
    }
    b[len - 1] = 0x5A;
    b
}

/// The `initcode` image: one page on disk, two pages in memory.
pub const INITCODE_ENTRY: u32 = 0x0040_0074;

pub fn initcode() -> Vec<u8> {
    elf_image(INITCODE_ENTRY, &[(kernel_vmem::info::USER_BASE, 8192)], 4096)
}

pub type TestProcess = Process<PagedMemory<&'static TestPhys, BumpAlloc>, TestCpu>;

pub struct Rig {
    pub phys: &'static TestPhys,
    pub kernel_root: RootPage,
    pub process: TestProcess,
}

/// A process slot over `frames` frames of RAM. Frame 0 is never handed out;
/// frame 1 is the kernel directory with a supervisor 4 MiB leaf at `KERNBASE`.
pub fn rig(frames: u32) -> Rig {
    let phys = TestPhys::leak(frames as usize);
    let log = Log::default();
    let mut alloc = BumpAlloc {
        next: 1,
        end: frames,
        freed: Vec::new(),
        log: Rc::clone(&log),
    };
    let kernel_root = alloc.alloc_4k().expect("kernel root");
    let pd = unsafe { phys.phys_to_mut::<PageDirectory>(kernel_root.base()) };
    *pd = PageDirectory::zeroed();
    pd.set(
        PdIndex::new((KERNBASE >> 22) as u16),
        PdEntry::make_4m(
            PhysicalAddress::new(0).page::<Size4M>(),
            PageEntryBits::new().with_writable(true),
        ),
    );

    let cpu = TestCpu {
        phys,
        active: kernel_root,
        log,
        kernel: NonNull::from(Box::leak(Box::new(ExecutionContext::zeroed()))),
        trap: None,
    };
    let memory = PagedMemory::new(phys, alloc, kernel_root);
    Rig {
        phys,
        kernel_root,
        process: Process::new(memory, cpu),
    }
}

/// Physical address behind `va` in the slot's current address space.
pub fn translate(rig: &Rig, va: u32) -> Option<PhysicalAddress> {
    let space = rig.process.task()?.space.as_ref()?;
    space.query(rig.phys, VirtualAddress::new(va))
}

/// `run_elf` on a slot the test owns outright.
pub fn run(
    process: &mut TestProcess,
    name: &str,
    fs: &mut MemFs,
    console: &mut String,
) -> Result<(), LoadError> {
    unsafe { TestProcess::run_elf(process, name, fs, console) }
}

/// Run `kill`, which must come back out through [`Cpu::resume`].
pub fn kill(process: *mut TestProcess) -> ExecutionContext {
    let result: std::thread::Result<()> = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        TestProcess::kill(process)
    }));
    let payload = result.expect_err("kill returned");
    payload.downcast::<Resumed>().map(|r| r.0).unwrap_or_else(|p| {
        panic!(
            "kill panicked instead of resuming: {:?}",
            p.downcast_ref::<String>()
        )
    })
}
