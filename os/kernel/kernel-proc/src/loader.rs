//! # `run_elf`
//!
//! ```text
//!  USER_STACK_BASE ┌──────────────┐ ← initial user esp
//!                  │ stack, 2 pp  │
//!   USER_STACK_BOTTOM ───────────── ← program must end at or below
//!                  │              │
//!         prog_top │ bss ...      │ mapped from the program headers
//!         file_top │ file bytes   │ copied verbatim
//!        USER_BASE └──────────────┘ ← ELF header lives here
//! ```
//!
//! The file is copied flat to `USER_BASE`; its program headers only decide
//! how far past the file the mapping has to reach.

use crate::context::ContextPtr;
use crate::cpu::Cpu;
use crate::elf::elf32_view;
use crate::error::LoadError;
use crate::fs::{FileStat, FileSystem};
use crate::memory::MemoryManager;
use crate::process::Process;
use crate::selectors::KERNEL_DATA;
use crate::task::Task;
use core::fmt;
use core::ptr::NonNull;
use kernel_info::memory::{MAX_IMAGE_SIZE, USER_BASE, USER_STACK_BASE, USER_STACK_BOTTOM};
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::AddressSpace;
use log::{debug, info, warn};

impl<M: MemoryManager, C: Cpu> Process<M, C> {
    /// Load `name` and run it as the one user program. Returns once the
    /// program has terminated through [`kill`](Self::kill).
    ///
    /// This is [`load`](Self::load) followed by [`enter`](Self::enter). `fs`
    /// and `console` are dropped before the program is entered; a kernel
    /// whose trap path reaches the same file system calls the two halves
    /// itself.
    ///
    /// # Errors
    /// See [`LoadError`]. Nothing is entered on error.
    ///
    /// # Safety
    /// As for [`enter`](Self::enter).
    pub unsafe fn run_elf<F, W>(
        this: *mut Self,
        name: &str,
        fs: F,
        console: W,
    ) -> Result<(), LoadError>
    where
        F: FileSystem,
        W: fmt::Write,
    {
        let to = {
            let (mut fs, mut console) = (fs, console);
            unsafe { (*this).load(name, &mut fs, &mut console) }?
        };
        info!("entering {name}");
        unsafe { Self::enter(this, to) };
        info!("{name} terminated");
        Ok(())
    }

    /// Build `name`'s address space, copy the image and prepare the first
    /// switch into it. The returned context is for [`enter`](Self::enter).
    ///
    /// Failures are written to `console` as `"<name>: <reason>"` and
    /// returned; the kernel can try another name.
    ///
    /// # Errors
    /// See [`LoadError`].
    pub fn load<F, W>(
        &mut self,
        name: &str,
        fs: &mut F,
        console: &mut W,
    ) -> Result<ContextPtr, LoadError>
    where
        F: FileSystem + ?Sized,
        W: fmt::Write + ?Sized,
    {
        self.prepare(name, fs).inspect_err(|e| {
            warn!("run_elf({name}): {e}");
            // The console is best effort.
            let _ = writeln!(console, "{name}: {e}");
        })
    }

    fn prepare<F>(&mut self, name: &str, fs: &mut F) -> Result<ContextPtr, LoadError>
    where
        F: FileSystem + ?Sized,
    {
        let stat = fs.stat(name).ok_or(LoadError::NotFound)?;
        let file_top = USER_BASE
            .checked_add(stat.size)
            .filter(|&top| top <= USER_STACK_BOTTOM)
            .ok_or(LoadError::TooLarge)?;

        let mut task_ptr = self.ensure_task()?;
        let task = unsafe { task_ptr.as_mut() };

        if let Some(stale) = task.space.take() {
            warn!("reclaiming address space {} from a previous load", stale.root_page());
            self.cpu.load_page_directory(self.memory.kernel_root());
            self.memory.destroy_address_space(stale);
        }

        // Held by the task from here on, so an error below leaves it for the
        // next load to reclaim.
        let space = task.space.insert(self.memory.new_address_space()?);
        self.memory
            .map_region(space, VirtualAddress::new(USER_BASE), VirtualAddress::new(file_top))?;
        self.memory.map_region(
            space,
            VirtualAddress::new(USER_STACK_BOTTOM),
            VirtualAddress::new(USER_STACK_BASE),
        )?;
        debug!("{name}: file {USER_BASE:#010x}..{file_top:#010x}, stack {USER_STACK_BOTTOM:#010x}..{USER_STACK_BASE:#010x}");

        // usize is 32 bits wide on the target.
        #[allow(clippy::cast_possible_truncation)]
        let esp0 = task.stack.top() as usize as u32;
        task.tss.set_kernel_stack(KERNEL_DATA, esp0);
        self.cpu.load_task_state(&mut task.tss);
        self.cpu.load_page_directory(space.root_page());

        let entry = match self.copy_image(fs, &stat, space, file_top) {
            Ok(entry) => entry,
            Err(e) => {
                self.cpu.load_page_directory(self.memory.kernel_root());
                return Err(e);
            }
        };

        task.stack.reset(self.cpu.entry_trampoline());
        task.stack
            .trap_frame
            .prepare_user_entry(entry, VirtualAddress::new(USER_STACK_BASE));
        info!("{name}: {} bytes loaded, entry {entry}", stat.size);
        Ok(task.stack.context_ptr())
    }

    /// The task page, allocating it on first use.
    fn ensure_task(&mut self) -> Result<NonNull<Task>, LoadError> {
        if let Some(task) = self.task {
            return Ok(task);
        }
        let page = self.memory.alloc_page().ok_or(LoadError::OutOfMemory)?;
        let task = page.cast::<Task>();
        unsafe { task.write(Task::new()) };
        debug!("task page at {:p}", task.as_ptr());
        self.task = Some(task);
        Ok(task)
    }

    /// Copy the file into the active space and map what its program headers
    /// reach beyond it. Returns the entry point.
    fn copy_image<F: FileSystem + ?Sized>(
        &mut self,
        fs: &mut F,
        stat: &FileStat,
        space: &AddressSpace,
        file_top: u32,
    ) -> Result<VirtualAddress, LoadError> {
        let len = stat.size.min(MAX_IMAGE_SIZE);
        let window = unsafe { self.cpu.user_memory(VirtualAddress::new(USER_BASE), len) };
        match fs.read_file(stat, window) {
            Ok(n) if n > 0 && n == window.len() => {}
            Ok(n) => {
                warn!("short read: {n} of {len} bytes");
                return Err(LoadError::Unreadable);
            }
            Err(e) => {
                warn!("read failed: {e}");
                return Err(LoadError::Unreadable);
            }
        }

        let image = elf32_view(window)?;
        let entry = image.entry();
        let prog_top = image
            .memory_top()?
            .map_or(file_top, |top| top.as_u32().max(file_top));
        if prog_top > USER_STACK_BOTTOM {
            return Err(LoadError::TooLarge);
        }
        if prog_top > file_top {
            debug!("mapping {file_top:#010x}..{prog_top:#010x} past the file");
            self.memory
                .map_region(space, VirtualAddress::new(file_top), VirtualAddress::new(prog_top))?;
        }
        Ok(entry)
    }
}
