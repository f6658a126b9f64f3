//! 进程地址空间
//!
//! [`AddressSpace`] 拥有一个页目录帧。创建时从模板（通常是启动页目录）
//! 复制内核目录项，用户区域留空；销毁时释放所有用户映射、页表以及页目录本身。

use crate::address::{Paddr, UsizeConvert};
use crate::arch_ops::arch_ops;
use crate::boot::boot_directory;
use crate::config::NPTENTRIES;
use crate::frame_allocator::{Frame, FrameArena};
use crate::mapper::Pmap;
use crate::page_table::{
    PageDirectory, PageTableEntry, PagingError, PagingResult, USER_PDX_END, USER_PDX_START,
};

/// 一个进程的完整地址空间
pub struct AddressSpace<'a> {
    root: Frame<'a>,
}

impl<'a> AddressSpace<'a> {
    /// 以启动页目录为模板创建地址空间
    pub fn new(frames: &'a FrameArena) -> PagingResult<Self> {
        Self::with_template(frames, boot_directory())
    }

    /// 以 `template` 为模板创建地址空间
    ///
    /// # 错误
    /// 无法分配页目录帧时返回 [`PagingError::OutOfMemory`]
    pub fn with_template(frames: &'a FrameArena, template: &PageDirectory) -> PagingResult<Self> {
        let root = frames.allocate().ok_or(PagingError::OutOfMemory)?;
        let space = AddressSpace { root };
        space.directory().copy_kernel_entries(template);
        log::debug!("address space created, root {:?}", space.root.ppn());
        Ok(space)
    }

    /// 页目录
    pub fn directory(&self) -> &'a PageDirectory {
        PageDirectory::from_page(self.root.page())
    }

    /// 页目录的物理地址，即装入根页目录寄存器的值
    pub fn root_paddr(&self) -> Paddr {
        self.root.paddr()
    }

    /// 页表与映射帧所在的帧池
    pub fn frames(&self) -> &'a FrameArena {
        self.root.arena()
    }

    /// 在本地址空间上进行修改的上下文
    pub fn pmap(&self, active: Option<&'a PageDirectory>) -> Pmap<'a> {
        Pmap::new(self.frames(), active)
    }

    /// 将本地址空间装入根页目录寄存器
    ///
    /// # Safety
    /// 页目录中的内核目录项必须覆盖当前正在执行的代码和栈
    pub unsafe fn activate(&self) {
        // SAFETY: 由调用者保证
        unsafe { arch_ops().load_root(self.root_paddr().as_usize()) }
    }
}

impl Drop for AddressSpace<'_> {
    /// 释放所有用户映射与页表
    ///
    /// 被销毁的地址空间不能是当前活动的地址空间，因此这里不刷新 TLB。
    fn drop(&mut self) {
        let frames = self.frames();
        let dir = self.directory();

        for pdx in USER_PDX_START..USER_PDX_END {
            let pde = dir.entry(pdx);
            if !pde.is_present() || pde.is_huge() {
                continue;
            }
            let table = pde.ppn();
            dir.set_entry(pdx, PageTableEntry::empty());

            let Some(page) = frames.page(table) else {
                log::warn!("address space drop: bogus directory entry {:?}", pde);
                continue;
            };
            for ptx in 0..NPTENTRIES {
                let pte = page.entry(ptx);
                if pte.is_present() && frames.ref_count(pte.ppn()) > 0 {
                    // SAFETY: 存在的表项持有所映射帧的一个引用
                    drop(unsafe { frames.reclaim(pte.ppn()) });
                }
            }
            // SAFETY: 目录项持有页表帧唯一的引用，已在上面清空
            drop(unsafe { frames.reclaim(table) });
        }
        log::debug!("address space dropped, root {:?}", self.root.ppn());
    }
}
