//! 页表遍历

use super::Pmap;
use crate::address::{Laddr, Ppn, Vaddr};
use crate::page_table::{
    PageDirectory, PageTableEntry, PagingError, PagingResult, PteFlags, PteSlot,
};

impl<'a> Pmap<'a> {
    /// 定位用户虚拟地址 `uva` 在 `dir` 中的页表项。
    ///
    /// 目录项不存在时：
    /// - `create == false`：返回 [`PagingError::NotMapped`]，不做任何修改，也不调用分配器
    /// - `create == true`：分配一个清零的页表并以 `PRESENT | WRITABLE | USER` 挂入目录，
    ///   分配失败时返回 [`PagingError::OutOfMemory`]，目录保持不变
    ///
    /// 已存在的目录项永远不会被修改。
    ///
    /// # 错误
    /// - [`PagingError::InvalidAddress`]: `uva` 超出用户可达空间
    /// - [`PagingError::HugePageConflict`]: 区域被大页目录项覆盖
    /// - [`PagingError::BadEntry`]: 目录项指向帧池之外的帧
    pub fn walk(&self, dir: &PageDirectory, uva: Vaddr, create: bool) -> PagingResult<PteSlot<'a>> {
        let la = Laddr::from_user(uva)?;
        let pdx = la.pdx();
        let pde = dir.entry(pdx);

        let table = if pde.is_present() {
            if pde.is_huge() {
                return Err(PagingError::HugePageConflict);
            }
            pde.ppn()
        } else if create {
            self.create_table(dir, pdx)?
        } else {
            return Err(PagingError::NotMapped);
        };

        let Some(page) = self.frames.page(table) else {
            log::warn!(
                "pmap walk: directory entry {:?} for {:?} references a frame outside the arena",
                pde,
                uva
            );
            return Err(PagingError::BadEntry);
        };
        Ok(PteSlot::new(table, page, la.ptx()))
    }

    /// 为目录项 `pdx` 分配并挂入一个新页表，返回其帧号
    fn create_table(&self, dir: &PageDirectory, pdx: usize) -> PagingResult<Ppn> {
        let frame = self.frames.allocate().ok_or(PagingError::OutOfMemory)?;
        frame.page().clear();

        // 页表帧唯一的引用由目录项持有
        let table = frame.into_raw();
        dir.set_entry(
            pdx,
            PageTableEntry::new(table, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER),
        );
        log::trace!("page table {:?} created for directory index {:#x}", table, pdx);
        Ok(table)
    }
}
