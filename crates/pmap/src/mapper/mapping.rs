//! 插入与移除映射

use super::Pmap;
use crate::address::Vaddr;
use crate::frame_allocator::Frame;
use crate::page_table::{PageDirectory, PageTableEntry, PagingResult, PteFlags, PteSlot};

impl<'a> Pmap<'a> {
    /// 把 `frame` 映射到 `dir` 中的用户虚拟地址 `uva`，权限为 `perm | PRESENT`。
    ///
    /// 表项持有 `frame` 的一个新引用。若 `uva` 原先已有映射，旧映射先被移除
    /// （旧帧的引用随之释放）；同一帧重复插入到同一地址只会改变权限位。
    ///
    /// 遍历失败（包括 [`crate::PagingError::OutOfMemory`]）时直接返回错误，
    /// 不做任何修改。
    ///
    /// # Panics
    /// `frame` 不属于本上下文的帧池时 panic。
    pub fn insert(
        &self,
        dir: &PageDirectory,
        frame: &Frame<'_>,
        uva: Vaddr,
        perm: PteFlags,
    ) -> PagingResult<PteSlot<'a>> {
        assert!(
            core::ptr::eq(frame.arena(), self.frames),
            "insert: frame belongs to another arena"
        );
        let slot = self.walk(dir, uva, true)?;

        // 先取得新引用，再释放旧映射
        let held = frame.clone();
        if slot.read().is_present() {
            self.remove(dir, uva);
        }

        slot.write(PageTableEntry::new(held.into_raw(), perm | PteFlags::PRESENT));
        Ok(slot)
    }

    /// 移除 `dir` 中 `uva` 的映射。
    ///
    /// 未映射时什么也不做。否则清空表项、刷新该地址的 TLB，
    /// 再释放表项持有的引用；引用归零的帧回到帧池，内容不做清除。
    pub fn remove(&self, dir: &PageDirectory, uva: Vaddr) {
        let Some((ppn, slot)) = self.lookup_entry(dir, uva) else {
            return;
        };

        slot.clear();
        self.invalidate(dir, uva);
        // SAFETY: 刚清空的表项持有 ppn 的一个引用
        drop(unsafe { self.frames.reclaim(ppn) });
    }
}
