//! 映射反查

use super::Pmap;
use crate::address::{AlignOps, Paddr, PageNum, Ppn, UsizeConvert, Vaddr};
use crate::page_table::{PageDirectory, PteSlot};

impl<'a> Pmap<'a> {
    /// 返回 `uva` 当前映射到的帧号
    pub fn lookup(&self, dir: &PageDirectory, uva: Vaddr) -> Option<Ppn> {
        self.lookup_entry(dir, uva).map(|(ppn, _)| ppn)
    }

    /// 返回 `uva` 当前映射到的帧号以及对应的页表项
    ///
    /// 不会创建页表。表项为零时返回 `None`；
    /// 表项非零却不存在、帧号不在帧池中或指向空闲帧，则视为一致性错误，
    /// 记录警告后同样返回 `None`。
    pub fn lookup_entry(&self, dir: &PageDirectory, uva: Vaddr) -> Option<(Ppn, PteSlot<'a>)> {
        let slot = self.walk(dir, uva, false).ok()?;
        let pte = slot.read();
        if pte.is_empty() {
            return None;
        }
        if !pte.is_present() || self.frames.ref_count(pte.ppn()) == 0 {
            log::warn!("pmap lookup: bogus entry {:?} for {:?}", pte, uva);
            return None;
        }
        Some((pte.ppn(), slot))
    }

    /// 把 `uva` 翻译为物理地址
    pub fn translate(&self, dir: &PageDirectory, uva: Vaddr) -> Option<Paddr> {
        let ppn = self.lookup(dir, uva)?;
        Some(Paddr(ppn.start_addr().as_usize() + uva.page_offset()))
    }
}
