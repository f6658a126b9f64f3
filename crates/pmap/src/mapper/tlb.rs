//! TLB 刷新

use super::Pmap;
use crate::address::{Laddr, UsizeConvert, Vaddr};
use crate::arch_ops::arch_ops;
use crate::page_table::PageDirectory;

impl Pmap<'_> {
    /// 刷新 `uva` 在本地 TLB 中的缓存翻译
    ///
    /// 只有 `dir` 是当前活动页目录时才需要刷新；非活动地址空间的翻译不在本地 TLB 中。
    /// 超出用户空间的地址被忽略。多核之间的 TLB 一致性不在此处理。
    pub fn invalidate(&self, dir: &PageDirectory, uva: Vaddr) {
        if !self.is_active(dir) {
            return;
        }
        if let Ok(la) = Laddr::from_user(uva) {
            arch_ops().flush_tlb(la.as_usize());
        }
    }
}
