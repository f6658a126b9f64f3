//! 帧内容、页目录与表项定位器
//!
//! 表项以 `AtomicU32` 存储：硬件页表遍历器与内核可能同时读取同一表项，
//! 而写者由外部保证唯一（每个进程的地址空间串行修改）。

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use super::PageTableEntry;
use crate::address::Ppn;
use crate::config::{LIN_HIGH, LIN_USER, NPDENTRIES, NPTENTRIES, PDX_SHIFT};

/// 每个页中 32 位字的个数
pub const WORDS_PER_PAGE: usize = NPTENTRIES;

/// 一个物理帧的内容
///
/// 作为页表或页目录时，每个字就是一个表项。
#[repr(C, align(4096))]
pub struct Page([AtomicU32; WORDS_PER_PAGE]);

impl Page {
    /// 创建一个全零的页
    pub const fn new() -> Self {
        Page([const { AtomicU32::new(0) }; WORDS_PER_PAGE])
    }

    /// 读取第 `index` 个表项
    #[inline]
    pub fn entry(&self, index: usize) -> PageTableEntry {
        PageTableEntry::from_bits(self.0[index].load(Ordering::Acquire))
    }

    /// 写入第 `index` 个表项
    #[inline]
    pub fn set_entry(&self, index: usize, entry: PageTableEntry) {
        self.0[index].store(entry.bits(), Ordering::Release);
    }

    /// 将整页清零
    pub fn clear(&self) {
        self.fill(0);
    }

    /// 用同一个字填满整页
    pub fn fill(&self, word: u32) {
        for cell in self.0.iter() {
            cell.store(word, Ordering::Relaxed);
        }
    }

    /// 第 `index` 个字的单元
    pub(crate) fn cell(&self, index: usize) -> &AtomicU32 {
        &self.0[index]
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

/// 页目录：一个地址空间的根
#[repr(transparent)]
pub struct PageDirectory(Page);

/// 用户区域对应的页目录索引范围 `[USER_PDX_START, USER_PDX_END)`
pub const USER_PDX_START: usize = LIN_USER >> PDX_SHIFT;
/// 用户区域结束的页目录索引（不包含）
pub const USER_PDX_END: usize = LIN_HIGH >> PDX_SHIFT;

impl PageDirectory {
    /// 创建一个空页目录
    pub const fn new() -> Self {
        PageDirectory(Page::new())
    }

    /// 将一个帧的内容视为页目录
    pub fn from_page(page: &Page) -> &PageDirectory {
        // SAFETY: PageDirectory 是 Page 的 repr(transparent) 包装
        unsafe { &*(page as *const Page as *const PageDirectory) }
    }

    /// 读取页目录项
    #[inline]
    pub fn entry(&self, pdx: usize) -> PageTableEntry {
        self.0.entry(pdx)
    }

    /// 写入页目录项
    #[inline]
    pub fn set_entry(&self, pdx: usize, entry: PageTableEntry) {
        self.0.set_entry(pdx, entry);
    }

    /// 该页目录索引是否落在用户区域
    pub const fn is_user_index(pdx: usize) -> bool {
        pdx >= USER_PDX_START && pdx < USER_PDX_END
    }

    /// 以 `template` 为模板复制所有内核（非用户）目录项，用户区域置空
    pub fn copy_kernel_entries(&self, template: &PageDirectory) {
        for pdx in 0..NPDENTRIES {
            let entry = if Self::is_user_index(pdx) {
                PageTableEntry::empty()
            } else {
                template.entry(pdx)
            };
            self.set_entry(pdx, entry);
        }
    }

    /// 以页的形式访问
    pub fn as_page(&self) -> &Page {
        &self.0
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PageDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageDirectory({:p})", self)
    }
}

/// 页表项定位器
///
/// 由遍历器在通过帧池的边界检查后生成，记录页表所在的帧号和表项下标，
/// 并借用帧池中的表项单元，因此不会悬空。
#[derive(Clone, Copy)]
pub struct PteSlot<'a> {
    table: Ppn,
    index: usize,
    cell: &'a AtomicU32,
}

impl<'a> PteSlot<'a> {
    pub(crate) fn new(table: Ppn, page: &'a Page, index: usize) -> Self {
        PteSlot {
            table,
            index,
            cell: page.cell(index),
        }
    }

    /// 所在页表的物理帧号
    pub fn table(&self) -> Ppn {
        self.table
    }

    /// 在页表中的下标
    pub fn index(&self) -> usize {
        self.index
    }

    /// 读取表项
    pub fn read(&self) -> PageTableEntry {
        PageTableEntry::from_bits(self.cell.load(Ordering::Acquire))
    }

    /// 写入表项
    pub(crate) fn write(&self, entry: PageTableEntry) {
        self.cell.store(entry.bits(), Ordering::Release);
    }

    /// 清空表项（标记为未映射）
    pub(crate) fn clear(&self) {
        self.write(PageTableEntry::empty());
    }
}

impl fmt::Debug for PteSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PteSlot")
            .field("table", &self.table)
            .field("index", &self.index)
            .field("entry", &self.read())
            .finish()
    }
}
