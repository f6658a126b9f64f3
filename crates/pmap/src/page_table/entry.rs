//! 页表项格式
//!
//! 页目录项与页表项共用同一种 32 位格式：
//!
//! ```text
//!  31                 12 11    9 8 7 6 5 4 3 2 1 0
//! +---------------------+-------+-+-+-+-+-+-+-+-+-+
//! |   物理帧基址 [31:12] | AVAIL |G|S|D|A|C|T|U|W|P|
//! +---------------------+-------+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! 在页目录项中 `S` 位（[`PteFlags::HUGE`]）表示直接映射 4MB 区域。

use core::fmt;

use bitflags::bitflags;

use crate::address::{Laddr, Paddr, PageNum, Ppn, UsizeConvert};
use crate::config::PAGE_SHIFT;

bitflags! {
    /// 页表项标志位
    ///
    /// 调用者传入的权限位会被原样并入表项，本模块不校验请求了哪些位。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PteFlags: u32 {
        /// 存在位：表项是否有效的唯一依据
        const PRESENT = 1 << 0;
        /// 可写
        const WRITABLE = 1 << 1;
        /// 用户态可访问
        const USER = 1 << 2;
        /// 写直通
        const WRITE_THROUGH = 1 << 3;
        /// 禁用缓存
        const CACHE_DISABLE = 1 << 4;
        /// 已访问（硬件置位）
        const ACCESSED = 1 << 5;
        /// 已写（硬件置位）
        const DIRTY = 1 << 6;
        /// 页目录项：4MB 大页
        const HUGE = 1 << 7;
        /// 全局页：切换根页目录时不刷新
        const GLOBAL = 1 << 8;
        /// 留给软件使用的三位
        const AVAIL = 0b111 << 9;
    }
}

/// 表项中物理地址部分的掩码
const ADDR_MASK: u32 = 0xFFFF_F000;

/// 32 位页目录项或页表项
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// 空表项（不存在）
    pub const fn empty() -> Self {
        PageTableEntry(0)
    }

    /// 由物理帧号与标志位构造表项
    pub fn new(ppn: Ppn, flags: PteFlags) -> Self {
        debug_assert!(
            ppn.as_usize() >> (32 - PAGE_SHIFT) == 0,
            "frame number does not fit a 32-bit entry"
        );
        PageTableEntry(((ppn.as_usize() as u32) << PAGE_SHIFT) | flags.bits())
    }

    /// 启动阶段的大页目录项：把 `base` 开始的 4MB 区域映射到同一物理地址
    pub const fn superpage(base: Laddr, flags: PteFlags) -> Self {
        PageTableEntry(base.0 as u32 | flags.bits() | PteFlags::HUGE.bits())
    }

    /// 从原始位构造
    pub const fn from_bits(bits: u32) -> Self {
        PageTableEntry(bits)
    }

    /// 原始位
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// 表项中的物理基址
    pub fn paddr(self) -> Paddr {
        Paddr((self.0 & ADDR_MASK) as usize)
    }

    /// 表项引用的物理帧号
    pub fn ppn(self) -> Ppn {
        Ppn::from_addr_floor(self.paddr())
    }

    /// 标志位（低 12 位）
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_retain(self.0 & !ADDR_MASK)
    }

    /// 是否为全零表项
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 是否设置了存在位
    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    /// 是否为大页目录项
    pub fn is_huge(self) -> bool {
        self.flags().contains(PteFlags::HUGE)
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageTableEntry({:#010x})", self.0)
    }
}
