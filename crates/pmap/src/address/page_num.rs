//! 页码抽象模块
//!
//! 此模块定义了表示页码 (Page Number) 的 Trait 和物理页码类型 [`Ppn`]，
//! 以及用于描述连续页码的范围结构 [`PageNumRange`]。
//!
//! 帧池中的每个物理帧都以其物理页码编号。

use crate::address::types::{Address, Paddr};
use crate::address::{AlignOps, UsizeConvert};
use crate::config::PAGE_SIZE;
use core::fmt;

/// [PageNum] Trait
/// ---------------------
/// 表示一个页码的 Trait。
pub trait PageNum: UsizeConvert + Copy + Clone + PartialEq + PartialOrd + Eq + Ord {
    /// 此页码类型关联的地址类型（例如 Ppn 关联 Paddr）。
    type TAddress: Address + AlignOps;

    /// 将地址转换为页码 (向下取整，即页的起始页码)。
    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_down_to_page().as_usize() / PAGE_SIZE)
    }

    /// 将地址转换为页码 (向上取整，即如果地址未对齐，则指向下一个页码)。
    fn from_addr_ceil(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_up_to_page().as_usize() / PAGE_SIZE)
    }

    /// 获取该页码对应的起始地址。
    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * PAGE_SIZE)
    }

    /// 获取该页码后第 `offset` 页的页码。
    fn offset_by(self, offset: usize) -> Self {
        Self::from_usize(self.as_usize() + offset)
    }
}

/// [Ppn] (Physical Page Number)
/// ---------------------
/// 物理页码，对应物理地址 (Paddr)。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ppn(pub usize);

impl UsizeConvert for Ppn {
    fn as_usize(&self) -> usize {
        self.0
    }

    fn from_usize(value: usize) -> Self {
        Self(value)
    }
}

impl PageNum for Ppn {
    type TAddress = Paddr;
}

impl fmt::Debug for Ppn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ppn({:#x})", self.0)
    }
}

/// [PageNumRange]
/// ---------------------
/// 泛型页码范围结构，表示一个半开区间 `[start, end)`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageNumRange<T>
where
    T: PageNum,
{
    /// 范围的起始页码 (包含)。
    pub start: T,
    /// 范围的结束页码 (不包含)。
    pub end: T,
}

impl<T> PageNumRange<T>
where
    T: PageNum,
{
    /// 创建一个新的页码范围。
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// 从起始页码和长度 (页数) 创建一个页码范围。
    pub fn from_start_len(start: T, len: usize) -> Self {
        Self {
            start,
            end: start.offset_by(len),
        }
    }

    /// 获取范围内的页数。
    pub fn len(&self) -> usize {
        debug_assert!(self.end.as_usize() >= self.start.as_usize());
        self.end.as_usize() - self.start.as_usize()
    }

    /// 检查范围是否为空 (即 start == end)。
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 检查范围是否包含给定的页码。
    pub fn contains(&self, pn: T) -> bool {
        pn >= self.start && pn < self.end
    }

    /// 页码在范围内的下标；不在范围内时返回 `None`。
    pub fn index_of(&self, pn: T) -> Option<usize> {
        self.contains(pn)
            .then(|| pn.as_usize() - self.start.as_usize())
    }
}

/// 物理页码范围的类型别名
pub type PpnRange = PageNumRange<Ppn>;
