//! 地址类型
//!
//! - [`Paddr`]: 物理地址
//! - [`Vaddr`]: 用户虚拟地址（用户视角，从 0 开始）
//! - [`Laddr`]: 线性地址，即用户虚拟地址加上固定偏移 [`LIN_USER`]
//!
//! 页表遍历只接受线性地址；用户虚拟地址必须先经过 [`Laddr::from_user`]，
//! 该函数同时负责检查用户可达空间的上界。

use core::fmt;

use crate::config::{LIN_USER, NPDENTRIES, NPTENTRIES, PAGE_SHIFT, PAGE_SIZE, PDX_SHIFT, USER_LIMIT};
use crate::page_table::{PagingError, PagingResult};

/// 在类型和 usize 之间进行转换
pub trait UsizeConvert: Copy {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// 地址对齐操作
pub trait AlignOps: UsizeConvert {
    /// 页内偏移
    fn page_offset(self) -> usize {
        self.as_usize() & (PAGE_SIZE - 1)
    }

    /// 是否按页对齐
    fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// 向下对齐到页边界
    fn align_down_to_page(self) -> Self {
        Self::from_usize(self.as_usize() & !(PAGE_SIZE - 1))
    }

    /// 向上对齐到页边界
    fn align_up_to_page(self) -> Self {
        Self::from_usize((self.as_usize() + PAGE_SIZE - 1) & !(PAGE_SIZE - 1))
    }
}

/// 表示内存地址（物理、虚拟或线性）的标记 trait
pub trait Address: AlignOps + PartialEq + PartialOrd {}

macro_rules! impl_address {
    ($type:ident, $name:literal) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl AlignOps for $type {}
        impl Address for $type {}

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({:#x})"), self.0)
            }
        }

        impl From<usize> for $type {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }
    };
}

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Paddr(pub usize);
impl_address!(Paddr, "Paddr");

/// 用户虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr, "Vaddr");

/// 线性地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Laddr(pub usize);
impl_address!(Laddr, "Laddr");

impl Laddr {
    /// 将用户虚拟地址转换为线性地址
    ///
    /// # 错误
    /// 地址超出用户可达空间（`>= USER_LIMIT`）时返回 [`PagingError::InvalidAddress`]
    pub fn from_user(uva: Vaddr) -> PagingResult<Self> {
        if uva.0 >= USER_LIMIT {
            return Err(PagingError::InvalidAddress);
        }
        Ok(Laddr(uva.0 + LIN_USER))
    }

    /// 页目录索引 `la[31:22]` 对应的区域起始线性地址
    pub const fn of_directory_index(pdx: usize) -> Self {
        Laddr(pdx << PDX_SHIFT)
    }

    /// 页目录索引
    pub const fn pdx(self) -> usize {
        (self.0 >> PDX_SHIFT) & (NPDENTRIES - 1)
    }

    /// 页表索引
    pub const fn ptx(self) -> usize {
        (self.0 >> PAGE_SHIFT) & (NPTENTRIES - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_zero_is_lin_user() {
        let la = Laddr::from_user(Vaddr(0)).unwrap();
        assert_eq!(la, Laddr(LIN_USER));
        assert_eq!(la.pdx(), LIN_USER >> PDX_SHIFT);
        assert_eq!(la.ptx(), 0);
    }

    #[test]
    fn test_indexes() {
        let la = Laddr::from_user(Vaddr(0x0040_3123)).unwrap();
        assert_eq!(la.pdx(), 0x101);
        assert_eq!(la.ptx(), 3);
        assert_eq!(la.page_offset(), 0x123);
    }

    #[test]
    fn test_user_limit_rejected() {
        assert!(Laddr::from_user(Vaddr(USER_LIMIT - 1)).is_ok());
        assert!(matches!(
            Laddr::from_user(Vaddr(USER_LIMIT)),
            Err(PagingError::InvalidAddress)
        ));
    }

    #[test]
    fn test_align() {
        let a = Paddr(0x1001);
        assert_eq!(a.align_down_to_page(), Paddr(0x1000));
        assert_eq!(a.align_up_to_page(), Paddr(0x2000));
        assert!(!a.is_page_aligned());
        assert!(Paddr(0x3000).is_page_aligned());
    }
}
