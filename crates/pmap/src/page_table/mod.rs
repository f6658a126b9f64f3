//! 页表模块
//!
//! 本模块定义两级页表的存储格式：
//!
//! - [`PageTableEntry`] / [`PteFlags`]: 32 位页目录项与页表项
//! - [`Page`]: 一个物理帧的内容，视为 1024 个 32 位表项
//! - [`PageDirectory`]: 地址空间的根
//! - [`PteSlot`]: 指向某个页表项的定位器，由遍历器返回
//!
//! 以及分页操作的错误类型 [`PagingError`]。
mod entry;
mod page;

pub use entry::*;
pub use page::*;

use core::fmt;

/// 分页操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// 虚拟地址所在区域没有页表（非创建式遍历的“不存在”）
    NotMapped,
    /// 地址超出用户可达空间
    InvalidAddress,
    /// 遍历遇到了启动阶段的大页目录项
    HugePageConflict,
    /// 页目录项指向帧池之外的帧（一致性错误）
    BadEntry,
    /// 内存耗尽：无法为页表或页目录分配帧
    OutOfMemory,
}

impl fmt::Display for PagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PagingError::NotMapped => "address not mapped",
            PagingError::InvalidAddress => "address outside user space",
            PagingError::HugePageConflict => "address covered by a superpage",
            PagingError::BadEntry => "directory entry references an unknown frame",
            PagingError::OutOfMemory => "out of memory",
        };
        f.write_str(msg)
    }
}

/// 分页操作的结果类型
pub type PagingResult<T> = Result<T, PagingError>;
