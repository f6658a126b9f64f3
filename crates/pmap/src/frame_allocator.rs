//! 帧分配器模块
//!
//! 本模块提供物理帧池 [`FrameArena`] 与引用计数句柄 [`Frame`]。
//!
//! ## 帧池
//!
//! 帧池管理一段连续的物理帧 `[start, start + n)`，每个帧以物理页号编号：
//!
//! - **pages**：帧的内容，按页号下标访问；任何对帧内容的引用都要经过边界检查
//! - **refs**：每帧一个引用计数
//! - **bitmap**：每个 bit 表示一个物理帧（0=空闲，1=已分配）
//! - **hint**：上次分配位置提示，利用局部性加速查找
//!
//! 位图与引用计数都是原子量，分配与释放无需加锁，
//! 因此句柄可以在 `Drop` 中直接归还帧。
//!
//! ## 引用计数句柄
//!
//! - `allocate` 返回持有第一个引用的 [`Frame`]
//! - `Frame::clone` 增加引用，`Drop` 减少引用，减到 0 时帧回到空闲位图
//! - [`Frame::into_raw`] 把引用转交给页表项；[`FrameArena::reclaim`] 把它取回
//!
//! 帧被释放时内容不会被清除，由下一个使用者负责初始化。
//!
//! # 模块组成
//!
//! - [`FrameArena`]：帧池。
//! - [`Frame`]：引用计数句柄。
//! - [`frame_arena`] / [`alloc_frame`]：全局帧池及其分配入口。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering, fence};

use lazy_static::lazy_static;

use crate::address::{Paddr, PageNum, Ppn, PpnRange, UsizeConvert};
use crate::arch_ops::arch_ops;
use crate::config::{PAGE_SHIFT, mm_config};
use crate::page_table::Page;

// ============================================================================
// Frame - 引用计数句柄
// ============================================================================

/// 物理帧句柄
///
/// 每个存活的句柄持有所引用帧的一个引用计数。
pub struct Frame<'a> {
    arena: &'a FrameArena,
    ppn: Ppn,
}

impl<'a> Frame<'a> {
    /// 物理页号
    pub fn ppn(&self) -> Ppn {
        self.ppn
    }

    /// 帧的物理基址
    pub fn paddr(&self) -> Paddr {
        self.ppn.start_addr()
    }

    /// 帧的内容
    pub fn page(&self) -> &'a Page {
        &self.arena.pages()[self.index()]
    }

    /// 当前引用计数
    pub fn ref_count(&self) -> usize {
        self.arena.ref_count(self.ppn)
    }

    /// 所属帧池
    pub fn arena(&self) -> &'a FrameArena {
        self.arena
    }

    /// 放弃句柄但保留其引用，返回页号
    ///
    /// 引用随后由写入该页号的表项持有，需用 [`FrameArena::reclaim`] 取回。
    pub fn into_raw(self) -> Ppn {
        let ppn = self.ppn;
        core::mem::forget(self);
        ppn
    }

    fn index(&self) -> usize {
        self.ppn.as_usize() - self.arena.range.start.as_usize()
    }
}

impl Clone for Frame<'_> {
    fn clone(&self) -> Self {
        self.arena.refs[self.index()].fetch_add(1, Ordering::Relaxed);
        Frame {
            arena: self.arena,
            ppn: self.ppn,
        }
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.arena.release(self.index());
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("ppn", &self.ppn)
            .field("refs", &self.ref_count())
            .finish()
    }
}

// ============================================================================
// FrameArena - 帧池
// ============================================================================

/// 帧内容的存储位置
enum Backing {
    /// 直接映射的物理内存
    Static(&'static [Page]),
    /// 堆上分配的页（宿主环境）
    Heap(Box<[Page]>),
}

/// 物理帧池
pub struct FrameArena {
    /// 池中帧的页号范围
    range: PpnRange,
    /// 帧内容
    pages: Backing,
    /// 每帧的引用计数
    refs: Box<[AtomicU32]>,
    /// 分配位图（0=空闲，1=已分配）
    bitmap: Box<[AtomicU64]>,
    /// 已分配帧数
    allocated: AtomicUsize,
    /// 上次分配所在的位图字下标
    hint: AtomicUsize,
}

impl FrameArena {
    /// 在一段直接映射的物理内存上建立帧池
    ///
    /// `pages[i]` 即物理页号 `start + i` 的内容。
    pub fn new(start: Ppn, pages: &'static [Page]) -> Self {
        Self::with_backing(start, Backing::Static(pages))
    }

    /// 在堆上建立含 `count` 个帧的帧池，页号从 `start` 开始
    pub fn on_heap(start: Ppn, count: usize) -> Self {
        let pages: Vec<Page> = (0..count).map(|_| Page::new()).collect();
        Self::with_backing(start, Backing::Heap(pages.into_boxed_slice()))
    }

    fn with_backing(start: Ppn, pages: Backing) -> Self {
        let total = match &pages {
            Backing::Static(p) => p.len(),
            Backing::Heap(p) => p.len(),
        };
        let range = PpnRange::from_start_len(start, total);
        assert!(
            range.end.as_usize() <= 1 << (32 - PAGE_SHIFT),
            "frame arena exceeds 32-bit physical space"
        );

        let refs: Vec<AtomicU32> = (0..total).map(|_| AtomicU32::new(0)).collect();
        let bitmap: Vec<AtomicU64> = (0..total.div_ceil(64))
            .map(|word| {
                // 位图最后一个字中超出范围的位预先置 1，永远不会被分配
                let valid = total - word * 64;
                if valid >= 64 {
                    AtomicU64::new(0)
                } else {
                    AtomicU64::new(!((1u64 << valid) - 1))
                }
            })
            .collect();

        FrameArena {
            range,
            pages,
            refs: refs.into_boxed_slice(),
            bitmap: bitmap.into_boxed_slice(),
            allocated: AtomicUsize::new(0),
            hint: AtomicUsize::new(0),
        }
    }

    fn pages(&self) -> &[Page] {
        match &self.pages {
            Backing::Static(p) => p,
            Backing::Heap(p) => p,
        }
    }

    /// 分配一个物理帧。
    ///
    /// 从 hint 开始循环查找第一个空闲位；返回的句柄持有唯一的引用。
    /// 帧内容不做清零。内存耗尽时返回 `None`。
    pub fn allocate(&self) -> Option<Frame<'_>> {
        let words = self.bitmap.len();
        if words == 0 {
            return None;
        }

        let start = self.hint.load(Ordering::Relaxed) % words;
        for offset in 0..words {
            let idx = (start + offset) % words;
            let mut word = self.bitmap[idx].load(Ordering::Relaxed);

            while word != u64::MAX {
                let bit = (!word).trailing_zeros() as usize;
                let frame_idx = idx * 64 + bit;
                match self.bitmap[idx].compare_exchange_weak(
                    word,
                    word | (1u64 << bit),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        self.refs[frame_idx].store(1, Ordering::Relaxed);
                        self.allocated.fetch_add(1, Ordering::Relaxed);
                        self.hint.store(idx, Ordering::Relaxed);

                        let ppn = self.range.start.offset_by(frame_idx);
                        log::trace!("frame {:?} allocated", ppn);
                        return Some(Frame { arena: self, ppn });
                    }
                    Err(current) => word = current,
                }
            }
        }

        None // 内存耗尽
    }

    /// 为一个已分配的帧创建新句柄（引用计数加一）
    ///
    /// 页号不在池中或帧空闲时返回 `None`。
    pub fn get(&self, ppn: Ppn) -> Option<Frame<'_>> {
        let idx = self.range.index_of(ppn)?;
        let refs = &self.refs[idx];
        let mut current = refs.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return None;
            }
            match refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(Frame { arena: self, ppn }),
                Err(actual) => current = actual,
            }
        }
    }

    /// 取回由 [`Frame::into_raw`] 转交出去的引用
    ///
    /// # Safety
    /// 调用者必须确实持有该页号上的一个转交引用（例如刚清空的表项），
    /// 且之后不再使用它，否则计数会被多减一次。
    pub unsafe fn reclaim(&self, ppn: Ppn) -> Frame<'_> {
        Frame { arena: self, ppn }
    }

    /// 减少一个引用，减到 0 时把帧放回空闲位图
    ///
    /// 计数已为 0 时只记录警告，不会回绕。
    fn release(&self, frame_idx: usize) {
        let refs = &self.refs[frame_idx];
        let mut current = refs.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                log::warn!(
                    "frame {:?} released with no reference",
                    self.range.start.offset_by(frame_idx)
                );
                return;
            }
            match refs.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current != 1 {
            return;
        }

        fence(Ordering::Acquire);
        let mask = 1u64 << (frame_idx % 64);
        self.bitmap[frame_idx / 64].fetch_and(!mask, Ordering::Release);
        self.allocated.fetch_sub(1, Ordering::Relaxed);
        log::trace!("frame {:?} freed", self.range.start.offset_by(frame_idx));
    }

    /// 页号是否属于本帧池
    pub fn contains(&self, ppn: Ppn) -> bool {
        self.range.contains(ppn)
    }

    /// 页号对应的帧内容
    pub fn page(&self, ppn: Ppn) -> Option<&Page> {
        self.range.index_of(ppn).map(|idx| &self.pages()[idx])
    }

    /// 帧的物理基址；页号不在池中时返回 `None`
    pub fn paddr_of(&self, ppn: Ppn) -> Option<Paddr> {
        self.contains(ppn).then(|| ppn.start_addr())
    }

    /// 物理地址所在帧的页号；不在池中时返回 `None`
    pub fn ppn_of(&self, paddr: Paddr) -> Option<Ppn> {
        let ppn = Ppn::from_addr_floor(paddr);
        self.contains(ppn).then_some(ppn)
    }

    /// 帧的引用计数；页号不在池中时为 0
    pub fn ref_count(&self, ppn: Ppn) -> usize {
        self.range
            .index_of(ppn)
            .map_or(0, |idx| self.refs[idx].load(Ordering::Relaxed) as usize)
    }

    /// 池中帧的页号范围
    pub fn range(&self) -> PpnRange {
        self.range
    }

    /// 获取总的物理帧数
    pub fn total_frames(&self) -> usize {
        self.range.len()
    }

    /// 获取已分配的帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// 获取空闲的帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames() - self.allocated_frames()
    }

    /// 获取帧池的当前状态
    /// # 返回值
    /// - 总帧数
    /// - 已分配的帧数
    /// - 空闲的帧数
    pub fn stats(&self) -> (usize, usize, usize) {
        let allocated = self.allocated_frames();
        (
            self.total_frames(),
            allocated,
            self.total_frames() - allocated,
        )
    }

    /// 依据已注册的 [`crate::MmConfig`] 建立帧池
    fn from_config() -> Self {
        let config = mm_config();
        let start = Ppn::from_addr_ceil(Paddr(config.memory_start()));
        let end = Ppn::from_addr_floor(Paddr(config.memory_end()));
        let count = end.as_usize().saturating_sub(start.as_usize());
        if count == 0 {
            log::warn!("frame arena: no usable physical memory");
            return FrameArena::new(start, &[]);
        }

        let base = arch_ops().paddr_to_vaddr(start.start_addr().as_usize()) as *const Page;
        // SAFETY: [start, end) 是专供帧池使用的物理内存，并已通过直接映射可访问；
        // Page 由原子字组成，任意位模式都是合法值
        let pages = unsafe { core::slice::from_raw_parts(base, count) };

        log::info!(
            "frame arena: {:#x} - {:#x} ({} frames)",
            start.start_addr().as_usize(),
            end.start_addr().as_usize(),
            count
        );
        FrameArena::new(start, pages)
    }
}

impl fmt::Debug for FrameArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameArena")
            .field("range", &self.range)
            .field("allocated", &self.allocated_frames())
            .finish()
    }
}

// ============================================================================
// 全局帧池
// ============================================================================

lazy_static! {
    /// 全局物理帧池，首次使用时依据已注册的配置建立。
    static ref FRAME_ARENA: FrameArena = FrameArena::from_config();
}

/// 获取全局帧池
///
/// 首次调用前必须已经注册 [`crate::ArchMmOps`] 与 [`crate::MmConfig`]。
pub fn frame_arena() -> &'static FrameArena {
    &FRAME_ARENA
}

/// 从全局帧池分配一个物理帧。
///
/// # 返回
///
/// 如果分配成功，返回 `Some(Frame)`；否则返回 `None`。
pub fn alloc_frame() -> Option<Frame<'static>> {
    FRAME_ARENA.allocate()
}
