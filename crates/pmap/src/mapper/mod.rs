//! 映射操作模块
//!
//! [`Pmap`] 是修改某个地址空间时的上下文：它借用帧池，
//! 并记录当前处于活动状态的页目录，用来决定是否需要刷新本地 TLB。
//!
//! 各项操作分布在子模块中：
//!
//! - `walk`: 定位（可选地创建）某个用户虚拟地址的页表项
//! - `mapping`: 插入与移除映射，维护帧的引用计数
//! - `lookup`: 反查地址当前映射到的帧
//! - `tlb`: 单条 TLB 刷新
//!
//! # 并发
//!
//! 本模块内部不加锁。对同一个页目录的修改必须由调用者串行化；
//! 帧的引用计数本身是原子的，可以被多个地址空间共享。

mod lookup;
mod mapping;
mod tlb;
mod walk;

use crate::boot::boot_directory;
use crate::frame_allocator::FrameArena;
use crate::page_table::PageDirectory;

/// 地址空间修改上下文
#[derive(Clone, Copy, Debug)]
pub struct Pmap<'a> {
    frames: &'a FrameArena,
    active: Option<&'a PageDirectory>,
}

impl<'a> Pmap<'a> {
    /// 创建上下文
    ///
    /// `active` 为当前装入根页目录寄存器的页目录；
    /// 尚无进程运行时传入 `None`，此时视启动页目录为当前页目录。
    pub fn new(frames: &'a FrameArena, active: Option<&'a PageDirectory>) -> Self {
        Pmap { frames, active }
    }

    /// 页表与映射帧所在的帧池
    pub fn frames(&self) -> &'a FrameArena {
        self.frames
    }

    /// 当前活动的页目录
    pub fn active(&self) -> &'a PageDirectory {
        self.active.unwrap_or(boot_directory())
    }

    /// `dir` 是否为当前活动的页目录
    pub fn is_active(&self, dir: &PageDirectory) -> bool {
        core::ptr::eq(self.active(), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Paddr, Ppn, UsizeConvert, Vaddr};
    use crate::config::{LIN_USER, PAGE_SIZE, PTSIZE, USER_LIMIT};
    use crate::page_table::{PageTableEntry, PagingError, PteFlags};
    use crate::test_util::{arena, setup};
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use test_support::mock::mm::{MOCK_MM_OPS, MmuEvent};

    const RW: PteFlags = PteFlags::WRITABLE.union(PteFlags::USER);

    #[test]
    fn test_insert_then_lookup() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let frame = frames.allocate().unwrap();
        let slot = pmap.insert(&dir, &frame, Vaddr(0x1000), RW).unwrap();
        assert_eq!(pmap.lookup(&dir, Vaddr(0x1000)), Some(frame.ppn()));
        assert_eq!(slot.read().flags(), RW | PteFlags::PRESENT);
        assert_eq!(slot.read().ppn(), frame.ppn());
        // 句柄一个引用，表项一个引用
        assert_eq!(frame.ref_count(), 2);
    }

    #[test]
    fn test_reinsert_same_frame_changes_only_permissions() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let frame = frames.allocate().unwrap();
        pmap.insert(&dir, &frame, Vaddr(0x5000), RW).unwrap();
        let slot = pmap
            .insert(&dir, &frame, Vaddr(0x5000), PteFlags::USER)
            .unwrap();
        assert_eq!(frame.ref_count(), 2);
        assert_eq!(slot.read().flags(), PteFlags::USER | PteFlags::PRESENT);
        assert_eq!(pmap.lookup(&dir, Vaddr(0x5000)), Some(frame.ppn()));
    }

    #[test]
    fn test_reinsert_sole_reference_survives() {
        setup();
        let frames = arena(2);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let frame = frames.allocate().unwrap();
        let ppn = frame.ppn();
        pmap.insert(&dir, &frame, Vaddr(0), RW).unwrap();
        drop(frame);
        assert_eq!(frames.ref_count(ppn), 1);

        // 表项持有唯一引用时重新插入同一帧，引用计数不能中途归零
        let only = frames.get(ppn).unwrap();
        pmap.insert(&dir, &only, Vaddr(0), PteFlags::empty()).unwrap();
        drop(only);
        assert_eq!(frames.ref_count(ppn), 1);
        assert_eq!(pmap.lookup(&dir, Vaddr(0)), Some(ppn));
    }

    #[test]
    fn test_replace_with_other_frame() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let old = frames.allocate().unwrap();
        let new = frames.allocate().unwrap();
        let old_ppn = old.ppn();
        pmap.insert(&dir, &old, Vaddr(0x3000), RW).unwrap();
        drop(old);

        let before = frames.allocated_frames();
        pmap.insert(&dir, &new, Vaddr(0x3000), RW).unwrap();
        assert_eq!(pmap.lookup(&dir, Vaddr(0x3000)), Some(new.ppn()));
        assert_eq!(new.ref_count(), 2);
        assert_eq!(frames.ref_count(old_ppn), 0);
        assert_eq!(frames.allocated_frames(), before - 1);
    }

    #[test]
    fn test_remove_unmapped_is_noop() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, Some(&*dir));
        MOCK_MM_OPS.take_events();

        pmap.remove(&dir, Vaddr(0x7000));
        assert_eq!(frames.allocated_frames(), 0);
        assert!(MOCK_MM_OPS.take_events().is_empty());

        // 页表存在但表项为空
        let frame = frames.allocate().unwrap();
        pmap.insert(&dir, &frame, Vaddr(0x1000), RW).unwrap();
        MOCK_MM_OPS.take_events();
        pmap.remove(&dir, Vaddr(0x2000));
        assert_eq!(frame.ref_count(), 2);
        assert!(MOCK_MM_OPS.take_events().is_empty());
    }

    #[test]
    fn test_remove_releases_reference_and_flushes() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, Some(&*dir));

        let frame = frames.allocate().unwrap();
        pmap.insert(&dir, &frame, Vaddr(0x1000), RW).unwrap();
        MOCK_MM_OPS.take_events();

        pmap.remove(&dir, Vaddr(0x1000));
        assert_eq!(pmap.lookup(&dir, Vaddr(0x1000)), None);
        assert_eq!(frame.ref_count(), 1);
        assert_eq!(
            MOCK_MM_OPS.take_events(),
            [MmuEvent::FlushTlb(LIN_USER + 0x1000)]
        );
    }

    #[test]
    fn test_inactive_directory_is_not_flushed() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let other = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, Some(&*other));

        let frame = frames.allocate().unwrap();
        pmap.insert(&dir, &frame, Vaddr(0x1000), RW).unwrap();
        MOCK_MM_OPS.take_events();
        pmap.remove(&dir, Vaddr(0x1000));
        assert!(!pmap.is_active(&dir));
        assert!(MOCK_MM_OPS.take_events().is_empty());
    }

    #[test]
    fn test_no_process_means_boot_directory_is_active() {
        setup();
        let frames = arena(1);
        let pmap = Pmap::new(&frames, None);
        assert!(pmap.is_active(boot_directory()));

        MOCK_MM_OPS.take_events();
        pmap.invalidate(boot_directory(), Vaddr(0x4000));
        pmap.invalidate(boot_directory(), Vaddr(USER_LIMIT));
        assert_eq!(
            MOCK_MM_OPS.take_events(),
            [MmuEvent::FlushTlb(LIN_USER + 0x4000)]
        );
    }

    #[test]
    fn test_walk_without_create_never_allocates() {
        setup();
        let frames = arena(2);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        assert!(matches!(
            pmap.walk(&dir, Vaddr(0x1234), false),
            Err(PagingError::NotMapped)
        ));
        assert_eq!(frames.allocated_frames(), 0);
        assert!((0..1024).all(|pdx| dir.entry(pdx).is_empty()));
    }

    #[test]
    fn test_walk_creates_cleared_table() {
        setup();
        let frames = arena(1);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        // 分配前弄脏帧内容，新页表必须被清零
        let dirty = frames.allocate().unwrap();
        dirty.page().fill(0xffff_ffff);
        drop(dirty);

        let slot = pmap.walk(&dir, Vaddr(PTSIZE + 0x2000), true).unwrap();
        assert_eq!(slot.index(), 2);
        assert!(slot.read().is_empty());
        let table = frames.page(slot.table()).unwrap();
        assert!((0..1024).all(|i| table.entry(i).is_empty()));
        assert_eq!(frames.ref_count(slot.table()), 1);

        let pde = dir.entry((LIN_USER + PTSIZE) >> 22);
        assert_eq!(pde.ppn(), slot.table());
        assert_eq!(
            pde.flags(),
            PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER
        );

        // 同一区域内的再次遍历复用已有页表
        let again = pmap.walk(&dir, Vaddr(PTSIZE + 0x3000), true).unwrap();
        assert_eq!(again.table(), slot.table());
        assert_eq!(frames.allocated_frames(), 1);
    }

    #[test]
    fn test_out_of_memory_leaves_no_table() {
        setup();
        let frames = arena(1);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let frame = frames.allocate().unwrap();
        assert!(matches!(
            pmap.insert(&dir, &frame, Vaddr(0x1000), RW),
            Err(PagingError::OutOfMemory)
        ));
        assert_eq!(pmap.lookup(&dir, Vaddr(0x1000)), None);
        assert!(dir.entry((LIN_USER + 0x1000) >> 22).is_empty());
        assert_eq!(frame.ref_count(), 1);
    }

    #[test]
    fn test_address_errors() {
        setup();
        let frames = arena(2);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);
        let frame = frames.allocate().unwrap();

        assert!(matches!(
            pmap.insert(&dir, &frame, Vaddr(USER_LIMIT), RW),
            Err(PagingError::InvalidAddress)
        ));
        assert_eq!(pmap.lookup(&dir, Vaddr(USER_LIMIT)), None);

        // 用户区域中被大页覆盖的目录项
        let pdx = LIN_USER >> 22;
        dir.set_entry(
            pdx,
            PageTableEntry::superpage(crate::address::Laddr(LIN_USER), PteFlags::PRESENT),
        );
        assert!(matches!(
            pmap.walk(&dir, Vaddr(0), true),
            Err(PagingError::HugePageConflict)
        ));

        // 目录项指向帧池之外
        dir.set_entry(
            pdx,
            PageTableEntry::new(Ppn(0x10), PteFlags::PRESENT | PteFlags::WRITABLE),
        );
        assert!(matches!(
            pmap.walk(&dir, Vaddr(0), false),
            Err(PagingError::BadEntry)
        ));
        assert_eq!(frame.ref_count(), 1);
    }

    #[test]
    fn test_lookup_rejects_bogus_entries() {
        setup();
        let frames = arena(2);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let slot = pmap.walk(&dir, Vaddr(0x1000), true).unwrap();
        // 非零但不存在
        slot.write(PageTableEntry::from_bits(0x0010_1000));
        assert_eq!(pmap.lookup(&dir, Vaddr(0x1000)), None);
        // 存在但帧号超出帧池
        slot.write(PageTableEntry::new(Ppn(0xfffff), PteFlags::PRESENT));
        assert_eq!(pmap.lookup(&dir, Vaddr(0x1000)), None);
        // 移除坏表项不会动引用计数
        pmap.remove(&dir, Vaddr(0x1000));
        assert_eq!(frames.allocated_frames(), 1);
    }

    #[test]
    fn test_lookup_rejects_entry_for_free_frame() {
        setup();
        let frames = arena(2);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        // 页表占用 0x100，0x101 仍空闲
        let slot = pmap.walk(&dir, Vaddr(0x1000), true).unwrap();
        let free = Ppn(0x101);
        assert_eq!(frames.ref_count(free), 0);
        slot.write(PageTableEntry::new(free, PteFlags::PRESENT));
        assert_eq!(pmap.lookup(&dir, Vaddr(0x1000)), None);

        pmap.remove(&dir, Vaddr(0x1000));
        assert_eq!(frames.ref_count(free), 0);
        assert_eq!(frames.allocated_frames(), 1);

        // 空闲帧只会被分配一次
        let frame = frames.allocate().unwrap();
        assert_eq!(frame.ppn(), free);
        assert_eq!(frame.ref_count(), 1);
        assert!(frames.allocate().is_none());
    }

    #[test]
    #[should_panic(expected = "frame belongs to another arena")]
    fn test_insert_rejects_frame_from_other_arena() {
        setup();
        let frames = arena(2);
        let other = arena(2);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let stranger = other.allocate().unwrap();
        let _ = pmap.insert(&dir, &stranger, Vaddr(0x1000), PteFlags::USER);
    }

    #[test]
    fn test_translate_adds_page_offset() {
        setup();
        let frames = arena(4);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let frame = frames.allocate().unwrap();
        pmap.insert(&dir, &frame, Vaddr(0x0080_0000), RW).unwrap();
        assert_eq!(
            pmap.translate(&dir, Vaddr(0x0080_0abc)),
            Some(Paddr(frame.paddr().as_usize() + 0xabc))
        );
        assert_eq!(pmap.translate(&dir, Vaddr(0x0080_1000)), None);
    }

    #[test]
    fn test_two_directories_share_frame() {
        setup();
        let frames = arena(8);
        let a = Box::new(PageDirectory::new());
        let b = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let frame = frames.allocate().unwrap();
        pmap.insert(&a, &frame, Vaddr(0x1000), RW).unwrap();
        pmap.insert(&b, &frame, Vaddr(0x9000), RW).unwrap();
        assert_eq!(frame.ref_count(), 3);

        pmap.remove(&a, Vaddr(0x1000));
        assert_eq!(frame.ref_count(), 2);
        assert_eq!(pmap.lookup(&a, Vaddr(0x1000)), None);
        assert_eq!(pmap.lookup(&b, Vaddr(0x9000)), Some(frame.ppn()));
    }

    #[test]
    fn test_many_pages_in_one_table() {
        setup();
        let frames = arena(16);
        let dir = Box::new(PageDirectory::new());
        let pmap = Pmap::new(&frames, None);

        let mapped: Vec<_> = (0..8)
            .map(|i| {
                let frame = frames.allocate().unwrap();
                pmap.insert(&dir, &frame, Vaddr(i * PAGE_SIZE), RW).unwrap();
                frame.into_raw()
            })
            .collect();
        // 八个数据帧加一个页表
        assert_eq!(frames.allocated_frames(), 9);

        for (i, ppn) in mapped.iter().enumerate() {
            assert_eq!(pmap.lookup(&dir, Vaddr(i * PAGE_SIZE)), Some(*ppn));
            pmap.remove(&dir, Vaddr(i * PAGE_SIZE));
            // 表项的引用已释放，剩下 into_raw 留下的那个
            drop(unsafe { frames.reclaim(*ppn) });
        }
        assert_eq!(frames.allocated_frames(), 1);
    }
}
