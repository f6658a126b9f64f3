//! 启动阶段的恒等映射
//!
//! 在任何进程存在之前，内核运行在一个扁平的页目录上：
//! 用户区域 `[LIN_USER, LIN_HIGH)` 之外的每个 4MB 区域都用大页映射到相同的物理地址，
//! 用户区域留空，交给之后的遍历按需填充。
//!
//! 这一阶段没有可恢复的错误路径，任何不一致都直接 panic。

use crate::address::{Laddr, UsizeConvert};
use crate::arch_ops::arch_ops;
use crate::config::{NPDENTRIES, PTSIZE};
use crate::page_table::{PageDirectory, PageTableEntry, PteFlags};

/// 启动页目录
static BOOT_PDIR: PageDirectory = PageDirectory::new();

/// 启动页目录
///
/// 新地址空间以它为模板复制内核目录项；没有进程运行时它就是当前页目录。
pub fn boot_directory() -> &'static PageDirectory {
    &BOOT_PDIR
}

/// 在 `dir` 中建立恒等映射
pub fn build_boot_directory(dir: &PageDirectory) {
    let flags = PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::GLOBAL;
    for pdx in 0..NPDENTRIES {
        let entry = if PageDirectory::is_user_index(pdx) {
            PageTableEntry::empty()
        } else {
            PageTableEntry::superpage(Laddr::of_directory_index(pdx), flags)
        };
        dir.set_entry(pdx, entry);
    }
}

/// 开启分页
///
/// 启动 CPU（`on_boot_cpu == true`）负责构建启动页目录，其余 CPU 直接复用。
/// 随后在每个 CPU 上依次打开大页与全局页支持、装入启动页目录、打开分页与保护位。
///
/// # Safety
/// - 必须在分页初始化阶段、单线程地在每个 CPU 上调用一次
/// - 启动 CPU 必须先于其他 CPU 完成调用
/// - 必须已经注册 [`crate::ArchMmOps`]
pub unsafe fn init(on_boot_cpu: bool) {
    let pc = init as *const () as usize;
    // SAFETY: 由调用者保证
    unsafe { bootstrap(&BOOT_PDIR, on_boot_cpu, pc) }
}

/// # Safety
/// 同 [`init`]；`pc` 为当前执行代码所在的线性地址
pub(crate) unsafe fn bootstrap(dir: &PageDirectory, build: bool, pc: usize) {
    if build {
        build_boot_directory(dir);
        log::info!("boot page directory built");
    }

    // 打开分页的那一刻，正在执行的代码必须已经被恒等映射覆盖
    let la = Laddr(pc);
    let pde = dir.entry(la.pdx());
    assert!(
        pde.is_present() && pde.is_huge() && pde.paddr().as_usize() == pc & !(PTSIZE - 1),
        "boot: code at {:#x} is not identity mapped ({:?})",
        pc,
        pde
    );

    let ops = arch_ops();
    // SAFETY: dir 已完整构建且覆盖当前代码
    unsafe {
        ops.enable_large_pages();
        ops.load_root(ops.vaddr_to_paddr(dir as *const PageDirectory as usize));
        ops.enable_paging();
    }
    log::debug!("paging enabled, root {:p}", dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LIN_HIGH, LIN_USER, PDX_SHIFT};
    use crate::test_util::setup;
    use alloc::boxed::Box;
    use test_support::mock::mm::{MOCK_MM_OPS, MmuEvent};

    #[test]
    fn test_boot_directory_layout() {
        let dir = Box::new(PageDirectory::new());
        build_boot_directory(&dir);

        assert_eq!(dir.entry(0).bits(), 0x0000_0183);
        assert_eq!(dir.entry(1).bits(), 0x0040_0183);
        assert_eq!(dir.entry(NPDENTRIES - 1).bits(), 0xFFC0_0183);
        assert!(dir.entry(LIN_USER >> PDX_SHIFT).is_empty());
        assert!(dir.entry((LIN_HIGH >> PDX_SHIFT) - 1).is_empty());
        assert!(dir.entry(LIN_HIGH >> PDX_SHIFT).is_huge());
    }

    #[test]
    fn test_bootstrap_sequence() {
        setup();
        let dir = Box::new(PageDirectory::new());
        MOCK_MM_OPS.take_events();

        // SAFETY: 测试中的 MMU 操作只被记录
        unsafe { bootstrap(&dir, true, 0x0010_2345) };
        assert_eq!(
            MOCK_MM_OPS.take_events(),
            [
                MmuEvent::EnableLargePages,
                MmuEvent::LoadRoot(&*dir as *const PageDirectory as usize),
                MmuEvent::EnablePaging,
            ]
        );
    }

    #[test]
    fn test_secondary_cpu_reuses_directory() {
        setup();
        let dir = Box::new(PageDirectory::new());
        build_boot_directory(&dir);
        // 其他 CPU 不重建，目录中已有的内容保持不变
        dir.set_entry(2, PageTableEntry::superpage(Laddr(0x0080_0000), PteFlags::PRESENT));
        unsafe { bootstrap(&dir, false, 0x0010_0000) };
        assert_eq!(dir.entry(2).bits(), 0x0080_0081);
    }

    #[test]
    #[should_panic(expected = "not identity mapped")]
    fn test_bootstrap_rejects_unmapped_code() {
        setup();
        let dir = Box::new(PageDirectory::new());
        unsafe { bootstrap(&dir, true, LIN_USER + 0x1000) };
    }
}
