use std::{ffi::c_void, ptr};

use log::warn;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

/// fork しても親子で共有される無名メモリ (MAP_SHARED | MAP_ANONYMOUS)。
/// 中身はゼロで初期化されている
pub struct Segment {
    ptr: *mut u8,
    len: usize,
}

// 中に置くのはアトミック変数とセマフォだけ
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    pub fn map(len: usize) -> nix::Result<Self> {
        let ptr = unsafe {
            mmap(
                ptr::null_mut(),
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_ANONYMOUS,
                -1,
                0,
            )?
        };
        Ok(Segment {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    /// offset は T のアラインメントに揃っていて、T の大きさ分が領域内に収まること
    pub unsafe fn at<T>(&self, offset: usize) -> *mut T {
        debug_assert!(offset < self.len);
        self.ptr.add(offset) as *mut T
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.ptr as *mut c_void, self.len) } {
            warn!("munmap of shared segment failed: {}", e);
        }
    }
}
