use std::cell::UnsafeCell;

use nix::errno::Errno;

/// プロセス間で共有できる POSIX セマフォ (sem_init の pshared = 1)
///
/// 共有メモリ上に置いて使う。値が 1 なら mutex、0 なら待ち合わせ用。
#[repr(transparent)]
pub struct ProcessSemaphore {
    sem: UnsafeCell<libc::sem_t>,
}

// sem_t の操作自体がプロセス・スレッド間で安全
unsafe impl Sync for ProcessSemaphore {}
unsafe impl Send for ProcessSemaphore {}

impl ProcessSemaphore {
    /// # Safety
    /// 共有メモリ上の、まだ初期化していない領域に対して 1 度だけ呼ぶ
    pub unsafe fn init(&self, value: u32) -> nix::Result<()> {
        Errno::result(libc::sem_init(self.sem.get(), 1, value)).map(drop)
    }

    /// # Safety
    /// init 済みで、もう誰も待っていないこと
    pub unsafe fn destroy(&self) {
        libc::sem_destroy(self.sem.get());
    }

    // P 操作。シグナルで割り込まれたらやり直す
    pub fn wait(&self) {
        loop {
            if unsafe { libc::sem_wait(self.sem.get()) } == 0 {
                return;
            }
            let errno = Errno::last();
            if errno != Errno::EINTR {
                panic!("sem_wait: {}", errno);
            }
        }
    }

    // V 操作
    pub fn post(&self) {
        if unsafe { libc::sem_post(self.sem.get()) } != 0 {
            panic!("sem_post: {}", Errno::last());
        }
    }

    pub fn value(&self) -> i32 {
        let mut v = 0;
        if unsafe { libc::sem_getvalue(self.sem.get(), &mut v) } != 0 {
            panic!("sem_getvalue: {}", Errno::last());
        }
        v
    }
}
