use std::sync::{Condvar, Mutex};

use log::trace;

/// スレッド版の箸。誰が持っているかを覚えている排他ロック
///
/// 取得と解放が別の関数呼び出しになるので、MutexGuard を持ち回る代わりに
/// 持ち主の席番号を Mutex で守り、空くまで Condvar で待つ。
#[derive(Debug)]
pub struct Fork {
    id: usize,
    owner: Mutex<Option<usize>>,
    cond: Condvar,
}

impl Fork {
    pub fn new(id: usize) -> Self {
        Fork {
            id,
            owner: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn take(&self, seat: usize) {
        let mut owner = self.owner.lock().unwrap();
        while owner.is_some() {
            owner = self.cond.wait(owner).unwrap();
        }
        *owner = Some(seat);
        trace!("fork {} taken by philosopher {}", self.id, seat);
    }

    // 持っていない席が置こうとしたら不変条件違反
    pub fn put(&self, seat: usize) {
        let mut owner = self.owner.lock().unwrap();
        assert_eq!(
            *owner,
            Some(seat),
            "fork {} put down by philosopher {} but held by {:?}",
            self.id,
            seat,
            *owner
        );
        *owner = None;
        self.cond.notify_one();
        trace!("fork {} put down by philosopher {}", self.id, seat);
    }

    pub fn owner(&self) -> Option<usize> {
        *self.owner.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn test_take_and_put() {
        let fork = Fork::new(3);
        assert_eq!(fork.owner(), None);
        fork.take(2);
        assert_eq!(fork.owner(), Some(2));
        fork.put(2);
        assert_eq!(fork.owner(), None);
    }

    #[test]
    #[should_panic(expected = "held by Some(1)")]
    fn test_put_by_stranger() {
        let fork = Fork::new(0);
        fork.take(1);
        fork.put(0);
    }

    #[test]
    #[should_panic(expected = "held by None")]
    fn test_put_twice() {
        let fork = Fork::new(0);
        fork.take(1);
        fork.put(1);
        fork.put(1);
    }

    #[test]
    fn test_take_waits_for_owner() {
        let fork = Arc::new(Fork::new(0));
        fork.take(0);

        let fork0 = fork.clone();
        let t = thread::spawn(move || {
            fork0.take(1);
            fork0.owner()
        });

        thread::sleep(Duration::from_millis(20));
        // まだ 0 が持っている
        assert_eq!(fork.owner(), Some(0));
        fork.put(0);

        assert_eq!(t.join().unwrap(), Some(1));
    }
}
