//! 组件级串行闸门：每个组件一把可重入锁加一个收件箱。
//!
//! 持有闸门的线程按 FIFO 处理收件箱，直到清空。其他线程投递的工作若遇到
//! 闸门被占用，只入队不等待，由持有者代为处理；每次释放闸门后都会重查收件箱，
//! 不会遗留工作。同一线程在处理中再次投递给自己时同样只入队。
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::{cell::Cell, collections::VecDeque, time::Duration};

thread_local! {
    // 当前线程正在处理的闸门层数
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// 当前线程是否处于某个闸门的处理过程中（即用户回调之内）
pub(crate) fn in_drain() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

/// 获取闸门的方式
#[derive(Clone, Copy, Debug)]
pub(crate) enum Acquire {
    /// 被占用即放弃
    Try,
    /// 最多等待给定时长
    Wait(Duration),
}

struct Draining<'a>(&'a Cell<bool>);

impl<'a> Draining<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        DEPTH.with(|d| d.set(d.get() + 1));
        Self(flag)
    }
}

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
        self.0.set(false);
    }
}

pub(crate) struct Gate<W> {
    // true 表示持锁线程正在处理
    lock: ReentrantMutex<Cell<bool>>,
    inbox: Mutex<VecDeque<W>>,
}

impl<W> Default for Gate<W> {
    fn default() -> Self {
        Self {
            lock: ReentrantMutex::new(Cell::new(false)),
            inbox: Mutex::new(VecDeque::new()),
        }
    }
}

impl<W> Gate<W> {
    pub fn post(&self, work: W) {
        self.inbox.lock().push_back(work);
    }

    fn pop(&self) -> Option<W> {
        self.inbox.lock().pop_front()
    }

    fn acquire(&self, how: Acquire) -> Option<ReentrantMutexGuard<'_, Cell<bool>>> {
        match how {
            Acquire::Try => self.lock.try_lock(),
            Acquire::Wait(timeout) => self.lock.try_lock_for(timeout),
        }
    }

    /// 持闸门执行 `f`，随后经 `apply` 清空收件箱。
    /// 本线程已持有时就地执行，收件箱留给外层处理；取不到闸门返回 `None`，
    /// 已投递的工作由持有者处理。
    pub fn run<R>(&self, how: Acquire, apply: &impl Fn(W), f: impl FnOnce() -> R) -> Option<R> {
        let out = {
            let guard = self.acquire(how)?;
            if guard.get() {
                return Some(f());
            }
            let _draining = Draining::enter(&guard);
            let out = f();
            while let Some(work) = self.pop() {
                apply(work);
            }
            out
        };
        self.kick(apply);
        Some(out)
    }

    /// 释放后重查收件箱；闸门被他人持有时由对方处理
    pub fn kick(&self, apply: &impl Fn(W)) {
        while !self.inbox.lock().is_empty() {
            let Some(guard) = self.lock.try_lock() else {
                return;
            };
            if guard.get() {
                return;
            }
            let _draining = Draining::enter(&guard);
            while let Some(work) = self.pop() {
                apply(work);
            }
        }
    }
}
