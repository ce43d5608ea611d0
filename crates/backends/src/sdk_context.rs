//! 进程级 SDK 上下文
//!
//! 引用计数：第一次 acquire 执行全局初始化，最后一个 guard 释放时执行全局关闭。

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, info};

#[derive(Debug, Default)]
struct State {
    refs: usize,
    inits: u64,
    shutdowns: u64,
}

/// 引用计数的 SDK 上下文句柄
#[derive(Debug, Clone, Default)]
pub struct SdkContext {
    state: Arc<Mutex<State>>,
}

impl SdkContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance
    pub fn global() -> &'static SdkContext {
        static GLOBAL: OnceLock<SdkContext> = OnceLock::new();
        GLOBAL.get_or_init(SdkContext::new)
    }

    /// 获取上下文；guard 析构时释放
    pub fn acquire(&self) -> SdkContextGuard {
        let mut state = self.lock();
        if state.refs == 0 {
            state.inits += 1;
            info!(inits = state.inits, "sdk context initialized");
        }
        state.refs += 1;
        debug!(refs = state.refs, "sdk context acquired");
        SdkContextGuard {
            context: self.clone(),
        }
    }

    pub fn ref_count(&self) -> usize {
        self.lock().refs
    }

    pub fn init_count(&self) -> u64 {
        self.lock().inits
    }

    pub fn shutdown_count(&self) -> u64 {
        self.lock().shutdowns
    }

    fn release(&self) {
        let mut state = self.lock();
        state.refs = state.refs.saturating_sub(1);
        debug!(refs = state.refs, "sdk context released");
        if state.refs == 0 {
            state.shutdowns += 1;
            info!(shutdowns = state.shutdowns, "sdk context shut down");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII guard; dropping it releases one reference
#[derive(Debug)]
pub struct SdkContextGuard {
    context: SdkContext,
}

impl Drop for SdkContextGuard {
    fn drop(&mut self) {
        self.context.release();
    }
}
