//! # Lifecycle
//!
//! 后端生命周期：错误分类、断线重连、流状态机。
//!
//! ```ignore
//! use lifecycle::{classify, execute_reconnect, remaining};
//!
//! let budget = remaining(max_attempts, used);
//! let outcome = execute_reconnect(&mut backend, budget, used).await;
//! if !outcome.reconnected {
//!     eprintln!("{}", outcome.last_error.unwrap_or_default());
//! }
//! ```

mod classifier;
mod reconnect;
mod state;

pub use classifier::{classify, classify_code, collapse_whitespace, ClassifiedError, ErrorCode};
pub use reconnect::{
    execute_reconnect, is_likely_disconnect, remaining, ReconnectOutcome, RECONNECT_EXHAUSTED,
};
pub use state::{InvalidTransition, StreamEvent, StreamState, StreamStateMachine};
