//! # Backends
//!
//! 相机后端实现与工厂。
//!
//! ## 变体
//!
//! - `sim`: 确定性仿真，支持故障注入 (`sim_faults`)
//! - `real`: 厂商 SDK 适配器，本构建未编译，始终不可用
//! - `real_stub`: 设备来自 `LABOPS_REAL_DEVICE_FIXTURE`，节点映射 + 占位帧
//! - `webcam`: 设备来自 `LABOPS_WEBCAM_DEVICE_FIXTURE`
//!
//! ## 使用示例
//!
//! ```ignore
//! use backends::{BackendEnvironment, BackendFactory, BackendKind};
//! use contracts::CameraBackend;
//!
//! let factory = BackendFactory::new(BackendEnvironment::from_env());
//! let mut backend = factory.create(BackendKind::Sim, &scenario, None, clock)?;
//! backend.connect().await?;
//! backend.start().await?;
//! let frames = backend.pull_frames(Duration::from_millis(200)).await?;
//! ```

mod discovery;
mod environment;
mod factory;
mod real_stub;
mod script;
mod sdk_context;
mod sim;
mod synth;
mod webcam;

pub use discovery::{discover_real, discover_webcams};
pub use environment::{
    BackendEnvironment, DEFAULT_WEBCAM_MAX_CAPTURE_INDEX, REAL_DEVICE_FIXTURE_VAR,
    WEBCAM_DEVICE_FIXTURE_VAR, WEBCAM_MAX_CAPTURE_INDEX_VAR,
};
pub use factory::{Backend, BackendAvailability, BackendFactory, BackendKind, REAL_DISABLED_REASON};
pub use real_stub::{node_name, RealStubBackend};
pub use script::{render_script, script_offsets, ScriptStep};
pub use sdk_context::{SdkContext, SdkContextGuard};
pub use sim::SimBackend;
pub use synth::Pacing;
pub use webcam::WebcamBackend;
