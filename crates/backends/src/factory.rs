//! 后端工厂
//!
//! 按名称创建后端、探测可用性、解析设备选择器。

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{
    BackendError, CameraBackend, CaptureClock, DeviceSelector, FrameSample, ParamApplied,
    ResolvedDevice, ScenarioModel,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::discovery::{discover_real, discover_webcams};
use crate::environment::BackendEnvironment;
use crate::real_stub::RealStubBackend;
use crate::sdk_context::SdkContext;
use crate::sim::SimBackend;
use crate::synth::Pacing;
use crate::webcam::WebcamBackend;

pub const REAL_DISABLED_REASON: &str = "real backend disabled at build time";

/// 后端种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Sim,
    /// Vendor SDK adapter; never compiled into this build
    Real,
    RealStub,
    Webcam,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [Self::Sim, Self::Real, Self::RealStub, Self::Webcam];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Real => "real",
            Self::RealStub => "real_stub",
            Self::Webcam => "webcam",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Backends that address a physical device
    pub fn needs_device(self) -> bool {
        !matches!(self, Self::Sim)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `list-backends` 输出行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendAvailability {
    pub name: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 统一分发的后端
pub enum Backend {
    Sim(SimBackend),
    RealStub(RealStubBackend),
    Webcam(WebcamBackend),
}

impl CameraBackend for Backend {
    fn name(&self) -> &str {
        match self {
            Self::Sim(b) => b.name(),
            Self::RealStub(b) => b.name(),
            Self::Webcam(b) => b.name(),
        }
    }

    async fn connect(&mut self) -> Result<(), BackendError> {
        match self {
            Self::Sim(b) => b.connect().await,
            Self::RealStub(b) => b.connect().await,
            Self::Webcam(b) => b.connect().await,
        }
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        match self {
            Self::Sim(b) => b.start().await,
            Self::RealStub(b) => b.start().await,
            Self::Webcam(b) => b.start().await,
        }
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        match self {
            Self::Sim(b) => b.stop().await,
            Self::RealStub(b) => b.stop().await,
            Self::Webcam(b) => b.stop().await,
        }
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<ParamApplied, BackendError> {
        match self {
            Self::Sim(b) => b.set_param(key, value),
            Self::RealStub(b) => b.set_param(key, value),
            Self::Webcam(b) => b.set_param(key, value),
        }
    }

    fn dump_config(&self) -> BTreeMap<String, String> {
        match self {
            Self::Sim(b) => b.dump_config(),
            Self::RealStub(b) => b.dump_config(),
            Self::Webcam(b) => b.dump_config(),
        }
    }

    async fn pull_frames(&mut self, duration: Duration) -> Result<Vec<FrameSample>, BackendError> {
        match self {
            Self::Sim(b) => b.pull_frames(duration).await,
            Self::RealStub(b) => b.pull_frames(duration).await,
            Self::Webcam(b) => b.pull_frames(duration).await,
        }
    }
}

/// 后端工厂
#[derive(Debug, Clone)]
pub struct BackendFactory {
    env: BackendEnvironment,
    pacing: Pacing,
    sdk: SdkContext,
}

impl BackendFactory {
    /// Real-time pacing, process-wide SDK context
    pub fn new(env: BackendEnvironment) -> Self {
        Self {
            env,
            pacing: Pacing::RealTime,
            sdk: SdkContext::global().clone(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_sdk_context(mut self, sdk: SdkContext) -> Self {
        self.sdk = sdk;
        self
    }

    pub fn environment(&self) -> &BackendEnvironment {
        &self.env
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// 探测所有后端
    pub fn availability(&self) -> Vec<BackendAvailability> {
        BackendKind::ALL
            .into_iter()
            .map(|kind| {
                let reason = match kind {
                    BackendKind::Sim => None,
                    BackendKind::Real => Some(REAL_DISABLED_REASON.to_string()),
                    BackendKind::RealStub => discover_real(&self.env).err().map(|e| e.detail()),
                    BackendKind::Webcam => discover_webcams(&self.env).err().map(|e| e.detail()),
                };
                BackendAvailability {
                    name: kind.as_str(),
                    available: reason.is_none(),
                    reason,
                }
            })
            .collect()
    }

    /// 枚举设备 (sim 无设备)
    pub fn list_devices(&self, kind: BackendKind) -> Result<Vec<ResolvedDevice>, BackendError> {
        match kind {
            BackendKind::Sim => Ok(Vec::new()),
            BackendKind::Real => Err(BackendError::not_available(REAL_DISABLED_REASON)),
            BackendKind::RealStub => Ok(discover_real(&self.env)?
                .into_iter()
                .enumerate()
                .map(|(index, info)| ResolvedDevice::Real { info, index })
                .collect()),
            BackendKind::Webcam => Ok(discover_webcams(&self.env)?
                .into_iter()
                .enumerate()
                .map(|(index, device)| ResolvedDevice::Webcam { device, index })
                .collect()),
        }
    }

    /// 按选择器解析设备；无选择器时取第一个
    #[instrument(name = "backend_resolve_device", skip(self, selector), fields(backend = %kind))]
    pub fn resolve_device(
        &self,
        kind: BackendKind,
        selector: Option<&DeviceSelector>,
    ) -> Result<Option<ResolvedDevice>, BackendError> {
        if !kind.needs_device() {
            return Ok(None);
        }

        let devices = self.list_devices(kind)?;
        if devices.is_empty() {
            return Err(BackendError::device("no connected camera found"));
        }

        let selector = match selector.filter(|s| !s.is_empty()) {
            Some(selector) => selector,
            None => {
                debug!(discovered = devices.len(), "no selector, using first device");
                return Ok(devices.into_iter().next());
            }
        };

        if let Some(index) = selector.index {
            if index as usize >= devices.len() {
                return Err(BackendError::device(format!(
                    "device index {index} out of range ({} discovered)",
                    devices.len()
                )));
            }
        }

        let resolved = devices
            .into_iter()
            .find(|device| match device {
                ResolvedDevice::Real { info, index } => selector.matches_real(*index, info),
                ResolvedDevice::Webcam { device, index } => selector.matches_webcam(*index, device),
            })
            .ok_or_else(|| {
                BackendError::device(format!("no device matched selector '{selector}'"))
            })?;

        info!(selector = %selector, "device resolved");
        Ok(Some(resolved))
    }

    /// 创建后端实例
    pub fn create(
        &self,
        kind: BackendKind,
        scenario: &ScenarioModel,
        device: Option<&ResolvedDevice>,
        clock: CaptureClock,
    ) -> Result<Backend, BackendError> {
        match (kind, device) {
            (BackendKind::Sim, _) => Ok(Backend::Sim(SimBackend::from_scenario(
                scenario,
                clock,
                self.pacing,
            ))),
            (BackendKind::Real, _) => Err(BackendError::not_available(REAL_DISABLED_REASON)),
            (BackendKind::RealStub, Some(ResolvedDevice::Real { info, .. })) => Ok(
                Backend::RealStub(RealStubBackend::new(info.clone(), clock, self.pacing, self.sdk.clone())),
            ),
            (BackendKind::Webcam, Some(ResolvedDevice::Webcam { device, .. })) => Ok(
                Backend::Webcam(WebcamBackend::new(device.clone(), clock, self.pacing)),
            ),
            (kind, _) => Err(BackendError::device(format!(
                "no connected camera found for backend '{kind}'"
            ))),
        }
    }
}
