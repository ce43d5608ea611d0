//! 设备描述与选择器
//!
//! Discovery itself lives with the backends; these are the shared shapes.

use serde::{Deserialize, Serialize};

/// 工业相机设备信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
    pub user_id: String,
    pub transport: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}

impl DeviceInfo {
    pub fn is_gige(&self) -> bool {
        let transport = self.transport.to_ascii_lowercase();
        transport.contains("gige") || transport.contains("gev")
    }
}

/// 网络摄像头设备信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebcamDevice {
    pub device_id: String,
    pub friendly_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_index: Option<u32>,
}

/// Parsed `--device` selector
///
/// Real backends use `serial` / `user_id` / `index`; webcams use `id` /
/// `index` / `name_contains`. The grammar enforces which keys are legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
}

impl DeviceSelector {
    pub fn is_empty(&self) -> bool {
        self.serial.is_none()
            && self.user_id.is_none()
            && self.index.is_none()
            && self.id.is_none()
            && self.name_contains.is_none()
    }

    pub fn matches_real(&self, position: usize, device: &DeviceInfo) -> bool {
        self.serial.as_deref().is_none_or(|s| s == device.serial)
            && self.user_id.as_deref().is_none_or(|u| u == device.user_id)
            && self.index.is_none_or(|i| i as usize == position)
    }

    pub fn matches_webcam(&self, position: usize, device: &WebcamDevice) -> bool {
        let needle = self.name_contains.as_deref().map(str::to_ascii_lowercase);
        self.id.as_deref().is_none_or(|id| id == device.device_id)
            && self.index.is_none_or(|i| i as usize == position)
            && needle.is_none_or(|n| device.friendly_name.to_ascii_lowercase().contains(&n))
    }
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut clauses = Vec::new();
        if let Some(serial) = &self.serial {
            clauses.push(format!("serial:{serial}"));
        }
        if let Some(user_id) = &self.user_id {
            clauses.push(format!("user_id:{user_id}"));
        }
        if let Some(id) = &self.id {
            clauses.push(format!("id:{id}"));
        }
        if let Some(index) = self.index {
            clauses.push(format!("index:{index}"));
        }
        if let Some(name) = &self.name_contains {
            clauses.push(format!("name_contains:{name}"));
        }
        f.write_str(&clauses.join(","))
    }
}

/// 解析后的设备
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedDevice {
    Real {
        #[serde(flatten)]
        info: DeviceInfo,
        index: usize,
    },
    Webcam {
        #[serde(flatten)]
        device: WebcamDevice,
        index: usize,
    },
}
