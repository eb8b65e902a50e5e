use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the image behind a stored capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "capture_source")]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[sea_orm(string_value = "device")]
    Device,
    #[sea_orm(string_value = "upload")]
    Upload,
    #[sea_orm(string_value = "detector_crop")]
    DetectorCrop,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSource::Device => "device",
            CaptureSource::Upload => "upload",
            CaptureSource::DetectorCrop => "detector_crop",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
