//! Localization service payloads.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Bearer credential returned by the auth endpoint. Zeroized on drop; never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    /// Expiry as reported by the service. Informational only; nothing renews on it.
    pub expires_on: Option<String>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_on: Option<String>) -> Self {
        Self {
            value: value.into(),
            expires_on,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub(crate) fn bearer_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Auth endpoint response. The token may come under either name.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default, rename = "expiresOn")]
    pub expires_on: Option<String>,
}

impl AuthResponse {
    pub fn into_token(self) -> Option<AccessToken> {
        let non_empty = |token: &String| !token.is_empty();
        self.token
            .filter(non_empty)
            .or(self.access_token.filter(non_empty))
            .map(|token| AccessToken::new(token, self.expires_on))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Query endpoint response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizeResponse {
    #[serde(rename = "poseFound", default)]
    pub pose_found: bool,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quaternion,
    #[serde(default)]
    pub retrieval_scores: Vec<f64>,
    #[serde(default)]
    pub num_matches: Vec<u32>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub retrieved_imgs: Vec<String>,
    #[serde(rename = "mapIds", default)]
    pub map_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapResolution {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Map metadata. Fields the service adds later land in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDetails {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub map_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub map_mesh: Option<serde_json::Value>,
    #[serde(default)]
    pub resolution: Option<MapResolution>,
    #[serde(default)]
    pub camera_intrinsics: Option<serde_json::Value>,
    #[serde(default)]
    pub storage: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MapDetails {
    pub fn display_name(&self) -> Option<&str> {
        self.map_name.as_deref().or(self.name.as_deref())
    }
}

/// Pose plus best-effort enrichment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationResult {
    pub localize_data: LocalizeResponse,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub map_details: Option<MapDetails>,
}
