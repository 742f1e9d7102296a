//! Localization client.
//!
//! Owns the access token and the localization request/response cycle:
//! - `authorize`: client credentials in, bearer token out
//! - `localize_with_frame`: one multipart query per captured frame
//! - `fetch_map_details`: map metadata, chained best-effort after a found pose
//!
//! Failure policy: authorization failures reject and notify. Localization and
//! map-detail failures notify and resolve to `None` / a partial result, so one bad
//! round-trip never takes down the capture loop. Nothing is retried here.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub mod multipart;
pub mod transport;
pub mod types;

pub use multipart::{LocalizeRequest, MapTarget, MultipartForm};
pub use transport::{Body, HttpRequest, HttpResponse, HttpTransport, Method, UreqTransport};
pub use types::{
    AccessToken, LocalizationResult, LocalizeResponse, MapDetails, Quaternion, Vec3,
};

use crate::capture::{CameraIntrinsics, CapturedFrame};
use crate::config::LocalizerConfig;
use crate::error::{classify, LocalizeError};
use types::AuthResponse;

type Hook<T> = Option<Box<dyn Fn(&T) + Send + Sync>>;

/// Observability callbacks. All optional.
#[derive(Default)]
pub struct Notifications {
    pub on_authorize: Hook<AccessToken>,
    pub on_frame_captured: Hook<CapturedFrame>,
    pub on_camera_intrinsics: Hook<CameraIntrinsics>,
    pub on_pose_result: Hook<LocalizeResponse>,
    pub on_error: Hook<anyhow::Error>,
}

impl Notifications {
    pub fn on_authorize(mut self, f: impl Fn(&AccessToken) + Send + Sync + 'static) -> Self {
        self.on_authorize = Some(Box::new(f));
        self
    }

    pub fn on_frame_captured(
        mut self,
        f: impl Fn(&CapturedFrame) + Send + Sync + 'static,
    ) -> Self {
        self.on_frame_captured = Some(Box::new(f));
        self
    }

    pub fn on_camera_intrinsics(
        mut self,
        f: impl Fn(&CameraIntrinsics) + Send + Sync + 'static,
    ) -> Self {
        self.on_camera_intrinsics = Some(Box::new(f));
        self
    }

    pub fn on_pose_result(mut self, f: impl Fn(&LocalizeResponse) + Send + Sync + 'static) -> Self {
        self.on_pose_result = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&anyhow::Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn emit<T>(hook: &Hook<T>, value: &T) {
        if let Some(hook) = hook {
            hook(value);
        }
    }
}

pub struct LocalizationClient<T: HttpTransport = UreqTransport> {
    config: LocalizerConfig,
    transport: T,
    token: Option<AccessToken>,
    notifications: Notifications,
}

impl LocalizationClient<UreqTransport> {
    pub fn new(config: LocalizerConfig) -> Self {
        Self::with_transport(config, UreqTransport::default())
    }
}

impl<T: HttpTransport> LocalizationClient<T> {
    pub fn with_transport(config: LocalizerConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            token: None,
            notifications: Notifications::default(),
        }
    }

    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    pub fn is_authorized(&self) -> bool {
        self.token.is_some()
    }

    /// Exchanges the client credentials for an access token and keeps it.
    ///
    /// The token is never renewed here; an expired token shows up as a failed request.
    pub fn authorize(&mut self) -> Result<AccessToken> {
        match self.request_token() {
            Ok(token) => {
                log::info!("authorized client {}", self.config.client_id);
                Notifications::emit(&self.notifications.on_authorize, &token);
                self.token = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                log::warn!("authorization failed: {:#}", err);
                Notifications::emit(&self.notifications.on_error, &err);
                Err(err)
            }
        }
    }

    fn request_token(&self) -> Result<AccessToken> {
        let credentials = format!(
            "{}:{}",
            self.config.client_id,
            self.config.client_secret.expose()
        );
        let request = HttpRequest::new(Method::Post, &self.config.endpoints.auth_url)
            .header("Authorization", format!("Basic {}", BASE64.encode(credentials)));
        let response: AuthResponse = self
            .transport
            .send(request)
            .context("send authorization request")?
            .into_json("authorization")?;
        response.into_token().ok_or_else(|| {
            LocalizeError::Authorization("response has no token or access_token field".into())
                .into()
        })
    }

    /// Localizes one captured frame.
    ///
    /// `Ok(None)` covers both "no pose found" and absorbed transport failures; the
    /// latter are reported through `on_error`. Only a missing token rejects.
    pub fn localize_with_frame(
        &self,
        frame: &CapturedFrame,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Option<LocalizationResult>> {
        let token = self.require_token()?;

        Notifications::emit(&self.notifications.on_frame_captured, frame);
        Notifications::emit(&self.notifications.on_camera_intrinsics, intrinsics);

        let localize_data = match self.query(token, frame, intrinsics) {
            Ok(data) => data,
            Err(err) => {
                log::warn!("localization request failed: {:#}", err);
                Notifications::emit(&self.notifications.on_error, &err);
                return Ok(None);
            }
        };
        if !localize_data.pose_found {
            log::info!("no pose found for {}x{} frame", frame.width, frame.height);
            return Ok(None);
        }

        log::info!(
            "pose found: position=({:.3}, {:.3}, {:.3}) confidence={:.3}",
            localize_data.position.x,
            localize_data.position.y,
            localize_data.position.z,
            localize_data.confidence
        );
        Notifications::emit(&self.notifications.on_pose_result, &localize_data);

        let map_details = match localize_data.map_ids.first() {
            Some(map_id) => match self.map_details_with(token, map_id) {
                Ok(details) => Some(details),
                Err(err) => {
                    log::warn!("map details for {} unavailable: {:#}", map_id, err);
                    Notifications::emit(&self.notifications.on_error, &err);
                    None
                }
            },
            None => None,
        };

        Ok(Some(LocalizationResult {
            localize_data,
            map_details,
        }))
    }

    fn query(
        &self,
        token: &AccessToken,
        frame: &CapturedFrame,
        intrinsics: &CameraIntrinsics,
    ) -> Result<LocalizeResponse> {
        let target = MapTarget {
            map_type: self.config.map_type,
            code: self.config.code.clone(),
        };
        let form = LocalizeRequest::new(frame, intrinsics, &target).into_form();
        let request = HttpRequest::new(Method::Post, &self.config.endpoints.query_url)
            .header("Authorization", token.bearer_header())
            .body(Body::Multipart(form));
        self.transport
            .send(request)
            .context("send localization query")?
            .into_json("localization query")
    }

    /// Fetches metadata for one map. Requires a token.
    pub fn fetch_map_details(&self, map_id: &str) -> Result<MapDetails> {
        let token = self.require_token()?;
        self.map_details_with(token, map_id)
    }

    /// Sends a failure from outside the client through `on_error`.
    ///
    /// Errors the client raised itself were already reported and are skipped.
    pub(crate) fn report(&self, err: &anyhow::Error) {
        if classify(err) == Some(&LocalizeError::MissingToken) {
            return;
        }
        Notifications::emit(&self.notifications.on_error, err);
    }

    fn require_token(&self) -> Result<&AccessToken> {
        self.token.as_ref().ok_or_else(|| {
            let err = anyhow::Error::from(LocalizeError::MissingToken);
            Notifications::emit(&self.notifications.on_error, &err);
            err
        })
    }

    fn map_details_with(&self, token: &AccessToken, map_id: &str) -> Result<MapDetails> {
        let request = HttpRequest::new(Method::Get, self.config.endpoints.map_details_for(map_id))
            .header("Authorization", token.bearer_header());
        self.transport
            .send(request)
            .with_context(|| format!("fetch map details for {}", map_id))?
            .into_json("map details")
    }
}
