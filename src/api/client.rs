use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::events::{SessionEvent, TerminationReason};
use super::request::{PreparedRequest, RequestOptions};
use crate::config::ClientConfig;
use crate::error::{ApiError, RefreshError, Result};
use crate::models::{rejected_envelope, RefreshRequest, TokenGrant};
use crate::session::{Clock, CookieMirror, SystemClock, TokenManager, TokenStore};

pub const REFRESH_PATH: &str = "/auth/refresh-token";

const EVENT_CAPACITY: usize = 16;

/// Outcome of the most recent refresh, shared with requests that queued behind it.
#[derive(Default)]
struct RefreshSlot {
    last: Option<std::result::Result<String, RefreshError>>,
}

/// How a request that hit 401 came by its next token.
enum RefreshOutcome {
    /// This request called the refresh endpoint itself.
    Ran(Result<String>),
    /// Another request's refresh, whose failure has already ended the session.
    Shared(std::result::Result<String, RefreshError>),
}

/// HTTP client for the admin API.
///
/// Attaches the bearer token to every request, and on a 401 refreshes the
/// token once and re-issues the request once.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
    coalesce_refresh: bool,
    refresh_slot: Mutex<RefreshSlot>,
    refresh_epoch: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    coalesce_refresh: bool,
    mirror_cookie: bool,
}

impl ApiClientBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When disabled, every request that hits a 401 runs its own refresh.
    pub fn coalesce_refresh(mut self, enabled: bool) -> Self {
        self.coalesce_refresh = enabled;
        self
    }

    pub fn mirror_cookie(mut self, enabled: bool) -> Self {
        self.mirror_cookie = enabled;
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| ApiError::Config(format!("invalid base URL {}: {}", self.config.base_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header_name(&self.config.api_key_header)?,
            header_value(&self.config.api_key)?,
        );
        for (name, value) in &self.config.default_headers {
            headers.insert(header_name(name)?, header_value(value)?);
        }

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.config.timeout)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut tokens = TokenManager::new(self.store).with_clock(self.clock);
        if self.mirror_cookie {
            tokens = tokens.with_mirror(Arc::new(CookieMirror::new(jar, base)));
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(ApiClient {
            http,
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            tokens,
            coalesce_refresh: self.coalesce_refresh,
            refresh_slot: Mutex::new(RefreshSlot::default()),
            refresh_epoch: AtomicU64::new(0),
            events,
        })
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ApiError::InvalidHeader(format!("{}: {}", name, e)))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Race `fut` against the caller's cancellation token.
async fn cancellable<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::Cancelled),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

impl ApiClient {
    pub fn builder(config: ClientConfig, store: Arc<dyn TokenStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store,
            clock: Arc::new(SystemClock),
            coalesce_refresh: true,
            mirror_cookie: true,
        }
    }

    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::builder(config, store).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Subscribe to session events. Termination is the cue to send the user to sign-in.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None, RequestOptions::default())
            .await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.send(Method::GET, path, None, options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn post_with<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
        options: RequestOptions,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(body), options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put_with<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
        options: RequestOptions,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, Some(body), options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch_with<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + ?Sized),
        options: RequestOptions,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, Some(body), options).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.send(Method::DELETE, path, None, options).await
    }

    /// Issue a request through the full pipeline and decode the body as `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T> {
        let request = PreparedRequest {
            method,
            url: self.url_for(path),
            body,
            headers: options.headers,
        };
        let span = tracing::debug_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %path,
        );

        let value = self
            .execute(&request, options.cancel.as_ref())
            .instrument(span)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn execute(
        &self,
        request: &PreparedRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let token = self.tokens.token_for_request().await?;
        let epoch = self.refresh_epoch.load(Ordering::Acquire);
        let (status, body) = self.dispatch(request, token.as_deref(), cancel).await?;

        if status != StatusCode::UNAUTHORIZED {
            return finish(status, &body);
        }

        tracing::debug!("received 401, refreshing access token");
        let fresh = self.recover(token.as_deref(), epoch, cancel).await?;

        tracing::debug!("retrying request with refreshed token");
        let (status, body) = self.dispatch(request, Some(&fresh), cancel).await?;
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("request still unauthorized after refresh");
        }
        finish(status, &body)
    }

    /// Send one attempt of `request` with the given bearer token, no recovery.
    pub(crate) async fn dispatch(
        &self,
        request: &PreparedRequest,
        token: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(StatusCode, String)> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, bearer(token)?);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        cancellable(cancel, async {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok((status, text))
        })
        .await
    }

    /// Obtain a fresh token after a 401, or end the session.
    async fn recover(
        &self,
        failed_token: Option<&str>,
        observed_epoch: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let outcome = if self.coalesce_refresh {
            self.coalesced_refresh(failed_token, observed_epoch, cancel)
                .await?
        } else {
            RefreshOutcome::Ran(self.refresh_with_transport(cancel).await)
        };

        match outcome {
            RefreshOutcome::Ran(Ok(token)) | RefreshOutcome::Shared(Ok(token)) => Ok(token),
            // The request that ran this refresh already ended the session.
            RefreshOutcome::Shared(Err(err)) => Err(err.into()),
            RefreshOutcome::Ran(Err(ApiError::Cancelled)) => Err(ApiError::Cancelled),
            RefreshOutcome::Ran(Err(err)) => {
                self.terminate(TerminationReason::RefreshFailed, &err).await;
                Err(err)
            }
        }
    }

    /// Run at most one refresh at a time; late arrivals reuse its outcome.
    async fn coalesced_refresh(
        &self,
        failed_token: Option<&str>,
        observed_epoch: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<RefreshOutcome> {
        let mut slot = cancellable(cancel, async { Ok(self.refresh_slot.lock().await) }).await?;

        if self.refresh_epoch.load(Ordering::Acquire) != observed_epoch {
            if let Some(last) = &slot.last {
                tracing::debug!(ok = last.is_ok(), "reusing outcome of concurrent refresh");
                return Ok(RefreshOutcome::Shared(last.clone()));
            }
        }

        if let Some(current) = self.tokens.access_token().await {
            if Some(current.as_str()) != failed_token && self.tokens.is_token_valid().await {
                tracing::debug!("token already rotated, skipping refresh");
                return Ok(RefreshOutcome::Shared(Ok(current)));
            }
        }

        let result = self.refresh_with_transport(cancel).await;
        if matches!(result, Err(ApiError::Cancelled)) {
            return Err(ApiError::Cancelled);
        }
        slot.last = Some(shareable(&result));
        self.refresh_epoch.fetch_add(1, Ordering::AcqRel);
        Ok(RefreshOutcome::Ran(result))
    }

    /// Explicitly refresh the access token with the stored refresh token.
    ///
    /// Failures are returned without ending the session.
    pub async fn refresh(&self) -> Result<()> {
        if self.coalesce_refresh {
            let mut slot = self.refresh_slot.lock().await;
            let result = self.refresh_with_transport(None).await;
            slot.last = Some(shareable(&result));
            self.refresh_epoch.fetch_add(1, Ordering::AcqRel);
            result.map(|_| ())
        } else {
            self.refresh_with_transport(None).await.map(|_| ())
        }
    }

    /// Call the refresh endpoint on the bare transport, outside the 401 pipeline.
    async fn refresh_with_transport(&self, cancel: Option<&CancellationToken>) -> Result<String> {
        let refresh_token = self
            .tokens
            .refresh_token()?
            .ok_or(RefreshError::NoRefreshToken)?;

        let request = self
            .http
            .post(self.url_for(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            });

        let (status, text) = cancellable(cancel, async {
            let response = request
                .send()
                .await
                .map_err(|e| RefreshError::Transport(ApiError::from(e).message()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| RefreshError::Transport(e.to_string()))?;
            Ok((status, text))
        })
        .await?;

        if !status.is_success() {
            let message = ApiError::from_response(status, &text).message();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;
        if let Some(rejected) = rejected_envelope(status.as_u16(), &body) {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: rejected.message(),
            }
            .into());
        }

        let grant = TokenGrant::from_response(&body, self.tokens.now())?;
        self.tokens.apply_grant(&grant).await?;
        tracing::debug!("access token refreshed");
        self.emit(SessionEvent::Refreshed);
        Ok(grant.access_token)
    }

    /// Clear every credential, then tell subscribers the session is over.
    pub(crate) async fn terminate(&self, reason: TerminationReason, cause: &ApiError) {
        tracing::warn!(%reason, error = %cause, "session terminated");
        if let Err(e) = self.tokens.clear_session().await {
            tracing::error!(error = %e, "failed to clear stored session");
        }
        self.emit(SessionEvent::Terminated { reason });
    }

    pub async fn set_token(
        &self,
        token: &str,
        expiry: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        self.tokens.set_token(token, expiry).await
    }

    pub async fn clear_token(&self) -> Result<()> {
        self.tokens.clear_token().await
    }

    pub async fn is_token_valid(&self) -> bool {
        self.tokens.is_token_valid().await
    }
}

fn shareable(result: &Result<String>) -> std::result::Result<String, RefreshError> {
    match result {
        Ok(token) => Ok(token.clone()),
        Err(ApiError::Refresh(err)) => Err(err.clone()),
        Err(other) => Err(RefreshError::Transport(other.to_string())),
    }
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| ApiError::InvalidHeader(format!("authorization: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Turn a completed response into a JSON body or a normalized error.
pub(crate) fn finish(status: StatusCode, body: &str) -> Result<Value> {
    if !status.is_success() {
        return Err(ApiError::from_response(status, body));
    }

    let value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body)?
    };

    match rejected_envelope(status.as_u16(), &value) {
        Some(err) => Err(err),
        None => Ok(value),
    }
}
