//! HTTP access to an ao-coverage server.

use crate::CliResult;
use clap::Args;
use reqwest::{Client, Url};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Server used when neither `--server-url` nor `AOCOV_SERVER_URL` is set.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the server lives.
#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Base URL of the ao-coverage server.
    #[arg(long, env = "AOCOV_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,
}

/// Status and body of a server response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl ServerReply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction for talking to the server.
pub(crate) trait ServerClient {
    fn post<'a>(
        &'a self,
        url: &'a Url,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = CliResult<ServerReply>> + Send + 'a>>;

    fn get<'a>(
        &'a self,
        url: &'a Url,
    ) -> Pin<Box<dyn Future<Output = CliResult<ServerReply>> + Send + 'a>>;
}

/// Reqwest-backed server client.
#[cfg_attr(test, allow(dead_code))]
pub(crate) struct ReqwestServerClient {
    client: Client,
}

impl ReqwestServerClient {
    #[cfg_attr(test, allow(dead_code))]
    pub(crate) fn new() -> CliResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("aocov-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl ServerClient for ReqwestServerClient {
    fn post<'a>(
        &'a self,
        url: &'a Url,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = CliResult<ServerReply>> + Send + 'a>> {
        Box::pin(async move { reply(self.client.post(url.clone()).body(body).send().await).await })
    }

    fn get<'a>(
        &'a self,
        url: &'a Url,
    ) -> Pin<Box<dyn Future<Output = CliResult<ServerReply>> + Send + 'a>> {
        Box::pin(async move { reply(self.client.get(url.clone()).send().await).await })
    }
}

/// Collect a response. URLs are stripped from errors since upload URLs carry
/// the token.
async fn reply(response: reqwest::Result<reqwest::Response>) -> CliResult<ServerReply> {
    let response = response.map_err(reqwest::Error::without_url)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(reqwest::Error::without_url)?;
    Ok(ServerReply { status, body })
}

/// Parse the base URL, dropping any trailing slash.
pub(crate) fn server_base(server_url: &str) -> CliResult<Url> {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("server url is required".into());
    }
    let url = Url::parse(trimmed).map_err(|err| format!("invalid server url {trimmed:?}: {err}"))?;
    if url.cannot_be_a_base() {
        return Err(format!("invalid server url {trimmed:?}").into());
    }
    Ok(url)
}

/// Append percent-encoded path segments to a base URL.
pub(crate) fn endpoint<'s>(
    base: &Url,
    segments: impl IntoIterator<Item = &'s str>,
) -> CliResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("invalid server url {base}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Check that the server answers its health check.
pub(crate) async fn check_health<C: ServerClient>(client: &C, server: &ServerArgs) -> CliResult<Url> {
    let base = server_base(&server.server_url)?;
    let url = endpoint(&base, ["v1", "health-check"])?;
    let reply = client.get(&url).await?;
    if reply.is_success() {
        Ok(base)
    } else {
        Err(format!("{base} is unhealthy (status {})", reply.status).into())
    }
}

/// Run `aocov health`.
#[cfg(not(test))]
pub async fn run_health(server: ServerArgs) -> CliResult<()> {
    let client = ReqwestServerClient::new()?;
    let base = check_health(&client, &server).await?;
    println!("{base} is healthy");
    Ok(())
}

/// Translate an upload response into a readable outcome.
pub(crate) fn check_upload_reply(reply: &ServerReply) -> CliResult<()> {
    if reply.is_success() {
        return Ok(());
    }
    let detail = reply.body.trim();
    let message = match reply.status {
        401 => "the server rejected the upload token".to_string(),
        406 => "the server does not accept this report format".to_string(),
        413 => "the report exceeds the server's upload limit".to_string(),
        400 => format!("the server rejected the report: {detail}"),
        404 => "upload endpoint not found; check the server url and the report format".to_string(),
        status => format!("upload failed with status {status}: {detail}"),
    };
    Err(message.into())
}
