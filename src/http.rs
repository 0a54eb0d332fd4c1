use crate::error::{Error, Result};
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::debug;

/// Classified result of a single HTTP round trip.
///
/// The transport never retries: the cascade in `backend.rs` owns the retry
/// state machine and decides what each variant means for the next attempt.
#[derive(Debug)]
pub enum HttpOutcome {
    /// 2xx with the raw response body.
    Ok(String),
    /// 429 from the provider.
    RateLimited,
    /// The per-call deadline elapsed before a response arrived.
    TimedOut,
    /// The endpoint could not be reached at all.
    Unreachable(String),
    /// Any other failure: non-2xx status, or a transport error mid-exchange.
    Failed { status: Option<u16>, message: String },
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::config(format!("build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// POST a JSON body and classify the result. `timeout` bounds the whole
    /// call; on expiry the attempt is abandoned and reported as `TimedOut`,
    /// never silently retried here.
    pub async fn post_json(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> HttpOutcome {
        let mut req = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body.to_string());
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        match req.send().await {
            Ok(resp) => classify_response(resp).await,
            Err(e) if e.is_timeout() => HttpOutcome::TimedOut,
            Err(e) if e.is_connect() => HttpOutcome::Unreachable(e.to_string()),
            Err(e) => HttpOutcome::Failed {
                status: None,
                message: e.to_string(),
            },
        }
    }
}

async fn classify_response(resp: reqwest::Response) -> HttpOutcome {
    let status = resp.status();
    debug!(status = status.as_u16(), url = %resp.url(), "provider response");

    match status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => match resp.text().await {
            Ok(body) => HttpOutcome::Ok(body),
            Err(e) => HttpOutcome::Failed {
                status: None,
                message: format!("read response body: {e}"),
            },
        },
        StatusCode::TOO_MANY_REQUESTS => HttpOutcome::RateLimited,
        _ => {
            let body = resp.text().await.unwrap_or_default();
            HttpOutcome::Failed {
                status: Some(status.as_u16()),
                message: body,
            }
        }
    }
}
