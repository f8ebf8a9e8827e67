use std::time::Duration;

use core_types::{ProviderError, ProviderErrorKind, with_deadline};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post_json(
        &self,
        provider: &str,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        deadline: Duration,
    ) -> Result<Value, ProviderError> {
        let request = authorize(self.client.post(url).json(body), bearer).timeout(deadline);
        with_deadline(provider, deadline, async {
            let response = request
                .send()
                .await
                .map_err(|err| classify(provider, deadline, err))?;
            read_json(provider, deadline, response).await
        })
        .await
    }

    pub async fn get_json(
        &self,
        provider: &str,
        url: &str,
        bearer: Option<&str>,
        deadline: Duration,
    ) -> Result<Value, ProviderError> {
        let request = authorize(self.client.get(url), bearer).timeout(deadline);
        with_deadline(provider, deadline, async {
            let response = request
                .send()
                .await
                .map_err(|err| classify(provider, deadline, err))?;
            read_json(provider, deadline, response).await
        })
        .await
    }

    pub async fn reachable(
        &self,
        provider: &str,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        deadline: Duration,
    ) -> Result<bool, ProviderError> {
        let request = authorize(self.client.request(method, url), bearer).timeout(deadline);
        with_deadline(provider, deadline, async {
            let response = request
                .send()
                .await
                .map_err(|err| classify(provider, deadline, err))?;
            Ok(response.status().is_success())
        })
        .await
    }
}

fn authorize(request: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(key) => request.bearer_auth(key.trim()),
        None => request,
    }
}

async fn read_json(
    provider: &str,
    deadline: Duration,
    response: Response,
) -> Result<Value, ProviderError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| classify(provider, deadline, err))?;
    if !status.is_success() {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::Upstream {
                status: status.as_u16(),
                body: text,
            },
        ));
    }
    serde_json::from_str(&text).map_err(|err| {
        ProviderError::new(
            provider,
            ProviderErrorKind::MalformedResponse(format!("invalid json body: {err}")),
        )
    })
}

fn classify(provider: &str, deadline: Duration, err: reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout(deadline)
    } else if err.is_decode() {
        ProviderErrorKind::MalformedResponse(err.to_string())
    } else {
        ProviderErrorKind::Transport(err.to_string())
    };
    ProviderError::new(provider, kind)
}
