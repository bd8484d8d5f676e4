//! HTTP client bound to the target service.

use crate::config::TargetSettings;
use reqwest::StatusCode;
use url::Url;

/// A `reqwest` client plus the base URL every request path is appended to.
///
/// Each virtual user owns one, so connection pools are not shared between users.
#[derive(Clone, Debug)]
pub struct TargetClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TargetClient {
    pub fn new(target: &TargetSettings) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = target.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: target.base_url.clone(),
        })
    }

    /// Full URL for `path`, keeping any path prefix of the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send a bare GET and drain the response body.
    ///
    /// Any status is returned as-is; only transport failures are errors.
    pub async fn get(&self, path: &str) -> Result<StatusCode, reqwest::Error> {
        let response = self.http.get(self.endpoint(path)).send().await?;
        let status = response.status();
        response.bytes().await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;

    fn client(host: &str) -> TargetClient {
        TargetClient::new(&TargetSettings {
            base_url: parse_base_url(host).unwrap(),
            request_timeout: None,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            client("http://localhost:8080").endpoint("/sql/test/select/flight"),
            "http://localhost:8080/sql/test/select/flight"
        );
        assert_eq!(
            client("http://localhost:8080/").endpoint("/sql/test/select/account"),
            "http://localhost:8080/sql/test/select/account"
        );
    }

    #[test]
    fn test_endpoint_keeps_path_prefix() {
        assert_eq!(
            client("https://db.internal/api/").endpoint("/sql/test/select/flight"),
            "https://db.internal/api/sql/test/select/flight"
        );
    }
}
