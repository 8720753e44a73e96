//! libcurl-backed fetcher
//!
//! Performs a plain GET, follows redirects, and discards the body while
//! counting bytes. Nothing is written to disk, so concurrent jobs never share
//! a download destination.

use super::{FetchError, FetchReceipt, Fetcher};
use std::time::Duration;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total timeout per attempt
pub const DEFAULT_TRIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetcher settings
#[derive(Debug, Clone)]
pub struct CurlSettings {
    /// Maximum time to establish the connection
    pub connect_timeout: Duration,
    /// Maximum time for the whole attempt (connect + transfer)
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for CurlSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TRIAL_TIMEOUT,
            user_agent: format!("fetchpulse/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Fetcher using one fresh libcurl easy handle per attempt
///
/// A fresh handle per attempt means no connection reuse between trials, so
/// every trial pays its own connect cost.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    settings: CurlSettings,
}

impl CurlFetcher {
    /// Create a fetcher with the given settings
    pub fn new(settings: CurlSettings) -> Self {
        Self { settings }
    }

    /// Settings in use
    pub fn settings(&self) -> &CurlSettings {
        &self.settings
    }

    fn classify(&self, err: ::curl::Error) -> FetchError {
        if err.is_operation_timedout() {
            FetchError::TimedOut(self.settings.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str) -> Result<FetchReceipt, FetchError> {
        let mut easy = ::curl::easy::Easy::new();
        easy.url(url).map_err(|e| self.classify(e))?;
        easy.follow_location(true).map_err(|e| self.classify(e))?;
        easy.max_redirections(10).map_err(|e| self.classify(e))?;
        easy.connect_timeout(self.settings.connect_timeout)
            .map_err(|e| self.classify(e))?;
        easy.timeout(self.settings.timeout).map_err(|e| self.classify(e))?;
        easy.useragent(&self.settings.user_agent)
            .map_err(|e| self.classify(e))?;

        let mut received: u64 = 0;
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    received += data.len() as u64;
                    Ok(data.len())
                })
                .map_err(|e| self.classify(e))?;
            transfer.perform().map_err(|e| self.classify(e))?;
        }

        let code = easy.response_code().map_err(|e| self.classify(e))?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }

        Ok(FetchReceipt {
            bytes: received,
            http_status: code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let fetcher = CurlFetcher::default();
        assert_eq!(fetcher.settings().timeout, DEFAULT_TRIAL_TIMEOUT);
        assert_eq!(fetcher.settings().connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(fetcher.settings().user_agent.starts_with("fetchpulse/"));
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        // Port 1 on loopback refuses connections on any sane test machine
        let fetcher = CurlFetcher::new(CurlSettings {
            connect_timeout: Duration::from_secs(2),
            timeout: Duration::from_secs(2),
            ..CurlSettings::default()
        });

        match fetcher.fetch("http://127.0.0.1:1/image.png") {
            Err(FetchError::Transport(_)) | Err(FetchError::TimedOut(_)) => {}
            other => panic!("expected transport failure, got {:?}", other),
        }
    }
}
