use std::io::Write;

use reqwest::blocking::Client;
use url::Url;

use super::{FetchContext, Transport, TransportSettings, copy_with_cancel};
use crate::error::{FetchError, Result};

/// `http` and `https` through a blocking reqwest client, built on first use
/// and reused for every target of the worker that owns it.
#[derive(Debug)]
pub struct HttpTransport {
    settings: TransportSettings,
    client:   Option<Client>,
}

impl HttpTransport {
    pub fn new(settings: TransportSettings) -> Self { Self { settings, client: None } }

    fn client(&mut self) -> Result<&Client> {
        if self.client.is_none() {
            self.initialize()?;
        }
        self.client
            .as_ref()
            .ok_or_else(|| FetchError::transport("http", "client is not initialized"))
    }
}

impl Transport for HttpTransport {
    fn initialize(&mut self) -> Result<()> {
        let client = Client::builder()
            .timeout(self.settings.timeout)
            .user_agent(self.settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::transport("http", e))?;
        self.client = Some(client);
        Ok(())
    }

    fn fetch(&mut self, url: &Url, size: Option<u64>, sink: &mut dyn Write, ctx: &FetchContext<'_>) -> Result<u64> {
        ctx.check_cancelled()?;
        tracing::debug!(url = %url, ?size, "GET");
        let mut response = self
            .client()?
            .get(url.clone())
            .send()
            .map_err(|e| FetchError::transport(url.as_str(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url:    url.to_string(),
                status: status.as_u16(),
            });
        }
        copy_with_cancel(&mut response, sink, url, ctx)
    }

    fn close(&mut self) { self.client = None; }
}
