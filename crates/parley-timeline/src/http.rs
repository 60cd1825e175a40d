use reqwest::Client;
use tracing::debug;

use parley_types::{Page, PageRequest};

use crate::error::FetchError;
use crate::fetch::PageSource;

/// Page source backed by the message REST endpoint:
/// `GET {base}/{channels|direct}/{id}/messages?limit=&offset=[&filter=]`.
///
/// The body is decoded straight into [`Page`]; any other shape is a decode
/// error.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPageSource {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, request: &PageRequest) -> String {
        let (kind, id) = request.conversation.path();
        format!("{}/{}/{}/messages", self.base_url, kind, id)
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let mut query = vec![
            ("limit", request.limit.to_string()),
            ("offset", request.offset.to_string()),
        ];
        if let Some(filter) = &request.filter {
            query.push(("filter", filter.as_query()));
        }

        let mut builder = self.client.get(self.url(request)).query(&query);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let page: Page = resp.json().await?;
        debug!(
            conversation = %request.conversation,
            offset = request.offset,
            count = page.messages.len(),
            has_more = page.has_more,
            "Fetched page"
        );
        Ok(page)
    }
}
