//! Pager - paginated enumeration
//!
//! Two pagination styles cover every Rackspace listing:
//!
//! - [`LinkPager`] follows a `rel="next"` link (or a bare `next` field) in
//!   each response body.
//! - [`MarkerPager`] drives Cloud Files listings with `limit` and `marker`
//!   query parameters.

use super::model::Marker;
use crate::context::QueryContext;
use crate::error::{Error, Result};
use crate::rackspace::client::ServiceClient;
use crate::rackspace::http::Body;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use url::Url;

/// One page of items plus where to find the next one
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Url>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// A paginated listing
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Operation name used in errors and logs
    fn operation(&self) -> &str;

    /// Fetch the page at `cursor`, or the first page when `None`
    async fn fetch_page(&self, ctx: &QueryContext, cursor: Option<&Url>) -> Result<Page<Self::Item>>;
}

/// Iterator over successive pages of a [`PageSource`]
pub struct Pages<'a, P: PageSource + ?Sized> {
    source: &'a P,
    cursor: Option<Url>,
    done: bool,
    fetched: usize,
}

impl<'a, P: PageSource + ?Sized> Pages<'a, P> {
    pub fn new(source: &'a P) -> Self {
        Self {
            source,
            cursor: None,
            done: false,
            fetched: 0,
        }
    }

    /// Number of pages requested so far
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Fetch the next page. `None` once the provider signalled the end.
    pub async fn next_page(&mut self, ctx: &QueryContext) -> Result<Option<Vec<P::Item>>> {
        if self.done {
            return Ok(None);
        }

        let operation = self.source.operation();
        ctx.check(operation)?;

        let page = self.source.fetch_page(ctx, self.cursor.as_ref()).await?;
        self.fetched += 1;
        tracing::debug!(
            "{}: page {} with {} items",
            operation,
            self.fetched,
            page.items.len()
        );

        match page.next {
            Some(next) if self.cursor.as_ref() == Some(&next) => {
                tracing::warn!("{}: next link {} repeats the current page, stopping", operation, next);
                self.done = true;
            }
            Some(next) => self.cursor = Some(next),
            None => self.done = true,
        }

        Ok(Some(page.items))
    }
}

/// Visit every item of a listing in provider order.
///
/// Stops early, without error, when `visit` returns `false`.
pub async fn for_each_page<P, F, Fut>(ctx: &QueryContext, source: &P, mut visit: F) -> Result<()>
where
    P: PageSource + ?Sized,
    F: FnMut(P::Item) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut pages = Pages::new(source);
    while let Some(items) = pages.next_page(ctx).await? {
        for item in items {
            if !visit(item).await? {
                tracing::debug!("{}: stopped by caller", source.operation());
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Where a response body carries its continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextLink {
    /// Array of `{rel, href}` objects under this key
    Links(&'static str),
    /// Plain string under this key
    Field(&'static str),
    /// Single-page listing
    None,
}

/// Pager over responses shaped `{"<collection>": [...], "<links>": [...]}`
pub struct LinkPager<T> {
    client: ServiceClient,
    first: Url,
    collection: &'static str,
    next: NextLink,
    operation: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T> LinkPager<T> {
    pub fn new(
        client: ServiceClient,
        path: &str,
        collection: &'static str,
        next: NextLink,
        operation: &'static str,
    ) -> Result<Self> {
        let first = client.url(path)?;
        Ok(Self {
            client,
            first,
            collection,
            next,
            operation,
            _item: PhantomData,
        })
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> PageSource for LinkPager<T> {
    type Item = T;

    fn operation(&self) -> &str {
        self.operation
    }

    async fn fetch_page(&self, ctx: &QueryContext, cursor: Option<&Url>) -> Result<Page<T>> {
        let url = cursor.unwrap_or(&self.first);

        let mut body: Value = match self.client.get(ctx, self.operation, url).await? {
            Body::Json(body) => body,
            Body::NoContent => return Ok(Page::last(Vec::new())),
        };

        let items = match body.get_mut(self.collection).map(Value::take) {
            Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value(raw).map_err(|e| Error::extraction(self.operation, e))?,
            None => {
                return Err(Error::extraction(
                    self.operation,
                    format!("response has no '{}' field", self.collection),
                ))
            }
        };

        let next = match next_href(&body, self.next) {
            Some(href) => Some(resolve_link(self.operation, url, href)?),
            None => None,
        };

        Ok(Page { items, next })
    }
}

/// Find the continuation link in a response body. Empty links are terminal.
pub fn next_href(body: &Value, next: NextLink) -> Option<&str> {
    let href = match next {
        NextLink::Links(key) => body
            .get(key)?
            .as_array()?
            .iter()
            .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))?
            .get("href")?
            .as_str(),
        NextLink::Field(key) => body.get(key)?.as_str(),
        NextLink::None => None,
    };
    href.filter(|h| !h.trim().is_empty())
}

/// Resolve a next link against the URL of the page that returned it
pub fn resolve_link(operation: &str, current: &Url, href: &str) -> Result<Url> {
    current
        .join(href)
        .map_err(|e| Error::extraction(operation, format!("invalid next link '{href}': {e}")))
}

/// Pager over Cloud Files listings, which return bare JSON arrays and page by
/// the name of the last item seen
pub struct MarkerPager<T> {
    client: ServiceClient,
    base: Url,
    page_size: usize,
    operation: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T> MarkerPager<T> {
    pub fn new(client: ServiceClient, path: &str, page_size: u32, operation: &'static str) -> Result<Self> {
        let page_size = page_size.max(1);
        let mut base = client.url(path)?;
        base.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("limit", &page_size.to_string());

        Ok(Self {
            client,
            base,
            page_size: page_size as usize,
            operation,
            _item: PhantomData,
        })
    }

    /// Only list names starting with `prefix`
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.base.query_pairs_mut().append_pair("prefix", prefix);
        self
    }

    fn page_after(&self, marker: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("marker", marker);
        url
    }
}

#[async_trait]
impl<T> PageSource for MarkerPager<T>
where
    T: DeserializeOwned + Marker + Send + 'static,
{
    type Item = T;

    fn operation(&self) -> &str {
        self.operation
    }

    async fn fetch_page(&self, ctx: &QueryContext, cursor: Option<&Url>) -> Result<Page<T>> {
        let url = cursor.unwrap_or(&self.base);

        let items: Vec<T> = match self.client.get(ctx, self.operation, url).await? {
            Body::Json(items) => items,
            Body::NoContent => Vec::new(),
        };

        // A short page is the last one
        let next = if items.len() >= self.page_size {
            items
                .last()
                .and_then(|item| item.marker())
                .map(|m| self.page_after(m))
        } else {
            None
        };

        Ok(Page { items, next })
    }
}
