//! A middleware that injects statically configured headers into every
//! request, without overwriting headers already present.

use async_trait::async_trait;
use http::{Extensions, HeaderMap};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};

pub(crate) struct StaticHeaders(pub(crate) HeaderMap);

#[async_trait]
impl Middleware for StaticHeaders {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        for (name, value) in self.0.iter() {
            req.headers_mut()
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        next.run(req, extensions).await
    }
}
