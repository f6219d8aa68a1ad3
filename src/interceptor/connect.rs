use crate::base::neterror::NetError;
use crate::base::status;
use crate::http::Response;
use crate::interceptor::{Interceptor, Step};
use async_trait::async_trait;

/// Terminal stage: performs the exchange on the call's connection.
///
/// Only a 200 response gets a body attached.
#[derive(Debug, Default)]
pub struct ConnectInterceptor;

#[async_trait]
impl Interceptor for ConnectInterceptor {
    async fn intercept(&self, step: Step<'_>) -> Result<Response, NetError> {
        let conn = step.connection();
        let request = step.request();

        conn.connect(request).await?;
        conn.write_headers(request.headers()).await?;

        let method = request.method();
        if method.has_body() {
            let body = request
                .request_body()
                .await?
                .ok_or(NetError::MissingRequestBody(method))?;
            conn.write_body(&body).await?;
        }

        let head = conn.response_head().await?;
        let body = if head.code == status::OK {
            conn.response_body(&head.headers).await?
        } else {
            None
        };

        let mut builder = Response::builder()
            .code(head.code)
            .message(head.message)
            .headers(head.headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok(builder.build())
    }
}
