use std::time::Duration;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use wayfare_core::{
    BookingService, DateRange, HandshakeError, HandshakeResult, HoldReply, HoldStatus, ItemType,
    PaymentService, PaymentSession, PaymentStatus, Promotion, ReservationHold, SessionContext,
    UnitAvailability,
};
use crate::wire::{
    CreateHoldRequest, CreatePaymentRequest, ErrorBody, HoldStatusResponse, PaymentStatusResponse,
    UnitsQuery,
};
use crate::StoreError;

/// REST/JSON client for a remote booking service
#[derive(Clone)]
pub struct HttpBookingClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBookingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Use the session's bearer token on calls that do not take a context
    pub fn with_session(mut self, ctx: &SessionContext) -> Self {
        self.token = ctx.bearer_token().map(String::from);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn dispatch(&self, req: RequestBuilder) -> HandshakeResult<Response> {
        let response = req.send().await.map_err(|e| {
            warn!("Booking service request failed: {}", e);
            HandshakeError::Transient(e.to_string())
        })?;
        debug!("{} {}", response.status(), response.url());
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> HandshakeResult<T> {
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        response.json::<T>().await
            .map_err(|e| HandshakeError::Transient(format!("malformed response: {}", e)))
    }

    async fn expect_success(response: Response) -> HandshakeResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn failure(response: Response) -> HandshakeError {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        classify(status, message)
    }
}

/// Maps an HTTP status onto the handshake error taxonomy
fn classify(status: StatusCode, message: String) -> HandshakeError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
            HandshakeError::Validation(message)
        }
        StatusCode::NOT_FOUND => HandshakeError::NotFound(message),
        _ => HandshakeError::Transient(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl BookingService for HttpBookingClient {
    async fn list_units(&self, item_type: ItemType, range: DateRange) -> HandshakeResult<Vec<UnitAvailability>> {
        let query = UnitsQuery { item_type, start: range.start(), end: range.end() };
        let req = self.authorized(self.client.get(self.url("/v1/units")).query(&query));
        Self::decode(self.dispatch(req).await?).await
    }

    async fn create_hold(
        &self,
        ctx: &SessionContext,
        unit_id: &str,
        range: DateRange,
        promotion: Option<&Promotion>,
    ) -> HandshakeResult<HoldReply> {
        let body = CreateHoldRequest {
            unit_id: unit_id.to_string(),
            start: range.start(),
            end: range.end(),
            promotion: promotion.cloned(),
        };
        let mut req = self.client
            .post(self.url("/v1/holds"))
            .header("x-traveler-id", ctx.traveler_id.as_str())
            .json(&body);
        if let Some(token) = ctx.bearer_token() {
            req = req.bearer_auth(token);
        }

        let response = self.dispatch(req).await?;
        if response.status() == StatusCode::CONFLICT {
            let body = response.json::<ErrorBody>().await
                .map_err(|e| HandshakeError::Transient(format!("malformed conflict body: {}", e)))?;
            return match body.conflicts {
                Some(conflicts) => Ok(HoldReply::Conflict { conflicts }),
                None => Err(HandshakeError::Validation(body.error)),
            };
        }
        let hold: ReservationHold = Self::decode(response).await?;
        Ok(HoldReply::Held { hold })
    }

    async fn cancel_hold(&self, hold_id: &str) -> HandshakeResult<()> {
        let req = self.authorized(self.client.delete(self.url(&format!("/v1/holds/{}", hold_id))));
        Self::expect_success(self.dispatch(req).await?).await
    }

    async fn verify_hold(&self, hold_id: &str) -> HandshakeResult<HoldStatus> {
        let req = self.authorized(self.client.get(self.url(&format!("/v1/holds/{}", hold_id))));
        let body: HoldStatusResponse = Self::decode(self.dispatch(req).await?).await?;
        Ok(body.status)
    }
}

#[async_trait]
impl PaymentService for HttpBookingClient {
    async fn create_payment(&self, hold_id: &str, amount: i64) -> HandshakeResult<PaymentSession> {
        let body = CreatePaymentRequest { hold_id: hold_id.to_string(), amount };
        let req = self.authorized(self.client.post(self.url("/v1/payments")).json(&body));
        Self::decode(self.dispatch(req).await?).await
    }

    async fn payment_status(&self, payment_id: &str) -> HandshakeResult<PaymentStatus> {
        let req = self.authorized(self.client.get(self.url(&format!("/v1/payments/{}", payment_id))));
        let body: PaymentStatusResponse = Self::decode(self.dispatch(req).await?).await?;
        Ok(body.status)
    }

    async fn cancel_payment(&self, payment_id: &str) -> HandshakeResult<()> {
        let req = self.authorized(self.client.delete(self.url(&format!("/v1/payments/{}", payment_id))));
        Self::expect_success(self.dispatch(req).await?).await
    }
}
