//! Usage metering and payment-provider integration.

use std::sync::Arc;

use chrono::Utc;
use exto_core::context::RequestContext;
use exto_core::error::{ExtoError, ExtoResult};
use exto_core::models::meter_event::CreateMeterEvent;
use exto_core::models::organization::{Billing, UpdateOrganization};
use exto_core::models::subscription::{
    BillingCycle, CreateSubscription, Subscription, SubscriptionStatus,
};
use exto_core::repository::{MeterEventRepository, OrganizationRepository, SubscriptionRepository};
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::error::{ScanError, ScanResult};

/// Event name reported for each processed scan.
pub const SCAN_EVENT: &str = "scan";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: SubscriptionStatus,
}

/// Customer, setup-intent, subscription and meter-event operations at an
/// external payment provider, keyed by the provider's customer id.
pub trait PaymentProvider: Send + Sync {
    /// Returns `existing` when set, otherwise creates a customer.
    fn ensure_customer(
        &self,
        existing: Option<&str>,
        billing: &Billing,
    ) -> impl Future<Output = ExtoResult<String>> + Send;
    fn create_setup_intent(
        &self,
        customer_id: &str,
    ) -> impl Future<Output = ExtoResult<SetupIntent>> + Send;
    fn create_subscription(
        &self,
        customer_id: &str,
        trial_period_days: u32,
    ) -> impl Future<Output = ExtoResult<ProviderSubscription>> + Send;
    fn create_meter_event(
        &self,
        customer_id: &str,
        event_name: &str,
        value: u64,
    ) -> impl Future<Output = ExtoResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SetupIntentResponse {
    id: String,
    #[serde(default)]
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: String,
    #[serde(default)]
    status: String,
}

/// [`PaymentProvider`] over Stripe's form-encoded REST API.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    config: PaymentConfig,
}

impl StripeClient {
    pub fn new(config: PaymentConfig) -> ScanResult<Self> {
        if !config.is_configured() {
            return Err(ScanError::ProviderNotConfigured);
        }
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    async fn post<R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> ScanResult<R> {
        let url = format!("{}/{path}", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .form(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::Provider {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

fn customer_form(billing: &Billing) -> Vec<(&'static str, String)> {
    vec![
        ("name", billing.full_name.clone()),
        ("email", billing.email.clone()),
        ("phone", billing.phone.clone()),
        ("address[line1]", billing.street_address.clone()),
        ("address[city]", billing.city.clone()),
        ("address[state]", billing.state.clone()),
        ("address[postal_code]", billing.zip_code.clone()),
        ("address[country]", billing.country.clone()),
    ]
}

impl PaymentProvider for StripeClient {
    async fn ensure_customer(&self, existing: Option<&str>, billing: &Billing) -> ExtoResult<String> {
        if let Some(id) = existing {
            return Ok(id.to_string());
        }
        let customer: IdResponse = self.post("customers", &customer_form(billing)).await?;
        Ok(customer.id)
    }

    async fn create_setup_intent(&self, customer_id: &str) -> ExtoResult<SetupIntent> {
        let form = [
            ("customer", customer_id.to_string()),
            ("payment_method_types[]", "card".to_string()),
        ];
        let intent: SetupIntentResponse = self.post("setup_intents", &form).await?;
        Ok(SetupIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        trial_period_days: u32,
    ) -> ExtoResult<ProviderSubscription> {
        let form = [
            ("customer", customer_id.to_string()),
            ("items[0][price]", self.config.price_id.clone()),
            ("trial_period_days", trial_period_days.to_string()),
            ("payment_behavior", "default_incomplete".to_string()),
        ];
        let sub: SubscriptionResponse = self.post("subscriptions", &form).await?;
        Ok(ProviderSubscription {
            id: sub.id,
            status: sub.status.parse().unwrap_or(SubscriptionStatus::Incomplete),
        })
    }

    async fn create_meter_event(
        &self,
        customer_id: &str,
        event_name: &str,
        value: u64,
    ) -> ExtoResult<()> {
        let form = [
            ("event_name", event_name.to_string()),
            ("payload[stripe_customer_id]", customer_id.to_string()),
            ("payload[value]", value.to_string()),
        ];
        let _: serde_json::Value = self.post("billing/meter_events", &form).await?;
        Ok(())
    }
}

/// An absent provider: customers cannot be created and nothing is billed.
impl<P: PaymentProvider> PaymentProvider for Option<P> {
    async fn ensure_customer(&self, existing: Option<&str>, billing: &Billing) -> ExtoResult<String> {
        match self {
            Some(provider) => provider.ensure_customer(existing, billing).await,
            None => Err(ScanError::ProviderNotConfigured.into()),
        }
    }

    async fn create_setup_intent(&self, customer_id: &str) -> ExtoResult<SetupIntent> {
        match self {
            Some(provider) => provider.create_setup_intent(customer_id).await,
            None => Err(ScanError::ProviderNotConfigured.into()),
        }
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        trial_period_days: u32,
    ) -> ExtoResult<ProviderSubscription> {
        match self {
            Some(provider) => {
                provider
                    .create_subscription(customer_id, trial_period_days)
                    .await
            }
            None => Err(ScanError::ProviderNotConfigured.into()),
        }
    }

    async fn create_meter_event(
        &self,
        customer_id: &str,
        event_name: &str,
        value: u64,
    ) -> ExtoResult<()> {
        match self {
            Some(provider) => {
                provider
                    .create_meter_event(customer_id, event_name, value)
                    .await
            }
            None => Err(ScanError::ProviderNotConfigured.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metering
// ---------------------------------------------------------------------------

/// Fire-and-forget usage reporting used by the scan pipeline.
pub trait UsageRecorder: Send + Sync {
    fn record_detached(&self, ctx: &RequestContext, event_name: &str, value: u64) -> JoinHandle<()>;
}

struct MeterInner<O, E, P> {
    organizations: O,
    events: E,
    provider: P,
}

/// Reports usage to the payment provider and mirrors it locally.
pub struct MeterService<O, E, P> {
    inner: Arc<MeterInner<O, E, P>>,
}

impl<O, E, P> Clone for MeterService<O, E, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O, E, P> MeterService<O, E, P>
where
    O: OrganizationRepository + 'static,
    E: MeterEventRepository + 'static,
    P: PaymentProvider + 'static,
{
    pub fn new(organizations: O, events: E, provider: P) -> Self {
        Self {
            inner: Arc::new(MeterInner {
                organizations,
                events,
                provider,
            }),
        }
    }

    /// Reports one event. Organizations without a payment customer are
    /// skipped; returns whether an event was recorded.
    pub async fn record(&self, org_id: Uuid, event_name: &str, value: u64) -> ExtoResult<bool> {
        let org = self.inner.organizations.get_by_id(org_id).await?;
        let Some(customer_id) = org.payment_customer_id else {
            debug!(org_id = %org_id, "No payment customer, usage not metered");
            return Ok(false);
        };

        self.inner
            .provider
            .create_meter_event(&customer_id, event_name, value)
            .await?;
        self.inner
            .events
            .create(CreateMeterEvent {
                organization_id: org_id,
                event_name: event_name.to_string(),
                event_value: value,
                payment_customer_id: customer_id,
            })
            .await?;
        Ok(true)
    }
}

impl<O, E, P> UsageRecorder for MeterService<O, E, P>
where
    O: OrganizationRepository + 'static,
    E: MeterEventRepository + 'static,
    P: PaymentProvider + 'static,
{
    fn record_detached(&self, ctx: &RequestContext, event_name: &str, value: u64) -> JoinHandle<()> {
        let service = self.clone();
        let org_id = ctx.org.id;
        let event_name = event_name.to_string();
        tokio::spawn(async move {
            if let Err(e) = service.record(org_id, &event_name, value).await {
                warn!(org_id = %org_id, event = %event_name, error = %e, "Usage metering failed");
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

pub struct PaymentService<O, S, P> {
    organizations: O,
    subscriptions: S,
    provider: P,
    trial_period_days: u32,
}

impl<O, S, P> PaymentService<O, S, P>
where
    O: OrganizationRepository,
    S: SubscriptionRepository,
    P: PaymentProvider,
{
    pub fn new(organizations: O, subscriptions: S, provider: P, config: &PaymentConfig) -> Self {
        Self {
            organizations,
            subscriptions,
            provider,
            trial_period_days: config.trial_period_days,
        }
    }

    /// Customer id for the organization, creating the customer (and storing
    /// `billing`, or the stored billing details) when absent.
    async fn ensure_customer(&self, org_id: Uuid, billing: Option<Billing>) -> ExtoResult<String> {
        let org = self.organizations.get_by_id(org_id).await?;
        if let Some(id) = org.payment_customer_id {
            return Ok(id);
        }

        let billing = billing.unwrap_or(org.billing);
        if billing.email.trim().is_empty() {
            return Err(ExtoError::validation("billing email is required"));
        }
        let customer_id = self.provider.ensure_customer(None, &billing).await?;
        self.organizations
            .update(
                org_id,
                UpdateOrganization {
                    billing: Some(billing),
                    payment_customer_id: Some(customer_id.clone()),
                    ..Default::default()
                },
            )
            .await?;
        info!(org_id = %org_id, "Payment customer created");
        Ok(customer_id)
    }

    #[instrument(skip(self, ctx, billing), fields(org_id = %ctx.org.id))]
    pub async fn create_setup_intent(
        &self,
        ctx: &RequestContext,
        billing: Option<Billing>,
    ) -> ExtoResult<SetupIntent> {
        let customer_id = self.ensure_customer(ctx.org.id, billing).await?;
        self.provider.create_setup_intent(&customer_id).await
    }

    /// Starts a monthly subscription with a trial and records it as the
    /// organization's current one.
    #[instrument(skip(self, ctx), fields(org_id = %ctx.org.id))]
    pub async fn create_subscription(&self, ctx: &RequestContext) -> ExtoResult<Subscription> {
        let customer_id = self.ensure_customer(ctx.org.id, None).await?;
        let external = self
            .provider
            .create_subscription(&customer_id, self.trial_period_days)
            .await?;

        let subscription = self
            .subscriptions
            .create(CreateSubscription {
                organization_id: ctx.org.id,
                external_id: external.id,
                started_at: Utc::now(),
                trial_period_days: self.trial_period_days,
                billing_cycle: BillingCycle::Monthly,
                status: external.status,
            })
            .await?;
        info!(subscription_id = %subscription.id, status = %subscription.status, "Subscription created");
        Ok(subscription)
    }

    pub async fn current_subscription(&self, ctx: &RequestContext) -> ExtoResult<Option<Subscription>> {
        self.subscriptions.get_current(ctx.org.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_requires_api_key() {
        let err = StripeClient::new(PaymentConfig::default()).err().unwrap();
        assert!(matches!(err, ScanError::ProviderNotConfigured));

        let config = PaymentConfig {
            api_key: "sk_test_123".into(),
            ..Default::default()
        };
        assert!(StripeClient::new(config).is_ok());
    }

    #[test]
    fn customer_form_flattens_address() {
        let billing = Billing {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            city: "London".into(),
            ..Default::default()
        };
        let form = customer_form(&billing);
        assert!(form.contains(&("email", "ada@example.com".to_string())));
        assert!(form.contains(&("address[city]", "London".to_string())));
        assert_eq!(form.len(), 8);
    }

    #[tokio::test]
    async fn missing_provider_refuses_every_call() {
        let provider: Option<StripeClient> = None;
        let err = provider
            .ensure_customer(None, &Billing::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtoError::Payment(_)));
        assert!(provider.create_meter_event("cus_1", SCAN_EVENT, 1).await.is_err());
    }
}
