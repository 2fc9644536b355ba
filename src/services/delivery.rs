//! Delivery orchestration. Stamps the device token onto a per-device
//! copy of the notification, resolves the provider service, runs the
//! registered hooks, and absorbs token rejections by deactivating the
//! device instead of failing.

use crate::config::PushConfig;
use crate::domain::{Device, Notification};
use crate::error::Result;
use crate::services::{ServiceRegistry, ServiceResolver};
use std::fmt;
use std::sync::Arc;

/// What happened to a single delivery attempt. Only transport and
/// provider failures surface as errors; everything here is a settled,
/// non-retryable end state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Push delivery is globally disabled; nothing was sent.
    Disabled,
    /// A hook vetoed the delivery before the provider call.
    Aborted,
    /// The provider rejected the device token and the device was
    /// deactivated.
    DeviceDeactivated,
}

/// Runs before each provider call. Returning false aborts the delivery
/// for that device without error.
pub trait DeliveryHook: Send + Sync + fmt::Debug {
    fn before_delivery(&self, notification: &Notification, device: &dyn Device) -> bool;
}

#[derive(Debug)]
pub struct DeliveryCoordinator {
    enabled: bool,
    resolver: Arc<dyn ServiceResolver>,
    hooks: Vec<Arc<dyn DeliveryHook>>,
}

impl DeliveryCoordinator {
    #[must_use]
    pub fn new(config: PushConfig) -> Self {
        let enabled = config.enabled;
        Self::with_resolver(Arc::new(ServiceRegistry::new(config)), enabled)
    }

    #[must_use]
    pub fn with_resolver(resolver: Arc<dyn ServiceResolver>, enabled: bool) -> Self {
        Self { enabled, resolver, hooks: Vec::new() }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn DeliveryHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Delivers one notification to one device. The caller's notification
    /// is never mutated; the token is stamped onto a clone.
    #[tracing::instrument(skip_all, fields(platform = %device.platform(), application = device.application()))]
    pub async fn deliver(
        &self,
        notification: &Notification,
        device: &dyn Device,
    ) -> Result<DeliveryOutcome> {
        if !self.enabled {
            tracing::debug!("Push delivery is disabled, skipping");
            return Ok(DeliveryOutcome::Disabled);
        }

        let notification = notification.clone().for_token(device.token());
        let service = self.resolver.resolve(device.platform(), device.application())?;

        for hook in &self.hooks {
            if !hook.before_delivery(&notification, device) {
                tracing::debug!("Delivery aborted by hook");
                return Ok(DeliveryOutcome::Aborted);
            }
        }

        match service.push(&notification).await {
            Ok(()) => Ok(DeliveryOutcome::Delivered),
            Err(error) if error.is_token_rejection() => {
                tracing::info!(error = %error, "Device token rejected, deactivating device");
                if let Err(error) = device.deactivate().await {
                    tracing::error!(error = %error, "Failed to deactivate device");
                }
                Ok(DeliveryOutcome::DeviceDeactivated)
            }
            Err(error) => Err(error),
        }
    }
}
