//! Application state for the payroll API.

use std::sync::Arc;

use crate::calculation::NetPayCalculator;
use crate::config::ServiceConfig;
use crate::idempotency::IdempotencyGate;
use crate::payroll::{PayrollService, SideEffects};
use crate::store::{IdempotencyStoreRef, PayrollStoreRef};

/// Shared application state.
///
/// Cloned into every handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    service: PayrollService,
    gate: IdempotencyGate,
    config: Arc<ServiceConfig>,
}

impl AppState {
    /// Creates a new application state from its parts.
    pub fn new(service: PayrollService, gate: IdempotencyGate, config: ServiceConfig) -> Self {
        Self {
            service,
            gate,
            config: Arc::new(config),
        }
    }

    /// Wires the default collaborators over the given stores: the net pay
    /// calculator and the logging side effects.
    pub fn from_stores(
        payroll: PayrollStoreRef,
        idempotency: IdempotencyStoreRef,
        config: ServiceConfig,
    ) -> Self {
        let service = PayrollService::new(
            payroll,
            Arc::new(NetPayCalculator),
            SideEffects::logging(&config.side_effects),
            config.payroll.lock_timeout(),
        );
        Self::new(service, IdempotencyGate::new(idempotency), config)
    }

    /// Returns the payroll service.
    pub fn service(&self) -> &PayrollService {
        &self.service
    }

    /// Returns the idempotency gate.
    pub fn gate(&self) -> &IdempotencyGate {
        &self.gate
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_from_stores_uses_configured_header() {
        let store = Arc::new(MemoryStore::new());
        let mut config = ServiceConfig::default();
        config.idempotency.header = "X-Request-Key".to_string();

        let state = AppState::from_stores(store.clone(), store, config);
        assert_eq!(state.config().idempotency.header, "X-Request-Key");
    }
}
