//! Priority-cascade deduplication against persisted configuration
//!
//! Tiers are checked in order virtual host, endpoint, SSL. A tier "matches"
//! when it has no element or when its element already exists in the store.
//! The first matching tier drops itself and every lower tier (key stores
//! included) and ends the cascade. Key stores surviving the cascade are
//! then checked one by one.
//!
//! An empty tier counts as a match, so a model without SSL loses its key
//! stores and a model without a virtual host emits nothing.

use crate::error::HostResult;
use crate::reconcile::model::{ConfigKind, ServerConfigurationModel};
use crate::reconcile::store::{ConfigFilter, ConfigurationStore};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    VirtualHost,
    HttpEndpoint,
    Ssl,
}

impl Tier {
    const CASCADE: [Tier; 3] = [Tier::VirtualHost, Tier::HttpEndpoint, Tier::Ssl];

    fn kind(self) -> ConfigKind {
        match self {
            Self::VirtualHost => ConfigKind::VirtualHost,
            Self::HttpEndpoint => ConfigKind::HttpEndpoint,
            Self::Ssl => ConfigKind::Ssl,
        }
    }

    fn element_id(self, model: &ServerConfigurationModel) -> Option<&str> {
        match self {
            Self::VirtualHost => model.virtual_hosts.first().map(|e| e.id.as_str()),
            Self::HttpEndpoint => model.http_endpoints.first().map(|e| e.id.as_str()),
            Self::Ssl => model.ssl.first().map(|e| e.id.as_str()),
        }
    }

    /// Drop this tier and everything beneath it
    fn clear_from(self, model: &mut ServerConfigurationModel) {
        if self == Self::VirtualHost {
            model.virtual_hosts.clear();
        }
        if matches!(self, Self::VirtualHost | Self::HttpEndpoint) {
            model.http_endpoints.clear();
        }
        model.ssl.clear();
        model.key_stores.clear();
    }
}

fn exists(store: &dyn ConfigurationStore, kind: ConfigKind, id: &str) -> HostResult<bool> {
    Ok(!store.find(&ConfigFilter::new(kind, id))?.is_empty())
}

/// Remove from `model` everything the store already satisfies.
///
/// Fails with `TooManyElements` before any lookup, and propagates every
/// lookup failure.
pub fn reconcile(
    mut model: ServerConfigurationModel,
    store: &dyn ConfigurationStore,
) -> HostResult<ServerConfigurationModel> {
    model.validate()?;

    for tier in Tier::CASCADE {
        let matched = match tier.element_id(&model) {
            None => true,
            Some(id) => exists(store, tier.kind(), id)?,
        };

        if matched {
            debug!("{:?} tier satisfied, dropping it and lower tiers", tier);
            tier.clear_from(&mut model);
            break;
        }
    }

    let mut surviving = Vec::with_capacity(model.key_stores.len());
    for key_store in model.key_stores.drain(..) {
        if exists(store, ConfigKind::KeyStore, &key_store.id)? {
            debug!("Key store {} already configured", key_store.id);
        } else {
            surviving.push(key_store);
        }
    }
    model.key_stores = surviving;

    Ok(model)
}
