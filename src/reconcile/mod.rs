//! Configuration reconciliation
//!
//! A package declares the network configuration it needs
//! ([`ServerConfigRequest`]). The host derives a [`ServerConfigurationModel`]
//! from it, then [`reconcile`] strips every element already satisfied by
//! persisted configuration so restarts never register duplicates.

pub mod model;
pub mod reconciler;
pub mod serializer;
pub mod store;

pub use model::{
    ClientAuth, ConfigKind, HttpEndpoint, KeyStore, KeyStoreRequest, ServerConfigRequest,
    ServerConfigurationModel, ServerOverrides, SslConfig, SslRequest, VirtualHost,
};
pub use reconciler::reconcile;
pub use serializer::{ModelSerializer, TomlModelSerializer};
pub use store::{
    ConfigEntry, ConfigFilter, ConfigurationStore, FileConfigurationStore, LayeredStore,
    MemoryConfigurationStore,
};
