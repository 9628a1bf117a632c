//! Model serialization for configuration units

use crate::error::HostResult;
use crate::reconcile::model::{
    HttpEndpoint, KeyStore, ServerConfigurationModel, SslConfig, VirtualHost,
};
use serde::Serialize;

/// Turns a model into a self-contained text document
pub trait ModelSerializer: Send + Sync {
    fn serialize(&self, model: &ServerConfigurationModel) -> HostResult<String>;
}

/// Field order is the document order: virtual host, ssl, key stores, endpoint
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    virtual_host: &'a [VirtualHost],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    ssl: &'a [SslConfig],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    key_store: &'a [KeyStore],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    http_endpoint: &'a [HttpEndpoint],
}

/// Renders models as TOML arrays of tables
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlModelSerializer;

impl ModelSerializer for TomlModelSerializer {
    fn serialize(&self, model: &ServerConfigurationModel) -> HostResult<String> {
        let document = Document {
            virtual_host: &model.virtual_hosts,
            ssl: &model.ssl,
            key_store: &model.key_stores,
            http_endpoint: &model.http_endpoints,
        };
        let body = toml::to_string_pretty(&document)?;
        Ok(format!("# generated server configuration\n{body}"))
    }
}
