//! Generated server configuration model
//!
//! Element ids are `<prefix>-<instanceId>-<port>`, so the same package
//! requesting the same port in a later run produces the same ids.

use crate::error::{HostError, HostResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of a configuration element, as known to the persisted store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigKind {
    VirtualHost,
    HttpEndpoint,
    Ssl,
    KeyStore,
}

impl ConfigKind {
    /// Factory name used by the persisted configuration store
    pub fn factory_name(&self) -> &'static str {
        match self {
            Self::VirtualHost => "virtualHost",
            Self::HttpEndpoint => "httpEndpoint",
            Self::Ssl => "ssl",
            Self::KeyStore => "keyStore",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factory_name())
    }
}

const VIRTUAL_HOST_PREFIX: &str = "appVirtualHost";
const HTTP_ENDPOINT_PREFIX: &str = "appHttpEndpoint";
const SSL_PREFIX: &str = "appSsl";
const KEY_STORE_PREFIX: &str = "appKeyStore";
const TRUST_STORE_PREFIX: &str = "appTrustStore";

fn element_id(prefix: &str, instance_id: u64, port: u16) -> String {
    format!("{prefix}-{instance_id}-{port}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    pub id: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEndpoint {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_ref: Option<String>,
}

/// TLS client authentication mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuth {
    #[default]
    None,
    Want,
    Need,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub client_auth: ClientAuth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_store_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_store_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStore {
    pub id: String,
    pub location: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_type: Option<String>,
}

/// Configuration generated for one configuration request.
///
/// At most one virtual host, endpoint and SSL element; up to two key stores
/// (key store and trust store).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfigurationModel {
    pub virtual_hosts: Vec<VirtualHost>,
    pub http_endpoints: Vec<HttpEndpoint>,
    pub ssl: Vec<SslConfig>,
    pub key_stores: Vec<KeyStore>,
}

impl ServerConfigurationModel {
    /// Derive the model for a request on behalf of package `instance_id`
    pub fn derive(request: &ServerConfigRequest, instance_id: u64) -> Self {
        let port = request.port;
        let mut model = Self::default();

        let mut aliases = vec![format!("*:{port}")];
        aliases.extend(request.aliases.iter().cloned());
        model.virtual_hosts.push(VirtualHost {
            id: element_id(VIRTUAL_HOST_PREFIX, instance_id, port),
            aliases,
        });

        let mut endpoint = HttpEndpoint {
            id: element_id(HTTP_ENDPOINT_PREFIX, instance_id, port),
            host: request.address.clone().unwrap_or_else(|| "*".to_string()),
            port,
            secure: false,
            ssl_ref: None,
        };

        if let Some(ssl) = &request.ssl {
            let ssl_id = element_id(SSL_PREFIX, instance_id, port);
            let mut config = SslConfig {
                id: ssl_id.clone(),
                protocol: ssl.protocol.clone(),
                client_auth: ssl.client_auth,
                key_store_ref: None,
                trust_store_ref: None,
            };

            if let Some(store) = &ssl.key_store {
                let id = element_id(KEY_STORE_PREFIX, instance_id, port);
                config.key_store_ref = Some(id.clone());
                model.key_stores.push(store.to_element(id));
            }
            if let Some(store) = &ssl.trust_store {
                let id = element_id(TRUST_STORE_PREFIX, instance_id, port);
                config.trust_store_ref = Some(id.clone());
                model.key_stores.push(store.to_element(id));
            }

            model.ssl.push(config);
            endpoint.secure = true;
            endpoint.ssl_ref = Some(ssl_id);
        }

        model.http_endpoints.push(endpoint);
        model
    }

    /// Reject models with more than one virtual host, endpoint or SSL
    /// element, or more than two key stores
    pub fn validate(&self) -> HostResult<()> {
        let limits = [
            (ConfigKind::VirtualHost, self.virtual_hosts.len(), 1),
            (ConfigKind::HttpEndpoint, self.http_endpoints.len(), 1),
            (ConfigKind::Ssl, self.ssl.len(), 1),
            (ConfigKind::KeyStore, self.key_stores.len(), 2),
        ];
        for (kind, count, max) in limits {
            if count > max {
                return Err(HostError::TooManyElements {
                    kind: kind.to_string(),
                    count,
                });
            }
        }
        Ok(())
    }

    /// Nothing left to emit
    pub fn is_empty(&self) -> bool {
        self.virtual_hosts.is_empty()
            && self.http_endpoints.is_empty()
            && self.ssl.is_empty()
            && self.key_stores.is_empty()
    }

    /// The model still declares its own endpoint or virtual host
    pub fn has_endpoint_needs(&self) -> bool {
        !self.virtual_hosts.is_empty() || !self.http_endpoints.is_empty()
    }

    /// The port this model was derived for
    pub fn port(&self) -> Option<u16> {
        self.http_endpoints.first().map(|e| e.port)
    }

    /// `(kind, id)` of every element
    pub fn element_ids(&self) -> Vec<(ConfigKind, &str)> {
        let mut ids = vec![];
        ids.extend(
            self.virtual_hosts
                .iter()
                .map(|e| (ConfigKind::VirtualHost, e.id.as_str())),
        );
        ids.extend(
            self.http_endpoints
                .iter()
                .map(|e| (ConfigKind::HttpEndpoint, e.id.as_str())),
        );
        ids.extend(self.ssl.iter().map(|e| (ConfigKind::Ssl, e.id.as_str())));
        ids.extend(
            self.key_stores
                .iter()
                .map(|e| (ConfigKind::KeyStore, e.id.as_str())),
        );
        ids
    }
}

/// Key or trust store requested by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStoreRequest {
    pub location: PathBuf,
    pub password: Option<String>,
    pub store_type: Option<String>,
}

impl KeyStoreRequest {
    fn to_element(&self, id: String) -> KeyStore {
        KeyStore {
            id,
            location: self.location.clone(),
            password: self.password.clone(),
            store_type: self.store_type.clone(),
        }
    }
}

/// TLS requested by a package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslRequest {
    pub protocol: Option<String>,
    pub client_auth: ClientAuth,
    pub key_store: Option<KeyStoreRequest>,
    pub trust_store: Option<KeyStoreRequest>,
}

/// Network configuration a package declares for itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfigRequest {
    pub port: u16,
    pub address: Option<String>,
    /// Extra virtual host aliases beyond `*:<port>`
    pub aliases: Vec<String>,
    pub ssl: Option<SslRequest>,
}

impl ServerConfigRequest {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            address: None,
            aliases: vec![],
            ssl: None,
        }
    }

    pub fn with_ssl(mut self, ssl: SslRequest) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// Apply host-supplied overrides; set fields replace declared ones
    pub fn apply(mut self, overrides: &ServerOverrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(address) = &overrides.address {
            self.address = Some(address.clone());
        }
        if let Some(ssl) = &overrides.ssl {
            self.ssl = Some(ssl.clone());
        }
        self
    }
}

/// Overrides supplied by the host for a package's declared configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOverrides {
    pub port: Option<u16>,
    pub address: Option<String>,
    pub ssl: Option<SslRequest>,
}
