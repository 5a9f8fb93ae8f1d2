//! Runtime configuration, loaded once at startup from the environment.
//!
//! There is no hot-reload: config changes require a process restart, matching
//! the request/response (not long-lived-watch) nature of every setting here.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub backends: BackendConfig,
    pub auth: AuthConfig,
    pub adapter: AdapterConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Address of the external embedding/rerank model server and credentials for it.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

/// Connection info for the document store, message broker and short-TTL cache.
///
/// None of these point at a real network service in this build: the defaults
/// select the in-process implementations, but the fields are threaded through
/// so swapping in a networked backend later is a config change, not a code change.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub document_store_uri: Option<String>,
    pub broker_uri: Option<String>,
    pub cache_uri: Option<String>,
    pub vector_store_url: Option<String>,
    pub vector_store_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key: String,
}

/// `ADAPTER_USE_MONGO` selects the document-store persistence backend over the
/// default file backend; `ADAPTER_STORAGE_PATH` is the directory used by the latter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub use_document_store: bool,
    pub storage_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let api_key = env::var("API_KEY").unwrap_or_else(|_| {
            use rand::Rng;
            let key: String = rand::rng()
                .sample_iter(&rand::distr::Alphanumeric)
                .take(32)
                .map(char::from)
                .collect();
            tracing::warn!(
                "API_KEY not set, using a randomly generated key (not suitable for production)"
            );
            key
        });

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
            },
            embedding: EmbeddingConfig {
                base_url: env::var("EMBEDDING_SERVER_URL")
                    .unwrap_or_else(|_| "http://localhost:8001".to_string()),
                api_key: env::var("EMBEDDING_SERVER_API_KEY").ok(),
                request_timeout_secs: env::var("EMBEDDING_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            },
            backends: BackendConfig {
                document_store_uri: env::var("DOCUMENT_STORE_URI").ok(),
                broker_uri: env::var("BROKER_URI").ok(),
                cache_uri: env::var("CACHE_URI").ok(),
                vector_store_url: env::var("VECTOR_STORE_URL").ok(),
                vector_store_api_key: env::var("VECTOR_STORE_API_KEY").ok(),
            },
            auth: AuthConfig { api_key },
            adapter: AdapterConfig {
                use_document_store: env::var("ADAPTER_USE_MONGO")
                    .map(|v| v.to_lowercase() == "true" || v == "1")
                    .unwrap_or(false),
                storage_path: env::var("ADAPTER_STORAGE_PATH")
                    .unwrap_or_else(|_| "./data/adapters".to_string()),
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            embedding: EmbeddingConfig {
                base_url: "http://localhost:8001".to_string(),
                api_key: None,
                request_timeout_secs: 30,
            },
            backends: BackendConfig {
                document_store_uri: None,
                broker_uri: None,
                cache_uri: None,
                vector_store_url: None,
                vector_store_api_key: None,
            },
            auth: AuthConfig {
                api_key: "development-api-key".to_string(),
            },
            adapter: AdapterConfig {
                use_document_store: false,
                storage_path: "./data/adapters".to_string(),
            },
        }
    }
}
