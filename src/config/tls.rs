//! Mutual TLS Client Configuration
//!
//! Loads PEM material from disk and builds the HTTPS clients used for the
//! CUPS provider and the adapter binding API. Certificate management itself
//! lives outside this process.

use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// File locations of the mutual TLS material for one upstream
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MutualTlsConfig {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Allow insecure connections, for test environments only
    #[serde(default)]
    pub skip_verify: bool,
}

/// Build an HTTPS client honoring the optional mutual TLS material.
pub fn build_https_client(tls: Option<&MutualTlsConfig>, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout);

    if let Some(tls) = tls {
        if let Some(ca) = &tls.ca_file {
            let pem = std::fs::read(ca)
                .with_context(|| format!("Failed to read CA file: {}", ca.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Failed to parse CA file: {}", ca.display()))?;
            builder = builder.add_root_certificate(cert);
        }

        match (&tls.cert_file, &tls.key_file) {
            (Some(cert), Some(key)) => {
                let mut pem = std::fs::read(cert)
                    .with_context(|| format!("Failed to read cert file: {}", cert.display()))?;
                let key_pem = std::fs::read(key)
                    .with_context(|| format!("Failed to read key file: {}", key.display()))?;
                pem.extend_from_slice(&key_pem);

                let identity = reqwest::Identity::from_pem(&pem)
                    .context("Failed to build client identity from cert and key")?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => anyhow::bail!("cert_file and key_file must be provided together"),
        }

        if tls.skip_verify {
            tracing::warn!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder.build().context("Failed to build HTTPS client")
}
