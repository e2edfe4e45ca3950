//! Web Push delivery client.
//!
//! Wraps the single "send encrypted payload to one endpoint" operation:
//! VAPID-signed, aes128gcm-encrypted, with a bounded per-attempt timeout.
//! Failures are classified into exactly two kinds: `Gone` (the push service
//! says the endpoint will never accept deliveries again, so its record must
//! be removed) and `Transient` (everything else; counted as a miss for this
//! attempt only). Misclassifying here either silently severs a user's
//! notification channel or leaves dead endpoints accumulating forever.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use thiserror::Error;
use tokio::time::timeout;
use tracing::trace;
use web_push::{
    ContentEncoding, HyperWebPushClient, PartialVapidSignatureBuilder, SubscriptionInfo,
    VapidSignatureBuilder, WebPushClient, WebPushError, WebPushMessageBuilder,
};

use crate::config::PushConfig;
use crate::error::{Error, Result};
use crate::notify::format::NotificationPayload;
use crate::store::PushEndpoint;

/// Classified outcome of a failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint is permanently invalid (push service returned 404/410).
    #[error("endpoint gone")]
    Gone,

    /// Any other failure; the endpoint may still work on a later attempt.
    #[error("delivery failed: {0}")]
    Transient(String),
}

/// A single-endpoint delivery operation.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        endpoint: &PushEndpoint,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Production transport over the Web Push protocol.
pub struct WebPushTransport {
    client: HyperWebPushClient,
    vapid: PartialVapidSignatureBuilder,
    contact: String,
    ttl_secs: u32,
    send_timeout: Duration,
}

impl WebPushTransport {
    /// Creates a transport from push configuration, reading the VAPID
    /// private key from `vapid_key_path`.
    pub fn new(config: &PushConfig) -> Result<Self> {
        let file = std::fs::File::open(&config.vapid_key_path).map_err(|e| {
            Error::Vapid(format!(
                "failed to open VAPID key file '{}': {e}",
                config.vapid_key_path
            ))
        })?;
        let vapid = VapidSignatureBuilder::from_pem_no_sub(file)
            .map_err(|e| Error::Vapid(format!("failed to parse VAPID key: {e}")))?;

        Ok(Self {
            client: HyperWebPushClient::new(),
            vapid,
            contact: config.contact.clone(),
            ttl_secs: config.ttl_secs,
            send_timeout: config.send_timeout(),
        })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        endpoint: &PushEndpoint,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), DeliveryError> {
        let subscription = SubscriptionInfo::new(
            endpoint.endpoint.clone(),
            endpoint.keys.p256dh.clone(),
            endpoint.keys.auth.clone(),
        );

        let mut signature = self.vapid.clone().add_sub_info(&subscription);
        if !self.contact.is_empty() {
            signature.add_claim("sub", self.contact.clone());
        }
        let signature = signature
            .build()
            .map_err(|e| DeliveryError::Transient(format!("VAPID signature: {e}")))?;

        let content = serde_json::to_vec(payload)
            .map_err(|e| DeliveryError::Transient(format!("payload encoding: {e}")))?;

        let mut builder = WebPushMessageBuilder::new(&subscription);
        builder.set_vapid_signature(signature);
        builder.set_ttl(self.ttl_secs);
        builder.set_payload(ContentEncoding::Aes128Gcm, &content);
        let message = builder.build().map_err(classify)?;

        match timeout(self.send_timeout, self.client.send(message)).await {
            Ok(Ok(())) => {
                trace!(endpoint_id = %endpoint.id, "push delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(DeliveryError::Transient(format!(
                "send timed out after {:?}",
                self.send_timeout
            ))),
        }
    }
}

/// Maps a Web Push protocol error onto the two-kind taxonomy.
///
/// The push service answers 404 (`EndpointNotValid`) or 410
/// (`EndpointNotFound`) when a subscription is dead; only those justify
/// deleting the endpoint record.
fn classify(err: WebPushError) -> DeliveryError {
    match err {
        WebPushError::EndpointNotValid | WebPushError::EndpointNotFound => {
            DeliveryError::Gone
        }
        other => DeliveryError::Transient(other.to_string()),
    }
}

/// Loads the VAPID key at `path`, generating and persisting a fresh P-256
/// keypair when the file does not exist. Returns the base64url-encoded
/// uncompressed public key the browser needs to subscribe.
pub async fn ensure_vapid_key(path: &str) -> Result<String> {
    if Path::new(path).exists() {
        return Ok(URL_SAFE_NO_PAD.encode(load_public_key(path).await?));
    }
    Ok(URL_SAFE_NO_PAD.encode(generate_and_save_key(path).await?))
}

/// Generates a VAPID keypair without persisting it. Returns
/// (PEM private key, base64url public key).
pub fn generate_vapid_keypair() -> Result<(String, String)> {
    let (pem, public_key) = new_keypair()?;
    let pem = String::from_utf8(pem).map_err(|e| Error::Vapid(format!("invalid PEM: {e}")))?;
    Ok((pem, URL_SAFE_NO_PAD.encode(public_key)))
}

fn new_keypair() -> Result<(Vec<u8>, Vec<u8>)> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let ec_key = EcKey::generate(&group)?;

    let mut ctx = BigNumContext::new()?;
    let public_key =
        ec_key
            .public_key()
            .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut ctx)?;

    let pkey = PKey::from_ec_key(ec_key)?;
    let pem = pkey.private_key_to_pem_pkcs8()?;

    Ok((pem, public_key))
}

async fn generate_and_save_key(path: &str) -> Result<Vec<u8>> {
    let (pem, public_key) = tokio::task::spawn_blocking(new_keypair)
        .await
        .map_err(|e| Error::Vapid(format!("keygen task failed: {e}")))??;

    tokio::fs::write(path, &pem).await.map_err(|e| {
        Error::Vapid(format!("failed to write VAPID key file '{path}': {e}"))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(public_key)
}

async fn load_public_key(path: &str) -> Result<Vec<u8>> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || {
        let pem = std::fs::read(&path)
            .map_err(|e| Error::Vapid(format!("failed to read VAPID key file '{path}': {e}")))?;
        let pkey = PKey::private_key_from_pem(&pem)
            .map_err(|e| Error::Vapid(format!("failed to parse VAPID key: {e}")))?;
        let ec_key = pkey
            .ec_key()
            .map_err(|e| Error::Vapid(format!("VAPID key is not an EC key: {e}")))?;

        let mut ctx = BigNumContext::new()?;
        let public_key = ec_key.public_key().to_bytes(
            ec_key.group(),
            PointConversionForm::UNCOMPRESSED,
            &mut ctx,
        )?;
        Ok::<_, Error>(public_key)
    })
    .await
    .map_err(|e| Error::Vapid(format!("key load task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_endpoint_not_found_is_gone() {
        let err = WebPushError::EndpointNotFound;
        assert!(matches!(classify(err), DeliveryError::Gone));
    }

    #[test]
    fn test_classify_endpoint_not_valid_is_gone() {
        let err = WebPushError::EndpointNotValid;
        assert!(matches!(classify(err), DeliveryError::Gone));
    }

    #[test]
    fn test_classify_invalid_uri_is_transient() {
        assert!(matches!(
            classify(WebPushError::InvalidUri),
            DeliveryError::Transient(_)
        ));
    }

    #[test]
    fn test_classify_unauthorized_is_transient() {
        let err = WebPushError::Unauthorized;
        assert!(matches!(classify(err), DeliveryError::Transient(_)));
    }

    #[tokio::test]
    async fn test_ensure_vapid_key_generates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vapid.pem");
        let path = path.to_str().unwrap();

        let public_key = ensure_vapid_key(path).await.unwrap();
        // Uncompressed P-256 point: 65 bytes, base64url without padding.
        assert_eq!(URL_SAFE_NO_PAD.decode(&public_key).unwrap().len(), 65);

        // Second call loads the same key instead of generating a new one.
        let reloaded = ensure_vapid_key(path).await.unwrap();
        assert_eq!(public_key, reloaded);
    }

    #[tokio::test]
    async fn test_transport_from_generated_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vapid.pem");
        let path = path.to_str().unwrap();
        ensure_vapid_key(path).await.unwrap();

        let config = PushConfig {
            enabled: true,
            vapid_key_path: path.to_string(),
            contact: "mailto:ops@example.com".to_string(),
            ttl_secs: 3600,
            send_timeout_secs: 5,
        };
        let transport = WebPushTransport::new(&config);
        assert!(transport.is_ok());
    }

    #[test]
    fn test_transport_missing_key_file() {
        let config = PushConfig {
            enabled: true,
            vapid_key_path: "/nonexistent/vapid.pem".to_string(),
            contact: String::new(),
            ttl_secs: 3600,
            send_timeout_secs: 5,
        };
        let result = WebPushTransport::new(&config);
        assert!(result.is_err());
        assert!(
            result
                .err()
                .unwrap()
                .to_string()
                .contains("failed to open VAPID key file")
        );
    }

    #[test]
    fn test_generate_vapid_keypair() {
        let (pem, public_key) = generate_vapid_keypair().unwrap();
        assert!(pem.contains("PRIVATE KEY"));
        assert_eq!(URL_SAFE_NO_PAD.decode(&public_key).unwrap().len(), 65);
    }
}
