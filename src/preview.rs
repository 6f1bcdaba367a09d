//! Preview mode: token resolution and the signed preview cookie

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::client::{ContentClient, QueryOptions};
use crate::content::RawDocument;
use crate::error::{Error, Result};
use crate::helpers::post_path;

type HmacSha256 = Hmac<Sha256>;

/// Map a document to the site path that renders it
pub fn resolve_link(doc: &RawDocument, post_type: &str) -> String {
    match &doc.uid {
        Some(uid) if doc.doc_type == post_type => post_path(uid),
        _ => "/".to_string(),
    }
}

/// Resolves a preview token to the URL of the previewed document
pub struct PreviewResolver<'a, C: ?Sized> {
    client: &'a C,
    token: String,
    document_id: Option<String>,
}

impl<'a, C> PreviewResolver<'a, C>
where
    C: ContentClient + ?Sized,
{
    pub fn new(client: &'a C, token: &str, document_id: Option<&str>) -> Self {
        Self {
            client,
            token: token.to_string(),
            document_id: document_id
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    /// Resolve to a redirect URL.
    ///
    /// Without a document id the default URL is used. `Ok(None)` means the
    /// document is not visible under the token, i.e. the token is invalid.
    pub async fn resolve<F>(&self, link_resolver: F, default_url: &str) -> Result<Option<String>>
    where
        F: Fn(&RawDocument) -> String,
    {
        if self.token.trim().is_empty() {
            return Err(Error::InvalidPreviewToken);
        }

        let Some(document_id) = &self.document_id else {
            return Ok(Some(default_url.to_string()));
        };

        let options = QueryOptions::new().reference(Some(&self.token));
        match self.client.get_by_id(document_id, &options).await {
            Ok(Some(doc)) => Ok(Some(link_resolver(&doc))),
            Ok(None) => Ok(None),
            Err(e) if e.is_rejected_ref() => {
                tracing::debug!("Preview ref rejected: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Payload stored in the preview cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewData {
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Signs and verifies preview cookie values (`payload.signature`, both
/// base64url, HMAC-SHA256 over the payload)
#[derive(Clone)]
pub struct PreviewSigner {
    mac: HmacSha256,
}

impl PreviewSigner {
    /// Create a signer; `None` when the secret is empty
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        Some(Self { mac })
    }

    pub fn sign(&self, data: &PreviewData) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(data)?);
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify a cookie value; `None` if it is malformed or was tampered with
    pub fn verify(&self, value: &str) -> Option<PreviewData> {
        let (payload, signature) = value.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }
}
