//! Client for DRS deployments that require a separate access-URL fetch per
//! object (the common "Terra Data Repository"-style shape: `resolve` returns
//! an `access_id`, a second call exchanges it for a signed URL).

use super::{http, is_requester_pays_prefix, ProviderClient, ProviderError, ProviderErrorKind};
use crate::object::{AccessType, Checksum, Object};
use crate::openfd::OpenFdWatermark;
use std::path::{Path, PathBuf};

pub struct DrsServiceAClient {
    base_url: String,
    bearer_token: Option<String>,
}

impl DrsServiceAClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    fn object_url(&self, id: &str) -> String {
        format!("{}/ga4gh/drs/v1/objects/{}", self.base_url, id)
    }

    /// Builds the access-id exchange URL, propagating the caller's
    /// requester-pays billing project as a query parameter when present
    /// (§4.1, §6: the billing project header/query parameter must reach the
    /// provider on every requester-pays call, not just be checked locally).
    fn access_url(&self, id: &str, access_id: &str, user_project: Option<&str>) -> String {
        let base = format!("{}/ga4gh/drs/v1/objects/{}/access/{}", self.base_url, id, access_id);
        match user_project {
            Some(project) => format!("{}?userProject={}", base, project),
            None => base,
        }
    }
}

impl ProviderClient for DrsServiceAClient {
    fn resolve(&self, id: &str, fd_watermark: &OpenFdWatermark) -> Result<Object, ProviderError> {
        let body = http::get_json(&self.object_url(id), self.bearer_token.as_deref(), fd_watermark)?;

        let mut object = Object::from_uri(&format!("drs://{}", id));
        object.name = body
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(id)
            .to_string();
        object.size = body
            .get("size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Other, format!("{}: missing size", id)))?;
        object.requires_billing_project = is_requester_pays_prefix(id);

        if let Some(checksums) = body.get("checksums").and_then(|v| v.as_array()) {
            if let Some(first) = checksums.first() {
                let algorithm = first.get("type").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let hex_digest = first.get("checksum").and_then(|v| v.as_str()).unwrap_or("").to_string();
                object.checksum = Some(Checksum::new(algorithm, hex_digest));
            }
        }

        Ok(object)
    }

    fn sign(
        &self,
        object: &mut Object,
        user_project: Option<&str>,
        fd_watermark: &OpenFdWatermark,
    ) -> Result<(), ProviderError> {
        let object_body = http::get_json(&self.object_url(&object.id), self.bearer_token.as_deref(), fd_watermark)?;
        let access_id = object_body
            .get("access_methods")
            .and_then(|v| v.as_array())
            .and_then(|methods| methods.first())
            .and_then(|m| m.get("access_id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::Other, format!("{}: no access method", object.id))
            })?;

        let access_body = http::get_json(
            &self.access_url(&object.id, access_id, user_project),
            self.bearer_token.as_deref(),
            fd_watermark,
        )?;
        let url = access_body
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Other, format!("{}: access response missing url", object.id)))?;

        object.access_url = Some(url.to_string());
        object.access_type = AccessType::Https;
        Ok(())
    }

    fn download_part(
        &self,
        object: &Object,
        start: u64,
        end: u64,
        dest_dir: &Path,
        fd_watermark: &OpenFdWatermark,
    ) -> Result<PathBuf, ProviderError> {
        let url = object.access_url.as_deref().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Other, format!("{}: not signed", object.id))
        })?;
        let part_filename = format!("{}.{}.{}.part", object.name, start, end);
        http::fetch_range_to_file(url, start, end, dest_dir, &part_filename, fd_watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = DrsServiceAClient::new("https://host/", None);
        assert_eq!(client.object_url("abc"), "https://host/ga4gh/drs/v1/objects/abc");
    }

    #[test]
    fn access_url_omits_query_param_without_a_billing_project() {
        let client = DrsServiceAClient::new("https://host", None);
        assert_eq!(
            client.access_url("abc", "acc1", None),
            "https://host/ga4gh/drs/v1/objects/abc/access/acc1"
        );
    }

    #[test]
    fn access_url_propagates_billing_project_as_query_param() {
        let client = DrsServiceAClient::new("https://host", None);
        assert_eq!(
            client.access_url("abc", "acc1", Some("my-project")),
            "https://host/ga4gh/drs/v1/objects/abc/access/acc1?userProject=my-project"
        );
    }
}
