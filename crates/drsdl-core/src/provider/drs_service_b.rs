//! Client for DRS deployments that embed a signed URL directly in the
//! resolve response (the common "Gen3/fence"-style shape), refreshing it on
//! demand when it expires rather than via a distinct access-id call.

use super::{http, is_requester_pays_prefix, ProviderClient, ProviderError, ProviderErrorKind};
use crate::object::{AccessType, Checksum, Object};
use crate::openfd::OpenFdWatermark;
use std::path::{Path, PathBuf};

pub struct DrsServiceBClient {
    base_url: String,
    api_key: Option<String>,
}

impl DrsServiceBClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn object_url(&self, id: &str) -> String {
        format!("{}/ga4gh/drs/v1/objects/{}?expand=true", self.base_url, id)
    }

    /// Same object-fetch URL, with the caller's requester-pays billing
    /// project propagated as a query parameter (§4.1, §6). Used on sign's
    /// re-resolve so a requester-pays access method gets billed to the
    /// right project instead of relying on a header the service never sees.
    fn object_url_with_project(&self, id: &str, user_project: Option<&str>) -> String {
        match user_project {
            Some(project) => format!("{}&userProject={}", self.object_url(id), project),
            None => self.object_url(id),
        }
    }
}

impl ProviderClient for DrsServiceBClient {
    fn resolve(&self, id: &str, fd_watermark: &OpenFdWatermark) -> Result<Object, ProviderError> {
        let body = http::get_json(&self.object_url(id), self.api_key.as_deref(), fd_watermark)?;

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

        if let Some(url) = body
            .get("access_methods")
            .and_then(|v| v.as_array())
            .and_then(|methods| methods.first())
            .and_then(|m| m.get("access_url"))
            .and_then(|au| au.get("url"))
            .and_then(|v| v.as_str())
        {
            object.access_url = Some(url.to_string());
            object.access_type = AccessType::Https;
        }

        Ok(object)
    }

    fn sign(
        &self,
        object: &mut Object,
        user_project: Option<&str>,
        fd_watermark: &OpenFdWatermark,
    ) -> Result<(), ProviderError> {
        if object.access_url.is_some() {
            return Ok(());
        }
        // The embedded URL expired or was never present: re-resolve for a fresh one.
        let body = http::get_json(
            &self.object_url_with_project(&object.id, user_project),
            self.api_key.as_deref(),
            fd_watermark,
        )?;
        let url = body
            .get("access_methods")
            .and_then(|v| v.as_array())
            .and_then(|methods| methods.first())
            .and_then(|m| m.get("access_url"))
            .and_then(|au| au.get("url"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::Other, format!("{}: no access url", object.id))
            })?;
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
    fn object_url_requests_expanded_access_methods() {
        let client = DrsServiceBClient::new("https://host", None);
        assert_eq!(client.object_url("abc"), "https://host/ga4gh/drs/v1/objects/abc?expand=true");
    }

    #[test]
    fn object_url_with_project_appends_query_param() {
        let client = DrsServiceBClient::new("https://host", None);
        assert_eq!(
            client.object_url_with_project("abc", Some("my-project")),
            "https://host/ga4gh/drs/v1/objects/abc?expand=true&userProject=my-project"
        );
        assert_eq!(client.object_url_with_project("abc", None), client.object_url("abc"));
    }
}
