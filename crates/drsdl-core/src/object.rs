//! The `Object` record: one per manifest row, hydrated through resolve → sign → download.

use std::path::PathBuf;

/// A recognized digest pair as returned by a DRS `resolve` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: String,
    pub hex_digest: String,
}

impl Checksum {
    pub fn new(algorithm: impl Into<String>, hex_digest: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            hex_digest: hex_digest.into(),
        }
    }
}

/// Transport hint returned alongside a signed URL; influences requester-pays semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    Gs,
    S3,
    Https,
    #[default]
    None,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Gs => "gs",
            AccessType::S3 => "s3",
            AccessType::Https => "https",
            AccessType::None => "none",
        }
    }
}

/// One manifest entry, carried through the whole pipeline.
///
/// Born from a manifest row (id/self_uri only); `resolve` fills in
/// `name`/`size`/`checksum`; `sign` fills in `access_url`; the object
/// downloader fills `part_paths` and, on failure, `errors`.
#[derive(Debug, Clone)]
pub struct Object {
    pub id: String,
    pub self_uri: String,
    pub name: String,
    pub size: u64,
    pub checksum: Option<Checksum>,
    pub access_url: Option<String>,
    pub access_type: AccessType,
    /// Set during resolve when the id's namespace is a known requester-pays prefix.
    pub requires_billing_project: bool,
    pub part_paths: Vec<PathBuf>,
    pub errors: Vec<String>,
    /// Set in Phase C when a correctly named final file already exists at the destination.
    pub already_complete: bool,
}

impl Object {
    /// A freshly parsed manifest row: only the DRS URI is known.
    ///
    /// `drs://<host>/<id>` splits into a host authority and an opaque id;
    /// only the id belongs in `Object::id` (§1/§3). A compact identifier
    /// with no authority segment (e.g. `drs://drs.anv0:xyz`) has nothing to
    /// strip, so the whole remainder after the scheme is the id.
    pub fn from_uri(self_uri: &str) -> Self {
        let after_scheme = self_uri.splitn(2, "://").nth(1).unwrap_or(self_uri);
        let id = match after_scheme.find('/') {
            Some(pos) => after_scheme[pos + 1..].to_string(),
            None => after_scheme.to_string(),
        };
        Self {
            id,
            self_uri: self_uri.to_string(),
            name: String::new(),
            size: 0,
            checksum: None,
            access_url: None,
            access_type: AccessType::None,
            requires_billing_project: false,
            part_paths: Vec::new(),
            errors: Vec::new(),
            already_complete: false,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Clears accumulated errors ahead of a re-sign retry (§4.4 Phase D).
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_uri_strips_the_host_authority() {
        let object = Object::from_uri("drs://host/obj0");
        assert_eq!(object.id, "obj0");
        assert_eq!(object.self_uri, "drs://host/obj0");
    }

    #[test]
    fn from_uri_keeps_a_compact_identifier_with_no_authority() {
        let object = Object::from_uri("drs://drs.anv0:xyz");
        assert_eq!(object.id, "drs.anv0:xyz");
    }

    #[test]
    fn from_uri_strips_host_even_when_the_id_itself_contains_a_colon() {
        let object = Object::from_uri("drs://host/drs.anv0:billed");
        assert_eq!(object.id, "drs.anv0:billed");
    }
}
