/// AWS Signature Version 4 query presigning primitives
///
/// The date-scoped signing key and the canonical query prefix are shared
/// across a batch; only the canonical path and the final two HMAC rounds
/// differ per storage key. Signing CPU cost dominates this subsystem's
/// latency, so the shared setup is derived exactly once per batch.
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// AWS uri-encoding: everything except unreserved characters.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Path encoding keeps segment separators intact.
const PATH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Per-batch signing context, derived once and reused for every key.
pub(crate) struct BatchContext {
    pub amz_date: String,
    pub scope: String,
    pub query_prefix: String,
    signing_key: Vec<u8>,
}

impl BatchContext {
    pub fn new(
        access_key_id: &str,
        secret_access_key: &str,
        region: &str,
        issued_at: DateTime<Utc>,
        expires_secs: u64,
    ) -> Self {
        let amz_date = issued_at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = issued_at.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);
        let credential = format!("{}/{}", access_key_id, scope);

        // Query parameters in canonical (alphabetical) order, signature last.
        let query_prefix = format!(
            "X-Amz-Algorithm={}&X-Amz-Credential={}&X-Amz-Date={}&X-Amz-Expires={}&X-Amz-SignedHeaders=host",
            SIGNING_ALGORITHM,
            utf8_percent_encode(&credential, QUERY_ENCODE),
            amz_date,
            expires_secs,
        );

        let signing_key = derive_signing_key(secret_access_key, &date, region);

        Self {
            amz_date,
            scope,
            query_prefix,
            signing_key,
        }
    }

    /// Signature for one canonical GET request against `host`/`path`.
    pub fn signature(&self, host: &str, path: &str) -> String {
        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            path, self.query_prefix, host
        );

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            SIGNING_ALGORITHM,
            self.amz_date,
            self.scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        );

        hex::encode(hmac(&self.signing_key, string_to_sign.as_bytes()))
    }
}

/// Encode an object key as a canonical uri path (keeps `/`).
pub(crate) fn encode_path_segmentwise(key: &str) -> String {
    utf8_percent_encode(key, PATH_ENCODE).to_string()
}

fn derive_signing_key(secret_access_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret_access_key).as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, SERVICE.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
