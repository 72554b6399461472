//! Derives a stable content hash identifying an error's class, ignoring
//! fields (stack trace, context) that vary run-to-run for the same bug.

use sha2::{Digest, Sha256};

use crate::types::{ErrorReport, Fingerprint};

/// Computes `fingerprint(category, event, message, codeLocation)`.
#[must_use]
pub fn fingerprint(report: &ErrorReport) -> Fingerprint {
    let location = report.code_location.as_deref().unwrap_or("");
    let key = format!("{}:{}:{}:{}", report.category, report.event, report.message, location);

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();

    Fingerprint(hex::encode(digest))
}
