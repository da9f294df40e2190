use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{ServiceRecord, ServiceStatus};

/// Only the fields a dashboard shows. `created_at` never changes after
/// insert, so leaving it out keeps the digest a function of what can change.
#[derive(Serialize)]
struct DigestView<'a> {
    name: &'a str,
    url: &'a str,
    status: ServiceStatus,
}

/// SHA-256 of the watch-list, sorted by name so input order does not matter.
pub fn compute_digest(records: &[ServiceRecord]) -> String {
    let mut indices: Vec<usize> = (0..records.len()).collect();
    indices.sort_by(|&a, &b| records[a].name.cmp(&records[b].name));

    let mut hasher = Sha256::new();
    for &i in &indices {
        let r = &records[i];
        let view = DigestView {
            name: &r.name,
            url: &r.url,
            status: r.status,
        };
        // A struct of strings and a unit enum always serializes
        if let Ok(line) = serde_json::to_vec(&view) {
            hasher.update(&line);
            hasher.update(b"\n");
        }
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(name: &str, status: ServiceStatus) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            url: format!("https://{}.example.com", name),
            created_at: Utc::now(),
            status,
        }
    }

    #[test]
    fn test_digest_ignores_order() {
        let a = record("a", ServiceStatus::Ok);
        let b = record("b", ServiceStatus::Fail);

        assert_eq!(
            compute_digest(&[a.clone(), b.clone()]),
            compute_digest(&[b, a]),
        );
    }

    #[test]
    fn test_digest_tracks_status() {
        let before = compute_digest(&[record("a", ServiceStatus::Unknown)]);
        let after = compute_digest(&[record("a", ServiceStatus::Ok)]);
        assert_ne!(before, after, "Digest should change when a status changes");
    }

    #[test]
    fn test_digest_ignores_created_at() {
        let a = record("a", ServiceStatus::Ok);
        let mut later = a.clone();
        later.created_at = a.created_at + chrono::Duration::seconds(60);

        assert_eq!(compute_digest(&[a]), compute_digest(&[later]));
    }

    #[test]
    fn test_empty_watch_list_has_a_digest() {
        assert_eq!(compute_digest(&[]).len(), 64);
    }
}
