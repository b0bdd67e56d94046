use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    Accept,
    Reject(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Missing,
    NotAllowed(String),
}

impl RejectReason {
    pub fn log_message(&self, peer: &str) -> String {
        match self {
            RejectReason::Missing => {
                format!("Rejected session from {}: no Origin header", peer)
            }
            RejectReason::NotAllowed(origin) => {
                format!("Rejected session from {}: unauthorized origin {}", peer, origin)
            }
        }
    }
}

/// Static allow-list checked before a session is established.
#[derive(Debug, Clone)]
pub struct OriginGate {
    allowed: HashSet<String>,
    allow_missing: bool,
}

impl OriginGate {
    pub fn new<I, S>(allowed: I, allow_missing: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|o| normalize(o.as_ref()))
                .filter(|o| !o.is_empty())
                .collect(),
            allow_missing,
        }
    }

    pub fn check(&self, origin: Option<&str>) -> OriginDecision {
        let origin = origin.map(normalize).filter(|o| !o.is_empty());
        match origin {
            None if self.allow_missing => OriginDecision::Accept,
            None => OriginDecision::Reject(RejectReason::Missing),
            Some(origin) if self.allowed.contains(&origin) => OriginDecision::Accept,
            Some(origin) => OriginDecision::Reject(RejectReason::NotAllowed(origin)),
        }
    }

    pub fn allowed_origins(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(allow_missing: bool) -> OriginGate {
        OriginGate::new(["http://localhost:8501", "https://app.example/"], allow_missing)
    }

    #[test]
    fn accepts_listed_origins() {
        let gate = gate(true);
        assert_eq!(gate.check(Some("http://localhost:8501")), OriginDecision::Accept);
        assert_eq!(gate.check(Some("HTTPS://App.Example")), OriginDecision::Accept);
    }

    #[test]
    fn rejects_unlisted_origin() {
        assert_eq!(
            gate(true).check(Some("https://evil.example")),
            OriginDecision::Reject(RejectReason::NotAllowed("https://evil.example".into()))
        );
    }

    #[test]
    fn missing_origin_follows_policy() {
        assert_eq!(gate(true).check(None), OriginDecision::Accept);
        assert_eq!(gate(true).check(Some("  ")), OriginDecision::Accept);
        assert_eq!(
            gate(false).check(None),
            OriginDecision::Reject(RejectReason::Missing)
        );
        assert_eq!(
            gate(false).check(Some("")),
            OriginDecision::Reject(RejectReason::Missing)
        );
    }
}
