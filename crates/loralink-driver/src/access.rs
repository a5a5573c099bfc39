use std::collections::HashSet;

/// Outcome of an access check for a sending node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    /// No decision yet; call [`AccessPolicy::determine`].
    NotDetermined,
    Authorized,
    NotAuthorized,
    /// The identifier itself is malformed.
    NotValid,
}

/// Decides which nodes may deliver messages to the consumer.
pub trait AccessPolicy: Send + Sync {
    /// Current status of `source`.
    fn status(&self, source: &str) -> AccessStatus;

    /// Work out a status for `source` when `status` is undecided.
    fn determine(&self, source: &str) -> AccessStatus {
        self.status(source)
    }

    /// A source is admitted if either check authorizes it.
    fn is_authorized(&self, source: &str) -> bool {
        self.status(source) == AccessStatus::Authorized
            || self.determine(source) == AccessStatus::Authorized
    }
}

/// Admits every source.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn status(&self, _source: &str) -> AccessStatus {
        AccessStatus::Authorized
    }
}

/// Admits only the listed addresses (case-insensitive).
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    allowed: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: addresses
                .into_iter()
                .map(|addr| addr.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }
}

impl AccessPolicy for AllowList {
    fn status(&self, source: &str) -> AccessStatus {
        if source.len() != 4 || !source.chars().all(|c| c.is_ascii_hexdigit()) {
            return AccessStatus::NotValid;
        }
        if self.allowed.contains(&source.to_ascii_uppercase()) {
            AccessStatus::Authorized
        } else {
            AccessStatus::NotAuthorized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_authorizes_everything() {
        assert!(AllowAll.is_authorized("0A2F"));
        assert!(AllowAll.is_authorized("????"));
    }

    #[test]
    fn allow_list_matches_case_insensitively() {
        let policy = AllowList::new(["0a2f", "FFFF"]);
        assert_eq!(policy.status("0A2F"), AccessStatus::Authorized);
        assert_eq!(policy.status("1234"), AccessStatus::NotAuthorized);
        assert_eq!(policy.status("12"), AccessStatus::NotValid);
        assert!(!policy.is_authorized("1234"));
    }

    struct DecidesLater;

    impl AccessPolicy for DecidesLater {
        fn status(&self, _source: &str) -> AccessStatus {
            AccessStatus::NotDetermined
        }

        fn determine(&self, source: &str) -> AccessStatus {
            if source.starts_with('0') {
                AccessStatus::Authorized
            } else {
                AccessStatus::NotAuthorized
            }
        }
    }

    #[test]
    fn undetermined_status_falls_back_to_determine() {
        assert!(DecidesLater.is_authorized("0A2F"));
        assert!(!DecidesLater.is_authorized("FFFF"));
    }
}
