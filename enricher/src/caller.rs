use crate::config::CallerConfig;
use async_trait::async_trait;
use std::collections::HashMap;

/// An authenticated caller allowed to trigger enrichment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub name: String,
    /// Superusers dispatch without provider-side signature checks.
    pub superuser: bool,
}

/// Maps a credential token to the caller it belongs to.
#[async_trait]
pub trait CallerResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Resolves callers from the token table in the configuration file.
pub struct StaticCallers {
    by_token: HashMap<String, Caller>,
}

impl StaticCallers {
    pub fn new(callers: &[CallerConfig]) -> Self {
        let by_token = callers
            .iter()
            .map(|c| {
                (
                    c.token.clone(),
                    Caller {
                        name: c.name.clone(),
                        superuser: c.superuser,
                    },
                )
            })
            .collect();

        Self { by_token }
    }
}

#[async_trait]
impl CallerResolver for StaticCallers {
    async fn resolve(&self, token: &str) -> Option<Caller> {
        self.by_token.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_callers() {
        let callers = StaticCallers::new(&[
            CallerConfig {
                token: "S3CR3T".into(),
                name: "arthur".into(),
                superuser: false,
            },
            CallerConfig {
                token: "R00T".into(),
                name: "merlin".into(),
                superuser: true,
            },
        ]);

        assert_eq!(
            callers.resolve("S3CR3T").await,
            Some(Caller {
                name: "arthur".into(),
                superuser: false
            })
        );
        assert!(callers.resolve("R00T").await.unwrap().superuser);
        assert_eq!(callers.resolve("unknown").await, None);
    }
}
