//! Access control decorators.
//! Enforces per-client topic permissions before any backend is contacted.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    AsyncMessageSink, AsyncMessageSource, ConsumeRequest, Credentials, PublishRequest,
    SinkFactory, SourceFactory,
};
use crate::config::{ConfigError, ValidationError};
use crate::error::{GatewayError, Result};

/// Topic patterns a client may use. A pattern is an exact topic name, `*`, or a
/// prefix ending in `*`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scope {
    pub consume: Vec<String>,
    pub publish: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub id: String,
    pub secret: String,
    #[serde(flatten)]
    pub scope: Scope,
}

/// Parsed ACL file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Scope for clients that present no credentials.
    pub default: Scope,
    pub clients: Vec<ClientConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Consume,
    Publish,
}

impl AclConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AclConfig = toml::from_str(content)?;

        let mut seen = HashSet::new();
        let duplicates: Vec<ValidationError> = config
            .clients
            .iter()
            .filter(|c| !seen.insert(c.id.as_str()))
            .map(|c| ValidationError {
                field: "clients.id",
                reason: format!("client {:?} defined twice", c.id),
            })
            .collect();
        if !duplicates.is_empty() {
            return Err(ConfigError::Validation(duplicates));
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn scope_for(&self, credentials: Option<&Credentials>) -> Result<&Scope> {
        let Some(credentials) = credentials else {
            return Ok(&self.default);
        };
        self.clients
            .iter()
            .find(|c| c.id == credentials.client_id && c.secret == credentials.secret)
            .map(|c| &c.scope)
            .ok_or_else(|| GatewayError::AccessDenied("invalid client credentials".into()))
    }

    /// Decide whether `credentials` may perform `action` on `topic`.
    pub fn authorize(
        &self,
        action: Action,
        credentials: Option<&Credentials>,
        topic: &str,
    ) -> Result<()> {
        let scope = self.scope_for(credentials)?;
        let patterns = match action {
            Action::Consume => &scope.consume,
            Action::Publish => &scope.publish,
        };
        if patterns.iter().any(|p| topic_matches(p, topic)) {
            Ok(())
        } else {
            let verb = match action {
                Action::Consume => "consume from",
                Action::Publish => "publish to",
            };
            Err(GatewayError::AccessDenied(format!(
                "not allowed to {verb} topic {topic:?}"
            )))
        }
    }
}

fn topic_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

fn client_id(credentials: Option<&Credentials>) -> &str {
    credentials.map_or("anonymous", |c| c.client_id.as_str())
}

/// Rejects consume sessions the ACL does not allow; otherwise delegates to `next`.
pub struct AclSourceFactory {
    pub config: Arc<AclConfig>,
    pub next: Arc<dyn SourceFactory>,
}

#[async_trait]
impl SourceFactory for AclSourceFactory {
    async fn new_source(
        &self,
        cancel: CancellationToken,
        req: ConsumeRequest,
    ) -> Result<Arc<dyn AsyncMessageSource>> {
        if let Err(e) =
            self.config
                .authorize(Action::Consume, req.credentials.as_ref(), &req.topic)
        {
            tracing::warn!(
                client = %client_id(req.credentials.as_ref()),
                topic = %req.topic,
                consumer = %req.consumer,
                "Consume request denied"
            );
            return Err(e);
        }
        self.next.new_source(cancel, req).await
    }
}

/// Rejects publish sessions the ACL does not allow; otherwise delegates to `next`.
pub struct AclSinkFactory {
    pub config: Arc<AclConfig>,
    pub next: Arc<dyn SinkFactory>,
}

#[async_trait]
impl SinkFactory for AclSinkFactory {
    async fn new_sink(
        &self,
        cancel: CancellationToken,
        req: PublishRequest,
    ) -> Result<Arc<dyn AsyncMessageSink>> {
        if let Err(e) =
            self.config
                .authorize(Action::Publish, req.credentials.as_ref(), &req.topic)
        {
            tracing::warn!(
                client = %client_id(req.credentials.as_ref()),
                topic = %req.topic,
                "Publish request denied"
            );
            return Err(e);
        }
        self.next.new_sink(cancel, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ACL: &str = r#"
        [default]
        consume = ["public.*"]

        [[clients]]
        id = "billing"
        secret = "s3cret"
        consume = ["orders"]
        publish = ["invoices.*"]
    "#;

    fn creds(id: &str, secret: &str) -> Option<Credentials> {
        Some(Credentials {
            client_id: id.into(),
            secret: secret.into(),
        })
    }

    #[test]
    fn anonymous_clients_get_default_scope() {
        let acl = AclConfig::from_toml(ACL).unwrap();
        assert!(acl.authorize(Action::Consume, None, "public.news").is_ok());
        assert!(acl.authorize(Action::Consume, None, "orders").is_err());
        assert!(acl.authorize(Action::Publish, None, "public.news").is_err());
    }

    #[test]
    fn known_client_gets_its_scope() {
        let acl = AclConfig::from_toml(ACL).unwrap();
        let c = creds("billing", "s3cret");
        assert!(acl.authorize(Action::Consume, c.as_ref(), "orders").is_ok());
        assert!(acl.authorize(Action::Publish, c.as_ref(), "invoices.eu").is_ok());
        assert!(acl.authorize(Action::Publish, c.as_ref(), "orders").is_err());
    }

    #[test]
    fn wrong_secret_is_denied() {
        let acl = AclConfig::from_toml(ACL).unwrap();
        let err = acl
            .authorize(Action::Consume, creds("billing", "nope").as_ref(), "orders")
            .unwrap_err();
        assert!(matches!(err, GatewayError::AccessDenied(_)));
    }

    #[test]
    fn duplicate_clients_fail_validation() {
        let doc = r#"
            [[clients]]
            id = "a"
            secret = "x"
            [[clients]]
            id = "a"
            secret = "y"
        "#;
        assert!(matches!(
            AclConfig::from_toml(doc),
            Err(ConfigError::Validation(_))
        ));
    }

    struct CountingFactory(AtomicUsize);

    #[async_trait]
    impl SinkFactory for CountingFactory {
        async fn new_sink(
            &self,
            _cancel: CancellationToken,
            _req: PublishRequest,
        ) -> Result<Arc<dyn AsyncMessageSink>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::backend("not reached in this test"))
        }
    }

    #[tokio::test]
    async fn denied_request_never_reaches_next() {
        let next = Arc::new(CountingFactory(AtomicUsize::new(0)));
        let factory = AclSinkFactory {
            config: Arc::new(AclConfig::from_toml(ACL).unwrap()),
            next: next.clone(),
        };

        let denied = factory
            .new_sink(
                CancellationToken::new(),
                PublishRequest {
                    topic: "orders".into(),
                    credentials: None,
                },
            )
            .await;
        assert!(matches!(denied, Err(GatewayError::AccessDenied(_))));
        assert_eq!(next.0.load(Ordering::SeqCst), 0);

        let allowed = factory
            .new_sink(
                CancellationToken::new(),
                PublishRequest {
                    topic: "invoices.us".into(),
                    credentials: creds("billing", "s3cret"),
                },
            )
            .await;
        assert!(matches!(allowed, Err(GatewayError::Backend(_))));
        assert_eq!(next.0.load(Ordering::SeqCst), 1);
    }
}
