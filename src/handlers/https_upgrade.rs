use crate::error::Result;
use crate::pipeline::{UrlHandler, UrlProposer, UrlRecord};

pub const ID: &str = "https_upgrade";

/// Заменяет http:// на https://
#[derive(Debug, Default)]
pub struct HttpsUpgrade;

impl UrlHandler for HttpsUpgrade {
    fn id(&self) -> &str {
        ID
    }

    fn on_modify_url(&self, record: &UrlRecord, proposer: &mut UrlProposer) -> Result<()> {
        if let Some(rest) = record.url().strip_prefix("http://") {
            proposer.propose(
                UrlRecord::new(format!("https://{}", rest))
                    .with_trigger(ID, false)
                    .with_metadata("scheme_upgraded", "true"),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HandlerRegistry, PipelineEngine};
    use std::sync::Arc;

    #[test]
    fn test_upgrade_through_engine() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(HttpsUpgrade)).unwrap();
        let engine = PipelineEngine::new(registry);

        let report = engine.on_new_url(UrlRecord::new("http://example.com")).unwrap();
        assert_eq!(report.record.url(), "https://example.com");
        assert_eq!(report.record.metadata_value("scheme_upgraded"), Some("true"));
        assert_eq!(report.passes, 2);

        let report = engine.on_new_url(UrlRecord::new("ftp://example.com")).unwrap();
        assert_eq!(report.record.url(), "ftp://example.com");
        assert_eq!(report.passes, 1);
    }
}
