use crate::backends::Registry;
use crate::*;
use async_trait::async_trait;

/// NullBackend stores nothing and misses every key. Replaying through it measures the overhead
/// of the harness itself on top of a dry run.
#[derive(Clone)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn new_backend(_opt: &toml::Table) -> Result<Box<dyn LookupBackend>> {
        Ok(Box::new(Self::new()))
    }
}

#[async_trait]
impl LookupBackend for NullBackend {
    async fn prepare(&mut self, _corpus: &Corpus) -> Result<()> {
        Ok(())
    }

    async fn lookup(&mut self, request: &[Key]) -> Result<Vec<Entry>> {
        Ok(vec![None; request.len()])
    }

    async fn count(&mut self) -> Result<u64> {
        Ok(0)
    }
}

inventory::submit! {
    Registry::new("null", NullBackend::new_backend)
}
