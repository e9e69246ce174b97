//! Durable set of tracked symbols.

use super::{BrokerError, SharedBroker};
use coinwatch_sdk::objects::Symbol;
use compact_str::CompactString;
use std::collections::BTreeSet;

/// The symbols the ingest worker subscribes to on startup.
///
/// Lives in the broker so it survives restarts of the ingest process.
#[derive(Clone)]
pub struct WatchListStore {
    broker: SharedBroker,
    key: CompactString,
}

impl WatchListStore {
    pub fn new(broker: SharedBroker, key: impl Into<CompactString>) -> Self {
        Self {
            broker,
            key: key.into(),
        }
    }

    pub async fn add(&self, symbol: &Symbol) -> Result<(), BrokerError> {
        self.add_all([symbol]).await
    }

    pub async fn add_all<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> Result<(), BrokerError> {
        let members: Vec<String> = symbols
            .into_iter()
            .map(|symbol| symbol.as_str().to_owned())
            .collect();
        self.broker.set_add(&self.key, &members).await
    }

    pub async fn members(&self) -> Result<BTreeSet<Symbol>, BrokerError> {
        let members = self.broker.set_members(&self.key).await?;
        Ok(members.iter().map(|raw| Symbol::new(raw)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_members_are_a_set() {
        let store = WatchListStore::new(Arc::new(MemoryBroker::new()), "watched_symbols");
        let defaults = [Symbol::new("btcusdc"), Symbol::new("ethusdc")];

        store.add_all(&defaults).await.unwrap();
        store.add(&Symbol::new("BTCUSDC")).await.unwrap();
        store.add(&Symbol::new("sandusdc")).await.unwrap();

        let members: Vec<String> = store
            .members()
            .await
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(members, vec!["btcusdc", "ethusdc", "sandusdc"]);
    }
}
