use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use party_types::models::Party;

use crate::error::ClientError;

/// Last-fetched nearby parties, keyed by id and kept in display order.
///
/// Every mutation takes the token of the request that produced the data and
/// re-checks it while holding the write lock, so a response that lands after
/// its request was cancelled is dropped instead of overwriting newer state.
#[derive(Debug, Default)]
pub struct PartyCache {
    inner: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    order: Vec<Uuid>,
    parties: HashMap<Uuid, Party>,
}

impl PartyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All cached parties in display order.
    pub async fn snapshot(&self) -> Vec<Party> {
        let state = self.inner.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.parties.get(id).cloned())
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<Party> {
        self.inner.read().await.parties.get(&id).cloned()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.parties.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Swap the whole list for a fresh fetch.
    pub async fn replace_all(&self, parties: Vec<Party>, cancel: &CancellationToken) -> Result<(), ClientError> {
        let mut state = self.inner.write().await;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        state.order.clear();
        state.parties.clear();
        for party in parties {
            if state.parties.insert(party.id, party.clone()).is_none() {
                state.order.push(party.id);
            }
        }
        Ok(())
    }

    /// Replace a cached party in place. Returns `false` when no party with
    /// that id is cached; nothing is inserted in that case.
    pub async fn update_single(&self, party: Party, cancel: &CancellationToken) -> Result<bool, ClientError> {
        let mut state = self.inner.write().await;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        match state.parties.get_mut(&party.id) {
            Some(slot) => {
                *slot = party;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Put a party at the top of the list, moving it there if already cached.
    pub async fn insert_front(&self, party: Party, cancel: &CancellationToken) -> Result<(), ClientError> {
        let mut state = self.inner.write().await;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        state.order.retain(|id| *id != party.id);
        state.order.insert(0, party.id);
        state.parties.insert(party.id, party);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn party(address: &str) -> Party {
        Party {
            id: Uuid::new_v4(),
            formatted_address: address.into(),
            latitude: 39.16,
            longitude: -86.52,
            start_time: Utc::now(),
            end_time: None,
            male_cost: 5,
            female_cost: 0,
            byob: true,
            user: Uuid::new_v4(),
            university: "Indiana University".into(),
            the_word: Vec::new(),
            colloquial_name: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn replace_all_keeps_fetch_order() {
        let cache = PartyCache::new();
        let token = CancellationToken::new();
        let (a, b) = (party("a"), party("b"));

        cache.replace_all(vec![a.clone(), b.clone()], &token).await.unwrap();
        assert_eq!(cache.snapshot().await, vec![a.clone(), b.clone()]);

        cache.replace_all(vec![b.clone()], &token).await.unwrap();
        assert_eq!(cache.snapshot().await, vec![b]);
        assert!(cache.get(a.id).await.is_none());
    }

    #[tokio::test]
    async fn update_single_reports_missing_party() {
        let cache = PartyCache::new();
        let token = CancellationToken::new();
        let mut a = party("a");
        cache.replace_all(vec![a.clone()], &token).await.unwrap();

        a.byob = false;
        assert!(cache.update_single(a.clone(), &token).await.unwrap());
        assert!(!cache.get(a.id).await.unwrap().byob);

        let stranger = party("elsewhere");
        assert!(!cache.update_single(stranger.clone(), &token).await.unwrap());
        assert!(!cache.contains(stranger.id).await);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn insert_front_moves_existing_party() {
        let cache = PartyCache::new();
        let token = CancellationToken::new();
        let (a, b) = (party("a"), party("b"));
        cache.replace_all(vec![a.clone(), b.clone()], &token).await.unwrap();

        cache.insert_front(b.clone(), &token).await.unwrap();
        assert_eq!(cache.snapshot().await, vec![b.clone(), a.clone()]);

        let c = party("c");
        cache.insert_front(c.clone(), &token).await.unwrap();
        assert_eq!(cache.snapshot().await, vec![c, b, a]);
    }

    #[tokio::test]
    async fn cancelled_writes_are_dropped() {
        let cache = PartyCache::new();
        let live = CancellationToken::new();
        let a = party("a");
        cache.replace_all(vec![a.clone()], &live).await.unwrap();

        let stale = CancellationToken::new();
        stale.cancel();

        let mut changed = a.clone();
        changed.byob = false;
        assert!(cache.update_single(changed, &stale).await.unwrap_err().is_cancelled());
        assert!(cache.replace_all(Vec::new(), &stale).await.unwrap_err().is_cancelled());
        assert!(cache.insert_front(party("b"), &stale).await.unwrap_err().is_cancelled());

        assert_eq!(cache.snapshot().await, vec![a]);
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_lock_drops_write() {
        let cache = std::sync::Arc::new(PartyCache::new());
        let token = CancellationToken::new();

        // Hold a read guard so the writer has to wait.
        let guard = cache.inner.read().await;
        let writer = {
            let cache = cache.clone();
            let token = token.clone();
            tokio::spawn(async move { cache.insert_front(party("late"), &token).await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        drop(guard);

        assert!(writer.await.unwrap().unwrap_err().is_cancelled());
        assert!(cache.is_empty().await);
    }
}
