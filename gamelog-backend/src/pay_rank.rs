//! Payment leaderboard.
//!
//! [`PayRank`] keeps today's totals in memory so the dashboard can read the
//! current leaderboard without touching the store. Historical or per-server
//! leaderboards are folded straight from stored events with
//! [`fold_payments`], which applies the same accumulate rule.

use gamelog_db::{Database, DbError, PaymentEvent};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Running payment total of one role within the current scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerPaymentTotal {
    #[serde(rename = "roleid")]
    pub role_id: String,
    pub name: String,
    pub level: i64,
    #[serde(rename = "gamesvr")]
    pub server_id: i64,
    #[serde(rename = "viplevel")]
    pub vip_level: i64,
    /// Sum of every amount seen for this role
    #[serde(rename = "money")]
    pub cumulative_amount: i64,
}

impl PlayerPaymentTotal {
    fn from_event(event: &PaymentEvent) -> Self {
        Self {
            role_id: event.role_id.clone(),
            name: event.name.clone(),
            level: event.level,
            server_id: event.server_id,
            vip_level: event.vip_level,
            cumulative_amount: event.amount,
        }
    }

    /// Amounts add up; display fields follow the latest event.
    fn absorb(&mut self, event: &PaymentEvent) {
        self.cumulative_amount = self.cumulative_amount.saturating_add(event.amount);
        self.name.clone_from(&event.name);
        self.level = event.level;
        self.server_id = event.server_id;
        self.vip_level = event.vip_level;
    }
}

fn accumulate(totals: &mut HashMap<String, PlayerPaymentTotal>, event: &PaymentEvent) {
    match totals.get_mut(&event.role_id) {
        Some(total) => total.absorb(event),
        None => {
            totals.insert(event.role_id.clone(), PlayerPaymentTotal::from_event(event));
        }
    }
}

/// Sort descending by cumulative amount. Order among equal amounts is
/// unspecified.
fn ranked(totals: impl IntoIterator<Item = PlayerPaymentTotal>) -> Vec<PlayerPaymentTotal> {
    let mut rank: Vec<_> = totals.into_iter().collect();
    rank.sort_by(|a, b| b.cumulative_amount.cmp(&a.cumulative_amount));
    rank
}

/// Fold events (in arrival order) into a ranked leaderboard.
pub fn fold_payments(events: &[PaymentEvent]) -> Vec<PlayerPaymentTotal> {
    let mut totals = HashMap::new();
    for event in events {
        accumulate(&mut totals, event);
    }
    ranked(totals.into_values())
}

/// Incrementally maintained leaderboard for the current day.
pub struct PayRank {
    totals: RwLock<HashMap<String, PlayerPaymentTotal>>,
}

impl PayRank {
    pub fn new() -> Self {
        Self {
            totals: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one payment into the leaderboard.
    pub fn update(&self, event: &PaymentEvent) {
        accumulate(&mut self.totals.write(), event);
    }

    /// Full ranked copy of the leaderboard.
    pub fn rank(&self) -> Vec<PlayerPaymentTotal> {
        ranked(self.totals.read().values().cloned())
    }

    /// Replace the leaderboard with every stored payment at or after
    /// `scope_start`, replayed in arrival order.
    ///
    /// Events are read before the lock is taken, so an update that lands
    /// while the store is being read is dropped from memory until the next
    /// rebuild. It is still in the store.
    pub async fn rebuild_from_store(&self, db: &Database, scope_start: i64) -> Result<usize, DbError> {
        let events = db.payments_since(scope_start).await?;

        let mut totals = HashMap::new();
        for event in &events {
            accumulate(&mut totals, event);
        }
        let players = totals.len();
        *self.totals.write() = totals;

        info!(events = events.len(), players, "payment leaderboard rebuilt");
        Ok(players)
    }

    /// Start a new, empty scope.
    pub fn reset(&self) -> usize {
        let mut totals = self.totals.write();
        let cleared = totals.len();
        totals.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.totals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.read().is_empty()
    }
}

impl Default for PayRank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1700000000;

    fn event(role_id: &str, name: &str, amount: i64, vip_level: i64, at: i64) -> PaymentEvent {
        PaymentEvent {
            role_id: role_id.to_string(),
            name: name.to_string(),
            level: 10 + vip_level,
            server_id: 1,
            amount,
            vip_level,
            observed_at: at,
        }
    }

    fn totals_by_role(rank: &[PlayerPaymentTotal]) -> HashMap<String, i64> {
        rank.iter()
            .map(|t| (t.role_id.clone(), t.cumulative_amount))
            .collect()
    }

    #[test]
    fn test_update_sums_amounts_and_keeps_latest_display() {
        let rank = PayRank::new();
        rank.update(&event("p1", "Old", 100, 1, NOW));
        rank.update(&event("p1", "New", 50, 3, NOW + 1));
        rank.update(&event("p2", "Bob", 120, 0, NOW + 2));

        let board = rank.rank();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].role_id, "p1");
        assert_eq!(board[0].cumulative_amount, 150);
        assert_eq!(board[0].name, "New");
        assert_eq!(board[0].vip_level, 3);
        assert_eq!(board[0].level, 13);
        assert_eq!(board[1].role_id, "p2");
    }

    #[test]
    fn test_sum_is_independent_of_order() {
        let forward = PayRank::new();
        let backward = PayRank::new();
        let events: Vec<_> = (1..=5).map(|i| event("p1", "A", i * 7, 0, NOW + i)).collect();

        for e in &events {
            forward.update(e);
        }
        for e in events.iter().rev() {
            backward.update(e);
        }

        assert_eq!(forward.rank()[0].cumulative_amount, 105);
        assert_eq!(backward.rank()[0].cumulative_amount, 105);
    }

    #[test]
    fn test_rank_is_descending() {
        let rank = PayRank::new();
        for (i, amount) in [30, 500, 10, 250].into_iter().enumerate() {
            rank.update(&event(&format!("p{}", i), "X", amount, 0, NOW));
        }
        let amounts: Vec<i64> = rank.rank().iter().map(|t| t.cumulative_amount).collect();
        assert_eq!(amounts, vec![500, 250, 30, 10]);
    }

    #[test]
    fn test_reset_empties_leaderboard() {
        let rank = PayRank::new();
        rank.update(&event("p1", "A", 10, 0, NOW));
        assert_eq!(rank.reset(), 1);
        assert!(rank.rank().is_empty());

        rank.update(&event("p1", "A", 5, 0, NOW + 86400));
        assert_eq!(rank.rank()[0].cumulative_amount, 5);
    }

    #[tokio::test]
    async fn test_rebuild_matches_incremental_updates() {
        let db = Database::open_in_memory().await.unwrap();
        let events = vec![
            event("p1", "A", 100, 0, NOW),
            event("p2", "B", 100, 1, NOW + 1),
            event("p1", "A2", 25, 2, NOW + 2),
            event("p3", "C", 70, 0, NOW + 3),
        ];

        let online = PayRank::new();
        for e in &events {
            online.update(e);
            db.insert_payment(e.clone()).await.unwrap();
        }
        // Outside the scope
        db.insert_payment(event("p9", "Z", 999, 0, NOW - 100)).await.unwrap();

        let rebuilt = PayRank::new();
        assert_eq!(rebuilt.rebuild_from_store(&db, NOW).await.unwrap(), 3);

        assert_eq!(totals_by_role(&rebuilt.rank()), totals_by_role(&online.rank()));
        assert_eq!(rebuilt.rank()[0].name, "A2");
        assert_eq!(rebuilt.rank()[0].vip_level, 2);
    }

    #[test]
    fn test_fold_payments_uses_same_rule() {
        let events = vec![
            event("p1", "A", 10, 0, NOW),
            event("p2", "B", 40, 0, NOW + 1),
            event("p1", "A", 35, 1, NOW + 2),
        ];
        let board = fold_payments(&events);
        assert_eq!(board[0].role_id, "p1");
        assert_eq!(board[0].cumulative_amount, 45);
        assert_eq!(board[1].cumulative_amount, 40);
        assert!(fold_payments(&[]).is_empty());
    }
}
