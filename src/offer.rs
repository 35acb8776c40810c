use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{error, info};
use uuid::Uuid;

use crate::components::{ButtonAction, ButtonSpec};
use crate::error::{ClaimError, OfferError};
use crate::loans::Loan;

pub const LOAN_BUTTON_LABEL: &str = "ขอกู้เงิน";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Open,
    Claimed,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Open => "open",
            OfferStatus::Claimed => "claimed",
            OfferStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(OfferStatus::Open),
            "claimed" => Some(OfferStatus::Claimed),
            "expired" => Some(OfferStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanOffer {
    pub id: String,
    pub issuer_id: String,
    pub amount: i64,
    pub channel_id: String,
    pub message_id: Option<String>,
    pub status: OfferStatus,
    pub claimed_by: Option<String>,
    pub created_at_unix: i64,
    pub expires_at_unix: i64,
    pub claimed_at_unix: Option<i64>,
}

impl LoanOffer {
    pub fn new(issuer_id: String, channel_id: String, amount: i64, ttl_secs: i64, now_unix: i64) -> Self {
        LoanOffer {
            id: Uuid::new_v4().to_string(),
            issuer_id,
            amount,
            channel_id,
            message_id: None,
            status: OfferStatus::Open,
            claimed_by: None,
            created_at_unix: now_unix,
            expires_at_unix: now_unix + ttl_secs,
            claimed_at_unix: None,
        }
    }

    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.status == OfferStatus::Expired || now_unix >= self.expires_at_unix
    }

    /// Whether `claimant_id` may claim this offer at `now_unix`.
    ///
    /// This only inspects the offer itself; the store still has to win the
    /// conditional update for the claim to count.
    pub fn check_claim(&self, claimant_id: &str, now_unix: i64) -> Result<(), ClaimError> {
        match self.status {
            OfferStatus::Claimed => return Err(ClaimError::AlreadyClaimed),
            OfferStatus::Expired => return Err(ClaimError::Expired),
            OfferStatus::Open => {}
        }
        if self.is_expired_at(now_unix) {
            return Err(ClaimError::Expired);
        }
        if self.issuer_id == claimant_id {
            return Err(ClaimError::OwnOffer);
        }
        Ok(())
    }

    fn button(&self) -> ButtonSpec {
        ButtonSpec::new(
            ButtonAction::RequestLoan { offer_id: self.id.clone() },
            LOAN_BUTTON_LABEL,
            serenity::ButtonStyle::Primary,
        )
    }

    /// The message posted when the offer opens.
    pub fn prompt(&self) -> OfferPrompt {
        OfferPrompt {
            content: format!(
                "ปล่อยกู้ด่วน! {} เครดิต คนแรกที่กดจะได้สิทธิ์ทันที!",
                self.amount
            ),
            button: self.button(),
        }
    }

    /// The same message after `winner_id` claimed it.
    pub fn claimed_prompt(&self, winner_id: &str) -> OfferPrompt {
        OfferPrompt {
            content: format!(
                "ปล่อยกู้ด่วน! {} เครดิต\n✅ <@{}> ได้รับสิทธิ์ไปแล้ว!",
                self.amount, winner_id
            ),
            button: self.button().disabled(),
        }
    }

    /// The message as it should look for the offer's current state.
    pub fn current_prompt(&self) -> OfferPrompt {
        match (&self.status, &self.claimed_by) {
            (OfferStatus::Claimed, Some(winner)) => self.claimed_prompt(winner),
            (OfferStatus::Open, _) => self.prompt(),
            _ => self.expired_prompt(),
        }
    }

    pub fn expired_prompt(&self) -> OfferPrompt {
        OfferPrompt {
            content: format!(
                "ปล่อยกู้ด่วน! {} เครดิต\n⌛ หมดเวลาแล้ว ไม่มีผู้รับสิทธิ์",
                self.amount
            ),
            button: self.button().disabled(),
        }
    }
}

/// Text plus the one button of a loan offer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferPrompt {
    pub content: String,
    pub button: ButtonSpec,
}

impl OfferPrompt {
    pub fn to_reply(&self) -> poise::CreateReply {
        poise::CreateReply::default()
            .content(self.content.clone())
            .components(vec![self.button.to_row()])
    }

    pub fn to_response(&self) -> serenity::CreateInteractionResponseMessage {
        serenity::CreateInteractionResponseMessage::new()
            .content(self.content.clone())
            .components(vec![self.button.to_row()])
    }

    pub fn to_edit(&self) -> serenity::EditMessage {
        serenity::EditMessage::new()
            .content(self.content.clone())
            .components(vec![self.button.to_row()])
    }
}

/// The fields the loan command reads from its invocation.
#[derive(Debug, Clone)]
pub struct LoanRequest {
    pub issuer_id: String,
    pub channel_id: String,
    pub amount: Option<i64>,
}

/// Outcome of a winning claim.
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub offer: LoanOffer,
    pub loan: Loan,
}

/// Persistence the offer desk relies on.
#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn balance_of(&self, user_id: &str) -> Result<i64, sqlx::Error>;

    async fn insert_offer(&self, offer: &LoanOffer) -> Result<(), sqlx::Error>;

    async fn set_offer_message(&self, offer_id: &str, message_id: &str) -> Result<(), sqlx::Error>;

    async fn find_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error>;

    /// Atomically claims an open offer and moves the credits. Any failure
    /// leaves the offer exactly as it was.
    async fn claim_offer(&self, offer_id: &str, claimant_id: &str, now_unix: i64) -> Result<ClaimReceipt, ClaimError>;

    /// Moves an open offer to expired. Returns the offer only if this call
    /// made the transition.
    async fn expire_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error>;

    async fn expire_stale_offers(&self, now_unix: i64) -> Result<Vec<LoanOffer>, sqlx::Error>;

    async fn open_offers(&self) -> Result<Vec<LoanOffer>, sqlx::Error>;
}

pub struct OfferDesk<S> {
    store: Arc<S>,
    // Offer id to its pending expiry task
    timers: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    offer_ttl_secs: i64,
    default_amount: i64,
}

impl<S> Clone for OfferDesk<S> {
    fn clone(&self) -> Self {
        OfferDesk {
            store: self.store.clone(),
            timers: self.timers.clone(),
            offer_ttl_secs: self.offer_ttl_secs,
            default_amount: self.default_amount,
        }
    }
}

impl<S: LoanStore + 'static> OfferDesk<S> {
    pub fn new(store: Arc<S>, offer_ttl_secs: i64, default_amount: i64) -> Self {
        OfferDesk {
            store,
            timers: Arc::new(RwLock::new(HashMap::new())),
            offer_ttl_secs,
            default_amount,
        }
    }

    pub fn resolve_amount(&self, amount: Option<i64>) -> Result<i64, OfferError> {
        let amount = amount.unwrap_or(self.default_amount);
        if amount < 0 {
            return Err(OfferError::NegativeAmount);
        }
        Ok(amount)
    }

    pub async fn open_offer(&self, request: LoanRequest) -> Result<LoanOffer, OfferError> {
        let amount = self.resolve_amount(request.amount)?;

        if amount > 0 {
            let available = self.store.balance_of(&request.issuer_id).await?;
            if available < amount {
                return Err(OfferError::InsufficientFunds { needed: amount, available });
            }
        }

        let offer = LoanOffer::new(
            request.issuer_id,
            request.channel_id,
            amount,
            self.offer_ttl_secs,
            Utc::now().timestamp(),
        );
        self.store.insert_offer(&offer).await?;

        info!("Opened loan offer {} for {} credits by {}", offer.id, offer.amount, offer.issuer_id);
        Ok(offer)
    }

    pub async fn get(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
        self.store.find_offer(offer_id).await
    }

    pub async fn attach_message(&self, offer_id: &str, message_id: &str) -> Result<(), sqlx::Error> {
        self.store.set_offer_message(offer_id, message_id).await
    }

    pub async fn claim(&self, offer_id: &str, claimant_id: &str) -> Result<ClaimReceipt, ClaimError> {
        let receipt = self
            .store
            .claim_offer(offer_id, claimant_id, Utc::now().timestamp())
            .await?;

        self.cancel_timer(offer_id).await;
        info!(
            "Loan offer {} claimed by {} ({} credits)",
            offer_id, claimant_id, receipt.offer.amount
        );
        Ok(receipt)
    }

    pub async fn expire(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
        self.cancel_timer(offer_id).await;
        self.store.expire_offer(offer_id).await
    }

    /// Arms a timer that expires `offer` at its deadline and then runs
    /// `on_expired` with the expired offer.
    pub async fn schedule_expiry<F, Fut>(&self, offer: &LoanOffer, on_expired: F)
    where
        F: FnOnce(LoanOffer) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wait_secs = (offer.expires_at_unix - Utc::now().timestamp()).max(0) as u64;
        let offer_id = offer.id.clone();
        let store = self.store.clone();
        let timers = self.timers.clone();

        let mut pending = self.timers.write().await;
        let task_offer_id = offer_id.clone();
        let handle = tokio::spawn(async move {
            sleep(TokioDuration::from_secs(wait_secs)).await;

            match store.expire_offer(&task_offer_id).await {
                Ok(Some(expired)) => {
                    info!("Loan offer {} expired unclaimed", task_offer_id);
                    on_expired(expired).await;
                }
                Ok(None) => {}
                Err(e) => error!("Failed to expire loan offer {}: {}", task_offer_id, e),
            }

            timers.write().await.remove(&task_offer_id);
        });

        if let Some(previous) = pending.insert(offer_id, handle) {
            previous.abort();
        }
    }

    pub async fn pending_timers(&self) -> usize {
        self.timers.read().await.len()
    }

    /// Expires offers whose deadline passed while the bot was offline and
    /// returns the offers that are still live.
    pub async fn recover(&self) -> Result<(Vec<LoanOffer>, Vec<LoanOffer>), sqlx::Error> {
        let stale = self.store.expire_stale_offers(Utc::now().timestamp()).await?;
        let live = self.store.open_offers().await?;
        Ok((stale, live))
    }

    async fn cancel_timer(&self, offer_id: &str) {
        if let Some(handle) = self.timers.write().await.remove(offer_id) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::LedgerSigner;
    use crate::database::Database;

    async fn desk_with_funds(issuer: &str, credits: i64) -> (Arc<Database>, OfferDesk<Database>) {
        let db = Arc::new(
            Database::new("sqlite::memory:", LedgerSigner::new("test"))
                .await
                .unwrap(),
        );
        if credits > 0 {
            db.mint(issuer, credits, "seed", "tester").await.unwrap();
        }
        let desk = OfferDesk::new(db.clone(), 600, 100);
        (db, desk)
    }

    fn request(issuer: &str, amount: Option<i64>) -> LoanRequest {
        LoanRequest {
            issuer_id: issuer.to_string(),
            channel_id: "900".to_string(),
            amount,
        }
    }

    #[test]
    fn prompt_for_100_matches_announcement() {
        let offer = LoanOffer::new("1".into(), "2".into(), 100, 600, 0);
        let prompt = offer.prompt();

        assert_eq!(
            prompt.content,
            "ปล่อยกู้ด่วน! 100 เครดิต คนแรกที่กดจะได้สิทธิ์ทันที!"
        );
        assert_eq!(prompt.button.label, "ขอกู้เงิน");
        assert!(!prompt.button.disabled);
        assert_eq!(
            prompt.button.action,
            ButtonAction::RequestLoan { offer_id: offer.id.clone() }
        );
    }

    #[test]
    fn prompt_contains_any_non_negative_amount() {
        for amount in [0, 1, 7, 100, 1_000_000, i64::MAX / 2] {
            let offer = LoanOffer::new("1".into(), "2".into(), amount, 600, 0);
            let prompt = offer.prompt();
            assert!(prompt.content.contains(&amount.to_string()));
            assert_eq!(prompt.to_reply().components.map(|rows| rows.len()), Some(1));
        }
    }

    #[test]
    fn claimed_and_expired_prompts_disable_the_button() {
        let offer = LoanOffer::new("1".into(), "2".into(), 50, 600, 0);

        let claimed = offer.claimed_prompt("42");
        assert!(claimed.button.disabled);
        assert!(claimed.content.contains("<@42>"));

        assert!(offer.expired_prompt().button.disabled);
    }

    #[test]
    fn check_claim_covers_each_state() {
        let mut offer = LoanOffer::new("issuer".into(), "c".into(), 10, 60, 1_000);

        assert!(offer.check_claim("other", 1_000).is_ok());
        assert!(matches!(offer.check_claim("issuer", 1_000), Err(ClaimError::OwnOffer)));
        assert!(matches!(offer.check_claim("other", 1_060), Err(ClaimError::Expired)));

        offer.status = OfferStatus::Claimed;
        assert!(matches!(offer.check_claim("other", 1_000), Err(ClaimError::AlreadyClaimed)));

        offer.status = OfferStatus::Expired;
        assert!(matches!(offer.check_claim("other", 1_000), Err(ClaimError::Expired)));
    }

    #[tokio::test]
    async fn missing_amount_uses_default() {
        let (_db, desk) = desk_with_funds("1", 500).await;

        let offer = desk.open_offer(request("1", None)).await.unwrap();
        assert_eq!(offer.amount, 100);
        assert_eq!(offer.status, OfferStatus::Open);
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let (_db, desk) = desk_with_funds("1", 500).await;

        let err = desk.open_offer(request("1", Some(-5))).await.unwrap_err();
        assert!(matches!(err, OfferError::NegativeAmount));
    }

    #[tokio::test]
    async fn zero_amount_needs_no_funds() {
        let (_db, desk) = desk_with_funds("1", 0).await;

        let offer = desk.open_offer(request("1", Some(0))).await.unwrap();
        assert_eq!(offer.amount, 0);
    }

    #[tokio::test]
    async fn issuer_must_cover_the_amount() {
        let (_db, desk) = desk_with_funds("1", 30).await;

        let err = desk.open_offer(request("1", Some(31))).await.unwrap_err();
        assert!(matches!(err, OfferError::InsufficientFunds { needed: 31, available: 30 }));
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let (db, desk) = desk_with_funds("issuer", 100).await;
        let offer = desk.open_offer(request("issuer", Some(100))).await.unwrap();

        let (a, b) = tokio::join!(desk.claim(&offer.id, "alice"), desk.claim(&offer.id, "bob"));

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_ok() { &b } else { &a };
        assert!(matches!(loser, Err(ClaimError::AlreadyClaimed)));

        let stored = db.get_offer(&offer.id).await.unwrap().unwrap();
        let winner = if a.is_ok() { "alice" } else { "bob" };
        assert_eq!(stored.status, OfferStatus::Claimed);
        assert_eq!(stored.claimed_by.as_deref(), Some(winner));

        assert_eq!(db.get_balance(winner).await.unwrap(), 100);
        assert_eq!(db.get_balance("issuer").await.unwrap(), 0);
        assert_eq!(db.get_all_loans().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_claims_on_a_pooled_file_database_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("loans.db").display());
        let db = Arc::new(Database::new(&url, LedgerSigner::new("test")).await.unwrap());
        db.mint("issuer", 100, "seed", "tester").await.unwrap();
        let desk = OfferDesk::new(db.clone(), 600, 100);
        let offer = desk.open_offer(request("issuer", Some(100))).await.unwrap();

        let mut clicks = Vec::new();
        for i in 0..8 {
            let desk = desk.clone();
            let offer_id = offer.id.clone();
            clicks.push(tokio::spawn(async move {
                desk.claim(&offer_id, &format!("user-{}", i)).await
            }));
        }

        let mut winners = 0;
        for click in clicks {
            match click.await.unwrap() {
                Ok(_) => winners += 1,
                Err(ClaimError::AlreadyClaimed) => {}
                Err(e) => panic!("unexpected claim failure: {}", e),
            }
        }
        assert_eq!(winners, 1);

        let stored = db.get_offer(&offer.id).await.unwrap().unwrap();
        let winner = stored.claimed_by.clone().unwrap();
        assert_eq!(stored.status, OfferStatus::Claimed);
        assert_eq!(db.get_balance(&winner).await.unwrap(), 100);
        assert_eq!(db.get_balance("issuer").await.unwrap(), 0);
        assert_eq!(db.get_all_loans().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_cancels_the_expiry_timer() {
        let (_db, desk) = desk_with_funds("issuer", 10).await;
        let offer = desk.open_offer(request("issuer", Some(10))).await.unwrap();

        desk.schedule_expiry(&offer, |_| async {}).await;
        assert_eq!(desk.pending_timers().await, 1);

        desk.claim(&offer.id, "someone").await.unwrap();
        assert_eq!(desk.pending_timers().await, 0);
    }

    #[tokio::test]
    async fn timer_expires_unclaimed_offer() {
        let (db, desk) = desk_with_funds("issuer", 10).await;
        let offer = desk.open_offer(request("issuer", Some(10))).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut immediate = offer.clone();
        immediate.expires_at_unix = 0;
        desk.schedule_expiry(&immediate, move |expired| async move {
            let _ = tx.send(expired.id);
        })
        .await;

        let expired_id = tokio::time::timeout(TokioDuration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expired_id, offer.id);

        let stored = db.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Expired);

        let err = desk.claim(&offer.id, "late").await.unwrap_err();
        assert!(matches!(err, ClaimError::Expired));
        assert_eq!(db.get_balance("late").await.unwrap(), 0);
    }

    #[test]
    fn current_prompt_follows_status() {
        let mut offer = LoanOffer::new("1".into(), "2".into(), 20, 600, 0);
        assert_eq!(offer.current_prompt(), offer.prompt());

        offer.status = OfferStatus::Claimed;
        offer.claimed_by = Some("9".into());
        assert_eq!(offer.current_prompt(), offer.claimed_prompt("9"));

        offer.status = OfferStatus::Expired;
        assert_eq!(offer.current_prompt(), offer.expired_prompt());
    }

    /// Delegates to a real database but fails every claim.
    struct BrokenClaims(Database);

    #[async_trait]
    impl LoanStore for BrokenClaims {
        async fn balance_of(&self, user_id: &str) -> Result<i64, sqlx::Error> {
            self.0.balance_of(user_id).await
        }

        async fn insert_offer(&self, offer: &LoanOffer) -> Result<(), sqlx::Error> {
            self.0.insert_offer(offer).await
        }

        async fn set_offer_message(&self, offer_id: &str, message_id: &str) -> Result<(), sqlx::Error> {
            self.0.set_offer_message(offer_id, message_id).await
        }

        async fn find_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
            self.0.find_offer(offer_id).await
        }

        async fn claim_offer(&self, _: &str, _: &str, _: i64) -> Result<ClaimReceipt, ClaimError> {
            Err(ClaimError::Store(sqlx::Error::PoolTimedOut))
        }

        async fn expire_offer(&self, offer_id: &str) -> Result<Option<LoanOffer>, sqlx::Error> {
            self.0.expire_offer(offer_id).await
        }

        async fn expire_stale_offers(&self, now_unix: i64) -> Result<Vec<LoanOffer>, sqlx::Error> {
            self.0.expire_stale_offers(now_unix).await
        }

        async fn open_offers(&self) -> Result<Vec<LoanOffer>, sqlx::Error> {
            self.0.open_offers().await
        }
    }

    #[tokio::test]
    async fn store_failure_keeps_offer_open_and_armed() {
        let db = Database::new("sqlite::memory:", LedgerSigner::new("test"))
            .await
            .unwrap();
        db.mint("issuer", 50, "seed", "tester").await.unwrap();
        let desk = OfferDesk::new(Arc::new(BrokenClaims(db)), 600, 100);

        let offer = desk.open_offer(request("issuer", Some(50))).await.unwrap();
        desk.schedule_expiry(&offer, |_| async {}).await;

        let err = desk.claim(&offer.id, "bob").await.unwrap_err();
        assert!(err.is_internal());
        assert_eq!(desk.pending_timers().await, 1);

        let stored = desk.get(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Open);
        assert_eq!(stored.claimed_by, None);
    }
}
