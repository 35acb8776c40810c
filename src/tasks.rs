//! Background jobs that run for the life of the bot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use poise::serenity_prelude as serenity;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::commands::{notify_admins, send_dm};
use crate::config::BotConfig;
use crate::database::Database;
use crate::loans::{high_interest_loans, HighInterestLoan};

/// Periodically warns borrowers (and admins) whose interest has outgrown
/// the principal.
pub fn spawn_interest_watcher(
    http: Arc<serenity::Http>,
    database: Arc<Database>,
    config: BotConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(config.interest_check_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!("Interest watcher running every {:?}", period);

        loop {
            ticker.tick().await;
            check_interest(&http, &database, &config).await;
        }
    })
}

async fn check_interest(http: &serenity::Http, database: &Database, config: &BotConfig) {
    let loans = match database.get_pending_loans().await {
        Ok(loans) => loans,
        Err(e) => {
            error!("Interest check failed to load pending loans: {}", e);
            return;
        }
    };

    let flagged = high_interest_loans(&loans, Utc::now().timestamp(), config.interest_rate_per_hour);
    debug!("Interest check: {} of {} pending loans over principal", flagged.len(), loans.len());

    for loan in &flagged {
        if let Some(user_id) = loan.borrower_id.parse::<u64>().ok().filter(|id| *id != 0) {
            send_dm(http, serenity::UserId::new(user_id), &borrower_reminder(loan)).await;
        }
        notify_admins(http, config, &admin_reminder(loan)).await;
    }
}

pub fn borrower_reminder(loan: &HighInterestLoan) -> String {
    format!(
        "⚠️ ดอกเบี้ยของคุณ ({} เครดิต) สูงกว่าเงินต้น ({} เครดิต) แล้ว กรุณาใช้ `/ขอชำระหนี้` โดยเร็ว",
        loan.interest, loan.amount
    )
}

pub fn admin_reminder(loan: &HighInterestLoan) -> String {
    format!(
        "⚠️ <@{}> มีดอกเบี้ย {} เครดิต สูงกว่าเงินต้น {} เครดิต",
        loan.borrower_id, loan.interest, loan.amount
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminders_name_interest_and_principal() {
        let loan = HighInterestLoan {
            borrower_id: "99".into(),
            amount: 100,
            interest: 110,
        };
        assert!(borrower_reminder(&loan).contains("(110 เครดิต) สูงกว่าเงินต้น (100 เครดิต)"));
        assert_eq!(
            admin_reminder(&loan),
            "⚠️ <@99> มีดอกเบี้ย 110 เครดิต สูงกว่าเงินต้น 100 เครดิต"
        );
    }
}
