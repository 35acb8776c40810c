use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::{error, info};

use crate::{Context, Error};
use crate::database::AuditReport;
use crate::loans::{Loan, LoanStats};
use super::{is_admin, reply_ephemeral, GENERIC_FAILURE, NO_PERMISSION};

/// โอนเครดิตให้ผู้ใช้ (แอดมิน)
#[poise::command(slash_command, rename = "โอนเครดิต")]
pub async fn transfer(
    ctx: Context<'_>,
    #[rename = "ผู้ใช้"]
    #[description = "ผู้รับเครดิต"]
    user: serenity::User,
    #[rename = "จำนวน"]
    #[description = "จำนวนเครดิต"]
    #[min = 1]
    amount: i64,
) -> Result<(), Error> {
    let data = &ctx.data();

    // Check if user has admin permissions
    if !is_admin(ctx).await? {
        reply_ephemeral(ctx, NO_PERMISSION).await?;
        return Ok(());
    }

    if amount <= 0 {
        reply_ephemeral(ctx, "❌ จำนวนเครดิตต้องมากกว่า 0").await?;
        return Ok(());
    }

    let to_user_id = user.id.to_string();

    match data.database.has_pending_loan(&to_user_id).await {
        Ok(true) => {
            reply_ephemeral(ctx, format!("❌ <@{}> มีหนี้ค้างอยู่ ไม่สามารถโอนเครดิตได้", to_user_id)).await?;
            return Ok(());
        }
        Ok(false) => {}
        Err(e) => {
            error!("Database error: {}", e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
            return Ok(());
        }
    }

    match data
        .database
        .mint(&to_user_id, amount, "Admin grant", &ctx.author().id.to_string())
        .await
    {
        Ok(new_balance) => {
            info!("{} granted {} credits to {}", ctx.author().id, amount, to_user_id);
            ctx.say(format!(
                "✅ โอน {} เครดิตให้ <@{}> แล้ว ยอดคงเหลือ: {} เครดิต",
                amount, to_user_id, new_balance
            ))
            .await?;
        }
        Err(e) => {
            error!("Error minting credits for {}: {}", to_user_id, e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

/// ล้างหนี้ของผู้ใช้ (แอดมิน)
#[poise::command(slash_command, rename = "ล้างหนี้")]
pub async fn clear_debt(
    ctx: Context<'_>,
    #[rename = "ผู้ใช้"]
    #[description = "ผู้ที่ต้องการล้างหนี้"]
    user: serenity::User,
) -> Result<(), Error> {
    let data = &ctx.data();

    if !is_admin(ctx).await? {
        reply_ephemeral(ctx, NO_PERMISSION).await?;
        return Ok(());
    }

    let borrower_id = user.id.to_string();
    match data.database.clear_debts(&borrower_id, Utc::now().timestamp()).await {
        Ok(Some(principal)) => {
            info!("{} cleared the debts of {}", ctx.author().id, borrower_id);
            ctx.say(format!("✅ ล้างหนี้ของ <@{}> แล้ว ({} เครดิต)", borrower_id, principal))
                .await?;
        }
        Ok(None) => {
            ctx.say(format!("<@{}> ไม่มีหนี้ค้างอยู่", borrower_id)).await?;
        }
        Err(e) => {
            error!("Error clearing debts of {}: {}", borrower_id, e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

/// ดูธุรกรรมการกู้ยืมทั้งหมด (แอดมิน)
#[poise::command(slash_command, rename = "ธุรกรรม")]
pub async fn transactions(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();

    if !is_admin(ctx).await? {
        reply_ephemeral(ctx, NO_PERMISSION).await?;
        return Ok(());
    }

    match data.database.get_all_loans().await {
        Ok(loans) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format_loans(&loans))
                    .ephemeral(true),
            )
            .await?;
        }
        Err(e) => {
            error!("Error getting loans: {}", e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

/// สถิติการกู้ยืม (แอดมิน)
#[poise::command(slash_command, rename = "สถิติ")]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();

    if !is_admin(ctx).await? {
        reply_ephemeral(ctx, NO_PERMISSION).await?;
        return Ok(());
    }

    match data.database.get_all_loans().await {
        Ok(loans) => {
            let stats = LoanStats::from_loans(&loans, Utc::now().timestamp(), data.config.interest_rate_per_hour);
            ctx.send(
                poise::CreateReply::default()
                    .content(format_stats(&stats))
                    .ephemeral(true),
            )
            .await?;
        }
        Err(e) => {
            error!("Error getting loan stats: {}", e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

/// ตรวจสอบลายเซ็นธุรกรรมและยอดเครดิต (แอดมิน)
#[poise::command(slash_command, rename = "ตรวจสอบบัญชี")]
pub async fn audit(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();

    if !is_admin(ctx).await? {
        reply_ephemeral(ctx, NO_PERMISSION).await?;
        return Ok(());
    }

    ctx.defer_ephemeral().await?;

    match data.database.audit_ledger().await {
        Ok(report) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format_audit(&report))
                    .ephemeral(true),
            )
            .await?;
        }
        Err(e) => {
            error!("Ledger audit failed: {}", e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

pub fn format_loans(loans: &[Loan]) -> String {
    if loans.is_empty() {
        return "ยังไม่มีธุรกรรม".to_string();
    }

    let mut msg = "**📋 ธุรกรรมทั้งหมด:**\n".to_string();
    for loan in loans {
        msg.push_str(&format!(
            "- <@{}> กู้จาก <@{}> : {} เครดิต | สถานะ: {}\n",
            loan.borrower_id,
            loan.lender_id,
            loan.amount,
            loan.status.as_str()
        ));
    }
    msg
}

pub fn format_stats(stats: &LoanStats) -> String {
    let mut msg = format!(
        "**📊 สถิติการกู้ยืม**\n\
        รายการทั้งหมด: {} ({} เครดิต)\n\
        ค้างชำระ: {} ({} เครดิต)\n\
        ดอกเบี้ยสะสม: {} เครดิต\n",
        stats.total_loans,
        stats.total_amount,
        stats.pending_loans,
        stats.pending_amount,
        stats.pending_interest
    );

    if !stats.high_interest.is_empty() {
        msg.push_str("**⚠️ ดอกเบี้ยเกินเงินต้น:**\n");
        for loan in &stats.high_interest {
            msg.push_str(&format!(
                "- <@{}> : เงินต้น {} ดอกเบี้ย {}\n",
                loan.borrower_id, loan.amount, loan.interest
            ));
        }
    }
    msg
}

pub fn format_audit(report: &AuditReport) -> String {
    let mut msg = format!(
        "🔍 ตรวจสอบ {} ธุรกรรม, แก้ไขยอดเครดิต {} บัญชี\n",
        report.transactions_checked, report.balances_corrected
    );
    if report.invalid_signatures.is_empty() {
        msg.push_str("✅ ลายเซ็นถูกต้องทั้งหมด");
    } else {
        msg.push_str(&format!("❌ ลายเซ็นไม่ถูกต้อง {} รายการ:\n", report.invalid_signatures.len()));
        for id in &report.invalid_signatures {
            msg.push_str(&format!("- `{}`\n", id));
        }
    }
    if !report.accounts_skipped.is_empty() {
        msg.push_str("⚠️ ไม่แก้ไขยอดของบัญชีที่เกี่ยวข้องกับธุรกรรมปลอม:\n");
        for account in &report.accounts_skipped {
            msg.push_str(&format!("- <@{}>\n", account));
        }
    }
    msg
}
