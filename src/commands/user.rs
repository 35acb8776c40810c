//this is the file for user commands
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::{error, info};

use crate::{Context, Data, Error};
use crate::components::{ButtonAction, ButtonSpec};
use crate::error::RepaymentError;
use crate::loans::{Loan, LoanStatus};
use super::loan::respond_ephemeral;
use super::{is_component_admin, notify_admins_except, send_dm, GENERIC_FAILURE};

pub const REPAYMENT_BUTTON_LABEL: &str = "อนุมัติชำระหนี้";

/// เช็คเครดิตของตัวเอง
#[poise::command(slash_command, rename = "เครดิต")]
pub async fn balance(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();
    let user_id = ctx.author().id.to_string();

    match data.database.get_balance(&user_id).await {
        Ok(balance) => {
            let response = format!("เครดิตของคุณ: {} เครดิต", balance);
            ctx.say(response).await?;
        }
        Err(e) => {
            error!("Error getting balance: {}", e);
            ctx.say("เกิดข้อผิดพลาดในการดึงยอดเครดิต").await?;
        }
    }

    Ok(())
}

/// อันดับเครดิตสูงสุด
#[poise::command(slash_command, rename = "อันดับ")]
pub async fn baltop(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();

    match data.database.get_all_balances(Some(10)).await {
        Ok(balances) => {
            if balances.is_empty() {
                ctx.say("ยังไม่มีใครมีเครดิตเลย").await?;
                return Ok(());
            }

            let mut response = "**🏦 อันดับเครดิต**\n".to_string();
            for (rank, (discord_id, balance)) in balances.iter().enumerate() {
                response.push_str(&format!(
                    "**{}. <@{}> : ``{}``**\n",
                    rank + 1,
                    discord_id,
                    balance
                ));
            }

            ctx.say(response).await?;
        }
        Err(e) => {
            error!("Error getting leaderboard: {}", e);
            ctx.say("เกิดข้อผิดพลาดในการดึงอันดับ กรุณาลองใหม่อีกครั้ง").await?;
        }
    }

    Ok(())
}

/// เช็คยอดหนี้ค้างชำระของทุกคน
#[poise::command(slash_command, rename = "ยอดค้าง")]
pub async fn debts(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();

    match data.database.get_pending_loans().await {
        Ok(loans) => {
            let response = format_debts(&loans, Utc::now().timestamp(), data.config.interest_rate_per_hour);
            ctx.say(response).await?;
        }
        Err(e) => {
            error!("Error getting pending loans: {}", e);
            ctx.say(GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

/// ดูประวัติการกู้ยืมของตัวเอง
#[poise::command(slash_command, rename = "ประวัติ")]
pub async fn history(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();
    let user_id = ctx.author().id.to_string();

    match data.database.get_user_loans(&user_id).await {
        Ok(loans) => {
            let response = format_history(
                &user_id,
                &loans,
                Utc::now().timestamp(),
                data.config.interest_rate_per_hour,
            );
            ctx.say(response).await?;
        }
        Err(e) => {
            error!("Error getting loan history: {}", e);
            ctx.say(GENERIC_FAILURE).await?;
        }
    }

    Ok(())
}

/// สร้างคำขอชำระหนี้
#[poise::command(slash_command, rename = "ขอชำระหนี้")]
pub async fn repay(ctx: Context<'_>) -> Result<(), Error> {
    let data = &ctx.data();
    let user_id = ctx.author().id.to_string();

    let loans = match data.database.get_user_loans(&user_id).await {
        Ok(loans) => loans,
        Err(e) => {
            error!("Error getting loans for repayment: {}", e);
            ctx.say(GENERIC_FAILURE).await?;
            return Ok(());
        }
    };

    // A borrower holds at most one pending loan; claims refuse a second one.
    let Some(loan) = loans.iter().find(|loan| loan.status == LoanStatus::Pending) else {
        ctx.send(
            poise::CreateReply::default()
                .content("คุณไม่มีหนี้ค้างชำระ 🎉")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    let interest = loan.interest_at(Utc::now().timestamp(), data.config.interest_rate_per_hour);

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "📝 คำขอชำระหนี้จาก <@{}>\nเงินต้น: {} เครดิต | ดอกเบี้ย: {} เครดิต | รวม: {} เครดิต\n(ดอกเบี้ยคิดถึงเวลาที่อนุมัติ)",
                user_id,
                loan.amount,
                interest,
                loan.amount + interest
            ))
            .components(vec![repayment_button(&loan.id).to_row()]),
    )
    .await?;

    Ok(())
}

fn repayment_button(loan_id: &str) -> ButtonSpec {
    ButtonSpec::new(
        ButtonAction::ApproveRepayment { loan_id: loan_id.to_string() },
        REPAYMENT_BUTTON_LABEL,
        serenity::ButtonStyle::Success,
    )
}

/// Handles a click on an `approve-repayment` button.
pub async fn handle_repayment_approval(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
    loan_id: &str,
) -> Result<(), Error> {
    if !is_component_admin(ctx, component, &data.config).await {
        respond_ephemeral(ctx, component, "คุณไม่มีสิทธิ์อนุมัติ").await?;
        return Ok(());
    }

    let now = Utc::now().timestamp();
    match data
        .database
        .repay_loan(loan_id, now, data.config.interest_rate_per_hour)
        .await
    {
        Ok(summary) => {
            let content = format!(
                "✅ <@{}> ชำระหนี้ให้ <@{}> รวม {} เครดิต (เงินต้น {} ดอกเบี้ย {}) อนุมัติโดย <@{}>",
                summary.borrower_id,
                summary.lender_id,
                summary.total(),
                summary.principal,
                summary.interest,
                component.user.id
            );

            component
                .create_response(
                    ctx,
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .content(content.clone())
                            .components(vec![repayment_button(loan_id).disabled().to_row()]),
                    ),
                )
                .await?;

            info!("Repayment of loan {} approved by {}", loan_id, component.user.id);

            if let Some(id) = summary.borrower_id.parse::<u64>().ok().filter(|id| *id != 0) {
                send_dm(
                    &ctx.http,
                    serenity::UserId::new(id),
                    &format!("🎉 การชำระหนี้ของคุณได้รับการอนุมัติแล้ว รวม {} เครดิต", summary.total()),
                )
                .await;
            }
            notify_admins_except(&ctx.http, &data.config, &content, Some(component.user.id)).await;
        }
        Err(e @ RepaymentError::Store(_)) | Err(e @ RepaymentError::Signing(_)) => {
            error!("Failed to settle loan {}: {}", loan_id, e);
            respond_ephemeral(ctx, component, GENERIC_FAILURE).await?;
        }
        Err(e) => {
            respond_ephemeral(ctx, component, &format!("❌ {}", e)).await?;
        }
    }

    Ok(())
}

pub fn format_debts(loans: &[Loan], now_unix: i64, rate_per_hour: f64) -> String {
    if loans.is_empty() {
        return "ทุกคนเคลียร์หนี้แล้วจ้า 🎉".to_string();
    }

    let mut msg = "**📌 รายชื่อผู้ค้างหนี้:**\n".to_string();
    for loan in loans {
        let interest = loan.interest_at(now_unix, rate_per_hour);
        msg.push_str(&format!(
            "- <@{}> : {} เครดิต (ดอกเบี้ย {} เครดิต, รวม {} เครดิต)\n",
            loan.borrower_id,
            loan.amount,
            interest,
            loan.amount + interest
        ));
    }
    msg
}

pub fn format_history(user_id: &str, loans: &[Loan], now_unix: i64, rate_per_hour: f64) -> String {
    if loans.is_empty() {
        return "ไม่มีประวัติกู้ยืมเลยนะคุณ 🧐".to_string();
    }

    let mut msg = format!("**📜 ประวัติของคุณ <@{}>:**\n", user_id);
    for loan in loans {
        msg.push_str(&format!(
            "- ยอด {} | ดอกเบี้ย {} | สถานะ: {}\n",
            loan.amount,
            loan.interest_at(now_unix, rate_per_hour),
            loan.status.as_str()
        ));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repayment_button_targets_one_loan() {
        let button = repayment_button("loan-7");
        assert_eq!(button.action.custom_id(), "approve-repayment:loan-7");
        assert_eq!(button.label, "อนุมัติชำระหนี้");
        assert!(repayment_button("loan-7").disabled().disabled);
    }

    fn loan(borrower: &str, amount: i64, status: LoanStatus) -> Loan {
        Loan {
            id: format!("{}-{}", borrower, amount),
            offer_id: None,
            borrower_id: borrower.to_string(),
            lender_id: "lender".to_string(),
            amount,
            status,
            created_at_unix: 0,
            settled_at_unix: None,
        }
    }

    #[test]
    fn debts_list_interest_and_total() {
        let text = format_debts(&[loan("7", 100, LoanStatus::Pending)], 3600, 0.10);
        assert!(text.contains("<@7> : 100 เครดิต (ดอกเบี้ย 10 เครดิต, รวม 110 เครดิต)"));
    }

    #[test]
    fn no_debts_message() {
        assert_eq!(format_debts(&[], 0, 0.10), "ทุกคนเคลียร์หนี้แล้วจ้า 🎉");
    }

    #[test]
    fn history_shows_status_and_stops_interest_when_settled() {
        let text = format_history(
            "7",
            &[loan("7", 100, LoanStatus::Completed), loan("7", 50, LoanStatus::Pending)],
            3600,
            0.10,
        );
        assert!(text.contains("- ยอด 100 | ดอกเบี้ย 0 | สถานะ: completed"));
        assert!(text.contains("- ยอด 50 | ดอกเบี้ย 5 | สถานะ: pending"));
    }
}
