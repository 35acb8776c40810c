//this is the file for the first-click loan offer
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tracing::{error, info, warn};

use crate::{Context, Data, Error};
use crate::error::{ClaimError, OfferError};
use crate::offer::{LoanOffer, LoanRequest, OfferDesk};
use crate::database::Database;
use super::{notify_admins, reply_ephemeral, GENERIC_FAILURE};

/// ปล่อยกู้ให้ user คนแรกที่กด
#[poise::command(slash_command, rename = "ปล่อยกู้")]
pub async fn loan(
    ctx: Context<'_>,
    #[rename = "จำนวน"]
    #[description = "จำนวนเครดิต"]
    #[min = 0]
    amount: Option<i64>,
) -> Result<(), Error> {
    let data = ctx.data();
    let request = LoanRequest {
        issuer_id: ctx.author().id.to_string(),
        channel_id: ctx.channel_id().to_string(),
        amount,
    };

    let offer = match data.offers.open_offer(request).await {
        Ok(offer) => offer,
        Err(OfferError::Store(e)) => {
            error!("Database error opening loan offer: {}", e);
            reply_ephemeral(ctx, GENERIC_FAILURE).await?;
            return Ok(());
        }
        Err(e) => {
            reply_ephemeral(ctx, format!("❌ {}", e)).await?;
            return Ok(());
        }
    };

    let handle = match ctx.send(offer.prompt().to_reply()).await {
        Ok(handle) => handle,
        Err(e) => {
            // The button never reached the channel.
            if let Err(expire_err) = data.offers.expire(&offer.id).await {
                error!("Failed to withdraw unsent loan offer {}: {}", offer.id, expire_err);
            }
            return Err(e.into());
        }
    };

    let location = match handle.message().await {
        Ok(message) => {
            if let Err(e) = data.offers.attach_message(&offer.id, &message.id.to_string()).await {
                error!("Failed to record message for loan offer {}: {}", offer.id, e);
            }
            Some((message.channel_id, message.id))
        }
        Err(e) => {
            warn!("Could not resolve message for loan offer {}: {}", offer.id, e);
            None
        }
    };

    let http = ctx.serenity_context().http.clone();
    schedule_offer_expiry(&data.offers, &offer, http, location).await;

    Ok(())
}

/// Arms the expiry timer of `offer`; when it fires the button is disabled.
pub async fn schedule_offer_expiry(
    offers: &OfferDesk<Database>,
    offer: &LoanOffer,
    http: Arc<serenity::Http>,
    location: Option<(serenity::ChannelId, serenity::MessageId)>,
) {
    offers
        .schedule_expiry(offer, move |expired| async move {
            if let Some((channel_id, message_id)) = location {
                disable_expired_offer(&http, channel_id, message_id, &expired).await;
            }
        })
        .await;
}

pub async fn disable_expired_offer(
    http: &serenity::Http,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
    offer: &LoanOffer,
) {
    if let Err(e) = channel_id
        .edit_message(http, message_id, offer.expired_prompt().to_edit())
        .await
    {
        warn!("Failed to disable expired loan offer {}: {}", offer.id, e);
    }
}

/// Handles a click on a `request-loan` button.
pub async fn handle_loan_click(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
    offer_id: &str,
) -> Result<(), Error> {
    let claimant_id = component.user.id.to_string();

    match data.offers.claim(offer_id, &claimant_id).await {
        Ok(receipt) => {
            let prompt = receipt.offer.claimed_prompt(&claimant_id);
            component
                .create_response(ctx, serenity::CreateInteractionResponse::UpdateMessage(prompt.to_response()))
                .await?;

            component
                .create_followup(
                    ctx,
                    serenity::CreateInteractionResponseFollowup::new()
                        .content(format!("🎉 คุณได้รับเงินกู้ {} เครดิต!", receipt.loan.amount))
                        .ephemeral(true),
                )
                .await?;

            notify_admins(
                &ctx.http,
                &data.config,
                &format!(
                    "💰 <@{}> ได้กู้เงิน {} เครดิต จาก <@{}>",
                    claimant_id, receipt.loan.amount, receipt.loan.lender_id
                ),
            )
            .await;
        }
        Err(ClaimError::Expired) => {
            info!("Late click by {} on expired loan offer {}", claimant_id, offer_id);
            let offer = match data.offers.expire(offer_id).await {
                Ok(Some(expired)) => Some(expired),
                Ok(None) => data.offers.get(offer_id).await.unwrap_or_else(|e| {
                    error!("Failed to load loan offer {}: {}", offer_id, e);
                    None
                }),
                Err(e) => {
                    error!("Failed to expire loan offer {}: {}", offer_id, e);
                    None
                }
            };

            match offer {
                Some(offer) => {
                    component
                        .create_response(
                            ctx,
                            serenity::CreateInteractionResponse::UpdateMessage(offer.current_prompt().to_response()),
                        )
                        .await?;
                    component
                        .create_followup(
                            ctx,
                            serenity::CreateInteractionResponseFollowup::new()
                                .content(ClaimError::Expired.to_string())
                                .ephemeral(true),
                        )
                        .await?;
                }
                None => respond_ephemeral(ctx, component, &ClaimError::Expired.to_string()).await?,
            }
        }
        Err(e) if e.is_internal() => {
            error!("Failed to process claim on loan offer {}: {}", offer_id, e);
            respond_ephemeral(ctx, component, GENERIC_FAILURE).await?;
        }
        Err(e) => {
            respond_ephemeral(ctx, component, &e.to_string()).await?;
        }
    }

    Ok(())
}

pub async fn respond_ephemeral(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    text: &str,
) -> Result<(), Error> {
    component
        .create_response(
            ctx,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Expires offers that ran out while the bot was down and re-arms timers
/// for the rest.
pub async fn recover_offers(http: Arc<serenity::Http>, offers: &OfferDesk<Database>) {
    let (stale, live) = match offers.recover().await {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to recover loan offers: {}", e);
            return;
        }
    };

    for offer in &stale {
        if let Some((channel_id, message_id)) = message_location(offer) {
            disable_expired_offer(&http, channel_id, message_id, offer).await;
        }
    }

    for offer in &live {
        schedule_offer_expiry(offers, offer, http.clone(), message_location(offer)).await;
    }

    info!("Recovered loan offers: {} expired, {} still open", stale.len(), live.len());
}

fn message_location(offer: &LoanOffer) -> Option<(serenity::ChannelId, serenity::MessageId)> {
    let channel_id = offer.channel_id.parse::<u64>().ok().filter(|id| *id != 0)?;
    let message_id = offer.message_id.as_ref()?.parse::<u64>().ok().filter(|id| *id != 0)?;
    Some((serenity::ChannelId::new(channel_id), serenity::MessageId::new(message_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::OfferStatus;

    #[test]
    fn message_location_needs_both_ids() {
        let mut offer = LoanOffer::new("1".into(), "123".into(), 10, 60, 0);
        assert!(message_location(&offer).is_none());

        offer.message_id = Some("456".into());
        let (channel, message) = message_location(&offer).unwrap();
        assert_eq!(channel.get(), 123);
        assert_eq!(message.get(), 456);

        offer.channel_id = "not-a-number".into();
        assert!(message_location(&offer).is_none());
        assert_eq!(offer.status, OfferStatus::Open);
    }
}
