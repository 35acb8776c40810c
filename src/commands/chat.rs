use tracing::{error, info};

use crate::ai::truncate_reply;
use crate::{Context, Error};
use super::reply_ephemeral;

pub const AI_UNAVAILABLE: &str = "ขออภัยค่ะ 🙏 ตอนนี้ระบบ AI มีปัญหา ลองใหม่อีกครั้งนะคะ";
pub const AI_DISABLED: &str = "❌ ยังไม่ได้ตั้งค่าระบบ AI";

/// คุยกับเลขา AI
#[poise::command(slash_command, rename = "ai")]
pub async fn ai(
    ctx: Context<'_>,
    #[rename = "ข้อความ"]
    #[description = "ข้อความที่ต้องการถาม"]
    message: String,
) -> Result<(), Error> {
    let Some(chat) = ctx.data().chat.as_ref() else {
        reply_ephemeral(ctx, AI_DISABLED).await?;
        return Ok(());
    };

    // The completion can take longer than Discord's 3 second window.
    ctx.defer().await?;

    match chat.ask(&message).await {
        Ok(reply) => {
            info!("Answered /ai for {}", ctx.author().id);
            ctx.say(truncate_reply(&reply)).await?;
        }
        Err(e) => {
            error!("AI request from {} failed: {}", ctx.author().id, e);
            ctx.say(AI_UNAVAILABLE).await?;
        }
    }

    Ok(())
}
