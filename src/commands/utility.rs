use crate::{Context, Error};

pub const HELP_TEXT: &str = "\
**💸 คำสั่งของบอทปล่อยกู้**\n\
• `/ปล่อยกู้ จำนวน` - ปล่อยกู้ให้คนแรกที่กดปุ่ม\n\
• `/เครดิต` - เช็คเครดิตของตัวเอง\n\
• `/อันดับ` - อันดับเครดิตสูงสุด\n\
• `/ยอดค้าง` - รายชื่อผู้ค้างหนี้\n\
• `/ประวัติ` - ประวัติการกู้ยืมของตัวเอง\n\
• `/ขอชำระหนี้` - ส่งคำขอชำระหนี้ให้แอดมินอนุมัติ\n\
• `/ai ข้อความ` - คุยกับเลขา AI\n\
• `/ช่วยเหลือ` - แสดงข้อความนี้\n\
\n\
**🛡️ แอดมิน**\n\
• `/โอนเครดิต @ผู้ใช้ จำนวน` - โอนเครดิตให้ผู้ใช้\n\
• `/ล้างหนี้ @ผู้ใช้` - ล้างหนี้ของผู้ใช้\n\
• `/ธุรกรรม` - ดูธุรกรรมทั้งหมด\n\
• `/สถิติ` - สถิติการกู้ยืม\n\
• `/ตรวจสอบบัญชี` - ตรวจสอบลายเซ็นและยอดเครดิต\n";

/// แสดงคำสั่งทั้งหมด
#[poise::command(slash_command, rename = "ช่วยเหลือ")]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(HELP_TEXT).await?;
    Ok(())
}
