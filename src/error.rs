//! Domain errors. The `Display` text of each user-facing variant is the
//! message shown to the user in Discord.

use crate::crypto::CryptoError;

/// Failures while opening a loan offer.
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("จำนวนเครดิตต้องไม่ติดลบ")]
    NegativeAmount,

    #[error("เครดิตของคุณไม่พอ (มี {available} เครดิต แต่ต้องการ {needed} เครดิต)")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Reasons a click on a loan offer did not win it.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("ไม่พบข้อเสนอนี้แล้ว")]
    NotFound,

    #[error("ขออภัย มีผู้รับสิทธิ์นี้ไปแล้ว")]
    AlreadyClaimed,

    #[error("ข้อเสนอนี้หมดเวลาแล้ว")]
    Expired,

    #[error("คุณไม่สามารถกู้จากข้อเสนอของตัวเองได้")]
    OwnOffer,

    #[error("คุณมีหนี้ค้างอยู่ ไม่สามารถกู้เพิ่มได้")]
    OutstandingLoan,

    #[error("ผู้ปล่อยกู้มีเครดิตไม่พอแล้ว")]
    IssuerInsufficientFunds,

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Ledger signing error: {0}")]
    Signing(#[from] CryptoError),
}

impl ClaimError {
    /// Whether the failure came from infrastructure rather than the offer's state.
    pub fn is_internal(&self) -> bool {
        matches!(self, ClaimError::Store(_) | ClaimError::Signing(_))
    }
}

/// Failures while settling a borrower's pending loans.
#[derive(Debug, thiserror::Error)]
pub enum RepaymentError {
    #[error("ไม่มีหนี้ค้างชำระ")]
    NothingOutstanding,

    #[error("เครดิตไม่พอชำระหนี้ (มี {available} เครดิต ต้องชำระ {needed} เครดิต)")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Ledger signing error: {0}")]
    Signing(#[from] CryptoError),
}

/// Failures of plain ledger writes such as admin grants.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Ledger signing error: {0}")]
    Signing(#[from] CryptoError),
}
