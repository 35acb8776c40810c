use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// Outstanding and accruing interest.
    Pending,
    /// Repaid through the ledger.
    Completed,
    /// Forgiven by an admin.
    Cleared,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Completed => "completed",
            LoanStatus::Cleared => "cleared",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(LoanStatus::Pending),
            "completed" => Some(LoanStatus::Completed),
            "cleared" => Some(LoanStatus::Cleared),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub offer_id: Option<String>,
    pub borrower_id: String,
    pub lender_id: String,
    pub amount: i64,
    pub status: LoanStatus,
    pub created_at_unix: i64,
    pub settled_at_unix: Option<i64>,
}

impl Loan {
    /// Interest owed at `now_unix`. Settled loans stop accruing.
    pub fn interest_at(&self, now_unix: i64, rate_per_hour: f64) -> i64 {
        if self.status != LoanStatus::Pending {
            return 0;
        }
        accrued_interest(self.amount, self.created_at_unix, now_unix, rate_per_hour)
    }

    pub fn total_due(&self, now_unix: i64, rate_per_hour: f64) -> i64 {
        self.amount + self.interest_at(now_unix, rate_per_hour)
    }
}

/// Simple (non-compounding) interest on `principal`, rounded to whole credits.
pub fn accrued_interest(principal: i64, created_at_unix: i64, now_unix: i64, rate_per_hour: f64) -> i64 {
    let elapsed = (now_unix - created_at_unix).max(0);
    let hours = elapsed as f64 / 3600.0;
    (principal as f64 * rate_per_hour * hours).round() as i64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighInterestLoan {
    pub borrower_id: String,
    pub amount: i64,
    pub interest: i64,
}

/// Pending loans whose interest has grown past the principal.
pub fn high_interest_loans(loans: &[Loan], now_unix: i64, rate_per_hour: f64) -> Vec<HighInterestLoan> {
    loans
        .iter()
        .filter(|loan| loan.status == LoanStatus::Pending)
        .filter_map(|loan| {
            let interest = loan.interest_at(now_unix, rate_per_hour);
            (interest > loan.amount).then(|| HighInterestLoan {
                borrower_id: loan.borrower_id.clone(),
                amount: loan.amount,
                interest,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoanStats {
    pub total_loans: usize,
    pub total_amount: i64,
    pub pending_loans: usize,
    pub pending_amount: i64,
    pub pending_interest: i64,
    pub high_interest: Vec<HighInterestLoan>,
}

impl LoanStats {
    pub fn from_loans(loans: &[Loan], now_unix: i64, rate_per_hour: f64) -> Self {
        let mut stats = LoanStats {
            total_loans: loans.len(),
            ..Default::default()
        };

        for loan in loans {
            stats.total_amount += loan.amount;
            if loan.status == LoanStatus::Pending {
                stats.pending_loans += 1;
                stats.pending_amount += loan.amount;
                stats.pending_interest += loan.interest_at(now_unix, rate_per_hour);
            }
        }
        stats.high_interest = high_interest_loans(loans, now_unix, rate_per_hour);

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3600;

    fn loan(amount: i64, status: LoanStatus, created_at_unix: i64) -> Loan {
        Loan {
            id: format!("loan-{}", amount),
            offer_id: None,
            borrower_id: "borrower".to_string(),
            lender_id: "lender".to_string(),
            amount,
            status,
            created_at_unix,
            settled_at_unix: None,
        }
    }

    #[test]
    fn interest_is_simple_and_rounded() {
        assert_eq!(accrued_interest(100, 0, 0, 0.10), 0);
        assert_eq!(accrued_interest(100, 0, HOUR, 0.10), 10);
        assert_eq!(accrued_interest(100, 0, 5 * HOUR, 0.10), 50);
        // 100 * 0.1 * 0.25h = 2.5
        assert_eq!(accrued_interest(100, 0, HOUR / 4, 0.10), 3);
    }

    #[test]
    fn clock_skew_never_gives_negative_interest() {
        assert_eq!(accrued_interest(100, 10 * HOUR, 0, 0.10), 0);
    }

    #[test]
    fn settled_loans_do_not_accrue() {
        let done = loan(100, LoanStatus::Completed, 0);
        assert_eq!(done.interest_at(10 * HOUR, 0.10), 0);
        assert_eq!(done.total_due(10 * HOUR, 0.10), 100);
    }

    #[test]
    fn stats_cover_pending_and_high_interest() {
        let loans = vec![
            loan(100, LoanStatus::Pending, 0),
            loan(50, LoanStatus::Pending, 9 * HOUR),
            loan(200, LoanStatus::Cleared, 0),
        ];

        let stats = LoanStats::from_loans(&loans, 11 * HOUR, 0.10);

        assert_eq!(stats.total_loans, 3);
        assert_eq!(stats.total_amount, 350);
        assert_eq!(stats.pending_loans, 2);
        assert_eq!(stats.pending_amount, 150);
        // 100 * 1.1 + 50 * 0.2
        assert_eq!(stats.pending_interest, 110 + 10);
        assert_eq!(
            stats.high_interest,
            vec![HighInterestLoan {
                borrower_id: "borrower".to_string(),
                amount: 100,
                interest: 110,
            }]
        );
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [LoanStatus::Pending, LoanStatus::Completed, LoanStatus::Cleared] {
            assert_eq!(LoanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LoanStatus::parse("open"), None);
    }
}
