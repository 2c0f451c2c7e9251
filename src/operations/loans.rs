//! Loan offers, payslip checks and confirmation

use super::{respond, BankingOperations};
use crate::credit::{calculate_emi, credit_rating, interest_rate, total_repayment};
use crate::error::BankingError;
use crate::models::{
    generate_reference, ActionResult, Loan, LoanStatus, ResultKind, Transaction,
    TransactionStatus, TransactionType,
};
use crate::settlement::SettlementJob;
use crate::Result;
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

/// Source account recorded on disbursement transactions.
pub const DISBURSEMENT_SOURCE: &str = "LOAN_DISBURSEMENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanQuery {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub tenure: Option<u32>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub income: Option<Decimal>,
}

/// Acceptance of an offer. Score, rate and EMI echo what the offer showed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanConfirmation {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub tenure: Option<u32>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default, alias = "creditScore")]
    pub score: Option<u32>,
    #[serde(default, alias = "interestRate")]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub emi: Option<Decimal>,
    #[serde(default)]
    pub income: Option<Decimal>,
}

/// Priced offer for a given principal and score.
struct Offer {
    score: u32,
    rating: &'static str,
    rate: Decimal,
    emi: Decimal,
    total_repayment: Decimal,
}

impl BankingOperations {
    fn check_loan_band(&self, amount: Decimal) -> Result<()> {
        let loans = &self.config.loans;
        if amount < loans.min_amount || amount > loans.max_amount {
            return Err(BankingError::AmountOutOfRange {
                amount,
                min: loans.min_amount,
                max: loans.max_amount,
            });
        }
        Ok(())
    }

    fn resolve_tenure(&self, tenure: Option<u32>) -> Result<u32> {
        let loans = &self.config.loans;
        let tenure = tenure
            .filter(|&t| t > 0)
            .unwrap_or(loans.default_tenure_months);
        if tenure < loans.min_tenure_months || tenure > loans.max_tenure_months {
            return Err(BankingError::TenureOutOfRange {
                tenure,
                min: loans.min_tenure_months,
                max: loans.max_tenure_months,
            });
        }
        Ok(tenure)
    }

    fn price(&self, principal: Decimal, score: u32, tenure: u32) -> Offer {
        let rate = interest_rate(&self.config.scoring, score);
        let emi = calculate_emi(principal, rate, tenure);
        Offer {
            score,
            rating: credit_rating(score),
            rate,
            emi,
            total_repayment: total_repayment(emi, tenure),
        }
    }

    pub async fn check_loan_credit_score(&self, account_ref: &str, query: LoanQuery) -> ActionResult {
        respond("check_loan_credit_score", self.loan_offer_inner(account_ref, &query).await)
    }

    async fn loan_offer_inner(&self, account_ref: &str, query: &LoanQuery) -> Result<ActionResult> {
        let amount = query.amount.unwrap_or_default();
        self.check_loan_band(amount)?;
        let tenure = self.resolve_tenure(query.tenure)?;
        self.require_account(account_ref).await?;

        let offer = self.price(amount, self.current_score(account_ref).await?, tenure);

        Ok(ActionResult::new(
            ResultKind::LoanOffer,
            format!(
                "Your credit score is **{}** ({}).\n\nLoan offer:\n\n- **Amount:** {}\n- **Interest Rate:** {}%\n- **Tenure:** {} months\n- **EMI:** {}/month\n- **Total Repayment:** {}\n\nWould you like to accept this offer?",
                offer.score,
                offer.rating,
                self.config.money(amount),
                offer.rate,
                tenure,
                self.config.money(offer.emi),
                self.config.money(offer.total_repayment),
            ),
        )
        .with_data(json!({
            "score": offer.score,
            "rating": offer.rating,
            "rate": offer.rate,
            "emi": offer.emi,
            "totalRepayment": offer.total_repayment,
            "amount": amount,
            "tenure": tenure,
            "purpose": query.purpose,
            "income": query.income.unwrap_or_default(),
        })))
    }

    /// Simulated payslip verification followed by a credit check.
    ///
    /// Scores below the full-approval mark are offered a reduced principal.
    pub async fn verify_payslip_and_score(&self, account_ref: &str, query: LoanQuery) -> ActionResult {
        respond("verify_payslip_and_score", self.payslip_inner(account_ref, &query).await)
    }

    async fn payslip_inner(&self, account_ref: &str, query: &LoanQuery) -> Result<ActionResult> {
        let requested = query.amount.unwrap_or_default();
        self.check_loan_band(requested)?;
        let tenure = self.resolve_tenure(query.tenure)?;
        self.require_account(account_ref).await?;

        let score = self.current_score(account_ref).await?;
        let loans = &self.config.loans;
        let approved = if score >= loans.full_approval_score {
            requested
        } else {
            (requested * loans.partial_approval_factor)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        };
        let offer = self.price(approved, score, tenure);

        Ok(ActionResult::new(
            ResultKind::LoanCreditCheck,
            format!(
                "**Payslip verified.** Credit check complete, score **{}** ({}).\n\nHere's your offer:\n\n- **Approved Amount:** {}\n- **Interest Rate:** {}%\n- **Tenure:** {} months\n- **Monthly Payment:** {}/month\n- **Total Repayment:** {}\n\nWould you like to accept this offer?",
                offer.score,
                offer.rating,
                self.config.money(approved),
                offer.rate,
                tenure,
                self.config.money(offer.emi),
                self.config.money(offer.total_repayment),
            ),
        )
        .with_data(json!({
            "score": offer.score,
            "rating": offer.rating,
            "rate": offer.rate,
            "emi": offer.emi,
            "totalRepayment": offer.total_repayment,
            "amount": approved,
            "requestedAmount": requested,
            "tenure": tenure,
            "purpose": query.purpose,
            "income": query.income.unwrap_or_default(),
            "steps": [
                { "label": "Payslip verified", "status": "done" },
                { "label": "Credit check passed", "status": "done" },
                { "label": "Offer generated", "status": "done" },
            ],
        })))
    }

    /// Record the loan and, when the score clears the threshold, queue the disbursement.
    pub async fn confirm_loan(&self, account_ref: &str, confirmation: LoanConfirmation) -> ActionResult {
        respond("confirm_loan", self.confirm_loan_inner(account_ref, &confirmation).await)
    }

    async fn confirm_loan_inner(
        &self,
        account_ref: &str,
        confirmation: &LoanConfirmation,
    ) -> Result<ActionResult> {
        let amount = confirmation
            .amount
            .filter(|a| !a.is_zero())
            .ok_or_else(|| BankingError::MissingParameters("the loan amount".to_string()))?;
        self.check_loan_band(amount)?;
        let tenure = self.resolve_tenure(confirmation.tenure)?;
        let purpose = confirmation
            .purpose
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("Personal")
            .to_string();
        let account = self.require_account(account_ref).await?;

        let score = match confirmation.score {
            Some(score) => score,
            None => self.current_score(account_ref).await?,
        };
        // Rate and EMI always follow the score so the stored loan is self-consistent.
        let offer = self.price(amount, score, tenure);
        if confirmation.rate.is_some_and(|r| r != offer.rate)
            || confirmation.emi.is_some_and(|e| e != offer.emi)
        {
            debug!(
                quoted_rate = ?confirmation.rate,
                quoted_emi = ?confirmation.emi,
                rate = %offer.rate,
                emi = %offer.emi,
                "Quoted terms differ from repriced terms"
            );
        }

        let loan = self
            .ledger
            .create_loan(Loan {
                loan_id: Uuid::new_v4(),
                owner_id: account.owner_id,
                account_number: account.account_number.clone(),
                principal: amount,
                interest_rate: offer.rate,
                tenure_months: tenure,
                emi: offer.emi,
                total_repayment: offer.total_repayment,
                purpose: purpose.clone(),
                status: LoanStatus::Applied,
                credit_score: score,
                remaining_balance: amount,
                created_at: Utc::now(),
            })
            .await?;

        let approved = score >= self.config.loans.approval_threshold;
        let next = if approved {
            LoanStatus::Approved
        } else {
            LoanStatus::Rejected
        };
        let loan = self.ledger.set_loan_status(loan.loan_id, next).await?;

        info!(
            loan_id = %loan.loan_id,
            account = %account.account_number,
            amount = %amount,
            score,
            status = loan.status.as_str(),
            "Loan decided"
        );

        let data = json!({
            "loanId": loan.loan_id,
            "amount": amount,
            "rate": offer.rate,
            "tenure": tenure,
            "emi": offer.emi,
            "totalRepayment": offer.total_repayment,
            "score": score,
            "status": loan.status.as_str(),
            "income": confirmation.income,
            "purpose": purpose,
        });

        if !approved {
            return Ok(ActionResult::new(
                ResultKind::LoanResult,
                format!(
                    "Loan application **{}**. Your credit score of **{}** is below our approval threshold.\n\n- **Amount:** {}\n- **Rate:** {}%\n- **Tenure:** {} months",
                    loan.status.as_str(),
                    score,
                    self.config.money(amount),
                    offer.rate,
                    tenure,
                ),
            )
            .with_data(data));
        }

        let record = Transaction::new(
            generate_reference(),
            DISBURSEMENT_SOURCE,
            account.account_number.clone(),
            amount,
            TransactionType::Deposit,
            TransactionStatus::Pending,
            format!("Loan disbursement - {} ({} months)", purpose, tenure),
        );
        self.settlement
            .enqueue(SettlementJob::Disbursement {
                record,
                loan_id: loan.loan_id,
            })
            .await?;

        Ok(ActionResult::new(
            ResultKind::LoanResult,
            format!(
                "Your loan of **{}** is approved and on its way to account **{}**.\n\n- **Monthly Payment:** {}/month\n- **Tenure:** {} months\n- **Rate:** {}%",
                self.config.money(amount),
                account.account_number,
                self.config.money(offer.emi),
                tenure,
                offer.rate,
            ),
        )
        .with_data(data))
    }

    pub async fn list_loans(&self, account_ref: &str) -> ActionResult {
        respond("list_loans", self.list_loans_inner(account_ref).await)
    }

    async fn list_loans_inner(&self, account_ref: &str) -> Result<ActionResult> {
        let account = self.require_account(account_ref).await?;
        let loans = self.ledger.list_loans(account.owner_id).await?;

        if loans.is_empty() {
            return Ok(ActionResult::new(ResultKind::Loans, "You don't have any loans.")
                .with_data(json!({ "loans": [] })));
        }

        let lines: Vec<String> = loans
            .iter()
            .map(|loan| {
                format!(
                    "- {} {} over {} months at {}% ({}), EMI {}",
                    loan.purpose,
                    self.config.money(loan.principal),
                    loan.tenure_months,
                    loan.interest_rate,
                    loan.status.as_str(),
                    self.config.money(loan.emi),
                )
            })
            .collect();

        Ok(ActionResult::new(
            ResultKind::Loans,
            format!("Here are your loans:\n\n{}", lines.join("\n")),
        )
        .with_data(json!({ "loans": loans })))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use crate::ledger::LedgerStore;
    use super::*;
    use rust_decimal_macros::dec;

    fn query(amount: Decimal, tenure: Option<u32>) -> LoanQuery {
        LoanQuery {
            amount: Some(amount),
            tenure,
            purpose: Some("Car".to_string()),
            income: Some(dec!(90000)),
        }
    }

    #[tokio::test]
    async fn test_offer_prices_from_score() {
        let h = Harness::new(780).await;
        let a = h.open("Ada").await;

        let result = h.ops.check_loan_credit_score(&a, query(dec!(50000), Some(36))).await;
        assert_eq!(result.kind, ResultKind::LoanOffer);
        let data = result.data.unwrap();
        assert_eq!(data["score"], 780);
        assert!(result.text.contains("10.5%"));
        assert!(result.text.contains("$1,625.12/month"));
        assert!(result.text.contains("$58,504.00"));
        assert_eq!(data["tenure"], 36);
    }

    #[tokio::test]
    async fn test_out_of_band_requests_rejected() {
        let h = Harness::new(780).await;
        let a = h.open("Ada").await;

        let low = h.ops.check_loan_credit_score(&a, query(dec!(500), None)).await;
        assert!(low.is_error());
        assert_eq!(low.text, "Loan amount must be between 1000 and 100000.");

        let missing = h.ops.check_loan_credit_score(&a, LoanQuery::default()).await;
        assert!(missing.is_error());

        let long = h.ops.verify_payslip_and_score(&a, query(dec!(5000), Some(120))).await;
        assert!(long.is_error());
        assert!(long.text.contains("Tenure must be between 3 and 60"));
    }

    #[tokio::test]
    async fn test_payslip_reduces_principal_below_full_approval() {
        let h = Harness::new(700).await;
        let a = h.open("Ada").await;

        let result = h.ops.verify_payslip_and_score(&a, query(dec!(10001), None)).await;
        assert_eq!(result.kind, ResultKind::LoanCreditCheck);
        let data = result.data.unwrap();
        assert_eq!(data["requestedAmount"], json!(dec!(10001)));
        assert_eq!(data["amount"], json!(dec!(9001)));
        assert_eq!(data["tenure"], 12);
        assert_eq!(data["steps"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_confirm_disburses_after_settlement() {
        let h = Harness::new(780).await;
        let a = h.open("Ada").await;

        let result = h
            .ops
            .confirm_loan(
                &a,
                LoanConfirmation {
                    amount: Some(dec!(50000)),
                    tenure: Some(36),
                    purpose: Some("Home Improvement".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(result.kind, ResultKind::LoanResult);
        h.settle().await;

        let account = h.ledger.find_account(&a).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(51000));

        let loan = h.ledger.latest_loan(&a).await.unwrap().unwrap();
        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert_eq!(loan.interest_rate, dec!(10.5));
        assert_eq!(loan.emi, dec!(1625.12));

        let history = h.ledger.list_transactions(&a, 1).await.unwrap();
        assert_eq!(history[0].from_account, DISBURSEMENT_SOURCE);
        assert_eq!(history[0].description, "Loan disbursement - Home Improvement (36 months)");
    }

    #[tokio::test]
    async fn test_low_score_rejected_without_credit() {
        let h = Harness::new(600).await;
        let a = h.open("Ada").await;

        let result = h
            .ops
            .confirm_loan(
                &a,
                LoanConfirmation {
                    amount: Some(dec!(5000)),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(result.kind, ResultKind::LoanResult);
        assert_eq!(result.data.unwrap()["status"], "rejected");
        h.settle().await;

        let account = h.ledger.find_account(&a).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1000));

        let listed = h.ops.list_loans(&a).await;
        assert!(listed.text.contains("Personal"));
        assert!(listed.text.contains("rejected"));
    }

    #[tokio::test]
    async fn test_later_checks_reuse_recorded_score() {
        let h = Harness::new(600).await;
        let a = h.open("Ada").await;
        h.ops
            .confirm_loan(
                &a,
                LoanConfirmation {
                    amount: Some(dec!(5000)),
                    score: Some(810),
                    ..Default::default()
                },
            )
            .await;

        let result = h.ops.get_credit_score(&a).await;
        assert!(result.text.contains("810"));
    }
}
