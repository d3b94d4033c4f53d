// src/demo/billing.rs
//! Demo virtual-account billing backend.
//!
//! Serves a fixed set of accounts so the envelope can be exercised end to
//! end. Each account carries at most one bill; payments must settle the
//! total exactly.

use crate::models::error::SnapError;
use crate::services::pipeline::{TransactionContext, TransactionHandler};
use crate::services::validation::{classify, FieldViolation, Location};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillStatus {
    Unpaid,
    Paid,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Bill {
    pub number: &'static str,
    pub description_en: &'static str,
    pub description_id: &'static str,
    pub amount: f64,
    pub status: BillStatus,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub number: &'static str,
    pub name: &'static str,
    pub total_amount: f64,
    pub bills: Vec<Bill>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Amount {
    value: String,
    currency: &'static str,
}

impl Amount {
    fn idr(value: f64) -> Self {
        Amount {
            value: format!("{:.2}", value),
            currency: "IDR",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BillDetail {
    bill_code: String,
    bill_no: String,
    bill_name: String,
    bill_description: Value,
    bill_amount: Amount,
}

/// In-memory ledger of demo accounts.
#[derive(Debug, Clone)]
pub struct BillingDemo {
    accounts: Arc<Vec<Account>>,
}

impl BillingDemo {
    pub fn new() -> Self {
        let bill = |number, en, id, amount, status| Bill {
            number,
            description_en: en,
            description_id: id,
            amount,
            status,
        };
        let accounts = vec![
            Account {
                number: "1234506000009587",
                name: "Matt Murdock",
                total_amount: 103_500.0,
                bills: vec![bill("INV/2025/00123456", "Torch, Flashlight", "Lampu Senter", 103_500.0, BillStatus::Unpaid)],
            },
            Account {
                number: "1234505000001234",
                name: "Karen Page",
                total_amount: 0.0,
                bills: vec![bill("INV/2025/00123457", "Tape recorder", "Tape recorder", 208_000.0, BillStatus::Paid)],
            },
            Account {
                number: "1234505000005678",
                name: "Frank Castle",
                total_amount: 0.0,
                bills: vec![bill("INV/2025/00123458", "2 lbs Chimichanga", "1 kg Chimichanga", 300_000.0, BillStatus::Expired)],
            },
            Account {
                number: "1234505000008984",
                name: "Elektra",
                total_amount: 0.0,
                bills: Vec::new(),
            },
        ];
        Self {
            accounts: Arc::new(accounts),
        }
    }

    /// Looks up an open bill for `account`.
    ///
    /// # Errors
    /// `VirtualAccountNotFound`, `BillNotFound`, `BillPaid` or `BillExpired`.
    pub fn inquiry(&self, account: &str) -> Result<&Account, SnapError> {
        let found = self
            .accounts
            .iter()
            .find(|a| a.number == account)
            .ok_or(SnapError::VirtualAccountNotFound)?;
        let bill = found.bills.first().ok_or(SnapError::BillNotFound)?;
        match bill.status {
            BillStatus::Paid => Err(SnapError::BillPaid),
            BillStatus::Expired => Err(SnapError::BillExpired),
            BillStatus::Unpaid => Ok(found),
        }
    }

    /// Pays the open bill of `account`; the amount must match the total.
    pub fn payment(&self, account: &str, amount: f64) -> Result<&Account, SnapError> {
        let found = self.inquiry(account)?;
        if (amount - found.total_amount).abs() > f64::EPSILON {
            return Err(SnapError::InvalidAmount);
        }
        Ok(found)
    }
}

impl Default for BillingDemo {
    fn default() -> Self {
        Self::new()
    }
}

fn bill_details(account: &Account) -> Vec<BillDetail> {
    account
        .bills
        .iter()
        .enumerate()
        .map(|(index, bill)| BillDetail {
            bill_code: format!("{:02}", index + 1),
            bill_no: bill.number.chars().filter(char::is_ascii_digit).collect(),
            bill_name: format!("Bill for {}", account.name).chars().take(20).collect(),
            bill_description: json!({"english": bill.description_en, "indonesia": bill.description_id}),
            bill_amount: Amount::idr(bill.amount),
        })
        .collect()
}

fn text_field<'a>(body: &'a Value, name: &str, missing: &mut Vec<FieldViolation>) -> &'a str {
    match body.get(name).and_then(Value::as_str) {
        Some(value) => value,
        None => {
            missing.push(FieldViolation::missing(Location::Body, name));
            ""
        }
    }
}

/// Mandatory fields shared by inquiry and payment bodies.
struct AccountFields<'a> {
    partner_service_id: &'a str,
    customer_no: &'a str,
    virtual_account_no: &'a str,
}

fn account_fields<'a>(body: &'a Value, violations: &mut Vec<FieldViolation>) -> AccountFields<'a> {
    AccountFields {
        partner_service_id: text_field(body, "partnerServiceId", violations),
        customer_no: text_field(body, "customerNo", violations),
        virtual_account_no: text_field(body, "virtualAccountNo", violations),
    }
}

fn inquiry_fields(body: &Value) -> Result<AccountFields<'_>, SnapError> {
    let mut violations = Vec::new();
    let fields = account_fields(body, &mut violations);
    if !violations.is_empty() {
        return Err(classify(&violations));
    }
    Ok(fields)
}

fn payment_fields(body: &Value) -> Result<(AccountFields<'_>, f64), SnapError> {
    let mut violations = Vec::new();
    let fields = account_fields(body, &mut violations);
    let value = match body.pointer("/paidAmount/value").and_then(Value::as_str) {
        Some(value) => value,
        None => {
            violations.push(FieldViolation::missing(Location::Body, "paidAmount.value"));
            ""
        }
    };
    if !violations.is_empty() {
        return Err(classify(&violations));
    }
    let amount: f64 = value.trim().parse().map_err(|_| {
        classify(&[FieldViolation::invalid(Location::Body, "paidAmount.value")])
    })?;
    Ok((fields, amount))
}

/// `POST /snap/v1.0/transfer-va/inquiry`.
pub struct InquiryHandler {
    billing: BillingDemo,
}

impl InquiryHandler {
    pub fn new(billing: BillingDemo) -> Self {
        Self { billing }
    }
}

#[async_trait]
impl TransactionHandler for InquiryHandler {
    fn check_body(&self, body: &Value) -> Result<(), SnapError> {
        inquiry_fields(body).map(|_| ())
    }

    async fn handle(&self, context: &TransactionContext) -> Result<Value, SnapError> {
        let body = &context.body;
        let fields = inquiry_fields(body)?;

        let account = self.billing.inquiry(fields.virtual_account_no.trim())?;
        let mut data = json!({
            "partnerServiceId": fields.partner_service_id,
            "customerNo": fields.customer_no,
            "virtualAccountNo": fields.virtual_account_no,
            "virtualAccountName": account.name,
            "totalAmount": Amount::idr(account.total_amount),
            "billDetails": bill_details(account),
        });
        if let Some(id) = body.get("inquiryRequestId") {
            data["inquiryRequestId"] = id.clone();
        }
        Ok(json!({ "virtualAccountData": data }))
    }
}

/// `POST /snap/v1.0/transfer-va/payment`.
pub struct PaymentHandler {
    billing: BillingDemo,
}

impl PaymentHandler {
    pub fn new(billing: BillingDemo) -> Self {
        Self { billing }
    }
}

#[async_trait]
impl TransactionHandler for PaymentHandler {
    fn check_body(&self, body: &Value) -> Result<(), SnapError> {
        payment_fields(body).map(|_| ())
    }

    async fn handle(&self, context: &TransactionContext) -> Result<Value, SnapError> {
        let body = &context.body;
        let (fields, amount) = payment_fields(body)?;

        let account = self.billing.payment(fields.virtual_account_no.trim(), amount)?;
        let mut data = json!({
            "partnerServiceId": fields.partner_service_id,
            "customerNo": fields.customer_no,
            "virtualAccountNo": fields.virtual_account_no,
            "virtualAccountName": account.name,
            "paidAmount": body.get("paidAmount").cloned().unwrap_or(Value::Null),
            "billDetails": bill_details(account),
        });
        if let Some(id) = body.get("paymentRequestId") {
            data["paymentRequestId"] = id.clone();
        }
        Ok(json!({ "virtualAccountData": data }))
    }
}
