use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::{Account, AccountKind, PaymentTerm, TaxAccumulator, TaxLine};
use procurerp_core::{Aggregate, AggregateId, AggregateRoot, Currency, DomainError, TenantId};
use procurerp_events::Event;
use procurerp_parties::{AddressId, PartyId};

use crate::line::InvoiceLine;

/// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of a supplier document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    /// The supplier bills us.
    InInvoice,
    /// The supplier refunds us (returned goods).
    InCreditNote,
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Posted,
    Paid,
    Cancel,
}

/// Read-only view of an invoice used when reconciling purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub invoice_id: InvoiceId,
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    pub lines: Vec<InvoiceLine>,
    pub total_amount: Decimal,
}

/// Aggregate root: Invoice (supplier side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    invoice_type: InvoiceType,
    party_id: Option<PartyId>,
    invoice_address: Option<AddressId>,
    currency: Currency,
    account: Option<Account>,
    payment_term: Option<PaymentTerm>,
    origin: Option<String>,
    lines: Vec<InvoiceLine>,
    tax_lines: Vec<TaxLine>,
    untaxed_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    total_paid: Decimal,
    status: InvoiceStatus,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            invoice_type: InvoiceType::InInvoice,
            party_id: None,
            invoice_address: None,
            currency: Currency::default(),
            account: None,
            payment_term: None,
            origin: None,
            lines: Vec::new(),
            tax_lines: Vec::new(),
            untaxed_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            status: InvoiceStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn invoice_type(&self) -> InvoiceType {
        self.invoice_type
    }

    pub fn party_id(&self) -> Option<PartyId> {
        self.party_id
    }

    pub fn invoice_address(&self) -> Option<AddressId> {
        self.invoice_address
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn payment_term(&self) -> Option<&PaymentTerm> {
        self.payment_term.as_ref()
    }

    /// Reference of the document the invoice was created from.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn tax_lines(&self) -> &[TaxLine] {
        &self.tax_lines
    }

    pub fn untaxed_amount(&self) -> Decimal {
        self.untaxed_amount
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn total_paid(&self) -> Decimal {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> Decimal {
        self.total_amount - self.total_paid
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Only posted invoices with something left to pay accept payments.
    pub fn can_accept_payment(&self) -> bool {
        self.status == InvoiceStatus::Posted && self.outstanding_amount() > Decimal::ZERO
    }

    pub fn summary(&self) -> InvoiceSummary {
        InvoiceSummary {
            invoice_id: self.id,
            invoice_type: self.invoice_type,
            status: self.status,
            lines: self.lines.clone(),
            total_amount: self.total_amount,
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub invoice_type: InvoiceType,
    pub party_id: PartyId,
    pub invoice_address: Option<AddressId>,
    pub currency: Currency,
    pub account: Account,
    pub payment_term: Option<PaymentTerm>,
    pub origin: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    PostInvoice(PostInvoice),
    RegisterPayment(RegisterPayment),
    CancelInvoice(CancelInvoice),
}

/// Event: InvoiceCreated.
///
/// Carries the computed tax lines and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub invoice_type: InvoiceType,
    pub party_id: PartyId,
    pub invoice_address: Option<AddressId>,
    pub currency: Currency,
    pub account: Account,
    pub payment_term: Option<PaymentTerm>,
    pub origin: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub tax_lines: Vec<TaxLine>,
    pub untaxed_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePosted {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub new_total_paid: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoicePosted(InvoicePosted),
    PaymentRegistered(PaymentRegistered),
    InvoiceCancelled(InvoiceCancelled),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::InvoicePosted(_) => "invoicing.invoice.posted",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::InvoiceCancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoicePosted(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.invoice_type = e.invoice_type;
                self.party_id = Some(e.party_id);
                self.invoice_address = e.invoice_address;
                self.currency = e.currency.clone();
                self.account = Some(e.account.clone());
                self.payment_term = e.payment_term.clone();
                self.origin = e.origin.clone();
                self.lines = e.lines.clone();
                self.tax_lines = e.tax_lines.clone();
                self.untaxed_amount = e.untaxed_amount;
                self.tax_amount = e.tax_amount;
                self.total_amount = e.total_amount;
                self.total_paid = Decimal::ZERO;
                self.status = InvoiceStatus::Draft;
                self.created = true;
            }
            InvoiceEvent::InvoicePosted(_) => {
                // Nothing to pay: settled as soon as it is posted.
                self.status = if self.total_amount.is_zero() {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::Posted
                };
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.total_paid = e.new_total_paid;
                if self.total_paid >= self.total_amount {
                    self.status = InvoiceStatus::Paid;
                }
            }
            InvoiceEvent::InvoiceCancelled(_) => {
                self.status = InvoiceStatus::Cancel;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::PostInvoice(cmd) => self.handle_post(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Invoice {
    fn ensure_existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot create invoice without lines"));
        }
        if cmd.account.kind != AccountKind::Payable {
            return Err(DomainError::validation(format!(
                "account \"{}\" is not a payable account",
                cmd.account
            )));
        }

        let mut taxes = TaxAccumulator::new();
        let mut untaxed_amount = Decimal::ZERO;
        for line in cmd.lines.iter().filter(|l| l.is_line()) {
            if line.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "invoice line \"{}\" quantity must be positive",
                    line.description
                )));
            }
            if line.account.is_none() {
                return Err(DomainError::validation(format!(
                    "invoice line \"{}\" has no account",
                    line.description
                )));
            }
            untaxed_amount += line.amount(&cmd.currency);
            taxes.add(&line.taxes, line.unit_price, line.quantity);
        }
        let tax_amount = taxes.total(&cmd.currency);

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            invoice_type: cmd.invoice_type,
            party_id: cmd.party_id,
            invoice_address: cmd.invoice_address,
            currency: cmd.currency.clone(),
            account: cmd.account.clone(),
            payment_term: cmd.payment_term.clone(),
            origin: cmd.origin.clone(),
            lines: cmd.lines.clone(),
            tax_lines: taxes.rounded_lines(&cmd.currency),
            untaxed_amount,
            tax_amount,
            total_amount: untaxed_amount + tax_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;

        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant(format!(
                "only draft invoices can be posted (status: {:?})",
                self.status
            )));
        }

        Ok(vec![InvoiceEvent::InvoicePosted(InvoicePosted {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "payments are only registered on posted, unpaid invoices",
            ));
        }
        if cmd.amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let new_total_paid = self.total_paid + cmd.amount;
        if new_total_paid > self.total_amount {
            return Err(DomainError::invariant("cannot overpay invoice"));
        }

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;

        match self.status {
            InvoiceStatus::Cancel => {
                return Err(DomainError::conflict("invoice is already cancelled"));
            }
            InvoiceStatus::Paid => {
                return Err(DomainError::invariant("a paid invoice cannot be cancelled"));
            }
            InvoiceStatus::Posted if !self.total_paid.is_zero() => {
                return Err(DomainError::invariant(
                    "a partially paid invoice cannot be cancelled",
                ));
            }
            InvoiceStatus::Draft | InvoiceStatus::Posted => {}
        }

        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{InvoiceLineId, InvoiceLineKind};
    use procurerp_accounting::Tax;
    use procurerp_events::execute;
    use procurerp_products::Uom;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn billed_line(quantity: Decimal, unit_price: Decimal) -> InvoiceLine {
        InvoiceLine {
            quantity,
            unit: Some(Uom::unit()),
            unit_price,
            taxes: vec![Tax::percentage("VAT21", "VAT 21%", dec!(0.21))],
            account: Some(Account::expense("6000", "Purchases")),
            ..InvoiceLine::layout(
                InvoiceLineId::new(AggregateId::new()),
                InvoiceLineKind::Line,
                Some(AggregateId::new()),
                "Steel sheet",
            )
        }
    }

    fn create_cmd(tenant_id: TenantId, invoice_id: InvoiceId, lines: Vec<InvoiceLine>) -> CreateInvoice {
        CreateInvoice {
            tenant_id,
            invoice_id,
            invoice_type: InvoiceType::InInvoice,
            party_id: PartyId::new(AggregateId::new()),
            invoice_address: None,
            currency: Currency::new("EUR", 2),
            account: Account::payable("4400", "Suppliers"),
            payment_term: None,
            origin: Some("P0001".to_string()),
            lines,
            occurred_at: test_time(),
        }
    }

    fn posted_invoice(tenant_id: TenantId, invoice_id: InvoiceId) -> Invoice {
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create_cmd(
                tenant_id,
                invoice_id,
                vec![billed_line(dec!(2), dec!(50))],
            )),
        )
        .unwrap();
        execute(
            &mut invoice,
            &InvoiceCommand::PostInvoice(PostInvoice {
                tenant_id,
                invoice_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        invoice
    }

    #[test]
    fn create_invoice_computes_totals_and_grouped_taxes() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let comment = InvoiceLine::layout(
            InvoiceLineId::new(AggregateId::new()),
            InvoiceLineKind::Comment,
            None,
            "Deliver at dock 3",
        );
        let cmd = create_cmd(
            tenant_id,
            invoice_id,
            vec![billed_line(dec!(3), dec!(10)), comment, billed_line(dec!(1), dec!(0.05))],
        );

        let events = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::CreateInvoice(cmd))
            .unwrap();
        match &events[0] {
            InvoiceEvent::InvoiceCreated(e) => {
                assert_eq!(e.untaxed_amount, dec!(30.05));
                // 6.30 + 0.0105 rounded once
                assert_eq!(e.tax_amount, dec!(6.31));
                assert_eq!(e.total_amount, dec!(36.36));
                assert_eq!(e.tax_lines.len(), 1);
            }
            other => panic!("Expected InvoiceCreated, got {other:?}"),
        }
    }

    #[test]
    fn create_invoice_requires_a_payable_account() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut cmd = create_cmd(tenant_id, invoice_id, vec![billed_line(dec!(1), dec!(1))]);
        cmd.account = Account::expense("6000", "Purchases");

        let err = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::CreateInvoice(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn paying_to_total_marks_invoice_paid() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = posted_invoice(tenant_id, invoice_id);
        assert_eq!(invoice.total_amount(), dec!(121.00));

        for amount in [dec!(21), dec!(100)] {
            execute(
                &mut invoice,
                &InvoiceCommand::RegisterPayment(RegisterPayment {
                    tenant_id,
                    invoice_id,
                    amount,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
        }
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert!(invoice.outstanding_amount().is_zero());
    }

    #[test]
    fn cannot_overpay_invoice() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let invoice = posted_invoice(tenant_id, invoice_id);

        let err = invoice
            .handle(&InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount: dec!(121.01),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("cannot overpay invoice") => {}
            other => panic!("Expected InvariantViolation for overpaying, got {other:?}"),
        }
    }

    #[test]
    fn paid_invoices_cannot_be_cancelled() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = posted_invoice(tenant_id, invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::RegisterPayment(RegisterPayment {
                tenant_id,
                invoice_id,
                amount: dec!(121),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = invoice
            .handle(&InvoiceCommand::CancelInvoice(CancelInvoice {
                tenant_id,
                invoice_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cancelled_invoice_shows_in_summary() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = posted_invoice(tenant_id, invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::CancelInvoice(CancelInvoice {
                tenant_id,
                invoice_id,
                reason: Some("Wrong prices".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let summary = invoice.summary();
        assert_eq!(summary.status, InvoiceStatus::Cancel);
        assert_eq!(summary.lines.len(), 1);
    }

    #[test]
    fn zero_total_invoice_is_paid_on_post() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = Invoice::empty(invoice_id);
        let mut free = billed_line(dec!(1), dec!(0));
        free.taxes.clear();
        execute(
            &mut invoice,
            &InvoiceCommand::CreateInvoice(create_cmd(tenant_id, invoice_id, vec![free])),
        )
        .unwrap();
        execute(
            &mut invoice,
            &InvoiceCommand::PostInvoice(PostInvoice {
                tenant_id,
                invoice_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }
}
