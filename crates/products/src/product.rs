use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use procurerp_accounting::{Account, Tax};
use procurerp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use procurerp_events::Event;

use crate::uom::Uom;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What a product is; only goods and assets are moved through stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Goods,
    Assets,
    Service,
}

impl ProductKind {
    pub fn is_stockable(self) -> bool {
        matches!(self, ProductKind::Goods | ProductKind::Assets)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// The part of a product a purchase line needs, captured when the line is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: ProductId,
    pub name: String,
    pub kind: ProductKind,
    pub purchase_uom: Uom,
    pub account_expense: Option<Account>,
    pub supplier_taxes: Vec<Tax>,
}

impl ProductSummary {
    pub fn is_stockable(&self) -> bool {
        self.kind.is_stockable()
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    kind: ProductKind,
    status: ProductStatus,
    purchase_uom: Uom,
    cost_price: Decimal,
    account_expense: Option<Account>,
    supplier_taxes: Vec<Tax>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            kind: ProductKind::Goods,
            status: ProductStatus::Active,
            purchase_uom: Uom::unit(),
            cost_price: Decimal::ZERO,
            account_expense: None,
            supplier_taxes: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProductKind {
        self.kind
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn cost_price(&self) -> Decimal {
        self.cost_price
    }

    pub fn purchase_uom(&self) -> &Uom {
        &self.purchase_uom
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Only active products can be put on new purchase lines.
    pub fn is_purchasable(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }

    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            product_id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            purchase_uom: self.purchase_uom.clone(),
            account_expense: self.account_expense.clone(),
            supplier_taxes: self.supplier_taxes.clone(),
        }
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub kind: ProductKind,
    pub purchase_uom: Uom,
    pub cost_price: Decimal,
    pub account_expense: Option<Account>,
    pub supplier_taxes: Vec<Tax>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeCostPrice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCostPrice {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub cost_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ChangeCostPrice(ChangeCostPrice),
    ArchiveProduct(ArchiveProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub kind: ProductKind,
    pub purchase_uom: Uom,
    pub cost_price: Decimal,
    pub account_expense: Option<Account>,
    pub supplier_taxes: Vec<Tax>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CostPriceChanged.
///
/// Feeds the product cost history read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostPriceChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub previous_cost_price: Decimal,
    pub cost_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    CostPriceChanged(CostPriceChanged),
    ProductArchived(ProductArchived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::CostPriceChanged(_) => "products.product.cost_price_changed",
            ProductEvent::ProductArchived(_) => "products.product.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::CostPriceChanged(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.kind = e.kind;
                self.status = ProductStatus::Active;
                self.purchase_uom = e.purchase_uom.clone();
                self.cost_price = e.cost_price;
                self.account_expense = e.account_expense.clone();
                self.supplier_taxes = e.supplier_taxes.clone();
                self.created = true;
            }
            ProductEvent::CostPriceChanged(e) => {
                self.cost_price = e.cost_price;
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::ChangeCostPrice(cmd) => self.handle_change_cost_price(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        if cmd.cost_price.is_sign_negative() {
            return Err(DomainError::validation("cost price cannot be negative"));
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            name: cmd.name.clone(),
            kind: cmd.kind,
            purchase_uom: cmd.purchase_uom.clone(),
            cost_price: cmd.cost_price,
            account_expense: cmd.account_expense.clone(),
            supplier_taxes: cmd.supplier_taxes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_cost_price(
        &self,
        cmd: &ChangeCostPrice,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.cost_price.is_sign_negative() {
            return Err(DomainError::validation("cost price cannot be negative"));
        }
        // Unchanged prices are not historized.
        if cmd.cost_price == self.cost_price {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::CostPriceChanged(CostPriceChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            previous_cost_price: self.cost_price,
            cost_price: cmd.cost_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procurerp_accounting::Account;
    use procurerp_events::execute;
    use rust_decimal_macros::dec;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn create_cmd(tenant_id: TenantId, product_id: ProductId) -> CreateProduct {
        CreateProduct {
            tenant_id,
            product_id,
            sku: "BOLT-M8".to_string(),
            name: "M8 bolt".to_string(),
            kind: ProductKind::Goods,
            purchase_uom: Uom::unit(),
            cost_price: dec!(0.12),
            account_expense: Some(Account::expense("6000", "Purchases")),
            supplier_taxes: vec![],
            occurred_at: Utc::now(),
        }
    }

    fn created_product(tenant_id: TenantId, product_id: ProductId) -> Product {
        let mut product = Product::empty(product_id);
        execute(
            &mut product,
            &ProductCommand::CreateProduct(create_cmd(tenant_id, product_id)),
        )
        .unwrap();
        product
    }

    #[test]
    fn create_product_captures_purchasing_data() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = created_product(tenant_id, product_id);

        assert!(product.is_purchasable());
        assert_eq!(product.cost_price(), dec!(0.12));
        let summary = product.summary();
        assert_eq!(summary.product_id, product_id);
        assert!(summary.is_stockable());
        assert_eq!(summary.account_expense.unwrap().code, "6000");
    }

    #[test]
    fn create_product_rejects_empty_sku() {
        let product = Product::empty(test_product_id());
        let mut cmd = create_cmd(test_tenant_id(), test_product_id());
        cmd.sku = "  ".to_string();

        let err = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cost_price_change_records_previous_price() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = created_product(tenant_id, product_id);

        let events = execute(
            &mut product,
            &ProductCommand::ChangeCostPrice(ChangeCostPrice {
                tenant_id,
                product_id,
                cost_price: dec!(0.15),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        match &events[0] {
            ProductEvent::CostPriceChanged(e) => {
                assert_eq!(e.previous_cost_price, dec!(0.12));
                assert_eq!(e.cost_price, dec!(0.15));
            }
            other => panic!("Expected CostPriceChanged, got {other:?}"),
        }
        assert_eq!(product.cost_price(), dec!(0.15));
        assert_eq!(product.version(), 2);
    }

    #[test]
    fn unchanged_cost_price_emits_nothing() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = created_product(tenant_id, product_id);

        let events = product
            .handle(&ProductCommand::ChangeCostPrice(ChangeCostPrice {
                tenant_id,
                product_id,
                cost_price: dec!(0.12),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn archived_products_are_not_purchasable() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = created_product(tenant_id, product_id);

        execute(
            &mut product,
            &ProductCommand::ArchiveProduct(ArchiveProduct {
                tenant_id,
                product_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!product.is_purchasable());
    }

    #[test]
    fn services_are_not_stockable() {
        assert!(!ProductKind::Service.is_stockable());
        assert!(ProductKind::Assets.is_stockable());
    }
}
