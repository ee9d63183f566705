//! Links an order to the payment processor before a subscription is started.
//!
//! Each stage takes the order and hands back the (possibly updated) order. Stages
//! run in a fixed order because later ones rely on what earlier ones created:
//! customer, then default payment method, then products, then prices. The first
//! failing stage aborts the run.

use crate::domain::order::{Order, Price, PriceId, Product, User};
use crate::domain::ports::{CatalogStoreRef, PaymentGatewayRef, UserStoreRef};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
pub trait OrderStage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, order: Order) -> Result<Order>;
}

pub struct ImportPipeline {
    stages: Vec<Box<dyn OrderStage>>,
}

impl ImportPipeline {
    /// The standard four-stage pipeline.
    pub fn new(gateway: PaymentGatewayRef, users: UserStoreRef, catalog: CatalogStoreRef) -> Self {
        let stages: Vec<Box<dyn OrderStage>> = vec![
            Box::new(EnsureCustomerExists::new(gateway.clone(), users.clone())),
            Box::new(EnsureDefaultPaymentMethod::new(gateway.clone(), users)),
            Box::new(EnsureProductsExist::new(gateway.clone(), catalog.clone())),
            Box::new(EnsurePricesExist::new(gateway, catalog)),
        ];
        Self::with_stages(stages)
    }

    pub fn with_stages(stages: Vec<Box<dyn OrderStage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    #[tracing::instrument(skip(self, order), fields(order_id = order.id, user_id = order.user_id))]
    pub async fn run(&self, mut order: Order) -> Result<Order> {
        for stage in &self.stages {
            tracing::debug!(stage = stage.name(), "running pipeline stage");
            order = stage.handle(order).await?;
        }
        Ok(order)
    }
}

async fn load_user(users: &UserStoreRef, order: &Order) -> Result<User> {
    users.get(order.user_id).await?.ok_or(PaymentError::NotFound {
        entity: "user",
        id: order.user_id,
    })
}

async fn load_price(catalog: &CatalogStoreRef, id: PriceId) -> Result<Price> {
    catalog
        .price(id)
        .await?
        .ok_or(PaymentError::NotFound { entity: "price", id })
}

/// Distinct price ids in item order.
fn referenced_prices(order: &Order) -> Vec<PriceId> {
    let mut seen = BTreeSet::new();
    order
        .items
        .iter()
        .map(|item| item.price_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

pub struct EnsureCustomerExists {
    gateway: PaymentGatewayRef,
    users: UserStoreRef,
}

impl EnsureCustomerExists {
    pub fn new(gateway: PaymentGatewayRef, users: UserStoreRef) -> Self {
        Self { gateway, users }
    }

    async fn resolve(&self, user: &User) -> Result<(String, bool)> {
        if let Some(id) = &user.external_customer_id {
            return Ok((id.clone(), false));
        }
        if let Some(id) = self.gateway.find_customer_by_email(&user.email).await? {
            tracing::info!(user_id = user.id, customer_id = %id, "linked existing remote customer");
            return Ok((id, true));
        }
        match self.gateway.create_customer(user).await {
            Ok(Some(id)) => {
                tracing::info!(user_id = user.id, customer_id = %id, "created remote customer");
                Ok((id, true))
            }
            Ok(None) => Err(PaymentError::GatewayError(format!(
                "Unable to create customer for user {}",
                user.id
            ))),
            Err(e) => Err(PaymentError::GatewayError(format!(
                "Unable to create customer for user {}: {e}",
                user.id
            ))),
        }
    }
}

#[async_trait]
impl OrderStage for EnsureCustomerExists {
    fn name(&self) -> &'static str {
        "EnsureCustomerExists"
    }

    async fn handle(&self, mut order: Order) -> Result<Order> {
        let mut user = load_user(&self.users, &order).await?;
        let (customer_id, linked) = self.resolve(&user).await?;
        if linked {
            user.external_customer_id = Some(customer_id.clone());
            self.users.store(user).await?;
        }
        if order.external_customer_id.is_none() {
            order.external_customer_id = Some(customer_id);
        }
        Ok(order)
    }
}

pub struct EnsureDefaultPaymentMethod {
    gateway: PaymentGatewayRef,
    users: UserStoreRef,
}

impl EnsureDefaultPaymentMethod {
    pub fn new(gateway: PaymentGatewayRef, users: UserStoreRef) -> Self {
        Self { gateway, users }
    }
}

#[async_trait]
impl OrderStage for EnsureDefaultPaymentMethod {
    fn name(&self) -> &'static str {
        "EnsureDefaultPaymentMethod"
    }

    async fn handle(&self, order: Order) -> Result<Order> {
        let mut user = load_user(&self.users, &order).await?;
        let customer_id = user.external_customer_id.clone().ok_or_else(|| {
            PaymentError::ValidationError(format!("user {} has no remote customer", user.id))
        })?;

        if user.default_payment_method.is_none() {
            let methods = self.gateway.list_payment_methods(&customer_id).await?;
            if let Some(first) = methods.first() {
                self.gateway
                    .set_default_payment_method(&customer_id, first)
                    .await?;
            }
        }

        // The remote default wins over whatever is stored locally.
        let remote = self.gateway.default_payment_method(&customer_id).await?;
        if remote != user.default_payment_method {
            user.default_payment_method = remote;
            self.users.store(user).await?;
        }
        Ok(order)
    }
}

pub struct EnsureProductsExist {
    gateway: PaymentGatewayRef,
    catalog: CatalogStoreRef,
}

impl EnsureProductsExist {
    pub fn new(gateway: PaymentGatewayRef, catalog: CatalogStoreRef) -> Self {
        Self { gateway, catalog }
    }

    async fn create(&self, mut product: Product) -> Result<()> {
        let external_id = match self.gateway.create_product(&product).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return Err(PaymentError::ResourceCreation {
                    kind: "product",
                    local_id: product.id,
                });
            }
            Err(e) => {
                tracing::error!(product_id = product.id, error = %e, "remote product creation failed");
                return Err(PaymentError::ResourceCreation {
                    kind: "product",
                    local_id: product.id,
                });
            }
        };
        product.external_product_id = Some(external_id);
        self.catalog.store_product(product).await
    }
}

#[async_trait]
impl OrderStage for EnsureProductsExist {
    fn name(&self) -> &'static str {
        "EnsureProductsExist"
    }

    async fn handle(&self, order: Order) -> Result<Order> {
        let mut seen = BTreeSet::new();
        for price_id in referenced_prices(&order) {
            let price = load_price(&self.catalog, price_id).await?;
            if !seen.insert(price.product_id) {
                continue;
            }
            let product = self
                .catalog
                .product(price.product_id)
                .await?
                .ok_or(PaymentError::NotFound {
                    entity: "product",
                    id: price.product_id,
                })?;
            if product.external_product_id.is_none() {
                self.create(product).await?;
            }
        }
        Ok(order)
    }
}

pub struct EnsurePricesExist {
    gateway: PaymentGatewayRef,
    catalog: CatalogStoreRef,
}

impl EnsurePricesExist {
    pub fn new(gateway: PaymentGatewayRef, catalog: CatalogStoreRef) -> Self {
        Self { gateway, catalog }
    }
}

#[async_trait]
impl OrderStage for EnsurePricesExist {
    fn name(&self) -> &'static str {
        "EnsurePricesExist"
    }

    async fn handle(&self, order: Order) -> Result<Order> {
        for price_id in referenced_prices(&order) {
            let mut price = load_price(&self.catalog, price_id).await?;
            if price.external_price_id.is_some() {
                continue;
            }
            let failed = PaymentError::ResourceCreation {
                kind: "price",
                local_id: price.id,
            };
            let Some(external_product_id) = self
                .catalog
                .product(price.product_id)
                .await?
                .and_then(|p| p.external_product_id)
            else {
                return Err(failed);
            };
            match self.gateway.create_price(&price, &external_product_id).await {
                Ok(Some(id)) => {
                    price.external_price_id = Some(id);
                    self.catalog.store_price(price).await?;
                }
                Ok(None) => return Err(failed),
                Err(e) => {
                    tracing::error!(price_id = price.id, error = %e, "remote price creation failed");
                    return Err(failed);
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::order::BillingInterval;
    use crate::domain::ports::{CatalogStore, UserStore};
    use crate::infrastructure::in_memory::{InMemoryCatalogStore, InMemoryUserStore};
    use crate::infrastructure::sandbox::{Fault, SandboxProcessor};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        sandbox: SandboxProcessor,
        users: InMemoryUserStore,
        catalog: InMemoryCatalogStore,
        pipeline: ImportPipeline,
    }

    async fn fixture() -> Fixture {
        let sandbox = SandboxProcessor::new(Balance::ZERO);
        let users = InMemoryUserStore::new();
        let catalog = InMemoryCatalogStore::new();
        users
            .store(User::new(1, "ada@example.com", "Ada"))
            .await
            .unwrap();
        catalog
            .store_product(Product {
                id: 10,
                name: "Pro".to_string(),
                external_product_id: None,
            })
            .await
            .unwrap();
        for id in [100, 101] {
            catalog
                .store_price(Price {
                    id,
                    product_id: 10,
                    amount: Amount::new(dec!(1500)).unwrap(),
                    currency: "usd".to_string(),
                    interval: BillingInterval::Month,
                    external_price_id: None,
                })
                .await
                .unwrap();
        }
        let pipeline = ImportPipeline::new(
            Arc::new(sandbox.clone()),
            Arc::new(users.clone()),
            Arc::new(catalog.clone()),
        );
        Fixture {
            sandbox,
            users,
            catalog,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_dependency_order() {
        let f = fixture().await;
        assert_eq!(
            f.pipeline.stage_names(),
            vec![
                "EnsureCustomerExists",
                "EnsureDefaultPaymentMethod",
                "EnsureProductsExist",
                "EnsurePricesExist"
            ]
        );
    }

    #[tokio::test]
    async fn test_pipeline_links_everything() {
        let f = fixture().await;
        let order = Order::new(5, 1).with_item(100, 1).with_item(101, 1);

        let order = f.pipeline.run(order).await.unwrap();

        let user = f.users.get(1).await.unwrap().unwrap();
        assert!(user.external_customer_id.is_some());
        assert_eq!(order.external_customer_id, user.external_customer_id);
        assert_eq!(f.sandbox.products_created().await, 1);
        assert_eq!(f.sandbox.prices_created().await, 2);
        let price = f.catalog.price(101).await.unwrap().unwrap();
        assert!(price.external_price_id.is_some());
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let f = fixture().await;
        let order = Order::new(5, 1).with_item(100, 1);

        let order = f.pipeline.run(order).await.unwrap();
        f.pipeline.run(order).await.unwrap();

        assert_eq!(f.sandbox.customers_created().await, 1);
        assert_eq!(f.sandbox.products_created().await, 1);
        assert_eq!(f.sandbox.prices_created().await, 1);
    }

    #[tokio::test]
    async fn test_existing_remote_customer_is_reused() {
        let f = fixture().await;
        let existing = f.sandbox.register_customer("ada@example.com").await;

        let order = f.pipeline.run(Order::new(5, 1)).await.unwrap();

        assert_eq!(order.external_customer_id.as_deref(), Some(existing.as_str()));
        assert_eq!(f.sandbox.customers_created().await, 0);
    }

    #[tokio::test]
    async fn test_customer_creation_failure_aborts() {
        let f = fixture().await;
        f.sandbox.set_customer_fault(Fault::ReturnNothing).await;

        let err = f
            .pipeline
            .run(Order::new(5, 1).with_item(100, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::GatewayError(_)));
        assert_eq!(f.sandbox.products_created().await, 0);
    }

    #[tokio::test]
    async fn test_first_remote_method_becomes_default() {
        let f = fixture().await;
        let customer = f.sandbox.register_customer("ada@example.com").await;
        f.sandbox.add_payment_method(&customer, "pm_card_a").await;
        f.sandbox.add_payment_method(&customer, "pm_card_b").await;

        f.pipeline.run(Order::new(5, 1)).await.unwrap();

        let user = f.users.get(1).await.unwrap().unwrap();
        assert_eq!(user.default_payment_method.as_deref(), Some("pm_card_a"));
    }

    #[tokio::test]
    async fn test_local_default_resyncs_from_remote() {
        let f = fixture().await;
        let customer = f.sandbox.register_customer("ada@example.com").await;
        f.sandbox.set_default_remote(&customer, "pm_new").await;
        let mut user = f.users.get(1).await.unwrap().unwrap();
        user.default_payment_method = Some("pm_old".to_string());
        f.users.store(user).await.unwrap();

        f.pipeline.run(Order::new(5, 1)).await.unwrap();

        let user = f.users.get(1).await.unwrap().unwrap();
        assert_eq!(user.default_payment_method.as_deref(), Some("pm_new"));
    }

    #[tokio::test]
    async fn test_price_failure_names_local_id() {
        let f = fixture().await;
        f.sandbox.set_price_fault(Fault::Error).await;

        let err = f
            .pipeline
            .run(Order::new(5, 1).with_item(101, 1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::ResourceCreation {
                kind: "price",
                local_id: 101
            }
        ));
        assert!(err.to_string().contains("101"));
    }
}
