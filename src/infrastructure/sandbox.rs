use crate::domain::money::{Amount, Balance};
use crate::domain::order::{
    Invoice, Order, PaymentBehavior, Price, Product, ProrationBehavior, Subscription,
    SubscriptionOptions, User, UserId,
};
use crate::domain::payout::{Payout, ProcessorPayout, SellerId, Transfer};
use crate::domain::ports::{PaymentGateway, PayoutGateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How a sandbox call should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// The driver returns no object.
    ReturnNothing,
    /// The driver raises an error.
    Error,
}

#[derive(Default)]
struct SandboxState {
    balance: Balance,
    sequence: u64,
    customers: HashMap<String, String>,
    payment_methods: HashMap<String, Vec<String>>,
    default_methods: HashMap<String, String>,
    subscriptions: HashMap<UserId, Subscription>,
    invoices: HashMap<String, Invoice>,
    transfers: Vec<Transfer>,
    payouts: Vec<ProcessorPayout>,
    customers_created: usize,
    products_created: usize,
    prices_created: usize,
    cancelled_orders: Vec<u64>,
    refunded_orders: Vec<u64>,
    customer_fault: Fault,
    product_fault: Fault,
    price_fault: Fault,
    transfer_fault: Fault,
    payout_fault: Fault,
}

impl SandboxState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}_{:06}", self.sequence)
    }
}

/// An in-process stand-in for the payment processor.
///
/// Transfers draw down a platform balance and fail with no object once it is
/// exhausted. Every remote resource gets a sequential id so tests can assert on
/// what was created.
#[derive(Default, Clone)]
pub struct SandboxProcessor {
    state: Arc<Mutex<SandboxState>>,
}

impl SandboxProcessor {
    pub fn new(platform_balance: Balance) -> Self {
        Self {
            state: Arc::new(Mutex::new(SandboxState {
                balance: platform_balance,
                ..Default::default()
            })),
        }
    }

    pub async fn add_payment_method(&self, customer_id: &str, method_id: &str) {
        let mut state = self.state.lock().await;
        state
            .payment_methods
            .entry(customer_id.to_string())
            .or_default()
            .push(method_id.to_string());
    }

    pub async fn register_customer(&self, email: &str) -> String {
        let mut state = self.state.lock().await;
        let id = state.next_id("cus");
        state.customers.insert(email.to_string(), id.clone());
        id
    }

    pub async fn set_default_remote(&self, customer_id: &str, method_id: &str) {
        let mut state = self.state.lock().await;
        state
            .default_methods
            .insert(customer_id.to_string(), method_id.to_string());
    }

    pub async fn add_invoice(&self, invoice: Invoice) {
        let mut state = self.state.lock().await;
        state.invoices.insert(invoice.external_id.clone(), invoice);
    }

    pub async fn set_customer_fault(&self, fault: Fault) {
        self.state.lock().await.customer_fault = fault;
    }

    pub async fn set_product_fault(&self, fault: Fault) {
        self.state.lock().await.product_fault = fault;
    }

    pub async fn set_price_fault(&self, fault: Fault) {
        self.state.lock().await.price_fault = fault;
    }

    pub async fn set_transfer_fault(&self, fault: Fault) {
        self.state.lock().await.transfer_fault = fault;
    }

    pub async fn set_payout_fault(&self, fault: Fault) {
        self.state.lock().await.payout_fault = fault;
    }

    pub async fn customers_created(&self) -> usize {
        self.state.lock().await.customers_created
    }

    pub async fn products_created(&self) -> usize {
        self.state.lock().await.products_created
    }

    pub async fn prices_created(&self) -> usize {
        self.state.lock().await.prices_created
    }

    pub async fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().await.transfers.clone()
    }

    pub async fn payouts(&self) -> Vec<ProcessorPayout> {
        self.state.lock().await.payouts.clone()
    }

    pub async fn cancelled_orders(&self) -> Vec<u64> {
        self.state.lock().await.cancelled_orders.clone()
    }

    pub async fn refunded_orders(&self) -> Vec<u64> {
        self.state.lock().await.refunded_orders.clone()
    }
}

fn injected(fault: Fault, call: &str) -> Result<()> {
    match fault {
        Fault::Error => Err(PaymentError::GatewayError(format!(
            "sandbox {call} failed"
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl PaymentGateway for SandboxProcessor {
    async fn current_subscription(&self, user: &User) -> Result<Option<Subscription>> {
        Ok(self.state.lock().await.subscriptions.get(&user.id).cloned())
    }

    async fn swap_subscription(
        &self,
        user: &User,
        price: &Price,
        _proration_behavior: ProrationBehavior,
        _payment_behavior: PaymentBehavior,
    ) -> Result<Subscription> {
        let mut state = self.state.lock().await;
        let subscription = state.subscriptions.get_mut(&user.id).ok_or_else(|| {
            PaymentError::GatewayError(format!("user {} has no subscription to swap", user.id))
        })?;
        subscription.price_id = price.id;
        Ok(subscription.clone())
    }

    async fn start_subscription(
        &self,
        order: &Order,
        _options: &SubscriptionOptions,
    ) -> Result<Subscription> {
        let price_id = order
            .items
            .first()
            .map(|item| item.price_id)
            .ok_or_else(|| PaymentError::ValidationError(format!("order {} has no items", order.id)))?;
        let mut state = self.state.lock().await;
        let subscription = Subscription {
            external_id: state.next_id("sub"),
            user_id: order.user_id,
            price_id,
            status: "active".to_string(),
        };
        state
            .subscriptions
            .insert(order.user_id, subscription.clone());
        Ok(subscription)
    }

    async fn cancel_order(&self, order: &Order) -> Result<()> {
        self.state.lock().await.cancelled_orders.push(order.id);
        Ok(())
    }

    async fn refund_order(
        &self,
        order: &Order,
        _reason: Option<&str>,
        _notes: Option<&str>,
    ) -> Result<()> {
        self.state.lock().await.refunded_orders.push(order.id);
        Ok(())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.customers.get(email).cloned())
    }

    async fn create_customer(&self, user: &User) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        injected(state.customer_fault, "create_customer")?;
        if state.customer_fault == Fault::ReturnNothing {
            return Ok(None);
        }
        let id = state.next_id("cus");
        state.customers.insert(user.email.clone(), id.clone());
        state.customers_created += 1;
        Ok(Some(id))
    }

    async fn create_product(&self, _product: &Product) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        injected(state.product_fault, "create_product")?;
        if state.product_fault == Fault::ReturnNothing {
            return Ok(None);
        }
        state.products_created += 1;
        Ok(Some(state.next_id("prod")))
    }

    async fn create_price(
        &self,
        _price: &Price,
        _external_product_id: &str,
    ) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        injected(state.price_fault, "create_price")?;
        if state.price_fault == Fault::ReturnNothing {
            return Ok(None);
        }
        state.prices_created += 1;
        Ok(Some(state.next_id("price")))
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .payment_methods
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn default_payment_method(&self, customer_id: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.default_methods.get(customer_id).cloned())
    }

    async fn set_default_payment_method(&self, customer_id: &str, method_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .default_methods
            .insert(customer_id.to_string(), method_id.to_string());
        Ok(())
    }

    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>> {
        Ok(self.state.lock().await.invoices.get(invoice_id).cloned())
    }
}

#[async_trait]
impl PayoutGateway for SandboxProcessor {
    async fn create_transfer(
        &self,
        seller_id: SellerId,
        amount: Amount,
    ) -> Result<Option<Transfer>> {
        let mut state = self.state.lock().await;
        injected(state.transfer_fault, "create_transfer")?;
        if state.transfer_fault == Fault::ReturnNothing || !state.balance.covers(amount) {
            return Ok(None);
        }
        state.balance -= Balance::from(amount);
        let transfer = Transfer {
            id: state.next_id("tr"),
            seller_id,
            amount,
        };
        state.transfers.push(transfer.clone());
        Ok(Some(transfer))
    }

    async fn create_payout(&self, _payout: &Payout) -> Result<Option<ProcessorPayout>> {
        let mut state = self.state.lock().await;
        injected(state.payout_fault, "create_payout")?;
        if state.payout_fault == Fault::ReturnNothing {
            return Ok(None);
        }
        let payout = ProcessorPayout {
            id: state.next_id("po"),
            status: "paid".to_string(),
        };
        state.payouts.push(payout.clone());
        Ok(Some(payout))
    }

    async fn platform_balance(&self) -> Result<Balance> {
        Ok(self.state.lock().await.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_transfers_draw_down_platform_balance() {
        let sandbox = SandboxProcessor::new(Balance::new(dec!(100)));
        let amount = Amount::new(dec!(60)).unwrap();

        assert!(sandbox.create_transfer(1, amount).await.unwrap().is_some());
        assert!(sandbox.create_transfer(1, amount).await.unwrap().is_none());
        assert_eq!(
            sandbox.platform_balance().await.unwrap(),
            Balance::new(dec!(40))
        );
    }

    #[tokio::test]
    async fn test_injected_error_surfaces_as_gateway_error() {
        let sandbox = SandboxProcessor::new(Balance::new(dec!(100)));
        sandbox.set_payout_fault(Fault::Error).await;
        let payout = Payout::new(1, 1, Amount::new(dec!(1)).unwrap());
        assert!(matches!(
            sandbox.create_payout(&payout).await,
            Err(PaymentError::GatewayError(_))
        ));
    }
}
