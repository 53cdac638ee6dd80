use std::sync::Arc;

use crate::services::{ImageSink, Lookup, OrderLedger, PaymentFlow, PaymentGateway, Redemption};
use crate::store::TicketStore;

/// Shared handler state. Services are cheap handles over the same store.
pub struct AppState<S, I> {
    pub ledger: OrderLedger<S, I>,
    pub payments: PaymentFlow<S, I>,
    pub redemption: Redemption<S>,
    pub lookup: Lookup<S>,
}

impl<S, I> Clone for AppState<S, I> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            payments: self.payments.clone(),
            redemption: self.redemption.clone(),
            lookup: self.lookup.clone(),
        }
    }
}

impl<S: TicketStore, I: ImageSink> AppState<S, I> {
    pub fn new(store: Arc<S>, images: Arc<I>, gateway: PaymentGateway) -> Self {
        let ledger = OrderLedger::new(Arc::clone(&store), images);
        Self {
            payments: PaymentFlow::new(gateway, Arc::clone(&store), ledger.clone()),
            ledger,
            redemption: Redemption::new(Arc::clone(&store)),
            lookup: Lookup::new(store),
        }
    }
}
