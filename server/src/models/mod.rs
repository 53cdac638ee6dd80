pub mod order;
pub mod page;
pub mod payment_intent;
pub mod scan_log;
pub mod ticket;

pub use order::{IssuedOrder, ItemCode, NewLineItem, NewOrder, Order, OrderDetails, OrderStatus};
pub use page::{Page, Paginated};
pub use payment_intent::PaymentIntent;
pub use scan_log::{ScanLogEntry, ScanLogFilter, ScanOutcome};
pub use ticket::{TicketItem, TicketStatus};
