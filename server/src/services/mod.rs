pub mod checksum;
pub mod ledger;
pub mod lookup;
pub mod payment;
pub mod redemption;
pub mod ticket_code;

pub use ledger::OrderLedger;
pub use lookup::Lookup;
pub use payment::{PaymentCallback, PaymentFlow, PaymentGateway, PaymentRequest, PrepareRequest};
pub use redemption::{Redemption, RedemptionReport};
pub use ticket_code::{FsImageSink, ImageSink};
